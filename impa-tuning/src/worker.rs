//! Multi-frequency tuning on a dedicated thread.
//!
//! The worker owns the [`IMPATuner`] (and with it the instruments) for the
//! whole sweep and reports progress over a channel. The caller aborts it
//! through the shared cancellation token, which interrupts the search or
//! snapshot in flight before its next trace.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use impa_differential_evolution::{CancellationToken, Evaluation};
use log::{error, info};
use ndarray::Array1;
use num_complex::Complex64;

use crate::error::{Result, TuningError};
use crate::operating_point::{OperatingPoint, TuningTable};
use crate::session::IMPATuner;
use crate::snapshot::{SnapshotSettings, VnaSnapshot};

/// Verification data taken at a tuned point.
#[derive(Debug, Clone)]
pub struct Verification {
    /// Pump-on and pump-off traces over the wide span
    pub vna: VnaSnapshot,
    /// Average pump-on trace of the SNR snapshot
    pub snr_pump_on: Array1<Complex64>,
    /// Average pump-off trace of the SNR snapshot
    pub snr_pump_off: Array1<Complex64>,
    /// SNR gain per frequency
    pub snr_gain: Array1<f64>,
    /// Frequencies of the SNR snapshot (Hz)
    pub snr_frequencies: Array1<f64>,
}

/// Progress of a tuning sweep.
#[derive(Debug, Clone)]
pub enum TuningEvent {
    /// The sweep began.
    Started {
        /// Number of target frequencies
        points: usize,
    },
    /// Search at one target frequency began.
    PointStarted {
        /// Position in the target list
        index: usize,
        /// Target signal frequency (Hz)
        frequency: f64,
    },
    /// A point was tuned and verified.
    PointFinished {
        /// Position in the target list
        index: usize,
        /// The tuned point
        point: OperatingPoint,
        /// Whether the optimizer met a tolerance
        success: bool,
        /// Verification measurements
        verification: Box<Verification>,
    },
    /// The sweep was aborted.
    Aborted {
        /// Points finished before the abort
        completed: usize,
    },
    /// The sweep stopped on an error.
    Failed {
        /// Description of the error
        error: String,
    },
    /// Every target was tuned.
    Finished {
        /// Tuned points in target order
        table: TuningTable,
    },
}

fn send(events: &Sender<TuningEvent>, event: TuningEvent) -> Result<()> {
    events
        .send(event)
        .map_err(|_| TuningError::WorkerDisconnected)
}

/// Tunes one target: search, then both verification snapshots. `None` on
/// abort.
fn tune_point(
    tuner: &mut IMPATuner,
    frequency: f64,
) -> Result<Option<(OperatingPoint, bool, Verification)>> {
    let search = tuner.find_gain(frequency)?;
    let Some(point) = search.point else {
        return Ok(None);
    };

    let settings = SnapshotSettings::default();
    let Evaluation::Done(vna) = tuner.vna_snapshot(&point, &settings)? else {
        return Ok(None);
    };
    let measurements = tuner.params().snr_measurements;
    let Evaluation::Done(snr) = tuner.snr_snapshot(&point, &settings, measurements)? else {
        return Ok(None);
    };

    let verification = Verification {
        vna,
        snr_pump_on: snr.mean_pump_on(),
        snr_pump_off: snr.mean_pump_off(),
        snr_gain: snr.snr_gain_spectrum(),
        snr_frequencies: snr.frequencies.clone(),
    };
    Ok(Some((point, search.success, verification)))
}

/// Leaves the instruments at `point` with the search analyzer setup.
fn restore(tuner: &mut IMPATuner, point: &OperatingPoint) -> Result<()> {
    tuner.set_operating_point(point)?;
    let params = tuner.params().clone();
    let analyzer = &mut tuner.instruments_mut().analyzer;
    analyzer.set_points(params.analyzer_points)?;
    analyzer.set_if_bandwidth(params.analyzer_if_bandwidth)?;
    analyzer.set_power(params.analyzer_power)?;
    Ok(())
}

fn sweep(tuner: &mut IMPATuner, events: &Sender<TuningEvent>) -> Result<TuningTable> {
    let targets = tuner.params().target_frequencies.clone();
    if targets.is_empty() {
        return Err(TuningError::NoTargets);
    }
    let token = tuner.cancellation_token();
    send(events, TuningEvent::Started { points: targets.len() })?;

    let mut table = TuningTable::new();
    let mut aborted = false;
    for (index, &frequency) in targets.iter().enumerate() {
        if token.take() {
            aborted = true;
            break;
        }
        info!("target frequency point {} of {}: {:.4} GHz", index + 1, targets.len(), frequency / 1e9);
        send(events, TuningEvent::PointStarted { index, frequency })?;
        match tune_point(tuner, frequency)? {
            Some((point, success, verification)) => {
                table.push(point);
                send(
                    events,
                    TuningEvent::PointFinished {
                        index,
                        point,
                        success,
                        verification: Box::new(verification),
                    },
                )?;
            }
            None => {
                aborted = true;
                break;
            }
        }
    }
    token.reset();

    if let Some(last) = table.last().copied() {
        restore(tuner, &last)?;
    }
    if aborted {
        info!("sweep aborted after {} points", table.len());
        send(events, TuningEvent::Aborted { completed: table.len() })?;
    } else {
        send(events, TuningEvent::Finished { table: table.clone() })?;
    }
    Ok(table)
}

/// Tunes every target frequency in order, sending progress to `events`.
///
/// Returns the points tuned so far when aborted. On error a
/// [`TuningEvent::Failed`] is sent before the error is returned.
pub fn run_sweep(tuner: &mut IMPATuner, events: &Sender<TuningEvent>) -> Result<TuningTable> {
    sweep(tuner, events).inspect_err(|e| {
        error!("tuning sweep failed: {e}");
        if !matches!(e, TuningError::WorkerDisconnected) {
            let _ = events.send(TuningEvent::Failed {
                error: e.to_string(),
            });
        }
    })
}

/// Handle to a sweep running on its own thread.
#[derive(Debug)]
pub struct SweepHandle {
    token: CancellationToken,
    events: Receiver<TuningEvent>,
    worker: JoinHandle<(IMPATuner, Result<TuningTable>)>,
}

impl SweepHandle {
    /// Requests an abort; the sweep stops before its next trace.
    pub fn abort(&self) {
        self.token.cancel();
    }

    /// Progress events.
    pub fn events(&self) -> &Receiver<TuningEvent> {
        &self.events
    }

    /// Whether the worker has returned.
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Waits for the worker and hands the tuner back with the sweep result.
    pub fn join(self) -> Result<(IMPATuner, Result<TuningTable>)> {
        self.worker.join().map_err(|_| TuningError::WorkerPanicked)
    }
}

/// Starts [`run_sweep`] on a new thread that takes ownership of `tuner`.
pub fn spawn_sweep(mut tuner: IMPATuner) -> Result<SweepHandle> {
    let (tx, rx) = mpsc::channel();
    let token = tuner.cancellation_token();
    let worker = thread::Builder::new()
        .name("impa-sweep".to_string())
        .spawn(move || {
            let result = run_sweep(&mut tuner, &tx);
            (tuner, result)
        })?;
    Ok(SweepHandle {
        token,
        events: rx,
        worker,
    })
}
