//! Hardware-in-the-loop tuning session.

use impa_differential_evolution::{
    CancellationToken, DEReport, DifferentialEvolution, Evaluation, SolverState,
};
use log::{debug, info, warn};
use ndarray::Array2;
use num_complex::Complex64;

use crate::cost::{AmplifierCost, Reference, amplitude_to_db, probe_snr};
use crate::error::{Result, TuningError};
use crate::instruments::{Instruments, SweepMode, SweepSettings};
use crate::operating_point::OperatingPoint;
use crate::params::TuningParameters;
use crate::snapshot::{SnapshotSettings, SnrSnapshot, VnaSnapshot};

/// Outcome of one gain search.
#[derive(Debug, Clone)]
pub struct GainSearch {
    /// The applied and measured winner; `None` when the search was aborted.
    pub point: Option<OperatingPoint>,
    /// Whether the optimizer met a tolerance.
    pub success: bool,
    /// Termination message of the optimizer.
    pub message: String,
    /// Generations run.
    pub nit: usize,
    /// Candidates measured.
    pub nfev: usize,
}

impl GainSearch {
    fn aborted(nit: usize, nfev: usize) -> Self {
        Self {
            point: None,
            success: false,
            message: "aborted".to_string(),
            nit,
            nfev,
        }
    }

    /// Whether the search was interrupted.
    pub fn is_aborted(&self) -> bool {
        self.point.is_none()
    }
}

/// Tunes an impedance-matched parametric amplifier by driving its bias
/// source, pump generator and network analyzer.
///
/// The tuner owns its instruments for its whole lifetime. Call
/// [`abort`](Self::abort) or raise the token from
/// [`cancellation_token`](Self::cancellation_token) on another thread to
/// interrupt a search or snapshot before the next trace.
#[derive(Debug)]
pub struct IMPATuner {
    instruments: Instruments,
    params: TuningParameters,
    token: CancellationToken,
    reference: Option<Reference>,
    last_report: Option<DEReport>,
}

impl IMPATuner {
    /// Session over `instruments` with `params`.
    pub fn new(instruments: Instruments, params: TuningParameters) -> Self {
        Self {
            instruments,
            params,
            token: CancellationToken::new(),
            reference: None,
            last_report: None,
        }
    }

    /// Tuning parameters.
    pub fn params(&self) -> &TuningParameters {
        &self.params
    }

    /// Mutable tuning parameters.
    pub fn params_mut(&mut self) -> &mut TuningParameters {
        &mut self.params
    }

    /// The instrument group.
    pub fn instruments_mut(&mut self) -> &mut Instruments {
        &mut self.instruments
    }

    /// Releases the instruments.
    pub fn into_instruments(self) -> Instruments {
        self.instruments
    }

    /// Shared abort flag observed by searches and snapshots.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Requests an abort of the running search or snapshot.
    pub fn abort(&self) {
        self.token.cancel();
    }

    /// Reference measured by the last search.
    pub fn reference(&self) -> Option<&Reference> {
        self.reference.as_ref()
    }

    /// Optimizer report of the last search.
    pub fn last_report(&self) -> Option<&DEReport> {
        self.last_report.as_ref()
    }

    /// Pump-off and bias-off trace, then the unpumped SNR at the probe
    /// frequency. The analyzer is left in linear mode with the pump on and
    /// triggering stopped.
    fn measure_reference(&mut self) -> Result<Option<Reference>> {
        let ins = &mut self.instruments;
        ins.bias.set_output(false)?;
        ins.pump.set_output(false)?;
        ins.analyzer.arm_sweep()?;
        let trace = ins.analyzer.read_trace(&self.token)?;
        if trace.is_empty() {
            return Ok(None);
        }
        let (center, _) = ins.analyzer.center_span()?;
        let Some(snr) = probe_snr(
            ins.analyzer.as_mut(),
            center + self.params.detuning,
            &self.token,
        )?
        else {
            return Ok(None);
        };
        ins.pump.set_output(true)?;
        ins.analyzer.abort_sweep()?;
        debug!("reference measured: {} points, snr={:.3}", trace.len(), snr);
        Reference::new(trace, snr).map(Some)
    }

    fn finish_aborted(&mut self, nit: usize, nfev: usize) -> Result<GainSearch> {
        self.token.reset();
        self.instruments.analyzer.abort_sweep()?;
        warn!("gain search aborted after {nit} generations, {nfev} measurements");
        Ok(GainSearch::aborted(nit, nfev))
    }

    /// Searches bias current and pump power (and the signal frequency when
    /// a frequency span is configured) for the target gain at
    /// `target_frequency`.
    ///
    /// The reference is measured once up front. The winner is applied to
    /// the instruments and its gain and SNR gain are measured.
    ///
    /// # Errors
    ///
    /// Configuration errors of the optimizer and any instrument failure.
    /// An abort is not an error: it yields a [`GainSearch`] without a point.
    pub fn find_gain(&mut self, target_frequency: f64) -> Result<GainSearch> {
        let params = self.params.clone();
        info!(
            "tuning {:.4} GHz for {:.1} dB over {:.0} MHz",
            target_frequency / 1e9,
            params.target_gain_db,
            params.target_bandwidth / 1e6
        );

        let ins = &mut self.instruments;
        ins.bias.set_current(0.0)?;
        params
            .search_sweep(target_frequency)
            .apply(ins.analyzer.as_mut())?;
        ins.analyzer.set_output(true)?;

        let Some(reference) = self.measure_reference()? else {
            return self.finish_aborted(0, 0);
        };

        let ins = &mut self.instruments;
        ins.pump.set_output(true)?;
        ins.bias.set_output(true)?;
        ins.pump.set_frequency(2.0 * target_frequency)?;
        ins.analyzer.arm_sweep()?;

        let bounds = params.bounds(target_frequency);
        let config = params.search.to_config()?;
        let mut de =
            DifferentialEvolution::new(&bounds, config)?.with_cancellation_token(self.token.clone());
        let report = {
            let mut cost =
                AmplifierCost::new(&mut self.instruments, &reference, self.token.clone(), &params);
            de.solve(&mut cost)?
        };
        self.reference = Some(reference);
        let (nit, nfev) = (report.nit, report.nfev);
        let success = report.success;
        let message = report.message.clone();
        let x = report.x.clone();
        let aborted = report.status == SolverState::Aborted;
        self.last_report = Some(report);
        if aborted {
            return self.finish_aborted(nit, nfev);
        }

        let (signal_frequency, pump_frequency) = if x.len() > 2 {
            (x[2], 2.0 * x[2])
        } else {
            (target_frequency, 2.0 * target_frequency)
        };
        let mut point = OperatingPoint {
            signal_frequency,
            pump_frequency,
            pump_power: x[1],
            bias_current: x[0],
            gain_db: f64::NAN,
            snr_gain_db: f64::NAN,
        };
        self.set_operating_point(&point)?;
        match self.measure_point()? {
            Some((gain_db, snr_gain_db)) => {
                point.gain_db = gain_db;
                point.snr_gain_db = snr_gain_db;
            }
            None => return self.finish_aborted(nit, nfev),
        }
        self.instruments.analyzer.abort_sweep()?;

        info!(
            "{:.4} GHz: I={:.4e} A Pp={:.2} dBm G={:.2} dB Gsnr={:.2} dB ({message})",
            point.signal_frequency / 1e9,
            point.bias_current,
            point.pump_power,
            point.gain_db,
            point.snr_gain_db
        );
        Ok(GainSearch {
            point: Some(point),
            success,
            message,
            nit,
            nfev,
        })
    }

    /// Gain at the centre of the band and SNR gain at the detuned probe of
    /// the currently applied point.
    fn measure_point(&mut self) -> Result<Option<(f64, f64)>> {
        let Some(reference) = self.reference.as_ref() else {
            return Ok(None);
        };
        let ins = &mut self.instruments;
        let trace = ins.analyzer.read_trace(&self.token)?;
        if trace.is_empty() {
            return Ok(None);
        }
        let gain = reference.gain(&trace)?;
        let gain_db = amplitude_to_db(gain[gain.len() / 2]);

        let (center, _) = ins.analyzer.center_span()?;
        let Some(snr) = probe_snr(
            ins.analyzer.as_mut(),
            center + self.params.detuning,
            &self.token,
        )?
        else {
            return Ok(None);
        };
        Ok(Some((gain_db, amplitude_to_db(snr / reference.snr()))))
    }

    /// Pushes `point` to the instruments. The analyzer keeps its span and is
    /// recentred on the signal frequency.
    pub fn set_operating_point(&mut self, point: &OperatingPoint) -> Result<()> {
        let ins = &mut self.instruments;
        ins.bias.set_current(point.bias_current)?;
        ins.pump.set_frequency(point.pump_frequency)?;
        ins.pump.set_power(point.pump_power)?;
        ins.analyzer.set_sweep_mode(SweepMode::Linear)?;
        let (_, span) = ins.analyzer.center_span()?;
        ins.analyzer.set_center_span(point.signal_frequency, span)?;
        Ok(())
    }

    /// Analyzer setup of a snapshot around `point`.
    fn snapshot_sweep(
        &self,
        point: &OperatingPoint,
        settings: &SnapshotSettings,
        default_if_bandwidth: f64,
    ) -> SweepSettings {
        SweepSettings {
            center: point.pump_frequency / 2.0,
            span: settings.span.unwrap_or(2.0 * self.params.target_bandwidth),
            points: settings.points.unwrap_or(2 * self.params.analyzer_points),
            if_bandwidth: settings.if_bandwidth.unwrap_or(default_if_bandwidth),
            power: settings.power.unwrap_or(self.params.analyzer_power),
        }
    }

    /// One pump-on and one pump-off trace around `point`, by default over
    /// twice the bandwidth with twice the points at a tenth of the IF
    /// bandwidth. An abort yields [`Evaluation::Cancelled`] and clears the
    /// token.
    pub fn vna_snapshot(
        &mut self,
        point: &OperatingPoint,
        settings: &SnapshotSettings,
    ) -> Result<Evaluation<VnaSnapshot>> {
        let sweep = self.snapshot_sweep(point, settings, self.params.analyzer_if_bandwidth / 10.0);
        let ins = &mut self.instruments;
        ins.bias.set_current(point.bias_current)?;
        ins.bias.set_output(true)?;
        ins.pump.set_power(point.pump_power)?;
        ins.pump.set_output(true)?;
        ins.pump.set_frequency(point.pump_frequency)?;
        sweep.apply(ins.analyzer.as_mut())?;

        ins.analyzer.arm_sweep()?;
        let pump_on = ins.analyzer.read_trace(&self.token)?;
        ins.pump.set_output(false)?;
        let pump_off = ins.analyzer.read_trace(&self.token)?;
        let frequencies = ins.analyzer.frequency_points()?;
        ins.analyzer.abort_sweep()?;
        if pump_on.is_empty() || pump_off.is_empty() {
            self.token.reset();
            warn!("vna snapshot aborted");
            return Ok(Evaluation::Cancelled);
        }
        Ok(Evaluation::Done(VnaSnapshot {
            pump_on,
            pump_off,
            frequencies,
        }))
    }

    /// `measurements` pump-off traces followed by as many pump-on traces
    /// around `point`, at the search IF bandwidth unless overridden. An
    /// abort yields [`Evaluation::Cancelled`] and clears the token. The
    /// analyzer is disarmed after a complete run, an abort or a trace of the
    /// wrong length.
    pub fn snr_snapshot(
        &mut self,
        point: &OperatingPoint,
        settings: &SnapshotSettings,
        measurements: usize,
    ) -> Result<Evaluation<SnrSnapshot>> {
        let sweep = self.snapshot_sweep(point, settings, self.params.analyzer_if_bandwidth);
        let ins = &mut self.instruments;
        ins.bias.set_current(point.bias_current)?;
        ins.bias.set_output(true)?;
        ins.pump.set_output(false)?;
        ins.pump.set_power(point.pump_power)?;
        ins.pump.set_frequency(point.pump_frequency)?;
        sweep.apply(ins.analyzer.as_mut())?;

        ins.analyzer.arm_sweep()?;
        let mut pump_off = Array2::<Complex64>::zeros((measurements, sweep.points));
        let mut pump_on = Array2::<Complex64>::zeros((measurements, sweep.points));
        for (pump, traces) in [(false, &mut pump_off), (true, &mut pump_on)] {
            ins.pump.set_output(pump)?;
            for mut row in traces.rows_mut() {
                let trace = ins.analyzer.read_trace(&self.token)?;
                if trace.is_empty() {
                    ins.analyzer.abort_sweep()?;
                    self.token.reset();
                    warn!("snr snapshot aborted");
                    return Ok(Evaluation::Cancelled);
                }
                if trace.len() != row.len() {
                    ins.analyzer.abort_sweep()?;
                    return Err(TuningError::TraceLength {
                        expected: row.len(),
                        got: trace.len(),
                    });
                }
                row.assign(&trace);
            }
        }
        let frequencies = ins.analyzer.frequency_points()?;
        ins.analyzer.abort_sweep()?;
        Ok(Evaluation::Done(SnrSnapshot {
            pump_on,
            pump_off,
            frequencies,
        }))
    }
}
