//! Amplifier tuning objective evaluated on live measurements.

use impa_differential_evolution::{CancellationToken, CostFunction, Evaluation};
use ndarray::{Array1, ArrayView1, Zip};
use num_complex::Complex64;

use crate::error::{Result, TuningError};
use crate::instruments::{InstrumentResult, Instruments, NetworkAnalyzer, SweepMode};
use crate::params::TuningParameters;

/// Linear amplitude ratio of a gain in dB.
pub fn db_to_amplitude(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

/// Gain in dB of a linear amplitude ratio.
pub fn amplitude_to_db(amplitude: f64) -> f64 {
    20.0 * amplitude.log10()
}

/// Signal-to-noise ratio of repeated readings: `|mean| / std(real)`.
pub fn snr(trace: ArrayView1<'_, Complex64>) -> f64 {
    let n = trace.len() as f64;
    let mean = trace.sum() / n;
    let re = trace.mapv(|c| c.re);
    mean.norm() / re.std(0.0)
}

/// Unpumped measurements every candidate is compared against.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    trace: Array1<Complex64>,
    snr: f64,
}

impl Reference {
    /// Wraps a pump-off trace and the pump-off SNR at the probe frequency.
    pub fn new(trace: Array1<Complex64>, snr: f64) -> Result<Self> {
        if trace.is_empty() {
            return Err(TuningError::EmptyReference);
        }
        Ok(Self { trace, snr })
    }

    /// Pump-off trace.
    pub fn trace(&self) -> &Array1<Complex64> {
        &self.trace
    }

    /// Pump-off SNR.
    pub fn snr(&self) -> f64 {
        self.snr
    }

    /// Amplitude gain `|trace / reference|` per point.
    pub fn gain(&self, trace: &Array1<Complex64>) -> Result<Array1<f64>> {
        if trace.len() != self.trace.len() {
            return Err(TuningError::TraceLength {
                expected: self.trace.len(),
                got: trace.len(),
            });
        }
        Ok(Zip::from(trace)
            .and(&self.trace)
            .map_collect(|on, off| (on / off).norm()))
    }
}

/// Cost of a measured gain profile.
///
/// `mean((g - target)^2) + (w_cent * max(g_centre - target, 0))^2 +
/// (snr_gain - target)^2`, all in linear amplitude. The centre term only
/// punishes overshoot at the middle point of the band.
pub fn amplifier_cost(gain: ArrayView1<'_, f64>, snr_gain: f64, target: f64, w_cent: f64) -> f64 {
    let diff = gain.mapv(|g| g - target);
    let spread = diff.mapv(|d| d * d).mean().unwrap_or(0.0);
    let overshoot = if diff.is_empty() {
        0.0
    } else {
        diff[diff.len() / 2].max(0.0)
    };
    spread + (w_cent * overshoot).powi(2) + (snr_gain - target).powi(2)
}

/// Measures the SNR at `frequency` in CW mode and returns the analyzer to
/// linear sweeps. `None` when the read was interrupted.
pub fn probe_snr(
    analyzer: &mut dyn NetworkAnalyzer,
    frequency: f64,
    token: &CancellationToken,
) -> InstrumentResult<Option<f64>> {
    analyzer.set_sweep_mode(SweepMode::ContinuousWave)?;
    analyzer.set_single_frequency(frequency)?;
    let trace = analyzer.read_trace(token)?;
    analyzer.set_sweep_mode(SweepMode::Linear)?;
    if trace.is_empty() {
        return Ok(None);
    }
    Ok(Some(snr(trace.view())))
}

/// Tuning objective: pushes a candidate (bias, pump power and optionally
/// signal frequency) to the instruments and scores the resulting gain.
///
/// The reference is measured once before the search and reused for every
/// candidate.
pub struct AmplifierCost<'a> {
    instruments: &'a mut Instruments,
    reference: &'a Reference,
    token: CancellationToken,
    target_gain: f64,
    target_bandwidth: f64,
    w_cent: f64,
    detuning: f64,
    evaluations: usize,
}

impl<'a> AmplifierCost<'a> {
    /// Objective over `instruments` for the targets in `params`.
    pub fn new(
        instruments: &'a mut Instruments,
        reference: &'a Reference,
        token: CancellationToken,
        params: &TuningParameters,
    ) -> Self {
        Self {
            instruments,
            reference,
            token,
            target_gain: db_to_amplitude(params.target_gain_db),
            target_bandwidth: params.target_bandwidth,
            w_cent: params.w_cent,
            detuning: params.detuning,
            evaluations: 0,
        }
    }

    /// Completed evaluations.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }
}

impl CostFunction for AmplifierCost<'_> {
    type Error = TuningError;

    fn cost(&mut self, x: &Array1<f64>) -> Result<Evaluation<f64>> {
        let ins = &mut *self.instruments;
        ins.pump.set_power(x[1])?;
        ins.bias.set_current(x[0])?;
        if x.len() > 2 {
            ins.pump.set_frequency(2.0 * x[2])?;
            ins.analyzer.set_center_span(x[2], self.target_bandwidth)?;
        }

        let trace = ins.analyzer.read_trace(&self.token)?;
        if trace.is_empty() {
            return Ok(Evaluation::Cancelled);
        }
        let gain = self.reference.gain(&trace)?;

        let (center, _) = ins.analyzer.center_span()?;
        let Some(snr) = probe_snr(ins.analyzer.as_mut(), center + self.detuning, &self.token)? else {
            return Ok(Evaluation::Cancelled);
        };
        let snr_gain = snr / self.reference.snr();

        self.evaluations += 1;
        let cost = amplifier_cost(gain.view(), snr_gain, self.target_gain, self.w_cent);
        log::trace!(
            "I={:.4e} A Pp={:.3} dBm -> cost={:.4} snr_gain={:.3}",
            x[0],
            x[1],
            cost,
            snr_gain
        );
        Ok(Evaluation::Done(cost))
    }
}
