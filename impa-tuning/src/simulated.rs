//! Deterministic stand-ins for the bias source, pump generator and network
//! analyzer.
//!
//! The three instruments share one [`SimulatedRig`] state. Its
//! amplitude gain is a Gaussian bump in (bias current, pump power) centred on
//! a known optimum and peaking at the target gain, shaped over frequency
//! around half the pump frequency. Linear sweeps return a sine ripple
//! baseline multiplied by that gain. CW reads return the same product plus a
//! deterministic sinusoidal noise record whose amplitude models amplified
//! input noise on top of a fixed system noise, so the SNR gain has a closed
//! form.

use std::f64::consts::{PI, SQRT_2};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use impa_differential_evolution::CancellationToken;
use ndarray::Array1;
use num_complex::Complex64;

use crate::cost::db_to_amplitude;
use crate::error::InstrumentError;
use crate::instruments::{
    BiasSource, InstrumentResult, Instruments, NetworkAnalyzer, PumpSource, SweepMode,
};

/// Period of the baseline ripple (Hz).
const RIPPLE_PERIOD: f64 = 0.5e9;

/// Baseline transmission of the measurement line at `f`.
pub fn ripple(f: f64) -> Complex64 {
    let phase = 2.0 * PI * f / RIPPLE_PERIOD;
    Complex64::new(phase.sin() + 1.0 + 0.01, phase.cos()) / (2.0 + 0.01)
}

/// Model parameters of the simulated amplifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmplifierModel {
    /// Bias current of maximum gain (A)
    pub optimal_bias: f64,
    /// Pump power of maximum gain (dBm)
    pub optimal_power: f64,
    /// Width of the gain bump along the bias axis (A)
    pub bias_width: f64,
    /// Width of the gain bump along the power axis (dB)
    pub power_width: f64,
    /// Peak power gain (dB)
    pub peak_gain_db: f64,
    /// Half width of the frequency response around half the pump (Hz)
    pub bandwidth: f64,
    /// Input-referred noise amplitude
    pub input_noise: f64,
    /// Noise amplitude added after the amplifier
    pub system_noise: f64,
}

impl Default for AmplifierModel {
    fn default() -> Self {
        Self {
            optimal_bias: 0.42e-3,
            optimal_power: -1.3,
            bias_width: 0.2e-3,
            power_width: 2.0,
            peak_gain_db: 20.0,
            bandwidth: 2e9,
            input_noise: 0.01,
            system_noise: 0.05,
        }
    }
}

impl AmplifierModel {
    /// Amplitude gain at signal frequency `f`. Unity with bias or pump off.
    pub fn gain(&self, bias: f64, power: f64, pump_frequency: f64, f: f64) -> f64 {
        let peak = db_to_amplitude(self.peak_gain_db);
        let u = (bias - self.optimal_bias) / self.bias_width;
        let v = (power - self.optimal_power) / self.power_width;
        let w = (f - pump_frequency / 2.0) / self.bandwidth;
        1.0 + (peak - 1.0) * (-u * u - v * v).exp() / (1.0 + w * w)
    }

    /// Noise standard deviation of the real part at amplitude gain `g`.
    pub fn noise(&self, g: f64) -> f64 {
        g * self.input_noise + self.system_noise
    }

    /// SNR gain in dB at amplitude gain `g`.
    pub fn snr_gain_db(&self, g: f64) -> f64 {
        let ratio = g * self.noise(1.0) / self.noise(g);
        20.0 * ratio.log10()
    }
}

#[derive(Debug, Clone)]
struct RigState {
    model: AmplifierModel,
    bias_current: f64,
    bias_on: bool,
    pump_power: f64,
    pump_frequency: f64,
    pump_on: bool,
    mode: SweepMode,
    center: f64,
    span: f64,
    cw_frequency: f64,
    points: usize,
    armed: bool,
    sweep_time: Duration,
    reads: usize,
}

impl RigState {
    fn frequencies(&self) -> Array1<f64> {
        match self.mode {
            SweepMode::Linear if self.points > 1 => Array1::linspace(
                self.center - self.span / 2.0,
                self.center + self.span / 2.0,
                self.points,
            ),
            SweepMode::Linear => Array1::from_elem(self.points, self.center),
            SweepMode::ContinuousWave => Array1::from_elem(self.points, self.cw_frequency),
        }
    }

    fn gain_at(&self, f: f64) -> f64 {
        if self.bias_on && self.pump_on {
            self.model
                .gain(self.bias_current, self.pump_power, self.pump_frequency, f)
        } else {
            1.0
        }
    }

    fn trace(&self) -> Array1<Complex64> {
        match self.mode {
            SweepMode::Linear => self.frequencies().mapv(|f| ripple(f) * self.gain_at(f)),
            SweepMode::ContinuousWave => {
                let f = self.cw_frequency;
                let g = self.gain_at(f);
                let signal = ripple(f) * g;
                let amplitude = self.model.noise(g) * SQRT_2;
                let n = self.points as f64;
                Array1::from_shape_fn(self.points, |k| {
                    signal + amplitude * (2.0 * PI * k as f64 / n).sin()
                })
            }
        }
    }
}

/// Shared state of the simulated rig.
///
/// Clones share the same state, so tests can inspect the instruments after
/// handing them to a tuner.
#[derive(Debug, Clone)]
pub struct SimulatedRig {
    state: Arc<Mutex<RigState>>,
}

impl SimulatedRig {
    /// Rig around `model` with the analyzer disarmed and all outputs off.
    pub fn new(model: AmplifierModel) -> Self {
        Self {
            state: Arc::new(Mutex::new(RigState {
                model,
                bias_current: 0.0,
                bias_on: false,
                pump_power: -20.0,
                pump_frequency: 13e9,
                pump_on: false,
                mode: SweepMode::Linear,
                center: 6.5e9,
                span: 600e6,
                cw_frequency: 6.5e9,
                points: 201,
                armed: false,
                sweep_time: Duration::ZERO,
                reads: 0,
            })),
        }
    }

    /// Simulated duration of one sweep.
    pub fn with_sweep_time(self, sweep_time: Duration) -> Self {
        self.set_sweep_time(sweep_time);
        self
    }

    /// Changes the sweep duration of every instrument sharing this rig.
    pub fn set_sweep_time(&self, sweep_time: Duration) {
        self.lock().sweep_time = sweep_time;
    }

    fn lock(&self) -> MutexGuard<'_, RigState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The amplifier model.
    pub fn model(&self) -> AmplifierModel {
        self.lock().model
    }

    /// Traces read so far.
    pub fn reads(&self) -> usize {
        self.lock().reads
    }

    /// Applied (bias current, pump power, pump frequency).
    pub fn settings(&self) -> (f64, f64, f64) {
        let s = self.lock();
        (s.bias_current, s.pump_power, s.pump_frequency)
    }

    /// Analyzer (centre, span, points).
    pub fn analyzer_setup(&self) -> (f64, f64, usize) {
        let s = self.lock();
        (s.center, s.span, s.points)
    }

    /// The three instruments, sharing this rig's state.
    pub fn instruments(&self) -> Instruments {
        Instruments::new(
            SimulatedBias { rig: self.clone() },
            SimulatedPump { rig: self.clone() },
            SimulatedAnalyzer { rig: self.clone() },
        )
    }
}

/// Simulated current source.
#[derive(Debug, Clone)]
pub struct SimulatedBias {
    rig: SimulatedRig,
}

impl BiasSource for SimulatedBias {
    fn set_current(&mut self, amps: f64) -> InstrumentResult<f64> {
        if !amps.is_finite() {
            return Err(InstrumentError::InvalidSetting {
                instrument: "sim-bias".to_string(),
                setting: "current".to_string(),
                value: amps,
            });
        }
        self.rig.lock().bias_current = amps;
        Ok(amps)
    }

    fn set_output(&mut self, on: bool) -> InstrumentResult<()> {
        self.rig.lock().bias_on = on;
        Ok(())
    }
}

/// Simulated pump generator.
#[derive(Debug, Clone)]
pub struct SimulatedPump {
    rig: SimulatedRig,
}

impl PumpSource for SimulatedPump {
    fn set_power(&mut self, dbm: f64) -> InstrumentResult<f64> {
        self.rig.lock().pump_power = dbm;
        Ok(dbm)
    }

    fn set_frequency(&mut self, hz: f64) -> InstrumentResult<f64> {
        if hz <= 0.0 {
            return Err(InstrumentError::InvalidSetting {
                instrument: "sim-pump".to_string(),
                setting: "frequency".to_string(),
                value: hz,
            });
        }
        self.rig.lock().pump_frequency = hz;
        Ok(hz)
    }

    fn set_output(&mut self, on: bool) -> InstrumentResult<()> {
        self.rig.lock().pump_on = on;
        Ok(())
    }
}

/// Simulated network analyzer.
#[derive(Debug, Clone)]
pub struct SimulatedAnalyzer {
    rig: SimulatedRig,
}

impl NetworkAnalyzer for SimulatedAnalyzer {
    fn set_sweep_mode(&mut self, mode: SweepMode) -> InstrumentResult<()> {
        self.rig.lock().mode = mode;
        Ok(())
    }

    fn set_center_span(&mut self, center: f64, span: f64) -> InstrumentResult<()> {
        let mut s = self.rig.lock();
        s.center = center;
        s.span = span;
        Ok(())
    }

    fn center_span(&mut self) -> InstrumentResult<(f64, f64)> {
        let s = self.rig.lock();
        Ok((s.center, s.span))
    }

    fn set_single_frequency(&mut self, hz: f64) -> InstrumentResult<()> {
        self.rig.lock().cw_frequency = hz;
        Ok(())
    }

    fn set_points(&mut self, points: usize) -> InstrumentResult<()> {
        if points < 2 {
            return Err(InstrumentError::InvalidSetting {
                instrument: "sim-vna".to_string(),
                setting: "points".to_string(),
                value: points as f64,
            });
        }
        self.rig.lock().points = points;
        Ok(())
    }

    fn set_if_bandwidth(&mut self, _hz: f64) -> InstrumentResult<()> {
        Ok(())
    }

    fn set_power(&mut self, _dbm: f64) -> InstrumentResult<()> {
        Ok(())
    }

    fn set_output(&mut self, _on: bool) -> InstrumentResult<()> {
        Ok(())
    }

    fn arm_sweep(&mut self) -> InstrumentResult<()> {
        self.rig.lock().armed = true;
        Ok(())
    }

    fn read_trace(&mut self, token: &CancellationToken) -> InstrumentResult<Array1<Complex64>> {
        let sweep_time = {
            let s = self.rig.lock();
            if !s.armed {
                return Err(InstrumentError::Timeout {
                    instrument: "sim-vna".to_string(),
                    timeout_ms: 0,
                });
            }
            s.sweep_time
        };
        if !sweep_time.is_zero() {
            thread::sleep(sweep_time);
        }
        if token.is_cancelled() {
            return Ok(Array1::zeros(0));
        }
        let mut s = self.rig.lock();
        s.reads += 1;
        Ok(s.trace())
    }

    fn abort_sweep(&mut self) -> InstrumentResult<()> {
        self.rig.lock().armed = false;
        Ok(())
    }

    fn frequency_points(&mut self) -> InstrumentResult<Array1<f64>> {
        Ok(self.rig.lock().frequencies())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::snr;
    use approx::assert_relative_eq;

    #[test]
    fn test_peak_gain_at_optimum() {
        let m = AmplifierModel::default();
        let g = m.gain(m.optimal_bias, m.optimal_power, 13e9, 6.5e9);
        assert_relative_eq!(g, 10.0, epsilon = 1e-12);
        assert!(m.gain(0.0, -5.0, 13e9, 6.5e9) < g);
    }

    #[test]
    fn test_ripple_never_vanishes() {
        for k in 0..1000 {
            let f = 6e9 + k as f64 * 1e6;
            assert!(ripple(f).norm() > 1e-3);
        }
    }

    #[test]
    fn test_read_requires_arming() {
        let rig = SimulatedRig::new(AmplifierModel::default());
        let mut ins = rig.instruments();
        let token = CancellationToken::new();
        assert!(matches!(
            ins.analyzer.read_trace(&token),
            Err(InstrumentError::Timeout { .. })
        ));
        ins.analyzer.arm_sweep().unwrap();
        assert_eq!(ins.analyzer.read_trace(&token).unwrap().len(), 201);
        token.cancel();
        assert!(ins.analyzer.read_trace(&token).unwrap().is_empty());
        assert!(token.is_cancelled());
        assert_eq!(rig.reads(), 1);
    }

    #[test]
    fn test_cw_snr_gain_matches_model() {
        let rig = SimulatedRig::new(AmplifierModel::default());
        let m = rig.model();
        let mut ins = rig.instruments();
        let token = CancellationToken::new();
        ins.analyzer.arm_sweep().unwrap();
        ins.analyzer.set_sweep_mode(SweepMode::ContinuousWave).unwrap();
        ins.analyzer.set_single_frequency(6.502e9).unwrap();
        let off = snr(ins.analyzer.read_trace(&token).unwrap().view());

        ins.bias.set_current(m.optimal_bias).unwrap();
        ins.bias.set_output(true).unwrap();
        ins.pump.set_power(m.optimal_power).unwrap();
        ins.pump.set_frequency(13e9).unwrap();
        ins.pump.set_output(true).unwrap();
        let on = snr(ins.analyzer.read_trace(&token).unwrap().view());

        let g = m.gain(m.optimal_bias, m.optimal_power, 13e9, 6.502e9);
        assert_relative_eq!(20.0 * (on / off).log10(), m.snr_gain_db(g), epsilon = 1e-9);
    }
}
