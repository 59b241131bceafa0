//! Instrument collaborators driven by the tuner.
//!
//! Only the operations the tuning loop needs are modelled: protocol encoding
//! lives in the driver implementing these traits. Every setter returns the
//! value the instrument actually applied, which may be rounded.

use impa_differential_evolution::CancellationToken;
use ndarray::Array1;
use num_complex::Complex64;

use crate::error::InstrumentError;

/// Result type of instrument operations.
pub type InstrumentResult<T> = std::result::Result<T, InstrumentError>;

/// DC current source biasing the amplifier.
pub trait BiasSource: Send {
    /// Sets the output current (A).
    fn set_current(&mut self, amps: f64) -> InstrumentResult<f64>;
    /// Switches the output on or off.
    fn set_output(&mut self, on: bool) -> InstrumentResult<()>;
}

/// Microwave generator providing the pump tone.
pub trait PumpSource: Send {
    /// Sets the pump power (dBm).
    fn set_power(&mut self, dbm: f64) -> InstrumentResult<f64>;
    /// Sets the pump frequency (Hz).
    fn set_frequency(&mut self, hz: f64) -> InstrumentResult<f64>;
    /// Switches the RF output on or off.
    fn set_output(&mut self, on: bool) -> InstrumentResult<()>;
}

/// Sweep type of the network analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SweepMode {
    /// Linear frequency sweep over centre and span.
    #[default]
    Linear,
    /// Repeated measurement at a single frequency.
    ContinuousWave,
}

/// Vector network analyzer measuring the transmission through the amplifier.
pub trait NetworkAnalyzer: Send {
    /// Selects linear or CW sweeps.
    fn set_sweep_mode(&mut self, mode: SweepMode) -> InstrumentResult<()>;
    /// Sets centre frequency and span of linear sweeps (Hz).
    fn set_center_span(&mut self, center: f64, span: f64) -> InstrumentResult<()>;
    /// Current centre frequency and span (Hz).
    fn center_span(&mut self) -> InstrumentResult<(f64, f64)>;
    /// Sets the CW frequency (Hz).
    fn set_single_frequency(&mut self, hz: f64) -> InstrumentResult<()>;
    /// Sets the number of points per sweep.
    fn set_points(&mut self, points: usize) -> InstrumentResult<()>;
    /// Sets the IF bandwidth (Hz).
    fn set_if_bandwidth(&mut self, hz: f64) -> InstrumentResult<()>;
    /// Sets the probe power (dBm).
    fn set_power(&mut self, dbm: f64) -> InstrumentResult<()>;
    /// Switches the probe output on or off.
    fn set_output(&mut self, on: bool) -> InstrumentResult<()>;
    /// Starts continuous triggering.
    fn arm_sweep(&mut self) -> InstrumentResult<()>;
    /// Blocks until one sweep completes and returns it.
    ///
    /// Returns an empty trace when `token` is raised while waiting. The
    /// token is observed, not consumed.
    fn read_trace(&mut self, token: &CancellationToken) -> InstrumentResult<Array1<Complex64>>;
    /// Stops triggering.
    fn abort_sweep(&mut self) -> InstrumentResult<()>;
    /// Stimulus frequencies of the most recent trace (Hz).
    fn frequency_points(&mut self) -> InstrumentResult<Array1<f64>>;
}

/// Linear sweep setup pushed to the analyzer before a measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepSettings {
    /// Centre frequency (Hz)
    pub center: f64,
    /// Span (Hz)
    pub span: f64,
    /// Points per sweep
    pub points: usize,
    /// IF bandwidth (Hz)
    pub if_bandwidth: f64,
    /// Probe power (dBm)
    pub power: f64,
}

impl SweepSettings {
    /// Puts the analyzer in linear mode with these settings.
    pub fn apply(&self, analyzer: &mut dyn NetworkAnalyzer) -> InstrumentResult<()> {
        analyzer.set_sweep_mode(SweepMode::Linear)?;
        analyzer.set_points(self.points)?;
        analyzer.set_center_span(self.center, self.span)?;
        analyzer.set_if_bandwidth(self.if_bandwidth)?;
        analyzer.set_power(self.power)
    }
}

/// The instrument group owned by one tuning session.
pub struct Instruments {
    /// Bias current source
    pub bias: Box<dyn BiasSource>,
    /// Pump generator
    pub pump: Box<dyn PumpSource>,
    /// Network analyzer
    pub analyzer: Box<dyn NetworkAnalyzer>,
}

impl Instruments {
    /// Groups three collaborators.
    pub fn new(
        bias: impl BiasSource + 'static,
        pump: impl PumpSource + 'static,
        analyzer: impl NetworkAnalyzer + 'static,
    ) -> Self {
        Self {
            bias: Box::new(bias),
            pump: Box::new(pump),
            analyzer: Box::new(analyzer),
        }
    }
}

impl std::fmt::Debug for Instruments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instruments").finish_non_exhaustive()
    }
}
