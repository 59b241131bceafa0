//! Tuning parameters, loadable from JSON.

use std::fs;
use std::path::Path;

use impa_differential_evolution::{DEConfig, DEConfigBuilder, DEError, PolishConfig};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::instruments::SweepSettings;

/// Targets, search box and analyzer setup of a tuning run.
///
/// Every field has a default so a parameter file only needs the values it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningParameters {
    /// Gain to reach over the band (dB)
    pub target_gain_db: f64,
    /// Width of the band the gain is fitted over (Hz)
    pub target_bandwidth: f64,
    /// Signal frequencies to tune, one operating point each (Hz)
    pub target_frequencies: Vec<f64>,
    /// When non-zero, the signal frequency is searched within
    /// `target ± span/2` (Hz)
    pub frequency_span: f64,
    /// Bias current search range (A)
    pub bias_range: (f64, f64),
    /// Pump power search range (dBm)
    pub pump_power_range: (f64, f64),
    /// Weight of the overshoot penalty at the centre frequency
    pub w_cent: f64,
    /// Analyzer points per sweep
    pub analyzer_points: usize,
    /// Analyzer IF bandwidth (Hz)
    pub analyzer_if_bandwidth: f64,
    /// Analyzer probe power (dBm)
    pub analyzer_power: f64,
    /// Offset of the SNR probe from the centre frequency (Hz)
    pub detuning: f64,
    /// Traces per pump state in the SNR snapshot
    pub snr_measurements: usize,
    /// Optimizer settings
    pub search: SearchSettings,
}

impl Default for TuningParameters {
    fn default() -> Self {
        Self {
            target_gain_db: 20.0,
            target_bandwidth: 600e6,
            target_frequencies: vec![6.5e9],
            frequency_span: 0.0,
            bias_range: (0.0, 1e-3),
            pump_power_range: (-5.0, 2.0),
            w_cent: 0.5,
            analyzer_points: 350,
            analyzer_if_bandwidth: 5e3,
            analyzer_power: -30.0,
            detuning: 2e6,
            snr_measurements: 100,
            search: SearchSettings::default(),
        }
    }
}

impl TuningParameters {
    /// Load parameters from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Save parameters to a JSON file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Search box for `target_frequency`: bias, pump power and, with a
    /// non-zero span, the signal frequency.
    pub fn bounds(&self, target_frequency: f64) -> Vec<(f64, f64)> {
        let mut bounds = vec![self.bias_range, self.pump_power_range];
        if self.frequency_span != 0.0 {
            let half = self.frequency_span / 2.0;
            bounds.push((target_frequency - half, target_frequency + half));
        }
        bounds
    }

    /// Analyzer setup used during the search.
    pub fn search_sweep(&self, center: f64) -> SweepSettings {
        SweepSettings {
            center,
            span: self.target_bandwidth,
            points: self.analyzer_points,
            if_bandwidth: self.analyzer_if_bandwidth,
            power: self.analyzer_power,
        }
    }
}

/// Optimizer settings of the gain search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Population multiplier
    pub popsize: usize,
    /// Culling floor multiplier
    pub minpopsize: usize,
    /// Energy above which members are culled
    pub threshold: f64,
    /// Relative convergence and stall tolerance
    pub tol: f64,
    /// Stop once the energy spread falls below this value
    pub std_tol: f64,
    /// Generation budget
    pub maxiter: usize,
    /// Generations without improvement before stopping
    pub maxiter_conv: usize,
    /// Strategy name, e.g. `best1bin`
    pub strategy: String,
    /// Seed for reproducible searches
    pub seed: Option<u64>,
    /// Log every generation at info level
    pub disp: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            popsize: 50,
            minpopsize: 5,
            threshold: 150.0,
            tol: 0.06,
            std_tol: 1.0,
            maxiter: 1000,
            maxiter_conv: 20,
            strategy: "best1bin".to_string(),
            seed: None,
            disp: false,
        }
    }
}

impl SearchSettings {
    /// Optimizer configuration. Polishing is off: every extra evaluation is
    /// a hardware measurement.
    pub fn to_config(&self) -> std::result::Result<DEConfig, DEError> {
        let mut builder = DEConfigBuilder::new()
            .popsize(self.popsize)
            .minpopsize(self.minpopsize)
            .threshold(self.threshold)
            .tol(self.tol)
            .std_conv(self.std_tol)
            .maxiter(self.maxiter)
            .maxiter_conv(self.maxiter_conv)
            .strategy(self.strategy.parse()?)
            .disp(self.disp)
            .polish(PolishConfig {
                enabled: false,
                maxeval: None,
            });
        if let Some(seed) = self.seed {
            builder = builder.seed(seed);
        }
        builder.build()
    }
}
