//! Verification measurements of a tuned operating point.

use ndarray::{Array1, Array2, Axis, Zip};
use num_complex::Complex64;

/// Overrides for the analyzer setup of a snapshot. `None` fields fall back
/// to the session parameters: twice the target bandwidth, twice the search
/// points, the search probe power, and an IF bandwidth chosen per snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SnapshotSettings {
    /// Span (Hz)
    pub span: Option<f64>,
    /// Points per sweep
    pub points: Option<usize>,
    /// Probe power (dBm)
    pub power: Option<f64>,
    /// IF bandwidth (Hz)
    pub if_bandwidth: Option<f64>,
}

/// Pump-on and pump-off transmission around an operating point.
#[derive(Debug, Clone, PartialEq)]
pub struct VnaSnapshot {
    /// Trace with the pump on
    pub pump_on: Array1<Complex64>,
    /// Trace with the pump off
    pub pump_off: Array1<Complex64>,
    /// Stimulus frequencies (Hz)
    pub frequencies: Array1<f64>,
}

impl VnaSnapshot {
    /// Power gain per point (dB).
    pub fn gain_db(&self) -> Array1<f64> {
        Zip::from(&self.pump_on)
            .and(&self.pump_off)
            .map_collect(|on, off| 20.0 * (on / off).norm().log10())
    }
}

/// Repeated pump-off then pump-on sweeps, one row per sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct SnrSnapshot {
    /// Sweeps with the pump on
    pub pump_on: Array2<Complex64>,
    /// Sweeps with the pump off
    pub pump_off: Array2<Complex64>,
    /// Stimulus frequencies (Hz)
    pub frequencies: Array1<f64>,
}

fn column_mean(traces: &Array2<Complex64>) -> Array1<Complex64> {
    let n = traces.nrows() as f64;
    traces.sum_axis(Axis(0)).mapv(|c| c / n)
}

fn column_snr(traces: &Array2<Complex64>) -> Array1<f64> {
    let mean = column_mean(traces);
    let std = traces.mapv(|c| c.re).std_axis(Axis(0), 0.0);
    Zip::from(&mean).and(&std).map_collect(|m, s| m.norm() / s)
}

impl SnrSnapshot {
    /// Average pump-on trace.
    pub fn mean_pump_on(&self) -> Array1<Complex64> {
        column_mean(&self.pump_on)
    }

    /// Average pump-off trace.
    pub fn mean_pump_off(&self) -> Array1<Complex64> {
        column_mean(&self.pump_off)
    }

    /// SNR improvement per frequency: pump-on SNR over pump-off SNR.
    pub fn snr_gain_spectrum(&self) -> Array1<f64> {
        column_snr(&self.pump_on) / column_snr(&self.pump_off)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_gain_db() {
        let snap = VnaSnapshot {
            pump_on: array![Complex64::new(10.0, 0.0), Complex64::new(0.0, 1.0)],
            pump_off: array![Complex64::new(1.0, 0.0), Complex64::new(1.0, 0.0)],
            frequencies: array![1.0, 2.0],
        };
        let g = snap.gain_db();
        assert_relative_eq!(g[0], 20.0);
        assert_relative_eq!(g[1], 0.0);
    }

    #[test]
    fn test_snr_gain_spectrum() {
        // column 0: mean 1, noise std 1 off; mean 4, noise std 2 on -> 2x
        let off = array![
            [Complex64::new(0.0, 0.0), Complex64::new(3.0, 0.0)],
            [Complex64::new(2.0, 0.0), Complex64::new(5.0, 0.0)],
        ];
        let on = array![
            [Complex64::new(2.0, 0.0), Complex64::new(3.0, 0.0)],
            [Complex64::new(6.0, 0.0), Complex64::new(5.0, 0.0)],
        ];
        let snap = SnrSnapshot {
            pump_on: on,
            pump_off: off,
            frequencies: array![1.0, 2.0],
        };
        let spectrum = snap.snr_gain_spectrum();
        assert_relative_eq!(spectrum[0], 2.0);
        assert_relative_eq!(spectrum[1], 1.0);
        assert_relative_eq!(snap.mean_pump_on()[0].re, 4.0);
    }
}
