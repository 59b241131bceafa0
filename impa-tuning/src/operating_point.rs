//! Operating points and tuning tables.
//!
//! A table is written as one header line followed by one tab separated line
//! per point:
//!
//! ```text
//! #Fs,Hz		Fp,Hz		Pp,dBm	I,A		G,dB	Gsnr,dB
//! 6.500000e9	1.300000e10	-1.30	4.200000e-4	20.00	12.04
//! ```

use std::fmt;
use std::io::{BufRead, Write};
use std::ops::Index;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TuningError};

/// Header line of a tuning table.
pub const TABLE_HEADER: &str = "#Fs,Hz\t\tFp,Hz\t\tPp,dBm\tI,A\t\tG,dB\tGsnr,dB";

/// Working configuration of the amplifier for one signal frequency.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OperatingPoint {
    /// Signal frequency Fs (Hz)
    pub signal_frequency: f64,
    /// Pump frequency Fp (Hz)
    pub pump_frequency: f64,
    /// Pump power Pp (dBm)
    pub pump_power: f64,
    /// Bias current I (A)
    pub bias_current: f64,
    /// Gain G at the signal frequency (dB)
    pub gain_db: f64,
    /// SNR gain Gsnr (dB)
    pub snr_gain_db: f64,
}

impl OperatingPoint {
    /// Multi-line human readable description.
    pub fn describe(&self) -> String {
        format!(
            "Fs = {:.6e} Hz\nFp = {:.6e} Hz\nPp = {:.3} dBm\nI = {:.6e} A\nG = {:.2} dB\nGsnr = {:.2} dB",
            self.signal_frequency,
            self.pump_frequency,
            self.pump_power,
            self.bias_current,
            self.gain_db,
            self.snr_gain_db
        )
    }
}

impl fmt::Display for OperatingPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.6e}\t{:.6e}\t{:.2}\t{:.6e}\t{:.2}\t{:.2}",
            self.signal_frequency,
            self.pump_frequency,
            self.pump_power,
            self.bias_current,
            self.gain_db,
            self.snr_gain_db
        )
    }
}

impl FromStr for OperatingPoint {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let values = s
            .split_whitespace()
            .map(|v| v.parse::<f64>().map_err(|e| format!("'{v}': {e}")))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if values.len() != 6 {
            return Err(format!("expected 6 columns, found {}", values.len()));
        }
        Ok(Self {
            signal_frequency: values[0],
            pump_frequency: values[1],
            pump_power: values[2],
            bias_current: values[3],
            gain_db: values[4],
            snr_gain_db: values[5],
        })
    }
}

/// Ordered operating points, one per tuned signal frequency.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TuningTable {
    points: Vec<OperatingPoint>,
}

impl TuningTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a point.
    pub fn push(&mut self, point: OperatingPoint) {
        self.points.push(point);
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the table has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Point `i`, if present.
    pub fn get(&self, i: usize) -> Option<&OperatingPoint> {
        self.points.get(i)
    }

    /// Last point added.
    pub fn last(&self) -> Option<&OperatingPoint> {
        self.points.last()
    }

    /// Points in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, OperatingPoint> {
        self.points.iter()
    }

    /// The point whose signal frequency is closest to `frequency`.
    pub fn nearest(&self, frequency: f64) -> Option<&OperatingPoint> {
        self.points.iter().min_by(|a, b| {
            (a.signal_frequency - frequency)
                .abs()
                .total_cmp(&(b.signal_frequency - frequency).abs())
        })
    }

    /// Writes the header and one line per point.
    pub fn write_to<W: Write>(&self, mut out: W) -> Result<()> {
        writeln!(out, "{TABLE_HEADER}")?;
        for point in &self.points {
            writeln!(out, "{point}")?;
        }
        Ok(())
    }

    /// Reads a table written by [`write_to`](Self::write_to). Lines
    /// starting with `#` and blank lines are skipped.
    pub fn read_from<R: BufRead>(input: R) -> Result<Self> {
        let mut table = Self::new();
        for (i, line) in input.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let point = trimmed
                .parse()
                .map_err(|message| TuningError::TableFormat {
                    line: i + 1,
                    message,
                })?;
            table.push(point);
        }
        Ok(table)
    }
}

impl Index<usize> for TuningTable {
    type Output = OperatingPoint;

    fn index(&self, i: usize) -> &OperatingPoint {
        &self.points[i]
    }
}

impl<'a> IntoIterator for &'a TuningTable {
    type Item = &'a OperatingPoint;
    type IntoIter = std::slice::Iter<'a, OperatingPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

impl FromIterator<OperatingPoint> for TuningTable {
    fn from_iter<I: IntoIterator<Item = OperatingPoint>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}
