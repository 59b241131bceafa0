//! Error types for instrument access and tuning runs.

use impa_differential_evolution::DEError;
use thiserror::Error;

/// Failure reported by an instrument collaborator.
///
/// The tuner never retries: a fault ends the current search and is handed to
/// the caller, which decides whether the channel is still usable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InstrumentError {
    /// The instrument answered with garbage or the transport failed.
    #[error("{instrument}: communication failed: {message}")]
    Communication {
        /// Instrument name
        instrument: String,
        /// Transport or parser message
        message: String,
    },

    /// A bounded wait (trigger, sweep completion) expired.
    #[error("{instrument}: timed out after {timeout_ms} ms")]
    Timeout {
        /// Instrument name
        instrument: String,
        /// Length of the wait that expired
        timeout_ms: u64,
    },

    /// The instrument is no longer reachable.
    #[error("{instrument}: disconnected")]
    Disconnected {
        /// Instrument name
        instrument: String,
    },

    /// A setting was refused by the instrument.
    #[error("{instrument}: invalid {setting} = {value}")]
    InvalidSetting {
        /// Instrument name
        instrument: String,
        /// Name of the refused setting
        setting: String,
        /// The refused value
        value: f64,
    },
}

/// Errors of a tuning session.
#[derive(Debug, Error)]
pub enum TuningError {
    /// The optimizer could not be built from the tuning parameters.
    #[error(transparent)]
    Solver(#[from] DEError),

    /// An instrument failed while the session was driving it.
    #[error(transparent)]
    Instrument(#[from] InstrumentError),

    /// The unpumped reference sweep returned no points.
    #[error("reference trace is empty")]
    EmptyReference,

    /// A trace does not line up with the reference it is compared to.
    #[error("trace has {got} points, reference has {expected}")]
    TraceLength {
        /// Reference length
        expected: usize,
        /// Length of the offending trace
        got: usize,
    },

    /// A sweep was started without target frequencies.
    #[error("no target frequencies to tune")]
    NoTargets,

    /// The receiving end of the event channel went away.
    #[error("sweep event channel closed")]
    WorkerDisconnected,

    /// The sweep thread panicked.
    #[error("sweep worker panicked")]
    WorkerPanicked,

    /// Reading or writing a parameter or table file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A parameter file is not valid JSON for [`crate::TuningParameters`].
    #[error("invalid parameter file: {0}")]
    Json(#[from] serde_json::Error),

    /// A tuning table line could not be parsed.
    #[error("invalid tuning table line {line}: {message}")]
    TableFormat {
        /// One-based line number
        line: usize,
        /// What was wrong with it
        message: String,
    },
}

/// Result type for tuning operations.
pub type Result<T> = std::result::Result<T, TuningError>;

impl TuningError {
    /// Whether the error came from an instrument collaborator.
    pub fn is_instrument_error(&self) -> bool {
        matches!(self, TuningError::Instrument(_))
    }

    /// Whether the error is a configuration problem the caller must fix.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            TuningError::Solver(_) | TuningError::NoTargets | TuningError::Json(_)
        )
    }
}
