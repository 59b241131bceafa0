//! Operating point search for impedance-matched parametric amplifiers (IMPA).
//!
//! An [`IMPATuner`] drives a bias current source, a pump generator and a
//! network analyzer, and searches bias current and pump power (optionally
//! the signal frequency) with differential evolution until the measured gain
//! profile matches a target gain over a target bandwidth. Every cost
//! evaluation is a live measurement, so searches are interruptible between
//! any two traces through a shared [`CancellationToken`].
//!
//! # Example
//!
//! ```rust
//! use impa_tuning::{IMPATuner, TuningParameters};
//! use impa_tuning::simulated::{AmplifierModel, SimulatedRig};
//!
//! let rig = SimulatedRig::new(AmplifierModel::default());
//! let mut params = TuningParameters::default();
//! params.search.popsize = 8;
//! params.search.maxiter = 30;
//! params.search.seed = Some(1);
//!
//! let mut tuner = IMPATuner::new(rig.instruments(), params);
//! let search = tuner.find_gain(6.5e9).expect("simulated instruments do not fail");
//! let point = search.point.expect("not aborted");
//! assert!(point.gain_db > 10.0);
//! ```
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod error;
pub use error::{InstrumentError, Result, TuningError};

/// Score of a candidate from live gain and SNR measurements.
pub mod cost;
/// Bias source, pump generator and network analyzer traits.
pub mod instruments;
/// Operating points and tuning tables.
pub mod operating_point;
/// Tuning parameters and optimizer settings.
pub mod params;
/// The tuning session.
pub mod session;
/// Deterministic simulated instruments.
pub mod simulated;
/// Verification snapshots.
pub mod snapshot;
/// Multi-frequency sweep on a worker thread.
pub mod worker;

pub use cost::{AmplifierCost, Reference, amplifier_cost, snr};
pub use impa_differential_evolution::{CancellationToken, Evaluation};
pub use instruments::{BiasSource, Instruments, NetworkAnalyzer, PumpSource, SweepMode, SweepSettings};
pub use operating_point::{OperatingPoint, TABLE_HEADER, TuningTable};
pub use params::{SearchSettings, TuningParameters};
pub use session::{GainSearch, IMPATuner};
pub use snapshot::{SnapshotSettings, SnrSnapshot, VnaSnapshot};
pub use worker::{SweepHandle, TuningEvent, Verification, run_sweep, spawn_sweep};
