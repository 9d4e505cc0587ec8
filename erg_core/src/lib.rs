#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Smart-trainer ERG control core (hardware-agnostic).
//!
//! The core learns which brake position produces which power at which
//! cadence, and uses that knowledge to jump straight to a new power target
//! instead of hunting for it. All hardware goes through the
//! `erg_traits::Actuator` and `erg_traits::Storage` traits.
//!
//! ## Architecture
//!
//! - **Measurements**: shared trainer channels and control mode (`measurement`)
//! - **Debounce**: consecutive-sample buffer (`sample_buffer`)
//! - **Learning**: cadence x watts grid with vetoed insert, completion and
//!   lookup (`table`)
//! - **Persistence**: table file codec and reliability merge (`table::persist`)
//! - **Control**: power-target and resistance-target steps (`erg`), travel
//!   limits (`bounds`)
//! - **Loop**: the periodic control task and bounded actuator wait (`runner`)
//!
//! ## Units
//!
//! Table cells hold actuator positions divided by `TableCfg::position_scale`
//! in an `i16`. Everything crossing the public API (lookups, targets,
//! travel limits) is in full actuator units.

pub mod atomic;
pub mod bounds;
pub mod config;
pub mod conversions;
pub mod erg;
pub mod error;
pub mod hw_error;
pub mod measurement;
pub mod mocks;
pub mod notify;
pub mod runner;
pub mod sample_buffer;
pub mod storage;
pub mod table;
pub mod util;

pub use bounds::{BoundsSource, BoundsUpdate, TravelBounds};
pub use config::{ErgCfg, ResistanceCfg, TableCfg, TimingCfg};
pub use erg::{ErgController, ErgOutcome, ResistanceOutcome, SkipReason, TargetSource};
pub use error::{BuildError, ErgError, PersistError, Result};
pub use measurement::{ControlMode, Measurement, MeasurementCell, TrainerState};
pub use runner::{
    Arrival, ControlTask, ControlTaskBuilder, CycleReport, RunSummary, wait_for_arrival,
};
pub use sample_buffer::{BufferEvent, Sample, SampleBuffer};
pub use table::persist::{LoadOutcome, SavedTable, TableStore};
pub use table::{ImportSummary, InsertOutcome, PowerPositionTable, TableCell};
