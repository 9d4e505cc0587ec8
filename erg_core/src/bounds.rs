//! Actuator travel limits derived from the learned table.
//!
//! Run every `bounds_every_cycles` cycles, not every cycle. With direct
//! resistance feedback the limits are simply the wide default travel.

use erg_traits::Actuator;

use crate::config::{ErgCfg, ResistanceCfg};
use crate::error::Result;
use crate::hw_error::actuator_report;
use crate::measurement::TrainerState;
use crate::table::PowerPositionTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundsSource {
    /// Trainer reports resistance; default travel applied.
    ResistanceFeedback,
    /// Estimated from table lookups at the reference cadence.
    Table,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundsUpdate {
    pub min: i32,
    pub max: i32,
    pub source: BoundsSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TravelBounds {
    pub min: i32,
    pub max: i32,
}

impl TravelBounds {
    pub fn new(default_travel: i32) -> Self {
        Self {
            min: default_travel.saturating_neg(),
            max: default_travel,
        }
    }

    /// Recompute and push the limits to the actuator.
    ///
    /// The min bound never lands at or above the current position while the
    /// rider is above min watts (kept one shift step below), and never above
    /// the max bound (two shift steps below). The max bound mirrors this.
    pub fn refresh<A: Actuator>(
        &mut self,
        table: &PowerPositionTable,
        state: &TrainerState,
        erg: &ErgCfg,
        resistance: &ResistanceCfg,
        actuator: &mut A,
    ) -> Result<BoundsUpdate> {
        if state.resistance.value() > 0 {
            *self = Self::new(resistance.default_travel);
            actuator
                .set_travel_limits(self.min, self.max)
                .map_err(actuator_report)?;
            tracing::debug!(target: "erg", min = self.min, max = self.max, "resistance travel limits");
            return Ok(BoundsUpdate {
                min: self.min,
                max: self.max,
                source: BoundsSource::ResistanceFeedback,
            });
        }

        let current = actuator.current_position().map_err(actuator_report)?;
        let watts = state.power.value();
        let shift = erg.shift_step;

        if erg.min_watts > 1 {
            if let Some(mut v) = table.lookup(erg.min_watts, erg.reference_cadence) {
                if v >= current && watts > erg.min_watts {
                    v = current.saturating_sub(shift);
                    tracing::debug!(target: "erg", min = v, "min position too close to current");
                }
                if v >= self.max {
                    v = current.saturating_sub(shift.saturating_mul(2));
                    tracing::debug!(target: "erg", min = v, "min position above max");
                }
                self.min = v;
            }
        }

        if erg.max_watts > 1 {
            if let Some(mut v) = table.lookup(erg.max_watts, erg.reference_cadence) {
                if v <= current && watts < erg.max_watts {
                    v = current.saturating_add(shift);
                    tracing::debug!(target: "erg", max = v, "max position too close to current");
                }
                if v <= self.min {
                    v = current.saturating_add(shift.saturating_mul(2));
                    tracing::debug!(target: "erg", max = v, "max position below min");
                }
                self.max = v;
            }
        }

        actuator
            .set_travel_limits(self.min, self.max)
            .map_err(actuator_report)?;
        tracing::info!(target: "erg", min = self.min, max = self.max, "travel limits set");
        Ok(BoundsUpdate {
            min: self.min,
            max: self.max,
            source: BoundsSource::Table,
        })
    }
}
