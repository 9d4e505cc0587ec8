//! Power-target (ERG) and resistance-target control.
//!
//! One `ErgController` lives in the control task. Each cycle it compares the
//! live power channel against what it last acted on and decides a new
//! actuator target.
//!
//! - Setpoint changed by more than `setpoint_change_watts`: jump to the
//!   table's estimate (proportional fallback), wait for the brake, settle.
//! - Setpoint steady: proportional correction only.
//! - Rider stopped pedaling: release the brake once and hold off.

use erg_traits::{Actuator, Clock};

use crate::config::{ErgCfg, ResistanceCfg, TimingCfg};
use crate::error::Result;
use crate::hw_error::actuator_report;
use crate::measurement::{Measurement, TrainerState};
use crate::runner::{Arrival, wait_for_arrival};
use crate::table::PowerPositionTable;
use crate::util::round_f32_to_i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Neither a new power reading nor a new target since last cycle.
    Stale,
    /// Power below the plausibility floor; sensor likely dropped out.
    ImplausiblePower,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSource {
    Table,
    Proportional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErgOutcome {
    Skipped(SkipReason),
    /// Cadence at or below the stop threshold. `released` is true only on
    /// the cycle that latched the stop.
    NotSpinning { released: bool },
    SetpointChange {
        target: i32,
        source: TargetSource,
        arrival: Arrival,
    },
    Hold { target: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResistanceOutcome {
    Skipped,
    Adjusted { target: i32, delta: i32 },
}

#[derive(Debug)]
pub struct ErgController {
    cfg: ErgCfg,
    resistance: ResistanceCfg,
    timing: TimingCfg,
    set_point: i32,
    watts: Measurement,
    cadence: i32,
    engine_stopped: bool,
    initialized: bool,
    resistance_seen: u64,
}

impl ErgController {
    pub fn new(cfg: ErgCfg, resistance: ResistanceCfg, timing: TimingCfg) -> Self {
        Self {
            cfg,
            resistance,
            timing,
            set_point: 0,
            watts: Measurement::default(),
            cadence: 0,
            engine_stopped: false,
            initialized: false,
            resistance_seen: 0,
        }
    }

    #[inline]
    pub fn set_point(&self) -> i32 {
        self.set_point
    }

    #[inline]
    pub fn engine_stopped(&self) -> bool {
        self.engine_stopped
    }

    pub fn cfg(&self) -> &ErgCfg {
        &self.cfg
    }

    fn write_log_header(&mut self) {
        if !self.initialized {
            tracing::info!(
                target: "erg_csv",
                "current incline;new incline;current setpoint;new setpoint;current watts;new watts;current cadence;new cadence"
            );
            self.initialized = true;
        }
    }

    /// Deviation-dependent gain: strong when more than 10% off target.
    fn factor(&self, watt_change: i32, target: i32, strong: f32) -> f32 {
        let deviation = if target == 0 {
            0.0
        } else {
            watt_change as f32 * 100.0 / target as f32
        };
        if deviation.abs() > 10.0 {
            strong
        } else {
            self.cfg.sensitivity / 2.0
        }
    }

    /// Returns false (after releasing the brake once) when the rider has stopped.
    fn user_is_spinning<A: Actuator>(
        &mut self,
        cadence: i32,
        actuator: &mut A,
    ) -> Result<(bool, bool)> {
        if cadence <= self.cfg.min_cadence {
            if self.engine_stopped {
                return Ok((false, false));
            }
            let current = actuator.current_position().map_err(actuator_report)?;
            actuator.release_tension().map_err(actuator_report)?;
            actuator
                .set_target_position(current.saturating_sub(self.cfg.stop_retract))
                .map_err(actuator_report)?;
            self.engine_stopped = true;
            tracing::info!(target: "erg", cadence, "rider stopped; brake released");
            return Ok((false, true));
        }
        if self.engine_stopped {
            tracing::info!(target: "erg", cadence, "rider spinning again");
        }
        self.engine_stopped = false;
        Ok((true, false))
    }

    fn update_values(&mut self, current: i32, new_target: i32, watts: Measurement, cadence: i32) {
        tracing::info!(
            target: "erg_csv",
            "{};{};{};{};{};{};{};{}",
            current,
            new_target,
            self.set_point,
            watts.target,
            self.watts.value,
            watts.value,
            self.cadence,
            cadence
        );
        self.watts = watts;
        self.set_point = watts.target;
        self.cadence = cadence;
    }

    /// One power-target control step.
    pub fn compute_erg<A: Actuator, C: Clock>(
        &mut self,
        state: &TrainerState,
        table: &PowerPositionTable,
        actuator: &mut A,
        clock: &C,
    ) -> Result<ErgOutcome> {
        self.write_log_header();
        let mut new_watts = state.power.get();
        let cadence = state.cadence.value();

        if new_watts.target < self.cfg.min_watts {
            tracing::debug!(target: "erg", requested = new_watts.target, min = self.cfg.min_watts, "target below minimum");
            new_watts.target = self.cfg.min_watts;
        }

        if !new_watts.is_newer_than(&self.watts) && self.set_point == new_watts.target {
            tracing::trace!(target: "erg", "watts previously processed");
            return Ok(ErgOutcome::Skipped(SkipReason::Stale));
        }
        if new_watts.value < self.cfg.min_plausible_watts {
            tracing::debug!(target: "erg", watts = new_watts.value, "implausible power reading");
            return Ok(ErgOutcome::Skipped(SkipReason::ImplausiblePower));
        }

        let (spinning, released) = self.user_is_spinning(cadence, actuator)?;
        if !spinning {
            return Ok(ErgOutcome::NotSpinning { released });
        }

        let current = actuator.current_position().map_err(actuator_report)?;
        let watt_change = new_watts.target - new_watts.value;

        if (self.set_point - new_watts.target).abs() > self.cfg.setpoint_change_watts {
            let (target, source) = match table.lookup(new_watts.target, cadence) {
                Some(p) => (p, TargetSource::Table),
                None => {
                    let factor =
                        self.factor(watt_change, new_watts.target, self.cfg.sensitivity * 2.0);
                    let t = round_f32_to_i32(current as f32 + watt_change as f32 * factor);
                    (t, TargetSource::Proportional)
                }
            };
            tracing::info!(
                target: "erg",
                set_point = new_watts.target,
                position = target,
                ?source,
                "setpoint changed"
            );
            actuator
                .set_target_position(target)
                .map_err(actuator_report)?;
            self.update_values(current, target, new_watts, cadence);
            let arrival = wait_for_arrival(
                actuator,
                clock,
                self.timing.actuator_poll(),
                self.timing.actuator_max_polls,
            )?;
            clock.sleep(self.timing.settle());
            return Ok(ErgOutcome::SetpointChange {
                target,
                source,
                arrival,
            });
        }

        let factor = self.factor(watt_change, new_watts.target, self.cfg.sensitivity);
        let target = round_f32_to_i32(current as f32 + watt_change as f32 * factor);
        actuator
            .set_target_position(target)
            .map_err(actuator_report)?;
        self.update_values(current, target, new_watts, cadence);
        Ok(ErgOutcome::Hold { target })
    }

    /// One resistance-target control step.
    pub fn compute_resistance<A: Actuator>(
        &mut self,
        state: &TrainerState,
        actuator: &mut A,
    ) -> Result<ResistanceOutcome> {
        let r = state.resistance.get();
        if r.timestamp == self.resistance_seen {
            tracing::trace!(target: "erg", "resistance previously processed");
            return Ok(ResistanceOutcome::Skipped);
        }
        let delta = r.target.saturating_sub(r.value);
        let target = if delta == 0 {
            actuator.current_position().map_err(actuator_report)?
        } else {
            actuator
                .target_position()
                .saturating_add(self.resistance.gain.saturating_mul(delta))
        };
        actuator
            .set_target_position(target)
            .map_err(actuator_report)?;
        self.resistance_seen = r.timestamp;
        tracing::debug!(target: "erg", delta, position = target, "resistance adjusted");
        Ok(ResistanceOutcome::Adjusted { target, delta })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableCfg;
    use crate::mocks::InstantActuator;
    use erg_traits::clock::test_clock::TestClock;

    fn controller() -> ErgController {
        ErgController::new(
            ErgCfg::default(),
            ResistanceCfg::default(),
            TimingCfg::default(),
        )
    }

    fn ride(state: &TrainerState, watts: i32, target: i32, cadence: i32) {
        state.power.set_target(target);
        state.power.set_value(watts);
        state.cadence.set_value(cadence);
    }

    #[test]
    fn stale_needs_same_tick_and_same_setpoint() {
        let state = TrainerState::new();
        let table = PowerPositionTable::new(TableCfg::default());
        let mut act = InstantActuator::at(0);
        let clock = TestClock::new();
        state.power.set_target(35);

        let mut seen = controller();
        seen.set_point = 35;
        assert_eq!(
            seen.compute_erg(&state, &table, &mut act, &clock).unwrap(),
            ErgOutcome::Skipped(SkipReason::Stale)
        );

        // new setpoint, but the power channel still reads 0 W
        let mut fresh = controller();
        assert_eq!(
            fresh.compute_erg(&state, &table, &mut act, &clock).unwrap(),
            ErgOutcome::Skipped(SkipReason::ImplausiblePower)
        );
    }

    #[test]
    fn extreme_resistance_readings_saturate() {
        let mut erg = controller();
        let state = TrainerState::new();
        state.resistance.set_target(i32::MAX);
        state.resistance.set_value(-10);
        let mut act = InstantActuator::at(0);
        let out = erg.compute_resistance(&state, &mut act).unwrap();
        assert_eq!(
            out,
            ResistanceOutcome::Adjusted {
                target: i32::MAX,
                delta: i32::MAX
            }
        );
        assert_eq!(act.target(), i32::MAX);
    }

    #[test]
    fn low_power_is_skipped() {
        let mut erg = controller();
        let state = TrainerState::new();
        ride(&state, 9, 200, 90);
        let table = PowerPositionTable::new(TableCfg::default());
        let mut act = InstantActuator::at(1000);
        let out = erg
            .compute_erg(&state, &table, &mut act, &TestClock::new())
            .unwrap();
        assert_eq!(out, ErgOutcome::Skipped(SkipReason::ImplausiblePower));
        assert_eq!(act.target(), 1000);
    }

    #[test]
    fn setpoint_change_without_table_uses_doubled_gain() {
        let mut erg = controller();
        let state = TrainerState::new();
        ride(&state, 100, 200, 90);
        let table = PowerPositionTable::new(TableCfg::default());
        let mut act = InstantActuator::at(1000);
        let clock = TestClock::new();
        let out = erg.compute_erg(&state, &table, &mut act, &clock).unwrap();
        // 100 W short, 50% deviation -> factor 10
        assert_eq!(
            out,
            ErgOutcome::SetpointChange {
                target: 2000,
                source: TargetSource::Proportional,
                arrival: Arrival::Reached { polls: 0 },
            }
        );
        assert_eq!(erg.set_point(), 200);
        assert_eq!(clock.elapsed(), TimingCfg::default().settle());
    }

    #[test]
    fn setpoint_change_prefers_table() {
        let mut erg = controller();
        let state = TrainerState::new();
        ride(&state, 100, 150, 90);
        let mut table = PowerPositionTable::new(TableCfg::default());
        table.insert(150.0, 90.0, 500.0);
        let mut act = InstantActuator::at(1000);
        let out = erg
            .compute_erg(&state, &table, &mut act, &TestClock::new())
            .unwrap();
        assert!(matches!(
            out,
            ErgOutcome::SetpointChange { target: 50_000, source: TargetSource::Table, .. }
        ));
        assert_eq!(act.target(), 50_000);
    }

    #[test]
    fn steady_setpoint_uses_small_gain_near_target() {
        let mut erg = controller();
        let state = TrainerState::new();
        let table = PowerPositionTable::new(TableCfg::default());
        let mut act = InstantActuator::at(1000);
        let clock = TestClock::new();
        ride(&state, 200, 200, 90);
        erg.compute_erg(&state, &table, &mut act, &clock).unwrap();
        // 5% short -> sensitivity / 2
        ride(&state, 190, 200, 90);
        let out = erg.compute_erg(&state, &table, &mut act, &clock).unwrap();
        assert_eq!(out, ErgOutcome::Hold { target: 1025 });
        // 25% short -> sensitivity
        ride(&state, 150, 200, 90);
        let out = erg.compute_erg(&state, &table, &mut act, &clock).unwrap();
        assert_eq!(out, ErgOutcome::Hold { target: 1275 });
    }

    #[test]
    fn resistance_adds_gain_times_delta() {
        let mut erg = controller();
        let state = TrainerState::new();
        let mut act = InstantActuator::at(500);
        assert_eq!(
            erg.compute_resistance(&state, &mut act).unwrap(),
            ResistanceOutcome::Skipped
        );
        state.resistance.set_target(30);
        state.resistance.set_value(20);
        assert_eq!(
            erg.compute_resistance(&state, &mut act).unwrap(),
            ResistanceOutcome::Adjusted { target: 1500, delta: 10 }
        );
        assert_eq!(
            erg.compute_resistance(&state, &mut act).unwrap(),
            ResistanceOutcome::Skipped
        );
    }

    #[test]
    fn zero_resistance_delta_pins_to_current_position() {
        let mut erg = controller();
        let state = TrainerState::new();
        let mut act = InstantActuator::at(500).with_lag(3);
        act.set_target_position(9_000).unwrap();
        state.resistance.set_target(20);
        state.resistance.set_value(20);
        let out = erg.compute_resistance(&state, &mut act).unwrap();
        assert_eq!(out, ResistanceOutcome::Adjusted { target: 500, delta: 0 });
    }
}
