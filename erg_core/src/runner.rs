//! The periodic control task and its bounded actuator wait.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use erg_traits::{Actuator, Clock, MonotonicClock, Storage, TableObserver};

use crate::bounds::{BoundsUpdate, TravelBounds};
use crate::config::{ErgCfg, ResistanceCfg, TableCfg, TimingCfg};
use crate::erg::{ErgController, ErgOutcome, ResistanceOutcome};
use crate::error::{BuildError, Result};
use crate::hw_error::actuator_report;
use crate::measurement::{ControlMode, TrainerState};
use crate::sample_buffer::SampleBuffer;
use crate::table::persist::{LoadOutcome, TableStore};
use crate::table::{InsertOutcome, PowerPositionTable};

/// Result of waiting for the actuator to reach its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    Reached { polls: u32 },
    TimedOut { polls: u32 },
}

/// Poll until `current_position == target_position`, sleeping `poll` between
/// reads, at most `max_polls` times. Never blocks longer than that.
pub fn wait_for_arrival<A: Actuator + ?Sized, C: Clock + ?Sized>(
    actuator: &mut A,
    clock: &C,
    poll: Duration,
    max_polls: u32,
) -> Result<Arrival> {
    let target = actuator.target_position();
    let mut polls = 0;
    loop {
        let current = actuator.current_position().map_err(actuator_report)?;
        if current == target {
            return Ok(Arrival::Reached { polls });
        }
        if polls >= max_polls {
            tracing::warn!(target: "erg", target_position = target, current, polls, "actuator did not reach target");
            return Ok(Arrival::TimedOut { polls });
        }
        clock.sleep(poll);
        polls += 1;
    }
}

/// What one control period did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    pub table_reset: bool,
    pub insert: Option<InsertOutcome>,
    pub load: Option<LoadOutcome>,
    pub erg: Option<ErgOutcome>,
    pub resistance: Option<ResistanceOutcome>,
    pub bounds: Option<BoundsUpdate>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub failed_cycles: u64,
}

/// Owns everything the control loop mutates. Measurements arrive through the
/// shared `TrainerState`.
pub struct ControlTask<A: Actuator, S: Storage, C: Clock = MonotonicClock> {
    state: Arc<TrainerState>,
    actuator: A,
    table: PowerPositionTable,
    store: TableStore<S>,
    buffer: SampleBuffer,
    erg: ErgController,
    bounds: TravelBounds,
    erg_cfg: ErgCfg,
    resistance_cfg: ResistanceCfg,
    timing: TimingCfg,
    clock: C,
    epoch: Instant,
    cycles: u64,
    since_bounds: u32,
    last_power_tick: u64,
}

impl<A: Actuator, S: Storage, C: Clock> std::fmt::Debug for ControlTask<A, S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlTask")
            .field("cycles", &self.cycles)
            .field("table", &self.table)
            .field("bounds", &self.bounds)
            .finish()
    }
}

impl<A: Actuator, S: Storage> ControlTask<A, S, MonotonicClock> {
    pub fn builder() -> ControlTaskBuilder<A, S, MonotonicClock> {
        ControlTaskBuilder::default()
    }
}

impl<A: Actuator, S: Storage, C: Clock> ControlTask<A, S, C> {
    pub fn state(&self) -> &Arc<TrainerState> {
        &self.state
    }

    pub fn table(&self) -> &PowerPositionTable {
        &self.table
    }

    /// Direct table access. Only safe while the loop is not running, which
    /// `&mut self` guarantees.
    pub fn table_mut(&mut self) -> &mut PowerPositionTable {
        &mut self.table
    }

    pub fn store(&self) -> &TableStore<S> {
        &self.store
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn controller(&self) -> &ErgController {
        &self.erg
    }

    pub fn bounds(&self) -> TravelBounds {
        self.bounds
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    /// Feed the current reading through the debounce buffer; commit and run
    /// the persistence manager when a run completes.
    fn ingest(&mut self, report: &mut CycleReport) -> Result<()> {
        let power = self.state.power.get();
        if power.timestamp == self.last_power_tick {
            return Ok(());
        }
        self.last_power_tick = power.timestamp;
        let cadence = self.state.cadence.value();
        let position = self
            .actuator
            .current_position()
            .map_err(actuator_report)?;
        let Some(outcome) =
            self.table
                .process_observation(&mut self.buffer, power.value, cadence, position)
        else {
            return Ok(());
        };
        report.insert = Some(outcome);
        let now = self.now_ms();
        match self.store.manage_save_state(&mut self.table, now) {
            Ok(load) => report.load = Some(load),
            Err(e) => tracing::warn!(target: "power_table", error = ?e, "table persistence failed"),
        }
        Ok(())
    }

    /// One control period: reset request, ingestion, dispatch, bounds.
    pub fn cycle(&mut self) -> Result<CycleReport> {
        self.cycles += 1;
        let mut report = CycleReport {
            cycle: self.cycles,
            ..CycleReport::default()
        };

        if self.state.take_table_reset() {
            let now = self.now_ms();
            self.buffer.reset();
            if let Err(e) = self.store.reset(&mut self.table, now) {
                tracing::warn!(target: "power_table", error = ?e, "saving reset table failed");
            }
            report.table_reset = true;
        }

        if let Err(e) = self.ingest(&mut report) {
            tracing::warn!(target: "power_table", error = ?e, "observation skipped");
        }

        match self.state.mode() {
            ControlMode::TargetPower if self.state.power_source_available() => {
                let out = self.erg.compute_erg(
                    &self.state,
                    &self.table,
                    &mut self.actuator,
                    &self.clock,
                )?;
                report.erg = Some(out);
            }
            ControlMode::TargetResistance => {
                let out = self
                    .erg
                    .compute_resistance(&self.state, &mut self.actuator)?;
                report.resistance = Some(out);
            }
            _ => {}
        }

        self.since_bounds += 1;
        if self.since_bounds >= self.timing.bounds_every_cycles.max(1) {
            self.since_bounds = 0;
            let up = self.bounds.refresh(
                &self.table,
                &self.state,
                &self.erg_cfg,
                &self.resistance_cfg,
                &mut self.actuator,
            )?;
            report.bounds = Some(up);
        }

        tracing::trace!(target: "erg", cycle = report.cycle, erg = ?report.erg, "cycle done");
        Ok(report)
    }

    fn run_inner(&mut self, shutdown: &AtomicBool, limit: Option<u64>) -> RunSummary {
        let mut summary = RunSummary::default();
        tracing::info!(target: "erg", period_ms = self.timing.period_ms, "control task started");
        while !shutdown.load(Ordering::Relaxed) {
            if limit.is_some_and(|n| summary.cycles >= n) {
                break;
            }
            while self.state.is_updating() && !shutdown.load(Ordering::Relaxed) {
                self.clock.sleep(self.timing.update_poll());
            }
            self.clock.sleep(self.timing.period());
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            summary.cycles += 1;
            if let Err(e) = self.cycle() {
                summary.failed_cycles += 1;
                tracing::warn!(target: "erg", error = ?e, "control cycle failed");
            }
        }
        tracing::info!(
            target: "erg",
            cycles = summary.cycles,
            failed = summary.failed_cycles,
            "control task stopped"
        );
        summary
    }

    /// Run until `shutdown` is raised.
    pub fn run(&mut self, shutdown: &AtomicBool) -> RunSummary {
        self.run_inner(shutdown, None)
    }

    /// Run at most `n` cycles, or until `shutdown` is raised.
    pub fn run_cycles(&mut self, n: u64, shutdown: &AtomicBool) -> RunSummary {
        self.run_inner(shutdown, Some(n))
    }

    /// Persist the table now regardless of the save timer.
    pub fn save_table(&mut self) -> Result<()> {
        let now = self.now_ms();
        self.store.save(&self.table, now)
    }
}

/// Builder for `ControlTask`. Actuator, storage and state are required.
pub struct ControlTaskBuilder<A, S, C> {
    state: Option<Arc<TrainerState>>,
    actuator: Option<A>,
    storage: Option<S>,
    clock: C,
    table: TableCfg,
    erg: ErgCfg,
    resistance: ResistanceCfg,
    timing: TimingCfg,
    observer: Option<Box<dyn TableObserver>>,
}

impl<A, S> Default for ControlTaskBuilder<A, S, MonotonicClock> {
    fn default() -> Self {
        Self {
            state: None,
            actuator: None,
            storage: None,
            clock: MonotonicClock::new(),
            table: TableCfg::default(),
            erg: ErgCfg::default(),
            resistance: ResistanceCfg::default(),
            timing: TimingCfg::default(),
            observer: None,
        }
    }
}

impl<A: Actuator, S: Storage, C: Clock> ControlTaskBuilder<A, S, C> {
    pub fn with_state(mut self, state: Arc<TrainerState>) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_actuator(mut self, actuator: A) -> Self {
        self.actuator = Some(actuator);
        self
    }

    pub fn with_storage(mut self, storage: S) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_table_cfg(mut self, cfg: TableCfg) -> Self {
        self.table = cfg;
        self
    }

    pub fn with_erg_cfg(mut self, cfg: ErgCfg) -> Self {
        self.erg = cfg;
        self
    }

    pub fn with_resistance_cfg(mut self, cfg: ResistanceCfg) -> Self {
        self.resistance = cfg;
        self
    }

    pub fn with_timing(mut self, cfg: TimingCfg) -> Self {
        self.timing = cfg;
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn TableObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_clock<C2: Clock>(self, clock: C2) -> ControlTaskBuilder<A, S, C2> {
        ControlTaskBuilder {
            state: self.state,
            actuator: self.actuator,
            storage: self.storage,
            clock,
            table: self.table,
            erg: self.erg,
            resistance: self.resistance,
            timing: self.timing,
            observer: self.observer,
        }
    }

    fn validate(&self) -> std::result::Result<(), BuildError> {
        let t = &self.table;
        if t.cad_size < 2 || t.watt_size < 2 {
            return Err(BuildError::InvalidConfig("table must be at least 2x2"));
        }
        if t.cadence_increment <= 0 || t.watt_increment <= 0 {
            return Err(BuildError::InvalidConfig("bucket increments must be > 0"));
        }
        if t.power_samples == 0 {
            return Err(BuildError::InvalidConfig("power_samples must be >= 1"));
        }
        if t.position_scale <= 0 {
            return Err(BuildError::InvalidConfig("position_scale must be > 0"));
        }
        if self.erg.max_watts <= self.erg.min_watts {
            return Err(BuildError::InvalidConfig("max_watts must exceed min_watts"));
        }
        if !(self.erg.sensitivity.is_finite() && self.erg.sensitivity > 0.0) {
            return Err(BuildError::InvalidConfig("sensitivity must be > 0"));
        }
        if self.timing.period_ms == 0 {
            return Err(BuildError::InvalidConfig("period_ms must be >= 1"));
        }
        Ok(())
    }

    pub fn try_build(self) -> Result<ControlTask<A, S, C>> {
        self.validate().map_err(eyre::Report::new)?;
        let state = self
            .state
            .ok_or_else(|| eyre::Report::new(BuildError::MissingState))?;
        let actuator = self
            .actuator
            .ok_or_else(|| eyre::Report::new(BuildError::MissingActuator))?;
        let storage = self
            .storage
            .ok_or_else(|| eyre::Report::new(BuildError::MissingStorage))?;

        // one plausibility floor for both the controller and the table gate
        let mut table_cfg = self.table;
        table_cfg.min_plausible_watts = self.erg.min_plausible_watts;
        let mut table = PowerPositionTable::new(table_cfg.clone());
        if let Some(obs) = self.observer {
            table.set_observer(obs);
        }
        let epoch = self.clock.now();
        Ok(ControlTask {
            buffer: SampleBuffer::from_table_cfg(&table_cfg),
            store: TableStore::new(storage, &table_cfg),
            table,
            erg: ErgController::new(
                self.erg.clone(),
                self.resistance.clone(),
                self.timing.clone(),
            ),
            bounds: TravelBounds::new(self.resistance.default_travel),
            erg_cfg: self.erg,
            resistance_cfg: self.resistance,
            timing: self.timing,
            state,
            actuator,
            clock: self.clock,
            epoch,
            cycles: 0,
            since_bounds: 0,
            last_power_tick: 0,
        })
    }
}
