//! Simulated ride: the real control task against the simulated trainer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use erg_core::notify::ChannelObserver;
use erg_core::storage::DirStorage;
use erg_core::{ControlMode, ControlTask, TrainerState};
use erg_hardware::{Physics, SimulatedActuator, SimulatedPowerMeter};
use eyre::WrapErr;

#[derive(Debug, Clone, Copy)]
pub enum RideTarget {
    Watts(i32),
    Resistance(i32),
}

#[derive(Debug, Clone, Copy)]
pub struct RideOpts {
    pub target: RideTarget,
    pub cadence: i32,
    pub cycles: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RideSummary {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub set_point: i32,
    pub final_watts: i32,
    pub position: i32,
    pub populated: usize,
    pub observed: usize,
    pub rows_notified: usize,
}

impl RideSummary {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "cycles": self.cycles,
            "failed_cycles": self.failed_cycles,
            "set_point": self.set_point,
            "final_watts": self.final_watts,
            "position": self.position,
            "populated": self.populated,
            "observed": self.observed,
            "rows_notified": self.rows_notified,
        })
    }
}

/// Publish simulated power, cadence and resistance until `stop` is raised.
fn sensor_loop(
    meter: &SimulatedPowerMeter,
    state: &TrainerState,
    cadence: i32,
    report_resistance: bool,
    interval: Duration,
    stop: &AtomicBool,
) {
    while !stop.load(Ordering::Relaxed) {
        state.cadence.set_value(cadence);
        state.power.set_value(meter.watts_at(cadence));
        if report_resistance {
            state.resistance.set_value(meter.resistance());
        }
        thread::sleep(interval);
    }
}

pub fn run_ride(
    cfg: &erg_config::Config,
    opts: RideOpts,
    shutdown: &AtomicBool,
) -> eyre::Result<RideSummary> {
    let table_cfg: erg_core::TableCfg = (&cfg.table).into();
    let erg_cfg: erg_core::ErgCfg = (&cfg.erg).into();
    let resistance_cfg: erg_core::ResistanceCfg = (&cfg.resistance).into();
    let timing: erg_core::TimingCfg = (&cfg.timing).into();

    let storage = DirStorage::open(&cfg.storage.dir)
        .wrap_err_with(|| format!("open storage dir {}", cfg.storage.dir))?;
    let brake = SimulatedActuator::new(0, cfg.simulator.actuator_speed);
    let meter = SimulatedPowerMeter::new(
        brake.clone(),
        Physics {
            base_torque: cfg.simulator.base_torque,
            torque_per_unit: cfg.simulator.torque_per_unit,
            position_scale: table_cfg.position_scale,
            resistance_gain: resistance_cfg.gain,
        },
    );

    let state = Arc::new(TrainerState::new());
    state.set_power_meter_connected(true);
    match opts.target {
        RideTarget::Watts(w) => {
            state.power.set_target(w);
            state.set_mode(ControlMode::TargetPower);
        }
        RideTarget::Resistance(r) => {
            state.resistance.set_target(r);
            state.set_mode(ControlMode::TargetResistance);
        }
    }

    let (observer, rows) = ChannelObserver::new(256);
    let mut task = ControlTask::builder()
        .with_state(Arc::clone(&state))
        .with_actuator(brake.clone())
        .with_storage(storage)
        .with_table_cfg(table_cfg)
        .with_erg_cfg(erg_cfg)
        .with_resistance_cfg(resistance_cfg)
        .with_timing(timing)
        .with_observer(Box::new(observer))
        .try_build()?;

    tracing::info!(goal = ?opts.target, cadence = opts.cadence, cycles = opts.cycles, "ride start");
    let sensors_stop = AtomicBool::new(false);
    let interval = Duration::from_millis(cfg.simulator.sensor_interval_ms.max(1));
    let report_resistance = matches!(opts.target, RideTarget::Resistance(_));

    let run = thread::scope(|s| {
        s.spawn(|| {
            sensor_loop(
                &meter,
                &state,
                opts.cadence,
                report_resistance,
                interval,
                &sensors_stop,
            );
        });
        // first reading lands before the first cycle
        thread::sleep(interval);
        let run = task.run_cycles(opts.cycles, shutdown);
        sensors_stop.store(true, Ordering::Relaxed);
        run
    });

    // Only a table that went through the load/merge may replace the file.
    if task.store().is_loaded() {
        if let Err(e) = task.save_table() {
            tracing::warn!(error = ?e, "could not save table after ride");
        }
    }

    let summary = RideSummary {
        cycles: run.cycles,
        failed_cycles: run.failed_cycles,
        set_point: task.controller().set_point(),
        final_watts: meter.watts_at(opts.cadence),
        position: brake.position(),
        populated: task.table().populated(),
        observed: task.table().observed(),
        rows_notified: rows.try_iter().count(),
    };
    tracing::info!(
        final_watts = summary.final_watts,
        position = summary.position,
        observed = summary.observed,
        "ride complete"
    );
    Ok(summary)
}
