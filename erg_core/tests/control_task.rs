use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use erg_core::mocks::{InstantActuator, MemStorage};
use erg_core::notify::ChannelObserver;
use erg_core::{
    BuildError, ControlMode, ControlTask, ErgCfg, ErgOutcome, InsertOutcome,
    LoadOutcome, ResistanceOutcome, TimingCfg, TrainerState,
};
use erg_traits::clock::test_clock::TestClock;

type Task = ControlTask<InstantActuator, MemStorage, TestClock>;

struct Rig {
    task: Task,
    state: Arc<TrainerState>,
    actuator: InstantActuator,
    storage: MemStorage,
    clock: TestClock,
}

fn rig(timing: TimingCfg) -> Rig {
    let state = Arc::new(TrainerState::new());
    let actuator = InstantActuator::at(50_000);
    let storage = MemStorage::default();
    let clock = TestClock::new();
    let task = ControlTask::<InstantActuator, MemStorage>::builder()
        .with_state(Arc::clone(&state))
        .with_actuator(actuator.clone())
        .with_storage(storage.clone())
        .with_timing(timing)
        .with_clock(clock.clone())
        .try_build()
        .unwrap();
    Rig {
        task,
        state,
        actuator,
        storage,
        clock,
    }
}

fn pedal(state: &TrainerState, watts: i32, cadence: i32) {
    state.cadence.set_value(cadence);
    state.power.set_value(watts);
}

#[test]
fn fifth_steady_reading_commits_and_persists() {
    let mut r = rig(TimingCfg::default());
    r.state.set_mode(ControlMode::TargetPower);
    r.state.set_power_meter_connected(true);
    r.state.power.set_target(150);

    for cycle in 1..=4 {
        pedal(&r.state, 150, 90);
        let report = r.task.cycle().unwrap();
        assert_eq!(report.cycle, cycle);
        assert_eq!(report.insert, None);
        assert!(report.erg.is_some());
    }
    assert!(r.storage.get("power_table.bin").is_none());

    pedal(&r.state, 150, 90);
    let report = r.task.cycle().unwrap();
    assert!(matches!(
        report.insert,
        Some(InsertOutcome::Stored { row: 6, col: 5, position: 500, .. })
    ));
    assert_eq!(report.load, Some(LoadOutcome::Missing));
    assert!(r.storage.get("power_table.bin").is_some());
    assert_eq!(r.task.table().lookup(150, 90), Some(50_000));
}

#[test]
fn stale_power_tick_is_not_ingested_twice() {
    let mut r = rig(TimingCfg::default());
    pedal(&r.state, 150, 90);
    for _ in 0..10 {
        r.task.cycle().unwrap();
    }
    // one fresh reading only: the buffer holds a single seed
    assert_eq!(r.task.table().populated(), 0);
    assert_eq!(r.storage.writes(), 0);
}

#[test]
fn reset_request_is_honoured_before_ingestion() {
    let mut r = rig(TimingCfg::default());
    r.task.table_mut().insert(150.0, 90.0, 500.0);
    r.state.request_table_reset();
    pedal(&r.state, 150, 90);
    let report = r.task.cycle().unwrap();
    assert!(report.table_reset);
    assert_eq!(r.task.table().populated(), 0);
    assert_eq!(r.storage.writes(), 1);
    // consumed
    assert!(!r.task.cycle().unwrap().table_reset);
}

#[test]
fn failed_position_read_skips_only_ingestion() {
    let timing = TimingCfg {
        bounds_every_cycles: 1,
        ..TimingCfg::default()
    };
    let mut r = rig(timing);
    r.state.set_mode(ControlMode::TargetPower);
    r.state.set_power_meter_connected(true);
    r.state.power.set_target(150);
    pedal(&r.state, 150, 90);

    r.actuator.fail_next_reads(1);
    let report = r.task.cycle().unwrap();
    assert_eq!(report.insert, None);
    assert!(matches!(report.erg, Some(ErgOutcome::SetpointChange { .. })));
    assert!(report.bounds.is_some());
}

#[test]
fn table_gate_uses_the_configured_plausibility_floor() {
    let state = Arc::new(TrainerState::new());
    let mut task = ControlTask::<InstantActuator, MemStorage>::builder()
        .with_state(Arc::clone(&state))
        .with_actuator(InstantActuator::at(20_000))
        .with_storage(MemStorage::default())
        .with_erg_cfg(ErgCfg {
            min_plausible_watts: 100,
            ..ErgCfg::default()
        })
        .with_clock(TestClock::new())
        .try_build()
        .unwrap();

    assert!(!task.table().accepts_observation(90, 90));
    assert!(task.table().accepts_observation(120, 90));
    for _ in 0..5 {
        pedal(&state, 90, 90);
        assert_eq!(task.cycle().unwrap().insert, None);
    }
    assert_eq!(task.table().observed(), 0);
}

#[test]
fn dispatch_follows_mode_and_power_source() {
    let mut r = rig(TimingCfg::default());
    pedal(&r.state, 150, 90);

    r.state.set_mode(ControlMode::Idle);
    let report = r.task.cycle().unwrap();
    assert_eq!((report.erg, report.resistance), (None, None));

    // power target mode without a meter, target or simulation does nothing
    r.state.set_mode(ControlMode::TargetPower);
    assert_eq!(r.task.cycle().unwrap().erg, None);

    r.state.power.set_target(200);
    assert!(matches!(
        r.task.cycle().unwrap().erg,
        Some(ErgOutcome::SetpointChange { .. })
    ));

    r.state.set_mode(ControlMode::TargetResistance);
    r.state.resistance.set_target(30);
    r.state.resistance.set_value(20);
    let report = r.task.cycle().unwrap();
    assert_eq!(report.erg, None);
    assert!(matches!(
        report.resistance,
        Some(ResistanceOutcome::Adjusted { delta: 10, .. })
    ));
}

#[test]
fn bounds_refresh_runs_every_n_cycles() {
    let timing = TimingCfg {
        bounds_every_cycles: 3,
        ..TimingCfg::default()
    };
    let mut r = rig(timing);
    r.state.resistance.set_value(4);
    let refreshed: Vec<bool> = (0..7)
        .map(|_| r.task.cycle().unwrap().bounds.is_some())
        .collect();
    assert_eq!(refreshed, [false, false, true, false, false, true, false]);
    assert_eq!(r.actuator.limits(), Some((-200_000_000, 200_000_000)));
    assert_eq!(r.task.bounds().min, -200_000_000);
}

#[test]
fn run_sleeps_one_period_per_cycle() {
    let mut r = rig(TimingCfg::default());
    let stop = AtomicBool::new(false);
    let summary = r.task.run_cycles(4, &stop);
    assert_eq!(summary.cycles, 4);
    assert_eq!(summary.failed_cycles, 0);
    assert_eq!(r.clock.elapsed(), TimingCfg::default().period() * 4);
}

#[test]
fn update_in_progress_holds_the_loop() {
    let mut r = rig(TimingCfg::default());
    r.state.set_updating(true);
    let state = Arc::clone(&r.state);
    let releaser = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(20));
        state.set_updating(false);
    });

    let stop = AtomicBool::new(false);
    let summary = r.task.run_cycles(1, &stop);
    releaser.join().unwrap();

    assert_eq!(summary.cycles, 1);
    // at least one update poll on top of the cycle period
    let timing = TimingCfg::default();
    assert!(r.clock.elapsed() >= timing.period() + timing.update_poll());
    assert!(r.clock.sleep_count() >= 2);
}

#[test]
fn raised_shutdown_stops_before_first_cycle() {
    let mut r = rig(TimingCfg::default());
    let stop = AtomicBool::new(true);
    assert_eq!(r.task.run(&stop).cycles, 0);
    assert_eq!(r.task.cycles(), 0);
}

#[test]
fn committed_rows_reach_the_observer() {
    let (observer, rx) = ChannelObserver::new(4);
    let state = Arc::new(TrainerState::new());
    let mut task = ControlTask::<InstantActuator, MemStorage>::builder()
        .with_state(Arc::clone(&state))
        .with_actuator(InstantActuator::at(40_000))
        .with_storage(MemStorage::default())
        .with_observer(Box::new(observer))
        .with_clock(TestClock::new())
        .try_build()
        .unwrap();
    for _ in 0..5 {
        pedal(&state, 120, 80);
        task.cycle().unwrap();
    }
    assert_eq!(rx.try_recv(), Ok(4));
}

#[test]
fn builder_reports_missing_parts() {
    let err = ControlTask::<InstantActuator, MemStorage>::builder()
        .with_state(Arc::new(TrainerState::new()))
        .with_storage(MemStorage::default())
        .try_build()
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingActuator)
    ));

    let err = ControlTask::<InstantActuator, MemStorage>::builder()
        .with_actuator(InstantActuator::at(0))
        .with_storage(MemStorage::default())
        .try_build()
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingState)
    ));
}

#[test]
fn builder_rejects_zero_period() {
    let err = ControlTask::<InstantActuator, MemStorage>::builder()
        .with_state(Arc::new(TrainerState::new()))
        .with_actuator(InstantActuator::at(0))
        .with_storage(MemStorage::default())
        .with_timing(TimingCfg {
            period_ms: 0,
            ..TimingCfg::default()
        })
        .try_build()
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::InvalidConfig(_))
    ));
}
