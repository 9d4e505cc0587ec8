use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use erg_hardware::error::HwError;
use erg_hardware::{Physics, SimulatedActuator, SimulatedPowerMeter};
use erg_traits::Actuator;

#[test]
fn meter_on_another_thread_sees_brake_moves() {
    let mut brake = SimulatedActuator::new(0, 1_000);
    let meter = SimulatedPowerMeter::new(brake.clone(), Physics::default());
    let stop = Arc::new(AtomicBool::new(false));

    let stop_bg = Arc::clone(&stop);
    let reader = thread::spawn(move || {
        let mut max_seen = 0;
        while !stop_bg.load(Ordering::Relaxed) {
            max_seen = max_seen.max(meter.watts_at(90));
            thread::sleep(Duration::from_micros(200));
        }
        max_seen.max(meter.watts_at(90))
    });

    brake.set_target_position(10_000).unwrap();
    while brake.current_position().unwrap() != 10_000 {}
    stop.store(true, Ordering::Relaxed);
    assert_eq!(reader.join().unwrap(), 225);
}

#[test]
fn inverted_limits_are_a_typed_error() {
    let mut brake = SimulatedActuator::new(0, 1);
    let err = brake.set_travel_limits(5, -5).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<HwError>(),
        Some(HwError::InvalidLimits { min: 5, max: -5 })
    ));
}

#[test]
fn release_is_counted_across_clones() {
    let brake = SimulatedActuator::new(0, 1);
    let mut driver = brake.clone();
    driver.release_tension().unwrap();
    driver.release_tension().unwrap();
    assert_eq!(brake.releases(), 2);
}
