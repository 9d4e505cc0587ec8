//! Simulated trainer: a speed-limited brake and a power meter whose reading
//! follows from brake position and cadence.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use erg_traits::{Actuator, BoxError};

use crate::error::HwError;
use crate::util::approach;

#[derive(Debug)]
struct Shared {
    target: AtomicI32,
    current: AtomicI32,
    min: AtomicI32,
    max: AtomicI32,
    releases: AtomicU32,
}

/// Brake actuator that travels at most `speed` units per position read.
///
/// Clones share one brake, so a sensor thread can read the position while
/// the control task drives it.
#[derive(Debug, Clone)]
pub struct SimulatedActuator {
    shared: Arc<Shared>,
    speed: i32,
}

impl SimulatedActuator {
    pub fn new(position: i32, speed: i32) -> Self {
        Self {
            shared: Arc::new(Shared {
                target: AtomicI32::new(position),
                current: AtomicI32::new(position),
                min: AtomicI32::new(i32::MIN),
                max: AtomicI32::new(i32::MAX),
                releases: AtomicU32::new(0),
            }),
            speed,
        }
    }

    /// Where the brake is now, without advancing it.
    #[inline]
    pub fn position(&self) -> i32 {
        self.shared.current.load(Ordering::Acquire)
    }

    pub fn limits(&self) -> (i32, i32) {
        (
            self.shared.min.load(Ordering::Relaxed),
            self.shared.max.load(Ordering::Relaxed),
        )
    }

    pub fn releases(&self) -> u32 {
        self.shared.releases.load(Ordering::Relaxed)
    }
}

impl Actuator for SimulatedActuator {
    fn set_target_position(&mut self, position: i32) -> Result<(), BoxError> {
        let (min, max) = self.limits();
        let clamped = position.clamp(min, max);
        if clamped != position {
            tracing::debug!(requested = position, clamped, "target clamped to travel limits");
        }
        self.shared.target.store(clamped, Ordering::Release);
        Ok(())
    }

    fn target_position(&self) -> i32 {
        self.shared.target.load(Ordering::Acquire)
    }

    fn current_position(&mut self) -> Result<i32, BoxError> {
        let target = self.target_position();
        let next = approach(self.position(), target, self.speed);
        self.shared.current.store(next, Ordering::Release);
        Ok(next)
    }

    fn release_tension(&mut self) -> Result<(), BoxError> {
        self.shared.releases.fetch_add(1, Ordering::Relaxed);
        tracing::info!("brake released (simulated)");
        Ok(())
    }

    fn set_travel_limits(&mut self, min: i32, max: i32) -> Result<(), BoxError> {
        if min > max {
            return Err(HwError::InvalidLimits { min, max }.into());
        }
        self.shared.min.store(min, Ordering::Relaxed);
        self.shared.max.store(max, Ordering::Relaxed);
        Ok(())
    }
}

/// Physics coefficients of the simulated flywheel brake.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Physics {
    /// Watts per rpm with the brake fully open.
    pub base_torque: f32,
    /// Extra watts per rpm per table unit of brake position.
    pub torque_per_unit: f32,
    /// Actuator units per table unit.
    pub position_scale: i32,
    /// Actuator units per resistance level.
    pub resistance_gain: i32,
}

impl Default for Physics {
    fn default() -> Self {
        Self {
            base_torque: 0.5,
            torque_per_unit: 0.02,
            position_scale: 100,
            resistance_gain: 100,
        }
    }
}

/// Power meter and resistance sensor reading a shared simulated brake.
#[derive(Debug, Clone)]
pub struct SimulatedPowerMeter {
    brake: SimulatedActuator,
    physics: Physics,
}

impl SimulatedPowerMeter {
    pub fn new(brake: SimulatedActuator, physics: Physics) -> Self {
        Self { brake, physics }
    }

    /// Power at `cadence` for the brake's current position. Never negative.
    pub fn watts_at(&self, cadence: i32) -> i32 {
        let p = &self.physics;
        let units = self.brake.position() as f32 / p.position_scale.max(1) as f32;
        let torque = (p.base_torque + p.torque_per_unit * units).max(0.0);
        (cadence.max(0) as f32 * torque).round() as i32
    }

    /// Resistance level reported by the trainer, from brake position.
    pub fn resistance(&self) -> i32 {
        self.brake.position() / self.physics.resistance_gain.max(1)
    }

    /// Brake position (actuator units) that would make `watts` at `cadence`.
    pub fn position_for(&self, watts: i32, cadence: i32) -> Option<i32> {
        let p = &self.physics;
        if cadence <= 0 || p.torque_per_unit <= 0.0 {
            return None;
        }
        let units = (watts as f32 / cadence as f32 - p.base_torque) / p.torque_per_unit;
        Some((units * p.position_scale as f32).round() as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brake_moves_at_most_speed_per_read() {
        let mut a = SimulatedActuator::new(0, 1_000);
        a.set_target_position(2_500).unwrap();
        assert_eq!(a.current_position().unwrap(), 1_000);
        assert_eq!(a.current_position().unwrap(), 2_000);
        assert_eq!(a.current_position().unwrap(), 2_500);
        assert_eq!(a.current_position().unwrap(), 2_500);
    }

    #[test]
    fn targets_are_clamped_to_limits() {
        let mut a = SimulatedActuator::new(0, 1_000);
        a.set_travel_limits(-500, 500).unwrap();
        a.set_target_position(9_000).unwrap();
        assert_eq!(a.target_position(), 500);
        assert!(a.set_travel_limits(10, -10).is_err());
    }

    #[test]
    fn power_grows_with_position_and_cadence() {
        let brake = SimulatedActuator::new(10_000, 1);
        let meter = SimulatedPowerMeter::new(brake, Physics::default());
        // 90 rpm * (0.5 + 0.02 * 100)
        assert_eq!(meter.watts_at(90), 225);
        assert_eq!(meter.watts_at(0), 0);
        assert_eq!(meter.position_for(225, 90), Some(10_000));
        assert_eq!(meter.resistance(), 100);
    }
}
