//! Live sensor channels shared between I/O tasks and the control task.
//!
//! I/O callbacks write through `MeasurementCell`; the control task reads
//! snapshots. Value, target, simulate flag and timestamp move together under
//! one lock, so a snapshot is never half-updated.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// One channel reading and the target an app has set for it.
///
/// `timestamp` is a per-channel update tick; it is the only freshness signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Measurement {
    pub value: i32,
    pub target: i32,
    pub timestamp: u64,
    /// Value is synthetic (app-driven simulation), not sensor-derived.
    pub simulate: bool,
}

impl Measurement {
    pub fn new(value: i32, target: i32, timestamp: u64) -> Self {
        Self {
            value,
            target,
            timestamp,
            simulate: false,
        }
    }

    /// True when `other` carries a reading this one has not seen.
    #[inline]
    pub fn is_newer_than(&self, other: &Measurement) -> bool {
        self.timestamp != other.timestamp
    }
}

/// Thread-safe holder for a single channel.
#[derive(Debug, Default)]
pub struct MeasurementCell {
    inner: Mutex<Measurement>,
}

impl MeasurementCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Measurement {
        // A poisoned lock still holds a complete Measurement.
        match self.inner.lock() {
            Ok(g) => *g,
            Err(p) => *p.into_inner(),
        }
    }

    fn update(&self, f: impl FnOnce(&mut Measurement)) {
        let mut g = match self.inner.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        f(&mut g);
    }

    /// Record a new reading and bump the tick.
    pub fn set_value(&self, value: i32) {
        self.update(|m| {
            m.value = value;
            m.timestamp = m.timestamp.wrapping_add(1);
        });
    }

    /// Set the app-requested target. Does not count as a new reading.
    pub fn set_target(&self, target: i32) {
        self.update(|m| m.target = target);
    }

    pub fn set_simulate(&self, simulate: bool) {
        self.update(|m| m.simulate = simulate);
    }

    pub fn value(&self) -> i32 {
        self.get().value
    }

    pub fn target(&self) -> i32 {
        self.get().target
    }

    pub fn timestamp(&self) -> u64 {
        self.get().timestamp
    }
}

/// Which app command currently drives the brake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ControlMode {
    #[default]
    Idle = 0,
    TargetPower = 1,
    TargetResistance = 2,
}

impl ControlMode {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ControlMode::TargetPower,
            2 => ControlMode::TargetResistance,
            _ => ControlMode::Idle,
        }
    }
}

/// Shared runtime state of the trainer.
///
/// Owned behind an `Arc`; written by protocol/sensor tasks, read by the
/// control task.
#[derive(Debug, Default)]
pub struct TrainerState {
    pub power: MeasurementCell,
    pub cadence: MeasurementCell,
    pub resistance: MeasurementCell,
    pub heart_rate: MeasurementCell,
    mode: AtomicU8,
    power_meter_connected: AtomicBool,
    updating: AtomicBool,
    reset_table_requested: AtomicBool,
}

impl TrainerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> ControlMode {
        ControlMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    pub fn set_mode(&self, mode: ControlMode) {
        self.mode.store(mode as u8, Ordering::Release);
    }

    pub fn set_power_meter_connected(&self, connected: bool) {
        self.power_meter_connected
            .store(connected, Ordering::Relaxed);
    }

    pub fn power_meter_connected(&self) -> bool {
        self.power_meter_connected.load(Ordering::Relaxed)
    }

    /// ERG needs some source of power: a meter, an app target, or simulation.
    pub fn power_source_available(&self) -> bool {
        if self.power_meter_connected() {
            return true;
        }
        let p = self.power.get();
        p.target != 0 || p.simulate
    }

    /// Hold the control task (firmware update in progress).
    pub fn set_updating(&self, updating: bool) {
        self.updating.store(updating, Ordering::Release);
    }

    pub fn is_updating(&self) -> bool {
        self.updating.load(Ordering::Acquire)
    }

    /// Ask the control task to clear the learned table before its next insert.
    pub fn request_table_reset(&self) {
        self.reset_table_requested.store(true, Ordering::Release);
    }

    /// Consume a pending reset request.
    pub fn take_table_reset(&self) -> bool {
        self.reset_table_requested.swap(false, Ordering::AcqRel)
    }
}
