//! Runtime configuration for the control core.
//!
//! These are the structs the table and controller consume. They are separate
//! from the TOML-deserialized config in `erg_config`; see `conversions`.

use std::time::Duration;

/// Grid geometry and learning/persistence policy for the power table.
#[derive(Debug, Clone)]
pub struct TableCfg {
    /// Cadence rows.
    pub cad_size: usize,
    /// Watt columns.
    pub watt_size: usize,
    /// Cadence of row 0 (rpm).
    pub min_cadence: i32,
    pub cadence_increment: i32,
    pub watt_increment: i32,
    /// Samples averaged before an insert; also sets the confidence cap (2x).
    pub power_samples: usize,
    pub version: i32,
    pub min_reliable_positions: usize,
    /// Confidence must exceed this on both sides for a cell to count as overlap.
    pub reliable_confidence: i8,
    /// Lowest watt columns excluded from overlap counting.
    pub unreliable_watt_buckets: usize,
    /// Completion passes run once more than this many cells are populated.
    pub fill_threshold: usize,
    /// Actuator units per table unit.
    pub position_scale: i32,
    /// Readings at or below this never become observations. The control
    /// task sets it from `ErgCfg::min_plausible_watts`.
    pub min_plausible_watts: i32,
    pub save_interval_ms: u64,
    pub file_name: String,
}

impl Default for TableCfg {
    fn default() -> Self {
        Self {
            cad_size: 10,
            watt_size: 20,
            min_cadence: 60,
            cadence_increment: 5,
            watt_increment: 30,
            power_samples: 5,
            version: 5,
            min_reliable_positions: 3,
            reliable_confidence: 3,
            unreliable_watt_buckets: 3,
            fill_threshold: 4,
            position_scale: 100,
            min_plausible_watts: 10,
            save_interval_ms: 300_000,
            file_name: "power_table.bin".to_string(),
        }
    }
}

impl TableCfg {
    /// Highest confidence a single cell can accumulate.
    #[inline]
    pub fn confidence_cap(&self) -> i8 {
        i8::try_from(self.power_samples.saturating_mul(2)).unwrap_or(i8::MAX)
    }

    /// Cadence at the centre of row `k`.
    #[inline]
    pub fn cadence_of(&self, k: usize) -> i32 {
        self.min_cadence + (k as i32) * self.cadence_increment
    }

    /// Watts at the centre of column `i`.
    #[inline]
    pub fn watts_of(&self, i: usize) -> i32 {
        (i as i32) * self.watt_increment
    }

    #[inline]
    pub fn max_cadence(&self) -> i32 {
        self.cadence_of(self.cad_size.saturating_sub(1))
    }

    #[inline]
    pub fn max_watts(&self) -> i32 {
        self.watts_of(self.watt_size.saturating_sub(1))
    }

    /// Nearest row for a cadence, unclamped (may be negative or past the end).
    #[inline]
    pub fn cadence_bucket(&self, cadence: f32) -> i64 {
        ((cadence - self.min_cadence as f32) / self.cadence_increment as f32).round() as i64
    }

    /// Nearest column for a power, unclamped.
    #[inline]
    pub fn watt_bucket(&self, watts: f32) -> i64 {
        (watts / self.watt_increment as f32).round() as i64
    }
}

/// Power-target (ERG) control parameters.
#[derive(Debug, Clone)]
pub struct ErgCfg {
    pub min_watts: i32,
    pub max_watts: i32,
    /// Actuator units per watt of error.
    pub sensitivity: f32,
    /// Strictly greater setpoint moves count as a setpoint change.
    pub setpoint_change_watts: i32,
    pub min_plausible_watts: i32,
    /// At or below this cadence the rider is considered stopped.
    pub min_cadence: i32,
    pub reference_cadence: i32,
    pub shift_step: i32,
    pub stop_retract: i32,
}

impl Default for ErgCfg {
    fn default() -> Self {
        Self {
            min_watts: 35,
            max_watts: 800,
            sensitivity: 5.0,
            setpoint_change_watts: 20,
            min_plausible_watts: 10,
            min_cadence: 30,
            reference_cadence: 90,
            shift_step: 1200,
            stop_retract: 1200,
        }
    }
}

/// Resistance-target control parameters.
#[derive(Debug, Clone)]
pub struct ResistanceCfg {
    pub gain: i32,
    pub default_travel: i32,
}

impl Default for ResistanceCfg {
    fn default() -> Self {
        Self {
            gain: 100,
            default_travel: 200_000_000,
        }
    }
}

/// Control-task pacing and the bounded actuator wait.
#[derive(Debug, Clone)]
pub struct TimingCfg {
    pub period_ms: u64,
    pub actuator_poll_ms: u64,
    pub actuator_max_polls: u32,
    pub settle_ms: u64,
    pub bounds_every_cycles: u32,
    pub update_poll_ms: u64,
}

impl Default for TimingCfg {
    fn default() -> Self {
        Self {
            period_ms: 700,
            actuator_poll_ms: 100,
            actuator_max_polls: 50,
            settle_ms: 2_100,
            bounds_every_cycles: 50,
            update_poll_ms: 100,
        }
    }
}

impl TimingCfg {
    #[inline]
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
    #[inline]
    pub fn actuator_poll(&self) -> Duration {
        Duration::from_millis(self.actuator_poll_ms)
    }
    #[inline]
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
    #[inline]
    pub fn update_poll(&self) -> Duration {
        Duration::from_millis(self.update_poll_ms.max(1))
    }
}
