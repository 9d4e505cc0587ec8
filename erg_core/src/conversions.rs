//! `From` implementations bridging `erg_config` types to `erg_core` types.

use crate::config::{ErgCfg, ResistanceCfg, TableCfg, TimingCfg};

// ── TableCfg ─────────────────────────────────────────────────────────────────

impl From<&erg_config::TableCfg> for TableCfg {
    fn from(c: &erg_config::TableCfg) -> Self {
        Self {
            cad_size: c.cad_size,
            watt_size: c.watt_size,
            min_cadence: c.min_cadence,
            cadence_increment: c.cadence_increment,
            watt_increment: c.watt_increment,
            power_samples: c.power_samples,
            version: c.version,
            min_reliable_positions: c.min_reliable_positions,
            reliable_confidence: c.reliable_confidence,
            unreliable_watt_buckets: c.unreliable_watt_buckets,
            fill_threshold: c.fill_threshold,
            position_scale: c.position_scale,
            min_plausible_watts: TableCfg::default().min_plausible_watts,
            save_interval_ms: c.save_interval_ms,
            file_name: c.file_name.clone(),
        }
    }
}

// ── ErgCfg ───────────────────────────────────────────────────────────────────

impl From<&erg_config::ErgCfg> for ErgCfg {
    fn from(c: &erg_config::ErgCfg) -> Self {
        Self {
            min_watts: c.min_watts,
            max_watts: c.max_watts,
            sensitivity: c.sensitivity,
            setpoint_change_watts: c.setpoint_change_watts,
            min_plausible_watts: c.min_plausible_watts,
            min_cadence: c.min_cadence,
            reference_cadence: c.reference_cadence,
            shift_step: c.shift_step,
            stop_retract: c.stop_retract,
        }
    }
}

// ── ResistanceCfg ────────────────────────────────────────────────────────────

impl From<&erg_config::ResistanceCfg> for ResistanceCfg {
    fn from(c: &erg_config::ResistanceCfg) -> Self {
        Self {
            gain: c.gain,
            default_travel: c.default_travel,
        }
    }
}

// ── TimingCfg ────────────────────────────────────────────────────────────────

impl From<&erg_config::TimingCfg> for TimingCfg {
    fn from(c: &erg_config::TimingCfg) -> Self {
        Self {
            period_ms: c.period_ms,
            actuator_poll_ms: c.actuator_poll_ms,
            actuator_max_polls: c.actuator_max_polls,
            settle_ms: c.settle_ms,
            bounds_every_cycles: c.bounds_every_cycles,
            update_poll_ms: c.update_poll_ms,
        }
    }
}
