#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and table-seed parsing for the trainer controller.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//!   Every section has defaults, so an empty file is a valid config.
//! - The table CSV loader enforces headers and rejects rows that cannot be
//!   placed on the grid axes.
use serde::Deserialize;

/// Table seed/export CSV schema.
///
/// Expected headers:
/// cadence,watts,position
///
/// Example:
/// cadence,watts,position
/// 90,150,50000
/// 90,180,56000
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct TableRow {
    pub cadence: i32,
    pub watts: i32,
    /// Actuator units (full precision, not table units).
    pub position: i32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TableCfg {
    /// Number of cadence rows.
    pub cad_size: usize,
    /// Number of watt columns.
    pub watt_size: usize,
    /// Cadence of row 0 (rpm).
    pub min_cadence: i32,
    pub cadence_increment: i32,
    pub watt_increment: i32,
    /// Samples averaged before a table insert.
    pub power_samples: usize,
    /// On-disk format tag; files with another version are discarded.
    pub version: i32,
    /// Overlapping reliable cells required before a saved table is trusted.
    pub min_reliable_positions: usize,
    /// A cell is "reliable" once its confidence exceeds this.
    pub reliable_confidence: i8,
    /// Lowest watt columns ignored when counting overlap.
    pub unreliable_watt_buckets: usize,
    /// Completion passes only run above this many populated cells.
    pub fill_threshold: usize,
    /// Actuator units per table unit.
    pub position_scale: i32,
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
            save_interval_ms: 300_000,
            file_name: "power_table.bin".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ErgCfg {
    /// Lowest target the controller will chase, and the low travel-bound probe.
    pub min_watts: i32,
    /// High travel-bound probe.
    pub max_watts: i32,
    /// Actuator units per watt of error.
    pub sensitivity: f32,
    /// Setpoint moves strictly larger than this use the table.
    pub setpoint_change_watts: i32,
    /// Power readings below this are treated as a dropped sensor.
    pub min_plausible_watts: i32,
    /// At or below this cadence the rider is considered stopped.
    pub min_cadence: i32,
    /// Cadence used for travel-bound lookups.
    pub reference_cadence: i32,
    /// Actuator units per virtual shift.
    pub shift_step: i32,
    /// Distance the target is backed off when the rider stops.
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

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ResistanceCfg {
    /// Actuator units per resistance level of error.
    pub gain: i32,
    /// Symmetric travel bound used when the trainer reports resistance itself.
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

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TimingCfg {
    pub period_ms: u64,
    pub actuator_poll_ms: u64,
    pub actuator_max_polls: u32,
    /// Pause after a setpoint change so the power meter catches up.
    pub settle_ms: u64,
    /// Travel bounds are refreshed once every this many cycles.
    pub bounds_every_cycles: u32,
    /// Poll interval while an update holds the control task.
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

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageCfg {
    /// Directory that holds the persisted table file.
    pub dir: String,
}

impl Default for StorageCfg {
    fn default() -> Self {
        Self {
            dir: "var/erg".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Hardware {
    /// GPIO step pin for the brake stepper (hardware builds only).
    pub step_pin: Option<u8>,
    pub dir_pin: Option<u8>,
    pub enable_pin: Option<u8>,
    /// Half-period of one step pulse.
    pub step_pulse_us: u64,
    /// Actuator units per physical step.
    pub units_per_step: i32,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            step_pin: None,
            dir_pin: None,
            enable_pin: None,
            step_pulse_us: 500,
            units_per_step: 100,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimulatorCfg {
    /// Flywheel torque at position 0, in watts per rpm.
    pub base_torque: f32,
    /// Additional watts per rpm for each table unit of position.
    pub torque_per_unit: f32,
    /// Actuator units travelled per position poll.
    pub actuator_speed: i32,
    /// Sensor thread publish interval.
    pub sensor_interval_ms: u64,
}

impl Default for SimulatorCfg {
    fn default() -> Self {
        Self {
            base_torque: 0.5,
            torque_per_unit: 0.02,
            actuator_speed: 20_000,
            sensor_interval_ms: 250,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub table: TableCfg,
    pub erg: ErgCfg,
    pub resistance: ResistanceCfg,
    pub timing: TimingCfg,
    pub storage: StorageCfg,
    pub logging: Logging,
    pub hardware: Hardware,
    pub simulator: SimulatorCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read `cadence,watts,position` rows from a CSV file.
pub fn load_table_csv(path: &std::path::Path) -> eyre::Result<Vec<TableRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open table CSV {:?}: {}", path, e))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["cadence", "watts", "position"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "table CSV must have headers 'cadence,watts,position', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<TableRow>().enumerate() {
        match rec {
            Ok(row) => {
                if row.cadence <= 0 || row.watts <= 0 {
                    eyre::bail!(
                        "invalid CSV row {}: cadence and watts must be > 0",
                        idx + 2
                    );
                }
                rows.push(row);
            }
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }
    Ok(rows)
}

/// Write rows back out in the same schema `load_table_csv` accepts.
pub fn write_table_csv<W: std::io::Write>(out: W, rows: &[TableRow]) -> eyre::Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(["cadence", "watts", "position"])?;
    for r in rows {
        wtr.write_record([
            r.cadence.to_string(),
            r.watts.to_string(),
            r.position.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Table
        let t = &self.table;
        if t.cad_size < 2 {
            eyre::bail!("table.cad_size must be >= 2");
        }
        if t.watt_size < 2 {
            eyre::bail!("table.watt_size must be >= 2");
        }
        if t.cad_size * t.watt_size > 4096 {
            eyre::bail!("table grid is unreasonably large (> 4096 cells)");
        }
        if t.min_cadence <= 0 {
            eyre::bail!("table.min_cadence must be > 0");
        }
        if t.cadence_increment <= 0 {
            eyre::bail!("table.cadence_increment must be > 0");
        }
        if t.watt_increment <= 0 {
            eyre::bail!("table.watt_increment must be > 0");
        }
        if t.power_samples == 0 {
            eyre::bail!("table.power_samples must be >= 1");
        }
        // Confidence is stored as i8 and capped at 2x the sample count.
        if t.power_samples > 63 {
            eyre::bail!("table.power_samples must be <= 63");
        }
        if t.reliable_confidence < 0 {
            eyre::bail!("table.reliable_confidence must be >= 0");
        }
        if t.unreliable_watt_buckets >= t.watt_size {
            eyre::bail!("table.unreliable_watt_buckets must be < table.watt_size");
        }
        if t.position_scale <= 0 {
            eyre::bail!("table.position_scale must be > 0");
        }
        if t.file_name.trim().is_empty() {
            eyre::bail!("table.file_name must not be empty");
        }

        // ERG
        let e = &self.erg;
        if e.min_watts < 0 {
            eyre::bail!("erg.min_watts must be >= 0");
        }
        if e.max_watts <= e.min_watts {
            eyre::bail!("erg.max_watts must be > erg.min_watts");
        }
        if !(e.sensitivity.is_finite() && e.sensitivity > 0.0) {
            eyre::bail!("erg.sensitivity must be > 0.0");
        }
        if e.setpoint_change_watts < 0 {
            eyre::bail!("erg.setpoint_change_watts must be >= 0");
        }
        if e.min_cadence < 0 {
            eyre::bail!("erg.min_cadence must be >= 0");
        }
        if e.shift_step <= 0 {
            eyre::bail!("erg.shift_step must be > 0");
        }
        if e.stop_retract < 0 {
            eyre::bail!("erg.stop_retract must be >= 0");
        }

        // Resistance
        if self.resistance.default_travel <= 0 {
            eyre::bail!("resistance.default_travel must be > 0");
        }

        // Timing
        let tm = &self.timing;
        if tm.period_ms == 0 {
            eyre::bail!("timing.period_ms must be >= 1");
        }
        if tm.actuator_max_polls == 0 {
            eyre::bail!("timing.actuator_max_polls must be >= 1");
        }
        if tm.bounds_every_cycles == 0 {
            eyre::bail!("timing.bounds_every_cycles must be >= 1");
        }
        if tm.settle_ms > 60_000 {
            eyre::bail!("timing.settle_ms is unreasonably large (>60s)");
        }

        // Storage
        if self.storage.dir.trim().is_empty() {
            eyre::bail!("storage.dir must not be empty");
        }

        // Hardware
        if self.hardware.units_per_step <= 0 {
            eyre::bail!("hardware.units_per_step must be > 0");
        }

        // Simulator
        let s = &self.simulator;
        if !(s.base_torque.is_finite() && s.base_torque >= 0.0) {
            eyre::bail!("simulator.base_torque must be >= 0.0");
        }
        if !(s.torque_per_unit.is_finite() && s.torque_per_unit > 0.0) {
            eyre::bail!("simulator.torque_per_unit must be > 0.0");
        }
        if s.actuator_speed <= 0 {
            eyre::bail!("simulator.actuator_speed must be > 0");
        }

        Ok(())
    }
}
