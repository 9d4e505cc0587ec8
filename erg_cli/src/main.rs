mod cli;
mod error_fmt;
mod ride;
mod table_cmd;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use erg_traits::Storage;
use eyre::WrapErr;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::ride::{RideOpts, RideTarget};

/// Watts used by `ride` when neither target is given.
const DEFAULT_RIDE_WATTS: i32 = 150;

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = real_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", error_fmt::format_error_json(&e));
        } else {
            eprintln!("{}", error_fmt::humanize(&e));
        }
        std::process::exit(1);
    }
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    color_eyre::install()?;

    let cfg = match &cli.config {
        Some(path) => load_config(path)?,
        None => erg_config::Config::default(),
    };
    init_tracing(cli.json, &cli.log_level, &cfg.logging)?;
    cfg.validate()?;

    match cli.cmd {
        Commands::Ride {
            target_watts,
            resistance,
            cadence,
            cycles,
        } => {
            let target = match (target_watts, resistance) {
                (_, Some(r)) => RideTarget::Resistance(r),
                (Some(w), None) => RideTarget::Watts(w),
                (None, None) => RideTarget::Watts(DEFAULT_RIDE_WATTS),
            };

            let shutdown = Arc::new(AtomicBool::new(false));
            {
                let flag = Arc::clone(&shutdown);
                ctrlc::set_handler(move || {
                    flag.store(true, Ordering::Relaxed);
                })
                .wrap_err("install Ctrl-C handler")?;
            }

            let summary = ride::run_ride(
                &cfg,
                RideOpts {
                    target,
                    cadence,
                    cycles,
                },
                &shutdown,
            )?;
            if cli.json {
                println!("{}", summary.to_json());
            } else {
                println!(
                    "ride: {} cycles ({} failed), set point {} W, final {} W, brake at {}, {} cells observed / {} populated, {} row updates",
                    summary.cycles,
                    summary.failed_cycles,
                    summary.set_point,
                    summary.final_watts,
                    summary.position,
                    summary.observed,
                    summary.populated,
                    summary.rows_notified
                );
            }
        }
        Commands::Table { cmd } => table_cmd::run_table(&cfg, &cmd, cli.json)?,
        Commands::SelfCheck => {
            self_check(&cfg)?;
            if cli.json {
                println!("{}", serde_json::json!({ "ok": true }));
            } else {
                println!("ok");
            }
        }
    }
    Ok(())
}

fn load_config(path: &Path) -> eyre::Result<erg_config::Config> {
    let text =
        fs::read_to_string(path).wrap_err_with(|| format!("read config {}", path.display()))?;
    erg_config::load_toml(&text).wrap_err_with(|| format!("parse config {}", path.display()))
}

fn init_tracing(json: bool, level: &str, logging: &erg_config::Logging) -> eyre::Result<()> {
    // RUST_LOG wins, then [logging].level, then --log-level.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(logging.level.as_deref().unwrap_or(level)))
        .wrap_err("invalid log level")?;

    let console = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let file_layer = match &logging.file {
        Some(file) => {
            let path = Path::new(file);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file has no file name: {file}"))?;
            let appender = match logging.rotation.as_deref().unwrap_or("never") {
                "daily" => tracing_appender::rolling::daily(dir, name),
                "hourly" => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .wrap_err("install tracing subscriber")?;
    Ok(())
}

/// Probe the storage directory with a write, read back and remove.
fn self_check(cfg: &erg_config::Config) -> eyre::Result<()> {
    const PROBE: &str = ".self-check";
    let mut storage = erg_core::storage::DirStorage::open(&cfg.storage.dir)
        .wrap_err_with(|| format!("open storage dir {}", cfg.storage.dir))?;
    let map = |e: erg_traits::BoxError| eyre::Report::new(erg_core::hw_error::map_storage_error(&*e));

    storage.write(PROBE, b"ok").map_err(map)?;
    let back = storage.read(PROBE).map_err(map)?;
    storage.remove(PROBE).map_err(map)?;
    if back.as_deref() != Some(b"ok".as_slice()) {
        eyre::bail!("storage dir {} did not return the probe", cfg.storage.dir);
    }
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    check_gpio(&cfg.hardware)?;
    tracing::info!(dir = %cfg.storage.dir, "self-check passed");
    Ok(())
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn check_gpio(hw: &erg_config::Hardware) -> eyre::Result<()> {
    use erg_hardware::gpio::{StepDirActuator, StepDirPins};

    let (Some(step), Some(dir)) = (hw.step_pin, hw.dir_pin) else {
        eyre::bail!("hardware.step_pin and hardware.dir_pin are missing");
    };
    let pins = StepDirPins {
        step,
        dir,
        enable: hw.enable_pin,
    };
    StepDirActuator::new(pins, hw.step_pulse_us, hw.units_per_step)
        .wrap_err("open brake stepper pins")?;
    Ok(())
}
