//! Human-readable error descriptions and structured JSON error formatting.

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use erg_core::error::{BuildError, ErgError, PersistError};

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingActuator => {
                "What happened: No brake actuator was provided to the control task.\nLikely causes: The actuator failed to initialize or was not wired into the builder.\nHow to fix: Check the [hardware] pins or run without the hardware feature.".to_string()
            }
            BuildError::MissingStorage => {
                "What happened: No table storage was provided to the control task.\nLikely causes: The storage directory could not be opened.\nHow to fix: Check [storage].dir exists and is writable.".to_string()
            }
            BuildError::MissingState => {
                "What happened: The control task has no trainer state to read.\nLikely causes: Internal wiring error.\nHow to fix: Re-run with --log-level=debug and report the log.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See README for a sample."
            ),
        };
    }

    if let Some(pe) = err.downcast_ref::<PersistError>() {
        return format!(
            "What happened: The saved power table cannot be read ({pe}).\nLikely causes: The grid size or table version changed since it was written.\nHow to fix: Run `erg table reset`, or restore the matching [table] settings."
        );
    }

    if let Some(ee) = err.downcast_ref::<ErgError>() {
        return match ee {
            ErgError::Timeout => "What happened: The brake did not report its position in time.\nLikely causes: Stepper wiring or power, or actuator_poll_ms too low.\nHow to fix: Verify the [hardware] pins and raise timing.actuator_poll_ms.".to_string(),
            ErgError::Storage(msg) => format!(
                "What happened: Table storage failed ({msg}).\nLikely causes: Missing directory or no write permission.\nHow to fix: Check [storage].dir and its permissions."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("table csv must have headers") {
        return "Invalid headers in table CSV. Expected 'cadence,watts,position'.".to_string();
    }

    if lower.contains("invalid csv row") {
        return format!(
            "What happened: {msg}.\nLikely causes: A non-numeric or missing value.\nHow to fix: Every row needs integer cadence, watts and position."
        );
    }

    if lower.starts_with("table.")
        || lower.starts_with("erg.")
        || lower.starts_with("resistance.")
        || lower.starts_with("timing.")
        || lower.starts_with("storage.")
        || lower.starts_with("simulator.")
        || lower.contains("parse config")
    {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nLikely causes: Out-of-range or mistyped values in the TOML.\nHow to fix: Edit the config file and try again."
        );
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use erg_core::error::{BuildError, ErgError, PersistError};

    let reason = if err.downcast_ref::<BuildError>().is_some() {
        "Build"
    } else if err.downcast_ref::<PersistError>().is_some() {
        "TableFile"
    } else if let Some(ErgError::Timeout) = err.downcast_ref::<ErgError>() {
        "Timeout"
    } else if err.downcast_ref::<ErgError>().is_some() {
        "Control"
    } else {
        "Error"
    };
    serde_json::json!({ "reason": reason, "message": humanize(err) }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use erg_core::error::{BuildError, PersistError};

    #[test]
    fn typed_errors_get_specific_hints() {
        let e = eyre::Report::new(BuildError::InvalidConfig("timing.period_ms must be > 0"));
        assert!(humanize(&e).contains("timing.period_ms"));

        let e = eyre::Report::new(PersistError::VersionMismatch {
            expected: 1,
            found: 7,
        });
        assert!(humanize(&e).contains("erg table reset"));
    }

    #[test]
    fn json_carries_reason_and_message() {
        let e = eyre::eyre!("table.watt_size must be >= 2");
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&e)).unwrap();
        assert_eq!(v["reason"], "Error");
        assert!(v["message"].as_str().unwrap().contains("Configuration is invalid"));
    }
}
