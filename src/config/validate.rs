// src/config/validate.rs

use crate::config::model::{RawSettings, Settings};
use crate::errors::{DagError, Result};
use crate::types::EngineKind;

impl TryFrom<RawSettings> for Settings {
    type Error = DagError;

    fn try_from(raw: RawSettings) -> std::result::Result<Self, Self::Error> {
        let engine = validate_raw_settings(&raw)?;
        Ok(Settings::from_valid_raw(raw, engine))
    }
}

/// Check every section and return the parsed engine kind.
fn validate_raw_settings(raw: &RawSettings) -> Result<EngineKind> {
    let engine = validate_engine(raw)?;
    validate_dag_section(raw)?;
    validate_local_section(raw)?;
    Ok(engine)
}

fn validate_engine(raw: &RawSettings) -> Result<EngineKind> {
    raw.dag
        .engine
        .parse::<EngineKind>()
        .map_err(DagError::UnsupportedEngine)
}

fn validate_dag_section(raw: &RawSettings) -> Result<()> {
    if raw.dag.num_cores == 0 {
        return Err(DagError::Config(
            "[dag].num_cores must be >= 1 (got 0)".to_string(),
        ));
    }
    if raw.dag.lock_timeout_secs == 0 {
        return Err(DagError::Config(
            "[dag].lock_timeout_secs must be >= 1 (got 0)".to_string(),
        ));
    }
    if raw.dag.file.as_os_str().is_empty() {
        return Err(DagError::Config("[dag].file must not be empty".to_string()));
    }
    Ok(())
}

fn validate_local_section(raw: &RawSettings) -> Result<()> {
    let intervals = [
        ("poll_interval_ms", raw.local.poll_interval_ms),
        ("kill_poll_interval_ms", raw.local.kill_poll_interval_ms),
        ("attach_poll_interval_ms", raw.local.attach_poll_interval_ms),
    ];
    for (key, value) in intervals {
        if value == 0 {
            return Err(DagError::Config(format!(
                "[local].{key} must be > 0 (got 0)"
            )));
        }
    }
    Ok(())
}
