//! Backend config resolution for the CLI.
//!
//! First source found wins: `--config`, then `INDO_*` variables, then the
//! default config file.

use std::path::{Path, PathBuf};

use indo_core::config::{default_config_path, load_engine_config, EngineConfig};

use crate::error::CliError;

pub fn resolve_engine_config(
    explicit: Option<&Path>,
    queue_override: Option<PathBuf>,
) -> Result<EngineConfig, CliError> {
    let mut config = resolve_from(explicit, EngineConfig::from_env, default_config_path())?;
    if let Some(path) = queue_override {
        config.queue_path = Some(path);
    }
    Ok(config)
}

pub fn resolve_from(
    explicit: Option<&Path>,
    from_env: impl FnOnce() -> indo_core::Result<Option<EngineConfig>>,
    default_path: Option<PathBuf>,
) -> Result<EngineConfig, CliError> {
    if let Some(path) = explicit {
        return Ok(load_engine_config(path)?);
    }
    if let Some(config) = from_env()? {
        return Ok(config);
    }

    match default_path {
        Some(path) if path.is_file() => Ok(load_engine_config(&path)?),
        Some(path) => Err(CliError::NotConfigured(path.display().to_string())),
        None => Err(CliError::Config(
            "no config directory available on this platform".to_string(),
        )),
    }
}
