// src/config/loader.rs

use std::path::Path;

use tracing::debug;

use crate::config::model::{ConfigFile, ConfigOverrides, RawConfigFile};
use crate::errors::Result;

/// Parse a pipeline TOML file as written, before overrides and checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let raw = toml::from_str::<RawConfigFile>(&text)?;
    debug!(path = %path.display(), "parsed pipeline config");
    Ok(raw)
}

/// Parse, layer the command-line `overrides` over `[run]`, then validate.
///
/// Validation errors surface as `PipelineError::Configuration` and name the
/// offending key.
pub fn load_and_validate(path: impl AsRef<Path>, overrides: &ConfigOverrides) -> Result<ConfigFile> {
    let mut raw = load_from_path(path)?;
    raw.apply_overrides(overrides);
    ConfigFile::try_from(raw)
}
