// src/config/mod.rs

//! Pipeline configuration: a TOML file plus command-line overrides.
//!
//! [`model`] holds both the raw serde shape and the validated
//! [`ConfigFile`]; [`validate`] is the conversion between them.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{
    ConfigFile, ConfigOverrides, PipelineSection, RawConfigFile, ResourceSection, RunConfig,
    RunSection, ToolsSection,
};
