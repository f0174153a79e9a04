// src/config/validate.rs

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile, ResourceSection, RunConfig};
use crate::errors::{PipelineError, Result};
use crate::stages::{MagmaTool, StageKind, default_resources};
use crate::task::{ByteSize, PartitionKey, ResourceHints};
use crate::types::is_supported;

/// Stage keys accepted under `[resources.<stage>]`, with a representative
/// stage kind for defaults.
fn stage_for_resource_key(key: &str) -> Option<StageKind> {
    match key {
        "snp_location" => Some(StageKind::SnpLocation),
        "annotation" => Some(StageKind::Annotation),
        "gene_set_test" => Some(StageKind::GeneSetTest {
            partition: PartitionKey::new(""),
        }),
        "merge" => Some(StageKind::Merge),
        _ => None,
    }
}

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = PipelineError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let run = validate_run(&raw)?;
        let magma = validate_tools(&raw)?;
        let partitions = validate_partitions(&raw)?;
        validate_output_prefix(&raw.pipeline.output_prefix)?;
        let resources = validate_resources(&raw.resources)?;

        Ok(ConfigFile::new_unchecked(
            run,
            magma,
            partitions,
            raw.pipeline.output_prefix,
            resources,
        ))
    }
}

fn config_error(msg: impl Into<String>) -> PipelineError {
    PipelineError::Configuration(msg.into())
}

fn validate_run(raw: &RawConfigFile) -> Result<RunConfig> {
    let run = &raw.run;

    if !is_supported(run.mode, run.context) {
        return Err(config_error(format!(
            "execution mode '{}' is not supported with context '{}' (use \"local\", or \"drmaa\" with context \"broad\" or \"lisa\")",
            run.mode, run.context
        )));
    }

    let input = run
        .input
        .as_deref()
        .ok_or_else(|| config_error("[run].input (summary statistics file) is required"))?;
    let input = anchored(input, "[run].input")?;

    let sample_size = match run.sample_size {
        None => return Err(config_error("[run].sample_size is required")),
        Some(0) => return Err(config_error("[run].sample_size must be >= 1 (got 0)")),
        Some(n) => n,
    };

    let max_parallel = match run.max_parallel {
        Some(0) => return Err(config_error("[run].max_parallel must be >= 1 (got 0)")),
        Some(n) => n,
        None => std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
    };

    if run.walltime.trim().is_empty() {
        return Err(config_error("[run].walltime must not be empty"));
    }

    let output_dir = run
        .output_dir
        .as_deref()
        .map(|dir| anchored(dir, "[run].output_dir"))
        .transpose()?;

    Ok(RunConfig {
        mode: run.mode,
        context: run.context,
        input,
        sample_size,
        output_dir,
        store_dir: anchored(&run.store_dir, "[run].store_dir")?,
        clean: run.clean,
        max_parallel,
        walltime: run.walltime.clone(),
        qsub: program_path(&run.qsub, "[run].qsub")?,
        qdel: program_path(&run.qdel, "[run].qdel")?,
    })
}

/// Resolve `path` against the working directory. Commands run inside task
/// scratch directories, so relative paths would point elsewhere there.
fn anchored(path: &Path, field: &str) -> Result<PathBuf> {
    std::path::absolute(path)
        .map_err(|e| config_error(format!("{field}: cannot resolve {}: {e}", path.display())))
}

/// Bare program names stay as they are and are looked up on `PATH` at
/// launch; anything with a directory part is anchored.
fn program_path(path: &Path, field: &str) -> Result<PathBuf> {
    if path.components().count() > 1 {
        anchored(path, field)
    } else {
        Ok(path.to_path_buf())
    }
}

fn required_path(value: &Option<PathBuf>, field: &str) -> Result<PathBuf> {
    value
        .clone()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| config_error(format!("[tools].{field} is required")))
}

fn validate_tools(raw: &RawConfigFile) -> Result<MagmaTool> {
    let tools = &raw.tools;
    Ok(MagmaTool {
        program: program_path(&required_path(&tools.magma, "magma")?, "[tools].magma")?,
        gene_loc: anchored(&required_path(&tools.gene_loc, "gene_loc")?, "[tools].gene_loc")?,
        reference: anchored(&required_path(&tools.reference, "reference")?, "[tools].reference")?,
        gene_settings: tools.gene_settings.clone(),
        annotate_window: tools.annotate_window.clone(),
    })
}

fn validate_partitions(raw: &RawConfigFile) -> Result<Vec<PartitionKey>> {
    let keys = &raw.pipeline.partitions;
    if keys.is_empty() {
        return Err(config_error("[pipeline].partitions must not be empty"));
    }

    let mut seen = BTreeSet::new();
    for key in keys {
        if key.is_empty() || key.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(config_error(format!(
                "invalid partition key {key:?} (must be non-empty, without whitespace or '/')"
            )));
        }
        if !seen.insert(key.as_str()) {
            return Err(config_error(format!("duplicate partition key '{key}'")));
        }
    }

    Ok(keys.iter().map(PartitionKey::new).collect())
}

fn validate_output_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() || prefix.contains('/') {
        return Err(config_error(format!(
            "invalid [pipeline].output_prefix {prefix:?}"
        )));
    }
    Ok(())
}

fn parse_size(stage: &str, field: &str, value: &str) -> Result<ByteSize> {
    value.parse::<ByteSize>().map_err(|e| {
        config_error(format!("[resources.{stage}].{field}: {e}"))
    })
}

fn validate_resources(
    sections: &BTreeMap<String, ResourceSection>,
) -> Result<BTreeMap<String, ResourceHints>> {
    let mut resolved = BTreeMap::new();

    for (key, section) in sections {
        let stage = stage_for_resource_key(key).ok_or_else(|| {
            config_error(format!(
                "unknown stage '{key}' in [resources] (expected snp_location, annotation, gene_set_test or merge)"
            ))
        })?;

        let mut hints = default_resources(&stage);
        if let Some(memory) = &section.memory {
            hints.memory = parse_size(key, "memory", memory)?;
        }
        if let Some(disk) = &section.disk {
            hints.disk = parse_size(key, "disk", disk)?;
        }
        if let Some(cores) = section.cores {
            if cores == 0 {
                return Err(config_error(format!(
                    "[resources.{key}].cores must be >= 1 (got 0)"
                )));
            }
            hints.cores = cores;
        }

        resolved.insert(key.clone(), hints);
    }

    Ok(resolved)
}

impl ConfigFile {
    /// Check that the files a run reads up front are present, so a typo
    /// fails the run before any task is started.
    ///
    /// Kept out of `TryFrom` so configs can be validated (and dry-run) on a
    /// machine without the data.
    pub fn check_inputs(&self) -> Result<()> {
        require_file(&self.run.input, "[run].input")?;
        require_file(&self.magma.gene_loc, "[tools].gene_loc")?;
        if self.magma.program.components().count() > 1 {
            require_file(&self.magma.program, "[tools].magma")?;
        }
        Ok(())
    }
}

fn require_file(path: &Path, field: &str) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(config_error(format!("{field}: {} does not exist", path.display())))
    }
}
