// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::stages::{MagmaTool, StageKind, default_resources};
use crate::task::{PartitionKey, ResourceHints};
use crate::types::{CleanPolicy, ExecutionMode, ResourceContext};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [run]
/// mode = "local"
/// input = "daner_scz.gz"
/// sample_size = 40000
/// output_dir = "results"
///
/// [tools]
/// magma = "/opt/magma/magma"
/// gene_loc = "/opt/magma/NCBI37.3.gene.loc"
/// reference = "/opt/magma/g1000_eur"
///
/// [pipeline]
/// partitions = ["1", "2", "3"]
///
/// [resources.annotation]
/// memory = "2G"
/// ```
///
/// All sections are optional and have reasonable defaults; required values
/// are checked when converting into a [`ConfigFile`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub run: RunSection,

    #[serde(default)]
    pub tools: ToolsSection,

    #[serde(default)]
    pub pipeline: PipelineSection,

    /// Per-stage overrides from `[resources.<stage>]`.
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceSection>,
}

/// `[run]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RunSection {
    #[serde(default)]
    pub mode: ExecutionMode,

    #[serde(default)]
    pub context: ResourceContext,

    /// Summary-statistics file (plain or gzip).
    #[serde(default)]
    pub input: Option<PathBuf>,

    #[serde(default)]
    pub sample_size: Option<u64>,

    /// Where the merged results are written.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Parent directory of per-run artifact store instances.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    #[serde(default)]
    pub clean: CleanPolicy,

    /// Maximum number of tasks running at once; defaults to the number of
    /// available CPUs.
    #[serde(default)]
    pub max_parallel: Option<usize>,

    /// Walltime requested from PBS (`lisa` context).
    #[serde(default = "default_walltime")]
    pub walltime: String,

    /// Submission binary for grid modes.
    #[serde(default = "default_qsub")]
    pub qsub: PathBuf,

    /// Used to delete queued or running jobs of terminated tasks.
    #[serde(default = "default_qdel")]
    pub qdel: PathBuf,
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(".genedag/store")
}

fn default_walltime() -> String {
    "01:00:00".to_string()
}

fn default_qsub() -> PathBuf {
    PathBuf::from("qsub")
}

fn default_qdel() -> PathBuf {
    PathBuf::from("qdel")
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            context: ResourceContext::default(),
            input: None,
            sample_size: None,
            output_dir: None,
            store_dir: default_store_dir(),
            clean: CleanPolicy::default(),
            max_parallel: None,
            walltime: default_walltime(),
            qsub: default_qsub(),
            qdel: default_qdel(),
        }
    }
}

/// `[tools]` section: the MAGMA binary and its reference data.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    #[serde(default)]
    pub magma: Option<PathBuf>,

    #[serde(default)]
    pub gene_loc: Option<PathBuf>,

    /// PLINK reference panel prefix.
    #[serde(default)]
    pub reference: Option<PathBuf>,

    #[serde(default = "default_gene_settings")]
    pub gene_settings: String,

    #[serde(default)]
    pub annotate_window: Option<String>,
}

fn default_gene_settings() -> String {
    "snp-min-maf=0.05".to_string()
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            magma: None,
            gene_loc: None,
            reference: None,
            gene_settings: default_gene_settings(),
            annotate_window: None,
        }
    }
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    /// Fan-out partition keys, in merge order.
    #[serde(default = "default_partitions")]
    pub partitions: Vec<String>,

    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,
}

/// Autosomes 1 to 22.
pub fn default_partitions() -> Vec<String> {
    (1..=22).map(|c| c.to_string()).collect()
}

fn default_output_prefix() -> String {
    "magma".to_string()
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            partitions: default_partitions(),
            output_prefix: default_output_prefix(),
        }
    }
}

/// `[resources.<stage>]` section. Sizes are strings like `"100M"`, `"1G"`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceSection {
    #[serde(default)]
    pub memory: Option<String>,
    #[serde(default)]
    pub cores: Option<u32>,
    #[serde(default)]
    pub disk: Option<String>,
}

/// Values given on the command line; each one replaces its `[run]` field.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub input: Option<PathBuf>,
    pub sample_size: Option<u64>,
    pub output_dir: Option<PathBuf>,
    pub mode: Option<ExecutionMode>,
    pub context: Option<ResourceContext>,
    pub store_dir: Option<PathBuf>,
    pub max_parallel: Option<usize>,
}

impl RawConfigFile {
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        let run = &mut self.run;
        if let Some(input) = &overrides.input {
            run.input = Some(input.clone());
        }
        if let Some(n) = overrides.sample_size {
            run.sample_size = Some(n);
        }
        if let Some(dir) = &overrides.output_dir {
            run.output_dir = Some(dir.clone());
        }
        if let Some(mode) = overrides.mode {
            run.mode = mode;
        }
        if let Some(context) = overrides.context {
            run.context = context;
        }
        if let Some(dir) = &overrides.store_dir {
            run.store_dir = dir.clone();
        }
        if let Some(n) = overrides.max_parallel {
            run.max_parallel = Some(n);
        }
    }
}

/// Validated `[run]` settings.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: ExecutionMode,
    pub context: ResourceContext,
    pub input: PathBuf,
    pub sample_size: u64,
    pub output_dir: Option<PathBuf>,
    pub store_dir: PathBuf,
    pub clean: CleanPolicy,
    pub max_parallel: usize,
    pub walltime: String,
    pub qsub: PathBuf,
    pub qdel: PathBuf,
}

/// Validated configuration. Build it from a [`RawConfigFile`] with
/// `ConfigFile::try_from`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub run: RunConfig,
    pub magma: MagmaTool,
    /// Partition keys in declaration (merge) order.
    pub partitions: Vec<PartitionKey>,
    pub output_prefix: String,
    /// Resolved overrides keyed by stage resource key.
    resources: BTreeMap<String, ResourceHints>,
}

impl ConfigFile {
    /// Assemble a config from already validated parts.
    pub fn new_unchecked(
        run: RunConfig,
        magma: MagmaTool,
        partitions: Vec<PartitionKey>,
        output_prefix: String,
        resources: BTreeMap<String, ResourceHints>,
    ) -> Self {
        Self {
            run,
            magma,
            partitions,
            output_prefix,
            resources,
        }
    }

    /// Resource hints for a stage: the configured override, else the stage
    /// default.
    pub fn resources_for(&self, kind: &StageKind) -> ResourceHints {
        self.resources
            .get(kind.resource_key())
            .copied()
            .unwrap_or_else(|| default_resources(kind))
    }
}
