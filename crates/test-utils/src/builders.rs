#![allow(dead_code)]

use std::path::{Path, PathBuf};

use genedag::config::{ConfigFile, RawConfigFile, ResourceSection};
use genedag::types::{CleanPolicy, ExecutionMode, ResourceContext};

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from a config that validates: tool paths, an input and a sample
/// size are filled with placeholders, and partitions are `1`, `2`, `3`.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        let mut config = RawConfigFile::default();
        config.run.input = Some(PathBuf::from("daner.txt"));
        config.run.sample_size = Some(1000);
        config.run.max_parallel = Some(4);
        config.tools.magma = Some(PathBuf::from("magma"));
        config.tools.gene_loc = Some(PathBuf::from("NCBI37.3.gene.loc"));
        config.tools.reference = Some(PathBuf::from("g1000_eur"));
        config.pipeline.partitions = vec!["1".into(), "2".into(), "3".into()];
        Self { config }
    }

    pub fn with_magma(mut self, path: impl AsRef<Path>) -> Self {
        self.config.tools.magma = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_gene_loc(mut self, path: impl AsRef<Path>) -> Self {
        self.config.tools.gene_loc = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_input(mut self, path: impl AsRef<Path>) -> Self {
        self.config.run.input = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn without_input(mut self) -> Self {
        self.config.run.input = None;
        self
    }

    pub fn with_sample_size(mut self, n: u64) -> Self {
        self.config.run.sample_size = Some(n);
        self
    }

    pub fn with_partitions(mut self, keys: &[&str]) -> Self {
        self.config.pipeline.partitions = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.run.output_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_output_prefix(mut self, prefix: &str) -> Self {
        self.config.pipeline.output_prefix = prefix.to_string();
        self
    }

    pub fn with_store_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.run.store_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_clean(mut self, clean: CleanPolicy) -> Self {
        self.config.run.clean = clean;
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode, context: ResourceContext) -> Self {
        self.config.run.mode = mode;
        self.config.run.context = context;
        self
    }

    pub fn with_max_parallel(mut self, n: usize) -> Self {
        self.config.run.max_parallel = Some(n);
        self
    }

    pub fn with_resources(mut self, stage: &str, memory: &str, cores: u32) -> Self {
        self.config.resources.insert(
            stage.to_string(),
            ResourceSection {
                memory: Some(memory.to_string()),
                cores: Some(cores),
                disk: None,
            },
        );
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> genedag::errors::Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
