// src/stages/merge.rs

//! Fan-in: merges every partition's batch results into one result set and
//! writes it to the durable output directory.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::errors::{PipelineError, Result};
use crate::exec::launcher::ExternalCommand;
use crate::stages::gene_set_test::{LOG, OUT, RAW, batch_file_names};
use crate::stages::{MagmaTool, ProgressEvent, StageKind};
use crate::task::{ArtifactRecord, BoxFuture, ResourceHints, Task, TaskContext, TaskOutput};

/// Input carrying the ordered batch result records.
pub const BATCHES: &str = "batches";

/// Merged files MAGMA writes under the `merge` prefix, by record key.
const MERGED_FILES: [(&str, &str); 3] = [
    (RAW, "merge.genes.raw"),
    (OUT, "merge.genes.out"),
    (LOG, "merge.log"),
];

/// Durable file paths for the merged results under `dir`.
pub fn durable_paths(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    vec![
        dir.join(format!("{prefix}.genes.raw")),
        dir.join(format!("{prefix}.genes.out")),
        dir.join(format!("{prefix}.log")),
    ]
}

#[derive(Debug, Clone)]
pub struct MergeTestSets {
    magma: MagmaTool,
    output_dir: Option<PathBuf>,
    output_prefix: String,
    resources: ResourceHints,
}

impl MergeTestSets {
    pub fn new(magma: MagmaTool, resources: ResourceHints) -> Self {
        Self {
            magma,
            output_dir: None,
            output_prefix: "magma".to_string(),
            resources,
        }
    }

    /// Also write the merged files to `dir` as `<prefix>.genes.raw`,
    /// `<prefix>.genes.out` and `<prefix>.log`.
    pub fn with_output(mut self, dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        self.output_dir = Some(dir.into());
        self.output_prefix = prefix.into();
        self
    }
}

fn batch_record<'o>(output: &'o TaskOutput, index: usize) -> Result<&'o ArtifactRecord> {
    output
        .as_record()
        .filter(|r| r.partition.is_some())
        .ok_or_else(|| {
            PipelineError::UnsatisfiedDependency(format!(
                "batch input {index} is not a partition result record"
            ))
        })
}

impl Task for MergeTestSets {
    fn kind(&self) -> StageKind {
        StageKind::Merge
    }

    fn resources(&self) -> ResourceHints {
        self.resources
    }

    fn run<'a>(&'a self, ctx: &'a mut TaskContext) -> BoxFuture<'a, Result<TaskOutput>> {
        Box::pin(async move {
            let batches = ctx.collected(BATCHES)?.to_vec();
            ctx.report(ProgressEvent::MergingResults {
                partitions: batches.len(),
            });

            for (index, output) in batches.iter().enumerate() {
                let record = batch_record(output, index)?;
                let Some(partition) = &record.partition else {
                    continue;
                };
                for (key, file_name) in batch_file_names(partition) {
                    let handle = record.get(key).ok_or_else(|| {
                        PipelineError::UnsatisfiedDependency(format!(
                            "batch result for partition {partition} has no '{key}' artifact"
                        ))
                    })?;
                    ctx.materialize(handle, &file_name)?;
                }
            }

            let cmd = ExternalCommand::new(&self.magma.program)
                .arg("--merge")
                .arg(ctx.scratch_dir().join("magma"))
                .arg("--out")
                .arg(ctx.scratch_dir().join("merge"))
                .current_dir(ctx.scratch_dir());

            ctx.run_command(&cmd).await?;

            let mut merged = ArtifactRecord::default();
            for (key, file_name) in MERGED_FILES {
                let handle = ctx.put_file(&ctx.scratch_dir().join(file_name))?;
                merged = merged.with(key, handle);
            }

            if let Some(dir) = &self.output_dir {
                let paths = durable_paths(dir, &self.output_prefix);
                for ((key, _), dest) in MERGED_FILES.iter().zip(&paths) {
                    if let Some(handle) = merged.get(key) {
                        ctx.store().materialize(handle, dest)?;
                    }
                }
                info!(dir = %dir.display(), prefix = %self.output_prefix, "merged results written");
                ctx.report(ProgressEvent::ResultsWritten { dir: dir.clone() });
            }

            Ok(TaskOutput::Record(merged))
        })
    }
}
