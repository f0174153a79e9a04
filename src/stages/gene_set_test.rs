// src/stages/gene_set_test.rs

//! Per-partition gene test (`magma --batch <key> chr`).

use crate::errors::Result;
use crate::exec::launcher::ExternalCommand;
use crate::stages::{MagmaTool, ProgressEvent, StageKind};
use crate::task::{
    ArtifactRecord, BoxFuture, PartitionKey, ResourceHints, Task, TaskContext, TaskOutput,
};

/// Input carrying the gene annotation artifact.
pub const ANNOTATION: &str = "annotation";
/// Input carrying the summary-statistics path passed to `--pval`.
pub const PVAL: &str = "pval";
pub const SAMPLE_SIZE: &str = "sample_size";

/// Record keys of a batch result.
pub const RAW: &str = "raw";
pub const OUT: &str = "out";
pub const LOG: &str = "log";

/// File names MAGMA writes for one batch under the `magma` prefix.
pub fn batch_file_names(partition: &PartitionKey) -> [(&'static str, String); 3] {
    let stem = format!("magma.batch{partition}_chr");
    [
        (RAW, format!("{stem}.genes.raw")),
        (OUT, format!("{stem}.genes.out")),
        (LOG, format!("{stem}.log")),
    ]
}

#[derive(Debug, Clone)]
pub struct TestGeneSets {
    magma: MagmaTool,
    partition: PartitionKey,
    resources: ResourceHints,
}

impl TestGeneSets {
    pub fn new(magma: MagmaTool, partition: PartitionKey, resources: ResourceHints) -> Self {
        Self {
            magma,
            partition,
            resources,
        }
    }
}

impl Task for TestGeneSets {
    fn kind(&self) -> StageKind {
        StageKind::GeneSetTest {
            partition: self.partition.clone(),
        }
    }

    fn resources(&self) -> ResourceHints {
        self.resources
    }

    fn run<'a>(&'a self, ctx: &'a mut TaskContext) -> BoxFuture<'a, Result<TaskOutput>> {
        Box::pin(async move {
            ctx.report(ProgressEvent::TestingPartition {
                partition: self.partition.clone(),
            });

            let annotation = ctx.artifact(ANNOTATION)?.clone();
            let local_annot = ctx.materialize(&annotation, "magma.genes.annot")?;
            let pval = ctx.literal(PVAL)?.to_string();
            let sample_size = ctx.literal(SAMPLE_SIZE)?.to_string();
            let out_prefix = ctx.scratch_dir().join("magma");

            let cmd = ExternalCommand::new(&self.magma.program)
                .arg("--bfile")
                .arg(&self.magma.reference)
                .args(["--batch", self.partition.as_str(), "chr"])
                .arg("--pval")
                .arg(&pval)
                .arg(format!("N={sample_size}"))
                .arg("--gene-annot")
                .arg(&local_annot)
                .arg("--gene-settings")
                .arg(&self.magma.gene_settings)
                .arg("--out")
                .arg(&out_prefix)
                .current_dir(ctx.scratch_dir());

            ctx.run_command(&cmd).await?;

            let mut record = ArtifactRecord::for_partition(self.partition.clone());
            for (key, file_name) in batch_file_names(&self.partition) {
                let handle = ctx.put_file(&ctx.scratch_dir().join(file_name))?;
                record = record.with(key, handle);
            }
            Ok(TaskOutput::Record(record))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_files_follow_magma_naming() {
        let names = batch_file_names(&PartitionKey::new("7"));
        assert_eq!(names[0].1, "magma.batch7_chr.genes.raw");
        assert_eq!(names[1].1, "magma.batch7_chr.genes.out");
        assert_eq!(names[2].1, "magma.batch7_chr.log");
    }
}
