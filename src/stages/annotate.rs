// src/stages/annotate.rs

//! Gene annotation: maps every SNP location to the genes it falls in.

use tracing::debug;

use crate::errors::Result;
use crate::exec::launcher::ExternalCommand;
use crate::stages::{MagmaTool, ProgressEvent, StageKind};
use crate::task::{BoxFuture, ResourceHints, Task, TaskContext, TaskOutput};

/// Input name carrying the SNP location artifact.
pub const SNP_LOC: &str = "snp_loc";

#[derive(Debug, Clone)]
pub struct AnnotateSummaryStats {
    magma: MagmaTool,
    resources: ResourceHints,
}

impl AnnotateSummaryStats {
    pub fn new(magma: MagmaTool, resources: ResourceHints) -> Self {
        Self { magma, resources }
    }
}

impl Task for AnnotateSummaryStats {
    fn kind(&self) -> StageKind {
        StageKind::Annotation
    }

    fn resources(&self) -> ResourceHints {
        self.resources
    }

    fn run<'a>(&'a self, ctx: &'a mut TaskContext) -> BoxFuture<'a, Result<TaskOutput>> {
        Box::pin(async move {
            ctx.report(ProgressEvent::Annotating);

            let snp_loc = ctx.artifact(SNP_LOC)?.clone();
            let local_snp_loc = ctx.materialize(&snp_loc, "snp.loc")?;
            let out_prefix = ctx.scratch_dir().join("magma");

            let mut annotate = ExternalCommand::new(&self.magma.program).arg("--annotate");
            if let Some(window) = &self.magma.annotate_window {
                annotate = annotate.arg(format!("window={window}"));
            }
            let cmd = annotate
                .arg("--snp-loc")
                .arg(&local_snp_loc)
                .arg("--gene-loc")
                .arg(&self.magma.gene_loc)
                .arg("--out")
                .arg(&out_prefix)
                .current_dir(ctx.scratch_dir());

            ctx.run_command(&cmd).await?;

            let annot = ctx.scratch_dir().join("magma.genes.annot");
            debug!(path = %annot.display(), "storing gene annotation");
            let handle = ctx.put_file(&annot)?;
            Ok(TaskOutput::Artifact(handle))
        })
    }
}
