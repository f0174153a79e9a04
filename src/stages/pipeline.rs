// src/stages/pipeline.rs

//! Wires the stages into the MAGMA task graph:
//!
//! ```text
//! make_snp_location_file
//!   └─ child ─ annotate_summary_stats
//!                └─ child ─ test_gene_sets[k]   (one per partition)
//!   └─ follow-on ─ merge_test_sets              (after the whole subtree)
//! ```

use std::sync::Arc;

use tracing::info;

use crate::config::ConfigFile;
use crate::dag::{DagGraph, TaskSpec};
use crate::errors::Result;
use crate::stages::{
    annotate, gene_set_test, merge, snp_location, AnnotateSummaryStats, MakeSnpLocationFile,
    MergeTestSets, StageKind, TestGeneSets,
};
use crate::task::InputBinding;

/// Build the validated graph for `cfg`.
pub fn build_pipeline(cfg: &ConfigFile) -> Result<DagGraph> {
    let mut graph = DagGraph::new();
    let input = cfg.run.input.display().to_string();

    let snp = graph.add_task(
        TaskSpec::new(
            StageKind::SnpLocation.to_string(),
            Arc::new(MakeSnpLocationFile::new(
                cfg.resources_for(&StageKind::SnpLocation),
            )),
        )
        .bind(snp_location::INPUT, InputBinding::literal(&input)),
    );

    let annotate = graph.add_task(
        TaskSpec::new(
            StageKind::Annotation.to_string(),
            Arc::new(AnnotateSummaryStats::new(
                cfg.magma.clone(),
                cfg.resources_for(&StageKind::Annotation),
            )),
        )
        .bind(annotate::SNP_LOC, InputBinding::Output(snp)),
    );
    graph.add_child(snp, annotate)?;

    let mut tests = Vec::with_capacity(cfg.partitions.len());
    for partition in &cfg.partitions {
        let kind = StageKind::GeneSetTest {
            partition: partition.clone(),
        };
        let test = graph.add_task(
            TaskSpec::new(
                kind.to_string(),
                Arc::new(TestGeneSets::new(
                    cfg.magma.clone(),
                    partition.clone(),
                    cfg.resources_for(&kind),
                )),
            )
            .bind(gene_set_test::ANNOTATION, InputBinding::Output(annotate))
            .bind(gene_set_test::PVAL, InputBinding::literal(&input))
            .bind(
                gene_set_test::SAMPLE_SIZE,
                InputBinding::literal(cfg.run.sample_size),
            ),
        );
        graph.add_child(annotate, test)?;
        tests.push(test);
    }

    let mut merge_task = MergeTestSets::new(cfg.magma.clone(), cfg.resources_for(&StageKind::Merge));
    if let Some(dir) = &cfg.run.output_dir {
        merge_task = merge_task.with_output(dir, cfg.output_prefix.clone());
    }
    let merge = graph.add_task(
        TaskSpec::new(StageKind::Merge.to_string(), Arc::new(merge_task))
            .bind(merge::BATCHES, InputBinding::Collect(tests)),
    );
    graph.add_follow_on(snp, merge)?;

    graph.validate()?;
    info!(
        tasks = graph.len(),
        partitions = cfg.partitions.len(),
        "built MAGMA pipeline"
    );
    Ok(graph)
}
