// src/stages/mod.rs

//! The MAGMA gene-set analysis stages and the pipeline that wires them.
//!
//! - [`snp_location`] turns summary statistics into a SNP location file.
//! - [`annotate`] maps SNPs to genes.
//! - [`gene_set_test`] tests one partition (chromosome batch).
//! - [`merge`] joins every partition's results.
//! - [`pipeline`] builds the task graph from a validated config.

pub mod annotate;
pub mod gene_set_test;
pub mod merge;
pub mod pipeline;
pub mod snp_location;

use std::fmt;
use std::path::PathBuf;

use crate::task::PartitionKey;

pub use annotate::AnnotateSummaryStats;
pub use gene_set_test::TestGeneSets;
pub use merge::MergeTestSets;
pub use pipeline::build_pipeline;
pub use snp_location::MakeSnpLocationFile;

/// Closed set of stage identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StageKind {
    SnpLocation,
    Annotation,
    GeneSetTest { partition: PartitionKey },
    Merge,
}

impl StageKind {
    /// Key of the `[resources.<key>]` config table for this stage.
    pub fn resource_key(&self) -> &'static str {
        match self {
            StageKind::SnpLocation => "snp_location",
            StageKind::Annotation => "annotation",
            StageKind::GeneSetTest { .. } => "gene_set_test",
            StageKind::Merge => "merge",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::SnpLocation => f.write_str("make_snp_location_file"),
            StageKind::Annotation => f.write_str("annotate_summary_stats"),
            StageKind::GeneSetTest { partition } => write!(f, "test_gene_sets[{partition}]"),
            StageKind::Merge => f.write_str("merge_test_sets"),
        }
    }
}

/// Structured progress reported by the stages while they run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    CreatingSnpLocations { input: PathBuf },
    SnpLocationsWritten { lines: u64 },
    Annotating,
    TestingPartition { partition: PartitionKey },
    MergingResults { partitions: usize },
    ResultsWritten { dir: PathBuf },
}

impl ProgressEvent {
    /// Stage that emits this event.
    pub fn stage(&self) -> StageKind {
        match self {
            ProgressEvent::CreatingSnpLocations { .. }
            | ProgressEvent::SnpLocationsWritten { .. } => StageKind::SnpLocation,
            ProgressEvent::Annotating => StageKind::Annotation,
            ProgressEvent::TestingPartition { partition } => StageKind::GeneSetTest {
                partition: partition.clone(),
            },
            ProgressEvent::MergingResults { .. } | ProgressEvent::ResultsWritten { .. } => {
                StageKind::Merge
            }
        }
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::CreatingSnpLocations { input } => {
                write!(f, "Creating SNP location file from {}", input.display())
            }
            ProgressEvent::SnpLocationsWritten { lines } => {
                write!(f, "Wrote {lines} SNP locations")
            }
            ProgressEvent::Annotating => {
                f.write_str("Annotating summary statistics with gene-membership")
            }
            ProgressEvent::TestingPartition { partition } => {
                write!(f, "Testing genes on chr{partition}")
            }
            ProgressEvent::MergingResults { partitions } => {
                write!(f, "Merging test results of {partitions} partitions")
            }
            ProgressEvent::ResultsWritten { dir } => {
                write!(f, "Wrote merged results to {}", dir.display())
            }
        }
    }
}

/// Location of the MAGMA binary and its reference data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagmaTool {
    pub program: PathBuf,
    /// Gene location reference (`--gene-loc`).
    pub gene_loc: PathBuf,
    /// PLINK reference panel prefix (`--bfile`).
    pub reference: PathBuf,
    /// Value passed to `--gene-settings`.
    pub gene_settings: String,
    /// Optional `window=` modifier for `--annotate`.
    pub annotate_window: Option<String>,
}

/// Resource hints used when `[resources.<stage>]` is absent.
pub fn default_resources(kind: &StageKind) -> crate::task::ResourceHints {
    use crate::task::{ByteSize, ResourceHints};
    match kind {
        StageKind::Annotation => ResourceHints {
            memory: ByteSize::gib(1),
            cores: 1,
            disk: ByteSize::mib(100),
        },
        _ => ResourceHints::default(),
    }
}
