// tests/config_validation.rs

use std::io::Write;
use std::path::PathBuf;

use tempfile::NamedTempFile;

use genedag::config::{ConfigOverrides, load_and_validate, load_from_path};
use genedag::errors::PipelineError;
use genedag::stages::StageKind;
use genedag::task::{ByteSize, PartitionKey};
use genedag::types::{CleanPolicy, ExecutionMode, ResourceContext};
use genedag_test_utils::builders::ConfigFileBuilder;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn toml_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

fn expect_config_error(result: genedag::errors::Result<genedag::config::ConfigFile>, needle: &str) {
    match result {
        Err(PipelineError::Configuration(msg)) => {
            assert!(msg.contains(needle), "expected {needle:?} in {msg:?}");
        }
        Err(e) => panic!("Expected Configuration error, got: {e:?}"),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

const MINIMAL: &str = r#"
[run]
input = "daner_scz.gz"
sample_size = 40000

[tools]
magma = "/opt/magma/magma"
gene_loc = "/opt/magma/NCBI37.3.gene.loc"
reference = "/opt/magma/g1000_eur"
"#;

#[test]
fn minimal_file_gets_defaults() -> TestResult {
    let file = toml_file(MINIMAL);
    let cfg = load_and_validate(file.path(), &ConfigOverrides::default())?;

    assert_eq!(cfg.run.mode, ExecutionMode::Local);
    assert_eq!(cfg.run.context, ResourceContext::Default);
    assert_eq!(cfg.run.clean, CleanPolicy::Always);
    assert_eq!(cfg.run.store_dir, std::env::current_dir()?.join(".genedag/store"));
    assert!(cfg.run.max_parallel >= 1);
    assert_eq!(cfg.partitions.len(), 22);
    assert_eq!(cfg.partitions[0], PartitionKey::new("1"));
    assert_eq!(cfg.partitions[21], PartitionKey::new("22"));
    assert_eq!(cfg.output_prefix, "magma");
    assert_eq!(cfg.magma.gene_settings, "snp-min-maf=0.05");

    let annot = cfg.resources_for(&StageKind::Annotation);
    assert_eq!(annot.memory, ByteSize::gib(1));
    assert_eq!(annot.disk, ByteSize::mib(100));
    Ok(())
}

#[test]
fn overrides_replace_run_values() -> TestResult {
    let file = toml_file(MINIMAL);
    let overrides = ConfigOverrides {
        input: Some(PathBuf::from("other.txt")),
        sample_size: Some(12),
        max_parallel: Some(2),
        ..ConfigOverrides::default()
    };
    let cfg = load_and_validate(file.path(), &overrides)?;

    assert_eq!(cfg.run.input, std::env::current_dir()?.join("other.txt"));
    assert_eq!(cfg.run.sample_size, 12);
    assert_eq!(cfg.run.max_parallel, 2);
    Ok(())
}

#[test]
fn override_can_supply_missing_input() -> TestResult {
    let file = toml_file(
        r#"
[tools]
magma = "magma"
gene_loc = "genes.loc"
reference = "ref"
"#,
    );
    let overrides = ConfigOverrides {
        input: Some(PathBuf::from("daner.txt")),
        sample_size: Some(1),
        ..ConfigOverrides::default()
    };
    assert!(load_and_validate(file.path(), &overrides).is_ok());
    Ok(())
}

#[test]
fn missing_input_is_a_configuration_error() {
    expect_config_error(ConfigFileBuilder::new().without_input().try_build(), "input");
}

#[test]
fn zero_sample_size_is_rejected() {
    expect_config_error(
        ConfigFileBuilder::new().with_sample_size(0).try_build(),
        "sample_size",
    );
}

#[test]
fn drmaa_needs_a_cluster_context() {
    expect_config_error(
        ConfigFileBuilder::new()
            .with_mode(ExecutionMode::Drmaa, ResourceContext::Default)
            .try_build(),
        "not supported",
    );

    for context in [ResourceContext::Broad, ResourceContext::Lisa] {
        let cfg = ConfigFileBuilder::new()
            .with_mode(ExecutionMode::Drmaa, context)
            .build();
        assert_eq!(cfg.run.context, context);
    }
}

#[test]
fn qsub_mode_is_rejected_in_every_context() {
    for context in [
        ResourceContext::Default,
        ResourceContext::Broad,
        ResourceContext::Lisa,
    ] {
        expect_config_error(
            ConfigFileBuilder::new()
                .with_mode(ExecutionMode::Qsub, context)
                .try_build(),
            "not supported",
        );
    }
}

#[test]
fn relative_paths_are_resolved_against_the_working_directory() -> TestResult {
    let cwd = std::env::current_dir()?;
    let mut raw = ConfigFileBuilder::new()
        .with_input("data/daner.txt")
        .with_magma("bin/magma")
        .with_output_dir("results")
        .with_store_dir("work/store")
        .raw();
    raw.tools.gene_loc = Some(PathBuf::from("ref/genes.loc"));
    raw.tools.reference = Some(PathBuf::from("ref/g1000_eur"));
    raw.run.qsub = PathBuf::from("./qsub");

    let cfg = genedag::config::ConfigFile::try_from(raw)?;

    assert_eq!(cfg.run.input, cwd.join("data/daner.txt"));
    assert_eq!(cfg.run.output_dir, Some(cwd.join("results")));
    assert_eq!(cfg.run.store_dir, cwd.join("work/store"));
    assert_eq!(cfg.magma.program, cwd.join("bin/magma"));
    assert_eq!(cfg.magma.gene_loc, cwd.join("ref/genes.loc"));
    assert_eq!(cfg.magma.reference, cwd.join("ref/g1000_eur"));
    assert!(cfg.run.qsub.is_absolute());
    Ok(())
}

#[test]
fn bare_program_names_are_left_for_path_lookup() {
    let cfg = ConfigFileBuilder::new().with_magma("magma").build();
    assert_eq!(cfg.magma.program, PathBuf::from("magma"));
    assert_eq!(cfg.run.qsub, PathBuf::from("qsub"));
    assert_eq!(cfg.run.qdel, PathBuf::from("qdel"));
}

#[test]
fn absent_input_file_fails_the_input_check() -> TestResult {
    let dir = tempfile::tempdir()?;
    let gene_loc = dir.path().join("genes.loc");
    std::fs::write(&gene_loc, "1\t1\t100\t200\n")?;
    let mut raw = ConfigFileBuilder::new()
        .with_input(dir.path().join("absent.txt"))
        .raw();
    raw.tools.gene_loc = Some(gene_loc);
    let cfg = genedag::config::ConfigFile::try_from(raw)?;

    match cfg.check_inputs() {
        Err(PipelineError::Configuration(msg)) => {
            assert!(msg.contains("[run].input"), "{msg}");
            assert!(msg.contains("absent.txt"), "{msg}");
        }
        other => panic!("expected a configuration error, got {other:?}"),
    }

    let input = dir.path().join("daner.txt");
    std::fs::write(&input, "CHR\tSNP\tBP\n")?;
    let mut raw = ConfigFileBuilder::new().with_input(&input).raw();
    raw.tools.gene_loc = Some(dir.path().join("genes.loc"));
    genedag::config::ConfigFile::try_from(raw)?.check_inputs()?;
    Ok(())
}

#[test]
fn local_mode_works_with_any_context() {
    for context in [
        ResourceContext::Default,
        ResourceContext::Broad,
        ResourceContext::Lisa,
    ] {
        assert!(
            ConfigFileBuilder::new()
                .with_mode(ExecutionMode::Local, context)
                .try_build()
                .is_ok()
        );
    }
}

#[test]
fn zero_max_parallel_is_rejected() {
    expect_config_error(
        ConfigFileBuilder::new().with_max_parallel(0).try_build(),
        "max_parallel",
    );
}

#[test]
fn partitions_must_be_unique_and_plain() {
    expect_config_error(ConfigFileBuilder::new().with_partitions(&[]).try_build(), "partitions");
    expect_config_error(
        ConfigFileBuilder::new().with_partitions(&["1", "2", "1"]).try_build(),
        "duplicate",
    );
    expect_config_error(
        ConfigFileBuilder::new().with_partitions(&["1", "x/y"]).try_build(),
        "invalid partition",
    );
    expect_config_error(
        ConfigFileBuilder::new().with_partitions(&["1 2"]).try_build(),
        "invalid partition",
    );
}

#[test]
fn output_prefix_must_be_a_file_name() {
    expect_config_error(
        ConfigFileBuilder::new().with_output_prefix("a/b").try_build(),
        "output_prefix",
    );
    expect_config_error(
        ConfigFileBuilder::new().with_output_prefix("").try_build(),
        "output_prefix",
    );
}

#[test]
fn resource_overrides_are_parsed() {
    let cfg = ConfigFileBuilder::new()
        .with_resources("gene_set_test", "2G", 4)
        .build();
    let hints = cfg.resources_for(&StageKind::GeneSetTest {
        partition: PartitionKey::new("7"),
    });
    assert_eq!(hints.memory, ByteSize::gib(2));
    assert_eq!(hints.cores, 4);

    // Stages without an override keep their defaults.
    assert_eq!(
        cfg.resources_for(&StageKind::Annotation).memory,
        ByteSize::gib(1)
    );
}

#[test]
fn bad_resource_overrides_are_rejected() {
    expect_config_error(
        ConfigFileBuilder::new().with_resources("plotting", "1G", 1).try_build(),
        "unknown stage",
    );
    expect_config_error(
        ConfigFileBuilder::new().with_resources("merge", "lots", 1).try_build(),
        "memory",
    );
    expect_config_error(
        ConfigFileBuilder::new().with_resources("merge", "1G", 0).try_build(),
        "cores",
    );
}

#[test]
fn missing_tool_path_is_rejected() {
    let mut raw = ConfigFileBuilder::new().raw();
    raw.tools.gene_loc = None;
    expect_config_error(genedag::config::ConfigFile::try_from(raw), "gene_loc");
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let file = toml_file("[run\ninput = ");
    assert!(matches!(
        load_from_path(file.path()),
        Err(PipelineError::Toml(_))
    ));
}

#[test]
fn unknown_mode_is_a_parse_error() {
    let file = toml_file(
        r#"
[run]
mode = "slurm"
"#,
    );
    assert!(matches!(
        load_from_path(file.path()),
        Err(PipelineError::Toml(_))
    ));
}

#[test]
fn clean_policy_reads_snake_case() -> TestResult {
    let file = toml_file(MINIMAL);
    let mut raw = load_from_path(file.path())?;
    assert_eq!(raw.run.clean, CleanPolicy::Always);

    let file = toml_file(
        r#"
[run]
clean = "on_success"
"#,
    );
    raw = load_from_path(file.path())?;
    assert_eq!(raw.run.clean, CleanPolicy::OnSuccess);
    Ok(())
}
