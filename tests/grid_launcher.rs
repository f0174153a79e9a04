// tests/grid_launcher.rs
//
// `GridLauncher` against shell scripts standing in for `qsub` and `qdel`.

#![cfg(unix)]

use std::error::Error;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tokio::time::{Duration, Instant, sleep, timeout};

use genedag::errors::PipelineError;
use genedag::exec::{CommandLauncher, ExternalCommand, GridLauncher, GridProfile};
use genedag::task::ResourceHints;
use genedag_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[tokio::test]
async fn missing_qsub_is_named_in_the_error() {
    init_tracing();
    let launcher = GridLauncher::new("/nonexistent/qsub", "qdel", GridProfile::Broad);
    let cmd = ExternalCommand::new("/opt/magma/magma").arg("--annotate");

    let err = launcher
        .launch(&cmd, &ResourceHints::default(), "annotate_summary_stats")
        .await
        .unwrap_err();

    match err {
        PipelineError::ExternalCommand { program, reason, .. } => {
            assert_eq!(program, "/nonexistent/qsub");
            assert!(reason.contains("could not be started"), "{reason}");
        }
        other => panic!("expected an external command error, got {other:?}"),
    }
}

#[tokio::test]
async fn terminated_submission_deletes_the_job() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let deleted = tmp.path().join("deleted");
    // Announces the job the way SGE does, then blocks like `-sync y`.
    let qsub = write_script(
        tmp.path(),
        "qsub",
        "#!/bin/sh\necho 'Your job 4242 (\"annotate\") has been submitted'\nexec sleep 30\n",
    );
    let qdel = write_script(
        tmp.path(),
        "qdel",
        &format!("#!/bin/sh\necho \"$1\" > '{}'\n", deleted.display()),
    );
    let launcher = GridLauncher::new(qsub, qdel, GridProfile::Broad);
    let cmd = ExternalCommand::new("magma");

    let hints = ResourceHints::default();
    let launch = launcher.launch(&cmd, &hints, "annotate");
    assert!(timeout(Duration::from_millis(500), launch).await.is_err());

    let deadline = Instant::now() + Duration::from_secs(5);
    while !deleted.exists() && Instant::now() < deadline {
        sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(fs::read_to_string(&deleted)?.trim(), "4242");
    Ok(())
}

#[tokio::test]
async fn finished_job_is_not_deleted() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let deleted = tmp.path().join("deleted");
    let qsub = write_script(
        tmp.path(),
        "qsub",
        "#!/bin/sh\necho 'Your job 7 (\"merge\") has been submitted'\necho 'Job 7 exited with exit code 0.'\n",
    );
    let qdel = write_script(
        tmp.path(),
        "qdel",
        &format!("#!/bin/sh\necho \"$1\" > '{}'\n", deleted.display()),
    );
    let launcher = GridLauncher::new(qsub, qdel, GridProfile::Broad);

    launcher
        .launch(&ExternalCommand::new("magma"), &ResourceHints::default(), "merge")
        .await?;

    sleep(Duration::from_millis(200)).await;
    assert!(!deleted.exists());
    Ok(())
}
