// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod stages;
pub mod store;
pub mod task;
pub mod types;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, load_and_validate};
use crate::dag::{DagGraph, Scheduler};
use crate::engine::{CoreRuntime, RunReport, Runtime, RuntimeEvent};
use crate::errors::{PipelineError, Result};
use crate::exec::{
    CommandLauncher, DirectLauncher, ExecutionEnv, GridLauncher, GridProfile, LocalBackend,
};
use crate::stages::{build_pipeline, merge};
use crate::store::{ArtifactStore, LocalArtifactStore};
use crate::types::ExecutionMode;

/// High-level entry point used by `main.rs`.
///
/// Loads and validates the config (with CLI overrides), then either prints
/// the task graph (`--dry-run`, returns `None`) or runs the pipeline and
/// returns its report.
pub async fn run(args: CliArgs) -> anyhow::Result<Option<RunReport>> {
    let cfg = load_and_validate(&args.config, &args.overrides()).map_err(|e| {
        anyhow::Error::new(e).context(format!("loading config {}", args.config.display()))
    })?;

    if args.dry_run {
        let graph = build_pipeline(&cfg)?;
        print_dry_run(&cfg, &graph)?;
        return Ok(None);
    }

    let report = run_pipeline(&cfg).await?;
    Ok(Some(report))
}

/// Build the MAGMA graph for `cfg` and execute it with the local backend.
///
/// Configuration and graph errors surface as `Err` before any task runs;
/// task failures are reported in the returned [`RunReport`].
pub async fn run_pipeline(cfg: &ConfigFile) -> Result<RunReport> {
    cfg.check_inputs()?;
    let graph = build_pipeline(cfg)?;
    let scheduler = Scheduler::new(graph)?;

    let store = Arc::new(LocalArtifactStore::create_in(&cfg.run.store_dir)?);
    let launcher = make_launcher(cfg)?;

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

    let env = ExecutionEnv {
        store: store.clone() as Arc<dyn ArtifactStore>,
        launcher,
        scratch_base: Some(store.root().join("scratch")),
        max_parallel: cfg.run.max_parallel,
    };
    let executor = LocalBackend::new(env, rt_tx.clone());

    // Ctrl-C → abort: cancel what has not started, terminate the rest.
    let ctrl_c = {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            let _ = tx.send(RuntimeEvent::AbortRequested).await;
        })
    };
    drop(rt_tx);

    let core = CoreRuntime::new(scheduler);
    let runtime = Runtime::new(core, rt_rx, executor);
    let result = runtime.run().await;
    ctrl_c.abort();

    let mut report = match result {
        Ok(report) => report,
        Err(err) => {
            clean_store(cfg, &store, false);
            return Err(err);
        }
    };

    if report.succeeded() {
        if let Some(dir) = &cfg.run.output_dir {
            report.durable_paths = merge::durable_paths(dir, &cfg.output_prefix);
        }
    }

    if clean_store(cfg, &store, report.succeeded()) {
        // Its handles point into the store that was just removed.
        report.final_output = None;
    }
    info!(status = %report.status, failed = report.failures.len(), "run finished");
    Ok(report)
}

/// Apply the clean policy; returns whether the store was removed.
fn clean_store(cfg: &ConfigFile, store: &LocalArtifactStore, succeeded: bool) -> bool {
    if !cfg.run.clean.should_clean(succeeded) {
        info!(root = %store.root().display(), "keeping artifact store");
        return false;
    }
    match store.destroy() {
        Ok(()) => true,
        Err(e) => {
            warn!(root = %store.root().display(), error = %e, "failed to remove artifact store");
            false
        }
    }
}

/// The launcher matching the configured execution mode and context.
pub fn make_launcher(cfg: &ConfigFile) -> Result<Arc<dyn CommandLauncher>> {
    match cfg.run.mode {
        ExecutionMode::Local => Ok(Arc::new(DirectLauncher)),
        ExecutionMode::Drmaa => {
            let profile = GridProfile::for_context(cfg.run.context, &cfg.run.walltime)
                .ok_or_else(|| {
                    PipelineError::Configuration(format!(
                        "execution mode '{}' needs a cluster context, got '{}'",
                        cfg.run.mode, cfg.run.context
                    ))
                })?;
            Ok(Arc::new(GridLauncher::new(
                cfg.run.qsub.clone(),
                cfg.run.qdel.clone(),
                profile,
            )))
        }
        ExecutionMode::Qsub => Err(PipelineError::Configuration(
            "execution mode 'qsub' is not supported; use 'drmaa'".to_string(),
        )),
    }
}

/// Dry-run output: the tasks in execution order with their gates and
/// resource hints.
fn print_dry_run(cfg: &ConfigFile, graph: &DagGraph) -> Result<()> {
    println!("genedag dry-run");
    println!("  mode = {}, context = {}", cfg.run.mode, cfg.run.context);
    println!("  input = {}", cfg.run.input.display());
    println!("  sample_size = {}", cfg.run.sample_size);
    if let Some(dir) = &cfg.run.output_dir {
        println!("  output = {}/{}.*", dir.display(), cfg.output_prefix);
    }
    println!();

    let order = graph.execution_order()?;
    println!("tasks ({}):", order.len());
    for id in order {
        println!("  - {}", graph.name_of(id));
        if let Some(spec) = graph.spec(id) {
            println!("      resources: {}", spec.task.resources());
        }
        let gates: Vec<&str> = graph.gates_of(id).into_iter().map(|g| graph.name_of(g)).collect();
        if !gates.is_empty() {
            println!("      after: {gates:?}");
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
