// src/exec/launcher.rs

//! How external analysis binaries are started.
//!
//! Tasks describe the command they need ([`ExternalCommand`]); the launcher
//! chosen for the run decides whether it executes directly on this machine
//! ([`DirectLauncher`]) or is submitted to a grid-engine queue and waited on
//! ([`GridLauncher`]). Either way the caller gets captured stdout/stderr on
//! success and [`PipelineError::ExternalCommand`] otherwise. Output is never
//! inspected to decide success; only the exit status is.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::{PipelineError, Result};
use crate::task::{BoxFuture, ResourceHints};
use crate::types::ResourceContext;

/// A binary plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<std::ffi::OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        for a in args {
            self = self.arg(a);
        }
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for a in &self.args {
            write!(f, " {a}")?;
        }
        Ok(())
    }
}

/// Captured output of a command that exited successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Strategy for starting external commands, selected once per run.
pub trait CommandLauncher: Send + Sync + fmt::Debug {
    /// Run `command` to completion. `label` names the task for logs and
    /// job names.
    fn launch<'a>(
        &'a self,
        command: &'a ExternalCommand,
        resources: &'a ResourceHints,
        label: &'a str,
    ) -> BoxFuture<'a, Result<CommandOutput>>;
}

/// Runs commands as child processes of this process.
#[derive(Debug, Clone, Default)]
pub struct DirectLauncher;

impl CommandLauncher for DirectLauncher {
    fn launch<'a>(
        &'a self,
        command: &'a ExternalCommand,
        _resources: &'a ResourceHints,
        label: &'a str,
    ) -> BoxFuture<'a, Result<CommandOutput>> {
        Box::pin(async move {
            info!(task = %label, cmd = %command, "starting external command");

            let mut cmd = Command::new(&command.program);
            cmd.args(&command.args);
            if let Some(dir) = &command.cwd {
                cmd.current_dir(dir);
            }

            let display = command.program_name();
            run_to_completion(cmd, &display, label).await
        })
    }
}

/// Grid-engine flavour used when submitting, derived from the run's
/// resource context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridProfile {
    /// SGE/UGE: `-sync y`, memory as `h_vmem`.
    Broad,
    /// PBS/Torque: `-W block=true`, memory as `mem`, plus a walltime.
    Lisa { walltime: String },
}

impl GridProfile {
    pub fn for_context(context: ResourceContext, walltime: &str) -> Option<Self> {
        match context {
            ResourceContext::Broad => Some(GridProfile::Broad),
            ResourceContext::Lisa => Some(GridProfile::Lisa {
                walltime: walltime.to_string(),
            }),
            ResourceContext::Default => None,
        }
    }

    /// Job id announced by a blocking `qsub` on one of its stdout lines.
    ///
    /// SGE prints `Your job 4242 ("name") has been submitted`; PBS prints the
    /// bare id (`4242.server`).
    pub fn job_id(&self, line: &str) -> Option<String> {
        let line = line.trim();
        let word = match self {
            GridProfile::Broad => line.strip_prefix("Your job ")?.split_whitespace().next(),
            GridProfile::Lisa { .. } => line.split_whitespace().next(),
        }?;
        word.starts_with(|c: char| c.is_ascii_digit())
            .then(|| word.to_string())
    }

    /// Scheduler flags for one job.
    pub fn submit_args(
        &self,
        job_name: &str,
        resources: &ResourceHints,
        stdout: &Path,
        stderr: &Path,
    ) -> Vec<String> {
        let mut args = Vec::new();
        match self {
            GridProfile::Broad => {
                args.extend(["-sync".into(), "y".into(), "-cwd".into(), "-V".into()]);
                args.push("-l".into());
                args.push(format!("h_vmem={}", resources.memory));
                if resources.cores > 1 {
                    args.extend(["-pe".into(), "smp".into(), resources.cores.to_string()]);
                }
            }
            GridProfile::Lisa { walltime } => {
                args.extend(["-W".into(), "block=true".into(), "-V".into()]);
                args.push("-l".into());
                args.push(format!("mem={}", resources.memory));
                args.push("-l".into());
                args.push(format!("walltime={walltime}"));
                if resources.cores > 1 {
                    args.push("-l".into());
                    args.push(format!("nodes=1:ppn={}", resources.cores));
                }
            }
        }
        args.extend(["-N".into(), job_name.to_string()]);
        args.extend(["-o".into(), stdout.display().to_string()]);
        args.extend(["-e".into(), stderr.display().to_string()]);
        args
    }
}

/// Submits each command as a blocking grid job through `qsub` and waits for
/// it to finish.
///
/// The command is wrapped in a small job script so the same path works for
/// SGE and PBS. `qsub` returns the job's exit status in blocking mode; the
/// job's stdout/stderr are collected from the files the scheduler wrote.
/// If the launch is dropped before `qsub` returns (the task was terminated),
/// the job is removed from the queue with `qdel`.
#[derive(Debug, Clone)]
pub struct GridLauncher {
    qsub: PathBuf,
    qdel: PathBuf,
    profile: GridProfile,
}

impl GridLauncher {
    pub fn new(qsub: impl Into<PathBuf>, qdel: impl Into<PathBuf>, profile: GridProfile) -> Self {
        Self {
            qsub: qsub.into(),
            qdel: qdel.into(),
            profile,
        }
    }

    /// Run `qsub` until it returns, remembering the job id it prints on
    /// submission so a drop can `qdel` it.
    async fn submit(&self, mut cmd: Command, label: &str) -> Result<CommandOutput> {
        let program = self.qsub.display().to_string();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = cmd.spawn().map_err(|e| not_started(&program, &e))?;

        let mut job = QueuedJob {
            qdel: self.qdel.clone(),
            id: None,
        };
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let read_stdout = async {
            let mut seen = String::new();
            if let Some(pipe) = stdout_pipe {
                let mut lines = BufReader::new(pipe).lines();
                while let Some(line) = lines.next_line().await? {
                    if job.id.is_none() {
                        job.id = self.profile.job_id(&line);
                        if let Some(id) = &job.id {
                            info!(task = %label, job = %id, "grid job queued");
                        }
                    }
                    seen.push_str(&line);
                    seen.push('\n');
                }
            }
            Ok::<_, std::io::Error>(seen)
        };
        let read_stderr = async {
            let mut seen = String::new();
            if let Some(mut pipe) = stderr_pipe {
                pipe.read_to_string(&mut seen).await?;
            }
            Ok::<_, std::io::Error>(seen)
        };

        let (stdout, stderr) = tokio::try_join!(read_stdout, read_stderr)?;
        let status = child.wait().await?;
        job.settled();

        if status.success() {
            Ok(CommandOutput { stdout, stderr })
        } else {
            Err(PipelineError::ExternalCommand {
                program,
                reason: describe_status(status),
                stdout,
                stderr,
            })
        }
    }
}

impl CommandLauncher for GridLauncher {
    fn launch<'a>(
        &'a self,
        command: &'a ExternalCommand,
        resources: &'a ResourceHints,
        label: &'a str,
    ) -> BoxFuture<'a, Result<CommandOutput>> {
        Box::pin(async move {
            let job_dir = tempfile::Builder::new().prefix("genedag-job-").tempdir()?;
            let script = job_dir.path().join("job.sh");
            let stdout_path = job_dir.path().join("stdout");
            let stderr_path = job_dir.path().join("stderr");

            tokio::fs::write(&script, job_script(command)).await?;

            let job_name = sanitize_job_name(label);
            let mut cmd = Command::new(&self.qsub);
            cmd.args(
                self.profile
                    .submit_args(&job_name, resources, &stdout_path, &stderr_path),
            );
            cmd.arg(&script);

            info!(
                task = %label,
                job = %job_name,
                %resources,
                cmd = %command,
                "submitting grid job"
            );

            let submit = self.submit(cmd, label).await;

            let job_stdout = tokio::fs::read_to_string(&stdout_path)
                .await
                .unwrap_or_default();
            let job_stderr = tokio::fs::read_to_string(&stderr_path)
                .await
                .unwrap_or_default();

            match submit {
                Ok(_) => Ok(CommandOutput {
                    stdout: job_stdout,
                    stderr: job_stderr,
                }),
                Err(PipelineError::ExternalCommand {
                    program,
                    reason,
                    stdout,
                    stderr,
                }) => Err(PipelineError::ExternalCommand {
                    program,
                    reason,
                    stdout: join_nonempty(&job_stdout, &stdout),
                    stderr: join_nonempty(&job_stderr, &stderr),
                }),
                Err(other) => Err(other),
            }
        })
    }
}

/// A submitted job that has not been seen to finish. Dropping it while the
/// id is known runs `qdel <id>` in the background.
struct QueuedJob {
    qdel: PathBuf,
    id: Option<String>,
}

impl QueuedJob {
    fn settled(&mut self) {
        self.id = None;
    }
}

impl Drop for QueuedJob {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        if tokio::runtime::Handle::try_current().is_err() {
            warn!(job = %id, "no runtime left to delete grid job");
            return;
        }
        let spawned = Command::new(&self.qdel)
            .arg(&id)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(_) => info!(job = %id, "deleting grid job of terminated task"),
            Err(e) => warn!(job = %id, error = %e, "could not run qdel; job may still be queued"),
        }
    }
}

fn not_started(program: &str, err: &std::io::Error) -> PipelineError {
    PipelineError::ExternalCommand {
        program: program.to_string(),
        reason: format!("could not be started: {err}"),
        stdout: String::new(),
        stderr: String::new(),
    }
}

async fn run_to_completion(mut cmd: Command, program: &str, label: &str) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = cmd
        .output()
        .await
        .map_err(|e| not_started(program, &e))?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    for line in stderr.lines() {
        debug!(task = %label, "stderr: {}", line);
    }

    if output.status.success() {
        info!(task = %label, program = %program, "external command exited successfully");
        Ok(CommandOutput { stdout, stderr })
    } else {
        Err(PipelineError::ExternalCommand {
            program: program.to_string(),
            reason: describe_status(output.status),
            stdout,
            stderr,
        })
    }
}

fn describe_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exited with code {code}"),
        None => "was terminated by a signal".to_string(),
    }
}

fn join_nonempty(a: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (true, _) => b.to_string(),
        (_, true) => a.to_string(),
        _ => format!("{a}\n{b}"),
    }
}

/// Grid schedulers restrict job names; keep alphanumerics, `_`, `-`, `.`.
fn sanitize_job_name(label: &str) -> String {
    let mut name: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        name.insert(0, 'j');
    }
    name
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

fn job_script(command: &ExternalCommand) -> String {
    let mut script = String::from("#!/bin/sh\n");
    if let Some(dir) = &command.cwd {
        script.push_str(&format!("cd {} || exit 1\n", shell_quote(&dir.display().to_string())));
    }
    script.push_str("exec ");
    script.push_str(&shell_quote(&command.program.display().to_string()));
    for a in &command.args {
        script.push(' ');
        script.push_str(&shell_quote(a));
    }
    script.push('\n');
    script
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::ByteSize;

    #[test]
    fn broad_profile_requests_vmem_and_blocks() {
        let hints = ResourceHints {
            memory: ByteSize::gib(1),
            cores: 2,
            disk: ByteSize::mib(100),
        };
        let args = GridProfile::Broad.submit_args(
            "annotate",
            &hints,
            Path::new("/tmp/o"),
            Path::new("/tmp/e"),
        );
        let joined = args.join(" ");
        assert!(joined.starts_with("-sync y"));
        assert!(joined.contains("-l h_vmem=1G"));
        assert!(joined.contains("-pe smp 2"));
        assert!(joined.contains("-N annotate"));
    }

    #[test]
    fn lisa_profile_requests_mem_and_walltime() {
        let profile = GridProfile::Lisa {
            walltime: "02:00:00".into(),
        };
        let args = profile.submit_args(
            "merge",
            &ResourceHints::default(),
            Path::new("/tmp/o"),
            Path::new("/tmp/e"),
        );
        let joined = args.join(" ");
        assert!(joined.contains("-l mem=100M"));
        assert!(joined.contains("-l walltime=02:00:00"));
        assert!(!joined.contains("ppn"));
    }

    #[test]
    fn job_script_quotes_arguments() {
        let cmd = ExternalCommand::new("/opt/magma")
            .args(["--out", "/tmp/it's here"])
            .current_dir("/work");
        let script = job_script(&cmd);
        assert!(script.contains("cd '/work' || exit 1"));
        assert!(script.contains(r"exec '/opt/magma' '--out' '/tmp/it'\''s here'"));
    }

    #[test]
    fn job_ids_are_read_from_qsub_output() {
        let lisa = GridProfile::Lisa {
            walltime: "01:00:00".into(),
        };
        assert_eq!(
            GridProfile::Broad.job_id(r#"Your job 4242 ("annotate") has been submitted"#),
            Some("4242".to_string())
        );
        assert_eq!(GridProfile::Broad.job_id("Job 4242 exited with exit code 0."), None);
        assert_eq!(lisa.job_id("987.batch1.lisa\n"), Some("987.batch1.lisa".to_string()));
        assert_eq!(lisa.job_id("qsub: waiting for job"), None);
    }

    #[test]
    fn job_names_are_sanitised() {
        assert_eq!(sanitize_job_name("test_gene_sets[chr2]"), "test_gene_sets_chr2_");
        assert_eq!(sanitize_job_name("2nd"), "j2nd");
    }
}
