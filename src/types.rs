use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// How external commands are executed for a run.
///
/// - `Local`: run every command as a child process on this machine.
/// - `Drmaa`: submit every command to the cluster queue and wait for it.
/// - `Qsub`: accepted in config files but not a supported submission path;
///   validation rejects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Local,
    Qsub,
    Drmaa,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Local
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(ExecutionMode::Local),
            "qsub" => Ok(ExecutionMode::Qsub),
            "drmaa" => Ok(ExecutionMode::Drmaa),
            other => Err(format!(
                "invalid execution mode: {other} (expected \"local\", \"qsub\" or \"drmaa\")"
            )),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExecutionMode::Local => "local",
            ExecutionMode::Qsub => "qsub",
            ExecutionMode::Drmaa => "drmaa",
        })
    }
}

/// Site profile that decides how resource hints become scheduler flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceContext {
    /// No cluster profile; only valid with local execution.
    Default,
    /// SGE/UGE cluster (memory as `h_vmem`).
    Broad,
    /// PBS cluster (memory as `mem`, explicit walltime).
    Lisa,
}

impl Default for ResourceContext {
    fn default() -> Self {
        ResourceContext::Default
    }
}

impl FromStr for ResourceContext {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" | "local" => Ok(ResourceContext::Default),
            "broad" => Ok(ResourceContext::Broad),
            "lisa" => Ok(ResourceContext::Lisa),
            other => Err(format!(
                "invalid context: {other} (expected \"default\", \"broad\" or \"lisa\")"
            )),
        }
    }
}

impl fmt::Display for ResourceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceContext::Default => "default",
            ResourceContext::Broad => "broad",
            ResourceContext::Lisa => "lisa",
        })
    }
}

/// Whether `mode` can run under `context`.
///
/// Local execution works everywhere. Queue submission goes through `drmaa`
/// and needs a cluster profile; plain `qsub` mode has no profile at all.
pub fn is_supported(mode: ExecutionMode, context: ResourceContext) -> bool {
    match mode {
        ExecutionMode::Local => true,
        ExecutionMode::Drmaa => matches!(context, ResourceContext::Broad | ResourceContext::Lisa),
        ExecutionMode::Qsub => false,
    }
}

/// What happens to the run's artifact store once the run is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanPolicy {
    Always,
    OnSuccess,
    Never,
}

impl Default for CleanPolicy {
    fn default() -> Self {
        CleanPolicy::Always
    }
}

impl CleanPolicy {
    pub fn should_clean(self, succeeded: bool) -> bool {
        match self {
            CleanPolicy::Always => true,
            CleanPolicy::OnSuccess => succeeded,
            CleanPolicy::Never => false,
        }
    }
}
