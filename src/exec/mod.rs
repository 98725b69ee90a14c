use std::path::{Path, PathBuf};

use workflow::ExecutorKind;

/// Script artifacts and job naming
mod artifact;
pub use artifact::{job_id, ArtifactKind, Level, ScriptArtifact};

/// Shell text shared by every backend
pub mod common;

mod local;
mod pbs;
mod qsub;
mod sge;
mod slurm;

pub use local::LocalExecutor;
pub use pbs::PbsExecutor;
pub use qsub::QsubExecutor;
pub use sge::SgeExecutor;
pub use slurm::SlurmExecutor;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("{feature} is not supported by the {executor} executor")]
pub struct UnsupportedFeatureError {
    pub executor: ExecutorKind,
    pub feature: String,
}

impl UnsupportedFeatureError {
    pub fn new(executor: ExecutorKind, feature: impl Into<String>) -> Self {
        Self {
            executor,
            feature: feature.into(),
        }
    }
}

/// A cancel/hold command for one job, or an explicit marker that the backend can't do it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillCommand {
    Command(String),
    Unsupported,
}

/// Run-wide values baked into every generated script.
#[derive(Debug, Clone)]
pub struct ScriptEnv {
    pub run_code: String,
    pub run_index: PathBuf,
    pub log_file: PathBuf,
    pub registration_file: PathBuf,
    pub pid_dir: PathBuf,
    /// Seconds between polls in generated wait loops.
    pub poll_interval: u64,
    /// File holding the maximum number of queued jobs, read at run time.
    pub job_limit: Option<PathBuf>,
}

/// Renders scripts for one scheduler.
///
/// Implementations only supply what differs between schedulers; the shared preamble,
/// state bookkeeping and admission control live in [`common`] as free functions.
pub trait Executor {
    fn kind(&self) -> ExecutorKind;

    /// true if the scheduler holds dependent jobs itself. Backends that run jobs as
    /// local processes return false: their scripts poll the run index for dependencies
    /// and record pids for the kill scripts.
    fn native_dependencies(&self) -> bool {
        true
    }

    /// Extra shell functions this backend's submit commands call.
    fn helper_functions(&self) -> &'static str {
        ""
    }

    /// Shell expression expanding to the running job's scheduler id.
    fn job_id_var(&self) -> &'static str;

    /// Shell expression for the job's peak memory, where the scheduler reports it.
    fn resource_usage(&self) -> &'static str {
        "-"
    }

    /// Command printing one line per queued or running job of the current user.
    fn queue_count_command(&self) -> &'static str;

    /// stderr and stdout dirs for the scripts of one step.
    fn stream_dirs(&self, stderr: &Path, stdout: &Path, _step_dir: &str) -> (PathBuf, PathBuf) {
        (stderr.to_path_buf(), stdout.to_path_buf())
    }

    /// Shebang and scheduler directives, including native dependency holds.
    fn render_header(&self, artifact: &ScriptArtifact) -> String;

    /// Everything after the header: shared preamble, state bookkeeping around `command`,
    /// and checksum registration of `stamped` files.
    fn render_body(
        &self,
        artifact: &ScriptArtifact,
        command: &str,
        stamped: &[String],
        env: &ScriptEnv,
    ) -> String {
        common::render_body(self, artifact, command, stamped, env)
    }

    /// The bare command that submits `child`, encoding its dependencies
    /// if the backend resolves them at submit time.
    fn submit_command(&self, child: &ScriptArtifact) -> Result<String, UnsupportedFeatureError>;

    /// Submission of `child` as written into `parent`, with admission control.
    fn render_dependent_command(
        &self,
        parent: &ScriptArtifact,
        child: &ScriptArtifact,
        env: &ScriptEnv,
    ) -> Result<String, UnsupportedFeatureError> {
        common::dependent_command(self, parent, child, env)
    }

    fn render_kill_command(&self, artifact: &ScriptArtifact, env: &ScriptEnv) -> KillCommand;

    /// Freeze a job that hasn't started yet.
    fn render_hold_command(&self, artifact: &ScriptArtifact) -> KillCommand;

    /// Release a job that was submitted on hold.
    fn render_release_command(
        &self,
        artifact: &ScriptArtifact,
    ) -> Result<String, UnsupportedFeatureError>;
}

/// Get the backend for an executor kind.
pub fn create_executor(kind: ExecutorKind) -> Box<dyn Executor> {
    match kind {
        ExecutorKind::Sge => Box::new(SgeExecutor),
        ExecutorKind::Slurm => Box::new(SlurmExecutor),
        ExecutorKind::Pbs => Box::new(PbsExecutor),
        ExecutorKind::Qsub => Box::new(QsubExecutor),
        ExecutorKind::Local => Box::new(LocalExecutor),
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::path::PathBuf;

    use workflow::QsubParams;

    use super::{ArtifactKind, ScriptArtifact, ScriptEnv};

    pub fn env() -> ScriptEnv {
        ScriptEnv {
            run_code: "20240101120000".to_owned(),
            run_index: PathBuf::from("/home/logs/run_index_20240101120000.txt"),
            log_file: PathBuf::from("/home/logs/log_20240101120000.txt"),
            registration_file: PathBuf::from("/home/logs/file_registration.txt"),
            pid_dir: PathBuf::from("/home/logs/pids"),
            poll_interval: 5,
            job_limit: None,
        }
    }

    pub fn artifact(kind: ArtifactKind, id: &str, deps: &[&str]) -> ScriptArtifact {
        let mut qsub = QsubParams {
            queue: Some("all.q".to_owned()),
            nodes: vec!["node1".to_owned(), "node2".to_owned()],
            ..Default::default()
        };
        qsub.opts.insert("-pe".to_owned(), "shared 4".to_owned());
        ScriptArtifact {
            id: id.to_owned(),
            kind,
            step_type: "generic".to_owned(),
            step_name: "trim".to_owned(),
            path: PathBuf::from(format!("/home/scripts/02.generic_trim/{id}.sh")),
            dependency_ids: deps.iter().map(|d| d.to_string()).collect(),
            qsub,
            conda: None,
            stderr_dir: PathBuf::from("/home/stderr/20240101120000"),
            stdout_dir: PathBuf::from("/home/stdout/20240101120000"),
            held: false,
            submitted_ids: Vec::new(),
        }
    }
}
