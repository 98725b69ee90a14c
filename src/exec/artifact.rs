use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use workflow::{CondaParams, QsubParams};

/// Scheduling tier of a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Submits and supervises other scripts.
    High,
    /// Does the actual work for one unit.
    Low,
    /// Cancels jobs.
    Kill,
}

/// What a script is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// The run-everything script.
    Entry,
    /// A step's coordinating script.
    High,
    Preliminary,
    /// One work unit (a sample, or the project).
    Low,
    WrappingUp,
    Kill,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::High => "high",
            Self::Low => "low",
            Self::Kill => "kill",
        })
    }
}

impl ArtifactKind {
    pub fn level(&self) -> Level {
        match self {
            Self::Entry | Self::High => Level::High,
            Self::Preliminary | Self::Low | Self::WrappingUp => Level::Low,
            Self::Kill => Level::Kill,
        }
    }
}

/// One generated script and everything an executor needs to render it.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptArtifact {
    /// Job name; unique within a run and the key into the run index.
    pub id: String,
    pub kind: ArtifactKind,
    pub step_type: String,
    pub step_name: String,
    pub path: PathBuf,
    /// Jobs that must finish before this one starts.
    pub dependency_ids: Vec<String>,
    pub qsub: QsubParams,
    pub conda: Option<CondaParams>,
    pub stderr_dir: PathBuf,
    pub stdout_dir: PathBuf,
    /// Submitted on hold, to be released by its High script.
    pub held: bool,
    /// Jobs this script submits itself. If it never runs, neither do they.
    pub submitted_ids: Vec<String>,
}

impl ScriptArtifact {
    pub fn level(&self) -> Level {
        self.kind.level()
    }
}

/// Job names: `<type>_<name>_<run_code>` for High scripts and
/// `<type>_<name>_<unit>_<run_code>` for everything below them.
pub fn job_id(step_type: &str, step_name: &str, unit: Option<&str>, run_code: &str) -> String {
    let raw = match unit {
        Some(unit) => format!("{step_type}_{step_name}_{unit}_{run_code}"),
        None => format!("{step_type}_{step_name}_{run_code}"),
    };
    util::sanitize_name(&raw)
}
