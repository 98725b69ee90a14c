use std::fmt;
use std::str::FromStr;

/// Lifecycle state of one job, as recorded in the run index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobState {
    Pending,
    Running,
    Done,
    /// Exit code the job's failure trap caught.
    Failed(i32),
    /// Never started because a job it waited for failed.
    FailedDependency,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("Unrecognized job state \"{0}\"")]
pub struct InvalidState(pub String);

impl JobState {
    /// true once the job can no longer change state.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_) | Self::FailedDependency)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Running => f.write_str("running"),
            Self::Done => f.write_str("done"),
            Self::Failed(code) => write!(f, "failed:{code}"),
            Self::FailedDependency => f.write_str("failed:dependency"),
        }
    }
}

impl FromStr for JobState {
    type Err = InvalidState;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "done" => Ok(Self::Done),
            "failed:dependency" => Ok(Self::FailedDependency),
            other => other
                .strip_prefix("failed:")
                .and_then(|code| code.parse().ok())
                .map(Self::Failed)
                .ok_or_else(|| InvalidState(other.to_owned())),
        }
    }
}
