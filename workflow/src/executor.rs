use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
#[error("Unknown executor \"{0}\" (expected one of SGE, SLURM, PBS, QSUB, Local)")]
pub struct UnknownExecutor(String);

/// Which scheduler the generated scripts are written for.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ExecutorKind {
    #[default]
    Sge,
    Slurm,
    Pbs,
    Qsub,
    Local,
}

impl ExecutorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sge => "SGE",
            Self::Slurm => "SLURM",
            Self::Pbs => "PBS",
            Self::Qsub => "QSUB",
            Self::Local => "Local",
        }
    }
}

impl std::fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExecutorKind {
    type Err = UnknownExecutor;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sge" => Ok(Self::Sge),
            "slurm" => Ok(Self::Slurm),
            "pbs" => Ok(Self::Pbs),
            "qsub" => Ok(Self::Qsub),
            "local" => Ok(Self::Local),
            _ => Err(UnknownExecutor(s.to_owned())),
        }
    }
}

impl TryFrom<String> for ExecutorKind {
    type Error = UnknownExecutor;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ExecutorKind> for String {
    fn from(kind: ExecutorKind) -> String {
        kind.as_str().to_owned()
    }
}
