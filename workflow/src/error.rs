use anyhow::Result;
use colored::Colorize;

/// A malformed or missing parameter. Fatal, and always raised before any script is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    /// Step the error belongs to, if it isn't global.
    pub step: Option<String>,
    pub message: String,
}

impl ConfigError {
    /// Error attributed to the given step.
    pub fn step(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step: Some(step.into()),
            message: message.into(),
        }
    }

    /// Error in global configuration or in the sample sheet.
    pub fn global(message: impl Into<String>) -> Self {
        Self {
            step: None,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.step {
            Some(step) => write!(f, "Invalid parameters for step \"{step}\": {}", self.message),
            None => write!(f, "Invalid configuration: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

/// For re-throwing after we've printed a list of errors to the user.
#[derive(Debug, thiserror::Error)]
#[error("{0} failed due to {1} errors")]
pub struct AggregatedErrors(pub String, pub usize);

/// Collects errors so they can all be reported at once instead of failing on the first.
pub struct Errors {
    errors: Vec<anyhow::Error>,
}

impl Default for Errors {
    fn default() -> Self {
        Self {
            // ideally we won't have any,
            // and we don't mind reallocating if we're already in an error state:
            errors: Vec::with_capacity(0),
        }
    }
}

impl Errors {
    pub fn add_context(&mut self, e: anyhow::Error, msg: String) {
        log::trace!("{msg}: {e:?}");
        self.errors.push(e.context(msg));
    }

    pub fn add(&mut self, e: impl Into<anyhow::Error>) {
        let e = e.into();
        log::trace!("error: {e:?}");
        self.errors.push(e);
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Ok if there were no errors. A single error is returned as-is;
    /// with several, print them all to stderr and fail with an aggregated error.
    pub fn into_result(mut self, label: &str) -> Result<()> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            n => {
                eprintln!("\n{} {}:\n", "Encountered errors while".red(), label.red());
                for e in &self.errors {
                    eprintln!("{}: {e:#}\n", "ERROR".red());
                }
                Err(AggregatedErrors(label.to_owned(), n).into())
            }
        }
    }
}
