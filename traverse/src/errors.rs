/// The dependency graph is not a DAG.
/// Lists every step that depends on itself (directly or transitively), sorted by name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Circular dependency among steps: {}", offenders.join(", "))]
pub struct CycleError {
    pub offenders: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Cycle(#[from] CycleError),
    #[error("Step \"{step}\" has base \"{base}\", which is not defined")]
    UnknownBase { step: String, base: String },
    #[error("Step \"{0}\" is defined more than once")]
    DuplicateStep(String),
}
