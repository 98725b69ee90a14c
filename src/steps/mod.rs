use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use workflow::{ConfigError, DataContext, StepDef, PROJECT_UNIT};

/// `{placeholder}` expansion in step parameters
mod template;

mod generic;
mod merge;

pub use generic::GenericStep;
pub use merge::MergeStep;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Unable to build step \"{step}\" for {unit}: {message}")]
pub struct StepBuildError {
    pub step: String,
    /// Sample name, or the project.
    pub unit: String,
    pub message: String,
}

/// What a script is being built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkUnit<'a> {
    Sample(&'a str),
    Project,
}

impl WorkUnit<'_> {
    pub fn name(&self) -> &str {
        match self {
            Self::Sample(name) => name,
            Self::Project => PROJECT_UNIT,
        }
    }
}

/// Everything a builder can see while building one script.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub step: &'a StepDef,
    pub unit: WorkUnit<'a>,
    /// Files produced upstream of this step.
    pub input: &'a DataContext,
    /// The step's result dir.
    pub step_dir: &'a Path,
    pub run_code: &'a str,
}

impl<'a> StepContext<'a> {
    /// Per-unit subdir of the step's result dir.
    pub fn unit_dir(&self) -> PathBuf {
        self.step_dir.join(self.unit.name())
    }

    /// Input file(s) for a slot: the unit's own slot first, then the project's.
    pub fn input_slot(&self, slot: &str) -> Option<&'a str> {
        let own = match self.unit {
            WorkUnit::Sample(sample) => self.input.sample_slot(sample, slot),
            WorkUnit::Project => None,
        };
        own.or_else(|| self.input.project_slot(slot))
    }

    /// Like [`StepContext::input_slot`], but a missing slot is a build error.
    pub fn require_slot(&self, slot: &str) -> Result<&'a str, StepBuildError> {
        self.input_slot(slot).ok_or_else(|| {
            self.error(format!(
                "required input \"{slot}\" was not produced by any upstream step"
            ))
        })
    }

    pub fn error(&self, message: impl Into<String>) -> StepBuildError {
        StepBuildError {
            step: self.step.name.clone(),
            unit: self.unit.name().to_owned(),
            message: message.into(),
        }
    }
}

/// Result of building one script.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    /// Shell commands for the script body.
    pub script: String,
    /// Files this script will produce, as seen by downstream steps.
    pub outputs: DataContext,
    /// Extra files to checksum when the script finishes.
    pub stamp: Vec<String>,
}

impl BuildOutput {
    pub fn new(script: String) -> Self {
        Self {
            script,
            ..Default::default()
        }
    }

    /// Declare an output for the unit this script was built for.
    pub fn declare(&mut self, unit: WorkUnit, slot: &str, path: impl Into<String>) {
        match unit {
            WorkUnit::Sample(sample) => self.outputs.set_sample_slot(sample, slot, path),
            WorkUnit::Project => self.outputs.set_project_slot(slot, path),
        }
    }

    /// Every declared output path.
    pub fn output_paths(&self) -> impl Iterator<Item = &str> {
        self.outputs
            .project
            .values()
            .chain(self.outputs.samples.values().flat_map(|slots| slots.values()))
            .map(String::as_str)
    }
}

/// Knows how to turn one type of step into script bodies.
pub trait StepBuilder {
    /// Check the step's parameters before anything is written.
    fn validate(&self, _step: &StepDef) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Runs once, on the project unit, before any work unit.
    fn preliminary(&self, _ctx: &StepContext) -> Result<Option<BuildOutput>, StepBuildError> {
        Ok(None)
    }

    /// Body for one work unit.
    fn build(&self, ctx: &StepContext) -> Result<BuildOutput, StepBuildError>;

    /// Runs once, on the project unit, after every work unit.
    fn wrapping_up(&self, _ctx: &StepContext) -> Result<Option<BuildOutput>, StepBuildError> {
        Ok(None)
    }
}

pub type StepFactory = fn(&StepDef) -> Box<dyn StepBuilder>;

/// Step types by name.
#[derive(Default)]
pub struct StepRegistry {
    factories: BTreeMap<String, StepFactory>,
}

impl StepRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in `merge` and `generic` types.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("merge", |_| Box::new(MergeStep));
        registry.register("generic", |_| Box::new(GenericStep));
        registry
    }

    /// Add or replace a step type.
    pub fn register(&mut self, name: impl Into<String>, factory: StepFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Make a builder for `step`, failing if its type isn't registered.
    pub fn create(&self, step: &StepDef) -> Result<Box<dyn StepBuilder>, ConfigError> {
        let factory = self.factories.get(&step.kind).ok_or_else(|| {
            let known: Vec<&str> = self.factories.keys().map(String::as_str).collect();
            ConfigError::step(
                &step.name,
                format!(
                    "unknown step type \"{}\" (known types: {})",
                    step.kind,
                    known.join(", ")
                ),
            )
        })?;
        Ok(factory(step))
    }
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::collections::BTreeMap;

    use serde_yaml::Value;
    use workflow::{QsubParams, Scope, StepDef};

    pub fn step_def(name: &str, kind: &str, params: &str) -> StepDef {
        let params: BTreeMap<String, Value> = if params.is_empty() {
            BTreeMap::new()
        } else {
            serde_yaml::from_str(params).unwrap()
        };
        StepDef {
            name: name.to_owned(),
            kind: kind.to_owned(),
            bases: Vec::new(),
            scope: Scope::Sample,
            qsub: QsubParams::default(),
            conda: None,
            stamp: false,
            slow_release: None,
            params,
        }
    }
}
