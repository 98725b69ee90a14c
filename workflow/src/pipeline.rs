use anyhow::Result;

use syntax::ast::SampleSheet;
use util::{HashMap, Hasher, IdVec};

use crate::{ConfigError, DataContext, Errors, GlobalParams, ParamFile, StepDef, StepId};

const DEFAULT_TITLE: &str = "project";

/// Everything the parsing stage knows about a workflow:
/// the sample data, global parameters, and step definitions in declared order.
#[derive(Debug)]
pub struct Pipeline {
    pub title: String,
    /// Initial data context, straight from the sample sheet.
    pub samples: DataContext,
    pub global: GlobalParams,
    steps: IdVec<StepId, StepDef>,
    ids: HashMap<String, StepId>,
}

impl Pipeline {
    /// Combine a sample sheet and parameter files into a `Pipeline`,
    /// reporting every configuration problem found rather than just the first.
    pub fn load(sheet: &SampleSheet, files: &[ParamFile]) -> Result<Self> {
        let global = GlobalParams::from_files(files)?;
        let samples = DataContext::from_sheet(sheet);

        let mut errors = Errors::default();
        if samples.is_empty() {
            errors.add(ConfigError::global(
                "sample sheet defines no sample or project files",
            ));
        }

        let mut steps: IdVec<StepId, StepDef> = IdVec::with_capacity(16);
        let mut ids = HashMap::with_capacity_and_hasher(16, Hasher::default());
        for file in files {
            for def in file.step_defs(&global) {
                match def {
                    Ok(def) if ids.contains_key(&def.name) => {
                        errors.add(ConfigError::step(&def.name, "defined more than once"));
                    }
                    Ok(def) => {
                        let name = def.name.clone();
                        let id = steps.push(def);
                        ids.insert(name, id);
                    }
                    Err(e) => errors.add(e),
                }
            }
        }

        if steps.is_empty() {
            errors.add(ConfigError::global("no steps defined in Step_params"));
        }
        check_bases(&steps, &ids, &mut errors);

        errors.into_result("loading workflow parameters")?;

        log::debug!("loaded pipeline with {} steps", steps.len());
        Ok(Self {
            title: sheet.title.unwrap_or(DEFAULT_TITLE).to_owned(),
            samples,
            global,
            steps,
            ids,
        })
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    #[inline]
    pub fn get_step(&self, id: StepId) -> &StepDef {
        self.steps.get(id)
    }

    pub fn step_id(&self, name: &str) -> Option<StepId> {
        self.ids.get(name).copied()
    }

    pub fn step(&self, name: &str) -> Option<&StepDef> {
        self.step_id(name).map(|id| self.steps.get(id))
    }

    /// Steps in declared order.
    pub fn steps(&self) -> impl Iterator<Item = (StepId, &StepDef)> {
        self.steps.iter_ids()
    }
}

/// Every base must be defined, and exactly one step may have no base at all.
fn check_bases(steps: &IdVec<StepId, StepDef>, ids: &HashMap<String, StepId>, errors: &mut Errors) {
    let mut roots = Vec::with_capacity(1);
    for step in steps.iter() {
        if step.bases.is_empty() {
            roots.push(step.name.as_str());
        }
        for base in &step.bases {
            if !ids.contains_key(base) {
                errors.add(ConfigError::step(
                    &step.name,
                    format!("base \"{base}\" is not defined"),
                ));
            }
        }
    }
    if steps.is_empty() {
        return;
    }
    match roots.len() {
        1 => {}
        0 => errors.add(ConfigError::global(
            "no root step: exactly one step must have no 'base'",
        )),
        _ => errors.add(ConfigError::global(format!(
            "multiple root steps ({}): exactly one step may have no 'base'",
            roots.join(", ")
        ))),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use syntax::ast::SampleRow;

    fn sheet() -> SampleSheet<'static> {
        SampleSheet {
            title: Some("demo"),
            samples: vec![SampleRow {
                sample: "S1",
                kind: "Forward",
                path: "/s1.fq",
            }],
            project: vec![],
        }
    }

    #[test]
    fn test_load() -> Result<()> {
        let params = ParamFile::parse(
            "Step_params:\n  merge1:\n    module: merge\n  trim1:\n    module: generic\n    base: merge1\n",
        )?;
        let pipeline = Pipeline::load(&sheet(), &[params])?;
        assert_eq!(pipeline.title, "demo");
        assert_eq!(pipeline.len(), 2);
        let trim = pipeline.step("trim1").unwrap();
        assert_eq!(trim.bases, vec!["merge1"]);
        let names: Vec<&str> = pipeline.steps().map(|(_, s)| s.name.as_str()).collect();
        assert_eq!(names, vec!["merge1", "trim1"]);
        Ok(())
    }

    #[test]
    fn test_duplicate_across_files() -> Result<()> {
        let a = ParamFile::parse("Step_params:\n  merge1:\n    module: merge\n")?;
        let b = ParamFile::parse("Step_params:\n  merge1:\n    module: merge\n")?;
        let err = Pipeline::load(&sheet(), &[a, b]).unwrap_err();
        let config = err.downcast_ref::<ConfigError>().unwrap();
        assert_eq!(config.step.as_deref(), Some("merge1"));
        Ok(())
    }

    #[test]
    fn test_all_errors_reported() -> Result<()> {
        let params = ParamFile::parse(
            "Step_params:\n  a:\n    module: merge\n  b:\n    module: merge\n  c:\n    module: generic\n    base: nope\n",
        )?;
        let err = Pipeline::load(&sheet(), &[params]).unwrap_err();
        let agg = err.downcast_ref::<crate::AggregatedErrors>().unwrap();
        // unknown base + multiple roots:
        assert_eq!(agg.1, 2);
        Ok(())
    }
}
