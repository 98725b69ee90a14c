use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::qsub::{OneOrMany, OptsSpec};
use crate::{ConfigError, ExecutorKind, QsubOverrides, QsubParams, DEFAULT_POLL_INTERVAL};

/// Whether a step runs once per sample or once for the whole project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Sample,
    Project,
}

/// Optional isolated environment the generated scripts activate around step commands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CondaParams {
    /// Conda installation prefix (`<path>/bin/activate` is sourced).
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Environment name.
    #[serde(default)]
    pub env: Option<String>,
}

impl CondaParams {
    /// Fields set in `other` win.
    fn overlay(&self, other: &CondaParams) -> CondaParams {
        CondaParams {
            path: other.path.clone().or_else(|| self.path.clone()),
            env: other.env.clone().or_else(|| self.env.clone()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawGlobal {
    #[serde(rename = "Executor", default)]
    executor: Option<ExecutorKind>,
    #[serde(rename = "Qsub_q", default)]
    queue: Option<String>,
    #[serde(rename = "Qsub_nodes", default)]
    nodes: Option<OneOrMany>,
    #[serde(rename = "Qsub_opts", default)]
    opts: Option<OptsSpec>,
    #[serde(rename = "Default_wait", default)]
    default_wait: Option<u64>,
    #[serde(default)]
    job_limit: Option<PathBuf>,
    #[serde(default)]
    slow_release: Option<u64>,
    #[serde(default)]
    conda: Option<CondaParams>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    #[serde(default)]
    module: Option<String>,
    #[serde(default)]
    base: Option<OneOrMany>,
    #[serde(default)]
    scope: Option<Scope>,
    #[serde(default)]
    qsub_params: Option<QsubOverrides>,
    #[serde(default)]
    conda: Option<CondaParams>,
    #[serde(default)]
    stamp: bool,
    #[serde(default)]
    slow_release: Option<u64>,
    #[serde(flatten)]
    params: BTreeMap<String, Value>,
}

/// One parsed YAML parameter file.
#[derive(Debug, Default, Deserialize)]
pub struct ParamFile {
    #[serde(rename = "Global_params", default)]
    global: RawGlobal,
    // kept as a mapping so that steps stay in declared order:
    #[serde(rename = "Step_params", default)]
    steps: Mapping,
}

impl ParamFile {
    /// Parse the contents of a parameter file.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(text)
            .map_err(|e| ConfigError::global(format!("unable to read parameter file: {e}")))
    }

    /// Step definitions from this file, in declared order.
    pub(crate) fn step_defs<'a>(
        &'a self,
        global: &'a GlobalParams,
    ) -> impl Iterator<Item = Result<StepDef, ConfigError>> + 'a {
        self.steps.iter().map(move |(k, v)| {
            let name = match k {
                Value::String(s) => s.clone(),
                other => {
                    return Err(ConfigError::global(format!(
                        "step names must be strings; found {other:?}"
                    )))
                }
            };
            let raw: RawStep = serde_yaml::from_value(v.clone())
                .map_err(|e| ConfigError::step(&name, e.to_string()))?;
            StepDef::from_raw(name, raw, global)
        })
    }
}

/// Pipeline-wide parameters (`Global_params`), merged across all parameter files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlobalParams {
    pub executor: ExecutorKind,
    pub qsub: QsubParams,
    /// Seconds between polls in generated wait loops.
    pub poll_interval: u64,
    /// File holding the maximum number of queued jobs; read by the scripts at run time.
    pub job_limit: Option<PathBuf>,
    /// Seconds between releasing held jobs, if slow release is enabled.
    pub slow_release: Option<u64>,
    pub conda: Option<CondaParams>,
}

impl Default for GlobalParams {
    fn default() -> Self {
        Self {
            executor: ExecutorKind::default(),
            qsub: QsubParams::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            job_limit: None,
            slow_release: None,
            conda: None,
        }
    }
}

impl GlobalParams {
    /// Merge `Global_params` from each file in turn; later files override earlier ones,
    /// and options merge key by key.
    pub fn from_files(files: &[ParamFile]) -> Result<Self, ConfigError> {
        let mut global = GlobalParams::default();
        for file in files {
            let raw = &file.global;
            if let Some(executor) = raw.executor {
                global.executor = executor;
            }
            if let Some(queue) = &raw.queue {
                global.qsub.queue = Some(queue.clone());
            }
            if let Some(nodes) = &raw.nodes {
                global.qsub.nodes = nodes.to_vec();
            }
            if let Some(opts) = &raw.opts {
                global.qsub.opts.extend(opts.to_map().map_err(ConfigError::global)?);
            }
            if let Some(wait) = raw.default_wait {
                if wait == 0 {
                    return Err(ConfigError::global("Default_wait must be at least 1 second"));
                }
                global.poll_interval = wait;
            }
            if let Some(limit) = &raw.job_limit {
                global.job_limit = Some(limit.clone());
            }
            if let Some(release) = raw.slow_release {
                global.slow_release = Some(release);
            }
            if let Some(conda) = &raw.conda {
                let base = global.conda.take().unwrap_or_default();
                global.conda = Some(base.overlay(conda));
            }
        }
        Ok(global)
    }
}

/// A step instance as declared in the parameter files.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepDef {
    /// Unique, user-chosen instance name.
    pub name: String,
    /// Step type, used to look up a builder in the registry.
    pub kind: String,
    /// Directly declared upstream instances.
    pub bases: Vec<String>,
    pub scope: Scope,
    /// Global qsub params with this step's overrides applied.
    pub qsub: QsubParams,
    pub conda: Option<CondaParams>,
    /// Register checksums of this step's declared outputs.
    pub stamp: bool,
    pub slow_release: Option<u64>,
    /// Everything else, passed through to the step builder untouched.
    pub params: BTreeMap<String, Value>,
}

impl StepDef {
    fn from_raw(name: String, raw: RawStep, global: &GlobalParams) -> Result<Self, ConfigError> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return Err(ConfigError::step(
                &name,
                "step names may only contain letters, digits, '_', '-' and '.'",
            ));
        }
        let kind = raw
            .module
            .ok_or_else(|| ConfigError::step(&name, "no 'module' given"))?;
        let qsub = match &raw.qsub_params {
            Some(overrides) => global
                .qsub
                .with_overrides(overrides)
                .map_err(|msg| ConfigError::step(&name, msg))?,
            None => global.qsub.clone(),
        };
        let conda = match (&global.conda, &raw.conda) {
            (Some(g), Some(s)) => Some(g.overlay(s)),
            (None, Some(s)) => Some(s.clone()),
            (g, None) => g.clone(),
        };
        Ok(Self {
            bases: raw.base.map(|b| b.to_vec()).unwrap_or_default(),
            scope: raw.scope.unwrap_or_default(),
            slow_release: raw.slow_release.or(global.slow_release),
            stamp: raw.stamp,
            params: raw.params,
            name,
            kind,
            qsub,
            conda,
        })
    }

    /// A free-form parameter.
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// A free-form parameter that must be a string, if present.
    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const PARAMS: &str = r#"
Global_params:
  Executor: SLURM
  Qsub_q: main
  Qsub_opts: -V --mem 4G
  Default_wait: 5
  conda:
    path: /opt/conda
    env: base_env
Step_params:
  merge1:
    module: merge
  trim1:
    module: generic
    base: merge1
    scope: project
    qsub_params:
      queue: fast
      --mem: 16G
    conda:
      env: trim_env
    script_path: trimmer
"#;

    #[test]
    fn test_global_and_steps() {
        let file = ParamFile::parse(PARAMS).unwrap();
        let global = GlobalParams::from_files(std::slice::from_ref(&file)).unwrap();
        assert_eq!(global.executor, ExecutorKind::Slurm);
        assert_eq!(global.poll_interval, 5);
        assert_eq!(global.qsub.opts["--mem"], "4G");

        let steps: Vec<StepDef> = file.step_defs(&global).collect::<Result<_, _>>().unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].name, "merge1");
        assert!(steps[0].bases.is_empty());

        let trim = &steps[1];
        assert_eq!(trim.bases, vec!["merge1"]);
        assert_eq!(trim.scope, Scope::Project);
        assert_eq!(trim.qsub.queue.as_deref(), Some("fast"));
        assert_eq!(trim.qsub.opts["--mem"], "16G");
        assert_eq!(trim.qsub.opts["-V"], "");
        let conda = trim.conda.as_ref().unwrap();
        assert_eq!(conda.env.as_deref(), Some("trim_env"));
        assert_eq!(conda.path.as_deref(), Some(std::path::Path::new("/opt/conda")));
        assert_eq!(trim.str_param("script_path"), Some("trimmer"));
        // known keys don't leak into the free-form params:
        assert!(trim.param("module").is_none());
    }

    #[test]
    fn test_later_files_override() {
        let a = ParamFile::parse("Global_params:\n  Executor: SGE\n  Qsub_q: a.q\n").unwrap();
        let b = ParamFile::parse("Global_params:\n  Executor: Local\n").unwrap();
        let global = GlobalParams::from_files(&[a, b]).unwrap();
        assert_eq!(global.executor, ExecutorKind::Local);
        assert_eq!(global.qsub.queue.as_deref(), Some("a.q"));
    }

    #[test]
    fn test_missing_module() {
        let file = ParamFile::parse("Step_params:\n  oops:\n    base: merge1\n").unwrap();
        let global = GlobalParams::default();
        let err = file.step_defs(&global).next().unwrap().unwrap_err();
        assert_eq!(err.step.as_deref(), Some("oops"));
    }

    #[test]
    fn test_bad_executor() {
        assert!(ParamFile::parse("Global_params:\n  Executor: Condor\n").is_err());
    }
}
