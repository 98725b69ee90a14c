use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;

use traverse::Resolution;
use workflow::{DataContext, Pipeline};

use crate::exec::{create_executor, Executor, ScriptArtifact, ScriptEnv};
use crate::fs::Fs;
use crate::run_index::{RunIndex, ScriptIndex};
use crate::steps::StepRegistry;

/// What compiling one step left behind.
#[derive(Debug, Clone, Serialize)]
pub struct BuiltStep {
    pub name: String,
    pub kind: String,
    /// Position in the execution order.
    pub rank: usize,
    pub bases: Vec<String>,
    /// Every step upstream of this one.
    pub closure: Vec<String>,
    pub high: ScriptArtifact,
    /// Preliminary, work-unit and wrapping-up jobs, in submission order.
    pub jobs: Vec<ScriptArtifact>,
    pub kill_script: PathBuf,
    /// Files known downstream of this step.
    pub outputs: DataContext,
}

impl BuiltStep {
    /// Ids downstream jobs have to wait for.
    pub fn exported_ids(&self) -> impl Iterator<Item = &str> {
        self.jobs.iter().map(|job| job.id.as_str())
    }

    /// High id first, then every job it submits.
    pub fn all_artifacts(&self) -> impl Iterator<Item = &ScriptArtifact> {
        std::iter::once(&self.high).chain(self.jobs.iter())
    }
}

/// State shared by every step of one compilation.
pub struct CompilationContext<'a> {
    pub pipeline: &'a Pipeline,
    pub resolution: &'a Resolution,
    pub registry: &'a StepRegistry,
    pub fs: &'a Fs,
    pub executor: Box<dyn Executor>,
    pub run_code: String,
    pub message: Option<String>,
    pub env: ScriptEnv,
    pub run_index: RunIndex,
    pub script_index: ScriptIndex,
    /// Steps compiled so far, in execution order.
    pub built: Vec<BuiltStep>,
}

impl<'a> CompilationContext<'a> {
    pub fn new(
        pipeline: &'a Pipeline,
        resolution: &'a Resolution,
        registry: &'a StepRegistry,
        fs: &'a Fs,
        run_code: String,
        message: Option<String>,
    ) -> Self {
        let global = &pipeline.global;
        let env = ScriptEnv {
            run_index: fs.run_index(&run_code),
            log_file: fs.log_file(&run_code),
            registration_file: fs.registration_file(),
            pid_dir: fs.pid_dir(),
            poll_interval: global.poll_interval,
            job_limit: global.job_limit.clone(),
            run_code: run_code.clone(),
        };
        Self {
            executor: create_executor(global.executor),
            run_index: RunIndex::new(&env.run_index),
            script_index: ScriptIndex::new(fs.script_index(&run_code)),
            built: Vec::with_capacity(pipeline.len()),
            pipeline,
            resolution,
            registry,
            fs,
            run_code,
            message,
            env,
        }
    }

    /// A step compiled earlier in this run.
    pub fn built_step(&self, name: &str) -> Option<&BuiltStep> {
        self.built.iter().find(|step| step.name == name)
    }

    /// Record a finished step: every job it emitted becomes pending in the run index.
    pub fn register(&mut self, step: BuiltStep) -> Result<()> {
        let ids: Vec<&str> = step.all_artifacts().map(|a| a.id.as_str()).collect();
        self.run_index
            .append_pending(&ids)
            .with_context(|| format!("while registering jobs of step \"{}\"", step.name))?;
        for artifact in step.all_artifacts() {
            self.script_index
                .add(&artifact.id, artifact.level(), &artifact.path);
        }
        log::debug!("registered {} jobs for step \"{}\"", ids.len(), step.name);
        self.built.push(step);
        Ok(())
    }
}
