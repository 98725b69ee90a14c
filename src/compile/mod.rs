use std::path::PathBuf;

use anyhow::{Context, Result};

use workflow::{Errors, StepDef};

use crate::exec::common::{functions, quote_path, variables};
use crate::exec::{ArtifactKind, KillCommand, ScriptArtifact};

/// Shared state of one compilation
mod context;
pub use context::{BuiltStep, CompilationContext};

/// Per-step lifecycle
mod instance;
use instance::StepInstance;

/// JSON record of the compilation
mod snapshot;
pub use snapshot::Snapshot;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Step \"{step}\" was bound before its base \"{base}\" was built")]
    InvariantViolation { step: String, base: String },
    #[error("Step \"{step}\" is in state {found}, expected {expected}")]
    Lifecycle {
        step: String,
        expected: String,
        found: String,
    },
    #[error("Step \"{0}\" is missing from the resolved order")]
    Unresolved(String),
    #[error("Job name \"{0}\" would be used twice; check for sample names that only differ in special characters")]
    DuplicateJobName(String),
}

/// What a successful compilation produced.
#[derive(Debug)]
pub struct CompileSummary {
    pub steps: usize,
    pub jobs: usize,
    pub entry_script: PathBuf,
    pub kill_all_script: PathBuf,
    pub snapshot: PathBuf,
}

/// Turns a resolved pipeline into scripts, one step at a time in execution order.
pub struct WorkflowCompiler<'a> {
    ctx: CompilationContext<'a>,
}

impl<'a> WorkflowCompiler<'a> {
    pub fn new(ctx: CompilationContext<'a>) -> Self {
        Self { ctx }
    }

    pub fn compile(mut self) -> Result<CompileSummary> {
        self.check_steps()?;
        self.prepare_layout()?;

        let pipeline = self.ctx.pipeline;
        let resolution = self.ctx.resolution;
        for name in resolution.order() {
            let def = pipeline
                .step(name)
                .ok_or_else(|| Error::Unresolved(name.clone()))?;
            if let Err(e) = self.compile_step(def) {
                if let Err(snapshot_err) = self.write_snapshot(Some((name, &e))) {
                    log::error!("unable to write snapshot after failure: {snapshot_err:#}");
                }
                return Err(e);
            }
        }

        self.write_entry_script()?;
        self.write_kill_all_script()?;
        self.ctx.script_index.flush()?;
        self.append_version_log()?;
        let snapshot = self.write_snapshot(None)?;

        Ok(CompileSummary {
            steps: self.ctx.built.len(),
            jobs: self.ctx.built.iter().map(|s| s.jobs.len() + 1).sum(),
            entry_script: self.ctx.fs.entry_script(),
            kill_all_script: self.ctx.fs.kill_all_script(),
            snapshot,
        })
    }

    /// Every step type must be registered and every step's parameters valid
    /// before anything is written. All problems are reported together.
    fn check_steps(&self) -> Result<()> {
        let mut errors = Errors::default();
        for (_, def) in self.ctx.pipeline.steps() {
            match self.ctx.registry.create(def) {
                Ok(builder) => {
                    if let Err(e) = builder.validate(def) {
                        errors.add(e);
                    }
                }
                Err(e) => errors.add(e),
            }
        }
        errors.into_result("step parameters")
    }

    fn prepare_layout(&self) -> Result<()> {
        let fs = self.ctx.fs;
        for dir in [
            fs.scripts_dir(),
            fs.kill_dir(),
            fs.logs_dir(),
            fs.pid_dir(),
            fs.stderr_dir(&self.ctx.run_code),
            fs.stdout_dir(&self.ctx.run_code),
        ] {
            fs.create_dir(dir)?;
        }
        fs.create_parent_dir(fs.snapshot(&self.ctx.run_code))?;
        self.ctx
            .run_index
            .create()
            .context("while creating the run index")?;
        fs.write_file(
            &self.ctx.env.log_file,
            "Timestamp\tEvent\tStep type\tStep\tJob name\tJob id\tHost\tMax memory\n",
        )?;
        Ok(())
    }

    fn compile_step(&mut self, def: &'a StepDef) -> Result<()> {
        log::info!("compiling step \"{}\" ({})", def.name, def.kind);
        let mut instance = StepInstance::new(def, &self.ctx)
            .with_context(|| format!("while preparing step \"{}\"", def.name))?;

        let result = instance
            .bind_bases(&self.ctx)
            .and_then(|_| instance.create_all_scripts(&self.ctx));
        let cleanup = instance.cleanup(self.ctx.fs);
        result.with_context(|| format!("while building step \"{}\"", def.name))?;
        cleanup?;

        let built = instance.into_built(&self.ctx)?;
        self.ctx.register(built)
    }

    /// Stand-in artifact for the run-everything script, so Highs can be
    /// submitted from it like any other dependent job.
    fn entry_artifact(&self) -> ScriptArtifact {
        let fs = self.ctx.fs;
        let title = &self.ctx.pipeline.title;
        ScriptArtifact {
            id: util::sanitize_name(&format!("{title}_{}", self.ctx.run_code)),
            kind: ArtifactKind::Entry,
            step_type: "workflow".to_owned(),
            step_name: title.clone(),
            path: fs.entry_script(),
            dependency_ids: Vec::with_capacity(0),
            qsub: self.ctx.pipeline.global.qsub.clone(),
            conda: None,
            stderr_dir: fs.stderr_dir(&self.ctx.run_code),
            stdout_dir: fs.stdout_dir(&self.ctx.run_code),
            held: false,
            submitted_ids: self.ctx.built.iter().map(|s| s.high.id.clone()).collect(),
        }
    }

    fn write_entry_script(&self) -> Result<()> {
        let executor = self.ctx.executor.as_ref();
        let entry = self.entry_artifact();

        let mut text = String::with_capacity(4096);
        text.push_str("#!/bin/bash\n");
        text.push_str(&format!(
            "# Runs workflow \"{}\", run code {}\n",
            self.ctx.pipeline.title, self.ctx.run_code
        ));
        if let Some(message) = &self.ctx.message {
            for line in message.lines() {
                text.push_str("# ");
                text.push_str(line);
                text.push('\n');
            }
        }
        if executor.native_dependencies() {
            text.push_str("set -eo pipefail\n");
        }
        text.push('\n');
        variables(&self.ctx.env, &mut text);
        functions(executor, &self.ctx.env, &mut text);
        text.push('\n');

        for step in &self.ctx.built {
            text.push_str(&executor.render_dependent_command(&entry, &step.high, &self.ctx.env)?);
            text.push('\n');
        }
        if !executor.native_dependencies() {
            text.push_str("wait\n");
        }
        self.ctx.fs.write_script(&entry.path, &text)
    }

    /// Freeze everything first where the backend can, so nothing downstream starts
    /// while upstream steps are cancelled; then run every step's kill script
    /// in declared order.
    fn write_kill_all_script(&self) -> Result<()> {
        let executor = self.ctx.executor.as_ref();
        let mut text = String::with_capacity(4096);
        text.push_str("#!/bin/bash\n");
        text.push_str(&format!(
            "# Kills every job of run {}\n\n",
            self.ctx.run_code
        ));

        let declared: Vec<&BuiltStep> = self
            .ctx
            .pipeline
            .steps()
            .filter_map(|(_, def)| self.ctx.built_step(&def.name))
            .collect();

        let mut holds = String::with_capacity(1024);
        for step in &declared {
            for artifact in step.all_artifacts() {
                if let KillCommand::Command(cmd) = executor.render_hold_command(artifact) {
                    holds.push_str(&cmd);
                    holds.push_str(" 2>/dev/null || true\n");
                }
            }
        }
        if holds.is_empty() {
            text.push_str(&format!(
                "# The {} executor can't hold jobs; steps are cancelled directly.\n\n",
                executor.kind()
            ));
        } else {
            text.push_str("# Hold:\n");
            text.push_str(&holds);
            text.push('\n');
        }

        text.push_str("# Cancel:\n");
        for step in &declared {
            text.push_str("bash ");
            text.push_str(&quote_path(&step.kill_script));
            text.push('\n');
        }
        self.ctx.fs.write_script(self.ctx.fs.kill_all_script(), &text)
    }

    fn append_version_log(&self) -> Result<()> {
        let line = format!(
            "{}\t{}\t{}\n",
            self.ctx.run_code,
            chrono::Local::now().format("%d/%m/%Y %H:%M:%S"),
            self.ctx.message.as_deref().unwrap_or("").replace('\n', " "),
        );
        self.ctx.fs.append_file(self.ctx.fs.version_file(), &line)
    }

    fn write_snapshot(&self, failure: Option<(&str, &anyhow::Error)>) -> Result<PathBuf> {
        let mut snapshot = Snapshot::new(&self.ctx);
        if let Some((step, error)) = failure {
            snapshot = snapshot.failed(step, error);
        }
        let path = self.ctx.fs.snapshot(&self.ctx.run_code);
        let text = serde_json::to_string_pretty(&snapshot)?;
        self.ctx
            .fs
            .write_file(&path, &text)
            .context("while writing workflow snapshot")?;
        Ok(path)
    }
}
