use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};

use util::{HashSet, Hasher};

use workflow::{DataContext, Scope, StepDef};

use super::context::{BuiltStep, CompilationContext};
use super::Error;
use crate::exec::{job_id, ArtifactKind, KillCommand, ScriptArtifact};
use crate::fs::{step_dir_name, Fs};
use crate::steps::{BuildOutput, StepBuilder, StepContext, WorkUnit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    BasesBound,
    ScriptsCreated,
    CleanedUp,
}

/// One step moving through Created -> BasesBound -> ScriptsCreated -> CleanedUp.
pub struct StepInstance<'a> {
    def: &'a StepDef,
    builder: Box<dyn StepBuilder>,
    state: Lifecycle,
    rank: usize,
    /// `NN.type_name`
    dir_name: String,
    result_dir: PathBuf,
    /// Merged outputs of the bases.
    input: DataContext,
    /// `input` plus everything this step declares.
    output: DataContext,
    base_highs: Vec<String>,
    base_jobs: Vec<String>,
    high: Option<ScriptArtifact>,
    jobs: Vec<ScriptArtifact>,
    /// Every id this step has used, High included.
    used_ids: HashSet<String>,
    kill_script: PathBuf,
    /// The High script while it is being written.
    open_high: Option<BufWriter<File>>,
}

impl<'a> StepInstance<'a> {
    /// Validate the step's parameters and create its result dir.
    pub fn new(def: &'a StepDef, ctx: &CompilationContext) -> Result<Self> {
        let builder = ctx.registry.create(def)?;
        builder.validate(def)?;

        let rank = ctx
            .resolution
            .rank(&def.name)
            .ok_or_else(|| Error::Unresolved(def.name.clone()))?;
        let dir_name = step_dir_name(rank, &def.kind, &def.name);
        let result_dir = ctx.fs.step_data_dir(&def.kind, &def.name);
        ctx.fs.create_dir(&result_dir)?;

        Ok(Self {
            kill_script: ctx.fs.kill_script(&dir_name),
            def,
            builder,
            state: Lifecycle::Created,
            rank,
            dir_name,
            result_dir,
            input: DataContext::default(),
            output: DataContext::default(),
            base_highs: Vec::with_capacity(def.bases.len()),
            base_jobs: Vec::with_capacity(32),
            high: None,
            jobs: Vec::with_capacity(32),
            used_ids: HashSet::with_capacity_and_hasher(32, Hasher::default()),
            open_high: None,
        })
    }

    /// Merge the outputs of the declared bases into this step's input.
    /// The root step reads the sample sheet instead.
    pub fn bind_bases(&mut self, ctx: &CompilationContext) -> Result<()> {
        self.expect_state(Lifecycle::Created)?;
        if self.def.bases.is_empty() {
            self.input = ctx.pipeline.samples.clone();
        }
        for base in &self.def.bases {
            let built = ctx
                .built_step(base)
                .ok_or_else(|| Error::InvariantViolation {
                    step: self.def.name.clone(),
                    base: base.clone(),
                })?;
            for collision in self.input.merge_from(&built.outputs) {
                log::warn!(
                    "step \"{}\": slot \"{}\" of {} is set by more than one base; using {} instead of {}",
                    self.def.name,
                    collision.slot,
                    collision.unit,
                    collision.kept,
                    collision.previous,
                );
            }
            self.base_highs.push(built.high.id.clone());
            self.base_jobs.extend(built.exported_ids().map(str::to_owned));
        }
        self.output = self.input.clone();
        self.state = Lifecycle::BasesBound;
        Ok(())
    }

    /// Write the High script, one script per work unit plus the optional
    /// preliminary and wrapping-up scripts, and the step's kill script.
    pub fn create_all_scripts(&mut self, ctx: &CompilationContext) -> Result<()> {
        self.expect_state(Lifecycle::BasesBound)?;
        let fs = ctx.fs;
        let executor = ctx.executor.as_ref();

        fs.create_dir(fs.low_script_dir(&self.dir_name))?;
        let (stderr_dir, stdout_dir) = executor.stream_dirs(
            &fs.stderr_dir(&ctx.run_code),
            &fs.stdout_dir(&ctx.run_code),
            &self.dir_name,
        );
        fs.create_dir(&stderr_dir)?;
        fs.create_dir(&stdout_dir)?;

        let high = ScriptArtifact {
            id: job_id(&self.def.kind, &self.def.name, None, &ctx.run_code),
            kind: ArtifactKind::High,
            step_type: self.def.kind.clone(),
            step_name: self.def.name.clone(),
            path: fs.high_script(&self.dir_name),
            dependency_ids: self.base_highs.clone(),
            qsub: self.def.qsub.clone(),
            conda: None,
            stderr_dir,
            stdout_dir,
            held: false,
            submitted_ids: Vec::with_capacity(0),
        };
        self.used_ids.insert(high.id.clone());
        let held = match self.def.slow_release {
            Some(_) => {
                executor.render_release_command(&high)?;
                true
            }
            None => false,
        };

        // the header only depends on the bases, so it goes out before any unit is built
        let mut writer = BufWriter::new(fs.create_file(&high.path)?);
        writer.write_all(executor.render_header(&high).as_bytes())?;
        self.open_high = Some(writer);
        self.high = Some(high.clone());

        let project = StepContext {
            step: self.def,
            unit: WorkUnit::Project,
            input: &self.input,
            step_dir: &self.result_dir,
            run_code: &ctx.run_code,
        };

        let mut upstream = self.base_jobs.clone();
        if let Some(output) = self.builder.preliminary(&project)? {
            let deps = upstream.clone();
            let id = self.emit(ctx, &high, ArtifactKind::Preliminary, "preliminary", deps, output, false)?;
            upstream.push(id);
        }

        let units: Vec<String> = match self.def.scope {
            Scope::Sample => self.input.sample_names().map(str::to_owned).collect(),
            Scope::Project => vec![workflow::PROJECT_UNIT.to_owned()],
        };
        if units.is_empty() {
            log::warn!("step \"{}\" has no samples to run on", self.def.name);
        }
        let mut unit_ids = Vec::with_capacity(units.len());
        for unit in &units {
            let unit = match self.def.scope {
                Scope::Sample => WorkUnit::Sample(unit),
                Scope::Project => WorkUnit::Project,
            };
            let output = self.builder.build(&StepContext {
                step: self.def,
                unit,
                input: &self.input,
                step_dir: &self.result_dir,
                run_code: &ctx.run_code,
            })?;
            let deps = upstream.clone();
            let id = self.emit(ctx, &high, ArtifactKind::Low, unit.name(), deps, output, held)?;
            unit_ids.push(id);
        }

        let project = StepContext {
            step: self.def,
            unit: WorkUnit::Project,
            input: &self.input,
            step_dir: &self.result_dir,
            run_code: &ctx.run_code,
        };
        if let Some(output) = self.builder.wrapping_up(&project)? {
            let mut deps = upstream;
            deps.extend(unit_ids);
            let kind = ArtifactKind::WrappingUp;
            self.emit(ctx, &high, kind, "wrapping_up", deps, output, false)?;
        }

        self.finish_high(ctx, &high)?;
        self.write_kill_script(ctx, &high)?;
        self.state = Lifecycle::ScriptsCreated;
        Ok(())
    }

    /// Close anything still open. A High script that was never finished is removed,
    /// so a truncated script can't be mistaken for a complete one.
    pub fn cleanup(&mut self, fs: &Fs) -> Result<()> {
        if let Some(writer) = self.open_high.take() {
            drop(writer);
            if self.state != Lifecycle::ScriptsCreated {
                if let Some(high) = &self.high {
                    log::debug!("removing partial High script {:?}", high.path);
                    fs.delete_file(&high.path)?;
                }
            }
        }
        self.state = Lifecycle::CleanedUp;
        Ok(())
    }

    pub fn into_built(self, ctx: &CompilationContext) -> Result<BuiltStep> {
        self.expect_state(Lifecycle::CleanedUp)?;
        let mut high = self
            .high
            .ok_or_else(|| Error::Unresolved(self.def.name.clone()))?;
        high.submitted_ids = self.jobs.iter().map(|job| job.id.clone()).collect();
        let closure = ctx
            .resolution
            .closure(&self.def.name)
            .map(|c| c.iter().cloned().collect())
            .unwrap_or_default();
        Ok(BuiltStep {
            name: self.def.name.clone(),
            kind: self.def.kind.clone(),
            rank: self.rank,
            bases: self.def.bases.clone(),
            closure,
            high,
            jobs: self.jobs,
            kill_script: self.kill_script,
            outputs: self.output,
        })
    }

    /// Write one script below the High script and remember it for submission.
    #[allow(clippy::too_many_arguments)]
    fn emit(
        &mut self,
        ctx: &CompilationContext,
        high: &ScriptArtifact,
        kind: ArtifactKind,
        unit: &str,
        dependency_ids: Vec<String>,
        built: BuildOutput,
        held: bool,
    ) -> Result<String> {
        let executor = ctx.executor.as_ref();
        let id = job_id(&self.def.kind, &self.def.name, Some(unit), &ctx.run_code);
        if !self.used_ids.insert(id.clone()) {
            return Err(Error::DuplicateJobName(id).into());
        }
        let artifact = ScriptArtifact {
            path: ctx.fs.low_script_dir(&self.dir_name).join(format!("{id}.sh")),
            id,
            kind,
            dependency_ids,
            conda: self.def.conda.clone(),
            held,
            submitted_ids: Vec::with_capacity(0),
            ..high.clone()
        };

        let mut stamped = built.stamp.clone();
        if self.def.stamp {
            stamped.extend(built.output_paths().map(str::to_owned));
        }
        let mut text = executor.render_header(&artifact);
        text.push_str(&executor.render_body(&artifact, &built.script, &stamped, &ctx.env));
        ctx.fs
            .write_script(&artifact.path, &text)
            .with_context(|| format!("while writing script for job {}", artifact.id))?;

        self.output.merge_from(&built.outputs);
        let id = artifact.id.clone();
        self.jobs.push(artifact);
        Ok(id)
    }

    /// Submission commands, slow release and (for local execution) the final wait.
    fn finish_high(&mut self, ctx: &CompilationContext, high: &ScriptArtifact) -> Result<()> {
        let executor = ctx.executor.as_ref();
        let mut command = String::with_capacity(256 * (self.jobs.len() + 1));
        for job in &self.jobs {
            command.push_str(&executor.render_dependent_command(high, job, &ctx.env)?);
            command.push('\n');
        }
        if let Some(delay) = self.def.slow_release {
            command.push_str("# Release held jobs one at a time:\n");
            for job in self.jobs.iter().filter(|job| job.held) {
                command.push_str(&format!(
                    "sleep {delay}\n{}\n",
                    executor.render_release_command(job)?
                ));
            }
            command.push('\n');
        }
        if !executor.native_dependencies() && !self.jobs.is_empty() {
            let ids: Vec<&str> = self.jobs.iter().map(|job| job.id.as_str()).collect();
            command.push_str("# Wait for every job of this step:\n");
            command.push_str(&format!("wait_for_jobs {}\n", ids.join(" ")));
        }

        let body = executor.render_body(high, &command, &[], &ctx.env);
        let mut writer = self
            .open_high
            .take()
            .ok_or_else(|| Error::Unresolved(self.def.name.clone()))?;
        writer.write_all(body.as_bytes())?;
        writer.flush()?;
        drop(writer);
        ctx.fs.make_executable(&high.path)?;
        Ok(())
    }

    fn write_kill_script(&self, ctx: &CompilationContext, high: &ScriptArtifact) -> Result<()> {
        let executor = ctx.executor.as_ref();
        let mut text = format!(
            "#!/bin/bash\n# Kill every job of step \"{}\" ({})\n\n",
            self.def.name, self.def.kind
        );
        for artifact in std::iter::once(high).chain(self.jobs.iter()) {
            match executor.render_kill_command(artifact, &ctx.env) {
                KillCommand::Command(cmd) => {
                    text.push_str(&cmd);
                    text.push('\n');
                }
                KillCommand::Unsupported => text.push_str(&format!(
                    "echo \"Unable to kill {}: not supported by the {} executor\" >&2\n",
                    artifact.id,
                    executor.kind()
                )),
            }
        }
        ctx.fs.create_dir(ctx.fs.kill_dir())?;
        ctx.fs.write_script(&self.kill_script, &text)
    }

    fn expect_state(&self, expected: Lifecycle) -> Result<(), Error> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::Lifecycle {
                step: self.def.name.clone(),
                expected: format!("{expected:?}"),
                found: format!("{:?}", self.state),
            })
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::steps::StepRegistry;
    use traverse::Resolution;
    use workflow::{ParamFile, Pipeline};

    const SHEET: &str = "Title\tdemo\n#SampleID\tType\tPath\nS1\tForward\t/raw/S1.fq\n";
    const PARAMS: &str = "Step_params:
  merge1:
    module: merge
  trim1:
    module: generic
    base: merge1
    script_path: trim.sh
";

    fn load() -> Result<(Pipeline, Resolution)> {
        let sheet = syntax::parse_sample_sheet(SHEET)?;
        let pipeline = Pipeline::load(&sheet, &[ParamFile::parse(PARAMS)?])?;
        let resolution = traverse::resolve(
            pipeline
                .steps()
                .map(|(_, step)| (step.name.as_str(), step.bases.as_slice())),
        )?;
        Ok((pipeline, resolution))
    }

    fn home() -> Result<(tempfile::TempDir, Fs)> {
        let dir = tempfile::tempdir()?;
        let mut fs = Fs::new(dir.path(), false);
        fs.ensure_home_dir_exists(false)?;
        Ok((dir, fs))
    }

    #[test]
    fn test_bind_before_base_is_built() -> Result<()> {
        let (pipeline, resolution) = load()?;
        let (_dir, fs) = home()?;
        let registry = StepRegistry::with_builtins();
        let ctx = CompilationContext::new(&pipeline, &resolution, &registry, &fs, "r1".into(), None);

        // merge1 was never registered:
        let trim = pipeline.step("trim1").unwrap();
        let mut instance = StepInstance::new(trim, &ctx)?;
        let err = instance.bind_bases(&ctx).unwrap_err();
        match err.downcast_ref::<Error>() {
            Some(Error::InvariantViolation { step, base }) => {
                assert_eq!(step, "trim1");
                assert_eq!(base, "merge1");
            }
            _ => panic!("expected an invariant violation, got {err:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_lifecycle_out_of_order() -> Result<()> {
        let (pipeline, resolution) = load()?;
        let (_dir, fs) = home()?;
        let registry = StepRegistry::with_builtins();
        let ctx = CompilationContext::new(&pipeline, &resolution, &registry, &fs, "r1".into(), None);

        let merge = pipeline.step("merge1").unwrap();
        let mut instance = StepInstance::new(merge, &ctx)?;
        let err = instance.create_all_scripts(&ctx).unwrap_err();
        assert!(
            matches!(
                err.downcast_ref::<Error>(),
                Some(Error::Lifecycle { expected, found, .. })
                    if expected == "BasesBound" && found == "Created"
            ),
            "{err:?}"
        );
        // nothing was written for the refused step:
        assert!(!fs.high_script(&instance.dir_name).exists());

        instance.bind_bases(&ctx)?;
        assert_eq!(instance.input.sample_names().collect::<Vec<_>>(), vec!["S1"]);
        let err = instance.bind_bases(&ctx).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Lifecycle { .. })));

        let err = instance.into_built(&ctx).unwrap_err();
        assert!(
            matches!(
                err.downcast_ref::<Error>(),
                Some(Error::Lifecycle { expected, found, .. })
                    if expected == "CleanedUp" && found == "BasesBound"
            ),
            "{err:?}"
        );
        Ok(())
    }
}
