use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use traverse::{DependencyResolver, Resolution};
use workflow::{ParamFile, Pipeline};

use crate::compile::{CompilationContext, CompileSummary, WorkflowCompiler};
use crate::fs::Fs;
use crate::settings::Settings;
use crate::steps::StepRegistry;
use crate::ui::Ui;

/// This struct actually runs the command-line app.
pub struct App {
    /// Interpreted command line settings
    settings: Settings,
    /// Filesystem interface
    fs: Fs,
    /// User interface
    ui: Ui,
    /// Step types that can be used in parameter files
    registry: StepRegistry,
}

impl App {
    /// Create a new `App` with the built-in step types.
    pub fn new(settings: Settings) -> Self {
        Self::with_registry(settings, StepRegistry::with_builtins())
    }

    /// Create a new `App` that looks step types up in `registry`.
    pub fn with_registry(settings: Settings, registry: StepRegistry) -> Self {
        let fs = Fs::new(&settings.home_dir, settings.dry_run);
        let ui = Ui::new(&settings);
        Self {
            settings,
            fs,
            ui,
            registry,
        }
    }

    /// Load, resolve and compile the workflow described by the settings.
    /// Returns `None` on a dry run.
    pub fn run(mut self) -> Result<Option<CompileSummary>> {
        self.fs.ensure_home_dir_exists(self.settings.verbose > 0)?;
        log::info!("using home directory {:?}", self.fs.home());

        let mut strbuf = String::with_capacity(0); // resized by the first read.
        let pipeline = self.load_pipeline(&mut strbuf)?;
        let resolution = self.resolve(&pipeline)?;

        if self.settings.dry_run || self.ui.verbose {
            self.ui.print_plan(&pipeline, &resolution);
        }
        if self.settings.dry_run {
            eprintln!("{}", "Dry run; nothing written.".green());
            return Ok(None);
        }

        self.ui.verbose_progress("Generating scripts");
        self.ui.start_timer();
        let ctx = CompilationContext::new(
            &pipeline,
            &resolution,
            &self.registry,
            &self.fs,
            self.settings.run_code.clone(),
            self.settings.message.clone(),
        );
        let summary = WorkflowCompiler::new(ctx)
            .compile()
            .with_context(|| format!("while compiling run {}", self.settings.run_code))?;
        self.ui.done();
        self.ui.print_elapsed("Generating scripts")?;

        self.ui.print_summary(&summary);
        Ok(Some(summary))
    }
}

// LOADING //////////////////
impl App {
    fn load_pipeline(&mut self, strbuf: &mut String) -> Result<Pipeline> {
        self.ui.start_timer();
        let param_files = self.read_param_files(strbuf)?;

        self.read_to_buf(&self.settings.sample_file, strbuf)?;
        self.ui.verbose_progress("Parsing sample file");
        let sheet = syntax::parse_sample_sheet(strbuf).with_context(|| {
            format!("while parsing sample file {:?}", self.settings.sample_file)
        })?;
        self.ui.done();

        self.ui.verbose_progress("Creating pipeline");
        let pipeline = Pipeline::load(&sheet, &param_files)?;
        self.ui.done();
        self.ui.print_elapsed("Loading workflow")?;

        log::info!(
            "pipeline \"{}\" has {} steps and {} samples",
            pipeline.title,
            pipeline.len(),
            pipeline.samples.samples.len(),
        );
        Ok(pipeline)
    }

    fn read_param_files(&self, strbuf: &mut String) -> Result<Vec<ParamFile>> {
        let mut files = Vec::with_capacity(self.settings.param_files.len());
        for path in &self.settings.param_files {
            self.read_to_buf(path, strbuf)?;
            let file = ParamFile::parse(strbuf)
                .with_context(|| format!("while parsing parameter file {path:?}"))?;
            files.push(file);
        }
        Ok(files)
    }

    fn read_to_buf(&self, path: &Path, strbuf: &mut String) -> Result<()> {
        self.ui.verbose_progress_debug("Reading", path);
        self.fs
            .read_to_buf(path, strbuf)
            .with_context(|| format!("while reading {path:?}"))?;
        self.ui.done();
        Ok(())
    }

    fn resolve(&self, pipeline: &Pipeline) -> Result<Resolution> {
        self.ui.verbose_progress("Resolving dependencies");
        let mut resolver = DependencyResolver::new();
        for (_, step) in pipeline.steps() {
            resolver.add_step(step.name.as_str(), step.bases.iter().map(String::as_str))?;
        }
        let resolution = resolver.resolve()?;
        self.ui.done();
        Ok(resolution)
    }
}
