use colored::Colorize;

use traverse::Resolution;
use util::Timer;
use workflow::{Pipeline, Scope};

use crate::compile::CompileSummary;
use crate::settings::Settings;

/// All interactions with the text UI should go through this struct.
pub struct Ui {
    /// -v setting, displays extra text info to user
    pub verbose: bool,
    /// keeps track of time for each phase
    timer: Timer,
}

impl Ui {
    pub fn new(settings: &Settings) -> Self {
        Self {
            verbose: settings.verbose > 0,
            timer: Timer::now(),
        }
    }

    pub fn start_timer(&mut self) {
        if self.verbose {
            self.timer.reset();
        }
    }

    pub fn print_elapsed(&mut self, phase: &str) -> Result<(), std::time::SystemTimeError> {
        if self.verbose {
            self.timer.print_elapsed(phase)
        } else {
            Ok(())
        }
    }

    pub fn verbose_progress(&self, msg: &str) {
        if self.verbose {
            eprint!("{}... ", msg.magenta());
        }
    }

    pub fn verbose_progress_debug<T: std::fmt::Debug>(&self, msg: &str, arg: T) {
        if self.verbose {
            eprint!("{} {:?}... ", msg.magenta(), arg);
        }
    }

    pub fn done(&self) {
        if self.verbose {
            eprintln!("{}.", "done".green());
        }
    }

    /// Execution order with each step's type, scope and upstream closure.
    pub fn print_plan(&self, pipeline: &Pipeline, resolution: &Resolution) {
        eprintln!(
            "\n{} \"{}\" ({} executor, {} samples):",
            "Workflow".magenta(),
            pipeline.title,
            pipeline.global.executor,
            pipeline.samples.samples.len(),
        );
        for (rank, name) in resolution.order().iter().enumerate() {
            let Some(step) = pipeline.step(name) else {
                continue;
            };
            let units = match step.scope {
                Scope::Sample => format!("{} jobs", pipeline.samples.samples.len()),
                Scope::Project => "1 job".to_owned(),
            };
            eprintln!(
                "{:>4}. {} ({}, {})",
                rank + 1,
                name.green(),
                step.kind,
                units,
            );
            if let Some(closure) = resolution.closure(name) {
                if !closure.is_empty() {
                    let upstream: Vec<&str> = closure.iter().map(String::as_str).collect();
                    eprintln!("      after: {}", upstream.join(", "));
                }
            }
        }
        eprintln!();
    }

    pub fn print_summary(&self, summary: &CompileSummary) {
        eprintln!(
            "{} {} steps, {} jobs.",
            "Generated".green(),
            summary.steps,
            summary.jobs,
        );
        eprintln!("Run the workflow with:  bash {}", summary.entry_script.display());
        eprintln!("Stop it with:           bash {}", summary.kill_all_script.display());
        if self.verbose {
            eprintln!("Snapshot written to {}", summary.snapshot.display());
        }
    }
}
