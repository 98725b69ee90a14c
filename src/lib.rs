/// High-level command line app
mod app;
/// Definition of command-line args
mod args;
/// Turning a resolved pipeline into scripts
mod compile;
/// Scheduler backends
pub mod exec;
/// Filesystem operations
mod fs;
/// Shared job state file
pub mod run_index;
/// Combined command-line and config file run settings
mod settings;
/// Step types and their script builders
pub mod steps;
/// Text UI
mod ui;

// exported for tests:
pub use app::App;
pub use args::Args;
pub use compile::CompileSummary;
pub use exec::UnsupportedFeatureError;
pub use settings::Settings;
pub use steps::{StepBuildError, StepRegistry};

/// Run the command-line app.
pub fn run() -> Result<(), anyhow::Error> {
    use clap::Parser;
    let args = Args::parse();

    // INTERPRET SETTINGS ///////////////
    let settings: Settings = args.try_into()?;

    let log_level = match settings.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    simple_logging::log_to_stderr(log_level);

    // RUN THE THING /////////////////
    let app = App::new(settings);
    app.run()?;

    Ok(())
}
