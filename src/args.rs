use clap::{ArgAction, Parser};

const CMD_NAME: &str = "sqf";
const DEFAULT_HOME: &str = ".";

/// Stores our command-line args format.
#[derive(Parser)]
#[command(name = CMD_NAME, version, about = None, long_about = None)]
pub struct Args {
    /// Tab-delimited sample sheet
    #[arg(short, long, value_name = "FILE")]
    pub sample_file: String,

    /// YAML parameter file; may be repeated, later files override earlier ones
    #[arg(short, long = "param-file", value_name = "FILE", required = true)]
    pub param_files: Vec<String>,

    /// Directory that receives scripts, data, logs and snapshots
    #[arg(short = 'd', long, value_name = "DIR", default_value = DEFAULT_HOME)]
    #[arg(env = "SEQFLOW_HOME")]
    pub home_dir: String,

    /// Message recorded with this run in the version log
    #[arg(short, long, value_name = "TEXT")]
    pub message: Option<String>,

    /// Use this run code instead of the current timestamp
    #[arg(short, long, value_name = "CODE")]
    pub run_code: Option<String>,

    /// Print additional debugging info (repeat for more)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Dry run; resolve and print the plan, but don't write anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}
