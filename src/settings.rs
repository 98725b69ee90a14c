use std::path::PathBuf;

use crate::args::Args;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Sample file \"{0}\" does not exist")]
    MissingSampleFile(String),
    #[error("Parameter file \"{0}\" does not exist")]
    MissingParamFile(String),
    #[error("Invalid run code \"{0}\": only letters, digits, '_', '-' and '.' are allowed")]
    InvalidRunCode(String),
}

/// Settings are like Args, except all the logic has
/// been applied so e.g. defaults are added in.
#[derive(Debug)]
pub struct Settings {
    pub sample_file: PathBuf,
    pub param_files: Vec<PathBuf>,
    pub home_dir: PathBuf,
    pub message: Option<String>,
    /// Timestamp of this run unless overridden.
    pub run_code: String,
    pub verbose: u8,
    pub dry_run: bool,
}

impl TryFrom<Args> for Settings {
    type Error = anyhow::Error;
    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let sample_file = PathBuf::from(&args.sample_file);
        if !sample_file.exists() {
            return Err(Error::MissingSampleFile(args.sample_file).into());
        }
        let sample_file = sample_file.canonicalize()?;

        let mut param_files = Vec::with_capacity(args.param_files.len());
        for file in args.param_files {
            let path = PathBuf::from(&file);
            if !path.exists() {
                return Err(Error::MissingParamFile(file).into());
            }
            param_files.push(path.canonicalize()?);
        }

        let run_code = match args.run_code {
            Some(code) => {
                if code.is_empty() || util::sanitize_name(&code) != code {
                    return Err(Error::InvalidRunCode(code).into());
                }
                code
            }
            None => chrono::Local::now().format("%Y%m%d%H%M%S").to_string(),
        };

        Ok(Self {
            sample_file,
            param_files,
            home_dir: PathBuf::from(&args.home_dir),
            message: args.message,
            run_code,
            verbose: args.verbose,
            dry_run: args.dry_run,
        })
    }
}
