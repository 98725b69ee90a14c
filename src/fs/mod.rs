use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use util::PathEncodingError;

/// Defines fns for creating common paths in the home directory
mod paths;
pub use paths::step_dir_name;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Specified home directory \"{0}\" is not a directory")]
    NotDirectory(String),
    #[error("Can't perform IO operation: \"{0}\" is not whitelisted")]
    NotWhitelisted(String),
    #[error("Path \"{0}\" has no parent directory")]
    NoParent(String),
}

/// All file operations in the crate should go through this struct.
///
/// All destructive operations check that the path in question is a child of the
/// single whitelisted prefix (the home dir), otherwise they will not be performed.
/// The generated scripts are not bound by this; they write wherever their
/// step commands tell them to.
#[derive(Debug)]
pub struct Fs {
    /// The directory we are allowed to modify
    home: PathBuf,
    /// if true, prevents all destructive operations
    dry_run: bool,
}

impl Fs {
    /// Create a new `Fs` with the given home directory.
    pub fn new(home: &Path, dry_run: bool) -> Self {
        Self {
            home: home.to_path_buf(),
            dry_run,
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Check whether the home dir exists, and create it if not.
    pub fn ensure_home_dir_exists(&mut self, verbose: bool) -> Result<()> {
        if !self.home.exists() {
            if self.dry_run {
                eprintln!("Dry run. Not creating home directory {:?}", self.home);
                return Ok(());
            }
            eprintln!("Home directory {:?} doesn't exist. Creating.", self.home);
            fs::create_dir_all(&self.home).context("creating home directory")?;
        } else if !self.home.is_dir() {
            return Err(Error::NotDirectory(
                self.home.to_str().ok_or(PathEncodingError)?.to_string(),
            )
            .into());
        } else if verbose {
            eprintln!("Home directory {:?} already exists. Not creating.", self.home);
        }

        self.home = self.home.canonicalize()?;
        Ok(())
    }

    /// Create a directory (uses `std::fs::create_dir_all`, so an entire tree of dirs can be created).
    pub fn create_dir<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        fs::create_dir_all(path).with_context(|| format!("creating dir {path:?}"))?;
        Ok(())
    }

    /// Create parent directory of a given path.
    pub fn create_parent_dir<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let path = path.as_ref();
        let parent = path
            .parent()
            .ok_or_else(|| Error::NoParent(path.to_string_lossy().into_owned()))?;
        self.create_dir(parent)
    }

    /// Create a file, and return a writable `File` handle.
    pub fn create_file<T: AsRef<Path>>(&self, path: T) -> Result<fs::File> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        let f = fs::File::create(path).with_context(|| format!("creating file {path:?}"))?;
        Ok(f)
    }

    /// Write entire str to a file.
    pub fn write_file<T: AsRef<Path>>(&self, path: T, text: &str) -> Result<()> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        fs::write(path, text).with_context(|| format!("writing file {path:?}"))?;
        Ok(())
    }

    /// Append a str to a file, creating it if needed.
    pub fn append_file<T: AsRef<Path>>(&self, path: T, text: &str) -> Result<()> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        let mut f = fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .with_context(|| format!("opening file {path:?}"))?;
        f.write_all(text.as_bytes())
            .with_context(|| format!("appending to file {path:?}"))?;
        Ok(())
    }

    /// Write a script and make it executable.
    pub fn write_script<T: AsRef<Path>>(&self, path: T, text: &str) -> Result<()> {
        let path = path.as_ref();
        self.write_file(path, text)?;
        self.make_executable(path)
    }

    /// Add execute permissions for everyone who can read the file.
    pub fn make_executable<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let path = path.as_ref();
        self.check_whitelist(path)?;
        let mut perms = fs::metadata(path)?.permissions();
        let mode = perms.mode();
        perms.set_mode(mode | ((mode & 0o444) >> 2));
        fs::set_permissions(path, perms).with_context(|| format!("setting mode of {path:?}"))?;
        Ok(())
    }

    /// Delete a file.
    pub fn delete_file<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        fs::remove_file(path).with_context(|| format!("deleting file {path:?}"))?;
        Ok(())
    }

    /// Read entire file into a String.
    pub fn read_to_buf<T: AsRef<Path>>(&self, path: T, strbuf: &mut String) -> Result<()> {
        use std::io::Read;
        let path = path.as_ref();
        strbuf.clear();
        let cap = fs::metadata(path)?.len() as usize;
        if cap > strbuf.len() {
            strbuf.reserve(cap - strbuf.len());
        }
        let mut f = fs::File::open(path)?;
        f.read_to_string(strbuf)?;
        Ok(())
    }

    fn is_whitelisted<T: AsRef<Path>>(&self, path: T) -> bool {
        path.as_ref().starts_with(&self.home)
    }

    fn check_whitelist(&self, path: &Path) -> Result<()> {
        if self.dry_run || !self.is_whitelisted(path) {
            Err(Error::NotWhitelisted(path.to_str().ok_or(PathEncodingError)?.to_owned()).into())
        } else {
            Ok(())
        }
    }
}
