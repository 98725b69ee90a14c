use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};

/// Job states and their text form
mod state;
pub use state::{InvalidState, JobState};

/// Job id to script path listing
mod script_index;
pub use script_index::ScriptIndex;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO error on run index {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("Unable to lock run index {0:?}: {1}")]
    Lock(PathBuf, Errno),
    #[error("Job \"{0}\" is not in the run index")]
    UnknownJob(String),
    #[error("Job \"{0}\" is already in the run index")]
    DuplicateJob(String),
    #[error("Malformed run index line {line_no}: \"{line}\"")]
    Malformed { line_no: usize, line: String },
}

/// The run-wide record of every job id and its state.
///
/// Writers in Rust and the `locksed` helper in generated scripts both take an exclusive
/// `flock` on the `<index>.lock` sidecar before touching the file, and every rewrite goes
/// through a temp file that is renamed over the index, so readers never see a torn line.
#[derive(Debug, Clone)]
pub struct RunIndex {
    path: PathBuf,
    lock_path: PathBuf,
}

impl RunIndex {
    pub fn new<T: AsRef<Path>>(path: T) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");
        Self {
            path,
            lock_path: lock_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create an empty index, replacing any existing one.
    pub fn create(&self) -> Result<(), Error> {
        let _guard = self.lock()?;
        File::create(&self.path).map_err(|e| self.io_err(e))?;
        Ok(())
    }

    /// Register new jobs in the `pending` state.
    /// Fails without writing anything if any id is already present.
    pub fn append_pending<S: AsRef<str>>(&self, ids: &[S]) -> Result<(), Error> {
        let _guard = self.lock()?;
        let mut known: BTreeSet<String> = self
            .read_entries()?
            .into_iter()
            .map(|(id, _)| id)
            .collect();

        let mut text = String::with_capacity(ids.len() * 48);
        for id in ids {
            let id = id.as_ref();
            if !known.insert(id.to_owned()) {
                return Err(Error::DuplicateJob(id.to_owned()));
            }
            text.push_str(id);
            text.push('\t');
            text.push_str("pending\n");
        }

        let mut f = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        f.write_all(text.as_bytes()).map_err(|e| self.io_err(e))?;
        Ok(())
    }

    /// Rewrite the line of a single job with a new state.
    pub fn mark(&self, id: &str, state: JobState) -> Result<(), Error> {
        let _guard = self.lock()?;
        let mut entries = self.read_entries()?;
        let entry = entries
            .iter_mut()
            .find(|(job, _)| job == id)
            .ok_or_else(|| Error::UnknownJob(id.to_owned()))?;
        entry.1 = state;

        let mut text = String::with_capacity(entries.len() * 48);
        for (job, state) in &entries {
            text.push_str(job);
            text.push('\t');
            text.push_str(&state.to_string());
            text.push('\n');
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, text).map_err(|e| self.io_err(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;
        Ok(())
    }

    /// All jobs with their current state, in registration order.
    pub fn entries(&self) -> Result<Vec<(String, JobState)>, Error> {
        let _guard = self.lock()?;
        self.read_entries()
    }

    /// Current state of one job, if it is registered.
    pub fn state(&self, id: &str) -> Result<Option<JobState>, Error> {
        Ok(self
            .entries()?
            .into_iter()
            .find(|(job, _)| job == id)
            .map(|(_, state)| state))
    }

    fn lock(&self) -> Result<Flock<File>, Error> {
        let f = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| self.io_err(e))?;
        Flock::lock(f, FlockArg::LockExclusive)
            .map_err(|(_, errno)| Error::Lock(self.lock_path.clone(), errno))
    }

    /// Must be called with the lock held.
    fn read_entries(&self) -> Result<Vec<(String, JobState)>, Error> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::with_capacity(0)),
            Err(e) => return Err(self.io_err(e)),
        };
        let mut entries = Vec::with_capacity(text.len() / 32);
        for (i, line) in text.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            let malformed = || Error::Malformed {
                line_no: i + 1,
                line: line.to_owned(),
            };
            let (id, state) = line.split_once('\t').ok_or_else(malformed)?;
            let state = state.parse().map_err(|_| malformed())?;
            entries.push((id.to_owned(), state));
        }
        Ok(entries)
    }

    fn io_err(&self, source: io::Error) -> Error {
        Error::Io {
            path: self.path.clone(),
            source,
        }
    }
}
