use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::exec::Level;

/// Tab-delimited `job id, level, script path` listing, written only by the compiler.
#[derive(Debug)]
pub struct ScriptIndex {
    path: PathBuf,
    buf: String,
}

impl ScriptIndex {
    pub fn new<T: AsRef<Path>>(path: T) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            buf: String::with_capacity(1024),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue one entry; nothing reaches disk until [`ScriptIndex::flush`].
    pub fn add(&mut self, job_id: &str, level: Level, script: &Path) {
        self.buf.push_str(job_id);
        self.buf.push('\t');
        self.buf.push_str(&level.to_string());
        self.buf.push('\t');
        self.buf.push_str(&script.to_string_lossy());
        self.buf.push('\n');
    }

    /// Append queued entries to the index file.
    pub fn flush(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let mut f = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .with_context(|| format!("opening script index {:?}", self.path))?;
        f.write_all(self.buf.as_bytes())
            .with_context(|| format!("writing script index {:?}", self.path))?;
        self.buf.clear();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::ScriptIndex;
    use crate::exec::Level;
    use anyhow::Result;
    use std::path::Path;

    #[test]
    fn test_flush_appends() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut index = ScriptIndex::new(dir.path().join("script_index.txt"));
        index.add("merge_m_S1_1", Level::Low, Path::new("/x/01.merge_m/S1.sh"));
        index.flush()?;
        index.add("merge_m_1", Level::High, Path::new("/x/01.merge_m.sh"));
        index.flush()?;
        let text = std::fs::read_to_string(index.path())?;
        assert_eq!(
            text,
            "merge_m_S1_1\tlow\t/x/01.merge_m/S1.sh\nmerge_m_1\thigh\t/x/01.merge_m.sh\n"
        );
        Ok(())
    }
}
