use std::path::{Path, PathBuf};

use super::Fs;

/// `NN.<type>_<name>`, where NN is the step's 1-based position in the execution order.
/// Names the High script, the dir of its other scripts, and its kill script.
pub fn step_dir_name(rank: usize, step_type: &str, step_name: &str) -> String {
    util::sanitize_name(&format!("{:02}.{step_type}_{step_name}", rank + 1))
}

/// Utility fns for making the paths of the home dir layout.
impl Fs {
    /// $HOME/scripts
    pub fn scripts_dir(&self) -> PathBuf {
        self.home.join("scripts")
    }

    /// $HOME/scripts/00.workflow.commands.sh
    pub fn entry_script(&self) -> PathBuf {
        self.parts2("scripts", "00.workflow.commands.sh")
    }

    /// $HOME/scripts/99.kill_all.sh
    pub fn kill_all_script(&self) -> PathBuf {
        self.parts2("scripts", "99.kill_all.sh")
    }

    /// $HOME/scripts/NN.type_name.sh
    pub fn high_script(&self, step_dir: &str) -> PathBuf {
        self.parts2("scripts", format!("{step_dir}.sh"))
    }

    /// $HOME/scripts/NN.type_name
    pub fn low_script_dir(&self, step_dir: &str) -> PathBuf {
        self.parts2("scripts", step_dir)
    }

    /// $HOME/scripts/kill
    pub fn kill_dir(&self) -> PathBuf {
        self.parts2("scripts", "kill")
    }

    /// $HOME/scripts/kill/NN.type_name.kill.sh
    pub fn kill_script(&self, step_dir: &str) -> PathBuf {
        self.parts3("scripts", "kill", format!("{step_dir}.kill.sh"))
    }

    /// $HOME/data/type/name
    pub fn step_data_dir(&self, step_type: &str, step_name: &str) -> PathBuf {
        self.parts3("data", step_type, step_name)
    }

    /// $HOME/logs
    pub fn logs_dir(&self) -> PathBuf {
        self.home.join("logs")
    }

    /// $HOME/logs/log_<run_code>.txt
    pub fn log_file(&self, run_code: &str) -> PathBuf {
        self.parts2("logs", format!("log_{run_code}.txt"))
    }

    /// $HOME/logs/run_index_<run_code>.txt
    pub fn run_index(&self, run_code: &str) -> PathBuf {
        self.parts2("logs", format!("run_index_{run_code}.txt"))
    }

    /// $HOME/logs/script_index_<run_code>.txt
    pub fn script_index(&self, run_code: &str) -> PathBuf {
        self.parts2("logs", format!("script_index_{run_code}.txt"))
    }

    /// $HOME/logs/file_registration.txt
    pub fn registration_file(&self) -> PathBuf {
        self.parts2("logs", "file_registration.txt")
    }

    /// $HOME/logs/version_list.txt
    pub fn version_file(&self) -> PathBuf {
        self.parts2("logs", "version_list.txt")
    }

    /// $HOME/logs/pids
    pub fn pid_dir(&self) -> PathBuf {
        self.parts2("logs", "pids")
    }

    /// $HOME/stderr/<run_code>
    pub fn stderr_dir(&self, run_code: &str) -> PathBuf {
        self.parts2("stderr", run_code)
    }

    /// $HOME/stdout/<run_code>
    pub fn stdout_dir(&self, run_code: &str) -> PathBuf {
        self.parts2("stdout", run_code)
    }

    /// $HOME/objects/workflow_snapshot_<run_code>.json
    pub fn snapshot(&self, run_code: &str) -> PathBuf {
        self.parts2("objects", format!("workflow_snapshot_{run_code}.json"))
    }

    fn parts2<T, U>(&self, p1: T, p2: U) -> PathBuf
    where
        T: AsRef<Path>,
        U: AsRef<Path>,
    {
        let mut buf = self.home.join(p1);
        buf.push(p2);
        buf
    }

    fn parts3<T, U, V>(&self, p1: T, p2: U, p3: V) -> PathBuf
    where
        T: AsRef<Path>,
        U: AsRef<Path>,
        V: AsRef<Path>,
    {
        let mut buf = self.parts2(p1, p2);
        buf.push(p3);
        buf
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_layout() {
        let fs = Fs::new(Path::new("/home/proj"), false);
        let dir = step_dir_name(1, "generic", "trim");
        assert_eq!(dir, "02.generic_trim");
        assert_eq!(fs.high_script(&dir), PathBuf::from("/home/proj/scripts/02.generic_trim.sh"));
        assert_eq!(
            fs.kill_script(&dir),
            PathBuf::from("/home/proj/scripts/kill/02.generic_trim.kill.sh")
        );
        assert_eq!(
            fs.step_data_dir("generic", "trim"),
            PathBuf::from("/home/proj/data/generic/trim")
        );
        assert_eq!(
            fs.run_index("20240101"),
            PathBuf::from("/home/proj/logs/run_index_20240101.txt")
        );
    }
}
