use workflow::ExecutorKind;

use super::common::{id_list, quote_path};
use super::{Executor, KillCommand, ScriptArtifact, ScriptEnv, UnsupportedFeatureError};

/// Runs every job as a background bash process on this machine.
/// There is no scheduler to hold jobs, so dependent jobs poll the run index.
#[derive(Debug, Default)]
pub struct LocalExecutor;

impl Executor for LocalExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Local
    }

    fn native_dependencies(&self) -> bool {
        false
    }

    fn job_id_var(&self) -> &'static str {
        "$$"
    }

    fn resource_usage(&self) -> &'static str {
        "$(ps -o rss= -p $$ 2>/dev/null | tr -d ' ')"
    }

    fn queue_count_command(&self) -> &'static str {
        "jobs -rp"
    }

    fn render_header(&self, artifact: &ScriptArtifact) -> String {
        let mut out = String::from("#!/bin/bash\n");
        if !artifact.dependency_ids.is_empty() {
            out.push_str(&format!(
                "# Started once these jobs are done: {}\n",
                artifact.dependency_ids.join(", ")
            ));
        }
        out.push('\n');
        out
    }

    fn submit_command(&self, child: &ScriptArtifact) -> Result<String, UnsupportedFeatureError> {
        if child.held {
            return Err(UnsupportedFeatureError::new(self.kind(), "Holding jobs"));
        }
        let script = quote_path(&child.path);
        if child.dependency_ids.is_empty() {
            return Ok(format!("bash {script} &"));
        }
        // the subshell must not run the parent's failure trap, and a child whose
        // dependencies failed is marked so nothing downstream waits on it forever
        let mut skipped = vec![child.id.clone()];
        skipped.extend(child.submitted_ids.iter().cloned());
        Ok(format!(
            "(\n    \
             trap - ERR INT TERM\n    \
             if wait_for_jobs {}; then\n        \
             bash {script}\n    \
             else\n        \
             skip_jobs {}\n    \
             fi\n\
             ) &",
            id_list(&child.dependency_ids),
            id_list(&skipped),
        ))
    }

    fn render_kill_command(&self, artifact: &ScriptArtifact, env: &ScriptEnv) -> KillCommand {
        let pid_file = quote_path(&env.pid_dir.join(format!("{}.pid", artifact.id)));
        KillCommand::Command(format!(
            "if [ -f {pid_file} ]; then\n    \
             pid=$(cat {pid_file})\n    \
             pkill -TERM -P \"$pid\" 2>/dev/null || true\n    \
             kill \"$pid\" 2>/dev/null || true\n\
             fi"
        ))
    }

    fn render_hold_command(&self, _artifact: &ScriptArtifact) -> KillCommand {
        KillCommand::Unsupported
    }

    fn render_release_command(
        &self,
        _artifact: &ScriptArtifact,
    ) -> Result<String, UnsupportedFeatureError> {
        Err(UnsupportedFeatureError::new(self.kind(), "Slow release"))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::exec::test_util::{artifact, env};
    use crate::exec::ArtifactKind;

    #[test]
    fn test_submit_waits_on_run_index() {
        let low = artifact(ArtifactKind::Low, "generic_trim_S1_1", &["a_1", "b_1"]);
        let cmd = LocalExecutor.submit_command(&low).unwrap();
        assert_eq!(
            cmd,
            "(\n    trap - ERR INT TERM\n    \
             if wait_for_jobs a_1 b_1; then\n        \
             bash /home/scripts/02.generic_trim/generic_trim_S1_1.sh\n    \
             else\n        skip_jobs generic_trim_S1_1\n    fi\n) &"
        );

        let root = artifact(ArtifactKind::Low, "merge_m_S1_1", &[]);
        let cmd = LocalExecutor.submit_command(&root).unwrap();
        assert!(cmd.starts_with("bash "));
        assert!(!cmd.contains("wait_for_jobs"));
    }

    #[test]
    fn test_skipped_high_takes_its_jobs_along() {
        let mut high = artifact(ArtifactKind::High, "generic_trim_1", &["merge_m_1"]);
        high.submitted_ids = vec!["generic_trim_S1_1".to_owned(), "generic_trim_S2_1".to_owned()];
        let cmd = LocalExecutor.submit_command(&high).unwrap();
        assert!(cmd.contains("skip_jobs generic_trim_1 generic_trim_S1_1 generic_trim_S2_1\n"));
    }

    #[test]
    fn test_release_unsupported() {
        let mut low = artifact(ArtifactKind::Low, "generic_trim_S1_1", &[]);
        let err = LocalExecutor.render_release_command(&low).unwrap_err();
        assert_eq!(err.executor, ExecutorKind::Local);
        low.held = true;
        assert!(LocalExecutor.submit_command(&low).is_err());
        assert_eq!(LocalExecutor.render_hold_command(&low), KillCommand::Unsupported);
    }

    #[test]
    fn test_kill_reads_pid_file() {
        let low = artifact(ArtifactKind::Low, "generic_trim_S1_1", &[]);
        let KillCommand::Command(cmd) = LocalExecutor.render_kill_command(&low, &env()) else {
            panic!("local jobs can be killed");
        };
        assert!(cmd.contains("/home/logs/pids/generic_trim_S1_1.pid"));
    }
}
