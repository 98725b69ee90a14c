use workflow::ExecutorKind;

use super::common::{id_list, option_directives, quote_path};
use super::{Executor, KillCommand, ScriptArtifact, ScriptEnv, UnsupportedFeatureError};

/// SLURM only accepts numeric ids in `--dependency`, so job names are looked up
/// in the queue when the dependent job is submitted. Jobs that already left the
/// queue impose no dependency.
const HELPERS: &str = r#"
slurm_dependency() {
    # $@: job names
    local names ids
    names=$(IFS=,; echo "$*")
    ids=$(squeue -h -o %i --name="$names" | paste -sd: -)
    if [ -n "$ids" ]; then
        echo "--dependency=afterok:$ids"
    fi
}
"#;

#[derive(Debug, Default)]
pub struct SlurmExecutor;

impl Executor for SlurmExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Slurm
    }

    fn helper_functions(&self) -> &'static str {
        HELPERS
    }

    fn job_id_var(&self) -> &'static str {
        "$SLURM_JOB_ID"
    }

    fn resource_usage(&self) -> &'static str {
        "$(sstat -n -a -j $SLURM_JOB_ID -o MaxRSS 2>/dev/null | sort -h | tail -n 1 | tr -d ' ')"
    }

    fn queue_count_command(&self) -> &'static str {
        "squeue -h -u \"$USER\""
    }

    fn render_header(&self, artifact: &ScriptArtifact) -> String {
        let mut out = String::with_capacity(512);
        out.push_str("#!/bin/bash\n");
        out.push_str(&format!("#SBATCH --job-name={}\n", artifact.id));
        if let Some(partition) = &artifact.qsub.queue {
            out.push_str(&format!("#SBATCH --partition={partition}\n"));
        }
        if !artifact.qsub.nodes.is_empty() {
            out.push_str(&format!(
                "#SBATCH --nodelist={}\n",
                artifact.qsub.nodes.join(",")
            ));
        }
        out.push_str(&format!(
            "#SBATCH -e {}\n",
            artifact.stderr_dir.join(format!("{}.e%j", artifact.id)).display()
        ));
        out.push_str(&format!(
            "#SBATCH -o {}\n",
            artifact.stdout_dir.join(format!("{}.o%j", artifact.id)).display()
        ));
        option_directives("#SBATCH", &artifact.qsub.opts, true, &mut out);
        out.push('\n');
        out
    }

    fn submit_command(&self, child: &ScriptArtifact) -> Result<String, UnsupportedFeatureError> {
        let mut cmd = String::from("sbatch ");
        if child.held {
            cmd.push_str("--hold ");
        }
        if !child.dependency_ids.is_empty() {
            cmd.push_str(&format!(
                "$(slurm_dependency {}) ",
                id_list(&child.dependency_ids)
            ));
        }
        cmd.push_str(&quote_path(&child.path));
        Ok(cmd)
    }

    fn render_kill_command(&self, artifact: &ScriptArtifact, _env: &ScriptEnv) -> KillCommand {
        KillCommand::Command(format!("scancel --name={}", artifact.id))
    }

    fn render_hold_command(&self, artifact: &ScriptArtifact) -> KillCommand {
        KillCommand::Command(format!("scontrol hold jobname={}", artifact.id))
    }

    fn render_release_command(
        &self,
        artifact: &ScriptArtifact,
    ) -> Result<String, UnsupportedFeatureError> {
        Ok(format!("scontrol release jobname={}", artifact.id))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::exec::test_util::artifact;
    use crate::exec::ArtifactKind;

    #[test]
    fn test_header() {
        let low = artifact(ArtifactKind::Low, "generic_trim_S1_1", &["a_1"]);
        let header = SlurmExecutor.render_header(&low);
        assert!(header.contains("#SBATCH --job-name=generic_trim_S1_1\n"));
        assert!(header.contains("#SBATCH --partition=all.q\n"));
        assert!(header.contains("#SBATCH --nodelist=node1,node2\n"));
        assert!(header.contains("#SBATCH -e /home/stderr/20240101120000/generic_trim_S1_1.e%j\n"));
        // dependencies are resolved at submit time, not in the header:
        assert!(!header.contains("a_1"));
    }

    #[test]
    fn test_submit_with_dependencies() {
        let mut low = artifact(ArtifactKind::Low, "generic_trim_S1_1", &["a_1", "b_1"]);
        low.held = true;
        let cmd = SlurmExecutor.submit_command(&low).unwrap();
        assert_eq!(
            cmd,
            "sbatch --hold $(slurm_dependency a_1 b_1) /home/scripts/02.generic_trim/generic_trim_S1_1.sh"
        );
    }
}
