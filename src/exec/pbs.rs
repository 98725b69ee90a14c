use std::path::{Path, PathBuf};

use workflow::ExecutorKind;

use super::common::{dir_arg, id_list, option_directives, quote_path};
use super::{Executor, KillCommand, ScriptArtifact, ScriptEnv, UnsupportedFeatureError};

const HELPERS: &str = r#"
pbs_dependency() {
    # $@: job names
    local name ids=""
    for name in "$@"; do
        ids="$ids $(qselect -N "$name")"
    done
    ids=$(echo $ids | tr ' ' ':')
    if [ -n "$ids" ]; then
        echo "-W depend=afterok:$ids"
    fi
}
"#;

/// PBS/Torque. Jobs are addressed by name through `qselect -N`.
#[derive(Debug, Default)]
pub struct PbsExecutor;

impl Executor for PbsExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Pbs
    }

    fn helper_functions(&self) -> &'static str {
        HELPERS
    }

    fn job_id_var(&self) -> &'static str {
        "$PBS_JOBID"
    }

    fn resource_usage(&self) -> &'static str {
        "$(qstat -f $PBS_JOBID 2>/dev/null | grep -o 'resources_used.mem = [^ ]*' | cut -d ' ' -f 3)"
    }

    fn queue_count_command(&self) -> &'static str {
        "qselect -u \"$USER\""
    }

    /// PBS writes into a per-step subdir, which has to exist before submission.
    fn stream_dirs(&self, stderr: &Path, stdout: &Path, step_dir: &str) -> (PathBuf, PathBuf) {
        (stderr.join(step_dir), stdout.join(step_dir))
    }

    fn render_header(&self, artifact: &ScriptArtifact) -> String {
        let mut out = String::with_capacity(512);
        out.push_str("#!/bin/bash\n");
        out.push_str(&format!("#PBS -N {}\n", artifact.id));
        if let Some(queue) = &artifact.qsub.queue {
            out.push_str(&format!("#PBS -q {queue}\n"));
        }
        if !artifact.qsub.nodes.is_empty() {
            out.push_str(&format!("#PBS -l nodes={}\n", artifact.qsub.nodes.join("+")));
        }
        out.push_str(&format!("#PBS -e {}\n", dir_arg(&artifact.stderr_dir)));
        out.push_str(&format!("#PBS -o {}\n", dir_arg(&artifact.stdout_dir)));
        option_directives("#PBS", &artifact.qsub.opts, false, &mut out);
        out.push('\n');
        out
    }

    fn submit_command(&self, child: &ScriptArtifact) -> Result<String, UnsupportedFeatureError> {
        let mut cmd = String::from("qsub ");
        if child.held {
            cmd.push_str("-h ");
        }
        if !child.dependency_ids.is_empty() {
            cmd.push_str(&format!(
                "$(pbs_dependency {}) ",
                id_list(&child.dependency_ids)
            ));
        }
        cmd.push_str(&quote_path(&child.path));
        Ok(cmd)
    }

    fn render_kill_command(&self, artifact: &ScriptArtifact, _env: &ScriptEnv) -> KillCommand {
        KillCommand::Command(by_name(artifact, "qdel"))
    }

    fn render_hold_command(&self, artifact: &ScriptArtifact) -> KillCommand {
        KillCommand::Command(by_name(artifact, "qhold"))
    }

    fn render_release_command(
        &self,
        artifact: &ScriptArtifact,
    ) -> Result<String, UnsupportedFeatureError> {
        Ok(by_name(artifact, "qrls"))
    }
}

fn by_name(artifact: &ScriptArtifact, cmd: &str) -> String {
    format!("qselect -N {} | xargs -r {cmd}", artifact.id)
}
