use workflow::ExecutorKind;

use super::common::{dir_arg, option_directives};
use super::sge::{grid_submit, hold_jid};
use super::{Executor, KillCommand, ScriptArtifact, ScriptEnv, UnsupportedFeatureError};

/// Generic qsub flavor: grid-engine directives, but nodes are requested by
/// hostname and jobs can't be frozen by the kill-all script.
#[derive(Debug, Default)]
pub struct QsubExecutor;

impl Executor for QsubExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Qsub
    }

    fn job_id_var(&self) -> &'static str {
        "$JOB_ID"
    }

    fn queue_count_command(&self) -> &'static str {
        "qstat -u \"$USER\" | tail -n +3"
    }

    fn render_header(&self, artifact: &ScriptArtifact) -> String {
        let mut out = String::with_capacity(512);
        out.push_str("#!/bin/bash\n#$ -S /bin/bash\n");
        out.push_str(&format!("#$ -N {}\n", artifact.id));
        if let Some(queue) = &artifact.qsub.queue {
            out.push_str(&format!("#$ -q {queue}\n"));
        }
        if !artifact.qsub.nodes.is_empty() {
            out.push_str(&format!(
                "#$ -l hostname={}\n",
                artifact.qsub.nodes.join("|")
            ));
        }
        out.push_str(&format!("#$ -e {}\n", dir_arg(&artifact.stderr_dir)));
        out.push_str(&format!("#$ -o {}\n", dir_arg(&artifact.stdout_dir)));
        hold_jid(artifact, &mut out);
        option_directives("#$", &artifact.qsub.opts, false, &mut out);
        out.push('\n');
        out
    }

    fn submit_command(&self, child: &ScriptArtifact) -> Result<String, UnsupportedFeatureError> {
        Ok(grid_submit(child))
    }

    fn render_kill_command(&self, artifact: &ScriptArtifact, _env: &ScriptEnv) -> KillCommand {
        KillCommand::Command(format!("qdel {}", artifact.id))
    }

    fn render_hold_command(&self, _artifact: &ScriptArtifact) -> KillCommand {
        KillCommand::Unsupported
    }

    fn render_release_command(
        &self,
        artifact: &ScriptArtifact,
    ) -> Result<String, UnsupportedFeatureError> {
        Ok(format!("qrls {}", artifact.id))
    }
}
