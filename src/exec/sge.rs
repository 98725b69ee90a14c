use workflow::ExecutorKind;

use super::common::{dir_arg, option_directives, quote_path};
use super::{Executor, KillCommand, ScriptArtifact, ScriptEnv, UnsupportedFeatureError};

/// Sun/Open Grid Engine: dependencies are held natively with `-hold_jid`.
#[derive(Debug, Default)]
pub struct SgeExecutor;

impl Executor for SgeExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Sge
    }

    fn job_id_var(&self) -> &'static str {
        "$JOB_ID"
    }

    fn resource_usage(&self) -> &'static str {
        "$(qstat -j $JOB_ID 2>/dev/null | grep -o 'maxvmem=[^ ,]*' | head -n 1)"
    }

    fn queue_count_command(&self) -> &'static str {
        "qstat -u \"$USER\" | tail -n +3"
    }

    fn render_header(&self, artifact: &ScriptArtifact) -> String {
        let mut out = String::with_capacity(512);
        out.push_str("#!/bin/bash\n#$ -S /bin/bash\n");
        out.push_str(&format!("#$ -N {}\n", artifact.id));
        if let Some(queue) = queue_spec(artifact) {
            out.push_str(&format!("#$ -q {queue}\n"));
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

    fn render_hold_command(&self, artifact: &ScriptArtifact) -> KillCommand {
        KillCommand::Command(format!("qhold {}", artifact.id))
    }

    fn render_release_command(
        &self,
        artifact: &ScriptArtifact,
    ) -> Result<String, UnsupportedFeatureError> {
        Ok(format!("qrls {}", artifact.id))
    }
}

/// `queue@node1,queue@node2`; `*` stands in for a missing queue.
fn queue_spec(artifact: &ScriptArtifact) -> Option<String> {
    let qsub = &artifact.qsub;
    if qsub.nodes.is_empty() {
        return qsub.queue.clone();
    }
    let queue = qsub.queue.as_deref().unwrap_or("*");
    let spec: Vec<String> = qsub
        .nodes
        .iter()
        .map(|node| format!("{queue}@{node}"))
        .collect();
    Some(spec.join(","))
}

/// `-hold_jid` directive shared with the generic qsub flavor.
pub(super) fn hold_jid(artifact: &ScriptArtifact, out: &mut String) {
    if !artifact.dependency_ids.is_empty() {
        out.push_str("#$ -hold_jid ");
        out.push_str(&artifact.dependency_ids.join(","));
        out.push('\n');
    }
}

/// `qsub [-h] <script>`, shared with the generic qsub flavor.
pub(super) fn grid_submit(child: &ScriptArtifact) -> String {
    let hold = if child.held { "-h " } else { "" };
    format!("qsub {hold}{}", quote_path(&child.path))
}
