use std::collections::BTreeMap;
use std::path::Path;

use super::{ArtifactKind, Executor, ScriptArtifact, ScriptEnv, UnsupportedFeatureError};

/// Append-under-lock helpers. Every writer of a shared log file goes through these,
/// taking `flock` on the same `<file>.lock` sidecar the compiler locks.
const LOCK_FUNCTIONS: &str = r#"
locksed() {
    # $1: sed expression, $2: file
    (
        flock -x 200
        sed -i -e "$1" "$2"
    ) 200>"$2.lock"
}

lockappend() {
    # $1: file, rest: fields of the tab-delimited line to append
    local file=$1
    shift
    (
        flock -x 200
        (IFS=$'\t'; printf '%s\n' "$*") >> "$file"
    ) 200>"$file.lock"
}

set_state() {
    # $1: job name, $2: new state
    locksed "s/^${1//./\\.}\t.*$/$1\t$2/" "$RUN_INDEX"
}
"#;

const WAIT_FOR_JOBS: &str = r#"
wait_for_jobs() {
    # Poll the run index until every named job is done. Fails as soon as one has failed.
    local job state
    for job in "$@"; do
        while true; do
            state=$(awk -F '\t' -v job="$job" '$1 == job { print $2 }' "$RUN_INDEX")
            case "$state" in
                done) break ;;
                failed*) echo "Job $job failed" >&2; return 1 ;;
            esac
            sleep "$POLL_INTERVAL"
        done
    done
}

skip_jobs() {
    # Mark jobs that will never start because something they wait for failed.
    local job
    for job in "$@"; do
        set_state "$job" failed:dependency
    done
}
"#;

/// Failure trap. A local job also drops its pid file, so a later kill can't
/// signal whatever process reuses the pid.
fn traps(local_process: bool, out: &mut String) {
    out.push_str(
        r#"
on_failure() {
    # a second signal mustn't cut the bookkeeping short
    trap - ERR
    trap '' INT TERM
    log_line Failed "exit_code=$1"
    set_state "$JOB_NAME" "failed:$1"
"#,
    );
    if local_process {
        out.push_str("    rm -f \"$PID_DIR/$JOB_NAME.pid\"\n");
    }
    out.push_str(
        r#"    exit "$1"
}
trap 'on_failure $?' ERR
trap 'on_failure 130' INT
trap 'on_failure 143' TERM
"#,
    );
}

const TIMESTAMP: &str = "$(date '+%d/%m/%Y %H:%M:%S')";

/// Quote a string for bash, leaving it bare when that's unambiguous.
pub fn shell_quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=,+@%".contains(c));
    if safe {
        s.to_owned()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

pub fn quote_path(path: &Path) -> String {
    shell_quote(&path.to_string_lossy())
}

/// Space-separated job ids, for shell function arguments.
pub fn id_list(ids: &[String]) -> String {
    ids.join(" ")
}

/// Run-wide variables every generated script can use.
pub fn variables(env: &ScriptEnv, out: &mut String) {
    out.push_str("RUN_CODE=");
    out.push_str(&env.run_code);
    out.push_str("\nRUN_INDEX=");
    out.push_str(&quote_path(&env.run_index));
    out.push_str("\nLOG_FILE=");
    out.push_str(&quote_path(&env.log_file));
    out.push_str("\nREGISTRATION_FILE=");
    out.push_str(&quote_path(&env.registration_file));
    out.push_str("\nPID_DIR=");
    out.push_str(&quote_path(&env.pid_dir));
    out.push_str(&format!("\nPOLL_INTERVAL={}\n", env.poll_interval));
    if let Some(limit) = &env.job_limit {
        out.push_str("JOB_LIMIT_FILE=");
        out.push_str(&quote_path(limit));
        out.push('\n');
    }
}

/// Shell functions shared by High, Low and entry scripts.
pub fn functions<E: Executor + ?Sized>(executor: &E, env: &ScriptEnv, out: &mut String) {
    out.push_str(LOCK_FUNCTIONS);
    if !executor.native_dependencies() {
        out.push_str(WAIT_FOR_JOBS);
    }
    if env.job_limit.is_some() {
        out.push_str(&format!(
            r#"
wait_for_slot() {{
    # Block while the queue holds at least as many jobs as the limit file allows.
    local limit
    while true; do
        limit=$(cat "$JOB_LIMIT_FILE" 2>/dev/null || true)
        [ -z "$limit" ] && return 0
        [ "$({} | wc -l)" -lt "$limit" ] && return 0
        sleep "$POLL_INTERVAL"
    done
}}
"#,
            executor.queue_count_command()
        ));
    }
    out.push_str(executor.helper_functions());
}

/// Preamble, state bookkeeping and checksum registration around a step command.
pub fn render_body<E: Executor + ?Sized>(
    executor: &E,
    artifact: &ScriptArtifact,
    command: &str,
    stamped: &[String],
    env: &ScriptEnv,
) -> String {
    let mut out = String::with_capacity(2048 + command.len());
    out.push_str("set -Eeo pipefail\n\n");
    out.push_str(&format!(
        "# {} script of step \"{}\" ({})\n",
        kind_label(artifact.kind),
        artifact.step_name,
        artifact.step_type,
    ));
    out.push_str("JOB_NAME=");
    out.push_str(&artifact.id);
    out.push('\n');
    variables(env, &mut out);
    functions(executor, env, &mut out);
    out.push_str(&format!(
        r#"
log_line() {{
    # $1: event, $2: resource usage
    lockappend "$LOG_FILE" "{TIMESTAMP}" "$1" {} {} "$JOB_NAME" "{}" "$(hostname)" "$2"
}}
"#,
        shell_quote(&artifact.step_type),
        shell_quote(&artifact.step_name),
        executor.job_id_var(),
    ));
    let local_process = !executor.native_dependencies();
    traps(local_process, &mut out);
    out.push('\n');

    if local_process {
        out.push_str("echo $$ > \"$PID_DIR/$JOB_NAME.pid\"\n");
    }
    out.push_str("set_state \"$JOB_NAME\" running\n");
    out.push_str("log_line Started -\n\n");

    if let Some(conda) = &artifact.conda {
        let activate = match &conda.path {
            Some(path) => quote_path(&path.join("bin").join("activate")),
            None => "activate".to_owned(),
        };
        out.push_str("source ");
        out.push_str(&activate);
        if let Some(env_name) = &conda.env {
            out.push(' ');
            out.push_str(&shell_quote(env_name));
        }
        out.push_str("\n\n");
    }

    out.push_str(command.trim_end());
    out.push_str("\n\n");

    if artifact.conda.is_some() {
        out.push_str("conda deactivate || true\n\n");
    }
    if !stamped.is_empty() {
        checksum_block(stamped, &mut out);
    }

    out.push_str(&format!(
        "log_line Finished \"{}\"\n",
        executor.resource_usage()
    ));
    out.push_str("set_state \"$JOB_NAME\" done\n");
    if local_process {
        out.push_str("rm -f \"$PID_DIR/$JOB_NAME.pid\"\n");
    }
    out
}

/// Append an md5 line per stamped file to the registration log.
pub fn checksum_block(stamped: &[String], out: &mut String) {
    out.push_str("# Register checksums of stamped files:\n");
    out.push_str("for stamped in");
    for file in stamped {
        out.push(' ');
        out.push_str(&shell_quote(file));
    }
    out.push_str("; do\n");
    out.push_str("    if [ -f \"$stamped\" ]; then\n");
    out.push_str(&format!(
        "        lockappend \"$REGISTRATION_FILE\" \"$(md5sum \"$stamped\" | cut -d ' ' -f 1)\" \"$stamped\" \"$JOB_NAME\" \"{TIMESTAMP}\"\n"
    ));
    out.push_str("    fi\ndone\n\n");
}

/// Submission of `child` from `parent`, preceded by admission control when a job limit is set.
pub fn dependent_command<E: Executor + ?Sized>(
    executor: &E,
    parent: &ScriptArtifact,
    child: &ScriptArtifact,
    env: &ScriptEnv,
) -> Result<String, UnsupportedFeatureError> {
    let submit = executor.submit_command(child)?;
    let mut out = String::with_capacity(128 + submit.len());
    out.push_str(&format!("# {} -> {}\n", parent.id, child.id));
    if env.job_limit.is_some() {
        out.push_str("wait_for_slot\n");
    }
    out.push_str(&submit);
    out.push('\n');
    Ok(out)
}

/// Scheduler directives for extra options: `<prefix> <key> <value>`,
/// or `<prefix> <key>=<value>` for long options when `long_eq` is set.
pub fn option_directives(
    prefix: &str,
    opts: &BTreeMap<String, String>,
    long_eq: bool,
    out: &mut String,
) {
    for (key, value) in opts {
        out.push_str(prefix);
        out.push(' ');
        out.push_str(key);
        if !value.is_empty() {
            if long_eq && key.starts_with("--") {
                out.push('=');
            } else {
                out.push(' ');
            }
            out.push_str(value);
        }
        out.push('\n');
    }
}

/// Directory with a trailing slash, the form schedulers take for `-e`/`-o` dirs.
pub fn dir_arg(dir: &Path) -> String {
    let mut s = dir.to_string_lossy().into_owned();
    if !s.ends_with('/') {
        s.push('/');
    }
    s
}

fn kind_label(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::Entry => "Entry",
        ArtifactKind::High => "High level",
        ArtifactKind::Preliminary => "Preliminary",
        ArtifactKind::Low => "Low level",
        ArtifactKind::WrappingUp => "Wrapping up",
        ArtifactKind::Kill => "Kill",
    }
}
