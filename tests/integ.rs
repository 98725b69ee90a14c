use anyhow::Result;
use seqflow::run_index::{JobState, RunIndex};
use seqflow::steps::{BuildOutput, StepBuilder, StepContext};
use seqflow::{App, Args, Settings, StepBuildError, StepRegistry, UnsupportedFeatureError};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

const RUN_CODE: &str = "r1";

const SAMPLES: &str = "Title\ttest_project\n\
#SampleID\tType\tPath\n\
s1\tForward\t/raw/s1_R1.fq\n\
s1\tReverse\t/raw/s1_R2.fq\n\
s2\tForward\t/raw/s2_R1.fq\n\
s2\tReverse\t/raw/s2_R2.fq\n\
s3\tForward\t/raw/s3_R1.fq\n\
s3\tReverse\t/raw/s3_R2.fq\n";

const TWO_STEPS: &str = r#"
Step_params:
  merge1:
    module: merge
  trim1:
    module: generic
    base: merge1
    script_path: trim.sh
    inputs: [Forward]
    outputs:
      Forward: "{sample}.trimmed.fq"
    redirects:
      --in: "{in:Forward}"
      --out: "{out:Forward}"
"#;

fn args(dir: &Path, param_files: &[&str]) -> Args {
    Args {
        sample_file: str_path(dir.join("samples.tsv")),
        param_files: param_files.iter().map(|p| str_path(dir.join(p))).collect(),
        home_dir: str_path(dir.join("home")),
        message: Some(String::from("integration test")),
        run_code: Some(RUN_CODE.to_owned()),
        verbose: 1,
        dry_run: false,
    }
}

fn str_path(path: PathBuf) -> String {
    path.to_str().unwrap().to_owned()
}

/// Write the sample sheet and parameter files into `dir`.
fn setup(dir: &Path, params: &[(&str, &str)]) -> Result<()> {
    fs::write(dir.join("samples.tsv"), SAMPLES)?;
    for (name, text) in params {
        fs::write(dir.join(name), text)?;
    }
    Ok(())
}

fn executor(name: &str) -> String {
    format!("Global_params:\n  Executor: {name}\n")
}

fn run(dir: &Path, params: &[(&str, &str)]) -> Result<seqflow::CompileSummary> {
    run_with(dir, params, StepRegistry::with_builtins())
}

fn run_with(
    dir: &Path,
    params: &[(&str, &str)],
    registry: StepRegistry,
) -> Result<seqflow::CompileSummary> {
    simple_logging::log_to_stderr(log::LevelFilter::Debug);
    setup(dir, params)?;
    let names: Vec<&str> = params.iter().map(|(name, _)| *name).collect();
    let settings: Settings = args(dir, &names).try_into()?;
    let summary = App::with_registry(settings, registry).run()?;
    Ok(summary.expect("not a dry run"))
}

fn read(path: impl AsRef<Path>) -> String {
    fs::read_to_string(path.as_ref())
        .unwrap_or_else(|e| panic!("unable to read {:?}: {e}", path.as_ref()))
}

#[test]
fn test_demo_workflow() -> Result<()> {
    simple_logging::log_to_stderr(log::LevelFilter::Debug);
    let output = tempdir()?;
    let args = Args {
        sample_file: String::from("demos/samples.tsv"),
        param_files: vec![String::from("demos/params.yaml")],
        home_dir: str_path(output.path().to_path_buf()),
        message: None,
        run_code: Some(RUN_CODE.to_owned()),
        verbose: 0,
        dry_run: false,
    };
    let settings: Settings = args.try_into()?;
    let summary = App::new(settings).run()?.expect("not a dry run");

    assert_eq!(summary.steps, 4);
    let home = output.path().canonicalize()?;
    let scripts = home.join("scripts");
    for name in [
        "00.workflow.commands.sh",
        "01.merge_merge1.sh",
        "02.generic_trim1.sh",
        "03.generic_align1.sh",
        "04.generic_report.sh",
        "99.kill_all.sh",
    ] {
        assert!(scripts.join(name).exists(), "{name} wasn't created");
    }

    // the step's own queue override wins over the global one:
    let trim_low = read(scripts.join("02.generic_trim1/generic_trim1_s1_r1.sh"));
    assert!(trim_low.contains("#$ -q long.q@node1,long.q@node2\n"));
    assert!(trim_low.contains("#$ -pe shared 4\n"));
    assert!(trim_low.contains("#$ -V\n"));
    assert!(trim_low.contains("merge1/s1/s1.Forward"));

    // the reference comes from the project part of the sample sheet:
    let align_low = read(scripts.join("03.generic_align1/generic_align1_s2_r1.sh"));
    assert!(align_low.contains("merge1/project/project.Reference"));
    assert!(align_low.contains("s2.bam"));

    let report_high = read(scripts.join("04.generic_report.sh"));
    assert!(report_high.contains("#$ -hold_jid generic_trim1_r1,generic_align1_r1\n"));

    let version_log = read(home.join("logs/version_list.txt"));
    assert!(version_log.starts_with("r1\t"));
    Ok(())
}

#[test]
fn test_high_dependencies_are_pending() -> Result<()> {
    let output = tempdir()?;
    let sge = executor("SGE");
    run(output.path(), &[("sge.yaml", &sge), ("steps.yaml", TWO_STEPS)])?;
    let home = output.path().join("home").canonicalize()?;

    let index = RunIndex::new(home.join("logs/run_index_r1.txt"));
    let entries = index.entries()?;
    assert!(entries.iter().all(|(_, state)| *state == JobState::Pending));

    // every job is registered exactly once, including the High jobs downstream Highs wait on:
    let trim_high = read(home.join("scripts/02.generic_trim1.sh"));
    assert!(trim_high.contains("#$ -hold_jid merge_merge1_r1\n"));
    for id in [
        "merge_merge1_r1",
        "merge_merge1_s1_r1",
        "generic_trim1_r1",
        "generic_trim1_s3_r1",
    ] {
        let count = entries.iter().filter(|(entry, _)| entry == id).count();
        assert_eq!(count, 1, "{id} registered {count} times");
    }
    // 2 Highs and 3 samples per step:
    assert_eq!(entries.len(), 8);

    let script_index = read(home.join("logs/script_index_r1.txt"));
    assert_eq!(script_index.lines().count(), 8);
    Ok(())
}

#[test]
fn test_local_high_waits_for_every_job() -> Result<()> {
    let output = tempdir()?;
    let local = executor("Local");
    run(output.path(), &[("local.yaml", &local), ("steps.yaml", TWO_STEPS)])?;
    let home = output.path().join("home").canonicalize()?;

    let high = read(home.join("scripts/01.merge_merge1.sh"));
    assert!(high.contains("wait_for_jobs merge_merge1_s1_r1 merge_merge1_s2_r1 merge_merge1_s3_r1\n"));
    assert!(!high.contains("qsub"));

    let trim_high = read(home.join("scripts/02.generic_trim1.sh"));
    assert!(trim_high.contains(
        "if wait_for_jobs merge_merge1_s1_r1 merge_merge1_s2_r1 merge_merge1_s3_r1; then\n"
    ));
    assert!(trim_high.contains("skip_jobs generic_trim1_s1_r1\n"));

    // a skipped High takes the jobs it would have submitted along with it:
    let entry = read(home.join("scripts/00.workflow.commands.sh"));
    assert!(entry.contains(
        "skip_jobs generic_trim1_r1 generic_trim1_s1_r1 generic_trim1_s2_r1 generic_trim1_s3_r1\n"
    ));
    assert!(entry.trim_end().ends_with("wait"));

    let script_index = read(home.join("logs/script_index_r1.txt"));
    assert!(script_index.contains("merge_merge1_r1\thigh\t"));
    assert!(script_index.contains("generic_trim1_s2_r1\tlow\t"));
    Ok(())
}

const THREE_LOCAL_STEPS: &str = r#"
Global_params:
  Executor: Local
  Default_wait: 1

Step_params:
  merge1:
    module: merge
    script_path: "false"
  up:
    module: generic
    base: merge1
    script_path: "true"
  fin:
    module: generic
    base: up
    script_path: "true"
"#;

/// Run a generated script with bash, giving up after a minute.
fn run_script(script: &Path) -> Result<std::process::ExitStatus> {
    Ok(std::process::Command::new("timeout")
        .arg("60")
        .arg("bash")
        .arg(script)
        .status()?)
}

fn assert_skipped_downstream(entries: &[(String, JobState)], steps: &[&str]) {
    for step in steps {
        let prefix = format!("generic_{step}_");
        let lines: Vec<_> = entries.iter().filter(|(id, _)| id.starts_with(&prefix)).collect();
        // the High and one job per sample:
        assert_eq!(lines.len(), 4, "jobs of {step}: {lines:?}");
        for (id, state) in lines {
            assert!(state.is_final(), "{id} is still {state}");
            assert_eq!(*state, JobState::FailedDependency, "{id}");
        }
    }
}

#[test]
fn test_local_failure_reaches_every_downstream_job() -> Result<()> {
    let output = tempdir()?;
    let summary = run(output.path(), &[("params.yaml", THREE_LOCAL_STEPS)])?;

    let status = run_script(&summary.entry_script)?;
    assert_ne!(status.code(), Some(124), "entry script never finished");

    let home = output.path().join("home").canonicalize()?;
    let index = RunIndex::new(home.join("logs/run_index_r1.txt"));
    let entries = index.entries()?;
    assert!(matches!(
        index.state("merge_merge1_r1")?,
        Some(JobState::Failed(_))
    ));
    assert_skipped_downstream(&entries, &["up", "fin"]);
    Ok(())
}

#[test]
fn test_local_kill_all_lets_the_run_finish() -> Result<()> {
    let output = tempdir()?;
    let params = THREE_LOCAL_STEPS.replace("\"false\"", "sleep 5; true");
    let summary = run(output.path(), &[("params.yaml", &params)])?;
    let home = output.path().join("home").canonicalize()?;
    let index = RunIndex::new(home.join("logs/run_index_r1.txt"));

    let mut entry = std::process::Command::new("timeout")
        .arg("60")
        .arg("bash")
        .arg(&summary.entry_script)
        .spawn()?;
    let started = std::time::Instant::now();
    while index.state("merge_merge1_s1_r1")? != Some(JobState::Running) {
        assert!(
            started.elapsed() < std::time::Duration::from_secs(30),
            "merge1 never started"
        );
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    assert!(run_script(&summary.kill_all_script)?.success());
    let status = entry.wait()?;
    assert_ne!(status.code(), Some(124), "entry script never finished");

    assert!(matches!(
        index.state("merge_merge1_r1")?,
        Some(JobState::Failed(_))
    ));
    assert_skipped_downstream(&index.entries()?, &["up", "fin"]);
    Ok(())
}

#[test]
fn test_wrapping_up_is_waited_for_downstream() -> Result<()> {
    let output = tempdir()?;
    let params = r#"
Step_params:
  merge1:
    module: merge
  qc:
    module: generic
    base: merge1
    script_path: fastqc
    wrapping_up: "multiqc {dir}"
  after:
    module: generic
    base: qc
    script_path: after.sh
"#;
    let sge = executor("SGE");
    run(output.path(), &[("sge.yaml", &sge), ("params.yaml", params)])?;
    let home = output.path().join("home").canonicalize()?;

    let after_low = read(home.join("scripts/03.generic_after/generic_after_s2_r1.sh"));
    let hold = after_low
        .lines()
        .find(|line| line.starts_with("#$ -hold_jid "))
        .unwrap_or_else(|| panic!("no hold line in:\n{after_low}"));
    let held: Vec<&str> = hold["#$ -hold_jid ".len()..].split(',').collect();
    assert!(held.contains(&"generic_qc_wrapping_up_r1"), "{hold}");
    assert!(held.contains(&"generic_qc_s2_r1"), "{hold}");

    // the wrapping-up job itself waits for every unit of its own step:
    let wrap = read(home.join("scripts/02.generic_qc/generic_qc_wrapping_up_r1.sh"));
    assert!(wrap.contains("generic_qc_s1_r1,generic_qc_s2_r1,generic_qc_s3_r1"));
    Ok(())
}

#[test]
fn test_cycle_writes_nothing() -> Result<()> {
    let output = tempdir()?;
    let params = r#"
Step_params:
  merge1:
    module: merge
  a:
    module: generic
    base: [merge1, b]
    script_path: a.sh
  b:
    module: generic
    base: a
    script_path: b.sh
"#;
    let err = run(output.path(), &[("params.yaml", params)]).unwrap_err();
    let cycle = match err.downcast_ref::<traverse::Error>() {
        Some(traverse::Error::Cycle(cycle)) => cycle,
        _ => panic!("expected a cycle error, got {err:?}"),
    };
    assert_eq!(cycle.offenders, vec!["a".to_owned(), "b".to_owned()]);

    let home = output.path().join("home");
    assert!(!home.join("scripts").exists());
    assert!(!home.join("logs").exists());
    Ok(())
}

struct Explode;

impl StepBuilder for Explode {
    fn build(&self, ctx: &StepContext) -> Result<BuildOutput, StepBuildError> {
        Err(ctx.error("boom"))
    }
}

#[test]
fn test_failed_step_leaves_snapshot() -> Result<()> {
    let output = tempdir()?;
    let params = r#"
Step_params:
  merge1:
    module: merge
  bad:
    module: explode
    base: merge1
"#;
    let mut registry = StepRegistry::with_builtins();
    registry.register("explode", |_| Box::new(Explode));

    let err = run_with(output.path(), &[("params.yaml", params)], registry).unwrap_err();
    let build_err = err
        .downcast_ref::<StepBuildError>()
        .unwrap_or_else(|| panic!("expected a build error, got {err:?}"));
    assert_eq!(build_err.step, "bad");
    assert_eq!(build_err.message, "boom");

    let home = output.path().join("home").canonicalize()?;
    // the half-written High script is removed:
    assert!(!home.join("scripts/02.explode_bad.sh").exists());
    assert!(home.join("scripts/01.merge_merge1.sh").exists());

    let snapshot: serde_json::Value =
        serde_json::from_str(&read(home.join("objects/workflow_snapshot_r1.json")))?;
    assert_eq!(snapshot["complete"], false);
    assert_eq!(snapshot["failed_step"], "bad");
    assert_eq!(snapshot["steps"].as_array().map(Vec::len), Some(1));
    assert_eq!(snapshot["steps"][0]["name"], "merge1");
    Ok(())
}

#[test]
fn test_slow_release_unsupported_locally() -> Result<()> {
    let output = tempdir()?;
    let local = format!("{}  slow_release: 30\n", executor("Local"));
    let err = run(output.path(), &[("local.yaml", &local), ("steps.yaml", TWO_STEPS)]).unwrap_err();
    let unsupported = err
        .downcast_ref::<UnsupportedFeatureError>()
        .unwrap_or_else(|| panic!("expected an unsupported feature error, got {err:?}"));
    assert_eq!(unsupported.feature, "Slow release");
    Ok(())
}

#[test]
fn test_slow_release_on_sge() -> Result<()> {
    let output = tempdir()?;
    let sge = format!("{}  slow_release: 30\n", executor("SGE"));
    run(output.path(), &[("sge.yaml", &sge), ("steps.yaml", TWO_STEPS)])?;
    let home = output.path().join("home").canonicalize()?;

    let high = read(home.join("scripts/01.merge_merge1.sh"));
    assert!(high.contains("qsub -h "));
    assert!(high.contains("sleep 30\nqrls merge_merge1_s2_r1\n"));
    Ok(())
}

#[test]
fn test_pbs_stream_dirs_per_step() -> Result<()> {
    let output = tempdir()?;
    let pbs = executor("PBS");
    run(output.path(), &[("pbs.yaml", &pbs), ("steps.yaml", TWO_STEPS)])?;
    let home = output.path().join("home").canonicalize()?;

    assert!(home.join("stderr/r1/01.merge_merge1").is_dir());
    assert!(home.join("stdout/r1/02.generic_trim1").is_dir());
    let low = read(home.join("scripts/02.generic_trim1/generic_trim1_s1_r1.sh"));
    assert!(low.contains("#PBS -N generic_trim1_s1_r1\n"));
    Ok(())
}

#[test]
fn test_slurm_partition() -> Result<()> {
    let output = tempdir()?;
    let slurm = format!("{}  Qsub_q: short\n", executor("SLURM"));
    run(output.path(), &[("slurm.yaml", &slurm), ("steps.yaml", TWO_STEPS)])?;
    let home = output.path().join("home").canonicalize()?;

    let high = read(home.join("scripts/01.merge_merge1.sh"));
    assert!(high.contains("#SBATCH --partition=short\n"));
    assert!(high.contains("sbatch "));

    let kill_all = read(home.join("scripts/99.kill_all.sh"));
    assert!(kill_all.contains("scontrol hold"));
    assert!(kill_all.contains("01.merge_merge1.kill.sh"));
    Ok(())
}

#[test]
fn test_dry_run_writes_nothing() -> Result<()> {
    let output = tempdir()?;
    setup(output.path(), &[("steps.yaml", TWO_STEPS)])?;
    let mut args = args(output.path(), &["steps.yaml"]);
    args.dry_run = true;
    let settings: Settings = args.try_into()?;

    let summary = App::new(settings).run()?;
    assert!(summary.is_none());
    assert!(!output.path().join("home").exists());
    Ok(())
}

#[test]
fn test_missing_sample_file() {
    let output = tempdir().unwrap();
    let args = args(output.path(), &["steps.yaml"]);
    let err = Settings::try_from(args).unwrap_err();
    assert!(err.to_string().contains("does not exist"));
}
