use std::collections::BTreeMap;
use std::path::Path;

use workflow::{ConfigError, Scope, StepDef};

use super::{BuildOutput, StepBuildError, StepBuilder, StepContext, WorkUnit};
use crate::exec::common::{quote_path, shell_quote};

const DEFAULT_COMMAND: &str = "cat";

/// Imports the files named in the sample sheet into the step's result dir:
/// every file of a slot is concatenated into `<unit>/<unit>.<slot><ext>`,
/// and the new paths replace the originals downstream.
///
/// `script_path` replaces `cat` as the concatenating command (e.g. `zcat`).
#[derive(Debug, Default)]
pub struct MergeStep;

impl StepBuilder for MergeStep {
    fn validate(&self, step: &StepDef) -> Result<(), ConfigError> {
        match step.param("script_path") {
            Some(value) if !value.is_string() => Err(ConfigError::step(
                &step.name,
                "'script_path' must be a string",
            )),
            _ => Ok(()),
        }
    }

    /// Project files are merged once, up front, when the step runs per sample.
    fn preliminary(&self, ctx: &StepContext) -> Result<Option<BuildOutput>, StepBuildError> {
        if ctx.step.scope == Scope::Project || ctx.input.project.is_empty() {
            return Ok(None);
        }
        merge_slots(ctx, WorkUnit::Project, &ctx.input.project).map(Some)
    }

    fn build(&self, ctx: &StepContext) -> Result<BuildOutput, StepBuildError> {
        match ctx.unit {
            WorkUnit::Sample(sample) => {
                let slots = ctx
                    .input
                    .samples
                    .get(sample)
                    .ok_or_else(|| ctx.error("sample has no files"))?;
                merge_slots(ctx, ctx.unit, slots)
            }
            WorkUnit::Project => {
                let mut output = merge_slots(ctx, WorkUnit::Project, &ctx.input.project)?;
                for (sample, slots) in &ctx.input.samples {
                    let sample_output = merge_slots(ctx, WorkUnit::Sample(sample), slots)?;
                    output.script.push_str(&sample_output.script);
                    output.outputs.merge_from(&sample_output.outputs);
                }
                Ok(output)
            }
        }
    }
}

fn merge_slots(
    ctx: &StepContext,
    unit: WorkUnit,
    slots: &BTreeMap<String, String>,
) -> Result<BuildOutput, StepBuildError> {
    let command = ctx.step.str_param("script_path").unwrap_or(DEFAULT_COMMAND);
    let dir = ctx.step_dir.join(unit.name());

    let mut output = BuildOutput::default();
    if slots.is_empty() {
        return Ok(output);
    }
    output.script.push_str(&format!("mkdir -p {}\n", quote_path(&dir)));
    for (slot, paths) in slots {
        let files: Vec<&str> = paths.split(',').filter(|p| !p.is_empty()).collect();
        let first = files
            .first()
            .ok_or_else(|| ctx.error(format!("slot \"{slot}\" has no files")))?;
        let target = dir.join(format!("{}.{slot}{}", unit.name(), extension(first)));

        output.script.push_str(command);
        for file in &files {
            output.script.push(' ');
            output.script.push_str(&shell_quote(file));
        }
        output.script.push_str(" > ");
        output.script.push_str(&quote_path(&target));
        output.script.push('\n');

        output.declare(unit, slot, target.to_string_lossy());
    }
    Ok(output)
}

/// Everything from the first '.' of the file name, e.g. `.fastq.gz`.
fn extension(path: &str) -> &str {
    let name = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path);
    match name.find('.') {
        Some(0) | None => "",
        Some(i) => &name[i..],
    }
}
