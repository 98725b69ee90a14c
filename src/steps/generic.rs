use std::collections::BTreeMap;

use serde_yaml::Value;

use workflow::{ConfigError, StepDef};

use super::template::expand;
use super::{BuildOutput, StepBuildError, StepBuilder, StepContext};
use crate::exec::common::{quote_path, shell_quote};

/// Runs `script_path` once per work unit with templated arguments.
///
/// ```yaml
/// trim1:
///   module: generic
///   base: merge1
///   script_path: trimmomatic PE
///   inputs: [Forward, Reverse]
///   outputs: { Forward: "{sample}.trimmed.fq.gz" }
///   redirects:
///     --in1: "{in:Forward}"
///     --out1: "{out:Forward}"
///     --quiet:
/// ```
///
/// Placeholders: `{sample}` (unit name), `{dir}` (unit result dir), `{run_code}`,
/// `{in:<slot>}` (upstream file) and `{out:<slot>}` (declared output).
/// Optional `preliminary` and `wrapping_up` commands run once on the project unit.
#[derive(Debug, Default)]
pub struct GenericStep;

impl StepBuilder for GenericStep {
    fn validate(&self, step: &StepDef) -> Result<(), ConfigError> {
        let err = |msg: &str| ConfigError::step(&step.name, msg);
        match step.param("script_path") {
            Some(Value::String(s)) if !s.trim().is_empty() => {}
            _ => return Err(err("'script_path' is required and must be a string")),
        }
        inputs(step).map_err(|m| err(&m))?;
        outputs(step).map_err(|m| err(&m))?;
        redirects(step).map_err(|m| err(&m))?;
        for key in ["preliminary", "wrapping_up"] {
            if step.param(key).is_some_and(|v| !v.is_string()) {
                return Err(err(&format!("'{key}' must be a string")));
            }
        }
        Ok(())
    }

    fn preliminary(&self, ctx: &StepContext) -> Result<Option<BuildOutput>, StepBuildError> {
        phase_command(ctx, "preliminary")
    }

    fn build(&self, ctx: &StepContext) -> Result<BuildOutput, StepBuildError> {
        let step = ctx.step;
        let to_err = |m: String| ctx.error(m);

        for slot in inputs(step).map_err(to_err)? {
            ctx.require_slot(&slot)?;
        }

        let dir = ctx.unit_dir();
        let mut output = BuildOutput::default();
        let mut declared = BTreeMap::new();
        for (slot, file) in outputs(step).map_err(to_err)? {
            let file = expand(&file, |key| placeholder(ctx, &declared, key)).map_err(to_err)?;
            let path = dir.join(file).to_string_lossy().into_owned();
            output.declare(ctx.unit, &slot, path.clone());
            declared.insert(slot, path);
        }

        let script_path = step.str_param("script_path").unwrap_or_default();
        output.script.push_str(&format!("mkdir -p {}\n", quote_path(&dir)));
        output.script.push_str(script_path.trim());
        for (flag, value) in redirects(step).map_err(to_err)? {
            output.script.push_str(" \\\n    ");
            output.script.push_str(&flag);
            if let Some(value) = value {
                let value =
                    expand(&value, |key| placeholder(ctx, &declared, key)).map_err(to_err)?;
                output.script.push(' ');
                output.script.push_str(&shell_quote(&value));
            }
        }
        output.script.push('\n');
        Ok(output)
    }

    fn wrapping_up(&self, ctx: &StepContext) -> Result<Option<BuildOutput>, StepBuildError> {
        phase_command(ctx, "wrapping_up")
    }
}

fn phase_command(ctx: &StepContext, key: &str) -> Result<Option<BuildOutput>, StepBuildError> {
    let Some(template) = ctx.step.str_param(key) else {
        return Ok(None);
    };
    let declared = BTreeMap::new();
    let command =
        expand(template, |k| placeholder(ctx, &declared, k)).map_err(|m| ctx.error(m))?;
    Ok(Some(BuildOutput::new(format!("{command}\n"))))
}

fn placeholder(
    ctx: &StepContext,
    declared: &BTreeMap<String, String>,
    key: &str,
) -> Result<String, String> {
    if let Some(slot) = key.strip_prefix("in:") {
        return ctx
            .input_slot(slot)
            .map(str::to_owned)
            .ok_or_else(|| format!("no upstream step produced \"{slot}\""));
    }
    if let Some(slot) = key.strip_prefix("out:") {
        return declared
            .get(slot)
            .cloned()
            .ok_or_else(|| format!("\"{slot}\" is not declared in 'outputs'"));
    }
    match key {
        "sample" => Ok(ctx.unit.name().to_owned()),
        "dir" => Ok(ctx.unit_dir().to_string_lossy().into_owned()),
        "run_code" => Ok(ctx.run_code.to_owned()),
        other => Err(format!("unknown placeholder {{{other}}}")),
    }
}

fn inputs(step: &StepDef) -> Result<Vec<String>, String> {
    match step.param("inputs") {
        None => Ok(Vec::with_capacity(0)),
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        Some(Value::Sequence(seq)) => seq
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| "'inputs' must be a list of slot names".to_owned())
            })
            .collect(),
        Some(_) => Err("'inputs' must be a list of slot names".to_owned()),
    }
}

/// `slot -> file name template`, in declaration order.
fn outputs(step: &StepDef) -> Result<Vec<(String, String)>, String> {
    let msg = "'outputs' must map slot names to file names";
    match step.param("outputs") {
        None => Ok(Vec::with_capacity(0)),
        Some(Value::Mapping(map)) => map
            .iter()
            .map(|(k, v)| match (k.as_str(), v.as_str()) {
                (Some(k), Some(v)) => Ok((k.to_owned(), v.to_owned())),
                _ => Err(msg.to_owned()),
            })
            .collect(),
        Some(_) => Err(msg.to_owned()),
    }
}

/// `flag -> value template`; a null value is a bare flag.
fn redirects(step: &StepDef) -> Result<Vec<(String, Option<String>)>, String> {
    let msg = "'redirects' must map flags to scalar values";
    match step.param("redirects") {
        None => Ok(Vec::with_capacity(0)),
        Some(Value::Mapping(map)) => map
            .iter()
            .map(|(k, v)| {
                let flag = k.as_str().ok_or_else(|| msg.to_owned())?.to_owned();
                let value = match v {
                    Value::Null => None,
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Bool(b) => Some(b.to_string()),
                    _ => return Err(msg.to_owned()),
                };
                Ok((flag, value))
            })
            .collect(),
        Some(_) => Err(msg.to_owned()),
    }
}
