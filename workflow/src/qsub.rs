use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

/// Scheduler submission parameters for a single step:
/// global defaults with the step's own overrides applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QsubParams {
    /// Queue (SGE, QSUB, PBS) or partition (SLURM).
    pub queue: Option<String>,
    /// Node constraint.
    pub nodes: Vec<String>,
    /// Extra backend options, e.g. `-pe` => `shared 20`. An empty value is a bare flag.
    pub opts: BTreeMap<String, String>,
}

impl QsubParams {
    /// Apply `overrides` on top of these params.
    /// Queue and nodes are replaced when given; options merge key by key.
    pub fn with_overrides(&self, overrides: &QsubOverrides) -> Result<Self, String> {
        let mut merged = self.clone();
        if let Some(queue) = &overrides.queue {
            merged.queue = Some(queue.clone());
        }
        if let Some(nodes) = &overrides.node {
            merged.nodes = nodes.to_vec();
        }
        if let Some(opts) = &overrides.opts {
            merged.opts.extend(opts.to_map()?);
        }
        for (k, v) in &overrides.extra {
            merged.opts.insert(k.clone(), scalar_to_string(k, v)?);
        }
        Ok(merged)
    }
}

/// Step-level overrides, as written under a step's `qsub_params`.
/// Unrecognized keys (e.g. `-pe: shared 20`) are treated as options.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QsubOverrides {
    #[serde(default)]
    pub queue: Option<String>,
    #[serde(default)]
    pub node: Option<OneOrMany>,
    #[serde(default)]
    pub opts: Option<OptsSpec>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A single string, or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s.clone()],
            Self::Many(v) => v.clone(),
        }
    }
}

/// Backend options, either as a map or as a single command-line string (`-V -pe shared 4`).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OptsSpec {
    Line(String),
    Map(BTreeMap<String, Value>),
}

impl OptsSpec {
    pub fn to_map(&self) -> Result<BTreeMap<String, String>, String> {
        match self {
            Self::Map(map) => map
                .iter()
                .map(|(k, v)| Ok((k.clone(), scalar_to_string(k, v)?)))
                .collect(),
            Self::Line(line) => parse_opts_line(line),
        }
    }
}

/// Split `-V -cwd -pe shared 4` into `{-V: "", -cwd: "", -pe: "shared 4"}`.
fn parse_opts_line(line: &str) -> Result<BTreeMap<String, String>, String> {
    let mut opts = BTreeMap::new();
    let mut current: Option<(String, Vec<&str>)> = None;
    for token in line.split_whitespace() {
        if token.starts_with('-') {
            if let Some((k, vals)) = current.take() {
                opts.insert(k, vals.join(" "));
            }
            current = Some((token.to_owned(), Vec::with_capacity(2)));
        } else if let Some((_, vals)) = current.as_mut() {
            vals.push(token);
        } else {
            return Err(format!("option value '{token}' has no preceding '-flag'"));
        }
    }
    if let Some((k, vals)) = current {
        opts.insert(k, vals.join(" "));
    }
    Ok(opts)
}

fn scalar_to_string(key: &str, value: &Value) -> Result<String, String> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(format!("option '{key}' must be a scalar value")),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_opts_line() {
        let opts = parse_opts_line("-V -cwd -pe shared 4").unwrap();
        assert_eq!(opts["-V"], "");
        assert_eq!(opts["-pe"], "shared 4");
        assert!(parse_opts_line("stray -V").is_err());
    }

    #[test]
    fn test_overrides_merge_keywise() {
        let mut global = QsubParams {
            queue: Some("all.q".into()),
            nodes: vec!["node1".into()],
            opts: BTreeMap::new(),
        };
        global.opts.insert("-V".into(), String::new());
        global.opts.insert("-pe".into(), "shared 4".into());

        let overrides: QsubOverrides =
            serde_yaml::from_str("queue: big.q\n-pe: shared 20\n-l: h_vmem=8G\n").unwrap();
        let merged = global.with_overrides(&overrides).unwrap();

        assert_eq!(merged.queue.as_deref(), Some("big.q"));
        // nodes not overridden:
        assert_eq!(merged.nodes, vec!["node1"]);
        // step wins, global keys survive:
        assert_eq!(merged.opts["-pe"], "shared 20");
        assert_eq!(merged.opts["-V"], "");
        assert_eq!(merged.opts["-l"], "h_vmem=8G");
    }

    #[test]
    fn test_node_override_replaces_list() {
        let global = QsubParams {
            nodes: vec!["node1".into(), "node2".into()],
            ..Default::default()
        };
        let overrides: QsubOverrides = serde_yaml::from_str("node: node3\n").unwrap();
        let merged = global.with_overrides(&overrides).unwrap();
        assert_eq!(merged.nodes, vec!["node3"]);
    }
}
