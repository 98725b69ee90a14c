use std::collections::BTreeMap;

use serde::Serialize;

use syntax::ast::SampleSheet;

/// Work-unit name used for project-scoped scripts and collision reports.
pub const PROJECT_UNIT: &str = "project";

/// Files known at some point in the workflow, by slot name:
/// one map for the project and one per sample.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DataContext {
    pub project: BTreeMap<String, String>,
    pub samples: BTreeMap<String, BTreeMap<String, String>>,
}

/// A slot defined by more than one base with different values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    /// Sample name, or [`PROJECT_UNIT`].
    pub unit: String,
    pub slot: String,
    /// Value that was overwritten.
    pub previous: String,
    /// Value that won.
    pub kept: String,
}

impl DataContext {
    /// Build the initial context from a sample sheet.
    /// Several paths for the same sample and type are joined with ','.
    pub fn from_sheet(sheet: &SampleSheet) -> Self {
        let mut ctx = Self::default();
        for row in &sheet.samples {
            let slots = ctx.samples.entry(row.sample.to_owned()).or_default();
            append_path(slots, row.kind, row.path);
        }
        for row in &sheet.project {
            append_path(&mut ctx.project, row.kind, row.path);
        }
        ctx
    }

    pub fn is_empty(&self) -> bool {
        self.project.is_empty() && self.samples.is_empty()
    }

    /// Sample names in sorted order.
    pub fn sample_names(&self) -> impl Iterator<Item = &str> {
        self.samples.keys().map(String::as_str)
    }

    pub fn sample_slot(&self, sample: &str, slot: &str) -> Option<&str> {
        self.samples.get(sample)?.get(slot).map(String::as_str)
    }

    pub fn project_slot(&self, slot: &str) -> Option<&str> {
        self.project.get(slot).map(String::as_str)
    }

    pub fn set_sample_slot(&mut self, sample: &str, slot: &str, value: impl Into<String>) {
        self.samples
            .entry(sample.to_owned())
            .or_default()
            .insert(slot.to_owned(), value.into());
    }

    pub fn set_project_slot(&mut self, slot: &str, value: impl Into<String>) {
        self.project.insert(slot.to_owned(), value.into());
    }

    /// Merge `other` into this context. On a name collision the value from `other` wins;
    /// every collision whose values actually differ is returned so the caller can warn.
    pub fn merge_from(&mut self, other: &DataContext) -> Vec<Collision> {
        let mut collisions = Vec::with_capacity(0);
        merge_slots(&mut self.project, &other.project, PROJECT_UNIT, &mut collisions);
        for (sample, slots) in &other.samples {
            let ours = self.samples.entry(sample.clone()).or_default();
            merge_slots(ours, slots, sample, &mut collisions);
        }
        collisions
    }
}

fn append_path(slots: &mut BTreeMap<String, String>, kind: &str, path: &str) {
    slots
        .entry(kind.to_owned())
        .and_modify(|existing| {
            existing.push(',');
            existing.push_str(path);
        })
        .or_insert_with(|| path.to_owned());
}

fn merge_slots(
    ours: &mut BTreeMap<String, String>,
    theirs: &BTreeMap<String, String>,
    unit: &str,
    collisions: &mut Vec<Collision>,
) {
    for (slot, value) in theirs {
        if let Some(previous) = ours.insert(slot.clone(), value.clone()) {
            if &previous != value {
                collisions.push(Collision {
                    unit: unit.to_owned(),
                    slot: slot.clone(),
                    previous,
                    kept: value.clone(),
                });
            }
        }
    }
}
