use std::collections::{BTreeMap, BTreeSet};

/// Output of [`crate::DependencyResolver::resolve`]: immutable closures plus an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    closures: BTreeMap<String, BTreeSet<String>>,
    order: Vec<String>,
    ranks: BTreeMap<String, usize>,
}

impl Resolution {
    pub(crate) fn new(closures: BTreeMap<String, BTreeSet<String>>, order: Vec<String>) -> Self {
        let ranks = order
            .iter()
            .enumerate()
            .map(|(rank, name)| (name.clone(), rank))
            .collect();
        Self {
            closures,
            order,
            ranks,
        }
    }

    /// Full set of upstream steps of `name`.
    pub fn closure(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.closures.get(name)
    }

    /// Step names in execution order.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Position of `name` in the execution order.
    pub fn rank(&self, name: &str) -> Option<usize> {
        self.ranks.get(name).copied()
    }
}
