use std::collections::{BTreeMap, BTreeSet};

/// Topologically order steps with Kahn's algorithm, using `closures` as the edge set
/// (every `dep` in `closures[name]` is an edge `dep -> name`).
///
/// Steps become ready once everything in their closure has been ordered.
/// Ready steps are mutually independent; they are taken by ascending closure size,
/// then by name.
///
/// `closures` must be acyclic.
pub fn kahn_order(closures: &BTreeMap<String, BTreeSet<String>>) -> Vec<String> {
    let mut remaining: BTreeMap<&str, usize> = closures
        .iter()
        .map(|(name, closure)| (name.as_str(), closure.len()))
        .collect();

    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (name, closure) in closures {
        for dep in closure {
            dependents.entry(dep.as_str()).or_default().push(name.as_str());
        }
    }

    let mut ready: BTreeSet<(usize, &str)> = remaining
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(name, _)| (closures[*name].len(), *name))
        .collect();

    let mut order = Vec::with_capacity(closures.len());
    while let Some(next) = ready.pop_first() {
        let (_, name) = next;
        order.push(name.to_owned());
        if let Some(deps) = dependents.get(name) {
            for dependent in deps {
                if let Some(count) = remaining.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert((closures[*dependent].len(), *dependent));
                    }
                }
            }
        }
    }
    order
}
