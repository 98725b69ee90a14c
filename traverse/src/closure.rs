use std::collections::{BTreeMap, BTreeSet};

use super::BaseMap;

/// Saturate declared bases into full transitive closures.
///
/// Starts with `closure[name] = bases[name]` and keeps unioning in the closures
/// of everything already in each closure until a full pass changes nothing.
/// Terminates after at most `bases.len() + 1` passes.
/// A step that ends up inside its own closure is part of a cycle;
/// the caller is responsible for checking.
pub fn saturate(bases: &BaseMap) -> BTreeMap<String, BTreeSet<String>> {
    let mut closures: BTreeMap<String, BTreeSet<String>> = bases.clone();
    let mut passes = 0;
    loop {
        passes += 1;
        let mut changed = false;
        let names: Vec<String> = closures.keys().cloned().collect();
        for name in &names {
            let mut additions = BTreeSet::new();
            for dep in &closures[name] {
                if let Some(dep_closure) = closures.get(dep) {
                    for transitive in dep_closure {
                        if !closures[name].contains(transitive) {
                            additions.insert(transitive.clone());
                        }
                    }
                }
            }
            if !additions.is_empty() {
                changed = true;
                if let Some(closure) = closures.get_mut(name) {
                    closure.extend(additions);
                }
            }
        }
        if !changed {
            break;
        }
    }
    log::trace!("closure saturated after {passes} passes");
    closures
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_saturate_diamond() {
        let mut bases = BaseMap::new();
        bases.insert("root".into(), BTreeSet::new());
        bases.insert("left".into(), ["root".to_owned()].into());
        bases.insert("right".into(), ["root".to_owned()].into());
        bases.insert("join".into(), ["left".to_owned(), "right".to_owned()].into());
        let closures = saturate(&bases);
        let join: Vec<&str> = closures["join"].iter().map(String::as_str).collect();
        assert_eq!(join, vec!["left", "right", "root"]);
        assert!(closures["root"].is_empty());
    }

    #[test]
    fn test_saturate_cycle_contains_self() {
        let mut bases = BaseMap::new();
        bases.insert("a".into(), ["b".to_owned()].into());
        bases.insert("b".into(), ["c".to_owned()].into());
        bases.insert("c".into(), ["a".to_owned()].into());
        let closures = saturate(&bases);
        for name in ["a", "b", "c"] {
            assert!(closures[name].contains(name));
        }
    }
}
