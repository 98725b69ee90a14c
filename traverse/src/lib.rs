//!
//! Resolves the dependency graph of a workflow's steps.
//!
//! Resolution happens in 2 stages:
//! 1. Saturate each step's declared bases into its full transitive closure,
//!    then report every step that ended up in its own closure as a cycle.
//! 2. Order the steps with Kahn's algorithm, using the closures as the edge relation.
//!    Among steps that are ready at the same time, those with fewer dependencies
//!    come first, then names are compared lexicographically.
//!
//! Everything is keyed by step name in ordered collections, so resolving the same
//! map twice gives identical results no matter what order the steps were supplied in.

/// transitive closure by saturation
mod closure;
use closure::saturate;

/// topological order over the closures
mod order;
use order::kahn_order;

mod errors;
pub use errors::{CycleError, Error};

mod resolution;
pub use resolution::Resolution;

use std::collections::{BTreeMap, BTreeSet};

/// Map of step name to the names of its directly declared bases.
pub type BaseMap = BTreeMap<String, BTreeSet<String>>;

/// Computes closures and an execution order for a set of steps.
#[derive(Debug, Default)]
pub struct DependencyResolver {
    bases: BaseMap,
}

impl DependencyResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step with its directly declared bases.
    pub fn add_step<S, I, B>(&mut self, name: S, bases: I) -> Result<(), Error>
    where
        S: Into<String>,
        I: IntoIterator<Item = B>,
        B: Into<String>,
    {
        let name = name.into();
        if self.bases.contains_key(&name) {
            return Err(Error::DuplicateStep(name));
        }
        let bases = bases.into_iter().map(Into::into).collect();
        self.bases.insert(name, bases);
        Ok(())
    }

    /// Number of steps added so far.
    pub fn len(&self) -> usize {
        self.bases.len()
    }

    /// true if no steps were added.
    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    /// Compute closures and order; fails on unknown bases or cycles.
    pub fn resolve(&self) -> Result<Resolution, Error> {
        self.check_bases_exist()?;

        let closures = saturate(&self.bases);

        let offenders: Vec<String> = closures
            .iter()
            .filter(|(name, closure)| closure.contains(*name))
            .map(|(name, _)| name.clone())
            .collect();
        if !offenders.is_empty() {
            log::debug!("cycle detected among {} steps", offenders.len());
            return Err(CycleError { offenders }.into());
        }

        let order = kahn_order(&closures);
        debug_assert_eq!(order.len(), closures.len());
        Ok(Resolution::new(closures, order))
    }

    fn check_bases_exist(&self) -> Result<(), Error> {
        for (name, bases) in &self.bases {
            for base in bases {
                if !self.bases.contains_key(base) {
                    return Err(Error::UnknownBase {
                        step: name.clone(),
                        base: base.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Convenience wrapper: resolve a map of `name -> bases` in one call.
pub fn resolve<'a, I>(steps: I) -> Result<Resolution, Error>
where
    I: IntoIterator<Item = (&'a str, &'a [String])>,
{
    let mut resolver = DependencyResolver::new();
    for (name, bases) in steps {
        resolver.add_step(name, bases.iter().map(String::as_str))?;
    }
    resolver.resolve()
}
