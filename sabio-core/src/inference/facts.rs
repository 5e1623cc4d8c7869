//! Working memory of one inference run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{InferenceConfig, UserFactPolicy};
use crate::Certainty;

/// Where a fact's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactSource {
    /// Answered or asserted by the caller.
    User,
    /// Concluded by one or more rules.
    Derived,
}

/// Known value of a variable with its accumulated certainty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Variable name.
    pub variable: String,
    /// Current value.
    pub value: String,
    /// Accumulated certainty.
    pub certainty: Certainty,
    /// Origin of the value.
    pub source: FactSource,
    /// Rules that raised the certainty, in order.
    pub derived_by: Vec<String>,
}

/// Effect of recording one rule conclusion.
#[derive(Debug, Clone, PartialEq)]
pub enum Contribution {
    /// Variable had no value; the conclusion created the fact.
    Created,
    /// Same value, certainty went up.
    Raised,
    /// Nothing observable changed.
    Unchanged,
    /// Variable already holds a different value, which is kept.
    Conflict {
        /// Value already held.
        existing: String,
    },
    /// User answer protected by [`UserFactPolicy::Locked`].
    Locked,
}

impl Contribution {
    /// True for `Created` and `Raised`.
    #[must_use]
    pub const fn changed(&self) -> bool {
        matches!(self, Self::Created | Self::Raised)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    fact: Fact,
    asserted: Option<Certainty>,
    // Latest contribution per rule; re-firing replaces instead of stacking.
    contributions: Vec<(String, Certainty)>,
}

impl Entry {
    fn total(&self) -> Certainty {
        Certainty::accumulate_all(
            self.asserted
                .into_iter()
                .chain(self.contributions.iter().map(|(_, cf)| *cf)),
        )
    }
}

/// Mapping from variable name to its fact, ordered by name.
#[derive(Debug, Clone)]
pub struct FactStore {
    entries: BTreeMap<String, Entry>,
    policy: UserFactPolicy,
    epsilon: f64,
}

impl Default for FactStore {
    fn default() -> Self {
        Self::new(&InferenceConfig::default())
    }
}

impl FactStore {
    /// Empty store following `config`'s policy and tolerance.
    #[must_use]
    pub const fn new(config: &InferenceConfig) -> Self {
        Self {
            entries: BTreeMap::new(),
            policy: config.user_fact_policy,
            epsilon: config.convergence_epsilon,
        }
    }

    /// Record a caller-supplied value, replacing whatever was known.
    pub fn assert_user(&mut self, variable: &str, value: &str, certainty: Certainty) {
        self.entries.insert(
            variable.to_string(),
            Entry {
                fact: Fact {
                    variable: variable.to_string(),
                    value: value.to_string(),
                    certainty,
                    source: FactSource::User,
                    derived_by: Vec::new(),
                },
                asserted: Some(certainty),
                contributions: Vec::new(),
            },
        );
    }

    /// Record that `rule` concludes `variable == value` with `contribution`.
    pub fn record(
        &mut self,
        variable: &str,
        value: &str,
        rule: &str,
        contribution: Certainty,
    ) -> Contribution {
        if !contribution.is_positive() {
            return Contribution::Unchanged;
        }

        let Some(entry) = self.entries.get_mut(variable) else {
            self.entries.insert(
                variable.to_string(),
                Entry {
                    fact: Fact {
                        variable: variable.to_string(),
                        value: value.to_string(),
                        certainty: contribution,
                        source: FactSource::Derived,
                        derived_by: vec![rule.to_string()],
                    },
                    asserted: None,
                    contributions: vec![(rule.to_string(), contribution)],
                },
            );
            return Contribution::Created;
        };

        if entry.fact.value != value {
            return Contribution::Conflict {
                existing: entry.fact.value.clone(),
            };
        }
        if entry.asserted.is_some() && self.policy == UserFactPolicy::Locked {
            return Contribution::Locked;
        }

        match entry.contributions.iter_mut().find(|(name, _)| name == rule) {
            Some((_, previous)) => *previous = contribution,
            None => entry.contributions.push((rule.to_string(), contribution)),
        }

        let updated = entry.total();
        if updated.approx_eq(entry.fact.certainty, self.epsilon) {
            return Contribution::Unchanged;
        }
        entry.fact.certainty = updated;
        if !entry.fact.derived_by.iter().any(|name| name == rule) {
            entry.fact.derived_by.push(rule.to_string());
        }
        Contribution::Raised
    }

    /// Fact for `variable`, if known.
    #[must_use]
    pub fn get(&self, variable: &str) -> Option<&Fact> {
        self.entries.get(variable).map(|entry| &entry.fact)
    }

    /// Whether `variable` has a value.
    #[must_use]
    pub fn contains(&self, variable: &str) -> bool {
        self.entries.contains_key(variable)
    }

    /// Facts ordered by variable name.
    pub fn iter(&self) -> impl Iterator<Item = &Fact> {
        self.entries.values().map(|entry| &entry.fact)
    }

    /// Consume the store, keeping facts ordered by variable name.
    #[must_use]
    pub fn into_facts(self) -> Vec<Fact> {
        self.entries.into_values().map(|entry| entry.fact).collect()
    }

    /// Number of known variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn cf(v: f64) -> Certainty {
        Certainty::exact(v)
    }

    #[test]
    fn independent_rules_accumulate() {
        let mut store = FactStore::default();
        assert_eq!(store.record("gripe", "sim", "R1", cf(0.8)), Contribution::Created);
        assert_eq!(store.record("gripe", "sim", "R2", cf(0.5)), Contribution::Raised);
        let fact = store.get("gripe").unwrap();
        assert!((fact.certainty.raw() - 0.9).abs() < 1e-12);
        assert_eq!(fact.derived_by, ["R1", "R2"]);
        assert_eq!(fact.source, FactSource::Derived);
    }

    #[test]
    fn refiring_a_rule_replaces_its_contribution() {
        let mut store = FactStore::default();
        store.record("gripe", "sim", "R1", cf(0.4));
        assert_eq!(store.record("gripe", "sim", "R1", cf(0.4)), Contribution::Unchanged);
        assert_eq!(store.record("gripe", "sim", "R1", cf(0.6)), Contribution::Raised);
        assert!((store.get("gripe").unwrap().certainty.raw() - 0.6).abs() < 1e-12);
        assert_eq!(store.get("gripe").unwrap().derived_by, ["R1"]);
    }

    #[test]
    fn conflicting_value_keeps_the_existing_one() {
        let mut store = FactStore::default();
        store.record("gripe", "sim", "R1", cf(0.8));
        assert_eq!(
            store.record("gripe", "não", "R2", cf(0.9)),
            Contribution::Conflict {
                existing: "sim".to_string()
            }
        );
        assert_eq!(store.get("gripe").unwrap().value, "sim");
    }

    #[test]
    fn user_facts_follow_the_configured_policy() {
        let mut accumulate = FactStore::default();
        accumulate.assert_user("gripe", "sim", cf(0.5));
        assert_eq!(accumulate.record("gripe", "sim", "R1", cf(0.5)), Contribution::Raised);
        assert!((accumulate.get("gripe").unwrap().certainty.raw() - 0.75).abs() < 1e-12);
        assert_eq!(accumulate.get("gripe").unwrap().source, FactSource::User);

        let locked_cfg = InferenceConfig {
            user_fact_policy: UserFactPolicy::Locked,
            ..InferenceConfig::default()
        };
        let mut locked = FactStore::new(&locked_cfg);
        locked.assert_user("gripe", "sim", cf(0.5));
        assert_eq!(locked.record("gripe", "sim", "R1", cf(0.5)), Contribution::Locked);
        assert!((locked.get("gripe").unwrap().certainty.raw() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn zero_contribution_is_ignored() {
        let mut store = FactStore::default();
        assert_eq!(store.record("gripe", "sim", "R1", Certainty::NONE), Contribution::Unchanged);
        assert!(store.is_empty());
    }
}
