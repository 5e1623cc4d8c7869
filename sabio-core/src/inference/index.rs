//! Rule lookup by the variables each rule reads and concludes.

use std::collections::{BTreeSet, HashMap};

use crate::kb::KnowledgeBase;

/// Positions into [`KnowledgeBase::rules`], grouped by variable.
///
/// Every list keeps declaration order, which is the order both engines try
/// rules in.
#[derive(Debug, Clone, Default)]
pub struct RuleIndex {
    concluding: HashMap<String, Vec<usize>>,
    consulting: HashMap<String, Vec<usize>>,
    rule_count: usize,
}

impl RuleIndex {
    /// Build the index for one snapshot.
    #[must_use]
    pub fn new(kb: &KnowledgeBase) -> Self {
        let mut index = Self {
            rule_count: kb.rules().len(),
            ..Self::default()
        };
        for (position, rule) in kb.rules().iter().enumerate() {
            for conclusion in &rule.consequent {
                push_unique(&mut index.concluding, &conclusion.variable, position);
            }
            for condition in &rule.antecedent {
                push_unique(&mut index.consulting, &condition.variable, position);
            }
        }
        index
    }

    /// Rules with a conclusion about `variable`.
    #[must_use]
    pub fn concluding(&self, variable: &str) -> &[usize] {
        self.concluding.get(variable).map_or(&[], Vec::as_slice)
    }

    /// Rules with a condition on `variable`.
    #[must_use]
    pub fn consulting(&self, variable: &str) -> &[usize] {
        self.consulting.get(variable).map_or(&[], Vec::as_slice)
    }

    /// Whether some rule can derive `variable`.
    #[must_use]
    pub fn is_derivable(&self, variable: &str) -> bool {
        !self.concluding(variable).is_empty()
    }

    /// Rules reading any of `variables`, deduplicated, in declaration order.
    #[must_use]
    pub fn triggered_by<'a, I>(&self, variables: I) -> Vec<usize>
    where
        I: IntoIterator<Item = &'a str>,
    {
        variables
            .into_iter()
            .flat_map(|variable| self.consulting(variable).iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Every rule position in declaration order.
    pub fn all(&self) -> impl Iterator<Item = usize> {
        0..self.rule_count
    }
}

fn push_unique(map: &mut HashMap<String, Vec<usize>>, variable: &str, position: usize) {
    let positions = map.entry(variable.to_string()).or_default();
    if positions.last() != Some(&position) {
        positions.push(position);
    }
}
