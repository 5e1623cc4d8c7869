//! Data-driven chaining to a fixpoint.
//!
//! The first pass tries every rule in declaration order. Later passes only
//! revisit rules that read a variable whose fact was created or raised in the
//! previous pass. A pass that changes nothing ends the run. Each rule's
//! contribution to a fact is kept separately and replaced when the rule fires
//! again, so cycles settle instead of compounding.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use super::condition::{ConditionOutcome, evaluate};
use super::{Contribution, Fact, FactStore, InferenceConfig, RuleIndex};
use crate::Certainty;
use crate::error::{InferenceError, InferenceResult};
use crate::kb::validation::validate_value;
use crate::kb::{KnowledgeBase, Rule};

/// Facts known after forward chaining and the rules that changed them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardOutcome {
    /// Initial and derived facts, ordered by variable name.
    pub facts: Vec<Fact>,
    /// Rules that created or raised a fact, each once, in order of first effect.
    pub rules_used: Vec<String>,
    /// Passes that were allowed to change facts. The run stops once no rule
    /// is triggered by the previous pass's changes.
    pub passes: usize,
}

/// Forward chainer bound to one knowledge-base snapshot.
#[derive(Debug)]
pub struct ForwardChainer<'kb> {
    kb: &'kb KnowledgeBase,
    index: RuleIndex,
    config: InferenceConfig,
}

impl<'kb> ForwardChainer<'kb> {
    /// Prepare a chainer; the rule index is built once here.
    #[must_use]
    pub fn new(kb: &'kb KnowledgeBase, config: InferenceConfig) -> Self {
        Self {
            kb,
            index: RuleIndex::new(kb),
            config,
        }
    }

    /// Derive everything that follows from `initial`, each asserted with
    /// certainty 1.0.
    ///
    /// # Errors
    ///
    /// Fails when an initial fact names an undeclared variable or an invalid
    /// value, on a misconfigured condition, and with
    /// [`InferenceError::NonConvergence`] (carrying the partial result) when
    /// `max_passes` passes have run and a still-triggered rule would change a
    /// fact. If the triggered rules would all leave the facts as they are, the
    /// run has already converged and succeeds at the cap.
    pub fn run<'a, I>(&self, initial: I) -> InferenceResult<ForwardOutcome>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut facts = FactStore::new(&self.config);
        for (name, value) in initial {
            let variable =
                self.kb
                    .variable(name)
                    .ok_or_else(|| InferenceError::UnknownVariable {
                        variable: name.to_string(),
                    })?;
            validate_value(variable, value)?;
            facts.assert_user(name, value, Certainty::CERTAIN);
        }

        let mut rules_used = Vec::new();
        let mut agenda: Vec<usize> = self.index.all().collect();
        let mut passes = 0;

        while !agenda.is_empty() {
            if passes >= self.config.max_passes {
                // Still-triggered rules only count against the cap if one of
                // them would change a fact.
                let mut trial = facts.clone();
                if self.pass(&agenda, &mut trial, &mut rules_used.clone())?.is_empty() {
                    break;
                }
                warn!(kb = %self.kb.name(), passes, "forward chaining hit the pass cap");
                return Err(InferenceError::NonConvergence {
                    passes,
                    partial: Box::new(ForwardOutcome {
                        facts: facts.into_facts(),
                        rules_used,
                        passes,
                    }),
                });
            }
            passes += 1;
            let changed = self.pass(&agenda, &mut facts, &mut rules_used)?;
            debug!(pass = passes, changed = changed.len(), "forward pass finished");
            agenda = self.index.triggered_by(changed);
        }

        info!(
            kb = %self.kb.name(),
            passes,
            rules_used = rules_used.len(),
            "forward chaining reached a fixpoint"
        );
        Ok(ForwardOutcome {
            facts: facts.into_facts(),
            rules_used,
            passes,
        })
    }

    /// Fire every rule on the agenda once, in order, and return the variables
    /// whose facts were created or raised.
    fn pass(
        &self,
        agenda: &[usize],
        facts: &mut FactStore,
        rules_used: &mut Vec<String>,
    ) -> InferenceResult<BTreeSet<&'kb str>> {
        let kb: &'kb KnowledgeBase = self.kb;
        let mut changed = BTreeSet::new();
        for &position in agenda {
            let rule = &kb.rules()[position];
            let Some(antecedent) = antecedent(rule, kb, facts)? else {
                continue;
            };
            for conclusion in &rule.consequent {
                let effect = facts.record(
                    &conclusion.variable,
                    &conclusion.literal,
                    &rule.name,
                    antecedent.scaled(conclusion.certainty),
                );
                match effect {
                    Contribution::Created | Contribution::Raised => {
                        changed.insert(conclusion.variable.as_str());
                        if !rules_used.contains(&rule.name) {
                            rules_used.push(rule.name.clone());
                        }
                    }
                    Contribution::Conflict { existing } => debug!(
                        rule = %rule.name,
                        variable = %conclusion.variable,
                        kept = %existing,
                        rejected = %conclusion.literal,
                        "conflicting conclusion ignored"
                    ),
                    Contribution::Locked | Contribution::Unchanged => {}
                }
            }
        }
        Ok(changed)
    }
}

/// Certainty of a rule's antecedent when every condition holds with positive
/// certainty; `None` otherwise. An empty antecedent holds with certainty 1.0.
fn antecedent(
    rule: &Rule,
    kb: &KnowledgeBase,
    facts: &FactStore,
) -> InferenceResult<Option<Certainty>> {
    let mut certainty = Certainty::CERTAIN;
    for condition in &rule.antecedent {
        match evaluate(condition, kb, facts)? {
            ConditionOutcome::Satisfied(cf) => certainty = certainty.and(cf),
            ConditionOutcome::Refuted | ConditionOutcome::Unknown => return Ok(None),
        }
    }
    Ok(certainty.is_positive().then_some(certainty))
}
