//! Goal-driven chaining that stops to ask for missing facts.
//!
//! A proof attempt runs from scratch over the answers collected so far. When
//! it needs a variable that no rule concludes and no answer covers, the
//! attempt is abandoned and the question is returned; the caller records the
//! answer and runs the attempt again. The proof is deterministic for a given
//! snapshot and answer list, so every replay reaches the same point and then
//! goes one step further.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, trace};

use super::condition::{ConditionOutcome, evaluate};
use super::{Contribution, Fact, FactStore, InferenceConfig, RuleIndex};
use crate::Certainty;
use crate::error::{InferenceError, InferenceResult};
use crate::kb::{Condition, KnowledgeBase, Rule, VariableKind};

/// Why a question is being asked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhyContext {
    /// Goal of the consultation.
    pub goal: String,
    /// Rule whose condition needs the answer; absent when the goal itself is asked.
    pub rule: Option<String>,
    /// Condition under evaluation, rendered as text.
    pub condition: Option<String>,
    /// Human-readable summary.
    pub explanation: String,
}

/// Request for the value of a variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Variable to answer.
    pub variable: String,
    /// Prompt shown to the user.
    pub prompt_text: String,
    /// Optional extra guidance.
    pub help_text: Option<String>,
    /// Categorical domain or numeric range the answer must fit.
    pub expected: VariableKind,
    /// Rule and condition that led here.
    pub why: WhyContext,
}

/// Final answer of a consultation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Goal variable.
    pub goal: String,
    /// Derived or answered value; `None` when nothing could be established.
    pub value: Option<String>,
    /// Certainty of `value`, 0.0 when unresolved.
    pub certainty: Certainty,
    /// Rules that created or raised a fact, each once, in order of first effect.
    pub rules_used: Vec<String>,
    /// Every fact known at the end, ordered by variable name.
    pub facts: Vec<Fact>,
}

/// Next step of a consultation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BackwardStep {
    /// The proof is suspended on this question.
    Question(Question),
    /// The proof finished.
    Result(Verdict),
}

impl BackwardStep {
    /// Variable the proof is waiting for, if suspended.
    #[must_use]
    pub fn pending_variable(&self) -> Option<&str> {
        match self {
            Self::Question(question) => Some(&question.variable),
            Self::Result(_) => None,
        }
    }
}

/// Backward chainer bound to one knowledge-base snapshot.
#[derive(Debug)]
pub struct BackwardChainer<'kb> {
    kb: &'kb KnowledgeBase,
    index: RuleIndex,
    config: InferenceConfig,
}

impl<'kb> BackwardChainer<'kb> {
    /// Prepare a chainer; the rule index is built once here.
    #[must_use]
    pub fn new(kb: &'kb KnowledgeBase, config: InferenceConfig) -> Self {
        Self {
            kb,
            index: RuleIndex::new(kb),
            config,
        }
    }

    /// Try to prove `goal` using `answers` as the only external facts.
    ///
    /// # Errors
    ///
    /// Fails on an undeclared goal or condition variable and on misconfigured
    /// conditions met along the way.
    pub fn prove<'a, I>(&self, goal: &str, answers: I) -> InferenceResult<BackwardStep>
    where
        I: IntoIterator<Item = (&'a str, &'a str, Certainty)>,
    {
        if self.kb.variable(goal).is_none() {
            return Err(InferenceError::UnknownVariable {
                variable: goal.to_string(),
            });
        }

        let mut facts = FactStore::new(&self.config);
        for (variable, value, certainty) in answers {
            facts.assert_user(variable, value, certainty);
        }

        let mut proof = Proof {
            kb: self.kb,
            index: &self.index,
            goal,
            facts,
            in_progress: HashSet::new(),
            rules_used: Vec::new(),
        };

        match proof.resolve(goal, None) {
            Ok(_) => {}
            Err(Interrupt::Ask(question)) => {
                debug!(goal, variable = %question.variable, "proof suspended on question");
                return Ok(BackwardStep::Question(*question));
            }
            Err(Interrupt::Fault(err)) => return Err(err),
        }

        let (value, certainty) = proof
            .facts
            .get(goal)
            .map_or((None, Certainty::NONE), |fact| {
                (Some(fact.value.clone()), fact.certainty)
            });
        debug!(goal, resolved = value.is_some(), "proof finished");
        Ok(BackwardStep::Result(Verdict {
            goal: goal.to_string(),
            value,
            certainty,
            rules_used: proof.rules_used,
            facts: proof.facts.into_facts(),
        }))
    }
}

enum Interrupt {
    Ask(Box<Question>),
    Fault(InferenceError),
}

impl From<InferenceError> for Interrupt {
    fn from(err: InferenceError) -> Self {
        Self::Fault(err)
    }
}

struct Proof<'p> {
    kb: &'p KnowledgeBase,
    index: &'p RuleIndex,
    goal: &'p str,
    facts: FactStore,
    in_progress: HashSet<String>,
    rules_used: Vec<String>,
}

impl Proof<'_> {
    /// Make `variable` known if possible; `Ok(false)` when it stays unknown.
    fn resolve(
        &mut self,
        variable: &str,
        asked_by: Option<(&Rule, &Condition)>,
    ) -> Result<bool, Interrupt> {
        if self.facts.contains(variable) {
            return Ok(true);
        }
        let declared = self
            .kb
            .variable(variable)
            .ok_or_else(|| InferenceError::UnknownVariable {
                variable: variable.to_string(),
            })?;

        if !self.index.is_derivable(variable) {
            let (rule, condition) = asked_by.map_or((None, None), |(rule, condition)| {
                (Some(rule.name.clone()), Some(condition.to_string()))
            });
            let explanation = match &rule {
                Some(rule) => format!(
                    "Rule {rule} needs '{variable}' while proving '{}'.",
                    self.goal
                ),
                None => format!("'{variable}' is the goal and no rule concludes it."),
            };
            return Err(Interrupt::Ask(Box::new(Question {
                variable: variable.to_string(),
                prompt_text: declared.prompt(),
                help_text: declared.help_text.clone(),
                expected: declared.kind.clone(),
                why: WhyContext {
                    goal: self.goal.to_string(),
                    rule,
                    condition,
                    explanation,
                },
            })));
        }

        if !self.in_progress.insert(variable.to_string()) {
            debug!(variable, "cycle detected; rule on this path fails");
            return Ok(false);
        }
        let (kb, index) = (self.kb, self.index);
        for &position in index.concluding(variable) {
            self.fire(&kb.rules()[position])?;
        }
        self.in_progress.remove(variable);
        Ok(self.facts.contains(variable))
    }

    fn fire(&mut self, rule: &Rule) -> Result<(), Interrupt> {
        let mut antecedent = Certainty::CERTAIN;
        for condition in &rule.antecedent {
            if !self.resolve(&condition.variable, Some((rule, condition)))? {
                trace!(rule = %rule.name, variable = %condition.variable, "condition unresolved");
                return Ok(());
            }
            match evaluate(condition, self.kb, &self.facts)? {
                ConditionOutcome::Satisfied(cf) => antecedent = antecedent.and(cf),
                ConditionOutcome::Refuted | ConditionOutcome::Unknown => return Ok(()),
            }
        }
        if !antecedent.is_positive() {
            return Ok(());
        }

        for conclusion in &rule.consequent {
            match self.facts.record(
                &conclusion.variable,
                &conclusion.literal,
                &rule.name,
                antecedent.scaled(conclusion.certainty),
            ) {
                effect if effect.changed() => {
                    if !self.rules_used.contains(&rule.name) {
                        self.rules_used.push(rule.name.clone());
                    }
                }
                Contribution::Conflict { existing } => debug!(
                    rule = %rule.name,
                    variable = %conclusion.variable,
                    kept = %existing,
                    rejected = %conclusion.literal,
                    "conflicting conclusion ignored"
                ),
                _ => {}
            }
        }
        Ok(())
    }
}
