//! Single-condition evaluation against working memory.

use std::cmp::Ordering;

use super::FactStore;
use crate::Certainty;
use crate::error::{InferenceError, InferenceResult};
use crate::kb::validation::parse_number;
use crate::kb::{Condition, KnowledgeBase, Operator, VariableKind};

/// Result of testing one condition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConditionOutcome {
    /// Holds, carrying the certainty of the fact it was tested against.
    Satisfied(Certainty),
    /// The variable is known and the comparison is false.
    Refuted,
    /// The variable has no value yet.
    Unknown,
}

/// Test `condition` against the current facts.
///
/// Numeric variables compare as decimal numbers; categorical variables compare
/// by exact text and accept only `==` and `!=`.
///
/// # Errors
///
/// Fails on an undeclared variable, an ordering operator on a categorical
/// variable, or a numeric literal or stored value that does not parse.
pub fn evaluate(
    condition: &Condition,
    kb: &KnowledgeBase,
    facts: &FactStore,
) -> InferenceResult<ConditionOutcome> {
    let variable =
        kb.variable(&condition.variable)
            .ok_or_else(|| InferenceError::UnknownVariable {
                variable: condition.variable.clone(),
            })?;

    if matches!(variable.kind, VariableKind::Categorical { .. }) && condition.operator.is_ordering()
    {
        return Err(InferenceError::InvalidOperator {
            variable: variable.name.clone(),
            operator: condition.operator.symbol().to_string(),
        });
    }

    let Some(fact) = facts.get(&condition.variable) else {
        return Ok(ConditionOutcome::Unknown);
    };

    let holds = match variable.kind {
        VariableKind::Categorical { .. } => match condition.operator {
            Operator::Eq => fact.value == condition.literal,
            _ => fact.value != condition.literal,
        },
        VariableKind::Numeric { .. } => {
            let number = |text: &str| {
                parse_number(text).ok_or_else(|| InferenceError::InvalidLiteral {
                    variable: variable.name.clone(),
                    literal: text.to_string(),
                })
            };
            let ordering = number(&fact.value)?.partial_cmp(&number(&condition.literal)?);
            ordering.is_some_and(|ordering| matches_ordering(condition.operator, ordering))
        }
    };

    Ok(if holds {
        ConditionOutcome::Satisfied(fact.certainty)
    } else {
        ConditionOutcome::Refuted
    })
}

const fn matches_ordering(operator: Operator, ordering: Ordering) -> bool {
    match operator {
        Operator::Eq => matches!(ordering, Ordering::Equal),
        Operator::Ne => !matches!(ordering, Ordering::Equal),
        Operator::Gt => matches!(ordering, Ordering::Greater),
        Operator::Lt => matches!(ordering, Ordering::Less),
        Operator::Ge => !matches!(ordering, Ordering::Less),
        Operator::Le => !matches!(ordering, Ordering::Greater),
    }
}
