//! Definition checks applied when variables and rules enter a knowledge base,
//! and value checks applied to answers and asserted facts.

use std::collections::HashSet;

use super::{KnowledgeBase, Rule, Variable, VariableKind};
use crate::error::{InferenceError, KbError, KbResult};

/// Check a variable definition in isolation.
///
/// # Errors
///
/// Returns [`KbError::Validation`] for a blank name, an empty or duplicated
/// categorical domain, or a numeric range with `min > max`.
pub fn validate_variable(variable: &Variable) -> KbResult<()> {
    if variable.name.trim().is_empty() {
        return Err(KbError::validation("<unnamed>", "variable name is empty"));
    }
    match &variable.kind {
        VariableKind::Categorical { domain } => {
            if domain.is_empty() {
                return Err(KbError::validation(
                    &variable.name,
                    "categorical variables need at least one allowed value",
                ));
            }
            let mut seen = HashSet::new();
            if let Some(dup) = domain.iter().find(|value| !seen.insert(value.as_str())) {
                return Err(KbError::validation(
                    &variable.name,
                    format!("value '{dup}' appears twice in the domain"),
                ));
            }
            if domain.iter().any(|value| value.trim().is_empty()) {
                return Err(KbError::validation(
                    &variable.name,
                    "domain values cannot be blank",
                ));
            }
        }
        VariableKind::Numeric { range } => {
            for bound in [range.min, range.max].into_iter().flatten() {
                if !bound.is_finite() {
                    return Err(KbError::validation(
                        &variable.name,
                        "range bounds must be finite numbers",
                    ));
                }
            }
            if let (Some(min), Some(max)) = (range.min, range.max)
                && min > max
            {
                return Err(KbError::validation(
                    &variable.name,
                    format!("range minimum {min} exceeds maximum {max}"),
                ));
            }
        }
    }
    Ok(())
}

/// Check a rule against the variables declared in `kb`.
///
/// # Errors
///
/// Returns [`KbError::Validation`] for an empty antecedent or consequent, an
/// undeclared variable, an ordering operator on a categorical variable, a
/// numeric literal that does not parse, or a categorical literal outside the
/// variable's domain.
pub fn validate_rule(rule: &Rule, kb: &KnowledgeBase) -> KbResult<()> {
    if rule.name.trim().is_empty() {
        return Err(KbError::validation("<unnamed>", "rule name is empty"));
    }
    if rule.antecedent.is_empty() {
        return Err(KbError::validation(
            &rule.name,
            "rule needs at least one condition",
        ));
    }
    if rule.consequent.is_empty() {
        return Err(KbError::validation(
            &rule.name,
            "rule needs at least one conclusion",
        ));
    }

    for condition in &rule.antecedent {
        let variable = declared(rule, kb, &condition.variable)?;
        if condition.operator.is_ordering() && !variable.is_numeric() {
            return Err(KbError::validation(
                &rule.name,
                format!(
                    "operator '{}' needs a numeric variable but '{}' is categorical",
                    condition.operator, variable.name
                ),
            ));
        }
        check_literal(rule, variable, &condition.literal)?;
    }

    for conclusion in &rule.consequent {
        let variable = declared(rule, kb, &conclusion.variable)?;
        check_literal(rule, variable, &conclusion.literal)?;
    }
    Ok(())
}

/// Check a value supplied for `variable` by a user or a caller.
///
/// # Errors
///
/// Returns [`InferenceError::InvalidAnswer`] when a categorical value is not
/// in the domain, or a numeric value does not parse or falls outside the range.
pub fn validate_value(variable: &Variable, value: &str) -> Result<(), InferenceError> {
    let invalid = |reason: String| InferenceError::InvalidAnswer {
        variable: variable.name.clone(),
        value: value.to_string(),
        reason,
    };
    match &variable.kind {
        VariableKind::Categorical { domain } => {
            if domain.iter().any(|allowed| allowed == value) {
                Ok(())
            } else {
                Err(invalid(format!("expected one of: {}", domain.join(", "))))
            }
        }
        VariableKind::Numeric { range } => {
            let number = parse_number(value)
                .ok_or_else(|| invalid("expected a decimal number".to_string()))?;
            if range.contains(number) {
                Ok(())
            } else {
                Err(invalid(format!("expected a number in {range}")))
            }
        }
    }
}

/// Parse decimal text; surrounding whitespace is ignored.
#[must_use]
pub fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn declared<'kb>(rule: &Rule, kb: &'kb KnowledgeBase, name: &str) -> KbResult<&'kb Variable> {
    kb.variable(name).ok_or_else(|| {
        KbError::validation(&rule.name, format!("references unknown variable '{name}'"))
    })
}

fn check_literal(rule: &Rule, variable: &Variable, literal: &str) -> KbResult<()> {
    match &variable.kind {
        VariableKind::Numeric { .. } if parse_number(literal).is_none() => Err(KbError::validation(
            &rule.name,
            format!(
                "literal '{literal}' for numeric variable '{}' is not a number",
                variable.name
            ),
        )),
        VariableKind::Categorical { domain } if !domain.iter().any(|v| v == literal) => {
            Err(KbError::validation(
                &rule.name,
                format!(
                    "literal '{literal}' is not in the domain of '{}' ({})",
                    variable.name,
                    domain.join(", ")
                ),
            ))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::kb::{Conclusion, Condition, Operator};
    use crate::types::KbName;

    fn kb() -> KnowledgeBase {
        KnowledgeBase::new(KbName::new("clinic").unwrap())
            .with_variable(Variable::categorical("febre", ["sim", "não"]))
            .unwrap()
            .with_variable(Variable::numeric("idade", Some(0.0), Some(130.0)))
            .unwrap()
    }

    fn reason(err: KbError) -> String {
        match err {
            KbError::Validation { reason, .. } => reason,
            other => format!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_inverted_range() {
        let err = validate_variable(&Variable::numeric("peso", Some(10.0), Some(1.0))).unwrap_err();
        assert!(reason(err).contains("exceeds maximum"));
    }

    #[test]
    fn rejects_empty_and_duplicate_domains() {
        let empty = Variable::categorical("x", Vec::<String>::new());
        assert!(validate_variable(&empty).is_err());
        let dup = Variable::categorical("x", ["a", "b", "a"]);
        assert!(reason(validate_variable(&dup).unwrap_err()).contains("appears twice"));
    }

    #[test]
    fn rejects_empty_antecedent_and_consequent() {
        let no_conditions = Rule::new("R", vec![], vec![Conclusion::new("febre", "sim", 1.0)]);
        assert!(reason(validate_rule(&no_conditions, &kb()).unwrap_err()).contains("condition"));
        let no_conclusions = Rule::new("R", vec![Condition::new("febre", Operator::Eq, "sim")], vec![]);
        assert!(reason(validate_rule(&no_conclusions, &kb()).unwrap_err()).contains("conclusion"));
    }

    #[test]
    fn rejects_unknown_variable_reference() {
        let rule = Rule::new(
            "R",
            vec![Condition::new("tosse", Operator::Eq, "sim")],
            vec![Conclusion::new("febre", "sim", 1.0)],
        );
        assert!(reason(validate_rule(&rule, &kb()).unwrap_err()).contains("unknown variable 'tosse'"));
    }

    #[test]
    fn rejects_ordering_on_categorical_and_bad_numeric_literal() {
        let ordering = Rule::new(
            "R",
            vec![Condition::new("febre", Operator::Gt, "sim")],
            vec![Conclusion::new("febre", "sim", 1.0)],
        );
        assert!(reason(validate_rule(&ordering, &kb()).unwrap_err()).contains("categorical"));

        let literal = Rule::new(
            "R",
            vec![Condition::new("idade", Operator::Gt, "adult")],
            vec![Conclusion::new("febre", "sim", 1.0)],
        );
        assert!(reason(validate_rule(&literal, &kb()).unwrap_err()).contains("not a number"));
    }

    #[test]
    fn values_are_checked_against_domain_and_range() {
        let kb = kb();
        let febre = kb.variable("febre").unwrap();
        let idade = kb.variable("idade").unwrap();
        assert!(validate_value(febre, "sim").is_ok());
        assert!(validate_value(febre, "Sim").is_err());
        assert!(validate_value(idade, " 42.5 ").is_ok());
        assert!(validate_value(idade, "200").is_err());
        assert!(validate_value(idade, "old").is_err());
    }
}
