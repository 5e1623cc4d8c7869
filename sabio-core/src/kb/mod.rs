//! Knowledge-base model: typed variables, conditions, conclusions and rules.

pub mod validation;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::Certainty;
use crate::error::{KbError, KbResult};
use crate::types::KbName;

/// Variable declared in a knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// Unique name within the knowledge base.
    pub name: String,
    /// Categorical domain or numeric range.
    #[serde(flatten)]
    pub kind: VariableKind,
    /// Question shown when the variable must be asked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_text: Option<String>,
    /// Extra explanation shown next to the question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
}

/// Shape of a variable's values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VariableKind {
    /// One value out of an ordered list.
    Categorical {
        /// Allowed values in display order.
        domain: Vec<String>,
    },
    /// Decimal number, optionally bounded.
    Numeric {
        /// Inclusive bounds.
        #[serde(default)]
        range: NumericRange,
    },
}

/// Inclusive numeric bounds; either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericRange {
    /// Lower bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Upper bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl NumericRange {
    /// Whether `value` lies within the bounds.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }
}

impl fmt::Display for NumericRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (Some(min), Some(max)) => write!(f, "[{min}, {max}]"),
            (Some(min), None) => write!(f, ">= {min}"),
            (None, Some(max)) => write!(f, "<= {max}"),
            (None, None) => f.write_str("any number"),
        }
    }
}

impl Variable {
    /// Categorical variable over `domain`.
    pub fn categorical<I, S>(name: impl Into<String>, domain: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            kind: VariableKind::Categorical {
                domain: domain.into_iter().map(Into::into).collect(),
            },
            prompt_text: None,
            help_text: None,
        }
    }

    /// Numeric variable bounded by `min` and `max`.
    pub fn numeric(name: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            name: name.into(),
            kind: VariableKind::Numeric {
                range: NumericRange { min, max },
            },
            prompt_text: None,
            help_text: None,
        }
    }

    /// Attach the question text.
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt_text = Some(prompt.into());
        self
    }

    /// Attach the help text.
    #[must_use]
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help_text = Some(help.into());
        self
    }

    /// True for numeric variables.
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self.kind, VariableKind::Numeric { .. })
    }

    /// Question to display, falling back to a generic prompt.
    #[must_use]
    pub fn prompt(&self) -> String {
        self.prompt_text
            .clone()
            .unwrap_or_else(|| format!("Enter a value for '{}'.", self.name))
    }
}

/// Comparison operator used in rule conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// Equal.
    #[serde(rename = "==")]
    Eq,
    /// Not equal.
    #[serde(rename = "!=")]
    Ne,
    /// Greater than.
    #[serde(rename = ">")]
    Gt,
    /// Less than.
    #[serde(rename = "<")]
    Lt,
    /// Greater than or equal.
    #[serde(rename = ">=")]
    Ge,
    /// Less than or equal.
    #[serde(rename = "<=")]
    Le,
}

impl Operator {
    /// Symbol as written in rules.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
        }
    }

    /// Ordering operators only make sense on numbers.
    #[must_use]
    pub const fn is_ordering(self) -> bool {
        matches!(self, Self::Gt | Self::Lt | Self::Ge | Self::Le)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "==" => Ok(Self::Eq),
            "!=" => Ok(Self::Ne),
            ">" => Ok(Self::Gt),
            "<" => Ok(Self::Lt),
            ">=" => Ok(Self::Ge),
            "<=" => Ok(Self::Le),
            other => Err(format!(
                "Invalid operator: {other}. Valid options: ==, !=, >, <, >=, <="
            )),
        }
    }
}

/// `variable operator literal`, one clause of a rule antecedent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Variable under test.
    pub variable: String,
    /// Comparison.
    pub operator: Operator,
    /// Literal compared against the variable's value.
    pub literal: String,
}

impl Condition {
    /// Build a condition.
    pub fn new(variable: impl Into<String>, operator: Operator, literal: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            operator,
            literal: literal.into(),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.variable, self.operator, self.literal)
    }
}

/// `variable == literal` with a certainty factor, one clause of a consequent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conclusion {
    /// Variable assigned by the rule.
    pub variable: String,
    /// Value assigned.
    pub literal: String,
    /// Certainty of the conclusion when the antecedent is certain.
    #[serde(default)]
    pub certainty: Certainty,
}

impl Conclusion {
    /// Build a conclusion.
    pub fn new(variable: impl Into<String>, literal: impl Into<String>, certainty: f64) -> Self {
        Self {
            variable: variable.into(),
            literal: literal.into(),
            certainty: Certainty::exact(certainty),
        }
    }
}

impl fmt::Display for Conclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} == {} (cf {})",
            self.variable, self.literal, self.certainty
        )
    }
}

/// Production rule: conjunction of conditions implying conclusions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique name within the knowledge base.
    pub name: String,
    /// Conditions, implicitly joined by AND.
    pub antecedent: Vec<Condition>,
    /// Conclusions asserted when the antecedent holds.
    pub consequent: Vec<Conclusion>,
}

impl Rule {
    /// Build a rule.
    pub fn new(
        name: impl Into<String>,
        antecedent: Vec<Condition>,
        consequent: Vec<Conclusion>,
    ) -> Self {
        Self {
            name: name.into(),
            antecedent,
            consequent,
        }
    }

    /// Whether any condition or conclusion mentions `variable`.
    #[must_use]
    pub fn references(&self, variable: &str) -> bool {
        self.antecedent.iter().any(|c| c.variable == variable)
            || self.consequent.iter().any(|c| c.variable == variable)
    }

    /// Whether the rule assigns `variable`.
    #[must_use]
    pub fn concludes(&self, variable: &str) -> bool {
        self.consequent.iter().any(|c| c.variable == variable)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let antecedent = self
            .antecedent
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" AND ");
        let consequent = self
            .consequent
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" AND ");
        write!(f, "RULE {}: IF ({antecedent}) THEN ({consequent})", self.name)
    }
}

/// Named collection of variables and rules.
///
/// Variables are kept ordered by name; rules keep declaration order, which is
/// the order both engines try them in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    name: KbName,
    #[serde(default)]
    variables: BTreeMap<String, Variable>,
    #[serde(default)]
    rules: Vec<Rule>,
}

impl KnowledgeBase {
    /// Empty knowledge base.
    #[must_use]
    pub const fn new(name: KbName) -> Self {
        Self {
            name,
            variables: BTreeMap::new(),
            rules: Vec::new(),
        }
    }

    /// Knowledge-base name.
    #[must_use]
    pub const fn name(&self) -> &KbName {
        &self.name
    }

    /// Look up a variable.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    /// Variables ordered by name.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }

    /// Look up a rule.
    #[must_use]
    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Rules in declaration order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Validate and add a variable.
    ///
    /// # Errors
    ///
    /// Fails on a duplicate name or an invalid definition.
    pub fn add_variable(&mut self, variable: Variable) -> KbResult<()> {
        validation::validate_variable(&variable)?;
        if self.variables.contains_key(&variable.name) {
            return Err(KbError::VariableAlreadyExists {
                kb: self.name.clone(),
                variable: variable.name,
            });
        }
        self.variables.insert(variable.name.clone(), variable);
        Ok(())
    }

    /// Validate and add a rule at the end of the declaration order.
    ///
    /// # Errors
    ///
    /// Fails on a duplicate name or when the rule does not validate against
    /// the declared variables.
    pub fn add_rule(&mut self, rule: Rule) -> KbResult<()> {
        validation::validate_rule(&rule, self)?;
        if self.rule(&rule.name).is_some() {
            return Err(KbError::RuleAlreadyExists {
                kb: self.name.clone(),
                rule: rule.name,
            });
        }
        self.rules.push(rule);
        Ok(())
    }

    /// Builder-style [`KnowledgeBase::add_variable`].
    ///
    /// # Errors
    ///
    /// Same as [`KnowledgeBase::add_variable`].
    pub fn with_variable(mut self, variable: Variable) -> KbResult<Self> {
        self.add_variable(variable)?;
        Ok(self)
    }

    /// Builder-style [`KnowledgeBase::add_rule`].
    ///
    /// # Errors
    ///
    /// Same as [`KnowledgeBase::add_rule`].
    pub fn with_rule(mut self, rule: Rule) -> KbResult<Self> {
        self.add_rule(rule)?;
        Ok(self)
    }

    /// Replace a variable's definition, keeping its name.
    ///
    /// # Errors
    ///
    /// Fails when the variable is unknown, the payload renames it, the new
    /// definition is invalid, or an existing rule no longer validates.
    pub fn update_variable(&mut self, name: &str, variable: Variable) -> KbResult<()> {
        if !self.variables.contains_key(name) {
            return Err(self.unknown_variable(name));
        }
        if variable.name != name {
            return Err(KbError::VariableRename {
                from: name.to_string(),
                to: variable.name,
            });
        }
        validation::validate_variable(&variable)?;

        let previous = self.variables.insert(name.to_string(), variable);
        let broken = self
            .rules
            .iter()
            .filter(|rule| rule.references(name))
            .find_map(|rule| validation::validate_rule(rule, self).err());
        if let Some(err) = broken {
            if let Some(previous) = previous {
                self.variables.insert(name.to_string(), previous);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Remove a variable no rule references.
    ///
    /// # Errors
    ///
    /// Fails when the variable is unknown or still used by a rule.
    pub fn remove_variable(&mut self, name: &str) -> KbResult<Variable> {
        if let Some(rule) = self.rules.iter().find(|rule| rule.references(name)) {
            return Err(KbError::VariableInUse {
                variable: name.to_string(),
                rule: rule.name.clone(),
            });
        }
        self.variables
            .remove(name)
            .ok_or_else(|| self.unknown_variable(name))
    }

    /// Replace a rule in place; the new definition may carry a new name.
    ///
    /// # Errors
    ///
    /// Fails when the rule is unknown, the new name collides with another
    /// rule, or the new definition is invalid.
    pub fn update_rule(&mut self, name: &str, rule: Rule) -> KbResult<()> {
        let position = self
            .rules
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| self.unknown_rule(name))?;
        if rule.name != name && self.rule(&rule.name).is_some() {
            return Err(KbError::RuleAlreadyExists {
                kb: self.name.clone(),
                rule: rule.name,
            });
        }
        validation::validate_rule(&rule, self)?;
        self.rules[position] = rule;
        Ok(())
    }

    /// Remove a rule.
    ///
    /// # Errors
    ///
    /// Fails when the rule is unknown.
    pub fn remove_rule(&mut self, name: &str) -> KbResult<Rule> {
        let position = self
            .rules
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| self.unknown_rule(name))?;
        Ok(self.rules.remove(position))
    }

    fn unknown_variable(&self, name: &str) -> KbError {
        KbError::UnknownVariable {
            kb: self.name.clone(),
            variable: name.to_string(),
        }
    }

    fn unknown_rule(&self, name: &str) -> KbError {
        KbError::UnknownRule {
            kb: self.name.clone(),
            rule: name.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn flu_kb() -> KnowledgeBase {
        KnowledgeBase::new(KbName::new("flu").unwrap())
            .with_variable(Variable::categorical("febre", ["sim", "não"]))
            .unwrap()
            .with_variable(Variable::categorical("gripe", ["sim", "não"]))
            .unwrap()
            .with_rule(Rule::new(
                "R1",
                vec![Condition::new("febre", Operator::Eq, "sim")],
                vec![Conclusion::new("gripe", "sim", 0.8)],
            ))
            .unwrap()
    }

    #[test]
    fn variable_serializes_as_tagged_variant() {
        let json = serde_json::to_value(Variable::numeric("idade", Some(0.0), Some(120.0))).unwrap();
        assert_eq!(json["kind"], "numeric");
        assert_eq!(json["range"]["max"], 120.0);

        let parsed: Variable = serde_json::from_value(serde_json::json!({
            "name": "febre",
            "kind": "categorical",
            "domain": ["sim", "não"],
            "prompt_text": "Tem febre?"
        }))
        .unwrap();
        assert_eq!(parsed.prompt(), "Tem febre?");
        assert!(!parsed.is_numeric());
    }

    #[test]
    fn operators_round_trip_as_symbols() {
        let cond: Condition =
            serde_json::from_str(r#"{"variable":"idade","operator":">=","literal":"18"}"#).unwrap();
        assert_eq!(cond.operator, Operator::Ge);
        assert_eq!(cond.to_string(), "idade >= 18");
        assert!("=>".parse::<Operator>().is_err());
    }

    #[test]
    fn conclusion_certainty_defaults_to_one() {
        let c: Conclusion = serde_json::from_str(r#"{"variable":"gripe","literal":"sim"}"#).unwrap();
        assert_eq!(c.certainty, Certainty::CERTAIN);
    }

    #[test]
    fn variable_in_use_cannot_be_removed() {
        let mut kb = flu_kb();
        let err = kb.remove_variable("febre").unwrap_err();
        assert!(matches!(err, KbError::VariableInUse { ref rule, .. } if rule == "R1"));
        kb.remove_rule("R1").unwrap();
        assert!(kb.remove_variable("febre").is_ok());
    }

    #[test]
    fn variable_update_keeps_name_and_revalidates_rules() {
        let mut kb = flu_kb();
        let renamed = Variable::categorical("fever", ["sim", "não"]);
        assert!(matches!(
            kb.update_variable("febre", renamed),
            Err(KbError::VariableRename { .. })
        ));

        // Dropping 'sim' from the domain would orphan R1's literal.
        let shrunk = Variable::categorical("febre", ["não"]);
        assert!(kb.update_variable("febre", shrunk).is_err());
        assert_eq!(
            kb.variable("febre").unwrap().kind,
            VariableKind::Categorical {
                domain: vec!["sim".into(), "não".into()]
            }
        );
    }

    #[test]
    fn rule_update_keeps_declaration_position() {
        let mut kb = flu_kb()
            .with_rule(Rule::new(
                "R2",
                vec![Condition::new("febre", Operator::Eq, "não")],
                vec![Conclusion::new("gripe", "não", 0.6)],
            ))
            .unwrap();
        let replacement = Rule::new(
            "R1b",
            vec![Condition::new("febre", Operator::Eq, "sim")],
            vec![Conclusion::new("gripe", "sim", 0.9)],
        );
        kb.update_rule("R1", replacement).unwrap();
        let names: Vec<_> = kb.rules().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["R1b", "R2"]);
    }

    #[test]
    fn rule_display_reads_naturally() {
        let kb = flu_kb();
        assert_eq!(
            kb.rule("R1").unwrap().to_string(),
            "RULE R1: IF (febre == sim) THEN (gripe == sim (cf 0.800))"
        );
    }
}
