//! Forward chaining behaviour over small clinical knowledge bases

#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::panic)]

use sabio_core::{
    Conclusion, Condition, FactSource, ForwardChainer, InferenceConfig, InferenceError, KbName,
    KnowledgeBase, Operator, Rule, Variable,
};

fn yes_no(name: &str) -> Variable {
    Variable::categorical(name, ["sim", "não"])
}

fn rule(name: &str, when: &[(&str, Operator, &str)], then: (&str, &str, f64)) -> Rule {
    Rule::new(
        name,
        when.iter()
            .map(|(var, op, lit)| Condition::new(*var, *op, *lit))
            .collect(),
        vec![Conclusion::new(then.0, then.1, then.2)],
    )
}

fn clinic() -> KnowledgeBase {
    KnowledgeBase::new(KbName::new("clinic").unwrap())
        .with_variable(yes_no("febre"))
        .unwrap()
        .with_variable(yes_no("tosse"))
        .unwrap()
        .with_variable(yes_no("gripe"))
        .unwrap()
        .with_variable(yes_no("repouso"))
        .unwrap()
        .with_variable(Variable::numeric("idade", Some(0.0), Some(130.0)))
        .unwrap()
        .with_rule(rule("R1", &[("febre", Operator::Eq, "sim")], ("gripe", "sim", 0.8)))
        .unwrap()
        .with_rule(rule("R2", &[("tosse", Operator::Eq, "sim")], ("gripe", "sim", 0.5)))
        .unwrap()
        .with_rule(rule(
            "R3",
            &[("gripe", Operator::Eq, "sim"), ("idade", Operator::Gt, "18")],
            ("repouso", "sim", 0.9),
        ))
        .unwrap()
}

fn certainty_of(outcome: &sabio_core::ForwardOutcome, variable: &str) -> f64 {
    outcome
        .facts
        .iter()
        .find(|fact| fact.variable == variable)
        .map(|fact| fact.certainty.raw())
        .unwrap_or_else(|| panic!("no fact for {variable}"))
}

#[test]
fn single_rule_derives_its_conclusion() {
    let kb = clinic();
    let outcome = ForwardChainer::new(&kb, InferenceConfig::default())
        .run([("febre", "sim")])
        .unwrap();
    assert!((certainty_of(&outcome, "gripe") - 0.8).abs() < 1e-12);
    assert_eq!(outcome.rules_used, ["R1"]);
}

#[test]
fn independent_rules_accumulate_in_firing_order() {
    let kb = clinic();
    let outcome = ForwardChainer::new(&kb, InferenceConfig::default())
        .run([("febre", "sim"), ("tosse", "sim")])
        .unwrap();
    assert!((certainty_of(&outcome, "gripe") - 0.9).abs() < 1e-12);
    assert_eq!(outcome.rules_used, ["R1", "R2"]);

    let gripe = outcome.facts.iter().find(|f| f.variable == "gripe").unwrap();
    assert_eq!(gripe.source, FactSource::Derived);
    assert_eq!(gripe.derived_by, ["R1", "R2"]);
}

#[test]
fn chained_rules_use_numeric_comparison_and_minimum() {
    let kb = clinic();
    let outcome = ForwardChainer::new(&kb, InferenceConfig::default())
        .run([("febre", "sim"), ("idade", "20")])
        .unwrap();
    // min(0.8, 1.0) * 0.9
    assert!((certainty_of(&outcome, "repouso") - 0.72).abs() < 1e-12);
    assert_eq!(outcome.rules_used, ["R1", "R3"]);

    let minor = ForwardChainer::new(&kb, InferenceConfig::default())
        .run([("febre", "sim"), ("idade", "9")])
        .unwrap();
    assert!(minor.facts.iter().all(|fact| fact.variable != "repouso"));
}

#[test]
fn identical_input_gives_identical_output() {
    let kb = clinic();
    let chainer = ForwardChainer::new(&kb, InferenceConfig::default());
    let first = chainer.run([("febre", "sim"), ("tosse", "sim"), ("idade", "40")]).unwrap();
    let second = chainer.run([("febre", "sim"), ("tosse", "sim"), ("idade", "40")]).unwrap();
    assert_eq!(first, second);
}

#[test]
fn conflicting_conclusion_keeps_the_first_value() {
    let kb = clinic()
        .with_rule(rule("R4", &[("tosse", Operator::Eq, "sim")], ("gripe", "não", 0.9)))
        .unwrap();
    let outcome = ForwardChainer::new(&kb, InferenceConfig::default())
        .run([("febre", "sim"), ("tosse", "sim")])
        .unwrap();
    let gripe = outcome.facts.iter().find(|f| f.variable == "gripe").unwrap();
    assert_eq!(gripe.value, "sim");
    assert!(!outcome.rules_used.contains(&"R4".to_string()));
}

#[test]
fn rule_without_effect_is_not_listed() {
    let kb = clinic();
    let outcome = ForwardChainer::new(&kb, InferenceConfig::default())
        .run([("febre", "sim"), ("gripe", "sim")])
        .unwrap();
    assert!((certainty_of(&outcome, "gripe") - 1.0).abs() < 1e-12);
    assert!(outcome.rules_used.is_empty());
}

#[test]
fn undeclared_initial_fact_is_rejected() {
    let kb = clinic();
    let result = ForwardChainer::new(&kb, InferenceConfig::default()).run([("peso", "80")]);
    assert!(matches!(result, Err(InferenceError::UnknownVariable { .. })));
}

fn amplifying_cycle() -> KnowledgeBase {
    KnowledgeBase::new(KbName::new("loop").unwrap())
        .with_variable(yes_no("a"))
        .unwrap()
        .with_variable(yes_no("b"))
        .unwrap()
        .with_variable(yes_no("c"))
        .unwrap()
        .with_rule(rule("R0", &[("c", Operator::Eq, "sim")], ("a", "sim", 0.5)))
        .unwrap()
        .with_rule(rule("R1", &[("a", Operator::Eq, "sim")], ("b", "sim", 0.9)))
        .unwrap()
        .with_rule(rule("R2", &[("b", Operator::Eq, "sim")], ("a", "sim", 0.9)))
        .unwrap()
}

#[test]
fn cyclic_rules_settle_without_double_counting() {
    let kb = amplifying_cycle();
    let outcome = ForwardChainer::new(&kb, InferenceConfig::default())
        .run([("c", "sim")])
        .unwrap();
    // a = 0.5 + 0.81a(1 - 0.5)  =>  a = 0.5 / 0.595
    let a = certainty_of(&outcome, "a");
    assert!((a - 0.5 / 0.595).abs() < 1e-6, "a = {a}");
    assert!((certainty_of(&outcome, "b") - 0.9 * a).abs() < 1e-6);
    assert_eq!(outcome.rules_used, ["R0", "R1", "R2"]);
    assert!(outcome.passes > 3);
}

#[test]
fn pass_cap_reports_non_convergence_with_partial_facts() {
    let kb = amplifying_cycle();
    let config = InferenceConfig {
        max_passes: 3,
        ..InferenceConfig::default()
    };
    match ForwardChainer::new(&kb, config).run([("c", "sim")]) {
        Err(InferenceError::NonConvergence { passes, partial }) => {
            assert_eq!(passes, 3);
            assert_eq!(partial.passes, 3);
            assert_eq!(partial.facts.len(), 3);
            assert_eq!(partial.rules_used, ["R0", "R1", "R2"]);
        }
        other => panic!("expected non-convergence, got {other:?}"),
    }
}
