//! Consultation (backward chaining) and forward chaining commands.

use anyhow::{Result, anyhow};
use sabio_core::{BackwardStep, Fact, FactSource, Question, Verdict, VariableKind};
use std::collections::BTreeMap;
use std::io::{BufRead, Write};

use super::client::ApiClient;
use super::commands::OutputFormat;
use crate::interactive::Console;

/// What the user typed at a question prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// An answer, optionally with `@certainty`.
    Value {
        /// Answered value.
        value: String,
        /// Certainty after `@`, if given.
        certainty: Option<f64>,
    },
    /// Explain why the question is asked.
    Why,
    /// Show help text and accepted values.
    Help,
    /// Abandon the consultation.
    Quit,
}

/// Interpret one line of input; `None` for blank lines.
#[must_use]
pub fn parse_reply(input: &str) -> Option<Reply> {
    let input = input.trim();
    match input.to_lowercase().as_str() {
        "" => None,
        "why" | "?why" => Some(Reply::Why),
        "help" | "?" => Some(Reply::Help),
        "quit" | "exit" => Some(Reply::Quit),
        _ => {
            let parsed = input.rsplit_once('@').and_then(|(value, certainty)| {
                certainty
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .map(|certainty| (value.trim().to_string(), Some(certainty)))
            });
            let (value, certainty) = parsed.unwrap_or_else(|| (input.to_string(), None));
            Some(Reply::Value { value, certainty })
        }
    }
}

fn expected_values(question: &Question) -> String {
    match &question.expected {
        VariableKind::Categorical { domain } => format!("one of: {}", domain.join(", ")),
        VariableKind::Numeric { range } => format!("a number in {range}"),
    }
}

fn describe_verdict(verdict: &Verdict) -> String {
    match &verdict.value {
        Some(value) => format!(
            "{} = {value} (certainty {})",
            verdict.goal, verdict.certainty
        ),
        None => format!("{} could not be determined", verdict.goal),
    }
}

fn rules_line(rules: &[String]) -> String {
    if rules.is_empty() {
        "Rules used: none".to_string()
    } else {
        format!("Rules used: {}", rules.join(", "))
    }
}

/// Drive a consultation until it concludes, the user quits or input ends.
///
/// Returns the verdict when the consultation concluded.
///
/// # Errors
///
/// Returns error when the consultation cannot be started or the server
/// becomes unreachable. Rejected answers are reported and asked again.
pub async fn run_consultation<R: BufRead, W: Write>(
    client: &ApiClient,
    kb: &str,
    goal: &str,
    console: &mut Console<R, W>,
) -> Result<Option<Verdict>> {
    let mut reply = client.start_consultation(kb, goal).await?;
    console.say(format!(
        "Consulting '{kb}' for '{goal}'. Answer with a value, optionally 'value @ certainty'; \
         'why', 'help' or 'quit' at any prompt."
    ))?;

    loop {
        let question = match &reply.step {
            BackwardStep::Result(verdict) => {
                console.say(describe_verdict(verdict))?;
                console.say(rules_line(&verdict.rules_used))?;
                client.close_consultation(&reply.session_id).await?;
                return Ok(Some(verdict.clone()));
            }
            BackwardStep::Question(question) => question.clone(),
        };

        let Some(input) = console.prompt(&question.prompt_text)? else {
            client.close_consultation(&reply.session_id).await?;
            return Ok(None);
        };
        match parse_reply(&input) {
            None => {}
            Some(Reply::Why) => {
                console.say(&question.why.explanation)?;
                if let Some(condition) = &question.why.condition {
                    console.say(format!("  condition: {condition}"))?;
                }
            }
            Some(Reply::Help) => {
                if let Some(help) = &question.help_text {
                    console.say(help)?;
                }
                console.say(format!("Expected {}", expected_values(&question)))?;
            }
            Some(Reply::Quit) => {
                client.close_consultation(&reply.session_id).await?;
                console.say("Consultation abandoned")?;
                return Ok(None);
            }
            Some(Reply::Value { value, certainty }) => {
                match client
                    .answer(&reply.session_id, &question.variable, &value, certainty)
                    .await
                {
                    Ok(next) => reply = next,
                    Err(err) => console.say(format!("{err:#}"))?,
                }
            }
        }
    }
}

/// Parse `variable=value` arguments.
///
/// # Errors
///
/// Returns error on a missing `=` or an empty variable name.
pub fn parse_facts(facts: &[String]) -> Result<BTreeMap<String, String>> {
    facts
        .iter()
        .map(|fact| {
            let (variable, value) = fact
                .split_once('=')
                .ok_or_else(|| anyhow!("expected variable=value, received '{fact}'"))?;
            let variable = variable.trim();
            if variable.is_empty() {
                return Err(anyhow!("missing variable name in '{fact}'"));
            }
            Ok((variable.to_string(), value.trim().to_string()))
        })
        .collect()
}

fn print_facts(facts: &[Fact]) {
    println!(
        "{:<20}  {:<16}  {:<9}  {:<7}  DERIVED BY",
        "VARIABLE", "VALUE", "CERTAINTY", "SOURCE"
    );
    println!("{:-<20}  {:-<16}  {:-<9}  {:-<7}  {:-<16}", "", "", "", "", "");
    for fact in facts {
        let source = match fact.source {
            FactSource::User => "user",
            FactSource::Derived => "derived",
        };
        println!(
            "{:<20}  {:<16}  {:<9}  {:<7}  {}",
            fact.variable,
            fact.value,
            fact.certainty.to_string(),
            source,
            fact.derived_by.join(", ")
        );
    }
}

/// Forward-chain from `facts` and print the outcome.
///
/// # Errors
///
/// Returns error on malformed facts or when the server rejects the run.
pub async fn run_forward(
    client: &ApiClient,
    kb: &str,
    facts: &[String],
    format: OutputFormat,
) -> Result<()> {
    let outcome = client.forward(kb, parse_facts(facts)?).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Table => {
            print_facts(&outcome.facts);
            println!();
            println!("{}", rules_line(&outcome.rules_used));
            println!("Passes: {}", outcome.passes);
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn replies_are_parsed() {
        assert_eq!(parse_reply("   "), None);
        assert_eq!(parse_reply("WHY"), Some(Reply::Why));
        assert_eq!(parse_reply("?"), Some(Reply::Help));
        assert_eq!(parse_reply("quit"), Some(Reply::Quit));
        assert_eq!(
            parse_reply("sim"),
            Some(Reply::Value {
                value: "sim".to_string(),
                certainty: None
            })
        );
        assert_eq!(
            parse_reply("sim @ 0.7"),
            Some(Reply::Value {
                value: "sim".to_string(),
                certainty: Some(0.7)
            })
        );
        assert_eq!(
            parse_reply("a@b"),
            Some(Reply::Value {
                value: "a@b".to_string(),
                certainty: None
            })
        );
    }

    #[test]
    fn facts_are_parsed() {
        let facts = parse_facts(&["febre=sim".to_string(), " idade = 20".to_string()]).unwrap();
        assert_eq!(facts["febre"], "sim");
        assert_eq!(facts["idade"], "20");
        assert!(parse_facts(&["febre".to_string()]).is_err());
        assert!(parse_facts(&["=sim".to_string()]).is_err());
    }
}
