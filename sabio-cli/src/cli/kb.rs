//! Knowledge-base, variable and rule management commands.

use anyhow::{Context, Result};
use sabio_core::{Rule, Variable, VariableKind};

use super::client::ApiClient;
use crate::interactive::Console;

fn describe_kind(kind: &VariableKind) -> String {
    match kind {
        VariableKind::Categorical { domain } => format!("categorical {{{}}}", domain.join(", ")),
        VariableKind::Numeric { range } => format!("numeric {range}"),
    }
}

fn print_variables(variables: &[Variable]) {
    println!("{:<20}  {:<40}  PROMPT", "NAME", "KIND");
    println!("{:-<20}  {:-<40}  {:-<24}", "", "", "");
    for variable in variables {
        println!(
            "{:<20}  {:<40}  {}",
            variable.name,
            describe_kind(&variable.kind),
            variable.prompt()
        );
    }
}

fn print_rules(rules: &[Rule]) {
    for rule in rules {
        println!("{rule}");
    }
}

/// List all knowledge bases.
pub async fn list_kbs(client: &ApiClient) -> Result<()> {
    let kbs = client.list_kbs().await?;
    if kbs.is_empty() {
        println!("No knowledge bases yet. Use 'sabio kb create <name>' to add one.");
        return Ok(());
    }
    println!("Knowledge bases:\n");
    for kb in kbs {
        println!("  {kb}");
    }
    Ok(())
}

/// Create an empty knowledge base.
pub async fn create_kb(client: &ApiClient, name: &str) -> Result<()> {
    client.create_kb(name).await?;
    println!("Knowledge base '{name}' created");
    Ok(())
}

/// Print variables and rules of a knowledge base.
pub async fn show_kb(client: &ApiClient, name: &str) -> Result<()> {
    let kb = client.get_kb(name).await?;
    println!("Knowledge base '{}'\n", kb.name());
    let variables: Vec<Variable> = kb.variables().cloned().collect();
    if variables.is_empty() {
        println!("(no variables)");
    } else {
        print_variables(&variables);
    }
    println!();
    if kb.rules().is_empty() {
        println!("(no rules)");
    } else {
        print_rules(kb.rules());
    }
    Ok(())
}

/// Delete a knowledge base after confirmation.
pub async fn delete_kb(client: &ApiClient, name: &str, skip_confirmation: bool) -> Result<()> {
    if !skip_confirmation {
        let mut console = Console::stdio();
        let prompt = format!("Delete knowledge base '{name}' with all its variables and rules?");
        if !console.confirm(&prompt, false)? {
            println!("Aborted");
            return Ok(());
        }
    }
    client.delete_kb(name).await?;
    println!("Knowledge base '{name}' deleted");
    Ok(())
}

/// List variables of a knowledge base.
pub async fn list_variables(client: &ApiClient, kb: &str) -> Result<()> {
    let variables = client.list_variables(kb).await?;
    if variables.is_empty() {
        println!("No variables in '{kb}'.");
        return Ok(());
    }
    print_variables(&variables);
    Ok(())
}

/// Declare a variable from its JSON definition.
pub async fn add_variable(client: &ApiClient, kb: &str, definition: &str) -> Result<()> {
    let variable: Variable =
        serde_json::from_str(definition).context("invalid variable definition")?;
    let created = client.create_variable(kb, &variable).await?;
    println!(
        "Variable '{}' ({}) added to '{kb}'",
        created.name,
        describe_kind(&created.kind)
    );
    Ok(())
}

/// Delete a variable.
pub async fn delete_variable(client: &ApiClient, kb: &str, name: &str) -> Result<()> {
    client.delete_variable(kb, name).await?;
    println!("Variable '{name}' deleted from '{kb}'");
    Ok(())
}

/// List rules in declaration order.
pub async fn list_rules(client: &ApiClient, kb: &str) -> Result<()> {
    let rules = client.list_rules(kb).await?;
    if rules.is_empty() {
        println!("No rules in '{kb}'.");
        return Ok(());
    }
    print_rules(&rules);
    Ok(())
}

/// Append a rule from its JSON definition.
pub async fn add_rule(client: &ApiClient, kb: &str, definition: &str) -> Result<()> {
    let rule: Rule = serde_json::from_str(definition).context("invalid rule definition")?;
    let created = client.create_rule(kb, &rule).await?;
    println!("Added to '{kb}': {created}");
    Ok(())
}

/// Delete a rule.
pub async fn delete_rule(client: &ApiClient, kb: &str, name: &str) -> Result<()> {
    client.delete_rule(kb, name).await?;
    println!("Rule '{name}' deleted from '{kb}'");
    Ok(())
}
