//! Sabio CLI - command-line interface for the Sabio expert-system shell

use anyhow::Result;
use clap::Parser;
use sabio_cli::cli::{
    ApiClient, Cli, Commands, ConfigAction, KbAction, RuleAction, VariableAction, kb,
    run_consultation, run_forward, show_status, start_server, stop_server,
};
use sabio_cli::config::{ConfigManager, format_sections};
use sabio_cli::interactive::Console;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config_manager = ConfigManager::load()?;
    let default_kb = config_manager
        .config()
        .knowledge_bases
        .default_kb
        .to_string();

    match cli.command {
        Commands::Start { port } => start_server(port, config_manager.config()).await,
        Commands::Stop => stop_server().await,
        Commands::Status { json } => show_status(json).await,
        Commands::Kb { action } => {
            let client = ApiClient::connect().await?;
            match action {
                KbAction::List => kb::list_kbs(&client).await,
                KbAction::Create { name } => kb::create_kb(&client, &name).await,
                KbAction::Show { name } => kb::show_kb(&client, &name).await,
                KbAction::Delete { name, yes } => kb::delete_kb(&client, &name, yes).await,
            }
        }
        Commands::Variable { kb: target, action } => {
            let client = ApiClient::connect().await?;
            let target = target.unwrap_or(default_kb);
            match action {
                VariableAction::List => kb::list_variables(&client, &target).await,
                VariableAction::Add { definition } => {
                    kb::add_variable(&client, &target, &definition).await
                }
                VariableAction::Delete { name } => {
                    kb::delete_variable(&client, &target, &name).await
                }
            }
        }
        Commands::Rule { kb: target, action } => {
            let client = ApiClient::connect().await?;
            let target = target.unwrap_or(default_kb);
            match action {
                RuleAction::List => kb::list_rules(&client, &target).await,
                RuleAction::Add { definition } => kb::add_rule(&client, &target, &definition).await,
                RuleAction::Delete { name } => kb::delete_rule(&client, &target, &name).await,
            }
        }
        Commands::Consult { kb: target, goal } => {
            let client = ApiClient::connect().await?;
            let target = target.unwrap_or(default_kb);
            let mut console = Console::stdio();
            run_consultation(&client, &target, &goal, &mut console).await?;
            Ok(())
        }
        Commands::Forward {
            kb: target,
            facts,
            format,
        } => {
            let client = ApiClient::connect().await?;
            let target = target.unwrap_or(default_kb);
            run_forward(&client, &target, &facts, format).await
        }
        Commands::Config { action } => match action {
            ConfigAction::Get { key } => {
                match config_manager.get(&key) {
                    Some(value) => println!("{value}"),
                    None => anyhow::bail!("Unknown configuration key: {key}"),
                }
                Ok(())
            }
            ConfigAction::Set { key, value } => {
                config_manager.set(&key, &value)?;
                config_manager.save()?;
                println!("Set {key} = {value}");
                Ok(())
            }
            ConfigAction::List { section } => {
                for line in format_sections(config_manager.config(), section.as_deref()) {
                    println!("{line}");
                }
                Ok(())
            }
            ConfigAction::Path => {
                println!("{}", config_manager.path().display());
                Ok(())
            }
        },
    }
}
