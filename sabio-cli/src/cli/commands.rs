//! CLI command definitions

use clap::{Parser, Subcommand};

/// Sabio certainty-factor expert-system shell
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Set the log level
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Main command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the Sabio server
    Start {
        /// Server port (automatically finds free port if default occupied)
        #[arg(short, long, default_value = "7878")]
        port: u16,
    },

    /// Stop the running server
    Stop,

    /// Show server status and registered knowledge bases
    Status {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Knowledge-base management
    Kb {
        /// Knowledge-base operation to perform
        #[command(subcommand)]
        action: KbAction,
    },

    /// Variable management within a knowledge base
    Variable {
        /// Knowledge base (defaults to `knowledge_bases.default_kb`)
        #[arg(long)]
        kb: Option<String>,

        /// Variable operation to perform
        #[command(subcommand)]
        action: VariableAction,
    },

    /// Rule management within a knowledge base
    Rule {
        /// Knowledge base (defaults to `knowledge_bases.default_kb`)
        #[arg(long)]
        kb: Option<String>,

        /// Rule operation to perform
        #[command(subcommand)]
        action: RuleAction,
    },

    /// Interactive backward-chaining consultation
    Consult {
        /// Knowledge base (defaults to `knowledge_bases.default_kb`)
        #[arg(long)]
        kb: Option<String>,

        /// Goal variable to establish
        goal: String,
    },

    /// Forward-chain from initial facts
    Forward {
        /// Knowledge base (defaults to `knowledge_bases.default_kb`)
        #[arg(long)]
        kb: Option<String>,

        /// Initial facts as `variable=value`
        facts: Vec<String>,

        /// Output format (json, table)
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Configuration management
    Config {
        /// Configuration action to perform
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Output format for inference results
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format
    Json,
    /// Table format
    Table,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "table" => Ok(Self::Table),
            _ => Err(format!("Invalid format: {s}. Valid options: json, table")),
        }
    }
}

/// Knowledge-base operations
#[derive(Subcommand)]
pub enum KbAction {
    /// List knowledge bases
    List,

    /// Create an empty knowledge base
    Create {
        /// Knowledge-base name
        name: String,
    },

    /// Show variables and rules of a knowledge base
    Show {
        /// Knowledge-base name
        name: String,
    },

    /// Delete a knowledge base with all its variables and rules
    Delete {
        /// Knowledge-base name
        name: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Variable operations
#[derive(Subcommand)]
pub enum VariableAction {
    /// List variables
    List,

    /// Declare a variable from its JSON definition
    Add {
        /// e.g. '{"name":"febre","kind":"categorical","domain":["sim","não"]}'
        definition: String,
    },

    /// Delete a variable no rule references
    Delete {
        /// Variable name
        name: String,
    },
}

/// Rule operations
#[derive(Subcommand)]
pub enum RuleAction {
    /// List rules in declaration order
    List,

    /// Append a rule from its JSON definition
    Add {
        /// e.g. '{"name":"R1","antecedent":[{"variable":"febre","operator":"==","literal":"sim"}],
        /// "consequent":[{"variable":"gripe","literal":"sim","certainty":0.8}]}'
        definition: String,
    },

    /// Delete a rule
    Delete {
        /// Rule name
        name: String,
    },
}

/// Configuration management operations
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },

    /// Show configuration settings
    List {
        /// Show only specified section
        #[arg(long)]
        section: Option<String>,
    },

    /// Show configuration file location
    Path,
}
