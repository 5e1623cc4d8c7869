//! CLI module organization

pub mod client;
pub mod commands;
pub mod consult;
pub mod kb;
pub mod server;
pub mod status;

pub use client::ApiClient;
pub use commands::{
    Cli, Commands, ConfigAction, KbAction, OutputFormat, RuleAction, VariableAction,
};
pub use consult::{parse_facts, parse_reply, run_consultation, run_forward};
pub use server::{
    get_server_connection, is_process_running, pid_file_path, read_pid_file, remove_pid_file,
    start_server, stop_server, write_pid_file,
};
pub use status::show_status;
