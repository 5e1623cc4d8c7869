//! Server status and health checking

use crate::cli::client::ApiClient;
use crate::cli::server::{is_process_running, pid_file_path, read_pid_file};
use anyhow::Result;
use serde_json::json;
use std::time::Instant;

/// Show server process, health and registered knowledge bases
///
/// # Errors
///
/// Returns error only if JSON output cannot be rendered
pub async fn show_status(json_output: bool) -> Result<()> {
    let pid_path = pid_file_path();

    if !pid_path.exists() {
        if json_output {
            println!("{}", json!({ "running": false }));
        } else {
            println!("Status: No running server found");
            println!("Start with: sabio start");
        }
        return Ok(());
    }

    let (pid, port) = match read_pid_file() {
        Ok(info) => info,
        Err(e) => {
            println!("Status: Server info corrupted");
            println!("Error: {e}");
            println!("Try: sabio stop && sabio start");
            return Ok(());
        }
    };

    let running = is_process_running(pid);
    let client = ApiClient::new(port);
    let start_time = Instant::now();
    let health = if running {
        client.health().await.ok()
    } else {
        None
    };
    let response_time = start_time.elapsed();
    let kbs = if health.is_some() {
        client.list_kbs().await.unwrap_or_default()
    } else {
        Vec::new()
    };

    if json_output {
        let report = json!({
            "running": running,
            "pid": pid,
            "port": port,
            "healthy": health.is_some(),
            "health": health,
            "knowledge_bases": kbs,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Sabio Server Status");
    println!("═══════════════════════════════════════");
    println!("Process ID: {pid}");
    println!("HTTP Port: {port}");

    if !running {
        println!("Process Status: Not running (stale PID file)");
        println!("Cleanup needed: sabio stop");
        return Ok(());
    }
    println!("Process Status: Running");

    match health {
        Some(health) => {
            println!("HTTP Health: Responding ({response_time:?})");
            if let Some(version) = health["version"].as_str() {
                println!("Version: {version}");
            }
            if kbs.is_empty() {
                println!("Knowledge bases: none");
            } else {
                println!("Knowledge bases: {}", kbs.join(", "));
            }
        }
        None => println!("HTTP Health: Unreachable"),
    }

    println!("\nUseful commands:");
    println!("  sabio kb list                 # List knowledge bases");
    println!("  sabio consult <goal>          # Start a consultation");
    println!("  sabio forward var=value ...   # Forward-chain from facts");
    println!("  sabio stop                    # Stop the server");

    Ok(())
}
