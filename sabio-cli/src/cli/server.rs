//! Server lifecycle: start, stop and PID-file bookkeeping

use anyhow::{Context, Result};
use sabio_core::{KbRegistry, SessionManager};
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::api::{ApiState, create_api_routes};
use crate::config::CliConfig;
use crate::find_available_port;

/// Get the path to the PID file
#[must_use]
pub fn pid_file_path() -> PathBuf {
    std::env::var("SABIO_PID_PATH")
        .map_or_else(|_| std::env::temp_dir().join("sabio.pid"), PathBuf::from)
}

/// Check that a Sabio server is running and return its HTTP port
///
/// # Errors
///
/// Returns error if server is not running or PID file cannot be read
pub async fn get_server_connection() -> Result<u16> {
    let pid_path = pid_file_path();
    if !pid_path.exists() {
        return Err(anyhow::anyhow!(
            "No running Sabio server found\n\
             Start a server first with: sabio start"
        ));
    }

    let (pid, port) = read_pid_file().with_context(|| {
        "Failed to read server information. The server may have crashed.\n\
         Try: sabio status  # to check server health\n\
         Or:  sabio start   # to start a new server"
    })?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?;
    let health_url = format!("http://127.0.0.1:{port}/health");

    match client.get(&health_url).send().await {
        Ok(response) if response.status().is_success() => Ok(port),
        Ok(_) => Err(anyhow::anyhow!(
            "Server found but not responding properly (PID: {pid})\n\
             Try: sabio stop && sabio start"
        )),
        Err(_) => Err(anyhow::anyhow!(
            "Server found but unreachable (PID: {pid})\n\
             The server process may have crashed or is not listening\n\
             Try: sabio stop && sabio start"
        )),
    }
}

/// Write PID and port information to file
///
/// # Errors
///
/// Returns error if PID file cannot be written
pub fn write_pid_file(port: u16) -> Result<()> {
    let pid_path = pid_file_path();
    let content = format!("{}:{}", std::process::id(), port);
    fs::write(&pid_path, content)
        .with_context(|| format!("Failed to write PID file: {}", pid_path.display()))?;
    info!(path = %pid_path.display(), "server info written");
    Ok(())
}

/// Read PID and port from file
///
/// # Errors
///
/// Returns error if PID file cannot be read or parsed
pub fn read_pid_file() -> Result<(u32, u16)> {
    let pid_path = pid_file_path();
    let content = fs::read_to_string(&pid_path)
        .with_context(|| format!("Failed to read PID file: {}", pid_path.display()))?;

    let (pid, port) = content
        .trim()
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("Invalid PID file format"))?;
    let pid: u32 = pid.parse().context("Invalid PID in file")?;
    let port: u16 = port.parse().context("Invalid port in file")?;

    Ok((pid, port))
}

/// Remove PID file
///
/// # Errors
///
/// Returns error if PID file cannot be removed
pub fn remove_pid_file() -> Result<()> {
    let pid_path = pid_file_path();
    if pid_path.exists() {
        fs::remove_file(&pid_path)
            .with_context(|| format!("Failed to remove PID file: {}", pid_path.display()))?;
        info!("removed server info file");
    }
    Ok(())
}

/// Check if a process is running
#[must_use]
pub fn is_process_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .output()
            .is_ok_and(|output| output.status.success())
    }

    #[cfg(windows)]
    {
        std::process::Command::new("tasklist")
            .args(["/FI", &format!("PID eq {pid}")])
            .output()
            .is_ok_and(|output| String::from_utf8_lossy(&output.stdout).contains(&pid.to_string()))
    }
}

/// Bootstrap the configured knowledge bases and serve the API until a
/// shutdown signal arrives
///
/// # Errors
///
/// Returns error if no port can be bound or the server fails
pub async fn start_server(preferred_port: u16, config: &CliConfig) -> Result<()> {
    let registry = Arc::new(KbRegistry::in_memory());
    registry
        .ensure_kbs(config.knowledge_bases.bootstrap_kbs.iter().cloned())
        .await
        .context("Failed to create bootstrap knowledge bases")?;
    let sessions = Arc::new(SessionManager::with_timeout(
        config.inference,
        config.sessions.idle_timeout(),
    ));
    let state = ApiState::new(registry, Arc::clone(&sessions), config.inference);

    let port = find_available_port(preferred_port)
        .await
        .context("Failed to find available port")?;
    if port != preferred_port {
        warn!(
            "Port {} was occupied, using port {} instead",
            preferred_port, port
        );
    }

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    write_pid_file(port)?;

    let reaper = tokio::spawn(reap_idle_sessions(sessions));
    let app = create_api_routes().with_state(state);

    println!("Sabio listening on: http://127.0.0.1:{port}");
    println!("Health endpoint: http://127.0.0.1:{port}/health");
    info!(port, "Sabio server started");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error");

    reaper.abort();
    remove_pid_file()?;
    info!("Sabio server stopped");
    served
}

async fn reap_idle_sessions(sessions: Arc<SessionManager>) {
    let period = sessions
        .timeout()
        .clamp(Duration::from_secs(1), Duration::from_secs(60));
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        sessions.cleanup_idle_sessions();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(%err, "could not listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(%err, "could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}

/// Stop the Sabio server
///
/// # Errors
///
/// Returns error if server cannot be stopped
pub async fn stop_server() -> Result<()> {
    let pid_path = pid_file_path();

    if !pid_path.exists() {
        println!("No running Sabio server found");
        return Ok(());
    }

    let (pid, port) = read_pid_file().with_context(|| "Failed to read server information")?;

    if !is_process_running(pid) {
        warn!(pid, "server process not found, cleaning up files");
        remove_pid_file()?;
        return Ok(());
    }

    info!(pid, port, "stopping Sabio server");

    #[cfg(unix)]
    {
        std::process::Command::new("kill")
            .args(["-TERM", &pid.to_string()])
            .status()
            .context("Failed to send TERM signal")?;

        for _ in 0..10 {
            if !is_process_running(pid) {
                info!("server stopped gracefully");
                remove_pid_file()?;
                return Ok(());
            }
            sleep(Duration::from_millis(500)).await;
        }

        warn!("graceful shutdown timed out, using KILL");
        std::process::Command::new("kill")
            .args(["-KILL", &pid.to_string()])
            .status()
            .context("Failed to send KILL signal")?;
    }

    #[cfg(windows)]
    {
        std::process::Command::new("taskkill")
            .args(["/F", "/PID", &pid.to_string()])
            .status()
            .context("Failed to kill process on Windows")?;
    }

    remove_pid_file()?;
    println!("Sabio server stopped");
    Ok(())
}
