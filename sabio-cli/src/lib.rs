//! Sabio CLI library: HTTP API, configuration and command implementations.

pub mod api;
pub mod cli;
pub mod config;
pub mod interactive;

use anyhow::Result;
use tokio::net::TcpListener;

/// Check if a port is available
pub async fn is_port_available(port: u16) -> bool {
    TcpListener::bind(format!("127.0.0.1:{port}")).await.is_ok()
}

/// Find an available port starting from the preferred port
pub async fn find_available_port(preferred_port: u16) -> Result<u16> {
    if is_port_available(preferred_port).await {
        return Ok(preferred_port);
    }

    // If preferred port is taken, try nearby ports
    for offset in 1..=100 {
        let Some(port) = preferred_port.checked_add(offset) else {
            break;
        };
        if is_port_available(port).await {
            return Ok(port);
        }
    }

    Err(anyhow::anyhow!(
        "No available ports found near {preferred_port}"
    ))
}
