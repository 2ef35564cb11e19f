//! Chat relay server entry point
//!
//! Usage:
//!   parlor <port>
//!
//! Binds the given TCP port on all interfaces and serves until interrupted.
//! Graceful shutdown on Ctrl+C: workers drain, every client gets a goodbye
//! line, and the log file is closed.

use std::env;
use std::net::SocketAddr;
use std::process::ExitCode;

use tracing::error;

use parlor::{ServerConfig, Supervisor};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("[ERROR] Usage: {} <port>", args[0]);
        return ExitCode::FAILURE;
    }
    let port: u16 = match args[1].parse() {
        Ok(port) => port,
        Err(_) => {
            eprintln!("[ERROR] Invalid port: {}", args[1]);
            return ExitCode::FAILURE;
        }
    };

    let config = ServerConfig {
        bind_addr: SocketAddr::from(([0, 0, 0, 0], port)),
        ..Default::default()
    };

    let supervisor = match Supervisor::bind(config).await {
        Ok(supervisor) => supervisor,
        Err(e) => {
            error!("startup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = supervisor.run().await {
        error!("server error: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
