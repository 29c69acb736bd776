//! Replybank REST API Server
//!
//! Serves the response engine over a minimal blocking HTTP server.
//! Training data goes to `storage.data_file` (or `DATA_FILE`).
//!
//! Endpoints:
//! - GET  /                  - Welcome message
//! - GET  /health            - Liveness probe
//! - POST /generate-response - Answer `{"query": "..."}`

use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use replybank::http::handle_connection;
use replybank::{ReplybankConfig, ResponseEngine};

const DEFAULT_PORT: u16 = 8000;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut config = ReplybankConfig::load_from_cwd().context("Failed to load replybank.toml")?;
    config.apply_env();

    let port = match std::env::var("PORT") {
        Ok(port) => port
            .parse::<u16>()
            .with_context(|| format!("Invalid PORT: {}", port))?,
        Err(_) => DEFAULT_PORT,
    };
    let bind_addr = format!("0.0.0.0:{}", port);

    let data_file = config.storage.data_file.clone();
    let engine = Arc::new(ResponseEngine::open(config).context("Failed to open engine")?);

    let listener =
        TcpListener::bind(&bind_addr).with_context(|| format!("Failed to bind {}", bind_addr))?;
    log::info!("Replybank server {} listening on http://{}", replybank::VERSION, bind_addr);
    log::info!("Training data stored in: {}", data_file.display());

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let engine = Arc::clone(&engine);
                thread::spawn(move || handle_connection(&engine, stream));
            }
            Err(e) => {
                log::warn!("Connection error: {}", e);
            }
        }
    }
    Ok(())
}
