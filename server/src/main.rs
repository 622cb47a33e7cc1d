use clap::Parser;
use log::{error, info};
use server::admin::Console;
use server::config::Args;
use server::keepalive;
use server::lobby::Lobby;
use server::network::Server;
use server::observer::LogObserver;
use std::sync::Arc;
use tokio::sync::Mutex;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=debug for detailed logging, RUST_LOG=audit=trace for the message audit");
    }

    let config = Args::parse().into_config()?;
    info!("Starting game room server on {}", config.address());

    let lobby = Arc::new(Mutex::new(Lobby::from_config(&config, Arc::new(LogObserver))?));
    let server = Server::bind(&config.address(), Arc::clone(&lobby)).await?;

    let server_handle = tokio::spawn(server.run());

    let keep_alive_handle = if config.keep_alive {
        Some(tokio::spawn(keepalive::run(
            Arc::clone(&lobby),
            config.keep_alive_interval(),
        )))
    } else {
        info!("Keep-alive monitor disabled");
        None
    };

    let console = Console::new(Arc::clone(&lobby), config.user_store.clone());

    // Handle shutdown gracefully
    tokio::select! {
        result = server_handle => {
            match result {
                Ok(Err(e)) => error!("Server stopped: {}", e),
                Err(e) => error!("Server task panicked: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = console.run() => {
            info!("Quit requested from the console");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    if let Some(handle) = keep_alive_handle {
        handle.abort();
    }

    if let Err(e) = lobby.lock().await.users().save(&config.user_store) {
        error!("Could not save users: {}", e);
    }

    Ok(())
}
