//! TtlKV server entry point.
//!
//! Parses flags, opens the configured backend, starts the reaper and serves
//! RESP clients until Ctrl+C.

use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use ttlkv::clock::SystemClock;
use ttlkv::commands::CommandHandler;
use ttlkv::config::{self, CliAction, Config};
use ttlkv::connection::{handle_connection, ConnectionStats};
use ttlkv::service::{KvService, Reaper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::from_args(std::env::args().skip(1)) {
        Ok(CliAction::Run(config)) => config,
        Ok(CliAction::Help) => {
            println!("{}", config::help_text());
            return Ok(());
        }
        Ok(CliAction::Version) => {
            println!("TtlKV version {}", ttlkv::VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("{}", config::help_text());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    print_banner(&config);

    let storage = config
        .open_storage()
        .with_context(|| format!("failed to open {:?} storage", config.backend))?;
    let service = Arc::new(KvService::new(
        storage,
        Arc::new(SystemClock),
        config.service_config(),
    ));
    info!(
        backend = ?config.backend,
        default_ttl = config.default_ttl,
        auto_remove_expired = config.auto_remove_expired,
        "Service initialized"
    );

    let reaper = Reaper::start(Arc::clone(&service), config.reaper_config());

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    info!("Listening on {}", config.bind_address());

    let commands = CommandHandler::new(service);
    let stats = Arc::new(ConnectionStats::new());

    tokio::select! {
        _ = accept_loop(listener, commands, stats) => {}
        result = signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Shutdown signal received, stopping server..."),
                Err(e) => error!(error = %e, "Failed to listen for Ctrl+C, stopping server..."),
            }
        }
    }

    reaper.stop();
    info!("Server shutdown complete");
    Ok(())
}

async fn accept_loop(listener: TcpListener, commands: CommandHandler, stats: Arc<ConnectionStats>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(handle_connection(
                    stream,
                    addr,
                    commands.clone(),
                    Arc::clone(&stats),
                ));
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

fn print_banner(config: &Config) {
    println!(
        r#"
  _   _   _ _
 | |_| |_| | | ____   __
 | __| __| | |/ /\ \ / /
 | |_| |_| |   <  \ V /
  \__|\__|_|_|\_\  \_/

TtlKV v{} - every entry expires
──────────────────────────────────────
Server starting on {}
Backend: {:?}, default TTL: {}s

Use Ctrl+C to shutdown gracefully.
"#,
        ttlkv::VERSION,
        config.bind_address(),
        config.backend,
        config.default_ttl,
    );
}
