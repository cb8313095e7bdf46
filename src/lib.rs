//! # TtlKV - A Key-Value Store Where Every Entry Expires
//!
//! TtlKV maps byte-string keys to byte-string values. Every entry carries an
//! absolute expiration time; once it passes, the entry is invisible to
//! readers and a background reaper deletes it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                                TtlKV                                 │
//! │                                                                      │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐               │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │               │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │               │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘               │
//! │                                               │                      │
//! │                                               ▼                      │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────┐     │
//! │  │   Clock     │───>│               KvService                  │     │
//! │  └─────────────┘    │  ┌────────────────────────────────────┐  │     │
//! │                     │  │  Guarded (one RwLock)              │  │     │
//! │                     │  │   ┌──────────────┬──────────────┐  │  │     │
//! │                     │  │   │MemoryStorage │SqliteStorage │  │  │     │
//! │                     │  │   └──────────────┴──────────────┘  │  │     │
//! │                     │  └────────────────────────────────────┘  │     │
//! │                     └──────────────────────────────────────────┘     │
//! │                                               ▲                      │
//! │                     ┌─────────────────────────┴──────────────┐       │
//! │                     │        Reaper (Tokio task)             │       │
//! │                     └────────────────────────────────────────┘       │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use ttlkv::commands::CommandHandler;
//! use ttlkv::connection::{handle_connection, ConnectionStats};
//! use ttlkv::service::{KvService, Reaper, ReaperConfig, ServiceConfig};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = Arc::new(KvService::in_memory(ServiceConfig::default()));
//!     let _reaper = Reaper::start(Arc::clone(&service), ReaperConfig::default());
//!
//!     let commands = CommandHandler::new(service);
//!     let stats = Arc::new(ConnectionStats::new());
//!     let listener = TcpListener::bind("127.0.0.1:6380").await?;
//!
//!     loop {
//!         let (stream, addr) = listener.accept().await?;
//!         tokio::spawn(handle_connection(stream, addr, commands.clone(), Arc::clone(&stats)));
//!     }
//! }
//! ```
//!
//! ## Expiration
//!
//! An entry is live while `now <= expires_at`, in whole epoch seconds.
//!
//! 1. **Lazy**: `GET` and `DUMP` skip expired entries without deleting them
//! 2. **Active**: the [`Reaper`](service::Reaper) periodically deletes them
//!
//! `DEL` removes an expired entry too, but reports it as missing.
//!
//! ## Module Overview
//!
//! - [`clock`]: time source, real or manual
//! - [`storage`]: the `Storage` trait and its in-memory and SQLite backends
//! - [`service`]: the locked key-value service and the reaper
//! - [`protocol`]: RESP types and parser
//! - [`commands`]: RESP command dispatch
//! - [`connection`]: per-client sessions
//! - [`config`]: command-line configuration

pub mod clock;
pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod service;
pub mod storage;

pub use commands::CommandHandler;
pub use config::{CliAction, Config};
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{ParseError, RespParser, RespValue};
pub use service::{KvError, KvService, Reaper, ReaperConfig, ServiceConfig};
pub use storage::{Entry, Snapshot, Storage, StorageError};

/// The default port TtlKV listens on (one above Redis)
pub const DEFAULT_PORT: u16 = 6380;

/// The default host TtlKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of TtlKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
