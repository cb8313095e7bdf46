//! Client Connections
//!
//! The listener in `main.rs` accepts sockets and spawns one task per client:
//!
//! ```text
//! TcpListener::accept ──> tokio::spawn(handle_connection(..))
//!                                │
//!                                ▼
//!                       ConnectionHandler::run
//!                         read, parse, execute, reply
//! ```
//!
//! All sessions share one [`CommandHandler`](crate::commands::CommandHandler)
//! and therefore one service.

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
