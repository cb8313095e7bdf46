//! Command Layer
//!
//! Sits between the connection and the service:
//!
//! ```text
//! RespValue ──> CommandHandler::execute ──> KvService ──> RespValue
//! ```
//!
//! Domain errors become `-ERR` replies; absence becomes a nil reply.

pub mod handler;

pub use handler::CommandHandler;
