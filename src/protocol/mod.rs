//! RESP Protocol
//!
//! TtlKV speaks the Redis Serialization Protocol so that `redis-cli` and
//! ordinary Redis client libraries can talk to it.
//!
//! - `types`: the [`RespValue`] enum and its wire encoding
//! - `parser`: an incremental parser for buffered socket data

pub mod parser;
pub mod types;

pub use parser::{parse_message, ParseError, ParseResult, RespParser, MAX_BULK_SIZE};
pub use types::RespValue;
