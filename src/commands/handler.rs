//! Command Dispatch
//!
//! Maps RESP request arrays onto [`KvService`] calls and service results
//! onto RESP replies.
//!
//! ## Commands
//!
//! - `SET key value [ttl]` - store a value; `ttl` in seconds, `0`/omitted uses the default
//! - `GET key` - fetch a live value
//! - `DEL key` - remove a key and return its value if it was live
//! - `DUMP` - every live entry as a flat `key, value, expires_at` array
//! - `RESTORE [key value expires_at ...]` - atomically replace the whole store
//! - `EVICT` - run one eviction pass now
//! - `DBSIZE` - physically stored entries
//! - `PING`, `ECHO`, `TIME`, `INFO`, `COMMAND`, `QUIT`

use crate::clock;
use crate::protocol::RespValue;
use crate::service::{KvError, KvService};
use crate::storage::{Entry, Snapshot};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, trace};

const COMMANDS: &[&str] = &[
    "SET", "GET", "DEL", "DUMP", "RESTORE", "EVICT", "DBSIZE", "PING", "ECHO", "TIME", "INFO",
    "COMMAND", "QUIT",
];

const INVALID_TTL: &str = "ERR invalid ttl";

/// Executes commands against a shared service.
///
/// Cheap to clone; every connection gets its own copy.
#[derive(Clone)]
pub struct CommandHandler {
    service: Arc<KvService>,
    start_time: Instant,
}

impl CommandHandler {
    pub fn new(service: Arc<KvService>) -> Self {
        Self {
            service,
            start_time: Instant::now(),
        }
    }

    /// Executes one request and returns the reply.
    pub fn execute(&self, command: RespValue) -> RespValue {
        let args = match command {
            RespValue::Array(args) if !args.is_empty() => args,
            RespValue::Array(_) => return RespValue::error("ERR empty command"),
            _ => return RespValue::error("ERR invalid command format"),
        };

        let name = match as_bytes(&args[0]).and_then(|b| std::str::from_utf8(b).ok()) {
            Some(name) => name.to_ascii_uppercase(),
            None => return RespValue::error("ERR invalid command name"),
        };
        trace!(command = %name, args = args.len() - 1, "Executing command");

        self.dispatch(&name, &args[1..])
    }

    fn dispatch(&self, cmd: &str, args: &[RespValue]) -> RespValue {
        match cmd {
            "SET" => self.cmd_set(args),
            "GET" => self.cmd_get(args),
            "DEL" => self.cmd_del(args),
            "DUMP" => self.cmd_dump(args),
            "RESTORE" => self.cmd_restore(args),
            "EVICT" => self.cmd_evict(args),
            "DBSIZE" => self.cmd_dbsize(args),
            "PING" => cmd_ping(args),
            "ECHO" => cmd_echo(args),
            "TIME" => cmd_time(args),
            "INFO" => self.cmd_info(args),
            "COMMAND" => cmd_command(args),
            "QUIT" => RespValue::ok(),
            _ => RespValue::error(format!("ERR unknown command '{}'", cmd)),
        }
    }

    /// SET key value [ttl]
    fn cmd_set(&self, args: &[RespValue]) -> RespValue {
        if !(2..=3).contains(&args.len()) {
            return wrong_arity("SET");
        }
        let (Some(key), Some(value)) = (as_bytes(&args[0]), as_bytes(&args[1])) else {
            return RespValue::error("ERR invalid key or value");
        };
        let ttl = match args.get(2) {
            None => 0,
            Some(arg) => match as_integer(arg) {
                Some(ttl) => ttl,
                None => return RespValue::error(INVALID_TTL),
            },
        };

        match self.service.set(key.clone(), value.clone(), ttl) {
            Ok(()) => RespValue::ok(),
            Err(e) => kv_error(e),
        }
    }

    /// GET key
    fn cmd_get(&self, args: &[RespValue]) -> RespValue {
        let [key] = args else {
            return wrong_arity("GET");
        };
        let Some(key) = as_bytes(key) else {
            return RespValue::error("ERR invalid key");
        };

        match self.service.get(key) {
            Ok(Some(value)) => RespValue::bulk_string(value),
            Ok(None) => RespValue::null(),
            Err(e) => kv_error(e),
        }
    }

    /// DEL key
    fn cmd_del(&self, args: &[RespValue]) -> RespValue {
        let [key] = args else {
            return wrong_arity("DEL");
        };
        let Some(key) = as_bytes(key) else {
            return RespValue::error("ERR invalid key");
        };

        match self.service.delete(key) {
            Ok(Some(value)) => RespValue::bulk_string(value),
            Ok(None) => RespValue::null(),
            Err(e) => kv_error(e),
        }
    }

    /// DUMP
    fn cmd_dump(&self, args: &[RespValue]) -> RespValue {
        if !args.is_empty() {
            return wrong_arity("DUMP");
        }

        let snapshot = match self.service.dump() {
            Ok(snapshot) => snapshot,
            Err(e) => return kv_error(e),
        };

        let mut entries: Vec<(Bytes, Entry)> = snapshot.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut reply = Vec::with_capacity(entries.len() * 3);
        for (key, entry) in entries {
            reply.push(RespValue::bulk_string(key));
            reply.push(RespValue::bulk_string(entry.value));
            reply.push(RespValue::integer(entry.expires_at));
        }
        RespValue::array(reply)
    }

    /// RESTORE [key value expires_at ...]
    fn cmd_restore(&self, args: &[RespValue]) -> RespValue {
        let entries = match parse_restore_payload(args) {
            Ok(entries) => entries,
            Err(e) => return kv_error(e),
        };

        match self.service.restore(entries) {
            Ok(()) => RespValue::ok(),
            Err(e) => kv_error(e),
        }
    }

    /// EVICT
    fn cmd_evict(&self, args: &[RespValue]) -> RespValue {
        if !args.is_empty() {
            return wrong_arity("EVICT");
        }
        match self.service.evict_expired() {
            Ok(evicted) => RespValue::integer(evicted as i64),
            Err(e) => kv_error(e),
        }
    }

    /// DBSIZE
    fn cmd_dbsize(&self, _args: &[RespValue]) -> RespValue {
        match self.service.len() {
            Ok(len) => RespValue::integer(len as i64),
            Err(e) => kv_error(e),
        }
    }

    /// INFO
    fn cmd_info(&self, _args: &[RespValue]) -> RespValue {
        let stats = self.service.stats();
        let config = self.service.config();
        let keys = match self.service.len() {
            Ok(len) => len,
            Err(e) => return kv_error(e),
        };

        let info = format!(
            "# Server\r\n\
             ttlkv_version:{}\r\n\
             os:{}\r\n\
             uptime_in_seconds:{}\r\n\
             \r\n\
             # Config\r\n\
             default_ttl:{}\r\n\
             auto_remove_expired:{}\r\n\
             \r\n\
             # Keyspace\r\n\
             keys:{}\r\n\
             \r\n\
             # Stats\r\n\
             get_ops:{}\r\n\
             set_ops:{}\r\n\
             del_ops:{}\r\n\
             restores:{}\r\n\
             evicted_keys:{}\r\n",
            crate::VERSION,
            std::env::consts::OS,
            self.start_time.elapsed().as_secs(),
            config.default_ttl,
            config.auto_remove_expired as u8,
            keys,
            stats.get_ops,
            stats.set_ops,
            stats.del_ops,
            stats.restores,
            stats.evicted,
        );

        RespValue::bulk_string(info)
    }
}

/// Turns `key value expires_at` triples into a snapshot.
///
/// Nil or missing items are the wire form of an absent key or value.
fn parse_restore_payload(args: &[RespValue]) -> Result<Snapshot, KvError> {
    if args.len() % 3 != 0 {
        return Err(KvError::InvalidEntry);
    }

    let mut entries = Snapshot::with_capacity(args.len() / 3);
    for triple in args.chunks_exact(3) {
        let key = as_bytes(&triple[0]).ok_or(KvError::InvalidEntry)?;
        let value = as_bytes(&triple[1]).ok_or(KvError::InvalidEntry)?;
        let expires_at = as_integer(&triple[2]).ok_or(KvError::InvalidEntry)?;
        entries.insert(key.clone(), Entry::new(value.clone(), expires_at));
    }
    Ok(entries)
}

fn cmd_ping(args: &[RespValue]) -> RespValue {
    match args.first().and_then(as_bytes) {
        Some(msg) => RespValue::bulk_string(msg.clone()),
        None => RespValue::pong(),
    }
}

fn cmd_echo(args: &[RespValue]) -> RespValue {
    match args {
        [msg] => match as_bytes(msg) {
            Some(msg) => RespValue::bulk_string(msg.clone()),
            None => RespValue::error("ERR invalid message"),
        },
        _ => wrong_arity("ECHO"),
    }
}

fn cmd_time(_args: &[RespValue]) -> RespValue {
    let now = clock::unix_now();
    RespValue::array(vec![
        RespValue::bulk_string(now.as_secs().to_string()),
        RespValue::bulk_string(now.subsec_micros().to_string()),
    ])
}

fn cmd_command(_args: &[RespValue]) -> RespValue {
    RespValue::array(
        COMMANDS
            .iter()
            .map(|&name| RespValue::bulk_string(Bytes::from_static(name.as_bytes())))
            .collect(),
    )
}

fn as_bytes(value: &RespValue) -> Option<&Bytes> {
    match value {
        RespValue::BulkString(b) => Some(b),
        _ => None,
    }
}

fn as_integer(value: &RespValue) -> Option<i64> {
    match value {
        RespValue::Integer(n) => Some(*n),
        RespValue::BulkString(b) => std::str::from_utf8(b).ok()?.parse().ok(),
        _ => None,
    }
}

fn wrong_arity(cmd: &str) -> RespValue {
    RespValue::error(format!(
        "ERR wrong number of arguments for '{}' command",
        cmd
    ))
}

fn kv_error(err: KvError) -> RespValue {
    match err {
        KvError::InvalidTtl(_) => RespValue::error(INVALID_TTL),
        KvError::InvalidEntry => RespValue::error("ERR invalid entry"),
        KvError::EmptyKey => RespValue::error("ERR empty key"),
        KvError::Storage(e) => {
            error!(error = %e, "Storage backend failed");
            RespValue::error(format!("ERR storage failure: {}", e))
        }
    }
}
