//! Per-Client Session
//!
//! Each accepted socket gets one [`ConnectionHandler`] running in its own
//! task:
//!
//! ```text
//!   read_buf ──> buffer ──> parse* ──> execute* ──> replies ──> write + flush
//!      ▲                                                             │
//!      └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every complete request already sitting in the buffer is executed before
//! the replies are flushed, so pipelined clients get their answers in a
//! single write.
//!
//! A malformed request gets an `-ERR` reply and the session ends; there is
//! no way to resynchronise a RESP stream after garbage. `QUIT` is answered
//! with `+OK` and then closes the socket.

use crate::commands::CommandHandler;
use crate::protocol::{ParseError, RespParser, RespValue, MAX_BULK_SIZE};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// Unparsed bytes a client may have buffered before it is cut off.
///
/// Large enough for a `SET` whose key and value are both at the parser's
/// bulk limit, so anything the parser accepts can finish arriving.
const MAX_PENDING_BYTES: usize = 2 * MAX_BULK_SIZE + 1024;

const READ_CHUNK: usize = 4096;

/// Counters shared by every session.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    pub connections_accepted: AtomicU64,
    pub active_connections: AtomicU64,
    pub commands_processed: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    fn closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed request: {0}")]
    Protocol(#[from] ParseError),

    #[error("client closed the connection mid-request")]
    UnexpectedEof,

    #[error("request exceeds {max} buffered bytes")]
    RequestTooLarge { max: usize },
}

/// What to do after a batch of requests has been answered.
#[derive(Debug, PartialEq, Eq)]
enum Next {
    Read,
    Close,
}

pub struct ConnectionHandler {
    stream: TcpStream,
    addr: SocketAddr,
    input: BytesMut,
    output: BytesMut,
    parser: RespParser,
    commands: CommandHandler,
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandler {
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        commands: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.opened();
        Self {
            stream,
            addr,
            input: BytesMut::with_capacity(READ_CHUNK),
            output: BytesMut::with_capacity(READ_CHUNK),
            parser: RespParser::new(),
            commands,
            stats,
        }
    }

    /// Serves the client until it disconnects, sends `QUIT`, or misbehaves.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        debug!(client = %self.addr, "Session started");
        let result = self.serve().await;
        self.stats.closed();
        result
    }

    async fn serve(&mut self) -> Result<(), ConnectionError> {
        loop {
            let next = self.answer_buffered();
            self.flush().await?;

            if next == Next::Close {
                return Ok(());
            }

            if self.input.len() > MAX_PENDING_BYTES {
                return Err(ConnectionError::RequestTooLarge {
                    max: MAX_PENDING_BYTES,
                });
            }

            self.input.reserve(READ_CHUNK);
            if self.stream.read_buf(&mut self.input).await? == 0 {
                return if self.input.is_empty() {
                    Ok(())
                } else {
                    Err(ConnectionError::UnexpectedEof)
                };
            }
        }
    }

    /// Executes every complete request in the input buffer and queues the
    /// replies.
    fn answer_buffered(&mut self) -> Next {
        loop {
            let request = match self.parser.parse(&self.input) {
                Ok(Some((request, consumed))) => {
                    let _ = self.input.split_to(consumed);
                    request
                }
                Ok(None) => return Next::Read,
                Err(e) => {
                    warn!(client = %self.addr, error = %e, "Malformed request, closing");
                    RespValue::error(format!("ERR protocol error: {}", e)).encode(&mut self.output);
                    self.input.clear();
                    return Next::Close;
                }
            };

            let quit = is_quit(&request);
            let reply = self.commands.execute(request);
            self.stats.commands_processed.fetch_add(1, Ordering::Relaxed);
            reply.encode(&mut self.output);

            if quit {
                return Next::Close;
            }
        }
    }

    async fn flush(&mut self) -> Result<(), ConnectionError> {
        if self.output.is_empty() {
            return Ok(());
        }
        let reply = self.output.split().freeze();
        self.stream.write_all(&reply).await?;
        trace!(client = %self.addr, bytes = reply.len(), "Replies sent");
        Ok(())
    }
}

fn is_quit(request: &RespValue) -> bool {
    match request {
        RespValue::Array(args) => matches!(
            args.first(),
            Some(RespValue::BulkString(name)) if name.eq_ignore_ascii_case(b"QUIT")
        ),
        _ => false,
    }
}

/// Runs one session to completion, logging how it ended.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    commands: CommandHandler,
    stats: Arc<ConnectionStats>,
) {
    match ConnectionHandler::new(stream, addr, commands, stats).run().await {
        Ok(()) => debug!(client = %addr, "Session closed"),
        Err(ConnectionError::Io(e)) if e.kind() == std::io::ErrorKind::ConnectionReset => {
            debug!(client = %addr, "Connection reset by client")
        }
        Err(e) => info!(client = %addr, error = %e, "Session ended with error"),
    }
}
