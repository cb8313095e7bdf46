//! Incremental RESP Parser
//!
//! [`RespParser::parse`] looks at the bytes buffered so far and returns:
//!
//! - `Ok(Some((value, consumed)))` when a whole value is available
//! - `Ok(None)` when more bytes are needed
//! - `Err(ParseError)` when the input can never become valid
//!
//! The connection appends socket reads to its buffer, parses as many values
//! as it can, and drops the consumed prefix.
//!
//! Lines that do not start with a type prefix are treated as inline commands
//! (`GET a\r\n`), which is what `telnet`/`nc` sessions send.

use crate::protocol::types::{prefix, RespValue};
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    #[error("invalid UTF-8 in line")]
    InvalidUtf8,

    #[error("invalid length: {0}")]
    InvalidLength(i64),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Largest bulk string accepted.
pub const MAX_BULK_SIZE: usize = 64 * 1024 * 1024;

/// Deepest array nesting accepted.
pub const MAX_NESTING_DEPTH: usize = 32;

#[derive(Debug, Default)]
pub struct RespParser;

impl RespParser {
    pub fn new() -> Self {
        Self
    }

    /// Attempts to parse one value from the front of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        parse_value(buf, 0)
    }
}

/// Parses a single value with a throwaway parser.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    RespParser::new().parse(buf)
}

fn parse_value(buf: &[u8], depth: usize) -> ParseResult<Option<(RespValue, usize)>> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };
    if depth > MAX_NESTING_DEPTH {
        return Err(ParseError::ProtocolError(format!(
            "nesting deeper than {}",
            MAX_NESTING_DEPTH
        )));
    }

    match first {
        prefix::SIMPLE_STRING | prefix::ERROR | prefix::INTEGER => {
            let Some((line, consumed)) = read_line(&buf[1..]) else {
                return Ok(None);
            };
            let text = std::str::from_utf8(line).map_err(|_| ParseError::InvalidUtf8)?;
            let value = match first {
                prefix::SIMPLE_STRING => RespValue::SimpleString(text.to_string()),
                prefix::ERROR => RespValue::Error(text.to_string()),
                _ => RespValue::Integer(parse_int(line)?),
            };
            Ok(Some((value, 1 + consumed)))
        }
        prefix::BULK_STRING => parse_bulk_string(buf),
        prefix::ARRAY => parse_array(buf, depth),
        _ => parse_inline(buf),
    }
}

fn parse_bulk_string(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    let Some((line, header)) = read_line(&buf[1..]) else {
        return Ok(None);
    };
    let header = 1 + header;

    let len = match parse_int(line)? {
        -1 => return Ok(Some((RespValue::Null, header))),
        n if n < 0 => return Err(ParseError::InvalidLength(n)),
        n => n as usize,
    };
    if len > MAX_BULK_SIZE {
        return Err(ParseError::MessageTooLarge {
            size: len,
            max: MAX_BULK_SIZE,
        });
    }

    let total = header + len + 2;
    if buf.len() < total {
        return Ok(None);
    }
    if &buf[header + len..total] != b"\r\n" {
        return Err(ParseError::ProtocolError(
            "bulk string not terminated by CRLF".to_string(),
        ));
    }

    let data = Bytes::copy_from_slice(&buf[header..header + len]);
    Ok(Some((RespValue::BulkString(data), total)))
}

fn parse_array(buf: &[u8], depth: usize) -> ParseResult<Option<(RespValue, usize)>> {
    let Some((line, header)) = read_line(&buf[1..]) else {
        return Ok(None);
    };
    let mut consumed = 1 + header;

    let count = match parse_int(line)? {
        -1 => return Ok(Some((RespValue::Null, consumed))),
        n if n < 0 => return Err(ParseError::InvalidLength(n)),
        n => n as usize,
    };

    // Cap the preallocation; the count is untrusted input
    let mut items = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        match parse_value(&buf[consumed..], depth + 1)? {
            Some((item, used)) => {
                items.push(item);
                consumed += used;
            }
            None => return Ok(None),
        }
    }

    Ok(Some((RespValue::Array(items), consumed)))
}

fn parse_inline(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    let Some((line, consumed)) = read_line(buf) else {
        return Ok(None);
    };
    let text = std::str::from_utf8(line).map_err(|_| ParseError::InvalidUtf8)?;

    let words: Vec<RespValue> = text
        .split_whitespace()
        .map(|word| RespValue::BulkString(Bytes::copy_from_slice(word.as_bytes())))
        .collect();
    if words.is_empty() {
        return Err(ParseError::ProtocolError("empty inline command".to_string()));
    }

    Ok(Some((RespValue::Array(words), consumed)))
}

/// Splits off the first CRLF-terminated line, returning it without the
/// terminator along with the number of bytes consumed including it.
fn read_line(buf: &[u8]) -> Option<(&[u8], usize)> {
    buf.windows(2)
        .position(|pair| pair == b"\r\n")
        .map(|pos| (&buf[..pos], pos + 2))
}

fn parse_int(line: &[u8]) -> ParseResult<i64> {
    let text = std::str::from_utf8(line).map_err(|_| ParseError::InvalidUtf8)?;
    text.parse()
        .map_err(|_| ParseError::InvalidInteger(text.to_string()))
}
