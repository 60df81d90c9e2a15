use std::fmt;

use bytes::{Buf, Bytes, BytesMut};

use super::types::RespValue;
use crate::error::{Error, Result};

/// Largest bulk string or array length accepted from a server (512MB)
pub const MAX_REPLY_LEN: i64 = 512 * 1024 * 1024;

/// Incremental RESP2 reply decoder
pub struct Parser;

impl Parser {
    /// Parse one complete reply from the front of `buf`.
    /// Returns None if the buffer doesn't hold a complete reply yet.
    /// Advances the buffer past the parsed data.
    #[inline]
    pub fn parse(buf: &mut BytesMut) -> Result<Option<RespValue>> {
        match Self::parse_value(buf)? {
            Some((value, consumed)) => {
                buf.advance(consumed);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Parse value, returning (value, bytes_consumed) or None if incomplete
    fn parse_value(buf: &[u8]) -> Result<Option<(RespValue, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        match buf[0] {
            b'+' => Ok(Self::parse_line(buf).map(|(s, n)| (RespValue::SimpleString(s), n))),
            b'-' => Ok(Self::parse_line(buf).map(|(s, n)| (RespValue::Error(s), n))),
            b':' => Self::parse_integer(buf),
            b'$' => Self::parse_bulk_string(buf),
            b'*' => Self::parse_array(buf),
            other => Err(Error::Protocol(format!(
                "unexpected reply type byte {:?}",
                other as char
            ))),
        }
    }

    /// Find \r\n in buffer, return position of \r
    #[inline]
    fn find_crlf(buf: &[u8]) -> Option<usize> {
        memchr::memchr(b'\r', buf).and_then(|pos| {
            if pos + 1 < buf.len() && buf[pos + 1] == b'\n' {
                Some(pos)
            } else {
                None
            }
        })
    }

    fn parse_line(buf: &[u8]) -> Option<(Bytes, usize)> {
        Self::find_crlf(buf).map(|pos| (Bytes::copy_from_slice(&buf[1..pos]), pos + 2))
    }

    /// Length or integer header, returning (value, bytes_consumed)
    fn parse_header(buf: &[u8], what: &str) -> Result<Option<(i64, usize)>> {
        let crlf_pos = match Self::find_crlf(buf) {
            Some(pos) => pos,
            None => return Ok(None),
        };

        let n = std::str::from_utf8(&buf[1..crlf_pos])
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| Error::Protocol(format!("invalid {}", what)))?;

        Ok(Some((n, crlf_pos + 2)))
    }

    fn parse_integer(buf: &[u8]) -> Result<Option<(RespValue, usize)>> {
        Ok(Self::parse_header(buf, "integer")?.map(|(n, used)| (RespValue::Integer(n), used)))
    }

    fn parse_bulk_string(buf: &[u8]) -> Result<Option<(RespValue, usize)>> {
        let (len, data_start) = match Self::parse_header(buf, "bulk length")? {
            Some(header) => header,
            None => return Ok(None),
        };

        if len == -1 {
            return Ok(Some((RespValue::Null, data_start)));
        }
        if len < 0 {
            return Err(Error::Protocol("negative bulk length".into()));
        }
        if len > MAX_REPLY_LEN {
            return Err(Error::Protocol(format!("bulk length {} too large", len)));
        }

        let data_end = data_start + len as usize;
        let total_len = data_end + 2; // +2 for trailing \r\n

        if buf.len() < total_len {
            return Ok(None);
        }
        if &buf[data_end..total_len] != b"\r\n" {
            return Err(Error::Protocol("bulk string not terminated by CRLF".into()));
        }

        let data = Bytes::copy_from_slice(&buf[data_start..data_end]);
        Ok(Some((RespValue::BulkString(data), total_len)))
    }

    fn parse_array(buf: &[u8]) -> Result<Option<(RespValue, usize)>> {
        let (len, mut offset) = match Self::parse_header(buf, "array length")? {
            Some(header) => header,
            None => return Ok(None),
        };

        if len == -1 {
            return Ok(Some((RespValue::NullArray, offset)));
        }
        if len < 0 {
            return Err(Error::Protocol("negative array length".into()));
        }
        if len > MAX_REPLY_LEN {
            return Err(Error::Protocol(format!("array length {} too large", len)));
        }

        // Every element takes at least three bytes, so the buffer bounds the count
        let mut items = Vec::with_capacity((len as usize).min(buf.len() / 3));
        for _ in 0..len {
            match Self::parse_value(&buf[offset..])? {
                Some((value, consumed)) => {
                    items.push(value);
                    offset += consumed;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((RespValue::Array(items), offset)))
    }
}

/// A request: command name plus arguments, sent as a RESP array of bulk strings
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: Bytes,
    pub args: Vec<Bytes>,
}

impl Command {
    pub fn new(name: impl AsRef<[u8]>) -> Self {
        Self {
            name: Bytes::copy_from_slice(name.as_ref()),
            args: Vec::new(),
        }
    }

    /// Append an argument
    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.args.push(Bytes::copy_from_slice(arg.as_ref()));
        self
    }

    /// Shorthand for `SENTINEL <subcommand> [args...]`
    pub fn sentinel(subcommand: &str) -> Self {
        Self::new("SENTINEL").arg(subcommand)
    }

    /// Extract command from a RESP array (server side of a test responder)
    pub fn from_resp(value: RespValue) -> Result<Self> {
        match value {
            RespValue::Array(items) if !items.is_empty() => {
                let mut parts = items.into_iter().map(|v| match v {
                    RespValue::BulkString(b) | RespValue::SimpleString(b) => Ok(b),
                    RespValue::Integer(n) => Ok(Bytes::from(n.to_string())),
                    _ => Err(Error::Protocol("invalid argument type".into())),
                });

                let name = match parts.next() {
                    Some(name) => name?,
                    None => return Err(Error::Protocol("expected array".into())),
                };
                let args = parts.collect::<Result<Vec<Bytes>>>()?;

                Ok(Command { name, args })
            }
            _ => Err(Error::Protocol("expected array".into())),
        }
    }

    /// Check if command name matches (case-insensitive)
    #[inline]
    pub fn is_command(&self, cmd: &[u8]) -> bool {
        self.name.eq_ignore_ascii_case(cmd)
    }

    /// Encode as a RESP array of bulk strings
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(b'*');
        buf.extend_from_slice(itoa::Buffer::new().format(self.args.len() + 1).as_bytes());
        buf.extend_from_slice(b"\r\n");

        for part in std::iter::once(&self.name).chain(self.args.iter()) {
            buf.push(b'$');
            buf.extend_from_slice(itoa::Buffer::new().format(part.len()).as_bytes());
            buf.extend_from_slice(b"\r\n");
            buf.extend_from_slice(part);
            buf.extend_from_slice(b"\r\n");
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.name))?;
        for arg in &self.args {
            write!(f, " {}", String::from_utf8_lossy(arg))?;
        }
        Ok(())
    }
}
