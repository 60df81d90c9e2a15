use bytes::Bytes;

use crate::error::{Error, Result};

/// RESP2 reply value as received from a server or sentinel
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// Simple string: +OK\r\n
    SimpleString(Bytes),
    /// Error: -ERR message\r\n
    Error(Bytes),
    /// Integer: :1000\r\n
    Integer(i64),
    /// Bulk string: $5\r\nhello\r\n
    BulkString(Bytes),
    /// Null bulk string: $-1\r\n
    Null,
    /// Null array: *-1\r\n
    NullArray,
    /// Array: *2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n
    Array(Vec<RespValue>),
}

impl RespValue {
    pub const OK: RespValue = RespValue::SimpleString(Bytes::from_static(b"OK"));
    pub const PONG: RespValue = RespValue::SimpleString(Bytes::from_static(b"PONG"));

    #[inline]
    pub fn ok() -> Self {
        Self::OK
    }

    #[inline]
    pub fn error(msg: &str) -> Self {
        Self::Error(Bytes::copy_from_slice(msg.as_bytes()))
    }

    #[inline]
    pub fn bulk_string(s: &str) -> Self {
        Self::BulkString(Bytes::copy_from_slice(s.as_bytes()))
    }

    #[inline]
    pub fn array(items: Vec<RespValue>) -> Self {
        Self::Array(items)
    }

    /// Text payload of a simple or bulk string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::SimpleString(b) | Self::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Integer value, accepting numeric strings as sentinels send them
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => self.as_str().and_then(|s| s.parse().ok()),
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null | Self::NullArray)
    }

    /// True for `+OK`
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::SimpleString(s) if s.as_ref() == b"OK")
    }

    /// Turn an error reply into `Err`, mapping READONLY to its own variant
    pub fn into_result(self) -> Result<RespValue> {
        match self {
            Self::Error(msg) => Err(Error::from_reply(&msg)),
            other => Ok(other),
        }
    }

    /// Serialize to RESP wire format
    pub fn serialize(&self) -> Bytes {
        let mut buf = Vec::with_capacity(64);
        self.write_to(&mut buf);
        Bytes::from(buf)
    }

    pub fn write_to(&self, buf: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(s) => {
                buf.push(b'+');
                buf.extend_from_slice(s);
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Error(e) => {
                buf.push(b'-');
                buf.extend_from_slice(e);
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Integer(n) => {
                buf.push(b':');
                buf.extend_from_slice(itoa::Buffer::new().format(*n).as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::BulkString(s) => {
                buf.push(b'$');
                buf.extend_from_slice(itoa::Buffer::new().format(s.len()).as_bytes());
                buf.extend_from_slice(b"\r\n");
                buf.extend_from_slice(s);
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Null => buf.extend_from_slice(b"$-1\r\n"),
            RespValue::NullArray => buf.extend_from_slice(b"*-1\r\n"),
            RespValue::Array(items) => {
                buf.push(b'*');
                buf.extend_from_slice(itoa::Buffer::new().format(items.len()).as_bytes());
                buf.extend_from_slice(b"\r\n");
                for item in items {
                    item.write_to(buf);
                }
            }
        }
    }
}
