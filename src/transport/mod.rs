//! Transport abstraction
//!
//! The HA layer never touches sockets directly: it dials through a
//! [`Connector`] and talks through a [`Connection`]. `tcp` is the production
//! implementation; tests swap in a scripted one.

pub mod tcp;

#[cfg(test)]
pub(crate) mod mock;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::protocol::{Command, RespValue};

/// Default connect timeout (1 second)
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 1000;

/// Network address of a server or sentinel
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl Address {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port`, `[v6]:port` or a bare host (which gets `default_port`)
    pub fn parse(s: &str, default_port: u16) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::Config("empty address".into()));
        }

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| Error::Config(format!("invalid address '{}'", s)))?;
            (host, tail.strip_prefix(':'))
        } else if s.matches(':').count() == 1 {
            let (host, port) = s.split_once(':').unwrap_or((s, ""));
            (host, Some(port))
        } else {
            (s, None)
        };

        let port = match port {
            Some(p) => p
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("invalid port in address '{}'", s)))?,
            None => default_port,
        };

        Ok(Self::new(host, port))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Per-connection handshake settings
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Database selected after connect
    pub db: Option<u32>,
    /// ACL username (Redis 6+)
    pub username: Option<String>,
    /// Password sent with AUTH
    pub password: Option<String>,
    /// Name registered with CLIENT SETNAME
    pub client_name: Option<String>,
    pub connect_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            db: None,
            username: None,
            password: None,
            client_name: None,
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
        }
    }
}

/// One live connection to one address.
///
/// Error replies must come back as `Err`: `-READONLY` as [`Error::ReadOnly`],
/// anything else as [`Error::Reply`]. `close` is synchronous and idempotent;
/// `wait_closed` resolves once teardown has finished.
#[async_trait]
pub trait Connection: Send + Sync {
    fn addr(&self) -> &Address;

    async fn execute(&self, cmd: &Command) -> Result<RespValue>;

    /// Same contract as `execute`, for subscribe-style exchanges
    async fn execute_streaming(&self, cmd: &Command) -> Result<RespValue>;

    fn close(&self);

    async fn wait_closed(&self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// Dials connections
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, addr: &Address, options: &ConnectOptions)
    -> Result<Arc<dyn Connection>>;
}

/// Identity comparison for trait-object handles
pub fn same_connection(a: &Arc<dyn Connection>, b: &Arc<dyn Connection>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
