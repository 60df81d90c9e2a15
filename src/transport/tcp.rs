//! Plain TCP transport
//!
//! One request in flight per connection; callers that need concurrency hold
//! several connections. Closing wakes any request blocked on the socket.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard, watch};
use tokio::time::timeout;

use super::{Address, ConnectOptions, Connection, Connector};
use crate::error::{Error, Result};
use crate::protocol::{Command, Parser, RespValue};

/// Initial read buffer size
const READ_BUF_SIZE: usize = 4096;

/// Socket plus its unparsed input
struct Link {
    stream: TcpStream,
    buf: BytesMut,
}

impl Link {
    async fn request(&mut self, cmd: &Command) -> Result<RespValue> {
        let mut out = Vec::with_capacity(64);
        cmd.encode(&mut out);
        self.stream.write_all(&out).await?;
        self.read_reply().await
    }

    async fn read_reply(&mut self) -> Result<RespValue> {
        loop {
            if let Some(value) = Parser::parse(&mut self.buf)? {
                return Ok(value);
            }

            let n = self.stream.read_buf(&mut self.buf).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }
}

/// Connection over a tokio `TcpStream`
pub struct TcpConnection {
    addr: Address,
    link: Mutex<Option<Link>>,
    closed: watch::Sender<bool>,
}

impl TcpConnection {
    fn new(addr: Address, stream: TcpStream) -> Self {
        Self {
            addr,
            link: Mutex::new(Some(Link {
                stream,
                buf: BytesMut::with_capacity(READ_BUF_SIZE),
            })),
            closed: watch::Sender::new(false),
        }
    }

    async fn roundtrip(&self, cmd: &Command) -> Result<RespValue> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let closed_rx = self.closed.subscribe();
        let mut exchange = Exchange {
            link: self.link.lock().await,
            closed: &self.closed,
            complete: false,
        };
        let link = exchange.link.as_mut().ok_or(Error::ConnectionClosed)?;

        let result = tokio::select! {
            res = link.request(cmd) => res,
            _ = closed_signal(closed_rx) => Err(Error::ConnectionClosed),
        };

        // A failed exchange leaves the stream mid-reply; it can't be reused
        match &result {
            Err(e) if e.is_connection_layer() => {
                log::debug!("Dropping connection to {}: {}", self.addr, e);
            }
            _ => exchange.complete = true,
        }
        drop(exchange);

        result?.into_result()
    }
}

/// One request/reply exchange holding the link. Unless marked complete, the
/// link is dropped and the connection marked closed when this goes away,
/// including when the caller's future is cancelled between write and read.
struct Exchange<'a> {
    link: MutexGuard<'a, Option<Link>>,
    closed: &'a watch::Sender<bool>,
    complete: bool,
}

impl Drop for Exchange<'_> {
    fn drop(&mut self) {
        if !self.complete {
            self.link.take();
            self.closed.send_replace(true);
        }
    }
}

/// Resolves once the connection has been marked closed
async fn closed_signal(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            // Sender gone means the connection itself is gone
            return;
        }
    }
}

#[async_trait]
impl Connection for TcpConnection {
    fn addr(&self) -> &Address {
        &self.addr
    }

    async fn execute(&self, cmd: &Command) -> Result<RespValue> {
        self.roundtrip(cmd).await
    }

    async fn execute_streaming(&self, cmd: &Command) -> Result<RespValue> {
        self.roundtrip(cmd).await
    }

    fn close(&self) {
        self.closed.send_replace(true);
    }

    async fn wait_closed(&self) -> Result<()> {
        let link = self.link.lock().await.take();
        if let Some(mut link) = link {
            // Peer may already be gone; teardown is complete either way
            if let Err(e) = link.stream.shutdown().await {
                log::debug!("Shutdown of {} reported: {}", self.addr, e);
            }
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

/// Dials plain TCP connections and runs the AUTH / SELECT / SETNAME handshake
#[derive(Debug, Default, Clone)]
pub struct TcpConnector;

impl TcpConnector {
    pub fn new() -> Self {
        Self
    }

    async fn handshake(conn: &TcpConnection, options: &ConnectOptions) -> Result<()> {
        if let Some(password) = &options.password {
            let mut auth = Command::new("AUTH");
            if let Some(user) = &options.username {
                auth = auth.arg(user);
            }
            conn.roundtrip(&auth.arg(password)).await?;
        }

        if let Some(db) = options.db {
            conn.roundtrip(&Command::new("SELECT").arg(db.to_string()))
                .await?;
        }

        if let Some(name) = &options.client_name {
            conn.roundtrip(&Command::new("CLIENT").arg("SETNAME").arg(name))
                .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(
        &self,
        addr: &Address,
        options: &ConnectOptions,
    ) -> Result<Arc<dyn Connection>> {
        let connect_error = |message: String| Error::Connection {
            addr: addr.to_string(),
            message,
        };

        let stream = timeout(
            options.connect_timeout,
            TcpStream::connect((addr.host.as_str(), addr.port)),
        )
        .await
        .map_err(|_| connect_error("connect timeout".into()))?
        .map_err(|e| connect_error(e.to_string()))?;

        stream.set_nodelay(true)?;

        let conn = TcpConnection::new(addr.clone(), stream);
        if let Err(e) = Self::handshake(&conn, options).await {
            conn.close();
            conn.wait_closed().await?;
            return Err(e);
        }

        log::debug!("Connected to {}", addr);
        Ok(Arc::new(conn))
    }
}
