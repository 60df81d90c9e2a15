//! Managed connection
//!
//! A client handle bound to one resolver. It dials lazily, redials when the
//! held connection is closed or the topology epoch moved, and retries a
//! write once when a demoted primary answers `READONLY`.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tokio::sync::Mutex;

use super::resolver::{Role, ServiceEndpointResolver};
use crate::error::{Error, Result};
use crate::protocol::{Command, RespValue};
use crate::transport::{ConnectOptions, Connection, Connector, same_connection};

struct Slot {
    conn: Arc<dyn Connection>,
    /// Resolver epoch the connection was dialed under
    epoch: u64,
}

pub struct ManagedConnection {
    resolver: Arc<ServiceEndpointResolver>,
    connector: Arc<dyn Connector>,
    options: ConnectOptions,
    slot: RwLock<Option<Slot>>,
    /// Serializes dialing and invalidation
    dial_lock: Mutex<()>,
    closed: AtomicBool,
}

impl ManagedConnection {
    pub fn new(
        resolver: Arc<ServiceEndpointResolver>,
        connector: Arc<dyn Connector>,
        options: ConnectOptions,
    ) -> Self {
        Self {
            resolver,
            connector,
            options,
            slot: RwLock::new(None),
            dial_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn role(&self) -> Role {
        self.resolver.role()
    }

    pub fn service_name(&self) -> &str {
        self.resolver.service_name()
    }

    pub fn resolver(&self) -> &Arc<ServiceEndpointResolver> {
        &self.resolver
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Held connection if it can still be used
    fn current(&self) -> Option<Arc<dyn Connection>> {
        let slot = self.slot.read();
        let slot = slot.as_ref()?;
        if slot.conn.is_closed() {
            return None;
        }
        if self.role() == Role::Primary && slot.epoch != self.resolver.epoch() {
            return None;
        }
        Some(slot.conn.clone())
    }

    /// Connection to the node this client is bound to, dialing if needed
    pub async fn acquire(&self) -> Result<Arc<dyn Connection>> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        if let Some(conn) = self.current() {
            return Ok(conn);
        }

        let _guard = self.dial_lock.lock().await;
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        if let Some(conn) = self.current() {
            return Ok(conn);
        }

        let stale = self.slot.write().take();
        if let Some(stale) = stale {
            log::debug!(
                "Releasing stale {} connection to {} for '{}'",
                self.role(),
                stale.conn.addr(),
                self.service_name()
            );
            Self::teardown(&stale.conn).await;
        }

        let (conn, epoch) = match self.role() {
            Role::Primary => self.dial_primary().await?,
            Role::Alternate => self.dial_alternate().await?,
        };

        *self.slot.write() = Some(Slot {
            conn: conn.clone(),
            epoch,
        });

        // close() may have run while we were dialing
        if self.is_closed() {
            let orphan = self.slot.write().take();
            if let Some(orphan) = orphan {
                Self::teardown(&orphan.conn).await;
            }
            return Err(Error::ConnectionClosed);
        }

        Ok(conn)
    }

    async fn dial_primary(&self) -> Result<(Arc<dyn Connection>, u64)> {
        let (addr, epoch) = self.resolver.resolve_primary_tagged().await?;
        let conn = self.connector.connect(&addr, &self.options).await?;
        log::debug!("Connected to primary {} for '{}'", addr, self.service_name());
        Ok((conn, epoch))
    }

    /// Walk round-robin candidates until one accepts a connection. A
    /// candidate coming up twice means every option has been tried.
    async fn dial_alternate(&self) -> Result<(Arc<dyn Connection>, u64)> {
        let mut tried = HashSet::new();
        loop {
            let addr = self.resolver.resolve_next_alternate().await?;
            if !tried.insert(addr.clone()) {
                return Err(Error::AlternateNotFound(self.service_name().to_string()));
            }

            match self.connector.connect(&addr, &self.options).await {
                Ok(conn) => {
                    log::debug!("Connected to replica {} for '{}'", addr, self.service_name());
                    return Ok((conn, self.resolver.epoch()));
                }
                Err(e) if e.is_connection_layer() => {
                    log::debug!("Replica {} unreachable: {}", addr, e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn execute(&self, cmd: &Command) -> Result<RespValue> {
        self.run(cmd, false).await
    }

    pub async fn execute_streaming(&self, cmd: &Command) -> Result<RespValue> {
        self.run(cmd, true).await
    }

    async fn run(&self, cmd: &Command, streaming: bool) -> Result<RespValue> {
        let mut retried = false;
        loop {
            let conn = self.acquire().await?;
            let reply = if streaming {
                conn.execute_streaming(cmd).await
            } else {
                conn.execute(cmd).await
            };

            match reply {
                Err(Error::ReadOnly(msg)) if self.role() == Role::Primary => {
                    self.invalidate(&conn).await;
                    if retried {
                        return Err(Error::StalePrimary);
                    }
                    log::warn!(
                        "Primary {} for '{}' is read-only ({}), reconnecting",
                        conn.addr(),
                        self.service_name(),
                        msg
                    );
                    retried = true;
                }
                other => return other,
            }
        }
    }

    /// Close `conn` and wait for teardown before anyone may redial
    async fn invalidate(&self, conn: &Arc<dyn Connection>) {
        let _guard = self.dial_lock.lock().await;
        {
            let mut slot = self.slot.write();
            if slot.as_ref().is_some_and(|s| same_connection(&s.conn, conn)) {
                slot.take();
            }
        }
        Self::teardown(conn).await;
    }

    async fn teardown(conn: &Arc<dyn Connection>) {
        conn.close();
        if let Err(e) = conn.wait_closed().await {
            log::debug!("Error closing connection to {}: {}", conn.addr(), e);
        }
    }

    /// Terminal: later calls fail with `ConnectionClosed`
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(slot) = self.slot.read().as_ref() {
            slot.conn.close();
        }
    }

    pub async fn wait_closed(&self) -> Result<()> {
        let slot = self.slot.write().take();
        match slot {
            Some(slot) => slot.conn.wait_closed().await,
            None => Ok(()),
        }
    }
}
