//! Scripted in-memory transport.
//!
//! Every dial, command, close and wait_closed is appended to a shared event
//! log so tests can assert on ordering, not only on outcomes.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Address, ConnectOptions, Connection, Connector};
use crate::error::{Error, Result};
use crate::protocol::{Command, RespValue};

pub type Handler = Arc<dyn Fn(&Command) -> Result<RespValue> + Send + Sync>;
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&Command) -> Result<RespValue> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub struct MockConnection {
    id: usize,
    addr: Address,
    handler: Handler,
    closed: AtomicBool,
    calls: AtomicUsize,
    events: EventLog,
}

impl MockConnection {
    pub fn new(addr: Address, handler: Handler) -> Arc<Self> {
        Arc::new(Self::with_log(0, addr, handler, EventLog::default()))
    }

    /// A connection whose every request fails at the transport level
    pub fn unreachable(addr: Address) -> Arc<Self> {
        let target = addr.to_string();
        Self::new(
            addr,
            handler(move |_| {
                Err(Error::Connection {
                    addr: target.clone(),
                    message: "Connection reset by peer".into(),
                })
            }),
        )
    }

    fn with_log(id: usize, addr: Address, handler: Handler, events: EventLog) -> Self {
        Self {
            id,
            addr,
            handler,
            closed: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            events,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn label(&self) -> String {
        format!("{}#{}", self.addr, self.id)
    }

    fn run(&self, kind: &str, cmd: &Command) -> Result<RespValue> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.events
            .lock()
            .push(format!("{} {} {}", kind, self.label(), cmd));
        (self.handler)(cmd)
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn addr(&self) -> &Address {
        &self.addr
    }

    async fn execute(&self, cmd: &Command) -> Result<RespValue> {
        tokio::task::yield_now().await;
        self.run("exec", cmd)
    }

    async fn execute_streaming(&self, cmd: &Command) -> Result<RespValue> {
        tokio::task::yield_now().await;
        self.run("stream", cmd)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.events.lock().push(format!("close {}", self.label()));
    }

    async fn wait_closed(&self) -> Result<()> {
        tokio::task::yield_now().await;
        self.events
            .lock()
            .push(format!("wait_closed {}", self.label()));
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Connector over a table of scripted nodes; unknown addresses refuse
#[derive(Default)]
pub struct MockConnector {
    nodes: Mutex<HashMap<Address, Handler>>,
    dial_delay: Option<Duration>,
    dials: AtomicUsize,
    next_id: AtomicUsize,
    opened: Mutex<Vec<Arc<MockConnection>>>,
    events: EventLog,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every dial sleeps for `delay` before completing
    pub fn with_dial_delay(delay: Duration) -> Self {
        Self {
            dial_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn node(&self, addr: Address, handler: Handler) {
        self.nodes.lock().insert(addr, handler);
    }

    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn opened(&self) -> Vec<Arc<MockConnection>> {
        self.opened.lock().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        addr: &Address,
        _options: &ConnectOptions,
    ) -> Result<Arc<dyn Connection>> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        self.events.lock().push(format!("dial {}", addr));

        if let Some(delay) = self.dial_delay {
            tokio::time::sleep(delay).await;
        } else {
            tokio::task::yield_now().await;
        }

        let handler = self
            .nodes
            .lock()
            .get(addr)
            .cloned()
            .ok_or_else(|| Error::Connection {
                addr: addr.to_string(),
                message: "Connection refused".into(),
            })?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let conn = Arc::new(MockConnection::with_log(
            id,
            addr.clone(),
            handler,
            self.events.clone(),
        ));
        self.opened.lock().push(conn.clone());
        Ok(conn)
    }
}

/// Flat `[key, value, key, value, ...]` reply as sentinels send records
pub fn record(pairs: &[(&str, &str)]) -> RespValue {
    RespValue::array(
        pairs
            .iter()
            .flat_map(|(k, v)| [RespValue::bulk_string(k), RespValue::bulk_string(v)])
            .collect(),
    )
}

pub fn primary_record(name: &str, addr: &Address, flags: &str, other_sentinels: u32) -> RespValue {
    let port = addr.port.to_string();
    let others = other_sentinels.to_string();
    record(&[
        ("name", name),
        ("ip", &addr.host),
        ("port", &port),
        ("runid", "0123456789abcdef0123456789abcdef01234567"),
        ("flags", flags),
        ("link-pending-commands", "0"),
        ("num-slaves", "1"),
        ("num-other-sentinels", &others),
        ("quorum", "2"),
    ])
}

pub fn replica_record(addr: &Address, flags: &str) -> RespValue {
    let name = addr.to_string();
    let port = addr.port.to_string();
    record(&[
        ("name", &name),
        ("ip", &addr.host),
        ("port", &port),
        ("flags", flags),
        ("master-link-status", "ok"),
    ])
}

/// Sentinel answering MASTERS / SLAVES from fixed tables
pub fn sentinel_node(masters: Vec<RespValue>, replicas: Vec<RespValue>) -> Handler {
    handler(move |cmd| {
        let sub = cmd
            .args
            .first()
            .map(|s| String::from_utf8_lossy(s).to_uppercase())
            .unwrap_or_default();
        match sub.as_str() {
            "MASTERS" => Ok(RespValue::array(masters.clone())),
            "SLAVES" | "REPLICAS" => Ok(RespValue::array(replicas.clone())),
            _ => Err(Error::Reply(format!("ERR Unknown SENTINEL subcommand '{}'", sub))),
        }
    })
}
