//! Sentinel directory
//!
//! Owns the ordered monitor list and the per-service resolver registry.
//! Discovery walks the monitors in order; the monitor that produced a valid
//! primary is moved to the front so the next lookup asks it first.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;

use super::config::SentinelClientConfig;
use super::managed::ManagedConnection;
use super::record::{DiscoveryRecord, parse_records, parse_records_by_name};
use super::resolver::{Role, ServiceEndpointResolver};
use crate::error::{Error, Result};
use crate::protocol::Command;
use crate::transport::{Address, ConnectOptions, Connection, Connector};

/// One sentinel endpoint and its connection
pub struct Monitor {
    pub addr: Address,
    pub conn: Arc<dyn Connection>,
}

/// Ordered monitor list with an atomic move-to-front
pub struct MonitorList {
    inner: RwLock<Vec<Arc<Monitor>>>,
}

impl MonitorList {
    pub fn new(monitors: Vec<Arc<Monitor>>) -> Self {
        Self {
            inner: RwLock::new(monitors),
        }
    }

    /// Current order; discovery iterates a copy so no lock is held across I/O
    pub fn snapshot(&self) -> Vec<Arc<Monitor>> {
        self.inner.read().clone()
    }

    pub fn first(&self) -> Option<Arc<Monitor>> {
        self.inner.read().first().cloned()
    }

    pub fn addrs(&self) -> Vec<Address> {
        self.inner.read().iter().map(|m| m.addr.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Move `monitor` to the front, keeping the relative order of the rest
    pub fn promote(&self, monitor: &Arc<Monitor>) {
        let mut list = self.inner.write();
        if let Some(pos) = list.iter().position(|m| Arc::ptr_eq(m, monitor))
            && pos > 0
        {
            let m = list.remove(pos);
            list.insert(0, m);
        }
    }
}

/// Discovery algorithms over a monitor list
pub struct Discovery {
    monitors: MonitorList,
    min_other_monitors: u32,
}

impl Discovery {
    pub fn new(monitors: MonitorList, min_other_monitors: u32) -> Self {
        Self {
            monitors,
            min_other_monitors,
        }
    }

    pub fn monitors(&self) -> &MonitorList {
        &self.monitors
    }

    /// A record names a usable primary only if it is flagged master, is not
    /// down in any sense, and its sentinel sees enough peers.
    pub fn is_valid_primary(&self, record: &DiscoveryRecord) -> bool {
        record.is_primary
            && !record.is_subjectively_down
            && !record.is_objectively_down
            && record.other_monitor_count >= self.min_other_monitors
    }

    pub async fn discover_primary(&self, service_name: &str) -> Result<Address> {
        for monitor in self.monitors.snapshot() {
            let masters = match monitor
                .conn
                .execute(&Command::sentinel("MASTERS"))
                .await
                .and_then(parse_records_by_name)
            {
                Ok(masters) => masters,
                Err(e) => {
                    log::debug!("Sentinel {} skipped: {}", monitor.addr, e);
                    continue;
                }
            };

            if let Some(record) = masters.get(service_name)
                && self.is_valid_primary(record)
            {
                self.monitors.promote(&monitor);
                return Ok(record.address());
            }
        }

        Err(Error::PrimaryNotFound(service_name.to_string()))
    }

    /// Alive replicas from the first sentinel that reports any
    pub async fn discover_alternates(&self, service_name: &str) -> Vec<Address> {
        for monitor in self.monitors.snapshot() {
            let replicas = match monitor
                .conn
                .execute(&Command::sentinel("SLAVES").arg(service_name))
                .await
                .and_then(parse_records)
            {
                Ok(replicas) => replicas,
                Err(e) => {
                    log::debug!("Sentinel {} skipped: {}", monitor.addr, e);
                    continue;
                }
            };

            let alive = filter_alternates(&replicas);
            if !alive.is_empty() {
                return alive;
            }
        }

        Vec::new()
    }
}

/// Drop replicas that are subjectively or objectively down, keeping order
pub fn filter_alternates(records: &[DiscoveryRecord]) -> Vec<Address> {
    records
        .iter()
        .filter(|r| r.is_alive())
        .map(DiscoveryRecord::address)
        .collect()
}

/// Entry point: sentinel-backed clients for named services
pub struct SentinelDirectory {
    pub(super) discovery: Arc<Discovery>,
    connector: Arc<dyn Connector>,
    node_options: ConnectOptions,
    services: DashMap<(String, Role), Arc<ServiceEndpointResolver>>,
}

impl SentinelDirectory {
    /// Connect to every configured sentinel. Any failure aborts construction
    /// and closes the connections already made.
    pub async fn connect(
        config: &SentinelClientConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        config.validate()?;

        let mut monitors: Vec<Arc<dyn Connection>> = Vec::with_capacity(config.monitors.len());
        for addr in &config.monitors {
            match connector.connect(addr, &config.monitor_options).await {
                Ok(conn) => monitors.push(conn),
                Err(e) => {
                    log::warn!("Could not connect to sentinel {}: {}", addr, e);
                    for conn in &monitors {
                        conn.close();
                    }
                    join_all(monitors.iter().map(|c| c.wait_closed())).await;
                    return Err(e);
                }
            }
        }

        log::info!("Connected to {} sentinel(s)", monitors.len());
        Ok(Self::with_monitors(monitors, config, connector))
    }

    /// Build over already-established sentinel connections
    pub fn with_monitors(
        monitors: Vec<Arc<dyn Connection>>,
        config: &SentinelClientConfig,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let monitors = monitors
            .into_iter()
            .map(|conn| {
                Arc::new(Monitor {
                    addr: conn.addr().clone(),
                    conn,
                })
            })
            .collect();

        Self {
            discovery: Arc::new(Discovery::new(
                MonitorList::new(monitors),
                config.min_other_monitors,
            )),
            connector,
            node_options: config.node_options.clone(),
            services: DashMap::new(),
        }
    }

    /// Sentinel addresses in current query order
    pub fn monitor_addrs(&self) -> Vec<Address> {
        self.discovery.monitors().addrs()
    }

    pub async fn discover_primary(&self, service_name: &str) -> Result<Address> {
        self.discovery.discover_primary(service_name).await
    }

    pub async fn discover_alternates(&self, service_name: &str) -> Vec<Address> {
        self.discovery.discover_alternates(service_name).await
    }

    /// Client bound to the current primary of `service_name`
    pub fn primary_for(
        &self,
        service_name: &str,
        options: Option<ConnectOptions>,
    ) -> ManagedConnection {
        self.client_for(service_name, Role::Primary, options)
    }

    /// Client spreading over alive replicas of `service_name`
    pub fn alternate_for(
        &self,
        service_name: &str,
        options: Option<ConnectOptions>,
    ) -> ManagedConnection {
        self.client_for(service_name, Role::Alternate, options)
    }

    fn client_for(
        &self,
        service_name: &str,
        role: Role,
        options: Option<ConnectOptions>,
    ) -> ManagedConnection {
        let resolver = self.resolver(service_name, role);
        ManagedConnection::new(
            resolver,
            self.connector.clone(),
            options.unwrap_or_else(|| self.node_options.clone()),
        )
    }

    /// Resolver for `(service_name, role)`, created on first use
    pub fn resolver(&self, service_name: &str, role: Role) -> Arc<ServiceEndpointResolver> {
        self.services
            .entry((service_name.to_string(), role))
            .or_insert_with(|| {
                log::debug!("Registering {} resolver for '{}'", role, service_name);
                Arc::new(ServiceEndpointResolver::new(
                    service_name.to_string(),
                    role,
                    self.discovery.clone(),
                ))
            })
            .clone()
    }

    /// Close every sentinel connection
    pub fn close(&self) {
        for monitor in self.discovery.monitors().snapshot() {
            monitor.conn.close();
        }
    }

    /// Wait for every sentinel connection to finish teardown. All of them
    /// are awaited even when some fail; failures are reported together.
    pub async fn wait_closed(&self) -> Result<()> {
        let monitors = self.discovery.monitors().snapshot();
        let results = join_all(monitors.iter().map(|m| m.conn.wait_closed())).await;

        let failures: Vec<String> = monitors
            .iter()
            .zip(results)
            .filter_map(|(m, res)| res.err().map(|e| format!("{}: {}", m.addr, e)))
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Close { failures })
        }
    }
}
