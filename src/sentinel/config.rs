//! Sentinel client configuration
//!
//! Where the sentinels live, how strict primary validation is, and how to
//! authenticate against sentinels and data nodes.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::{Address, ConnectOptions};

/// Default sentinel port
pub const DEFAULT_SENTINEL_PORT: u16 = 26379;

/// Client-side sentinel configuration
#[derive(Debug, Clone)]
pub struct SentinelClientConfig {
    /// Sentinel endpoints, in initial query order
    pub monitors: Vec<Address>,
    /// Peers a sentinel must see before its primary report is trusted
    pub min_other_monitors: u32,
    /// Options for sentinel connections
    pub monitor_options: ConnectOptions,
    /// Default options for data node connections
    pub node_options: ConnectOptions,
    /// Log level (debug, verbose, notice, warning, nothing)
    pub loglevel: String,
    /// Log file path, empty for stderr
    pub logfile: String,
}

impl Default for SentinelClientConfig {
    fn default() -> Self {
        Self {
            monitors: Vec::new(),
            min_other_monitors: 0,
            monitor_options: ConnectOptions::default(),
            node_options: ConnectOptions::default(),
            loglevel: "notice".to_string(),
            logfile: String::new(),
        }
    }
}

impl SentinelClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sentinel endpoint, `host[:port]`
    pub fn add_monitor(&mut self, addr: &str) -> Result<()> {
        let addr = Address::parse(addr, DEFAULT_SENTINEL_PORT)?;
        if !self.monitors.contains(&addr) {
            self.monitors.push(addr);
        }
        Ok(())
    }

    /// Set the connect timeout for sentinel and data node connections alike
    pub fn set_connect_timeout(&mut self, timeout: Duration) {
        self.monitor_options.connect_timeout = timeout;
        self.node_options.connect_timeout = timeout;
    }

    pub fn validate(&self) -> Result<()> {
        if self.monitors.is_empty() {
            return Err(Error::Config("at least one sentinel is required".into()));
        }
        if self.monitor_options.connect_timeout.is_zero()
            || self.node_options.connect_timeout.is_zero()
        {
            return Err(Error::Config("connect timeout must be positive".into()));
        }
        Ok(())
    }
}
