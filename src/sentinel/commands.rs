//! Sentinel administration
//!
//! Thin pass-throughs to the first sentinel in current query order. No
//! discovery and no retry: errors come back exactly as the sentinel sent them.

use std::collections::HashMap;
use std::sync::Arc;

use super::directory::{Monitor, SentinelDirectory};
use super::record::{DiscoveryRecord, parse_address, parse_records, parse_records_by_name};
use crate::error::{Error, Result};
use crate::protocol::{Command, RespValue};
use crate::transport::Address;

impl SentinelDirectory {
    fn first_monitor(&self) -> Result<Arc<Monitor>> {
        self.discovery
            .monitors()
            .first()
            .ok_or_else(|| Error::Config("no sentinel configured".into()))
    }

    async fn admin(&self, cmd: Command) -> Result<RespValue> {
        let monitor = self.first_monitor()?;
        log::debug!("{} -> {}", cmd, monitor.addr);
        monitor.conn.execute(&cmd).await
    }

    /// PING the first sentinel
    pub async fn ping(&self) -> Result<()> {
        let reply = self.admin(Command::new("PING")).await?;
        match reply.as_str() {
            Some(s) if s.eq_ignore_ascii_case("PONG") => Ok(()),
            _ => Err(Error::Protocol(format!("unexpected PING reply {:?}", reply))),
        }
    }

    /// SENTINEL MASTERS, keyed by service name
    pub async fn monitors(&self) -> Result<HashMap<String, DiscoveryRecord>> {
        parse_records_by_name(self.admin(Command::sentinel("MASTERS")).await?)
    }

    /// SENTINEL MASTER <name>
    pub async fn monitor_info(&self, name: &str) -> Result<DiscoveryRecord> {
        let reply = self.admin(Command::sentinel("MASTER").arg(name)).await?;
        DiscoveryRecord::from_resp(&reply)
    }

    /// SENTINEL SLAVES <name>
    pub async fn alternates_info(&self, name: &str) -> Result<Vec<DiscoveryRecord>> {
        parse_records(self.admin(Command::sentinel("SLAVES").arg(name)).await?)
    }

    /// SENTINEL SENTINELS <name>
    pub async fn monitors_info(&self, name: &str) -> Result<Vec<DiscoveryRecord>> {
        parse_records(self.admin(Command::sentinel("SENTINELS").arg(name)).await?)
    }

    /// SENTINEL GET-MASTER-ADDR-BY-NAME <name>, `None` if unknown
    pub async fn primary_address(&self, name: &str) -> Result<Option<Address>> {
        parse_address(
            self.admin(Command::sentinel("GET-MASTER-ADDR-BY-NAME").arg(name))
                .await?,
        )
    }

    /// SENTINEL MONITOR <name> <ip> <port> <quorum>
    pub async fn add_monitor(&self, name: &str, ip: &str, port: u16, quorum: u32) -> Result<()> {
        let mut port_buf = itoa::Buffer::new();
        let mut quorum_buf = itoa::Buffer::new();
        let cmd = Command::sentinel("MONITOR")
            .arg(name)
            .arg(ip)
            .arg(port_buf.format(port))
            .arg(quorum_buf.format(quorum));
        expect_ok(self.admin(cmd).await?)
    }

    /// SENTINEL REMOVE <name>
    pub async fn remove_monitor(&self, name: &str) -> Result<()> {
        expect_ok(self.admin(Command::sentinel("REMOVE").arg(name)).await?)
    }

    /// SENTINEL SET <name> <option> <value>
    pub async fn set_param(&self, name: &str, option: &str, value: &str) -> Result<()> {
        let cmd = Command::sentinel("SET").arg(name).arg(option).arg(value);
        expect_ok(self.admin(cmd).await?)
    }

    /// SENTINEL FAILOVER <name>
    pub async fn force_failover(&self, name: &str) -> Result<()> {
        expect_ok(self.admin(Command::sentinel("FAILOVER").arg(name)).await?)
    }

    /// SENTINEL CKQUORUM <name>: `true` when the quorum is reachable
    pub async fn check_quorum(&self, name: &str) -> Result<bool> {
        match self.admin(Command::sentinel("CKQUORUM").arg(name)).await {
            Ok(reply) => Ok(reply.as_str().is_some_and(|s| s.starts_with("OK"))),
            Err(Error::Reply(msg)) if msg.starts_with("NOQUORUM") => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn expect_ok(reply: RespValue) -> Result<()> {
    if reply.is_ok() {
        Ok(())
    } else {
        Err(Error::Protocol(format!("expected OK, got {:?}", reply)))
    }
}
