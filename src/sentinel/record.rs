//! Sentinel reply parsing
//!
//! `SENTINEL MASTERS / MASTER / SLAVES / SENTINELS` answer with flat
//! `[field, value, ...]` arrays. These are decoded into [`DiscoveryRecord`],
//! with the comma-separated `flags` field expanded into booleans.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::protocol::RespValue;
use crate::transport::Address;

/// State of one instance (primary, replica or sentinel) as a sentinel sees it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryRecord {
    pub name: String,
    pub ip: String,
    pub port: u16,
    pub run_id: String,
    /// Raw flags string, e.g. `master,s_down`
    pub flags: String,

    pub is_primary: bool,
    pub is_alternate: bool,
    pub is_monitor: bool,
    pub is_subjectively_down: bool,
    pub is_objectively_down: bool,
    pub is_disconnected: bool,
    pub is_primary_down: bool,

    pub other_monitor_count: u32,
    pub alternate_count: u32,
    pub quorum: u32,
    pub pending_commands: u64,

    // Timestamps and timings in milliseconds
    pub last_ping_sent: i64,
    pub last_ok_ping_reply: i64,
    pub last_ping_reply: i64,
    pub down_after_ms: i64,
    pub info_refresh: i64,
    pub role_reported: String,
    pub role_reported_time: i64,
    pub config_epoch: i64,
    pub failover_timeout: i64,
    pub parallel_syncs: i64,

    /// Fields this client does not interpret
    pub extra: HashMap<String, String>,
}

impl DiscoveryRecord {
    /// Decode one flat field/value array
    pub fn from_resp(value: &RespValue) -> Result<Self> {
        let items = match value {
            RespValue::Array(items) => items,
            other => {
                return Err(Error::Protocol(format!(
                    "expected sentinel record array, got {:?}",
                    other
                )));
            }
        };

        if items.len() % 2 != 0 {
            return Err(Error::Protocol(
                "sentinel record has an odd number of elements".into(),
            ));
        }

        let mut record = DiscoveryRecord::default();

        for pair in items.chunks(2) {
            let key = pair[0]
                .as_str()
                .ok_or_else(|| Error::Protocol("sentinel record key is not a string".into()))?;
            let value = &pair[1];
            let text = || value.as_str().unwrap_or_default().to_string();
            let int = || value.as_integer().unwrap_or(0);

            match key {
                "name" => record.name = text(),
                "ip" => record.ip = text(),
                "port" => {
                    record.port = value
                        .as_integer()
                        .and_then(|p| u16::try_from(p).ok())
                        .ok_or_else(|| Error::Protocol(format!("invalid port {:?}", value)))?
                }
                "runid" => record.run_id = text(),
                "flags" => record.set_flags(&text()),
                "num-other-sentinels" => {
                    record.other_monitor_count = value
                        .as_integer()
                        .and_then(|n| u32::try_from(n).ok())
                        .ok_or_else(|| {
                            Error::Protocol(format!("invalid num-other-sentinels {:?}", value))
                        })?
                }
                "num-slaves" => record.alternate_count = int().max(0) as u32,
                "quorum" => record.quorum = int().max(0) as u32,
                "link-pending-commands" | "pending-commands" => {
                    record.pending_commands = int().max(0) as u64
                }
                "last-ping-sent" => record.last_ping_sent = int(),
                "last-ok-ping-reply" => record.last_ok_ping_reply = int(),
                "last-ping-reply" => record.last_ping_reply = int(),
                "down-after-milliseconds" => record.down_after_ms = int(),
                "info-refresh" => record.info_refresh = int(),
                "role-reported" => record.role_reported = text(),
                "role-reported-time" => record.role_reported_time = int(),
                "config-epoch" => record.config_epoch = int(),
                "failover-timeout" => record.failover_timeout = int(),
                "parallel-syncs" => record.parallel_syncs = int(),
                other => {
                    record.extra.insert(other.to_string(), text());
                }
            }
        }

        Ok(record)
    }

    fn set_flags(&mut self, flags: &str) {
        for flag in flags.split(',').map(str::trim) {
            match flag {
                "master" => self.is_primary = true,
                "slave" => self.is_alternate = true,
                "sentinel" => self.is_monitor = true,
                "s_down" => self.is_subjectively_down = true,
                "o_down" => self.is_objectively_down = true,
                "disconnected" => self.is_disconnected = true,
                "master_down" => self.is_primary_down = true,
                _ => {}
            }
        }
        self.flags = flags.to_string();
    }

    /// Neither subjectively nor objectively down
    pub fn is_alive(&self) -> bool {
        !self.is_subjectively_down && !self.is_objectively_down
    }

    pub fn address(&self) -> Address {
        Address::new(self.ip.clone(), self.port)
    }
}

/// Decode an array of records (`SLAVES`, `SENTINELS`, `MASTERS`)
pub fn parse_records(value: RespValue) -> Result<Vec<DiscoveryRecord>> {
    match value {
        RespValue::Array(items) => items.iter().map(DiscoveryRecord::from_resp).collect(),
        RespValue::NullArray => Ok(Vec::new()),
        other => Err(Error::Protocol(format!(
            "expected array of sentinel records, got {:?}",
            other
        ))),
    }
}

/// Decode `SENTINEL MASTERS` keyed by service name
pub fn parse_records_by_name(value: RespValue) -> Result<HashMap<String, DiscoveryRecord>> {
    Ok(parse_records(value)?
        .into_iter()
        .map(|record| (record.name.clone(), record))
        .collect())
}

/// Decode `SENTINEL GET-MASTER-ADDR-BY-NAME`: `[ip, port]` or null
pub fn parse_address(value: RespValue) -> Result<Option<Address>> {
    match value {
        RespValue::Null | RespValue::NullArray => Ok(None),
        RespValue::Array(items) if items.len() == 2 => {
            let host = items[0]
                .as_str()
                .ok_or_else(|| Error::Protocol("address host is not a string".into()))?;
            let port = items[1]
                .as_integer()
                .and_then(|p| u16::try_from(p).ok())
                .ok_or_else(|| Error::Protocol("address port is not a valid port".into()))?;
            Ok(Some(Address::new(host, port)))
        }
        other => Err(Error::Protocol(format!(
            "expected [ip, port] reply, got {:?}",
            other
        ))),
    }
}
