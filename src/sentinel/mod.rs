//! Sentinel-aware routing
//!
//! Finds the current primary and the alive replicas of a named service by
//! asking a set of sentinels, and hands out connections that follow the
//! service through failovers.
//!
//! - `directory`: monitor list, discovery, per-service resolver registry
//! - `resolver`: sticky primary cache and replica round robin
//! - `managed`: lazily dialed connection with the read-only retry
//! - `record`: decoding of sentinel state replies
//! - `commands`: administrative pass-throughs

pub mod commands;
pub mod config;
pub mod directory;
pub mod managed;
pub mod record;
pub mod resolver;

pub use config::{DEFAULT_SENTINEL_PORT, SentinelClientConfig};
pub use directory::{Discovery, Monitor, MonitorList, SentinelDirectory, filter_alternates};
pub use managed::ManagedConnection;
pub use record::DiscoveryRecord;
pub use resolver::{Role, ServiceEndpointResolver};
