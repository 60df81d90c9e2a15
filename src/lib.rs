pub mod cli;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod sentinel;
pub mod transport;

pub use error::{Error, Result};
pub use protocol::{Command, RespValue};
pub use sentinel::{
    DiscoveryRecord, ManagedConnection, Role, SentinelClientConfig, SentinelDirectory,
};
pub use transport::tcp::TcpConnector;
pub use transport::{Address, ConnectOptions, Connection, Connector};
