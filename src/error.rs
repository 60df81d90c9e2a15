use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("No primary found for '{0}'")]
    PrimaryNotFound(String),

    #[error("No replica found for '{0}'")]
    AlternateNotFound(String),

    #[error("READONLY {0}")]
    ReadOnly(String),

    #[error("The previous primary is now a replica")]
    StalePrimary,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Error connecting to {addr}: {message}")]
    Connection { addr: String, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("{0}")]
    Reply(String),

    #[error("Failed to close {} connection(s): {}", failures.len(), failures.join("; "))]
    Close { failures: Vec<String> },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Map an error reply from the server to the matching variant.
    pub fn from_reply(msg: &[u8]) -> Self {
        let msg = String::from_utf8_lossy(msg);
        match msg.strip_prefix("READONLY ") {
            Some(rest) => Self::ReadOnly(rest.to_string()),
            None if msg == "READONLY" => Self::ReadOnly(String::new()),
            None => Self::Reply(msg.into_owned()),
        }
    }

    /// Errors raised while dialing or talking to a node, as opposed to
    /// discovery outcomes or replies the server chose to send.
    pub fn is_connection_layer(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Io(_) | Self::Protocol(_) | Self::ConnectionClosed
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
