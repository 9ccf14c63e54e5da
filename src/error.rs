use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use compact_str::CompactString;
use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// A frame the server could not make sense of. Each variant maps to an
/// `error` response and the connection stays open.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("frame is not valid utf-8")]
    InvalidUtf8,
    #[error("frame is longer than {0} bytes")]
    TooLong(usize),
}

impl ProtocolError {
    /// Text sent back to the client in the `message` field.
    pub fn client_message(&self) -> &'static str {
        match self {
            ProtocolError::InvalidJson(_) | ProtocolError::InvalidUtf8 => "Invalid JSON",
            ProtocolError::TooLong(_) => "Message too long",
        }
    }
}

/// Failure on the socket itself. Ends the connection it happened on.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Codec(#[from] LinesCodecError),
    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

// kinds of io errors that just mean the peer went away
const DISCONNECT_KINDS: [ErrorKind; 3] = [
    ErrorKind::BrokenPipe,
    ErrorKind::ConnectionReset,
    ErrorKind::ConnectionAborted,
];

impl TransportError {
    pub fn is_disconnect(&self) -> bool {
        match self {
            TransportError::Io(err) | TransportError::Codec(LinesCodecError::Io(err)) => {
                DISCONNECT_KINDS.contains(&err.kind())
            }
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Codec(#[from] LinesCodecError),
    #[error("failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("invalid response from server: {0}")]
    InvalidResponse(#[source] serde_json::Error),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("connection closed before a response arrived")]
    Closed,
    #[error("server error: {0}")]
    Remote(CompactString),
}

impl ClientError {
    pub fn is_connection_refused(&self) -> bool {
        matches!(self, ClientError::Connect { source, .. } if source.kind() == ErrorKind::ConnectionRefused)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", .path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file '{}': {source}", .path.display())]
    TomlParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create logs directory: {0}")]
    LogsDir(#[source] io::Error),
    #[error(transparent)]
    Appender(#[from] tracing_appender::rolling::InitError),
    #[error(transparent)]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

#[derive(Debug, Error)]
#[error("expected three comma separated numbers like 1,2,3, got '{0}'")]
pub struct ParseVec3Error(pub String);
