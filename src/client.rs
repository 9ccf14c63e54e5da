//! Controller side of the bridge.
//!
//! [`BridgeClient`] keeps at most one connection open. It is opened on first
//! use and thrown away after any transport failure, so the next call starts
//! over with a fresh socket.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Map, Value};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

use crate::error::ClientError;
use crate::protocol::{AddCube, Request, Response, ADD_CUBE, PING};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

struct Connection {
    sink: FramedWrite<OwnedWriteHalf, LinesCodec>,
    stream: FramedRead<OwnedReadHalf, LinesCodec>,
}

impl Connection {
    async fn open(addr: SocketAddr) -> Result<Self, ClientError> {
        let conn = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::Connect { addr, source })?;
        let (reader, writer) = conn.into_split();
        Ok(Self {
            sink: FramedWrite::new(writer, LinesCodec::new()),
            stream: FramedRead::new(reader, LinesCodec::new()),
        })
    }

    async fn exchange(&mut self, frame: String, timeout: Duration) -> Result<Response<Value>, ClientError> {
        self.sink.send(frame).await?;
        let line = match tokio::time::timeout(timeout, self.stream.next()).await {
            Ok(Some(line)) => line?,
            Ok(None) => return Err(ClientError::Closed),
            Err(_) => return Err(ClientError::Timeout(timeout)),
        };
        tracing::debug!("got {line}");
        serde_json::from_str(&line).map_err(ClientError::InvalidResponse)
    }
}

pub struct BridgeClient {
    addr: SocketAddr,
    timeout: Duration,
    conn: Option<Connection>,
}

impl BridgeClient {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self {
            addr,
            timeout,
            conn: None,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Opens a connection if there isn't one and checks it with a ping.
    /// A cached connection that fails the ping is replaced once.
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        let cached = self.is_connected();
        match self.ping().await {
            Err(err) if cached && !matches!(err, ClientError::Remote(_)) => {
                tracing::info!("reconnecting to {} after stale connection: {err}", self.addr);
                self.ping().await
            }
            result => result,
        }
    }

    pub fn disconnect(&mut self) {
        if self.conn.take().is_some() {
            tracing::debug!("disconnected from {}", self.addr);
        }
    }

    pub async fn ping(&mut self) -> Result<(), ClientError> {
        match self.round_trip(PING.to_owned()).await? {
            Response::Success { .. } => Ok(()),
            Response::Error { message } => {
                tracing::warn!("ping was rejected: {message}");
                self.disconnect();
                Err(ClientError::Remote(message))
            }
        }
    }

    /// Sends one command and returns its `result`. `null` params are sent
    /// as an empty object.
    pub async fn send_command(&mut self, kind: &str, params: Value) -> Result<Value, ClientError> {
        let params = match params {
            Value::Null => Value::Object(Map::new()),
            params => params,
        };
        let frame = serde_json::to_string(&Request::new(kind, params)).map_err(ClientError::Encode)?;
        tracing::info!("sending {kind} ({} bytes)", frame.len());
        match self.round_trip(frame).await? {
            Response::Success { result } => Ok(result),
            Response::Error { message } => Err(ClientError::Remote(message)),
        }
    }

    pub async fn add_cube(&mut self, cube: &AddCube) -> Result<Value, ClientError> {
        let params = serde_json::to_value(cube).map_err(ClientError::Encode)?;
        self.send_command(ADD_CUBE, params).await
    }

    async fn round_trip(&mut self, frame: String) -> Result<Response<Value>, ClientError> {
        let mut conn = match self.conn.take() {
            Some(conn) => conn,
            None => {
                let conn = Connection::open(self.addr).await?;
                tracing::info!("connected to {}", self.addr);
                conn
            }
        };
        let result = conn.exchange(frame, self.timeout).await;
        match &result {
            Ok(_) => self.conn = Some(conn),
            Err(err) => tracing::warn!("dropping connection to {}: {err}", self.addr),
        }
        result
    }
}
