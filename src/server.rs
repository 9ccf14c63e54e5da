//! The line server.
//!
//! Every accepted socket gets its own task running
//! `read line -> handle_line -> write line` until the peer hangs up, the
//! socket fails, the connection idles out or the server shuts down.
//! Connections share nothing, so a stalled client only holds its own task.

use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::codec::{Decoder, FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;

use crate::b;
use crate::config::Config;
use crate::error::{ProtocolError, TransportError};
use crate::protocol::{handle_line, Response};

// pause after a failed accept so running out of fds doesn't spin the loop
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
struct Limits {
    max_line_length: usize,
    idle_timeout: Option<Duration>,
}

pub struct Server {
    listener: TcpListener,
    limits: Limits,
}

impl Server {
    pub async fn bind(config: &Config) -> io::Result<Self> {
        let listener = TcpListener::bind(config.addr).await?;
        Ok(Self {
            listener,
            limits: Limits {
                max_line_length: config.max_line_length,
                idle_timeout: config.idle_timeout,
            },
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` is cancelled, then waits for the
    /// open connections to wind down.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((tcp, addr)) => {
                        tracing::debug!("{addr} connected");
                        connections.spawn(handle_client(tcp, addr, self.limits, shutdown.child_token()));
                    },
                    Err(err) => {
                        tracing::error!("failed to accept connection: {err}");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    },
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(err) = joined {
                        tracing::error!("connection task failed: {err}");
                    }
                },
            }
        }
        tracing::info!("Shutting down, {} open connections", connections.len());
        while let Some(joined) = connections.join_next().await {
            if let Err(err) = joined {
                tracing::error!("connection task failed: {err}");
            }
        }
    }
}

/// `LinesCodec` that drops an unterminated fragment at EOF instead of
/// handing it out as a frame.
#[derive(Debug)]
struct FrameCodec(LinesCodec);

impl FrameCodec {
    fn new(max_line_length: usize) -> Self {
        Self(LinesCodec::new_with_max_length(max_line_length))
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = LinesCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, LinesCodecError> {
        self.0.decode(buf)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, LinesCodecError> {
        let line = self.0.decode(buf)?;
        if line.is_none() && !buf.is_empty() {
            tracing::trace!("dropping {} bytes without a newline", buf.len());
            buf.clear();
        }
        Ok(line)
    }
}

#[derive(Debug)]
enum Closed {
    Eof,
    Idle,
    Shutdown,
}

async fn idle(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

async fn handle_client(mut tcp: TcpStream, addr: SocketAddr, limits: Limits, shutdown: CancellationToken) {
    let (reader, writer) = tcp.split();
    let mut stream = FramedRead::new(reader, FrameCodec::new(limits.max_line_length));
    let mut sink = FramedWrite::new(writer, LinesCodec::new());
    // the stream yields one None after a decode error,
    // which doesn't mean the client went away
    let mut after_decode_error = false;
    let result: Result<Closed, TransportError> = loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break Ok(Closed::Shutdown),
            _ = idle(limits.idle_timeout) => break Ok(Closed::Idle),
            frame = stream.next() => frame,
        };
        let response = match frame {
            Some(Ok(line)) => {
                tracing::debug!("{addr} sent {line}");
                handle_line(&line)
            },
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                after_decode_error = true;
                let err = ProtocolError::TooLong(limits.max_line_length);
                tracing::warn!("{addr}: {err}");
                Response::from(&err)
            },
            Some(Err(LinesCodecError::Io(err))) if err.kind() == ErrorKind::InvalidData => {
                after_decode_error = true;
                let err = ProtocolError::InvalidUtf8;
                tracing::warn!("{addr}: {err}");
                Response::from(&err)
            },
            Some(Err(LinesCodecError::Io(err))) => break Err(err.into()),
            None if after_decode_error => {
                after_decode_error = false;
                continue;
            },
            None => break Ok(Closed::Eof),
        };
        let frame = b!(response.to_frame());
        // a peer that stops reading parks us here, so keep watching
        tokio::select! {
            _ = shutdown.cancelled() => break Ok(Closed::Shutdown),
            _ = idle(limits.idle_timeout) => break Ok(Closed::Idle),
            sent = sink.send(frame) => b!(sent),
        }
    };
    match result {
        Ok(reason) => tracing::debug!("{addr} disconnected ({reason:?})"),
        Err(err) if err.is_disconnect() => tracing::trace!("{addr} dropped the connection"),
        Err(err) => tracing::error!("{addr} transport error: {err}"),
    }
}
