#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures::StreamExt;
use piccolo_bridge::{Config, Server};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;

pub const PONG: &str = r#"{"status":"success","result":{"message":"pong"}}"#;
pub const INVALID_JSON: &str = r#"{"status":"error","message":"Invalid JSON"}"#;
pub const WAIT: Duration = Duration::from_secs(5);

pub fn loopback_config() -> Config {
    Config {
        addr: "127.0.0.1:0".parse().unwrap(),
        ..Config::default()
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: CancellationToken,
    pub handle: JoinHandle<()>,
}

pub async fn spawn_server(config: Config) -> TestServer {
    let server = Server::bind(&config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(server.run(shutdown.clone()));
    TestServer { addr, shutdown, handle }
}

/// Raw client: writes bytes as given, reads responses line by line.
pub struct Peer {
    pub stream: FramedRead<OwnedReadHalf, LinesCodec>,
    pub writer: OwnedWriteHalf,
}

impl Peer {
    pub async fn connect(addr: SocketAddr) -> Self {
        let tcp = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = tcp.into_split();
        Self {
            stream: FramedRead::new(reader, LinesCodec::new()),
            writer,
        }
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    pub async fn recv(&mut self) -> String {
        tokio::time::timeout(WAIT, self.stream.next())
            .await
            .expect("no response in time")
            .expect("connection closed")
            .expect("response is not a line")
    }

    pub async fn request(&mut self, line: &str) -> String {
        self.send_raw(format!("{line}\n").as_bytes()).await;
        self.recv().await
    }

    /// Sends large commands without reading any response until our writes
    /// stop making progress, i.e. both socket buffers are full.
    pub async fn flood_without_reading(&mut self) {
        let line = format!("{{\"type\":\"flood\",\"params\":\"{}\"}}\n", "x".repeat(4096));
        for _ in 0..100_000 {
            let write = self.writer.write_all(line.as_bytes());
            match tokio::time::timeout(Duration::from_millis(100), write).await {
                Ok(Ok(())) => continue,
                // blocked, or the server already gave up on us
                _ => return,
            }
        }
        panic!("writes never blocked");
    }

    /// True if a write fails because the server dropped the socket.
    pub async fn write_fails(&mut self) -> bool {
        matches!(tokio::time::timeout(WAIT, self.writer.write_all(b"ping\n")).await, Ok(Err(_)))
    }

    /// True once the server has closed its side.
    pub async fn closed(&mut self) -> bool {
        matches!(tokio::time::timeout(WAIT, self.stream.next()).await, Ok(None))
    }
}
