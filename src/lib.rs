// MACROS //

// break out of a connection loop with the error
macro_rules! b {
    ($result:expr) => {
        match $result {
            Ok(ok) => ok,
            Err(err) => break Err(err.into()),
        }
    }
}
pub(crate) use b;

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;

pub use client::BridgeClient;
pub use config::Config;
pub use error::{ClientError, ConfigError, LoggingError, ProtocolError, TransportError};
pub use protocol::{handle_line, AddCube, Command, Reply, Request, Response, Vec3};
pub use server::Server;

// COMMAND LINE //

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

pub const DEFAULT_CLIENT_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));

pub fn connection_refused(tried: SocketAddr) -> String {
    let mut msg = format!("No bridge server listening on {tried}\n");
    msg.push_str("Try running: cargo run --release --bin bridge-server");
    if tried.port() != config::DEFAULT_PORT {
        msg.push_str(" -- -p ");
        msg.push_str(&tried.port().to_string());
    }
    msg
}

// LOGGING //

const LOGS_DIR: &str = "logs";
const DEFAULT_FILTER: &str = "info";

use std::path::Path;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_appender::{non_blocking::WorkerGuard, rolling::{RollingFileAppender, Rotation}};
use tracing_subscriber::{fmt::{self, MakeWriter}, layer::SubscriberExt, EnvFilter};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

pub fn console_logging<W>(writer: W) -> Result<(), SetGlobalDefaultError>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let subscriber = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::Layer::new().without_time().compact().with_ansi(true).with_writer(writer));
    tracing::subscriber::set_global_default(subscriber)
}

fn file_appender(dir: &Path, rotation: Rotation, log_file: &str) -> Result<RollingFileAppender, LoggingError> {
    std::fs::create_dir_all(dir).map_err(LoggingError::LogsDir)?;
    let appender = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(log_file)
        .build(dir)?;
    Ok(appender)
}

pub fn file_logging(rotation: Rotation, log_file: &str) -> Result<WorkerGuard, LoggingError> {
    let appender = file_appender(Path::new(LOGS_DIR), rotation, log_file)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    let subscriber = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::Layer::new().compact().with_ansi(false).with_writer(non_blocking));
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(guard)
}
