use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use anyhow::Context;
use clap::{Parser, Subcommand};
use piccolo_bridge::config::DEFAULT_PORT;
use piccolo_bridge::{connection_refused, console_logging, AddCube, BridgeClient, Vec3, DEFAULT_CLIENT_IP};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "bridge-cli", about = "Send commands to a bridge server", long_about = None)]
struct Cli {
    #[arg(short, long, default_value_t = DEFAULT_CLIENT_IP)]
    ip: IpAddr,

    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Seconds to wait for each response
    #[arg(short, long, default_value_t = 15)]
    timeout: u64,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand)]
enum Action {
    /// Check that the server answers
    Ping,
    /// Send an arbitrary command
    Send {
        /// Command name, sent as "type"
        kind: String,
        /// Command params as JSON
        #[arg(default_value = "{}")]
        params: String,
    },
    /// Add a cube to the scene
    AddCube {
        #[arg(long, default_value = "New Cube")]
        name: String,
        /// x,y,z
        #[arg(long, default_value = "0,0,0", allow_hyphen_values = true)]
        position: Vec3,
        /// x,y,z
        #[arg(long, default_value = "1,1,1", allow_hyphen_values = true)]
        scale: Vec3,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout is reserved for results
    console_logging(io::stderr)?;
    let cli = Cli::parse();
    let addr = SocketAddr::new(cli.ip, cli.port);
    let mut client = BridgeClient::new(addr, Duration::from_secs(cli.timeout));

    if let Err(err) = client.connect().await {
        if err.is_connection_refused() {
            eprintln!("{}", connection_refused(addr));
            std::process::exit(1)
        }
        // got unexpected err, re-throw
        return Err(err.into());
    }

    let result = match cli.action {
        Action::Ping => Value::from("pong"),
        Action::Send { kind, params } => {
            let params: Value = serde_json::from_str(&params).context("params must be valid JSON")?;
            client.send_command(&kind, params).await?
        },
        Action::AddCube { name, position, scale } => {
            let cube = AddCube {
                name: name.into(),
                position,
                scale,
            };
            client.add_cube(&cube).await?
        },
    };
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
