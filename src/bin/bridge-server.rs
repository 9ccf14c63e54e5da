use std::io;
use anyhow::Context;
use piccolo_bridge::{console_logging, file_logging, Config, Server};
use tokio_util::sync::CancellationToken;
use tracing_appender::rolling::Rotation;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    // keep the guard alive so buffered lines get flushed on exit
    let _guard = match &config.log_file {
        Some(log_file) => Some(file_logging(Rotation::DAILY, log_file)?),
        None => {
            console_logging(io::stdout)?;
            None
        },
    };
    if let Err(err) = serve(config).await {
        tracing::error!("{err:#}");
        return Err(err);
    }
    Ok(())
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let server = Server::bind(&config)
        .await
        .with_context(|| format!("unable to listen on {}", config.addr))?;
    tracing::info!("Listening on {}", server.local_addr()?);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Received ctrl-c");
                    shutdown.cancel();
                },
                Err(err) => tracing::error!("unable to listen for ctrl-c: {err}"),
            }
        }
    });

    server.run(shutdown).await;
    Ok(())
}
