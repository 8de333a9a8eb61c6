use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use conveyor::config::DEFAULT_PREFIX;
use conveyor::shutdown::install_shutdown_handler;
use conveyor::status::run_status_server;
use conveyor::{BrokerConfig, JsonCodec, LoggingDelegate, RedisStore, Server};

#[derive(Parser, Debug)]
#[command(name = "conveyor")]
#[command(about = "A distributed job broker worker coordinated through Redis")]
struct Args {
    /// Redis connection URL
    #[arg(long, default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    /// Key namespace root shared by all workers in the cluster
    #[arg(long, default_value = DEFAULT_PREFIX)]
    prefix: String,

    /// Delayed-job sweeper period in seconds
    #[arg(long, default_value = "10.0")]
    resolution: f64,

    /// Heartbeat interval in seconds
    #[arg(long, default_value = "5.0")]
    delay: f64,

    /// Liveness TTL multiplier (the worker is presumed dead after
    /// delay * factor seconds of silence)
    #[arg(long, default_value = "2.0")]
    factor: f64,

    /// Maximum concurrently running job handlers
    #[arg(long, default_value = "32")]
    max_in_flight: usize,

    /// Port for the status endpoint (optional)
    #[arg(long)]
    status_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = BrokerConfig::new(args.prefix)
        .with_resolution(Duration::from_secs_f64(args.resolution))
        .with_delay(Duration::from_secs_f64(args.delay))
        .with_factor(args.factor)
        .with_max_in_flight(args.max_in_flight);

    let store = Arc::new(RedisStore::connect(&args.redis_url).await?);
    let token = install_shutdown_handler();
    let server = Server::new(
        Arc::new(LoggingDelegate),
        store,
        config,
        Arc::new(JsonCodec),
        Some(token.clone()),
    )?;

    tracing::info!(
        worker_id = %server.worker_id(),
        redis_url = %args.redis_url,
        "Starting conveyor worker"
    );

    server.start().await;

    if let Some(port) = args.status_port {
        let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
        let status_server = server.clone();
        let status_token = token.clone();
        tokio::spawn(async move {
            run_status_server(addr, status_server, status_token).await;
        });
    }

    token.cancelled().await;
    server.stop().await;

    Ok(())
}
