//! Submit jobs to a conveyor cluster through the library.
//!
//! Run a worker first (`cargo run -- --redis-url redis://127.0.0.1:6379`),
//! then: `cargo run --example submit`

use std::sync::Arc;

use serde_json::json;

use conveyor::{epoch_seconds, BrokerConfig, JsonCodec, LoggingDelegate, RedisStore, Server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    let store = Arc::new(RedisStore::connect("redis://127.0.0.1:6379").await?);
    let server = Server::new(
        Arc::new(LoggingDelegate),
        store,
        BrokerConfig::default(),
        Arc::new(JsonCodec),
        None,
    )?;

    // Runs as soon as a worker picks it up.
    let id = server.submit(&json!({"data": "hello"})).await?;
    println!("submitted immediate job {id}");

    // Held in the delayed set until its time arrives.
    let id = server
        .submit(&json!({"data": "later", "scheduled_at": epoch_seconds() + 30.0}))
        .await?;
    println!("submitted scheduled job {id} (runs in ~30s)");

    println!("{}", server.status_string().await);
    Ok(())
}
