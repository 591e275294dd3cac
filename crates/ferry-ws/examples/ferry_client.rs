//! Ferry client walkthrough.
//!
//! Connects to a backend, saves a spider, renames it and watches the
//! connection status until interrupted.
//!
//! Run with: `cargo run -p ferry-ws --example ferry_client -- ws://localhost:9001/ws`

use ferry_ws::websocket::{ClientConfig, FerryClient};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize)]
struct Spider {
    name: String,
    start_urls: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://localhost:9001/ws".to_string());
    let client = FerryClient::new(ClientConfig::new(url).project("demo"))?;

    client.add_command("spiderChanged", |frame| {
        info!(spider = ?frame.get("spider"), "Spider changed on the server");
        Ok(())
    });
    client.connect();

    let mut status = client.watch_status();
    status.wait_for(|s| s.is_open()).await?;

    let spider = Spider {
        name: "books".to_string(),
        start_urls: vec!["https://books.toscrape.com/".to_string()],
    };
    match client.save("spider", &spider).await {
        Ok(reply) => info!(%reply, "Saved spider"),
        Err(e) => warn!(error = %e, "Save failed"),
    }
    match client.rename("spider", "books", "books-v2").await {
        Ok(reply) => info!(%reply, "Renamed spider"),
        Err(e) => warn!(error = %e, "Rename failed"),
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                info!(
                    state = ?current.state,
                    reconnect_in = current.seconds_until_reconnect,
                    "Connection status"
                );
            }
        }
    }

    client.shutdown();
    Ok(())
}
