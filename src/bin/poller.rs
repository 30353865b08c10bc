//! Sample client: connects (retrying forever) and polls `api/shared`.

use std::time::Duration;

use spud::{Client, ClientConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let client = Client::new(ClientConfig::load()?);

    let poll = async {
        loop {
            if !client.try_connect(Duration::ZERO).await {
                return;
            }

            let data = client.get("api/shared").await;
            if data.is_ok() {
                println!("{}", data.body_text());
            } else {
                tracing::error!(
                    status = data.status().as_u16(),
                    description = data.description(),
                    body = %data.body_text(),
                    "poll failed"
                );
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    };

    tokio::select! {
        _ = poll => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    client.disconnect().await;
    Ok(())
}
