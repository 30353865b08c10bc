//! Sample server: a few endpoints plus a shared snapshot that a background
//! task refreshes and seals every 100 ms.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use spud::http::writer::WireOptions;
use spud::{Response, Server, ServerConfig, StatusCode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = ServerConfig::load()?;
    let wire = WireOptions::new(cfg.encoding);

    let shared: Arc<RwLock<Option<Response>>> = Arc::new(RwLock::new(None));
    let updater = tokio::spawn(refresh_snapshot(Arc::clone(&shared), wire));

    let snapshot = Arc::clone(&shared);
    let mut server = Server::new(cfg)
        .get("api/hello-world", |_req| async { Response::text("Hello World!") })?
        .get("api/body", |req| async move { Response::text(req.body()) })?
        .get("api/echo", |req| async move { Response::text(req.body()) })?
        .post("api/sum", |req| async move { sum(req.body()) })?
        .get("api/shared", move |_req| {
            let snapshot = snapshot.read().ok().and_then(|s| s.clone());
            async move {
                snapshot.unwrap_or_else(|| {
                    Response::new(StatusCode::NotFound)
                        .body("The resource could not be found, please try again")
                })
            }
        })?;

    server.start().await?;

    tokio::select! {
        _ = server.wait_for_exit() => {}

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    updater.abort();
    server.stop().await;
    Ok(())
}

/// `"a;b"` -> `a + b`.
fn sum(body: &str) -> Response {
    let parsed: Result<Vec<i64>, _> = body.split(';').map(|p| p.trim().parse::<i64>()).collect();
    match parsed.as_deref() {
        Ok([a, b]) => Response::new(StatusCode::Ok).body(a + b),
        _ => Response::bad_request(format!("expected two ';'-separated integers, got {body:?}")),
    }
}

async fn refresh_snapshot(shared: Arc<RwLock<Option<Response>>>, wire: WireOptions) {
    let started = Instant::now();
    let mut ticker = tokio::time::interval(Duration::from_millis(100));

    loop {
        ticker.tick().await;

        let value = (started.elapsed().as_secs_f64() * 0.3).sin();
        let body = format!(
            "time={}\nvalue={}\ncheck={}",
            chrono::Utc::now().timestamp_millis(),
            value,
            u8::from(value > 0.0)
        );

        let mut response = Response::text(body);
        if let Err(e) = response.seal(&wire) {
            tracing::error!(error = %e, "could not seal snapshot");
            continue;
        }

        if let Ok(mut slot) = shared.write() {
            *slot = Some(response);
        }
    }
}
