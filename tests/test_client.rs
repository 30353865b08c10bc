use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use spud::client::build_request;
use spud::http::encoding::TextEncoding;
use spud::http::writer::SERVER_NAME;
use spud::logging::codes;
use spud::{Client, ClientConfig, ContentKind, Method, Response, Server, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A port nothing listens on (bound once, then released).
async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

fn client_for(port: u16) -> Client {
    Client::new(ClientConfig {
        port,
        reconnect_delay_ms: 10,
        ..ClientConfig::default()
    })
}

/// Reads one body-less request head off `stream`, keeping extra bytes in `buf`.
async fn read_head(stream: &mut TcpStream, buf: &mut Vec<u8>) -> Option<String> {
    loop {
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head: Vec<u8> = buf.drain(..end + 4).collect();
            return Some(String::from_utf8_lossy(&head).into_owned());
        }
        let mut chunk = [0u8; 1024];
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return None,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

fn request_path(head: &str) -> String {
    head.split(' ').nth(1).unwrap_or_default().to_string()
}

#[tokio::test]
async fn test_fetch_while_disconnected() {
    let client = Client::on_port(1);

    let response = client.get("api/hello").await;

    assert!(!client.is_connected());
    assert_eq!(response.status(), StatusCode::BadRequest);
    assert_eq!(response.description(), "NotConnected");
}

#[tokio::test]
async fn test_try_connect_gives_up_after_limit() {
    let client = client_for(free_port().await);

    let connected = client.try_connect(Duration::from_millis(200)).await;

    assert!(!connected);
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_try_connect_waits_for_late_server() {
    let port = free_port().await;
    let infos = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&infos);
    let client = client_for(port).set_info_logger(move |code, _| sink.lock().unwrap().push(code));

    let late = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let mut server = Server::on_port(port)
            .get("api/hello-world", |_| async { Response::text("Hello World!") })
            .unwrap();
        server.start().await.unwrap();
        server
    });

    let connected = tokio::time::timeout(Duration::from_secs(5), client.try_connect(Duration::ZERO))
        .await
        .unwrap();
    let _server = late.await.unwrap();

    assert!(connected);
    assert!(client.is_connected());
    assert!(client.try_connect(Duration::ZERO).await);

    let response = client.get("api/hello-world").await;
    assert!(response.is_ok());
    assert_eq!(response.body_text(), "Hello World!");

    let infos = infos.lock().unwrap();
    assert!(infos.contains(&codes::CONNECTING));
    assert!(infos.contains(&codes::CONNECTED));
}

#[tokio::test]
async fn test_disconnect_cancels_pending_connect() {
    let client = Arc::new(client_for(free_port().await));

    let pending = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.try_connect(Duration::ZERO).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    client.disconnect().await;

    let connected = tokio::time::timeout(Duration::from_secs(2), pending)
        .await
        .unwrap()
        .unwrap();
    assert!(!connected);
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_disconnect_also_stops_connect_waiting_on_the_gate() {
    let client = Arc::new(client_for(free_port().await));

    let spawn_connect = |client: &Arc<Client>| {
        let client = Arc::clone(client);
        tokio::spawn(async move { client.try_connect(Duration::ZERO).await })
    };

    let first = spawn_connect(&client);
    tokio::time::sleep(Duration::from_millis(50)).await;
    // queued behind the first attempt, which holds the connection slot
    let second = spawn_connect(&client);
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(2), client.disconnect())
        .await
        .expect("disconnect stuck behind a queued connect");

    assert!(!first.await.unwrap());
    assert!(!second.await.unwrap());
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_connect_after_disconnect_succeeds() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let client = client_for(port);

    client.disconnect().await;

    assert!(client.try_connect(Duration::from_secs(2)).await);
    assert!(client.is_connected());
    drop(listener);
}

#[tokio::test]
async fn test_concurrent_fetches_never_interleave() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let interleaved = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interleaved);

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();

        while let Some(head) = read_head(&mut stream, &mut buf).await {
            // anything arriving before the response goes out means a second
            // request was written over this one
            if !buf.is_empty() {
                flag.store(true, Ordering::SeqCst);
            }
            let mut extra = [0u8; 256];
            if let Ok(Ok(n)) = tokio::time::timeout(Duration::from_millis(200), stream.read(&mut extra)).await {
                if n > 0 {
                    flag.store(true, Ordering::SeqCst);
                    buf.extend_from_slice(&extra[..n]);
                }
            }

            let body = request_path(&head);
            let response = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}", body.len(), body);
            stream.write_all(response.as_bytes()).await.unwrap();
        }
    });

    let client = Arc::new(client_for(port));
    assert!(client.try_connect(Duration::from_secs(2)).await);

    let a = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.get("first").await })
    };
    let b = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.get("second").await })
    };

    let a = a.await.unwrap();
    let b = b.await.unwrap();

    assert_eq!(a.body_text(), "/first");
    assert_eq!(b.body_text(), "/second");
    assert!(!interleaved.load(Ordering::SeqCst));
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_dropped_connection_yields_internal_error_and_disconnects() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let _ = read_head(&mut stream, &mut buf).await;
        drop(stream);
    });

    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    let client = client_for(port).set_error_logger(move |code, _| sink.lock().unwrap().push(code));
    assert!(client.try_connect(Duration::from_secs(2)).await);

    let response = client.get("api/anything").await;
    assert_eq!(response.status(), StatusCode::InternalServerError);
    assert!(!response.body_text().is_empty());
    assert!(!client.is_connected());
    assert!(errors.lock().unwrap().contains(&codes::EXCHANGE_FAILED));

    let again = client.get("api/anything").await;
    assert_eq!(again.description(), "NotConnected");
}

#[tokio::test]
async fn test_unknown_status_code_is_reported() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let _ = read_head(&mut stream, &mut buf).await;
        stream
            .write_all(b"HTTP/1.1 799 Strange\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
    });

    let client = client_for(port);
    assert!(client.try_connect(Duration::from_secs(2)).await);

    let response = client.get("api/odd").await;
    assert_eq!(response.status(), StatusCode::InternalServerError);
    assert!(response.body_text().contains("799"));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let _ = read_head(&mut stream, &mut buf).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let client = Client::new(ClientConfig {
        port,
        receive_timeout_ms: 100,
        ..ClientConfig::default()
    });
    assert!(client.try_connect(Duration::from_secs(2)).await);

    let response = client.get("api/slow").await;
    assert_eq!(response.status(), StatusCode::InternalServerError);
    assert!(response.body_text().contains("timed out"));
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Payload {
    name: String,
    count: u32,
    ratio: f64,
}

#[tokio::test]
async fn test_json_round_trip_through_server() {
    let mut server = Server::on_port(0)
        .post("api/json", |req| async move {
            match serde_json::from_str::<serde_json::Value>(req.body()) {
                Ok(value) => Response::json(&value).unwrap_or_else(|e| Response::internal_error(e.to_string())),
                Err(e) => Response::bad_request(e.to_string()),
            }
        })
        .unwrap();
    let addr = server.start().await.unwrap();

    let client = Client::new(ClientConfig::for_addr(addr));
    assert!(client.try_connect(Duration::from_secs(2)).await);

    let payload = Payload {
        name: "sensor".to_string(),
        count: 3,
        ratio: 0.25,
    };
    let response = client.post_json("api/json", &payload).await;

    assert!(response.is_ok());
    assert_eq!(
        response.get_header("Content-Type"),
        Some("application/json; charset=iso-8859-1")
    );
    assert_eq!(response.body_json::<Payload>().unwrap(), payload);

    client.disconnect().await;
    assert!(!client.is_connected());
}

#[test]
fn test_build_request_with_body() {
    let wire = build_request(
        Method::POST,
        "/api/sum",
        "127.0.0.1:11311",
        Some("2;3"),
        ContentKind::Text,
        TextEncoding::Latin1,
    );

    let expected = format!(
        "POST /api/sum HTTP/1.1\r\nHost: 127.0.0.1:11311\r\nUser-Agent: {}\r\nAccept: */*\r\nConnection: keep-alive\r\nContent-Type: text/plain; charset=iso-8859-1\r\nContent-Length: 3\r\n\r\n2;3",
        SERVER_NAME
    );
    assert_eq!(&wire[..], expected.as_bytes());
}

#[test]
fn test_build_request_without_body() {
    let wire = build_request(
        Method::GET,
        "api/my file",
        "localhost:80",
        None,
        ContentKind::Text,
        TextEncoding::Latin1,
    );
    let text = String::from_utf8(wire.to_vec()).unwrap();

    assert!(text.starts_with("GET /api/my%20file HTTP/1.1\r\n"));
    assert!(!text.contains("Content-Length"));
    assert!(text.ends_with("Connection: keep-alive\r\n\r\n"));
}

#[test]
fn test_build_request_counts_encoded_bytes() {
    let wire = build_request(
        Method::POST,
        "x",
        "h:1",
        Some("\u{e9}t\u{e9}"),
        ContentKind::Text,
        TextEncoding::Utf8,
    );
    let text = String::from_utf8(wire.to_vec()).unwrap();

    assert!(text.contains("Content-Length: 5\r\n"));
    assert!(text.contains("charset=utf-8"));
}
