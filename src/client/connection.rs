//! Client connection manager.
//!
//! One outbound connection per [`Client`]. The live socket sits behind an
//! async mutex that doubles as the serialization gate: a `fetch` holds it for
//! the whole exchange, so a second caller's request line is only written
//! after the first caller's response has been read. There are no correlation
//! ids on the wire, so interleaving would corrupt both responses.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::timeout;

use crate::client::reader::ResponseReader;
use crate::config::ClientConfig;
use crate::http::encoding::TextEncoding;
use crate::http::mime::ContentKind;
use crate::http::request::Method;
use crate::http::response::Response;
use crate::http::writer::{ResponseWriter, SERVER_NAME};
use crate::logging::{LogSinks, Logger, codes};
use crate::shutdown::{self, Shutdown, ShutdownTrigger};

/// The live half of a connected client.
struct Link {
    stream: TcpStream,
    reader: ResponseReader,
    cancel: Shutdown,
}

pub struct Client {
    config: ClientConfig,
    endpoint: String,
    sinks: LogSinks,
    logger: Arc<dyn Logger>,
    connected: AtomicBool,
    link: AsyncMutex<Option<Link>>,
    cancel: Mutex<ShutdownTrigger>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        let sinks = LogSinks::new();
        let (trigger, _) = shutdown::channel();
        Self {
            endpoint: config.endpoint(),
            config,
            logger: Arc::new(sinks.clone()),
            sinks,
            connected: AtomicBool::new(false),
            link: AsyncMutex::new(None),
            cancel: Mutex::new(trigger),
        }
    }

    /// A client for `127.0.0.1:<port>` with default settings.
    pub fn on_port(port: u16) -> Self {
        Self::new(ClientConfig {
            port,
            ..ClientConfig::default()
        })
    }

    pub fn set_info_logger(self, sink: impl Fn(u16, &str) + Send + Sync + 'static) -> Self {
        self.sinks.set_info_sink(sink);
        self
    }

    pub fn set_error_logger(self, sink: impl Fn(u16, &str) + Send + Sync + 'static) -> Self {
        self.sinks.set_error_sink(sink);
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Connects, retrying until it succeeds, `limit` elapses or
    /// [`disconnect`](Client::disconnect) is called. A zero `limit` retries
    /// forever. Returns `true` at once when already connected.
    pub async fn try_connect(&self, limit: Duration) -> bool {
        if self.is_connected() {
            return true;
        }

        // A disconnect() issued while we wait for the gate fires this one.
        let earlier = self.cancel.lock().expect("client cancel lock poisoned").subscribe();

        let mut link = self.link.lock().await;
        if self.is_connected() {
            return true;
        }
        link.take();

        let cancel = {
            let mut slot = self.cancel.lock().expect("client cancel lock poisoned");
            if earlier.fired_since_created() {
                return false;
            }
            let (trigger, cancel) = shutdown::channel();
            *slot = trigger;
            cancel
        };

        let attempts = self.connect_loop(cancel.clone());
        let stream = if limit.is_zero() {
            attempts.await
        } else {
            timeout(limit, attempts).await.ok().flatten()
        };

        match stream {
            Some(stream) => {
                *link = Some(Link {
                    stream,
                    reader: ResponseReader::new(self.config.encoding, self.config.receive_timeout()),
                    cancel,
                });
                self.connected.store(true, Ordering::Release);
                self.logger
                    .info(codes::CONNECTED, &format!("Connected to {}", self.endpoint));
                true
            }
            None => {
                self.logger.error(
                    codes::COULD_NOT_CONNECT,
                    &format!("Could not connect to {} within {:?}", self.endpoint, limit),
                );
                false
            }
        }
    }

    async fn connect_loop(&self, mut cancel: Shutdown) -> Option<TcpStream> {
        self.logger
            .info(codes::CONNECTING, &format!("Connecting to {}...", self.endpoint));

        loop {
            let attempt = timeout(self.config.connect_timeout(), TcpStream::connect(&self.endpoint));

            tokio::select! {
                biased;

                _ = cancel.fired() => return None,

                res = attempt => match res {
                    Ok(Ok(stream)) => {
                        let _ = stream.set_nodelay(true);
                        return Some(stream);
                    }
                    Ok(Err(e)) => tracing::trace!(endpoint = %self.endpoint, error = %e, "connect attempt failed"),
                    Err(_) => tracing::trace!(endpoint = %self.endpoint, "connect attempt timed out"),
                },
            }

            let delay = self.config.reconnect_delay();
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::select! {
                    biased;
                    _ = cancel.fired() => return None,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    /// Cancels whatever is in flight and drops the socket. Idempotent.
    pub async fn disconnect(&self) {
        self.cancel.lock().expect("client cancel lock poisoned").fire();
        let mut link = self.link.lock().await;
        self.dispose(&mut link);
    }

    fn dispose(&self, link: &mut Option<Link>) {
        if link.take().is_some() {
            self.logger
                .info(codes::DISCONNECTED, &format!("Disconnected from {}", self.endpoint));
        }
        self.connected.store(false, Ordering::Release);
    }

    pub async fn get(&self, url: &str) -> Response {
        self.fetch(Method::GET, url, None, ContentKind::Text).await
    }

    pub async fn post(&self, url: &str, body: &str) -> Response {
        self.fetch(Method::POST, url, Some(body), ContentKind::Text).await
    }

    pub async fn post_with_kind(&self, url: &str, body: &str, kind: ContentKind) -> Response {
        self.fetch(Method::POST, url, Some(body), kind).await
    }

    /// Posts `value` encoded as JSON.
    pub async fn post_json<T: Serialize + ?Sized>(&self, url: &str, value: &T) -> Response {
        match serde_json::to_string(value) {
            Ok(body) => self.post_with_kind(url, &body, ContentKind::Json).await,
            Err(e) => Response::internal_error(format!("could not encode request body: {e}")),
        }
    }

    /// One request/response exchange.
    ///
    /// Never fails: a missing connection yields [`Response::not_connected`]
    /// without touching the network, and any failure during the exchange
    /// yields a synthetic 500 carrying the error text, after which the client
    /// is disconnected and must reconnect explicitly.
    pub async fn fetch(&self, method: Method, url: &str, body: Option<&str>, kind: ContentKind) -> Response {
        if !self.is_connected() {
            return Response::not_connected();
        }

        let mut guard = self.link.lock().await;
        let Some(link) = guard.as_mut() else {
            return Response::not_connected();
        };

        let request = build_request(method, url, &self.endpoint, body, kind, self.config.encoding);
        let result = exchange(link, request, self.config.send_timeout()).await;

        match result {
            Ok(response) => response,
            Err(e) => {
                self.logger.error(
                    codes::EXCHANGE_FAILED,
                    &format!("{} {} failed: {:#}", method, url, e),
                );
                self.dispose(&mut guard);
                Response::internal_error(format!("{e:#}"))
            }
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Ok(trigger) = self.cancel.lock() {
            trigger.fire();
        }
    }
}

async fn exchange(link: &mut Link, request: Bytes, send_timeout: Duration) -> anyhow::Result<Response> {
    let mut cancel = link.cancel.clone();

    tokio::select! {
        biased;

        _ = cancel.fired() => anyhow::bail!("request cancelled"),

        res = async {
            let mut writer = ResponseWriter::new(request);
            timeout(send_timeout, writer.write_to_stream(&mut link.stream))
                .await
                .context("timed out sending request")??;

            let response = link.reader.read(&mut link.stream).await?;
            anyhow::Ok(response)
        } => res,
    }
}

/// Request line, the fixed header set and, when present, the body with its
/// computed `Content-Type`/`Content-Length`.
pub fn build_request(
    method: Method,
    url: &str,
    host: &str,
    body: Option<&str>,
    kind: ContentKind,
    encoding: TextEncoding,
) -> Bytes {
    let path = format!("/{}", url.trim_start_matches('/')).replace(' ', "%20");

    let mut head = format!("{} {} HTTP/1.1\r\n", method, path);
    head.push_str(&format!("Host: {}\r\n", host));
    head.push_str(&format!("User-Agent: {}\r\n", SERVER_NAME));
    head.push_str("Accept: */*\r\n");
    head.push_str("Connection: keep-alive\r\n");

    let wire = match body {
        Some(text) => {
            let encoded = encoding.encode(text);
            head.push_str(&format!("Content-Type: {}; charset={}\r\n", kind.mime(), encoding.charset()));
            head.push_str(&format!("Content-Length: {}\r\n\r\n", encoded.len()));
            let mut wire = encoding.encode(&head);
            wire.extend_from_slice(&encoded);
            wire
        }
        None => {
            head.push_str("\r\n");
            encoding.encode(&head)
        }
    };

    Bytes::from(wire)
}
