use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::ServerConfig;
use crate::http::connection::ConnectionContext;
use crate::http::parser::ParserLimits;
use crate::http::request::{Method, Request};
use crate::http::response::Response;
use crate::http::writer::{JsonEncoder, WireOptions};
use crate::logging::{LogSinks, Logger, codes};
use crate::server::pool::HandlerPool;
use crate::server::router::{RouteError, RoutingTable};
use crate::shutdown::{self, Shutdown, ShutdownTrigger};

/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// The HTTP server.
///
/// Routes are registered up front; registering the same method and path
/// twice fails immediately. [`start`](Server::start) binds the listener and
/// runs the accept loop on its own task; [`stop`](Server::stop) stops
/// accepting and waits for every open connection to finish.
pub struct Server {
    config: ServerConfig,
    routes: RoutingTable,
    sinks: LogSinks,
    logger: Arc<dyn Logger>,
    wire: WireOptions,
    running: Option<Running>,
}

struct Running {
    local_addr: SocketAddr,
    trigger: ShutdownTrigger,
    accept: JoinHandle<HandlerPool>,
    exited: watch::Receiver<bool>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let sinks = LogSinks::new();
        Self {
            wire: WireOptions::new(config.encoding),
            config,
            routes: RoutingTable::new(),
            logger: Arc::new(sinks.clone()),
            sinks,
            running: None,
        }
    }

    pub fn on_port(port: u16) -> Self {
        Self::new(ServerConfig::default().with_port(port))
    }

    pub fn local_only(mut self, value: bool) -> Self {
        self.config.local_only = value;
        self
    }

    pub fn set_info_logger(self, sink: impl Fn(u16, &str) + Send + Sync + 'static) -> Self {
        self.sinks.set_info_sink(sink);
        self
    }

    pub fn set_error_logger(self, sink: impl Fn(u16, &str) + Send + Sync + 'static) -> Self {
        self.sinks.set_error_sink(sink);
        self
    }

    /// Replaces the log sinks with a custom [`Logger`].
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn json_encoder(mut self, encoder: Arc<dyn JsonEncoder>) -> Self {
        self.wire.json = encoder;
        self
    }

    pub fn get<F, Fut>(self, path: &str, handler: F) -> Result<Self, RouteError>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.route(Method::GET, path, handler)
    }

    pub fn post<F, Fut>(self, path: &str, handler: F) -> Result<Self, RouteError>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.route(Method::POST, path, handler)
    }

    pub fn route<F, Fut>(mut self, method: Method, path: &str, handler: F) -> Result<Self, RouteError>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.routes.register(method, path, handler)?;
        Ok(self)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Address actually bound; useful with port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    /// Binds and starts accepting. A running server is stopped first.
    pub async fn start(&mut self) -> anyhow::Result<SocketAddr> {
        self.stop().await;

        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding {addr}"))?;
        let local_addr = listener.local_addr()?;
        info!("Listening on {}", local_addr);

        let (trigger, shutdown) = shutdown::channel();
        let (exited_tx, exited) = watch::channel(false);

        let ctx = Arc::new(ConnectionContext {
            routes: Arc::new(self.routes.clone()),
            wire: self.wire.clone(),
            limits: ParserLimits {
                max_line_length: self.config.max_line_length,
                max_body_bytes: self.config.max_body_bytes,
            },
            logger: Arc::clone(&self.logger),
            shutdown: shutdown.clone(),
        });

        let pool = HandlerPool::new(Arc::clone(&ctx));
        let accept = tokio::spawn(accept_loop(listener, pool, shutdown, Arc::clone(&self.logger), exited_tx));

        self.running = Some(Running {
            local_addr,
            trigger,
            accept,
            exited,
        });

        Ok(local_addr)
    }

    /// Stops accepting, then waits for in-flight connections to finish their
    /// current message. Idempotent.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        running.trigger.fire();

        match running.accept.await {
            Ok(pool) => {
                info!(handlers = pool.len(), in_flight = pool.busy_count(), "draining connections");
                pool.drain().await;
            }
            Err(e) => self
                .logger
                .error(codes::INTERNAL, &format!("accept loop failed: {e}")),
        }

        info!("Server stopped");
    }

    /// Resolves once the accept loop has ended (or immediately when the
    /// server is not running).
    pub async fn wait_for_exit(&self) {
        if let Some(running) = &self.running {
            let mut exited = running.exited.clone();
            let _ = exited.wait_for(|done| *done).await;
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.trigger.fire();
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    mut pool: HandlerPool,
    mut shutdown: Shutdown,
    logger: Arc<dyn Logger>,
    exited: watch::Sender<bool>,
) -> HandlerPool {
    logger.info(codes::LOOP_STARTED, "Accept loop started");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.fired() => break,

            res = listener.accept() => match res {
                Ok((socket, peer)) => {
                    tracing::debug!(peer = %peer, "Accepted connection");
                    let _ = socket.set_nodelay(true);
                    pool.dispatch(socket, Some(peer));
                }
                Err(e) => {
                    logger.error(codes::INTERNAL, &format!("accept failed: {e}"));
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }

    drop(listener);
    logger.info(codes::LOOP_STOPPED, "Accept loop stopped");
    exited.send_replace(true);
    pool
}
