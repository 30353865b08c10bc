//! Pool of reusable connection handlers.
//!
//! The acceptor owns the pool and is the only one that grows it. Handlers are
//! claimed with an atomic compare-and-set on their `busy` flag and released
//! by their connection task when it ends, so a handler is never assigned two
//! connections at once. The pool never shrinks.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;

use crate::http::connection::{Connection, ConnectionContext};
use crate::logging::codes;

const READ_BUFFER_SIZE: usize = 4096;

pub struct Worker {
    id: usize,
    busy: AtomicBool,
    /// Read buffer kept between connections.
    buffer: Mutex<BytesMut>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Frees the worker when the connection task ends, even by panic.
struct Release {
    worker: Arc<Worker>,
    free_hint: Arc<AtomicUsize>,
}

impl Drop for Release {
    fn drop(&mut self) {
        self.worker.busy.store(false, Ordering::Release);
        self.free_hint.store(self.worker.id, Ordering::Relaxed);
    }
}

impl Worker {
    fn new(id: usize) -> Self {
        Self {
            id,
            busy: AtomicBool::new(true),
            buffer: Mutex::new(BytesMut::with_capacity(READ_BUFFER_SIZE)),
            task: Mutex::new(None),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn try_claim(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn handle<S>(self: &Arc<Self>, stream: S, peer: Option<SocketAddr>, ctx: Arc<ConnectionContext>, free_hint: Arc<AtomicUsize>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let buffer = std::mem::take(&mut *self.buffer.lock().expect("worker buffer lock poisoned"));
        let release = Release {
            worker: Arc::clone(self),
            free_hint,
        };

        let handle = tokio::spawn(async move {
            let logger = Arc::clone(&ctx.logger);
            let mut conn = Connection::new(stream, peer, ctx, buffer);

            if let Err(e) = conn.run().await {
                let peer = peer.map(|p| p.to_string()).unwrap_or_default();
                logger.error(codes::TRANSPORT, &format!("Connection error from {peer}: {e:#}"));
            }

            let mut buffer = conn.into_buffer();
            buffer.clear();
            *release.worker.buffer.lock().expect("worker buffer lock poisoned") = buffer;
            drop(release);
        });

        *self.task.lock().expect("worker task lock poisoned") = Some(handle);
    }

    fn take_task(&self) -> Option<JoinHandle<()>> {
        self.task.lock().expect("worker task lock poisoned").take()
    }
}

pub struct HandlerPool {
    workers: Vec<Arc<Worker>>,
    /// Id of the most recently released worker; scanning starts here.
    free_hint: Arc<AtomicUsize>,
    ctx: Arc<ConnectionContext>,
}

impl HandlerPool {
    pub fn new(ctx: Arc<ConnectionContext>) -> Self {
        Self {
            workers: Vec::new(),
            free_hint: Arc::new(AtomicUsize::new(0)),
            ctx,
        }
    }

    /// Claims a free worker, creating one when every worker is busy.
    pub fn acquire(&mut self) -> Arc<Worker> {
        let len = self.workers.len();
        let start = self.free_hint.load(Ordering::Relaxed);

        for offset in 0..len {
            let worker = &self.workers[(start + offset) % len];
            if worker.try_claim() {
                return Arc::clone(worker);
            }
        }

        let worker = Arc::new(Worker::new(len));
        self.workers.push(Arc::clone(&worker));
        self.ctx.logger.info(
            codes::HANDLER_CREATED,
            &format!("Created new handler, total: {}", self.workers.len()),
        );
        worker
    }

    /// Hands `stream` to a claimed worker, which runs the connection on its
    /// own task. Never waits for the connection.
    pub fn dispatch<S>(&mut self, stream: S, peer: Option<SocketAddr>) -> usize
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let worker = self.acquire();
        worker.handle(stream, peer, Arc::clone(&self.ctx), Arc::clone(&self.free_hint));
        worker.id()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn busy_count(&self) -> usize {
        self.workers.iter().filter(|w| w.is_busy()).count()
    }

    /// Waits for every in-flight connection to finish.
    pub async fn drain(&self) {
        for worker in &self.workers {
            if let Some(task) = worker.take_task() {
                if let Err(e) = task.await {
                    tracing::error!(worker = worker.id(), error = %e, "connection task failed");
                }
            }
        }
    }
}
