//! Injected logger capability.
//!
//! Every component logs through a [`Logger`] handed to it at construction
//! instead of a process-wide console. [`LogSinks`] is the stock implementation:
//! it forwards to user supplied closures when present and to `tracing`
//! otherwise.

use std::sync::{Arc, RwLock};

/// Diagnostic codes attached to log lines.
pub mod codes {
    pub const LOOP_STARTED: u16 = 90;
    pub const HANDLER_CREATED: u16 = 91;
    pub const LOOP_STOPPED: u16 = 99;
    pub const INTERNAL: u16 = 500;
    pub const BAD_HEADER: u16 = 847;
    pub const BAD_METHOD: u16 = 848;
    pub const ROUTE_MISS: u16 = 9487;
    pub const BAD_CONTENT_LENGTH: u16 = 12637;
    pub const REQUESTED: u16 = 21487;
    pub const NO_RESPONSE: u16 = 36273;
    pub const KILL_CONNECTION: u16 = 43523;
    pub const TRANSPORT: u16 = 43524;

    pub const COULD_NOT_CONNECT: u16 = 1;
    pub const CONNECTED: u16 = 2;
    pub const EXCHANGE_FAILED: u16 = 3;
    pub const CONNECTING: u16 = 4;
    pub const DISCONNECTED: u16 = 5;
}

pub trait Logger: Send + Sync {
    fn info(&self, code: u16, message: &str);
    fn error(&self, code: u16, message: &str);
}

type Sink = Arc<dyn Fn(u16, &str) + Send + Sync>;

/// Pluggable info/error sinks with a `tracing` fallback.
#[derive(Default, Clone)]
pub struct LogSinks {
    info: Arc<RwLock<Option<Sink>>>,
    error: Arc<RwLock<Option<Sink>>>,
}

impl LogSinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_info_sink(&self, sink: impl Fn(u16, &str) + Send + Sync + 'static) {
        *self.info.write().expect("log sink lock poisoned") = Some(Arc::new(sink));
    }

    pub fn set_error_sink(&self, sink: impl Fn(u16, &str) + Send + Sync + 'static) {
        *self.error.write().expect("log sink lock poisoned") = Some(Arc::new(sink));
    }

    fn sink(slot: &RwLock<Option<Sink>>) -> Option<Sink> {
        slot.read().expect("log sink lock poisoned").clone()
    }
}

impl Logger for LogSinks {
    fn info(&self, code: u16, message: &str) {
        match Self::sink(&self.info) {
            Some(sink) => sink(code, message),
            None => tracing::info!(code, "{}", message),
        }
    }

    fn error(&self, code: u16, message: &str) {
        match Self::sink(&self.error) {
            Some(sink) => sink(code, message),
            None => tracing::error!(code, "{}", message),
        }
    }
}

impl std::fmt::Debug for LogSinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSinks").finish_non_exhaustive()
    }
}
