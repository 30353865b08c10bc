//! Spud - minimal HTTP/1.1 server and client on raw sockets
//!
//! Core library for the wire protocol, the pooled connection handlers and the
//! serialized client connection manager.

pub mod client;
pub mod config;
pub mod http;
pub mod logging;
pub mod server;
pub mod shutdown;

pub use client::Client;
pub use config::{ClientConfig, ServerConfig};
pub use http::mime::ContentKind;
pub use http::request::{Method, Request};
pub use http::response::{Body, Response, StatusCode};
pub use logging::{LogSinks, Logger};
pub use server::Server;
