use std::collections::HashMap;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::encoding::TextEncoding;
use crate::http::mime::ContentKind;
use crate::http::response::StatusCode;

const HTTP_VERSION: &str = "HTTP/1.1";

/// Value of the `Server` header.
pub const SERVER_NAME: &str = concat!("spud/", env!("CARGO_PKG_VERSION"));

/// Header names the serializer always computes itself.
const RESERVED_HEADERS: [&str; 5] = [
    "Date",
    "Server",
    "Connection",
    "Content-Type",
    "Content-Length",
];

/// Turns structured bodies into text.
pub trait JsonEncoder: Send + Sync {
    fn encode(&self, value: &serde_json::Value) -> anyhow::Result<String>;
}

/// Compact `serde_json` output.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerdeJsonEncoder;

impl JsonEncoder for SerdeJsonEncoder {
    fn encode(&self, value: &serde_json::Value) -> anyhow::Result<String> {
        Ok(serde_json::to_string(value)?)
    }
}

/// Per-connection serialization settings.
#[derive(Clone)]
pub struct WireOptions {
    pub encoding: TextEncoding,
    pub json: Arc<dyn JsonEncoder>,
}

impl WireOptions {
    pub fn new(encoding: TextEncoding) -> Self {
        Self {
            encoding,
            json: Arc::new(SerdeJsonEncoder),
        }
    }

    pub fn with_json_encoder(mut self, json: Arc<dyn JsonEncoder>) -> Self {
        self.json = json;
        self
    }
}

impl Default for WireOptions {
    fn default() -> Self {
        Self::new(TextEncoding::default())
    }
}

impl std::fmt::Debug for WireOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireOptions")
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

/// Cached wire form of a response.
///
/// `head` ends right before the `Connection` header so the same sealed
/// response can go out on connections that stay open and ones that close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedResponse {
    head: Bytes,
    body: Bytes,
}

impl SealedResponse {
    pub fn frame(&self, keep_alive: bool) -> Bytes {
        let connection: &[u8] = if keep_alive {
            b"Connection: keep-alive\r\n\r\n"
        } else {
            b"Connection: close\r\n\r\n"
        };

        let mut buf = BytesMut::with_capacity(self.head.len() + connection.len() + self.body.len());
        buf.put_slice(&self.head);
        buf.put_slice(connection);
        buf.put_slice(&self.body);
        buf.freeze()
    }
}

pub(crate) fn render(
    status: StatusCode,
    description: &str,
    kind: ContentKind,
    headers: &HashMap<String, String>,
    body: Option<&str>,
    opts: &WireOptions,
) -> SealedResponse {
    let mut head = String::new();

    head.push_str(&format!("{} {} {}\r\n", HTTP_VERSION, status.as_u16(), description));
    head.push_str(&format!("Date: {}\r\n", http_date()));
    head.push_str(&format!("Server: {}\r\n", SERVER_NAME));

    // Sorted so the output does not depend on hash order.
    let mut custom: Vec<_> = headers
        .iter()
        .filter(|(k, _)| !RESERVED_HEADERS.iter().any(|r| r.eq_ignore_ascii_case(k)))
        .collect();
    custom.sort();
    for (k, v) in custom {
        head.push_str(&format!("{}: {}\r\n", k, v));
    }

    let body = match body {
        Some(text) => {
            let encoded = opts.encoding.encode(text);
            head.push_str(&format!(
                "Content-Type: {}; charset={}\r\n",
                kind.mime(),
                opts.encoding.charset()
            ));
            head.push_str(&format!("Content-Length: {}\r\n", encoded.len()));
            Bytes::from(encoded)
        }
        None => {
            head.push_str("Content-Length: 0\r\n");
            Bytes::new()
        }
    };

    SealedResponse {
        head: Bytes::from(opts.encoding.encode(&head)),
        body,
    }
}

fn http_date() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

pub struct ResponseWriter {
    buffer: Bytes,
    written: usize,
}

impl ResponseWriter {
    pub fn new(wire: Bytes) -> Self {
        Self {
            buffer: wire,
            written: 0,
        }
    }

    pub async fn write_to_stream<W>(&mut self, stream: &mut W) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        while self.written < self.buffer.len() {
            let n = stream.write(&self.buffer[self.written..]).await?;

            if n == 0 {
                return Err(anyhow::anyhow!("connection closed while writing"));
            }

            self.written += n;
        }

        stream.flush().await?;
        Ok(())
    }
}
