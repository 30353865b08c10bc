//! Response parsing, mirroring the server's request parser.

use std::collections::HashMap;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;

use crate::http::encoding::TextEncoding;
use crate::http::parser::{LineSplitter, ParseError, parse_header};
use crate::http::response::{Response, StatusCode};

/// Caps a single status or header line.
const MAX_LINE_LENGTH: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ResponseError {
    #[error("connection closed before complete response received")]
    ConnectionClosed,
    #[error("timed out waiting for the response")]
    Timeout,
    #[error("empty status line")]
    EmptyStatusLine,
    #[error("invalid status line: {0}")]
    InvalidStatusLine(String),
    #[error("unrecognized status code {0}")]
    UnknownStatus(u16),
    #[error("could not parse as a header: {0}")]
    InvalidHeader(String),
    #[error("response line longer than {0} bytes")]
    LineTooLong(usize),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ParseError> for ResponseError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::LineTooLong(n) => ResponseError::LineTooLong(n),
            ParseError::InvalidHeader(line) => ResponseError::InvalidHeader(line),
            other => ResponseError::InvalidStatusLine(other.to_string()),
        }
    }
}

/// Reads responses off one connection. Bytes past the end of a response
/// stay buffered for the next read.
#[derive(Debug)]
pub struct ResponseReader {
    buffer: BytesMut,
    lines: LineSplitter,
    encoding: TextEncoding,
    receive_timeout: Duration,
}

impl ResponseReader {
    pub fn new(encoding: TextEncoding, receive_timeout: Duration) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            lines: LineSplitter::new(MAX_LINE_LENGTH),
            encoding,
            receive_timeout,
        }
    }

    pub async fn read<S>(&mut self, stream: &mut S) -> Result<Response, ResponseError>
    where
        S: AsyncRead + Unpin,
    {
        let mut line = self.next_line(stream).await?;
        if line.trim().is_empty() {
            // one stray blank line before the status line is tolerated
            line = self.next_line(stream).await?;
        }
        let (status, description) = parse_status_line(&line)?;

        let mut headers = HashMap::new();
        loop {
            let line = self.next_line(stream).await?;
            if line.trim().is_empty() {
                break;
            }
            let (key, value) = parse_header(&line)?;
            headers.insert(key, value);
        }

        let length = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("Content-Length"))
            .map(|(_, v)| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|_| ResponseError::InvalidHeader(format!("Content-Length: {v}")))
            })
            .transpose()?;

        let body = match length {
            Some(n) => Some(self.read_body(stream, n).await?),
            None => None,
        };

        Ok(Response::received(status, description, headers, body))
    }

    async fn next_line<S>(&mut self, stream: &mut S) -> Result<String, ResponseError>
    where
        S: AsyncRead + Unpin,
    {
        loop {
            if let Some(line) = self.lines.next_line(&mut self.buffer)? {
                return Ok(self.encoding.decode(&line));
            }
            self.fill(stream).await?;
        }
    }

    async fn read_body<S>(&mut self, stream: &mut S, length: usize) -> Result<String, ResponseError>
    where
        S: AsyncRead + Unpin,
    {
        while !self.lines.settle(&mut self.buffer) || self.buffer.len() < length {
            self.fill(stream).await?;
        }

        let body = self.buffer.split_to(length);
        Ok(self.encoding.decode(&body))
    }

    async fn fill<S>(&mut self, stream: &mut S) -> Result<(), ResponseError>
    where
        S: AsyncRead + Unpin,
    {
        let n = timeout(self.receive_timeout, stream.read_buf(&mut self.buffer))
            .await
            .map_err(|_| ResponseError::Timeout)??;

        if n == 0 {
            return Err(ResponseError::ConnectionClosed);
        }
        Ok(())
    }
}

/// `HTTP/1.1 <code> <reason>`; the reason may be missing or contain spaces.
fn parse_status_line(line: &str) -> Result<(StatusCode, String), ResponseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ResponseError::EmptyStatusLine);
    }

    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(ResponseError::InvalidStatusLine(line.to_string()));
    }

    let code: u16 = parts
        .next()
        .and_then(|c| c.trim().parse().ok())
        .ok_or_else(|| ResponseError::InvalidStatusLine(line.to_string()))?;
    let status = StatusCode::from_u16(code).ok_or(ResponseError::UnknownStatus(code))?;
    let description = parts.next().unwrap_or_default().trim().to_string();

    Ok((status, description))
}
