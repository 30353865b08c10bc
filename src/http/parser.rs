//! Incremental HTTP/1.1 request parser.
//!
//! Bytes are fed in whatever fragments the socket produces. The parser keeps
//! its position between calls (`Root -> Headers -> Body`) and only consumes
//! bytes belonging to the current message, so anything read past the message
//! boundary stays in the buffer for the next pipelined request.

use std::borrow::Cow;
use std::collections::HashMap;

use bytes::{Buf, BytesMut};

use crate::http::encoding::TextEncoding;
use crate::http::request::Method;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unsupported method {0:?}")]
    InvalidMethod(String),
    #[error("malformed request line {0:?}")]
    InvalidRequestLine(String),
    #[error("could not parse as a header: {0}")]
    InvalidHeader(String),
    #[error("line longer than {0} bytes")]
    LineTooLong(usize),
    #[error("declared body of {0} bytes exceeds the limit")]
    BodyTooLarge(usize),
}

/// Splits `\n`, `\r\n` and lone `\r` terminated lines off a byte buffer.
#[derive(Debug)]
pub struct LineSplitter {
    /// A `\r` ended the last line at the very end of the buffer; a `\n`
    /// arriving next belongs to that terminator.
    pending_lf: bool,
    max_line_length: usize,
}

impl LineSplitter {
    pub fn new(max_line_length: usize) -> Self {
        Self {
            pending_lf: false,
            max_line_length,
        }
    }

    /// Drops the `\n` half of a split `\r\n` terminator if it is available.
    /// Returns `false` while that byte has not arrived yet.
    pub fn settle(&mut self, buf: &mut BytesMut) -> bool {
        if self.pending_lf {
            let Some(&first) = buf.first() else {
                return false;
            };
            if first == b'\n' {
                buf.advance(1);
            }
            self.pending_lf = false;
        }
        true
    }

    /// Takes the next complete line off the front of `buf`, without its
    /// terminator. `Ok(None)` means more bytes are needed.
    pub fn next_line(&mut self, buf: &mut BytesMut) -> Result<Option<BytesMut>, ParseError> {
        if !self.settle(buf) {
            return Ok(None);
        }

        let Some(end) = buf.iter().position(|&b| b == b'\n' || b == b'\r') else {
            if buf.len() > self.max_line_length {
                return Err(ParseError::LineTooLong(self.max_line_length));
            }
            return Ok(None);
        };

        if end > self.max_line_length {
            return Err(ParseError::LineTooLong(self.max_line_length));
        }

        let line = buf.split_to(end);
        let terminator = buf[0];
        buf.advance(1);

        if terminator == b'\r' {
            match buf.first() {
                Some(b'\n') => buf.advance(1),
                Some(_) => {}
                None => self.pending_lf = true,
            }
        }

        Ok(Some(line))
    }

    pub fn reset(&mut self) {
        self.pending_lf = false;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParserLimits {
    pub max_line_length: usize,
    pub max_body_bytes: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            max_line_length: 8 * 1024,
            max_body_bytes: 8 * 1024 * 1024,
        }
    }
}

/// A fully framed request message.
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HashMap<String, String>,
    /// `None` when no `Content-Length` was sent.
    pub body: Option<String>,
    /// Raw `Content-Length` value that failed to parse; the body was taken
    /// as empty.
    pub malformed_length: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ReadMode {
    Root,
    Headers,
    Body,
}

#[derive(Debug)]
struct RequestHead {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
}

#[derive(Debug)]
pub struct RequestParser {
    mode: ReadMode,
    lines: LineSplitter,
    encoding: TextEncoding,
    max_body_bytes: usize,
    head: Option<RequestHead>,
    headers: HashMap<String, String>,
    body: BytesMut,
    content_length: usize,
    malformed_length: Option<String>,
}

impl RequestParser {
    pub fn new(encoding: TextEncoding, limits: ParserLimits) -> Self {
        Self {
            mode: ReadMode::Root,
            lines: LineSplitter::new(limits.max_line_length),
            encoding,
            max_body_bytes: limits.max_body_bytes,
            head: None,
            headers: HashMap::new(),
            body: BytesMut::new(),
            content_length: 0,
            malformed_length: None,
        }
    }

    /// `true` between messages, when no part of a request has been consumed.
    pub fn is_idle(&self) -> bool {
        self.mode == ReadMode::Root
    }

    pub fn reset(&mut self) {
        self.mode = ReadMode::Root;
        self.lines.reset();
        self.head = None;
        self.headers.clear();
        self.body.clear();
        self.content_length = 0;
        self.malformed_length = None;
    }

    /// Advances over whatever `buf` holds. Returns the message once it is
    /// complete, `Ok(None)` when more bytes are needed.
    pub fn parse(&mut self, buf: &mut BytesMut) -> Result<Option<ParsedMessage>, ParseError> {
        loop {
            match self.mode {
                ReadMode::Root => {
                    let Some(line) = self.lines.next_line(buf)? else {
                        return Ok(None);
                    };
                    let line = self.encoding.decode(&line);
                    if line.trim().is_empty() {
                        continue;
                    }

                    self.head = Some(parse_request_line(&line)?);
                    self.mode = ReadMode::Headers;
                }

                ReadMode::Headers => {
                    let Some(line) = self.lines.next_line(buf)? else {
                        return Ok(None);
                    };
                    let line = self.encoding.decode(&line);

                    if !line.trim().is_empty() {
                        let (key, value) = parse_header(&line)?;
                        self.headers.insert(key, value);
                        continue;
                    }

                    match self.declared_length()? {
                        None => return Ok(Some(self.finish(None))),
                        Some(0) => return Ok(Some(self.finish(Some(String::new())))),
                        Some(n) => {
                            self.content_length = n;
                            self.body.reserve(n);
                            self.mode = ReadMode::Body;
                        }
                    }
                }

                ReadMode::Body => {
                    if !self.lines.settle(buf) {
                        return Ok(None);
                    }

                    let wanted = self.content_length - self.body.len();
                    let take = wanted.min(buf.len());
                    self.body.extend_from_slice(&buf.split_to(take));

                    if self.body.len() < self.content_length {
                        return Ok(None);
                    }

                    let body = self.encoding.decode(&self.body);
                    return Ok(Some(self.finish(Some(body))));
                }
            }
        }
    }

    fn declared_length(&mut self) -> Result<Option<usize>, ParseError> {
        let Some(raw) = self
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("Content-Length"))
            .map(|(_, v)| v.clone())
        else {
            return Ok(None);
        };

        match raw.trim().parse::<usize>() {
            Ok(n) if n > self.max_body_bytes => Err(ParseError::BodyTooLarge(n)),
            Ok(n) => Ok(Some(n)),
            Err(_) => {
                self.malformed_length = Some(raw);
                Ok(Some(0))
            }
        }
    }

    fn finish(&mut self, body: Option<String>) -> ParsedMessage {
        // The head is always set once we leave Root.
        let head = self.head.take().unwrap_or(RequestHead {
            method: Method::GET,
            path: String::new(),
            query: Vec::new(),
        });

        let message = ParsedMessage {
            method: head.method,
            path: head.path,
            query: head.query,
            headers: std::mem::take(&mut self.headers),
            body,
            malformed_length: self.malformed_length.take(),
        };

        self.mode = ReadMode::Root;
        self.body.clear();
        self.content_length = 0;
        message
    }
}

/// `<METHOD> <url> HTTP/<version>`; the url runs up to the last `HTTP/`.
fn parse_request_line(line: &str) -> Result<RequestHead, ParseError> {
    let line = line.trim();
    let method_str = line.split(' ').next().unwrap_or_default();
    let method = Method::from_str(method_str)
        .ok_or_else(|| ParseError::InvalidMethod(method_str.to_string()))?;

    let rest = line[method_str.len()..].trim_start();
    let target = match rest.rfind("HTTP/") {
        Some(i) => &rest[..i],
        None => rest,
    }
    .trim();

    if target.is_empty() {
        return Err(ParseError::InvalidRequestLine(line.to_string()));
    }

    let (raw_path, raw_query) = match target.split_once('?') {
        Some((p, q)) => (p, q.trim()),
        None => (target, ""),
    };

    let path = urlencoding::decode(raw_path)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| raw_path.to_string());

    let query = url::form_urlencoded::parse(raw_query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    Ok(RequestHead {
        method,
        path,
        query,
    })
}

/// `<name>:<value>`, split on the first colon, both sides trimmed. Only a
/// missing colon is an error; an empty name is kept as `""`.
pub fn parse_header(line: &str) -> Result<(String, String), ParseError> {
    let (key, value) = line
        .split_once(':')
        .ok_or_else(|| ParseError::InvalidHeader(line.to_string()))?;

    Ok((key.trim().to_string(), value.trim().to_string()))
}
