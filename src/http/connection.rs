use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::http::parser::{ParseError, ParsedMessage, ParserLimits, RequestParser};
use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};
use crate::http::writer::{ResponseWriter, WireOptions};
use crate::logging::{Logger, codes};
use crate::server::router::{BoxedHandler, RoutingTable};
use crate::shutdown::Shutdown;

/// Everything a connection needs from its server. Shared by all handlers.
pub struct ConnectionContext {
    pub routes: Arc<RoutingTable>,
    pub wire: WireOptions,
    pub limits: ParserLimits,
    pub logger: Arc<dyn Logger>,
    pub shutdown: Shutdown,
}

/// What the parser handed over for one message.
pub enum Exchange {
    /// A route matched; run its handler.
    Dispatch {
        handler: BoxedHandler,
        request: Request,
        close: bool,
    },
    /// Answer with a prebuilt response (routing miss or protocol error).
    Respond { response: Response, close: bool },
}

pub enum ConnectionState {
    Reading,
    Processing(Exchange),
    Writing(ResponseWriter, bool), // bool = keep_alive?
    Closed,
}

pub struct Connection<S> {
    stream: S,
    peer: Option<SocketAddr>,
    buffer: BytesMut,
    parser: RequestParser,
    state: ConnectionState,
    ctx: Arc<ConnectionContext>,
    shutdown: Shutdown,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// `buffer` is a recycled read buffer; it is cleared before use.
    pub fn new(stream: S, peer: Option<SocketAddr>, ctx: Arc<ConnectionContext>, mut buffer: BytesMut) -> Self {
        buffer.clear();
        Self {
            stream,
            peer,
            buffer,
            parser: RequestParser::new(ctx.wire.encoding, ctx.limits),
            state: ConnectionState::Reading,
            shutdown: ctx.shutdown.clone(),
            ctx,
        }
    }

    /// Hands the read buffer back for reuse by the next connection.
    pub fn into_buffer(self) -> BytesMut {
        self.buffer
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            let state = std::mem::replace(&mut self.state, ConnectionState::Closed);

            self.state = match state {
                ConnectionState::Reading => match self.read_request().await? {
                    Some(exchange) => ConnectionState::Processing(exchange),
                    None => ConnectionState::Closed,
                },

                ConnectionState::Processing(exchange) => {
                    let (mut response, keep_alive) = Self::process(exchange).await;
                    self.serialize(&mut response, keep_alive)
                }

                ConnectionState::Writing(mut writer, keep_alive) => {
                    writer
                        .write_to_stream(&mut self.stream)
                        .await
                        .context("writing response")?;

                    if keep_alive {
                        self.parser.reset();
                        ConnectionState::Reading // go back for next request
                    } else {
                        self.ctx
                            .logger
                            .info(codes::KILL_CONNECTION, &format!("Killing connection to {}", self.peer_name()));
                        let _ = self.stream.shutdown().await;
                        ConnectionState::Closed
                    }
                }

                ConnectionState::Closed => break,
            };
        }

        Ok(())
    }

    /// Reads until one message is framed. `None` means the loop should end:
    /// the peer closed, the server is stopping, or the stream ended mid-message.
    pub async fn read_request(&mut self) -> anyhow::Result<Option<Exchange>> {
        loop {
            // Try parsing whatever we already have
            match self.parser.parse(&mut self.buffer) {
                Ok(Some(message)) => return Ok(Some(self.route(message))),
                Ok(None) => {}
                Err(e) => return Ok(Some(self.reject(e))),
            }

            let peer = self.peer_name();
            let n = tokio::select! {
                biased;

                _ = self.shutdown.fired() => {
                    tracing::debug!(peer = %peer, "shutdown while reading, closing connection");
                    return Ok(None);
                }

                res = self.stream.read_buf(&mut self.buffer) => res.context("reading request")?,
            };

            if n == 0 {
                let idle = self.parser.is_idle() && self.buffer.iter().all(u8::is_ascii_whitespace);
                if !idle {
                    self.ctx.logger.error(
                        codes::TRANSPORT,
                        &format!("{} closed the connection mid-message", peer),
                    );
                }
                return Ok(None);
            }
        }
    }

    fn route(&self, message: ParsedMessage) -> Exchange {
        let mut close = false;

        if let Some(raw) = &message.malformed_length {
            self.ctx.logger.error(
                codes::BAD_CONTENT_LENGTH,
                &format!(
                    "{} [{}] Could not parse content length header value '{}'",
                    self.peer_name(),
                    message.path,
                    raw
                ),
            );
            close = true;
        }

        let handler = self.ctx.routes.resolve(message.method, &message.path);
        let mut request = Request::new(
            message.method,
            message.path,
            self.peer,
            message.headers,
            message.query,
            message.body,
        );

        close |= request.wants_close();
        if close {
            request.mark_close();
        }

        match handler {
            Some(handler) => {
                self.ctx.logger.info(
                    codes::REQUESTED,
                    &format!("{} requested {}", self.peer_name(), request.path()),
                );
                Exchange::Dispatch {
                    handler,
                    request,
                    close,
                }
            }
            None => {
                self.ctx.logger.error(
                    codes::ROUTE_MISS,
                    &format!("{}: Could not find url: {}", self.peer_name(), request.path()),
                );
                Exchange::Respond {
                    response: Response::not_found(),
                    close,
                }
            }
        }
    }

    fn reject(&self, error: ParseError) -> Exchange {
        let (code, response) = match &error {
            ParseError::InvalidMethod(_) => (codes::BAD_METHOD, Response::bad_request(error.to_string())),
            ParseError::InvalidHeader(_) => (codes::BAD_HEADER, Response::bad_request(error.to_string())),
            ParseError::BodyTooLarge(_) => (
                codes::BAD_CONTENT_LENGTH,
                Response::new(StatusCode::PayloadTooLarge).body(error.to_string()),
            ),
            ParseError::InvalidRequestLine(_) | ParseError::LineTooLong(_) => {
                (codes::BAD_HEADER, Response::bad_request(error.to_string()))
            }
        };

        self.ctx
            .logger
            .error(code, &format!("{}: {}", self.peer_name(), error));

        Exchange::Respond {
            response,
            close: true,
        }
    }

    async fn process(exchange: Exchange) -> (Response, bool) {
        match exchange {
            Exchange::Dispatch {
                handler,
                request,
                close,
            } => (handler(request).await, !close),
            Exchange::Respond { response, close } => (response, !close),
        }
    }

    fn serialize(&self, response: &mut Response, keep_alive: bool) -> ConnectionState {
        match response.serialize(&self.ctx.wire, keep_alive) {
            Ok(wire) => ConnectionState::Writing(ResponseWriter::new(wire), keep_alive),
            Err(e) => {
                self.ctx.logger.error(
                    codes::NO_RESPONSE,
                    &format!("INTERNAL ERROR - could not serialize the response ({e}), terminating connection"),
                );
                match Response::internal_error("response could not be serialized").serialize(&self.ctx.wire, false) {
                    Ok(wire) => ConnectionState::Writing(ResponseWriter::new(wire), false),
                    Err(_) => ConnectionState::Closed,
                }
            }
        }
    }

    fn peer_name(&self) -> String {
        self.peer
            .map(|p| p.to_string())
            .unwrap_or_else(|| "<unknown>".to_string())
    }
}
