use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::http::mime::ContentKind;
use crate::http::writer::{self, SealedResponse, WireOptions};

macro_rules! status_codes {
    ($( $(#[$doc:meta])* $variant:ident = $code:literal, $phrase:literal; )+) => {
        /// HTTP status codes.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum StatusCode {
            $( $(#[$doc])* $variant, )+
        }

        impl StatusCode {
            /// Returns the numeric HTTP status code.
            ///
            /// ```
            /// # use spud::http::response::StatusCode;
            /// assert_eq!(StatusCode::Ok.as_u16(), 200);
            /// assert_eq!(StatusCode::NotFound.as_u16(), 404);
            /// ```
            pub fn as_u16(&self) -> u16 {
                match self {
                    $( StatusCode::$variant => $code, )+
                }
            }

            /// Returns the standard HTTP reason phrase for this status code.
            pub fn reason_phrase(&self) -> &'static str {
                match self {
                    $( StatusCode::$variant => $phrase, )+
                }
            }

            /// Maps a numeric code back to a known status, `None` otherwise.
            pub fn from_u16(code: u16) -> Option<Self> {
                match code {
                    $( $code => Some(StatusCode::$variant), )+
                    _ => None,
                }
            }
        }
    };
}

status_codes! {
    Continue = 100, "Continue";
    SwitchingProtocols = 101, "Switching Protocols";
    /// 200 OK
    Ok = 200, "OK";
    Created = 201, "Created";
    Accepted = 202, "Accepted";
    NonAuthoritativeInformation = 203, "Non-Authoritative Information";
    NoContent = 204, "No Content";
    ResetContent = 205, "Reset Content";
    PartialContent = 206, "Partial Content";
    MultipleChoices = 300, "Multiple Choices";
    MovedPermanently = 301, "Moved Permanently";
    Found = 302, "Found";
    SeeOther = 303, "See Other";
    NotModified = 304, "Not Modified";
    TemporaryRedirect = 307, "Temporary Redirect";
    PermanentRedirect = 308, "Permanent Redirect";
    /// 400 Bad Request - protocol violations and the client's "not connected"
    BadRequest = 400, "Bad Request";
    Unauthorized = 401, "Unauthorized";
    PaymentRequired = 402, "Payment Required";
    Forbidden = 403, "Forbidden";
    /// 404 Not Found - routing miss
    NotFound = 404, "Not Found";
    MethodNotAllowed = 405, "Method Not Allowed";
    NotAcceptable = 406, "Not Acceptable";
    RequestTimeout = 408, "Request Timeout";
    Conflict = 409, "Conflict";
    Gone = 410, "Gone";
    LengthRequired = 411, "Length Required";
    PreconditionFailed = 412, "Precondition Failed";
    PayloadTooLarge = 413, "Payload Too Large";
    UriTooLong = 414, "URI Too Long";
    UnsupportedMediaType = 415, "Unsupported Media Type";
    UnprocessableEntity = 422, "Unprocessable Entity";
    TooManyRequests = 429, "Too Many Requests";
    /// 500 Internal Server Error - also used for synthetic client failures
    InternalServerError = 500, "Internal Server Error";
    NotImplemented = 501, "Not Implemented";
    BadGateway = 502, "Bad Gateway";
    ServiceUnavailable = 503, "Service Unavailable";
    GatewayTimeout = 504, "Gateway Timeout";
    HttpVersionNotSupported = 505, "HTTP Version Not Supported";
}

impl StatusCode {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.as_u16())
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}

/// Response payload before it is turned into wire text.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Sent as-is.
    Text(String),
    /// A primitive rendered to its canonical text. Enum constants are passed
    /// as their integer value.
    Value(String),
    /// A structured value. Forces [`ContentKind::Json`] and goes through the
    /// configured JSON encoder.
    Object(serde_json::Value),
}

impl Body {
    pub fn value(v: impl ToString) -> Self {
        Body::Value(v.to_string())
    }

    pub fn object<T: Serialize + ?Sized>(v: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(v).map(Body::Object)
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Text(s)
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::Text(s.to_string())
    }
}

macro_rules! value_body {
    ($($t:ty),+) => {
        $(impl From<$t> for Body {
            fn from(v: $t) -> Self {
                Body::Value(v.to_string())
            }
        })+
    };
}

value_body!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool, char);

#[derive(Debug, Clone)]
enum State {
    /// Fields may still change.
    Draft,
    /// Wire text has been produced; field setters are ignored from here on.
    Sealed(SealedResponse),
}

/// An HTTP response.
///
/// Starts out as a draft. The first serialization seals it: the wire text is
/// cached and every later serialization (including of clones) reuses it.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    description: String,
    kind: ContentKind,
    headers: HashMap<String, String>,
    body: Option<Body>,
    state: State,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self::with_description(status, "")
    }

    /// A blank `description` falls back to the status' reason phrase.
    pub fn with_description(status: StatusCode, description: impl Into<String>) -> Self {
        let description = description.into();
        let description = if description.trim().is_empty() {
            status.reason_phrase().to_string()
        } else {
            description
        };

        Self {
            status,
            description,
            kind: ContentKind::Text,
            headers: HashMap::new(),
            body: None,
            state: State::Draft,
        }
    }

    /// Creates a simple 200 OK response with a text body.
    pub fn text(body: impl Into<String>) -> Self {
        Self::new(StatusCode::Ok).body(Body::Text(body.into()))
    }

    /// 200 OK whose body is `value` serialized as JSON.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(StatusCode::Ok).body(Body::object(value)?))
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::BadRequest).body(Body::Text(reason.into()))
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NotFound)
    }

    pub fn internal_error(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::InternalServerError).body(Body::Text(reason.into()))
    }

    /// What the client hands back when `fetch` is called while disconnected.
    pub fn not_connected() -> Self {
        Self::with_description(StatusCode::BadRequest, "NotConnected")
    }

    pub fn kind(mut self, kind: ContentKind) -> Self {
        self.set_kind(kind);
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(key, value);
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.set_body(body);
        self
    }

    pub fn set_kind(&mut self, kind: ContentKind) {
        if self.draft("content kind") {
            self.kind = kind;
        }
    }

    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        if self.draft("header") {
            self.headers.insert(key.into(), value.into());
        }
    }

    pub fn set_body(&mut self, body: impl Into<Body>) {
        if self.draft("body") {
            self.body = Some(body.into());
        }
    }

    fn draft(&self, field: &str) -> bool {
        if self.is_sealed() {
            tracing::debug!(field, status = self.status.as_u16(), "ignoring change to sealed response");
            return false;
        }
        true
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn content_kind(&self) -> ContentKind {
        self.kind
    }

    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::Ok
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self.state, State::Sealed(_))
    }

    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(|v| v.as_str())
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn get_body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Body rendered as text; structured bodies are rendered as compact JSON.
    pub fn body_text(&self) -> Cow<'_, str> {
        match &self.body {
            None => Cow::Borrowed(""),
            Some(Body::Text(s)) | Some(Body::Value(s)) => Cow::Borrowed(s),
            Some(Body::Object(v)) => Cow::Owned(v.to_string()),
        }
    }

    /// Decodes the body as JSON.
    pub fn body_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match &self.body {
            Some(Body::Object(v)) => T::deserialize(v),
            _ => serde_json::from_str(&self.body_text()),
        }
    }

    /// Seals the response (once) and returns its cached wire parts.
    pub fn seal(&mut self, opts: &WireOptions) -> anyhow::Result<&SealedResponse> {
        if let State::Draft = self.state {
            let sealed = self.render(opts)?;
            self.state = State::Sealed(sealed);
        }

        let State::Sealed(sealed) = &self.state else {
            anyhow::bail!("response {} could not be sealed", self.status);
        };
        Ok(sealed)
    }

    fn render(&mut self, opts: &WireOptions) -> anyhow::Result<SealedResponse> {
        let text = match &self.body {
            None => None,
            Some(Body::Text(s)) | Some(Body::Value(s)) => Some(s.clone()),
            Some(Body::Object(v)) => {
                let json = opts.json.encode(v)?;
                self.kind = ContentKind::Json;
                Some(json)
            }
        };

        Ok(writer::render(
            self.status,
            &self.description,
            self.kind,
            &self.headers,
            text.as_deref(),
            opts,
        ))
    }

    /// Full wire text: the sealed head, the `Connection` header for this
    /// exchange, the blank line and the body.
    pub fn serialize(&mut self, opts: &WireOptions, keep_alive: bool) -> anyhow::Result<Bytes> {
        Ok(self.seal(opts)?.frame(keep_alive))
    }

    /// Rebuilds a response read off the wire by the client.
    pub(crate) fn received(
        status: StatusCode,
        description: String,
        headers: HashMap<String, String>,
        body: Option<String>,
    ) -> Self {
        let mut response = Self::with_description(status, description);
        response.headers = headers;
        response.body = body.map(Body::Text);
        response
    }
}
