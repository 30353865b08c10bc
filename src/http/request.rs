use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

/// HTTP request methods understood by the server.
///
/// Anything else on the request line is rejected with 400 Bad Request before
/// the routing table is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Submit data
    POST,
}

/// Represents a parsed HTTP request from a client.
///
/// Built once per message by the connection handler and handed to the route
/// handler by value. The only later change is the synthetic
/// `Connection: close` header injected when the server has decided to drop
/// the connection after responding.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    remote_addr: Option<SocketAddr>,
    headers: HashMap<String, String>,
    query: Vec<(String, String)>,
    body: Option<String>,
}

impl Method {
    /// Parses an HTTP method from a string.
    ///
    /// # Example
    ///
    /// ```
    /// # use spud::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("get"), None);
    /// assert_eq!(Method::from_str("PUT"), None);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Request {
    pub fn new(
        method: Method,
        path: impl Into<String>,
        remote_addr: Option<SocketAddr>,
        headers: HashMap<String, String>,
        query: Vec<(String, String)>,
        body: Option<String>,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            remote_addr,
            headers,
            query,
            body,
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// URL-decoded path without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Body text, empty when none was sent.
    pub fn body(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }

    /// `true` when the message declared a body (a `Content-Length` header),
    /// even an empty one.
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Retrieves a header value by its exact, as-received name.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(|v| v.as_str())
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// `true` when the query string produced at least one parameter.
    pub fn has_filters(&self) -> bool {
        !self.query.is_empty()
    }

    /// First value of query parameter `name`.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All values of query parameter `name`, in order of appearance.
    pub fn query_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.query
            .iter()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    /// Whether the peer (or the server) asked to close after this exchange.
    pub fn wants_close(&self) -> bool {
        self.header("Connection")
            .map(|v| v.eq_ignore_ascii_case("close"))
            .unwrap_or(false)
    }

    pub(crate) fn mark_close(&mut self) {
        self.headers
            .insert("Connection".to_string(), "close".to_string());
    }
}
