//! HTTP/1.1 request parsing using the [`httparse`] crate.

use std::collections::HashMap;

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

/// Errors that can occur while parsing an HTTP/1.1 request head.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete, more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid Content-Length header: {value}")]
    InvalidContentLength { value: String },
}

/// A parsed HTTP/1.1 request.
///
/// The server parses the head with [`Request::parse`], waits until
/// `Content-Length` bytes have arrived, then attaches them with
/// [`Request::with_body`].
///
/// ```
/// use crmgate::http::Request;
///
/// let raw = b"GET /ai/suitability?model=gemma-2-9b-it&task=categorization HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.path(), "/ai/suitability");
/// assert_eq!(request.query_param("model"), Some("gemma-2-9b-it"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    query: HashMap<String, String>,
    body: Bytes,
}

impl Request {
    const MAX_HEADERS: usize = 64;

    /// Builds a request in memory. Used by tests and by in-process callers
    /// that drive the router without a socket.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = split_target(target);
        Self {
            method,
            path,
            version: 1,
            headers: Headers::new(),
            query,
            body: Bytes::new(),
        }
    }

    /// Parses the request line and headers from `buf`.
    ///
    /// Returns the request (with an empty body) and the offset at which the
    /// body starts.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] when the head has not fully arrived.
    /// - [`RequestError::Parse`] when the data is malformed.
    /// - [`RequestError::MissingField`] when method, path, or version is absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw = httparse::Request::new(&mut headers);

        let body_offset = match raw.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method = match raw
            .method
            .ok_or(RequestError::MissingField { field: "method" })?
            .parse::<Method>()
        {
            Ok(method) => method,
            Err(never) => match never {},
        };
        let target = raw
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;
        let version = raw
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw.headers.len());
        for header in raw.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        let (path, query) = split_target(target);

        Ok((
            Self {
                method,
                path,
                version,
                headers: header_map,
                query,
                body: Bytes::new(),
            },
            body_offset,
        ))
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request path without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// HTTP/1.1 defaults to keep-alive; HTTP/1.0 needs it spelled out.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1,
        }
    }

    /// Parsed `Content-Length`, `Ok(0)` when the header is absent.
    pub fn content_length(&self) -> Result<usize, RequestError> {
        match self.headers.get("content-length") {
            None => Ok(0),
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| RequestError::InvalidContentLength {
                    value: value.to_owned(),
                }),
        }
    }
}

fn split_target(target: &str) -> (String, HashMap<String, String>) {
    match target.split_once('?') {
        Some((path, query)) => (path.to_owned(), parse_query_string(query)),
        None => (target.to_owned(), HashMap::new()),
    }
}

// `+` becomes a space; model ids and task names never need percent escapes.
fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key.replace('+', " "), value.replace('+', " "))
        })
        .collect()
}
