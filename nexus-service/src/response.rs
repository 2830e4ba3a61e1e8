//! Response model and pooled response builder

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::fmt;
use std::sync::Mutex;

use crate::cookies::Cookie;

/// Body type handed to hyper when writing a response
pub type HttpBody = UnsyncBoxBody<Bytes, std::io::Error>;

/// Pre-built header table for JSON responses (hot path, no custom headers)
static JSON_HEADERS: Lazy<HeaderMap> = Lazy::new(|| {
    let mut headers = HeaderMap::with_capacity(1);
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers
});

/// Pre-built header table for HTML responses
static HTML_HEADERS: Lazy<HeaderMap> = Lazy::new(|| {
    let mut headers = HeaderMap::with_capacity(1);
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    headers
});

/// Pre-built header table for plain text responses
static TEXT_HEADERS: Lazy<HeaderMap> = Lazy::new(|| {
    let mut headers = HeaderMap::with_capacity(1);
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers
});

/// Response payload: exactly one of bytes / stream is non-empty
pub enum Body {
    /// No payload (204, HEAD, redirects)
    Empty,
    /// Buffered payload
    Bytes(Bytes),
    /// Streamed payload; chunks are written as they arrive
    ///
    /// Wrapped in a `Mutex` solely so the enum is `Sync` (the underlying
    /// stream is never accessed concurrently; it's only ever taken back
    /// out by value in `into_hyper`).
    Stream(Mutex<BoxStream<'static, std::io::Result<Bytes>>>),
}

impl Body {
    /// Length of the buffered payload, if buffered
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::Empty => Some(0),
            Self::Bytes(b) => Some(b.len()),
            Self::Stream(_) => None,
        }
    }

    /// Whether the body is known to be empty
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty) || matches!(self, Self::Bytes(b) if b.is_empty())
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Body::Empty"),
            Self::Bytes(b) => write!(f, "Body::Bytes({} bytes)", b.len()),
            Self::Stream(_) => write!(f, "Body::Stream"),
        }
    }
}

/// An HTTP response produced by a handler, hook, or middleware
#[derive(Debug)]
pub struct Response {
    /// Status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response payload
    pub body: Body,
}

impl Response {
    /// Create an empty response with the given status
    pub fn with_status(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    /// JSON response from a serializable value
    ///
    /// Serialization failures degrade to a 500 with a plain-text body; they
    /// indicate a bug in the value's `Serialize` impl, not in the request.
    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => Self {
                status,
                headers: JSON_HEADERS.clone(),
                body: Body::Bytes(Bytes::from(bytes)),
            },
            Err(err) => {
                tracing::error!("Failed to serialize response body: {}", err);
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    headers: TEXT_HEADERS.clone(),
                    body: Body::Bytes(Bytes::from_static(b"serialization failure")),
                }
            }
        }
    }

    /// HTML response
    pub fn html(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HTML_HEADERS.clone(),
            body: Body::Bytes(Bytes::from(body.into())),
        }
    }

    /// Plain-text response
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: TEXT_HEADERS.clone(),
            body: Body::Bytes(Bytes::from(body.into())),
        }
    }

    /// Redirect response (302 unless another status is given via `status`)
    pub fn redirect(location: &str) -> Self {
        let mut headers = HeaderMap::with_capacity(1);
        match HeaderValue::from_str(location) {
            Ok(value) => {
                headers.insert(header::LOCATION, value);
                Self {
                    status: StatusCode::FOUND,
                    headers,
                    body: Body::Empty,
                }
            }
            Err(_) => Self::text(StatusCode::INTERNAL_SERVER_ERROR, "invalid redirect target"),
        }
    }

    /// Streaming response with an explicit content type
    pub fn stream(
        status: StatusCode,
        content_type: &str,
        stream: BoxStream<'static, std::io::Result<Bytes>>,
    ) -> Self {
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_str(content_type)
                .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
        );
        Self {
            status,
            headers,
            body: Body::Stream(Mutex::new(stream)),
        }
    }

    /// Set a header, replacing any existing value
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Override the status code
    #[must_use]
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Content type header as a string, if present and valid UTF-8
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Convert into the hyper response written to the wire
    pub fn into_hyper(self) -> hyper::Response<HttpBody> {
        let mut builder = hyper::Response::builder().status(self.status);
        if let Some(headers) = builder.headers_mut() {
            *headers = self.headers;
        }
        let body: HttpBody = match self.body {
            Body::Empty => Full::new(Bytes::new())
                .map_err(|never| match never {})
                .boxed_unsync(),
            Body::Bytes(bytes) => Full::new(bytes)
                .map_err(|never| match never {})
                .boxed_unsync(),
            Body::Stream(stream) => {
                let stream = stream.into_inner().unwrap_or_else(|e| e.into_inner());
                StreamBody::new(stream.map_ok(Frame::data)).boxed_unsync()
            }
        };
        // Status/headers were set above; the body can't fail to attach.
        builder.body(body).unwrap_or_else(|_| {
            hyper::Response::new(
                Full::new(Bytes::new())
                    .map_err(|never| match never {})
                    .boxed_unsync(),
            )
        })
    }
}

/// Pooled builder carrying per-request response customization
///
/// Handlers customize the outgoing response through the context (`status`,
/// `header`, `cookie`); the accumulated state is applied to whatever
/// `Response` the pipeline produces. A pristine builder means the pre-cached
/// header tables are used untouched.
#[derive(Debug, Default)]
pub struct ResponseBuilder {
    status: Option<StatusCode>,
    headers: HeaderMap,
    cookies: Vec<Cookie>,
}

impl ResponseBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no customization has been recorded (hot path check)
    pub fn is_pristine(&self) -> bool {
        self.status.is_none() && self.headers.is_empty() && self.cookies.is_empty()
    }

    /// Record a status override
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    /// Record a header
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Record a cookie to emit as `Set-Cookie`
    pub fn add_cookie(&mut self, cookie: Cookie) {
        self.cookies.push(cookie);
    }

    /// Apply the recorded customization onto a response
    pub fn apply(&self, mut response: Response) -> Response {
        if self.is_pristine() {
            return response;
        }
        if let Some(status) = self.status {
            response.status = status;
        }
        for (name, value) in self.headers.iter() {
            response.headers.insert(name.clone(), value.clone());
        }
        for cookie in &self.cookies {
            if let Ok(value) = HeaderValue::from_str(&cookie.to_header_value()) {
                response.headers.append(header::SET_COOKIE, value);
            }
        }
        response
    }

    /// Clear all recorded state so the builder can be reused
    pub fn reset(&mut self) {
        self.status = None;
        self.headers.clear();
        self.cookies.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_sets_content_type() {
        let response = Response::json(StatusCode::OK, &json!({"ok": true}));
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.content_type(), Some("application/json"));
        match response.body {
            Body::Bytes(ref b) => assert_eq!(b.as_ref(), br#"{"ok":true}"#),
            ref other => panic!("expected buffered body, got {:?}", other),
        }
    }

    #[test]
    fn test_text_and_html_content_types() {
        let text = Response::text(StatusCode::OK, "hi");
        assert_eq!(text.content_type(), Some("text/plain; charset=utf-8"));
        let html = Response::html(StatusCode::OK, "<p>hi</p>");
        assert_eq!(html.content_type(), Some("text/html; charset=utf-8"));
    }

    #[test]
    fn test_redirect_sets_location() {
        let response = Response::redirect("/login");
        assert_eq!(response.status, StatusCode::FOUND);
        assert_eq!(
            response.headers.get(header::LOCATION).unwrap(),
            &HeaderValue::from_static("/login")
        );
        assert!(response.body.is_empty());
    }

    #[test]
    fn test_builder_pristine_apply_is_identity() {
        let builder = ResponseBuilder::new();
        let response = builder.apply(Response::json(StatusCode::OK, &json!({"a": 1})));
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.headers.len(), 1);
    }

    #[test]
    fn test_builder_overrides_status_and_headers() {
        let mut builder = ResponseBuilder::new();
        builder.set_status(StatusCode::CREATED);
        builder.set_header(
            HeaderName::from_static("x-custom"),
            HeaderValue::from_static("yes"),
        );
        builder.add_cookie(Cookie::new("session", "s1").http_only(true));

        let response = builder.apply(Response::json(StatusCode::OK, &json!({})));
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.headers.get("x-custom").unwrap(), "yes");
        let cookie = response.headers.get(header::SET_COOKIE).unwrap();
        assert_eq!(cookie.to_str().unwrap(), "session=s1; HttpOnly");
    }

    #[test]
    fn test_builder_reset_restores_pristine() {
        let mut builder = ResponseBuilder::new();
        builder.set_status(StatusCode::ACCEPTED);
        assert!(!builder.is_pristine());
        builder.reset();
        assert!(builder.is_pristine());
    }
}
