//! Request body accumulation and content-type dispatch

use bytes::Bytes;
use http_body_util::BodyExt;
use std::collections::HashMap;
use serde_json::Value;

/// Raw inbound body handle, consumed by the first parse
pub enum RawBody {
    /// No body attached (already consumed, or none arrived)
    None,
    /// Buffered body, used by tests and internal dispatch
    Full(Bytes),
    /// Live hyper request body
    Hyper(hyper::body::Incoming),
}

impl std::fmt::Debug for RawBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "RawBody::None"),
            Self::Full(b) => write!(f, "RawBody::Full({} bytes)", b.len()),
            Self::Hyper(_) => write!(f, "RawBody::Hyper"),
        }
    }
}

/// Parsed request body, memoized on the context
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBody {
    /// No payload
    Empty,
    /// `application/json`
    Json(Value),
    /// `application/x-www-form-urlencoded`; repeated keys accumulate
    Form(HashMap<String, Vec<String>>),
    /// Any other content type, as text
    Text(String),
}

impl ParsedBody {
    /// JSON value, when the body parsed as JSON
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Form map, when the body parsed as a form
    pub fn as_form(&self) -> Option<&HashMap<String, Vec<String>>> {
        match self {
            Self::Form(map) => Some(map),
            _ => None,
        }
    }

    /// Text payload, when the body fell through to raw text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Whether there was no payload
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Accumulate the raw body up to `limit` bytes
///
/// Hyper bodies are drained frame by frame so an oversized payload fails as
/// soon as the limit is crossed rather than after full buffering.
pub(crate) async fn read_raw(raw: RawBody, limit: usize) -> Result<Bytes, String> {
    match raw {
        RawBody::None => Ok(Bytes::new()),
        RawBody::Full(bytes) => {
            if bytes.len() > limit {
                return Err(format!("body exceeds limit of {} bytes", limit));
            }
            Ok(bytes)
        }
        RawBody::Hyper(mut body) => {
            let mut buf = Vec::new();
            while let Some(frame) = body.frame().await {
                let frame = frame.map_err(|e| format!("failed to read body: {}", e))?;
                if let Some(data) = frame.data_ref() {
                    if buf.len() + data.len() > limit {
                        return Err(format!("body exceeds limit of {} bytes", limit));
                    }
                    buf.extend_from_slice(data);
                }
            }
            Ok(Bytes::from(buf))
        }
    }
}

/// Parse accumulated bytes according to the request content type
pub(crate) fn parse_bytes(bytes: &Bytes, content_type: Option<&str>) -> Result<ParsedBody, String> {
    if bytes.is_empty() {
        return Ok(ParsedBody::Empty);
    }

    let content_type = content_type.unwrap_or("").trim();
    if content_type.starts_with("application/json") {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| format!("invalid JSON body: {}", e))?;
        Ok(ParsedBody::Json(value))
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (key, value) in url::form_urlencoded::parse(bytes) {
            map.entry(key.into_owned())
                .or_default()
                .push(value.into_owned());
        }
        Ok(ParsedBody::Form(map))
    } else {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| format!("body is not valid UTF-8: {}", e))?
            .to_string();
        Ok(ParsedBody::Text(text))
    }
}
