//! Cookie parsing and `Set-Cookie` emission

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;

/// Parse a `Cookie` request header into a name/value map.
///
/// Pairs are split on `;`, names and values trimmed. Later duplicates win,
/// matching browser behavior of sending the most specific cookie first only
/// when paths differ (servers conventionally take the last occurrence).
pub fn parse_cookie_header(header: &str) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for pair in header.split(';') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        match pair.split_once('=') {
            Some((name, value)) => {
                cookies.insert(name.trim().to_string(), value.trim().to_string());
            }
            None => {
                cookies.insert(pair.to_string(), String::new());
            }
        }
    }
    cookies
}

/// `SameSite` attribute values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    /// Cookie only sent for same-site requests
    Strict,
    /// Cookie sent on top-level navigation (default for modern browsers)
    Lax,
    /// Cookie sent on all requests (requires `Secure`)
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "Strict"),
            Self::Lax => write!(f, "Lax"),
            Self::None => write!(f, "None"),
        }
    }
}

/// Builder for a `Set-Cookie` header value
///
/// # Example
///
/// ```rust
/// use nexus_service::cookies::{Cookie, SameSite};
///
/// let value = Cookie::new("session", "abc123")
///     .path("/")
///     .http_only(true)
///     .secure(true)
///     .same_site(SameSite::Lax)
///     .max_age(3600)
///     .to_header_value();
/// assert!(value.starts_with("session=abc123"));
/// ```
#[derive(Debug, Clone)]
pub struct Cookie {
    name: String,
    value: String,
    max_age: Option<i64>,
    expires: Option<DateTime<Utc>>,
    path: Option<String>,
    domain: Option<String>,
    secure: bool,
    http_only: bool,
    same_site: Option<SameSite>,
}

impl Cookie {
    /// Create a cookie with a name and value
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            max_age: None,
            expires: None,
            path: None,
            domain: None,
            secure: false,
            http_only: false,
            same_site: None,
        }
    }

    /// Set `Max-Age` in seconds
    #[must_use]
    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// Set `Expires` as an absolute time (emitted as an HTTP-date)
    #[must_use]
    pub fn expires(mut self, at: DateTime<Utc>) -> Self {
        self.expires = Some(at);
        self
    }

    /// Set the `Path` attribute
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the `Domain` attribute
    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Set the `Secure` attribute
    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set the `HttpOnly` attribute
    #[must_use]
    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Set the `SameSite` attribute
    #[must_use]
    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    /// Render the `Set-Cookie` header value
    pub fn to_header_value(&self) -> String {
        let mut out = format!("{}={}", self.name, self.value);
        if let Some(max_age) = self.max_age {
            out.push_str(&format!("; Max-Age={}", max_age));
        }
        if let Some(expires) = self.expires {
            // RFC 7231 IMF-fixdate, e.g. "Sun, 06 Nov 1994 08:49:37 GMT"
            out.push_str(&format!(
                "; Expires={}",
                expires.format("%a, %d %b %Y %H:%M:%S GMT")
            ));
        }
        if let Some(ref path) = self.path {
            out.push_str(&format!("; Path={}", path));
        }
        if let Some(ref domain) = self.domain {
            out.push_str(&format!("; Domain={}", domain));
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        if let Some(same_site) = self.same_site {
            out.push_str(&format!("; SameSite={}", same_site));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_simple_pair() {
        let cookies = parse_cookie_header("session=abc123");
        assert_eq!(cookies.get("session").map(String::as_str), Some("abc123"));
    }

    #[test]
    fn test_parse_multiple_pairs() {
        let cookies = parse_cookie_header("a=1; b=2; c=3");
        assert_eq!(cookies.len(), 3);
        assert_eq!(cookies.get("b").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_parse_empty_and_valueless() {
        let cookies = parse_cookie_header("flag; a=1;;  ");
        assert_eq!(cookies.get("flag").map(String::as_str), Some(""));
        assert_eq!(cookies.get("a").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_header_value_all_attributes() {
        let expires = Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap();
        let value = Cookie::new("id", "42")
            .max_age(60)
            .expires(expires)
            .path("/api")
            .domain("example.com")
            .secure(true)
            .http_only(true)
            .same_site(SameSite::Strict)
            .to_header_value();
        assert_eq!(
            value,
            "id=42; Max-Age=60; Expires=Sun, 06 Nov 1994 08:49:37 GMT; \
             Path=/api; Domain=example.com; Secure; HttpOnly; SameSite=Strict"
        );
    }

    #[test]
    fn test_same_site_values() {
        assert_eq!(SameSite::Strict.to_string(), "Strict");
        assert_eq!(SameSite::Lax.to_string(), "Lax");
        assert_eq!(SameSite::None.to_string(), "None");
    }
}
