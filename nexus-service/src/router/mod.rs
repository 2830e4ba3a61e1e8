//! Radix-tree request router
//!
//! Routes are registered once during application startup; after the builder
//! finishes the router is shared behind an `Arc` and never mutated again, so
//! matching takes no locks.
//!
//! ## Segment syntax
//!
//! - `users` — static
//! - `:id` — parameter, binds `params["id"]`
//! - `:id(\d+)` — parameter constrained by an anchored regex
//! - `file.:ext`, `category-:slug(\w+)-:page(\d+)` — inline patterns, may
//!   bind several names in one segment
//! - `*rest` — trailing wildcard binding the joined remainder (a bare `*`
//!   binds `"wildcard"`)
//!
//! Overlapping registrations are disambiguated by segment priority
//! (static < pattern < regex < param < wildcard) with backtracking, so
//! `/users/me/posts` beats `/users/:id/posts` regardless of insertion order.

mod node;

use http::Method;
use std::collections::HashMap;

use crate::error::{Error, Result};
use node::{Node, Segment};

/// Methods accepted at registration time
pub fn is_supported_method(method: &Method) -> bool {
    *method == Method::GET
        || *method == Method::POST
        || *method == Method::PUT
        || *method == Method::DELETE
        || *method == Method::PATCH
        || *method == Method::HEAD
        || *method == Method::OPTIONS
}

/// Result of a successful match
#[derive(Debug)]
pub struct RouterMatch<'a, T> {
    /// Payload stored at registration
    pub value: &'a T,
    /// Parameter bindings captured along the matched branch
    pub params: Vec<(String, String)>,
}

/// Radix-tree router generic over the per-route payload
///
/// The framework instantiates this with its `Route` record; tests and
/// collaborators may use any payload.
#[derive(Debug)]
pub struct RadixRouter<T> {
    trees: HashMap<Method, Node<T>>,
    routes: usize,
}

impl<T> Default for RadixRouter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RadixRouter<T> {
    /// Create an empty router
    pub fn new() -> Self {
        Self {
            trees: HashMap::new(),
            routes: 0,
        }
    }

    /// Number of registered routes
    pub fn len(&self) -> usize {
        self.routes
    }

    /// Whether no routes are registered
    pub fn is_empty(&self) -> bool {
        self.routes == 0
    }

    /// Register a route
    ///
    /// Fails with [`Error::UnknownMethod`] for methods outside the supported
    /// set, [`Error::InvalidPattern`] for malformed segment syntax, and
    /// [`Error::DuplicatePath`] when the exact `(method, path)` already has
    /// a terminal payload.
    pub fn insert(&mut self, method: Method, path: &str, value: T) -> Result<()> {
        if !is_supported_method(&method) {
            return Err(Error::UnknownMethod(method.to_string()));
        }

        let segments = split_path(path);
        let mut current = self.trees.entry(method.clone()).or_insert_with(Node::root);
        for (i, raw) in segments.iter().enumerate() {
            let segment = Segment::parse(raw, path)?;
            if matches!(segment, Segment::Wildcard { .. }) && i + 1 != segments.len() {
                return Err(Error::InvalidPattern {
                    path: path.to_string(),
                    reason: "wildcard segment must be last".to_string(),
                });
            }
            current = current.child_for(segment);
        }

        if current.route.is_some() {
            return Err(Error::DuplicatePath {
                method,
                path: path.to_string(),
            });
        }
        current.route = Some(value);
        self.routes += 1;
        Ok(())
    }

    /// Whether the exact `(method, path)` is already registered
    pub fn contains(&self, method: &Method, path: &str) -> bool {
        let Some(tree) = self.trees.get(method) else {
            return false;
        };
        let mut current = tree;
        for raw in split_path(path) {
            let Ok(segment) = Segment::parse(raw, path) else {
                return false;
            };
            match current
                .children
                .iter()
                .find(|c| c.segment.same_spec(&segment))
            {
                Some(child) => current = child,
                None => return false,
            }
        }
        current.route.is_some()
    }

    /// Match a request; pure, returns `None` on a miss
    pub fn find<'a>(&'a self, method: &Method, path: &str) -> Option<RouterMatch<'a, T>> {
        let tree = self.trees.get(method)?;
        let segments = split_path(path);
        let mut params = Vec::new();
        let node = tree.find(&segments, 0, &mut params)?;
        node.route.as_ref().map(|value| RouterMatch { value, params })
    }

    /// Whether any method has a route for this path (405 support)
    pub fn path_exists_under_other_method(&self, method: &Method, path: &str) -> bool {
        self.trees
            .iter()
            .filter(|(m, _)| *m != method)
            .any(|(_, tree)| {
                let segments = split_path(path);
                let mut params = Vec::new();
                tree.find(&segments, 0, &mut params).is_some()
            })
    }
}

/// Split a request or registration path into segments
///
/// Empty paths are treated as `/`; leading and trailing slashes (and any
/// empty segments they produce) are dropped before matching.
fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router(routes: &[(&str, &str)]) -> RadixRouter<String> {
        let mut router = RadixRouter::new();
        for (method, path) in routes {
            let method: Method = method.parse().unwrap();
            let value = format!("{} {}", method, path);
            router.insert(method, path, value).unwrap();
        }
        router
    }

    fn param<'a>(m: &'a RouterMatch<'_, String>, name: &str) -> Option<&'a str> {
        m.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_static_match() {
        let r = router(&[("GET", "/users")]);
        let m = r.find(&Method::GET, "/users").unwrap();
        assert_eq!(m.value, "GET /users");
        assert!(m.params.is_empty());
    }

    #[test]
    fn test_param_capture() {
        let r = router(&[("GET", "/users/:id")]);
        let m = r.find(&Method::GET, "/users/42").unwrap();
        assert_eq!(param(&m, "id"), Some("42"));
    }

    #[test]
    fn test_miss_returns_none() {
        let r = router(&[("GET", "/users")]);
        assert!(r.find(&Method::GET, "/orders").is_none());
        assert!(r.find(&Method::POST, "/users").is_none());
    }

    #[test]
    fn test_static_beats_param_regardless_of_insertion_order() {
        for routes in [
            [("GET", "/users/:id/posts"), ("GET", "/users/me/posts")],
            [("GET", "/users/me/posts"), ("GET", "/users/:id/posts")],
        ] {
            let r = router(&routes);
            let m = r.find(&Method::GET, "/users/me/posts").unwrap();
            assert_eq!(m.value, "GET /users/me/posts");
            assert!(m.params.is_empty());

            let m = r.find(&Method::GET, "/users/123/posts").unwrap();
            assert_eq!(m.value, "GET /users/:id/posts");
            assert_eq!(param(&m, "id"), Some("123"));
        }
    }

    #[test]
    fn test_backtracking_restores_params() {
        // The static branch under `me` dead-ends for this request, so the
        // router must fall back to `:id` without leaking the failed capture.
        let r = router(&[
            ("GET", "/users/me/settings"),
            ("GET", "/users/:id/posts"),
        ]);
        let m = r.find(&Method::GET, "/users/me/posts").unwrap();
        assert_eq!(m.value, "GET /users/:id/posts");
        assert_eq!(m.params, vec![("id".to_string(), "me".to_string())]);
    }

    #[test]
    fn test_param_beats_wildcard() {
        let r = router(&[("GET", "/files/:name"), ("GET", "/files/*rest")]);

        let m = r.find(&Method::GET, "/files/a").unwrap();
        assert_eq!(m.value, "GET /files/:name");
        assert_eq!(param(&m, "name"), Some("a"));

        let m = r.find(&Method::GET, "/files/a/b/c").unwrap();
        assert_eq!(m.value, "GET /files/*rest");
        assert_eq!(param(&m, "rest"), Some("a/b/c"));
    }

    #[test]
    fn test_regex_param_only_matches_pattern() {
        let r = router(&[("GET", r"/orders/:id(\d+)"), ("GET", "/orders/:slug")]);

        let m = r.find(&Method::GET, "/orders/123").unwrap();
        assert_eq!(m.value, r"GET /orders/:id(\d+)");
        assert_eq!(param(&m, "id"), Some("123"));

        let m = r.find(&Method::GET, "/orders/pending").unwrap();
        assert_eq!(m.value, "GET /orders/:slug");
        assert_eq!(param(&m, "slug"), Some("pending"));
    }

    #[test]
    fn test_inline_pattern_binds_multiple_names() {
        let r = router(&[("GET", r"/catalog/category-:slug(\w+)-:page(\d+)")]);
        let m = r.find(&Method::GET, "/catalog/category-books-3").unwrap();
        assert_eq!(param(&m, "slug"), Some("books"));
        assert_eq!(param(&m, "page"), Some("3"));
    }

    #[test]
    fn test_inline_pattern_beats_regex_and_param() {
        let r = router(&[
            ("GET", "/dl/:file"),
            ("GET", r"/dl/:hash([0-9a-f]+)"),
            ("GET", "/dl/release.:ext"),
        ]);
        let m = r.find(&Method::GET, "/dl/release.zip").unwrap();
        assert_eq!(m.value, "GET /dl/release.:ext");
        assert_eq!(param(&m, "ext"), Some("zip"));

        let m = r.find(&Method::GET, "/dl/deadbeef").unwrap();
        assert_eq!(m.value, r"GET /dl/:hash([0-9a-f]+)");
    }

    #[test]
    fn test_wildcard_matches_zero_segments_as_empty() {
        let r = router(&[("GET", "/assets/*path")]);
        let m = r.find(&Method::GET, "/assets").unwrap();
        assert_eq!(param(&m, "path"), Some(""));
    }

    #[test]
    fn test_bare_wildcard_binds_wildcard_name() {
        let r = router(&[("GET", "/any/*")]);
        let m = r.find(&Method::GET, "/any/x/y").unwrap();
        assert_eq!(param(&m, "wildcard"), Some("x/y"));
    }

    #[test]
    fn test_trailing_slash_and_empty_path() {
        let r = router(&[("GET", "/users"), ("GET", "/")]);
        assert!(r.find(&Method::GET, "/users/").is_some());
        assert!(r.find(&Method::GET, "").is_some());
        assert!(r.find(&Method::GET, "/").is_some());
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let mut r = router(&[("GET", "/users/:id")]);
        let err = r
            .insert(Method::GET, "/users/:id", "dup".to_string())
            .unwrap_err();
        assert!(matches!(err, Error::DuplicatePath { .. }));

        // Same path under a different method is fine
        r.insert(Method::POST, "/users/:id", "ok".to_string())
            .unwrap();
    }

    #[test]
    fn test_unknown_method_rejected() {
        let mut r: RadixRouter<()> = RadixRouter::new();
        let err = r
            .insert(Method::from_bytes(b"TRACE").unwrap(), "/x", ())
            .unwrap_err();
        assert!(matches!(err, Error::UnknownMethod(_)));
    }

    #[test]
    fn test_wildcard_must_be_last() {
        let mut r: RadixRouter<()> = RadixRouter::new();
        let err = r.insert(Method::GET, "/a/*rest/b", ()).unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));
    }

    #[test]
    fn test_contains_is_exact() {
        let r = router(&[("GET", "/users/:id")]);
        assert!(r.contains(&Method::GET, "/users/:id"));
        // A literal path that would *match* is not the same registration
        assert!(!r.contains(&Method::GET, "/users/42"));
        assert!(!r.contains(&Method::POST, "/users/:id"));
    }

    #[test]
    fn test_path_exists_under_other_method() {
        let r = router(&[("POST", "/login")]);
        assert!(r.path_exists_under_other_method(&Method::GET, "/login"));
        assert!(!r.path_exists_under_other_method(&Method::POST, "/login"));
    }

    #[test]
    fn test_deep_overlap_prefers_deepest_static_prefix() {
        let r = router(&[
            ("GET", "/api/v1/users/:id"),
            ("GET", "/api/:section/users/new"),
        ]);
        let m = r.find(&Method::GET, "/api/v1/users/new").unwrap();
        assert_eq!(m.value, "GET /api/v1/users/:id");
        assert_eq!(param(&m, "id"), Some("new"));
    }
}
