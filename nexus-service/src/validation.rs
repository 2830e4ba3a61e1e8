//! Route schema validation
//!
//! A route may attach a [`Schema`] describing its params, query, headers,
//! and body. The pipeline runs the schema between the `before_validation`
//! and `after_validation` hooks; failures become 400 responses synthesized
//! here rather than propagating as errors, and a schema may install a custom
//! error handler to shape that response.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::context::{Context, ParsedBody};
use crate::error::Result;
use crate::response::Response;
use http::StatusCode;

/// Expected type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Any shape
    Any,
    /// UTF-8 string
    String,
    /// Number (JSON number, or numeric string for params/query/headers)
    Number,
    /// Boolean
    Boolean,
    /// JSON object (body only)
    Object,
    /// JSON array (body only)
    Array,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::String => write!(f, "string"),
            Self::Number => write!(f, "number"),
            Self::Boolean => write!(f, "boolean"),
            Self::Object => write!(f, "object"),
            Self::Array => write!(f, "array"),
        }
    }
}

/// Validation rule for one named field
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    required: bool,
    kind: FieldKind,
    min_len: Option<usize>,
    max_len: Option<usize>,
    pattern: Option<Regex>,
}

impl Field {
    /// Rule for a field name, optional and untyped by default
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            kind: FieldKind::Any,
            min_len: None,
            max_len: None,
            pattern: None,
        }
    }

    /// The field must be present
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// The field must be a string
    #[must_use]
    pub fn string(mut self) -> Self {
        self.kind = FieldKind::String;
        self
    }

    /// The field must be a number
    #[must_use]
    pub fn number(mut self) -> Self {
        self.kind = FieldKind::Number;
        self
    }

    /// The field must be a boolean
    #[must_use]
    pub fn boolean(mut self) -> Self {
        self.kind = FieldKind::Boolean;
        self
    }

    /// The field must be a JSON object
    #[must_use]
    pub fn object(mut self) -> Self {
        self.kind = FieldKind::Object;
        self
    }

    /// The field must be a JSON array
    #[must_use]
    pub fn array(mut self) -> Self {
        self.kind = FieldKind::Array;
        self
    }

    /// Minimum length for string values
    #[must_use]
    pub fn min_len(mut self, len: usize) -> Self {
        self.min_len = Some(len);
        self
    }

    /// Maximum length for string values
    #[must_use]
    pub fn max_len(mut self, len: usize) -> Self {
        self.max_len = Some(len);
        self
    }

    /// Anchored pattern string values must satisfy
    #[must_use]
    pub fn pattern(mut self, pattern: &str) -> Self {
        match Regex::new(&format!("^(?:{})$", pattern)) {
            Ok(regex) => self.pattern = Some(regex),
            Err(err) => {
                tracing::warn!(field = %self.name, "Invalid validation pattern: {}", err);
            }
        }
        self
    }

    /// Check a string-typed source value (params, query, headers)
    fn check_str(&self, location: &'static str, value: Option<&str>, issues: &mut Vec<Issue>) {
        let Some(value) = value else {
            if self.required {
                issues.push(Issue::new(location, &self.name, "is required"));
            }
            return;
        };
        match self.kind {
            FieldKind::Number => {
                if value.parse::<f64>().is_err() {
                    issues.push(Issue::new(location, &self.name, "must be a number"));
                }
            }
            FieldKind::Boolean => {
                if value != "true" && value != "false" {
                    issues.push(Issue::new(location, &self.name, "must be a boolean"));
                }
            }
            _ => {}
        }
        self.check_text(location, value, issues);
    }

    /// Check a JSON body value
    fn check_value(&self, value: Option<&Value>, issues: &mut Vec<Issue>) {
        let Some(value) = value else {
            if self.required {
                issues.push(Issue::new("body", &self.name, "is required"));
            }
            return;
        };
        let matches_kind = match self.kind {
            FieldKind::Any => true,
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Object => value.is_object(),
            FieldKind::Array => value.is_array(),
        };
        if !matches_kind {
            issues.push(Issue::new(
                "body",
                &self.name,
                &format!("must be of type {}", self.kind),
            ));
            return;
        }
        if let Some(text) = value.as_str() {
            self.check_text("body", text, issues);
        }
    }

    fn check_text(&self, location: &'static str, value: &str, issues: &mut Vec<Issue>) {
        if let Some(min) = self.min_len {
            if value.chars().count() < min {
                issues.push(Issue::new(
                    location,
                    &self.name,
                    &format!("must be at least {} characters", min),
                ));
            }
        }
        if let Some(max) = self.max_len {
            if value.chars().count() > max {
                issues.push(Issue::new(
                    location,
                    &self.name,
                    &format!("must be at most {} characters", max),
                ));
            }
        }
        if let Some(ref pattern) = self.pattern {
            if !pattern.is_match(value) {
                issues.push(Issue::new(location, &self.name, "has an invalid format"));
            }
        }
    }
}

/// One validation failure
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Issue {
    /// Which section failed: `params`, `query`, `headers`, or `body`
    pub location: &'static str,
    /// Field name
    pub field: String,
    /// Human-readable constraint description
    pub message: String,
}

impl Issue {
    fn new(location: &'static str, field: &str, message: &str) -> Self {
        Self {
            location,
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// All failures collected for one request
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    /// Individual issues in check order
    pub issues: Vec<Issue>,
}

impl ValidationReport {
    /// Joined single-line message
    pub fn message(&self) -> String {
        self.issues
            .iter()
            .map(|i| format!("{}.{}: {}", i.location, i.field, i.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Custom shape for a validation failure response
pub enum ValidationReply {
    /// Send this response as-is
    Response(Response),
    /// Wrap this value as a 400 JSON body
    Value(Value),
}

/// Hook invoked instead of the default 400 body
pub type ValidationErrorHandler = Arc<dyn Fn(&ValidationReport) -> ValidationReply + Send + Sync>;

/// Validation schema attached to a route
#[derive(Clone, Default)]
pub struct Schema {
    params: Vec<Field>,
    query: Vec<Field>,
    headers: Vec<Field>,
    body: Vec<Field>,
    error_handler: Option<ValidationErrorHandler>,
}

impl Schema {
    /// Empty schema; attach fields with the builder methods
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route-parameter rule
    #[must_use]
    pub fn param(mut self, field: Field) -> Self {
        self.params.push(field);
        self
    }

    /// Add a query rule
    #[must_use]
    pub fn query(mut self, field: Field) -> Self {
        self.query.push(field);
        self
    }

    /// Add a header rule
    #[must_use]
    pub fn header(mut self, field: Field) -> Self {
        self.headers.push(field);
        self
    }

    /// Add a body rule
    #[must_use]
    pub fn body(mut self, field: Field) -> Self {
        self.body.push(field);
        self
    }

    /// Install a custom failure handler
    #[must_use]
    pub fn on_error(
        mut self,
        handler: impl Fn(&ValidationReport) -> ValidationReply + Send + Sync + 'static,
    ) -> Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Run all checks against a request
    ///
    /// The outer error propagates body-read failures ([`crate::error::Error::BodyParse`]);
    /// the inner result carries constraint failures.
    pub async fn check(
        &self,
        ctx: &Context,
    ) -> Result<std::result::Result<(), ValidationReport>> {
        let mut issues = Vec::new();

        for field in &self.params {
            let value = ctx.param(&field.name);
            field.check_str("params", value.as_deref(), &mut issues);
        }
        for field in &self.query {
            field.check_str("query", ctx.query().get(&field.name), &mut issues);
        }
        for field in &self.headers {
            field.check_str("headers", ctx.header(&field.name), &mut issues);
        }

        if !self.body.is_empty() {
            let body = ctx.body().await?;
            match body {
                ParsedBody::Json(ref value) => {
                    for field in &self.body {
                        field.check_value(value.get(&field.name), &mut issues);
                    }
                }
                ParsedBody::Form(ref map) => {
                    for field in &self.body {
                        let value = map.get(&field.name).and_then(|v| v.first());
                        field.check_str("body", value.map(String::as_str), &mut issues);
                    }
                }
                _ => {
                    for field in &self.body {
                        if field.required {
                            issues.push(Issue::new("body", &field.name, "is required"));
                        }
                    }
                }
            }
        }

        if issues.is_empty() {
            Ok(Ok(()))
        } else {
            Ok(Err(ValidationReport { issues }))
        }
    }

    /// Build the user-visible failure response
    pub fn failure_response(&self, report: &ValidationReport) -> Response {
        if let Some(ref handler) = self.error_handler {
            return match handler(report) {
                ValidationReply::Response(response) => response,
                ValidationReply::Value(value) => Response::json(StatusCode::BAD_REQUEST, &value),
            };
        }
        Response::json(
            StatusCode::BAD_REQUEST,
            &serde_json::json!({
                "success": false,
                "message": report.message(),
            }),
        )
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("params", &self.params.len())
            .field("query", &self.query.len())
            .field("headers", &self.headers.len())
            .field("body", &self.body.len())
            .field("custom_error_handler", &self.error_handler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RawBody;
    use crate::response::ResponseBuilder;
    use crate::store::StoreRegistry;
    use bytes::Bytes;
    use http::Method;
    use serde_json::json;

    fn ctx(uri: &str, headers: &[(&str, &str)], body: &'static [u8]) -> Context {
        let mut builder = http::Request::builder().method(Method::POST).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (head, _) = builder.body(()).unwrap().into_parts();
        Context::new(
            head,
            RawBody::Full(Bytes::from_static(body)),
            None,
            Arc::new(StoreRegistry::new()),
            1024,
            ResponseBuilder::new(),
        )
    }

    #[tokio::test]
    async fn test_empty_body_string_fails_min_len() {
        let schema = Schema::new().body(Field::new("name").string().required().min_len(1));
        let ctx = ctx(
            "/items",
            &[("content-type", "application/json")],
            br#"{"name":""}"#,
        );
        let report = schema.check(&ctx).await.unwrap().unwrap_err();
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].field, "name");
        assert!(report.message().contains("at least 1"));

        let response = schema.failure_response(&report);
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_required_body_field() {
        let schema = Schema::new().body(Field::new("name").string().required());
        let ctx = ctx("/items", &[("content-type", "application/json")], br#"{}"#);
        let report = schema.check(&ctx).await.unwrap().unwrap_err();
        assert_eq!(report.issues[0].message, "is required");
    }

    #[tokio::test]
    async fn test_body_type_mismatch() {
        let schema = Schema::new().body(Field::new("count").number());
        let ctx = ctx(
            "/items",
            &[("content-type", "application/json")],
            br#"{"count":"three"}"#,
        );
        let report = schema.check(&ctx).await.unwrap().unwrap_err();
        assert!(report.message().contains("must be of type number"));
    }

    #[tokio::test]
    async fn test_param_and_query_rules() {
        let schema = Schema::new()
            .param(Field::new("id").required().pattern(r"\d+"))
            .query(Field::new("page").number());
        let ctx = ctx("/users/abc?page=x", &[], b"");
        ctx.set_params(vec![("id".to_string(), "abc".to_string())]);

        let report = schema.check(&ctx).await.unwrap().unwrap_err();
        let fields: Vec<&str> = report.issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, vec!["id", "page"]);
    }

    #[tokio::test]
    async fn test_header_rule() {
        let schema = Schema::new().header(Field::new("x-tenant").required());
        let ctx = ctx("/items", &[], b"");
        let report = schema.check(&ctx).await.unwrap().unwrap_err();
        assert_eq!(report.issues[0].location, "headers");
    }

    #[tokio::test]
    async fn test_form_body_rules() {
        let schema = Schema::new().body(Field::new("name").required().min_len(2));
        let ctx = ctx(
            "/items",
            &[("content-type", "application/x-www-form-urlencoded")],
            b"name=a",
        );
        let report = schema.check(&ctx).await.unwrap().unwrap_err();
        assert!(report.message().contains("at least 2"));
    }

    #[tokio::test]
    async fn test_passing_request() {
        let schema = Schema::new()
            .param(Field::new("id").required())
            .body(Field::new("name").string().required().min_len(1));
        let ctx = ctx(
            "/items",
            &[("content-type", "application/json")],
            br#"{"name":"ok"}"#,
        );
        ctx.set_params(vec![("id".to_string(), "5".to_string())]);
        assert!(schema.check(&ctx).await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_custom_error_handler_value_wrapped_as_400() {
        let schema = Schema::new()
            .body(Field::new("name").required())
            .on_error(|report| {
                ValidationReply::Value(json!({ "failed": report.issues.len() }))
            });
        let ctx = ctx("/items", &[("content-type", "application/json")], br#"{}"#);
        let report = schema.check(&ctx).await.unwrap().unwrap_err();
        let response = schema.failure_response(&report);
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.content_type(), Some("application/json"));
    }

    #[tokio::test]
    async fn test_malformed_body_propagates_parse_error() {
        let schema = Schema::new().body(Field::new("name").required());
        let ctx = ctx("/items", &[("content-type", "application/json")], b"{nope");
        let err = schema.check(&ctx).await.unwrap_err();
        assert!(matches!(err, crate::error::Error::BodyParse(_)));
    }
}
