//! Built-in middleware
//!
//! These are ordinary pipeline middleware; applications opt in via
//! `AppBuilder::middleware`. External concerns (auth, rate limiting,
//! compression) plug in the same way through plugins.

use http::header::{HeaderName, HeaderValue};
use std::time::Instant;
use uuid::Uuid;

use crate::context::Ctx;
use crate::deps::Deps;
use crate::pipeline::{middleware_fn, DynMiddleware, Next};

/// Header carrying the request correlation id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Key under which the request id is stored on the context
pub const REQUEST_ID_KEY: &str = "request_id";

/// Correlation-id middleware
///
/// Propagates an inbound `x-request-id` or generates a UUID, records it on
/// the context for log correlation, and echoes it on the response.
pub fn request_id() -> DynMiddleware {
    middleware_fn(|ctx: Ctx, next: Next, deps: Deps| async move {
        let id = ctx
            .header(REQUEST_ID_HEADER)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        ctx.set(REQUEST_ID_KEY, id.clone());

        let mut response = next.run(ctx, deps).await?;
        if let Ok(value) = HeaderValue::from_str(&id) {
            response
                .headers
                .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
        }
        Ok(response)
    })
}

/// Access-log middleware
///
/// Emits one structured line per request with method, path, status, and
/// elapsed time; failures are logged with the error instead of a status.
pub fn logger() -> DynMiddleware {
    middleware_fn(|ctx: Ctx, next: Next, deps: Deps| async move {
        let start = Instant::now();
        let method = ctx.method().clone();
        let path = ctx.path().to_string();

        let result = next.run(ctx, deps).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(response) => {
                tracing::info!(
                    method = %method,
                    path = %path,
                    status = response.status.as_u16(),
                    elapsed_ms,
                    "request completed"
                );
            }
            Err(err) => {
                tracing::error!(
                    method = %method,
                    path = %path,
                    error = %err,
                    elapsed_ms,
                    "request failed"
                );
            }
        }
        result
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Context, RawBody};
    use crate::deps::DependencyContainer;
    use crate::pipeline::{self, handler_fn, Hooks, Route};
    use crate::response::ResponseBuilder;
    use crate::store::StoreRegistry;
    use http::Method;
    use serde_json::json;
    use std::sync::Arc;

    fn make_ctx(headers: &[(&str, &str)]) -> Ctx {
        let mut builder = http::Request::builder().method(Method::GET).uri("/ping");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (head, _) = builder.body(()).unwrap().into_parts();
        Arc::new(Context::new(
            head,
            RawBody::None,
            None,
            Arc::new(StoreRegistry::new()),
            1024,
            ResponseBuilder::new(),
        ))
    }

    fn ping_route() -> Route {
        Route {
            handler: handler_fn(|ctx: Ctx, _deps: Deps| async move { Ok(ctx.json(&json!("pong"))) }),
            middlewares: Vec::new(),
            schema: None,
            inject: None,
            meta: None,
            response_serializers: None,
        }
    }

    #[tokio::test]
    async fn test_request_id_generated_and_echoed() {
        let ctx = make_ctx(&[]);
        let route = ping_route();
        let globals = vec![request_id()];
        let response = pipeline::run(
            &route,
            &globals,
            Arc::new(Hooks::default()),
            ctx.clone(),
            Deps::all(Arc::new(DependencyContainer::new())),
        )
        .await
        .unwrap();

        let id_on_ctx = ctx.get(REQUEST_ID_KEY).unwrap();
        let id_on_response = response
            .headers
            .get(REQUEST_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert_eq!(id_on_ctx.as_str().unwrap(), id_on_response);
    }

    #[tokio::test]
    async fn test_request_id_propagates_inbound_value() {
        let ctx = make_ctx(&[(REQUEST_ID_HEADER, "req-123")]);
        let route = ping_route();
        let globals = vec![request_id()];
        let response = pipeline::run(
            &route,
            &globals,
            Arc::new(Hooks::default()),
            ctx,
            Deps::all(Arc::new(DependencyContainer::new())),
        )
        .await
        .unwrap();

        assert_eq!(
            response.headers.get(REQUEST_ID_HEADER).unwrap(),
            "req-123"
        );
    }
}
