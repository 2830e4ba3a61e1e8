//! HTTP server with graceful shutdown
//!
//! Binds the listener, serves each connection on its own task over HTTP/1.1,
//! and drives the shutdown sequence: on the first signal (or a programmatic
//! trigger) the accept loop stops, in-flight requests drain under the
//! configured deadline, shutdown hooks run in priority order, and the
//! listener closes.

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::app::App;
use crate::error::Result;
use crate::shutdown::wait_for_signal;

/// Server instance wrapping an [`App`]
pub struct Server {
    app: App,
}

impl Server {
    /// Create a new server instance
    pub fn new(app: App) -> Self {
        Self { app }
    }

    /// Bind the configured address
    pub async fn bind(self) -> Result<BoundServer> {
        let host = self.app.config().service.host.clone();
        let port = self.app.config().service.port;
        let listener = TcpListener::bind((host.as_str(), port)).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(
            "Server listening on {} ({})",
            local_addr,
            self.app.config().service.name
        );
        Ok(BoundServer {
            app: self.app,
            listener,
            local_addr,
        })
    }

    /// Bind and serve until shutdown completes
    pub async fn serve(self) -> Result<()> {
        self.bind().await?.run().await
    }
}

/// A server with its listener already bound
///
/// Splitting bind from run lets tests bind port 0 and read the actual
/// address before serving.
pub struct BoundServer {
    app: App,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl BoundServer {
    /// The bound address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The app served by this listener
    pub fn app(&self) -> &App {
        &self.app
    }

    /// Accept connections until shutdown, then drain and close
    pub async fn run(self) -> Result<()> {
        let app = self.app;
        let listener = self.listener;
        let coordinator = app.shutdown_coordinator();

        // Plugins learn the listener is up before the first accept.
        app.plugins().lock().await.run_ready().await?;

        // Signals trigger the same idempotent begin() as App::shutdown().
        let signals = app.config().shutdown.signals.clone();
        if !signals.is_empty() {
            let signal_coordinator = coordinator.clone();
            tokio::spawn(async move {
                wait_for_signal(&signals).await;
                signal_coordinator.begin();
            });
        }

        let cancel = coordinator.cancel_token();

        // The accept loop keeps running while the coordinator drains so that
        // requests arriving during the drain window are answered with the
        // 503 draining response instead of being left in the backlog. It is
        // dropped, and the listener with it, once the sequence finishes.
        let accept_loop = async {
            loop {
                match listener.accept().await {
                    Ok((stream, remote_addr)) => {
                        let app = app.clone();
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req| {
                                let app = app.clone();
                                async move {
                                    Ok::<_, Infallible>(app.handle(req, Some(remote_addr)).await)
                                }
                            });
                            if let Err(err) =
                                http1::Builder::new().serve_connection(io, service).await
                            {
                                tracing::debug!("Connection closed: {:?}", err);
                            }
                        });
                    }
                    Err(err) => {
                        tracing::error!("Failed to accept connection: {}", err);
                    }
                }
            }
        };

        let report = tokio::select! {
            _ = accept_loop => unreachable!("accept loop never returns"),
            report = async {
                cancel.cancelled().await;
                coordinator.finalize().await
            } => report,
        };

        tracing::info!("Stopped accepting new connections");
        if !report.drained {
            tracing::warn!(
                active = report.active_at_timeout.len(),
                requests = ?report.active_at_timeout,
                "Requests still active at the drain deadline"
            );
            // Final grace period for stragglers before the listener drops.
            tokio::time::sleep(std::time::Duration::from_secs(
                app.config().shutdown.grace_secs,
            ))
            .await;
        }
        drop(listener);
        app.stores().dispose_singletons();
        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::Ctx;
    use crate::deps::Deps;
    use serde_json::json;

    async fn bound_app() -> BoundServer {
        let mut config = Config::default();
        config.service.host = "127.0.0.1".to_string();
        config.service.port = 0;
        config.shutdown.signals = vec![];

        let mut builder = App::builder(config);
        builder.get("/ping", |ctx: Ctx, _deps: Deps| async move {
            Ok(ctx.json(&json!({"pong": true})))
        });
        let app = builder.build().await.unwrap();
        Server::new(app).bind().await.unwrap()
    }

    #[tokio::test]
    async fn test_bind_assigns_ephemeral_port() {
        let server = bound_app().await;
        assert_ne!(server.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_run_exits_after_shutdown() {
        let server = bound_app().await;
        let app = server.app().clone();
        let task = tokio::spawn(server.run());

        // Give the accept loop a moment, then trigger shutdown.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        app.shutdown();

        tokio::time::timeout(std::time::Duration::from_secs(5), task)
            .await
            .expect("server did not stop in time")
            .unwrap()
            .unwrap();
    }
}
