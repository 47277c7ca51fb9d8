//! Serving an [App] over tcp.
use super::{config::ServerConfig, App};
use hyper::{
    server::conn::AddrStream,
    service::{make_service_fn, service_fn},
    Server,
};
use std::{convert::Infallible, future::Future, io};
use thiserror::Error;
use tracing::{debug_span, error, info, Instrument};

/// An error that stopped a server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind: {}", .0)]
    Bind(hyper::Error),
    #[error("server failed: {}", .0)]
    Serve(hyper::Error),
    #[error("failed to start runtime: {}", .0)]
    Runtime(io::Error),
}

impl App {
    /// Serve requests until the process exits.
    pub async fn serve(self, config: &ServerConfig) -> Result<(), ServerError> {
        self.serve_with_shutdown(config, futures::future::pending())
            .await
    }

    /// Serve requests until `signal` resolves, then finish in-flight requests and return.
    pub async fn serve_with_shutdown<F>(
        self,
        config: &ServerConfig,
        signal: F,
    ) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let app = self.body_length_limit(config.body_length_limit);

        let builder = (Server::try_bind(&config.address))
            .map_err(ServerError::Bind)?
            .http1_keepalive(config.http1_keep_alive)
            .http2_only(config.http2_only);

        let make_svc = make_service_fn(move |conn: &AddrStream| {
            let app = app.clone();
            let remote = conn.remote_addr();
            let guard = app.channels.register(remote);
            let channel = guard.id();

            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    // registered for as long as the connection's service lives
                    let _ = &guard;
                    let app = app.clone();
                    let span = debug_span!(
                        "request",
                        %channel,
                        method = %req.method(),
                        uri = %req.uri(),
                    );

                    async move { Ok::<_, Infallible>(app.dispatch(req, remote).await) }
                        .instrument(span)
                }))
            }
        });

        let server = builder.serve(make_svc);
        info!(address = %server.local_addr(), "listening");

        let result = server.with_graceful_shutdown(signal).await;
        match &result {
            Ok(()) => info!("server shut down"),
            Err(e) => error!(error = %e, "server failed"),
        }
        result.map_err(ServerError::Serve)
    }

    /// Build a multi-threaded runtime sized by `config` and serve on it, blocking the calling
    /// thread.
    pub fn run(self, config: &ServerConfig) -> Result<(), ServerError> {
        let mut runtime = tokio::runtime::Builder::new_multi_thread();
        runtime.enable_all();
        if let Some(n) = config.worker_threads {
            runtime.worker_threads(n);
        }

        let runtime = runtime.build().map_err(ServerError::Runtime)?;
        runtime.block_on(self.serve(config))
    }
}
