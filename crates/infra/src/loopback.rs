//! Loopback callback listener
//!
//! A short-lived local HTTP endpoint that receives the authorization
//! redirect. Only a GET request to the redirect path carrying a query string
//! with both `code` and `state` satisfies the wait; any other request to the
//! path fails the attempt. The listener serves exactly one attempt and is
//! torn down on completion, cancellation or timeout.

use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{RawQuery, State};
use axum::http::Method;
use axum::response::Html;
use axum::routing::any;
use axum::Router;
use grantwell_core::{AuthorizationCallback, CallbackListener, PendingAuthorization};
use grantwell_domain::{AuthError, Result};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use url::Url;

const SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Authorization Complete</title></head>
<body><h1>Authorization Successful</h1><p>You can close this window.</p></body>
</html>"#;

const FAILURE_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Authorization Failed</title></head>
<body><h1>Authorization Failed</h1><p>Invalid or unexpected callback parameters.</p></body>
</html>"#;

/// [`CallbackListener`] binding a local HTTP server to the redirect URI.
#[derive(Debug, Default)]
pub struct LoopbackListener;

impl LoopbackListener {
    /// Create a listener.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CallbackListener for LoopbackListener {
    async fn bind(&self, redirect_uri: &Url) -> Result<Box<dyn PendingAuthorization>> {
        let host = redirect_uri.host_str().unwrap_or("127.0.0.1");
        let port = redirect_uri.port_or_known_default().unwrap_or(80);
        let address = format!("{host}:{port}");

        let listener = TcpListener::bind(&address).await.map_err(|err| {
            AuthError::transport(format!("failed to bind loopback listener on {address}: {err}"))
        })?;

        debug!(address = %address, path = %redirect_uri.path(), "loopback listener bound");

        let (result_tx, result_rx) = mpsc::channel::<Result<AuthorizationCallback>>(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let app = Router::new()
            .route(redirect_uri.path(), any(handle_callback))
            .with_state(result_tx);

        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                error!("loopback listener error: {err}");
            }
        });

        Ok(Box::new(BoundLoopback {
            result_rx,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }))
    }
}

async fn handle_callback(
    State(result_tx): State<mpsc::Sender<Result<AuthorizationCallback>>>,
    method: Method,
    RawQuery(query): RawQuery,
) -> Html<&'static str> {
    let outcome = evaluate_request(&method, query.as_deref());
    let page = if outcome.is_ok() { SUCCESS_PAGE } else { FAILURE_PAGE };

    // Only the first request decides the attempt; later ones just get the
    // failure page.
    let _ = result_tx.try_send(outcome);

    Html(page)
}

fn evaluate_request(method: &Method, query: Option<&str>) -> Result<AuthorizationCallback> {
    if *method != Method::GET {
        return Err(AuthError::authentication("rejected loopback request"));
    }
    let query = match query {
        Some(query) if !query.is_empty() => query,
        _ => return Err(AuthError::authentication("rejected loopback request")),
    };

    let mut code = None;
    let mut state = None;
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            _ => {}
        }
    }

    match (code, state) {
        (Some(code), Some(state)) => Ok(AuthorizationCallback { code, state }),
        _ => Err(AuthError::authentication("callback is missing code or state")),
    }
}

/// A bound loopback listener awaiting its single callback.
struct BoundLoopback {
    result_rx: mpsc::Receiver<Result<AuthorizationCallback>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl BoundLoopback {
    async fn teardown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.await.is_err() {
                error!("loopback listener task failed during teardown");
            }
        }
    }
}

#[async_trait]
impl PendingAuthorization for BoundLoopback {
    async fn wait(
        mut self: Box<Self>,
        cancellation: CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<AuthorizationCallback> {
        let received = match timeout {
            Some(limit) => {
                tokio::select! {
                    biased;
                    () = cancellation.cancelled() => {
                        Err(AuthError::canceled("loopback wait canceled"))
                    }
                    () = tokio::time::sleep(limit) => {
                        Err(AuthError::canceled("loopback wait timed out"))
                    }
                    message = self.result_rx.recv() => resolve(message),
                }
            }
            None => {
                tokio::select! {
                    biased;
                    () = cancellation.cancelled() => {
                        Err(AuthError::canceled("loopback wait canceled"))
                    }
                    message = self.result_rx.recv() => resolve(message),
                }
            }
        };

        self.teardown().await;
        received
    }
}

fn resolve(message: Option<Result<AuthorizationCallback>>) -> Result<AuthorizationCallback> {
    message.unwrap_or_else(|| Err(AuthError::transport("loopback listener stopped unexpectedly")))
}

impl Drop for BoundLoopback {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                handle.abort();
            }
        }
    }
}
