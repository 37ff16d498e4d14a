//! One-shot callback listener for the `serve` demo.
//!
//! Accepts requests until one carries `openid.*` parameters, answers it, shuts
//! down, and hands back the request target. Verification happens afterwards,
//! outside the runtime, because the verifier's transport is blocking.

use anyhow::Context;
use axum::Router;
use axum::extract::{OriginalUri, State};
use axum::http::StatusCode;
use axum::response::Html;
use tokio::sync::{mpsc, oneshot};

const DONE_PAGE: &str = "<p>Success! Check your console ...</p>";

/// Listen on `127.0.0.1:port` and return the path and query of the first
/// OpenID callback.
pub fn capture_callback(port: u16) -> anyhow::Result<String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;

    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .with_context(|| format!("failed to listen on port {port}"))?;
        tracing::info!(port, "waiting for the OP callback");

        let (tx, mut rx) = mpsc::channel::<String>(1);
        let (target_tx, target_rx) = oneshot::channel::<String>();
        let app = Router::new().fallback(capture).with_state(tx);

        let shutdown = async move {
            if let Some(target) = rx.recv().await {
                let _ = target_tx.send(target);
            }
        };
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .context("callback listener failed")?;

        target_rx
            .await
            .context("listener stopped before a callback arrived")
    })
}

async fn capture(
    State(tx): State<mpsc::Sender<String>>,
    OriginalUri(uri): OriginalUri,
) -> (StatusCode, Html<&'static str>) {
    let is_openid = uri.query().is_some_and(|q| q.contains("openid."));
    if !is_openid {
        tracing::debug!(%uri, "ignoring non-OpenID request");
        return (StatusCode::NOT_FOUND, Html("<p>Not an OpenID callback.</p>"));
    }
    if tx.try_send(uri.to_string()).is_err() {
        tracing::warn!(%uri, "callback already captured, ignoring");
    }
    (StatusCode::OK, Html(DONE_PAGE))
}

/// Rebuild the full callback URL from the `return_to` base and the request
/// target the listener saw.
pub fn callback_url(return_to: &str, target: &str) -> anyhow::Result<String> {
    let base =
        url::Url::parse(return_to).with_context(|| format!("return_to {return_to:?} is not a URL"))?;
    let full = base
        .join(target)
        .with_context(|| format!("cannot resolve {target:?} against {return_to}"))?;
    Ok(full.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_url_uses_return_to_origin() {
        let url = callback_url(
            "http://localhost:8000/?request_id=abc",
            "/?openid.mode=id_res&request_id=abc",
        )
        .unwrap();
        assert_eq!(url, "http://localhost:8000/?openid.mode=id_res&request_id=abc");
    }

    #[test]
    fn callback_url_keeps_encoded_query() {
        let url = callback_url(
            "http://localhost:8000/",
            "/cb?openid.return_to=http%3A%2F%2Flocalhost%3A8000%2Fcb",
        )
        .unwrap();
        assert_eq!(
            url,
            "http://localhost:8000/cb?openid.return_to=http%3A%2F%2Flocalhost%3A8000%2Fcb"
        );
    }

    #[test]
    fn callback_url_needs_absolute_base() {
        assert!(callback_url("localhost", "/").is_err());
    }
}
