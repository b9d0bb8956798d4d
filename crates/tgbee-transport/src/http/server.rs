//! Webhook receiver.
//!
//! The remote service POSTs each update as a JSON body. The receiver decodes
//! it and hands it to a [`PushHandle`]; ordering and deduplication happen
//! there.
//!
//! ```text
//! POST {path} ──secret check──▶ decode ──▶ PushHandle::push ──▶ PushSource
//!     401 ◀──┘          400 ◀──┘       200 (accepted, duplicate, out of order)
//!                                      503 (engine no longer accepting)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use tgbee_core::Update;
use tgbee_framework::{IngestionError, PushHandle, PushReceipt};

/// Header carrying the secret registered with `setWebhook`.
pub const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Where and how the webhook listens.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    /// Requests without this value in [`SECRET_TOKEN_HEADER`] are rejected.
    pub secret_token: Option<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8443,
            path: "/webhook".to_string(),
            secret_token: None,
        }
    }
}

impl WebhookConfig {
    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn normalized_path(&self) -> String {
        if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        }
    }
}

/// Shared state of the receiving route.
struct WebhookState {
    handle: PushHandle,
    secret: Option<String>,
}

/// HTTP server feeding pushed updates into a [`PushHandle`].
pub struct WebhookServer {
    config: WebhookConfig,
    handle: PushHandle,
}

impl WebhookServer {
    pub fn new(config: WebhookConfig, handle: PushHandle) -> Self {
        Self { config, handle }
    }

    /// The axum router serving the webhook path.
    pub fn router(&self) -> Router {
        let state = Arc::new(WebhookState {
            handle: self.handle.clone(),
            secret: self.config.secret_token.clone(),
        });
        Router::new()
            .route(&self.config.normalized_path(), post(receive))
            .with_state(state)
    }

    /// Binds the listener and starts serving in the background.
    pub async fn bind(self) -> std::io::Result<WebhookListener> {
        let router = self.router();
        let listener = TcpListener::bind(self.config.addr()).await?;
        let local_addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();

        info!(addr = %local_addr, path = %self.config.normalized_path(), "webhook listening");

        let token = shutdown.clone();
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned());
            if let Err(e) = server.await {
                error!(error = %e, "webhook server error");
            }
            info!("webhook server stopped");
        });

        Ok(WebhookListener {
            local_addr,
            shutdown,
            task,
        })
    }
}

/// A running webhook server.
pub struct WebhookListener {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl WebhookListener {
    /// The address the OS actually bound, including ephemeral ports.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections and waits for in-flight requests.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "webhook server task failed");
        }
    }
}

async fn receive(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(secret) = &state.secret {
        let presented = headers.get(SECRET_TOKEN_HEADER).map(|v| v.as_bytes());
        if presented != Some(secret.as_bytes()) {
            warn!("webhook request with missing or wrong secret token");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!(error = %e, len = body.len(), "undecodable webhook body");
            return StatusCode::BAD_REQUEST;
        }
    };
    let update_id = update.update_id;

    match state.handle.push(update).await {
        Ok(PushReceipt::Accepted) => trace!(update_id, "update accepted"),
        Ok(PushReceipt::Duplicate) => debug!(update_id, "duplicate update acknowledged"),
        Err(IngestionError::OutOfOrder { last, .. }) => {
            warn!(update_id, last, "out-of-order update acknowledged and dropped");
        }
        Err(e) => {
            warn!(update_id, error = %e, "update refused");
            return StatusCode::SERVICE_UNAVAILABLE;
        }
    }
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tgbee_framework::PushSource;
    use tower::ServiceExt;

    use super::*;

    fn request(body: &str, secret: Option<&str>) -> Request<Body> {
        let mut builder = Request::post("/hook").header("content-type", "application/json");
        if let Some(secret) = secret {
            builder = builder.header(SECRET_TOKEN_HEADER, secret);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn update(id: i64) -> String {
        format!(r#"{{"update_id":{id},"poll":{{"id":"p","question":"q"}}}}"#)
    }

    fn server(secret: Option<&str>) -> (Router, PushSource, PushHandle) {
        let (source, handle) = PushSource::new(8);
        let config = WebhookConfig {
            path: "hook".to_string(),
            secret_token: secret.map(str::to_string),
            ..Default::default()
        };
        (WebhookServer::new(config, handle.clone()).router(), source, handle)
    }

    #[tokio::test]
    async fn test_secret_token_is_enforced() {
        let (router, _source, handle) = server(Some("s3cret"));
        let res = router.clone().oneshot(request(&update(1), None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let res = router.clone().oneshot(request(&update(1), Some("nope"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let res = router.oneshot(request(&update(1), Some("s3cret"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(handle.last_accepted().await, Some(1));
    }

    #[tokio::test]
    async fn test_bad_json_and_ordering() {
        let (router, _source, handle) = server(None);
        let res = router.clone().oneshot(request("{not json", None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        for id in [5, 5, 3] {
            let res = router.clone().oneshot(request(&update(id), None)).await.unwrap();
            assert_eq!(res.status(), StatusCode::OK);
        }
        assert_eq!(handle.last_accepted().await, Some(5));
    }

    #[tokio::test]
    async fn test_closed_queue_is_unavailable() {
        let (router, source, _handle) = server(None);
        drop(source);
        let res = router.oneshot(request(&update(1), None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
