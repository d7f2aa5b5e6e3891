//! # Authentication Gate Module
//!
//! Minimal stand-in for spec.md §6's `/auth_1`/`/auth_2` token flow and the
//! "every non-`/sid/…` path is localhost-only" rule. The persistent token
//! store is explicitly out of scope (spec.md §1); `TokenStore` is the seam a
//! real implementation would plug into, grounded in the shape of the
//! teacher's `auth_middleware` (`middleware/mod.rs`) trimmed down to just
//! the origin check and a bearer-token lookup.

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Where issued tokens are kept. A real daemon persists these to `authdb`;
/// tests and local runs use `InMemoryTokenStore`.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn is_valid(&self, token: &str) -> bool;
    async fn issue(&self, token: String);
}

#[derive(Default)]
pub struct InMemoryTokenStore {
    tokens: RwLock<HashSet<String>>,
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn is_valid(&self, token: &str) -> bool {
        self.tokens.read().await.contains(token)
    }

    async fn issue(&self, token: String) {
        self.tokens.write().await.insert(token);
    }
}

fn is_local_addr(addr: SocketAddr) -> bool {
    addr.ip().is_loopback()
}

/// Middleware enforcing spec.md §6's access rule: `/sid/…` is open to
/// anyone; every other path requires either a local peer address or a
/// valid bearer token, unless `disableauth` is set.
pub async fn auth_gate(
    State(state): State<crate::server::AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if req.uri().path().starts_with("/sid/") {
        return next.run(req).await;
    }
    if state.config.disableauth {
        return next.run(req).await;
    }
    if is_local_addr(addr) {
        return next.run(req).await;
    }

    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    match token {
        Some(t) if state.token_store.is_valid(t).await => next.run(req).await,
        _ => (
            StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({
                "error": { "message": "unauthorized", "type": "authentication_error", "code": 401 }
            })),
        )
            .into_response(),
    }
}

pub type SharedTokenStore = Arc<dyn TokenStore>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn issued_token_is_valid() {
        let store = InMemoryTokenStore::default();
        store.issue("abc123".to_string()).await;
        assert!(store.is_valid("abc123").await);
        assert!(!store.is_valid("nope").await);
    }

    #[test]
    fn loopback_is_recognized_local() {
        let addr: SocketAddr = "127.0.0.1:12345".parse().unwrap();
        assert!(is_local_addr(addr));
        let addr: SocketAddr = "93.184.216.34:80".parse().unwrap();
        assert!(!is_local_addr(addr));
    }
}
