//! Admin session tokens and the cookie guard for admin routes

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{extract::State, http::Request, middleware::Next, response::Response};
use axum_extra::{TypedHeader, headers::Cookie};
use rand::RngCore;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{error::ApiError, state::AppState};

pub const SESSION_COOKIE: &str = "session_token";

/// Issued admin tokens and their expiry
#[derive(Debug, Clone)]
pub struct AdminSessions {
    ttl: Duration,
    tokens: Arc<Mutex<HashMap<String, Instant>>>,
}

impl AdminSessions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            tokens: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a fresh random token
    pub async fn issue(&self) -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();

        let mut tokens = self.tokens.lock().await;
        let now = Instant::now();
        tokens.retain(|_, expires| *expires > now);
        tokens.insert(token.clone(), now + self.ttl);

        info!("Issued admin session ({} active)", tokens.len());
        token
    }

    pub async fn is_valid(&self, token: &str) -> bool {
        let mut tokens = self.tokens.lock().await;
        match tokens.get(token) {
            Some(expires) if *expires > Instant::now() => true,
            Some(_) => {
                debug!("Admin session expired");
                tokens.remove(token);
                false
            }
            None => false,
        }
    }

    pub async fn revoke(&self, token: &str) {
        self.tokens.lock().await.remove(token);
    }
}

/// Reject admin requests without a live session cookie
pub async fn admin_middleware(
    State(state): State<AppState>,
    cookies: Option<TypedHeader<Cookie>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = cookies
        .as_ref()
        .and_then(|TypedHeader(cookies)| cookies.get(SESSION_COOKIE))
        .ok_or(ApiError::Unauthorized)?;

    if !state.admin.is_valid(token).await {
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_issued_token_is_valid_until_revoked() {
        let sessions = AdminSessions::new(Duration::from_secs(60));
        let token = sessions.issue().await;

        assert_eq!(token.len(), 64);
        assert!(sessions.is_valid(&token).await);
        assert!(!sessions.is_valid("forged").await);

        sessions.revoke(&token).await;
        assert!(!sessions.is_valid(&token).await);
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let sessions = AdminSessions::new(Duration::ZERO);
        let token = sessions.issue().await;
        assert!(!sessions.is_valid(&token).await);
    }
}
