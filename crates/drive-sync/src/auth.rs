//! Boundary to the host's OAuth session.
//!
//! The sync core only needs to know whether an access token is present and
//! how to force a sign-out when Drive rejects it.

use async_trait::async_trait;
use tokio::sync::RwLock;

#[async_trait]
pub trait AuthSession: Send + Sync {
    /// Current access token, `None` when signed out.
    async fn access_token(&self) -> Option<String>;

    /// Called once Drive answered 401/403 for the current token.
    async fn sign_out(&self, reason: &str);
}

/// In-process token holder for hosts that manage OAuth themselves.
#[derive(Debug, Default)]
pub struct SharedAuthSession {
    token: RwLock<Option<String>>,
    sign_out_reason: RwLock<Option<String>>,
}

impl SharedAuthSession {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
            sign_out_reason: RwLock::new(None),
        }
    }

    pub async fn set_token(&self, token: impl Into<String>) {
        *self.token.write().await = Some(token.into());
        *self.sign_out_reason.write().await = None;
    }

    pub async fn is_signed_in(&self) -> bool {
        self.token.read().await.is_some()
    }

    /// Why the last forced sign-out happened, if any.
    pub async fn sign_out_reason(&self) -> Option<String> {
        self.sign_out_reason.read().await.clone()
    }
}

#[async_trait]
impl AuthSession for SharedAuthSession {
    async fn access_token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    async fn sign_out(&self, reason: &str) {
        log::info!("[InventorySync] Signing out: {}", reason);
        *self.token.write().await = None;
        *self.sign_out_reason.write().await = Some(reason.to_string());
    }
}
