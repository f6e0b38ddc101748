//! Client for the hosted auth service.
//!
//! [`AuthClient`] owns the token bundle: it binds it to the shared
//! [`SupabaseClient`] so data calls run as the user, persists it through a
//! [`SessionStorage`], and broadcasts an [`AuthEvent`] on every transition.

use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    client::SupabaseClient,
    error::{ApiError, ApiResult},
};

mod clients;
mod identity;
mod lockin;
mod login;
mod logout;
pub mod storage;
pub mod validate;

pub use clients::ClientProvider;
pub use identity::{AuthSession, Identity, SignUpResponse, UserAttributes};
pub use lockin::OAuthStart;
pub use storage::{MemoryStorage, SessionStorage, SqliteStorage};

const EVENT_CAPACITY: usize = 32;

/// Refresh tokens this close to expiry.
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    /// Outcome of restoring a stored session at start.
    InitialSession(Option<Identity>),
    SignedIn(Identity),
    SignedOut,
    TokenRefreshed(Identity),
    UserUpdated(Identity),
}

impl AuthEvent {
    pub fn identity(&self) -> Option<&Identity> {
        use AuthEvent::*;
        match self {
            InitialSession(identity) => identity.as_ref(),
            SignedIn(identity) | TokenRefreshed(identity) | UserUpdated(identity) => Some(identity),
            SignedOut => None,
        }
    }
}

#[derive(Clone)]
pub struct AuthClient {
    client: SupabaseClient,
    storage: Arc<dyn SessionStorage>,
    events: broadcast::Sender<AuthEvent>,
    redirect_url: Option<String>,
}

impl AuthClient {
    pub fn new(client: SupabaseClient, storage: Arc<dyn SessionStorage>, redirect_url: Option<String>) -> Self {
        Self {
            client,
            storage,
            events: broadcast::channel(EVENT_CAPACITY).0,
            redirect_url,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    pub fn session(&self) -> Option<AuthSession> {
        self.client.session()
    }

    pub(crate) fn emit(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }

    /// Binds and persists a fresh session.
    async fn establish(&self, session: AuthSession) -> AuthSession {
        let session = session.stamped();
        self.client.bind_session(Some(session.clone()));
        if let Err(e) = self.storage.save(&session).await {
            warn!(error = %e, "could not persist session");
        }
        session
    }

    async fn forget(&self) {
        self.client.bind_session(None);
        if let Err(e) = self.storage.clear().await {
            warn!(error = %e, "could not clear stored session");
        }
    }

    async fn post_token(&self, grant_type: &str, body: &Value) -> ApiResult<AuthSession> {
        let url = self.client.endpoint("auth", "token");
        let response = self
            .client
            .request(Method::POST, &url)
            .query(&[("grant_type", grant_type)])
            .json(body)
            .send()
            .await?;
        SupabaseClient::json_or_error(response).await
    }

    /// Picks up a stored session, refreshing it when it has expired.
    pub async fn restore(&self) -> Option<Identity> {
        let stored = self.storage.load().await.unwrap_or_else(|e| {
            warn!(error = %e, "could not read stored session");
            None
        });

        let Some(stored) = stored else {
            self.emit(AuthEvent::InitialSession(None));
            return None;
        };

        let session = if stored.is_expired(REFRESH_MARGIN_SECS) {
            let body = json!({ "refresh_token": stored.refresh_token });
            match self.post_token("refresh_token", &body).await {
                Ok(fresh) => self.establish(fresh).await,
                Err(e) => {
                    warn!(error = %e, "stored session could not be refreshed");
                    if !e.is_network() {
                        self.forget().await;
                    }
                    self.emit(AuthEvent::InitialSession(None));
                    return None;
                }
            }
        } else {
            self.client.bind_session(Some(stored.clone()));
            stored
        };

        info!(user_id = %session.user.id, "restored session");
        self.emit(AuthEvent::InitialSession(Some(session.user.clone())));
        Some(session.user)
    }

    pub async fn refresh_session(&self) -> ApiResult<AuthSession> {
        let current = self.client.session().ok_or(ApiError::NotAuthenticated)?;
        let body = json!({ "refresh_token": current.refresh_token });

        match self.post_token("refresh_token", &body).await {
            Ok(fresh) => {
                let session = self.establish(fresh).await;
                self.emit(AuthEvent::TokenRefreshed(session.user.clone()));
                Ok(session)
            }
            Err(e @ ApiError::Remote { .. }) => {
                warn!(error = %e, "refresh token rejected, signing out");
                self.forget().await;
                self.emit(AuthEvent::SignedOut);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// The auth record of the signed-in user, straight from the server.
    pub async fn get_user(&self) -> ApiResult<Identity> {
        self.client.require_user_id()?;
        let url = self.client.endpoint("auth", "user");
        let response = self.client.request(Method::GET, &url).send().await?;
        SupabaseClient::json_or_error(response).await
    }

    pub async fn update_user(&self, attributes: &UserAttributes) -> ApiResult<Identity> {
        self.client.require_user_id()?;
        let mut session = self.client.session().ok_or(ApiError::NotAuthenticated)?;

        let url = self.client.endpoint("auth", "user");
        let response = self
            .client
            .request(Method::PUT, &url)
            .json(attributes)
            .send()
            .await?;
        let identity: Identity = SupabaseClient::json_or_error(response).await?;

        session.user = identity.clone();
        self.establish(session).await;
        self.emit(AuthEvent::UserUpdated(identity.clone()));
        Ok(identity)
    }

    /// Emails a password reset link.
    pub async fn reset_password_for_email(&self, email: &str) -> ApiResult<()> {
        let url = self.client.endpoint("auth", "recover");
        let mut request = self
            .client
            .request(Method::POST, &url)
            .json(&json!({ "email": email }));
        if let Some(redirect) = &self.redirect_url {
            request = request.query(&[("redirect_to", redirect)]);
        }

        let response = request.send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(SupabaseClient::error_from_response(response).await)
        }
    }
}
