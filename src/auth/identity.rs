use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// The auth service's record of a user. Read-only to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_sign_in_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub email_confirmed_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub user_metadata: Value,
    /// Linked sign-in methods. Sign-up answers an already registered
    /// address with an empty list instead of an error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identities: Option<Vec<Value>>,
}

impl Identity {
    pub fn is_confirmed(&self) -> bool {
        self.email_confirmed_at.is_some()
    }
}

/// Token bundle for a signed-in user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "bearer")]
    pub token_type: String,
    pub expires_in: i64,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: Identity,
}

fn bearer() -> String {
    "bearer".to_owned()
}

impl AuthSession {
    /// Fills in `expires_at` when the server only sent `expires_in`.
    pub(crate) fn stamped(mut self) -> Self {
        if self.expires_at.is_none() {
            self.expires_at = Some(OffsetDateTime::now_utc().unix_timestamp() + self.expires_in);
        }
        self
    }

    /// Expired, or expiring within `margin_secs`.
    pub fn is_expired(&self, margin_secs: i64) -> bool {
        match self.expires_at {
            Some(at) => at - margin_secs <= OffsetDateTime::now_utc().unix_timestamp(),
            None => false,
        }
    }
}

/// Sign-up answers with a session when email confirmation is disabled and
/// with the bare user otherwise.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SignUpResponse {
    Session(AuthSession),
    User(Identity),
}

impl SignUpResponse {
    pub fn identity(&self) -> &Identity {
        match self {
            SignUpResponse::Session(session) => &session.user,
            SignUpResponse::User(identity) => identity,
        }
    }
}

/// Changes to the auth record itself (not the profile).
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}
