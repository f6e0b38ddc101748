//! Combines the auth identity with the profile row into the user the rest
//! of the client sees.

use serde::Serialize;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::{
    auth::Identity,
    error::ApiResult,
    profiles::{Profile, ProfilePatch, Users},
};

/// The signed-in user: identity plus profile. Where both carry a value the
/// profile's wins.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionUser {
    pub identity: Identity,
    /// Absent right after sign-up, before the profile row exists.
    pub profile: Option<Profile>,
}

impl SessionUser {
    /// Auth identity id; the key every user-owned row references.
    pub fn id(&self) -> Uuid {
        self.identity.id
    }

    pub fn email(&self) -> Option<&str> {
        self.profile
            .as_ref()
            .and_then(|p| p.email.as_deref())
            .or(self.identity.email.as_deref())
    }

    pub fn username(&self) -> Option<&str> {
        self.profile.as_ref().map(|p| p.username.as_str())
    }

    pub fn display_name(&self) -> &str {
        match &self.profile {
            Some(profile) => profile.display_name(),
            None => self.identity.email.as_deref().unwrap_or_default(),
        }
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.profile
            .as_ref()
            .and_then(|p| p.created_at)
            .unwrap_or(self.identity.created_at)
    }

    pub fn is_sanctuary(&self) -> bool {
        self.profile.as_ref().is_some_and(Profile::is_sanctuary)
    }

    /// Folds an already-saved edit into the in-memory user. Returns false
    /// when there is no profile to fold into.
    pub fn apply(&mut self, patch: &ProfilePatch) -> bool {
        match &mut self.profile {
            Some(profile) => {
                patch.apply_to(profile);
                true
            }
            None => false,
        }
    }
}

/// `None` means "no session": a failed lookup is not retried here, the
/// next auth event runs the merge again.
pub fn merge(identity: Identity, profile: ApiResult<Option<Profile>>) -> Option<SessionUser> {
    match profile {
        Ok(profile) => Some(SessionUser { identity, profile }),
        Err(e) => {
            warn!(user_id = %identity.id, error = %e, "could not load profile");
            None
        }
    }
}

pub async fn load(users: &Users, identity: Identity) -> Option<SessionUser> {
    let profile = users.get_by_auth_id(identity.id).await;
    merge(identity, profile)
}
