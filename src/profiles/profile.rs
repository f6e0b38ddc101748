use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    #[default]
    User,
    Sanctuary,
}

/// Application-level user record, one per auth identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub auth_id: Uuid,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub account_type: AccountKind,
    #[serde(default)]
    pub sanctuary_name: Option<String>,
    #[serde(default)]
    pub sanctuary_description: Option<String>,
    #[serde(default)]
    pub verification_documents: Option<Vec<String>>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

/// Sanctuary-only fields of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sanctuary<'a> {
    pub name: Option<&'a str>,
    pub description: Option<&'a str>,
    pub verification_documents: &'a [String],
}

impl Profile {
    pub fn is_sanctuary(&self) -> bool {
        self.account_type == AccountKind::Sanctuary
    }

    /// `None` for regular users, whatever the sanctuary columns hold.
    pub fn sanctuary(&self) -> Option<Sanctuary<'_>> {
        self.is_sanctuary().then(|| Sanctuary {
            name: self.sanctuary_name.as_deref(),
            description: self.sanctuary_description.as_deref(),
            verification_documents: self.verification_documents.as_deref().unwrap_or_default(),
        })
    }

    pub fn display_name(&self) -> &str {
        self.sanctuary()
            .and_then(|s| s.name)
            .filter(|name| !name.is_empty())
            .unwrap_or(self.username.as_str())
    }
}

/// Attributes collected by the sign-up form.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NewProfile {
    pub username: Option<String>,
    pub account_type: AccountKind,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub sanctuary_name: Option<String>,
    pub sanctuary_description: Option<String>,
}

impl NewProfile {
    pub fn user(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            ..Self::default()
        }
    }

    pub fn sanctuary(username: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            account_type: AccountKind::Sanctuary,
            sanctuary_name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// Partial profile edit. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sanctuary_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sanctuary_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_documents: Option<Vec<String>>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_to(&self, profile: &mut Profile) {
        if let Some(username) = &self.username {
            profile.username = username.clone();
        }
        if let Some(bio) = &self.bio {
            profile.bio = Some(bio.clone());
        }
        if let Some(avatar_url) = &self.avatar_url {
            profile.avatar_url = Some(avatar_url.clone());
        }
        if let Some(location) = &self.location {
            profile.location = Some(location.clone());
        }
        if let Some(name) = &self.sanctuary_name {
            profile.sanctuary_name = Some(name.clone());
        }
        if let Some(description) = &self.sanctuary_description {
            profile.sanctuary_description = Some(description.clone());
        }
        if let Some(documents) = &self.verification_documents {
            profile.verification_documents = Some(documents.clone());
        }
    }
}
