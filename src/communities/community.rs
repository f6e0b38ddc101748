use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

const MAX_NAME_LEN: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Community {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    /// Kept up to date by the backend.
    #[serde(default)]
    pub member_count: i64,
    #[serde(default)]
    pub created_by: Option<Uuid>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NewCommunity {
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub topics: Vec<String>,
}

impl NewCommunity {
    pub fn validate(&self) -> ApiResult<()> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ApiError::Invalid("Community name is required".to_owned()));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(ApiError::Invalid(format!("Community name must be at most {MAX_NAME_LEN} characters")));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityMember {
    pub community_id: Uuid,
    pub user_id: Uuid,
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<OffsetDateTime>,
}
