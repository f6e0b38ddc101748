mod community;
mod membership;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    client::SupabaseClient,
    error::{ApiError, ApiResult},
    profiles::Profile,
};

pub use community::{Community, CommunityMember, NewCommunity};
pub use membership::{MembershipCache, MembershipSource};

const TABLE: &str = "communities";
const MEMBERS: &str = "community_members";

#[derive(Clone)]
pub struct Communities {
    client: SupabaseClient,
}

impl Communities {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    /// Newest first.
    pub async fn list(&self) -> ApiResult<Vec<Community>> {
        self.client
            .from(TABLE)
            .select("*")
            .order("created_at", false)
            .fetch_all()
            .await
    }

    pub async fn get(&self, id: Uuid) -> ApiResult<Community> {
        self.client
            .from(TABLE)
            .select("*")
            .eq("id", id)
            .fetch_one()
            .await
    }

    pub async fn search(&self, name: &str) -> ApiResult<Vec<Community>> {
        let pattern = format!("*{}*", name.trim().replace(['*', ',', '(', ')'], ""));
        self.client
            .from(TABLE)
            .select("*")
            .ilike("name", &pattern)
            .order("member_count", false)
            .fetch_all()
            .await
    }

    pub async fn by_topic(&self, topic: &str) -> ApiResult<Vec<Community>> {
        self.client
            .from(TABLE)
            .select("*")
            .contains("topics", &[topic])
            .order("created_at", false)
            .fetch_all()
            .await
    }

    /// Creates a community owned by the signed-in user, who joins it.
    pub async fn create(&self, community: &NewCommunity) -> ApiResult<Community> {
        let user_id = self.client.require_user_id()?;
        community.validate()?;

        let row = json!({
            "name": community.name.trim(),
            "description": community.description,
            "icon": community.icon,
            "color": community.color,
            "topics": community.topics,
            "created_by": user_id,
        });
        let created: Vec<Community> = self.client.from(TABLE).insert(&row).await?;
        let created = created
            .into_iter()
            .next()
            .ok_or(ApiError::NotFound(TABLE.to_owned()))?;
        info!(community_id = %created.id, name = %created.name, "community created");

        if let Err(e) = self.join(created.id).await {
            warn!(community_id = %created.id, error = %e, "creator could not join own community");
        }
        Ok(created)
    }

    /// Signed out means not a member.
    pub async fn is_member(&self, community_id: Uuid) -> ApiResult<bool> {
        let Some(user_id) = self.client.current_user_id() else {
            return Ok(false);
        };
        let rows: Option<CommunityMember> = self.client
            .from(MEMBERS)
            .select("community_id,user_id")
            .eq("community_id", community_id)
            .eq("user_id", user_id)
            .fetch_optional()
            .await?;
        Ok(rows.is_some())
    }

    /// Joining a community twice is not an error.
    pub async fn join(&self, community_id: Uuid) -> ApiResult<()> {
        let user_id = self.client.require_user_id()?;
        if self.is_member(community_id).await? {
            debug!(%community_id, "already a member");
            return Ok(());
        }

        let row = CommunityMember { community_id, user_id, joined_at: None };
        match self.client.from(MEMBERS).insert::<_, CommunityMember>(&row).await {
            Ok(_) => {
                info!(%community_id, %user_id, "joined community");
                Ok(())
            }
            Err(e) if e.is_conflict() => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn leave(&self, community_id: Uuid) -> ApiResult<()> {
        let user_id = self.client.require_user_id()?;
        let removed = self.client
            .from(MEMBERS)
            .eq("community_id", community_id)
            .eq("user_id", user_id)
            .delete()
            .await?;
        if removed == 0 {
            debug!(%community_id, "left a community that was not joined");
        } else {
            info!(%community_id, %user_id, "left community");
        }
        Ok(())
    }

    /// Profiles of everyone in a community.
    pub async fn members(&self, community_id: Uuid) -> ApiResult<Vec<Profile>> {
        let rows: Vec<CommunityMember> = self.client
            .from(MEMBERS)
            .select("community_id,user_id,joined_at")
            .eq("community_id", community_id)
            .order("joined_at", true)
            .fetch_all()
            .await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        self.client
            .from("users")
            .select("*")
            .in_list("auth_id", rows.iter().map(|r| r.user_id))
            .fetch_all()
            .await
    }

    /// Ids of the communities the signed-in user belongs to.
    pub async fn joined(&self) -> ApiResult<Vec<Uuid>> {
        let user_id = self.client.require_user_id()?;
        let rows: Vec<CommunityMember> = self.client
            .from(MEMBERS)
            .select("community_id,user_id")
            .eq("user_id", user_id)
            .fetch_all()
            .await?;
        Ok(rows.into_iter().map(|r| r.community_id).collect())
    }
}

#[async_trait]
impl MembershipSource for Communities {
    async fn is_member(&self, community_id: Uuid) -> ApiResult<bool> {
        Communities::is_member(self, community_id).await
    }

    async fn join(&self, community_id: Uuid) -> ApiResult<()> {
        Communities::join(self, community_id).await
    }

    async fn leave(&self, community_id: Uuid) -> ApiResult<()> {
        Communities::leave(self, community_id).await
    }
}
