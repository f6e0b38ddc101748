use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::{
    client::SupabaseClient,
    error::{ApiError, ApiResult},
    Markdown,
};

const TABLE: &str = "comments";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    /// Set on replies.
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    pub content: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

impl Comment {
    pub fn body_html(&self) -> String {
        Markdown(self.content.as_str()).to_html()
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewComment {
    pub post_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub content: String,
}

#[derive(Serialize)]
struct CommentRow<'a> {
    post_id: Uuid,
    user_id: Uuid,
    parent_id: Option<Uuid>,
    content: &'a str,
}

#[derive(Clone)]
pub struct Comments {
    client: SupabaseClient,
}

impl Comments {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    /// Oldest first, replies included; callers thread them by `parent_id`.
    pub async fn list(&self, post_id: Uuid) -> ApiResult<Vec<Comment>> {
        self.client
            .from(TABLE)
            .select("*")
            .eq("post_id", post_id)
            .order("created_at", true)
            .fetch_all()
            .await
    }

    pub async fn count(&self, post_id: Uuid) -> ApiResult<u64> {
        self.client.from(TABLE).eq("post_id", post_id).count().await
    }

    pub async fn create(&self, comment: &NewComment) -> ApiResult<Comment> {
        let user_id = self.client.require_user_id()?;
        let content = comment.content.trim();
        if content.is_empty() {
            return Err(ApiError::Invalid("Comment cannot be empty".to_owned()));
        }

        let row = CommentRow {
            post_id: comment.post_id,
            user_id,
            parent_id: comment.parent_id,
            content,
        };
        let rows: Vec<Comment> = self.client.from(TABLE).insert(&row).await?;
        let created = rows.into_iter().next().ok_or(ApiError::NotFound(TABLE.to_owned()))?;
        debug!(comment_id = %created.id, post_id = %created.post_id, "comment created");
        Ok(created)
    }

    pub async fn delete(&self, id: Uuid) -> ApiResult<bool> {
        let user_id = self.client.require_user_id()?;
        let removed = self.client
            .from(TABLE)
            .eq("id", id)
            .eq("user_id", user_id)
            .delete()
            .await?;
        Ok(removed > 0)
    }
}
