//! Community posts, their comment threads and up/down reactions.

mod comments;
mod reactions;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    client::SupabaseClient,
    db::Page,
    error::{ApiError, ApiResult},
    storage::{object_path, Upload},
    Markdown,
};

pub use comments::{Comment, Comments, NewComment};
pub use reactions::{ReactionCounts, ReactionKind, ReactionState, ReactionTarget, Reactions};

const TABLE: &str = "community_posts";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub community_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    /// Markdown.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

impl Post {
    pub fn body_html(&self) -> String {
        Markdown(self.content.as_str()).to_html()
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub community_id: Uuid,
    pub title: String,
    pub content: String,
    pub image: Option<Upload>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PostPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedScope {
    #[default]
    All,
    /// Only communities the signed-in user has joined.
    Joined,
}

#[derive(Serialize)]
struct PostRow<'a> {
    community_id: Uuid,
    user_id: Uuid,
    title: &'a str,
    content: &'a str,
    image_url: Option<&'a str>,
}

#[derive(Deserialize)]
struct MembershipRow {
    community_id: Uuid,
}

#[derive(Clone)]
pub struct Posts {
    client: SupabaseClient,
    bucket: String,
}

impl Posts {
    pub fn new(client: SupabaseClient, bucket: String) -> Self {
        Self { client, bucket }
    }

    /// A community's posts, newest first.
    pub async fn list(&self, community_id: Uuid, page: Page) -> ApiResult<Vec<Post>> {
        self.client
            .from(TABLE)
            .select("*")
            .eq("community_id", community_id)
            .order("created_at", false)
            .page(page)
            .fetch_all()
            .await
    }

    pub async fn feed(&self, scope: FeedScope, page: Page) -> ApiResult<Vec<Post>> {
        let query = self.client.from(TABLE).select("*");
        let query = match scope {
            FeedScope::All => query,
            FeedScope::Joined => {
                let user_id = self.client.require_user_id()?;
                let joined: Vec<MembershipRow> = self.client
                    .from("community_members")
                    .select("community_id")
                    .eq("user_id", user_id)
                    .fetch_all()
                    .await?;
                if joined.is_empty() {
                    return Ok(Vec::new());
                }
                query.in_list("community_id", joined.iter().map(|m| m.community_id))
            }
        };

        query
            .order("created_at", false)
            .page(page)
            .fetch_all()
            .await
    }

    pub async fn get(&self, id: Uuid) -> ApiResult<Post> {
        self.client
            .from(TABLE)
            .select("*")
            .eq("id", id)
            .fetch_one()
            .await
    }

    pub async fn by_user(&self, user_id: Uuid, page: Page) -> ApiResult<Vec<Post>> {
        self.client
            .from(TABLE)
            .select("*")
            .eq("user_id", user_id)
            .order("created_at", false)
            .page(page)
            .fetch_all()
            .await
    }

    /// Uploads the attached image first, if any, then inserts the post.
    pub async fn create(&self, post: NewPost) -> ApiResult<Post> {
        let user_id = self.client.require_user_id()?;
        let title = post.title.trim();
        if title.is_empty() {
            return Err(ApiError::Invalid("Post title is required".to_owned()));
        }

        let image_url = match post.image {
            Some(image) => {
                let path = object_path(user_id, &image.file_name);
                Some(self.client.storage().upload(&self.bucket, &path, image).await?)
            }
            None => None,
        };

        let row = PostRow {
            community_id: post.community_id,
            user_id,
            title,
            content: &post.content,
            image_url: image_url.as_deref(),
        };
        let created: Vec<Post> = self.client.from(TABLE).insert(&row).await?;
        let created = created
            .into_iter()
            .next()
            .ok_or(ApiError::NotFound(TABLE.to_owned()))?;
        info!(post_id = %created.id, community_id = %created.community_id, "post created");
        Ok(created)
    }

    pub async fn update(&self, id: Uuid, patch: &PostPatch) -> ApiResult<Post> {
        let user_id = self.client.require_user_id()?;
        let rows: Vec<Post> = self.client
            .from(TABLE)
            .eq("id", id)
            .eq("user_id", user_id)
            .update(patch)
            .await?;
        rows.into_iter().next().ok_or(ApiError::NotFound(TABLE.to_owned()))
    }

    /// Returns false when nothing the user owns matched.
    pub async fn delete(&self, id: Uuid) -> ApiResult<bool> {
        let user_id = self.client.require_user_id()?;
        let removed = self.client
            .from(TABLE)
            .eq("id", id)
            .eq("user_id", user_id)
            .delete()
            .await?;
        if removed == 0 {
            warn!(post_id = %id, "delete matched no post");
        }
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_renders_markdown() {
        let post: Post = serde_json::from_value(serde_json::json!({
            "id": Uuid::now_v7(),
            "community_id": Uuid::now_v7(),
            "user_id": Uuid::now_v7(),
            "title": "Adoption day",
            "content": "Hazel went home with *two* kids.",
            "created_at": "2024-06-01T10:00:00Z",
        }))
        .unwrap();

        assert_eq!(post.body_html(), "<p>Hazel went home with <em>two</em> kids.</p>\n");
        assert!(post.image_url.is_none());
    }

    #[test]
    fn empty_patch_serializes_to_nothing() {
        let patch = PostPatch::default();
        assert_eq!(serde_json::to_value(&patch).unwrap(), serde_json::json!({}));
    }
}
