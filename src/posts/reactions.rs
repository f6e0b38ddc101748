//! Up/down votes on posts and comments.
//!
//! A user holds at most one reaction per target. Toggling works from the
//! state the caller last saw: asking for the kind already shown removes it,
//! asking for the other kind replaces it.

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{
    client::SupabaseClient,
    db::Query,
    error::ApiResult,
};

const TABLE: &str = "reactions";
const ON_CONFLICT: &str = "user_id,post_id,comment_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Upvote,
    Downvote,
}

impl ReactionKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Upvote => "upvote",
            Self::Downvote => "downvote",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReactionState {
    #[default]
    None,
    Upvoted,
    Downvoted,
}

impl ReactionState {
    /// The state after the user asks for `kind`.
    pub fn after(self, kind: ReactionKind) -> Self {
        match (self, kind) {
            (Self::Upvoted, ReactionKind::Upvote) | (Self::Downvoted, ReactionKind::Downvote) => Self::None,
            (_, ReactionKind::Upvote) => Self::Upvoted,
            (_, ReactionKind::Downvote) => Self::Downvoted,
        }
    }

    pub fn kind(self) -> Option<ReactionKind> {
        match self {
            Self::None => None,
            Self::Upvoted => Some(ReactionKind::Upvote),
            Self::Downvoted => Some(ReactionKind::Downvote),
        }
    }
}

impl From<Option<ReactionKind>> for ReactionState {
    fn from(kind: Option<ReactionKind>) -> Self {
        match kind {
            None => Self::None,
            Some(ReactionKind::Upvote) => Self::Upvoted,
            Some(ReactionKind::Downvote) => Self::Downvoted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionTarget {
    Post(Uuid),
    Comment(Uuid),
}

impl ReactionTarget {
    fn filter(self, query: Query) -> Query {
        match self {
            Self::Post(id) => query.eq("post_id", id).is_null("comment_id"),
            Self::Comment(id) => query.eq("comment_id", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReactionCounts {
    pub upvotes: u64,
    pub downvotes: u64,
}

impl ReactionCounts {
    pub fn score(&self) -> i64 {
        self.upvotes as i64 - self.downvotes as i64
    }
}

#[derive(Serialize)]
struct ReactionRow {
    user_id: Uuid,
    post_id: Option<Uuid>,
    comment_id: Option<Uuid>,
    reaction_type: ReactionKind,
}

#[derive(Deserialize)]
struct StoredReaction {
    reaction_type: ReactionKind,
}

#[derive(Clone)]
pub struct Reactions {
    client: SupabaseClient,
}

impl Reactions {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    /// The signed-in user's reaction as stored; none when signed out.
    pub async fn current(&self, target: ReactionTarget) -> ApiResult<ReactionState> {
        let Some(user_id) = self.client.current_user_id() else {
            return Ok(ReactionState::None);
        };
        let query = self.client
            .from(TABLE)
            .select("reaction_type")
            .eq("user_id", user_id);
        let stored: Option<StoredReaction> = target.filter(query).fetch_optional().await?;
        Ok(stored.map(|r| r.reaction_type).into())
    }

    /// Applies `kind` on top of `observed` and returns the new state.
    ///
    /// Sending the same request twice from the same observed state leaves
    /// the backend where the first one put it.
    pub async fn toggle(
        &self,
        target: ReactionTarget,
        kind: ReactionKind,
        observed: ReactionState,
    ) -> ApiResult<ReactionState> {
        let user_id = self.client.require_user_id()?;
        let next = observed.after(kind);

        match next.kind() {
            None => {
                let query = self.client.from(TABLE).eq("user_id", user_id);
                let removed = target.filter(query).delete().await?;
                debug!(?target, removed, "reaction removed");
            }
            Some(kind) => {
                let (post_id, comment_id) = match target {
                    ReactionTarget::Post(id) => (Some(id), None),
                    ReactionTarget::Comment(id) => (None, Some(id)),
                };
                let row = ReactionRow { user_id, post_id, comment_id, reaction_type: kind };
                let _: Vec<serde_json::Value> = self.client.from(TABLE).upsert(&row, ON_CONFLICT).await?;
                debug!(?target, kind = kind.as_str(), "reaction set");
            }
        }
        Ok(next)
    }

    pub async fn counts(&self, target: ReactionTarget) -> ApiResult<ReactionCounts> {
        let count = |kind: ReactionKind| {
            let query = self.client.from(TABLE).eq("reaction_type", kind.as_str());
            target.filter(query).count()
        };
        let (upvotes, downvotes) = tokio::try_join!(count(ReactionKind::Upvote), count(ReactionKind::Downvote))?;
        Ok(ReactionCounts { upvotes, downvotes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ReactionKind::{Downvote, Upvote};

    #[test]
    fn toggling_the_active_kind_clears_it() {
        assert_eq!(ReactionState::Upvoted.after(Upvote), ReactionState::None);
        assert_eq!(ReactionState::Downvoted.after(Downvote), ReactionState::None);
    }

    #[test]
    fn the_other_kind_replaces() {
        assert_eq!(ReactionState::Upvoted.after(Downvote), ReactionState::Downvoted);
        assert_eq!(ReactionState::Downvoted.after(Upvote), ReactionState::Upvoted);
        assert_eq!(ReactionState::None.after(Upvote), ReactionState::Upvoted);
        assert_eq!(ReactionState::None.after(Downvote), ReactionState::Downvoted);
    }

    #[test]
    fn same_request_from_same_observation_is_stable() {
        let observed = ReactionState::None;
        assert_eq!(observed.after(Upvote), observed.after(Upvote));
    }

    #[test]
    fn kinds_use_backend_names() {
        assert_eq!(serde_json::to_value(Upvote).unwrap(), "upvote");
        let parsed: ReactionKind = serde_json::from_str("\"downvote\"").unwrap();
        assert_eq!(parsed, Downvote);
        assert_eq!(ReactionState::from(Some(Downvote)), ReactionState::Downvoted);
    }

    #[test]
    fn score_can_go_negative() {
        let counts = ReactionCounts { upvotes: 2, downvotes: 5 };
        assert_eq!(counts.score(), -3);
    }
}
