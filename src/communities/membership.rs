//! The signed-in user's join state per community.
//!
//! Joins and leaves show up in the cache before the backend confirms them.
//! Each one then schedules an authoritative re-read after a short delay that
//! overwrites whatever the cache holds, so the cache converges on the
//! backend even when the write failed or raced.

use std::{
    collections::HashMap,
    mem,
    sync::{Arc, Mutex, PoisonError, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ApiResult;

/// Where membership facts come from.
#[async_trait]
pub trait MembershipSource: Send + Sync + 'static {
    async fn is_member(&self, community_id: Uuid) -> ApiResult<bool>;
    async fn join(&self, community_id: Uuid) -> ApiResult<()>;
    async fn leave(&self, community_id: Uuid) -> ApiResult<()>;
}

type Entries = Arc<RwLock<HashMap<Uuid, bool>>>;

pub struct MembershipCache<S> {
    source: Arc<S>,
    entries: Entries,
    delay: Duration,
    pending: Mutex<JoinSet<()>>,
}

impl<S: MembershipSource> MembershipCache<S> {
    pub fn new(source: Arc<S>, delay: Duration) -> Self {
        Self {
            source,
            entries: Arc::default(),
            delay,
            pending: Mutex::new(JoinSet::new()),
        }
    }

    /// Checks every community at once; a failed check counts as not joined.
    pub async fn populate(&self, community_ids: impl IntoIterator<Item = Uuid>) {
        let checks = community_ids.into_iter().map(|id| {
            let source = self.source.clone();
            async move { (id, source.is_member(id).await) }
        });
        let results = join_all(checks).await;

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for (id, result) in results {
            let member = result.unwrap_or_else(|e| {
                warn!(community_id = %id, error = %e, "membership check failed");
                false
            });
            entries.insert(id, member);
        }
        debug!(count = entries.len(), "membership cache populated");
    }

    pub fn is_member(&self, community_id: Uuid) -> bool {
        self.get(community_id).unwrap_or(false)
    }

    /// `None` when the community was never checked.
    pub fn get(&self, community_id: Uuid) -> Option<bool> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&community_id)
            .copied()
    }

    pub fn snapshot(&self) -> HashMap<Uuid, bool> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Joining twice is not an error.
    pub async fn join(&self, community_id: Uuid) -> ApiResult<()> {
        self.set(community_id, true);
        let result = match self.source.join(community_id).await {
            Err(e) if e.is_conflict() => {
                debug!(%community_id, "already a member");
                Ok(())
            }
            other => other,
        };
        self.finish(community_id, result)
    }

    /// Leaving a community that was never joined is not an error.
    pub async fn leave(&self, community_id: Uuid) -> ApiResult<()> {
        self.set(community_id, false);
        let result = self.source.leave(community_id).await;
        self.finish(community_id, result)
    }

    /// Waits for every scheduled re-read to land.
    pub async fn settle(&self) {
        let mut pending = mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner));
        while let Some(joined) = pending.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "membership reconciliation task failed");
            }
        }
    }

    /// Forgets all state, e.g. on sign-out. Scheduled re-reads are dropped.
    pub fn clear(&self) {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).abort_all();
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn set(&self, community_id: Uuid, member: bool) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(community_id, member);
    }

    fn finish(&self, community_id: Uuid, result: ApiResult<()>) -> ApiResult<()> {
        if let Err(e) = &result {
            warn!(%community_id, error = %e, "membership change failed remotely");
        }
        self.schedule_reconcile(community_id);
        result
    }

    fn schedule_reconcile(&self, community_id: Uuid) {
        let source = self.source.clone();
        let entries = self.entries.clone();
        let delay = self.delay;

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        while pending.try_join_next().is_some() {}
        pending.spawn(async move {
            tokio::time::sleep(delay).await;
            match source.is_member(community_id).await {
                Ok(member) => {
                    entries
                        .write()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(community_id, member);
                    debug!(%community_id, member, "membership reconciled");
                }
                Err(e) => warn!(%community_id, error = %e, "membership re-check failed, keeping cached value"),
            }
        });
    }
}
