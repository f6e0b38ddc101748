//! Client library for Zoomies, the sanctuary and donor community platform.
//!
//! Everything the front end needs hangs off an [`AppContext`]: the auth
//! session, the signed-in user's merged profile, community membership state,
//! and thin wrappers over the hosted backend's tables and storage buckets.

pub mod auth;
pub mod client;
pub mod communities;
pub mod config;
pub mod db;
pub mod error;
pub mod posts;
pub mod profiles;
pub mod session;
pub mod storage;
pub mod theme;
pub mod topics;

use std::{fmt, ops::Deref, sync::Arc};

use serde_json::Value;
use tracing::info;

pub use auth::{AuthClient, AuthEvent, Identity};
pub use client::SupabaseClient;
pub use communities::{Communities, Community, MembershipCache};
pub use config::Config;
pub use error::{ApiError, ApiResult, AuthFailure, ConfigError};
pub use posts::{Comments, Posts, Reactions};
pub use profiles::{Profile, Users};
pub use session::{SessionProvider, SessionUser};
pub use theme::{Theme, ThemeState};
pub use topics::Topics;

/// Application-wide services, built once at start and torn down at exit.
pub struct AppContext {
    pub config: Config,
    pub client: SupabaseClient,
    pub auth: AuthClient,
    pub session: SessionProvider,
    pub users: Users,
    pub communities: Communities,
    pub membership: MembershipCache<Communities>,
    pub posts: Posts,
    pub comments: Comments,
    pub reactions: Reactions,
    pub topics: Topics,
    pub theme: ThemeState,
}

impl AppContext {
    pub fn new(config: Config) -> Self {
        Self::with_storage(config, Arc::new(auth::MemoryStorage::default()))
    }

    pub fn with_storage(config: Config, storage: Arc<dyn auth::SessionStorage>) -> Self {
        let client = SupabaseClient::new(&config);
        let auth = AuthClient::new(client.clone(), storage, config.redirect_url.clone());
        let users = Users::new(client.clone(), config.avatars_bucket.clone());
        let communities = Communities::new(client.clone());
        let membership = MembershipCache::new(Arc::new(communities.clone()), config.reconcile_delay);

        Self {
            session: SessionProvider::new(auth.clone(), users.clone()),
            posts: Posts::new(client.clone(), config.posts_bucket.clone()),
            comments: Comments::new(client.clone()),
            reactions: Reactions::new(client.clone()),
            topics: Topics::new(client.clone()),
            theme: ThemeState::default(),
            config,
            client,
            auth,
            users,
            communities,
            membership,
        }
    }

    /// Reads configuration from the environment and picks the session
    /// storage: SQLite when `ZOOMIES_SESSION_DB` is set, memory otherwise.
    pub async fn from_env() -> AppResult<Self> {
        let config = Config::from_env()?;
        let storage: Arc<dyn auth::SessionStorage> = match &config.session_db {
            Some(url) => Arc::new(auth::SqliteStorage::connect(url).await?),
            None => Arc::new(auth::MemoryStorage::default()),
        };
        Ok(Self::with_storage(config, storage))
    }

    /// Subscribes the session provider to auth events and restores any
    /// persisted session.
    pub async fn start(&self) -> Option<SessionUser> {
        self.session.mount();
        let user = self.session.restore().await;
        info!(signed_in = user.is_some(), "zoomies client started");
        user
    }

    /// Loads every community and, when signed in, warms the membership cache
    /// for all of them.
    pub async fn load_communities(&self) -> ApiResult<Vec<Community>> {
        let communities = self.communities.list().await?;
        if self.client.current_user_id().is_some() {
            self.membership.populate(communities.iter().map(|c| c.id)).await;
        }
        Ok(communities)
    }

    pub async fn sign_out(&self) {
        self.session.sign_out().await;
        self.membership.clear();
    }

    pub fn shutdown(self) {
        self.session.teardown();
        self.membership.clear();
        info!("zoomies client shut down");
    }
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> AppResult<String>;
    /// First of `fields` present as a string.
    fn find_str_field(&self, fields: &[&str]) -> Option<String>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(
            self.get(field)
            .ok_or(format!("expected {field} in {self}"))?
            .as_str()
            .ok_or(format!("expected {field} in {self} to be string"))?
            .to_owned()
        )
    }

    fn find_str_field(&self, fields: &[&str]) -> Option<String> {
        fields
            .iter()
            .find_map(|field| self.get(*field).and_then(Value::as_str))
            .map(str::to_owned)
    }
}


pub type AppResult<T> = Result<T, AppError>;
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        Self(anyhow::Error::msg(err))
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        Self(anyhow::Error::msg(err.to_owned()))
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(serde_json::Error);
apperr_impl!(sqlx::Error);
apperr_impl!(reqwest::Error);
apperr_impl!(ConfigError);
apperr_impl!(ApiError);

/// Markdown text from a post or comment body.
///
/// Raw HTML in the source is escaped rather than passed through.
pub struct Markdown<T>(pub T);

impl<T> Markdown<T>
where
    T: Deref<Target = str>
{
    pub fn to_html(&self) -> String {
        use pulldown_cmark::{Event, Parser, Options};

        let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
        let parser = Parser::new_ext(&*self.0, options)
            .map(|event| match event {
            Event::Html(html) | Event::InlineHtml(html) => Event::Text(html),
            _ => event,
        });

        let mut html_output = String::new();
        pulldown_cmark::html::push_html(&mut html_output, parser);
        html_output
    }
}

impl<T> fmt::Display for Markdown<T>
where
    T: Deref<Target = str>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_html())
    }
}
