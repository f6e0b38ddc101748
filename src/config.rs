//! Client configuration.

use std::time::Duration;

use crate::error::ConfigError;

/// Delay before an optimistic membership change is re-read from the backend.
pub const DEFAULT_RECONCILE_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_POSTS_BUCKET: &str = "community-posts";
pub const DEFAULT_AVATARS_BUCKET: &str = "avatars";

#[derive(Debug, Clone)]
pub struct Config {
    /// Project URL, e.g. `https://abc.supabase.co`.
    pub supabase_url: String,

    /// Public (anon) API key sent with every request.
    pub supabase_anon_key: String,

    pub reconcile_delay: Duration,

    /// Where OAuth and password-reset links send the user back to.
    pub redirect_url: Option<String>,

    pub posts_bucket: String,
    pub avatars_bucket: String,

    /// SQLite URL for persisting the auth token between runs.
    pub session_db: Option<String>,
}

impl Config {
    pub fn new(supabase_url: impl Into<String>, supabase_anon_key: impl Into<String>) -> Self {
        Self {
            supabase_url: supabase_url.into().trim_end_matches('/').to_owned(),
            supabase_anon_key: supabase_anon_key.into(),
            reconcile_delay: DEFAULT_RECONCILE_DELAY,
            redirect_url: None,
            posts_bucket: DEFAULT_POSTS_BUCKET.to_owned(),
            avatars_bucket: DEFAULT_AVATARS_BUCKET.to_owned(),
            session_db: None,
        }
    }

    /// Load configuration from the environment (a `.env` file is honoured).
    ///
    /// Required:
    /// - `SUPABASE_URL`
    /// - `SUPABASE_ANON_KEY`
    ///
    /// Optional:
    /// - `ZOOMIES_RECONCILE_DELAY_MS` (default: 100)
    /// - `ZOOMIES_REDIRECT_URL`
    /// - `ZOOMIES_POSTS_BUCKET` (default: community-posts)
    /// - `ZOOMIES_AVATARS_BUCKET` (default: avatars)
    /// - `ZOOMIES_SESSION_DB`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let url = lookup("SUPABASE_URL")
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingEnv("SUPABASE_URL"))?;
        let key = lookup("SUPABASE_ANON_KEY")
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingEnv("SUPABASE_ANON_KEY"))?;

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Invalid { key: "SUPABASE_URL", value: url });
        }

        let mut config = Self::new(url, key);

        if let Some(delay) = lookup("ZOOMIES_RECONCILE_DELAY_MS") {
            let millis = delay
                .parse()
                .map_err(|_| ConfigError::Invalid { key: "ZOOMIES_RECONCILE_DELAY_MS", value: delay })?;
            config.reconcile_delay = Duration::from_millis(millis);
        }
        config.redirect_url = lookup("ZOOMIES_REDIRECT_URL");
        if let Some(bucket) = lookup("ZOOMIES_POSTS_BUCKET") {
            config.posts_bucket = bucket;
        }
        if let Some(bucket) = lookup("ZOOMIES_AVATARS_BUCKET") {
            config.avatars_bucket = bucket;
        }
        config.session_db = lookup("ZOOMIES_SESSION_DB");

        Ok(config)
    }

    pub fn with_reconcile_delay(mut self, delay: Duration) -> Self {
        self.reconcile_delay = delay;
        self
    }

    pub fn with_redirect_url(mut self, url: impl Into<String>) -> Self {
        self.redirect_url = Some(url.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(&[
            ("SUPABASE_URL", "https://zoomies.supabase.co/"),
            ("SUPABASE_ANON_KEY", "anon"),
        ]))
        .unwrap();

        assert_eq!(config.supabase_url, "https://zoomies.supabase.co");
        assert_eq!(config.reconcile_delay, DEFAULT_RECONCILE_DELAY);
        assert_eq!(config.posts_bucket, "community-posts");
        assert!(config.session_db.is_none());
    }

    #[test]
    fn missing_key_is_fatal() {
        let err = Config::from_lookup(lookup(&[("SUPABASE_URL", "https://zoomies.supabase.co")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv("SUPABASE_ANON_KEY")));

        let err = Config::from_lookup(lookup(&[("SUPABASE_ANON_KEY", "anon")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv("SUPABASE_URL")));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("SUPABASE_URL", "http://localhost:54321"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("ZOOMIES_RECONCILE_DELAY_MS", "250"),
            ("ZOOMIES_POSTS_BUCKET", "posts"),
        ]))
        .unwrap();
        assert_eq!(config.reconcile_delay, Duration::from_millis(250));
        assert_eq!(config.posts_bucket, "posts");

        let err = Config::from_lookup(lookup(&[
            ("SUPABASE_URL", "http://localhost:54321"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("ZOOMIES_RECONCILE_DELAY_MS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "ZOOMIES_RECONCILE_DELAY_MS", .. }));
    }

    #[test]
    fn url_needs_scheme() {
        let err = Config::from_lookup(lookup(&[
            ("SUPABASE_URL", "zoomies.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "SUPABASE_URL", .. }));
    }
}
