use std::sync::{Arc, PoisonError, RwLock};

use reqwest::{Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::{
    auth::AuthSession,
    config::Config,
    db::Query,
    error::{ApiError, ApiResult},
    storage::Storage,
    GetField,
};

/// HTTP access to the hosted backend.
///
/// Cloning is cheap; clones share the bound auth session, so a sign-in
/// through one handle authorizes requests made through every other.
#[derive(Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: Arc<str>,
    api_key: Arc<str>,
    session: Arc<RwLock<Option<AuthSession>>>,
}

impl SupabaseClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').into(),
            api_key: config.supabase_anon_key.as_str().into(),
            session: Arc::default(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base}/{service}/v1/{path}`
    pub(crate) fn endpoint(&self, service: &str, path: &str) -> String {
        format!("{}/{service}/v1/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Request carrying the API key and the bound user's token, or the API
    /// key again when signed out.
    pub(crate) fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let bearer = self.access_token().unwrap_or_else(|| self.api_key.to_string());
        self.http
            .request(method, url)
            .header("apikey", &*self.api_key)
            .bearer_auth(bearer)
    }

    pub fn session(&self) -> Option<AuthSession> {
        self.session.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    pub(crate) fn bind_session(&self, session: Option<AuthSession>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    pub fn current_user_id(&self) -> Option<Uuid> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.user.id)
    }

    /// Id of the signed-in user, for operations that cannot run without one.
    pub fn require_user_id(&self) -> ApiResult<Uuid> {
        self.current_user_id().ok_or_else(|| {
            error!("operation requires an authenticated user but none is bound");
            ApiError::NotAuthenticated
        })
    }

    pub fn from(&self, table: &str) -> Query {
        Query::new(self.clone(), table)
    }

    /// Calls a stored procedure.
    pub async fn rpc<A, T>(&self, function: &str, args: &A) -> ApiResult<T>
    where
        A: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint("rest", &format!("rpc/{function}"));
        let response = self.request(Method::POST, &url).json(args).send().await?;
        Self::json_or_error(response).await
    }

    pub fn storage(&self) -> Storage {
        Storage::new(self.clone())
    }

    pub(crate) async fn json_or_error<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(Self::error_from_response(response).await)
        }
    }

    /// Both the REST and auth services answer with a JSON error body, with
    /// field names that differ between services and versions.
    pub(crate) async fn error_from_response(response: Response) -> ApiError {
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        let Ok(body) = serde_json::from_str::<serde_json::Value>(&text) else {
            return ApiError::Remote { status, code: None, message: text };
        };
        let code = body.find_str_field(&["error_code", "code", "error"]);
        let message = body
            .find_str_field(&["msg", "message", "error_description", "error"])
            .unwrap_or(text);

        ApiError::Remote { status, code, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_join_cleanly() {
        let client = SupabaseClient::new(&Config::new("https://zoomies.supabase.co/", "anon"));
        assert_eq!(client.endpoint("rest", "users"), "https://zoomies.supabase.co/rest/v1/users");
        assert_eq!(client.endpoint("auth", "/token"), "https://zoomies.supabase.co/auth/v1/token");
    }

    #[test]
    fn signed_out_client_requires_user() {
        let client = SupabaseClient::new(&Config::new("https://zoomies.supabase.co", "anon"));
        assert!(client.current_user_id().is_none());
        assert!(matches!(client.require_user_id(), Err(ApiError::NotAuthenticated)));
    }
}
