use oauth2::{CsrfToken, PkceCodeChallenge};
use reqwest::Url;
use serde_json::json;
use tracing::info;

use crate::error::{ApiError, ApiResult};

use super::{clients::ClientProvider, AuthClient, AuthEvent, AuthSession};

/// A started OAuth sign-in. Keep it until the provider redirects back.
#[derive(Debug, Clone)]
pub struct OAuthStart {
    /// Where to send the user.
    pub url: String,
    pub provider: ClientProvider,
    csrf_state: String,
    pkce_verifier: String,
}

impl AuthClient {
    pub fn authorize_url(&self, provider: ClientProvider) -> ApiResult<OAuthStart> {
        let Some(redirect) = self.redirect_url.as_deref() else {
            return Err(ApiError::Invalid("no redirect URL configured for OAuth sign-in".to_owned()));
        };

        let (pkce_code_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let csrf_state = CsrfToken::new_random();

        let mut redirect_to = Url::parse(redirect).map_err(|e| ApiError::Invalid(e.to_string()))?;
        redirect_to.query_pairs_mut().append_pair("state", csrf_state.secret());

        let mut url = Url::parse(&self.client.endpoint("auth", "authorize"))
            .map_err(|e| ApiError::Invalid(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("provider", provider.id())
            .append_pair("redirect_to", redirect_to.as_str())
            .append_pair("code_challenge", pkce_code_challenge.as_str())
            .append_pair("code_challenge_method", "s256");

        Ok(OAuthStart {
            url: url.into(),
            provider,
            csrf_state: csrf_state.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
        })
    }

    /// Finishes the sign-in once the provider redirected back with `code`
    /// and `state`.
    pub async fn exchange_code(&self, start: OAuthStart, code: &str, state: &str) -> ApiResult<AuthSession> {
        if state != start.csrf_state {
            return Err(ApiError::Invalid("csrf tokens don't match".to_owned()));
        }

        let body = json!({ "auth_code": code, "code_verifier": start.pkce_verifier });
        let session = self.post_token("pkce", &body).await?;
        let session = self.establish(session).await;

        info!(user_id = %session.user.id, provider = %start.provider, "welcome");
        self.emit(AuthEvent::SignedIn(session.user.clone()));
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{auth::MemoryStorage, client::SupabaseClient, config::Config};

    fn auth(redirect: Option<&str>) -> AuthClient {
        let client = SupabaseClient::new(&Config::new("https://zoomies.supabase.co", "anon"));
        AuthClient::new(client, Arc::new(MemoryStorage::default()), redirect.map(str::to_owned))
    }

    #[test]
    fn authorize_url_carries_pkce_and_state() {
        let start = auth(Some("https://app.zoomies.org/callback"))
            .authorize_url(ClientProvider::Github)
            .unwrap();
        let url = Url::parse(&start.url).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert_eq!(url.path(), "/auth/v1/authorize");
        assert!(pairs.contains(&("provider".to_owned(), "github".to_owned())));
        assert!(pairs.contains(&("code_challenge_method".to_owned(), "s256".to_owned())));
        let redirect_to = &pairs.iter().find(|(k, _)| k == "redirect_to").unwrap().1;
        assert!(redirect_to.starts_with("https://app.zoomies.org/callback?state="));
        assert!(redirect_to.ends_with(&start.csrf_state));
    }

    #[test]
    fn oauth_needs_redirect() {
        assert!(matches!(auth(None).authorize_url(ClientProvider::Google), Err(ApiError::Invalid(_))));
    }

    #[tokio::test]
    async fn mismatched_state_is_rejected_before_exchange() {
        let auth = auth(Some("https://app.zoomies.org/callback"));
        let start = auth.authorize_url(ClientProvider::Google).unwrap();
        let err = auth.exchange_code(start, "code", "forged").await.unwrap_err();
        assert!(matches!(err, ApiError::Invalid(msg) if msg == "csrf tokens don't match"));
    }
}
