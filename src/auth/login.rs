use reqwest::Method;
use serde_json::{json, Value};
use tracing::info;

use crate::{client::SupabaseClient, error::ApiResult};

use super::{AuthClient, AuthEvent, AuthSession, SignUpResponse};

impl AuthClient {
    /// Creates the auth record. `data` lands in the user's metadata.
    ///
    /// With email confirmation on, no session comes back until the user
    /// follows the link in their inbox.
    pub async fn sign_up(&self, email: &str, password: &str, data: &Value) -> ApiResult<SignUpResponse> {
        let url = self.client.endpoint("auth", "signup");
        let mut request = self
            .client
            .request(Method::POST, &url)
            .json(&json!({ "email": email, "password": password, "data": data }));
        if let Some(redirect) = &self.redirect_url {
            request = request.query(&[("redirect_to", redirect)]);
        }

        let response: SignUpResponse = SupabaseClient::json_or_error(request.send().await?).await?;

        match &response {
            SignUpResponse::Session(session) => {
                let session = self.establish(session.clone()).await;
                info!(user_id = %session.user.id, "signed up and signed in");
                self.emit(AuthEvent::SignedIn(session.user));
            }
            SignUpResponse::User(identity) => {
                info!(user_id = %identity.id, "signed up, awaiting confirmation");
            }
        }

        Ok(response)
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> ApiResult<AuthSession> {
        let body = json!({ "email": email, "password": password });
        let session = self.post_token("password", &body).await?;
        let session = self.establish(session).await;

        info!(user_id = %session.user.id, "signed in");
        self.emit(AuthEvent::SignedIn(session.user.clone()));
        Ok(session)
    }
}
