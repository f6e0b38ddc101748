use reqwest::Method;
use tracing::{debug, info};

use crate::{client::SupabaseClient, error::ApiResult};

use super::{AuthClient, AuthEvent};

impl AuthClient {
    /// Revokes the session remotely and forgets it locally. The local side
    /// is cleared before the request goes out, so it is gone even when the
    /// server cannot be reached.
    pub async fn sign_out(&self) -> ApiResult<()> {
        let Some(session) = self.client.session() else {
            debug!("sign out without a session");
            return Ok(());
        };

        // Built while the token is still bound.
        let url = self.client.endpoint("auth", "logout");
        let request = self.client.request(Method::POST, &url);

        self.forget().await;
        info!(user_id = %session.user.id, "signed out");
        self.emit(AuthEvent::SignedOut);

        let response = request.send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(SupabaseClient::error_from_response(response).await)
        }
    }
}
