//! Who is using the client right now.
//!
//! [`SessionProvider`] wraps the auth client with the flows the sign-up,
//! sign-in and profile screens drive, and keeps the merged
//! [`SessionUser`] current. Screens read it through [`SessionProvider::current_user`]
//! or re-render from [`SessionProvider::watch`].

pub mod merge;

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, PoisonError,
};

use serde_json::json;
use tokio::{
    sync::{broadcast::error::RecvError, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    auth::{validate, AuthClient, ClientProvider, Identity, OAuthStart, SignUpResponse, UserAttributes},
    error::AuthFailure,
    profiles::{NewProfile, ProfilePatch, Users},
};

pub use merge::SessionUser;

#[derive(Debug, Clone, PartialEq)]
pub enum SignUpOutcome {
    /// The account exists but stays inactive until the emailed link is
    /// followed.
    PendingConfirmation { email: String },
    /// Confirmation is disabled on the backend; the user is signed in.
    SignedIn,
}

/// The published user plus a sign-out counter. Merges remember the count
/// they started under and are dropped if a sign-out happened since.
struct UserSlot {
    tx: watch::Sender<Option<SessionUser>>,
    epoch: AtomicU64,
}

impl UserSlot {
    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Empties the slot and invalidates merges still in flight.
    fn clear(&self) {
        self.tx.send_modify(|user| {
            self.epoch.fetch_add(1, Ordering::SeqCst);
            *user = None;
        });
    }

    /// Publishes a merge result unless a sign-out happened after `epoch`
    /// was read or the session it was computed for is no longer bound.
    /// The checks run under the channel's lock, so a concurrent
    /// [`Self::clear`] is never overwritten.
    fn publish(&self, auth: &AuthClient, epoch: u64, merged: Option<SessionUser>) -> Option<SessionUser> {
        let mut published = None;
        self.tx.send_if_modified(|user| {
            if self.epoch() != epoch {
                debug!("dropping merge started before a sign out");
                return false;
            }
            let bound = auth.session().map(|s| s.user.id);
            match merged {
                Some(merged) if bound == Some(merged.id()) => {
                    *user = Some(merged.clone());
                    published = Some(merged);
                    true
                }
                Some(merged) => {
                    debug!(user_id = %merged.id(), "dropping merge for a session that is no longer bound");
                    false
                }
                None => user.take().is_some(),
            }
        });
        published
    }
}

pub struct SessionProvider {
    auth: AuthClient,
    users: Users,
    user: Arc<UserSlot>,
    listener: Mutex<Option<JoinHandle<()>>>,
    pending_oauth: Mutex<Option<OAuthStart>>,
}

impl SessionProvider {
    pub fn new(auth: AuthClient, users: Users) -> Self {
        Self {
            auth,
            users,
            user: Arc::new(UserSlot {
                tx: watch::channel(None).0,
                epoch: AtomicU64::new(0),
            }),
            listener: Mutex::new(None),
            pending_oauth: Mutex::new(None),
        }
    }

    pub fn current_user(&self) -> Option<SessionUser> {
        self.user.tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Option<SessionUser>> {
        self.user.tx.subscribe()
    }

    /// Starts following auth events. Calling it twice keeps one listener.
    pub fn mount(&self) {
        let mut listener = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
        if listener.is_some() {
            return;
        }

        let mut rx = self.auth.subscribe();
        let auth = self.auth.clone();
        let users = self.users.clone();
        let user = self.user.clone();

        *listener = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        debug!(?event, "auth state changed");
                        match event.identity() {
                            Some(identity) => {
                                let epoch = user.epoch();
                                let merged = merge::load(&users, identity.clone()).await;
                                user.publish(&auth, epoch, merged);
                            }
                            None => user.clear(),
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "missed auth events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }

    pub fn teardown(&self) {
        if let Some(listener) = self.listener.lock().unwrap_or_else(PoisonError::into_inner).take() {
            listener.abort();
        }
    }

    /// Restores a stored session at start.
    pub async fn restore(&self) -> Option<SessionUser> {
        let identity = self.auth.restore().await?;
        self.merge_and_publish(identity).await
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        confirm_password: &str,
        attributes: NewProfile,
    ) -> Result<SignUpOutcome, AuthFailure> {
        validate::validate_sign_up(email, password, confirm_password)?;
        let email = email.trim();

        let metadata = json!({
            "username": attributes.username,
            "account_type": attributes.account_type,
        });
        let response = self.auth.sign_up(email, password, &metadata).await.map_err(|e| {
            warn!(error = %e, "sign up failed");
            AuthFailure::from(e)
        })?;

        let identity = response.identity().clone();
        if identity.identities.as_ref().is_some_and(Vec::is_empty) {
            return Err(AuthFailure::DuplicateAccount);
        }

        if let Err(e) = self
            .users
            .create_profile(identity.id, identity.email.as_deref(), &attributes)
            .await
        {
            warn!(user_id = %identity.id, error = %e, "profile creation failed after sign up");
        }

        match response {
            SignUpResponse::Session(_) => {
                self.merge_and_publish(identity).await;
                Ok(SignUpOutcome::SignedIn)
            }
            SignUpResponse::User(_) => Ok(SignUpOutcome::PendingConfirmation { email: email.to_owned() }),
        }
    }

    /// Leaves the current user untouched when the credentials are refused.
    ///
    /// If the credentials are accepted but the profile cannot be loaded the
    /// session stays bound, no user is published and `Unexpected` is
    /// returned; the next auth event retries the merge.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthFailure> {
        validate::validate_email(email)?;

        let session = self
            .auth
            .sign_in_with_password(email.trim(), password)
            .await
            .map_err(|e| {
                info!(error = %e, "sign in refused");
                AuthFailure::from(e)
            })?;

        match self.merge_and_publish(session.user).await {
            Some(_) => Ok(()),
            None => Err(AuthFailure::Unexpected("could not load profile".to_owned())),
        }
    }

    /// Returns the provider URL to send the user to.
    pub fn sign_in_with_oauth(&self, provider: ClientProvider) -> Result<String, AuthFailure> {
        let start = self.auth.authorize_url(provider).map_err(AuthFailure::from)?;
        let url = start.url.clone();
        *self.pending_oauth.lock().unwrap_or_else(PoisonError::into_inner) = Some(start);
        Ok(url)
    }

    /// Handles the provider's redirect back to the app.
    pub async fn complete_oauth(&self, code: &str, state: &str) -> Result<(), AuthFailure> {
        let Some(start) = self.pending_oauth.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            return Err(AuthFailure::Rejected("no sign-in in progress".to_owned()));
        };

        let session = self.auth.exchange_code(start, code, state).await?;
        let mut user = self.merge_and_publish(session.user.clone()).await;

        if user.as_ref().is_some_and(|u| u.profile.is_none()) {
            let attributes = NewProfile::default();
            match self.users.create_profile(session.user.id, session.user.email.as_deref(), &attributes).await {
                Ok(_) => user = self.merge_and_publish(session.user).await,
                Err(e) => warn!(error = %e, "could not create profile for oauth user"),
            }
        }

        debug!(has_profile = user.is_some_and(|u| u.profile.is_some()), "oauth sign in complete");
        Ok(())
    }

    /// Clears the current user at once, then revokes the session. Safe to
    /// call when signed out.
    pub async fn sign_out(&self) {
        self.user.clear();
        if let Err(e) = self.auth.sign_out().await {
            warn!(error = %e, "remote sign out failed; local session cleared anyway");
        }
    }

    /// Re-reads the profile, e.g. after the edit dialog saved changes.
    pub async fn refresh_user(&self) -> Option<SessionUser> {
        match self.auth.session() {
            Some(session) => self.merge_and_publish(session.user).await,
            None => {
                self.user.clear();
                None
            }
        }
    }

    /// Folds an edit into the current user without asking the backend.
    ///
    /// The caller must already have saved it. If that save later turns out
    /// to have failed, the two disagree until the next [`Self::refresh_user`].
    pub fn update_user_profile(&self, patch: &ProfilePatch) -> bool {
        let mut applied = false;
        self.user.tx.send_if_modified(|user| {
            applied = user.as_mut().is_some_and(|u| u.apply(patch));
            applied
        });
        applied
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthFailure> {
        validate::validate_email(email)?;
        self.auth
            .reset_password_for_email(email.trim())
            .await
            .map_err(AuthFailure::from)
    }

    pub async fn update_password(&self, password: &str, confirm_password: &str) -> Result<(), AuthFailure> {
        validate::validate_new_password(password, confirm_password)?;
        let attributes = UserAttributes {
            password: Some(password.to_owned()),
            ..UserAttributes::default()
        };
        self.auth.update_user(&attributes).await?;
        Ok(())
    }

    async fn merge_and_publish(&self, identity: Identity) -> Option<SessionUser> {
        let epoch = self.user.epoch();
        let merged = merge::load(&self.users, identity).await;
        self.user.publish(&self.auth, epoch, merged)
    }
}

impl Drop for SessionProvider {
    fn drop(&mut self) {
        self.teardown();
    }
}
