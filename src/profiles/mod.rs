mod profile;

use rand::{seq::IndexedRandom, Rng};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::{
    client::SupabaseClient,
    db::Page,
    error::{ApiError, ApiResult},
    storage::{object_path, Upload},
};

pub use profile::{AccountKind, NewProfile, Profile, ProfilePatch, Sanctuary};

const TABLE: &str = "users";

/// Stored procedure that inserts the profile row on the new user's behalf,
/// before they have a session that row-level security would accept.
const CREATE_PROFILE_RPC: &str = "create_user_profile";

#[derive(Serialize)]
struct CreateProfileArgs<'a> {
    p_auth_id: Uuid,
    p_email: Option<&'a str>,
    p_username: &'a str,
    p_account_type: AccountKind,
    p_bio: Option<&'a str>,
    p_location: Option<&'a str>,
    p_sanctuary_name: Option<&'a str>,
    p_sanctuary_description: Option<&'a str>,
}

#[derive(Clone)]
pub struct Users {
    client: SupabaseClient,
    avatars_bucket: String,
}

impl Users {
    pub fn new(client: SupabaseClient, avatars_bucket: String) -> Self {
        Self { client, avatars_bucket }
    }

    /// The profile linked to an auth identity, if one was created.
    pub async fn get_by_auth_id(&self, auth_id: Uuid) -> ApiResult<Option<Profile>> {
        self.client
            .from(TABLE)
            .select("*")
            .eq("auth_id", auth_id)
            .fetch_optional()
            .await
    }

    pub async fn get(&self, id: Uuid) -> ApiResult<Profile> {
        self.client
            .from(TABLE)
            .select("*")
            .eq("id", id)
            .fetch_one()
            .await
    }

    pub async fn get_by_username(&self, username: &str) -> ApiResult<Option<Profile>> {
        self.client
            .from(TABLE)
            .select("*")
            .eq("username", username)
            .fetch_optional()
            .await
    }

    pub async fn is_username_available(&self, username: &str) -> ApiResult<bool> {
        let taken = self.client
            .from(TABLE)
            .eq("username", username)
            .count()
            .await?;
        Ok(taken == 0)
    }

    /// Profiles for a set of auth identities, e.g. post authors.
    pub async fn get_many_by_auth_id(&self, auth_ids: &[Uuid]) -> ApiResult<Vec<Profile>> {
        if auth_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.client
            .from(TABLE)
            .select("*")
            .in_list("auth_id", auth_ids)
            .fetch_all()
            .await
    }

    pub async fn sanctuaries(&self, page: Page) -> ApiResult<Vec<Profile>> {
        self.client
            .from(TABLE)
            .select("*")
            .eq("account_type", "sanctuary")
            .order("created_at", false)
            .page(page)
            .fetch_all()
            .await
    }

    /// Inserts the profile row right after sign-up. A missing username is
    /// replaced by a generated one.
    pub async fn create_profile(
        &self,
        auth_id: Uuid,
        email: Option<&str>,
        attributes: &NewProfile,
    ) -> ApiResult<Profile> {
        let username = match attributes.username.as_deref().map(str::trim) {
            Some(username) if !username.is_empty() => username.to_owned(),
            _ => generate_username(),
        };
        let is_sanctuary = attributes.account_type == AccountKind::Sanctuary;

        let args = CreateProfileArgs {
            p_auth_id: auth_id,
            p_email: email,
            p_username: &username,
            p_account_type: attributes.account_type,
            p_bio: attributes.bio.as_deref(),
            p_location: attributes.location.as_deref(),
            p_sanctuary_name: attributes.sanctuary_name.as_deref().filter(|_| is_sanctuary),
            p_sanctuary_description: attributes.sanctuary_description.as_deref().filter(|_| is_sanctuary),
        };

        info!(%auth_id, %username, "creating profile");
        self.client.rpc(CREATE_PROFILE_RPC, &args).await
    }

    /// Persists an edit to the signed-in user's profile.
    pub async fn update_profile(&self, patch: &ProfilePatch) -> ApiResult<Profile> {
        let auth_id = self.client.require_user_id()?;
        if patch.is_empty() {
            return Err(ApiError::Invalid("nothing to update".to_owned()));
        }

        let rows: Vec<Profile> = self.client
            .from(TABLE)
            .eq("auth_id", auth_id)
            .update(patch)
            .await?;
        rows.into_iter().next().ok_or(ApiError::NotFound(TABLE.to_owned()))
    }

    /// Uploads a new avatar and points the profile at it.
    pub async fn upload_avatar(&self, upload: Upload) -> ApiResult<Profile> {
        let auth_id = self.client.require_user_id()?;
        let path = object_path(auth_id, &upload.file_name);
        let url = self.client.storage().upload(&self.avatars_bucket, &path, upload).await?;

        self.update_profile(&ProfilePatch {
            avatar_url: Some(url),
            ..ProfilePatch::default()
        })
        .await
    }
}

/// Fallback username along the lines of `BraveOtter42`.
pub fn generate_username() -> String {
    let adjectives = [
        "Quick", "Lazy", "Jolly", "Brave", "Gentle", "Wild", "Calm", "Bold",
        "Shy", "Proud", "Happy", "Eager", "Fluffy", "Scruffy", "Lucky", "Sleepy",
    ];
    let animals = [
        "Otter", "Goat", "Piglet", "Hen", "Donkey", "Alpaca", "Bunny", "Kitten",
        "Puppy", "Calf", "Llama", "Duck", "Lamb", "Pony", "Turkey", "Cow",
    ];

    let mut rng = rand::rng();
    let adjective = adjectives.choose(&mut rng).copied().unwrap_or("Happy");
    let animal = animals.choose(&mut rng).copied().unwrap_or("Otter");
    format!("{adjective}{animal}{}", rng.random_range(10..100))
}
