//! File uploads into storage buckets.

use reqwest::{header::CONTENT_TYPE, Method};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::{
    client::SupabaseClient,
    error::{ApiError, ApiResult},
    GetField,
};

/// A file picked by the user.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }
}

pub struct Storage {
    client: SupabaseClient,
}

impl Storage {
    pub(crate) fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    /// Stores `upload` at `path` inside `bucket` and returns its public URL.
    pub async fn upload(&self, bucket: &str, path: &str, upload: Upload) -> ApiResult<String> {
        let url = self.client.endpoint("storage", &format!("object/{bucket}/{path}"));
        let response = self
            .client
            .request(Method::POST, &url)
            .header(CONTENT_TYPE, upload.content_type)
            .body(upload.bytes)
            .send()
            .await?;

        let body: serde_json::Value = SupabaseClient::json_or_error(response).await?;
        let key = body
            .get_str_field("Key")
            .map_err(|e| ApiError::Invalid(e.to_string()))?;
        debug!(%key, "uploaded file");

        Ok(self.public_url(bucket, path))
    }

    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        self.client.endpoint("storage", &format!("object/public/{bucket}/{path}"))
    }

    pub async fn remove(&self, bucket: &str, paths: &[String]) -> ApiResult<()> {
        let url = self.client.endpoint("storage", &format!("object/{bucket}"));
        let response = self
            .client
            .request(Method::DELETE, &url)
            .json(&json!({ "prefixes": paths }))
            .send()
            .await?;

        let _: serde_json::Value = SupabaseClient::json_or_error(response).await?;
        Ok(())
    }
}

/// Collision-free object path under the owner's folder.
pub fn object_path(owner: Uuid, file_name: &str) -> String {
    let cleaned: String = file_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{owner}/{}-{cleaned}", Uuid::now_v7().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn object_paths_are_scoped_and_sanitized() {
        let owner = Uuid::nil();
        let path = object_path(owner, "my cat (1).png");
        assert!(path.starts_with(&format!("{owner}/")));
        assert!(path.ends_with("-my_cat__1_.png"));
        assert_ne!(object_path(owner, "a.png"), object_path(owner, "a.png"));
    }

    #[test]
    fn public_urls() {
        let client = SupabaseClient::new(&Config::new("https://zoomies.supabase.co", "anon"));
        assert_eq!(
            client.storage().public_url("community-posts", "u/p.png"),
            "https://zoomies.supabase.co/storage/v1/object/public/community-posts/u/p.png"
        );
    }
}
