use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{client::SupabaseClient, error::ApiResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: Uuid,
    pub name: String,
}

#[derive(Clone)]
pub struct Topics {
    client: SupabaseClient,
}

impl Topics {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    /// Alphabetical.
    pub async fn list(&self) -> ApiResult<Vec<Topic>> {
        self.client
            .from("topics")
            .select("id,name")
            .order("name", true)
            .fetch_all()
            .await
    }
}
