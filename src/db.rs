//! Query builder for the backend's REST interface over its tables.
//!
//! Filters become query parameters (`column=op.value`); the request is only
//! sent by one of the terminal methods (`fetch_*`, `count`, `insert`,
//! `upsert`, `update`, `delete`).

use std::fmt::Display;

use reqwest::{header::CONTENT_RANGE, Method};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{
    client::SupabaseClient,
    error::{ApiError, ApiResult},
};

const RETURN_REPRESENTATION: &str = "return=representation";
const MERGE_DUPLICATES: &str = "resolution=merge-duplicates,return=representation";

/// Zero-based page of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub index: usize,
    pub size: usize,
}

impl Page {
    pub const fn new(index: usize, size: usize) -> Self {
        Self { index, size }
    }

    /// Inclusive row range.
    pub fn bounds(&self) -> (usize, usize) {
        let from = self.index * self.size;
        (from, from + self.size.max(1) - 1)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, 20)
    }
}

pub struct Query {
    client: SupabaseClient,
    table: String,
    params: Vec<(String, String)>,
}

impl Query {
    pub(crate) fn new(client: SupabaseClient, table: &str) -> Self {
        Self {
            client,
            table: table.to_owned(),
            params: Vec::new(),
        }
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    fn param(mut self, key: &str, value: String) -> Self {
        self.params.push((key.to_owned(), value));
        self
    }

    pub fn select(self, columns: &str) -> Self {
        self.param("select", columns.to_owned())
    }

    pub fn eq(self, column: &str, value: impl Display) -> Self {
        self.param(column, format!("eq.{value}"))
    }

    pub fn neq(self, column: &str, value: impl Display) -> Self {
        self.param(column, format!("neq.{value}"))
    }

    pub fn is_null(self, column: &str) -> Self {
        self.param(column, "is.null".to_owned())
    }

    /// Case-insensitive match; `*` is the wildcard.
    pub fn ilike(self, column: &str, pattern: &str) -> Self {
        self.param(column, format!("ilike.{pattern}"))
    }

    pub fn in_list<T: Display>(self, column: &str, values: impl IntoIterator<Item = T>) -> Self {
        let list = values
            .into_iter()
            .map(|v| format!("\"{}\"", v.to_string().replace('"', "\\\"")))
            .collect::<Vec<_>>()
            .join(",");
        self.param(column, format!("in.({list})"))
    }

    /// Array column contains every value.
    pub fn contains(self, column: &str, values: &[&str]) -> Self {
        let list = values
            .iter()
            .map(|v| format!("\"{}\"", v.replace('"', "\\\"")))
            .collect::<Vec<_>>()
            .join(",");
        self.param(column, format!("cs.{{{list}}}"))
    }

    pub fn order(self, column: &str, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.param("order", format!("{column}.{direction}"))
    }

    pub fn limit(self, count: usize) -> Self {
        self.param("limit", count.to_string())
    }

    /// Rows `from..=to`.
    pub fn range(self, from: usize, to: usize) -> Self {
        let count = to.saturating_sub(from) + 1;
        self.param("offset", from.to_string()).limit(count)
    }

    pub fn page(self, page: Page) -> Self {
        let (from, to) = page.bounds();
        self.range(from, to)
    }

    pub async fn fetch_all<T: DeserializeOwned>(self) -> ApiResult<Vec<T>> {
        self.send(Method::GET, None, None).await
    }

    pub async fn fetch_optional<T: DeserializeOwned>(self) -> ApiResult<Option<T>> {
        let rows: Vec<T> = self.limit(1).fetch_all().await?;
        Ok(rows.into_iter().next())
    }

    pub async fn fetch_one<T: DeserializeOwned>(self) -> ApiResult<T> {
        let table = self.table.clone();
        self.fetch_optional()
            .await?
            .ok_or(ApiError::NotFound(table))
    }

    /// Exact number of matching rows, without transferring them.
    pub async fn count(self) -> ApiResult<u64> {
        let url = self.client.endpoint("rest", &self.table);
        let response = self
            .client
            .request(Method::HEAD, &url)
            .query(&self.params)
            .header("Prefer", "count=exact")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SupabaseClient::error_from_response(response).await);
        }

        response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range)
            .ok_or_else(|| ApiError::Remote {
                status: response.status().as_u16(),
                code: None,
                message: "count missing from response".to_owned(),
            })
    }

    pub async fn insert<B, T>(self, rows: &B) -> ApiResult<Vec<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(rows)?;
        self.send(Method::POST, Some(body), Some(RETURN_REPRESENTATION)).await
    }

    /// Insert, or merge into the row that conflicts on `on_conflict`.
    pub async fn upsert<B, T>(self, rows: &B, on_conflict: &str) -> ApiResult<Vec<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(rows)?;
        self.param("on_conflict", on_conflict.to_owned())
            .send(Method::POST, Some(body), Some(MERGE_DUPLICATES))
            .await
    }

    pub async fn update<B, T>(self, patch: &B) -> ApiResult<Vec<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(patch)?;
        self.send(Method::PATCH, Some(body), Some(RETURN_REPRESENTATION)).await
    }

    /// Deletes matching rows and reports how many went.
    pub async fn delete(self) -> ApiResult<usize> {
        let rows: Vec<Value> = self.send(Method::DELETE, None, Some(RETURN_REPRESENTATION)).await?;
        Ok(rows.len())
    }

    async fn send<T: DeserializeOwned>(
        self,
        method: Method,
        body: Option<Value>,
        prefer: Option<&str>,
    ) -> ApiResult<T> {
        let url = self.client.endpoint("rest", &self.table);
        let mut request = self.client.request(method, &url).query(&self.params);
        if let Some(prefer) = prefer {
            request = request.header("Prefer", prefer);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        SupabaseClient::json_or_error(response).await
    }
}

/// Total from a `Content-Range` header: `0-24/312` or `*/0`.
fn parse_content_range(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.parse().ok()
}
