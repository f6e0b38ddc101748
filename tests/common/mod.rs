#![allow(dead_code)]

use std::time::Duration;

use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zoomies::{AppContext, Config};

pub const EMAIL: &str = "mabel@x.com";
pub const PASSWORD: &str = "hay-bales";

pub fn context(mock: &MockServer) -> AppContext {
    let config = Config::new(mock.uri(), "anon").with_reconcile_delay(Duration::from_millis(20));
    AppContext::new(config)
}

pub fn identity_json(id: Uuid) -> Value {
    json!({
        "id": id,
        "email": EMAIL,
        "created_at": "2024-05-01T12:00:00Z",
        "user_metadata": { "username": "mabel" },
        "identities": [{ "provider": "email" }]
    })
}

pub fn session_json(id: Uuid) -> Value {
    json!({
        "access_token": "access-token",
        "refresh_token": "refresh-token",
        "token_type": "bearer",
        "expires_in": 3600,
        "user": identity_json(id)
    })
}

pub fn profile_json(auth_id: Uuid) -> Value {
    json!({
        "id": Uuid::now_v7(),
        "auth_id": auth_id,
        "username": "mabel",
        "bio": "Hay enthusiast",
        "account_type": "user",
        "created_at": "2024-05-02T08:00:00Z"
    })
}

pub async fn mount_profile(mock: &MockServer, auth_id: Uuid) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("auth_id", format!("eq.{auth_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([profile_json(auth_id)])))
        .mount(mock)
        .await;
}

pub async fn mount_password_grant(mock: &MockServer, auth_id: Uuid) {
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_json(auth_id)))
        .mount(mock)
        .await;
}

/// A context with a signed-in user whose profile exists.
pub async fn signed_in(mock: &MockServer) -> (AppContext, Uuid) {
    let auth_id = Uuid::now_v7();
    mount_password_grant(mock, auth_id).await;
    mount_profile(mock, auth_id).await;

    let ctx = context(mock);
    ctx.session.sign_in(EMAIL, PASSWORD).await.unwrap();
    (ctx, auth_id)
}
