mod common;

use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zoomies::{communities::NewCommunity, ApiError};

use common::{context, signed_in};

fn community_json(id: Uuid, name: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "description": "Rescued and spoiled",
        "topics": ["goats"],
        "member_count": 12,
        "created_at": "2024-04-01T09:00:00Z"
    })
}

async fn mount_membership(mock: &MockServer, community_id: Uuid, rows: serde_json::Value, times: Option<u64>) {
    let mock_builder = Mock::given(method("GET"))
        .and(path("/rest/v1/community_members"))
        .and(query_param("community_id", format!("eq.{community_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows));
    match times {
        Some(n) => mock_builder.up_to_n_times(n).mount(mock).await,
        None => mock_builder.mount(mock).await,
    }
}

#[tokio::test]
async fn test_load_communities_populates_cache() {
    let mock = MockServer::start().await;
    let (ctx, auth_id) = signed_in(&mock).await;
    let (joined, other) = (Uuid::now_v7(), Uuid::now_v7());

    Mock::given(method("GET"))
        .and(path("/rest/v1/communities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            community_json(joined, "Goat Gang"),
            community_json(other, "Pig Pals"),
        ])))
        .mount(&mock)
        .await;
    mount_membership(&mock, joined, json!([{ "community_id": joined, "user_id": auth_id }]), None).await;
    mount_membership(&mock, other, json!([]), None).await;

    let communities = ctx.load_communities().await.unwrap();

    assert_eq!(communities.len(), 2);
    assert_eq!(communities[0].member_count, 12);
    assert_eq!(ctx.membership.get(joined), Some(true));
    assert_eq!(ctx.membership.get(other), Some(false));
}

#[tokio::test]
async fn test_join_conflict_counts_as_joined() {
    let mock = MockServer::start().await;
    let (ctx, auth_id) = signed_in(&mock).await;
    let id = Uuid::now_v7();

    // Not a member at the pre-check, a member by the time of the re-read.
    mount_membership(&mock, id, json!([]), Some(1)).await;
    mount_membership(&mock, id, json!([{ "community_id": id, "user_id": auth_id }]), None).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/community_members"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint \"community_members_pkey\""
        })))
        .expect(1)
        .mount(&mock)
        .await;

    ctx.membership.join(id).await.unwrap();
    assert!(ctx.membership.is_member(id));

    ctx.membership.settle().await;
    assert_eq!(ctx.membership.get(id), Some(true));
}

#[tokio::test]
async fn test_failed_join_reverts_after_re_read() {
    let mock = MockServer::start().await;
    let (ctx, _) = signed_in(&mock).await;
    let id = Uuid::now_v7();

    mount_membership(&mock, id, json!([]), None).await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/community_members"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal server error"))
        .mount(&mock)
        .await;

    let err = ctx.membership.join(id).await.unwrap_err();
    assert!(matches!(err, ApiError::Remote { status: 500, .. }));
    assert!(ctx.membership.is_member(id));

    ctx.membership.settle().await;
    assert_eq!(ctx.membership.get(id), Some(false));
}

#[tokio::test]
async fn test_leave_without_membership_is_a_no_op() {
    let mock = MockServer::start().await;
    let (ctx, _) = signed_in(&mock).await;
    let id = Uuid::now_v7();

    mount_membership(&mock, id, json!([]), None).await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/community_members"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock)
        .await;

    ctx.membership.leave(id).await.unwrap();
    ctx.membership.settle().await;
    assert_eq!(ctx.membership.get(id), Some(false));
}

#[tokio::test]
async fn test_signed_out_user_is_not_a_member() {
    let mock = MockServer::start().await;
    let ctx = context(&mock);

    assert!(!ctx.communities.is_member(Uuid::now_v7()).await.unwrap());
    assert!(matches!(ctx.communities.join(Uuid::now_v7()).await, Err(ApiError::NotAuthenticated)));
}

#[tokio::test]
async fn test_create_joins_the_creator() {
    let mock = MockServer::start().await;
    let (ctx, _) = signed_in(&mock).await;
    let id = Uuid::now_v7();

    Mock::given(method("POST"))
        .and(path("/rest/v1/communities"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([community_json(id, "Goat Gang")])))
        .expect(1)
        .mount(&mock)
        .await;
    mount_membership(&mock, id, json!([]), None).await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/community_members"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(1)
        .mount(&mock)
        .await;

    let community = NewCommunity {
        name: "Goat Gang".to_owned(),
        topics: vec!["goats".to_owned()],
        ..NewCommunity::default()
    };
    let created = ctx.communities.create(&community).await.unwrap();
    assert_eq!(created.id, id);
}
