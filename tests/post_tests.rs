mod common;

use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zoomies::{
    db::Page,
    posts::{FeedScope, NewComment, NewPost, ReactionKind, ReactionState, ReactionTarget},
    storage::Upload,
    ApiError,
};

use common::{context, signed_in};

fn post_json(id: Uuid, community_id: Uuid, user_id: Uuid, image_url: Option<&str>) -> serde_json::Value {
    json!({
        "id": id,
        "community_id": community_id,
        "user_id": user_id,
        "title": "Adoption day",
        "content": "Hazel went home **today**.",
        "image_url": image_url,
        "created_at": "2024-06-01T10:00:00Z"
    })
}

#[tokio::test]
async fn test_repeated_upvote_stays_upvoted() {
    let mock = MockServer::start().await;
    let (ctx, _) = signed_in(&mock).await;
    let post_id = Uuid::now_v7();

    Mock::given(method("POST"))
        .and(path("/rest/v1/reactions"))
        .and(query_param("on_conflict", "user_id,post_id,comment_id"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(2)
        .mount(&mock)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/reactions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock)
        .await;

    let target = ReactionTarget::Post(post_id);
    for _ in 0..2 {
        let state = ctx
            .reactions
            .toggle(target, ReactionKind::Upvote, ReactionState::None)
            .await
            .unwrap();
        assert_eq!(state, ReactionState::Upvoted);
    }
}

#[tokio::test]
async fn test_upvote_on_upvoted_removes_reaction() {
    let mock = MockServer::start().await;
    let (ctx, auth_id) = signed_in(&mock).await;
    let post_id = Uuid::now_v7();

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/reactions"))
        .and(query_param("user_id", format!("eq.{auth_id}")))
        .and(query_param("post_id", format!("eq.{post_id}")))
        .and(query_param("comment_id", "is.null"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": Uuid::now_v7() }])))
        .expect(1)
        .mount(&mock)
        .await;

    let state = ctx
        .reactions
        .toggle(ReactionTarget::Post(post_id), ReactionKind::Upvote, ReactionState::Upvoted)
        .await
        .unwrap();
    assert_eq!(state, ReactionState::None);
}

#[tokio::test]
async fn test_reaction_counts() {
    let mock = MockServer::start().await;
    let ctx = context(&mock);
    let comment_id = Uuid::now_v7();

    for (kind, total) in [("upvote", "*/7"), ("downvote", "*/2")] {
        Mock::given(method("HEAD"))
            .and(path("/rest/v1/reactions"))
            .and(query_param("reaction_type", format!("eq.{kind}")))
            .and(header("Prefer", "count=exact"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Range", total))
            .mount(&mock)
            .await;
    }

    let counts = ctx.reactions.counts(ReactionTarget::Comment(comment_id)).await.unwrap();
    assert_eq!((counts.upvotes, counts.downvotes), (7, 2));
    assert_eq!(counts.score(), 5);
}

#[tokio::test]
async fn test_create_post_uploads_image_first() {
    let mock = MockServer::start().await;
    let (ctx, auth_id) = signed_in(&mock).await;
    let community_id = Uuid::now_v7();
    let post_id = Uuid::now_v7();

    Mock::given(method("POST"))
        .and(path_regex(format!(r"^/storage/v1/object/community-posts/{auth_id}/.+-hazel\.jpg$")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Key": "community-posts/hazel.jpg" })))
        .expect(1)
        .mount(&mock)
        .await;

    let image_url = format!("{}/storage/v1/object/public/community-posts/hazel.jpg", mock.uri());
    Mock::given(method("POST"))
        .and(path("/rest/v1/community_posts"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            post_json(post_id, community_id, auth_id, Some(&image_url))
        ])))
        .expect(1)
        .mount(&mock)
        .await;

    let post = ctx
        .posts
        .create(NewPost {
            community_id,
            title: "Adoption day".to_owned(),
            content: "Hazel went home **today**.".to_owned(),
            image: Some(Upload::new("hazel.jpg", "image/jpeg", vec![0xFF, 0xD8, 0xFF])),
        })
        .await
        .unwrap();

    assert_eq!(post.id, post_id);
    assert_eq!(post.image_url.as_deref(), Some(image_url.as_str()));
    assert!(post.body_html().contains("<strong>today</strong>"));
}

#[tokio::test]
async fn test_create_post_requires_user() {
    let mock = MockServer::start().await;
    let ctx = context(&mock);

    let result = ctx
        .posts
        .create(NewPost {
            community_id: Uuid::now_v7(),
            title: "Hello".to_owned(),
            ..NewPost::default()
        })
        .await;

    assert!(matches!(result, Err(ApiError::NotAuthenticated)));
}

#[tokio::test]
async fn test_joined_feed_without_memberships_is_empty() {
    let mock = MockServer::start().await;
    let (ctx, _) = signed_in(&mock).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/community_members"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/community_posts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock)
        .await;

    let posts = ctx.posts.feed(FeedScope::Joined, Page::default()).await.unwrap();
    assert!(posts.is_empty());
}

#[tokio::test]
async fn test_community_listing_pages() {
    let mock = MockServer::start().await;
    let ctx = context(&mock);
    let community_id = Uuid::now_v7();

    Mock::given(method("GET"))
        .and(path("/rest/v1/community_posts"))
        .and(query_param("community_id", format!("eq.{community_id}")))
        .and(query_param("order", "created_at.desc"))
        .and(query_param("offset", "10"))
        .and(query_param("limit", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            post_json(Uuid::now_v7(), community_id, Uuid::now_v7(), None)
        ])))
        .expect(1)
        .mount(&mock)
        .await;

    let posts = ctx.posts.list(community_id, Page::new(1, 10)).await.unwrap();
    assert_eq!(posts.len(), 1);
}

#[tokio::test]
async fn test_empty_comment_is_rejected_locally() {
    let mock = MockServer::start().await;
    let (ctx, _) = signed_in(&mock).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/comments"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&mock)
        .await;

    let result = ctx
        .comments
        .create(&NewComment { post_id: Uuid::now_v7(), parent_id: None, content: "   ".to_owned() })
        .await;
    assert!(matches!(result, Err(ApiError::Invalid(_))));
}
