#![cfg(feature = "inmem-store")]

use actix_web::{test, web, App};
use serde_json::{json, Value};
use std::sync::Arc;
use yatube::auth::{hash_password, TokenKind};
use yatube::models::{NewUser, User};
use yatube::repo::inmem::InMemRepo;
use yatube::repo::UserRepo;
use yatube::storage::FsImageStore;
use yatube::{config, AppState, Settings};

const SECRET: &str = "test-secret-must-be-32-bytes-long!!";
const PASSWORD: &str = "password123";

fn setup() -> (InMemRepo, web::Data<AppState>, tempfile::TempDir) {
    let repo = InMemRepo::new();
    let media = tempfile::tempdir().unwrap();
    let settings = Settings::with_secret(SECRET).unwrap();
    let state = AppState::new(Arc::new(repo.clone()), Arc::new(FsImageStore::new(media.path())), settings).unwrap();
    (repo, web::Data::new(state), media)
}

async fn register(repo: &InMemRepo, name: &str) -> User {
    repo.create_user(NewUser {
        username: name.into(),
        email: format!("{name}@example.com"),
        password_hash: hash_password(PASSWORD).unwrap(),
    })
    .await
    .unwrap()
}

fn bearer(data: &AppState, user: &User) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", data.keys.issue(user, TokenKind::Access).unwrap()))
}

async fn body(resp: actix_web::dev::ServiceResponse) -> Value {
    serde_json::from_slice(&test::read_body(resp).await).unwrap()
}

#[actix_web::test]
async fn token_obtain_and_refresh() {
    let (repo, data, _media) = setup();
    register(&repo, "leo").await;
    let app = test::init_service(App::new().app_data(data.clone()).configure(config)).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/token/")
        .set_json(json!({"username": "leo", "password": PASSWORD}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let pair = body(resp).await;
    let access = pair["access"].as_str().unwrap().to_string();
    let refresh = pair["refresh"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri("/api/v1/token/")
        .set_json(json!({"username": "leo", "password": "wrong"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::post()
        .uri("/api/v1/token/refresh/")
        .set_json(json!({"refresh": refresh}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert!(body(resp).await["access"].as_str().is_some());

    // an access token is not a refresh token
    let req = test::TestRequest::post()
        .uri("/api/v1/token/refresh/")
        .set_json(json!({"refresh": access}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

#[actix_web::test]
async fn posts_crud_and_permissions() {
    let (repo, data, _media) = setup();
    let leo = register(&repo, "leo").await;
    let ann = register(&repo, "ann").await;
    let app = test::init_service(App::new().app_data(data.clone()).configure(config)).await;

    let req = test::TestRequest::get().uri("/api/v1/posts/").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(body(resp).await, json!({"count": 0, "next": null, "previous": null, "results": []}));

    // anonymous writes are refused
    let req = test::TestRequest::post().uri("/api/v1/posts/").set_json(json!({"text": "hi"})).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::post()
        .uri("/api/v1/posts/")
        .insert_header(bearer(&data, &leo))
        .set_json(json!({"text": "hello world"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let post = body(resp).await;
    assert_eq!(post["author"], "leo");
    assert_eq!(post["group"], Value::Null);
    assert!(post.get("author_id").is_none());
    let id = post["id"].as_i64().unwrap();

    // someone else's post
    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/posts/{id}/"))
        .insert_header(bearer(&data, &ann))
        .set_json(json!({"text": "hijacked"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/posts/{id}/"))
        .insert_header(bearer(&data, &leo))
        .set_json(json!({"text": "edited"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(body(resp).await["text"], "edited");

    let req = test::TestRequest::put()
        .uri(&format!("/api/v1/posts/{id}/"))
        .insert_header(bearer(&data, &leo))
        .set_json(json!({"text": "   "}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    assert!(body(resp).await["text"].is_array());

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/posts/{id}/"))
        .insert_header(bearer(&data, &ann))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/posts/{id}/"))
        .insert_header(bearer(&data, &leo))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);

    let req = test::TestRequest::get().uri(&format!("/api/v1/posts/{id}/")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    assert!(body(resp).await["error"].is_string());
}

#[actix_web::test]
async fn post_lists_are_paginated_and_filterable() {
    let (repo, data, _media) = setup();
    let leo = register(&repo, "leo").await;
    let app = test::init_service(App::new().app_data(data.clone()).configure(config)).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/group/")
        .insert_header(bearer(&data, &leo))
        .set_json(json!({"title": "Cats", "slug": "cats"}))
        .to_request();
    let group_id = body(test::call_service(&app, req).await).await["id"].as_i64().unwrap();

    for i in 0..12 {
        let group = if i < 3 { json!(group_id) } else { Value::Null };
        let req = test::TestRequest::post()
            .uri("/api/v1/posts/")
            .insert_header(bearer(&data, &leo))
            .set_json(json!({"text": format!("post {i}"), "group": group}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 201);
    }

    let req = test::TestRequest::get().uri("/api/v1/posts/").to_request();
    let first = body(test::call_service(&app, req).await).await;
    assert_eq!(first["count"], 12);
    assert_eq!(first["results"].as_array().unwrap().len(), 10);
    assert!(first["next"].as_str().unwrap().ends_with("/api/v1/posts/?page=2"));
    assert_eq!(first["previous"], Value::Null);

    let req = test::TestRequest::get().uri("/api/v1/posts/?page=2").to_request();
    let second = body(test::call_service(&app, req).await).await;
    assert_eq!(second["results"].as_array().unwrap().len(), 2);
    assert_eq!(second["next"], Value::Null);
    assert!(second["previous"].as_str().unwrap().ends_with("/api/v1/posts/"));

    let req = test::TestRequest::get().uri(&format!("/api/v1/posts/?group={group_id}")).to_request();
    let filtered = body(test::call_service(&app, req).await).await;
    assert_eq!(filtered["count"], 3);
    for post in filtered["results"].as_array().unwrap() {
        assert_eq!(post["group"], group_id);
    }

    // unknown group in the payload is a field error
    let req = test::TestRequest::post()
        .uri("/api/v1/posts/")
        .insert_header(bearer(&data, &leo))
        .set_json(json!({"text": "x", "group": 99999}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    assert!(body(resp).await["group"].is_array());
}

#[actix_web::test]
async fn comments_flow() {
    let (repo, data, _media) = setup();
    let leo = register(&repo, "leo").await;
    let ann = register(&repo, "ann").await;
    let app = test::init_service(App::new().app_data(data.clone()).configure(config)).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/posts/")
        .insert_header(bearer(&data, &leo))
        .set_json(json!({"text": "discuss"}))
        .to_request();
    let post_id = body(test::call_service(&app, req).await).await["id"].as_i64().unwrap();
    let comments_url = format!("/api/v1/posts/{post_id}/comments/");

    let req = test::TestRequest::post()
        .uri(&comments_url)
        .insert_header(bearer(&data, &ann))
        .set_json(json!({"text": "first!"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let comment = body(resp).await;
    assert_eq!(comment["author"], "ann");
    assert_eq!(comment["post"], post_id);
    let comment_url = format!("{comments_url}{}/", comment["id"]);

    let req = test::TestRequest::post()
        .uri(&comments_url)
        .insert_header(bearer(&data, &ann))
        .set_json(json!({"text": ""}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::post()
        .uri("/api/v1/posts/99999/comments/")
        .insert_header(bearer(&data, &ann))
        .set_json(json!({"text": "lost"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::get().uri(&comments_url).to_request();
    let list = body(test::call_service(&app, req).await).await;
    assert_eq!(list["count"], 1);

    let req = test::TestRequest::patch()
        .uri(&comment_url)
        .insert_header(bearer(&data, &leo))
        .set_json(json!({"text": "not yours"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::put()
        .uri(&comment_url)
        .insert_header(bearer(&data, &ann))
        .set_json(json!({"text": "second thoughts"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(body(resp).await["text"], "second thoughts");

    let req = test::TestRequest::delete()
        .uri(&comment_url)
        .insert_header(bearer(&data, &ann))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);

    let req = test::TestRequest::get().uri(&comment_url).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
async fn groups_validate_and_reject_duplicate_slugs() {
    let (repo, data, _media) = setup();
    let leo = register(&repo, "leo").await;
    let app = test::init_service(App::new().app_data(data.clone()).configure(config)).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/group/")
        .set_json(json!({"title": "Cats", "slug": "cats"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::post()
        .uri("/api/v1/group/")
        .insert_header(bearer(&data, &leo))
        .set_json(json!({"title": "Cats", "slug": "cats", "description": "All about cats"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let id = body(resp).await["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri("/api/v1/group/")
        .insert_header(bearer(&data, &leo))
        .set_json(json!({"title": "More cats", "slug": "cats"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    assert!(body(resp).await["slug"].is_array());

    let req = test::TestRequest::post()
        .uri("/api/v1/group/")
        .insert_header(bearer(&data, &leo))
        .set_json(json!({"title": "Dogs", "slug": "dogs and more"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::get().uri("/api/v1/group/").to_request();
    assert_eq!(body(test::call_service(&app, req).await).await["count"], 1);

    let req = test::TestRequest::get().uri(&format!("/api/v1/group/{id}/")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(body(resp).await["description"], "All about cats");

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/group/{id}/"))
        .insert_header(bearer(&data, &leo))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);

    let req = test::TestRequest::get().uri(&format!("/api/v1/group/{id}/")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
async fn follows_reject_duplicates_self_and_strangers() {
    let (repo, data, _media) = setup();
    let leo = register(&repo, "leo").await;
    register(&repo, "ann").await;
    let kim = register(&repo, "kim").await;
    let app = test::init_service(App::new().app_data(data.clone()).configure(config)).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/follow/")
        .insert_header(bearer(&data, &leo))
        .set_json(json!({"author": "ann"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let edge = body(resp).await;
    assert_eq!(edge["user"], "leo");
    assert_eq!(edge["author"], "ann");
    let follow_url = format!("/api/v1/follow/{}/", edge["id"]);

    for author in ["ann", "leo", "ghost", ""] {
        let req = test::TestRequest::post()
            .uri("/api/v1/follow/")
            .insert_header(bearer(&data, &leo))
            .set_json(json!({"author": author}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400, "author {author:?}");
        assert!(body(resp).await["author"].is_array());
    }

    let req = test::TestRequest::post()
        .uri("/api/v1/follow/")
        .set_json(json!({"author": "ann"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::get().uri("/api/v1/follow/?search=ann").to_request();
    assert_eq!(body(test::call_service(&app, req).await).await["count"], 1);
    let req = test::TestRequest::get().uri("/api/v1/follow/?search=kim").to_request();
    assert_eq!(body(test::call_service(&app, req).await).await["count"], 0);

    let req = test::TestRequest::get().uri(&follow_url).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::delete().uri(&follow_url).insert_header(bearer(&data, &kim)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::delete().uri(&follow_url).insert_header(bearer(&data, &leo)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);

    let req = test::TestRequest::delete().uri(&follow_url).insert_header(bearer(&data, &leo)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
async fn malformed_requests() {
    let (repo, data, _media) = setup();
    let leo = register(&repo, "leo").await;
    let app = test::init_service(App::new().app_data(data.clone()).configure(config)).await;

    let req = test::TestRequest::get().uri("/api/v1/nothing-here/").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    assert!(body(resp).await["error"].is_string());

    let req = test::TestRequest::post()
        .uri("/api/v1/posts/")
        .insert_header(bearer(&data, &leo))
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    assert!(body(resp).await["error"].is_string());

    let req = test::TestRequest::get().uri("/api/v1/posts/abc/").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}
