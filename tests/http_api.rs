use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::Value;
use sharelist::application::items::ItemService;
use sharelist::application::notify::ChangeNotifier;
use sharelist::cache::{CacheConfig, MemoryCache};
use sharelist::config::ServerSettings;
use sharelist::hub::{BroadcastHub, HubConfig};
use sharelist::infra::auth::TokenVerifier;
use sharelist::infra::http::{self, ApiState, HealthState, WsState};
use sharelist::infra::memory::MemoryRepositories;
use sharelist_api_types::{Item, ItemList, LikeResponse};
use time::OffsetDateTime;
use tower::ServiceExt;

const SECRET: &[u8] = b"http-test-secret";

struct TestApp {
    router: Router,
    tokens: Arc<TokenVerifier>,
}

impl TestApp {
    fn new() -> Self {
        let repos = Arc::new(MemoryRepositories::new());
        let (notifier, _feed) = ChangeNotifier::channel();
        let items = Arc::new(
            ItemService::new(repos.clone(), repos.clone(), notifier).with_cache(
                Arc::new(MemoryCache::new(&CacheConfig::default())),
                Duration::from_secs(600),
            ),
        );
        let tokens = Arc::new(TokenVerifier::new(
            SECRET,
            "sharelist",
            Duration::from_secs(3600),
        ));
        let (hub, _hub_task) = BroadcastHub::spawn(HubConfig::default());
        let server = ServerSettings {
            addr: "127.0.0.1:0".parse().expect("addr"),
            graceful_shutdown: Duration::from_secs(1),
            cors_allowed_origins: vec!["http://localhost:3000".to_string()],
        };

        let router = http::build_router(
            ApiState {
                items,
                tokens: tokens.clone(),
            },
            WsState {
                hub,
                ping_interval: Duration::from_secs(30),
            },
            HealthState { store: repos },
            &server,
        );
        Self { router, tokens }
    }

    fn token(&self, user_id: i64) -> String {
        self.tokens.issue(user_id).expect("issue token")
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        user_id: Option<i64>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user_id) = user_id {
            builder = builder.header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.token(user_id)),
            );
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).expect("encode body")))
                .expect("request should build"),
            None => builder.body(Body::empty()).expect("request should build"),
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("read body")
            .to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, json)
    }
}

#[tokio::test]
async fn api_requires_bearer_token() {
    let app = TestApp::new();
    let (status, body) = app.send(Method::GET, "/api/v1/items", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn expired_token_is_reported_as_such() {
    let app = TestApp::new();
    let token = app
        .tokens
        .issue_at(
            1,
            OffsetDateTime::now_utc() - time::Duration::hours(2),
            Duration::from_secs(60),
        )
        .expect("issue");

    let request = Request::builder()
        .uri("/api/v1/items")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .expect("request should build");
    let response = app.router.clone().oneshot(request).await.expect("respond");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    let body: Value = serde_json::from_slice(&bytes).expect("json body");
    assert_eq!(body["error"]["code"], "token_expired");
}

#[tokio::test]
async fn item_lifecycle_over_http() {
    let app = TestApp::new();

    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/items",
            Some(1),
            Some(serde_json::json!({ "title": "Test Todo" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let created: Item = serde_json::from_value(body).expect("item");
    assert_eq!(created.title, "Test Todo");
    assert_eq!(created.owner_id, 1);
    assert_eq!(created.like_count, 0);

    let like_uri = format!("/api/v1/items/{}/like", created.id);
    let (status, body) = app.send(Method::POST, &like_uri, Some(1), None).await;
    assert_eq!(status, StatusCode::OK);
    let liked: LikeResponse = serde_json::from_value(body).expect("like response");
    assert!(liked.changed);
    assert_eq!(liked.like_count, 1);

    let (_, body) = app.send(Method::POST, &like_uri, Some(1), None).await;
    let again: LikeResponse = serde_json::from_value(body).expect("like response");
    assert!(!again.changed);
    assert_eq!(again.like_count, 1);

    let (status, body) = app.send(Method::GET, "/api/v1/items", Some(1), None).await;
    assert_eq!(status, StatusCode::OK);
    let mine: ItemList = serde_json::from_value(body).expect("list");
    assert_eq!(mine.items.len(), 1);
    assert!(mine.items[0].user_has_liked);
    assert_eq!(mine.items[0].like_count, 1);

    let (_, body) = app.send(Method::GET, "/api/v1/items", Some(2), None).await;
    let theirs: ItemList = serde_json::from_value(body).expect("list");
    assert!(!theirs.items[0].user_has_liked);
    assert_eq!(theirs.items[0].like_count, 1);

    let item_uri = format!("/api/v1/items/{}", created.id);
    let (status, body) = app
        .send(
            Method::PUT,
            &item_uri,
            Some(1),
            Some(serde_json::json!({ "title": "Renamed todo", "completed": true })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let updated: Item = serde_json::from_value(body).expect("item");
    assert_eq!(updated.title, "Renamed todo");
    assert!(updated.completed);
    assert_eq!(updated.like_count, 1);
    assert!(updated.user_has_liked);

    let (status, body) = app.send(Method::DELETE, &like_uri, Some(1), None).await;
    assert_eq!(status, StatusCode::OK);
    let unliked: LikeResponse = serde_json::from_value(body).expect("unlike response");
    assert!(unliked.changed);
    assert_eq!(unliked.like_count, 0);

    let (status, _) = app.send(Method::DELETE, &item_uri, Some(1), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app.send(Method::DELETE, &item_uri, Some(1), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn short_title_is_rejected() {
    let app = TestApp::new();
    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/items",
            Some(1),
            Some(serde_json::json!({ "title": "  ab  " })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let app = TestApp::new();
    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/items",
            Some(1),
            Some(serde_json::json!({ "name": "no title field" })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn liking_unknown_item_is_not_found() {
    let app = TestApp::new();
    let (status, _) = app
        .send(Method::POST, "/api/v1/items/9999/like", Some(1), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_probe_reports_no_content() {
    let app = TestApp::new();
    let (status, _) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn cors_preflight_allows_configured_origin() {
    let app = TestApp::new();
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/v1/items")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "authorization,content-type")
        .body(Body::empty())
        .expect("request should build");

    let response = app.router.clone().oneshot(request).await.expect("respond");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|value| value.to_str().ok()),
        Some("http://localhost:3000")
    );
}
