// tests/api_http.rs
//
// HTTP-level tests for the public Router via tower::ServiceExt::oneshot.
// Inference-backed routes talk to a throwaway axum server on 127.0.0.1:0.
//
// Covered:
// - GET /health
// - GET /api/news (configured, unconfigured, upstream failure)
// - GET /api/news over a real HTTP feed (ok, non-2xx, lossy, cut-off body)
// - POST /api/arena/debate (validation + streamed debate)
// - POST /api/arena/debate-stream (turns relayed live, termination event)
// - GET /api/models, POST /api/chat
// - /api/auth/* round trip

use std::sync::Arc;

use axum::{
    body::{self, Body},
    routing::{get, post},
    Json, Router,
};
use http::{header, Request, StatusCode};
use bytes::Bytes;
use futures::StreamExt as _;
use serde_json::{json, Value};
use tower::ServiceExt as _;

use meda_gateway::{
    api,
    config::AppConfig,
    news::{
        fetch_news,
        source::{FeedSource, FixtureFeed, HttpFeed},
    },
    AppError, AppResult, AppState,
};

const BODY_LIMIT: usize = 1024 * 1024;
const FEED_XML: &str = include_str!("fixtures/news_feed.xml");

fn test_config(inference_base_url: &str) -> AppConfig {
    AppConfig {
        jwt_secret: Some("test-secret".into()),
        inference_base_url: inference_base_url.to_string(),
        debate_timeout_secs: 5,
        ..AppConfig::default()
    }
}

fn test_state(inference_base_url: &str) -> AppState {
    AppState::from_config(test_config(inference_base_url))
        .expect("state")
        .with_news_source(Arc::new(FixtureFeed::from_fixture(FEED_XML)))
}

fn test_router() -> Router {
    api::router(test_state("http://127.0.0.1:9"))
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

fn post_json(uri: &str, payload: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("build request")
}

/// Serve a fake inference service and return its base URL.
async fn spawn_inference() -> String {
    async fn models() -> Json<Value> {
        Json(json!({ "models": ["llama-3.3-70b-versatile", "tiny"], "default": "llama-3.3-70b-versatile" }))
    }

    async fn chat(Json(req): Json<Value>) -> (StatusCode, Json<Value>) {
        if req["model"] == "nope" {
            return (StatusCode::BAD_REQUEST, Json(json!({ "detail": "bad model" })));
        }
        let last = req["messages"]
            .as_array()
            .and_then(|m| m.last())
            .and_then(|m| m["content"].as_str())
            .unwrap_or_default()
            .to_string();
        (
            StatusCode::OK,
            Json(json!({ "role": "assistant", "content": format!("echo: {last}") })),
        )
    }

    async fn debate() -> Body {
        // Frames are split mid-line and mid-character on purpose.
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: {\"role\":\"patient\",\"name\":\"Patient\",\"con")),
            Ok(Bytes::from_static(b"tent\":\"I feel dizzy \xc3")),
            Ok(Bytes::from_static(b"\xa9\"}\n\ndata: {\"role\":\"doctor\",\"name\":\"Dr. X\",\"content\":\"Check BP.\"}\n")),
            Ok(Bytes::from_static(b"data: {\"error\":\"slow model\"}\n")),
            Ok(Bytes::from_static(b"data: {\"role\":\"resident\",\"name\":\"R\",\"content\":\"Also glucose.\"}\n")),
            Ok(Bytes::from_static(b"data: [DONE]\n")),
        ];
        Body::from_stream(futures::stream::iter(chunks))
    }

    serve(
        Router::new()
            .route("/models", get(models))
            .route("/chat", post(chat))
            .route("/arena/debate-stream", post(debate)),
    )
    .await
}

/// Serve `app` on an ephemeral local port and return its base URL.
async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock upstream");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn health_returns_ok() {
    let req = Request::get("/health").body(Body::empty()).unwrap();
    let resp = test_router().oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn news_serves_extracted_items() {
    let req = Request::get("/api/news").body(Body::empty()).unwrap();
    let resp = test_router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let v = json_body(resp).await;
    let items = v["items"].as_array().expect("items array");
    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["source"], "World Health Organization");
    assert_eq!(items[0]["pubDate"], "Mon, 06 Oct 2025 07:30:00 GMT");
    assert_eq!(items[2]["source"], "Unknown Source");
}

#[tokio::test]
async fn news_without_feed_url_is_a_config_error() {
    let state = test_state("http://127.0.0.1:9").without_news_source();
    let req = Request::get("/api/news").body(Body::empty()).unwrap();
    let resp = api::router(state).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let v = json_body(resp).await;
    assert_eq!(v["error"], "NEWS_API_URL is not configured");
}

struct BrokenFeed;

#[async_trait::async_trait]
impl FeedSource for BrokenFeed {
    async fn fetch_text(&self) -> AppResult<String> {
        Err(AppError::upstream_fetch(
            meda_gateway::error::Upstream::News,
            "connection refused",
        ))
    }

    fn name(&self) -> &'static str {
        "broken"
    }
}

#[tokio::test]
async fn news_upstream_failure_hides_details() {
    let state = test_state("http://127.0.0.1:9").with_news_source(Arc::new(BrokenFeed));
    let req = Request::get("/api/news").body(Body::empty()).unwrap();
    let resp = api::router(state).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let v = json_body(resp).await;
    assert_eq!(v["error"], "Failed to fetch news");
}

#[tokio::test]
async fn debate_rejects_blank_symptoms() {
    let resp = test_router()
        .oneshot(post_json("/api/arena/debate", json!({ "symptoms": "   " })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn debate_with_unreachable_service_is_bad_gateway() {
    let resp = test_router()
        .oneshot(post_json("/api/arena/debate", json!({ "symptoms": "fever" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let v = json_body(resp).await;
    assert_eq!(v["error"], "AI service unavailable");
}

#[tokio::test]
async fn debate_collects_streamed_turns_into_columns() {
    let base = spawn_inference().await;
    let app = api::router(test_state(&base));
    let resp = app
        .oneshot(post_json(
            "/api/arena/debate",
            json!({ "symptoms": "dizzy after standing", "max_rounds": 2 }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let v = json_body(resp).await;
    let turns = v["turns"].as_array().expect("turns");
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[0]["role"], "patient");
    assert_eq!(turns[0]["content"], "I feel dizzy é");
    assert_eq!(v["doctor"][0]["name"], "Dr. X");
    assert_eq!(v["resident"][0]["content"], "Also glucose.");
    assert_eq!(v["termination"]["reason"], "sentinel");
    assert_eq!(v["error_frames"], 1);
    assert_eq!(v["malformed_frames"], 0);
}

#[tokio::test]
async fn models_and_chat_are_proxied() {
    let base = spawn_inference().await;
    let app = api::router(test_state(&base));

    let resp = app
        .clone()
        .oneshot(Request::get("/api/models").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = json_body(resp).await;
    assert_eq!(v["default"], "llama-3.3-70b-versatile");

    let resp = app
        .clone()
        .oneshot(post_json(
            "/api/chat",
            json!({ "messages": [{ "role": "user", "content": "is a fever of 38C bad?" }] }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = json_body(resp).await;
    assert_eq!(v["role"], "assistant");
    assert_eq!(v["content"], "echo: is a fever of 38C bad?");

    let resp = app
        .oneshot(post_json(
            "/api/chat",
            json!({ "messages": [{ "role": "user", "content": "hi" }], "model": "nope" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp).await["error"], "Invalid model");
}

fn session_cookie(resp: &axum::response::Response) -> String {
    let raw = resp
        .headers()
        .get(header::SET_COOKIE)
        .expect("set-cookie")
        .to_str()
        .expect("ascii cookie");
    raw.split(';').next().unwrap_or_default().to_string()
}

#[tokio::test]
async fn account_round_trip() {
    let app = test_router();

    let resp = app
        .clone()
        .oneshot(post_json(
            "/api/auth/signup",
            json!({ "name": "Ana", "email": " Ana@Example.org ", "password": "hunter22" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let cookie = session_cookie(&resp);
    assert!(cookie.starts_with("token="));
    let v = json_body(resp).await;
    assert_eq!(v["user"]["email"], "ana@example.org");
    assert!(v["user"].get("password_hash").is_none());

    // Same email again.
    let resp = app
        .clone()
        .oneshot(post_json(
            "/api/auth/signup",
            json!({ "name": "Ana 2", "email": "ana@example.org", "password": "another1" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .clone()
        .oneshot(post_json(
            "/api/auth/login",
            json!({ "email": "ana@example.org", "password": "wrong-pass" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .clone()
        .oneshot(post_json(
            "/api/auth/login",
            json!({ "email": "ana@example.org", "password": "hunter22" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie_login = session_cookie(&resp);
    assert!(cookie_login.starts_with("token="));

    let me = Request::get("/api/auth/me")
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(me).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["name"], "Ana");

    let profile = Request::builder()
        .method("PATCH")
        .uri("/api/auth/profile")
        .header(header::COOKIE, &cookie)
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "name": "Ana B", "email": "ana.b@example.org" }).to_string(),
        ))
        .unwrap();
    let resp = app.clone().oneshot(profile).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = json_body(resp).await;
    assert_eq!(v["message"], "Profile updated successfully");
    assert_eq!(v["user"]["email"], "ana.b@example.org");

    let del = Request::builder()
        .method("DELETE")
        .uri("/api/auth/delete")
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(del).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(session_cookie(&resp).starts_with("token="));

    // Token still verifies, but the user is gone.
    let me = Request::get("/api/auth/me")
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(me).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn protected_routes_need_a_valid_cookie() {
    let app = test_router();

    let resp = app
        .clone()
        .oneshot(Request::get("/api/auth/me").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let forged = Request::get("/api/auth/me")
        .header(header::COOKIE, "token=not.a.jwt")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(forged).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_clears_the_cookie() {
    let resp = test_router()
        .oneshot(post_json("/api/auth/logout", json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let raw = resp.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(raw.contains("Max-Age=0"), "{raw}");
}

/// Feed host with one healthy and three broken feeds.
async fn spawn_feed_host() -> String {
    async fn ok() -> &'static str {
        FEED_XML
    }

    async fn unavailable() -> (StatusCode, &'static str) {
        (StatusCode::SERVICE_UNAVAILABLE, "try later")
    }

    async fn latin1() -> Vec<u8> {
        // Windows-1252 'é' (0xE9) is not UTF-8.
        b"<item><title>Caf\xe9 study</title><link>https://x/cafe</link></item>".to_vec()
    }

    async fn truncated() -> Body {
        // Headers and the first chunk go out, then the connection drops.
        let head = futures::stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(
            b"<rss><channel><item><title>cut",
        ))]);
        let reset = futures::stream::once(async {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "gone"))
        });
        Body::from_stream(head.chain(reset))
    }

    serve(
        Router::new()
            .route("/ok.xml", get(ok))
            .route("/down.xml", get(unavailable))
            .route("/latin1.xml", get(latin1))
            .route("/truncated.xml", get(truncated)),
    )
    .await
}

#[tokio::test]
async fn http_feed_success_and_failure_paths() {
    let host = spawn_feed_host().await;

    let ok = HttpFeed::from_url(format!("{host}/ok.xml")).unwrap();
    let items = fetch_news(&ok).await.expect("healthy feed");
    assert_eq!(items.len(), 3);

    let down = HttpFeed::from_url(format!("{host}/down.xml")).unwrap();
    let err = fetch_news(&down).await.unwrap_err();
    assert!(matches!(err, AppError::UpstreamFetch { .. }), "{err:?}");

    // Undecodable bytes are replaced, not fatal.
    let latin1 = HttpFeed::from_url(format!("{host}/latin1.xml")).unwrap();
    let items = fetch_news(&latin1).await.expect("lossy feed");
    assert_eq!(items.len(), 1);
    assert!(items[0].title.starts_with("Caf"));

    let cut = HttpFeed::from_url(format!("{host}/truncated.xml")).unwrap();
    let err = fetch_news(&cut).await.unwrap_err();
    assert!(matches!(err, AppError::UpstreamUnreadable { .. }), "{err:?}");
}

#[tokio::test]
async fn news_route_over_http_feed_reports_one_message() {
    let host = spawn_feed_host().await;

    for (path, status) in [
        ("ok.xml", StatusCode::OK),
        ("down.xml", StatusCode::INTERNAL_SERVER_ERROR),
        ("truncated.xml", StatusCode::INTERNAL_SERVER_ERROR),
    ] {
        let feed = HttpFeed::from_url(format!("{host}/{path}")).unwrap();
        let state = test_state("http://127.0.0.1:9").with_news_source(Arc::new(feed));
        let req = Request::get("/api/news").body(Body::empty()).unwrap();
        let resp = api::router(state).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), status, "{path}");
        let v = json_body(resp).await;
        if status.is_success() {
            assert_eq!(v["items"].as_array().map(Vec::len), Some(3));
        } else {
            assert_eq!(v["error"], "Failed to fetch news", "{path}");
        }
    }
}

/// Inference service that sends one turn and then never finishes the body.
async fn spawn_stalling_inference() -> String {
    async fn debate() -> Body {
        let first = futures::stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(
            b"data: {\"role\":\"doctor\",\"name\":\"Dr. X\",\"content\":\"first turn\"}\n",
        ))]);
        Body::from_stream(first.chain(futures::stream::pending()))
    }

    serve(Router::new().route("/arena/debate-stream", post(debate))).await
}

#[tokio::test]
async fn debate_stream_relays_turns_before_the_upstream_finishes() {
    let base = spawn_stalling_inference().await;
    let state = AppState::from_config(AppConfig {
        debate_timeout_secs: 60,
        ..test_config(&base)
    })
    .unwrap();

    let resp = api::router(state)
        .oneshot(post_json("/api/arena/debate-stream", json!({ "symptoms": "chest pain" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let ctype = resp.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(ctype.starts_with("text/event-stream"), "{ctype}");

    let mut body = resp.into_body().into_data_stream();
    let mut seen = String::new();
    let got_turn = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while let Some(chunk) = body.next().await {
            seen.push_str(&String::from_utf8_lossy(&chunk.expect("sse chunk")));
            if seen.contains("first turn") {
                return true;
            }
        }
        false
    })
    .await;
    assert_eq!(got_turn, Ok(true), "no turn within 5s; got {seen:?}");
    assert!(seen.contains("event: turn"), "{seen}");
    assert!(!seen.contains("event: termination"), "{seen}");
}

#[tokio::test]
async fn debate_stream_ends_with_a_termination_event() {
    let base = spawn_inference().await;
    let resp = api::router(test_state(&base))
        .oneshot(post_json("/api/arena/debate-stream", json!({ "symptoms": "dizzy" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert_eq!(text.matches("event: turn").count(), 3, "{text}");
    assert_eq!(text.matches("event: termination").count(), 1, "{text}");
    assert!(text.contains("I feel dizzy é"), "{text}");

    let last = text
        .split("\n\n")
        .filter(|e| e.contains("event: termination"))
        .last()
        .expect("termination event");
    let data = last
        .lines()
        .find_map(|l| l.strip_prefix("data: "))
        .expect("termination data");
    let v: Value = serde_json::from_str(data).unwrap();
    assert_eq!(v["termination"]["reason"], "sentinel");
    assert_eq!(v["turns"], 3);
    assert_eq!(v["error_frames"], 1);
}

#[tokio::test]
async fn debate_stream_validates_before_streaming() {
    let resp = test_router()
        .oneshot(post_json("/api/arena/debate-stream", json!({ "symptoms": "" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = test_router()
        .oneshot(post_json("/api/arena/debate-stream", json!({ "symptoms": "cough" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
}
