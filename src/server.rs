//! HTTP server for webhook ingestion and archive queries.
//!
//! Routes:
//! - `POST /ifttt/twitter` - signed webhook ingestion
//! - `GET /tweets/latest` - most recent tweets
//! - `GET /tweets/search` - keyword search (`from:` prefix matches user names)
//! - `GET /tweets/semantic-search` - embedding similarity search
//! - `GET /health` - liveness probe
//! - `GET /` - service banner

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ring::hmac;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::config::Config;
use crate::embedder::HashEmbedder;
use crate::error::IftttwhError;
use crate::model::{IncomingTweet, InsertOutcome};
use crate::storage::Storage;

/// Shared state for all request handlers.
pub struct AppState {
    /// rusqlite connections are not Sync, so the storage sits behind a mutex.
    pub storage: Mutex<Storage>,
    pub embedder: HashEmbedder,
    pub config: Config,
}

impl AppState {
    #[must_use]
    pub fn new(storage: Storage, config: Config) -> Self {
        Self {
            storage: Mutex::new(storage),
            embedder: HashEmbedder::default(),
            config,
        }
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/ifttt/twitter", post(receive_webhook))
        .route("/tweets/latest", get(latest_tweets))
        .route("/tweets/search", get(search_tweets))
        .route("/tweets/semantic-search", get(semantic_search))
        .with_state(state)
}

/// Bind and serve until shutdown.
pub async fn serve(state: Arc<AppState>, host: &str, port: u16) -> anyhow::Result<()> {
    use anyhow::Context;

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .context("Invalid host:port")?;

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {host}:{port}"))?;
    info!("Listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install Ctrl+C handler: {e}");
        return;
    }
    info!("Shutdown signal received");
}

/// Verify an IFTTT-style `X-Signature` header against the request body.
///
/// The header carries `sha256=<hex hmac>` computed over the raw body with
/// the shared secret. Comparison is constant-time via `ring::hmac::verify`.
pub fn verify_signature(secret: &str, body: &[u8], header: Option<&str>) -> bool {
    let Some(value) = header else {
        return false;
    };
    let Some(hex_sig) = value.strip_prefix("sha256=") else {
        return false;
    };
    let Some(sig_bytes) = decode_hex(hex_sig) else {
        return false;
    };

    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    hmac::verify(&key, body, &sig_bytes).is_ok()
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

async fn index() -> impl IntoResponse {
    Json(json!({
        "service": "iftttwh",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "POST /ifttt/twitter",
            "GET /tweets/latest",
            "GET /tweets/search",
            "GET /tweets/semantic-search",
            "GET /health",
        ],
    }))
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    let count = {
        let storage = state.storage.lock().expect("storage lock poisoned");
        storage.count_tweets()
    };
    match count {
        Ok(n) => Json(json!({ "status": "ok", "tweets": n })).into_response(),
        Err(e) => {
            warn!("Health check failed: {e}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "error" })),
            )
                .into_response()
        }
    }
}

async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if state.config.security.require_signature {
        let header = headers
            .get("x-signature")
            .and_then(|v| v.to_str().ok());
        if !verify_signature(&state.config.security.secret_key, &body, header) {
            warn!("Rejected webhook with missing or invalid signature");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": IftttwhError::InvalidSignature.to_string() })),
            )
                .into_response();
        }
    }

    let incoming: IncomingTweet = match serde_json::from_slice(&body) {
        Ok(t) => t,
        Err(e) => {
            let err = IftttwhError::invalid_payload(e.to_string());
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": err.to_string() })))
                .into_response();
        }
    };

    if incoming.user_name.is_empty() && incoming.text.is_empty() {
        let err = IftttwhError::invalid_payload("payload carries neither UserName nor Text");
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": err.to_string() })))
            .into_response();
    }

    let result = {
        let storage = state.storage.lock().expect("storage lock poisoned");
        storage
            .insert_tweet(&incoming)
            .and_then(|outcome| {
                if let InsertOutcome::Inserted(id) = outcome {
                    let embedding = state.embedder.embed(&incoming.text);
                    storage.store_embedding(id, &embedding)?;
                }
                Ok(outcome)
            })
    };

    match result {
        Ok(InsertOutcome::Inserted(id)) => {
            info!("Stored tweet {id} from @{}", incoming.user_name);
            Json(json!({ "status": "stored", "id": id })).into_response()
        }
        Ok(InsertOutcome::Duplicate) => {
            Json(json!({ "status": "duplicate" })).into_response()
        }
        Err(e) => {
            warn!("Failed to store tweet: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "storage failure" })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    query: Option<String>,
    limit: Option<usize>,
}

async fn latest_tweets(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Response {
    let limit = state.config.clamp_limit(query.limit);
    let result = {
        let storage = state.storage.lock().expect("storage lock poisoned");
        storage.latest_tweets(limit)
    };
    match result {
        Ok(tweets) => Json(json!({ "count": tweets.len(), "tweets": tweets })).into_response(),
        Err(e) => internal_error(&e),
    }
}

async fn search_tweets(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> Response {
    let Some(q) = params.query.filter(|q| !q.trim().is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "missing 'query' parameter" })),
        )
            .into_response();
    };
    let limit = state.config.clamp_limit(params.limit);
    let result = {
        let storage = state.storage.lock().expect("storage lock poisoned");
        storage.search_tweets(&q, limit)
    };
    match result {
        Ok(tweets) => {
            Json(json!({ "query": q, "count": tweets.len(), "tweets": tweets })).into_response()
        }
        Err(e) => internal_error(&e),
    }
}

async fn semantic_search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> Response {
    let Some(q) = params.query.filter(|q| !q.trim().is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "missing 'query' parameter" })),
        )
            .into_response();
    };
    let limit = state.config.clamp_limit(params.limit);
    let result = {
        let storage = state.storage.lock().expect("storage lock poisoned");
        storage.semantic_search(&state.embedder, &q, limit)
    };
    match result {
        Ok(hits) => {
            Json(json!({ "query": q, "count": hits.len(), "results": hits })).into_response()
        }
        Err(e) => internal_error(&e),
    }
}

fn internal_error(e: &IftttwhError) -> Response {
    warn!("Request failed: {e}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal error" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_state(require_signature: bool) -> Arc<AppState> {
        let storage = Storage::open_memory().unwrap();
        let mut config = Config::default();
        config.security.secret_key = "test_secret".to_string();
        config.security.require_signature = require_signature;
        Arc::new(AppState::new(storage, config))
    }

    fn sign(secret: &str, body: &[u8]) -> String {
        let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
        let tag = hmac::sign(&key, body);
        let hex: String = tag.as_ref().iter().map(|b| format!("{b:02x}")).collect();
        format!("sha256={hex}")
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn sample_payload() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "UserName": "rustlang",
            "LinkToTweet": "https://twitter.com/rustlang/status/1",
            "Text": "Announcing Rust 1.85",
            "CreatedAt": "September 08, 2025 at 02:39PM",
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn webhook_stores_tweet() {
        let state = test_state(false);
        let app = router(state.clone());

        let response = app
            .oneshot(
                Request::post("/ifttt/twitter")
                    .header("content-type", "application/json")
                    .body(Body::from(sample_payload()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "stored");

        let storage = state.storage.lock().unwrap();
        assert_eq!(storage.count_tweets().unwrap(), 1);
    }

    #[tokio::test]
    async fn webhook_reports_duplicates() {
        let state = test_state(false);

        for expected in ["stored", "duplicate"] {
            let app = router(state.clone());
            let response = app
                .oneshot(
                    Request::post("/ifttt/twitter")
                        .body(Body::from(sample_payload()))
                        .unwrap(),
                )
                .await
                .unwrap();
            let json = body_json(response).await;
            assert_eq!(json["status"], expected);
        }
    }

    #[tokio::test]
    async fn webhook_rejects_missing_signature() {
        let state = test_state(true);
        let app = router(state);

        let response = app
            .oneshot(
                Request::post("/ifttt/twitter")
                    .body(Body::from(sample_payload()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn webhook_rejects_bad_signature() {
        let state = test_state(true);
        let app = router(state);

        let response = app
            .oneshot(
                Request::post("/ifttt/twitter")
                    .header("x-signature", "sha256=deadbeef")
                    .body(Body::from(sample_payload()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn webhook_accepts_valid_signature() {
        let state = test_state(true);
        let app = router(state);
        let body = sample_payload();
        let sig = sign("test_secret", &body);

        let response = app
            .oneshot(
                Request::post("/ifttt/twitter")
                    .header("x-signature", sig)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn webhook_rejects_malformed_json() {
        let state = test_state(false);
        let app = router(state);

        let response = app
            .oneshot(
                Request::post("/ifttt/twitter")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn latest_returns_newest_first() {
        let state = test_state(false);
        {
            let storage = state.storage.lock().unwrap();
            for (i, date) in ["2025-01-01T00:00:00Z", "2025-06-01T00:00:00Z"]
                .iter()
                .enumerate()
            {
                let incoming = IncomingTweet {
                    user_name: "a".to_string(),
                    link_to_tweet: format!("https://t.co/{i}"),
                    text: format!("tweet {i}"),
                    created_at: (*date).to_string(),
                };
                storage.insert_tweet(&incoming).unwrap();
            }
        }

        let app = router(state);
        let response = app
            .oneshot(Request::get("/tweets/latest").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["count"], 2);
        assert_eq!(json["tweets"][0]["text"], "tweet 1");
    }

    #[tokio::test]
    async fn search_requires_query() {
        let state = test_state(false);
        let app = router(state);

        let response = app
            .oneshot(Request::get("/tweets/search").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn search_matches_text_and_user_prefix() {
        let state = test_state(false);
        {
            let storage = state.storage.lock().unwrap();
            let incoming = IncomingTweet {
                user_name: "rustlang".to_string(),
                link_to_tweet: "https://t.co/x".to_string(),
                text: "borrow checker news".to_string(),
                created_at: String::new(),
            };
            storage.insert_tweet(&incoming).unwrap();
        }

        let app = router(state.clone());
        let response = app
            .oneshot(
                Request::get("/tweets/search?query=borrow")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["count"], 1);

        let app = router(state);
        let response = app
            .oneshot(
                Request::get("/tweets/search?query=from:rustlang")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["count"], 1);
    }

    #[tokio::test]
    async fn semantic_search_ranks_by_similarity() {
        let state = test_state(false);
        {
            let storage = state.storage.lock().unwrap();
            let texts = ["rust async runtime tokio", "gardening tips for spring"];
            for (i, text) in texts.iter().enumerate() {
                let incoming = IncomingTweet {
                    user_name: "u".to_string(),
                    link_to_tweet: format!("https://t.co/{i}"),
                    text: (*text).to_string(),
                    created_at: String::new(),
                };
                if let InsertOutcome::Inserted(id) = storage.insert_tweet(&incoming).unwrap() {
                    let embedding = state.embedder.embed(text);
                    storage.store_embedding(id, &embedding).unwrap();
                }
            }
        }

        let app = router(state);
        let response = app
            .oneshot(
                Request::get("/tweets/semantic-search?query=rust%20tokio%20async&limit=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["count"], 1);
        assert_eq!(json["results"][0]["text"], "rust async runtime tokio");
    }

    #[tokio::test]
    async fn health_reports_tweet_count() {
        let state = test_state(false);
        let app = router(state);

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["tweets"], 0);
    }

    #[test]
    fn signature_verification_round_trips() {
        let body = b"payload bytes";
        let sig = sign("s3cret", body);
        assert!(verify_signature("s3cret", body, Some(&sig)));
        assert!(!verify_signature("wrong", body, Some(&sig)));
        assert!(!verify_signature("s3cret", body, None));
        assert!(!verify_signature("s3cret", body, Some("md5=abc")));
        assert!(!verify_signature("s3cret", body, Some("sha256=zz")));
    }
}
