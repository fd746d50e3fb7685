//! HTTP server for artifact retrieval and administration
//!
//! Provides /health, /{handler}/{*key}, /delete/{*key}, /init, /empty,
//! /remove and /reinit.

use crate::types::HealthResponse;
use axum::{
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use external_file_store::{
    CacheDirective, Protocol, Request, Response as ProtocolResponse, Status, Store,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";
const EXPIRED: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// Shared state for the HTTP server
pub struct ServerState {
    pub store: Store,
    pub protocol: Protocol,
    /// Mount point of the retrieval route, without leading or trailing slash.
    pub handler_path: String,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(store: Store, protocol: Protocol, handler_path: impl Into<String>) -> Self {
        Self {
            store,
            protocol,
            handler_path: handler_path.into(),
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    let retrieval_route = format!("/{}/{{*key}}", state.handler_path);

    Router::new()
        .route("/health", get(health))
        .route(&retrieval_route, get(retrieve))
        .route("/delete/{*key}", get(delete).post(delete))
        .route("/init", get(init).post(init))
        .route("/empty", get(empty).post(empty))
        .route("/remove", get(remove).post(remove))
        .route("/reinit", get(reinit).post(reinit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds().max(0) as u64;
    let ready = state.store.is_ready();
    let artifacts = if ready {
        state.store.count().await.ok()
    } else {
        None
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        backend: state.store.kind().to_string(),
        store: state.store.store_name().to_string(),
        ready,
        artifacts,
    })
}

/// Serve an artifact. A leading `ignorelgvty/` segment keeps single-use
/// artifacts in place.
async fn retrieve(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    let request = Request::retrieval(&key, query.as_deref());
    into_http(state.protocol.handle(&state.store, request).await)
}

async fn delete(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    let key = key.trim_start_matches('/');
    let key = match query.filter(|q| !q.is_empty()) {
        Some(query) => format!("{}?{}", key, query),
        None => key.to_string(),
    };
    administer(&state, Request::Delete { key }).await
}

async fn init(State(state): State<SharedState>) -> Response {
    administer(&state, Request::Init).await
}

async fn empty(State(state): State<SharedState>) -> Response {
    administer(&state, Request::Empty).await
}

async fn remove(State(state): State<SharedState>) -> Response {
    administer(&state, Request::Remove).await
}

async fn reinit(State(state): State<SharedState>) -> Response {
    administer(&state, Request::ReInit).await
}

async fn administer(state: &ServerState, request: Request) -> Response {
    into_http(state.protocol.handle(&state.store, request).await)
}

fn into_http(response: ProtocolResponse) -> Response {
    let mut headers = cache_headers(&response.cache);

    match response.status {
        Status::Ok => {
            if let Some(value) = response
                .content_type
                .as_deref()
                .and_then(|ct| HeaderValue::from_str(ct).ok())
            {
                headers.insert(header::CONTENT_TYPE, value);
            }
            (StatusCode::OK, headers, response.body).into_response()
        }
        Status::NotFound => (StatusCode::NOT_FOUND, headers).into_response(),
        Status::Error => (
            StatusCode::INTERNAL_SERVER_ERROR,
            headers,
            Json(ErrorResponse {
                error: "Internal server error".to_string(),
            }),
        )
            .into_response(),
    }
}

fn cache_headers(directive: &CacheDirective) -> HeaderMap {
    let mut headers = HeaderMap::new();
    match directive {
        CacheDirective::Public { max_age, expires } => {
            let cache_control = format!("public, max-age={}", max_age.as_secs());
            if let Ok(value) = HeaderValue::from_str(&cache_control) {
                headers.insert(header::CACHE_CONTROL, value);
            }
            if let Ok(value) = HeaderValue::from_str(&expires.format(HTTP_DATE_FORMAT).to_string())
            {
                headers.insert(header::EXPIRES, value);
            }
        }
        CacheDirective::NoCache => {
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        }
        CacheDirective::NoStore => {
            headers.insert(
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-cache, no-store"),
            );
            headers.insert(header::EXPIRES, HeaderValue::from_static(EXPIRED));
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use chrono::TimeZone;
    use external_file_store::{Artifact, ConsumptionGuarantee, FileBackend, Longevity, ManualClock};
    use std::path::Path as FsPath;
    use std::time::Duration;
    use tempfile::tempdir;
    use tower::ServiceExt;

    async fn create_test_state(dir: &FsPath) -> SharedState {
        let store = Store::new(FileBackend::in_root(dir));
        store.init().await.unwrap();
        Arc::new(ServerState::new(store, Protocol::default(), "files"))
    }

    async fn send(router: Router, method: &str, uri: &str) -> Response {
        router
            .oneshot(
                HttpRequest::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path()).await;
        let router = create_router(state);

        let response = send(router, "GET", "/health").await;
        assert_eq!(response.status(), StatusCode::OK);

        let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["backend"], "file");
        assert_eq!(json["ready"], true);
        assert_eq!(json["artifacts"], 0);
        assert!(json["uptime_secs"].as_u64().is_some());
    }

    #[tokio::test]
    async fn test_single_use_artifact_is_served_once() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path()).await;
        state
            .store
            .add_or_update(
                &Artifact::new("bundle.js", "alert(1)", "text/javascript")
                    .with_longevity(Longevity::SingleUse),
            )
            .await
            .unwrap();
        let router = create_router(state);

        let response = send(router.clone(), "GET", "/files/bundle.js").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/javascript");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
        assert_eq!(body_bytes(response).await, b"alert(1)");

        let response = send(router, "GET", "/files/bundle.js").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_ignore_longevity_segment() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path()).await;
        state
            .store
            .add_or_update(
                &Artifact::new("bundle.js", "alert(1)", "text/javascript")
                    .with_longevity(Longevity::SingleUse),
            )
            .await
            .unwrap();
        let router = create_router(state);

        for _ in 0..2 {
            let response = send(router.clone(), "GET", "/files/ignorelgvty/bundle.js").await;
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = send(router, "GET", "/files/bundle.js").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_query_string_is_part_of_key() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path()).await;
        state
            .store
            .add_or_update(&Artifact::new("site.css?h=abc", "a{}", "text/css"))
            .await
            .unwrap();
        let router = create_router(state);

        let response = send(router.clone(), "GET", "/files/site.css?h=abc").await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(router, "GET", "/files/site.css").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_public_cache_headers() {
        let dir = tempdir().unwrap();
        let store = Store::new(FileBackend::in_root(dir.path()));
        store.init().await.unwrap();
        store
            .add_or_update(
                &Artifact::new("logo.svg", "<svg/>", "image/svg+xml")
                    .with_cache_for(Duration::from_secs(600)),
            )
            .await
            .unwrap();

        let now = Utc.with_ymd_and_hms(2024, 3, 5, 9, 30, 0).unwrap();
        let protocol = Protocol::new(ConsumptionGuarantee::AtLeastOnce)
            .with_clock(Arc::new(ManualClock::new(now)));
        let router = create_router(Arc::new(ServerState::new(store, protocol, "files")));

        let response = send(router, "GET", "/files/logo.svg").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "public, max-age=600"
        );
        assert_eq!(
            response.headers()[header::EXPIRES],
            "Tue, 05 Mar 2024 09:40:00 GMT"
        );
    }

    #[tokio::test]
    async fn test_admin_endpoints() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path()).await;
        state
            .store
            .add_or_update(&Artifact::new("a.js", "1", "text/javascript"))
            .await
            .unwrap();
        let router = create_router(state.clone());

        for (method, uri) in [
            ("POST", "/delete/a.js"),
            ("GET", "/delete/a.js"),
            ("GET", "/empty"),
            ("POST", "/reinit"),
            ("GET", "/remove"),
            ("GET", "/init"),
        ] {
            let response = send(router.clone(), method, uri).await;
            assert_eq!(response.status(), StatusCode::OK, "{} {}", method, uri);
            assert_eq!(
                response.headers()[header::CACHE_CONTROL],
                "no-cache, no-store"
            );
            assert_eq!(response.headers()[header::EXPIRES], EXPIRED);
            assert!(body_bytes(response).await.is_empty());
        }
        assert!(state.store.is_ready());
        assert_eq!(state.store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_nested_keys_are_not_found() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path()).await;
        state
            .store
            .add_or_update(&Artifact::new("a.js", "1", "text/javascript"))
            .await
            .unwrap();
        let router = create_router(state.clone());

        for uri in ["/files/sub/a.js", "/files/missing%2Fx.js"] {
            let response = send(router.clone(), "GET", uri).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
        }

        for uri in ["/delete/sub/a.js", "/delete/missing%2Fx.js"] {
            let response = send(router.clone(), "GET", uri).await;
            assert_eq!(response.status(), StatusCode::OK, "{}", uri);
        }
        assert!(state.store.get("a.js").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_uninitialized_store_is_a_server_error() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path()).await;
        let router = create_router(state);

        let response = send(router.clone(), "POST", "/remove").await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(router.clone(), "GET", "/files/a.js").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(json["error"], "Internal server error");

        let response = send(router.clone(), "GET", "/health").await;
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(json["ready"], false);
        assert!(json["artifacts"].is_null());

        let response = send(router, "GET", "/empty").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_custom_handler_path() {
        let dir = tempdir().unwrap();
        let store = Store::new(FileBackend::in_root(dir.path()));
        store.init().await.unwrap();
        store
            .add_or_update(&Artifact::new("a.js", "1", "text/javascript"))
            .await
            .unwrap();
        let router = create_router(Arc::new(ServerState::new(
            store,
            Protocol::default(),
            "static/js",
        )));

        let response = send(router.clone(), "GET", "/static/js/a.js").await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = send(router, "GET", "/files/a.js").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_server_state_new() {
        let dir = tempdir().unwrap();
        let state = ServerState::new(
            Store::new(FileBackend::in_root(dir.path())),
            Protocol::default(),
            "files",
        );

        let diff = (Utc::now() - state.started_at).num_seconds();
        assert!((0..5).contains(&diff));
    }
}
