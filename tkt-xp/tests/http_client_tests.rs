//! HTTP client integration tests
//!
//! `HttpBackend` and `HttpDatafileSource` talk to a stub axum server bound
//! to an ephemeral local port.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tkt_common::Error;
use tkt_xp::agent::{AgentState, ClientSyncAgent, HomescreenBackend, HttpBackend};
use tkt_xp::attributes::{Category, UserId};
use tkt_xp::homescreen::{HomescreenModule, ModuleConfig, ModuleType, SortBy};
use tkt_xp::sync::{DatafileSource, HttpDatafileSource};

/// What the stub server saw and what it should answer
#[derive(Default)]
struct Stub {
    catalog_calls: AtomicUsize,
    /// Serve the error envelope from this catalog call on (1-based)
    catalog_fails_from: Option<usize>,
    homescreen_requests: Mutex<Vec<(String, Option<String>)>>,
    modules: Value,
}

fn catalog_json() -> Value {
    json!([
        {
            "id": "evt-1",
            "name": "Arena Night",
            "category": "concerts",
            "date": "2025-07-04T20:00:00Z",
            "venue": "Arena",
            "featured": true
        },
        {
            "id": "evt-2",
            "name": "Derby",
            "category": "sports",
            "date": "2025-07-05T18:00:00Z",
            "venue": "Stadium"
        },
        {
            "id": "evt-3",
            "name": "Broken",
            "category": "opera",
            "date": "2025-07-06T18:00:00Z"
        }
    ])
}

async fn catalog(State(stub): State<Arc<Stub>>) -> Json<Value> {
    let call = stub.catalog_calls.fetch_add(1, Ordering::SeqCst) + 1;
    match stub.catalog_fails_from {
        Some(from) if call >= from => Json(json!({"success": false, "error": "db down"})),
        _ => Json(catalog_json()),
    }
}

async fn homescreen(
    State(stub): State<Arc<Stub>>,
    Path(user_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    stub.homescreen_requests
        .lock()
        .unwrap()
        .push((user_id, query.get("operating_system").cloned()));
    Json(json!({
        "success": true,
        "data": stub.modules,
        "variationKey": "treatment",
        "enabled": true
    }))
}

fn stub_router(stub: Arc<Stub>) -> Router {
    Router::new()
        .route("/catalog", get(catalog))
        .route(
            "/catalog/envelope",
            get(|| async { Json(json!({"success": true, "data": catalog_json()})) }),
        )
        .route(
            "/catalog/error",
            get(|| async { Json(json!({"success": false, "error": "db down"})) }),
        )
        .route("/homescreen/:user_id", get(homescreen))
        .route(
            "/datafile",
            get(|| async { r#"{"revision":"77","experiments":[]}"# }),
        )
        .route(
            "/datafile/broken",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .route(
            "/datafile/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "{}"
            }),
        )
        .with_state(stub)
}

/// Serve on 127.0.0.1 with an OS-assigned port
async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn start_stub(stub: Stub) -> (SocketAddr, Arc<Stub>) {
    let stub = Arc::new(stub);
    let addr = serve(stub_router(Arc::clone(&stub))).await;
    (addr, stub)
}

fn backend(addr: SocketAddr, catalog_path: &str) -> HttpBackend {
    HttpBackend::new(
        format!("http://{}/", addr),
        format!("http://{}{}", addr, catalog_path),
        Duration::from_secs(2),
    )
    .unwrap()
}

fn user(id: &str) -> UserId {
    UserId::parse(id).unwrap()
}

#[tokio::test]
async fn test_catalog_accepts_list_and_data_envelope() {
    let (addr, _) = start_stub(Stub::default()).await;

    let bare = backend(addr, "/catalog").fetch_catalog().await.unwrap();
    let wrapped = backend(addr, "/catalog/envelope").fetch_catalog().await.unwrap();

    // The entry with an unknown category is skipped
    assert_eq!(bare.len(), 2);
    assert_eq!(bare, wrapped);
    assert_eq!(bare[0].category, Category::Concerts);
    assert!(bare[0].featured);
    assert!(!bare[1].featured);
}

#[tokio::test]
async fn test_catalog_error_envelope_is_failure() {
    let (addr, _) = start_stub(Stub::default()).await;

    let err = backend(addr, "/catalog/error").fetch_catalog().await.unwrap_err();
    assert!(matches!(err, Error::Parse(_)), "unexpected error: {:?}", err);
}

#[tokio::test]
async fn test_catalog_non_success_status_is_fetch_error() {
    let (addr, _) = start_stub(Stub::default()).await;

    let err = backend(addr, "/datafile/broken").fetch_catalog().await.unwrap_err();
    match err {
        Error::Fetch(msg) => assert!(msg.contains("500"), "{}", msg),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_homescreen_request_and_module_round_trip() {
    let modules = vec![
        HomescreenModule::new(
            0,
            ModuleType::HeroCarousel,
            ModuleConfig {
                length: Some(3),
                ..Default::default()
            },
        ),
        HomescreenModule::new(
            1,
            ModuleType::AllEvents,
            ModuleConfig {
                categories: Some(vec![Category::Sports, Category::Comedy]),
                sort_by: Some(SortBy::DateDesc),
                length: None,
            },
        ),
    ];
    let (addr, stub) = start_stub(Stub {
        modules: serde_json::to_value(&modules).unwrap(),
        ..Default::default()
    })
    .await;

    let payload = backend(addr, "/catalog")
        .fetch_homescreen(&user("user 7/a"), "iOS")
        .await
        .unwrap();

    assert_eq!(payload.modules, modules);
    assert_eq!(payload.variation_key, "treatment");
    assert!(payload.enabled);

    // The user id is a single escaped path segment; the OS goes in the query
    let requests = stub.homescreen_requests.lock().unwrap().clone();
    assert_eq!(
        requests,
        vec![("user 7/a".to_string(), Some("iOS".to_string()))]
    );
}

#[tokio::test]
async fn test_homescreen_unusable_modules_fall_back_to_defaults() {
    let (addr, _) = start_stub(Stub {
        modules: json!({"not": "a list"}),
        ..Default::default()
    })
    .await;

    let payload = backend(addr, "/catalog")
        .fetch_homescreen(&user("u1"), "android")
        .await
        .unwrap();
    assert_eq!(payload.modules, tkt_xp::homescreen::default_modules());
    assert_eq!(payload.variation_key, "treatment");
}

#[tokio::test]
async fn test_agent_keeps_snapshot_when_catalog_returns_error_envelope() {
    let (addr, stub) = start_stub(Stub {
        catalog_fails_from: Some(2),
        modules: json!([{"type": "all_events"}]),
        ..Default::default()
    })
    .await;
    let agent = ClientSyncAgent::new(Arc::new(backend(addr, "/catalog")), user("u1"), "web");

    agent.start();
    let mut rx = agent.subscribe();
    tokio::time::timeout(Duration::from_secs(2), async {
        while rx.borrow_and_update().state != AgentState::Ready {
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("first fetch completes");
    assert_eq!(agent.view().snapshot.unwrap().catalog_size, 2);

    agent.notify_config_changed();
    tokio::time::timeout(Duration::from_secs(2), async {
        while agent.is_loading() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("second fetch completes");

    let view = agent.view();
    assert_eq!(stub.catalog_calls.load(Ordering::SeqCst), 2);
    assert_eq!(view.state, AgentState::Ready);
    assert!(view.is_stale());
    assert_eq!(view.snapshot.unwrap().catalog_size, 2);
}

#[tokio::test]
async fn test_datafile_source_returns_body() {
    let (addr, _) = start_stub(Stub::default()).await;
    let source =
        HttpDatafileSource::new(format!("http://{}/datafile", addr), Duration::from_secs(2))
            .unwrap();

    let bytes = source.fetch().await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["revision"], "77");
    assert!(source.describe().ends_with("/datafile"));
}

#[tokio::test]
async fn test_datafile_source_maps_server_error() {
    let (addr, _) = start_stub(Stub::default()).await;
    let source = HttpDatafileSource::new(
        format!("http://{}/datafile/broken", addr),
        Duration::from_secs(2),
    )
    .unwrap();

    match source.fetch().await {
        Err(Error::Fetch(msg)) => assert!(msg.contains("returned 500"), "{}", msg),
        other => panic!("expected fetch error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_datafile_source_times_out() {
    let (addr, _) = start_stub(Stub::default()).await;
    let source = HttpDatafileSource::new(
        format!("http://{}/datafile/slow", addr),
        Duration::from_millis(100),
    )
    .unwrap();

    let started = std::time::Instant::now();
    let result = source.fetch().await;
    assert!(matches!(result, Err(Error::Fetch(_))), "{:?}", result);
    assert!(started.elapsed() < Duration::from_secs(2));
}
