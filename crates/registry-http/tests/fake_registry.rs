//! Runs the HTTP client against a fake Subscription Manager served by axum.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use serde_json::{Value, json};
use swim_registry::{RegistryClient, SubscriptionRecord, TopicRecord};
use swim_registry_http::{HttpRegistryClient, HttpRegistryClientOptions};
use tokio::net::TcpListener;

// base64("user:pass")
const EXPECTED_AUTH: &str = "Basic dXNlcjpwYXNz";

#[derive(Clone, Default)]
struct Fake {
    next_id: Arc<Mutex<u64>>,
    subscriptions: Arc<Mutex<Vec<SubscriptionRecord>>>,
    topics: Arc<Mutex<Vec<TopicRecord>>>,
}

impl Fake {
    fn next_id(&self) -> u64 {
        let mut id = self.next_id.lock().unwrap();
        *id += 1;
        *id
    }
}

fn error(status: StatusCode, detail: &str) -> Response {
    (status, Json(json!({ "detail": detail }))).into_response()
}

fn authorized(headers: &HeaderMap) -> Result<(), Response> {
    match headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        Some(EXPECTED_AUTH) => Ok(()),
        _ => Err(error(StatusCode::UNAUTHORIZED, "Invalid credentials")),
    }
}

async fn ping(headers: HeaderMap) -> Response {
    match authorized(&headers) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(response) => response,
    }
}

async fn list_topics(State(fake): State<Fake>, headers: HeaderMap) -> Response {
    if let Err(response) = authorized(&headers) {
        return response;
    }
    Json(fake.topics.lock().unwrap().clone()).into_response()
}

async fn create_topic(
    State(fake): State<Fake>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(response) = authorized(&headers) {
        return response;
    }
    let name = body["name"].as_str().unwrap_or_default().to_string();
    if fake.topics.lock().unwrap().iter().any(|t| t.name == name) {
        return error(StatusCode::CONFLICT, "Topic with this name already exists");
    }
    let topic = TopicRecord {
        id: fake.next_id(),
        name,
    };
    fake.topics.lock().unwrap().push(topic.clone());
    (StatusCode::CREATED, Json(topic)).into_response()
}

async fn delete_topic(
    State(fake): State<Fake>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Response {
    if let Err(response) = authorized(&headers) {
        return response;
    }
    let mut topics = fake.topics.lock().unwrap();
    let before = topics.len();
    topics.retain(|t| t.id != id);
    if topics.len() == before {
        return error(StatusCode::NOT_FOUND, "Topic not found");
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn list_subscriptions(
    State(fake): State<Fake>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if let Err(response) = authorized(&headers) {
        return response;
    }
    let subscriptions: Vec<SubscriptionRecord> = fake
        .subscriptions
        .lock()
        .unwrap()
        .iter()
        .filter(|s| query.get("queue").is_none_or(|q| &s.queue == q))
        .cloned()
        .collect();
    Json(subscriptions).into_response()
}

async fn create_subscription(
    State(fake): State<Fake>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(response) = authorized(&headers) {
        return response;
    }
    let topic_id = body["topic_id"].as_u64().unwrap_or_default();
    if !fake.topics.lock().unwrap().iter().any(|t| t.id == topic_id) {
        return error(StatusCode::NOT_FOUND, "Topic not found");
    }
    let id = fake.next_id();
    let subscription = SubscriptionRecord {
        id,
        topic_id,
        queue: format!("queue-{id}"),
        active: true,
    };
    fake.subscriptions.lock().unwrap().push(subscription.clone());
    (StatusCode::CREATED, Json(subscription)).into_response()
}

async fn update_subscription(
    State(fake): State<Fake>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(record): Json<SubscriptionRecord>,
) -> Response {
    if let Err(response) = authorized(&headers) {
        return response;
    }
    let mut subscriptions = fake.subscriptions.lock().unwrap();
    match subscriptions.iter_mut().find(|s| s.id == id) {
        Some(stored) => {
            *stored = record;
            Json(stored.clone()).into_response()
        }
        None => error(StatusCode::NOT_FOUND, "Subscription not found"),
    }
}

async fn delete_subscription(
    State(fake): State<Fake>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Response {
    if let Err(response) = authorized(&headers) {
        return response;
    }
    fake.subscriptions.lock().unwrap().retain(|s| s.id != id);
    StatusCode::NO_CONTENT.into_response()
}

async fn serve(fake: Fake) -> SocketAddr {
    let app = Router::new()
        .route("/api/ping-credentials", get(ping))
        .route("/api/topics/", get(list_topics).post(create_topic))
        .route("/api/topics/{id}", delete(delete_topic))
        .route(
            "/api/subscriptions/",
            get(list_subscriptions).post(create_subscription),
        )
        .route(
            "/api/subscriptions/{id}",
            put(update_subscription).delete(delete_subscription),
        )
        .with_state(fake);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

fn client(addr: SocketAddr, password: &str) -> HttpRegistryClient {
    HttpRegistryClient::new(HttpRegistryClientOptions {
        base_path: "/api".to_string(),
        host: addr.to_string(),
        https: false,
        password: password.to_string(),
        timeout: Duration::from_secs(5),
        username: "user".to_string(),
        verify: true,
    })
    .unwrap()
}

#[tokio::test]
async fn test_ping_credentials() {
    let addr = serve(Fake::default()).await;

    assert!(client(addr, "pass").ping_credentials().await.is_ok());

    let error = client(addr, "wrong").ping_credentials().await.unwrap_err();
    assert!(error.is_unauthorized());
    assert_eq!(error.to_string(), "[401] - Invalid credentials");
}

#[tokio::test]
async fn test_topic_round_trip() {
    let addr = serve(Fake::default()).await;
    let client = client(addr, "pass");

    let created = client.post_topic("arrivals.brussels").await.unwrap();
    assert_eq!(created.name, "arrivals.brussels");
    assert_eq!(client.get_topics().await.unwrap(), vec![created.clone()]);

    let conflict = client.post_topic("arrivals.brussels").await.unwrap_err();
    assert!(conflict.is_conflict());
    assert_eq!(conflict.detail(), "Topic with this name already exists");

    client.delete_topic_by_id(created.id).await.unwrap();
    assert!(client.get_topics().await.unwrap().is_empty());

    let missing = client.delete_topic_by_id(created.id).await.unwrap_err();
    assert!(missing.is_not_found());
}

#[tokio::test]
async fn test_subscription_round_trip() {
    let addr = serve(Fake::default()).await;
    let client = client(addr, "pass");
    let topic = client.post_topic("arrivals").await.unwrap();

    let subscription = client.post_subscription(topic.id).await.unwrap();
    assert!(subscription.active);

    let found = client.get_subscriptions(&subscription.queue).await.unwrap();
    assert_eq!(found, vec![subscription.clone()]);
    assert!(client.get_subscriptions("other").await.unwrap().is_empty());

    let paused = SubscriptionRecord {
        active: false,
        ..subscription.clone()
    };
    let updated = client
        .put_subscription(subscription.id, &paused)
        .await
        .unwrap();
    assert!(!updated.active);

    client
        .delete_subscription_by_id(subscription.id)
        .await
        .unwrap();
    assert!(client
        .get_subscriptions(&subscription.queue)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_unreachable_registry_has_no_status() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let error = client(addr, "pass").get_topics().await.unwrap_err();

    assert_eq!(error.status(), None);
}
