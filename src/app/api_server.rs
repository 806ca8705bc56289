//! HTTP API server
//!
//! A thin axum adapter over the [`ApiManager`]: every route maps onto one service
//! client operation. Successful creates answer 201, everything else 200. Any
//! [`MessagingError`] becomes a 400 with an `{"error": ...}` body.
//!
//! `GET /events` upgrades to a WebSocket that receives every event published on
//! the manager bus as `{"event": name, "payload": [...]}`.
//!
//! ```text
//! HTTP client ──► router ──► QueueClient / TopicClient / AlarmClient
//!                                   │ events
//! WebSocket   ◄── broadcast ◄── ApiManager bus ("**")
//! ```

use crate::app::messaging::alarm::{AlarmForQueueRequest, AlarmState};
use crate::app::messaging::errors::MessagingError;
use crate::app::messaging::resource_info::{ResourceAttributes, ResourceInfo, ResourceMap};
use crate::app::messaging::{
    AlarmClient, ApiManager, MessagingService, QueueClient, QueueMessage, RemoteHandle,
    SubscriptionId, TopicClient,
};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

/// Events buffered per WebSocket client before it starts lagging.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Shared state passed to all request handlers
pub struct ApiState {
    manager: Arc<ApiManager>,
    events: broadcast::Sender<String>,
    forwarder: SubscriptionId,
}

impl ApiState {
    /// Subscribe to everything on the manager bus and re-broadcast it as JSON text.
    pub fn new(manager: Arc<ApiManager>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let sender = events.clone();
        let forwarder = manager.events().subscribe("**", move |event| {
            let frame = json!({ "event": event.name, "payload": event.payload }).to_string();
            // No receivers just means no WebSocket is connected.
            let _ = sender.send(frame);
        });
        Arc::new(Self {
            manager,
            events,
            forwarder,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<String> {
        self.events.subscribe()
    }

    fn queues(&self) -> Result<Arc<QueueClient>, ApiError> {
        self.manager
            .queue_client()
            .ok_or_else(|| MessagingError::UnknownService("SQS".into()).into())
    }

    fn topics(&self) -> Result<Arc<TopicClient>, ApiError> {
        self.manager
            .topic_client()
            .ok_or_else(|| MessagingError::UnknownService("SNS".into()).into())
    }

    fn alarms(&self) -> Result<Arc<AlarmClient>, ApiError> {
        self.manager
            .alarm_client()
            .ok_or_else(|| MessagingError::UnknownService("CloudWatch".into()).into())
    }
}

impl Drop for ApiState {
    fn drop(&mut self) {
        self.manager.events().unsubscribe(self.forwarder);
    }
}

/// A rejected request.
#[derive(Debug)]
pub struct ApiError(MessagingError);

impl From<MessagingError> for ApiError {
    fn from(err: MessagingError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!("API error: {}", self.0);
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
struct CreateResourceBody {
    name: String,
    #[serde(default)]
    attributes: ResourceAttributes,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    #[serde(default)]
    subject: Option<String>,
    message: Value,
}

#[derive(Debug, Deserialize)]
struct ShareBody {
    principal: String,
}

#[derive(Debug, Deserialize)]
struct SubscribeBody {
    protocol: String,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct AlarmStateBody {
    state: String,
    reason: String,
    #[serde(default)]
    data: Option<Value>,
}

/// Strings are sent as-is, anything else as its JSON text.
fn message_text(message: &Value) -> String {
    match message {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Build the router. Routes live under `rest_prefix`; `/events` is at the root.
pub fn router(manager: Arc<ApiManager>, rest_prefix: &str) -> Router {
    router_with_state(ApiState::new(manager), rest_prefix)
}

pub fn router_with_state(state: Arc<ApiState>, rest_prefix: &str) -> Router {
    let api = Router::new()
        .route("/", get(welcome))
        .route("/queues", post(create_queue).get(list_queues))
        .route("/queues/info", get(queues_info))
        .route("/queues/:name", get(get_queue).delete(delete_queue))
        .route("/queues/:name/purge", post(purge_queue))
        .route("/queues/:name/messages", post(send_message).get(receive_messages))
        .route("/queues/:name/share", post(share_queue))
        .route("/queues/:name/share/:label", delete(unshare_queue))
        .route("/topics", post(create_topic).get(list_topics))
        .route("/topics/info", get(topics_info))
        .route("/topics/:name", get(get_topic).delete(delete_topic))
        .route("/topics/:name/publish", post(publish_topic))
        .route("/topics/:name/subscriptions", post(subscribe_topic))
        .route("/topics/:name/queues/:queue", post(subscribe_topic_to_queue))
        .route("/subscriptions", get(list_subscriptions))
        .route("/subscriptions/:arn", delete(unsubscribe))
        .route("/alarms", post(create_alarm).get(list_alarms))
        .route("/alarms/info", get(alarms_info))
        .route("/alarms/:name", get(describe_alarm).delete(delete_alarm))
        .route("/alarms/:name/state", put(set_alarm_state));

    let prefix = rest_prefix.trim_end_matches('/');
    let app = if prefix.is_empty() {
        api
    } else {
        Router::new().nest(prefix, api)
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    app.route("/events", get(events_socket))
        .with_state(state)
        .layer(cors)
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(
    manager: Arc<ApiManager>,
    bind_address: &str,
    rest_prefix: &str,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = router(manager, rest_prefix);
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!(
        "REST API listening on http://{}{}",
        listener.local_addr()?,
        rest_prefix
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("REST API stopped");
    Ok(())
}

async fn welcome(State(state): State<Arc<ApiState>>) -> Json<Value> {
    Json(json!({
        "message": "AWS messaging REST API",
        "services": state.manager.service_names(),
    }))
}

// ========== Queues ==========

async fn create_queue(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<CreateResourceBody>,
) -> ApiResult<(StatusCode, Json<ResourceInfo>)> {
    let info = state.queues()?.create_queue(&body.name, &body.attributes).await?;
    Ok((StatusCode::CREATED, Json(info)))
}

async fn list_queues(State(state): State<Arc<ApiState>>) -> ApiResult<Json<Vec<RemoteHandle>>> {
    Ok(Json(state.queues()?.list_queues().await?))
}

async fn queues_info(State(state): State<Arc<ApiState>>) -> ApiResult<Json<ResourceMap>> {
    let map = state.queues()?.core().current_map();
    Ok(Json((*map).clone()))
}

async fn get_queue(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<ResourceInfo>> {
    let queues = state.queues()?;
    match queues.get_queue_info(&name, false).await? {
        Some(info) => Ok(Json(info)),
        None => Err(MessagingError::not_found(queues.kind(), &name).into()),
    }
}

async fn delete_queue(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<bool>> {
    Ok(Json(state.queues()?.delete_queue(&name).await?))
}

async fn purge_queue(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<bool>> {
    Ok(Json(state.queues()?.purge(&name).await?))
}

async fn send_message(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
    Json(body): Json<MessageBody>,
) -> ApiResult<Json<Value>> {
    let queues = state.queues()?;
    let queue = queues.require_queue(&name)?;
    let message_id = queues.publish(&queue, &message_text(&body.message)).await?;
    Ok(Json(json!({ "messageId": message_id })))
}

async fn receive_messages(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
    Query(options): Query<ResourceAttributes>,
) -> ApiResult<Json<Vec<QueueMessage>>> {
    let queues = state.queues()?;
    let queue = queues.require_queue(&name)?;
    let options = (!options.is_empty()).then_some(&options);
    Ok(Json(queues.receive(&queue, options).await?))
}

async fn share_queue(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
    Json(body): Json<ShareBody>,
) -> ApiResult<Json<Value>> {
    let queues = state.queues()?;
    let queue = queues.require_queue(&name)?;
    let label = queues.share(&queue, &body.principal).await?;
    Ok(Json(json!({ "label": label })))
}

async fn unshare_queue(
    State(state): State<Arc<ApiState>>,
    Path((name, label)): Path<(String, String)>,
) -> ApiResult<Json<bool>> {
    let queues = state.queues()?;
    let queue = queues.require_queue(&name)?;
    Ok(Json(queues.unshare(&queue, &label).await?))
}

// ========== Topics ==========

async fn create_topic(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<CreateResourceBody>,
) -> ApiResult<(StatusCode, Json<ResourceInfo>)> {
    let info = state.topics()?.create_topic(&body.name, &body.attributes).await?;
    Ok((StatusCode::CREATED, Json(info)))
}

async fn list_topics(State(state): State<Arc<ApiState>>) -> ApiResult<Json<Vec<RemoteHandle>>> {
    Ok(Json(state.topics()?.list_topics().await?))
}

async fn topics_info(State(state): State<Arc<ApiState>>) -> ApiResult<Json<ResourceMap>> {
    let map = state.topics()?.core().current_map();
    Ok(Json((*map).clone()))
}

async fn get_topic(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<ResourceInfo>> {
    let topics = state.topics()?;
    match topics.get_topic_info(&name, false).await? {
        Some(info) => Ok(Json(info)),
        None => Err(MessagingError::not_found(topics.kind(), &name).into()),
    }
}

async fn delete_topic(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<bool>> {
    Ok(Json(state.topics()?.delete_topic(&name).await?))
}

async fn publish_topic(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
    Json(body): Json<MessageBody>,
) -> ApiResult<Json<Value>> {
    let topics = state.topics()?;
    let topic = topics.require_topic(&name)?;
    let message_id = topics
        .publish(&topic, body.subject.as_deref(), &message_text(&body.message))
        .await?;
    Ok(Json(json!({ "messageId": message_id })))
}

async fn subscribe_topic(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
    Json(body): Json<SubscribeBody>,
) -> ApiResult<Json<Value>> {
    let topics = state.topics()?;
    let topic = topics.require_topic(&name)?;
    let arn = topics.subscribe(&topic, &body.protocol, &body.endpoint).await?;
    Ok(Json(json!({ "subscriptionArn": arn })))
}

async fn subscribe_topic_to_queue(
    State(state): State<Arc<ApiState>>,
    Path((name, queue)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let arn = state
        .topics()?
        .subscribe_topic_to_queue(&name, &queue)
        .await?;
    Ok(Json(json!({ "subscriptionArn": arn })))
}

async fn list_subscriptions(State(state): State<Arc<ApiState>>) -> ApiResult<Json<Value>> {
    let subscriptions = state.topics()?.subscriptions();
    Ok(Json(json!(subscriptions)))
}

async fn unsubscribe(
    State(state): State<Arc<ApiState>>,
    Path(arn): Path<String>,
) -> ApiResult<Json<bool>> {
    Ok(Json(state.topics()?.unsubscribe(&arn).await?))
}

// ========== Alarms ==========

async fn create_alarm(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<AlarmForQueueRequest>,
) -> ApiResult<(StatusCode, Json<ResourceInfo>)> {
    let info = state.alarms()?.create_alarm_for_queue(&request).await?;
    Ok((StatusCode::CREATED, Json(info)))
}

async fn list_alarms(State(state): State<Arc<ApiState>>) -> ApiResult<Json<Vec<RemoteHandle>>> {
    Ok(Json(state.alarms()?.core().list_all().await?))
}

async fn alarms_info(State(state): State<Arc<ApiState>>) -> ApiResult<Json<ResourceMap>> {
    let map = state.alarms()?.core().current_map();
    Ok(Json((*map).clone()))
}

async fn describe_alarm(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<ResourceAttributes>> {
    Ok(Json(state.alarms()?.describe_alarm(&name).await?))
}

async fn delete_alarm(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<bool>> {
    Ok(Json(state.alarms()?.delete_alarm(&name).await?))
}

async fn set_alarm_state(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
    Json(body): Json<AlarmStateBody>,
) -> ApiResult<Json<bool>> {
    let alarm_state: AlarmState = body.state.parse()?;
    let data = body.data.as_ref().map(message_text);
    let done = state
        .alarms()?
        .set_state(&name, alarm_state, &body.reason, data.as_deref())
        .await?;
    Ok(Json(done))
}

// ========== Events ==========

async fn events_socket(
    State(state): State<Arc<ApiState>>,
    ws: WebSocketUpgrade,
) -> Response {
    let events = state.subscribe_events();
    ws.on_upgrade(move |socket| forward_events(socket, events))
}

/// Push bus events to one client until either side goes away.
async fn forward_events(mut socket: WebSocket, mut events: broadcast::Receiver<String>) {
    info!("WebSocket client connected");
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(frame) => {
                    if socket.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("WebSocket client lagging, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(other)) => debug!("Ignoring client frame {:?}", other),
            },
        }
    }
    info!("WebSocket client disconnected");
}
