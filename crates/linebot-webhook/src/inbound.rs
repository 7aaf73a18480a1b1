//! Inbound webhook handling
//!
//! Axum endpoint that receives platform callbacks, runs them through the
//! [`WebhookDispatcher`] and hands each decoded event to application
//! handlers.

use crate::{
    decoder::WebhookBatch,
    dispatcher::{RawWebhookRequest, WebhookDispatcher},
    events::Event,
    signature::{VerificationFailure, SIGNATURE_HEADER},
    DispatchError, HandlerError,
};
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Router,
};
use dashmap::DashMap;
use linebot_core::ChannelSecret;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Application callback for decoded events
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one event
    async fn handle_event(&self, event: &Event) -> std::result::Result<(), HandlerError>;
}

/// Handlers keyed by event type, with an optional catch-all
pub struct EventHandlerRegistry {
    handlers: DashMap<String, Arc<dyn EventHandler>>,
    default_handler: Option<Arc<dyn EventHandler>>,
}

impl EventHandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
            default_handler: None,
        }
    }

    /// Handler for events no type-specific handler claims. Every
    /// [`Event::Unknown`] goes here, whatever its discriminator.
    pub fn with_default_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.default_handler = Some(handler);
        self
    }

    /// Register a handler for an event type
    pub fn register(&self, event_type: &str, handler: Arc<dyn EventHandler>) {
        info!(event_type = %event_type, "Registering event handler");
        self.handlers.insert(event_type.to_string(), handler);
    }

    /// Remove the handler for an event type
    pub fn remove(&self, event_type: &str) {
        self.handlers.remove(event_type);
    }

    /// Handler responsible for `event`
    pub fn get(&self, event: &Event) -> Option<Arc<dyn EventHandler>> {
        let typed = match event {
            // Type-specific handlers only ever see decoded variants
            Event::Unknown(_) => None,
            _ => event
                .event_type()
                .and_then(|t| self.handlers.get(t).map(|h| Arc::clone(h.value()))),
        };
        typed.or_else(|| self.default_handler.clone())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Hand every event of `batch` to its handler, in batch order.
    ///
    /// A failing handler does not stop delivery of later events. Returns the
    /// number of failures.
    pub async fn deliver(&self, batch: &WebhookBatch) -> usize {
        let mut failures = 0;

        for (index, event) in batch.iter().enumerate() {
            let Some(handler) = self.get(event) else {
                debug!(
                    index,
                    event_type = event.event_type().unwrap_or("<none>"),
                    "No handler for event"
                );
                continue;
            };

            if let Err(e) = handler.handle_event(event).await {
                failures += 1;
                error!(
                    index,
                    event_type = event.event_type().unwrap_or("<none>"),
                    error = %e,
                    "Event handler failed"
                );
            }
        }

        failures
    }
}

impl Default for EventHandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Forwards every event it receives into a channel
pub struct ChannelEventHandler {
    sender: mpsc::Sender<Event>,
}

impl ChannelEventHandler {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl EventHandler for ChannelEventHandler {
    async fn handle_event(&self, event: &Event) -> std::result::Result<(), HandlerError> {
        self.sender
            .send(event.clone())
            .await
            .map_err(|_| HandlerError::Failed("Event channel closed".to_string()))
    }
}

/// Shared state for the webhook route
pub struct WebhookReceiverState {
    secret: ChannelSecret,
    dispatcher: WebhookDispatcher,
    handlers: Arc<EventHandlerRegistry>,
}

impl WebhookReceiverState {
    pub fn new(secret: ChannelSecret, handlers: Arc<EventHandlerRegistry>) -> Self {
        Self {
            secret,
            dispatcher: WebhookDispatcher::new(),
            handlers,
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: WebhookDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn handlers(&self) -> &Arc<EventHandlerRegistry> {
        &self.handlers
    }
}

/// Create Axum router serving the webhook endpoint at `path`
pub fn create_webhook_router(state: Arc<WebhookReceiverState>, path: &str) -> Router {
    Router::new()
        .route(path, post(handle_webhook))
        .with_state(state)
}

/// Handle incoming webhook request
async fn handle_webhook(
    State(state): State<Arc<WebhookReceiverState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = match headers.get(SIGNATURE_HEADER) {
        Some(value) => match value.to_str() {
            Ok(s) => Some(s.to_string()),
            Err(_) => {
                warn!("Signature header is not valid ASCII");
                let err = DispatchError::Unauthorized(VerificationFailure::MalformedHeader);
                return error_response(&err);
            }
        },
        None => None,
    };

    let request = RawWebhookRequest::new(body, signature);
    let batch = match state.dispatcher.handle(&request, &state.secret) {
        Ok(batch) => batch,
        Err(e) => return error_response(&e),
    };

    let failures = state.handlers.deliver(&batch).await;
    if failures > 0 {
        warn!(
            events = batch.len(),
            failures, "Some events were not handled successfully"
        );
    }

    (StatusCode::OK, "OK").into_response()
}

fn error_response(err: &DispatchError) -> axum::response::Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, err.to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::WebhookSigner;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::Mutex;
    use tower::ServiceExt;

    const SECRET: &str = "channel-secret";
    const BODY: &str = r#"{"destination":"Ubot","events":[
        {"type":"follow","timestamp":1,"source":{"type":"user","userId":"U1"}},
        {"type":"newFutureType","timestamp":2,"source":{"type":"user","userId":"U2"}},
        {"type":"unfollow","timestamp":3,"source":{"type":"user","userId":"U3"}}
    ]}"#;

    /// Records the type of every event it sees
    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<String>>,
    }

    impl RecordingHandler {
        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle_event(&self, event: &Event) -> std::result::Result<(), HandlerError> {
            self.seen
                .lock()
                .unwrap()
                .push(event.event_type().unwrap_or("<none>").to_string());
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl EventHandler for FailingHandler {
        async fn handle_event(&self, _event: &Event) -> std::result::Result<(), HandlerError> {
            Err(HandlerError::Failed("boom".to_string()))
        }
    }

    fn router(handlers: EventHandlerRegistry) -> Router {
        let state = WebhookReceiverState::new(ChannelSecret::from(SECRET), Arc::new(handlers));
        create_webhook_router(Arc::new(state), "/callback")
    }

    fn request(body: &str, signature: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/callback");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_handler_registry() {
        let registry = EventHandlerRegistry::new();
        let follow = Event::Follow(crate::events::FollowEvent {
            envelope: crate::events::EventEnvelope::new(
                chrono::DateTime::from_timestamp_millis(1).unwrap(),
                crate::events::Source::user("U1"),
            ),
        });

        registry.register("follow", Arc::new(RecordingHandler::default()));
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&follow).is_some());

        registry.remove("follow");
        assert!(registry.get(&follow).is_none());
        assert!(registry.is_empty());

        let registry = registry.with_default_handler(Arc::new(RecordingHandler::default()));
        assert!(registry.get(&follow).is_some());
    }

    #[tokio::test]
    async fn test_valid_webhook_is_delivered_in_order() {
        let recorder = Arc::new(RecordingHandler::default());
        let handlers = EventHandlerRegistry::new().with_default_handler(recorder.clone());
        let signature = WebhookSigner::new(SECRET).sign(BODY.as_bytes());

        let response = router(handlers)
            .oneshot(request(BODY, Some(&signature)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "OK");
        assert_eq!(recorder.seen(), vec!["follow", "newFutureType", "unfollow"]);
    }

    #[tokio::test]
    async fn test_type_specific_handler_takes_precedence() {
        let fallback = Arc::new(RecordingHandler::default());
        let follows = Arc::new(RecordingHandler::default());
        let handlers = EventHandlerRegistry::new().with_default_handler(fallback.clone());
        handlers.register("follow", follows.clone());
        let signature = WebhookSigner::new(SECRET).sign(BODY.as_bytes());

        let response = router(handlers)
            .oneshot(request(BODY, Some(&signature)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(follows.seen(), vec!["follow"]);
        assert_eq!(fallback.seen(), vec!["newFutureType", "unfollow"]);
    }

    #[tokio::test]
    async fn test_tampered_signature_returns_401() {
        let recorder = Arc::new(RecordingHandler::default());
        let handlers = EventHandlerRegistry::new().with_default_handler(recorder.clone());
        let signature = WebhookSigner::new("other-secret").sign(BODY.as_bytes());

        let response = router(handlers)
            .oneshot(request(BODY, Some(&signature)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_text(response).await.contains("does not match"));
        assert!(recorder.seen().is_empty());
    }

    #[tokio::test]
    async fn test_missing_signature_returns_401() {
        let response = router(EventHandlerRegistry::new())
            .oneshot(request(BODY, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_text(response).await.contains("X-Line-Signature"));
    }

    #[tokio::test]
    async fn test_bad_payload_returns_400() {
        let body = r#"{"events":{}}"#;
        let signature = WebhookSigner::new(SECRET).sign(body.as_bytes());

        let response = router(EventHandlerRegistry::new())
            .oneshot(request(body, Some(&signature)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("'events' is not an array"));
    }

    #[tokio::test]
    async fn test_handler_failure_still_acknowledged() {
        let handlers = EventHandlerRegistry::new().with_default_handler(Arc::new(FailingHandler));
        let signature = WebhookSigner::new(SECRET).sign(BODY.as_bytes());

        let response = router(handlers)
            .oneshot(request(BODY, Some(&signature)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_downgraded_event_goes_to_default_handler() {
        let messages = Arc::new(RecordingHandler::default());
        let (tx, mut rx) = mpsc::channel(10);
        let handlers =
            EventHandlerRegistry::new().with_default_handler(Arc::new(ChannelEventHandler::new(tx)));
        handlers.register("message", messages.clone());

        let body = br#"{"events":[
            {"type":"message","timestamp":1,"source":{"type":"user","userId":"U1"},"message":{"id":"1","type":"text"}},
            {"type":"message","timestamp":2,"source":{"type":"user","userId":"U1"},"message":{"id":"2","type":"text","text":"hi"}}
        ]}"#;
        let batch = crate::decoder::decode(body).unwrap();
        assert!(batch.events()[0].is_unknown());

        assert_eq!(handlers.deliver(&batch).await, 0);

        // Only the decoded message reaches the typed handler
        assert_eq!(messages.seen(), vec!["message"]);
        let routed = rx.recv().await.unwrap();
        assert!(routed.is_unknown());
        assert_eq!(routed.event_type(), Some("message"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unknown_event_without_default_handler_is_unrouted() {
        let handlers = EventHandlerRegistry::new();
        handlers.register("message", Arc::new(RecordingHandler::default()));

        let batch = crate::decoder::decode(
            br#"{"events":[{"type":"message","timestamp":1,"source":{"type":"user","userId":"U1"}}]}"#,
        )
        .unwrap();

        assert!(batch.events()[0].is_unknown());
        assert!(handlers.get(&batch.events()[0]).is_none());
    }

    #[tokio::test]
    async fn test_deliver_counts_failures_and_continues() {
        let recorder = Arc::new(RecordingHandler::default());
        let handlers = EventHandlerRegistry::new().with_default_handler(recorder.clone());
        handlers.register("follow", Arc::new(FailingHandler));

        let batch = crate::decoder::decode(BODY.as_bytes()).unwrap();
        let failures = handlers.deliver(&batch).await;

        assert_eq!(failures, 1);
        assert_eq!(recorder.seen(), vec!["newFutureType", "unfollow"]);
    }

    #[tokio::test]
    async fn test_channel_handler_forwards_events() {
        let (tx, mut rx) = mpsc::channel(10);
        let handlers =
            EventHandlerRegistry::new().with_default_handler(Arc::new(ChannelEventHandler::new(tx)));

        let batch = crate::decoder::decode(BODY.as_bytes()).unwrap();
        assert_eq!(handlers.deliver(&batch).await, 0);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.event_type(), Some("follow"));
        let second = rx.recv().await.unwrap();
        assert!(second.is_unknown());
    }

    #[tokio::test]
    async fn test_channel_handler_reports_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handlers =
            EventHandlerRegistry::new().with_default_handler(Arc::new(ChannelEventHandler::new(tx)));

        let batch = crate::decoder::decode(BODY.as_bytes()).unwrap();
        assert_eq!(handlers.deliver(&batch).await, 3);
    }
}
