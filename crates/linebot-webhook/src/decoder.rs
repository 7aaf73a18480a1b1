//! Webhook batch decoding
//!
//! A batch fails as a whole only when its envelope is unusable. Problems in
//! a single element downgrade that element to [`Event::Unknown`] and leave
//! its siblings untouched, so the batch always has one event per element, in
//! delivery order.

use crate::events::{Event, EventEnvelope, UnknownEvent, UnknownReason};
use crate::registry::EventRegistry;
use crate::DecodeError;
use serde::{Deserialize, Serialize};
use serde_json::error::Category;
use serde_json::value::RawValue;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Decoded events of one webhook request, in delivery order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WebhookBatch {
    /// User id of the bot the webhook was sent to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    events: Vec<Event>,
}

impl WebhookBatch {
    pub fn new(destination: Option<String>, events: Vec<Event>) -> Self {
        Self {
            destination,
            events,
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn unknown_events(&self) -> impl Iterator<Item = &UnknownEvent> {
        self.events.iter().filter_map(|event| match event {
            Event::Unknown(unknown) => Some(unknown),
            _ => None,
        })
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}

impl IntoIterator for WebhookBatch {
    type Item = Event;
    type IntoIter = std::vec::IntoIter<Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

impl<'a> IntoIterator for &'a WebhookBatch {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

/// Decodes raw webhook bodies using an [`EventRegistry`]
#[derive(Debug, Clone)]
pub struct EventDecoder {
    registry: Arc<EventRegistry>,
}

impl EventDecoder {
    /// Decoder backed by the shared standard registry
    pub fn new() -> Self {
        Self::with_registry(EventRegistry::global())
    }

    pub fn with_registry(registry: Arc<EventRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    /// Decode a webhook body into a batch.
    ///
    /// Fails only when the body is not a JSON object with an `events` array.
    /// The envelope is split without building a tree, so serde_json's nesting
    /// limit applies to each element on its own.
    pub fn decode(&self, raw_body: &[u8]) -> Result<WebhookBatch, DecodeError> {
        let mut root: HashMap<String, Box<RawValue>> =
            serde_json::from_slice(raw_body).map_err(|e| match e.classify() {
                Category::Data => DecodeError::MalformedEnvelope(
                    "top-level value is not an object".to_string(),
                ),
                _ => DecodeError::MalformedEnvelope(format!("invalid JSON: {}", e)),
            })?;

        let elements: Vec<Box<RawValue>> = match root.remove("events") {
            Some(events) => serde_json::from_str(events.get()).map_err(|_| {
                DecodeError::MalformedEnvelope("'events' is not an array".to_string())
            })?,
            None => {
                return Err(DecodeError::MalformedEnvelope(
                    "missing 'events' field".to_string(),
                ))
            }
        };

        let destination = root
            .remove("destination")
            .and_then(|raw| serde_json::from_str::<String>(raw.get()).ok());

        let events: Vec<Event> = elements
            .iter()
            .enumerate()
            .map(|(index, element)| self.decode_element(index, element))
            .collect();

        let batch = WebhookBatch::new(destination, events);
        debug!(
            events = batch.len(),
            unknown = batch.unknown_events().count(),
            "Decoded webhook batch"
        );

        Ok(batch)
    }

    fn decode_element(&self, index: usize, element: &RawValue) -> Event {
        match serde_json::from_str::<Value>(element.get()) {
            Ok(raw) => self.decode_event(index, raw),
            Err(e) => {
                let event_type = serde_json::from_str::<Discriminator>(element.get())
                    .ok()
                    .and_then(|d| d.event_type);
                warn!(index, error = %e, "Webhook event could not be parsed");
                let reason = UnknownReason::UnparsableElement(e.to_string());
                unknown(event_type, reason, None, Value::Null)
            }
        }
    }

    fn decode_event(&self, index: usize, raw: Value) -> Event {
        let event_type = match raw.get("type") {
            Some(Value::String(event_type)) => event_type.clone(),
            _ => {
                warn!(index, "Webhook event has no type");
                return unknown(None, UnknownReason::MissingDiscriminator, None, raw);
            }
        };

        let strategy = self.registry.lookup(&event_type);

        let envelope = match EventEnvelope::deserialize(&raw) {
            Ok(envelope) => envelope,
            Err(_) if strategy.is_fallback() => {
                warn!(index, event_type = %event_type, "Unrecognized webhook event type");
                return unknown(Some(event_type), UnknownReason::UnrecognizedType, None, raw);
            }
            Err(e) => {
                warn!(index, event_type = %event_type, error = %e, "Invalid webhook event envelope");
                let reason = UnknownReason::InvalidEnvelope(e.to_string());
                return unknown(Some(event_type), reason, None, raw);
            }
        };

        match strategy.decode(envelope.clone(), &raw) {
            Ok(event) => {
                if event.is_unknown() {
                    warn!(index, event_type = %event_type, "Unrecognized webhook event type");
                }
                event
            }
            Err(e) => {
                warn!(index, event_type = %event_type, error = %e, "Invalid webhook event payload");
                let reason = UnknownReason::InvalidPayload(e.to_string());
                unknown(Some(event_type), reason, Some(envelope), raw)
            }
        }
    }
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// The `type` of an element, read without building the rest of it
#[derive(Deserialize)]
struct Discriminator {
    #[serde(rename = "type")]
    event_type: Option<String>,
}

fn unknown(
    event_type: Option<String>,
    reason: UnknownReason,
    envelope: Option<EventEnvelope>,
    raw: Value,
) -> Event {
    Event::Unknown(UnknownEvent {
        event_type,
        reason,
        envelope,
        raw,
    })
}

/// Decode with the shared standard registry
pub fn decode(raw_body: &[u8]) -> Result<WebhookBatch, DecodeError> {
    EventDecoder::new().decode(raw_body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{MessageContent, Source};
    use serde_json::json;

    #[test]
    fn test_decode_follow_scenario() {
        let body = br#"{"events":[{"type":"follow","timestamp":1,"source":{"type":"user","userId":"U1"}}]}"#;

        let batch = decode(body).unwrap();
        assert_eq!(batch.len(), 1);
        match &batch.events()[0] {
            Event::Follow(follow) => {
                assert_eq!(follow.envelope.source, Source::user("U1"));
                assert_eq!(follow.envelope.timestamp.timestamp_millis(), 1);
                assert_eq!(follow.envelope.reply_token, None);
            }
            other => panic!("expected follow event, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_events_is_empty_batch() {
        let batch = decode(br#"{"destination":"Uxxxxxxxxxxxxxx","events":[]}"#).unwrap();

        assert!(batch.is_empty());
        assert_eq!(batch.destination.as_deref(), Some("Uxxxxxxxxxxxxxx"));
    }

    #[test]
    fn test_malformed_envelopes() {
        let cases: [&[u8]; 6] = [
            b"",
            b"not json",
            b"[]",
            b"{}",
            br#"{"events":{}}"#,
            br#"{"events":null}"#,
        ];

        for body in cases {
            let result = decode(body);
            assert!(
                matches!(result, Err(DecodeError::MalformedEnvelope(_))),
                "{:?} decoded to {:?}",
                String::from_utf8_lossy(body),
                result
            );
        }
    }

    #[test]
    fn test_unknown_type_is_isolated() {
        let body = json!({
            "events": [
                {"type": "follow", "timestamp": 1, "source": {"type": "user", "userId": "U1"}},
                {"type": "newFutureType", "timestamp": 2, "source": {"type": "user", "userId": "U2"}, "payload": {"x": 1}},
                {"type": "unfollow", "timestamp": 3, "source": {"type": "user", "userId": "U3"}}
            ]
        });

        let batch = decode(body.to_string().as_bytes()).unwrap();
        assert_eq!(batch.len(), 3);
        assert!(matches!(batch.events()[0], Event::Follow(_)));
        assert!(matches!(batch.events()[2], Event::Unfollow(_)));

        match &batch.events()[1] {
            Event::Unknown(unknown) => {
                assert_eq!(unknown.event_type.as_deref(), Some("newFutureType"));
                assert_eq!(unknown.reason, UnknownReason::UnrecognizedType);
                assert_eq!(unknown.raw, body["events"][1]);
                assert_eq!(
                    unknown.envelope.as_ref().map(|e| e.timestamp.timestamp_millis()),
                    Some(2)
                );
            }
            other => panic!("expected unknown event, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_discriminator() {
        let body = json!({
            "events": [
                {"timestamp": 1, "source": {"type": "user", "userId": "U1"}},
                {"type": 7, "timestamp": 1, "source": {"type": "user", "userId": "U1"}},
                "not an object"
            ]
        });

        let batch = decode(body.to_string().as_bytes()).unwrap();
        assert_eq!(batch.len(), 3);
        for (index, event) in batch.iter().enumerate() {
            match event {
                Event::Unknown(unknown) => {
                    assert_eq!(unknown.event_type, None);
                    assert_eq!(unknown.reason, UnknownReason::MissingDiscriminator);
                    assert_eq!(unknown.raw, body["events"][index]);
                }
                other => panic!("expected unknown event, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_invalid_payload_is_downgraded() {
        let body = json!({
            "events": [
                {"type": "message", "timestamp": 1, "source": {"type": "user", "userId": "U1"}, "message": {"id": "1", "type": "text"}},
                {"type": "message", "timestamp": 2, "source": {"type": "user", "userId": "U1"}, "message": {"id": "2", "type": "text", "text": "hi"}}
            ]
        });

        let batch = decode(body.to_string().as_bytes()).unwrap();
        assert_eq!(batch.len(), 2);

        match &batch.events()[0] {
            Event::Unknown(unknown) => {
                assert_eq!(unknown.event_type.as_deref(), Some("message"));
                assert!(matches!(unknown.reason, UnknownReason::InvalidPayload(ref e) if e.contains("text")));
                assert!(unknown.envelope.is_some());
            }
            other => panic!("expected unknown event, got {:?}", other),
        }
        match &batch.events()[1] {
            Event::Message(message) => match &message.message {
                MessageContent::Text(text) => assert_eq!(text.text, "hi"),
                other => panic!("expected text content, got {:?}", other),
            },
            other => panic!("expected message event, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_envelope_is_downgraded() {
        let body = json!({
            "events": [
                {"type": "follow", "timestamp": "yesterday", "source": {"type": "user", "userId": "U1"}},
                {"type": "join", "timestamp": 1}
            ]
        });

        let batch = decode(body.to_string().as_bytes()).unwrap();
        assert_eq!(batch.len(), 2);
        for event in &batch {
            match event {
                Event::Unknown(unknown) => {
                    assert!(matches!(unknown.reason, UnknownReason::InvalidEnvelope(_)));
                    assert_eq!(unknown.envelope, None);
                }
                other => panic!("expected unknown event, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_unrecognized_type_without_envelope() {
        let body = br#"{"events":[{"type":"brandNew","somethingElse":true}]}"#;

        let batch = decode(body).unwrap();
        match &batch.events()[0] {
            Event::Unknown(unknown) => {
                assert_eq!(unknown.reason, UnknownReason::UnrecognizedType);
                assert_eq!(unknown.envelope, None);
            }
            other => panic!("expected unknown event, got {:?}", other),
        }
    }

    #[test]
    fn test_order_is_preserved() {
        let events: Vec<_> = (0..20)
            .map(|i| {
                json!({
                    "type": if i % 3 == 0 { "mystery" } else { "follow" },
                    "timestamp": i,
                    "source": {"type": "user", "userId": format!("U{}", i)}
                })
            })
            .collect();
        let body = json!({ "events": events });

        let batch = decode(body.to_string().as_bytes()).unwrap();
        assert_eq!(batch.len(), 20);
        for (i, event) in batch.iter().enumerate() {
            assert_eq!(event.timestamp().map(|t| t.timestamp_millis()), Some(i as i64));
            assert_eq!(event.is_unknown(), i % 3 == 0);
        }
        assert_eq!(batch.unknown_events().count(), 7);
    }

    #[test]
    fn test_restricted_registry_downgrades_unregistered_types() {
        let standard = EventRegistry::standard();
        let strategies: Vec<_> = standard
            .event_types()
            .filter(|t| *t != "postback")
            .map(|t| *standard.lookup(t))
            .collect();
        let decoder =
            EventDecoder::with_registry(Arc::new(EventRegistry::from_strategies(strategies)));

        let body = br#"{"events":[{"type":"postback","timestamp":1,"source":{"type":"user","userId":"U1"},"postback":{"data":"a=1"}}]}"#;
        let batch = decoder.decode(body).unwrap();

        assert!(batch.events()[0].is_unknown());
        assert!(!decoder.registry().contains("postback"));
    }

    #[test]
    fn test_deeply_nested_element_is_isolated() {
        let deep = format!("{}{}", "[".repeat(200), "]".repeat(200));
        let body = format!(
            r#"{{"extra":{deep},"events":[
                {{"type":"follow","timestamp":1,"source":{{"type":"user","userId":"U1"}}}},
                {{"type":"message","timestamp":2,"source":{{"type":"user","userId":"U1"}},"deep":{deep}}},
                {deep},
                {{"type":"unfollow","timestamp":3,"source":{{"type":"user","userId":"U1"}}}}
            ]}}"#,
            deep = deep
        );

        let batch = decode(body.as_bytes()).unwrap();
        assert_eq!(batch.len(), 4);
        assert!(matches!(batch.events()[0], Event::Follow(_)));
        assert!(matches!(batch.events()[3], Event::Unfollow(_)));

        let expected_types = [Some("message"), None];
        for (event, expected) in batch.events()[1..3].iter().zip(expected_types) {
            match event {
                Event::Unknown(unknown) => {
                    assert_eq!(unknown.event_type.as_deref(), expected);
                    assert!(matches!(unknown.reason, UnknownReason::UnparsableElement(_)));
                    assert_eq!(unknown.envelope, None);
                    assert_eq!(unknown.raw, Value::Null);
                }
                other => panic!("expected unknown event, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_non_string_destination_is_ignored() {
        let batch = decode(br#"{"destination":{"id":"U0"},"events":[]}"#).unwrap();
        assert_eq!(batch.destination, None);
    }
}
