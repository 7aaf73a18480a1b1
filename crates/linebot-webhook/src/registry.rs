//! Event schema registry
//!
//! Maps an event discriminator to the strategy that decodes the fields
//! specific to that event type. The common envelope is decoded by the caller
//! before a strategy runs. Unregistered discriminators resolve to a fallback
//! strategy that keeps the envelope and wraps the element as
//! [`Event::Unknown`].

use crate::events::*;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Builds a typed event from a decoded envelope and the raw element
pub type DecodeFn = fn(EventEnvelope, &Value) -> Result<Event, serde_json::Error>;

static STANDARD_REGISTRY: Lazy<Arc<EventRegistry>> = Lazy::new(|| Arc::new(EventRegistry::standard()));

/// How to decode one event type
#[derive(Clone, Copy)]
pub struct DecodeStrategy {
    event_type: Option<&'static str>,
    decode: DecodeFn,
}

impl DecodeStrategy {
    pub const fn new(event_type: &'static str, decode: DecodeFn) -> Self {
        Self {
            event_type: Some(event_type),
            decode,
        }
    }

    /// Strategy used for discriminators nobody registered
    pub const fn fallback() -> Self {
        Self {
            event_type: None,
            decode: decode_unrecognized,
        }
    }

    pub fn event_type(&self) -> Option<&'static str> {
        self.event_type
    }

    pub fn is_fallback(&self) -> bool {
        self.event_type.is_none()
    }

    pub fn decode(&self, envelope: EventEnvelope, raw: &Value) -> Result<Event, serde_json::Error> {
        (self.decode)(envelope, raw)
    }
}

impl fmt::Debug for DecodeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeStrategy")
            .field("event_type", &self.event_type.unwrap_or("<fallback>"))
            .finish()
    }
}

/// Immutable discriminator to strategy mapping
#[derive(Debug, Clone)]
pub struct EventRegistry {
    strategies: HashMap<&'static str, DecodeStrategy>,
    fallback: DecodeStrategy,
}

impl EventRegistry {
    /// Registry with every event type this crate models
    pub fn standard() -> Self {
        Self::from_strategies(STANDARD_STRATEGIES.iter().copied())
    }

    /// Shared instance of [`EventRegistry::standard`], built on first use
    pub fn global() -> Arc<EventRegistry> {
        Arc::clone(&STANDARD_REGISTRY)
    }

    /// Registry restricted to, or extended with, the given strategies.
    /// A later strategy for the same discriminator replaces an earlier one.
    pub fn from_strategies(strategies: impl IntoIterator<Item = DecodeStrategy>) -> Self {
        let strategies = strategies
            .into_iter()
            .filter_map(|s| s.event_type().map(|t| (t, s)))
            .collect();

        Self {
            strategies,
            fallback: DecodeStrategy::fallback(),
        }
    }

    /// Strategy for `discriminator`, or the fallback when it is not registered
    pub fn lookup(&self, discriminator: &str) -> &DecodeStrategy {
        self.strategies.get(discriminator).unwrap_or(&self.fallback)
    }

    pub fn contains(&self, discriminator: &str) -> bool {
        self.strategies.contains_key(discriminator)
    }

    pub fn event_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.strategies.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

const STANDARD_STRATEGIES: &[DecodeStrategy] = &[
    DecodeStrategy::new(event_type::MESSAGE, decode_message),
    DecodeStrategy::new(event_type::FOLLOW, decode_follow),
    DecodeStrategy::new(event_type::UNFOLLOW, decode_unfollow),
    DecodeStrategy::new(event_type::JOIN, decode_join),
    DecodeStrategy::new(event_type::LEAVE, decode_leave),
    DecodeStrategy::new(event_type::POSTBACK, decode_postback),
    DecodeStrategy::new(event_type::BEACON, decode_beacon),
    DecodeStrategy::new(event_type::MEMBER_JOINED, decode_member_joined),
    DecodeStrategy::new(event_type::MEMBER_LEFT, decode_member_left),
    DecodeStrategy::new(event_type::ACCOUNT_LINK, decode_account_link),
    DecodeStrategy::new(event_type::UNSEND, decode_unsend),
    DecodeStrategy::new(event_type::VIDEO_PLAY_COMPLETE, decode_video_play_complete),
];

/// Decode the required field `name` of an event element
fn field<T: DeserializeOwned>(raw: &Value, name: &'static str) -> Result<T, serde_json::Error> {
    match raw.get(name) {
        Some(value) => serde::Deserialize::deserialize(value),
        None => Err(<serde_json::Error as serde::de::Error>::missing_field(name)),
    }
}

fn decode_message(envelope: EventEnvelope, raw: &Value) -> Result<Event, serde_json::Error> {
    Ok(Event::Message(MessageEvent {
        envelope,
        message: field(raw, "message")?,
    }))
}

fn decode_follow(envelope: EventEnvelope, _raw: &Value) -> Result<Event, serde_json::Error> {
    Ok(Event::Follow(FollowEvent { envelope }))
}

fn decode_unfollow(envelope: EventEnvelope, _raw: &Value) -> Result<Event, serde_json::Error> {
    Ok(Event::Unfollow(UnfollowEvent { envelope }))
}

fn decode_join(envelope: EventEnvelope, _raw: &Value) -> Result<Event, serde_json::Error> {
    Ok(Event::Join(JoinEvent { envelope }))
}

fn decode_leave(envelope: EventEnvelope, _raw: &Value) -> Result<Event, serde_json::Error> {
    Ok(Event::Leave(LeaveEvent { envelope }))
}

fn decode_postback(envelope: EventEnvelope, raw: &Value) -> Result<Event, serde_json::Error> {
    Ok(Event::Postback(PostbackEvent {
        envelope,
        postback: field(raw, "postback")?,
    }))
}

fn decode_beacon(envelope: EventEnvelope, raw: &Value) -> Result<Event, serde_json::Error> {
    Ok(Event::Beacon(BeaconEvent {
        envelope,
        beacon: field(raw, "beacon")?,
    }))
}

fn decode_member_joined(envelope: EventEnvelope, raw: &Value) -> Result<Event, serde_json::Error> {
    Ok(Event::MemberJoined(MemberJoinedEvent {
        envelope,
        joined: field(raw, "joined")?,
    }))
}

fn decode_member_left(envelope: EventEnvelope, raw: &Value) -> Result<Event, serde_json::Error> {
    Ok(Event::MemberLeft(MemberLeftEvent {
        envelope,
        left: field(raw, "left")?,
    }))
}

fn decode_account_link(envelope: EventEnvelope, raw: &Value) -> Result<Event, serde_json::Error> {
    Ok(Event::AccountLink(AccountLinkEvent {
        envelope,
        link: field(raw, "link")?,
    }))
}

fn decode_unsend(envelope: EventEnvelope, raw: &Value) -> Result<Event, serde_json::Error> {
    Ok(Event::Unsend(UnsendEvent {
        envelope,
        unsend: field(raw, "unsend")?,
    }))
}

fn decode_video_play_complete(
    envelope: EventEnvelope,
    raw: &Value,
) -> Result<Event, serde_json::Error> {
    Ok(Event::VideoPlayComplete(VideoPlayCompleteEvent {
        envelope,
        video_play_complete: field(raw, "videoPlayComplete")?,
    }))
}

fn decode_unrecognized(envelope: EventEnvelope, raw: &Value) -> Result<Event, serde_json::Error> {
    Ok(Event::Unknown(UnknownEvent {
        event_type: raw.get("type").and_then(Value::as_str).map(str::to_string),
        reason: UnknownReason::UnrecognizedType,
        envelope: Some(envelope),
        raw: raw.clone(),
    }))
}
