//! Webhook event types
//!
//! Field names follow the platform's camelCase wire contract. Every union
//! here (`Event`, `Source`, `MessageContent`) keeps an `Unknown` arm that
//! holds the raw JSON, so new platform types decode instead of failing and
//! re-encode to what was received.

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Discriminator values of the event types this crate decodes
pub mod event_type {
    pub const MESSAGE: &str = "message";
    pub const FOLLOW: &str = "follow";
    pub const UNFOLLOW: &str = "unfollow";
    pub const JOIN: &str = "join";
    pub const LEAVE: &str = "leave";
    pub const POSTBACK: &str = "postback";
    pub const BEACON: &str = "beacon";
    pub const MEMBER_JOINED: &str = "memberJoined";
    pub const MEMBER_LEFT: &str = "memberLeft";
    pub const ACCOUNT_LINK: &str = "accountLink";
    pub const UNSEND: &str = "unsend";
    pub const VIDEO_PLAY_COMPLETE: &str = "videoPlayComplete";
}

/// Fields shared by every event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<EventMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_context: Option<DeliveryContext>,
}

impl EventEnvelope {
    pub fn new(timestamp: DateTime<Utc>, source: Source) -> Self {
        Self {
            timestamp,
            source,
            reply_token: None,
            mode: None,
            webhook_event_id: None,
            delivery_context: None,
        }
    }

    pub fn with_reply_token(mut self, reply_token: &str) -> Self {
        self.reply_token = Some(reply_token.to_string());
        self
    }

    pub fn with_mode(mut self, mode: EventMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_webhook_event_id(mut self, id: &str) -> Self {
        self.webhook_event_id = Some(id.to_string());
        self
    }

    pub fn with_redelivery(mut self, is_redelivery: bool) -> Self {
        self.delivery_context = Some(DeliveryContext { is_redelivery });
        self
    }

    /// True when the platform flagged this event as a redelivery
    pub fn is_redelivery(&self) -> bool {
        self.delivery_context
            .as_ref()
            .map(|c| c.is_redelivery)
            .unwrap_or(false)
    }
}

/// Channel state when the event was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventMode {
    /// The bot may reply or push messages
    Active,
    /// The bot should not send messages
    Standby,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryContext {
    #[serde(rename = "isRedelivery")]
    pub is_redelivery: bool,
}

/// Where an event came from
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    User(UserSource),
    Group(GroupSource),
    Room(RoomSource),
    Unknown(UnknownSource),
}

impl Source {
    pub fn user(user_id: &str) -> Self {
        Self::User(UserSource {
            user_id: user_id.to_string(),
        })
    }

    /// Sending user, when the platform disclosed one
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::User(s) => Some(&s.user_id),
            Self::Group(s) => s.user_id.as_deref(),
            Self::Room(s) => s.user_id.as_deref(),
            Self::Unknown(_) => None,
        }
    }

    /// Id to push replies to: the group or room for chats, the user otherwise
    pub fn sender_id(&self) -> Option<&str> {
        match self {
            Self::User(s) => Some(&s.user_id),
            Self::Group(s) => Some(&s.group_id),
            Self::Room(s) => Some(&s.room_id),
            Self::Unknown(_) => None,
        }
    }

    pub fn source_type(&self) -> &str {
        match self {
            Self::User(_) => "user",
            Self::Group(_) => "group",
            Self::Room(_) => "room",
            Self::Unknown(s) => &s.source_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSource {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSource {
    pub group_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSource {
    pub room_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Source of a type this crate does not know
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownSource {
    pub source_type: String,
    pub raw: Value,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum TaggedSource<'a> {
    User(&'a UserSource),
    Group(&'a GroupSource),
    Room(&'a RoomSource),
}

impl Serialize for Source {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::User(s) => TaggedSource::User(s).serialize(serializer),
            Self::Group(s) => TaggedSource::Group(s).serialize(serializer),
            Self::Room(s) => TaggedSource::Room(s).serialize(serializer),
            Self::Unknown(s) => s.raw.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Source {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let source_type = type_tag(&raw)
            .ok_or_else(|| de::Error::missing_field("type"))?
            .to_string();

        match source_type.as_str() {
            "user" => UserSource::deserialize(&raw)
                .map(Self::User)
                .map_err(de::Error::custom),
            "group" => GroupSource::deserialize(&raw)
                .map(Self::Group)
                .map_err(de::Error::custom),
            "room" => RoomSource::deserialize(&raw)
                .map(Self::Room)
                .map_err(de::Error::custom),
            _ => Ok(Self::Unknown(UnknownSource { source_type, raw })),
        }
    }
}

/// Content of a message event
#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    Text(TextMessage),
    Image(ImageMessage),
    Video(VideoMessage),
    Audio(AudioMessage),
    File(FileMessage),
    Location(LocationMessage),
    Sticker(StickerMessage),
    Unknown(UnknownMessage),
}

impl MessageContent {
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Text(m) => Some(&m.id),
            Self::Image(m) => Some(&m.id),
            Self::Video(m) => Some(&m.id),
            Self::Audio(m) => Some(&m.id),
            Self::File(m) => Some(&m.id),
            Self::Location(m) => Some(&m.id),
            Self::Sticker(m) => Some(&m.id),
            Self::Unknown(m) => m.raw.get("id").and_then(Value::as_str),
        }
    }

    pub fn message_type(&self) -> &str {
        match self {
            Self::Text(_) => "text",
            Self::Image(_) => "image",
            Self::Video(_) => "video",
            Self::Audio(_) => "audio",
            Self::File(_) => "file",
            Self::Location(_) => "location",
            Self::Sticker(_) => "sticker",
            Self::Unknown(m) => &m.message_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMessage {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_token: Option<String>,
}

/// Where the binary content of a media message is hosted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentProvider {
    #[serde(rename = "type")]
    pub provider_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_content_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMessage {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_provider: Option<ContentProvider>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMessage {
    pub id: String,
    /// Length in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_provider: Option<ContentProvider>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioMessage {
    pub id: String,
    /// Length in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_provider: Option<ContentProvider>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMessage {
    pub id: String,
    pub file_name: String,
    pub file_size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationMessage {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StickerMessage {
    pub id: String,
    pub package_id: String,
    pub sticker_id: String,
}

/// Message of a type this crate does not know
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownMessage {
    pub message_type: String,
    pub raw: Value,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum TaggedMessage<'a> {
    Text(&'a TextMessage),
    Image(&'a ImageMessage),
    Video(&'a VideoMessage),
    Audio(&'a AudioMessage),
    File(&'a FileMessage),
    Location(&'a LocationMessage),
    Sticker(&'a StickerMessage),
}

impl Serialize for MessageContent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(m) => TaggedMessage::Text(m).serialize(serializer),
            Self::Image(m) => TaggedMessage::Image(m).serialize(serializer),
            Self::Video(m) => TaggedMessage::Video(m).serialize(serializer),
            Self::Audio(m) => TaggedMessage::Audio(m).serialize(serializer),
            Self::File(m) => TaggedMessage::File(m).serialize(serializer),
            Self::Location(m) => TaggedMessage::Location(m).serialize(serializer),
            Self::Sticker(m) => TaggedMessage::Sticker(m).serialize(serializer),
            Self::Unknown(m) => m.raw.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for MessageContent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let message_type = type_tag(&raw)
            .ok_or_else(|| de::Error::missing_field("type"))?
            .to_string();

        let content = match message_type.as_str() {
            "text" => TextMessage::deserialize(&raw).map(Self::Text),
            "image" => ImageMessage::deserialize(&raw).map(Self::Image),
            "video" => VideoMessage::deserialize(&raw).map(Self::Video),
            "audio" => AudioMessage::deserialize(&raw).map(Self::Audio),
            "file" => FileMessage::deserialize(&raw).map(Self::File),
            "location" => LocationMessage::deserialize(&raw).map(Self::Location),
            "sticker" => StickerMessage::deserialize(&raw).map(Self::Sticker),
            _ => return Ok(Self::Unknown(UnknownMessage { message_type, raw })),
        };
        content.map_err(de::Error::custom)
    }
}

fn type_tag(raw: &Value) -> Option<&str> {
    raw.get("type").and_then(Value::as_str)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageEvent {
    #[serde(flatten)]
    pub envelope: EventEnvelope,
    pub message: MessageContent,
}

/// The bot was added as a friend or unblocked
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FollowEvent {
    #[serde(flatten)]
    pub envelope: EventEnvelope,
}

/// The bot was blocked
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnfollowEvent {
    #[serde(flatten)]
    pub envelope: EventEnvelope,
}

/// The bot joined a group or room
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinEvent {
    #[serde(flatten)]
    pub envelope: EventEnvelope,
}

/// The bot was removed from a group or room
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaveEvent {
    #[serde(flatten)]
    pub envelope: EventEnvelope,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostbackEvent {
    #[serde(flatten)]
    pub envelope: EventEnvelope,
    pub postback: PostbackContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostbackContent {
    pub data: String,
    /// Picker results, e.g. `datetime`, `date` or `time`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeaconEvent {
    #[serde(flatten)]
    pub envelope: EventEnvelope,
    pub beacon: BeaconContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconContent {
    /// Hardware ID of the beacon
    pub hwid: String,
    /// `enter`, `banner` or `stay`
    #[serde(rename = "type")]
    pub beacon_type: String,
    /// Device message, hex encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dm: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberJoinedEvent {
    #[serde(flatten)]
    pub envelope: EventEnvelope,
    pub joined: Members,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberLeftEvent {
    #[serde(flatten)]
    pub envelope: EventEnvelope,
    pub left: Members,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Members {
    pub members: Vec<Source>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountLinkEvent {
    #[serde(flatten)]
    pub envelope: EventEnvelope,
    pub link: LinkContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkContent {
    /// `ok` or `failed`
    pub result: String,
    pub nonce: String,
}

/// A user retracted a message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnsendEvent {
    #[serde(flatten)]
    pub envelope: EventEnvelope,
    pub unsend: UnsendDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsendDetail {
    pub message_id: String,
}

/// A user finished watching a video sent with a tracking id
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoPlayCompleteEvent {
    #[serde(flatten)]
    pub envelope: EventEnvelope,
    pub video_play_complete: VideoPlayComplete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoPlayComplete {
    pub tracking_id: String,
}

/// An event that was not decoded into a typed variant
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownEvent {
    /// Discriminator, if the element carried one
    pub event_type: Option<String>,
    pub reason: UnknownReason,
    /// Common fields, when they could be decoded
    pub envelope: Option<EventEnvelope>,
    /// The element exactly as parsed from the batch. `Null` when the element
    /// itself could not be parsed ([`UnknownReason::UnparsableElement`]).
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnknownReason {
    /// The discriminator is not registered
    UnrecognizedType,
    /// No string `type` field, or the element is not an object
    MissingDiscriminator,
    /// Common fields failed to decode
    InvalidEnvelope(String),
    /// Variant-specific fields failed to decode
    InvalidPayload(String),
    /// The element exceeds the per-element JSON nesting limit
    UnparsableElement(String),
}

impl UnknownReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnrecognizedType => "unrecognized_type",
            Self::MissingDiscriminator => "missing_discriminator",
            Self::InvalidEnvelope(_) => "invalid_envelope",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::UnparsableElement(_) => "unparsable_element",
        }
    }
}

impl fmt::Display for UnknownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnrecognizedType => write!(f, "unrecognized event type"),
            Self::MissingDiscriminator => write!(f, "no event type"),
            Self::InvalidEnvelope(e) => write!(f, "invalid common fields: {}", e),
            Self::InvalidPayload(e) => write!(f, "invalid event fields: {}", e),
            Self::UnparsableElement(e) => write!(f, "unparsable element: {}", e),
        }
    }
}

/// A webhook event
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Message(MessageEvent),
    Follow(FollowEvent),
    Unfollow(UnfollowEvent),
    Join(JoinEvent),
    Leave(LeaveEvent),
    Postback(PostbackEvent),
    Beacon(BeaconEvent),
    MemberJoined(MemberJoinedEvent),
    MemberLeft(MemberLeftEvent),
    AccountLink(AccountLinkEvent),
    Unsend(UnsendEvent),
    VideoPlayComplete(VideoPlayCompleteEvent),
    Unknown(UnknownEvent),
}

impl Event {
    /// The discriminator this event was decoded from
    pub fn event_type(&self) -> Option<&str> {
        let known = match self {
            Self::Message(_) => event_type::MESSAGE,
            Self::Follow(_) => event_type::FOLLOW,
            Self::Unfollow(_) => event_type::UNFOLLOW,
            Self::Join(_) => event_type::JOIN,
            Self::Leave(_) => event_type::LEAVE,
            Self::Postback(_) => event_type::POSTBACK,
            Self::Beacon(_) => event_type::BEACON,
            Self::MemberJoined(_) => event_type::MEMBER_JOINED,
            Self::MemberLeft(_) => event_type::MEMBER_LEFT,
            Self::AccountLink(_) => event_type::ACCOUNT_LINK,
            Self::Unsend(_) => event_type::UNSEND,
            Self::VideoPlayComplete(_) => event_type::VIDEO_PLAY_COMPLETE,
            Self::Unknown(e) => return e.event_type.as_deref(),
        };
        Some(known)
    }

    pub fn envelope(&self) -> Option<&EventEnvelope> {
        match self {
            Self::Message(e) => Some(&e.envelope),
            Self::Follow(e) => Some(&e.envelope),
            Self::Unfollow(e) => Some(&e.envelope),
            Self::Join(e) => Some(&e.envelope),
            Self::Leave(e) => Some(&e.envelope),
            Self::Postback(e) => Some(&e.envelope),
            Self::Beacon(e) => Some(&e.envelope),
            Self::MemberJoined(e) => Some(&e.envelope),
            Self::MemberLeft(e) => Some(&e.envelope),
            Self::AccountLink(e) => Some(&e.envelope),
            Self::Unsend(e) => Some(&e.envelope),
            Self::VideoPlayComplete(e) => Some(&e.envelope),
            Self::Unknown(e) => e.envelope.as_ref(),
        }
    }

    pub fn source(&self) -> Option<&Source> {
        self.envelope().map(|e| &e.source)
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.envelope().map(|e| e.timestamp)
    }

    pub fn reply_token(&self) -> Option<&str> {
        self.envelope().and_then(|e| e.reply_token.as_deref())
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum TaggedEvent<'a> {
    Message(&'a MessageEvent),
    Follow(&'a FollowEvent),
    Unfollow(&'a UnfollowEvent),
    Join(&'a JoinEvent),
    Leave(&'a LeaveEvent),
    Postback(&'a PostbackEvent),
    Beacon(&'a BeaconEvent),
    MemberJoined(&'a MemberJoinedEvent),
    MemberLeft(&'a MemberLeftEvent),
    AccountLink(&'a AccountLinkEvent),
    Unsend(&'a UnsendEvent),
    VideoPlayComplete(&'a VideoPlayCompleteEvent),
}

/// Encodes to the platform's wire shape; `Unknown` events re-emit their raw
/// JSON unchanged.
impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let tagged = match self {
            Self::Message(e) => TaggedEvent::Message(e),
            Self::Follow(e) => TaggedEvent::Follow(e),
            Self::Unfollow(e) => TaggedEvent::Unfollow(e),
            Self::Join(e) => TaggedEvent::Join(e),
            Self::Leave(e) => TaggedEvent::Leave(e),
            Self::Postback(e) => TaggedEvent::Postback(e),
            Self::Beacon(e) => TaggedEvent::Beacon(e),
            Self::MemberJoined(e) => TaggedEvent::MemberJoined(e),
            Self::MemberLeft(e) => TaggedEvent::MemberLeft(e),
            Self::AccountLink(e) => TaggedEvent::AccountLink(e),
            Self::Unsend(e) => TaggedEvent::Unsend(e),
            Self::VideoPlayComplete(e) => TaggedEvent::VideoPlayComplete(e),
            Self::Unknown(e) => return e.raw.serialize(serializer),
        };
        tagged.serialize(serializer)
    }
}
