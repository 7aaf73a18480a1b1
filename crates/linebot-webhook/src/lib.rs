//! Webhook support for the LINE Bot SDK
//!
//! This crate authenticates and decodes webhook callbacks pushed by the
//! LINE Messaging API:
//! - Signature verification (`X-Line-Signature`, HMAC-SHA256, base64)
//! - Typed event model with an explicit `Unknown` fallback
//! - Registry of per-event-type decode strategies
//! - Batch decoding with per-event isolation
//! - An axum receiver that hands decoded events to application handlers
//!
//! # Example
//!
//! ```rust,ignore
//! use linebot_core::ChannelSecret;
//! use linebot_webhook::{Event, RawWebhookRequest, WebhookDispatcher};
//!
//! let secret = ChannelSecret::from("channel-secret");
//! let dispatcher = WebhookDispatcher::new();
//!
//! let request = RawWebhookRequest::new(body, signature_header);
//! match dispatcher.handle(&request, &secret) {
//!     Ok(batch) => {
//!         for event in batch.iter() {
//!             if let Event::Follow(follow) = event {
//!                 println!("followed by {:?}", follow.envelope.source);
//!             }
//!         }
//!     }
//!     Err(e) => return (e.status_code(), e.to_string()),
//! }
//! ```

// Module order matters due to dependencies
pub mod signature;
pub mod events;
pub mod registry;
pub mod decoder;
pub mod dispatcher;
pub mod inbound;

pub use decoder::*;
pub use dispatcher::*;
pub use events::*;
pub use inbound::*;
pub use registry::*;
pub use signature::*;

pub use linebot_core::ChannelSecret;

use thiserror::Error;

/// Batch-level decode failure. Problems inside a single event never
/// surface here; they become [`Event::Unknown`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),
}

/// Errors returned by [`WebhookDispatcher::handle`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Unauthorized: {0}")]
    Unauthorized(VerificationFailure),

    #[error("Bad payload: {0}")]
    BadPayload(#[from] DecodeError),
}

impl DispatchError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            DispatchError::Unauthorized(_) => 401,
            DispatchError::BadPayload(_) => 400,
        }
    }

    /// Get error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            DispatchError::Unauthorized(_) => "UNAUTHORIZED",
            DispatchError::BadPayload(_) => "BAD_PAYLOAD",
        }
    }
}

/// Error returned by application event handlers
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Event handling failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
