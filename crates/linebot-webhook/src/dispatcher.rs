//! Webhook dispatcher
//!
//! Entry point for transports: verifies the signature, then decodes. A body
//! is never parsed before its signature has been accepted.

use crate::decoder::{EventDecoder, WebhookBatch};
use crate::signature;
use crate::{DispatchError, Result};
use bytes::Bytes;
use linebot_core::ChannelSecret;
use tracing::{info, warn};

/// A webhook request exactly as received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawWebhookRequest {
    body: Bytes,
    signature: Option<String>,
}

impl RawWebhookRequest {
    pub fn new(body: impl Into<Bytes>, signature: Option<String>) -> Self {
        Self {
            body: body.into(),
            signature,
        }
    }

    pub fn signed(body: impl Into<Bytes>, signature: impl Into<String>) -> Self {
        Self::new(body, Some(signature.into()))
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }
}

/// Verifies and decodes webhook requests
#[derive(Debug, Clone, Default)]
pub struct WebhookDispatcher {
    decoder: EventDecoder,
}

impl WebhookDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decoder(decoder: EventDecoder) -> Self {
        Self { decoder }
    }

    pub fn decoder(&self) -> &EventDecoder {
        &self.decoder
    }

    /// Verify `request` against `secret` and decode its events
    pub fn handle(
        &self,
        request: &RawWebhookRequest,
        secret: &ChannelSecret,
    ) -> Result<WebhookBatch> {
        if let Err(reason) =
            signature::verify(request.body(), request.signature(), secret).into_result()
        {
            warn!(reason = reason.as_str(), "Webhook signature verification failed");
            return Err(DispatchError::Unauthorized(reason));
        }

        let batch = self.decoder.decode(request.body()).map_err(|e| {
            warn!(error = %e, "Failed to decode webhook payload");
            DispatchError::BadPayload(e)
        })?;

        info!(
            events = batch.len(),
            destination = batch.destination.as_deref().unwrap_or(""),
            "Received webhook batch"
        );

        Ok(batch)
    }
}
