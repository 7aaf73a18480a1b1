//! Webhook signature handling
//!
//! The platform signs each request body with HMAC-SHA256 keyed by the
//! channel secret and sends the base64-encoded digest in the
//! `X-Line-Signature` header. The digest covers the exact transmitted bytes,
//! so verification must run on the body as received.

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use linebot_core::ChannelSecret;
use sha2::Sha256;
use std::fmt;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the request signature
pub const SIGNATURE_HEADER: &str = "X-Line-Signature";

/// Why a signature was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationFailure {
    /// Header absent or empty
    MissingHeader,
    /// No channel secret configured
    EmptySecret,
    /// Header is not valid base64
    MalformedHeader,
    /// Digest does not match the body
    DigestMismatch,
}

impl VerificationFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingHeader => "missing_header",
            Self::EmptySecret => "empty_secret",
            Self::MalformedHeader => "malformed_header",
            Self::DigestMismatch => "digest_mismatch",
        }
    }
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingHeader => write!(f, "missing '{}' header", SIGNATURE_HEADER),
            Self::EmptySecret => write!(f, "channel secret is empty"),
            Self::MalformedHeader => write!(f, "signature header is not valid base64"),
            Self::DigestMismatch => write!(f, "signature does not match request body"),
        }
    }
}

/// Outcome of a signature check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationResult {
    Verified,
    Rejected(VerificationFailure),
}

impl VerificationResult {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }

    pub fn failure(&self) -> Option<VerificationFailure> {
        match self {
            Self::Verified => None,
            Self::Rejected(reason) => Some(*reason),
        }
    }

    pub fn into_result(self) -> Result<(), VerificationFailure> {
        match self {
            Self::Verified => Ok(()),
            Self::Rejected(reason) => Err(reason),
        }
    }
}

/// Verify `signature_header` against `raw_body`.
///
/// The digest comparison is constant time; the header is decoded before any
/// comparison happens, and a decode failure is reported on its own.
pub fn verify(
    raw_body: &[u8],
    signature_header: Option<&str>,
    secret: &ChannelSecret,
) -> VerificationResult {
    let result = check(raw_body, signature_header, secret);
    if let VerificationResult::Rejected(reason) = result {
        debug!(reason = reason.as_str(), body_len = raw_body.len(), "Signature rejected");
    }
    result
}

fn check(
    raw_body: &[u8],
    signature_header: Option<&str>,
    secret: &ChannelSecret,
) -> VerificationResult {
    let header = match signature_header {
        Some(value) if !value.is_empty() => value,
        _ => return VerificationResult::Rejected(VerificationFailure::MissingHeader),
    };

    if secret.is_empty() {
        return VerificationResult::Rejected(VerificationFailure::EmptySecret);
    }

    let provided = match STANDARD.decode(header) {
        Ok(digest) => digest,
        Err(_) => return VerificationResult::Rejected(VerificationFailure::MalformedHeader),
    };

    // HMAC accepts keys of any length.
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return VerificationResult::Rejected(VerificationFailure::EmptySecret);
    };
    mac.update(raw_body);

    match mac.verify_slice(&provided) {
        Ok(()) => VerificationResult::Verified,
        Err(_) => VerificationResult::Rejected(VerificationFailure::DigestMismatch),
    }
}

/// Produces `X-Line-Signature` values for a channel
pub struct WebhookSigner {
    secret: ChannelSecret,
}

impl WebhookSigner {
    pub fn new(secret: impl Into<ChannelSecret>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Base64-encoded HMAC-SHA256 of `payload`
    pub fn sign(&self, payload: &[u8]) -> String {
        // HMAC accepts keys of any length, so this never returns early. An
        // empty value would be rejected by `verify` as a missing header.
        let Ok(mut mac) = HmacSha256::new_from_slice(self.secret.as_bytes()) else {
            return String::new();
        };
        mac.update(payload);
        STANDARD.encode(mac.finalize().into_bytes())
    }

    /// Header name and value for a signed request
    pub fn header(&self, payload: &[u8]) -> (&'static str, String) {
        (SIGNATURE_HEADER, self.sign(payload))
    }
}
