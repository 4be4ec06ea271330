//! # Webhook Processing Module
//!
//! Handles Typeform webhook authentication, field extraction, and staging
//! persistence.
//!
//! The processing pipeline is strictly linear per request:
//! verify signature → parse payload → build ingestion record → insert row.
//! An [`IngestionRecord`] is only ever constructed after successful signature
//! verification; no record is persisted from an unauthenticated request.

use crate::signature::{SecretProvider, SignatureVerifier};
use crate::{ErrorCategory, Timestamp};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Platform identifier stamped on every ingestion record.
pub const SOURCE_PLATFORM: &str = "typeform";

/// Ingestion-method tag stamped on every ingestion record.
pub const INGESTION_METHOD: &str = "webhook";

// ============================================================================
// Core Types
// ============================================================================

/// Raw HTTP request data from a Typeform webhook delivery.
///
/// Immutable once received; exists only for the duration of one call.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    /// Claimed signature from the `Typeform-Signature` header, if present
    pub signature: Option<String>,
    /// The full request body, exactly as received
    pub body: Bytes,
    pub received_at: Timestamp,
}

impl WebhookRequest {
    /// Create new webhook request
    pub fn new(signature: Option<String>, body: Bytes) -> Self {
        Self {
            signature,
            body,
            received_at: Timestamp::now(),
        }
    }

    /// Get claimed signature if present
    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }
}

/// Staging row persisted to the bronze layer for later processing.
///
/// Created once, inserted once, never mutated by this component; downstream
/// consumers flip `is_processed` later.
///
/// The row deliberately does not implement `Serialize`: the payload must
/// reach the sink byte-identical to what was received and verified, and
/// serde's raw-value handling strips surrounding whitespace. The wire
/// document is rendered by [`IngestionRecord::to_insert_document`] instead.
#[derive(Debug)]
pub struct IngestionRecord {
    /// Optional user identifier from `form_response.hidden.user_id`
    pub user_id: Option<String>,
    /// Always [`SOURCE_PLATFORM`]
    pub source_platform: &'static str,
    /// Unique provider-side event id (`event_id`)
    pub external_event_id: String,
    /// Response token (`form_response.token`)
    pub response_token: String,
    /// Always [`INGESTION_METHOD`]
    pub ingestion_method: &'static str,
    /// The full original payload text, byte-identical to what was received
    /// and verified. Key order, whitespace, and any leading or trailing
    /// padding survive, so reprocessing can re-verify the signature.
    pub payload: String,
    /// Always `false` on insert
    pub is_processed: bool,
}

/// Scalar columns of the staging row. The payload is spliced in separately
/// by [`IngestionRecord::to_insert_document`].
#[derive(Serialize)]
struct ScalarColumns<'a> {
    user_id: Option<&'a str>,
    source_platform: &'static str,
    external_event_id: &'a str,
    response_token: &'a str,
    ingestion_method: &'static str,
    is_processed: bool,
}

impl IngestionRecord {
    /// Build an ingestion record from a verified raw body.
    ///
    /// The body must already have passed signature verification. Field
    /// extraction tolerates a missing `form_response.hidden.user_id` (stored
    /// as null) but requires `event_id` and `form_response.token`.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError::MalformedPayload`] when the body is not valid
    /// JSON (or not valid UTF-8), and [`WebhookError::MissingField`] when a
    /// required field is absent or not a string.
    pub fn from_verified_body(body: &[u8]) -> Result<Self, WebhookError> {
        let text = std::str::from_utf8(body).map_err(|e| WebhookError::MalformedPayload {
            message: format!("body is not valid UTF-8: {}", e),
        })?;

        let parsed: serde_json::Value =
            serde_json::from_str(text).map_err(|e| WebhookError::MalformedPayload {
                message: format!("body is not valid JSON: {}", e),
            })?;

        let external_event_id = parsed
            .get("event_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| WebhookError::MissingField {
                field: "event_id".to_string(),
            })?
            .to_string();

        let form_response =
            parsed
                .get("form_response")
                .ok_or_else(|| WebhookError::MissingField {
                    field: "form_response".to_string(),
                })?;

        let response_token = form_response
            .get("token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| WebhookError::MissingField {
                field: "form_response.token".to_string(),
            })?
            .to_string();

        // Optional hidden user identifier; absence is not an error.
        let user_id = form_response
            .get("hidden")
            .and_then(|h| h.get("user_id"))
            .and_then(|v| v.as_str())
            .map(String::from);

        Ok(Self {
            user_id,
            source_platform: SOURCE_PLATFORM,
            external_event_id,
            response_token,
            ingestion_method: INGESTION_METHOD,
            // The exact received text, not a re-serialization of `parsed`.
            payload: text.to_string(),
            is_processed: false,
        })
    }

    /// Render the row as the JSON document to insert.
    ///
    /// The scalar columns go through serde; the payload is spliced in as raw
    /// text so the document embeds the received body byte-for-byte.
    /// `serde_json::value::RawValue` cannot carry surrounding whitespace
    /// (`from_string` trims to the value span), which is why the payload
    /// bypasses serde entirely. The payload already parsed as JSON in
    /// [`Self::from_verified_body`], so the spliced document stays valid:
    /// any padding becomes insignificant whitespace inside the envelope.
    pub fn to_insert_document(&self) -> String {
        let columns = ScalarColumns {
            user_id: self.user_id.as_deref(),
            source_platform: self.source_platform,
            external_event_id: &self.external_event_id,
            response_token: &self.response_token,
            ingestion_method: self.ingestion_method,
            is_processed: self.is_processed,
        };

        let mut document = serde_json::to_string(&columns)
            .expect("scalar columns contain only strings and booleans");
        document.truncate(document.len() - 1);
        document.push_str(",\"payload\":");
        document.push_str(&self.payload);
        document.push('}');
        document
    }
}

/// Summary of a successfully persisted delivery, for logging and responses.
#[derive(Debug, Clone)]
pub struct IngestionReceipt {
    pub external_event_id: String,
    pub response_token: String,
    pub received_at: Timestamp,
}

// ============================================================================
// Error Types
// ============================================================================

/// Top-level error for webhook processing failures
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// Authentication failure: missing signature, missing secret, or
    /// signature mismatch. Intentionally carries no detail so the response
    /// cannot be used as an oracle for which check failed.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Malformed payload: {message}")]
    MalformedPayload { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Sink insert failed: {0}")]
    Sink(#[from] SinkError),
}

impl WebhookError {
    /// Get error category for logging and alerting
    pub fn error_category(&self) -> ErrorCategory {
        match self {
            Self::Unauthorized => ErrorCategory::Security,
            Self::MalformedPayload { .. } => ErrorCategory::Permanent,
            Self::MissingField { .. } => ErrorCategory::Permanent,
            Self::Sink(sink_error) => {
                if sink_error.is_transient() {
                    ErrorCategory::Transient
                } else {
                    ErrorCategory::Permanent
                }
            }
        }
    }
}

/// Errors reported by the data sink's insert path
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Sink rejected insert (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Sink not reachable: {message}")]
    Unavailable { message: String },
}

impl SinkError {
    /// Check if the failure might succeed on provider redelivery
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Rejected { .. } => false,
            Self::Unavailable { .. } => true,
        }
    }
}

// ============================================================================
// Core Operations (Traits)
// ============================================================================

/// Interface for persisting ingestion records.
///
/// The destination store is opaque beyond this insert contract. Each delivery
/// attempt is independent: no retries, no de-duplication, no batching.
#[async_trait]
pub trait DataSink: Send + Sync {
    /// Insert one ingestion record into the staging layer.
    async fn insert(&self, record: &IngestionRecord) -> Result<(), SinkError>;
}

// ============================================================================
// Webhook Processor
// ============================================================================

/// Processes one webhook delivery end to end.
///
/// Dependency-injected with the secret source and the data sink so that
/// tests can substitute fixtures for both collaborators.
pub struct WebhookProcessor {
    verifier: SignatureVerifier,
    sink: Arc<dyn DataSink>,
}

impl WebhookProcessor {
    /// Create a new processor.
    ///
    /// # Arguments
    ///
    /// * `secrets` - Source of the shared signing secret, resolved per request
    /// * `sink` - Destination for ingestion records
    pub fn new(secrets: Arc<dyn SecretProvider>, sink: Arc<dyn DataSink>) -> Self {
        Self {
            verifier: SignatureVerifier::new(secrets),
            sink,
        }
    }

    /// Process one delivery: authenticate, extract, persist.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError::Unauthorized`] when the signature header is
    /// absent, the secret is unavailable, or the signature does not match —
    /// all three cases are indistinguishable to the caller. Returns
    /// [`WebhookError::MalformedPayload`] / [`WebhookError::MissingField`]
    /// when an authenticated body cannot be parsed, and
    /// [`WebhookError::Sink`] when the insert fails. No insert is attempted
    /// on any earlier failure.
    pub async fn process(&self, request: &WebhookRequest) -> Result<IngestionReceipt, WebhookError> {
        // Short-circuit before invoking the verifier with undefined input.
        let claimed = match request.signature() {
            Some(s) => s,
            None => return Err(WebhookError::Unauthorized),
        };

        let authentic = match self.verifier.verify(&request.body, claimed).await {
            Ok(v) => v,
            Err(e) => {
                // Operator problem, not caller problem. Logged without
                // signature detail; the caller still sees a generic 401.
                warn!(error = %e, "Webhook secret unavailable; rejecting delivery");
                return Err(WebhookError::Unauthorized);
            }
        };

        if !authentic {
            return Err(WebhookError::Unauthorized);
        }

        // Only now is the payload trusted enough to parse.
        let record = IngestionRecord::from_verified_body(&request.body)?;

        let receipt = IngestionReceipt {
            external_event_id: record.external_event_id.clone(),
            response_token: record.response_token.clone(),
            received_at: request.received_at,
        };

        if let Err(e) = self.sink.insert(&record).await {
            error!(
                external_event_id = %receipt.external_event_id,
                error = %e,
                "Sink insert failed"
            );
            return Err(WebhookError::Sink(e));
        }

        info!(
            external_event_id = %receipt.external_event_id,
            response_token = %receipt.response_token,
            "Webhook delivery persisted"
        );

        Ok(receipt)
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
