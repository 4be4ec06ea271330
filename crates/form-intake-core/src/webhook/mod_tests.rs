//! Tests for [`WebhookProcessor`] and [`IngestionRecord`].
//!
//! Exercises the linear pipeline with in-memory fixtures for the secret
//! source and the data sink: authentication outcomes, field extraction,
//! verbatim payload preservation, and sink failure propagation.

use super::*;
use crate::signature::{compute_signature, SecretError, SecretProvider};
use std::sync::Mutex;
use zeroize::Zeroizing;

const TEST_SECRET: &str = "test-signing-secret";

// ============================================================================
// Fixtures
// ============================================================================

struct StaticSecret;

#[async_trait]
impl SecretProvider for StaticSecret {
    async fn webhook_secret(&self) -> Result<Zeroizing<String>, SecretError> {
        Ok(Zeroizing::new(TEST_SECRET.to_string()))
    }
}

struct NoSecret;

#[async_trait]
impl SecretProvider for NoSecret {
    async fn webhook_secret(&self) -> Result<Zeroizing<String>, SecretError> {
        Err(SecretError::NotConfigured {
            key: "TYPEFORM_SECRET".to_string(),
        })
    }
}

/// Recording sink that captures every inserted row as serialized JSON.
#[derive(Default)]
struct RecordingSink {
    inserts: Mutex<Vec<serde_json::Value>>,
    fail_with: Mutex<Option<SinkError>>,
}

impl RecordingSink {
    fn insert_count(&self) -> usize {
        self.inserts.lock().unwrap().len()
    }

    fn last_insert(&self) -> serde_json::Value {
        self.inserts.lock().unwrap().last().cloned().unwrap()
    }

    fn set_failure(&self, error: SinkError) {
        *self.fail_with.lock().unwrap() = Some(error);
    }
}

#[async_trait]
impl DataSink for RecordingSink {
    async fn insert(&self, record: &IngestionRecord) -> Result<(), SinkError> {
        if let Some(error) = self.fail_with.lock().unwrap().take() {
            return Err(error);
        }

        let row = serde_json::from_str(&record.to_insert_document()).unwrap();
        self.inserts.lock().unwrap().push(row);
        Ok(())
    }
}

fn processor_with_sink(sink: Arc<RecordingSink>) -> WebhookProcessor {
    WebhookProcessor::new(Arc::new(StaticSecret), sink)
}

fn signed_request(body: &str) -> WebhookRequest {
    let signature = compute_signature(body.as_bytes(), TEST_SECRET);
    WebhookRequest::new(Some(signature), Bytes::from(body.to_string()))
}

const FULL_BODY: &str =
    r#"{"event_id":"ev1","form_response":{"token":"tok1","hidden":{"user_id":"u1"}}}"#;

// ============================================================================
// process: authentication outcomes
// ============================================================================

mod authentication_tests {
    use super::*;

    /// A correctly signed delivery is accepted and persisted.
    #[tokio::test]
    async fn test_valid_delivery_persisted() {
        let sink = Arc::new(RecordingSink::default());
        let processor = processor_with_sink(sink.clone());

        let result = processor.process(&signed_request(FULL_BODY)).await;

        let receipt = result.expect("signed delivery should succeed");
        assert_eq!(receipt.external_event_id, "ev1");
        assert_eq!(receipt.response_token, "tok1");
        assert_eq!(sink.insert_count(), 1);
    }

    /// A missing signature header is rejected without touching the sink,
    /// regardless of body content.
    #[tokio::test]
    async fn test_missing_signature_rejected_without_insert() {
        let sink = Arc::new(RecordingSink::default());
        let processor = processor_with_sink(sink.clone());

        let request = WebhookRequest::new(None, Bytes::from(FULL_BODY));
        let result = processor.process(&request).await;

        assert!(matches!(result, Err(WebhookError::Unauthorized)));
        assert_eq!(sink.insert_count(), 0, "no insert on unauthenticated request");
    }

    /// A wrong signature is rejected without touching the sink.
    #[tokio::test]
    async fn test_mismatched_signature_rejected_without_insert() {
        let sink = Arc::new(RecordingSink::default());
        let processor = processor_with_sink(sink.clone());

        let wrong = compute_signature(b"different body", TEST_SECRET);
        let request = WebhookRequest::new(Some(wrong), Bytes::from(FULL_BODY));
        let result = processor.process(&request).await;

        assert!(matches!(result, Err(WebhookError::Unauthorized)));
        assert_eq!(sink.insert_count(), 0);
    }

    /// An unavailable secret collapses into the same generic unauthorized
    /// outcome as a mismatch.
    #[tokio::test]
    async fn test_missing_secret_rejected_as_unauthorized() {
        let sink = Arc::new(RecordingSink::default());
        let processor = WebhookProcessor::new(Arc::new(NoSecret), sink.clone());

        let result = processor.process(&signed_request(FULL_BODY)).await;

        assert!(matches!(result, Err(WebhookError::Unauthorized)));
        assert_eq!(sink.insert_count(), 0);
    }

    /// The unauthorized error renders a generic message with no detail
    /// about which check failed.
    #[test]
    fn test_unauthorized_message_is_generic() {
        assert_eq!(WebhookError::Unauthorized.to_string(), "Unauthorized");
    }
}

// ============================================================================
// process: payload handling
// ============================================================================

mod payload_tests {
    use super::*;

    /// An authentic but unparseable body is a processing error, not an
    /// authentication error.
    #[tokio::test]
    async fn test_signed_non_json_is_malformed_not_unauthorized() {
        let sink = Arc::new(RecordingSink::default());
        let processor = processor_with_sink(sink.clone());

        let result = processor.process(&signed_request("not-json")).await;

        assert!(matches!(result, Err(WebhookError::MalformedPayload { .. })));
        assert_eq!(sink.insert_count(), 0, "no insert on malformed payload");
    }

    /// A missing hidden user id is tolerated and stored as null.
    #[tokio::test]
    async fn test_missing_hidden_user_id_stored_as_null() {
        let sink = Arc::new(RecordingSink::default());
        let processor = processor_with_sink(sink.clone());

        let body = r#"{"event_id":"ev2","form_response":{"token":"tok2"}}"#;
        let result = processor.process(&signed_request(body)).await;

        assert!(result.is_ok());
        let row = sink.last_insert();
        assert_eq!(row["user_id"], serde_json::Value::Null);
        assert_eq!(row["external_event_id"], "ev2");
    }

    /// Missing required fields fail the request after authentication.
    #[tokio::test]
    async fn test_missing_event_id_rejected() {
        let sink = Arc::new(RecordingSink::default());
        let processor = processor_with_sink(sink.clone());

        let body = r#"{"form_response":{"token":"tok1"}}"#;
        let result = processor.process(&signed_request(body)).await;

        assert!(
            matches!(result, Err(WebhookError::MissingField { ref field }) if field == "event_id")
        );
        assert_eq!(sink.insert_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_response_token_rejected() {
        let sink = Arc::new(RecordingSink::default());
        let processor = processor_with_sink(sink.clone());

        let body = r#"{"event_id":"ev1","form_response":{}}"#;
        let result = processor.process(&signed_request(body)).await;

        assert!(matches!(
            result,
            Err(WebhookError::MissingField { ref field }) if field == "form_response.token"
        ));
    }

    /// The inserted row carries every staged column.
    #[tokio::test]
    async fn test_row_columns() {
        let sink = Arc::new(RecordingSink::default());
        let processor = processor_with_sink(sink.clone());

        processor
            .process(&signed_request(FULL_BODY))
            .await
            .expect("delivery should succeed");

        let row = sink.last_insert();
        assert_eq!(row["user_id"], "u1");
        assert_eq!(row["source_platform"], "typeform");
        assert_eq!(row["external_event_id"], "ev1");
        assert_eq!(row["response_token"], "tok1");
        assert_eq!(row["ingestion_method"], "webhook");
        assert_eq!(row["is_processed"], false);
    }
}

// ============================================================================
// IngestionRecord: verbatim payload preservation
// ============================================================================

mod verbatim_payload_tests {
    use super::*;

    /// The stored payload must be byte-identical to the received body —
    /// key order and whitespace included — so reprocessing can re-verify
    /// the signature.
    #[test]
    fn test_payload_preserved_byte_identical() {
        // Deliberately odd key order and spacing; a re-serialized copy
        // would normalize both.
        let body = "{\"form_response\": {\"token\":\"tok1\"} , \"event_id\":\"ev1\"}";

        let record = IngestionRecord::from_verified_body(body.as_bytes()).unwrap();

        assert_eq!(record.payload, body);
    }

    /// Leading and trailing padding around the JSON value is valid input,
    /// passes parsing, and must survive in the stored payload byte-for-byte.
    #[test]
    fn test_surrounding_whitespace_preserved() {
        let body = " {\"event_id\":\"ev1\",\"form_response\":{\"token\":\"tok1\"}}\n";

        let record = IngestionRecord::from_verified_body(body.as_bytes()).unwrap();

        assert_eq!(record.payload, body, "padding must not be trimmed");

        let document = record.to_insert_document();
        assert!(
            document.contains(body),
            "insert document must embed the padded body: {}",
            document
        );
        // The padding lands inside the envelope, so the document stays
        // well-formed JSON.
        let parsed: serde_json::Value = serde_json::from_str(&document).unwrap();
        assert_eq!(parsed["payload"]["event_id"], "ev1");
    }

    /// The insert document embeds the payload verbatim.
    #[test]
    fn test_insert_document_embeds_raw_payload() {
        let body = r#"{"event_id":"ev9","form_response":{"token":"tok9"},"extra":[1,2,3]}"#;

        let record = IngestionRecord::from_verified_body(body.as_bytes()).unwrap();
        let document = record.to_insert_document();

        assert!(
            document.contains(body),
            "insert document must embed the original body text: {}",
            document
        );
    }

    /// Invalid UTF-8 is a malformed payload, not a panic.
    #[test]
    fn test_invalid_utf8_rejected() {
        let result = IngestionRecord::from_verified_body(&[0xff, 0xfe, 0x00]);
        assert!(matches!(result, Err(WebhookError::MalformedPayload { .. })));
    }
}

// ============================================================================
// Sink failure propagation
// ============================================================================

mod sink_failure_tests {
    use super::*;

    /// A rejected insert surfaces as a sink error with detail preserved.
    #[tokio::test]
    async fn test_sink_rejection_propagated() {
        let sink = Arc::new(RecordingSink::default());
        sink.set_failure(SinkError::Rejected {
            status: 409,
            message: "duplicate key value violates unique constraint".to_string(),
        });
        let processor = processor_with_sink(sink.clone());

        let result = processor.process(&signed_request(FULL_BODY)).await;

        match result {
            Err(WebhookError::Sink(SinkError::Rejected { status, .. })) => {
                assert_eq!(status, 409);
            }
            other => panic!("expected sink rejection, got {:?}", other.map(|r| r.external_event_id)),
        }
    }

    /// Error categories distinguish rejection from unavailability.
    #[test]
    fn test_error_categories() {
        assert_eq!(
            WebhookError::Unauthorized.error_category(),
            ErrorCategory::Security
        );
        assert_eq!(
            WebhookError::MalformedPayload {
                message: "x".to_string()
            }
            .error_category(),
            ErrorCategory::Permanent
        );
        assert_eq!(
            WebhookError::Sink(SinkError::Unavailable {
                message: "connection refused".to_string()
            })
            .error_category(),
            ErrorCategory::Transient
        );
        assert_eq!(
            WebhookError::Sink(SinkError::Rejected {
                status: 400,
                message: "bad row".to_string()
            })
            .error_category(),
            ErrorCategory::Permanent
        );
    }
}
