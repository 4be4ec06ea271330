//! Common test utilities for form-intake integration tests
//!
//! This module provides:
//! - In-memory implementations of the core traits (SecretProvider, DataSink)
//! - Helper functions for building signed requests and application state

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue};
use form_intake_core::{
    signature::{compute_signature, SecretError, SecretProvider},
    webhook::{DataSink, IngestionRecord, SinkError, WebhookProcessor},
};
use form_intake_service::{AppState, ServiceConfig};
use std::sync::{Arc, Mutex};
use zeroize::Zeroizing;

/// Shared secret used by every test delivery.
pub const TEST_SECRET: &str = "integration-test-secret";

// ============================================================================
// Static Secret Provider
// ============================================================================

/// A [`SecretProvider`] returning a fixed secret, or none at all.
pub struct StaticSecretProvider {
    secret: Option<String>,
}

impl StaticSecretProvider {
    pub fn with_secret(secret: &str) -> Self {
        Self {
            secret: Some(secret.to_string()),
        }
    }

    #[allow(dead_code)]
    pub fn unconfigured() -> Self {
        Self { secret: None }
    }
}

#[async_trait]
impl SecretProvider for StaticSecretProvider {
    async fn webhook_secret(&self) -> Result<Zeroizing<String>, SecretError> {
        match &self.secret {
            Some(secret) => Ok(Zeroizing::new(secret.clone())),
            None => Err(SecretError::NotConfigured {
                key: "TYPEFORM_SECRET".to_string(),
            }),
        }
    }
}

// ============================================================================
// Recording Sink
// ============================================================================

/// A [`DataSink`] capturing every inserted row for later assertion.
#[derive(Default)]
pub struct RecordingSink {
    rows: Mutex<Vec<serde_json::Value>>,
    raw_rows: Mutex<Vec<String>>,
    failure: Mutex<Option<SinkError>>,
}

impl RecordingSink {
    pub fn rows(&self) -> Vec<serde_json::Value> {
        self.rows.lock().unwrap().clone()
    }

    /// The rows exactly as they would go over the wire; byte-level payload
    /// assertions go through these.
    pub fn raw_rows(&self) -> Vec<String> {
        self.raw_rows.lock().unwrap().clone()
    }

    pub fn insert_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    #[allow(dead_code)]
    pub fn fail_next(&self, error: SinkError) {
        *self.failure.lock().unwrap() = Some(error);
    }
}

#[async_trait]
impl DataSink for RecordingSink {
    async fn insert(&self, record: &IngestionRecord) -> Result<(), SinkError> {
        if let Some(error) = self.failure.lock().unwrap().take() {
            return Err(error);
        }
        let raw = record.to_insert_document();
        let row = serde_json::from_str(&raw).map_err(|e| SinkError::Rejected {
            status: 400,
            message: e.to_string(),
        })?;
        self.rows.lock().unwrap().push(row);
        self.raw_rows.lock().unwrap().push(raw);
        Ok(())
    }
}

// ============================================================================
// State and request builders
// ============================================================================

/// Build application state wired to a recording sink and the shared test
/// secret, returning the sink for assertions.
pub fn create_test_app_state() -> (AppState, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let processor = Arc::new(WebhookProcessor::new(
        Arc::new(StaticSecretProvider::with_secret(TEST_SECRET)),
        sink.clone(),
    ));
    (AppState::new(ServiceConfig::default(), processor), sink)
}

/// Headers carrying a valid signature for `body` under the test secret.
pub fn create_signed_headers(body: &[u8]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "Typeform-Signature",
        HeaderValue::from_str(&compute_signature(body, TEST_SECRET)).unwrap(),
    );
    headers
}
