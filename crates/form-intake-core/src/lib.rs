//! # Form-Intake Core
//!
//! Core business logic for the form-intake webhook receiver.
//!
//! This crate contains the domain logic for authenticating Typeform webhook
//! deliveries, extracting the staging-row fields from the payload, and
//! handing the resulting record to a data sink for persistence.
//!
//! ## Architecture
//!
//! The core follows clean architecture principles:
//! - Business logic depends only on trait abstractions
//! - Infrastructure implementations are injected at runtime
//! - All external dependencies (secret source, data sink) are abstracted
//!   behind traits
//!
//! ## Usage
//!
//! ```rust
//! use form_intake_core::Timestamp;
//!
//! let received_at = Timestamp::now();
//! assert!(!received_at.to_rfc3339().is_empty());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Time Types
// ============================================================================

/// UTC timestamp with microsecond precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current moment
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Parse timestamp from RFC3339 string
    pub fn from_rfc3339(s: &str) -> Result<Self, ParseError> {
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|_| ParseError::InvalidFormat {
                expected: "RFC3339 datetime".to_string(),
                actual: s.to_string(),
            })?
            .with_timezone(&Utc);
        Ok(Self(dt))
    }

    /// Convert to RFC3339 string
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// High-level error categorization for logging and alerting decisions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Temporary failures that may succeed on redelivery
    Transient,
    /// Permanent failures that won't succeed on redelivery
    Permanent,
    /// Security-related failures requiring attention
    Security,
    /// Configuration errors preventing correct operation
    Configuration,
}

/// Error type for string parsing failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid format: expected {expected}, got '{actual}'")]
    InvalidFormat { expected: String, actual: String },
}

// ============================================================================
// Module declarations
// ============================================================================

/// Webhook signature verification
pub mod signature;

/// Webhook request processing and ingestion records
pub mod webhook;

// Re-export key types for convenience
pub use signature::{SecretError, SecretProvider, SignatureVerifier};
pub use webhook::{
    DataSink, IngestionReceipt, IngestionRecord, SinkError, WebhookError, WebhookProcessor,
    WebhookRequest,
};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
