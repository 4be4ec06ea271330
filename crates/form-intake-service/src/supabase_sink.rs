//! Supabase-backed [`DataSink`] implementation.
//!
//! Inserts ingestion records through Supabase's PostgREST API. The staging
//! table lives in a non-default logical schema, which PostgREST selects via
//! the `Content-Profile` header.
//!
//! The schema profile and credentials are installed as default headers on
//! the HTTP client at construction time — before any table is addressed —
//! so an insert can never be issued without the schema scope applied. This
//! makes the scope-before-target ordering a structural property rather than
//! a per-call convention.

use async_trait::async_trait;
use form_intake_core::webhook::{DataSink, IngestionRecord, SinkError};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tracing::{debug, instrument};

use crate::config::{ConfigError, SupabaseConfig};

/// [`DataSink`] writing to a PostgREST table in a named schema.
pub struct SupabaseSink {
    client: reqwest::Client,
    endpoint: String,
    table: String,
}

impl SupabaseSink {
    /// Build a sink from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the service-role key or schema
    /// name cannot be used as an HTTP header value, or when the HTTP client
    /// cannot be constructed.
    pub fn new(config: &SupabaseConfig) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();

        let mut api_key =
            HeaderValue::from_str(&config.service_role_key).map_err(|_| ConfigError::Invalid {
                message: "supabase.service_role_key is not a valid header value".to_string(),
            })?;
        api_key.set_sensitive(true);
        headers.insert("apikey", api_key);

        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", config.service_role_key))
            .map_err(|_| ConfigError::Invalid {
                message: "supabase.service_role_key is not a valid header value".to_string(),
            })?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        // Schema scope, fixed before any table is addressed.
        let profile =
            HeaderValue::from_str(&config.schema).map_err(|_| ConfigError::Invalid {
                message: format!("supabase.schema '{}' is not a valid header value", config.schema),
            })?;
        headers.insert("Content-Profile", profile);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ConfigError::Invalid {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        let endpoint = format!(
            "{}/rest/v1/{}",
            config.url.trim_end_matches('/'),
            config.table
        );

        Ok(Self {
            client,
            endpoint,
            table: config.table.clone(),
        })
    }
}

// Security: the client carries credentials in its default headers
impl std::fmt::Debug for SupabaseSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseSink")
            .field("endpoint", &self.endpoint)
            .field("credentials", &"<REDACTED>")
            .finish()
    }
}

#[async_trait]
impl DataSink for SupabaseSink {
    /// Insert one record.
    ///
    /// The request body comes from [`IngestionRecord::to_insert_document`],
    /// which embeds the payload verbatim, so the document sent to PostgREST
    /// carries the received body byte-identical.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Unavailable`] for transport failures and
    /// [`SinkError::Rejected`] for any non-2xx PostgREST response, with the
    /// response body preserved as operator-facing detail.
    #[instrument(skip(self, record), fields(table = %self.table, external_event_id = %record.external_event_id))]
    async fn insert(&self, record: &IngestionRecord) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header("Prefer", "return=minimal")
            .body(record.to_insert_document())
            .send()
            .await
            .map_err(|e| SinkError::Unavailable {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), "Sink insert accepted");
            return Ok(());
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable response body>".to_string());

        Err(SinkError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[cfg(test)]
#[path = "supabase_sink_tests.rs"]
mod tests;
