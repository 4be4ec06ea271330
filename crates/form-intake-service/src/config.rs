//! Service configuration.
//!
//! Configuration is layered in the following order, later sources overriding
//! earlier ones:
//!
//! 1. `/etc/form-intake/service.yaml` — system-wide defaults
//! 2. `./config/service.yaml` — deployment-local override
//! 3. Path given by `FORM_INTAKE_CONFIG_FILE` env — operator-specified file
//! 4. Environment variables prefixed `FI__` (double-underscore separator),
//!    e.g. `FI__SERVER__PORT=9090` sets `server.port = 9090`
//! 5. The provider-dictated plain environment variables `SUPABASE_URL` and
//!    `SUPABASE_SERVICE_ROLE_KEY`, which override the `supabase` section
//!
//! All fields carry serde defaults, so an entirely unconfigured environment
//! produces a valid config (which then fails [`ServiceConfig::validate`] on
//! the empty sink credentials). A malformed file or an environment variable
//! that cannot be coerced to the correct type is a hard error.
//!
//! The webhook signing secret (`TYPEFORM_SECRET`) is deliberately NOT part
//! of this struct: it is read fresh from the environment on every request by
//! [`crate::secret_provider::EnvSecretProvider`].

use serde::{Deserialize, Serialize};

// ============================================================================
// Configuration
// ============================================================================

/// Service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Webhook endpoint settings
    pub webhook: WebhookConfig,

    /// Data sink (Supabase/PostgREST) settings
    pub supabase: SupabaseConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Maximum request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            timeout_seconds: 30,
            shutdown_timeout_seconds: 30,
            max_body_size: 1024 * 1024, // 1MB; Typeform payloads are small
        }
    }
}

/// Webhook endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Webhook endpoint path
    pub endpoint_path: String,

    /// Header carrying the claimed signature
    pub signature_header: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            endpoint_path: "/webhook/typeform".to_string(),
            signature_header: "Typeform-Signature".to_string(),
        }
    }
}

/// Data sink configuration for the Supabase PostgREST API.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupabaseConfig {
    /// Project base URL, e.g. `https://xyzcompany.supabase.co`
    pub url: String,

    /// Service-role API key. Never logged.
    pub service_role_key: String,

    /// Logical schema holding the staging table
    pub schema: String,

    /// Staging table receiving ingestion records
    pub table: String,
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            service_role_key: String::new(),
            schema: "bronze".to_string(),
            table: "raw_responses_delta".to_string(),
        }
    }
}

// Security: don't expose the service-role key in debug output
impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("service_role_key", &"<REDACTED>")
            .field("schema", &self.schema)
            .field("table", &self.table)
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the layered sources described in the module
    /// docs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a source cannot be read or a value
    /// cannot be coerced to the expected type.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(
                config::File::with_name("/etc/form-intake/service")
                    .required(false)
                    .format(config::FileFormat::Yaml),
            )
            .add_source(
                config::File::with_name("config/service")
                    .required(false)
                    .format(config::FileFormat::Yaml),
            );

        // Optional explicit path supplied by the operator.
        if let Ok(explicit_path) = std::env::var("FORM_INTAKE_CONFIG_FILE") {
            if !explicit_path.is_empty() {
                builder = builder.add_source(
                    config::File::with_name(&explicit_path)
                        .required(true)
                        .format(config::FileFormat::Yaml),
                );
            }
        }

        let config = builder
            .add_source(config::Environment::with_prefix("FI").separator("__"))
            .build()?;

        let mut service_config: ServiceConfig = config.try_deserialize()?;

        // The sink credentials follow the provider's own variable names and
        // take precedence over anything in the files.
        if let Ok(url) = std::env::var("SUPABASE_URL") {
            if !url.is_empty() {
                service_config.supabase.url = url;
            }
        }
        if let Ok(key) = std::env::var("SUPABASE_SERVICE_ROLE_KEY") {
            if !key.is_empty() {
                service_config.supabase.service_role_key = key;
            }
        }

        Ok(service_config)
    }

    /// Validate the assembled configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] for absent sink credentials and
    /// [`ConfigError::Invalid`] for structurally wrong values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid {
                message: "server.port must be non-zero".to_string(),
            });
        }

        if !self.webhook.endpoint_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                message: format!(
                    "webhook.endpoint_path must start with '/', got '{}'",
                    self.webhook.endpoint_path
                ),
            });
        }

        if self.webhook.signature_header.is_empty() {
            return Err(ConfigError::Invalid {
                message: "webhook.signature_header must not be empty".to_string(),
            });
        }

        if self.supabase.url.is_empty() {
            return Err(ConfigError::Missing {
                key: "SUPABASE_URL".to_string(),
            });
        }

        if self.supabase.service_role_key.is_empty() {
            return Err(ConfigError::Missing {
                key: "SUPABASE_SERVICE_ROLE_KEY".to_string(),
            });
        }

        if self.supabase.schema.is_empty() || self.supabase.table.is_empty() {
            return Err(ConfigError::Invalid {
                message: "supabase.schema and supabase.table must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration loading failed: {0}")]
    Loading(#[from] config::ConfigError),
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
