//! # Form-Intake Service
//!
//! Binary entry point for the form-intake HTTP service.
//!
//! This executable:
//! - Loads configuration from environment and files
//! - Initializes structured logging
//! - Wires the secret provider and Supabase sink into the webhook processor
//! - Starts the HTTP server from form-intake-service

use form_intake_core::webhook::WebhookProcessor;
use form_intake_service::{
    secret_provider::EnvSecretProvider, start_server, supabase_sink::SupabaseSink, ServiceConfig,
    ServiceError,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // -------------------------------------------------------------------------
    // Load configuration
    //
    // Sources are layered (files, then FI__-prefixed environment variables,
    // then the provider-dictated SUPABASE_* variables); see the config module
    // docs for the exact order.  Absent files are fine because every field
    // carries a default; a malformed file or an uncoercible environment
    // variable IS a hard error because it indicates deliberate-but-broken
    // operator configuration.
    // -------------------------------------------------------------------------
    let service_config = match ServiceConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            init_logging_fallback();
            error!(error = %e, "Failed to load configuration; aborting");
            std::process::exit(3);
        }
    };

    init_logging(&service_config);

    info!("Starting Form-Intake Service");

    if let Err(e) = service_config.validate() {
        error!(
            error = %e,
            "Service configuration is invalid; aborting. \
             Fix the configuration and restart."
        );
        std::process::exit(3);
    }

    // -------------------------------------------------------------------------
    // Wire the processing pipeline
    //
    // The signing secret is NOT loaded here: EnvSecretProvider reads
    // TYPEFORM_SECRET fresh on every request, so rotation takes effect
    // without a restart.  An absent secret surfaces later as a 401 on each
    // delivery rather than a startup failure.
    // -------------------------------------------------------------------------
    let secrets = Arc::new(EnvSecretProvider::new());

    let sink = match SupabaseSink::new(&service_config.supabase) {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            error!(error = %e, "Failed to construct Supabase sink; aborting");
            std::process::exit(3);
        }
    };

    let processor = Arc::new(WebhookProcessor::new(secrets, sink));

    info!(
        host = %service_config.server.host,
        port = service_config.server.port,
        endpoint = %service_config.webhook.endpoint_path,
        "Starting HTTP server"
    );

    // Start the server
    if let Err(e) = start_server(service_config, processor).await {
        error!("Failed to start server: {}", e);

        let exit_code = match e {
            ServiceError::BindFailed { .. } => 1,
            ServiceError::ServerFailed { .. } => 2,
            ServiceError::Configuration(_) => 3,
        };

        std::process::exit(exit_code);
    }

    Ok(())
}

// ============================================================================
// Private helpers
// ============================================================================

/// Initialize logging from the loaded configuration.
///
/// `RUST_LOG` overrides the configured level when set.
fn init_logging(config: &ServiceConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "form_intake_service={level},form_intake_core={level},tower_http=debug",
            level = config.logging.level
        )
        .into()
    });

    if config.logging.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Minimal logging for the window before configuration is available.
fn init_logging_fallback() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "form_intake_service=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
