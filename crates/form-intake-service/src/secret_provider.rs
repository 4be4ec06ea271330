//! Production [`SecretProvider`] implementation for the service binary.
//!
//! The signing secret is read from the process environment on every call,
//! never cached, so a rotated secret takes effect on the next request
//! without a restart.

use async_trait::async_trait;
use form_intake_core::signature::{SecretError, SecretProvider};
use zeroize::Zeroizing;

/// Environment variable holding the shared Typeform signing secret.
pub const SECRET_ENV_VAR: &str = "TYPEFORM_SECRET";

/// A [`SecretProvider`] backed by a process environment variable.
///
/// An unset or empty variable is reported as [`SecretError::NotConfigured`];
/// callers collapse that into the same unauthorized outcome as a signature
/// mismatch, so the response never reveals that the service is
/// misconfigured.
pub struct EnvSecretProvider {
    var: String,
}

impl EnvSecretProvider {
    /// Construct a provider reading [`SECRET_ENV_VAR`].
    pub fn new() -> Self {
        Self::with_var(SECRET_ENV_VAR)
    }

    /// Construct a provider reading a custom variable name.
    pub fn with_var(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvSecretProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EnvSecretProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The variable NAME is not sensitive; its value is never stored here.
        f.debug_struct("EnvSecretProvider")
            .field("var", &self.var)
            .finish()
    }
}

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    /// Read the secret fresh from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::NotConfigured`] when the variable is unset,
    /// empty, or not valid Unicode.
    async fn webhook_secret(&self) -> Result<Zeroizing<String>, SecretError> {
        match std::env::var(&self.var) {
            Ok(value) if !value.is_empty() => Ok(Zeroizing::new(value)),
            _ => Err(SecretError::NotConfigured {
                key: self.var.clone(),
            }),
        }
    }
}

#[cfg(test)]
#[path = "secret_provider_tests.rs"]
mod tests;
