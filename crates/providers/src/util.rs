//! Shared utility functions for provider adapters.

use sa_domain::config::AuthConfig;
use sa_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeout errors map to [`Error::Timeout`]; everything else maps to
/// [`Error::Http`].
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Resolve the API key from an [`AuthConfig`].
///
/// Precedence: direct `key` field (plaintext — warns), then `env` var.
pub fn resolve_api_key(auth: &AuthConfig) -> Result<String> {
    if let Some(ref key) = auth.key {
        tracing::warn!("API key loaded from plaintext config field 'key' — prefer 'env' instead");
        return Ok(key.clone());
    }

    if let Some(ref env_var) = auth.env {
        return std::env::var(env_var)
            .map_err(|_| Error::Auth(format!("environment variable '{}' not set or not valid UTF-8", env_var)));
    }

    Err(Error::Auth(
        "no auth credentials configured (set auth.env, auth.key, or auth.keys)".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_direct_key() {
        let auth = AuthConfig {
            key: Some("sk-test".into()),
            ..AuthConfig::default()
        };
        assert_eq!(resolve_api_key(&auth).unwrap(), "sk-test");
    }

    #[test]
    fn resolve_missing_credentials_errors() {
        let auth = AuthConfig::default();
        assert!(resolve_api_key(&auth).is_err());
    }

    #[test]
    fn resolve_env_var_missing_errors() {
        let auth = AuthConfig {
            env: Some("SA_TEST_NONEXISTENT_KEY_XYZ".into()),
            ..AuthConfig::default()
        };
        assert!(resolve_api_key(&auth).is_err());
    }
}
