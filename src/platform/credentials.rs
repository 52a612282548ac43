//! Bearer tokens for the GKE and Kubernetes APIs.
//!
//! A token is either given directly through `GOOGLE_OAUTH_ACCESS_TOKEN` or
//! obtained from the credential helper named in the kubeconfig, which prints
//! a JSON document holding the token.

use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use crate::config::{ACCESS_TOKEN_ENV, ConfigParser};
use crate::error::{PlatformError, Result};
use crate::kubeconfig::{AuthProviderConfig, HELPER_ARGS, HELPER_COMMAND};

/// JSON path of the token in the `gcloud config config-helper` output.
const DEFAULT_TOKEN_KEY: &str = "{.credential.access_token}";

/// Where bearer tokens come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// A fixed token.
    Static(String),
    /// A command printing JSON that contains the token.
    Helper(AuthProviderConfig),
}

impl TokenSource {
    /// Uses `GOOGLE_OAUTH_ACCESS_TOKEN` when set, the given helper otherwise.
    #[must_use]
    pub fn from_env_or(helper: AuthProviderConfig) -> Self {
        ConfigParser::get_access_token().map_or(Self::Helper(helper), Self::Static)
    }

    /// Uses `GOOGLE_OAUTH_ACCESS_TOKEN` when set, `gcloud` otherwise.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_or(Self::gcloud_helper())
    }

    /// The `gcloud config config-helper` invocation used by the kubeconfig.
    #[must_use]
    pub fn gcloud_helper() -> AuthProviderConfig {
        AuthProviderConfig {
            cmd_path: HELPER_COMMAND.to_string(),
            cmd_args: HELPER_ARGS.to_string(),
            token_key: DEFAULT_TOKEN_KEY.to_string(),
            expiry_key: None,
        }
    }

    /// Resolves a token.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::CredentialHelper`] if the helper cannot be
    /// run, exits unsuccessfully, or prints no token at the configured path.
    pub async fn token(&self) -> Result<String> {
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::Helper(helper) => run_helper(helper).await,
        }
    }

    /// Short description for logs, without the token itself.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Static(_) => ACCESS_TOKEN_ENV.to_string(),
            Self::Helper(helper) => format!("{} {}", helper.cmd_path, helper.cmd_args),
        }
    }
}

async fn run_helper(helper: &AuthProviderConfig) -> Result<String> {
    let failure = |message: String| PlatformError::CredentialHelper {
        command: helper.cmd_path.clone(),
        message,
    };

    debug!("Running credential helper: {} {}", helper.cmd_path, helper.cmd_args);

    let output = Command::new(&helper.cmd_path)
        .args(helper.cmd_args.split_whitespace())
        .output()
        .await
        .map_err(|e| failure(format!("cannot run: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(failure(format!("exited with {}: {}", output.status, stderr.trim())).into());
    }

    let document: Value = serde_json::from_slice(&output.stdout)
        .map_err(|e| failure(format!("invalid JSON output: {e}")))?;

    extract_json_path(&document, &helper.token_key)
        .ok_or_else(|| failure(format!("no token at {}", helper.token_key)).into())
}

/// Reads a string at a kubectl-style JSON path such as
/// `{.credential.access_token}`.
#[must_use]
pub fn extract_json_path(document: &Value, path: &str) -> Option<String> {
    let trimmed = path
        .trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .trim_start_matches('.');

    trimmed
        .split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(document, |value, segment| value.get(segment))
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_json_path() {
        let doc = json!({
            "credential": {
                "access_token": "ya29.token",
                "token_expiry": "2026-01-01T00:00:00Z"
            }
        });

        assert_eq!(
            extract_json_path(&doc, "{.credential.access_token}").as_deref(),
            Some("ya29.token")
        );
        assert_eq!(
            extract_json_path(&doc, "{.credential.token_expiry}").as_deref(),
            Some("2026-01-01T00:00:00Z")
        );
        assert_eq!(extract_json_path(&doc, "{.credential.missing}"), None);
        assert_eq!(extract_json_path(&json!({"credential": 1}), "{.credential}"), None);
    }

    #[tokio::test]
    async fn test_static_token() {
        let source = TokenSource::Static(String::from("abc"));
        assert_eq!(source.token().await.unwrap(), "abc");
        assert_eq!(source.describe(), ACCESS_TOKEN_ENV);
    }

    #[tokio::test]
    async fn test_helper_output_is_parsed() {
        let helper = AuthProviderConfig {
            cmd_path: String::from("echo"),
            cmd_args: String::from(r#"{"credential":{"access_token":"from-helper"}}"#),
            token_key: String::from(DEFAULT_TOKEN_KEY),
            expiry_key: None,
        };

        let token = TokenSource::Helper(helper).token().await.unwrap();
        assert_eq!(token, "from-helper");
    }

    #[tokio::test]
    async fn test_missing_helper_fails() {
        let helper = AuthProviderConfig {
            cmd_path: String::from("/nonexistent/credential-helper"),
            cmd_args: String::new(),
            token_key: String::from(DEFAULT_TOKEN_KEY),
            expiry_key: None,
        };

        let err = TokenSource::Helper(helper).token().await.unwrap_err();
        assert!(err.to_string().contains("/nonexistent/credential-helper"));
    }

    #[test]
    fn test_gcloud_helper_matches_kubeconfig() {
        let helper = TokenSource::gcloud_helper();
        assert_eq!(helper.cmd_path, "gcloud");
        assert_eq!(helper.cmd_args, "config config-helper --format=json");
    }
}
