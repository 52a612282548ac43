//! Credential document (kubeconfig) generation.
//!
//! The generated document follows a fixed layout consumed by `kubectl` and
//! other Kubernetes clients: one cluster, one context, one user whose
//! credentials come from the `gcp` auth provider, which shells out to
//! `gcloud config config-helper --format=json` for a token.

use serde::Deserialize;

use crate::error::{ConfigError, DeployError, Result};

/// Command the auth provider runs to obtain a token.
pub const HELPER_COMMAND: &str = "gcloud";

/// Arguments passed to [`HELPER_COMMAND`].
pub const HELPER_ARGS: &str = "config config-helper --format=json";

/// A rendered kubeconfig document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialDocument {
    /// Context (and cluster/user) name used inside the document.
    pub context: String,
    /// The rendered text.
    pub text: String,
}

/// Renders the credential document for a cluster.
///
/// `endpoint` is the bare address of the API server (no scheme), `ca_certificate`
/// the base64 encoded cluster CA. Inputs are not validated: an empty
/// certificate produces a complete but unusable document.
#[must_use]
pub fn build_credential_document(
    endpoint: &str,
    cluster_name: &str,
    ca_certificate: &str,
) -> CredentialDocument {
    let context = format!("demo_{cluster_name}");

    let text = format!(
        "apiVersion: v1
clusters:
- cluster:
    certificate-authority-data: {ca_certificate}
    server: https://{endpoint}
  name: {context}
contexts:
- context:
    cluster: {context}
    user: {context}
  name: {context}
current-context: {context}
kind: Config
preferences: {{}}
users:
- name: {context}
  user:
    auth-provider:
      config:
        cmd-args: {helper_args}
        cmd-path: {helper_command}
        expiry-key: '{{.credential.token_expiry}}'
        token-key: '{{.credential.access_token}}'
      name: gcp",
        helper_args = HELPER_ARGS,
        helper_command = HELPER_COMMAND,
    );

    CredentialDocument { context, text }
}

impl CredentialDocument {
    /// Parses the document back into its typed form.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid kubeconfig.
    pub fn parse(&self) -> Result<KubeConfig> {
        serde_yaml::from_str(&self.text).map_err(|e| {
            DeployError::Config(ConfigError::ParseError {
                message: format!("Invalid credential document: {e}"),
                location: Some(self.context.clone()),
            })
        })
    }

    /// Resolves the cluster, user and auth provider of the current context.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be parsed or the current
    /// context refers to entries that do not exist.
    pub fn connection(&self) -> Result<ConnectionInfo> {
        let config = self.parse()?;
        let missing = |what: &str| {
            DeployError::Config(ConfigError::validation(
                format!("Credential document has no {what} for context '{}'", config.current_context),
                "current-context",
            ))
        };

        let context = config
            .contexts
            .iter()
            .find(|c| c.name == config.current_context)
            .ok_or_else(|| missing("context"))?;
        let cluster = config
            .clusters
            .iter()
            .find(|c| c.name == context.context.cluster)
            .ok_or_else(|| missing("cluster"))?;
        let user = config
            .users
            .iter()
            .find(|u| u.name == context.context.user)
            .ok_or_else(|| missing("user"))?;

        Ok(ConnectionInfo {
            server: cluster.cluster.server.clone(),
            certificate_authority_data: cluster.cluster.certificate_authority_data.clone(),
            auth_provider: user.user.auth_provider.as_ref().map(|p| p.config.clone()),
        })
    }
}

impl std::fmt::Display for CredentialDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Typed view of a kubeconfig.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KubeConfig {
    /// Document API version.
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    /// Document kind (always `Config`).
    pub kind: String,
    /// Named clusters.
    pub clusters: Vec<NamedCluster>,
    /// Named contexts.
    pub contexts: Vec<NamedContext>,
    /// Named users.
    pub users: Vec<NamedUser>,
    /// Context selected by default.
    pub current_context: String,
}

/// A `clusters[]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct NamedCluster {
    /// Entry name.
    pub name: String,
    /// Cluster connection data.
    pub cluster: ClusterEntry,
}

/// Connection data for a cluster.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterEntry {
    /// API server URL.
    pub server: String,
    /// Base64 encoded CA bundle.
    #[serde(default)]
    pub certificate_authority_data: Option<String>,
}

/// A `contexts[]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct NamedContext {
    /// Entry name.
    pub name: String,
    /// Cluster/user pair.
    pub context: ContextEntry,
}

/// Cluster/user pair of a context.
#[derive(Debug, Clone, Deserialize)]
pub struct ContextEntry {
    /// Cluster entry name.
    pub cluster: String,
    /// User entry name.
    pub user: String,
}

/// A `users[]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct NamedUser {
    /// Entry name.
    pub name: String,
    /// User credentials.
    pub user: UserEntry,
}

/// User credentials.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserEntry {
    /// External auth provider.
    #[serde(default)]
    pub auth_provider: Option<AuthProvider>,
}

/// Auth provider stanza.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthProvider {
    /// Provider name (`gcp`).
    pub name: String,
    /// Helper invocation.
    pub config: AuthProviderConfig,
}

/// Credential helper invocation of an auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuthProviderConfig {
    /// Executable to run.
    pub cmd_path: String,
    /// Space separated arguments.
    pub cmd_args: String,
    /// Path of the token in the helper's JSON output.
    pub token_key: String,
    /// Path of the expiry in the helper's JSON output.
    #[serde(default)]
    pub expiry_key: Option<String>,
}

/// Everything needed to open an authenticated connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// API server URL.
    pub server: String,
    /// Base64 encoded CA bundle.
    pub certificate_authority_data: Option<String>,
    /// Token helper, if the user authenticates through one.
    pub auth_provider: Option<AuthProviderConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOLDEN: &str = "apiVersion: v1
clusters:
- cluster:
    certificate-authority-data: Q0FEQVRB
    server: https://34.80.1.2
  name: demo_load-testing
contexts:
- context:
    cluster: demo_load-testing
    user: demo_load-testing
  name: demo_load-testing
current-context: demo_load-testing
kind: Config
preferences: {}
users:
- name: demo_load-testing
  user:
    auth-provider:
      config:
        cmd-args: config config-helper --format=json
        cmd-path: gcloud
        expiry-key: '{.credential.token_expiry}'
        token-key: '{.credential.access_token}'
      name: gcp";

    #[test]
    fn test_document_layout_is_exact() {
        let doc = build_credential_document("34.80.1.2", "load-testing", "Q0FEQVRB");
        assert_eq!(doc.text, GOLDEN);
        assert_eq!(doc.context, "demo_load-testing");
    }

    #[test]
    fn test_document_is_deterministic() {
        let a = build_credential_document("10.0.0.1", "c1", "ca");
        let b = build_credential_document("10.0.0.1", "c1", "ca");
        assert_eq!(a, b);
    }

    #[test]
    fn test_document_is_injective() {
        let base = build_credential_document("10.0.0.1", "c1", "ca1");
        let variants = [
            build_credential_document("10.0.0.2", "c1", "ca1"),
            build_credential_document("10.0.0.1", "c2", "ca1"),
            build_credential_document("10.0.0.1", "c1", "ca2"),
        ];
        for variant in &variants {
            assert_ne!(base.text, variant.text);
        }
    }

    #[test]
    fn test_empty_certificate_still_renders() {
        let doc = build_credential_document("10.0.0.1", "c1", "");
        assert!(doc.text.contains("certificate-authority-data: \n"));
        assert!(doc.text.ends_with("name: gcp"));
    }

    #[test]
    fn test_connection_info() {
        let doc = build_credential_document("34.80.1.2", "load-testing", "Q0FEQVRB");
        let info = doc.connection().unwrap();

        assert_eq!(info.server, "https://34.80.1.2");
        assert_eq!(info.certificate_authority_data.as_deref(), Some("Q0FEQVRB"));

        let provider = info.auth_provider.unwrap();
        assert_eq!(provider.cmd_path, HELPER_COMMAND);
        assert_eq!(provider.cmd_args, HELPER_ARGS);
        assert_eq!(provider.token_key, "{.credential.access_token}");
        assert_eq!(provider.expiry_key.as_deref(), Some("{.credential.token_expiry}"));
    }

    #[test]
    fn test_parse_typed_view() {
        let doc = build_credential_document("34.80.1.2", "load-testing", "Q0FEQVRB");
        let config = doc.parse().unwrap();

        assert_eq!(config.api_version, "v1");
        assert_eq!(config.kind, "Config");
        assert_eq!(config.clusters.len(), 1);
        assert_eq!(config.users[0].user.auth_provider.as_ref().unwrap().name, "gcp");
    }
}
