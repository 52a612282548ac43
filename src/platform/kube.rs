//! Kubernetes API client.
//!
//! Objects are written with server-side apply so that re-applying an
//! unchanged manifest is a no-op on the cluster side.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::{Certificate, Client, header};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::error::{PlatformError, Result};
use crate::kubeconfig::CredentialDocument;
use crate::outputs::ServiceStatus;

use super::credentials::TokenSource;
use super::manifests::{Manifest, ManifestKind};
use super::{AppliedResource, ClusterApi, DEFAULT_TIMEOUT_SECS, error_for_response, with_retries};

/// Field manager recorded on every applied object.
pub const FIELD_MANAGER: &str = "loadtest-deploy";

/// Content type of a server-side apply patch.
const APPLY_PATCH_CONTENT_TYPE: &str = "application/apply-patch+yaml";

/// Authenticated client for one cluster.
#[derive(Debug, Clone)]
pub struct KubeClient {
    /// HTTP client.
    client: Client,
    /// API server URL.
    server: String,
    /// Bearer token.
    token: String,
}

impl KubeClient {
    /// Creates a client for an API server.
    ///
    /// `ca_pem` is added as a trusted root when present.
    ///
    /// # Errors
    ///
    /// Returns an error if the certificate is invalid or the HTTP client
    /// cannot be created.
    pub fn new(server: &str, token: &str, ca_pem: Option<&[u8]>) -> Result<Self> {
        let mut builder = Client::builder().timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        if let Some(pem) = ca_pem {
            let certificate = Certificate::from_pem(pem).map_err(|e| {
                PlatformError::invalid_response(format!("Invalid cluster CA certificate: {e}"))
            })?;
            builder = builder.add_root_certificate(certificate);
        }

        let client = builder
            .build()
            .map_err(|e| PlatformError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            server: server.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Creates a client from a credential document.
    ///
    /// The token comes from `GOOGLE_OAUTH_ACCESS_TOKEN` if set, otherwise from
    /// the document's credential helper.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be resolved, the CA is not
    /// valid base64, or no token can be obtained.
    pub async fn from_document(document: &CredentialDocument) -> Result<Self> {
        let connection = document.connection()?;

        let helper = connection
            .auth_provider
            .unwrap_or_else(TokenSource::gcloud_helper);
        let tokens = TokenSource::from_env_or(helper);
        debug!("Resolving cluster token via {}", tokens.describe());
        let token = tokens.token().await?;

        Self::from_document_with_token(document, &token)
    }

    /// Creates a client from a credential document and an explicit token.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be resolved or the CA is not
    /// valid base64.
    pub fn from_document_with_token(document: &CredentialDocument, token: &str) -> Result<Self> {
        let connection = document.connection()?;

        let ca_pem = match connection.certificate_authority_data.as_deref() {
            Some(data) if !data.trim().is_empty() => Some(STANDARD.decode(data.trim()).map_err(|e| {
                PlatformError::invalid_response(format!("Cluster CA is not valid base64: {e}"))
            })?),
            _ => {
                warn!("Credential document for {} has no CA data", document.context);
                None
            }
        };

        Self::new(&connection.server, token, ca_pem.as_deref())
    }

    /// API server URL.
    #[must_use]
    pub fn server(&self) -> &str {
        &self.server
    }

    async fn apply_once(&self, manifest: &Manifest) -> Result<Value> {
        let url = format!("{}{}", self.server, manifest.path());
        trace!("PATCH {url}");

        let response = self
            .client
            .patch(&url)
            .query(&[("fieldManager", FIELD_MANAGER), ("force", "true")])
            .header(header::CONTENT_TYPE, APPLY_PATCH_CONTENT_TYPE)
            .bearer_auth(&self.token)
            .body(manifest.body.to_string())
            .send()
            .await
            .map_err(|e| PlatformError::network(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(error_for_response(response, manifest.kind.kind(), &manifest.name).await);
        }

        response.json().await.map_err(|e| {
            PlatformError::invalid_response(format!("Failed to parse response: {e}")).into()
        })
    }

    async fn get_once(&self, kind: ManifestKind, namespace: &str, name: &str) -> Result<Value> {
        let url = format!("{}{}", self.server, kind.object_path(Some(namespace), name));
        trace!("GET {url}");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| PlatformError::network(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(error_for_response(response, kind.kind(), name).await);
        }

        response.json().await.map_err(|e| {
            PlatformError::invalid_response(format!("Failed to parse response: {e}")).into()
        })
    }

    async fn delete_once(&self, kind: ManifestKind, namespace: Option<&str>, name: &str) -> Result<()> {
        let url = format!("{}{}", self.server, kind.object_path(namespace, name));
        trace!("DELETE {url}");

        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| PlatformError::network(format!("Request failed: {e}")))?;

        if response.status().is_success() {
            return Ok(());
        }

        let error = error_for_response(response, kind.kind(), name).await;
        if error.is_not_found() {
            debug!("{kind} {name} already deleted");
            return Ok(());
        }
        Err(error)
    }
}

#[async_trait]
impl ClusterApi for KubeClient {
    async fn apply(&self, manifest: &Manifest) -> Result<AppliedResource> {
        debug!("Applying {} {}", manifest.kind, manifest.identifier());

        let object = with_retries(|| self.apply_once(manifest)).await?;

        let name = object
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .unwrap_or(&manifest.name)
            .to_string();
        let id = match object.pointer("/metadata/namespace").and_then(Value::as_str) {
            Some(ns) => format!("{ns}/{name}"),
            None => name.clone(),
        };

        Ok(AppliedResource { id, name })
    }

    async fn service_status(&self, namespace: &str, name: &str) -> Result<ServiceStatus> {
        let object = with_retries(|| self.get_once(ManifestKind::Service, namespace, name)).await?;

        match object.get("status") {
            Some(status) => serde_json::from_value(status.clone()).map_err(|e| {
                PlatformError::invalid_response(format!("Invalid service status: {e}")).into()
            }),
            None => Ok(ServiceStatus::default()),
        }
    }

    async fn delete(&self, kind: ManifestKind, namespace: Option<&str>, name: &str) -> Result<()> {
        debug!("Deleting {kind} {name}");
        with_retries(|| self.delete_once(kind, namespace, name)).await
    }
}
