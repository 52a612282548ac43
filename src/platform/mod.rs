//! Platform providers.
//!
//! The planner talks to the outside world through two traits:
//! [`CloudProvider`] manages the cluster and its node pool, and
//! [`ClusterApi`] manages Kubernetes objects inside a cluster once an
//! authenticated client has been built from the credential document.

pub mod credentials;
pub mod gke;
pub mod kube;
pub mod manifests;
pub mod simulated;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::config::{ClusterSpec, NodePoolSpec};
use crate::error::{DeployError, PlatformError, Result};
use crate::kubeconfig::CredentialDocument;
use crate::outputs::ServiceStatus;

pub use credentials::TokenSource;
pub use gke::GkeProvider;
pub use kube::KubeClient;
pub use manifests::{Manifest, ManifestKind};
pub use simulated::SimulatedProvider;

/// Identity fields of a provisioned cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInfo {
    /// Platform identifier of the cluster.
    pub id: String,
    /// Cluster name.
    pub name: String,
    /// Zone or region.
    pub location: String,
    /// API server address, without scheme.
    pub endpoint: String,
    /// Base64 encoded cluster CA certificate.
    pub ca_certificate: String,
}

/// A resource accepted by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedResource {
    /// Identifier assigned by the platform.
    pub id: String,
    /// Resource name.
    pub name: String,
}

/// Manages cluster-level infrastructure.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Creates the cluster, or returns the existing one with the same name.
    async fn apply_cluster(&self, spec: &ClusterSpec) -> Result<ClusterInfo>;

    /// Creates the node pool in the named cluster, or returns the existing one.
    async fn apply_node_pool(&self, cluster: &str, spec: &NodePoolSpec)
    -> Result<AppliedResource>;

    /// Opens an authenticated Kubernetes client from a credential document.
    async fn connect(&self, document: &CredentialDocument) -> Result<Box<dyn ClusterApi>>;

    /// Deletes a node pool. Missing pools are not an error.
    async fn delete_node_pool(&self, cluster: &str, location: &str, name: &str) -> Result<()>;

    /// Deletes a cluster. Missing clusters are not an error.
    async fn delete_cluster(&self, location: &str, name: &str) -> Result<()>;

    /// Short provider name for logs and output.
    fn name(&self) -> &'static str;
}

/// Manages Kubernetes objects inside a cluster.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Creates or updates an object with server-side apply.
    async fn apply(&self, manifest: &Manifest) -> Result<AppliedResource>;

    /// Reads the status of a Service.
    async fn service_status(&self, namespace: &str, name: &str) -> Result<ServiceStatus>;

    /// Deletes an object. Missing objects are not an error.
    async fn delete(&self, kind: ManifestKind, namespace: Option<&str>, name: &str) -> Result<()>;
}

/// Default request timeout in seconds.
pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of attempts for transient failures.
const MAX_RETRIES: u32 = 3;

/// Fallback delay between retries in milliseconds.
const RETRY_DELAY_MS: u64 = 1000;

/// Delay before retrying after `error`.
///
/// Honors the server's `Retry-After` for rate limits and the error's own
/// hint otherwise, falling back to a linear backoff.
fn retry_delay(error: &DeployError, attempt: u32) -> Duration {
    error.retry_delay_secs().map_or_else(
        || Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt)),
        Duration::from_secs,
    )
}

/// Runs a request, retrying transient failures.
pub(crate) async fn with_retries<T, F, Fut>(mut request: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;

    loop {
        match request().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < MAX_RETRIES => {
                let delay = retry_delay(&e, attempt);
                debug!("Attempt {attempt} of {MAX_RETRIES} failed ({e}), retrying in {delay:?}");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Maps a non-success response to a platform error.
///
/// `kind` and `name` describe the addressed object for 404 and 409 answers.
pub(crate) async fn error_for_response(response: Response, kind: &str, name: &str) -> DeployError {
    let status = response.status();

    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok());

    let body = response.text().await.unwrap_or_default();
    let message = api_message(&body);

    let error = match status {
        StatusCode::UNAUTHORIZED => PlatformError::AuthenticationFailed { message },
        StatusCode::FORBIDDEN => PlatformError::PermissionDenied { message },
        StatusCode::NOT_FOUND => PlatformError::not_found(kind, name),
        StatusCode::CONFLICT => PlatformError::AlreadyExists {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimited {
            retry_after_secs: retry_after.filter(|s| *s > 0).unwrap_or(60),
        },
        _ if message.contains("QUOTA") || message.contains("quota") => {
            PlatformError::QuotaExceeded { message }
        }
        _ => PlatformError::api_error(status.as_u16(), message),
    };

    error.into()
}

/// Extracts the `message` field of a Google or Kubernetes error body.
fn api_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("message"))
                .and_then(serde_json::Value::as_str)
                .map(String::from)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_api_message() {
        assert_eq!(
            api_message(r#"{"error":{"code":403,"message":"denied"}}"#),
            "denied"
        );
        assert_eq!(
            api_message(r#"{"kind":"Status","message":"namespaces \"x\" not found"}"#),
            "namespaces \"x\" not found"
        );
        assert_eq!(api_message(" plain text "), "plain text");
    }

    #[tokio::test]
    async fn test_retries_only_transient_errors() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = with_retries(|| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(PlatformError::not_found("cluster", "x").into())
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retries(|| async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(PlatformError::network("reset").into())
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_for_retry_after() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let started = tokio::time::Instant::now();

        let result = with_retries(|| async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(PlatformError::RateLimited { retry_after_secs: 30 }.into())
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert!(started.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let started = tokio::time::Instant::now();

        let result: Result<()> = with_retries(|| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(PlatformError::network("reset").into())
        })
        .await;

        assert!(matches!(
            result,
            Err(DeployError::Platform(PlatformError::NetworkError { .. }))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), MAX_RETRIES);
        assert_eq!(started.elapsed().as_secs(), 10);
    }

    #[test]
    fn test_retry_delay_falls_back_to_backoff() {
        let err: DeployError = PlatformError::api_error(503, "unavailable").into();
        assert_eq!(retry_delay(&err, 2), Duration::from_millis(2000));

        let err: DeployError = PlatformError::RateLimited { retry_after_secs: 12 }.into();
        assert_eq!(retry_delay(&err, 1), Duration::from_secs(12));
    }
}
