//! Google Kubernetes Engine provider.
//!
//! Talks to the GKE v1 REST API. Creates, updates and deletes are
//! long-running operations which are polled until done.
//!
//! An existing cluster or node pool is compared with its spec and updated in
//! place where GKE allows it: cluster autoscaling, node pool autoscaling and
//! size, node labels and network tags. Node metadata and OAuth scopes are
//! fixed at creation, so a change to them is reported instead of applied.

use async_trait::async_trait;
use reqwest::{Client, Method, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, trace, warn};

use crate::config::{ClusterAutoscaling, ClusterSpec, NodePoolSpec};
use crate::error::{PlatformError, Result};
use crate::kubeconfig::CredentialDocument;

use super::credentials::TokenSource;
use super::kube::KubeClient;
use super::{
    AppliedResource, CloudProvider, ClusterApi, ClusterInfo, DEFAULT_TIMEOUT_SECS,
    error_for_response, with_retries,
};

/// GKE API base URL.
pub const GKE_API_URL: &str = "https://container.googleapis.com/v1";

/// Name of the node pool GKE creates together with a cluster.
const DEFAULT_POOL_NAME: &str = "default-pool";

/// Default seconds between operation polls.
const DEFAULT_OPERATION_POLL_SECS: u64 = 10;

/// GKE provider.
#[derive(Debug)]
pub struct GkeProvider {
    /// HTTP client.
    client: Client,
    /// API base URL.
    base_url: String,
    /// Google Cloud project id.
    project: String,
    /// Token source.
    tokens: TokenSource,
    /// Token resolved on first use.
    token: OnceCell<String>,
    /// Delay between operation polls.
    operation_poll: Duration,
}

/// Cluster resource.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GkeCluster {
    name: String,
    #[serde(default)]
    self_link: Option<String>,
    #[serde(default)]
    endpoint: String,
    #[serde(default)]
    master_auth: MasterAuth,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    autoscaling: Option<GkeClusterAutoscaling>,
}

/// Cluster autoscaling as reported by GKE.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GkeClusterAutoscaling {
    #[serde(default)]
    enable_node_autoprovisioning: bool,
    #[serde(default)]
    autoscaling_profile: Option<String>,
    #[serde(default)]
    resource_limits: Vec<ResourceLimit>,
}

/// Autoprovisioning bound. int64 values arrive as JSON strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceLimit {
    #[serde(default)]
    resource_type: String,
    #[serde(default)]
    minimum: Value,
    #[serde(default)]
    maximum: Value,
}

impl ResourceLimit {
    fn bounds(&self) -> Option<(u64, u64)> {
        Some((as_count(&self.minimum)?, as_count(&self.maximum)?))
    }
}

/// Cluster credentials.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MasterAuth {
    #[serde(default)]
    cluster_ca_certificate: String,
}

/// Node pool resource.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GkeNodePool {
    name: String,
    #[serde(default)]
    self_link: Option<String>,
    #[serde(default)]
    initial_node_count: u32,
    #[serde(default)]
    current_node_count: Option<u32>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    config: GkeNodeConfig,
    #[serde(default)]
    autoscaling: Option<GkeNodePoolAutoscaling>,
}

impl GkeNodePool {
    fn node_count(&self) -> u32 {
        self.current_node_count.unwrap_or(self.initial_node_count)
    }

    /// Autoscaling bounds, `None` when autoscaling is off.
    fn autoscaling_bounds(&self) -> Option<(u32, u32)> {
        self.autoscaling
            .as_ref()
            .filter(|a| a.enabled)
            .map(|a| (a.min_node_count, a.max_node_count))
    }
}

/// Node configuration as reported by GKE.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GkeNodeConfig {
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    #[serde(default)]
    oauth_scopes: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    image_type: Option<String>,
}

/// Node pool autoscaling as reported by GKE.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GkeNodePoolAutoscaling {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    min_node_count: u32,
    #[serde(default)]
    max_node_count: u32,
}

/// Long-running operation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Operation {
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    operation_type: Option<String>,
    #[serde(default)]
    status_message: Option<String>,
    #[serde(default)]
    error: Option<OperationError>,
}

/// Error attached to a finished operation.
#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    message: String,
}

impl GkeProvider {
    /// Creates a provider for a Google Cloud project.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(project: &str, tokens: TokenSource) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| PlatformError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: GKE_API_URL.to_string(),
            project: project.to_string(),
            tokens,
            token: OnceCell::new(),
            operation_poll: Duration::from_secs(DEFAULT_OPERATION_POLL_SECS),
        })
    }

    /// Overrides the API base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Sets the delay between operation polls.
    #[must_use]
    pub const fn with_operation_poll(mut self, interval: Duration) -> Self {
        self.operation_poll = interval;
        self
    }

    fn location_path(&self, location: &str) -> String {
        format!("projects/{}/locations/{location}", self.project)
    }

    fn cluster_path(&self, location: &str, cluster: &str) -> String {
        format!("{}/clusters/{cluster}", self.location_path(location))
    }

    fn node_pool_path(&self, location: &str, cluster: &str, pool: &str) -> String {
        format!("{}/nodePools/{pool}", self.cluster_path(location, cluster))
    }

    async fn bearer(&self) -> Result<&str> {
        self.token
            .get_or_try_init(|| async {
                debug!("Resolving GKE token via {}", self.tokens.describe());
                self.tokens.token().await
            })
            .await
            .map(String::as_str)
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        kind: &str,
        name: &str,
    ) -> Result<T> {
        let url = format!("{}/{path}", self.base_url);
        trace!("{method} {url}");

        let token = self.bearer().await?;
        let mut request = self
            .client
            .request(method, &url)
            .header(header::CONTENT_TYPE, "application/json")
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PlatformError::network(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(error_for_response(response, kind, name).await);
        }

        response.json().await.map_err(|e| {
            PlatformError::invalid_response(format!("Failed to parse response: {e}")).into()
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        kind: &str,
        name: &str,
    ) -> Result<T> {
        with_retries(|| self.send_once(method.clone(), path, body, kind, name)).await
    }

    /// Polls an operation until it is done.
    async fn wait_for_operation(&self, location: &str, mut operation: Operation) -> Result<()> {
        let path = format!("{}/operations/{}", self.location_path(location), operation.name);
        let label = operation
            .operation_type
            .clone()
            .unwrap_or_else(|| operation.name.clone());

        loop {
            if operation.status == "DONE" {
                if let Some(error) = operation.error.filter(|e| !e.message.is_empty()) {
                    return Err(PlatformError::OperationFailed {
                        operation: label,
                        message: error.message,
                    }
                    .into());
                }
                debug!("Operation {label} done");
                return Ok(());
            }

            trace!(
                "Operation {label} is {}{}",
                operation.status,
                operation
                    .status_message
                    .as_deref()
                    .map(|m| format!(": {m}"))
                    .unwrap_or_default()
            );
            tokio::time::sleep(self.operation_poll).await;
            operation = self
                .request(Method::GET, &path, None, "operation", &operation.name)
                .await?;
        }
    }

    async fn get_cluster(&self, location: &str, name: &str) -> Result<Option<GkeCluster>> {
        match self
            .request(Method::GET, &self.cluster_path(location, name), None, "cluster", name)
            .await
        {
            Ok(cluster) => Ok(Some(cluster)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_node_pool(&self, location: &str, cluster: &str, name: &str) -> Result<Option<GkeNodePool>> {
        let path = self.node_pool_path(location, cluster, name);
        match self.request(Method::GET, &path, None, "node pool", name).await {
            Ok(pool) => Ok(Some(pool)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn cluster_info(&self, location: &str, cluster: GkeCluster) -> ClusterInfo {
        ClusterInfo {
            id: cluster
                .self_link
                .unwrap_or_else(|| self.cluster_path(location, &cluster.name)),
            name: cluster.name,
            location: location.to_string(),
            endpoint: cluster.endpoint,
            ca_certificate: cluster.master_auth.cluster_ca_certificate,
        }
    }

    /// Reads the cluster back after an operation.
    async fn refreshed_cluster(&self, spec: &ClusterSpec) -> Result<ClusterInfo> {
        let cluster = self
            .get_cluster(&spec.location, &spec.name)
            .await?
            .ok_or_else(|| PlatformError::not_found("cluster", &spec.name))?;

        if cluster.endpoint.is_empty() {
            warn!(
                "Cluster {} has no endpoint yet (status {})",
                spec.name,
                cluster.status.as_deref().unwrap_or("unknown")
            );
        }

        Ok(self.cluster_info(&spec.location, cluster))
    }

    /// Runs one node pool mutation and waits for it.
    async fn node_pool_operation(
        &self,
        method: Method,
        path: &str,
        body: &Value,
        spec: &NodePoolSpec,
    ) -> Result<()> {
        let operation: Operation = self
            .request(method, path, Some(body), "node pool", &spec.name)
            .await?;
        self.wait_for_operation(&spec.location, operation).await
    }

    /// Brings an existing node pool in line with its spec.
    async fn update_node_pool(&self, path: &str, existing: &GkeNodePool, spec: &NodePoolSpec) -> Result<()> {
        if let Some(field) = immutable_node_change(&existing.config, spec) {
            return Err(PlatformError::ImmutableFieldChanged {
                kind: String::from("node pool"),
                name: spec.name.clone(),
                field: field.to_string(),
            }
            .into());
        }

        let mut updated = false;
        let desired = spec
            .autoscaling
            .as_ref()
            .map(|a| (a.min_node_count, a.max_node_count));

        if existing.autoscaling_bounds() != desired {
            info!("Updating autoscaling of node pool {}", spec.name);
            self.node_pool_operation(
                Method::POST,
                &format!("{path}:setAutoscaling"),
                &json!({ "autoscaling": node_pool_autoscaling_body(spec) }),
                spec,
            )
            .await?;
            updated = true;
        }

        if desired.is_none()
            && (existing.autoscaling_bounds().is_some() || existing.node_count() != spec.initial_node_count)
        {
            info!("Resizing node pool {} to {} nodes", spec.name, spec.initial_node_count);
            self.node_pool_operation(
                Method::POST,
                &format!("{path}:setSize"),
                &json!({ "nodeCount": spec.initial_node_count }),
                spec,
            )
            .await?;
            updated = true;
        }

        let tags: BTreeSet<&String> = spec.node_config.tags.iter().collect();
        if existing.config.labels != spec.node_config.labels
            || existing.config.tags.iter().collect::<BTreeSet<_>>() != tags
        {
            info!("Updating labels and tags of node pool {}", spec.name);
            let body = json!({
                "nodeVersion": existing.version.as_deref().unwrap_or("-"),
                "imageType": existing.config.image_type.as_deref().unwrap_or_default(),
                "labels": { "labels": spec.node_config.labels },
                "tags": { "tags": spec.node_config.tags },
            });
            self.node_pool_operation(Method::PUT, path, &body, spec).await?;
            updated = true;
        }

        if !updated {
            debug!("Node pool {} is up to date", spec.name);
        }
        Ok(())
    }
}

/// Reads an int64 that GKE may encode as a string or a number.
fn as_count(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// Returns true if the live cluster autoscaling matches the spec.
fn cluster_autoscaling_matches(live: Option<&GkeClusterAutoscaling>, desired: Option<&ClusterAutoscaling>) -> bool {
    let live = live.filter(|a| a.enable_node_autoprovisioning);
    let desired = desired.filter(|a| a.enabled);

    match (live, desired) {
        (None, None) => true,
        (Some(live), Some(desired)) => {
            let limit = |kind: &str| {
                live.resource_limits
                    .iter()
                    .find(|l| l.resource_type == kind)
                    .and_then(ResourceLimit::bounds)
            };
            live.autoscaling_profile.as_deref() == Some(desired.profile.as_str())
                && limit("cpu") == Some((u64::from(desired.cpu.min), u64::from(desired.cpu.max)))
                && limit("memory")
                    == Some((u64::from(desired.memory_gb.min), u64::from(desired.memory_gb.max)))
        }
        _ => false,
    }
}

/// Names the first creation-only node setting that differs, if any.
///
/// GKE may add metadata of its own, so only the configured entries are
/// compared.
fn immutable_node_change(live: &GkeNodeConfig, spec: &NodePoolSpec) -> Option<&'static str> {
    let scopes: BTreeSet<&String> = spec.node_config.oauth_scopes.iter().collect();
    if live.oauth_scopes.iter().collect::<BTreeSet<_>>() != scopes {
        return Some("oauth scopes");
    }

    let metadata_differs = spec
        .node_config
        .metadata
        .iter()
        .any(|(key, value)| live.metadata.get(key) != Some(value));
    metadata_differs.then_some("node metadata")
}

/// Cluster autoscaling body, shared by create and update.
fn cluster_autoscaling_body(autoscaling: &ClusterAutoscaling) -> Value {
    json!({
        "enableNodeAutoprovisioning": autoscaling.enabled,
        "autoscalingProfile": autoscaling.profile,
        "resourceLimits": [
            {
                "resourceType": "cpu",
                "minimum": autoscaling.cpu.min.to_string(),
                "maximum": autoscaling.cpu.max.to_string(),
            },
            {
                "resourceType": "memory",
                "minimum": autoscaling.memory_gb.min.to_string(),
                "maximum": autoscaling.memory_gb.max.to_string(),
            },
        ],
    })
}

/// Node pool autoscaling body, shared by create and update.
fn node_pool_autoscaling_body(spec: &NodePoolSpec) -> Value {
    spec.autoscaling.as_ref().map_or_else(
        || json!({ "enabled": false }),
        |a| {
            json!({
                "enabled": true,
                "minNodeCount": a.min_node_count,
                "maxNodeCount": a.max_node_count,
            })
        },
    )
}

/// Request body for a cluster.
fn cluster_body(spec: &ClusterSpec) -> Value {
    let mut cluster = json!({
        "name": spec.name,
        "initialNodeCount": spec.initial_node_count,
    });

    if let Some(autoscaling) = &spec.autoscaling {
        cluster["autoscaling"] = cluster_autoscaling_body(autoscaling);
    }

    json!({ "cluster": cluster })
}

/// Request body for a node pool.
fn node_pool_body(spec: &NodePoolSpec) -> Value {
    let mut pool = json!({
        "name": spec.name,
        "initialNodeCount": spec.initial_node_count,
        "config": {
            "labels": spec.node_config.labels,
            "metadata": spec.node_config.metadata,
            "oauthScopes": spec.node_config.oauth_scopes,
            "tags": spec.node_config.tags,
        },
    });

    if spec.autoscaling.is_some() {
        pool["autoscaling"] = node_pool_autoscaling_body(spec);
    }

    json!({ "nodePool": pool })
}

#[async_trait]
impl CloudProvider for GkeProvider {
    async fn apply_cluster(&self, spec: &ClusterSpec) -> Result<ClusterInfo> {
        if let Some(existing) = self.get_cluster(&spec.location, &spec.name).await? {
            if cluster_autoscaling_matches(existing.autoscaling.as_ref(), spec.autoscaling.as_ref()) {
                info!("Cluster {} already exists", spec.name);
                return Ok(self.cluster_info(&spec.location, existing));
            }

            info!("Updating autoscaling of cluster {}", spec.name);
            let desired = spec
                .autoscaling
                .as_ref()
                .map_or_else(|| json!({ "enableNodeAutoprovisioning": false }), cluster_autoscaling_body);
            let operation: Operation = self
                .request(
                    Method::PUT,
                    &self.cluster_path(&spec.location, &spec.name),
                    Some(&json!({ "update": { "desiredClusterAutoscaling": desired } })),
                    "cluster",
                    &spec.name,
                )
                .await?;
            self.wait_for_operation(&spec.location, operation).await?;
            return self.refreshed_cluster(spec).await;
        }

        info!("Creating cluster {} in {}", spec.name, spec.location);
        let operation: Operation = self
            .request(
                Method::POST,
                &format!("{}/clusters", self.location_path(&spec.location)),
                Some(&cluster_body(spec)),
                "cluster",
                &spec.name,
            )
            .await?;
        self.wait_for_operation(&spec.location, operation).await?;

        if spec.remove_default_node_pool {
            info!("Removing default node pool of {}", spec.name);
            self.delete_node_pool(&spec.name, &spec.location, DEFAULT_POOL_NAME)
                .await?;
        }

        self.refreshed_cluster(spec).await
    }

    async fn apply_node_pool(&self, cluster: &str, spec: &NodePoolSpec) -> Result<AppliedResource> {
        let path = self.node_pool_path(&spec.location, cluster, &spec.name);

        if let Some(existing) = self.get_node_pool(&spec.location, cluster, &spec.name).await? {
            info!("Node pool {} already exists", spec.name);
            self.update_node_pool(&path, &existing, spec).await?;
            return Ok(AppliedResource {
                id: existing.self_link.unwrap_or(path),
                name: existing.name,
            });
        }

        info!("Creating node pool {} in cluster {cluster}", spec.name);
        let operation: Operation = self
            .request(
                Method::POST,
                &format!("{}/nodePools", self.cluster_path(&spec.location, cluster)),
                Some(&node_pool_body(spec)),
                "node pool",
                &spec.name,
            )
            .await?;
        self.wait_for_operation(&spec.location, operation).await?;

        Ok(AppliedResource {
            id: path,
            name: spec.name.clone(),
        })
    }

    async fn connect(&self, document: &CredentialDocument) -> Result<Box<dyn ClusterApi>> {
        let client = KubeClient::from_document(document).await?;
        debug!("Connected to {} as context {}", client.server(), document.context);
        Ok(Box::new(client))
    }

    async fn delete_node_pool(&self, cluster: &str, location: &str, name: &str) -> Result<()> {
        let path = self.node_pool_path(location, cluster, name);
        match self
            .request::<Operation>(Method::DELETE, &path, None, "node pool", name)
            .await
        {
            Ok(operation) => self.wait_for_operation(location, operation).await,
            Err(e) if e.is_not_found() => {
                debug!("Node pool {name} already deleted");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_cluster(&self, location: &str, name: &str) -> Result<()> {
        let path = self.cluster_path(location, name);
        match self
            .request::<Operation>(Method::DELETE, &path, None, "cluster", name)
            .await
        {
            Ok(operation) => self.wait_for_operation(location, operation).await,
            Err(e) if e.is_not_found() => {
                debug!("Cluster {name} already deleted");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> &'static str {
        "gke"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Scenario;
    use crate::error::DeployError;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BASE: &str = "/v1/projects/demo/locations/asia-east1-b";

    fn provider(server: &MockServer) -> GkeProvider {
        GkeProvider::new("demo", TokenSource::Static(String::from("t")))
            .unwrap()
            .with_base_url(&format!("{}/v1", server.uri()))
            .with_operation_poll(Duration::ZERO)
    }

    fn operation(name: &str, status: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "name": name, "status": status }))
    }

    const POOL: &str = "/v1/projects/demo/locations/asia-east1-b/clusters/load-testing/nodePools/primary-node-pool";

    /// Node pool as GKE reports it after creating `spec`.
    fn live_pool(spec: &NodePoolSpec) -> Value {
        json!({
            "name": spec.name,
            "initialNodeCount": spec.initial_node_count,
            "version": "1.30.1-gke.100",
            "config": {
                "labels": spec.node_config.labels,
                "metadata": spec.node_config.metadata,
                "oauthScopes": spec.node_config.oauth_scopes,
                "tags": spec.node_config.tags,
                "imageType": "COS_CONTAINERD",
            },
            "autoscaling": spec.autoscaling.as_ref().map(|a| json!({
                "enabled": true,
                "minNodeCount": a.min_node_count,
                "maxNodeCount": a.max_node_count,
            })),
        })
    }

    async fn mount_pool(server: &MockServer, body: Value) {
        Mock::given(method("GET"))
            .and(path(POOL))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    async fn expect_no_mutation(server: &MockServer) {
        for verb in ["POST", "PUT"] {
            Mock::given(method(verb))
                .respond_with(operation("op-unexpected", "DONE"))
                .expect(0)
                .mount(server)
                .await;
        }
    }

    fn live_cluster(autoscaling: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "name": "load-testing",
            "endpoint": "34.80.1.2",
            "status": "RUNNING",
            "masterAuth": { "clusterCaCertificate": "Q0E=" },
            "autoscaling": autoscaling,
        }))
    }

    #[test]
    fn test_cluster_body() {
        let topology = Scenario::Autoscaled.topology();
        let body = cluster_body(&topology.cluster);

        assert_eq!(body["cluster"]["name"], "load-testing");
        assert_eq!(
            body["cluster"]["autoscaling"]["autoscalingProfile"],
            "OPTIMIZE_UTILIZATION"
        );
        assert_eq!(body["cluster"]["autoscaling"]["resourceLimits"][1]["maximum"], "40");
    }

    #[test]
    fn test_node_pool_body() {
        let topology = Scenario::Autoscaled.topology();
        let body = node_pool_body(&topology.node_pool);

        assert_eq!(body["nodePool"]["autoscaling"]["maxNodeCount"], 4);
        assert_eq!(body["nodePool"]["config"]["labels"]["env"], "test");
        assert_eq!(body["nodePool"]["config"]["tags"], json!(["foo", "bar"]));

        let fixed = node_pool_body(&Scenario::Fixed.topology().node_pool);
        assert!(fixed["nodePool"].get("autoscaling").is_none());
        assert_eq!(fixed["nodePool"]["initialNodeCount"], 3);
    }

    #[tokio::test]
    async fn test_create_cluster_polls_operation() {
        let server = MockServer::start().await;
        let cluster_path = format!("{BASE}/clusters/load-testing");

        Mock::given(method("GET"))
            .and(path(cluster_path.as_str()))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "code": 404, "message": "not found" }
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(cluster_path.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "load-testing",
                "endpoint": "34.80.1.2",
                "status": "RUNNING",
                "masterAuth": { "clusterCaCertificate": "Q0E=" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{BASE}/clusters")))
            .and(body_partial_json(json!({ "cluster": { "name": "load-testing" } })))
            .respond_with(operation("op-create", "RUNNING"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{BASE}/operations/op-create")))
            .respond_with(operation("op-create", "DONE"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("{cluster_path}/nodePools/default-pool")))
            .respond_with(operation("op-pool", "DONE"))
            .expect(1)
            .mount(&server)
            .await;

        let topology = Scenario::Fixed.topology();
        let info = provider(&server).apply_cluster(&topology.cluster).await.unwrap();

        assert_eq!(info.endpoint, "34.80.1.2");
        assert_eq!(info.ca_certificate, "Q0E=");
        assert_eq!(info.id, "projects/demo/locations/asia-east1-b/clusters/load-testing");
    }

    #[tokio::test]
    async fn test_create_node_pool() {
        let server = MockServer::start().await;
        let pools = format!("{BASE}/clusters/load-testing/nodePools");

        Mock::given(method("GET"))
            .and(path(format!("{pools}/primary-node-pool")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(pools.as_str()))
            .and(body_partial_json(json!({ "nodePool": { "name": "primary-node-pool" } })))
            .respond_with(operation("op-np", "DONE"))
            .expect(1)
            .mount(&server)
            .await;

        let topology = Scenario::Fixed.topology();
        let applied = provider(&server)
            .apply_node_pool("load-testing", &topology.node_pool)
            .await
            .unwrap();

        assert_eq!(applied.name, "primary-node-pool");
        assert!(applied.id.ends_with("/nodePools/primary-node-pool"));
    }

    #[tokio::test]
    async fn test_failed_operation() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path(format!("{BASE}/clusters/load-testing")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "op-del",
                "status": "DONE",
                "operationType": "DELETE_CLUSTER",
                "error": { "message": "quota check failed" }
            })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .delete_cluster("asia-east1-b", "load-testing")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DeployError::Platform(PlatformError::OperationFailed { ref operation, .. }) if operation == "DELETE_CLUSTER"
        ));
    }

    #[tokio::test]
    async fn test_delete_missing_cluster_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        provider(&server)
            .delete_cluster("asia-east1-b", "load-testing")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_matching_node_pool_is_left_alone() {
        let server = MockServer::start().await;
        let spec = Scenario::Autoscaled.topology().node_pool;
        let mut live = live_pool(&spec);
        live["config"]["metadata"]["gci-update-strategy"] = json!("update_disabled");
        mount_pool(&server, live).await;
        expect_no_mutation(&server).await;

        let applied = provider(&server)
            .apply_node_pool("load-testing", &spec)
            .await
            .unwrap();

        assert_eq!(applied.name, "primary-node-pool");
    }

    #[tokio::test]
    async fn test_node_pool_switched_to_fixed_size() {
        let server = MockServer::start().await;
        mount_pool(&server, live_pool(&Scenario::Autoscaled.topology().node_pool)).await;

        Mock::given(method("POST"))
            .and(path(format!("{POOL}:setAutoscaling")))
            .and(body_partial_json(json!({ "autoscaling": { "enabled": false } })))
            .respond_with(operation("op-autoscaling", "DONE"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{POOL}:setSize")))
            .and(body_partial_json(json!({ "nodeCount": 3 })))
            .respond_with(operation("op-size", "DONE"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(operation("op-unexpected", "DONE"))
            .expect(0)
            .mount(&server)
            .await;

        let fixed = Scenario::Fixed.topology().node_pool;
        provider(&server)
            .apply_node_pool("load-testing", &fixed)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_node_pool_autoscaling_bounds_updated() {
        let server = MockServer::start().await;
        let mut spec = Scenario::Autoscaled.topology().node_pool;
        mount_pool(&server, live_pool(&spec)).await;

        Mock::given(method("POST"))
            .and(path(format!("{POOL}:setAutoscaling")))
            .and(body_partial_json(json!({
                "autoscaling": { "enabled": true, "minNodeCount": 2, "maxNodeCount": 8 }
            })))
            .respond_with(operation("op-autoscaling", "RUNNING"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{BASE}/operations/op-autoscaling")))
            .respond_with(operation("op-autoscaling", "DONE"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{POOL}:setSize")))
            .respond_with(operation("op-size", "DONE"))
            .expect(0)
            .mount(&server)
            .await;

        spec.autoscaling = Some(crate::config::NodePoolAutoscaling {
            min_node_count: 2,
            max_node_count: 8,
        });
        provider(&server)
            .apply_node_pool("load-testing", &spec)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_node_pool_labels_updated_in_place() {
        let server = MockServer::start().await;
        let spec = Scenario::Fixed.topology().node_pool;
        let mut live = live_pool(&spec);
        live["config"]["labels"]["env"] = json!("prod");
        mount_pool(&server, live).await;

        Mock::given(method("PUT"))
            .and(path(POOL))
            .and(body_partial_json(json!({
                "nodeVersion": "1.30.1-gke.100",
                "imageType": "COS_CONTAINERD",
                "labels": { "labels": { "env": "test" } },
                "tags": { "tags": ["foo", "bar"] },
            })))
            .respond_with(operation("op-labels", "DONE"))
            .expect(1)
            .mount(&server)
            .await;

        provider(&server)
            .apply_node_pool("load-testing", &spec)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_node_pool_scope_change_is_rejected() {
        let server = MockServer::start().await;
        let spec = Scenario::Fixed.topology().node_pool;
        let mut live = live_pool(&spec);
        live["config"]["oauthScopes"] = json!(["https://www.googleapis.com/auth/cloud-platform"]);
        mount_pool(&server, live).await;
        expect_no_mutation(&server).await;

        let err = provider(&server)
            .apply_node_pool("load-testing", &spec)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DeployError::Platform(PlatformError::ImmutableFieldChanged { ref field, .. }) if field == "oauth scopes"
        ));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_cluster_autoscaling_disabled_in_place() {
        let server = MockServer::start().await;
        let cluster_path = format!("{BASE}/clusters/load-testing");
        let enabled = cluster_autoscaling_body(
            Scenario::Autoscaled
                .topology()
                .cluster
                .autoscaling
                .as_ref()
                .unwrap(),
        );

        Mock::given(method("GET"))
            .and(path(cluster_path.as_str()))
            .respond_with(live_cluster(enabled))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(cluster_path.as_str()))
            .and(body_partial_json(json!({
                "update": { "desiredClusterAutoscaling": { "enableNodeAutoprovisioning": false } }
            })))
            .respond_with(operation("op-update", "RUNNING"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{BASE}/operations/op-update")))
            .respond_with(operation("op-update", "DONE"))
            .expect(1)
            .mount(&server)
            .await;

        let fixed = Scenario::Fixed.topology().cluster;
        let info = provider(&server).apply_cluster(&fixed).await.unwrap();

        assert_eq!(info.endpoint, "34.80.1.2");
    }

    #[tokio::test]
    async fn test_matching_cluster_is_not_updated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{BASE}/clusters/load-testing")))
            .respond_with(live_cluster(json!({
                "enableNodeAutoprovisioning": true,
                "autoscalingProfile": "OPTIMIZE_UTILIZATION",
                "resourceLimits": [
                    { "resourceType": "cpu", "minimum": "1", "maximum": "4" },
                    { "resourceType": "memory", "minimum": 1, "maximum": 40 },
                ],
            })))
            .mount(&server)
            .await;
        expect_no_mutation(&server).await;

        let autoscaled = Scenario::Autoscaled.topology().cluster;
        let info = provider(&server).apply_cluster(&autoscaled).await.unwrap();

        assert_eq!(info.name, "load-testing");
    }
}
