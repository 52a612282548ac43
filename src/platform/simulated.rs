//! In-memory provider.
//!
//! Keeps clusters, node pools and Kubernetes objects in a shared inventory
//! and records every call, so plans can be executed without a cloud account.
//! Load balancer addresses are handed out after a configurable number of
//! status polls.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::{ClusterSpec, NodePoolSpec};
use crate::error::{PlatformError, Result};
use crate::kubeconfig::CredentialDocument;
use crate::outputs::ServiceStatus;

use super::manifests::{Manifest, ManifestKind};
use super::{AppliedResource, CloudProvider, ClusterApi, ClusterInfo};

/// Address assigned to load balancers unless configured otherwise.
const DEFAULT_ADDRESS: &str = "203.0.113.10";

/// Shared state of the simulated platform.
#[derive(Debug, Default)]
struct Inventory {
    clusters: BTreeMap<String, ClusterInfo>,
    node_pools: BTreeMap<String, AppliedResource>,
    objects: BTreeMap<String, Value>,
    status_polls: BTreeMap<String, u32>,
    calls: Vec<String>,
}

impl Inventory {
    fn record(&mut self, call: String, fail_on: Option<&str>) -> Result<()> {
        debug!("simulated: {call}");
        let failed = fail_on.is_some_and(|prefix| call.starts_with(prefix));
        self.calls.push(call.clone());

        if failed {
            return Err(PlatformError::api_error(500, format!("injected failure on '{call}'")).into());
        }
        Ok(())
    }
}

/// Simulated cloud provider.
#[derive(Debug, Clone)]
pub struct SimulatedProvider {
    /// Shared inventory.
    inventory: Arc<Mutex<Inventory>>,
    /// Status polls answered without an address.
    address_after_polls: u32,
    /// Assigned hostname, preferred over the IP when set.
    hostname: Option<String>,
    /// Assigned IP.
    ip: String,
    /// Calls starting with this prefix fail.
    fail_on: Option<String>,
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedProvider {
    /// Creates an empty simulated platform.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inventory: Arc::new(Mutex::new(Inventory::default())),
            address_after_polls: 0,
            hostname: None,
            ip: DEFAULT_ADDRESS.to_string(),
            fail_on: None,
        }
    }

    /// Answers the first `polls` status reads without an address.
    #[must_use]
    pub const fn with_address_after_polls(mut self, polls: u32) -> Self {
        self.address_after_polls = polls;
        self
    }

    /// Assigns a DNS hostname to load balancers.
    #[must_use]
    pub fn with_hostname(mut self, hostname: &str) -> Self {
        self.hostname = Some(hostname.to_string());
        self
    }

    /// Assigns an IP to load balancers.
    #[must_use]
    pub fn with_ip(mut self, ip: &str) -> Self {
        self.ip = ip.to_string();
        self
    }

    /// Makes every call whose log entry starts with `prefix` fail.
    #[must_use]
    pub fn with_failure(mut self, prefix: &str) -> Self {
        self.fail_on = Some(prefix.to_string());
        self
    }

    /// Returns the call log.
    pub async fn calls(&self) -> Vec<String> {
        self.inventory.lock().await.calls.clone()
    }

    /// Returns an applied object body.
    pub async fn object(&self, kind: ManifestKind, namespace: Option<&str>, name: &str) -> Option<Value> {
        let key = kind.object_path(namespace, name);
        self.inventory.lock().await.objects.get(&key).cloned()
    }

    /// Number of Kubernetes objects currently stored.
    pub async fn object_count(&self) -> usize {
        self.inventory.lock().await.objects.len()
    }

    /// Returns true if a cluster with this name exists.
    pub async fn has_cluster(&self, name: &str) -> bool {
        self.inventory.lock().await.clusters.contains_key(name)
    }

    fn simulated_cluster(spec: &ClusterSpec, index: usize) -> ClusterInfo {
        ClusterInfo {
            id: format!("projects/simulated/locations/{}/clusters/{}", spec.location, spec.name),
            name: spec.name.clone(),
            location: spec.location.clone(),
            endpoint: format!("10.96.0.{}", index + 1),
            ca_certificate: STANDARD.encode(format!("simulated-ca-{}", spec.name)),
        }
    }
}

#[async_trait]
impl CloudProvider for SimulatedProvider {
    async fn apply_cluster(&self, spec: &ClusterSpec) -> Result<ClusterInfo> {
        let mut inventory = self.inventory.lock().await;
        inventory.record(format!("apply_cluster {}", spec.name), self.fail_on.as_deref())?;

        let index = inventory.clusters.len();
        let info = inventory
            .clusters
            .entry(spec.name.clone())
            .or_insert_with(|| Self::simulated_cluster(spec, index))
            .clone();
        Ok(info)
    }

    async fn apply_node_pool(&self, cluster: &str, spec: &NodePoolSpec) -> Result<AppliedResource> {
        let mut inventory = self.inventory.lock().await;
        inventory.record(
            format!("apply_node_pool {cluster}/{}", spec.name),
            self.fail_on.as_deref(),
        )?;

        let Some(owner) = inventory.clusters.get(cluster) else {
            return Err(PlatformError::not_found("cluster", cluster).into());
        };
        let resource = AppliedResource {
            id: format!("{}/nodePools/{}", owner.id, spec.name),
            name: spec.name.clone(),
        };
        inventory
            .node_pools
            .insert(format!("{cluster}/{}", spec.name), resource.clone());
        Ok(resource)
    }

    async fn connect(&self, document: &CredentialDocument) -> Result<Box<dyn ClusterApi>> {
        let connection = document.connection()?;
        let mut inventory = self.inventory.lock().await;
        inventory.record(format!("connect {}", document.context), self.fail_on.as_deref())?;

        let known = inventory.clusters.values().any(|c| {
            format!("https://{}", c.endpoint) == connection.server
                && connection.certificate_authority_data.as_deref() == Some(c.ca_certificate.as_str())
        });
        if !known {
            return Err(PlatformError::AuthenticationFailed {
                message: format!("no simulated cluster serves {}", connection.server),
            }
            .into());
        }

        Ok(Box::new(SimulatedCluster {
            provider: self.clone(),
        }))
    }

    async fn delete_node_pool(&self, cluster: &str, _location: &str, name: &str) -> Result<()> {
        let mut inventory = self.inventory.lock().await;
        inventory.record(format!("delete_node_pool {cluster}/{name}"), self.fail_on.as_deref())?;
        inventory.node_pools.remove(&format!("{cluster}/{name}"));
        Ok(())
    }

    async fn delete_cluster(&self, _location: &str, name: &str) -> Result<()> {
        let mut inventory = self.inventory.lock().await;
        inventory.record(format!("delete_cluster {name}"), self.fail_on.as_deref())?;
        inventory.clusters.remove(name);
        let prefix = format!("{name}/");
        inventory.node_pools.retain(|key, _| !key.starts_with(&prefix));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

/// Kubernetes API of a simulated cluster.
#[derive(Debug)]
struct SimulatedCluster {
    provider: SimulatedProvider,
}

#[async_trait]
impl ClusterApi for SimulatedCluster {
    async fn apply(&self, manifest: &Manifest) -> Result<AppliedResource> {
        let mut inventory = self.provider.inventory.lock().await;
        inventory.record(
            format!("apply {} {}", manifest.kind, manifest.identifier()),
            self.provider.fail_on.as_deref(),
        )?;

        if let Some(ns) = manifest.namespace.as_deref() {
            let ns_key = ManifestKind::Namespace.object_path(None, ns);
            if !inventory.objects.contains_key(&ns_key) {
                return Err(PlatformError::not_found("Namespace", ns).into());
            }
        }

        inventory.objects.insert(manifest.path(), manifest.body.clone());
        Ok(AppliedResource {
            id: manifest.identifier(),
            name: manifest.name.clone(),
        })
    }

    async fn service_status(&self, namespace: &str, name: &str) -> Result<ServiceStatus> {
        let mut inventory = self.provider.inventory.lock().await;
        inventory.record(
            format!("service_status {namespace}/{name}"),
            self.provider.fail_on.as_deref(),
        )?;

        let key = ManifestKind::Service.object_path(Some(namespace), name);
        let Some(service) = inventory.objects.get(&key) else {
            return Err(PlatformError::not_found("Service", name).into());
        };
        if service.pointer("/spec/type").and_then(Value::as_str) != Some("LoadBalancer") {
            return Ok(ServiceStatus::default());
        }

        let polls = inventory.status_polls.entry(key).or_insert(0);
        *polls += 1;
        if *polls <= self.provider.address_after_polls {
            return Ok(ServiceStatus::default());
        }

        Ok(ServiceStatus::with_ingress(
            self.provider.hostname.as_deref(),
            Some(self.provider.ip.as_str()),
        ))
    }

    async fn delete(&self, kind: ManifestKind, namespace: Option<&str>, name: &str) -> Result<()> {
        let mut inventory = self.provider.inventory.lock().await;
        inventory.record(
            format!("delete {kind} {}", namespace.map_or_else(|| name.to_string(), |ns| format!("{ns}/{name}"))),
            self.provider.fail_on.as_deref(),
        )?;

        let key = kind.object_path(namespace, name);
        inventory.objects.remove(&key);
        inventory.status_polls.remove(&key);

        if kind == ManifestKind::Namespace {
            let scope = format!("/namespaces/{name}/");
            inventory.objects.retain(|path, _| !path.contains(&scope));
        }
        Ok(())
    }
}
