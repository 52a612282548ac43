//! Kubernetes manifests for the workload resources.
//!
//! Manifests are plain JSON objects sent with server-side apply. Every
//! input that the platform assigns (namespace name, workload short name) is
//! passed in already resolved.

use serde_json::{Value, json};
use std::collections::BTreeMap;

use crate::config::{AutoscalerSpec, ServiceSpec, WorkloadSpec};

/// Kind of a Kubernetes object managed by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManifestKind {
    /// `v1/Namespace`.
    Namespace,
    /// `apps/v1/Deployment`.
    Deployment,
    /// `autoscaling/v2/HorizontalPodAutoscaler`.
    HorizontalPodAutoscaler,
    /// `v1/Service`.
    Service,
}

impl ManifestKind {
    /// `apiVersion` of the kind.
    #[must_use]
    pub const fn api_version(self) -> &'static str {
        match self {
            Self::Namespace | Self::Service => "v1",
            Self::Deployment => "apps/v1",
            Self::HorizontalPodAutoscaler => "autoscaling/v2",
        }
    }

    /// `kind` field of the manifest.
    #[must_use]
    pub const fn kind(self) -> &'static str {
        match self {
            Self::Namespace => "Namespace",
            Self::Deployment => "Deployment",
            Self::HorizontalPodAutoscaler => "HorizontalPodAutoscaler",
            Self::Service => "Service",
        }
    }

    /// Lowercase plural used in REST paths.
    #[must_use]
    pub const fn plural(self) -> &'static str {
        match self {
            Self::Namespace => "namespaces",
            Self::Deployment => "deployments",
            Self::HorizontalPodAutoscaler => "horizontalpodautoscalers",
            Self::Service => "services",
        }
    }

    /// Whether objects of this kind live inside a namespace.
    #[must_use]
    pub const fn is_namespaced(self) -> bool {
        !matches!(self, Self::Namespace)
    }

    /// REST path of a named object, relative to the API server root.
    #[must_use]
    pub fn object_path(self, namespace: Option<&str>, name: &str) -> String {
        let group = if self.api_version().contains('/') {
            format!("/apis/{}", self.api_version())
        } else {
            format!("/api/{}", self.api_version())
        };

        match namespace {
            Some(ns) if self.is_namespaced() => {
                format!("{group}/namespaces/{ns}/{}/{name}", self.plural())
            }
            _ => format!("{group}/{}/{name}", self.plural()),
        }
    }
}

impl std::fmt::Display for ManifestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())
    }
}

/// A manifest ready to be applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    /// Object kind.
    pub kind: ManifestKind,
    /// Namespace, for namespaced kinds.
    pub namespace: Option<String>,
    /// Object name.
    pub name: String,
    /// Full JSON body.
    pub body: Value,
}

impl Manifest {
    /// REST path of the object.
    #[must_use]
    pub fn path(&self) -> String {
        self.kind.object_path(self.namespace.as_deref(), &self.name)
    }

    /// Identifier as reported by the platform: `<namespace>/<name>` for
    /// namespaced objects, the bare name otherwise.
    #[must_use]
    pub fn identifier(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}/{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// Builds the Namespace manifest.
#[must_use]
pub fn namespace(name: &str) -> Manifest {
    Manifest {
        kind: ManifestKind::Namespace,
        namespace: None,
        name: name.to_string(),
        body: json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": { "name": name },
        }),
    }
}

/// Builds the Deployment manifest.
#[must_use]
pub fn deployment(namespace: &str, workload: &WorkloadSpec) -> Manifest {
    let mut container = json!({
        "name": workload.container.name,
        "image": workload.container.image,
    });

    if let Some(port) = workload.container.port {
        container["ports"] = json!([{ "containerPort": port }]);
    }

    let mut requests = serde_json::Map::new();
    if let Some(cpu) = &workload.container.cpu_request {
        requests.insert(String::from("cpu"), json!(cpu));
    }
    if let Some(memory) = &workload.container.memory_request {
        requests.insert(String::from("memory"), json!(memory));
    }
    if !requests.is_empty() {
        container["resources"] = json!({ "requests": requests });
    }

    Manifest {
        kind: ManifestKind::Deployment,
        namespace: Some(namespace.to_string()),
        name: workload.name.clone(),
        body: json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {
                "name": workload.name,
                "namespace": namespace,
                "labels": workload.labels,
            },
            "spec": {
                "replicas": workload.replicas,
                "selector": { "matchLabels": workload.labels },
                "template": {
                    "metadata": { "labels": workload.labels },
                    "spec": { "containers": [container] },
                },
            },
        }),
    }
}

/// Builds the `HorizontalPodAutoscaler` manifest.
///
/// `target` is the short name of the Deployment to scale.
#[must_use]
pub fn autoscaler(
    namespace: &str,
    spec: &AutoscalerSpec,
    target: &str,
    labels: &BTreeMap<String, String>,
) -> Manifest {
    Manifest {
        kind: ManifestKind::HorizontalPodAutoscaler,
        namespace: Some(namespace.to_string()),
        name: spec.name.clone(),
        body: json!({
            "apiVersion": "autoscaling/v2",
            "kind": "HorizontalPodAutoscaler",
            "metadata": {
                "name": spec.name,
                "namespace": namespace,
                "labels": labels,
            },
            "spec": {
                "minReplicas": spec.min_replicas,
                "maxReplicas": spec.max_replicas,
                "scaleTargetRef": {
                    "apiVersion": "apps/v1",
                    "kind": "Deployment",
                    "name": target,
                },
                "metrics": [{
                    "type": "Resource",
                    "resource": {
                        "name": "cpu",
                        "target": {
                            "type": "Utilization",
                            "averageUtilization": spec.target_cpu_utilization,
                        },
                    },
                }],
            },
        }),
    }
}

/// Builds the Service manifest.
#[must_use]
pub fn service(
    namespace: &str,
    spec: &ServiceSpec,
    selector: &BTreeMap<String, String>,
) -> Manifest {
    Manifest {
        kind: ManifestKind::Service,
        namespace: Some(namespace.to_string()),
        name: spec.name.clone(),
        body: json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {
                "name": spec.name,
                "namespace": namespace,
                "labels": selector,
            },
            "spec": {
                "type": spec.service_type.to_string(),
                "selector": selector,
                "ports": [{
                    "port": spec.port,
                    "targetPort": spec.target_port,
                }],
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Scenario;

    #[test]
    fn test_paths() {
        assert_eq!(
            ManifestKind::Namespace.object_path(None, "load-testing-ns"),
            "/api/v1/namespaces/load-testing-ns"
        );
        assert_eq!(
            ManifestKind::Deployment.object_path(Some("ns"), "app"),
            "/apis/apps/v1/namespaces/ns/deployments/app"
        );
        assert_eq!(
            ManifestKind::HorizontalPodAutoscaler.object_path(Some("ns"), "hpa"),
            "/apis/autoscaling/v2/namespaces/ns/horizontalpodautoscalers/hpa"
        );
        assert_eq!(
            ManifestKind::Service.object_path(Some("ns"), "svc"),
            "/api/v1/namespaces/ns/services/svc"
        );
    }

    #[test]
    fn test_deployment_manifest() {
        let topology = Scenario::Fixed.topology();
        let manifest = deployment("load-testing-ns", &topology.workload);
        let body = &manifest.body;

        assert_eq!(manifest.identifier(), "load-testing-ns/load-testing-app");
        assert_eq!(body["spec"]["replicas"], 3);
        assert_eq!(body["spec"]["selector"]["matchLabels"]["app"], "load-testing");
        assert_eq!(body["spec"]["template"]["metadata"]["labels"]["app"], "load-testing");

        let container = &body["spec"]["template"]["spec"]["containers"][0];
        assert_eq!(container["name"], "load-testing-dep");
        assert_eq!(container["image"], "scottxxx666/gin-load-testing:0.0.1");
        assert_eq!(container["resources"]["requests"]["cpu"], "100m");
        assert_eq!(container["ports"][0]["containerPort"], 8080);
    }

    #[test]
    fn test_autoscaler_manifest() {
        let topology = Scenario::Autoscaled.topology();
        let spec = topology.autoscaler.as_ref().unwrap();
        let manifest = autoscaler("ns", spec, "load-testing-app", &topology.workload.labels);
        let body = &manifest.body;

        assert_eq!(body["apiVersion"], "autoscaling/v2");
        assert_eq!(body["spec"]["minReplicas"], 1);
        assert_eq!(body["spec"]["maxReplicas"], 50);
        assert_eq!(body["spec"]["scaleTargetRef"]["kind"], "Deployment");
        assert_eq!(body["spec"]["scaleTargetRef"]["name"], "load-testing-app");
        assert_eq!(
            body["spec"]["metrics"][0]["resource"]["target"]["averageUtilization"],
            50
        );
        assert_eq!(body["metadata"]["labels"]["app"], "load-testing");
    }

    #[test]
    fn test_service_manifest() {
        let topology = Scenario::Fixed.topology();
        let manifest = service("ns", &topology.service, &topology.workload.labels);
        let body = &manifest.body;

        assert_eq!(body["spec"]["type"], "LoadBalancer");
        assert_eq!(body["spec"]["ports"][0]["port"], 80);
        assert_eq!(body["spec"]["ports"][0]["targetPort"], 8080);
        assert_eq!(body["spec"]["selector"]["app"], "load-testing");
    }
}
