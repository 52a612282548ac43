//! Values derived from deployed resources.
//!
//! Resources report identifiers and status only once the platform has
//! processed them. These helpers turn those reported values into the inputs
//! of downstream resources and into the stack's exported outputs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{PlatformError, Result};

/// Name of the exported output holding the Service's external address.
pub const URL_OUTPUT: &str = "url";

/// Status of a Kubernetes Service, as reported by the API server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    /// Load balancer status.
    #[serde(default)]
    pub load_balancer: LoadBalancerStatus,
}

/// Ingress points assigned to a load balancer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerStatus {
    /// Assigned ingress points, possibly empty while provisioning.
    #[serde(default)]
    pub ingress: Vec<LoadBalancerIngress>,
}

/// A single externally reachable address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerIngress {
    /// DNS hostname, set by providers that hand out names.
    #[serde(default)]
    pub hostname: Option<String>,
    /// Raw IP address.
    #[serde(default)]
    pub ip: Option<String>,
}

impl ServiceStatus {
    /// Builds a status with one ingress point.
    #[must_use]
    pub fn with_ingress(hostname: Option<&str>, ip: Option<&str>) -> Self {
        Self {
            load_balancer: LoadBalancerStatus {
                ingress: vec![LoadBalancerIngress {
                    hostname: hostname.map(String::from),
                    ip: ip.map(String::from),
                }],
            },
        }
    }
}

/// Returns the short name of a workload from its assigned identifier.
///
/// Identifiers are slash-delimited (`<namespace>/<name>`); the short name is
/// the final segment. A string without slashes is returned unchanged.
#[must_use]
pub fn resolve_workload_short_name(full_identifier: &str) -> &str {
    full_identifier
        .rsplit('/')
        .next()
        .unwrap_or(full_identifier)
}

/// Extracts the externally visible address of a Service.
///
/// Uses the first ingress point, preferring its hostname over its IP.
///
/// # Errors
///
/// Returns [`PlatformError::AddressNotAssigned`] if the load balancer has not
/// reported an ingress point with a hostname or an IP yet.
pub fn extract_external_address(service: &str, status: &ServiceStatus) -> Result<String> {
    let not_assigned = || PlatformError::AddressNotAssigned {
        service: service.to_string(),
    };

    let ingress = status.load_balancer.ingress.first().ok_or_else(not_assigned)?;

    ingress
        .hostname
        .as_deref()
        .filter(|h| !h.is_empty())
        .or_else(|| ingress.ip.as_deref().filter(|ip| !ip.is_empty()))
        .map(String::from)
        .ok_or_else(|| not_assigned().into())
}

/// Exported values of a deployed stack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackOutputs {
    /// Output name to value.
    #[serde(flatten)]
    pub values: BTreeMap<String, String>,
}

impl StackOutputs {
    /// Creates an empty output set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Sets an output.
    pub fn export(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Gets an output by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Returns the exported external address, if any.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.get(URL_OUTPUT)
    }

    /// Returns true if nothing has been exported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
