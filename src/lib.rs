// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Load-testing Deploy
//!
//! A declarative deployment planner for a load-testing topology on Google
//! Kubernetes Engine.
//!
//! ## Overview
//!
//! The topology is a fixed chain of dependent resources:
//!
//! - a GKE cluster and its node pool
//! - a credential document (kubeconfig) built from the cluster's outputs
//! - a namespace, the load-testing Deployment and, in the autoscaled
//!   scenario, a Horizontal Pod Autoscaler
//! - a `LoadBalancer` Service whose external address is exported as `url`
//!
//! ## Architecture
//!
//! 1. **Configuration**: a built-in scenario or `loadtest.deploy.yaml`
//! 2. **Plan**: a dependency graph of resource requests, ordered topologically
//! 3. **Diff**: the plan compared with recorded state by spec hash
//! 4. **Execution**: resources applied in order through a [`platform::CloudProvider`]
//!
//! ## Modules
//!
//! - [`config`]: Topology configuration, scenarios and validation
//! - [`planner`]: Dependency graph, plan, diff and execution
//! - [`platform`]: GKE and Kubernetes API clients, and an in-memory simulation
//! - [`kubeconfig`]: Credential document generation
//! - [`outputs`]: External address extraction and stack outputs
//! - [`state`]: State storage backends (local, S3)
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! project:
//!   name: load-testing
//!   scenario: autoscaled
//!
//! cluster:
//!   name: load-testing
//!   location: asia-east1-b
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod kubeconfig;
pub mod outputs;
pub mod planner;
pub mod platform;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, Scenario, TopologyConfig};
pub use error::{DeployError, Result};
pub use kubeconfig::{CredentialDocument, build_credential_document};
pub use outputs::{StackOutputs, extract_external_address, resolve_workload_short_name};
pub use planner::{DeploymentPlan, DiffEngine, PlanExecutor};
pub use platform::{CloudProvider, ClusterApi, GkeProvider, KubeClient, SimulatedProvider};
pub use state::{DeploymentState, LocalStateStore, S3StateStore, StateStore};
