//! Declarative training control policies.
//!
//! A policy document lists controllers; the loader turns it into
//! [`Controller`]s with live metric handlers and compiled rules.

pub mod controller;
pub mod loader;
pub mod types;

pub use controller::Controller;
pub use loader::{LoadedPolicy, load_policy, load_policy_str, parse_policy, validate_policy};
pub use types::{ControllerDefinition, MetricSpec, PolicyDocument};
