//! Veeam Terraform-style Provider
//!
//! Manages the lifecycle of backup jobs on a Veeam Backup & Replication
//! server through its REST API.

pub mod client;
pub mod config;
pub mod provider;
pub mod resources;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{ExecutionContext, HttpTransport, JobGateway, Outcome, Transport};
pub use provider::VeeamProvider;
pub use resources::{JobReconciler, ReadOutcome};
