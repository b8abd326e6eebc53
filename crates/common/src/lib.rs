//! Veeam Provider Common Library
//!
//! Job model and error types shared by the provider crate.

pub mod error;
pub mod job;

pub use error::{Error, Operation, Result};
pub use job::{
    field, Field, JobId, JobType, RemoteResource, ResourceSpec, VirtualMachines, FIELD_MAP,
};

/// Value sent in the `x-api-version` header unless configured otherwise
pub const DEFAULT_API_VERSION: &str = "1.2-rev0";
