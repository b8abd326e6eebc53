//! Veeam Provider Implementation
//!
//! Host-facing entry points. Each call decodes host state, hands it to the
//! job reconciler and reports the resulting state plus diagnostics.

use serde::Serialize;
use tracing::{debug, error, info, warn};

use veeam_common::{Error, JobId, JobType, Operation, RemoteResource};

use crate::client::JobGateway;
use crate::resources::{JobReconciler, ReadOutcome};
use crate::state::{
    job_id_from_state, make_state, spec_from_state, state_from_remote, string_value, DynamicValue,
};

pub const RESOURCE_TYPE: &str = "veeam_job";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
}

impl Diagnostic {
    fn error(summary: impl Into<String>, err: &Error) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: err.to_string(),
        }
    }

    fn warning(summary: impl Into<String>, err: &Error) -> Self {
        Self {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: err.to_string(),
        }
    }
}

/// New state for the host to persist, or `None` when the job is absent
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProviderResponse {
    pub new_state: Option<DynamicValue>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ProviderResponse {
    fn ok(new_state: Option<DynamicValue>) -> Self {
        Self {
            new_state,
            diagnostics: vec![],
        }
    }

    fn failed(new_state: Option<DynamicValue>, summary: &str, err: &Error) -> Self {
        error!(
            operation = err.operation().map(|op| op.as_str()),
            job_id = err.job_id(),
            "{}: {}",
            summary,
            err
        );
        Self {
            new_state,
            diagnostics: vec![Diagnostic::error(summary, err)],
        }
    }

    /// State refreshed from the server. A job type this provider cannot
    /// manage is stored as reported but flagged, since a later update would
    /// be rejected.
    fn refreshed(remote: &RemoteResource, fallback: Option<DynamicValue>) -> Self {
        let state = match state_from_remote(remote) {
            Ok(state) => state,
            Err(e) => return Self::failed(fallback, "Failed to encode state", &e),
        };

        let mut response = Self::ok(Some(state));
        if let Err(e) = remote.kind.parse::<JobType>() {
            let e = e.during(Operation::Read, Some(remote.id.as_str()));
            warn!("Job {} has an unmanaged type: {}", remote.id, e);
            response.diagnostics.push(Diagnostic::warning("Unmanaged job type", &e));
        }
        response
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }
}

/// Veeam backup job provider
pub struct VeeamProvider {
    gateway: JobGateway,
}

impl VeeamProvider {
    pub fn new(gateway: JobGateway) -> Self {
        Self { gateway }
    }

    /// Check a desired-state document without contacting the server
    pub fn validate_config(config: &DynamicValue) -> Vec<Diagnostic> {
        debug!("ValidateResourceConfig called for {}", RESOURCE_TYPE);
        match spec_from_state(config) {
            Ok(_) => vec![],
            Err(e) => vec![Diagnostic::error("Invalid job configuration", &e)],
        }
    }

    /// Refresh stored state. A job deleted out of band comes back as `None`.
    pub async fn read_resource(&self, current: &DynamicValue) -> ProviderResponse {
        info!("ReadResource called for {}", RESOURCE_TYPE);

        let result = async {
            let reconciler = self.restore(current, Operation::Read)?;
            reconciler.read().await
        }
        .await;

        match result {
            Ok(ReadOutcome::Present(remote)) => {
                ProviderResponse::refreshed(&remote, Some(current.clone()))
            }
            Ok(ReadOutcome::Absent) => ProviderResponse::ok(None),
            Err(e) => ProviderResponse::failed(Some(current.clone()), "Failed to read job", &e),
        }
    }

    /// Create, update or delete depending on which of the states is present
    pub async fn apply_resource_change(
        &self,
        prior: Option<&DynamicValue>,
        planned: Option<&DynamicValue>,
    ) -> ProviderResponse {
        info!("ApplyResourceChange called for {}", RESOURCE_TYPE);

        let prior = prior.filter(|s| !s.is_null());
        let planned = planned.filter(|s| !s.is_null());

        match (prior, planned) {
            (None, Some(planned)) => self.create(planned).await,
            (Some(prior), None) => self.delete(prior).await,
            (Some(prior), Some(planned)) => self.update(prior, planned).await,
            (None, None) => ProviderResponse::ok(None),
        }
    }

    /// Adopt an existing job by id. Nothing is stored unless the job can be
    /// read.
    pub async fn import_resource_state(&self, id: &str) -> ProviderResponse {
        info!("ImportResourceState called for {} with ID {}", RESOURCE_TYPE, id);

        let result = async {
            let id = JobId::new(id).ok_or_else(|| Error::Precondition {
                op: Operation::Read,
                id: None,
                reason: "job id must not be empty".to_string(),
            })?;
            let reconciler = JobReconciler::with_id(self.gateway.clone(), id.clone());
            reconciler
                .read()
                .await?
                .present()
                .ok_or_else(|| Error::Precondition {
                    op: Operation::Read,
                    id: Some(id.to_string()),
                    reason: format!("job {} does not exist", id),
                })
        }
        .await;

        match result {
            Ok(remote) => ProviderResponse::refreshed(&remote, None),
            Err(e) => ProviderResponse::failed(None, "Failed to import job", &e),
        }
    }

    async fn create(&self, planned: &DynamicValue) -> ProviderResponse {
        let spec = match spec_from_state(planned) {
            Ok(spec) => spec,
            Err(e) => {
                let e = e.during(Operation::Create, None);
                return ProviderResponse::failed(None, "Failed to create job", &e);
            }
        };

        let mut reconciler = JobReconciler::new(self.gateway.clone());
        match reconciler.create(&spec).await {
            Ok(remote) => match state_from_remote(&remote) {
                Ok(state) => ProviderResponse::ok(Some(state)),
                Err(e) => {
                    let orphan = make_state(vec![("id", string_value(remote.id.as_str()))]);
                    ProviderResponse::failed(Some(orphan), "Failed to encode state", &e)
                }
            },
            Err(e @ Error::CreateUnconfirmed { .. }) => {
                // Keep the id so the host tracks the job that now exists remotely.
                let orphan = reconciler
                    .id()
                    .map(|id| make_state(vec![("id", string_value(id.as_str()))]));
                ProviderResponse::failed(orphan, "Job created but not confirmed", &e)
            }
            Err(e) => ProviderResponse::failed(None, "Failed to create job", &e),
        }
    }

    async fn update(&self, prior: &DynamicValue, planned: &DynamicValue) -> ProviderResponse {
        let result = async {
            let mut reconciler = self.restore(prior, Operation::Update)?;
            let spec = spec_from_state(planned)
                .map_err(|e| e.during(Operation::Update, reconciler.id().map(JobId::as_str)))?;
            let remote = reconciler.update(&spec).await?;
            state_from_remote(&remote)
        }
        .await;

        match result {
            Ok(state) => ProviderResponse::ok(Some(state)),
            Err(e) => ProviderResponse::failed(Some(prior.clone()), "Failed to update job", &e),
        }
    }

    async fn delete(&self, prior: &DynamicValue) -> ProviderResponse {
        let result = async {
            let mut reconciler = self.restore(prior, Operation::Delete)?;
            reconciler.delete().await
        }
        .await;

        match result {
            Ok(()) => ProviderResponse::ok(None),
            Err(e) => ProviderResponse::failed(Some(prior.clone()), "Failed to delete job", &e),
        }
    }

    fn restore(&self, state: &DynamicValue, op: Operation) -> Result<JobReconciler, Error> {
        job_id_from_state(state)
            .map(|id| JobReconciler::with_id(self.gateway.clone(), id))
            .ok_or_else(|| Error::Precondition {
                op,
                id: None,
                reason: "state has no job id".to_string(),
            })
    }
}
