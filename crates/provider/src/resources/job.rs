//! Backup job lifecycle
//!
//! `JobReconciler` drives create/read/update/delete for one job and owns its
//! identifier. Every mutation is followed by a read so the returned state is
//! what the server holds, not what was sent.

use tracing::{debug, info, warn};

use veeam_common::{Error, JobId, Operation, RemoteResource, ResourceSpec, Result};

use super::ReadOutcome;
use crate::client::{expected_status, JobGateway, Outcome};

/// Lifecycle controller for a single job instance
///
/// Calls for one instance must not overlap; the `&mut self` receivers make
/// that explicit.
pub struct JobReconciler {
    gateway: JobGateway,
    id: Option<JobId>,
}

impl JobReconciler {
    /// Controller for a job that does not exist yet
    pub fn new(gateway: JobGateway) -> Self {
        Self { gateway, id: None }
    }

    /// Controller for a job created earlier, restored from host state
    pub fn with_id(gateway: JobGateway, id: JobId) -> Self {
        Self {
            gateway,
            id: Some(id),
        }
    }

    pub fn id(&self) -> Option<&JobId> {
        self.id.as_ref()
    }

    /// Drop the identifier after a read reported the job gone
    pub fn forget(&mut self) -> Option<JobId> {
        self.id.take()
    }

    pub async fn create(&mut self, spec: &ResourceSpec) -> Result<RemoteResource> {
        if let Some(id) = &self.id {
            return Err(Error::Precondition {
                op: Operation::Create,
                id: Some(id.to_string()),
                reason: format!("job already has id {}", id),
            });
        }
        spec.validate().map_err(|e| e.during(Operation::Create, None))?;

        info!("Creating {} job {:?}", spec.kind, spec.name);
        let payload = spec.to_wire(None)?;
        let id = match self.gateway.create(&payload).await {
            Outcome::Success(id) => id,
            other => return Err(outcome_error(Operation::Create, None, other)),
        };
        info!("Job {} created", id);
        self.id = Some(id.clone());

        match self.fetch(&id).await {
            Ok(ReadOutcome::Present(remote)) => Ok(remote),
            Ok(ReadOutcome::Absent) => Err(Error::CreateUnconfirmed {
                id: id.to_string(),
                source: Box::new(Error::Protocol {
                    op: Operation::Read,
                    id: Some(id.to_string()),
                    status: Some(404),
                    detail: "job not found right after creation".to_string(),
                }),
            }),
            Err(e) => {
                warn!("Job {} created but read-back failed: {}", id, e);
                Err(Error::CreateUnconfirmed {
                    id: id.to_string(),
                    source: Box::new(e),
                })
            }
        }
    }

    /// Refresh from the server. A missing job is `Absent`, not an error, and
    /// the stored id is left for the caller to clear.
    pub async fn read(&self) -> Result<ReadOutcome<RemoteResource>> {
        let id = self.require_id(Operation::Read)?;
        self.fetch(id).await
    }

    pub async fn update(&mut self, spec: &ResourceSpec) -> Result<RemoteResource> {
        let id = self.require_id(Operation::Update)?.clone();
        spec.validate().map_err(|e| e.during(Operation::Update, Some(id.as_str())))?;

        info!("Updating job {}", id);
        let payload = spec.to_wire(Some(&id))?;
        match self.gateway.update(&id, &payload).await {
            Outcome::Success(()) => {}
            other => return Err(outcome_error(Operation::Update, Some(&id), other)),
        }

        match self.fetch(&id).await? {
            ReadOutcome::Present(remote) => Ok(remote),
            ReadOutcome::Absent => Err(Error::Protocol {
                op: Operation::Update,
                id: Some(id.to_string()),
                status: Some(404),
                detail: "job not found right after update".to_string(),
            }),
        }
    }

    /// Delete the job. The id is cleared only once the server confirms.
    pub async fn delete(&mut self) -> Result<()> {
        let id = self.require_id(Operation::Delete)?.clone();

        info!("Deleting job {}", id);
        match self.gateway.delete(&id).await {
            Outcome::Success(()) => {
                self.id = None;
                info!("Job {} deleted", id);
                Ok(())
            }
            other => Err(outcome_error(Operation::Delete, Some(&id), other)),
        }
    }

    async fn fetch(&self, id: &JobId) -> Result<ReadOutcome<RemoteResource>> {
        match self.gateway.read(id).await {
            Outcome::Success(remote) if remote.id == *id => {
                debug!("Read job {}", id);
                Ok(ReadOutcome::Present(remote))
            }
            Outcome::Success(remote) => Err(Error::Protocol {
                op: Operation::Read,
                id: Some(id.to_string()),
                status: Some(expected_status(Operation::Read)),
                detail: format!("server returned job {} instead", remote.id),
            }),
            Outcome::NotFound => {
                info!("Job {} no longer exists", id);
                Ok(ReadOutcome::Absent)
            }
            other => Err(outcome_error(Operation::Read, Some(id), other)),
        }
    }

    fn require_id(&self, op: Operation) -> Result<&JobId> {
        self.id.as_ref().ok_or_else(|| Error::Precondition {
            op,
            id: None,
            reason: "job has no id; it was never created or has been deleted".to_string(),
        })
    }
}

/// Turn a non-success gateway outcome into a lifecycle error
fn outcome_error<T>(op: Operation, id: Option<&JobId>, outcome: Outcome<T>) -> Error {
    let id = id.map(JobId::to_string);
    let expected = expected_status(op);
    match outcome {
        Outcome::TransportError(detail) => Error::Transport { op, id, detail },
        Outcome::NotFound => Error::Protocol {
            op,
            id,
            status: Some(404),
            detail: format!("expected status {}, server reported job not found", expected),
        },
        Outcome::Conflict { body } => Error::Protocol {
            op,
            id,
            status: Some(409),
            detail: format!("conflict: {}", body),
        },
        Outcome::UnexpectedStatus { status, body } => Error::Protocol {
            op,
            id,
            status: Some(status),
            detail: format!("expected status {}, got {}: {}", expected, status, body),
        },
        Outcome::Malformed(detail) => Error::Protocol {
            op,
            id,
            status: Some(expected),
            detail,
        },
        Outcome::Success(_) => Error::Protocol {
            op,
            id,
            status: Some(expected),
            detail: "unexpected success".to_string(),
        },
    }
}
