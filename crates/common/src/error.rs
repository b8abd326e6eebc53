//! Error types for the Veeam provider

use std::fmt;

use thiserror::Error;

/// Result type alias using the provider Error
pub type Result<T> = std::result::Result<T, Error>;

/// Lifecycle step an error was raised from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job lifecycle error types
#[derive(Error, Debug)]
pub enum Error {
    /// Desired state rejected before any request was sent
    #[error("Invalid job configuration: {reason}")]
    Validation {
        op: Option<Operation>,
        id: Option<String>,
        reason: String,
    },

    #[error("Cannot {op} job: {reason}")]
    Precondition {
        op: Operation,
        id: Option<String>,
        reason: String,
    },

    #[error("Transport error during {op} of job {}: {detail}", display_id(.id))]
    Transport {
        op: Operation,
        id: Option<String>,
        detail: String,
    },

    /// Unexpected status code, or a success response missing what it must carry
    #[error("Protocol error during {op} of job {}: {detail}", display_id(.id))]
    Protocol {
        op: Operation,
        id: Option<String>,
        status: Option<u16>,
        detail: String,
    },

    /// The job exists remotely but the confirmatory read failed
    #[error("Job {id} was created but could not be read back: {source}")]
    CreateUnconfirmed {
        id: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Validation failure not yet tied to a lifecycle call
    pub fn validation(reason: impl Into<String>) -> Self {
        Error::Validation {
            op: None,
            id: None,
            reason: reason.into(),
        }
    }

    /// Attribute a validation failure to the call that raised it.
    /// Context already present is kept; other variants pass through.
    pub fn during(self, op: Operation, job_id: Option<&str>) -> Self {
        match self {
            Error::Validation {
                op: prev_op,
                id: prev_id,
                reason,
            } => Error::Validation {
                op: prev_op.or(Some(op)),
                id: prev_id.or_else(|| job_id.map(str::to_string)),
                reason,
            },
            other => other,
        }
    }

    /// Operation the error is attributed to, if any
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Error::Validation { op, .. } => *op,
            Error::Precondition { op, .. }
            | Error::Transport { op, .. }
            | Error::Protocol { op, .. } => Some(*op),
            Error::CreateUnconfirmed { .. } => Some(Operation::Create),
            Error::Serialization(_) => None,
        }
    }

    /// Job id the error is attributed to, if known
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Error::Validation { id, .. }
            | Error::Precondition { id, .. }
            | Error::Transport { id, .. }
            | Error::Protocol { id, .. } => id.as_deref(),
            Error::CreateUnconfirmed { id, .. } => Some(id),
            Error::Serialization(_) => None,
        }
    }
}

fn display_id(id: &Option<String>) -> &str {
    id.as_deref().unwrap_or("<unassigned>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_mentions_operation_and_id() {
        let err = Error::Protocol {
            op: Operation::Delete,
            id: Some("job-42".to_string()),
            status: Some(404),
            detail: "expected 204, got 404".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("delete"));
        assert!(msg.contains("job-42"));
        assert_eq!(err.operation(), Some(Operation::Delete));
        assert_eq!(err.job_id(), Some("job-42"));
    }

    #[test]
    fn test_unassigned_id_placeholder() {
        let err = Error::Transport {
            op: Operation::Create,
            id: None,
            detail: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("<unassigned>"));
        assert_eq!(err.job_id(), None);
    }

    #[test]
    fn test_create_unconfirmed_keeps_source() {
        let inner = Error::Transport {
            op: Operation::Read,
            id: Some("job-7".to_string()),
            detail: "timed out".to_string(),
        };
        let err = Error::CreateUnconfirmed {
            id: "job-7".to_string(),
            source: Box::new(inner),
        };
        assert_eq!(err.operation(), Some(Operation::Create));
        assert_eq!(err.job_id(), Some("job-7"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_validation_takes_context_once() {
        let err = Error::validation("name must not be empty");
        assert_eq!(err.operation(), None);
        assert_eq!(err.job_id(), None);

        let err = err.during(Operation::Update, Some("job-9"));
        assert_eq!(err.operation(), Some(Operation::Update));
        assert_eq!(err.job_id(), Some("job-9"));
        assert_eq!(err.to_string(), "Invalid job configuration: name must not be empty");

        let err = err.during(Operation::Create, None);
        assert_eq!(err.operation(), Some(Operation::Update));
        assert_eq!(err.job_id(), Some("job-9"));
    }

    #[test]
    fn test_during_leaves_other_errors_alone() {
        let err = Error::Transport {
            op: Operation::Read,
            id: None,
            detail: "timed out".to_string(),
        }
        .during(Operation::Update, Some("job-9"));
        assert_eq!(err.operation(), Some(Operation::Read));
        assert_eq!(err.job_id(), None);
    }
}
