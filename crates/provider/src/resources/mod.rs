//! Resource Implementations
//!
//! Lifecycle controllers for each managed resource type.

pub mod job;

pub use job::JobReconciler;

/// Result of refreshing a resource from the server
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome<T> {
    Present(T),
    /// The server no longer knows the resource
    Absent,
}

impl<T> ReadOutcome<T> {
    pub fn present(self) -> Option<T> {
        match self {
            ReadOutcome::Present(v) => Some(v),
            ReadOutcome::Absent => None,
        }
    }
}
