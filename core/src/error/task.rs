use std::sync::Arc;

use thiserror::Error;

use super::build::BuildError;

pub type TaskResult<T> = Result<T, TaskError>;

/// Errors surfaced through task futures.
///
/// Cloneable because any number of waiters may observe the same terminal
/// state; non-cloneable payloads are shared behind an `Arc`.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// An operation was invoked in a state that does not permit it, such as
    /// resuming a task that already ran.
    #[error("invalid task state: {0}")]
    InvalidState(String),

    #[error("cancelled: {reason}")]
    Cancelled { reason: String },

    /// A task this one waited on reached a terminal failure.
    #[error("dependency '{label}' failed")]
    Dependency {
        label: String,
        #[source]
        source: Arc<TaskError>,
    },

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error(transparent)]
    Build(#[from] BuildError),

    /// Failure from a collaborator boundary (downloader, extractor,
    /// pipeline). Wrapped in an `Arc` because `anyhow::Error` is not
    /// cloneable.
    #[error("{0}")]
    Other(Arc<anyhow::Error>),
}

impl TaskError {
    pub fn cancelled(reason: impl Into<String>) -> Self {
        TaskError::Cancelled {
            reason: reason.into(),
        }
    }

    pub fn other(err: anyhow::Error) -> Self {
        TaskError::Other(Arc::new(err))
    }

    pub fn dependency(label: impl Into<String>, source: TaskError) -> Self {
        TaskError::Dependency {
            label: label.into(),
            source: Arc::new(source),
        }
    }

    /// True when the failure is a cancellation, directly or through any
    /// chain of dependency wrappers.
    pub fn is_cancelled(&self) -> bool {
        match self {
            TaskError::Cancelled { .. } => true,
            TaskError::Dependency { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}
