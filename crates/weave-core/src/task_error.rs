//! Errors returned by background task handlers.
//!
//! The dispatcher inspects these to decide between rescheduling a task and
//! failing it for good. An HD render is only safe to re-run while its job is
//! still `queued`; once the job reached `running`, the handler records the
//! failure on the job itself and reports it as unrecoverable.

use std::fmt;

#[derive(Debug)]
pub struct TaskError {
    inner: anyhow::Error,
    recoverable: bool,
}

impl TaskError {
    /// The task fails immediately; no retry is scheduled.
    pub fn unrecoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: false,
        }
    }

    /// The task is rescheduled with backoff while retries remain.
    pub fn recoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: true,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    pub fn into_inner(self) -> anyhow::Error {
        self.inner
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<anyhow::Error> for TaskError {
    /// Plain errors are retried.
    fn from(err: anyhow::Error) -> Self {
        Self::recoverable(err)
    }
}

pub trait TaskResultExt<T> {
    /// Mark the error side of this result as final.
    fn unrecoverable(self) -> Result<T, TaskError>;
}

impl<T, E: Into<anyhow::Error>> TaskResultExt<T> for Result<T, E> {
    fn unrecoverable(self) -> Result<T, TaskError> {
        self.map_err(|e| TaskError::unrecoverable(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrecoverable_error() {
        let err = TaskError::unrecoverable(anyhow::anyhow!("model weights missing"));
        assert!(!err.is_recoverable());
        assert_eq!(err.to_string(), "model weights missing");
    }

    #[test]
    fn test_recoverable_error() {
        let err = TaskError::recoverable(anyhow::anyhow!("database unreachable"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_from_anyhow_defaults_to_recoverable() {
        let err: TaskError = anyhow::anyhow!("connection reset").into();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_result_ext_marks_unrecoverable() {
        let result: Result<(), std::io::Error> = Err(std::io::Error::other("disk full"));
        let err = result.unrecoverable().unwrap_err();
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("disk full"));
    }
}
