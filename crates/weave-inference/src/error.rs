use weave_core::AppError;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("segmentation failed: {0}")]
    Segmentation(String),

    #[error("inpainting failed: {0}")]
    Inpainting(String),

    #[error("inference worker stopped: {0}")]
    Worker(String),
}

impl From<InferenceError> for AppError {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::ModelUnavailable(msg) => AppError::ModelUnavailable(msg),
            InferenceError::Segmentation(msg) => AppError::Segmentation(msg),
            InferenceError::Inpainting(msg) => AppError::Inpainting(msg),
            InferenceError::Worker(msg) => AppError::Internal(msg),
        }
    }
}

impl From<tokio::task::JoinError> for InferenceError {
    fn from(err: tokio::task::JoinError) -> Self {
        InferenceError::Worker(err.to_string())
    }
}
