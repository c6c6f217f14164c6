use weave_core::AppError;

#[derive(Debug, thiserror::Error)]
pub enum CompositeError {
    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Failed to encode image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("Invalid scale factor: {0} (must be finite and greater than zero)")]
    InvalidScale(f32),

    #[error("Image has no pixels")]
    EmptyImage,
}

impl From<CompositeError> for AppError {
    fn from(err: CompositeError) -> Self {
        match err {
            CompositeError::InvalidScale(_) => AppError::InvalidInput(err.to_string()),
            other => AppError::ImageProcessing(other.to_string()),
        }
    }
}
