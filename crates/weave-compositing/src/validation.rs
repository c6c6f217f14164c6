use weave_core::AppError;

use crate::codec;

/// Upload validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("File too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge { size: usize, max: usize },

    #[error("Invalid content type: {0} (expected an image/* type)")]
    InvalidContentType(String),

    #[error("File is not a readable image: {0}")]
    NotAnImage(String),

    #[error("Empty file")]
    EmptyFile,
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::FileTooLarge { .. } => AppError::PayloadTooLarge(err.to_string()),
            other => AppError::InvalidInput(other.to_string()),
        }
    }
}

/// Checks applied to every client upload before it reaches storage.
#[derive(Debug, Clone)]
pub struct UploadValidator {
    max_file_size: usize,
}

impl UploadValidator {
    pub fn new(max_file_size: usize) -> Self {
        Self { max_file_size }
    }

    pub fn validate_file_size(&self, size: usize) -> Result<(), ValidationError> {
        if size == 0 {
            return Err(ValidationError::EmptyFile);
        }

        if size > self.max_file_size {
            return Err(ValidationError::FileTooLarge {
                size,
                max: self.max_file_size,
            });
        }

        Ok(())
    }

    pub fn validate_content_type(&self, content_type: &str) -> Result<(), ValidationError> {
        if !content_type.to_ascii_lowercase().starts_with("image/") {
            return Err(ValidationError::InvalidContentType(content_type.to_string()));
        }
        Ok(())
    }

    /// Run every check and return the decoded dimensions.
    pub fn validate(&self, content_type: &str, data: &[u8]) -> Result<(u32, u32), ValidationError> {
        self.validate_content_type(content_type)?;
        self.validate_file_size(data.len())?;
        codec::dimensions(data).map_err(|e| ValidationError::NotAnImage(e.to_string()))
    }
}

/// File extension for a stored upload, from the original filename or the content type.
pub fn extension_for(filename: Option<&str>, content_type: &str) -> String {
    if let Some(ext) = filename
        .and_then(|f| std::path::Path::new(f).extension())
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
    {
        return ext;
    }
    match content_type.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "bin",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_rgb, OutputFormat};
    use image::{Rgb, RgbImage};

    #[test]
    fn test_validate_file_size() {
        let validator = UploadValidator::new(10);
        assert!(matches!(
            validator.validate_file_size(0),
            Err(ValidationError::EmptyFile)
        ));
        assert!(validator.validate_file_size(10).is_ok());
        assert!(matches!(
            validator.validate_file_size(11),
            Err(ValidationError::FileTooLarge { size: 11, max: 10 })
        ));
    }

    #[test]
    fn test_validate_content_type() {
        let validator = UploadValidator::new(10);
        assert!(validator.validate_content_type("image/png").is_ok());
        assert!(validator.validate_content_type("IMAGE/JPEG").is_ok());
        assert!(validator.validate_content_type("application/pdf").is_err());
        assert!(validator.validate_content_type("").is_err());
    }

    #[test]
    fn test_validate_returns_dimensions() {
        let png = encode_rgb(&RgbImage::from_pixel(9, 4, Rgb([1, 2, 3])), OutputFormat::Png).unwrap();
        let validator = UploadValidator::new(1 << 20);
        assert_eq!(validator.validate("image/png", &png.data).unwrap(), (9, 4));
        assert!(matches!(
            validator.validate("image/png", b"not a png"),
            Err(ValidationError::NotAnImage(_))
        ));
    }

    #[test]
    fn test_error_mapping() {
        let too_large: AppError = ValidationError::FileTooLarge { size: 2, max: 1 }.into();
        assert!(matches!(too_large, AppError::PayloadTooLarge(_)));
        let empty: AppError = ValidationError::EmptyFile.into();
        assert!(matches!(empty, AppError::InvalidInput(_)));
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for(Some("Look.PNG"), "image/jpeg"), "png");
        assert_eq!(extension_for(Some("noext"), "image/jpeg"), "jpg");
        assert_eq!(extension_for(None, "image/webp"), "webp");
        assert_eq!(extension_for(Some("x.p/ng"), "image/unknown"), "bin");
    }
}
