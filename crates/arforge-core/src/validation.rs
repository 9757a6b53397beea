//! Submission input validation.
//!
//! Shape checks performed before the pipeline touches any remote service:
//! non-empty metadata, byte-size ceilings, and extension allow-lists.

use thiserror::Error;
use validator::Validate;

use crate::config::PipelineConfig;

const MAX_TITLE_LENGTH: usize = 255;
const MAX_DESCRIPTION_LENGTH: usize = 2000;
const MAX_FILENAME_LENGTH: usize = 255;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid metadata: {0}")]
    Metadata(String),

    #[error("Empty {0} payload")]
    EmptyPayload(&'static str),

    #[error("{asset} exceeds size ceiling: {size} > {ceiling} bytes")]
    PayloadTooLarge {
        asset: &'static str,
        size: usize,
        ceiling: usize,
    },

    #[error("Unsupported {asset} extension: {extension}")]
    UnsupportedExtension {
        asset: &'static str,
        extension: String,
    },
}

/// User-supplied submission metadata.
#[derive(Debug, Clone, Validate, serde::Deserialize)]
pub struct SubmissionMetadata {
    #[validate(length(min = 1, max = 255, message = "Title must be between 1 and 255 characters"))]
    pub title: String,
    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,
}

/// Validates one submission's metadata and payloads against configured limits.
pub struct SubmissionValidator {
    max_image_size_bytes: usize,
    max_video_size_bytes: usize,
    allowed_image_extensions: Vec<String>,
    allowed_video_extensions: Vec<String>,
}

impl SubmissionValidator {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_image_size_bytes: config.max_image_size_bytes,
            max_video_size_bytes: config.max_video_size_bytes,
            allowed_image_extensions: config.allowed_image_extensions.clone(),
            allowed_video_extensions: config.allowed_video_extensions.clone(),
        }
    }

    pub fn validate_metadata(&self, metadata: &SubmissionMetadata) -> Result<(), ValidationError> {
        metadata
            .validate()
            .map_err(|e| ValidationError::Metadata(e.to_string()))?;
        if metadata.title.trim().is_empty() {
            return Err(ValidationError::Metadata("Title must not be blank".into()));
        }
        if metadata.title.len() > MAX_TITLE_LENGTH {
            return Err(ValidationError::Metadata("Title too long".into()));
        }
        if let Some(description) = &metadata.description {
            if description.len() > MAX_DESCRIPTION_LENGTH {
                return Err(ValidationError::Metadata("Description too long".into()));
            }
        }
        Ok(())
    }

    pub fn validate_image(&self, filename: &str, size: usize) -> Result<String, ValidationError> {
        validate_asset(
            "image",
            filename,
            size,
            self.max_image_size_bytes,
            &self.allowed_image_extensions,
        )
    }

    pub fn validate_video(&self, filename: &str, size: usize) -> Result<String, ValidationError> {
        validate_asset(
            "video",
            filename,
            size,
            self.max_video_size_bytes,
            &self.allowed_video_extensions,
        )
    }
}

fn validate_asset(
    asset: &'static str,
    filename: &str,
    size: usize,
    ceiling: usize,
    allowed_extensions: &[String],
) -> Result<String, ValidationError> {
    if size == 0 {
        return Err(ValidationError::EmptyPayload(asset));
    }
    if size > ceiling {
        return Err(ValidationError::PayloadTooLarge {
            asset,
            size,
            ceiling,
        });
    }
    let extension =
        file_extension(filename).ok_or_else(|| ValidationError::UnsupportedExtension {
            asset,
            extension: String::new(),
        })?;
    if !allowed_extensions.iter().any(|e| e == &extension) {
        return Err(ValidationError::UnsupportedExtension { asset, extension });
    }
    Ok(extension)
}

/// Lowercased extension of `filename`, if any.
pub fn file_extension(filename: &str) -> Option<String> {
    let base = filename.rsplit('/').next().unwrap_or(filename);
    let (stem, extension) = base.rsplit_once('.')?;
    if stem.is_empty() || extension.is_empty() {
        return None;
    }
    Some(extension.to_lowercase())
}

/// Strip path components and replace unsafe characters in a user filename.
pub fn sanitize_filename(filename: &str) -> String {
    let base = std::path::Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);
    if base.contains("..") {
        return "invalid_filename".to_string();
    }
    let s: String = base
        .chars()
        .take(MAX_FILENAME_LENGTH)
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if s.trim().is_empty() {
        "file".to_string()
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> SubmissionValidator {
        SubmissionValidator::from_config(&PipelineConfig::default())
    }

    #[test]
    fn test_metadata_requires_title() {
        let v = validator();
        let err = v
            .validate_metadata(&SubmissionMetadata {
                title: "".to_string(),
                description: None,
            })
            .unwrap_err();
        assert!(matches!(err, ValidationError::Metadata(_)));

        assert!(v
            .validate_metadata(&SubmissionMetadata {
                title: "Test".to_string(),
                description: Some("A poster".to_string()),
            })
            .is_ok());
    }

    #[test]
    fn test_blank_title_rejected() {
        let err = validator()
            .validate_metadata(&SubmissionMetadata {
                title: "   ".to_string(),
                description: None,
            })
            .unwrap_err();
        assert!(matches!(err, ValidationError::Metadata(_)));
    }

    #[test]
    fn test_empty_payload_rejected() {
        let err = validator().validate_image("poster.png", 0).unwrap_err();
        assert!(matches!(err, ValidationError::EmptyPayload("image")));
    }

    #[test]
    fn test_size_ceiling() {
        let err = validator()
            .validate_video("clip.mp4", 600 * 1024 * 1024)
            .unwrap_err();
        assert!(matches!(err, ValidationError::PayloadTooLarge { .. }));
    }

    #[test]
    fn test_extension_allow_list() {
        let v = validator();
        assert_eq!(v.validate_image("poster.PNG", 10).unwrap(), "png");
        assert!(matches!(
            v.validate_image("poster.exe", 10),
            Err(ValidationError::UnsupportedExtension { .. })
        ));
        assert!(matches!(
            v.validate_video("clip", 10),
            Err(ValidationError::UnsupportedExtension { .. })
        ));
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("a/b/poster.JPG"), Some("jpg".to_string()));
        assert_eq!(file_extension("noext"), None);
        assert_eq!(file_extension(".hidden"), None);
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("my poster!.png"), "my_poster_.png");
        assert_eq!(sanitize_filename("  "), "__");
    }
}
