use std::collections::BTreeSet;

use serde::Deserialize;
use thiserror::Error;

/// Default upload ceiling: 10 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Longest accepted display filename, in characters.
pub const MAX_FILENAME_CHARS: usize = 255;

/// Longest accepted tag, in characters.
pub const MAX_TAG_CHARS: usize = 64;

/// Maximum number of tags on one document.
pub const MAX_TAGS: usize = 32;

/// Longest accepted description, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 4096;

/// Content types accepted when no explicit allow-list is configured.
pub const DEFAULT_ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "image/png",
    "image/jpeg",
    "image/jpg",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// Validation failures. Messages are meant to be shown to the uploader.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("file type {content_type} is not allowed; allowed types: {allowed}")]
    DisallowedType {
        content_type: String,
        allowed: String,
    },

    #[error("file is {size} bytes, which exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },

    #[error("file is empty")]
    Empty,

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl ValidationError {
    fn field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// Type and size rules applied to every upload and replacement.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadPolicy {
    /// Largest accepted file, in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Accepted content types (lowercase, without parameters).
    #[serde(default = "default_allowed_mime_types")]
    pub allowed_mime_types: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            allowed_mime_types: default_allowed_mime_types(),
        }
    }
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_allowed_mime_types() -> Vec<String> {
    DEFAULT_ALLOWED_MIME_TYPES
        .iter()
        .map(|&t| t.to_owned())
        .collect()
}

impl UploadPolicy {
    /// Normalize `content_type` and check it against the allow-list.
    ///
    /// Returns the normalized type (lowercase, parameters stripped).
    pub fn check_content_type(&self, content_type: &str) -> Result<String, ValidationError> {
        let normalized = normalize_content_type(content_type);
        if self.allowed_mime_types.iter().any(|t| *t == normalized) {
            Ok(normalized)
        } else {
            Err(ValidationError::DisallowedType {
                content_type: if normalized.is_empty() {
                    "(none)".to_owned()
                } else {
                    normalized
                },
                allowed: self.allowed_mime_types.join(", "),
            })
        }
    }

    /// Check a size known before any byte is written.
    pub fn check_declared_size(&self, size: u64) -> Result<(), ValidationError> {
        if size == 0 {
            return Err(ValidationError::Empty);
        }
        self.check_running_size(size)
    }

    /// Check the running byte count of a stream in progress.
    pub fn check_running_size(&self, size: u64) -> Result<(), ValidationError> {
        if size > self.max_file_size {
            return Err(ValidationError::TooLarge {
                size,
                limit: self.max_file_size,
            });
        }
        Ok(())
    }
}

/// Lowercase a content type and strip any `;`-separated parameters.
pub fn normalize_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Trim and check a display filename.
pub fn normalize_filename(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::field("filename", "must not be empty"));
    }
    if trimmed.chars().count() > MAX_FILENAME_CHARS {
        return Err(ValidationError::field(
            "filename",
            format!("must be at most {MAX_FILENAME_CHARS} characters"),
        ));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(ValidationError::field(
            "filename",
            "must not contain control characters",
        ));
    }
    Ok(trimmed.to_owned())
}

/// Trim, deduplicate and check a set of tags. Blank entries are dropped.
pub fn normalize_tags<I, S>(tags: I) -> Result<BTreeSet<String>, ValidationError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = BTreeSet::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if tag.is_empty() {
            continue;
        }
        if tag.chars().count() > MAX_TAG_CHARS {
            return Err(ValidationError::field(
                "tags",
                format!("tag '{tag}' is longer than {MAX_TAG_CHARS} characters"),
            ));
        }
        out.insert(tag.to_owned());
    }
    if out.len() > MAX_TAGS {
        return Err(ValidationError::field(
            "tags",
            format!("at most {MAX_TAGS} tags are allowed"),
        ));
    }
    Ok(out)
}

/// Check a description. Empty descriptions are normalized to `None`.
pub fn normalize_description(description: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(text) = description.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    if text.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(ValidationError::field(
            "description",
            format!("must be at most {MAX_DESCRIPTION_CHARS} characters"),
        ));
    }
    Ok(Some(text.to_owned()))
}
