use super::models::{Config, DelayRange};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("project.{field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("project.name '{name}' must not contain path separators or '..'")]
    UnsafeProjectName { name: String },

    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error("{field} range is inverted: min_ms {min_ms} > max_ms {max_ms}")]
    InvertedRange {
        field: &'static str,
        min_ms: u64,
        max_ms: u64,
    },

    #[error("download.url_template '{template}' has no {{id}} placeholder")]
    MissingIdPlaceholder { template: String },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_project(config)?;
    validate_download(config)?;
    Ok(())
}

fn validate_project(config: &Config) -> Result<(), ValidationError> {
    let project = &config.project;

    if project.name.trim().is_empty() {
        return Err(ValidationError::EmptyField { field: "name" });
    }
    if project.contract.trim().is_empty() {
        return Err(ValidationError::EmptyField { field: "contract" });
    }

    // The name becomes a file name and a directory name
    if project.name.contains(['/', '\\']) || project.name.contains("..") {
        return Err(ValidationError::UnsafeProjectName {
            name: project.name.clone(),
        });
    }

    Ok(())
}

fn validate_download(config: &Config) -> Result<(), ValidationError> {
    let download = &config.download;

    if download.workers == 0 {
        return Err(ValidationError::ZeroValue {
            field: "download.workers",
        });
    }
    if download.batch_size == 0 {
        return Err(ValidationError::ZeroValue {
            field: "download.batch_size",
        });
    }
    if download.checkpoint_interval == 0 {
        return Err(ValidationError::ZeroValue {
            field: "download.checkpoint_interval",
        });
    }

    validate_range("download.jitter", &download.jitter)?;
    validate_range("download.startup_stagger", &download.startup_stagger)?;

    if !download.url_template.contains("{id}") {
        return Err(ValidationError::MissingIdPlaceholder {
            template: download.url_template.clone(),
        });
    }

    Ok(())
}

fn validate_range(field: &'static str, range: &DelayRange) -> Result<(), ValidationError> {
    if range.min_ms > range.max_ms {
        return Err(ValidationError::InvertedRange {
            field,
            min_ms: range.min_ms,
            max_ms: range.max_ms,
        });
    }
    Ok(())
}
