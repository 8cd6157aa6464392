//! Validation functions for configuration values.
//!
//! Used from `#[validate(custom(function = ...))]` attributes on the config
//! structs, so each returns a `ValidationError` with a readable message.

use sanitize_filename::{is_sanitized, sanitize};
use validator::ValidationError;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A name must be usable as one path segment inside the dated output directory.
pub fn validate_path_segment<S: AsRef<str>>(name: S) -> Result<(), ValidationError> {
    let name = name.as_ref();
    if name.is_empty() || name == "." || name == ".." || !is_sanitized(name) {
        return Err(ValidationError::new("InvalidName").with_message(
            format!(
                "Invalid name {:?}, try sanitizing like {:?}",
                name,
                sanitize(name)
            )
            .into(),
        ));
    }

    Ok(())
}

/// Database names are also passed to the dump tool as its last argument,
/// so they must not look like an option.
pub fn validate_database_names<S: AsRef<str>>(names: &[S]) -> Result<(), ValidationError> {
    names.iter().try_for_each(|name| {
        let name = name.as_ref();
        if name.starts_with('-') {
            return Err(ValidationError::new("InvalidName").with_message(
                format!("Database name {:?} must not start with '-'", name).into(),
            ));
        }
        validate_path_segment(name)
    })
}

pub fn validate_folder_targets(
    folders: &BTreeMap<String, PathBuf>,
) -> Result<(), ValidationError> {
    for (name, src) in folders {
        validate_path_segment(name)?;
        validate_dir_exist(src)?;
    }

    Ok(())
}

pub fn validate_dir_exist<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ValidationError::new("InvalidDirectory")
                .with_message(format!("{:?} is not a directory", dir).into()));
        }
    } else {
        return Err(ValidationError::new("InvalidDirectory")
            .with_message(format!("{:?} not found", dir).into()));
    }

    Ok(())
}

pub fn validate_dir_exist_or_created<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ValidationError::new("InvalidDirectory")
                .with_message(format!("{:?} is not a directory", dir).into()));
        }
    } else {
        return std::fs::create_dir_all(dir).map_err(|e| {
            ValidationError::new("InvalidDirectory").with_message(
                format!("cannot create or access out_dir path {:?}: {}", dir, e).into(),
            )
        });
    }

    Ok(())
}

pub fn validate_writable_dir<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    validate_dir_exist_or_created(dir)?;
    let md = std::fs::metadata(dir).map_err(|e| {
        ValidationError::new("InvalidDirectory")
            .with_message(format!("cannot access metadata for {:?}: {}", dir, e).into())
    })?;
    if md.permissions().readonly() {
        Err(ValidationError::new("InvalidDirectory")
            .with_message(format!("cannot write to dir {:?}", dir).into()))
    } else {
        Ok(())
    }
}
