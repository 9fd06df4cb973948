//! Checks on the submitted read files.

use std::path::{Path, PathBuf};

use crate::err::InputError;

/// Allowed file name suffixes for read files, compared case-insensitively.
pub const READ_FILE_SUFFIXES: &[&str] = &[".fastq", ".fq", ".fastq.gz", ".fq.gz"];

/// Whether the file name of `path` carries one of the allowed suffixes.
///
/// Only the name is looked at, the content is not verified.
pub fn is_read_file_name(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    let name = name.to_ascii_lowercase();
    READ_FILE_SUFFIXES.iter().any(|suffix| {
        name.len() > suffix.len() && name.ends_with(suffix)
    })
}

/// Validate the submitted read files before a run is created.
pub fn validate_read_files(paths: &[PathBuf]) -> Result<(), InputError> {
    if paths.is_empty() {
        return Err(InputError::NoReadFiles);
    }
    for path in paths {
        if !is_read_file_name(path) {
            return Err(InputError::DisallowedSuffix(path.clone()));
        }
        if !path.is_file() {
            return Err(InputError::NotFound(path.clone()));
        }
    }
    Ok(())
}
