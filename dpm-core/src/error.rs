// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use thiserror::Error;

/// Primary crate error type.
///
/// Variant names map onto the error taxonomy of the core specification:
/// filesystem preconditions on the module path, plugin discovery/contract
/// validation, and plugin dispatch.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("path not found: {0}")]
    PathNotFound(std::path::PathBuf),

    #[error("path is not a directory: {0}")]
    PathNotDirectory(std::path::PathBuf),

    #[error("path too long: {0}")]
    PathTooLong(String),

    #[error("permission denied: {0}")]
    PermissionDenied(std::path::PathBuf),

    #[error("module not found: {0}")]
    ModuleNotFound(String),

    #[error("failed to load module {0}: {1}")]
    ModuleLoadFailed(String, String),

    #[error("module is not loaded")]
    ModuleNotLoaded,

    #[error("module does not implement the required interface: missing {0:?}")]
    InvalidModule(Vec<&'static str>),

    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("symbol execution failed: {0}")]
    SymbolExecutionFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Undefined(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
