// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use thiserror::Error;

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("key has no usable secret material: {0}")]
    KeyUnusable(String),

    #[error("failed to produce signature: {0}")]
    SignFailed(String),

    #[error("error reading signature data: {0}")]
    VerifyIoFailure(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SigningError>;
