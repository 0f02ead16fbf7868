// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("source and output path are the same: {0}")]
    SourceEqualsOutput(std::path::PathBuf),

    #[error("output directory does not exist: {0}")]
    OutputParentMissing(std::path::PathBuf),

    #[error("archive member not found: {0}")]
    MemberNotFound(String),

    #[error("archive is corrupt: {0}")]
    Corrupt(String),

    #[error("path is neither a directory nor a gzipped file: {0}")]
    NotCompressibleOrDirectory(std::path::PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
