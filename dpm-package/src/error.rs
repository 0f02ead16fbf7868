// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling.

The aggregate error type the pipeline and the CLI operate on. Each lower
crate's error wraps in through `#[from]`, the same way `debian-packaging`'s
`DebianError` wraps `FileManifestError`. Variant names map onto the error
taxonomy of the core specification so the CLI's logger can print
"category: message" without a stack trace.
*/

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("output path already exists: {0}")]
    OutputExists(std::path::PathBuf),

    #[error("contents source does not exist: {0}")]
    ContentsMissing(std::path::PathBuf),

    #[error("hooks source does not exist: {0}")]
    HooksMissing(std::path::PathBuf),

    #[error("failed to copy {0} to {1}: {2}")]
    CopyFailed(std::path::PathBuf, std::path::PathBuf, String),

    #[error("digest mismatch for {path}: expected {expected}, got {actual}")]
    DigestMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("{0} checksum errors found verifying contents manifest")]
    ContentsVerificationFailed(usize),

    #[error("{0} checksum errors found verifying hooks digest")]
    HooksVerificationFailed(usize),

    #[error("manifest line malformed: {0}")]
    ManifestMalformed(String),

    #[error("missing file listed in manifest: {0}")]
    ManifestFileMissing(String),

    #[error(".dpm package must have a .dpm extension (case-sensitive): {0}")]
    NotADpmFile(std::path::PathBuf),

    #[error("unseal target already exists and is neither empty nor a prior unseal of this package: {0}")]
    UnsealTargetExists(std::path::PathBuf),

    #[error("stage is missing required component: {0}")]
    MissingComponent(&'static str),

    #[error("signature invalid for {0}")]
    SignatureInvalid(String),

    #[error("digest error: {0}")]
    Digest(#[from] dpm_digest::DigestError),

    #[error("archive error: {0}")]
    Archive(#[from] dpm_archive::ArchiveError),

    #[error("signing error: {0}")]
    Signing(#[from] dpm_signing::SigningError),

    #[error("file manifest error: {0}")]
    FileManifest(#[from] dpm_file_manifest::FileManifestError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("path prefix error: {0}")]
    StripPrefix(#[from] std::path::StripPrefixError),

    #[error("{0}")]
    Undefined(String),
}

pub type Result<T> = std::result::Result<T, Error>;
