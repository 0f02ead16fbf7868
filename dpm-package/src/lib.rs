// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The package lifecycle pipeline.

Stage layout (C4), the metadata/digest-chain engine (C5), the two-phase
sealer and its unsealer (C6), and the disk-based and in-memory verifiers
(C7). `dpm-core`'s `build`/`verify`/`info` modules are thin drivers over
the functions in this crate; none of the filesystem or archive mechanics
live in the module layer itself.
*/

pub mod error;
pub mod hooks;
pub mod info;
pub mod manifest;
pub mod metadata;
pub mod owner;
pub mod seal;
pub mod stage;
pub mod verify;

pub use error::{Error, Result};
pub use info::{read_package_metadata, read_stage_metadata};
pub use manifest::{ContentsEntry, HookEntry};
pub use seal::{
    reseal_signed, seal_final, seal_stage_components, unseal_package, unseal_stage_components,
};
pub use stage::{create_stage, stage_name, StageParams};
pub use verify::{
    verify_contents_manifest, verify_hooks_digest, verify_package_bytes, verify_package_digest,
    verify_stage,
};

/// Hash algorithm used throughout the digest chain when configuration
/// supplies no `cryptography.checksum_algorithm` value.
pub const DEFAULT_CHECKSUM_ALGORITHM: dpm_digest::Algorithm = dpm_digest::Algorithm::Sha256;
