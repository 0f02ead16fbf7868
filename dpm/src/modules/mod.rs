// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The three built-in subcommands, each a statically linked
`dpm_core::Module`. The behavior lives here; `dpm-package` only knows
about stages, seals and verification, not argument parsing or exit codes.
*/

pub mod build;
pub mod info;
pub mod verify;

/// Resolve `cryptography.checksum_algorithm`, falling back to the
/// pipeline's own default when the key is absent or names an unknown
/// algorithm.
pub(crate) fn resolve_algorithm(config: &dpm_core::ConfigRegistry) -> dpm_digest::Algorithm {
    config
        .get("cryptography", "checksum_algorithm")
        .and_then(|name| dpm_digest::Algorithm::from_name(&name).ok())
        .unwrap_or(dpm_package::DEFAULT_CHECKSUM_ALGORITHM)
}
