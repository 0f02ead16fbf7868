// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The fixed set of lifecycle hook names and the no-op template script
//! written for each one when a stage is created without a `hooks_source`.

/// The legal hook set, in the fixed order templates are written.
pub const HOOK_NAMES: [&str; 12] = [
    "PRE-INSTALL",
    "PRE-INSTALL_ROLLBACK",
    "POST-INSTALL",
    "POST-INSTALL_ROLLBACK",
    "PRE-UPDATE",
    "PRE-UPDATE_ROLLBACK",
    "POST-UPDATE",
    "POST-UPDATE_ROLLBACK",
    "PRE-REMOVE",
    "PRE-REMOVE_ROLLBACK",
    "POST-REMOVE",
    "POST-REMOVE_ROLLBACK",
];

/// Contents of a template hook script: a no-op that exits successfully.
pub fn template_script() -> &'static str {
    "#!/bin/sh\nexit 0\n"
}
