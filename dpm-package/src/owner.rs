// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Owner/group name resolution for the contents manifest, grounded in the
//! passwd/group lookup `metadata.cpp` performs on the source side.

/// Render `uid:gid` as `owner:group`, resolving each id against the
/// system passwd/group database and falling back to the numeric id
/// (as a decimal string) when no entry exists.
pub fn owner_group_string(uid: u32, gid: u32) -> String {
    let owner = users::get_user_by_uid(uid)
        .and_then(|u| u.name().to_str().map(str::to_string))
        .unwrap_or_else(|| uid.to_string());

    let group = users::get_group_by_gid(gid)
        .and_then(|g| g.name().to_str().map(str::to_string))
        .unwrap_or_else(|| gid.to_string());

    format!("{}:{}", owner, group)
}
