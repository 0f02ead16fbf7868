// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Core services shared by every DPM module.

The configuration registry, the logger, module-path resolution, and the
module runtime (static subcommand registry plus a genuinely dynamic plugin
host for third-party extensions). This is the stable callback surface
[context::Context] exposes to `build`, `verify`, and `info`, and to any
externally loaded module built to the same contract.
*/

pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod modules;
pub mod path;

pub use config::ConfigRegistry;
pub use context::Context;
pub use error::{CoreError, Result};
pub use logging::{Level, LoggerContext};
pub use modules::{Module, ModuleHandle, ModuleRuntime, StaticModuleRegistry};
