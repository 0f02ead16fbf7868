// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The core callback surface exposed to modules.

`Context` is the stable ABI a module is written against: configuration
lookup, the two logging sinks, the level threshold, module-path resolution,
and the module runtime itself (`module_exists`, `load_module`,
`symbol_exists`, `unload_module`, `execute_symbol`). It is passed explicitly
to every module rather than reached through a process-wide singleton, per
the core services redesign.
*/

use crate::{
    config::ConfigRegistry,
    error::Result,
    logging::{Level, LoggerContext},
    modules::{dynamic::DynamicModule, ModuleHandle, ModuleRuntime},
};

pub struct Context {
    config: ConfigRegistry,
    logger: LoggerContext,
    runtime: ModuleRuntime,
}

impl Context {
    pub fn new(config: ConfigRegistry, logger: LoggerContext, runtime: ModuleRuntime) -> Self {
        Self {
            config,
            logger,
            runtime,
        }
    }

    /// Resolve `section.key`, falling back to the `MAIN` section.
    pub fn get_config(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    pub fn config(&self) -> &ConfigRegistry {
        &self.config
    }

    pub fn log(&self, level: Level, message: &str) {
        self.logger.log(level, message)
    }

    pub fn con(&self, level: Level, message: &str) {
        self.logger.con(level, message)
    }

    pub fn set_logging_level(&self, level: Level) {
        self.logger.set_logging_level(level)
    }

    pub fn get_module_path(&self) -> &std::path::Path {
        self.runtime.module_path()
    }

    pub fn module_exists(&self, name: &str) -> bool {
        self.runtime.module_exists(name)
    }

    pub fn load_module(&self, name: &str) -> Result<ModuleHandle> {
        self.runtime.load_module(name)
    }

    pub fn symbol_exists(&self, handle: &ModuleHandle, name: &str) -> bool {
        handle.symbol_exists(name)
    }

    /// `unload_module` is idempotent and implicit: dropping the handle
    /// closes it. This method exists so call sites mirroring the source's
    /// explicit unload step read naturally; it is a no-op beyond the drop.
    pub fn unload_module(&self, _handle: ModuleHandle) {}

    /// Resolve and call an arbitrary typed symbol in a loaded dynamic
    /// module — the mechanism behind plugin-to-plugin dispatch (`verify`
    /// reaching `build`'s primitives). Static built-in modules have no
    /// symbol table to probe; this returns `SymbolNotFound` for them.
    ///
    /// # Safety
    ///
    /// See [DynamicModule::call_symbol]: `T` must match the symbol's actual
    /// signature.
    pub unsafe fn execute_symbol<'a, T>(
        &self,
        handle: &'a ModuleHandle,
        name: &str,
    ) -> Result<libloading::Symbol<'a, T>> {
        match handle {
            ModuleHandle::Dynamic(module) => module.call_symbol(name),
            ModuleHandle::Static(_) => {
                Err(crate::error::CoreError::SymbolNotFound(name.to_string()))
            }
        }
    }

    pub fn runtime(&self) -> &ModuleRuntime {
        &self.runtime
    }
}

/// Convenience accessor kept separate from `Context` methods so a module
/// holding only a `&DynamicModule` (already resolved via
/// `execute_module`'s plugin-to-plugin path) can still reach typed symbols
/// without going back through a `Context`.
pub fn typed_symbol<'a, T>(module: &'a DynamicModule, name: &str) -> Result<libloading::Symbol<'a, T>> {
    unsafe { module.call_symbol(name) }
}
