// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Logging.

Two independently-gated sinks, as the core callback surface requires: `log`
persists (or, lacking a configured log file, is a no-op drain) and `con` is
console-only and never persisted. Both share one level threshold, swapped
by `set_logging_level`.

Ported from `pyoxidizer::logging::PrintlnDrain`: a `slog::Drain` that writes
with `println!`. The source's drain bakes its minimum level in at
construction; this one holds it in an `AtomicU8` instead so
`set_logging_level` can change it after the logger is built, without
rebuilding the `slog::Logger` tree.
*/

use {
    slog::Drain,
    std::sync::{atomic::{AtomicU8, Ordering}, Arc},
};

/// The five levels the core callback surface exposes to modules, ordered
/// most-severe first.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    Fatal = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
}

/// A drain that prints with `println!` when the message's level is at least
/// as severe as the shared threshold, and is silenced entirely when
/// `persisted` is false and no log file is configured.
struct GatedPrintlnDrain {
    min_level: Arc<AtomicU8>,
    silent: bool,
}

impl slog::Drain for GatedPrintlnDrain {
    type Ok = ();
    type Err = std::io::Error;

    fn log(
        &self,
        record: &slog::Record,
        _values: &slog::OwnedKVList,
    ) -> Result<Self::Ok, Self::Err> {
        if self.silent {
            return Ok(());
        }

        let threshold = self.min_level.load(Ordering::Relaxed);
        if record.level().as_usize() as u8 <= threshold {
            println!("{}", record.msg());
        }

        Ok(())
    }
}

fn to_slog_level(level: Level) -> slog::Level {
    match level {
        Level::Fatal => slog::Level::Critical,
        Level::Error => slog::Level::Error,
        Level::Warn => slog::Level::Warning,
        Level::Info => slog::Level::Info,
        Level::Debug => slog::Level::Debug,
    }
}

/// Holds the two loggers modules write through, plus the shared level gate.
///
/// Constructed once at process start and threaded through a `Context` value
/// rather than held in a global, per the core services design.
#[derive(Clone)]
pub struct LoggerContext {
    persisted: slog::Logger,
    console: slog::Logger,
    min_level: Arc<AtomicU8>,
}

impl LoggerContext {
    /// `log_enabled` mirrors whether a log file was configured; when false,
    /// `log()` calls are silently dropped while `con()` still reaches the
    /// console.
    pub fn new(initial_level: Level, log_enabled: bool) -> Self {
        let min_level = Arc::new(AtomicU8::new(to_slog_level(initial_level).as_usize() as u8));

        let persisted = slog::Logger::root(
            GatedPrintlnDrain {
                min_level: min_level.clone(),
                silent: !log_enabled,
            }
            .fuse(),
            slog::o!(),
        );
        let console = slog::Logger::root(
            GatedPrintlnDrain {
                min_level: min_level.clone(),
                silent: false,
            }
            .fuse(),
            slog::o!(),
        );

        Self {
            persisted,
            console,
            min_level,
        }
    }

    /// Append to the persisted sink.
    pub fn log(&self, level: Level, message: &str) {
        slog::log!(self.persisted, to_slog_level(level), "{}", message)
    }

    /// Console-only; never persisted.
    pub fn con(&self, level: Level, message: &str) {
        slog::log!(self.console, to_slog_level(level), "{}", message)
    }

    /// Threshold applied to both sinks.
    pub fn set_logging_level(&self, level: Level) {
        self.min_level
            .store(to_slog_level(level).as_usize() as u8, Ordering::Relaxed);
    }
}

impl Default for LoggerContext {
    fn default() -> Self {
        Self::new(Level::Warn, true)
    }
}
