// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Log sink installation.
//!
//! Library code logs through the `log` facade; this module provides the
//! sinks (console, session file) and installs them behind a single
//! dispatcher. Initialize once, early in `main()`:
//!
//! ```ignore
//! use trnbridge::logging::{init_logger, ConsoleOutput};
//! use std::sync::Arc;
//!
//! init_logger(vec![Arc::new(ConsoleOutput)], log::LevelFilter::Info);
//! ```

mod output;

pub use output::{ConsoleOutput, FileOutput, Output};

use std::sync::Arc;

struct Dispatcher {
    outputs: Vec<Arc<dyn Output>>,
    level: log::LevelFilter,
}

impl log::Log for Dispatcher {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("{:<5} {}", record.level(), record.args());
        for out in &self.outputs {
            out.write(record.level(), &line);
        }
    }

    fn flush(&self) {
        for out in &self.outputs {
            out.flush();
        }
    }
}

/// Install the dispatcher as the global logger.
///
/// Later calls are ignored (safe): the first installation wins.
pub fn init_logger(outputs: Vec<Arc<dyn Output>>, level: log::LevelFilter) {
    let dispatcher = Dispatcher { outputs, level };
    if log::set_boxed_logger(Box::new(dispatcher)).is_ok() {
        log::set_max_level(level);
    }
}

/// Map the `verbose` option onto a level filter.
#[must_use]
pub fn level_for_verbosity(verbose: i32) -> log::LevelFilter {
    match verbose {
        i32::MIN..=-1 => log::LevelFilter::Error,
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_mapping() {
        assert_eq!(level_for_verbosity(-1), log::LevelFilter::Error);
        assert_eq!(level_for_verbosity(0), log::LevelFilter::Info);
        assert_eq!(level_for_verbosity(1), log::LevelFilter::Debug);
        assert_eq!(level_for_verbosity(5), log::LevelFilter::Trace);
    }

    #[test]
    fn test_init_twice_is_safe() {
        init_logger(vec![Arc::new(ConsoleOutput)], log::LevelFilter::Info);
        init_logger(vec![Arc::new(ConsoleOutput)], log::LevelFilter::Debug);
        log::info!("still works");
    }
}
