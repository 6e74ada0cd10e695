// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! trnbridged: the bridge daemon.
//!
//! Thin wrapper over the `trnbridge` crate: parse options, install the
//! log sinks and signal handlers, assemble the pipeline, run it.

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use trnbridge::config::opts;
use trnbridge::config::session::{epoch_now, session_string};
use trnbridge::logging::{init_logger, level_for_verbosity, ConsoleOutput, FileOutput, Output};
use trnbridge::pipeline::{source_from_config, Pipeline};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_sig: libc::c_int) {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

fn install_signal_handlers() {
    let handler = on_signal as extern "C" fn(libc::c_int);
    // SAFETY: on_signal is async-signal-safe (single atomic store).
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let session_epoch = epoch_now() as u64;
    let (cfg, errors) = opts::load(&args, session_epoch);

    if cfg.show_help {
        print!("{}", opts::help_text());
        return ExitCode::SUCCESS;
    }
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("trnbridged: {e}");
        }
        return ExitCode::FAILURE;
    }

    let mut outputs: Vec<Arc<dyn Output>> = vec![Arc::new(ConsoleOutput)];
    let msg_log = cfg
        .log_directory
        .join(format!("trnbridge-{}.log", session_string(session_epoch)));
    match FileOutput::open(&msg_log) {
        Ok(file) => outputs.push(Arc::new(file)),
        Err(e) => {
            eprintln!("trnbridged: cannot open message log {}: {e}", msg_log.display());
            return ExitCode::FAILURE;
        }
    }
    init_logger(outputs, level_for_verbosity(cfg.verbose));

    install_signal_handlers();

    let mut source = match source_from_config(&cfg) {
        Ok(s) => s,
        Err(e) => {
            log::error!("trnbridged: {e}");
            return ExitCode::FAILURE;
        }
    };
    let mut pipeline = match Pipeline::new(cfg) {
        Ok(p) => p,
        Err(e) => {
            log::error!("trnbridged: {e}");
            return ExitCode::FAILURE;
        }
    };

    log::info!("trnbridged started (session {})", session_string(session_epoch));
    match pipeline.run(source.as_mut(), &SHUTDOWN) {
        Ok(()) => {
            pipeline.stats.emit(trnbridge::stats::flags::ALL);
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("trnbridged: {e}");
            ExitCode::FAILURE
        }
    }
}
