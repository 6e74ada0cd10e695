// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # trnbridge - Multibeam Preprocessing and TRN Bridge
//!
//! Real-time bridge between a live multibeam sonar and a terrain-relative
//! navigation (TRN) estimator. Raw vendor datagrams come in over TCP (7K
//! frame stream), UDP multicast (KMALL), or recorded files; conditioned
//! per-ping sounding records ("MB1") go out to UDP subscribers and a
//! binary log; an embedded estimator turns them into position/covariance
//! updates published to TRN clients.
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                        Pipeline Controller                         |
//! |        one cooperative loop, explicit Context, no globals          |
//! +--------------------------------------------------------------------+
//! |  Frame Sources   |  Conditioning       |  Fan-out                  |
//! |  reson7k (TCP)   |  PingExtractor      |  MB1 publisher (UDP)      |
//! |  kmall (mcast)   |  PingRing           |  MB1 binary log           |
//! |  file/datalist   |  Sounding filter    |  TRN orchestrator         |
//! |                  |  MB1 codec          |   -> TRNU publisher (UDP) |
//! |                  |                     |   -> TRN reqres (TCP)     |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`pipeline::Pipeline`] | Assembled controller; one call to `run` drives everything |
//! | [`input::FrameSource`] | Capability trait every datagram source implements |
//! | [`ping::Ping`] | One normalized sonar cycle (pose + soundings + flags) |
//! | [`mb1::Mb1`] | The compact wire/file record this system emits |
//! | [`net::PubServer`] | Connection-table server (pub/sub and request/reply) |
//! | [`trn::TrnEstimator`] | Capability set of the opaque terrain filter |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::atomic::AtomicBool;
//! use trnbridge::config::opts;
//! use trnbridge::config::session::epoch_now;
//! use trnbridge::pipeline::{source_from_config, Pipeline};
//!
//! let args: Vec<String> = std::env::args().skip(1).collect();
//! let (cfg, errors) = opts::load(&args, epoch_now() as u64);
//! assert!(errors.is_empty());
//!
//! let mut source = source_from_config(&cfg).expect("input");
//! let mut pipeline = Pipeline::new(cfg).expect("pipeline");
//! let shutdown = AtomicBool::new(false);
//! pipeline.run(source.as_mut(), &shutdown).expect("run");
//! ```

pub mod config;
pub mod err;
pub mod filter;
pub mod input;
pub mod logging;
pub mod mb1;
pub mod mlog;
pub mod net;
pub mod ping;
pub mod pipeline;
pub mod record;
pub mod ring;
pub mod stats;
pub mod trn;
pub mod trnu;

pub use err::Error;
