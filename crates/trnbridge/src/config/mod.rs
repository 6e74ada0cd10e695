// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bridge configuration.
//!
//! A populated [`Config`] record is the single source of runtime truth;
//! no component reads options or the environment on its own. Values come
//! from three layers with rising precedence: compiled defaults, a config
//! file, and the command line (see [`opts`]). String values pass through
//! mnemonic substitution exactly once before they land here.

pub mod mnemonic;
pub mod opts;
pub mod session;

use std::net::Ipv4Addr;
use std::path::PathBuf;

use crate::input::file::FileFormat;
use crate::ping::{GAIN_THRESHOLD_7K_DFL, GAIN_THRESHOLD_KMALL_DFL};

// ===== Output selector flag words =====

/// MB1-side output selectors (`mb-out`).
pub mod mb_out {
    /// Write MB1 records to the output file.
    pub const MB1_FILE: u32 = 0x01;
    /// Publish MB1 records over UDP.
    pub const MB1_SVR: u32 = 0x02;
    /// Tee MB1 records to the session binary log.
    pub const MB1_BIN: u32 = 0x10;
    /// Tee raw input records to a session binary log.
    pub const RAW_BIN: u32 = 0x20;
}

/// TRN-side output selectors (`trn-out`).
pub mod trn_out {
    /// Serve estimator request/reply clients over TCP.
    pub const TRN_SVR: u32 = 0x04;
    /// Publish TRN updates over UDP.
    pub const TRNU_SVR: u32 = 0x08;
    /// Tee updates to the CSV-style session log.
    pub const TRNU_ASC: u32 = 0x40;
    /// Pretty-print updates to stdout.
    pub const SOUT: u32 = 0x80;
    /// Pretty-print updates to stderr.
    pub const SERR: u32 = 0x100;
    /// Debug-level update dump.
    pub const DEBUG: u32 = 0x200;
}

/// Default MB1 publisher port.
pub const MB1_SVR_PORT_DFL: u16 = 27000;

/// Default TRN request server port.
pub const TRN_SVR_PORT_DFL: u16 = 28000;

/// Default TRN update publisher port.
pub const TRNU_SVR_PORT_DFL: u16 = 8000;

/// Median filter policy (`median-filter=tau/nx/ny`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MedianFilterOpt {
    pub enabled: bool,
    /// Rejection threshold tau, fraction of the window median.
    pub threshold: f64,
    /// Across-track neighborhood (beams).
    pub n_across: usize,
    /// Along-track neighborhood (pings).
    pub n_along: usize,
}

impl Default for MedianFilterOpt {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 0.5,
            n_across: 1,
            n_along: 1,
        }
    }
}

/// Resolved input selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSpec {
    /// TCP 7K center stream.
    Socket7k {
        host: String,
        port: u16,
        /// Frame buffer capacity; 0 selects the adapter default.
        capacity: usize,
    },
    /// KMALL UDP multicast.
    KmallMulticast {
        iface: Ipv4Addr,
        group: Ipv4Addr,
        port: u16,
    },
    /// Single recorded file.
    File { path: PathBuf, format: FileFormat },
    /// Datalist of recorded files.
    Datalist { path: PathBuf },
}

/// One rejected option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub option: String,
    pub message: String,
}

impl ConfigError {
    #[must_use]
    pub fn new(option: &str, message: impl Into<String>) -> Self {
        Self {
            option: option.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "option '{}': {}", self.option, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Fully-typed configuration record.
#[derive(Debug, Clone)]
pub struct Config {
    pub verbose: i32,
    /// Raw input definition; resolved by [`Config::input_spec`].
    pub input: String,
    /// MBIO-style numeric format id (88/89 = 7K, 261 = KMALL, -1 = datalist).
    pub format: i32,
    pub platform_file: Option<PathBuf>,
    pub platform_target_sensor: Option<i32>,
    pub log_directory: PathBuf,
    /// MB1 output file name (`output` option).
    pub output_file: Option<String>,
    /// Projection id; 0 delegates to `trn_utm`.
    pub projection: i32,
    /// Full swath width in degrees.
    pub swath_deg: f64,
    /// Target output sounding count K.
    pub soundings: usize,
    pub median: MedianFilterOpt,
    /// MB1 heartbeat credit count (0 disables credit accounting).
    pub mbhbn: u32,
    /// MB1 heartbeat window (s).
    pub mbhbt: f64,
    /// TRN server heartbeat window (s).
    pub trnhbt: f64,
    /// TRNU publisher heartbeat window (s).
    pub trnuhbt: f64,
    /// Inter-cycle delay (ms).
    pub delay_ms: u64,
    /// Statistics period (s); 0 disables.
    pub stat_period_sec: f64,
    pub stat_flags: u32,
    pub trn_en: bool,
    pub trn_utm: u32,
    pub trn_map: Option<String>,
    pub trn_cfg: Option<String>,
    pub trn_par: Option<String>,
    pub trn_mid: Option<String>,
    pub trn_mtype: i32,
    pub trn_ftype: i32,
    pub trn_ncov: f64,
    pub trn_nerr: f64,
    pub trn_ecov: f64,
    pub trn_eerr: f64,
    pub mb_out_flags: u32,
    pub mb1_svr: (String, u16),
    pub trn_out_flags: u32,
    pub trn_svr: (String, u16),
    pub trnu_svr: (String, u16),
    pub trn_decn: u32,
    pub trn_decs: f64,
    pub trn_nombgain: bool,
    /// Transmit-gain threshold for the active sonar family.
    pub gain_threshold_7k: f64,
    pub gain_threshold_kmall: f64,
    pub show_help: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbose: 0,
            input: "datalist.mb-1".to_string(),
            format: 88,
            platform_file: None,
            platform_target_sensor: None,
            log_directory: PathBuf::from("."),
            output_file: None,
            projection: 0,
            swath_deg: 90.0,
            soundings: 101,
            median: MedianFilterOpt::default(),
            mbhbn: 0,
            mbhbt: 15.0,
            trnhbt: 15.0,
            trnuhbt: 15.0,
            delay_ms: 0,
            stat_period_sec: 30.0,
            stat_flags: crate::stats::flags::ALL,
            trn_en: false,
            trn_utm: 10,
            trn_map: None,
            trn_cfg: None,
            trn_par: None,
            trn_mid: None,
            trn_mtype: 1,
            trn_ftype: 2,
            trn_ncov: 49.0,
            trn_nerr: 50.0,
            trn_ecov: 49.0,
            trn_eerr: 50.0,
            mb_out_flags: mb_out::MB1_SVR,
            mb1_svr: ("localhost".to_string(), MB1_SVR_PORT_DFL),
            trn_out_flags: trn_out::TRNU_SVR,
            trn_svr: ("localhost".to_string(), TRN_SVR_PORT_DFL),
            trnu_svr: ("localhost".to_string(), TRNU_SVR_PORT_DFL),
            trn_decn: 0,
            trn_decs: 0.0,
            trn_nombgain: false,
            gain_threshold_7k: GAIN_THRESHOLD_7K_DFL,
            gain_threshold_kmall: GAIN_THRESHOLD_KMALL_DFL,
            show_help: false,
        }
    }
}

impl Config {
    /// Resolve the raw `input`/`format` pair into an input selection.
    pub fn input_spec(&self) -> Result<InputSpec, ConfigError> {
        if let Some(def) = self.input.strip_prefix("socket:") {
            let parts: Vec<&str> = def.split(':').collect();
            return match self.format {
                88 | 89 => {
                    let host = parts
                        .first()
                        .filter(|s| !s.is_empty())
                        .unwrap_or(&"localhost")
                        .to_string();
                    let port: u16 = match parts.get(1) {
                        Some(p) => p
                            .parse()
                            .map_err(|_| ConfigError::new("input", format!("bad port '{p}'")))?,
                        None => crate::input::reson7k::DEFAULT_PORT,
                    };
                    let capacity: usize = match parts.get(2) {
                        Some(c) => c
                            .parse()
                            .map_err(|_| ConfigError::new("input", format!("bad capacity '{c}'")))?,
                        None => 0,
                    };
                    Ok(InputSpec::Socket7k { host, port, capacity })
                }
                261 => {
                    if parts.len() != 3 {
                        return Err(ConfigError::new(
                            "input",
                            "kmall socket definition is interface:group:port",
                        ));
                    }
                    let iface: Ipv4Addr = parts[0]
                        .parse()
                        .map_err(|_| ConfigError::new("input", format!("bad interface '{}'", parts[0])))?;
                    let group: Ipv4Addr = parts[1]
                        .parse()
                        .map_err(|_| ConfigError::new("input", format!("bad group '{}'", parts[1])))?;
                    if !group.is_multicast() {
                        return Err(ConfigError::new("input", format!("'{group}' is not multicast")));
                    }
                    let port: u16 = parts[2]
                        .parse()
                        .map_err(|_| ConfigError::new("input", format!("bad port '{}'", parts[2])))?;
                    Ok(InputSpec::KmallMulticast { iface, group, port })
                }
                other => Err(ConfigError::new(
                    "format",
                    format!("format {other} has no socket input"),
                )),
            };
        }

        let path = PathBuf::from(&self.input);
        if self.format < 0 {
            return Ok(InputSpec::Datalist { path });
        }
        match FileFormat::from_format_id(self.format) {
            Some(format) => Ok(InputSpec::File { path, format }),
            None => Err(ConfigError::new(
                "format",
                format!("unsupported format id {}", self.format),
            )),
        }
    }

    /// Along-track window depth implied by the median filter options.
    #[must_use]
    pub fn ring_depth(&self) -> usize {
        if self.median.enabled {
            self.median.n_along.max(1)
        } else {
            1
        }
    }

    /// Effective UTM zone.
    #[must_use]
    pub fn utm_zone(&self) -> u32 {
        if self.projection > 0 {
            self.projection as u32
        } else {
            self.trn_utm
        }
    }

    /// Check cross-field constraints; every violation is reported.
    #[must_use]
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if let Err(e) = self.input_spec() {
            errors.push(e);
        }
        if !(self.swath_deg > 0.0 && self.swath_deg <= 180.0) {
            errors.push(ConfigError::new(
                "swath-width",
                format!("{} outside (0, 180]", self.swath_deg),
            ));
        }
        if self.soundings == 0 || self.soundings > crate::ping::MAX_BEAMS {
            errors.push(ConfigError::new(
                "soundings",
                format!("{} outside [1, {}]", self.soundings, crate::ping::MAX_BEAMS),
            ));
        }
        if self.median.enabled {
            if !(self.median.threshold > 0.0 && self.median.threshold <= 1.0) {
                errors.push(ConfigError::new(
                    "median-filter",
                    format!("threshold {} outside (0, 1]", self.median.threshold),
                ));
            }
            if self.median.n_across == 0 || self.median.n_along == 0 {
                errors.push(ConfigError::new("median-filter", "window sides must be >= 1"));
            }
        }
        for (name, v) in [
            ("trn-ncov", self.trn_ncov),
            ("trn-ecov", self.trn_ecov),
            ("trn-nerr", self.trn_nerr),
            ("trn-eerr", self.trn_eerr),
        ] {
            if v <= 0.0 {
                errors.push(ConfigError::new(name, "limit must be positive"));
            }
        }
        if self.trn_en && self.trn_decn > 0 && self.trn_decs > 0.0 {
            errors.push(ConfigError::new(
                "trn-decs",
                "count and time decimation are mutually exclusive",
            ));
        }
        for (name, v) in [("mbhbt", self.mbhbt), ("trnhbt", self.trnhbt), ("trnuhbt", self.trnuhbt)] {
            if v < 0.0 {
                errors.push(ConfigError::new(name, "heartbeat window cannot be negative"));
            }
        }
        errors
    }
}
