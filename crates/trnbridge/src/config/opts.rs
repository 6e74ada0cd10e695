// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed option table and layered loading.
//!
//! One table maps every recognized option name to its parser; the same
//! table serves the config file (`key=value` lines, `#` comments) and the
//! command line (`--key=value`, `--key value`, bare `--flag`). Precedence:
//! compiled defaults, then config file, then command line. Values pass
//! through mnemonic substitution before parsing.

use std::path::{Path, PathBuf};

use crate::config::mnemonic::substitute;
use crate::config::{mb_out, trn_out, Config, ConfigError, MedianFilterOpt};

/// One recognized option.
pub struct OptionSpec {
    pub name: &'static str,
    /// True when the option consumes a value; bare flags default to "y".
    pub takes_value: bool,
    pub help: &'static str,
    apply: fn(&mut Config, &str) -> Result<(), String>,
}

/// The complete option surface.
pub const OPTIONS: &[OptionSpec] = &[
    OptionSpec { name: "verbose", takes_value: true, help: "debug output level (-1..5)", apply: |c, v| { c.verbose = int(v)? as i32; Ok(()) } },
    OptionSpec { name: "input", takes_value: true, help: "socket:<def> or file/datalist path", apply: |c, v| { c.input = v.to_string(); Ok(()) } },
    OptionSpec { name: "format", takes_value: true, help: "MBIO format id (88/89 7K, 261 KMALL, -1 datalist)", apply: |c, v| { c.format = int(v)? as i32; Ok(()) } },
    OptionSpec { name: "platform-file", takes_value: true, help: "platform definition file", apply: |c, v| { c.platform_file = Some(PathBuf::from(v)); Ok(()) } },
    OptionSpec { name: "platform-target-sensor", takes_value: true, help: "platform sensor index", apply: |c, v| { c.platform_target_sensor = Some(int(v)? as i32); Ok(()) } },
    OptionSpec { name: "log-directory", takes_value: true, help: "session log directory", apply: |c, v| { c.log_directory = PathBuf::from(v); Ok(()) } },
    OptionSpec { name: "output", takes_value: true, help: "MB1 output file name", apply: |c, v| { c.output_file = Some(v.to_string()); c.mb_out_flags |= mb_out::MB1_FILE; Ok(()) } },
    OptionSpec { name: "projection", takes_value: true, help: "projection id (0: use trn-utm)", apply: |c, v| { c.projection = int(v)? as i32; Ok(()) } },
    OptionSpec { name: "swath-width", takes_value: true, help: "full swath width (deg)", apply: |c, v| { c.swath_deg = float(v)?; Ok(()) } },
    OptionSpec { name: "soundings", takes_value: true, help: "target output sounding count", apply: |c, v| { c.soundings = uint(v)? as usize; Ok(()) } },
    OptionSpec { name: "median-filter", takes_value: true, help: "median filter tau/nx/ny", apply: |c, v| { c.median = median(v)?; Ok(()) } },
    OptionSpec { name: "mbhbn", takes_value: true, help: "MB1 heartbeat credits", apply: |c, v| { c.mbhbn = uint(v)? as u32; Ok(()) } },
    OptionSpec { name: "mbhbt", takes_value: true, help: "MB1 heartbeat window (s)", apply: |c, v| { c.mbhbt = float(v)?; Ok(()) } },
    OptionSpec { name: "trnhbt", takes_value: true, help: "TRN server heartbeat window (s)", apply: |c, v| { c.trnhbt = float(v)?; Ok(()) } },
    OptionSpec { name: "trnuhbt", takes_value: true, help: "TRNU publisher heartbeat window (s)", apply: |c, v| { c.trnuhbt = float(v)?; Ok(()) } },
    OptionSpec { name: "delay", takes_value: true, help: "inter-cycle delay (ms)", apply: |c, v| { c.delay_ms = uint(v)?; Ok(()) } },
    OptionSpec { name: "statsec", takes_value: true, help: "statistics period (s)", apply: |c, v| { c.stat_period_sec = float(v)?; Ok(()) } },
    OptionSpec { name: "statflags", takes_value: true, help: "statistics section mask", apply: |c, v| { c.stat_flags = mask(v)?; Ok(()) } },
    OptionSpec { name: "trn-en", takes_value: true, help: "enable the TRN bridge", apply: |c, v| { c.trn_en = boolean(v)?; Ok(()) } },
    OptionSpec { name: "trn-utm", takes_value: true, help: "UTM zone for estimator frames", apply: |c, v| { c.trn_utm = uint(v)? as u32; Ok(()) } },
    OptionSpec { name: "trn-map", takes_value: true, help: "terrain map file/directory", apply: |c, v| { c.trn_map = Some(v.to_string()); Ok(()) } },
    OptionSpec { name: "trn-cfg", takes_value: true, help: "estimator config file", apply: |c, v| { c.trn_cfg = Some(v.to_string()); Ok(()) } },
    OptionSpec { name: "trn-par", takes_value: true, help: "estimator particle file", apply: |c, v| { c.trn_par = Some(v.to_string()); Ok(()) } },
    OptionSpec { name: "trn-mid", takes_value: true, help: "estimator mission id", apply: |c, v| { c.trn_mid = Some(v.to_string()); Ok(()) } },
    OptionSpec { name: "trn-mtype", takes_value: true, help: "estimator map type", apply: |c, v| { c.trn_mtype = int(v)? as i32; Ok(()) } },
    OptionSpec { name: "trn-ftype", takes_value: true, help: "estimator filter type", apply: |c, v| { c.trn_ftype = int(v)? as i32; Ok(()) } },
    OptionSpec { name: "trn-ncov", takes_value: true, help: "max northing covariance", apply: |c, v| { c.trn_ncov = float(v)?; Ok(()) } },
    OptionSpec { name: "trn-nerr", takes_value: true, help: "max northing error", apply: |c, v| { c.trn_nerr = float(v)?; Ok(()) } },
    OptionSpec { name: "trn-ecov", takes_value: true, help: "max easting covariance", apply: |c, v| { c.trn_ecov = float(v)?; Ok(()) } },
    OptionSpec { name: "trn-eerr", takes_value: true, help: "max easting error", apply: |c, v| { c.trn_eerr = float(v)?; Ok(()) } },
    OptionSpec { name: "mb-out", takes_value: true, help: "MB1 output selectors (csv)", apply: apply_mb_out },
    OptionSpec { name: "trn-out", takes_value: true, help: "TRN output selectors (csv)", apply: apply_trn_out },
    OptionSpec { name: "trn-decn", takes_value: true, help: "process every n-th cycle", apply: |c, v| { c.trn_decn = uint(v)? as u32; Ok(()) } },
    OptionSpec { name: "trn-decs", takes_value: true, help: "process at most every n seconds", apply: |c, v| { c.trn_decs = float(v)?; Ok(()) } },
    OptionSpec { name: "trn-nombgain", takes_value: false, help: "ignore transmit gain for TRN", apply: |c, v| { c.trn_nombgain = boolean(v)?; Ok(()) } },
    OptionSpec { name: "help", takes_value: false, help: "print usage and exit", apply: |c, _| { c.show_help = true; Ok(()) } },
    // `config` is resolved by the loader before table application
    OptionSpec { name: "config", takes_value: true, help: "read options from file", apply: |_, _| Ok(()) },
];

// ===== value parsers =====

fn int(v: &str) -> Result<i64, String> {
    v.trim().parse().map_err(|_| format!("'{v}' is not an integer"))
}

fn uint(v: &str) -> Result<u64, String> {
    v.trim().parse().map_err(|_| format!("'{v}' is not a non-negative integer"))
}

fn float(v: &str) -> Result<f64, String> {
    v.trim().parse().map_err(|_| format!("'{v}' is not a number"))
}

fn boolean(v: &str) -> Result<bool, String> {
    match v.trim().to_ascii_lowercase().as_str() {
        "" | "y" | "yes" | "true" | "1" => Ok(true),
        "n" | "no" | "false" | "0" => Ok(false),
        other => Err(format!("'{other}' is not a boolean")),
    }
}

/// Flag masks accept decimal or 0x-prefixed hex.
fn mask(v: &str) -> Result<u32, String> {
    let v = v.trim();
    if let Some(hex) = v.strip_prefix("0x").or_else(|| v.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|_| format!("'{v}' is not a flag mask"))
    } else {
        v.parse().map_err(|_| format!("'{v}' is not a flag mask"))
    }
}

/// `tau/nx/ny`, e.g. `0.10/3/3`.
fn median(v: &str) -> Result<MedianFilterOpt, String> {
    let parts: Vec<&str> = v.split('/').collect();
    if parts.len() != 3 {
        return Err(format!("'{v}' is not tau/nx/ny"));
    }
    Ok(MedianFilterOpt {
        enabled: true,
        threshold: float(parts[0])?,
        n_across: uint(parts[1])? as usize,
        n_along: uint(parts[2])? as usize,
    })
}

/// `host[:port]` with a fallback port.
fn endpoint(v: &str, default_port: u16) -> Result<(String, u16), String> {
    let mut it = v.splitn(2, ':');
    let host = it.next().unwrap_or_default();
    let host = if host.is_empty() { "localhost" } else { host };
    let port = match it.next() {
        Some(p) => p.parse().map_err(|_| format!("'{p}' is not a port"))?,
        None => default_port,
    };
    Ok((host.to_string(), port))
}

fn apply_mb_out(c: &mut Config, v: &str) -> Result<(), String> {
    for token in v.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if let Some(rest) = token.strip_prefix("mb1svr") {
            c.mb_out_flags |= mb_out::MB1_SVR;
            if let Some(addr) = rest.strip_prefix(':') {
                c.mb1_svr = endpoint(addr, c.mb1_svr.1)?;
            }
        } else if token == "nomb1svr" {
            c.mb_out_flags &= !mb_out::MB1_SVR;
        } else if token == "mb1" {
            c.mb_out_flags |= mb_out::MB1_BIN;
        } else if token == "nomb1" {
            c.mb_out_flags &= !mb_out::MB1_BIN;
        } else if let Some(rest) = token.strip_prefix("file") {
            c.mb_out_flags |= mb_out::MB1_FILE;
            if let Some(name) = rest.strip_prefix(':') {
                c.output_file = Some(name.to_string());
            }
        } else if token == "nofile" {
            c.mb_out_flags &= !mb_out::MB1_FILE;
        } else if token == "raw" {
            c.mb_out_flags |= mb_out::RAW_BIN;
        } else if token == "noraw" {
            c.mb_out_flags &= !mb_out::RAW_BIN;
        } else {
            return Err(format!("unknown mb-out token '{token}'"));
        }
    }
    Ok(())
}

fn apply_trn_out(c: &mut Config, v: &str) -> Result<(), String> {
    for token in v.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if let Some(rest) = token.strip_prefix("trnsvr") {
            c.trn_out_flags |= trn_out::TRN_SVR;
            if let Some(addr) = rest.strip_prefix(':') {
                c.trn_svr = endpoint(addr, c.trn_svr.1)?;
            }
        } else if token == "notrnsvr" {
            c.trn_out_flags &= !trn_out::TRN_SVR;
        } else if let Some(rest) = token.strip_prefix("trnusvr") {
            c.trn_out_flags |= trn_out::TRNU_SVR;
            if let Some(addr) = rest.strip_prefix(':') {
                c.trnu_svr = endpoint(addr, c.trnu_svr.1)?;
            }
        } else if token == "notrnusvr" {
            c.trn_out_flags &= !trn_out::TRNU_SVR;
        } else if token == "trnu" {
            c.trn_out_flags |= trn_out::TRNU_ASC;
        } else if token == "sout" {
            c.trn_out_flags |= trn_out::SOUT;
        } else if token == "serr" {
            c.trn_out_flags |= trn_out::SERR;
        } else if token == "debug" {
            c.trn_out_flags |= trn_out::DEBUG;
        } else {
            return Err(format!("unknown trn-out token '{token}'"));
        }
    }
    Ok(())
}

// ===== layered loading =====

/// Apply one `key`/`value` pair through the table.
pub fn apply_option(cfg: &mut Config, key: &str, value: &str, session_epoch: u64) -> Result<(), ConfigError> {
    let spec = OPTIONS
        .iter()
        .find(|o| o.name == key)
        .ok_or_else(|| ConfigError::new(key, "unrecognized option"))?;
    let value = substitute(value, session_epoch);
    (spec.apply)(cfg, &value).map_err(|msg| ConfigError::new(key, msg))
}

/// Apply a config file (`key=value` lines).
pub fn apply_file(cfg: &mut Config, path: &Path, session_epoch: u64, errors: &mut Vec<ConfigError>) {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            errors.push(ConfigError::new("config", format!("cannot read {}: {e}", path.display())));
            return;
        }
    };
    for (lineno, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }
        let (key, value) = match line.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (line, ""),
        };
        if let Err(mut e) = apply_option(cfg, key, value, session_epoch) {
            e.message = format!("{} (line {})", e.message, lineno + 1);
            errors.push(e);
        }
    }
}

/// Load from the command line, honoring `--config=<file>` first.
///
/// Returns the populated record and every error encountered; the caller
/// reports all of them and exits non-zero if any are present.
pub fn load(args: &[String], session_epoch: u64) -> (Config, Vec<ConfigError>) {
    let mut cfg = Config::default();
    let mut errors = Vec::new();

    let pairs = split_args(args, &mut errors);

    // config file layer first (lower precedence than the rest of the CLI)
    for (key, value) in &pairs {
        if key == "config" {
            apply_file(&mut cfg, Path::new(value), session_epoch, &mut errors);
        }
    }

    for (key, value) in &pairs {
        if key == "config" {
            continue;
        }
        if let Err(e) = apply_option(&mut cfg, key, value, session_epoch) {
            errors.push(e);
        }
    }

    errors.extend(cfg.validate());
    (cfg, errors)
}

/// Split `--key=value` / `--key value` / `--flag` argument forms.
fn split_args(args: &[String], errors: &mut Vec<ConfigError>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        let Some(body) = arg.strip_prefix("--") else {
            errors.push(ConfigError::new(arg, "expected --option[=value]"));
            i += 1;
            continue;
        };
        if let Some((key, value)) = body.split_once('=') {
            pairs.push((key.to_string(), value.to_string()));
        } else {
            let takes_value = OPTIONS.iter().find(|o| o.name == body).map(|o| o.takes_value);
            match takes_value {
                Some(true) if i + 1 < args.len() && !args[i + 1].starts_with("--") => {
                    pairs.push((body.to_string(), args[i + 1].clone()));
                    i += 1;
                }
                _ => pairs.push((body.to_string(), String::new())),
            }
        }
        i += 1;
    }
    pairs
}

/// Usage text assembled from the table.
#[must_use]
pub fn help_text() -> String {
    let mut out = String::from("trnbridged - multibeam preprocessing and TRN bridge\n\nOptions:\n");
    for o in OPTIONS {
        out.push_str(&format!("  --{:<24} {}\n", o.name, o.help));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{mb_out, trn_out};

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cli_basics() {
        let (cfg, errors) = load(
            &args(&[
                "--verbose=1",
                "--input=socket:sonar:7000",
                "--format=88",
                "--swath-width=120",
                "--soundings=25",
                "--median-filter=0.10/3/5",
            ]),
            0,
        );
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(cfg.verbose, 1);
        assert_eq!(cfg.swath_deg, 120.0);
        assert_eq!(cfg.soundings, 25);
        assert!(cfg.median.enabled);
        assert_eq!(cfg.median.n_across, 3);
        assert_eq!(cfg.median.n_along, 5);
        assert_eq!(cfg.ring_depth(), 5);
    }

    #[test]
    fn test_space_separated_value() {
        let (cfg, errors) = load(&args(&["--soundings", "33"]), 0);
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(cfg.soundings, 33);
    }

    #[test]
    fn test_bare_flags() {
        let (cfg, errors) = load(&args(&["--trn-nombgain", "--help"]), 0);
        assert!(errors.is_empty(), "{errors:?}");
        assert!(cfg.trn_nombgain);
        assert!(cfg.show_help);
    }

    #[test]
    fn test_mb_out_tokens() {
        let (cfg, errors) = load(&args(&["--mb-out=mb1svr:10.0.0.2:27500,mb1,noraw"]), 0);
        assert!(errors.is_empty(), "{errors:?}");
        assert!(cfg.mb_out_flags & mb_out::MB1_SVR != 0);
        assert!(cfg.mb_out_flags & mb_out::MB1_BIN != 0);
        assert_eq!(cfg.mb1_svr, ("10.0.0.2".to_string(), 27500));
    }

    #[test]
    fn test_trn_out_tokens() {
        let (cfg, errors) = load(
            &args(&["--trn-out=trnsvr:0.0.0.0:28000,trnusvr:0.0.0.0:8000,trnu,serr"]),
            0,
        );
        assert!(errors.is_empty(), "{errors:?}");
        assert!(cfg.trn_out_flags & trn_out::TRN_SVR != 0);
        assert!(cfg.trn_out_flags & trn_out::TRNU_SVR != 0);
        assert!(cfg.trn_out_flags & trn_out::TRNU_ASC != 0);
        assert!(cfg.trn_out_flags & trn_out::SERR != 0);
    }

    #[test]
    fn test_unknown_option_reported() {
        let (_, errors) = load(&args(&["--no-such-option=1"]), 0);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].option, "no-such-option");
    }

    #[test]
    fn test_unknown_selector_token_reported() {
        let (_, errors) = load(&args(&["--mb-out=wat"]), 0);
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_config_file_then_cli_precedence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("trnbridge.cfg");
        std::fs::write(&path, "# session config\nswath-width=100\nsoundings=50\n").expect("write");

        let (cfg, errors) = load(
            &args(&[
                &format!("--config={}", path.display()),
                "--soundings=60",
            ]),
            0,
        );
        assert!(errors.is_empty(), "{errors:?}");
        // file set both; CLI overrode one
        assert_eq!(cfg.swath_deg, 100.0);
        assert_eq!(cfg.soundings, 60);
    }

    #[test]
    fn test_mnemonic_substitution_in_values() {
        let (cfg, errors) = load(&args(&["--output=mb1-SESSION.mb1"]), 0);
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(cfg.output_file.as_deref(), Some("mb1-19700101-000000.mb1"));
    }

    #[test]
    fn test_collects_multiple_errors() {
        let (_, errors) = load(
            &args(&["--swath-width=oops", "--soundings=0", "--mystery"]),
            0,
        );
        assert!(errors.len() >= 3, "{errors:?}");
    }

    #[test]
    fn test_help_text_lists_every_option() {
        let text = help_text();
        for o in OPTIONS {
            assert!(text.contains(o.name));
        }
    }
}
