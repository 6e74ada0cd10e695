// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! trnbridge-echo: subscribe to a running bridge and print its records.
//!
//! Usage:
//!   trnbridge-echo mb1  <host:port>     decode MB1 sounding records
//!   trnbridge-echo trnu <host:port>     decode TRN update records

use std::net::UdpSocket;
use std::time::{Duration, Instant};

use trnbridge::mb1::Mb1;
use trnbridge::trnu::TrnUpdate;

const HEARTBEAT_PERIOD: Duration = Duration::from_secs(5);

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 || !matches!(args[1].as_str(), "mb1" | "trnu") {
        eprintln!("usage: trnbridge-echo <mb1|trnu> <host:port>");
        std::process::exit(2);
    }
    let mode = args[1].as_str();
    let server = args[2].as_str();

    let socket = match UdpSocket::bind("0.0.0.0:0") {
        Ok(s) => s,
        Err(e) => {
            eprintln!("[FAIL] bind: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = socket.set_read_timeout(Some(Duration::from_secs(1))) {
        eprintln!("[FAIL] socket timeout: {e}");
        std::process::exit(1);
    }

    println!("trnbridge-echo: subscribing to {mode} records at {server}...");
    if let Err(e) = socket.send_to(b"SUB\0", server) {
        eprintln!("[FAIL] subscribe: {e}");
        std::process::exit(1);
    }

    let mut buf = vec![0u8; 64 * 1024];
    let mut last_heartbeat = Instant::now();
    let mut records: u64 = 0;

    loop {
        if last_heartbeat.elapsed() >= HEARTBEAT_PERIOD {
            let _ = socket.send_to(b"PNG\0", server);
            last_heartbeat = Instant::now();
        }

        let n = match socket.recv_from(&mut buf) {
            Ok((n, _)) => n,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => {
                eprintln!("[FAIL] recv: {e}");
                std::process::exit(1);
            }
        };

        let datagram = &buf[..n];
        if datagram == b"ACK\0" {
            println!("[OK] subscribed");
            continue;
        }
        if datagram == b"NAK\0" {
            continue;
        }

        records += 1;
        match mode {
            "mb1" => match Mb1::decode(datagram) {
                Ok(rec) => {
                    println!(
                        "#{records} ping {} ts {:.3} lat {:.6} lon {:.6} hdg {:.3} depth {:.2} soundings {}",
                        rec.ping_number,
                        rec.ts,
                        rec.lat.to_degrees(),
                        rec.lon.to_degrees(),
                        rec.hdg,
                        rec.depth,
                        rec.soundings.len()
                    );
                }
                Err(e) => eprintln!("#{records} MB1 decode error: {e} ({n} bytes)"),
            },
            _ => match TrnUpdate::decode(datagram) {
                Ok(update) => println!("#{records} TRN update:\n{update}"),
                Err(e) => eprintln!("#{records} TRNU decode error: {e} ({n} bytes)"),
            },
        }
    }
}
