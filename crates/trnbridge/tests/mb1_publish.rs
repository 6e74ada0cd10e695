// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end publish path: recorded 7K file in, MB1 datagrams out.

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use trnbridge::config::{mb_out, Config};
use trnbridge::mb1::Mb1;
use trnbridge::pipeline::{source_from_config, Pipeline};
use trnbridge::record::s7k::{
    build_frame, build_raw_detection, build_sonar_settings, Detection, RECORD_RAW_DETECTION,
    RECORD_SONAR_SETTINGS,
};

fn write_survey_file(path: &std::path::Path, pings: u32) {
    let mut bytes = Vec::new();
    for p in 1..=pings {
        let ts = 1000.0 + f64::from(p);
        let settings = build_sonar_settings(p, 210.0, 0.001, 30.0);
        bytes.extend_from_slice(&build_frame(RECORD_SONAR_SETTINGS, 7125, p, ts, &settings));

        let dets: Vec<Detection> = (0..8)
            .map(|j| Detection {
                valid: true,
                sonar_flagged: false,
                depth_m: 60.0,
                across_m: j as f32 - 3.5,
                along_m: 0.2,
                quality: 0.8,
            })
            .collect();
        let rec = build_raw_detection(p, 36.6, -121.9, 90.0, 4.0, &dets);
        bytes.extend_from_slice(&build_frame(RECORD_RAW_DETECTION, 7125, p, ts, &rec));
    }
    std::fs::write(path, bytes).expect("write survey file");
}

#[test]
fn subscriber_receives_decodable_mb1() {
    let dir = tempfile::tempdir().expect("tempdir");
    let survey = dir.path().join("survey.s7k");
    write_survey_file(&survey, 120);

    let cfg = Config {
        input: survey.display().to_string(),
        format: 88,
        log_directory: dir.path().to_path_buf(),
        mb_out_flags: mb_out::MB1_SVR,
        trn_out_flags: 0,
        mb1_svr: ("127.0.0.1".to_string(), 0),
        delay_ms: 5,
        stat_period_sec: 0.0,
        ..Config::default()
    };

    let mut source = source_from_config(&cfg).expect("source");
    let mut pipeline = Pipeline::new(cfg).expect("pipeline");
    let server_addr = pipeline.mb1_server_addr().expect("server addr");

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_worker = Arc::clone(&shutdown);
    let worker = std::thread::spawn(move || {
        pipeline.run(source.as_mut(), &shutdown_worker).expect("run");
        pipeline.stats.mb_pub_n
    });

    let client = UdpSocket::bind("127.0.0.1:0").expect("bind");
    client
        .set_read_timeout(Some(Duration::from_secs(2)))
        .expect("timeout");
    client.send_to(b"SUB\0", server_addr).expect("subscribe");

    // hunt for the first decodable record; the ACK arrives first
    let mut buf = vec![0u8; 64 * 1024];
    let mut decoded = None;
    for _ in 0..64 {
        let Ok((n, _)) = client.recv_from(&mut buf) else { break };
        if &buf[..n.min(4)] == b"ACK\0" {
            continue;
        }
        if let Ok(rec) = Mb1::decode(&buf[..n]) {
            decoded = Some((n, rec));
            break;
        }
    }

    shutdown.store(true, Ordering::Relaxed);
    let published = worker.join().expect("join");

    let (n, rec) = decoded.expect("received a decodable MB1 record");
    assert_eq!(n, rec.encoded_size());
    assert!(rec.ping_number >= 1);
    assert_eq!(rec.soundings.len(), 8);
    assert!((rec.lat.to_degrees() - 36.6).abs() < 1e-6);
    assert!(published >= 1);
}
