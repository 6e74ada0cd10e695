// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection-table server for publish and request/reply traffic.
//!
//! Single-threaded: the pipeline controller calls [`PubServer::poll`] once
//! per cycle to admit peers, service control and application requests, and
//! sweep expired entries, then [`PubServer::publish`] to broadcast a
//! record. Publishing performs one non-blocking send per live peer and
//! never waits on a slow consumer; failures are counted against the peer
//! and surface only through heartbeat expiry.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::time::{Duration, Instant};

use crate::net::peer::{Peer, PeerState};
use crate::net::{CTRL_HEARTBEAT, CTRL_SUBSCRIBE, CTRL_UNSUBSCRIBE, REPLY_ACK, REPLY_NACK};

/// Server transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
}

/// Server interaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Request/reply control plane; requests go to the handler.
    ReqRes,
    /// Broadcast records to subscribed peers.
    PubSub,
}

/// Static configuration of one server instance.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Instance tag used in log lines ("mb1", "trn", "trnu").
    pub name: String,
    /// Bind address.
    pub bind: SocketAddr,
    pub transport: Transport,
    pub mode: Mode,
    /// Heartbeat window H; silence past this evicts the peer.
    pub hb_period: Duration,
    /// Credits granted per subscribe/keepalive; 0 disables credit
    /// accounting and leaves only the time-based eviction.
    pub hb_credits: u32,
}

impl ServerConfig {
    /// UDP pub/sub instance.
    #[must_use]
    pub fn pubsub_udp(name: &str, bind: SocketAddr, hb_period: Duration, hb_credits: u32) -> Self {
        Self {
            name: name.to_string(),
            bind,
            transport: Transport::Udp,
            mode: Mode::PubSub,
            hb_period,
            hb_credits,
        }
    }

    /// TCP request/reply instance.
    #[must_use]
    pub fn reqres_tcp(name: &str, bind: SocketAddr, hb_period: Duration) -> Self {
        Self {
            name: name.to_string(),
            bind,
            transport: Transport::Tcp,
            mode: Mode::ReqRes,
            hb_period,
            hb_credits: 0,
        }
    }
}

/// Application request servicing (the `on_read`/`on_handle` pair).
pub trait RequestHandler {
    /// Parse one request from `peer` and produce the reply to send back.
    /// None means the request was unrecognized (a NACK goes out).
    fn handle(&mut self, request: &[u8], peer: SocketAddr) -> Option<Vec<u8>>;
}

/// Handler for pure pub/sub instances with no application requests.
pub struct NoRequests;

impl RequestHandler for NoRequests {
    fn handle(&mut self, _request: &[u8], _peer: SocketAddr) -> Option<Vec<u8>> {
        None
    }
}

/// Running counters for one server instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerStats {
    /// Records handed to publish().
    pub published: u64,
    /// Per-peer datagrams/writes delivered.
    pub sent: u64,
    /// Per-peer send failures (counted, never fatal).
    pub send_failures: u64,
    /// Application requests serviced.
    pub requests: u64,
    /// Peers evicted by credit exhaustion or expiry.
    pub evicted: u64,
}

/// Connection-table server.
pub struct PubServer {
    cfg: ServerConfig,
    udp: Option<UdpSocket>,
    listener: Option<TcpListener>,
    streams: HashMap<SocketAddr, TcpStream>,
    peers: HashMap<SocketAddr, Peer>,
    last_sweep: Instant,
    recv_buf: Vec<u8>,
    pub stats: ServerStats,
}

const RECV_BUF_SIZE: usize = 4096;

/// Sweep cadence; bounded so short heartbeat windows still get serviced.
const SWEEP_INTERVAL: Duration = Duration::from_millis(250);

impl PubServer {
    /// Bind the configured transport (non-blocking) and start empty.
    pub fn open(cfg: ServerConfig) -> std::io::Result<Self> {
        let (udp, listener) = match cfg.transport {
            Transport::Udp => {
                let socket = UdpSocket::bind(cfg.bind)?;
                socket.set_nonblocking(true)?;
                log::info!("[PUB] {} listening on udp {}", cfg.name, socket.local_addr()?);
                (Some(socket), None)
            }
            Transport::Tcp => {
                let listener = TcpListener::bind(cfg.bind)?;
                listener.set_nonblocking(true)?;
                log::info!("[PUB] {} listening on tcp {}", cfg.name, listener.local_addr()?);
                (None, Some(listener))
            }
        };
        Ok(Self {
            cfg,
            udp,
            listener,
            streams: HashMap::new(),
            peers: HashMap::new(),
            last_sweep: Instant::now(),
            recv_buf: vec![0u8; RECV_BUF_SIZE],
            stats: ServerStats::default(),
        })
    }

    /// Bound local address (useful when binding port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        match (&self.udp, &self.listener) {
            (Some(s), _) => s.local_addr(),
            (_, Some(l)) => l.local_addr(),
            _ => Err(std::io::Error::new(std::io::ErrorKind::NotConnected, "no transport")),
        }
    }

    /// Live connection-table size.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Subscribed peer count.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.peers.values().filter(|p| p.is_subscribed()).count()
    }

    /// Service inbound traffic and sweep the connection table.
    pub fn poll(&mut self, handler: &mut dyn RequestHandler) {
        let now = Instant::now();
        match self.cfg.transport {
            Transport::Udp => self.poll_udp(handler, now),
            Transport::Tcp => self.poll_tcp(handler, now),
        }
        if now.duration_since(self.last_sweep) >= SWEEP_INTERVAL.min(self.cfg.hb_period) {
            self.sweep(now);
            self.last_sweep = now;
        }
    }

    /// Broadcast `bytes` to every subscribed peer.
    ///
    /// One non-blocking send per peer; a send that would block is skipped
    /// and counted, and each delivered record consumes a heartbeat credit.
    /// Returns the number of peers the record went out to.
    pub fn publish(&mut self, bytes: &[u8]) -> usize {
        self.stats.published += 1;
        let allowance = self.cfg.hb_credits;
        let mut delivered = 0;
        let mut spent: Vec<SocketAddr> = Vec::new();

        for peer in self.peers.values_mut() {
            if !peer.is_subscribed() {
                continue;
            }
            let ok = match self.cfg.transport {
                Transport::Udp => self
                    .udp
                    .as_ref()
                    .map(|s| s.send_to(bytes, peer.addr).is_ok())
                    .unwrap_or(false),
                Transport::Tcp => self
                    .streams
                    .get_mut(&peer.addr)
                    .map(|s| s.write_all(bytes).is_ok())
                    .unwrap_or(false),
            };
            if ok {
                peer.sent += 1;
                self.stats.sent += 1;
                delivered += 1;
            } else {
                peer.send_failures += 1;
                self.stats.send_failures += 1;
            }
            if !peer.spend_credit(allowance) {
                spent.push(peer.addr);
            }
        }

        for addr in spent {
            self.evict(addr, "credits exhausted");
        }
        delivered
    }

    // ===== inbound traffic =====

    fn poll_udp(&mut self, handler: &mut dyn RequestHandler, now: Instant) {
        loop {
            let socket = match &self.udp {
                Some(s) => s,
                None => return,
            };
            match socket.recv_from(&mut self.recv_buf) {
                Ok((n, from)) => {
                    let msg = self.recv_buf[..n].to_vec();
                    self.dispatch(&msg, from, handler, now);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    log::debug!("[PUB] {} recv error: {e}", self.cfg.name);
                    return;
                }
            }
        }
    }

    fn poll_tcp(&mut self, handler: &mut dyn RequestHandler, now: Instant) {
        // admit new connections
        if let Some(listener) = &self.listener {
            loop {
                match listener.accept() {
                    Ok((stream, addr)) => {
                        if stream.set_nonblocking(true).is_err() {
                            continue;
                        }
                        log::info!("[PUB] {} connection from {addr}", self.cfg.name);
                        self.streams.insert(addr, stream);
                        self.peers.entry(addr).or_insert_with(|| Peer::new(addr, now));
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                    Err(e) => {
                        log::debug!("[PUB] {} accept error: {e}", self.cfg.name);
                        break;
                    }
                }
            }
        }

        // one read per stream per poll
        let addrs: Vec<SocketAddr> = self.streams.keys().copied().collect();
        for addr in addrs {
            let mut closed = false;
            let mut msg: Option<Vec<u8>> = None;
            if let Some(stream) = self.streams.get_mut(&addr) {
                match stream.read(&mut self.recv_buf) {
                    Ok(0) => closed = true,
                    Ok(n) => msg = Some(self.recv_buf[..n].to_vec()),
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(_) => closed = true,
                }
            }
            if closed {
                self.evict(addr, "connection closed");
            } else if let Some(msg) = msg {
                self.dispatch(&msg, addr, handler, now);
            }
        }
    }

    /// Route one inbound message: control plane first, then the handler.
    fn dispatch(&mut self, msg: &[u8], from: SocketAddr, handler: &mut dyn RequestHandler, now: Instant) {
        let credits = self.cfg.hb_credits;
        let peer = self.peers.entry(from).or_insert_with(|| {
            log::debug!("[PUB] new peer {from}");
            Peer::new(from, now)
        });

        if msg == CTRL_SUBSCRIBE {
            peer.subscribe(credits, now);
            log::info!("[PUB] {} peer {from} subscribed ({credits} credits)", self.cfg.name);
            self.reply(from, REPLY_ACK);
            return;
        }
        if msg == CTRL_HEARTBEAT {
            peer.keepalive(credits, now);
            self.reply(from, REPLY_ACK);
            return;
        }
        if msg == CTRL_UNSUBSCRIBE {
            self.reply(from, REPLY_ACK);
            self.evict(from, "unsubscribed");
            return;
        }

        match self.cfg.mode {
            Mode::ReqRes => {
                peer.touch(now);
                self.stats.requests += 1;
                let reply = handler.handle(msg, from);
                let exhausted = {
                    // one complete exchange costs one credit
                    let peer = self.peers.get_mut(&from);
                    peer.map(|p| !p.spend_credit(credits)).unwrap_or(false)
                };
                match reply {
                    Some(bytes) => self.reply(from, &bytes),
                    None => self.reply(from, REPLY_NACK),
                }
                if exhausted {
                    self.evict(from, "credits exhausted");
                }
            }
            Mode::PubSub => {
                // data-plane peers only speak the control protocol
                peer.touch(now);
                self.reply(from, REPLY_NACK);
            }
        }
    }

    fn reply(&mut self, to: SocketAddr, bytes: &[u8]) {
        let ok = match self.cfg.transport {
            Transport::Udp => self
                .udp
                .as_ref()
                .map(|s| s.send_to(bytes, to).is_ok())
                .unwrap_or(false),
            Transport::Tcp => self
                .streams
                .get_mut(&to)
                .map(|s| s.write_all(bytes).is_ok())
                .unwrap_or(false),
        };
        if !ok {
            self.stats.send_failures += 1;
        }
    }

    // ===== eviction =====

    /// Remove peers whose silence exceeded the heartbeat window.
    fn sweep(&mut self, now: Instant) {
        let window = self.cfg.hb_period;
        let expired: Vec<SocketAddr> = self
            .peers
            .values()
            .filter(|p| p.is_expired(now, window))
            .map(|p| p.addr)
            .collect();
        for addr in expired {
            self.evict(addr, "heartbeat expired");
        }
    }

    fn evict(&mut self, addr: SocketAddr, why: &str) {
        if let Some(mut peer) = self.peers.remove(&addr) {
            peer.state = PeerState::Evicted;
            self.stats.evicted += 1;
            log::info!(
                "[PUB] {} evicted {addr} ({why}; sent {} failures {})",
                self.cfg.name,
                peer.sent,
                peer.send_failures
            );
        }
        self.streams.remove(&addr);
    }
}
