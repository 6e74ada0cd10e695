// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP multicast KMALL adapter.
//!
//! Joins the sounder's multicast group on a selected host interface and
//! delivers one complete record per read. M-family records split across
//! multiple datagrams are reassembled before delivery; the synthesized
//! record carries partition {1,1} and refreshed leading/trailing lengths,
//! indistinguishable from a record the sounder sent whole.

use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::input::{FrameSource, ReadError, RecordKind, RecordMeta, SourceState};
use crate::record::kmall::{
    HeaderView, HEADER_SIZE, MIN_DATAGRAM_SIZE, PARTITION_SIZE, TRAILING_SIZE,
};
use crate::record::{wr_u16, wr_u32};

/// Default socket read timeout.
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Largest datagram the adapter will accept.
pub const MAX_DATAGRAM: usize = 64 * 1024;

/// Per-piece overhead removed during reassembly (header + partition +
/// trailing length).
pub const PIECE_OVERHEAD: usize = HEADER_SIZE + PARTITION_SIZE + TRAILING_SIZE;

/// Reassembly group key: (time_sec, time_nanosec, numOfDgms).
type GroupKey = (u32, u32, u16);

/// In-progress multi-datagram record.
#[derive(Debug, Default)]
struct Reassembly {
    key: Option<GroupKey>,
    slots: Vec<Option<Vec<u8>>>,
    received: usize,
}

impl Reassembly {
    fn reset(&mut self) {
        self.key = None;
        self.slots.clear();
        self.received = 0;
    }

    /// Admit one piece. Returns the finished record when the group
    /// completes, None while pieces are outstanding.
    ///
    /// A piece whose group key disagrees with the in-progress group clears
    /// that group and starts over with the new one; slots are indexed by
    /// dgmNum so arrival order never matters.
    fn admit(&mut self, datagram: &[u8], key: GroupKey, dgm_num: u16) -> Option<Vec<u8>> {
        let total = key.2 as usize;

        if self.key != Some(key) {
            self.reset();
            self.key = Some(key);
            self.slots.resize_with(total, || None);
        }

        let idx = dgm_num as usize - 1;
        if self.slots[idx].is_none() {
            self.received += 1;
        }
        self.slots[idx] = Some(datagram.to_vec());

        if self.received < total {
            return None;
        }

        let record = self.concatenate();
        self.reset();
        Some(record)
    }

    /// Merge a complete group: first piece's header and partition, every
    /// piece's body, one refreshed trailing length.
    fn concatenate(&self) -> Vec<u8> {
        let pieces: Vec<&[u8]> = self.slots.iter().filter_map(|s| s.as_deref()).collect();

        let total_size: usize = PIECE_OVERHEAD
            + pieces.iter().map(|p| p.len() - PIECE_OVERHEAD).sum::<usize>();

        let mut out = Vec::with_capacity(total_size);
        let first = pieces[0];
        out.extend_from_slice(&first[..first.len() - TRAILING_SIZE]);
        for piece in &pieces[1..] {
            out.extend_from_slice(&piece[HEADER_SIZE + PARTITION_SIZE..piece.len() - TRAILING_SIZE]);
        }
        out.extend_from_slice(&(total_size as u32).to_le_bytes());

        wr_u32(&mut out, 0, total_size as u32);
        wr_u16(&mut out, HEADER_SIZE, 1);
        wr_u16(&mut out, HEADER_SIZE + 2, 1);
        out
    }
}

/// UDP multicast KMALL source.
pub struct KmallSource {
    iface: Ipv4Addr,
    group: Ipv4Addr,
    port: u16,
    socket: Option<UdpSocket>,
    state: SourceState,
    read_timeout: Duration,
    reasm: Reassembly,
    recv_buf: Vec<u8>,
}

impl KmallSource {
    /// Create a source for `iface:group:port`.
    #[must_use]
    pub fn new(iface: Ipv4Addr, group: Ipv4Addr, port: u16) -> Self {
        Self {
            iface,
            group,
            port,
            socket: None,
            state: SourceState::Initialized,
            read_timeout: READ_TIMEOUT,
            reasm: Reassembly::default(),
            recv_buf: vec![0u8; MAX_DATAGRAM],
        }
    }

    /// Validate and classify one datagram, feeding the reassembler when the
    /// record is partitioned. Returns the complete record when one is ready.
    fn accept(&mut self, len: usize) -> Result<Option<(Vec<u8>, RecordMeta)>, ReadError> {
        if len < MIN_DATAGRAM_SIZE {
            return Err(ReadError::Malformed);
        }
        let datagram = &self.recv_buf[..len];
        let hdr = HeaderView::new(datagram);

        // Leading length must match datagram size and the trailing copy;
        // partitioned pieces are held to the same rule individually.
        if !hdr.lengths_agree(datagram) {
            return Err(ReadError::Malformed);
        }

        let kind = hdr.kind();
        let ts = hdr.timestamp();
        let (num_of_dgms, dgm_num) = hdr.partition();

        if kind.is_partitioned() && num_of_dgms > 1 {
            if dgm_num == 0 || dgm_num > num_of_dgms {
                return Err(ReadError::Malformed);
            }
            let key = (hdr.time_sec(), hdr.time_nanosec(), num_of_dgms);
            let datagram = datagram.to_vec();
            match self.reasm.admit(&datagram, key, dgm_num) {
                Some(record) => {
                    let meta = RecordMeta {
                        kind: RecordKind::Kmall(kind),
                        len: record.len(),
                        ts,
                    };
                    Ok(Some((record, meta)))
                }
                None => Ok(None),
            }
        } else {
            let meta = RecordMeta {
                kind: RecordKind::Kmall(kind),
                len,
                ts,
            };
            Ok(Some((datagram.to_vec(), meta)))
        }
    }
}

impl FrameSource for KmallSource {
    fn open(&mut self) -> Result<(), ReadError> {
        if self.socket.is_some() {
            return Ok(());
        }
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.port).into())?;
        socket.join_multicast_v4(&self.group, &self.iface)?;
        socket.set_read_timeout(Some(self.read_timeout))?;

        let socket: UdpSocket = socket.into();
        log::info!(
            "[KMALL] joined {}:{} on interface {}",
            self.group,
            self.port,
            self.iface
        );
        self.socket = Some(socket);
        // the multicast join is the subscription for this transport
        self.state = SourceState::Subscribed;
        Ok(())
    }

    fn read_record(&mut self, out: &mut Vec<u8>) -> Result<RecordMeta, ReadError> {
        if self.socket.is_none() {
            self.open()?;
        }

        loop {
            let socket = self.socket.as_ref().ok_or(ReadError::Disconnected)?;
            let len = match socket.recv(&mut self.recv_buf) {
                Ok(n) => n,
                Err(e) => {
                    let err = ReadError::from(e);
                    if err == ReadError::Disconnected {
                        self.socket = None;
                        self.state = SourceState::Initialized;
                        self.reasm.reset();
                    }
                    return Err(err);
                }
            };

            match self.accept(len)? {
                Some((record, meta)) => {
                    out.extend_from_slice(&record);
                    return Ok(meta);
                }
                None => continue, // mid-group, keep reading
            }
        }
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            log::debug!("[KMALL] left {}:{}", self.group, self.port);
        }
        self.state = SourceState::Initialized;
        self.reasm.reset();
    }

    fn state(&self) -> SourceState {
        self.state
    }
}
