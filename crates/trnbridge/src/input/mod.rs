// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Input adapters: sonar datagram sources behind one capability trait.
//!
//! Three sources implement [`FrameSource`]:
//! - [`reson7k::Reson7kSource`]: TCP stream of 7K frames with resync
//! - [`kmall::KmallSource`]: UDP multicast KMALL datagrams with reassembly
//! - [`file::FileSource`]: local file or datalist playback
//!
//! Each adapter owns its descriptor; the pipeline holds only the trait
//! object and never touches sockets directly.

pub mod file;
pub mod kmall;
pub mod reson7k;

use crate::record::kmall::DatagramKind;

/// Read failure classes surfaced by every adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    /// Source exhausted (file) or orderly remote close without reconnect.
    EndOfStream,
    /// Stream alignment lost and not recovered within the buffer budget.
    ResyncLost,
    /// No complete record available within the read timeout.
    WouldBlock,
    /// Transport dropped; the adapter will reconnect on the next call.
    Disconnected,
    /// Record failed structural validation; skip and continue.
    Malformed,
    /// Underlying I/O error that maps to none of the above.
    Io(std::io::ErrorKind),
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EndOfStream => write!(f, "end of stream"),
            Self::ResyncLost => write!(f, "resync lost"),
            Self::WouldBlock => write!(f, "would block"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Malformed => write!(f, "malformed record"),
            Self::Io(kind) => write!(f, "io error: {kind:?}"),
        }
    }
}

impl std::error::Error for ReadError {}

impl From<std::io::Error> for ReadError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => Self::WouldBlock,
            std::io::ErrorKind::UnexpectedEof => Self::EndOfStream,
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::NotConnected => Self::Disconnected,
            kind => Self::Io(kind),
        }
    }
}

/// What kind of record a read delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// 7K record, by numeric type identifier.
    S7k(u32),
    /// KMALL record, by classified datagram family.
    Kmall(DatagramKind),
    /// Raw bytes of a format the adapter does not classify.
    Opaque,
}

/// Metadata attached to one delivered record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordMeta {
    /// Classified record kind.
    pub kind: RecordKind,
    /// Record length in bytes (what was appended to the caller's buffer).
    pub len: usize,
    /// Record timestamp, epoch seconds (0.0 when the format carries none).
    pub ts: f64,
}

/// Adapter connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceState {
    /// Constructed, not yet connected.
    #[default]
    Initialized,
    /// Transport established.
    Connected,
    /// Connected and subscriptions acknowledged.
    Subscribed,
}

impl std::fmt::Display for SourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceState::Initialized => "Initialized",
            SourceState::Connected => "Connected",
            SourceState::Subscribed => "Subscribed",
        };
        write!(f, "{s}")
    }
}

/// Capability set every datagram source provides.
///
/// `read_record` appends exactly one complete record to `out` and returns
/// its metadata, or an error from the [`ReadError`] taxonomy. After
/// `Disconnected` the source drops back to `Initialized`; the next
/// `read_record` attempts reconnection and, on success, resubscribes every
/// previously requested record type before delivering data.
pub trait FrameSource: Send {
    /// Establish the transport (idempotent when already connected).
    fn open(&mut self) -> Result<(), ReadError>;

    /// Read one complete record into `out`.
    fn read_record(&mut self, out: &mut Vec<u8>) -> Result<RecordMeta, ReadError>;

    /// Release the transport.
    fn close(&mut self);

    /// Tear down and re-establish the transport, restoring subscriptions.
    fn reconnect(&mut self) -> Result<(), ReadError> {
        self.close();
        self.open()
    }

    /// Current connection state.
    fn state(&self) -> SourceState;

    /// Bytes skipped while hunting for frame alignment (streaming sources).
    fn sync_loss_bytes(&self) -> u64 {
        0
    }
}
