//! Stream reassembly — glue consecutive same-direction TCP segments into runs.
//!
//! A single ADB message is routinely split across several TCP segments (file
//! pulls especially), and one segment may carry several messages. Grouping
//! segments into maximal same-direction runs gives the framer contiguous
//! bytes to work on.
//!
//! Capture order is trusted as wire order. There is no sequence-number
//! reordering and no retransmission or duplicate elimination: a reordered
//! or lossy capture produces runs exactly as captured.

use bytes::{Bytes, BytesMut};

/// Source and destination port of a segment or run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoints {
    pub src_port: u16,
    pub dst_port: u16,
}

impl Endpoints {
    pub fn new(src_port: u16, dst_port: u16) -> Self {
        Self { src_port, dst_port }
    }
}

/// Which way a run or message travels within a [`Conversation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
    /// Neither endpoint pair of the conversation.
    Unrelated,
}

impl Direction {
    pub fn label(self) -> &'static str {
        match self {
            Direction::ClientToServer => "C->S",
            Direction::ServerToClient => "S->C",
            Direction::Unrelated => "???",
        }
    }
}

/// The one TCP connection under analysis, identified by its two ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conversation {
    pub server_port: u16,
    pub client_port: u16,
}

impl Conversation {
    pub fn new(server_port: u16, client_port: u16) -> Self {
        Self {
            server_port,
            client_port,
        }
    }

    pub fn direction(&self, endpoints: Endpoints) -> Direction {
        if endpoints.src_port == self.client_port && endpoints.dst_port == self.server_port {
            Direction::ClientToServer
        } else if endpoints.src_port == self.server_port && endpoints.dst_port == self.client_port
        {
            Direction::ServerToClient
        } else {
            Direction::Unrelated
        }
    }

    /// Port-pair filter: true when the packet belongs to this conversation.
    pub fn matches(&self, endpoints: Endpoints) -> bool {
        self.direction(endpoints) != Direction::Unrelated
    }
}

/// One TCP payload as captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub endpoints: Endpoints,
    pub payload: Bytes,
}

impl Segment {
    pub fn new(endpoints: Endpoints, payload: impl Into<Bytes>) -> Self {
        Self {
            endpoints,
            payload: payload.into(),
        }
    }
}

/// Concatenated payload of consecutive segments sharing the same endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteRun {
    pub endpoints: Endpoints,
    pub payload: Bytes,
}

/// Iterator adapter producing [`ByteRun`]s from an ordered segment stream.
///
/// One-shot: once drained it cannot be restarted; rebuild it from the
/// segment source instead.
pub struct ByteRuns<I> {
    segments: I,
    pending: Option<(Endpoints, BytesMut)>,
}

/// Group `segments` into maximal same-direction runs, in order.
pub fn byte_runs<I>(segments: I) -> ByteRuns<I::IntoIter>
where
    I: IntoIterator<Item = Segment>,
{
    ByteRuns {
        segments: segments.into_iter(),
        pending: None,
    }
}

impl<I: Iterator<Item = Segment>> Iterator for ByteRuns<I> {
    type Item = ByteRun;

    fn next(&mut self) -> Option<ByteRun> {
        for segment in self.segments.by_ref() {
            match &mut self.pending {
                Some((endpoints, buffer)) if *endpoints == segment.endpoints => {
                    buffer.extend_from_slice(&segment.payload);
                }
                _ => {
                    let seeded = BytesMut::from(&segment.payload[..]);
                    let finished = self.pending.replace((segment.endpoints, seeded));
                    if let Some((endpoints, buffer)) = finished {
                        return Some(ByteRun {
                            endpoints,
                            payload: buffer.freeze(),
                        });
                    }
                }
            }
        }

        self.pending.take().map(|(endpoints, buffer)| ByteRun {
            endpoints,
            payload: buffer.freeze(),
        })
    }
}
