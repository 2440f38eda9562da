//! adbsift-core — recover files pulled over ADB from captured TCP traffic.
//!
//! The pipeline runs strictly forward, one lazy stage per module:
//!
//! ```text
//!   Segment ─► stream (ByteRun) ─► framing (DirectedMessage) ─► sync (FileTransfer)
//! ```
//!
//! `capture` turns captured link-layer frames into the segments of one
//! conversation; `wire` holds the on-wire layouts shared by the stages.

pub mod capture;
pub mod config;
pub mod framing;
pub mod stream;
pub mod sync;
pub mod wire;

pub use config::SiftConfig;
pub use framing::{DirectedMessage, Framer, Message, Validation};
pub use stream::{ByteRun, Conversation, Direction, Endpoints, Segment};
pub use sync::{FileTransfer, SyncError, TransferError};

use config::FramingConfig;
use framing::Messages;
use stream::ByteRuns;
use sync::SyncExtractor;

/// The full pipeline over a segment iterator.
pub type Transfers<I> = SyncExtractor<Messages<ByteRuns<I>>>;

/// Chain reassembly, framing and sync extraction over `segments`.
///
/// Segments must belong to `conversation` and be in capture order. The
/// result yields one item per RECV request that got a response; consuming it
/// consumes `segments`.
pub fn extract<I>(
    segments: I,
    framing: &FramingConfig,
    conversation: Conversation,
) -> Transfers<I::IntoIter>
where
    I: IntoIterator<Item = Segment>,
{
    let runs = stream::byte_runs(segments);
    let messages = framing::messages(runs, Framer::new(Validation::from(framing)));
    SyncExtractor::new(messages, conversation)
}
