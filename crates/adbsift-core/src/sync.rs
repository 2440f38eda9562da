//! File-sync extraction — recover pulled files from `WRTE` traffic.
//!
//! A pull looks like this once everything but the `WRTE` messages of the
//! conversation is filtered out:
//!
//! ```text
//!   C->S  WRTE  RECV <len> <path>
//!   S->C  WRTE  DATA <len> <bytes…>
//!   S->C  WRTE  <more bytes…>
//!   ...
//!   S->C  WRTE  <last bytes…> DONE <mtime>
//! ```
//!
//! `WRTE` boundaries do not line up with sync chunk boundaries: a DATA chunk
//! is usually spread over many messages, and one message may end one chunk
//! and start the next. The response is therefore accumulated whole and then
//! parsed as a chunk stream.

use bytes::{Bytes, BytesMut};
use zerocopy::FromBytes;

use crate::framing::DirectedMessage;
use crate::stream::{Conversation, Direction};
use crate::wire::{command, sync_tag, tag_name, SyncHeader, SYNC_HEADER_LEN};

// ── Cursor ────────────────────────────────────────────────────────────────────

/// Forward-only reader over a byte slice with non-consuming lookahead.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The next `n` bytes, without consuming them. `None` if fewer remain.
    pub fn peek(&self, n: usize) -> Option<&'a [u8]> {
        self.buf.get(self.pos..self.pos.checked_add(n)?)
    }

    /// Consume and return the next `n` bytes.
    pub fn advance(&mut self, n: usize) -> Result<&'a [u8], SyncError> {
        let bytes = self.peek(n).ok_or(SyncError::Truncated {
            offset: self.pos,
            needed: n,
            available: self.remaining(),
        })?;
        self.pos += n;
        Ok(bytes)
    }

    /// Consume one sync sub-header.
    pub fn read_header(&mut self) -> Result<SyncHeader, SyncError> {
        let bytes = self.advance(SYNC_HEADER_LEN)?;
        SyncHeader::read_from(bytes).ok_or(SyncError::Truncated {
            offset: self.pos - SYNC_HEADER_LEN,
            needed: SYNC_HEADER_LEN,
            available: bytes.len(),
        })
    }
}

// ── Chunk stream ──────────────────────────────────────────────────────────────

/// Errors in a server response that should have been a chunk stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("response ended at offset {offset} without a DONE marker")]
    MissingDone { offset: usize },

    #[error("chunk at offset {offset} needs {needed} bytes, only {available} remain")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("unexpected sync tag {tag} at offset {offset}")]
    UnexpectedTag { offset: usize, tag: String },

    #[error("device refused the pull: {0}")]
    Remote(String),
}

/// A parsed `DATA… DONE` stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkStream {
    /// Concatenated DATA payloads.
    pub content: Bytes,
    /// Number of DATA chunks, empty ones included.
    pub chunks: usize,
    /// Modification time carried by DONE, when the field was present.
    pub mtime: Option<u32>,
    /// Bytes left over after DONE.
    pub trailing: usize,
}

/// Parse zero or more DATA chunks followed by one DONE marker.
///
/// The lookahead only ever inspects chunk-start offsets, so file bytes that
/// happen to spell `DONE` inside a DATA payload are never mistaken for the
/// terminator.
pub fn parse_chunk_stream(raw: &[u8]) -> Result<ChunkStream, SyncError> {
    let mut cursor = Cursor::new(raw);
    let mut content = BytesMut::new();
    let mut chunks = 0;

    loop {
        let offset = cursor.position();
        let tag = match cursor.peek(4) {
            Some(tag) => tag,
            None if cursor.is_empty() => return Err(SyncError::MissingDone { offset }),
            None => {
                return Err(SyncError::Truncated {
                    offset,
                    needed: SYNC_HEADER_LEN,
                    available: cursor.remaining(),
                })
            }
        };

        if tag == sync_tag::DONE {
            cursor.advance(4)?;
            let mtime = cursor
                .advance(4)
                .ok()
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]));
            return Ok(ChunkStream {
                content: content.freeze(),
                chunks,
                mtime,
                trailing: cursor.remaining(),
            });
        }

        let header = cursor.read_header()?;
        let len = header.length.get() as usize;
        match header.id {
            sync_tag::DATA => {
                content.extend_from_slice(cursor.advance(len)?);
                chunks += 1;
            }
            sync_tag::FAIL => {
                let reason = cursor
                    .peek(len)
                    .unwrap_or_else(|| cursor.peek(cursor.remaining()).unwrap_or_default());
                return Err(SyncError::Remote(
                    String::from_utf8_lossy(reason).into_owned(),
                ));
            }
            other => {
                return Err(SyncError::UnexpectedTag {
                    offset,
                    tag: tag_name(&other),
                })
            }
        }
    }
}

// ── Transfers ─────────────────────────────────────────────────────────────────

/// A file recovered from one RECV request and its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTransfer {
    /// Path the client asked for, as sent.
    pub path: String,
    /// Bytes of response collected, framing overhead included.
    pub raw_len: usize,
    /// Reassembled file content.
    pub content: Bytes,
    pub chunks: usize,
    pub mtime: Option<u32>,
}

impl FileTransfer {
    /// BLAKE3 digest of the content.
    pub fn content_hash(&self) -> [u8; 32] {
        *blake3::hash(&self.content).as_bytes()
    }
}

/// A response that could not be parsed. Only this transfer is lost.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transfer of '{path}' ({raw_len} raw bytes) is malformed: {source}")]
pub struct TransferError {
    pub path: String,
    pub raw_len: usize,
    #[source]
    pub source: SyncError,
}

/// Path requested by a RECV payload, if `payload` is one.
pub fn recv_request_path(payload: &[u8]) -> Option<String> {
    if !payload.starts_with(&sync_tag::RECV) {
        return None;
    }
    let path = payload.get(SYNC_HEADER_LEN..).unwrap_or_default();
    Some(String::from_utf8_lossy(path).into_owned())
}

enum State {
    Searching,
    Collecting { path: String, raw: BytesMut },
}

/// Two-state scanner over directed messages, yielding one item per
/// RECV request that received a non-empty response.
///
/// Messages other than `WRTE`, and messages outside the conversation, are
/// skipped. A malformed response is yielded as `Err` and scanning carries
/// on with the next message.
pub struct SyncExtractor<I> {
    messages: I,
    conversation: Conversation,
    state: State,
}

impl<I> SyncExtractor<I>
where
    I: Iterator<Item = DirectedMessage>,
{
    pub fn new<M>(messages: M, conversation: Conversation) -> Self
    where
        M: IntoIterator<IntoIter = I, Item = DirectedMessage>,
    {
        Self {
            messages: messages.into_iter(),
            conversation,
            state: State::Searching,
        }
    }

    /// Leave `Collecting`, producing the finished transfer if there was one.
    fn finish(&mut self) -> Option<Result<FileTransfer, TransferError>> {
        let (path, raw) = match std::mem::replace(&mut self.state, State::Searching) {
            State::Searching => return None,
            State::Collecting { path, raw } => (path, raw.freeze()),
        };

        if raw.is_empty() {
            tracing::debug!(path = %path, "request got no response bytes, skipping");
            return None;
        }

        let raw_len = raw.len();
        Some(match parse_chunk_stream(&raw) {
            Ok(stream) => {
                if stream.trailing > 0 {
                    tracing::debug!(path = %path, trailing = stream.trailing, "bytes after DONE ignored");
                }
                tracing::info!(
                    path = %path,
                    raw_len,
                    size = stream.content.len(),
                    chunks = stream.chunks,
                    "file transfer recovered"
                );
                Ok(FileTransfer {
                    path,
                    raw_len,
                    content: stream.content,
                    chunks: stream.chunks,
                    mtime: stream.mtime,
                })
            }
            Err(source) => {
                tracing::warn!(path = %path, raw_len, error = %source, "malformed file transfer, skipping");
                Err(TransferError {
                    path,
                    raw_len,
                    source,
                })
            }
        })
    }

    /// In `Searching`, start collecting if `message` is a RECV request.
    fn consider_request(&mut self, message: &DirectedMessage) {
        if let Some(path) = recv_request_path(&message.message.payload) {
            tracing::debug!(path = %path, "RECV request");
            self.state = State::Collecting {
                path,
                raw: BytesMut::new(),
            };
        }
    }
}

impl<I> Iterator for SyncExtractor<I>
where
    I: Iterator<Item = DirectedMessage>,
{
    type Item = Result<FileTransfer, TransferError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(message) = self.messages.next() {
            if message.message.command() != command::WRTE {
                continue;
            }

            let direction = self.conversation.direction(message.endpoints);
            match (direction, &mut self.state) {
                (Direction::ServerToClient, State::Collecting { raw, .. }) => {
                    raw.extend_from_slice(&message.message.payload);
                    continue;
                }
                (Direction::ClientToServer, _) => {}
                _ => continue,
            }

            // A client message ends any response being collected, then gets
            // a fresh look as a possible request.
            let finished = self.finish();
            self.consider_request(&message);
            if finished.is_some() {
                return finished;
            }
        }

        self.finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
