//! Message framing — split byte runs into ADB transport messages.
//!
//! A run is a sequence of `header (24 bytes) + payload (header.length bytes)`
//! units with no padding between them. Framing trouble is local to the run
//! it occurs in: the framer keeps whatever it decoded before the problem and
//! reports the problem next to the messages.

use bytes::{BufMut, Bytes, BytesMut};
use zerocopy::AsBytes;

use crate::config::FramingConfig;
use crate::stream::{ByteRun, Endpoints};
use crate::wire::{MessageHeader, WireError, HEADER_LEN};

// ── Messages ──────────────────────────────────────────────────────────────────

/// One ADB transport message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    /// Exactly `header.length` bytes.
    pub payload: Bytes,
}

impl Message {
    /// Build a well-formed message: length, checksum and magic are derived.
    pub fn new(command: [u8; 4], arg0: u32, arg1: u32, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        Self {
            header: MessageHeader::new(command, arg0, arg1, &payload),
            payload,
        }
    }

    pub fn command(&self) -> [u8; 4] {
        self.header.command
    }

    /// Append header and payload to `buf` in wire order.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(HEADER_LEN + self.payload.len());
        buf.put_slice(self.header.as_bytes());
        buf.put_slice(&self.payload);
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        buf.freeze()
    }
}

/// A message together with the endpoints of the run it was found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectedMessage {
    pub endpoints: Endpoints,
    pub message: Message,
}

// ── Validation ────────────────────────────────────────────────────────────────

/// Opt-in header checks. Both are off by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Validation {
    /// Require the magic field to be the complement of the command.
    pub magic: bool,
    /// Require the checksum field to match the payload byte-sum.
    pub checksum: bool,
}

impl From<&FramingConfig> for Validation {
    fn from(config: &FramingConfig) -> Self {
        Self {
            magic: config.validate_magic,
            checksum: config.validate_checksum,
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// A framing problem inside one run. Offsets are relative to the run start.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    #[error("incomplete header at offset {offset}: {remaining} trailing bytes")]
    TruncatedHeader { offset: usize, remaining: usize },

    #[error("payload at offset {offset} declares {declared} bytes, only {available} remain")]
    TruncatedPayload {
        offset: usize,
        declared: usize,
        available: usize,
    },

    #[error("invalid header at offset {offset}: {source}")]
    Invalid {
        offset: usize,
        #[source]
        source: WireError,
    },
}

// ── Framer ────────────────────────────────────────────────────────────────────

/// Result of framing one run.
#[derive(Debug, Clone, Default)]
pub struct FramedRun {
    /// Decoded messages, in byte order.
    pub messages: Vec<DirectedMessage>,
    /// Problems met while decoding. Only the last one can have stopped the run.
    pub issues: Vec<FramingError>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Framer {
    validation: Validation,
}

impl Framer {
    pub fn new(validation: Validation) -> Self {
        Self { validation }
    }

    pub fn validation(&self) -> Validation {
        self.validation
    }

    /// Decode every complete message in `run`.
    ///
    /// Stops at the first incomplete header, the first payload running past
    /// the end of the run, or (with magic validation) the first header whose
    /// magic is wrong. A checksum mismatch drops only that message.
    pub fn decode_run(&self, run: &ByteRun) -> FramedRun {
        let bytes = &run.payload;
        let mut framed = FramedRun::default();
        let mut offset = 0;

        while offset < bytes.len() {
            let remaining = bytes.len() - offset;
            let header = match MessageHeader::parse(&bytes[offset..]) {
                Ok(h) => h,
                Err(_) => {
                    framed
                        .issues
                        .push(FramingError::TruncatedHeader { offset, remaining });
                    break;
                }
            };

            if self.validation.magic {
                if let Err(source) = header.check_magic() {
                    framed.issues.push(FramingError::Invalid { offset, source });
                    break;
                }
            }

            let declared = header.payload_len();
            let available = remaining - HEADER_LEN;
            if declared > available {
                framed.issues.push(FramingError::TruncatedPayload {
                    offset,
                    declared,
                    available,
                });
                break;
            }

            let start = offset + HEADER_LEN;
            let payload = bytes.slice(start..start + declared);
            let message_offset = offset;
            offset = start + declared;

            if self.validation.checksum {
                if let Err(source) = header.check_checksum(&payload) {
                    framed.issues.push(FramingError::Invalid {
                        offset: message_offset,
                        source,
                    });
                    continue;
                }
            }

            framed.messages.push(DirectedMessage {
                endpoints: run.endpoints,
                message: Message { header, payload },
            });
        }

        framed
    }
}

/// Iterator adapter flattening runs into directed messages.
///
/// Framing issues are logged and otherwise swallowed so one bad run never
/// hides the messages of the runs after it.
pub struct Messages<I> {
    runs: I,
    framer: Framer,
    current: std::vec::IntoIter<DirectedMessage>,
    run_index: usize,
}

/// Frame every run of `runs`, in order.
pub fn messages<I>(runs: I, framer: Framer) -> Messages<I::IntoIter>
where
    I: IntoIterator<Item = ByteRun>,
{
    Messages {
        runs: runs.into_iter(),
        framer,
        current: Vec::new().into_iter(),
        run_index: 0,
    }
}

impl<I: Iterator<Item = ByteRun>> Iterator for Messages<I> {
    type Item = DirectedMessage;

    fn next(&mut self) -> Option<DirectedMessage> {
        loop {
            if let Some(message) = self.current.next() {
                return Some(message);
            }

            let run = self.runs.next()?;
            let index = self.run_index;
            self.run_index += 1;

            let framed = self.framer.decode_run(&run);
            for issue in &framed.issues {
                tracing::warn!(
                    run = index,
                    src_port = run.endpoints.src_port,
                    dst_port = run.endpoints.dst_port,
                    run_len = run.payload.len(),
                    error = %issue,
                    "framing problem, keeping messages decoded so far"
                );
            }
            tracing::trace!(run = index, messages = framed.messages.len(), "run framed");
            self.current = framed.messages.into_iter();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
