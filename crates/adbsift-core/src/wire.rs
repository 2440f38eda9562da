//! ADB wire format — the on-wire types adbsift decodes.
//!
//! Two layouts live here. The transport message header wraps every ADB
//! message on the TCP connection, and the sync sub-header prefixes every
//! request and response of the file-sync sub-protocol carried inside `WRTE`
//! payloads.
//!
//! All types are `#[repr(C)]` over unaligned little-endian integers and use
//! zerocopy derives, so decoding is a fixed-offset read with no unsafe code.

use static_assertions::assert_eq_size;
use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

// ── Command tags ──────────────────────────────────────────────────────────────

/// Transport-level command tags (`MessageHeader::command`).
pub mod command {
    pub const SYNC: [u8; 4] = *b"SYNC";
    pub const CNXN: [u8; 4] = *b"CNXN";
    pub const AUTH: [u8; 4] = *b"AUTH";
    pub const OPEN: [u8; 4] = *b"OPEN";
    pub const OKAY: [u8; 4] = *b"OKAY";
    pub const CLSE: [u8; 4] = *b"CLSE";
    /// Stream write. The only command that carries sync traffic.
    pub const WRTE: [u8; 4] = *b"WRTE";
    pub const STLS: [u8; 4] = *b"STLS";
}

/// Sync sub-protocol tags (`SyncHeader::id`).
pub mod sync_tag {
    pub const LIST: [u8; 4] = *b"LIST";
    pub const STAT: [u8; 4] = *b"STAT";
    pub const SEND: [u8; 4] = *b"SEND";
    /// Pull a file from the device. Followed by the path.
    pub const RECV: [u8; 4] = *b"RECV";
    pub const DATA: [u8; 4] = *b"DATA";
    pub const DONE: [u8; 4] = *b"DONE";
    pub const OKAY: [u8; 4] = *b"OKAY";
    pub const FAIL: [u8; 4] = *b"FAIL";
    pub const QUIT: [u8; 4] = *b"QUIT";
    pub const DENT: [u8; 4] = *b"DENT";
}

// ── Message Header ────────────────────────────────────────────────────────────

/// Header of every ADB transport message.
///
/// Exactly `length` payload bytes follow it on the stream.
///
/// Wire size: 24 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct MessageHeader {
    /// Four ASCII bytes, e.g. `WRTE`.
    pub command: [u8; 4],

    /// First argument. For stream commands, the sender's local stream id.
    pub arg0: U32<LittleEndian>,

    /// Second argument. For stream commands, the receiver's stream id.
    pub arg1: U32<LittleEndian>,

    /// Payload length in bytes, not including this header.
    pub length: U32<LittleEndian>,

    /// Byte-sum of the payload. Zero when the sender skipped it.
    pub checksum: U32<LittleEndian>,

    /// `command` read as a little-endian u32, XOR 0xFFFFFFFF.
    pub magic: U32<LittleEndian>,
}

assert_eq_size!(MessageHeader, [u8; 24]);

/// Wire size of [`MessageHeader`].
pub const HEADER_LEN: usize = 24;

impl MessageHeader {
    /// Build a consistent header for `payload`.
    pub fn new(command: [u8; 4], arg0: u32, arg1: u32, payload: &[u8]) -> Self {
        Self {
            command,
            arg0: U32::new(arg0),
            arg1: U32::new(arg1),
            length: U32::new(payload.len() as u32),
            checksum: U32::new(payload_checksum(payload)),
            magic: U32::new(expected_magic(command)),
        }
    }

    /// Decode a header from the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, WireError> {
        Self::read_from_prefix(bytes).ok_or(WireError::Truncated {
            needed: HEADER_LEN,
            available: bytes.len(),
        })
    }

    /// Declared payload length.
    pub fn payload_len(&self) -> usize {
        self.length.get() as usize
    }

    /// The command tag as text. Non-ASCII tags render as hex.
    pub fn command_name(&self) -> String {
        tag_name(&self.command)
    }

    /// Check that `magic` is the complement of `command`.
    pub fn check_magic(&self) -> Result<(), WireError> {
        let expected = expected_magic(self.command);
        let found = self.magic.get();
        if found != expected {
            return Err(WireError::BadMagic {
                command: self.command_name(),
                expected,
                found,
            });
        }
        Ok(())
    }

    /// Check the declared checksum against `payload`.
    ///
    /// A zero checksum passes: senders at protocol version 0x01000001 and
    /// later no longer compute it.
    pub fn check_checksum(&self, payload: &[u8]) -> Result<(), WireError> {
        let declared = self.checksum.get();
        if declared == 0 {
            return Ok(());
        }
        let computed = payload_checksum(payload);
        if declared != computed {
            return Err(WireError::ChecksumMismatch { declared, computed });
        }
        Ok(())
    }
}

/// Byte-sum of the payload, as the transport checksum defines it.
pub fn payload_checksum(payload: &[u8]) -> u32 {
    payload
        .iter()
        .fold(0u32, |sum, &b| sum.wrapping_add(u32::from(b)))
}

/// Magic value a well-formed header carries for `command`.
pub fn expected_magic(command: [u8; 4]) -> u32 {
    u32::from_le_bytes(command) ^ 0xFFFF_FFFF
}

// ── Sync Header ───────────────────────────────────────────────────────────────

/// Sub-header of the file-sync sub-protocol.
///
/// The same 8-byte shape serves every sync unit: a `RECV` request (length
/// of the path that follows), a `DATA` chunk (length of its payload), a
/// `DONE` marker (modification time) and a `FAIL` reply (length of the
/// reason text).
///
/// Wire size: 8 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct SyncHeader {
    pub id: [u8; 4],
    pub length: U32<LittleEndian>,
}

assert_eq_size!(SyncHeader, [u8; 8]);

/// Wire size of [`SyncHeader`].
pub const SYNC_HEADER_LEN: usize = 8;

impl SyncHeader {
    pub fn new(id: [u8; 4], length: u32) -> Self {
        Self {
            id,
            length: U32::new(length),
        }
    }
}

/// Render a 4-byte tag. ASCII alphanumeric tags stay readable.
pub fn tag_name(tag: &[u8; 4]) -> String {
    if tag.iter().all(|b| b.is_ascii_alphanumeric()) {
        tag.iter().map(|&b| b as char).collect()
    } else {
        format!("0x{:02x}{:02x}{:02x}{:02x}", tag[0], tag[1], tag[2], tag[3])
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("need {needed} bytes, only {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("bad magic for {command}: expected 0x{expected:08x}, found 0x{found:08x}")]
    BadMagic {
        command: String,
        expected: u32,
        found: u32,
    },

    #[error("checksum mismatch: header says 0x{declared:08x}, payload sums to 0x{computed:08x}")]
    ChecksumMismatch { declared: u32, computed: u32 },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
