//! adbsift integration test harness.
//!
//! Tests here build synthetic Ethernet captures of an `adb pull` session
//! and drive them through the whole pipeline, from raw frames to files on
//! disk. Nothing needs libpcap or a device.

use std::path::PathBuf;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};

use adbsift::CaptureFile;
use adbsift_core::capture::{Frame, LinkType};
use adbsift_core::wire::{command, sync_tag};
use adbsift_core::{Conversation, Message};

// ── Harness ───────────────────────────────────────────────────────────────────

pub const SERVER_PORT: u16 = 5037;
pub const CLIENT_PORT: u16 = 41_873;

pub fn conversation() -> Conversation {
    Conversation::new(SERVER_PORT, CLIENT_PORT)
}

/// Ethernet II + IPv4 + TCP frame carrying `payload`.
pub fn tcp_frame(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(54 + payload.len());
    frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 0x01]);
    frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 0x02]);
    frame.extend_from_slice(&0x0800u16.to_be_bytes());

    let total_len = (20 + 20 + payload.len()) as u16;
    frame.extend_from_slice(&[0x45, 0]);
    frame.extend_from_slice(&total_len.to_be_bytes());
    frame.extend_from_slice(&[0, 1, 0x40, 0, 64, 6, 0, 0]);
    frame.extend_from_slice(&[127, 0, 0, 1, 127, 0, 0, 1]);

    frame.extend_from_slice(&src_port.to_be_bytes());
    frame.extend_from_slice(&dst_port.to_be_bytes());
    frame.extend_from_slice(&1u32.to_be_bytes());
    frame.extend_from_slice(&1u32.to_be_bytes());
    frame.extend_from_slice(&[0x50, 0x18, 0xff, 0xff, 0, 0, 0, 0]);

    frame.extend_from_slice(payload);
    frame
}

/// Accumulates frames in capture order.
#[derive(Default)]
pub struct CaptureBuilder {
    frames: Vec<Frame>,
}

impl CaptureBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(mut self, data: Vec<u8>) -> Self {
        let number = self.frames.len() as u64 + 1;
        self.frames.push(Frame {
            number,
            timestamp: Duration::from_millis(number * 10),
            data: Bytes::from(data),
        });
        self
    }

    pub fn segment(self, src_port: u16, dst_port: u16, payload: &[u8]) -> Self {
        self.raw(tcp_frame(src_port, dst_port, payload))
    }

    pub fn client(self, payload: &[u8]) -> Self {
        self.segment(CLIENT_PORT, SERVER_PORT, payload)
    }

    pub fn server(self, payload: &[u8]) -> Self {
        self.segment(SERVER_PORT, CLIENT_PORT, payload)
    }

    /// Server bytes split into one segment per piece.
    pub fn server_split(mut self, payload: &[u8], cuts: &[usize]) -> Self {
        let mut start = 0;
        for &cut in cuts.iter().chain(std::iter::once(&payload.len())) {
            let cut = cut.min(payload.len());
            if cut > start {
                self = self.server(&payload[start..cut]);
                start = cut;
            }
        }
        self
    }

    pub fn build(self) -> CaptureFile {
        CaptureFile {
            link: LinkType::Ethernet,
            frames: self.frames,
        }
    }
}

// ── ADB payloads ──────────────────────────────────────────────────────────────

pub fn wrte(payload: &[u8]) -> Bytes {
    Message::new(command::WRTE, 1, 2, Bytes::copy_from_slice(payload)).encode()
}

pub fn okay() -> Bytes {
    Message::new(command::OKAY, 2, 1, Bytes::new()).encode()
}

pub fn open_sync() -> Bytes {
    Message::new(command::OPEN, 1, 0, &b"sync:\0"[..]).encode()
}

pub fn recv_request(path: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&sync_tag::RECV);
    buf.extend_from_slice(&(path.len() as u32).to_le_bytes());
    buf.extend_from_slice(path.as_bytes());
    buf
}

/// `DATA` chunks followed by `DONE`.
pub fn sync_response(chunks: &[&[u8]], mtime: u32) -> Bytes {
    let mut buf = BytesMut::new();
    for chunk in chunks {
        buf.put_slice(&sync_tag::DATA);
        buf.put_u32_le(chunk.len() as u32);
        buf.put_slice(chunk);
    }
    buf.put_slice(&sync_tag::DONE);
    buf.put_u32_le(mtime);
    buf.freeze()
}

/// A complete pull of `path`: sync handshake, request, and the response
/// carried in one WRTE per element of `pieces`.
pub fn pull(builder: CaptureBuilder, path: &str, pieces: &[&[u8]]) -> CaptureBuilder {
    let mut builder = builder
        .client(&wrte(&recv_request(path)))
        .server(&okay());
    for piece in pieces {
        builder = builder.server(&wrte(piece)).client(&okay());
    }
    builder
}

pub fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("adbsift-it-{tag}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

// ── Tests ─────────────────────────────────────────────────────────────────────

mod extraction;
mod pipeline;
