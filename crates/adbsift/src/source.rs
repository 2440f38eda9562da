//! Loading capture files through libpcap.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use pcap::{Capture, Offline};

use adbsift_core::capture::{Frame, LinkType};

use crate::CaptureFile;

/// Read every frame of the pcap or pcapng file at `path`.
pub fn read_capture(path: &Path) -> Result<CaptureFile> {
    let mut cap = Capture::<Offline>::from_file(path)
        .with_context(|| format!("failed to open capture {}", path.display()))?;
    let link = LinkType::from_dlt(cap.get_datalink().0)
        .with_context(|| format!("cannot read {}", path.display()))?;

    let mut frames = Vec::new();
    loop {
        let packet = match cap.next_packet() {
            Ok(packet) => packet,
            Err(pcap::Error::NoMorePackets) => break,
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("failed reading frame {} of {}", frames.len() + 1, path.display())
                })
            }
        };
        let secs = (packet.header.ts.tv_sec as i64).max(0) as u64;
        let micros = (packet.header.ts.tv_usec as i64).clamp(0, 999_999) as u32;
        frames.push(Frame {
            number: frames.len() as u64 + 1,
            timestamp: Duration::new(secs, micros * 1_000),
            data: Bytes::copy_from_slice(packet.data),
        });
    }

    tracing::debug!(path = %path.display(), frames = frames.len(), link = ?link, "capture loaded");
    Ok(CaptureFile { link, frames })
}
