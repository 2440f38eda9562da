//! adbsift — command-line front end for adbsift-core.
//!
//! The binary itself needs the `capture` feature (it links libpcap). Every
//! other piece lives in this library so it builds and tests without it.

pub mod args;
pub mod cmd;
pub mod display;
pub mod output;
#[cfg(feature = "capture")]
pub mod source;

use adbsift_core::capture::{Frame, LinkType};

/// A capture file loaded into memory.
#[derive(Debug, Clone)]
pub struct CaptureFile {
    pub link: LinkType,
    pub frames: Vec<Frame>,
}
