//! `adbsift extract`: recover pulled files and write them to disk.

use std::path::PathBuf;

use anyhow::Result;

use adbsift_core::{capture, Conversation, SiftConfig};

use crate::output::TransferWriter;
use crate::CaptureFile;

/// What one extraction run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub recovered: usize,
    pub malformed: usize,
    pub write_failures: usize,
    pub manifest: Option<PathBuf>,
}

impl ExtractSummary {
    /// True when every recovered file reached the disk.
    pub fn is_clean(&self) -> bool {
        self.write_failures == 0
    }
}

pub fn cmd_extract(
    file: CaptureFile,
    config: &SiftConfig,
    conversation: Conversation,
    out_dir: PathBuf,
) -> Result<ExtractSummary> {
    let segments = capture::segments(file.link, file.frames, conversation);
    let mut writer = TransferWriter::new(out_dir, config.output.manifest);
    let mut summary = ExtractSummary::default();

    for item in adbsift_core::extract(segments, &config.framing, conversation) {
        let transfer = match item {
            Ok(transfer) => transfer,
            Err(e) => {
                summary.malformed += 1;
                eprintln!("Skipping transfer: {e}");
                continue;
            }
        };
        summary.recovered += 1;

        let index = summary.recovered;
        let target = writer
            .dir()
            .join(crate::output::file_name(index, &transfer.path));
        println!(
            "Found file transfer for '{}' with length of {} bytes. Writing to {}",
            transfer.path,
            transfer.content.len(),
            target.display()
        );
        if let Err(e) = writer.write(&transfer) {
            summary.write_failures += 1;
            tracing::error!(error = %e, path = %transfer.path, "write failed");
            eprintln!("Error: {e}");
        }
    }

    match writer.finish() {
        Ok(manifest) => summary.manifest = manifest,
        Err(e) => {
            summary.write_failures += 1;
            eprintln!("Error: {e}");
        }
    }

    tracing::info!(
        recovered = summary.recovered,
        malformed = summary.malformed,
        write_failures = summary.write_failures,
        "extraction finished"
    );
    if summary.recovered == 0 {
        println!("No file transfers found.");
    }
    Ok(summary)
}
