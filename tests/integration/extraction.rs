use adbsift::cmd::dump::cmd_dump;
use adbsift::cmd::extract::cmd_extract;
use adbsift::output::MANIFEST_NAME;
use adbsift_core::SiftConfig;

use crate::*;

fn config() -> SiftConfig {
    let mut config = SiftConfig::default();
    config.capture.client_port = CLIENT_PORT;
    config
}

#[test]
fn files_and_manifest_land_in_output_dir() {
    let apk = vec![0x50, 0x4b, 0x03, 0x04, 0, 0, 0, 0];
    let builder = pull(
        CaptureBuilder::new(),
        "/data/app/com.example/base.apk",
        &[&sync_response(&[&apk], 1_650_000_000)],
    );
    let file = pull(builder, "/sdcard/notes", &[&sync_response(&[b"remember"], 0)]).build();

    let dir = temp_dir("files");
    let summary = cmd_extract(file, &config(), conversation(), dir.clone()).unwrap();
    assert_eq!(summary.recovered, 2);
    assert_eq!(summary.malformed, 0);
    assert!(summary.is_clean());

    assert_eq!(std::fs::read(dir.join("file1.apk")).unwrap(), apk);
    assert_eq!(std::fs::read(dir.join("file2.bin")).unwrap(), b"remember");

    let manifest_path = summary.manifest.expect("manifest written");
    assert_eq!(manifest_path, dir.join(MANIFEST_NAME));
    let manifest: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&manifest_path).unwrap()).unwrap();
    let entries = manifest.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["requested_path"], "/data/app/com.example/base.apk");
    assert_eq!(entries[0]["mtime"], 1_650_000_000);
    assert_eq!(entries[1]["file"], "file2.bin");
    assert_eq!(entries[1]["size"], 8);
    assert_eq!(entries[1]["blake3"].as_str().unwrap().len(), 64);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn malformed_transfers_are_counted_not_written() {
    let mut broken = sync_response(&[b"lost"], 0).to_vec();
    broken.truncate(6);
    let builder = pull(CaptureBuilder::new(), "/broken.txt", &[&broken]);
    let file = pull(builder, "/kept.txt", &[&sync_response(&[b"ok"], 0)]).build();

    let dir = temp_dir("malformed");
    let summary = cmd_extract(file, &config(), conversation(), dir.clone()).unwrap();
    assert_eq!(summary.recovered, 1);
    assert_eq!(summary.malformed, 1);
    assert_eq!(std::fs::read(dir.join("file1.txt")).unwrap(), b"ok");
    assert!(!dir.join("file2.txt").exists());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn empty_capture_leaves_no_directory() {
    let file = CaptureBuilder::new()
        .client(&open_sync())
        .server(&okay())
        .build();

    let dir = temp_dir("empty");
    let summary = cmd_extract(file, &config(), conversation(), dir.clone()).unwrap();
    assert_eq!(summary.recovered, 0);
    assert_eq!(summary.manifest, None);
    assert!(!dir.exists());
}

#[test]
fn manifest_respects_config() {
    let file = pull(CaptureBuilder::new(), "/m.txt", &[&sync_response(&[b"m"], 0)]).build();
    let mut config = config();
    config.output.manifest = false;

    let dir = temp_dir("nomanifest");
    let summary = cmd_extract(file, &config, conversation(), dir.clone()).unwrap();
    assert_eq!(summary.recovered, 1);
    assert_eq!(summary.manifest, None);
    assert!(!dir.join(MANIFEST_NAME).exists());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn dump_runs_over_the_same_capture() {
    let file = pull(CaptureBuilder::new(), "/d.txt", &[&sync_response(&[b"d"], 0)]).build();
    cmd_dump(&file, &config(), conversation()).unwrap();

    // Dump borrows the capture; extraction still sees every frame.
    let dir = temp_dir("dump");
    let summary = cmd_extract(file, &config(), conversation(), dir.clone()).unwrap();
    assert_eq!(summary.recovered, 1);
    let _ = std::fs::remove_dir_all(&dir);
}
