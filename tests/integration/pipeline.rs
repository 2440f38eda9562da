use adbsift_core::config::FramingConfig;
use adbsift_core::{capture, extract, FileTransfer, SyncError};

use crate::*;

fn run(file: CaptureFile, framing: &FramingConfig) -> Vec<Result<FileTransfer, adbsift_core::TransferError>> {
    let segments = capture::segments(file.link, file.frames, conversation());
    extract(segments, framing, conversation()).collect()
}

fn recovered(file: CaptureFile) -> Vec<FileTransfer> {
    run(file, &FramingConfig::default())
        .into_iter()
        .map(|r| r.expect("transfer should parse"))
        .collect()
}

#[test]
fn single_pull_is_recovered() {
    let response = sync_response(&[b"hello ", b"world"], 1_700_000_000);
    let file = pull(
        CaptureBuilder::new().client(&open_sync()).server(&okay()),
        "/sdcard/greeting.txt",
        &[&response],
    )
    .build();

    let transfers = recovered(file);
    assert_eq!(transfers.len(), 1);
    let t = &transfers[0];
    assert_eq!(t.path, "/sdcard/greeting.txt");
    assert_eq!(&t.content[..], b"hello world");
    assert_eq!(t.chunks, 2);
    assert_eq!(t.mtime, Some(1_700_000_000));
    assert_eq!(t.raw_len, response.len());
}

#[test]
fn result_does_not_depend_on_segmentation() {
    let content: Vec<u8> = (0..5000u32).map(|i| (i * 7 % 251) as u8).collect();
    let response = sync_response(&[&content[..4096], &content[4096..]], 7);
    let message = wrte(&response);

    let whole = pull(CaptureBuilder::new(), "/data/local/tmp/blob", &[&response]).build();
    let expected = recovered(whole);
    assert_eq!(&expected[0].content[..], &content[..]);

    for cuts in [vec![1], vec![3, 24, 25], vec![24], vec![100, 1500, 4200], vec![message.len() - 1]] {
        let file = CaptureBuilder::new()
            .client(&wrte(&recv_request("/data/local/tmp/blob")))
            .server(&okay())
            .server_split(&message, &cuts)
            .client(&okay())
            .build();
        assert_eq!(recovered(file), expected, "cuts {cuts:?}");
    }
}

#[test]
fn response_spread_over_several_messages() {
    let response = sync_response(&[b"abcdefghij", b"klmnop"], 3);
    let (a, rest) = response.split_at(5);
    let (b, c) = rest.split_at(13);

    let file = pull(CaptureBuilder::new(), "/x/y.bin", &[a, b, c]).build();
    let transfers = recovered(file);
    assert_eq!(transfers.len(), 1);
    assert_eq!(&transfers[0].content[..], b"abcdefghijklmnop");
}

#[test]
fn consecutive_pulls_in_order() {
    let first = sync_response(&[b"first"], 1);
    let second = sync_response(&[b"second file"], 2);

    let builder = pull(CaptureBuilder::new(), "/a.txt", &[&first]);
    let file = pull(builder, "/b/c.apk", &[&second]).build();

    let transfers = recovered(file);
    let paths: Vec<_> = transfers.iter().map(|t| t.path.as_str()).collect();
    assert_eq!(paths, ["/a.txt", "/b/c.apk"]);
    assert_eq!(&transfers[1].content[..], b"second file");
}

#[test]
fn malformed_pull_does_not_affect_the_next() {
    let mut broken = sync_response(&[b"lost"], 0).to_vec();
    broken.truncate(broken.len() - 8);
    let good = sync_response(&[b"kept"], 0);

    let builder = pull(CaptureBuilder::new(), "/broken", &[&broken]);
    let file = pull(builder, "/good", &[&good]).build();

    let results = run(file, &FramingConfig::default());
    assert_eq!(results.len(), 2);
    let err = results[0].as_ref().unwrap_err();
    assert_eq!(err.path, "/broken");
    assert!(matches!(err.source, SyncError::MissingDone { .. }));
    assert_eq!(&results[1].as_ref().unwrap().content[..], b"kept");
}

#[test]
fn unrelated_traffic_is_ignored() {
    let response = sync_response(&[b"payload"], 9);
    let file = CaptureBuilder::new()
        .client(&wrte(&recv_request("/p")))
        // Another adb client on the same server, mid-transfer.
        .segment(SERVER_PORT, 50_000, &wrte(b"noise"))
        .segment(50_000, SERVER_PORT, &wrte(&recv_request("/other")))
        // Not IPv4: an ARP frame.
        .raw({
            let mut arp = vec![0xff; 12];
            arp.extend_from_slice(&0x0806u16.to_be_bytes());
            arp.extend_from_slice(&[0; 28]);
            arp
        })
        // Truncated frame.
        .raw(vec![0x02, 0, 0])
        .server(&wrte(&response))
        .build();

    let transfers = recovered(file);
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].path, "/p");
    assert_eq!(&transfers[0].content[..], b"payload");
}

#[test]
fn checksum_validation_drops_corrupt_messages() {
    let response = sync_response(&[b"data"], 0);
    let mut corrupt = wrte(&response).to_vec();
    // Declared checksum lives at bytes 16..20 of the header.
    corrupt[16] ^= 0xff;

    let file = CaptureBuilder::new()
        .client(&wrte(&recv_request("/c")))
        .server(&corrupt)
        .build();

    let lenient = run(file.clone(), &FramingConfig::default());
    assert_eq!(lenient.len(), 1);
    assert!(lenient[0].is_ok());

    let strict = FramingConfig {
        validate_checksum: true,
        ..FramingConfig::default()
    };
    assert!(run(file, &strict).is_empty());
}

#[test]
fn request_without_response_yields_nothing() {
    let file = CaptureBuilder::new()
        .client(&wrte(&recv_request("/nothing")))
        .server(&okay())
        .build();
    assert!(recovered(file).is_empty());
}
