//! Human-readable rendering of runs and messages for `adbsift dump`.

use adbsift_core::{ByteRun, Conversation, DirectedMessage};

/// Preview length for byte runs.
pub const RUN_PREVIEW: usize = 200;

/// Preview length for message payloads.
pub const MESSAGE_PREVIEW: usize = 100;

/// Printable ASCII kept as-is, everything else shown as `.`.
pub fn printable(data: &[u8], limit: usize) -> String {
    data.iter()
        .take(limit)
        .map(|&b| if (32..127).contains(&b) { b as char } else { '.' })
        .collect()
}

pub fn run_line(index: usize, run: &ByteRun, conversation: Conversation) -> String {
    format!(
        "{index:>5} {} len={:<7} {}",
        conversation.direction(run.endpoints).label(),
        run.payload.len(),
        printable(&run.payload, RUN_PREVIEW)
    )
}

pub fn message_line(index: usize, message: &DirectedMessage, conversation: Conversation) -> String {
    let header = &message.message.header;
    let mut line = format!(
        "{index:>5} {} {}",
        conversation.direction(message.endpoints).label(),
        header.command_name()
    );
    if header.payload_len() > 0 {
        line.push_str(&format!(
            " len={} payload={}",
            header.payload_len(),
            printable(&message.message.payload, MESSAGE_PREVIEW)
        ));
    }
    line
}

/// Section banner in the style of the other CLI output.
pub fn banner(title: &str) -> String {
    let rule = "═".repeat(39);
    format!("{rule}\n  {title}\n{rule}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use adbsift_core::wire::command;
    use adbsift_core::{Endpoints, Message};
    use bytes::Bytes;

    #[test]
    fn printable_masks_and_truncates() {
        assert_eq!(printable(b"RECV\x0c\x00\x00\x00/sdcard/x", 100), "RECV..../sdcard/x");
        assert_eq!(printable(b"abcdef", 3), "abc");
        assert_eq!(printable(b"\x7f~ ", 10), ".~ ");
    }

    #[test]
    fn run_line_shows_direction() {
        let conv = Conversation::new(5037, 40000);
        let run = ByteRun {
            endpoints: Endpoints::new(40000, 5037),
            payload: Bytes::from_static(b"host:version"),
        };
        let line = run_line(3, &run, conv);
        assert!(line.contains("C->S"));
        assert!(line.contains("len=12"));
        assert!(line.ends_with("host:version"));
    }

    #[test]
    fn message_line_omits_empty_payload() {
        let conv = Conversation::new(5037, 40000);
        let okay = DirectedMessage {
            endpoints: Endpoints::new(5037, 40000),
            message: Message::new(command::OKAY, 1, 2, Bytes::new()),
        };
        assert_eq!(message_line(0, &okay, conv).trim(), "0 S->C OKAY");

        let wrte = DirectedMessage {
            endpoints: Endpoints::new(5037, 40000),
            message: Message::new(command::WRTE, 1, 2, &b"DATA\x01\0\0\0z"[..]),
        };
        assert!(message_line(1, &wrte, conv).ends_with("WRTE len=9 payload=DATA....z"));
    }
}
