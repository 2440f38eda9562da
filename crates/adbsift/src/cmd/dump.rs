//! `adbsift dump`: show what each pipeline stage sees.

use anyhow::Result;

use adbsift_core::wire::command;
use adbsift_core::{capture, framing, stream, Conversation, Framer, SiftConfig, Validation};

use crate::display::{banner, message_line, run_line};
use crate::CaptureFile;

pub fn cmd_dump(file: &CaptureFile, config: &SiftConfig, conversation: Conversation) -> Result<()> {
    let runs: Vec<_> = stream::byte_runs(capture::segments(
        file.link,
        file.frames.iter().cloned(),
        conversation,
    ))
    .collect();

    println!("{}", banner("Glued Packets"));
    for (i, run) in runs.iter().enumerate() {
        println!("{}", run_line(i, run, conversation));
    }

    let framer = Framer::new(Validation::from(&config.framing));
    let messages: Vec<_> = framing::messages(runs, framer).collect();

    println!();
    println!("{}", banner("ADB Packets"));
    for (i, message) in messages.iter().enumerate() {
        println!("{}", message_line(i, message, conversation));
    }

    println!();
    println!("{}", banner("WRTE Packets"));
    for (i, message) in messages
        .iter()
        .filter(|m| m.message.command() == command::WRTE)
        .enumerate()
    {
        println!("{}", message_line(i, message, conversation));
    }

    Ok(())
}
