//! adbsift — recover files pulled with `adb pull` from a packet capture.

use anyhow::{Context, Result};

use adbsift::args::{parse_args, print_usage, Command};
use adbsift::cmd::{dump::cmd_dump, extract::cmd_extract};
use adbsift::source::read_capture;
use adbsift_core::SiftConfig;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {e:#}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };
    if options.command == Command::Help {
        print_usage();
        return Ok(());
    }

    let mut config = match &options.config {
        Some(path) => SiftConfig::load_from(path)?,
        None => SiftConfig::load()?,
    };
    options.apply(&mut config);

    let Some(conversation) = config.capture.conversation() else {
        eprintln!("Error: --client-port is required");
        eprintln!();
        print_usage();
        std::process::exit(1);
    };
    tracing::info!(
        server_port = conversation.server_port,
        client_port = conversation.client_port,
        "adbsift starting"
    );

    let path = options.capture.context("missing capture file")?;
    let file = read_capture(&path)?;

    match options.command {
        Command::Dump => cmd_dump(&file, &config, conversation),
        Command::Extract | Command::Help => {
            let cwd = std::env::current_dir().context("cannot determine working directory")?;
            let out_dir = config.output.resolve_dir(&cwd, conversation);
            let summary = cmd_extract(file, &config, conversation, out_dir)?;
            if !summary.is_clean() {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
