//! Command-line parsing.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use adbsift_core::config::DEFAULT_SERVER_PORT;
use adbsift_core::SiftConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Extract,
    Dump,
    Help,
}

/// Everything given on the command line. Unset options fall back to config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub command: Command,
    pub capture: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub server_port: Option<u16>,
    pub client_port: Option<u16>,
    pub output_dir: Option<PathBuf>,
    pub validate_checksum: bool,
    pub validate_magic: bool,
    pub no_manifest: bool,
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str> {
    args.get(i)
        .map(String::as_str)
        .with_context(|| format!("{flag} requires a value"))
}

fn port(args: &[String], i: usize, flag: &str) -> Result<u16> {
    value(args, i, flag)?
        .parse()
        .with_context(|| format!("{flag} must be a port number"))
}

/// Parse arguments, program name excluded.
pub fn parse_args(args: &[String]) -> Result<Options> {
    let mut options = Options {
        command: Command::Extract,
        capture: None,
        config: None,
        server_port: None,
        client_port: None,
        output_dir: None,
        validate_checksum: false,
        validate_magic: false,
        no_manifest: false,
    };

    let mut positional: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--server-port" => {
                i += 1;
                options.server_port = Some(port(args, i, "--server-port")?);
            }
            "--client-port" => {
                i += 1;
                options.client_port = Some(port(args, i, "--client-port")?);
            }
            "--output-dir" => {
                i += 1;
                options.output_dir = Some(PathBuf::from(value(args, i, "--output-dir")?));
            }
            "--config" => {
                i += 1;
                options.config = Some(PathBuf::from(value(args, i, "--config")?));
            }
            "--validate-checksum" => options.validate_checksum = true,
            "--validate-magic" => options.validate_magic = true,
            "--no-manifest" => options.no_manifest = true,
            "help" | "--help" | "-h" => options.command = Command::Help,
            flag if flag.starts_with("--") => bail!("unknown option: {flag}"),
            other => positional.push(other),
        }
        i += 1;
    }

    if options.command == Command::Help {
        return Ok(options);
    }

    let path = match positional.as_slice() {
        ["extract", path] => path,
        ["dump", path] => {
            options.command = Command::Dump;
            path
        }
        [path] if *path != "extract" && *path != "dump" => path,
        [] | ["extract"] | ["dump"] => bail!("missing capture file"),
        other => bail!("unexpected arguments: {}", other.join(" ")),
    };
    options.capture = Some(PathBuf::from(path));
    Ok(options)
}

impl Options {
    /// Layer the command-line options over `config`.
    pub fn apply(&self, config: &mut SiftConfig) {
        if let Some(p) = self.server_port {
            config.capture.server_port = p;
        }
        if let Some(p) = self.client_port {
            config.capture.client_port = p;
        }
        if let Some(dir) = &self.output_dir {
            config.output.dir = Some(dir.clone());
        }
        if self.validate_checksum {
            config.framing.validate_checksum = true;
        }
        if self.validate_magic {
            config.framing.validate_magic = true;
        }
        if self.no_manifest {
            config.output.manifest = false;
        }
    }
}

pub fn print_usage() {
    println!("Usage: adbsift [options] [extract|dump] <capture.pcap>");
    println!();
    println!("Commands:");
    println!("  extract       Recover files pulled over adb sync (default)");
    println!("  dump          Print glued TCP runs and decoded adb messages");
    println!();
    println!("Options:");
    println!("  --server-port <port>   Port the adb server listened on (default: {DEFAULT_SERVER_PORT})");
    println!("  --client-port <port>   Port the client sent commands from (required)");
    println!("  --output-dir <dir>     Where to write files (default: ./extracted-client<C>-server<S>)");
    println!("  --validate-checksum    Drop messages whose checksum does not match");
    println!("  --validate-magic       Stop framing a run at a header with a bad magic");
    println!("  --no-manifest          Do not write manifest.json");
    println!("  --config <file>        Config file (default: $ADBSIFT_CONFIG or ~/.config/adbsift/config.toml)");
}
