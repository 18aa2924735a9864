///! # CLI - Commitlog Interactive Shell
///!
///! A REPL-style command-line interface over one segmented commit log.
///! Reads commands from stdin, runs them against the log, and prints
///! results to stdout. Works interactively or scripted (pipe commands via
///! stdin). Diagnostics go to stderr through `tracing`.
///!
///! ## Commands
///!
///! ```text
///! APPEND text        Append `text` as a record, prints "OK <offset>"
///! READ offset        Print the record stored at `offset`
///! SCAN [offset]      Print every record from `offset` (default: lowest)
///! STATS              Print log debug info
///! EXIT / QUIT        Close the log and shut down
///! ```
///!
///! ## Configuration
///!
///! All settings are controlled via environment variables:
///!
///! ```text
///! COMMITLOG_DIR              Log directory             (default: "data/log")
///! COMMITLOG_MAX_STORE_BYTES  Store size per segment    (default: 1024)
///! COMMITLOG_MAX_INDEX_BYTES  Index size per segment    (default: 1024)
///! COMMITLOG_INITIAL_OFFSET   First offset of a new log (default: 0)
///! RUST_LOG                   Log filter for stderr     (default: "warn")
///! ```
///!
///! ## Example
///!
///! ```text
///! $ cargo run -p cli
///! commitlog started (dir=data/log, segments=1, next_offset=0, max_store=1024, max_index=1024)
///! > APPEND hello world
///! OK 0
///! > READ 0
///! hello world
///! > READ 7
///! ERR read failed: offset 7 out of range
///! > EXIT
///! bye
///! ```

mod shell;

use anyhow::{Context, Result};
use commitlog::Log;
use config::LogConfig;
use shell::Outcome;
use std::io::{self, BufRead, Write};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const ENV_DIR: &str = "COMMITLOG_DIR";
const DEFAULT_DIR: &str = "data/log";

fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    setup_tracing();

    let dir = std::env::var(ENV_DIR).unwrap_or_else(|_| DEFAULT_DIR.to_string());
    let config = LogConfig::from_env()?;
    let log = Log::open(&dir, config).with_context(|| format!("opening log in {}", dir))?;
    info!(dir = %dir, next_offset = log.next_offset()?, "shell started");

    println!(
        "commitlog started (dir={}, segments={}, next_offset={}, max_store={}, max_index={})",
        dir,
        log.segment_count()?,
        log.next_offset()?,
        log.config().max_store_bytes,
        log.config().max_index_bytes
    );
    println!("Commands: APPEND text | READ offset | SCAN [offset] | STATS | EXIT");

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    write!(out, "> ")?;
    out.flush()?;

    for line in stdin.lock().lines() {
        let line = line?;
        if shell::execute(&log, &line, &mut out)? == Outcome::Exit {
            break;
        }
        write!(out, "> ")?;
        out.flush()?;
    }

    let next_offset = log.next_offset()?;
    log.close().context("closing log")?;
    info!(dir = %dir, next_offset, "shell stopped");
    Ok(())
}
