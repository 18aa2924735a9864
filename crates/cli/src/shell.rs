/// Command parsing and dispatch for the interactive shell.
///
/// Kept apart from `main` so the whole command set can be driven against a
/// temporary log and an in-memory writer.
use commitlog::Log;
use std::io::{self, Write};

/// Whether the REPL should keep reading after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Exit,
}

/// Runs one input line against `log`, writing the response to `out`.
///
/// Storage errors are reported to `out` as `ERR ...` lines; only a failing
/// writer is returned as an error.
pub fn execute<W: Write>(log: &Log, line: &str, out: &mut W) -> io::Result<Outcome> {
    let line = line.trim();
    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim_start()),
        None => (line, ""),
    };
    if cmd.is_empty() {
        return Ok(Outcome::Continue);
    }

    match cmd.to_uppercase().as_str() {
        "APPEND" => {
            if rest.is_empty() {
                writeln!(out, "ERR usage: APPEND text")?;
            } else {
                match log.append(rest.as_bytes()) {
                    Ok(offset) => writeln!(out, "OK {}", offset)?,
                    Err(e) => writeln!(out, "ERR append failed: {}", e)?,
                }
            }
        }
        "READ" => match parse_offset(rest) {
            Some(offset) => match log.read(offset) {
                Ok(record) => writeln!(out, "{}", String::from_utf8_lossy(&record))?,
                Err(e) => writeln!(out, "ERR read failed: {}", e)?,
            },
            None => writeln!(out, "ERR usage: READ offset")?,
        },
        "SCAN" => {
            let start = if rest.is_empty() {
                log.lowest_offset().ok()
            } else {
                parse_offset(rest)
            };
            match start {
                Some(start) => scan(log, start, out)?,
                None => writeln!(out, "ERR usage: SCAN [offset]")?,
            }
        }
        "STATS" => writeln!(out, "{:?}", log)?,
        "EXIT" | "QUIT" => {
            writeln!(out, "bye")?;
            return Ok(Outcome::Exit);
        }
        other => writeln!(out, "unknown command: {}", other)?,
    }

    Ok(Outcome::Continue)
}

/// Parses a single decimal offset; anything else (signs, extra words,
/// overflow) is rejected before the log is touched.
fn parse_offset(arg: &str) -> Option<u64> {
    let mut words = arg.split_whitespace();
    let first = words.next()?;
    if words.next().is_some() || !first.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    first.parse().ok()
}

fn scan<W: Write>(log: &Log, start: u64, out: &mut W) -> io::Result<()> {
    let mut count = 0usize;
    for item in log.iter_from(start) {
        match item {
            Ok((offset, record)) => {
                writeln!(out, "{} -> {}", offset, String::from_utf8_lossy(&record))?;
                count += 1;
            }
            Err(e) => {
                writeln!(out, "ERR scan failed: {}", e)?;
                return Ok(());
            }
        }
    }
    if count == 0 {
        writeln!(out, "(empty)")
    } else {
        writeln!(out, "({} records)", count)
    }
}
