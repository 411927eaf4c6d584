// Console capture shim: the only output channel of an in-process sandbox
use std::fmt;
use std::sync::{Arc, Mutex};

/// Upper bounds on what one run may print
pub const MAX_CONSOLE_LINES: usize = 1000;
pub const MAX_LINE_BYTES: usize = 4096;

const TRUNCATION_MARKER: &str = "[console output truncated]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    Log,
    Info,
    Warn,
    Error,
    Debug,
}

impl ConsoleLevel {
    /// Unknown levels from the sandbox are treated as plain logs
    pub fn parse(level: &str) -> Self {
        match level {
            "info" => ConsoleLevel::Info,
            "warn" => ConsoleLevel::Warn,
            "error" => ConsoleLevel::Error,
            "debug" => ConsoleLevel::Debug,
            _ => ConsoleLevel::Log,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleEntry {
    pub level: ConsoleLevel,
    pub message: String,
}

impl fmt::Display for ConsoleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            ConsoleLevel::Log | ConsoleLevel::Info | ConsoleLevel::Debug => f.write_str(&self.message),
            ConsoleLevel::Warn => write!(f, "[warn] {}", self.message),
            ConsoleLevel::Error => write!(f, "[error] {}", self.message),
        }
    }
}

#[derive(Debug, Default)]
struct Buffer {
    entries: Vec<ConsoleEntry>,
    /// Lines accepted over the whole run, drained or not
    recorded: usize,
    truncated: bool,
}

/// Buffer shared between the host and the callback injected into a sandbox.
///
/// Owned by one run. `drain` empties it between tests so output never leaks
/// from one test into the next.
#[derive(Debug, Clone, Default)]
pub struct ConsoleCapture {
    buffer: Arc<Mutex<Buffer>>,
}

impl ConsoleCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one line; called from inside the sandbox
    pub fn record(&self, level: ConsoleLevel, message: &str) {
        let Ok(mut buffer) = self.buffer.lock() else {
            return;
        };

        if buffer.recorded >= MAX_CONSOLE_LINES {
            if !buffer.truncated {
                buffer.truncated = true;
                buffer.entries.push(ConsoleEntry {
                    level: ConsoleLevel::Warn,
                    message: TRUNCATION_MARKER.to_string(),
                });
            }
            return;
        }

        buffer.recorded += 1;
        buffer.entries.push(ConsoleEntry {
            level,
            message: truncate_line(message),
        });
    }

    /// Take everything captured since the last drain
    pub fn drain(&self) -> Vec<ConsoleEntry> {
        match self.buffer.lock() {
            Ok(mut buffer) => std::mem::take(&mut buffer.entries),
            Err(_) => Vec::new(),
        }
    }

    /// Drain and render as report lines
    pub fn drain_lines(&self) -> Vec<String> {
        self.drain().iter().map(ToString::to_string).collect()
    }
}

fn truncate_line(message: &str) -> String {
    if message.len() <= MAX_LINE_BYTES {
        return message.to_string();
    }

    let mut end = MAX_LINE_BYTES;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &message[..end])
}
