//! Console output plumbing: bounded line reads from the child's pipes and the
//! `mcs.log` file kept in every server directory.
//!
//! The log file holds one line per console line, without stream tags, and
//! outlives the manager process. A new handle seeds its in-memory ring from
//! the file's tail.

use futures_lite::io::{AsyncBufRead, AsyncBufReadExt};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Name of the console log inside a server directory
pub const CONSOLE_LOG_FILE: &str = "mcs.log";

/// Longest console line kept in one piece. Longer output is split.
pub const MAX_LINE_BYTES: usize = 4096;

/// Path of the console log for a server directory
pub fn log_path(dir: &Path) -> PathBuf {
    dir.join(CONSOLE_LOG_FILE)
}

/// Read up to and including the next `\n`, but never more than
/// [`MAX_LINE_BYTES`] bytes. Returns 0 at end of stream.
pub async fn read_line_capped<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(buf.len());
        }

        let room = MAX_LINE_BYTES - buf.len();
        let (take, done) = match available.iter().position(|&b| b == b'\n') {
            Some(pos) if pos < room => (pos + 1, true),
            _ => (available.len().min(room), available.len() >= room),
        };
        buf.extend_from_slice(&available[..take]);
        reader.consume(take);

        if done {
            return Ok(buf.len());
        }
    }
}

/// Append-only writer for `mcs.log`
#[derive(Debug)]
pub struct ConsoleLog {
    file: File,
}

impl ConsoleLog {
    /// Open (or create) the console log of a server directory
    pub fn open(dir: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path(dir))?;
        Ok(Self { file })
    }

    /// Append one line
    pub fn append(&mut self, line: &str) -> io::Result<()> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        self.file.write_all(&data)
    }
}

/// The last `max_lines` lines of the console log, oldest first. A missing
/// file reads as empty.
pub fn read_tail(dir: &Path, max_lines: usize) -> io::Result<Vec<String>> {
    if dir.as_os_str().is_empty() || max_lines == 0 {
        return Ok(Vec::new());
    }
    let mut file = match File::open(log_path(dir)) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    // Lines are never longer than MAX_LINE_BYTES, so this window holds them all
    let len = file.metadata()?.len();
    let window = (max_lines as u64).saturating_mul(MAX_LINE_BYTES as u64 + 1);
    let start = len.saturating_sub(window);
    file.seek(SeekFrom::Start(start))?;

    let mut raw = Vec::new();
    file.read_to_end(&mut raw)?;
    let text = String::from_utf8_lossy(&raw);

    let mut lines: Vec<&str> = text.lines().collect();
    if start > 0 && !lines.is_empty() {
        // First line is likely cut in the middle
        lines.remove(0);
    }
    let skip = lines.len().saturating_sub(max_lines);
    Ok(lines[skip..].iter().map(|l| l.to_string()).collect())
}
