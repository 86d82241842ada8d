use crate::events::LogLine;
use std::collections::VecDeque;

/// Default number of lines kept per server
pub const DEFAULT_LOG_CAPACITY: usize = 200;

/// Bounded buffer of the most recent console lines of one server.
///
/// Appending to a full ring evicts the oldest line. Snapshots are returned in
/// arrival order.
#[derive(Debug, Clone)]
pub struct LogRing {
    lines: VecDeque<LogLine>,
    capacity: usize,
}

impl LogRing {
    /// Create an empty ring holding at most `capacity` lines (minimum 1)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a line, evicting the oldest one when full
    pub fn append(&mut self, line: LogLine) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// Copy of the buffered lines, oldest first
    pub fn snapshot(&self) -> Vec<LogLine> {
        self.lines.iter().cloned().collect()
    }

    /// Buffered lines as newline separated text
    pub fn render(&self) -> String {
        let mut text = String::new();
        for entry in &self.lines {
            text.push_str(&entry.line);
            text.push('\n');
        }
        text
    }

    /// Number of buffered lines
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the ring is empty
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Maximum number of lines
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for LogRing {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}
