//! Player count tracking from console output.
//!
//! The game reports joins and leaves on its console, and answers the `list`
//! command with an exact count. The tracker folds those lines into a running
//! [`PlayerInfo`].

use crate::server::PlayerInfo;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static LIST_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[Tt]here are (\d+) of a max(?: of)? (\d+) players online").expect("valid regex")
});
static JOIN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\]:\s+(\w+) joined the game").expect("valid regex"));
static LEAVE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\]:\s+(\w+) left the game").expect("valid regex"));

/// Running player count for one process run
#[derive(Debug, Clone)]
pub struct PlayerTracker {
    online: HashSet<String>,
    current: u32,
    max: u32,
}

impl PlayerTracker {
    /// Start with nobody online and the configured limit
    pub fn new(max: u32) -> Self {
        Self {
            online: HashSet::new(),
            current: 0,
            max,
        }
    }

    /// Fold one console line in. Returns true if the snapshot changed.
    pub fn observe(&mut self, line: &str) -> bool {
        let before = self.snapshot();

        if let Some(caps) = LIST_PATTERN.captures(line) {
            // An exact count supersedes whatever was derived from joins
            self.current = caps[1].parse().unwrap_or(self.current);
            self.max = caps[2].parse().unwrap_or(self.max);
            self.online.clear();
        } else if let Some(caps) = JOIN_PATTERN.captures(line) {
            if self.online.insert(caps[1].to_string()) {
                self.current = self.current.saturating_add(1);
            }
        } else if let Some(caps) = LEAVE_PATTERN.captures(line) {
            let known = self.online.remove(&caps[1]);
            if known || self.current as usize > self.online.len() {
                self.current = self.current.saturating_sub(1);
            }
        }

        self.snapshot() != before
    }

    /// Current count
    pub fn snapshot(&self) -> PlayerInfo {
        PlayerInfo {
            current: self.current,
            max: self.max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_and_leave() {
        let mut tracker = PlayerTracker::new(20);

        assert!(tracker.observe("[12:00:01] [Server thread/INFO]: Steve joined the game"));
        assert!(tracker.observe("[12:00:02] [Server thread/INFO]: Alex joined the game"));
        assert!(!tracker.observe("[12:00:03] [Server thread/INFO]: Steve joined the game"));
        assert_eq!(tracker.snapshot(), PlayerInfo { current: 2, max: 20 });

        assert!(tracker.observe("[12:05:00 INFO]: Steve left the game"));
        assert_eq!(tracker.snapshot().current, 1);
    }

    #[test]
    fn test_list_output_sets_exact_count() {
        let mut tracker = PlayerTracker::new(20);
        assert!(tracker.observe(
            "[12:00:00] [Server thread/INFO]: There are 3 of a max of 10 players online: a, b, c"
        ));
        assert_eq!(tracker.snapshot(), PlayerInfo { current: 3, max: 10 });

        // Someone who joined before the listing leaves
        assert!(tracker.observe("[12:01:00] [Server thread/INFO]: Bob left the game"));
        assert_eq!(tracker.snapshot().current, 2);
    }

    #[test]
    fn test_unrelated_lines_do_not_change_count() {
        let mut tracker = PlayerTracker::new(5);
        assert!(!tracker.observe("[12:00:00] [Server thread/INFO]: Preparing spawn area: 83%"));
        assert!(!tracker.observe("[12:00:00] [Server thread/INFO]: Nobody left the game"));
        assert_eq!(tracker.snapshot(), PlayerInfo { current: 0, max: 5 });
    }
}
