//! Per-call sliding windows of recent transcript snippets.

use std::collections::{HashMap, VecDeque};

/// Bounded most-recent-N snippet history per call, used as classification
/// context. A call's window is discarded when its summary event arrives.
#[derive(Debug)]
pub struct ContextWindows {
    capacity: usize,
    windows: HashMap<String, VecDeque<String>>,
}

impl ContextWindows {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            windows: HashMap::new(),
        }
    }

    /// Returns the call's snippets oldest-to-newest.
    pub fn snapshot(&self, call_sid: &str) -> Vec<String> {
        self.windows
            .get(call_sid)
            .map(|w| w.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Appends a snippet, dropping the oldest once the window is full.
    pub fn push(&mut self, call_sid: &str, snippet: String) {
        let window = self.windows.entry(call_sid.to_string()).or_default();
        if window.len() == self.capacity {
            window.pop_front();
        }
        window.push_back(snippet);
    }

    /// Discards the call's entire window.
    pub fn clear(&mut self, call_sid: &str) {
        self.windows.remove(call_sid);
    }
}
