//! Short-horizon suppression of repeated final-transcript events.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use switchboard_types::TranscriptionPayload;

/// TTL-bounded set of recently seen final transcripts.
///
/// Keys are case-folded, whitespace-collapsed transcript text. Entries live
/// in an insertion-ordered queue; each check lazily sweeps expired entries
/// from the front against a monotonic clock, so no background task is
/// needed.
#[derive(Debug)]
pub struct DedupCache {
    ttl: Duration,
    entries: VecDeque<(Instant, String)>,
    keys: HashSet<String>,
}

impl DedupCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: VecDeque::new(),
            keys: HashSet::new(),
        }
    }

    /// Returns `true` if this payload repeats a recently accepted final
    /// transcript (the caller drops it); otherwise records it and returns
    /// `false`.
    ///
    /// Only content events whose `Final` flag is not explicitly false are
    /// subject to dedup; everything else is always novel.
    pub fn is_duplicate(&mut self, payload: &TranscriptionPayload) -> bool {
        self.is_duplicate_at(Instant::now(), payload)
    }

    fn sweep(&mut self, now: Instant) {
        while let Some((inserted, _)) = self.entries.front() {
            if now.duration_since(*inserted) <= self.ttl {
                break;
            }
            if let Some((_, key)) = self.entries.pop_front() {
                self.keys.remove(&key);
            }
        }
    }

    pub(crate) fn is_duplicate_at(
        &mut self,
        now: Instant,
        payload: &TranscriptionPayload,
    ) -> bool {
        if !payload.is_content() || !payload.is_final() {
            return false;
        }

        let key = normalize_key(&payload.transcript());
        if key.is_empty() {
            return false;
        }

        self.sweep(now);

        if self.keys.contains(&key) {
            return true;
        }

        self.entries.push_back((now, key.clone()));
        self.keys.insert(key);
        false
    }
}

/// Case-folds and collapses all whitespace runs to single spaces.
fn normalize_key(transcript: &str) -> String {
    transcript
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
