//! Tool call id generation and correlation.
//!
//! Google never assigns ids to function calls and correlates results by function
//! name. The tracker hands out ids for those calls and pairs results with the
//! oldest outstanding call of the same name.

use std::collections::{HashMap, VecDeque};

use jiff::Timestamp;
use rand::{Rng, distr::Alphanumeric};

const MAX_NAME_LENGTH: usize = 40;
const RANDOM_SUFFIX_LENGTH: usize = 6;

/// A generated id and what it was generated for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallEntry {
    pub id: String,
    pub function_name: String,
    /// Per-name counter, starting at 1.
    pub sequence: u64,
    pub timestamp: Timestamp,
}

/// Per-conversation id factory and FIFO-by-name correlator.
///
/// Never share a tracker between conversations.
#[derive(Debug, Default)]
pub struct ToolCallTracker {
    by_id: HashMap<String, ToolCallEntry>,
    by_name: HashMap<String, VecDeque<String>>,
    sequences: HashMap<String, u64>,
}

impl ToolCallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and registers a unique id for a call to `function_name`.
    ///
    /// The id only contains `[A-Za-z0-9_-]`, whatever the function name looks like.
    pub fn generate_id(&mut self, function_name: &str) -> String {
        let sequence = self.sequences.entry(function_name.to_string()).or_insert(0);
        *sequence += 1;
        let sequence = *sequence;

        let timestamp = Timestamp::now();

        let suffix: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(RANDOM_SUFFIX_LENGTH)
            .map(char::from)
            .collect();

        let id = format!(
            "call_{}_{sequence}_{}_{suffix}",
            sanitize_name(function_name),
            timestamp.as_millisecond()
        );

        log::debug!("Generated tool call id {id} for function '{function_name}'");

        self.by_name
            .entry(function_name.to_string())
            .or_default()
            .push_back(id.clone());

        self.by_id.insert(
            id.clone(),
            ToolCallEntry {
                id: id.clone(),
                function_name: function_name.to_string(),
                sequence,
                timestamp,
            },
        );

        id
    }

    /// The oldest registered and not yet used id for `function_name`.
    ///
    /// The entry stays registered until [`ToolCallTracker::mark_used`] is called.
    pub fn correlate(&self, function_name: &str) -> Option<&str> {
        self.by_name
            .get(function_name)
            .and_then(|ids| ids.front())
            .map(String::as_str)
    }

    /// Removes `id` from the tracker. Returns false when it was not registered.
    pub fn mark_used(&mut self, id: &str) -> bool {
        let Some(entry) = self.by_id.remove(id) else {
            return false;
        };

        if let Some(ids) = self.by_name.get_mut(&entry.function_name) {
            ids.retain(|pending| pending != id);

            if ids.is_empty() {
                self.by_name.remove(&entry.function_name);
            }
        }

        true
    }

    pub fn has_pending_calls(&self) -> bool {
        !self.by_id.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.by_id.len()
    }

    pub fn entry(&self, id: &str) -> Option<&ToolCallEntry> {
        self.by_id.get(id)
    }

    /// Forgets every id and restarts the sequences.
    pub fn reset(&mut self) {
        self.by_id.clear();
        self.by_name.clear();
        self.sequences.clear();
    }
}

fn sanitize_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .take(MAX_NAME_LENGTH)
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();

    if sanitized.is_empty() {
        "fn".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_valid_id(id: &str) -> bool {
        !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }

    #[test]
    fn ids_are_unique_and_well_formed() {
        let mut tracker = ToolCallTracker::new();

        let first = tracker.generate_id("search");
        let second = tracker.generate_id("search");

        assert_ne!(first, second);
        assert!(first.starts_with("call_search_1_"));
        assert!(second.starts_with("call_search_2_"));
        assert!(is_valid_id(&first));
        assert_eq!(tracker.pending_count(), 2);
    }

    #[test]
    fn odd_names_are_sanitized() {
        let mut tracker = ToolCallTracker::new();

        let id = tracker.generate_id("weather.lookup/v2 (beta)");
        assert!(id.starts_with("call_weather_lookup_v2__beta__1_"));
        assert!(is_valid_id(&id));

        let long_name = "x".repeat(100);
        let id = tracker.generate_id(&long_name);
        assert!(id.starts_with(&format!("call_{}_1_", "x".repeat(40))));

        let id = tracker.generate_id("");
        assert!(id.starts_with("call_fn_1_"));
    }

    #[test]
    fn correlation_is_fifo_per_name() {
        let mut tracker = ToolCallTracker::new();

        let a = tracker.generate_id("search");
        let other = tracker.generate_id("fetch");
        let b = tracker.generate_id("search");

        assert_eq!(tracker.correlate("search"), Some(a.as_str()));
        assert_eq!(tracker.correlate("search"), Some(a.as_str()));

        assert!(tracker.mark_used(&a));
        assert_eq!(tracker.correlate("search"), Some(b.as_str()));

        assert!(tracker.mark_used(&b));
        assert_eq!(tracker.correlate("search"), None);
        assert_eq!(tracker.correlate("fetch"), Some(other.as_str()));
        assert_eq!(tracker.correlate("unknown"), None);
    }

    #[test]
    fn mark_used_is_idempotent() {
        let mut tracker = ToolCallTracker::new();
        let id = tracker.generate_id("search");

        assert!(tracker.mark_used(&id));
        assert!(!tracker.mark_used(&id));
        assert!(!tracker.mark_used("call_missing"));
        assert!(!tracker.has_pending_calls());
    }

    #[test]
    fn entry_exposes_metadata() {
        let mut tracker = ToolCallTracker::new();
        tracker.generate_id("search");
        let id = tracker.generate_id("search");

        let entry = tracker.entry(&id).unwrap();
        assert_eq!(entry.function_name, "search");
        assert_eq!(entry.sequence, 2);
    }

    #[test]
    fn reset_restarts_sequences() {
        let mut tracker = ToolCallTracker::new();
        tracker.generate_id("search");
        tracker.generate_id("search");

        tracker.reset();

        assert!(!tracker.has_pending_calls());
        assert!(tracker.generate_id("search").starts_with("call_search_1_"));
    }
}
