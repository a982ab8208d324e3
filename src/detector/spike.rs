//! Keyword spike detection
//!
//! `evaluate` is a pure function of one batch: no cross-call state, so two
//! calls over the same input always produce the same decision. Matching is
//! case-insensitive substring containment, not tokenized word matching —
//! "WOWed" counts toward "WOW". That is the observed production behavior and
//! is preserved literally.

use crate::types::ChatEvent;
use serde::Serialize;
use std::collections::HashMap;

/// Per-batch keyword occurrence window. Reset (dropped) after the trigger
/// decision for its batch is produced.
#[derive(Debug)]
pub struct KeywordWindow {
    counts: HashMap<String, u64>,
    window_start: u64,
    window_end: u64,
    total_hits: u64,
}

impl KeywordWindow {
    fn new(events: &[ChatEvent]) -> Self {
        Self {
            counts: HashMap::new(),
            window_start: events.first().map(|e| e.received_at).unwrap_or(0),
            window_end: events.last().map(|e| e.received_at).unwrap_or(0),
            total_hits: 0,
        }
    }

    /// Invariant: `total_hits == counts.values().sum()` always.
    fn record(&mut self, keyword: &str) {
        *self.counts.entry(keyword.to_string()).or_insert(0) += 1;
        self.total_hits += 1;
    }

    fn into_decision(self, threshold: u64, batch_id: u64) -> TriggerDecision {
        TriggerDecision {
            triggered: self.total_hits >= threshold,
            total_hits: self.total_hits,
            counts: self.counts,
            window_start: self.window_start,
            window_end: self.window_end,
            batch_id,
        }
    }
}

/// Decision produced once per evaluated batch; never retried or merged with
/// another decision.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerDecision {
    pub triggered: bool,
    pub counts: HashMap<String, u64>,
    pub total_hits: u64,
    pub window_start: u64,
    pub window_end: u64,
    pub batch_id: u64,
}

/// Evaluates batches of chat events against a configured keyword set.
#[derive(Debug, Clone)]
pub struct KeywordSpikeDetector {
    /// (display form, lowercase form) pairs; counts are keyed by the display
    /// form so operators see the keyword as they configured it
    keywords: Vec<(String, String)>,
    threshold: u64,
}

impl KeywordSpikeDetector {
    pub fn new(keywords: &[String], threshold: u64) -> Self {
        Self {
            keywords: keywords
                .iter()
                .map(|k| (k.clone(), k.to_lowercase()))
                .collect(),
            threshold,
        }
    }

    /// Fold one ordered batch into a keyword window and decide. A single
    /// message containing several keywords increments each matching counter.
    pub fn evaluate(&self, events: &[ChatEvent], batch_id: u64) -> TriggerDecision {
        let mut window = KeywordWindow::new(events);

        for event in events {
            let message = event.message.to_lowercase();
            for (display, lowered) in &self.keywords {
                if message.contains(lowered.as_str()) {
                    window.record(display);
                }
            }
        }

        window.into_decision(self.threshold, batch_id)
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }
}
