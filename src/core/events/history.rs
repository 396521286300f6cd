//=========================================================================
// Event History
//=========================================================================
//
// Append-only log of emitted events, indexed by the position at which
// they were emitted.
//
// Architecture:
//   EventDispatcher::emit() → record(stage, event, args)
//                                   ↓
//            entries: Vec<HistoryEntry>  +  index: "S.s.r" → [entry idx]
//                                   ↓
//   remit(filter) → select(filter) → re-emit in original order
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

//=== Internal Dependencies ===============================================

use crate::core::stage::GameStage;

//=== HistoryEntry ========================================================

/// One recorded emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub stage: GameStage,
    pub event: String,
    pub args: Vec<Value>,
}

//=== RemitFilter =========================================================

/// Selects history entries for replay.
///
/// `stage: None` means the dispatcher's current position. `discard` wins
/// over `keep` when an event is listed in both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemitFilter {
    pub stage: Option<GameStage>,
    pub discard: Vec<String>,
    pub keep: Vec<String>,
}

impl RemitFilter {
    pub fn for_stage(stage: GameStage) -> Self {
        Self {
            stage: Some(stage),
            ..Self::default()
        }
    }

    pub fn discard<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.discard.extend(events.into_iter().map(Into::into));
        self
    }

    pub fn keep<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keep.extend(events.into_iter().map(Into::into));
        self
    }

    fn accepts(&self, event: &str) -> bool {
        if self.discard.iter().any(|d| d == event) {
            return false;
        }
        self.keep.is_empty() || self.keep.iter().any(|k| k == event)
    }
}

//=== EventHistory ========================================================

#[derive(Debug, Clone, Default)]
pub struct EventHistory {
    entries: Vec<HistoryEntry>,
    index: HashMap<String, Vec<usize>>,
}

impl EventHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: GameStage, event: &str, args: &[Value]) {
        let idx = self.entries.len();
        self.index
            .entry(stage.to_hash(GameStage::FULL_HASH))
            .or_default()
            .push(idx);
        self.entries.push(HistoryEntry {
            stage,
            event: event.to_string(),
            args: args.to_vec(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Entries recorded at exactly `stage`, oldest first.
    pub fn at_stage(&self, stage: &GameStage) -> Vec<&HistoryEntry> {
        self.index
            .get(&stage.to_hash(GameStage::FULL_HASH))
            .map(|ids| ids.iter().map(|&i| &self.entries[i]).collect())
            .unwrap_or_default()
    }

    /// Entries at `stage` accepted by the filter's event lists, cloned for
    /// replay.
    pub fn select(&self, stage: &GameStage, filter: &RemitFilter) -> Vec<HistoryEntry> {
        self.at_stage(stage)
            .into_iter()
            .filter(|e| filter.accepts(&e.event))
            .cloned()
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> EventHistory {
        let mut h = EventHistory::new();
        h.record(GameStage::new(1, 1, 1), "A", &[json!(1)]);
        h.record(GameStage::new(1, 1, 1), "B", &[]);
        h.record(GameStage::new(2, 1, 1), "A", &[json!(2)]);
        h.record(GameStage::new(1, 1, 1), "C", &[]);
        h
    }

    #[test]
    fn indexes_by_stage_in_emission_order() {
        let h = sample();
        let events: Vec<&str> = h
            .at_stage(&GameStage::new(1, 1, 1))
            .iter()
            .map(|e| e.event.as_str())
            .collect();
        assert_eq!(events, vec!["A", "B", "C"]);
        assert_eq!(h.len(), 4);
        assert!(h.at_stage(&GameStage::new(3, 1, 1)).is_empty());
    }

    #[test]
    fn select_applies_discard_then_keep() {
        let h = sample();
        let stage = GameStage::new(1, 1, 1);

        let f = RemitFilter::for_stage(stage).discard(["B"]);
        let picked: Vec<String> = h.select(&stage, &f).into_iter().map(|e| e.event).collect();
        assert_eq!(picked, vec!["A", "C"]);

        let f = RemitFilter::for_stage(stage).keep(["B", "C"]).discard(["C"]);
        let picked: Vec<String> = h.select(&stage, &f).into_iter().map(|e| e.event).collect();
        assert_eq!(picked, vec!["B"]);
    }

    #[test]
    fn clear_empties_log_and_index() {
        let mut h = sample();
        h.clear();
        assert!(h.is_empty());
        assert!(h.at_stage(&GameStage::new(1, 1, 1)).is_empty());
    }
}
