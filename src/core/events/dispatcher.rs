//=========================================================================
// Event Dispatcher
//=========================================================================
//
// Owns the four event scopes of a game session and the event history.
//
// Architecture:
//   emit(event, args)
//     ├─ history.record(current_stage, ..)   (when enabled, not replaying)
//     ├─ global.emit → game.emit → stage.emit → step.emit
//     └─ event == READY → run pending remit
//
// Scope lifetimes are driven by the stage engine:
//   step  : cleared on every step transition
//   stage : cleared on every stage transition and after the stage exit hook
//   game, global : cleared only on stop()
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::HashSet;

use log::{debug, warn};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumIter, IntoEnumIterator};

//=== Internal Dependencies ===============================================

use super::deferred::DeferredQueue;
use super::emit::EmitResult;
use super::error::EventError;
use super::history::{EventHistory, RemitFilter};
use super::scope::{EventScope, ListenerInfo, ListenerRef, SizeQuery};
use crate::core::stage::GameStage;

//=== Constants ===========================================================

/// Event signalling that the engine became ready; releases a pending remit.
pub const READY: &str = "READY";

//=== ScopeKind ===========================================================

/// The four scopes, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum ScopeKind {
    Global,
    Game,
    Stage,
    Step,
}

//=== RemitOutcome ========================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemitOutcome {
    /// Entries were re-emitted right away.
    Replayed(usize),
    /// The engine was not ready; replay waits for [`READY`].
    Deferred,
}

//=== EventDispatcher =====================================================

pub struct EventDispatcher {
    pub global: EventScope,
    pub game: EventScope,
    pub stage: EventScope,
    pub step: EventScope,
    history: EventHistory,
    record_history: bool,
    current_stage: GameStage,
    pending_remit: Option<RemitFilter>,
    replaying: bool,
    deferred: DeferredQueue,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            global: EventScope::new(ScopeKind::Global.as_ref()),
            game: EventScope::new(ScopeKind::Game.as_ref()),
            stage: EventScope::new(ScopeKind::Stage.as_ref()),
            step: EventScope::new(ScopeKind::Step.as_ref()),
            history: EventHistory::new(),
            record_history: false,
            current_stage: GameStage::NOT_STARTED,
            pending_remit: None,
            replaying: false,
            deferred: DeferredQueue::new(),
        }
    }

    //--- Scope Access -----------------------------------------------------

    pub fn scope(&self, kind: ScopeKind) -> &EventScope {
        match kind {
            ScopeKind::Global => &self.global,
            ScopeKind::Game => &self.game,
            ScopeKind::Stage => &self.stage,
            ScopeKind::Step => &self.step,
        }
    }

    pub fn scope_mut(&mut self, kind: ScopeKind) -> &mut EventScope {
        match kind {
            ScopeKind::Global => &mut self.global,
            ScopeKind::Game => &mut self.game,
            ScopeKind::Stage => &mut self.stage,
            ScopeKind::Step => &mut self.step,
        }
    }

    //--- Position ---------------------------------------------------------

    /// Position used to tag history entries.
    pub fn set_current_stage(&mut self, stage: GameStage) {
        self.current_stage = stage;
    }

    pub fn current_stage(&self) -> GameStage {
        self.current_stage
    }

    //--- Emission ---------------------------------------------------------

    /// Emits on every scope (global, game, stage, step) and merges results.
    pub fn emit(&mut self, event: &str, args: &[Value]) -> EmitResult {
        if self.record_history && !self.replaying {
            self.history.record(self.current_stage, event, args);
        }

        let mut result = EmitResult::new();
        for kind in ScopeKind::iter() {
            result.merge(self.scope_mut(kind).emit(event, args));
        }

        if event == READY && !self.replaying {
            if let Some(filter) = self.pending_remit.take() {
                debug!("EventDispatcher: engine ready, running pending remit");
                self.replay(&filter);
            }
        }

        result
    }

    /// Schedules a fan-out emission for the next [`EventDispatcher::run_deferred`].
    pub fn emit_async(&self, event: &str, args: Vec<Value>) {
        self.deferred.push(event, args);
    }

    /// Runs deferred emissions: the dispatcher queue first, then each
    /// scope's own queue. At most `max` per queue. Returns how many ran.
    pub fn run_deferred(&mut self, max: usize) -> usize {
        let pending = self.deferred.drain(max);
        let mut count = pending.len();
        for item in pending {
            self.emit(&item.event, &item.args);
        }
        for kind in ScopeKind::iter() {
            count += self.scope_mut(kind).run_deferred(max);
        }
        count
    }

    pub fn pending_deferred(&self) -> usize {
        self.deferred.len()
            + ScopeKind::iter()
                .map(|k| self.scope(k).pending_deferred())
                .sum::<usize>()
    }

    //--- Removal ----------------------------------------------------------

    /// Removes matching listeners from every scope.
    pub fn remove(&mut self, event: &str, target: Option<ListenerRef<'_>>) -> Result<Vec<ListenerInfo>, EventError> {
        if event.trim().is_empty() {
            return Err(EventError::InvalidArgument {
                method: "EventDispatcher.remove",
                reason: "event name must be a non-empty string",
                found: event.to_string(),
            });
        }

        let mut removed = Vec::new();
        for kind in ScopeKind::iter() {
            removed.extend(self.scope_mut(kind).remove_matching(event, target));
        }

        if removed.is_empty() {
            warn!("EventDispatcher.remove: no listener removed. Found: {} {:?}", event, target);
        }
        Ok(removed)
    }

    pub fn clear_scope(&mut self, kind: ScopeKind) {
        debug!("EventDispatcher: clearing '{}' scope", kind);
        self.scope_mut(kind).clear();
    }

    /// Clears every scope, the history and any pending remit.
    pub fn clear_all(&mut self) {
        for kind in ScopeKind::iter() {
            self.scope_mut(kind).clear();
        }
        self.deferred.clear();
        self.history.clear();
        self.pending_remit = None;
    }

    //--- Queries ----------------------------------------------------------

    pub fn size(&self, query: SizeQuery<'_>) -> usize {
        match query {
            SizeQuery::Events => ScopeKind::iter()
                .flat_map(|k| self.scope(k).event_names())
                .collect::<HashSet<_>>()
                .len(),
            other => ScopeKind::iter().map(|k| self.scope(k).size(other)).sum(),
        }
    }

    pub fn set_record_changes(&mut self, record: bool) {
        for kind in ScopeKind::iter() {
            self.scope_mut(kind).set_record_changes(record);
        }
    }

    //--- History ----------------------------------------------------------

    pub fn set_record_history(&mut self, record: bool) {
        self.record_history = record;
    }

    pub fn is_recording_history(&self) -> bool {
        self.record_history
    }

    pub fn history(&self) -> &EventHistory {
        &self.history
    }

    pub fn has_pending_remit(&self) -> bool {
        self.pending_remit.is_some()
    }

    /// Re-emits history entries matching `filter`.
    ///
    /// When `ready` is false the replay is stored and runs the next time
    /// [`READY`] is emitted. A later call replaces a stored replay.
    pub fn remit(&mut self, filter: RemitFilter, ready: bool) -> RemitOutcome {
        if self.history.is_empty() {
            warn!("EventDispatcher.remit: event history is empty. Found: recording {}", self.record_history);
            return RemitOutcome::Replayed(0);
        }

        if !ready {
            debug!("EventDispatcher.remit: engine not ready, waiting for {}", READY);
            self.pending_remit = Some(filter);
            return RemitOutcome::Deferred;
        }

        RemitOutcome::Replayed(self.replay(&filter))
    }

    fn replay(&mut self, filter: &RemitFilter) -> usize {
        let stage = filter.stage.unwrap_or(self.current_stage);
        let entries = self.history.select(&stage, filter);
        let count = entries.len();

        self.replaying = true;
        for entry in entries {
            self.emit(&entry.event, &entry.args);
        }
        self.replaying = false;

        debug!("EventDispatcher: re-emitted {} event(s) of {}", count, stage);
        count
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder(log: &Rc<RefCell<Vec<String>>>, tag: &'static str) -> impl FnMut(&[Value]) -> Option<Value> {
        let log = Rc::clone(log);
        move |_| {
            log.borrow_mut().push(tag.to_string());
            None
        }
    }

    //--- Fan-out ----------------------------------------------------------

    #[test]
    fn emit_visits_scopes_in_order() {
        let mut d = EventDispatcher::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        d.step.on("E", recorder(&log, "step"), None).unwrap();
        d.global.on("E", recorder(&log, "global"), None).unwrap();
        d.stage.on("E", recorder(&log, "stage"), None).unwrap();
        d.game.on("E", recorder(&log, "game"), None).unwrap();

        d.emit("E", &[]);
        assert_eq!(*log.borrow(), vec!["global", "game", "stage", "step"]);
    }

    #[test]
    fn emit_merges_values_across_scopes() {
        let mut d = EventDispatcher::new();
        d.game.on("E", |_| Some(json!(1)), None).unwrap();
        d.step.on("E", |_| Some(json!(2)), None).unwrap();

        let r = d.emit("E", &[]);
        assert_eq!(r.values(), &[json!(1), json!(2)]);

        d.step.off("E", None).unwrap();
        assert_eq!(d.emit("E", &[]).into_value(), Some(json!(1)));
    }

    #[test]
    fn remove_fans_out() {
        let mut d = EventDispatcher::new();
        d.game.on("E", |_| None, None).unwrap();
        d.stage.on("E", |_| None, None).unwrap();
        d.step.on("F", |_| None, None).unwrap();

        assert_eq!(d.remove("E", None).unwrap().len(), 2);
        assert_eq!(d.size(SizeQuery::Events), 1);
        assert!(d.remove("", None).is_err());
    }

    #[test]
    fn size_counts_distinct_events_across_scopes() {
        let mut d = EventDispatcher::new();
        d.game.on("E", |_| None, None).unwrap();
        d.step.on("E", |_| None, None).unwrap();
        d.step.on("F", |_| None, None).unwrap();

        assert_eq!(d.size(SizeQuery::Events), 2);
        assert_eq!(d.size(SizeQuery::Event("E")), 2);
        assert_eq!(d.size(SizeQuery::Listeners), 3);
    }

    #[test]
    fn clear_scope_leaves_others() {
        let mut d = EventDispatcher::new();
        d.game.on("E", |_| None, None).unwrap();
        d.step.on("E", |_| None, None).unwrap();

        d.clear_scope(ScopeKind::Step);
        assert_eq!(d.step.size(SizeQuery::Listeners), 0);
        assert_eq!(d.game.size(SizeQuery::Listeners), 1);
    }

    //--- Deferred ---------------------------------------------------------

    #[test]
    fn emit_async_waits_for_run_deferred() {
        let mut d = EventDispatcher::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        d.stage.on("E", recorder(&log, "hit"), None).unwrap();

        d.emit_async("E", vec![]);
        d.step.emit_async("E", vec![]);
        assert!(log.borrow().is_empty());
        assert_eq!(d.pending_deferred(), 2);

        assert_eq!(d.run_deferred(10), 2);
        // The step scope's own queue only reaches step listeners.
        assert_eq!(log.borrow().len(), 1);
    }

    //--- History & Remit --------------------------------------------------

    #[test]
    fn history_is_tagged_with_current_stage() {
        let mut d = EventDispatcher::new();
        d.set_record_history(true);
        d.set_current_stage(GameStage::new(1, 2, 1));
        d.emit("A", &[json!("x")]);

        let e = &d.history().entries()[0];
        assert_eq!(e.stage, GameStage::new(1, 2, 1));
        assert_eq!(e.args, vec![json!("x")]);
    }

    #[test]
    fn remit_replays_without_recording() {
        let mut d = EventDispatcher::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        d.game.on("A", recorder(&log, "A"), None).unwrap();
        d.game.on("B", recorder(&log, "B"), None).unwrap();

        d.set_record_history(true);
        d.set_current_stage(GameStage::new(1, 1, 1));
        d.emit("A", &[]);
        d.emit("B", &[]);
        log.borrow_mut().clear();

        let out = d.remit(RemitFilter::default().discard(["B"]), true);
        assert_eq!(out, RemitOutcome::Replayed(1));
        assert_eq!(*log.borrow(), vec!["A"]);
        assert_eq!(d.history().len(), 2);
    }

    #[test]
    fn remit_waits_for_ready() {
        let mut d = EventDispatcher::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        d.game.on("A", recorder(&log, "A"), None).unwrap();

        d.set_record_history(true);
        d.set_current_stage(GameStage::new(2, 1, 1));
        d.emit("A", &[]);
        log.borrow_mut().clear();

        assert_eq!(d.remit(RemitFilter::for_stage(GameStage::new(2, 1, 1)), false), RemitOutcome::Deferred);
        assert!(log.borrow().is_empty());
        assert!(d.has_pending_remit());

        d.emit(READY, &[]);
        assert_eq!(*log.borrow(), vec!["A"]);
        assert!(!d.has_pending_remit());

        d.emit(READY, &[]);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn remit_with_empty_history_is_noop() {
        let mut d = EventDispatcher::new();
        assert_eq!(d.remit(RemitFilter::default(), false), RemitOutcome::Replayed(0));
        assert!(!d.has_pending_remit());
    }
}
