//=========================================================================
// Event Scope
//=========================================================================
//
// One isolated emitter: listeners keyed by event name.
//
// Architecture:
//   on()/once() → HashMap<event, Vec<Listener>> (insertion order)
//                        ↓
//   emit() → every listener in order → EmitResult
//   emit_async() → DeferredQueue ──run_deferred()──→ emit()
//
// Labels are unique per scope and are the handle for targeted removal.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::Sender;
use log::{debug, warn};
use serde_json::Value;

//=== Internal Dependencies ===============================================

use super::deferred::{DeferredEmit, DeferredQueue};
use super::emit::EmitResult;
use super::error::EventError;

//=== Listener Types ======================================================

/// Callback invoked with the emission arguments.
///
/// Returning `Some(value)` contributes to the [`EmitResult`].
pub type ListenerFn = Box<dyn FnMut(&[Value]) -> Option<Value>>;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of a registered listener, unique across all scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

/// Selects listeners for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerRef<'a> {
    /// The exact listener returned by `on`/`once`.
    Id(ListenerId),
    /// A label; if no listener carries it, the callback's declared
    /// function name is matched instead.
    Label(&'a str),
}

/// Public description of a listener (for removal reports and change logs).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerInfo {
    pub id: ListenerId,
    pub event: String,
    pub label: Option<String>,
    pub name: String,
}

struct Listener {
    id: ListenerId,
    label: Option<String>,
    name: String,
    once: bool,
    callback: ListenerFn,
}

impl Listener {
    fn info(&self, event: &str) -> ListenerInfo {
        ListenerInfo {
            id: self.id,
            event: event.to_string(),
            label: self.label.clone(),
            name: self.name.clone(),
        }
    }

    fn matches(&self, target: ListenerRef<'_>, by_name: bool) -> bool {
        match target {
            ListenerRef::Id(id) => self.id == id,
            ListenerRef::Label(label) if by_name => self.name == label,
            ListenerRef::Label(label) => self.label.as_deref() == Some(label),
        }
    }
}

/// Short declared name of a callback type (`path::to::handler` → `handler`).
///
/// Closures have no declared name and yield `{{closure}}`.
fn callback_name<F>() -> String {
    let full = std::any::type_name::<F>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

//=== Changes =============================================================

/// Listeners added and removed while change tracking was on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
    pub added: Vec<ListenerInfo>,
    pub removed: Vec<ListenerInfo>,
}

//=== SizeQuery ===========================================================

/// What [`EventScope::size`] counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeQuery<'a> {
    /// Distinct events with at least one listener.
    Events,
    /// Listeners registered for one event.
    Event(&'a str),
    /// All listeners across all events.
    Listeners,
}

//=== EventScope ==========================================================

/// An isolated, named event emitter.
pub struct EventScope {
    name: String,
    events: HashMap<String, Vec<Listener>>,
    labels: HashSet<String>,
    changes: Option<Changes>,
    deferred: DeferredQueue,
    once_seq: u64,
}

impl EventScope {
    //--- Construction -----------------------------------------------------

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: HashMap::new(),
            labels: HashSet::new(),
            changes: None,
            deferred: DeferredQueue::new(),
            once_seq: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    //--- Registration -----------------------------------------------------

    /// Registers `callback` for `event`, optionally under a unique label.
    pub fn on<F>(&mut self, event: &str, callback: F, label: Option<&str>) -> Result<ListenerId, EventError>
    where
        F: FnMut(&[Value]) -> Option<Value> + 'static,
    {
        let name = callback_name::<F>();
        self.register("EventScope.on", event, Box::new(callback), name, label, false)
    }

    /// Registers a listener removed before its first invocation.
    ///
    /// A label is generated when none is given.
    pub fn once<F>(&mut self, event: &str, callback: F, label: Option<&str>) -> Result<ListenerId, EventError>
    where
        F: FnMut(&[Value]) -> Option<Value> + 'static,
    {
        let name = callback_name::<F>();
        let generated;
        let label = match label {
            Some(l) => l,
            None => {
                self.once_seq += 1;
                generated = format!("__once_{}_{}", event, self.once_seq);
                generated.as_str()
            }
        };
        self.register("EventScope.once", event, Box::new(callback), name, Some(label), true)
    }

    fn register(
        &mut self,
        method: &'static str,
        event: &str,
        callback: ListenerFn,
        name: String,
        label: Option<&str>,
        once: bool,
    ) -> Result<ListenerId, EventError> {
        if event.trim().is_empty() {
            return Err(EventError::InvalidArgument {
                method,
                reason: "event name must be a non-empty string",
                found: event.to_string(),
            });
        }

        if let Some(label) = label {
            if label.is_empty() {
                return Err(EventError::InvalidArgument {
                    method,
                    reason: "label must be a non-empty string",
                    found: String::new(),
                });
            }
            if self.labels.contains(label) {
                return Err(EventError::DuplicateLabel {
                    method,
                    label: label.to_string(),
                });
            }
            self.labels.insert(label.to_string());
        }

        let id = ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed));

        let listener = Listener {
            id,
            label: label.map(str::to_string),
            name,
            once,
            callback,
        };

        if let Some(changes) = self.changes.as_mut() {
            changes.added.push(listener.info(event));
        }

        self.events.entry(event.to_string()).or_default().push(listener);
        Ok(id)
    }

    //--- Emission ---------------------------------------------------------

    /// Invokes every listener of `event` synchronously, in insertion order.
    pub fn emit(&mut self, event: &str, args: &[Value]) -> EmitResult {
        let mut result = EmitResult::new();

        let Some(listeners) = self.events.get_mut(event) else {
            return result;
        };

        let current = std::mem::take(listeners);
        let mut kept = Vec::with_capacity(current.len());

        for mut listener in current {
            if listener.once {
                // Bookkeeping happens before the callback runs.
                if let Some(label) = &listener.label {
                    self.labels.remove(label);
                }
                if let Some(changes) = self.changes.as_mut() {
                    changes.removed.push(listener.info(event));
                }
                if let Some(value) = (listener.callback)(args) {
                    result.push(value);
                }
            } else {
                if let Some(value) = (listener.callback)(args) {
                    result.push(value);
                }
                kept.push(listener);
            }
        }

        if kept.is_empty() {
            self.events.remove(event);
        } else if let Some(slot) = self.events.get_mut(event) {
            *slot = kept;
        }

        result
    }

    /// Schedules `event` for the next [`EventScope::run_deferred`].
    pub fn emit_async(&self, event: &str, args: Vec<Value>) {
        self.deferred.push(event, args);
    }

    /// Sender feeding this scope's deferred queue.
    pub fn deferred_handle(&self) -> Sender<DeferredEmit> {
        self.deferred.handle()
    }

    /// Emits at most `max` deferred events. Returns how many ran.
    pub fn run_deferred(&mut self, max: usize) -> usize {
        let pending = self.deferred.drain(max);
        let count = pending.len();
        for item in pending {
            self.emit(&item.event, &item.args);
        }
        count
    }

    pub fn pending_deferred(&self) -> usize {
        self.deferred.len()
    }

    //--- Removal ----------------------------------------------------------

    /// Removes listeners of `event`.
    ///
    /// With no target every listener of the event is removed. A label that
    /// is not registered falls back to matching the callback name.
    pub fn off(&mut self, event: &str, target: Option<ListenerRef<'_>>) -> Result<Vec<ListenerInfo>, EventError> {
        if event.trim().is_empty() {
            return Err(EventError::InvalidArgument {
                method: "EventScope.off",
                reason: "event name must be a non-empty string",
                found: event.to_string(),
            });
        }

        let removed = self.remove_matching(event, target);

        if removed.is_empty() {
            warn!(
                "EventScope.off: no listener removed from scope '{}'. Found: {} {:?}",
                self.name, event, target
            );
        } else {
            debug!("EventScope.off: removed {} listener(s) of '{}' from '{}'", removed.len(), event, self.name);
        }

        Ok(removed)
    }

    pub(crate) fn remove_matching(&mut self, event: &str, target: Option<ListenerRef<'_>>) -> Vec<ListenerInfo> {
        let Some(listeners) = self.events.get_mut(event) else {
            return Vec::new();
        };

        let by_name = match target {
            Some(ListenerRef::Label(label)) => !self.labels.contains(label),
            _ => false,
        };

        let mut removed = Vec::new();
        let mut i = 0;
        while i < listeners.len() {
            let hit = match target {
                None => true,
                Some(t) => listeners[i].matches(t, by_name),
            };
            if hit {
                let listener = listeners.remove(i);
                if let Some(label) = &listener.label {
                    self.labels.remove(label);
                }
                removed.push(listener.info(event));
            } else {
                i += 1;
            }
        }

        if listeners.is_empty() {
            self.events.remove(event);
        }

        if let Some(changes) = self.changes.as_mut() {
            changes.removed.extend(removed.iter().cloned());
        }

        removed
    }

    /// Removes all listeners and labels.
    pub fn clear(&mut self) {
        if let Some(changes) = self.changes.as_mut() {
            for (event, listeners) in &self.events {
                changes.removed.extend(listeners.iter().map(|l| l.info(event)));
            }
        }
        self.events.clear();
        self.labels.clear();
        self.deferred.clear();
    }

    //--- Queries ----------------------------------------------------------

    pub fn size(&self, query: SizeQuery<'_>) -> usize {
        match query {
            SizeQuery::Events => self.events.values().filter(|l| !l.is_empty()).count(),
            SizeQuery::Event(event) => self.events.get(event).map_or(0, Vec::len),
            SizeQuery::Listeners => self.events.values().map(Vec::len).sum(),
        }
    }

    /// Names of events with at least one listener.
    pub fn event_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.events
            .iter()
            .filter(|(_, l)| !l.is_empty())
            .map(|(name, _)| name.as_str())
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    pub fn listeners(&self, event: &str) -> Vec<ListenerInfo> {
        self.events
            .get(event)
            .map(|ls| ls.iter().map(|l| l.info(event)).collect())
            .unwrap_or_default()
    }

    //--- Change Tracking --------------------------------------------------

    /// Turns change tracking on or off. Turning it off drops recorded changes.
    pub fn set_record_changes(&mut self, record: bool) {
        match (record, self.changes.is_some()) {
            (true, false) => self.changes = Some(Changes::default()),
            (false, true) => self.changes = None,
            _ => {}
        }
    }

    pub fn is_recording_changes(&self) -> bool {
        self.changes.is_some()
    }

    /// Returns the recorded changes, optionally resetting them.
    pub fn get_changes(&mut self, clear: bool) -> Changes {
        match self.changes.as_mut() {
            Some(changes) if clear => std::mem::take(changes),
            Some(changes) => changes.clone(),
            None => Changes::default(),
        }
    }
}

impl std::fmt::Debug for EventScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventScope")
            .field("name", &self.name)
            .field("events", &self.size(SizeQuery::Events))
            .field("listeners", &self.size(SizeQuery::Listeners))
            .finish()
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

    fn counter() -> (Rc<RefCell<u32>>, impl FnMut(&[Value]) -> Option<Value>) {
        let count = Rc::new(RefCell::new(0));
        let c = Rc::clone(&count);
        (count, move |_: &[Value]| {
            *c.borrow_mut() += 1;
            None
        })
    }

    fn named_handler(_args: &[Value]) -> Option<Value> {
        Some(json!("named"))
    }

    //--- Registration -----------------------------------------------------

    #[test]
    fn on_rejects_empty_event_name() {
        let mut scope = EventScope::new("test");
        let err = scope.on("", |_| None, None).unwrap_err();
        assert!(matches!(err, EventError::InvalidArgument { .. }));
        assert!(err.to_string().starts_with("EventScope.on:"));
    }

    #[test]
    fn on_rejects_duplicate_label() {
        let mut scope = EventScope::new("test");
        scope.on("A", |_| None, Some("x")).unwrap();
        let err = scope.on("B", |_| None, Some("x")).unwrap_err();
        assert_eq!(
            err,
            EventError::DuplicateLabel { method: "EventScope.on", label: "x".into() }
        );
    }

    //--- Emission ---------------------------------------------------------

    #[test]
    fn emit_calls_in_insertion_order_and_collects_values() {
        let mut scope = EventScope::new("test");
        let order = Rc::new(RefCell::new(Vec::new()));

        for i in 0..3 {
            let order = Rc::clone(&order);
            scope
                .on("E", move |_| {
                    order.borrow_mut().push(i);
                    if i == 1 { None } else { Some(json!(i)) }
                }, None)
                .unwrap();
        }

        let result = scope.emit("E", &[]);
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
        assert_eq!(result.values(), &[json!(0), json!(2)]);
    }

    #[test]
    fn emit_passes_arguments() {
        let mut scope = EventScope::new("test");
        scope.on("sum", |args| {
            let total: i64 = args.iter().filter_map(Value::as_i64).sum();
            Some(json!(total))
        }, None).unwrap();

        let result = scope.emit("sum", &[json!(1), json!(2), json!(3), json!(4)]);
        assert_eq!(result.single(), Some(&json!(10)));
    }

    #[test]
    fn emit_unknown_event_is_empty() {
        let mut scope = EventScope::new("test");
        assert!(scope.emit("nothing", &[]).is_empty());
    }

    //--- Once -------------------------------------------------------------

    #[test]
    fn once_fires_a_single_time() {
        let mut scope = EventScope::new("test");
        let (count, cb) = counter();
        scope.once("E", cb, Some("X")).unwrap();

        scope.emit("E", &[]);
        scope.emit("E", &[]);

        assert_eq!(*count.borrow(), 1);
        assert!(!scope.has_label("X"));
        assert_eq!(scope.size(SizeQuery::Events), 0);
    }

    #[test]
    fn once_removed_by_label_never_fires() {
        let mut scope = EventScope::new("test");
        let (count, cb) = counter();
        scope.once("E", cb, Some("X")).unwrap();

        let removed = scope.off("E", Some(ListenerRef::Label("X"))).unwrap();
        assert_eq!(removed.len(), 1);

        scope.emit("E", &[]);
        assert_eq!(*count.borrow(), 0);
    }

    #[test]
    fn once_generates_label() {
        let mut scope = EventScope::new("test");
        scope.once("E", |_| None, None).unwrap();
        let info = &scope.listeners("E")[0];
        assert!(info.label.as_deref().unwrap().starts_with("__once_E"));
    }

    //--- Removal ----------------------------------------------------------

    #[test]
    fn off_by_id_and_all() {
        let mut scope = EventScope::new("test");
        let a = scope.on("E", |_| None, None).unwrap();
        scope.on("E", |_| None, None).unwrap();
        scope.on("E", |_| None, None).unwrap();

        let removed = scope.off("E", Some(ListenerRef::Id(a))).unwrap();
        assert_eq!(removed[0].id, a);
        assert_eq!(scope.size(SizeQuery::Event("E")), 2);

        let removed = scope.off("E", None).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(scope.size(SizeQuery::Events), 0);
    }

    #[test]
    fn off_falls_back_to_callback_name() {
        let mut scope = EventScope::new("test");
        scope.on("E", named_handler, None).unwrap();
        scope.on("E", |_| None, None).unwrap();

        let removed = scope.off("E", Some(ListenerRef::Label("named_handler"))).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].name, "named_handler");
        assert_eq!(scope.size(SizeQuery::Event("E")), 1);
    }

    #[test]
    fn off_without_match_returns_empty() {
        let mut scope = EventScope::new("test");
        scope.on("E", |_| None, None).unwrap();
        assert!(scope.off("E", Some(ListenerRef::Label("nope"))).unwrap().is_empty());
        assert!(scope.off("Z", None).unwrap().is_empty());
        assert!(scope.off("", None).is_err());
    }

    //--- Size -------------------------------------------------------------

    #[test]
    fn size_modifiers() {
        let mut scope = EventScope::new("test");
        scope.on("A", |_| None, None).unwrap();
        scope.on("A", |_| None, None).unwrap();
        scope.on("B", |_| None, None).unwrap();

        assert_eq!(scope.size(SizeQuery::Events), 2);
        assert_eq!(scope.size(SizeQuery::Event("A")), 2);
        assert_eq!(scope.size(SizeQuery::Listeners), 3);

        scope.clear();
        assert_eq!(scope.size(SizeQuery::Listeners), 0);
    }

    //--- Deferred ---------------------------------------------------------

    #[test]
    fn emit_async_runs_on_next_tick() {
        let mut scope = EventScope::new("test");
        let (count, cb) = counter();
        scope.on("E", cb, None).unwrap();

        scope.emit_async("E", vec![]);
        scope.emit_async("E", vec![]);
        assert_eq!(*count.borrow(), 0);

        assert_eq!(scope.run_deferred(16), 2);
        assert_eq!(*count.borrow(), 2);
    }

    //--- Change Tracking --------------------------------------------------

    #[test]
    fn change_tracking_records_adds_and_clear() {
        let mut scope = EventScope::new("test");
        scope.set_record_changes(true);
        scope.on("A", |_| None, Some("la")).unwrap();
        scope.on("B", |_| None, None).unwrap();
        scope.clear();

        let changes = scope.get_changes(true);
        assert_eq!(changes.added.len(), 2);
        assert_eq!(changes.removed.len(), 2);
        assert!(scope.get_changes(false).added.is_empty());

        scope.set_record_changes(false);
        assert!(!scope.is_recording_changes());
    }
}
