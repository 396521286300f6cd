//=========================================================================
// Events
//=========================================================================
//
// Event dispatch core: isolated emitters grouped into session scopes, with
// deferred emission and a replayable history.
//
//   EventScope       one emitter (listeners by event name)
//   EventDispatcher  global / game / stage / step scopes + EventHistory
//   EmitResult       listener return values of one emission
//
//=========================================================================

//=== Module Declarations =================================================

mod deferred;
mod dispatcher;
mod emit;
mod error;
mod history;
mod scope;

//=== Public API ==========================================================

pub use deferred::DeferredEmit;
pub use dispatcher::{EventDispatcher, RemitOutcome, ScopeKind, READY};
pub use emit::{Collapsed, EmitResult};
pub use error::EventError;
pub use history::{EventHistory, HistoryEntry, RemitFilter};
pub use scope::{Changes, EventScope, ListenerFn, ListenerId, ListenerInfo, ListenerRef, SizeQuery};
