//=========================================================================
// Bridge
//=========================================================================
//
// Contracts between the stage engine and the collaborators living outside
// the crate: network transport, game database and widgets.
//
// Components:
// - `message`: message and remote command types (the contract)
// - `transport`: Transport trait plus a channel-backed in-memory version
// - `persistence`: GameDb trait plus an in-memory version
// - `widget`: Widget trait and the factory registry used by exec_step
//
//=========================================================================

//=== Module Declarations =================================================

mod message;
mod persistence;
mod transport;
mod widget;

//=== Public API ==========================================================

pub use message::{targets, CommandPayload, GameMessage, MsgAction, RemoteCommand, ROOM, SERVER};
pub use persistence::{DbRecord, GameDb, MemoryDb};
pub use transport::{MemoryTransport, Transport};
pub use widget::{StaticWidget, Widget, WidgetFactory, WidgetRegistry, WidgetSpec};
