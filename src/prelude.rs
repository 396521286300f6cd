//=========================================================================
// Prelude
//=========================================================================
//
// Convenience module that re-exports commonly used types and traits.
//
// Usage:
//   use aetheric_stager::prelude::*;
//
//=========================================================================

//=== Public API ==========================================================

// Engine facade
pub use crate::engine::{
    names, EngineError, EngineSettings, EngineSignal, StageEngine, StageEngineBuilder, StartOptions, StepOptions,
    StepTarget, TransitionOutcome,
};

// Plot and positions
pub use crate::core::stage::{
    GameStage, GameStageRef, HookError, Plot, PublishLevel, RoleDef, RoleSpec, StageDef, StageLevel, StateLevel,
    StepDef, StepRule,
};

// Events
pub use crate::core::events::{EventDispatcher, RemitFilter, RemitOutcome};

// Participants and matching
pub use crate::core::matching::{MatcherManager, MatcherSettings};
pub use crate::core::roster::{Player, PlayerList, Roster};

// Timers
pub use crate::core::timers::TimerScope;

// Transport, persistence and widgets
pub use crate::core::bridge::{
    GameDb, GameMessage, MemoryDb, MemoryTransport, StaticWidget, Transport, Widget, WidgetSpec,
};
