//=========================================================================
// Core
//
// Subsystems driven by the stage engine.
//
// Architecture:
// ```text
//   stage     positions, levels, plot, step rules, size gate
//   events    scoped emitters, dispatcher, history / remit
//   matching  pairing schedules and roles
//   roster    participants as seen by the local engine
//   timers    step / stage / game countdowns
//   bridge    transport, game database, widgets
// ```
//
// The engine facade (`crate::engine`) owns one of each.
//
//=========================================================================

//=== Module Declarations =================================================

pub mod bridge;
pub mod events;
pub mod matching;
pub mod roster;
pub mod stage;
pub mod timers;
