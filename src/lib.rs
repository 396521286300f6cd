//=========================================================================
// Aetheric Stager: Library Root
//
// Stage/step execution engine for multi-participant, round-based game
// sessions.
//
// Responsibilities:
// - Expose the engine facade (`StageEngine`) and its builder
// - Expose the subsystems it drives (plot, events, matching, roster,
//   timers, transport) for callers that need them directly
//
// Typical usage:
// ```no_run
// use aetheric_stager::prelude::*;
//
// let plot = Plot::from_stages(vec![
//     StageDef::new("intro").with_step(StepDef::new("welcome")),
// ])
// .unwrap();
//
// let (transport, _outbox) = MemoryTransport::new();
// let mut engine = StageEngineBuilder::new(plot)
//     .with_player_id("p1")
//     .with_transport(transport)
//     .build();
//
// engine.start(StartOptions::default()).unwrap();
// ```
//
//=========================================================================

//--- Public Modules ------------------------------------------------------
//
// `core` holds the subsystems the engine owns. Most callers only need
// the `engine` facade and the `prelude`.
//
pub mod core;
pub mod engine;
pub mod prelude;

//--- Public Exports ------------------------------------------------------

pub use engine::{StageEngine, StageEngineBuilder};
