//=========================================================================
// Stage
//=========================================================================
//
// Positions, levels and the game sequence.
//
// Architecture:
//   GameStage / GameStageRef   position triple (numeric / by id)
//   StateLevel / StageLevel    lifecycle counters
//   Plot                       StageDef → StepDef, navigation, properties
//   StepRule                   auto-advance predicates
//   SizeGate                   player-count thresholds
//
//=========================================================================

//=== Module Declarations =================================================

mod error;
mod game_stage;
mod levels;
mod plot;
mod size_gate;
mod step_rule;

//=== Public API ==========================================================

pub use error::{HookError, SizeError, StageError};
pub use game_stage::{GameStage, GameStageRef, StageKey};
pub use levels::{PublishLevel, StageLevel, StateLevel, UpdateKind};
pub use plot::{
    AssignFn, DoneHook, Hook, NextStep, PartnerSpec, Plot, RoleDef, RoleSpec, RoundMode, SizeHook,
    StageDef, StepCallback, StepDef,
};
pub use size_gate::{SizeBound, SizeConfig, SizeEvent, SizeGate, Threshold};
pub use step_rule::{CustomRule, StepContext, StepRule};
