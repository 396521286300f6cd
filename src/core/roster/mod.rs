//=========================================================================
// Roster
//=========================================================================
//
// Narrow view of the connected participants consumed by the stage engine.
//
// Architecture:
//   Roster (trait)  ← read by StepRule, SizeGate, StageEngine
//     └─ PlayerList  ordered Vec<Player> + id index
//
// Only the transport side inserts or removes players. The engine reads
// and asks synchrony questions.
//
//=========================================================================

//=== External Dependencies ===============================================

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;

//=== Internal Dependencies ===============================================

use crate::core::stage::{GameStage, StageLevel};

//=== Module Declarations =================================================

mod player;
mod player_list;

//=== Public API ==========================================================

pub use player::{Player, PlayerUpdate};
pub use player_list::PlayerList;

//=== MatchType ===========================================================

/// How a player's position is compared with the reference position.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    /// Same stage, step and round.
    #[default]
    Exact,
    /// Same stage, any step.
    Stage,
    /// Same stage, at or past the reference step.
    StageUpTo,
}

//=== RosterError =========================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RosterError {
    #[error("PlayerList.{method}: id already in the list. Found: {id}")]
    DuplicateId { method: &'static str, id: String },

    #[error("PlayerList.{method}: id is the local participant's own id. Found: {id}")]
    OwnId { method: &'static str, id: String },

    #[error("PlayerList.{method}: no player with this id. Found: {id}")]
    UnknownId { method: &'static str, id: String },
}

//=== Roster Trait ========================================================

/// Participant collection as seen by the stage engine.
///
/// Players behind the compared position always break synchrony.
/// `check_outliers` decides how the remaining players outside it are
/// treated: `true` makes them break synchrony, `false` ignores them.
pub trait Roster {
    fn size(&self) -> usize;

    fn exist(&self, id: &str) -> bool;

    fn first(&self) -> Option<&Player>;

    fn ids(&self) -> Vec<String>;

    fn are_players_sync(
        &self,
        stage: GameStage,
        level: StageLevel,
        match_type: MatchType,
        check_outliers: bool,
    ) -> bool;

    fn is_step_done(&self, stage: GameStage, match_type: MatchType, check_outliers: bool) -> bool {
        self.are_players_sync(stage, StageLevel::Done, match_type, check_outliers)
    }

    fn is_step_loaded(&self, stage: GameStage) -> bool {
        self.are_players_sync(stage, StageLevel::Loaded, MatchType::Exact, true)
    }
}
