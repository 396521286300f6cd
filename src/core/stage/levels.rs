//=========================================================================
// Levels
//=========================================================================
//
// Totally ordered lifecycle counters.
//
//   StateLevel: coarse engine lifecycle (starting, stepping, game over)
//   StageLevel: fine progress inside the current step
//   PublishLevel: how much of the above is broadcast to other participants
//
// Discriminants leave gaps so the ordering survives new variants.
//
//=========================================================================

//=== External Dependencies ===============================================

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

//=== StateLevel ==========================================================

/// Coarse lifecycle of the engine.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum StateLevel {
    RuntimeError = -1,
    #[default]
    Uninitialized = 0,
    Starting = 1,
    Initializing = 2,
    Initialized = 5,
    StageInit = 10,
    StepInit = 20,
    PlayingStep = 30,
    StageExit = 50,
    StepExit = 60,
    Finishing = 70,
    Gameover = 100,
}

impl StateLevel {
    pub fn value(self) -> i16 {
        self as i16
    }
}

//=== StageLevel ==========================================================

/// Fine-grained progress within one step.
///
/// `Pausing`..`Resumed` form a side branch: pausing never lowers the main
/// counter, it only records where the step was when paused.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum StageLevel {
    #[default]
    Uninitialized = 0,
    Initializing = 1,
    Initialized = 5,
    ExecutingCallback = 80,
    CallbackExecuted = 90,
    Loaded = 95,
    Playing = 100,
    Pausing = 110,
    Paused = 120,
    Resuming = 130,
    Resumed = 140,
    DoneCalled = 150,
    GettingDone = 160,
    Done = 170,
    Exiting = 180,
}

impl StageLevel {
    pub fn value(self) -> i16 {
        self as i16
    }

    /// Levels of the pause side branch.
    pub fn is_pause_branch(self) -> bool {
        matches!(
            self,
            StageLevel::Pausing | StageLevel::Paused | StageLevel::Resuming | StageLevel::Resumed
        )
    }
}

//=== PublishLevel ========================================================

/// Amount of level changes sent to other participants.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
    EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublishLevel {
    None,
    Few,
    #[default]
    Regular,
    Most,
    All,
}

//=== UpdateKind ==========================================================

/// Kind of change that may be published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    Stage,
    StageLevel(StageLevel),
    StateLevel(StateLevel),
}

impl PublishLevel {
    /// Returns true if a change of the given kind should be broadcast.
    pub fn allows(self, kind: UpdateKind) -> bool {
        match self {
            PublishLevel::None => false,
            PublishLevel::Few => matches!(kind, UpdateKind::Stage),
            PublishLevel::Regular => match kind {
                UpdateKind::Stage => true,
                UpdateKind::StageLevel(level) => {
                    matches!(level, StageLevel::Playing | StageLevel::Done)
                }
                UpdateKind::StateLevel(_) => false,
            },
            PublishLevel::Most => !matches!(kind, UpdateKind::StateLevel(_)),
            PublishLevel::All => true,
        }
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn state_levels_are_strictly_increasing_in_declared_order() {
        let values: Vec<i16> = StateLevel::iter().map(StateLevel::value).collect();
        assert!(values.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn stage_levels_are_strictly_increasing_in_declared_order() {
        let values: Vec<i16> = StageLevel::iter().map(StageLevel::value).collect();
        assert!(values.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn level_names_round_trip_through_strum() {
        assert_eq!(StageLevel::DoneCalled.to_string(), "DONE_CALLED");
        assert_eq!("PLAYING_STEP".parse::<StateLevel>().unwrap(), StateLevel::PlayingStep);
    }

    #[test]
    fn regular_publish_level() {
        let lvl = PublishLevel::Regular;
        assert!(lvl.allows(UpdateKind::Stage));
        assert!(lvl.allows(UpdateKind::StageLevel(StageLevel::Done)));
        assert!(!lvl.allows(UpdateKind::StageLevel(StageLevel::Loaded)));
        assert!(!lvl.allows(UpdateKind::StateLevel(StateLevel::PlayingStep)));
    }

    #[test]
    fn none_and_all_publish_levels() {
        assert!(!PublishLevel::None.allows(UpdateKind::Stage));
        assert!(PublishLevel::All.allows(UpdateKind::StateLevel(StateLevel::Finishing)));
        assert!(!PublishLevel::Few.allows(UpdateKind::StageLevel(StageLevel::Done)));
        assert!(PublishLevel::Most.allows(UpdateKind::StageLevel(StageLevel::Loaded)));
    }
}
