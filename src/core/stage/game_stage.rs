//=========================================================================
// Game Stage
//=========================================================================
//
// Position of a game inside its sequence: (stage, step, round).
//
// Architecture:
//   "intro.welcome.1" ──parse──> GameStageRef ──Plot::normalize──> GameStage
//   GameStage ──to_hash("S.s.r")──> "1.2.1" ──from_hash──> GameStage
//
// A `GameStage` is always numeric (1-based stage/step indices). Ids are
// only resolved through the plot, so comparison never needs a plot.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

//=== Internal Dependencies ===============================================

use super::error::StageError;

//=== GameStage ===========================================================

/// Normalized position triple.
///
/// Ordering is the natural one: stage, then step, then round. Stage `0`
/// (with step and round `0`) is reserved for "not started".
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct GameStage {
    pub stage: u32,
    pub step: u32,
    pub round: u32,
}

impl GameStage {
    /// Position of a game that has not started yet.
    pub const NOT_STARTED: GameStage = GameStage {
        stage: 0,
        step: 0,
        round: 0,
    };

    /// Default hash format, includes every field.
    pub const FULL_HASH: &'static str = "S.s.r";

    pub const fn new(stage: u32, step: u32, round: u32) -> Self {
        Self { stage, step, round }
    }

    /// Returns true once the position points inside the sequence.
    pub fn is_started(&self) -> bool {
        self.stage > 0
    }

    /// Three-way comparison returning -1, 0 or 1.
    pub fn compare(a: &GameStage, b: &GameStage) -> i32 {
        match a.cmp(b) {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        }
    }

    //--- Hashing ----------------------------------------------------------

    /// Serializes the position according to `format`.
    ///
    /// `S` is replaced by the stage, `s` by the step and `r` by the round;
    /// every other character is copied verbatim.
    ///
    /// ```
    /// use aetheric_stager::core::stage::GameStage;
    ///
    /// let gs = GameStage::new(3, 2, 1);
    /// assert_eq!(gs.to_hash("S.s.r"), "3.2.1");
    /// assert_eq!(gs.to_hash("S_r"), "3_1");
    /// ```
    pub fn to_hash(&self, format: &str) -> String {
        let mut out = String::with_capacity(format.len() + 4);
        for c in format.chars() {
            match c {
                'S' => out.push_str(&self.stage.to_string()),
                's' => out.push_str(&self.step.to_string()),
                'r' => out.push_str(&self.round.to_string()),
                other => out.push(other),
            }
        }
        out
    }

    /// Parses a hash produced by [`GameStage::to_hash`] with the same format.
    ///
    /// Fields missing from the format are left at zero.
    pub fn from_hash(hash: &str, format: &str) -> Result<GameStage, StageError> {
        let invalid = |reason| StageError::InvalidPosition {
            method: "GameStage.from_hash",
            reason,
            found: hash.to_string(),
        };

        let mut gs = GameStage::NOT_STARTED;
        let bytes = hash.as_bytes();
        let mut pos = 0;

        for c in format.chars() {
            match c {
                'S' | 's' | 'r' => {
                    let start = pos;
                    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                        pos += 1;
                    }
                    if start == pos {
                        return Err(invalid("expected a number"));
                    }
                    let value: u32 = hash[start..pos]
                        .parse()
                        .map_err(|_| invalid("number out of range"))?;
                    match c {
                        'S' => gs.stage = value,
                        's' => gs.step = value,
                        _ => gs.round = value,
                    }
                }
                literal => {
                    let mut buf = [0u8; 4];
                    let lit = literal.encode_utf8(&mut buf).as_bytes();
                    if !bytes[pos..].starts_with(lit) {
                        return Err(invalid("hash does not match format"));
                    }
                    pos += lit.len();
                }
            }
        }

        if pos != bytes.len() {
            return Err(invalid("trailing characters after format"));
        }
        Ok(gs)
    }
}

impl fmt::Display for GameStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.stage, self.step, self.round)
    }
}

impl FromStr for GameStage {
    type Err = StageError;

    /// Parses the `"stage.step.round"` shorthand.
    ///
    /// Missing step and round default to 1 (or 0 for the not-started stage).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| StageError::InvalidPosition {
            method: "GameStage.from_str",
            reason,
            found: s.to_string(),
        };

        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return Err(invalid("expected stage[.step[.round]]"));
        }

        let mut nums = [0u32; 3];
        for (i, part) in parts.iter().enumerate() {
            nums[i] = part.parse().map_err(|_| invalid("non numeric field"))?;
        }

        let fill = if nums[0] == 0 { 0 } else { 1 };
        Ok(GameStage {
            stage: nums[0],
            step: if parts.len() > 1 { nums[1] } else { fill },
            round: if parts.len() > 2 { nums[2] } else { fill },
        })
    }
}

//=== StageKey ============================================================

/// A stage or step reference: 1-based index or declared id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageKey {
    Index(u32),
    Id(String),
}

impl From<u32> for StageKey {
    fn from(value: u32) -> Self {
        StageKey::Index(value)
    }
}

impl From<&str> for StageKey {
    fn from(value: &str) -> Self {
        match value.parse::<u32>() {
            Ok(n) => StageKey::Index(n),
            Err(_) => StageKey::Id(value.to_string()),
        }
    }
}

impl fmt::Display for StageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKey::Index(n) => write!(f, "{}", n),
            StageKey::Id(id) => f.write_str(id),
        }
    }
}

//=== GameStageRef ========================================================

/// Unnormalized position: may reference stages and steps by id.
///
/// Resolved into a [`GameStage`] by [`super::Plot::normalize_game_stage`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameStageRef {
    pub stage: StageKey,
    pub step: StageKey,
    pub round: u32,
}

impl GameStageRef {
    pub fn new(stage: impl Into<StageKey>, step: impl Into<StageKey>, round: u32) -> Self {
        Self {
            stage: stage.into(),
            step: step.into(),
            round,
        }
    }
}

impl From<GameStage> for GameStageRef {
    fn from(gs: GameStage) -> Self {
        Self {
            stage: StageKey::Index(gs.stage),
            step: StageKey::Index(gs.step),
            round: gs.round,
        }
    }
}

impl FromStr for GameStageRef {
    type Err = StageError;

    /// Parses `"stage.step.round"` where stage and step may be ids.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(StageError::InvalidPosition {
                method: "GameStageRef.from_str",
                reason: "expected stage[.step[.round]]",
                found: s.to_string(),
            });
        }

        let round = match parts.get(2) {
            Some(r) => r.parse().map_err(|_| StageError::InvalidPosition {
                method: "GameStageRef.from_str",
                reason: "round must be numeric",
                found: s.to_string(),
            })?,
            None => 1,
        };

        Ok(GameStageRef {
            stage: StageKey::from(parts[0]),
            step: parts.get(1).map(|p| StageKey::from(*p)).unwrap_or(StageKey::Index(1)),
            round,
        })
    }
}

impl fmt::Display for GameStageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.stage, self.step, self.round)
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
