//=========================================================================
// Player
//=========================================================================

//=== External Dependencies ===============================================

use serde::{Deserialize, Serialize};

//=== Internal Dependencies ===============================================

use crate::core::stage::{GameStage, StageLevel, StateLevel};

//=== Player ==============================================================

/// A participant as seen by the local engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    #[serde(default)]
    pub stage: GameStage,
    #[serde(default)]
    pub stage_level: StageLevel,
    #[serde(default)]
    pub state_level: StateLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner: Option<String>,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub disconnected: bool,
}

impl Player {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            stage: GameStage::NOT_STARTED,
            stage_level: StageLevel::Uninitialized,
            state_level: StateLevel::Uninitialized,
            role: None,
            partner: None,
            admin: false,
            disconnected: false,
        }
    }

    pub fn at(mut self, stage: GameStage, stage_level: StageLevel) -> Self {
        self.stage = stage;
        self.stage_level = stage_level;
        self
    }

    pub fn admin(mut self) -> Self {
        self.admin = true;
        self
    }
}

//=== PlayerUpdate ========================================================

/// Partial update carried by a `PLAYER_UPDATE` message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<GameStage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_level: Option<StageLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_level: Option<StateLevel>,
}

impl PlayerUpdate {
    pub fn apply(&self, player: &mut Player) {
        if let Some(stage) = self.stage {
            player.stage = stage;
        }
        if let Some(level) = self.stage_level {
            player.stage_level = level;
        }
        if let Some(level) = self.state_level {
            player.state_level = level;
        }
    }
}
