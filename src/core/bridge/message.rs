//=========================================================================
// Game Messages
//=========================================================================
//
// Messages exchanged with the coordinating server.
//
// Architecture:
//   GameMessage { action, target, from, to, data, stage, created }
//
//   action.target examples:
//     set.DATA            participant data (stored in the game db)
//     say.PLAYER_UPDATE   stage / level change of a participant
//     say.GAMECOMMAND     remote command (start, goto_step, step, ...)
//     say.PRECONNECT      reconnection under a new id
//     say.PCONNECT        participant joined
//     say.PDISCONNECT     participant left
//
// Encoding on the wire is the transport's business.
//
//=========================================================================

//=== External Dependencies ===============================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumString};

//=== Internal Dependencies ===============================================

use crate::core::stage::GameStage;

//=== Constants ===========================================================

pub mod targets {
    pub const DATA: &str = "DATA";
    pub const PLAYER_UPDATE: &str = "PLAYER_UPDATE";
    pub const GAMECOMMAND: &str = "GAMECOMMAND";
    pub const PRECONNECT: &str = "PRECONNECT";
    pub const PCONNECT: &str = "PCONNECT";
    pub const PDISCONNECT: &str = "PDISCONNECT";
}

/// Recipient meaning every participant of the game room.
pub const ROOM: &str = "ROOM";

/// Recipient meaning the server itself.
pub const SERVER: &str = "SERVER";

//=== MsgAction ===========================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MsgAction {
    Say,
    Set,
    Get,
}

//=== GameMessage =========================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameMessage {
    pub action: MsgAction,
    pub target: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub stage: GameStage,
    pub created: DateTime<Utc>,
}

impl GameMessage {
    pub fn new(action: MsgAction, target: impl Into<String>, to: impl Into<String>, data: Value) -> Self {
        Self {
            action,
            target: target.into(),
            from: String::new(),
            to: to.into(),
            data,
            stage: GameStage::NOT_STARTED,
            created: Utc::now(),
        }
    }

    pub fn say(target: impl Into<String>, to: impl Into<String>, data: Value) -> Self {
        Self::new(MsgAction::Say, target, to, data)
    }

    pub fn set(target: impl Into<String>, to: impl Into<String>, data: Value) -> Self {
        Self::new(MsgAction::Set, target, to, data)
    }

    pub fn from_sender(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    pub fn at(mut self, stage: GameStage) -> Self {
        self.stage = stage;
        self
    }

    /// Event name under which the engine re-emits an inbound message.
    pub fn in_event(&self) -> String {
        format!("in.{}.{}", self.action, self.target)
    }

    pub fn data_object(&self) -> Option<&Map<String, Value>> {
        self.data.as_object()
    }

    pub fn is(&self, action: MsgAction, target: &str) -> bool {
        self.action == action && self.target == target
    }
}

//=== RemoteCommand =======================================================

/// Commands an admin (or the server) may send to a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RemoteCommand {
    Start,
    GotoStep,
    Step,
    Pause,
    Resume,
    Stop,
    PushStep,
}

/// Payload of a `GAMECOMMAND` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPayload {
    pub command: RemoteCommand,
    #[serde(default)]
    pub options: Value,
}

impl CommandPayload {
    pub fn new(command: RemoteCommand, options: Value) -> Self {
        Self { command, options }
    }

    pub fn into_message(self, to: impl Into<String>) -> GameMessage {
        let data = serde_json::to_value(&self).unwrap_or(Value::Null);
        GameMessage::say(targets::GAMECOMMAND, to, data)
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn in_event_name() {
        let msg = GameMessage::set(targets::DATA, SERVER, json!({}));
        assert_eq!(msg.in_event(), "in.set.DATA");
        assert!(msg.is(MsgAction::Set, targets::DATA));
    }

    #[test]
    fn command_payload_shape() {
        let msg = CommandPayload::new(RemoteCommand::GotoStep, json!({"target": "2.1.1"})).into_message("p1");
        assert_eq!(msg.target, targets::GAMECOMMAND);
        assert_eq!(msg.data["command"], json!("goto_step"));

        let back: CommandPayload = serde_json::from_value(msg.data).unwrap();
        assert_eq!(back.command, RemoteCommand::GotoStep);
    }
}
