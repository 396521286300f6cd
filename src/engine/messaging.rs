//=========================================================================
// Inbound Messages
//=========================================================================
//
//   receive(msg)
//     ├─ control target (GAMECOMMAND, P*CONNECT, PLAYER_UPDATE) → dispatch
//     ├─ paused + pause handler                                 → handler
//     ├─ not ready (or paused)                                  → buffer
//     └─ otherwise                                              → dispatch
//
//   dispatch(msg): roster/db bookkeeping, emit `in.<action>.<target>`,
//                  then run the command or re-check the step rule.
//
//=========================================================================

//=== External Dependencies ===============================================

use log::{debug, info, trace, warn};
use serde::Deserialize;
use serde_json::{Map, Value};

//=== Internal Dependencies ===============================================

use super::error::EngineError;
use super::options::{StartOptions, StepOptions, StepTarget};
use super::StageEngine;
use crate::core::bridge::{targets, CommandPayload, DbRecord, GameMessage, MsgAction, RemoteCommand};
use crate::core::roster::{Player, PlayerUpdate, Roster};
use crate::core::stage::StageLevel;

//=== Payloads ============================================================

#[derive(Debug, Deserialize)]
struct Reconnect {
    old_id: String,
    new_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct RemoteStart {
    #[serde(default)]
    step: Option<bool>,
    #[serde(default)]
    start_at: Option<String>,
}

fn is_control(msg: &GameMessage) -> bool {
    matches!(
        msg.target.as_str(),
        targets::GAMECOMMAND | targets::PCONNECT | targets::PDISCONNECT | targets::PRECONNECT | targets::PLAYER_UPDATE
    )
}

fn invalid(msg: &GameMessage, e: impl ToString) -> EngineError {
    EngineError::InvalidMessage {
        target: msg.target.clone(),
        found: e.to_string(),
    }
}

impl StageEngine {
    /// Entry point for every message the transport delivers.
    pub fn receive(&mut self, msg: GameMessage) -> Result<(), EngineError> {
        if is_control(&msg) {
            return self.dispatch(msg);
        }
        if self.paused {
            if let Some(handler) = self.pause_handler.clone() {
                handler(self, msg)?;
                return Ok(());
            }
        }
        if !self.is_ready() {
            trace!("StageEngine: buffering {}", msg.in_event());
            self.transport.buffer(msg);
            return Ok(());
        }
        self.dispatch(msg)
    }

    fn dispatch(&mut self, msg: GameMessage) -> Result<(), EngineError> {
        match msg.target.as_str() {
            targets::PCONNECT => self.on_connect(&msg)?,
            targets::PDISCONNECT => self.on_disconnect(&msg),
            targets::PRECONNECT => self.on_reconnect(&msg)?,
            targets::PLAYER_UPDATE => self.on_player_update(&msg)?,
            targets::DATA if msg.action == MsgAction::Set => self.store_data(&msg),
            _ => {}
        }

        let event = msg.in_event();
        let payload = serde_json::to_value(&msg).unwrap_or(Value::Null);
        self.emit(&event, &[payload])?;

        match msg.target.as_str() {
            targets::GAMECOMMAND => {
                let command: CommandPayload = serde_json::from_value(msg.data.clone()).map_err(|e| invalid(&msg, e))?;
                self.exec_command(command, &msg.from)?;
            }
            targets::PLAYER_UPDATE => self.recheck_after_update()?,
            _ => {}
        }
        Ok(())
    }

    //--- Roster Bookkeeping -----------------------------------------------

    fn on_connect(&mut self, msg: &GameMessage) -> Result<(), EngineError> {
        let player: Player = serde_json::from_value(msg.data.clone()).map_err(|e| invalid(msg, e))?;
        let id = player.id.clone();
        match self.roster.add(player) {
            Ok(()) => info!("StageEngine: player {} connected ({} in roster)", id, self.roster.size()),
            Err(e) => warn!("{}", e),
        }
        Ok(())
    }

    fn on_disconnect(&mut self, msg: &GameMessage) {
        let id = msg
            .data
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or(msg.from.as_str())
            .to_string();
        match self.roster.remove(&id) {
            Some(_) => info!("StageEngine: player {} disconnected", id),
            None => warn!("StageEngine.receive: disconnect of an unknown player. Found: {}", id),
        }
    }

    /// A participant came back under a new id.
    fn on_reconnect(&mut self, msg: &GameMessage) -> Result<(), EngineError> {
        let Reconnect { old_id, new_id } = serde_json::from_value(msg.data.clone()).map_err(|e| invalid(msg, e))?;
        info!("StageEngine: {} reconnected as {}", old_id, new_id);

        self.matcher.replace_id(&old_id, &new_id);
        if self.partner.as_deref() == Some(old_id.as_str()) {
            self.partner = Some(new_id.clone());
        }
        if self.roster.exist(&old_id) {
            self.roster.replace_id(&old_id, &new_id)?;
        }
        Ok(())
    }

    fn on_player_update(&mut self, msg: &GameMessage) -> Result<(), EngineError> {
        let update: PlayerUpdate = serde_json::from_value(msg.data.clone()).map_err(|e| invalid(msg, e))?;
        if let Err(e) = self.roster.update(&msg.from, &update) {
            warn!("{}", e);
        }
        Ok(())
    }

    /// Others' progress may unblock PLAYING or a synchronized step rule.
    fn recheck_after_update(&mut self) -> Result<(), EngineError> {
        if self.should_emit_playing(true) {
            self.emit_playing()?;
        } else if self.stage_level == StageLevel::Done && self.should_step() {
            self.step(StepOptions::default())?;
        }
        Ok(())
    }

    fn store_data(&mut self, msg: &GameMessage) {
        let Some(db) = self.db.as_mut() else {
            return;
        };
        let data = msg.data_object().cloned().unwrap_or_else(Map::new);
        let mut record = DbRecord::new(msg.from.clone(), msg.stage, data);
        record.session = self.settings.session.clone();
        record.treatment = self.settings.treatment.clone();
        db.add(record);
    }

    //--- Remote Commands --------------------------------------------------

    fn exec_command(&mut self, command: CommandPayload, from: &str) -> Result<(), EngineError> {
        debug!("StageEngine: remote command {} from {}", command.command, from);
        let options = command.options;

        match command.command {
            RemoteCommand::Start => {
                let start: RemoteStart = if options.is_null() {
                    RemoteStart::default()
                } else {
                    serde_json::from_value(options).map_err(|e| EngineError::InvalidMessage {
                        target: targets::GAMECOMMAND.to_string(),
                        found: e.to_string(),
                    })?
                };
                let start_at = start.start_at.map(|s| s.parse::<StepTarget>()).transpose()?;
                self.start(StartOptions {
                    step: start.step.unwrap_or(true),
                    start_at,
                    step_options: StepOptions::default(),
                })?;
            }
            RemoteCommand::GotoStep => {
                let target = options
                    .get("target")
                    .and_then(Value::as_str)
                    .ok_or_else(|| EngineError::InvalidMessage {
                        target: targets::GAMECOMMAND.to_string(),
                        found: format!("goto_step without target: {}", options),
                    })?
                    .parse::<StepTarget>()?;
                let opts: StepOptions = serde_json::from_value(options).map_err(|e| EngineError::InvalidMessage {
                    target: targets::GAMECOMMAND.to_string(),
                    found: e.to_string(),
                })?;
                self.goto_step(target, opts)?;
            }
            RemoteCommand::Step => {
                self.step(StepOptions::default())?;
            }
            RemoteCommand::Pause => self.pause(options.get("reason").and_then(Value::as_str))?,
            RemoteCommand::Resume => self.resume(options.get("reason").and_then(Value::as_str))?,
            RemoteCommand::Stop => self.stop()?,
            RemoteCommand::PushStep => self.on_push_step()?,
        }
        Ok(())
    }

    /// The coordinator wants this participant to move on.
    fn on_push_step(&mut self) -> Result<(), EngineError> {
        if self.stage_level >= StageLevel::Done {
            self.step(StepOptions::default())?;
            return Ok(());
        }
        let mut data = Map::new();
        data.insert("pushed".into(), Value::Bool(true));
        if !self.done(data)? {
            warn!("StageEngine: push_step ignored at {} ({})", self.stage, self.stage_level);
        }
        Ok(())
    }
}
