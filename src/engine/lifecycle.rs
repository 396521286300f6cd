//=========================================================================
// Lifecycle
//=========================================================================
//
//   UNINITIALIZED ──start()──> STARTING → INITIALIZING → INITIALIZED
//                                                          │ step()
//                                                          ▼
//                 stop() ◄──── any ─────────────── PLAYING_STEP ...
//                                                          │ GAMEOVER
//                                                          ▼
//                                          FINISHING ──> GAMEOVER
//
// Pausing never touches the state level: it runs on its own branch
// (`pause_level`) next to the step's stage level.
//
//=========================================================================

//=== External Dependencies ===============================================

use log::{debug, info, warn};
use serde_json::{json, Map, Value};

//=== Internal Dependencies ===============================================

use super::error::EngineError;
use super::names::{GAME_ALMOST_OVER, GAME_OVER, PAUSED, PAUSING, RESUMED, RESUMING};
use super::options::{StageBreak, StartOptions, TransitionOutcome};
use super::StageEngine;
use crate::core::bridge::{RemoteCommand, ROOM};
use crate::core::events::{RemitFilter, RemitOutcome};
use crate::core::stage::{GameStage, StageLevel, StateLevel};

impl StageEngine {
    //--- Predicates -------------------------------------------------------

    pub fn is_startable(&self) -> bool {
        self.state_level == StateLevel::Uninitialized
    }

    pub fn is_stoppable(&self) -> bool {
        self.state_level > StateLevel::Uninitialized
    }

    pub fn is_steppable(&self) -> bool {
        self.state_level >= StateLevel::Initialized && self.state_level < StateLevel::Finishing
    }

    pub fn is_pausable(&self) -> bool {
        !self.paused && self.state_level > StateLevel::Initializing && self.state_level < StateLevel::Finishing
    }

    pub fn is_resumable(&self) -> bool {
        self.paused && self.state_level > StateLevel::Initializing
    }

    /// Whether inbound messages are processed right away.
    pub fn is_ready(&self) -> bool {
        if self.paused {
            return false;
        }
        matches!(self.state_level, StateLevel::Initialized | StateLevel::PlayingStep)
            && !matches!(
                self.stage_level,
                StageLevel::Initializing | StageLevel::ExecutingCallback | StageLevel::Exiting
            )
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_gameover(&self) -> bool {
        self.state_level == StateLevel::Gameover
    }

    //--- Start / Stop -----------------------------------------------------

    /// Initializes the game and, unless told otherwise, enters the first
    /// step (or `start_at`).
    ///
    /// Returns the outcome of that first transition.
    pub fn start(&mut self, opts: StartOptions) -> Result<Option<TransitionOutcome>, EngineError> {
        if !self.is_startable() {
            return Err(EngineError::not_allowed(
                "StageEngine.start",
                "game cannot be started",
                self.state_level,
            ));
        }
        info!("StageEngine: starting game (player {})", self.settings.player_id);

        if self.settings.admin && self.settings.sync_stepping {
            self.send_command(RemoteCommand::Start, json!({ "step": false }), ROOM.to_string());
        }

        self.set_state_level(StateLevel::Starting);
        self.set_state_level(StateLevel::Initializing);
        self.set_stage_level(StageLevel::Initializing);

        if let Some(init) = self.init_hook.clone() {
            init(self)?;
        }

        self.set_state_level(StateLevel::Initialized);
        self.set_stage_level(StageLevel::Initialized);
        self.became_ready()?;

        if !opts.step {
            return Ok(None);
        }
        let outcome = match opts.start_at {
            Some(target) => self.goto_step(target, opts.step_options)?,
            None => self.step(opts.step_options)?,
        };
        Ok(Some(outcome))
    }

    /// Resets the engine to `0.0.0`, UNINITIALIZED.
    ///
    /// Every listener scope, timer, buffered message and the transport
    /// journal are cleared. Registered hooks and the roster are kept.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        if !self.is_stoppable() {
            return Err(EngineError::not_allowed(
                "StageEngine.stop",
                "game has not been started",
                self.state_level,
            ));
        }
        info!("StageEngine: stopping game at {}", self.stage);

        if let Some(mut widget) = self.widget.take() {
            widget.destroy();
        }
        self.events.clear_all();
        self.timers.clear();
        self.transport.erase_buffer();
        if self.transport.journal_on() {
            self.transport.clear_journal();
        }
        self.matcher.clear();
        self.size_gate.clear();
        self.plot.clear_tmp_cache();
        while self.signal_rx.try_recv().is_ok() {}

        self.stage = GameStage::NOT_STARTED;
        self.events.set_current_stage(GameStage::NOT_STARTED);
        self.state_level = StateLevel::Uninitialized;
        self.stage_level = StageLevel::Uninitialized;
        self.pause_level = None;
        self.paused = false;
        self.pause_count = 0;
        self.will_be_done = false;
        self.stage_break = StageBreak::None;
        self.role = None;
        self.partner = None;
        self.globals = Map::new();
        self.stepped.clear();
        self.stage_started_at = None;
        self.pending_frame = None;
        self.transitions += 1;
        Ok(())
    }

    pub fn restart(&mut self, opts: StartOptions) -> Result<Option<TransitionOutcome>, EngineError> {
        self.stop()?;
        self.start(opts)
    }

    //--- Game Over --------------------------------------------------------

    /// Runs the game-over protocol. A second call is ignored.
    pub fn gameover(&mut self) -> Result<(), EngineError> {
        if self.state_level >= StateLevel::Finishing {
            warn!("StageEngine.gameover: game is already over. Found: {}", self.state_level);
            return Ok(());
        }
        info!("StageEngine: game over at {}", self.stage);

        self.set_state_level(StateLevel::Finishing);
        self.emit(GAME_ALMOST_OVER, &[])?;

        if let Some(hook) = self.gameover_hook.clone() {
            hook(self)?;
        }

        self.timers.clear();
        self.set_state_level(StateLevel::Gameover);
        self.set_stage_level(StageLevel::Done);
        self.emit(GAME_OVER, &[])?;
        Ok(())
    }

    //--- Pause / Resume ---------------------------------------------------

    pub fn pause(&mut self, reason: Option<&str>) -> Result<(), EngineError> {
        if !self.is_pausable() {
            return Err(EngineError::not_allowed(
                "StageEngine.pause",
                "game cannot be paused",
                format!("{} (paused: {})", self.state_level, self.paused),
            ));
        }
        let reason = reason.map_or(Value::Null, |r| json!(r));

        self.paused = true;
        self.pause_count += 1;
        self.timers.pause_all();
        info!("StageEngine: pausing at {} (pause #{})", self.stage, self.pause_count);

        self.pause_level = Some(StageLevel::Pausing);
        self.emit(PAUSING, &[reason.clone()])?;
        self.pause_level = Some(StageLevel::Paused);
        self.emit(PAUSED, &[reason])?;
        Ok(())
    }

    /// Resumes the game, replays the messages buffered while paused and
    /// emits PLAYING if the step finished loading in the meantime.
    pub fn resume(&mut self, reason: Option<&str>) -> Result<(), EngineError> {
        if !self.is_resumable() {
            return Err(EngineError::not_allowed(
                "StageEngine.resume",
                "game cannot be resumed",
                format!("{} (paused: {})", self.state_level, self.paused),
            ));
        }
        let reason = reason.map_or(Value::Null, |r| json!(r));
        info!("StageEngine: resuming at {}", self.stage);

        self.pause_level = Some(StageLevel::Resuming);
        self.emit(RESUMING, &[reason.clone()])?;

        self.paused = false;
        self.timers.resume_all();

        let buffered = self.transport.take_buffer();
        if !buffered.is_empty() {
            debug!("StageEngine: replaying {} message(s) buffered during the pause", buffered.len());
        }
        match self.resume_handler.clone() {
            Some(handler) => handler(self, buffered)?,
            None => {
                for msg in buffered {
                    self.receive(msg)?;
                }
            }
        }

        self.pause_level = Some(StageLevel::Resumed);
        self.emit(RESUMED, &[reason])?;
        self.pause_level = None;

        if self.should_emit_playing(true) {
            self.emit_playing()?;
        } else if self.stage_level == StageLevel::Done && self.should_step() {
            self.step(Default::default())?;
        }
        Ok(())
    }

    //--- History ----------------------------------------------------------

    /// Re-emits recorded events. Waits for READY if the engine is busy.
    pub fn remit(&mut self, filter: RemitFilter) -> Result<RemitOutcome, EngineError> {
        let ready = self.is_ready();
        let outcome = self.events.remit(filter, ready);
        self.drain_signals()?;
        Ok(outcome)
    }
}
