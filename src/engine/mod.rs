//=========================================================================
// Stage Engine
//
// Orchestrates a participant's walk through the plot.
//
// Architecture:
// ```text
//   StageEngineBuilder ──build()──> StageEngine
//                                     ├─ Plot             sequence + properties
//                                     ├─ EventDispatcher  global/game/stage/step
//                                     ├─ PlayerList       other participants
//                                     ├─ MatcherManager   roles / partners (admin)
//                                     ├─ SizeGate         player-count thresholds
//                                     ├─ TimerRegistry    step/stage/game timers
//                                     ├─ Transport        outbound + inbound buffer
//                                     └─ GameDb           optional records
//
//   start() ──> step() ──> goto_step() ──> exec_step() ──> PLAYING
//                 ▲                                          │
//                 └──── should_step() ◄──── done() ◄─────────┘
// ```
//
// Listener side effects that must reach the engine (size gate updates,
// done or step requests) travel through an `EngineSignal` channel that
// the engine drains after every emission and tick.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::rc::Rc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, trace};
use serde_json::{json, Map, Value};

//=== Internal Dependencies ===============================================

use crate::core::bridge::{targets, GameDb, GameMessage, Transport, Widget, WidgetRegistry, ROOM};
use crate::core::events::{EmitResult, EventDispatcher};
use crate::core::matching::MatcherManager;
use crate::core::roster::{PlayerList, PlayerUpdate};
use crate::core::stage::{
    GameStage, Hook, HookError, Plot, PublishLevel, StageDef, StageLevel, StateLevel, StepDef, UpdateKind,
};
use crate::core::timers::TimerRegistry;

//=== Module Declarations =================================================

mod builder;
mod error;
mod lifecycle;
mod messaging;
mod options;
mod settings;
mod transition;


//=== Public API ==========================================================

pub use builder::StageEngineBuilder;
pub use error::EngineError;
pub use options::{
    OptionsCallback, StageBreak, StartOptions, StepOptions, StepTarget, TransitionOutcome, END_SEQ, GAMEOVER,
};
pub use settings::EngineSettings;

//=== Event Names =========================================================

/// Events the engine emits on its dispatcher.
pub mod names {
    pub use crate::core::events::READY;

    pub const STEP_CALLBACK_EXECUTED: &str = "STEP_CALLBACK_EXECUTED";
    pub const LOADING_FRAME: &str = "LOADING_FRAME";
    pub const LOADED: &str = "LOADED";
    pub const PLAYING: &str = "PLAYING";
    pub const DONE: &str = "DONE";
    pub const PAUSING: &str = "PAUSING";
    pub const PAUSED: &str = "PAUSED";
    pub const RESUMING: &str = "RESUMING";
    pub const RESUMED: &str = "RESUMED";
    pub const TIMEUP: &str = "TIMEUP";
    pub const SIZE_VIOLATION: &str = "SIZE_VIOLATION";
    pub const SIZE_RECOVERY: &str = "SIZE_RECOVERY";
    pub const GAME_ALMOST_OVER: &str = "GAME_ALMOST_OVER";
    pub const GAME_OVER: &str = "GAME_OVER";
}

//=== Handler Types =======================================================

/// Handles one inbound message while the game is paused.
pub type MsgHandler = Rc<dyn Fn(&mut StageEngine, GameMessage) -> Result<(), HookError>>;

/// Receives the messages buffered during a pause.
pub type ResumeHandler = Rc<dyn Fn(&mut StageEngine, Vec<GameMessage>) -> Result<(), HookError>>;

//=== EngineSignal ========================================================

/// Requests posted by listeners, handled once the emission returns.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineSignal {
    /// The roster changed; re-evaluate the size gate.
    RosterChanged,
    /// Call `done()` with this data.
    Done(Map<String, Value>),
    /// Call `step()` if the engine is steppable.
    Step,
}

//=== StageEngine =========================================================

pub(crate) struct Parts {
    pub plot: Plot,
    pub settings: EngineSettings,
    pub transport: Box<dyn Transport>,
    pub db: Option<Box<dyn GameDb>>,
    pub widgets: WidgetRegistry,
    pub init: Option<Hook>,
    pub gameover: Option<Hook>,
    pub pause_handler: Option<MsgHandler>,
    pub resume_handler: Option<ResumeHandler>,
}

/// A participant's game engine. Create it with [`StageEngineBuilder`].
pub struct StageEngine {
    settings: EngineSettings,
    plot: Plot,
    events: EventDispatcher,
    roster: PlayerList,
    matcher: MatcherManager,
    size_gate: crate::core::stage::SizeGate,
    timers: TimerRegistry,
    widgets: WidgetRegistry,
    transport: Box<dyn Transport>,
    db: Option<Box<dyn GameDb>>,

    init_hook: Option<Hook>,
    gameover_hook: Option<Hook>,
    pause_handler: Option<MsgHandler>,
    resume_handler: Option<ResumeHandler>,

    stage: GameStage,
    state_level: StateLevel,
    stage_level: StageLevel,
    pause_level: Option<StageLevel>,
    paused: bool,
    pause_count: u32,
    will_be_done: bool,
    stage_break: StageBreak,
    role: Option<String>,
    partner: Option<String>,
    globals: Map<String, Value>,
    stepped: Vec<GameStage>,
    transitions: u64,
    stage_started_at: Option<chrono::DateTime<chrono::Utc>>,
    widget: Option<Box<dyn Widget>>,
    pending_frame: Option<String>,

    signal_tx: Sender<EngineSignal>,
    signal_rx: Receiver<EngineSignal>,
}

impl StageEngine {
    pub(crate) fn assemble(parts: Parts) -> Self {
        let mut events = EventDispatcher::new();
        events.set_record_history(parts.settings.record_history);

        let roster = PlayerList::with_own_id(parts.settings.player_id.clone());
        let (signal_tx, signal_rx) = unbounded();
        let matcher = MatcherManager::with_missing_id(parts.settings.missing_id.clone());

        Self {
            settings: parts.settings,
            plot: parts.plot,
            events,
            roster,
            matcher,
            size_gate: Default::default(),
            timers: TimerRegistry::new(),
            widgets: parts.widgets,
            transport: parts.transport,
            db: parts.db,
            init_hook: parts.init,
            gameover_hook: parts.gameover,
            pause_handler: parts.pause_handler,
            resume_handler: parts.resume_handler,
            stage: GameStage::NOT_STARTED,
            state_level: StateLevel::Uninitialized,
            stage_level: StageLevel::Uninitialized,
            pause_level: None,
            paused: false,
            pause_count: 0,
            will_be_done: false,
            stage_break: StageBreak::None,
            role: None,
            partner: None,
            globals: Map::new(),
            stepped: Vec::new(),
            transitions: 0,
            stage_started_at: None,
            widget: None,
            pending_frame: None,
            signal_tx,
            signal_rx,
        }
    }

    //--- Accessors --------------------------------------------------------

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn player_id(&self) -> &str {
        &self.settings.player_id
    }

    pub fn plot(&self) -> &Plot {
        &self.plot
    }

    pub fn plot_mut(&mut self) -> &mut Plot {
        &mut self.plot
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Register listeners here. Emit through [`StageEngine::emit`] so that
    /// posted signals are handled.
    pub fn events_mut(&mut self) -> &mut EventDispatcher {
        &mut self.events
    }

    pub fn roster(&self) -> &PlayerList {
        &self.roster
    }

    pub fn roster_mut(&mut self) -> &mut PlayerList {
        &mut self.roster
    }

    pub fn matcher(&self) -> &MatcherManager {
        &self.matcher
    }

    pub fn size_gate(&self) -> &crate::core::stage::SizeGate {
        &self.size_gate
    }

    pub fn timers(&self) -> &TimerRegistry {
        &self.timers
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn db(&self) -> Option<&dyn GameDb> {
        self.db.as_deref()
    }

    pub fn current_stage(&self) -> GameStage {
        self.stage
    }

    pub fn state_level(&self) -> StateLevel {
        self.state_level
    }

    pub fn stage_level(&self) -> StageLevel {
        self.stage_level
    }

    /// Position on the pause branch, `None` when not pausing or resuming.
    pub fn pause_level(&self) -> Option<StageLevel> {
        self.pause_level
    }

    pub fn pause_count(&self) -> u32 {
        self.pause_count
    }

    pub fn globals(&self) -> &Map<String, Value> {
        &self.globals
    }

    pub fn stage_started_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.stage_started_at
    }

    pub fn get_current_step_obj(&self) -> Option<&StepDef> {
        self.plot.get_step(&self.stage)
    }

    pub fn get_current_stage_obj(&self) -> Option<&StageDef> {
        self.plot.get_stage(&self.stage)
    }

    pub fn get_property(&self, name: &str) -> Option<&Value> {
        self.plot.get_property(&self.stage, name)
    }

    /// Handle for listeners that need the engine to act.
    pub fn signal_sender(&self) -> Sender<EngineSignal> {
        self.signal_tx.clone()
    }

    //--- Emission ---------------------------------------------------------

    /// Emits on every scope, then handles signals posted by listeners.
    pub fn emit(&mut self, event: &str, args: &[Value]) -> Result<EmitResult, EngineError> {
        trace!("StageEngine: emit {}", event);
        let result = self.events.emit(event, args);
        self.drain_signals()?;
        Ok(result)
    }

    pub(crate) fn drain_signals(&mut self) -> Result<(), EngineError> {
        while let Ok(signal) = self.signal_rx.try_recv() {
            debug!("StageEngine: handling {:?}", signal);
            match signal {
                EngineSignal::RosterChanged => self.update_size_gate()?,
                EngineSignal::Done(data) => {
                    self.done(data)?;
                }
                EngineSignal::Step => {
                    if self.is_steppable() {
                        self.step(StepOptions::default())?;
                    }
                }
            }
        }
        Ok(())
    }

    //--- Levels -----------------------------------------------------------

    pub(crate) fn set_state_level(&mut self, level: StateLevel) {
        self.state_level = level;
        self.publish(UpdateKind::StateLevel(level));
    }

    pub(crate) fn set_stage_level(&mut self, level: StageLevel) {
        self.stage_level = level;
        self.publish(UpdateKind::StageLevel(level));
    }

    pub(crate) fn set_current_stage(&mut self, stage: GameStage) {
        self.stage = stage;
        self.events.set_current_stage(stage);
        self.publish(UpdateKind::Stage);
    }

    //--- Publishing -------------------------------------------------------

    fn publish_level(&self) -> PublishLevel {
        self.plot
            .get_property_as(&self.stage, "publish_level")
            .unwrap_or(self.settings.publish_level)
    }

    pub fn should_publish_update(&self, kind: UpdateKind) -> bool {
        self.publish_level().allows(kind)
    }

    fn publish(&mut self, kind: UpdateKind) {
        if !self.should_publish_update(kind) {
            return;
        }
        let update = match kind {
            UpdateKind::Stage => PlayerUpdate { stage: Some(self.stage), ..PlayerUpdate::default() },
            UpdateKind::StageLevel(l) => PlayerUpdate { stage_level: Some(l), ..PlayerUpdate::default() },
            UpdateKind::StateLevel(l) => PlayerUpdate { state_level: Some(l), ..PlayerUpdate::default() },
        };
        let data = serde_json::to_value(&update).unwrap_or_else(|_| json!({}));
        let msg = GameMessage::say(targets::PLAYER_UPDATE, ROOM, data)
            .from_sender(self.settings.player_id.clone())
            .at(self.stage);
        self.transport.send(msg);
    }

    //--- Roles and Partners -----------------------------------------------

    pub fn get_role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn get_partner(&self) -> Option<&str> {
        self.partner.as_deref()
    }

    /// Sets the role for the current step and applies its overrides.
    ///
    /// Fails if the step defines roles and `role` is not one of them.
    pub fn set_role(&mut self, role: Option<String>) -> Result<(), EngineError> {
        if let Some(name) = role.as_deref() {
            let step = self.plot.get_step(&self.stage);
            let defines_roles = step.is_some_and(|s| !s.roles.is_empty());
            match step.and_then(|s| s.roles.get(name)).cloned() {
                Some(def) => self.plot.apply_role(&def),
                None if defines_roles => {
                    return Err(EngineError::assignment(
                        "StageEngine.set_role",
                        "role not defined by the current step",
                        name,
                    ))
                }
                None => {}
            }
        }
        debug!("StageEngine: role {:?} at {}", role, self.stage);
        self.role = role;
        Ok(())
    }

    pub fn set_partner(&mut self, partner: Option<String>) {
        debug!("StageEngine: partner {:?} at {}", partner, self.stage);
        self.partner = partner;
    }

    //--- Navigation Queries -----------------------------------------------

    /// Position visited `delta` transitions ago (1 = the previous one).
    pub fn get_previous_step(&self, delta: usize) -> Option<GameStage> {
        let len = self.stepped.len();
        if delta == 0 || delta >= len {
            return None;
        }
        self.stepped.get(len - 1 - delta).copied()
    }

    /// Position `delta` steps ahead in the plot.
    pub fn get_next_step(&self, delta: i32) -> Option<crate::core::stage::NextStep> {
        self.plot.jump(&self.stage, delta)
    }

    pub fn stepped(&self) -> &[GameStage] {
        &self.stepped
    }
}
