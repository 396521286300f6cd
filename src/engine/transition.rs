//=========================================================================
// Transitions
//=========================================================================
//
// step / goto_step / exec_step / done and the PLAYING signal.
//
// goto_step runs in a fixed order:
//
//   a. reset step timers            m. apply StepOptions
//   b. capture exit hooks           n. resolve role
//   c. clear tmp overrides          o. resolve partner
//   d. sync remotes (admin)         p. stage init (new stage)
//   e. step exit, clear step scope  q. step init
//   f. flush buffer if unblocked    r. PLAYING_STEP / INITIALIZED
//   g. destroy step timers          s. recompute globals
//   h. GAMEOVER path                t. size gate
//   i. normalize target             u. flush buffer if unblocked
//   j. lookup (miss → NotFound)     v. record position
//   k. stage exit (stage change)    w. be_done or exec_step
//   l. enter position               x. Advanced
//
// Hooks receive `&mut StageEngine` and may start a transition of their
// own. Each transition bumps a counter; an outer transition that finds
// the counter moved stops where it is.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::time::Duration;

use log::{debug, info, warn};
use serde_json::{json, Map, Value};

//=== Internal Dependencies ===============================================

use super::error::EngineError;
use super::names::{
    DONE, LOADED, LOADING_FRAME, PLAYING, READY, SIZE_RECOVERY, SIZE_VIOLATION, STEP_CALLBACK_EXECUTED, TIMEUP,
};
use super::options::{StageBreak, StepOptions, StepTarget, TransitionOutcome};
use super::{EngineSignal, StageEngine};
use crate::core::bridge::{targets, CommandPayload, DbRecord, GameMessage, MsgAction, RemoteCommand, ROOM, SERVER};
use crate::core::events::ScopeKind;
use crate::core::matching::MatcherSettings;
use crate::core::roster::Roster;
use crate::core::stage::{
    GameStage, RoleSpec, SizeConfig, SizeEvent, SizeGate, StageLevel, StateLevel, StepContext,
};
use crate::core::timers::{TimerFired, TimerKind, TimerScope};

//=== Timer Names =========================================================

const STEP_TIMER: &str = "step_timer";
const PUSH_TIMER: &str = "push_clients";

impl StageEngine {
    //--- Stepping ---------------------------------------------------------

    /// Moves to the next step, or to the next stage after [`StageEngine::break_stage`].
    pub fn step(&mut self, opts: StepOptions) -> Result<TransitionOutcome, EngineError> {
        let next = match std::mem::take(&mut self.stage_break) {
            StageBreak::NextStage => self.plot.next_stage(&self.stage),
            StageBreak::None => self.plot.next(&self.stage),
        };
        self.goto_step(next, opts)
    }

    /// Makes the next `step()` skip the rest of the current stage.
    pub fn break_stage(&mut self) {
        debug!("StageEngine: stage break requested at {}", self.stage);
        self.stage_break = StageBreak::NextStage;
    }

    pub fn stage_break(&self) -> StageBreak {
        self.stage_break
    }

    /// Enters `target`.
    ///
    /// Returns `NotFound` when the target is not part of the plot (or is
    /// `END_SEQ`), `GameOver` when the game-over protocol ran. Hook errors
    /// propagate and leave the levels where the failing hook ran.
    pub fn goto_step(
        &mut self,
        target: impl Into<StepTarget>,
        mut opts: StepOptions,
    ) -> Result<TransitionOutcome, EngineError> {
        let target = target.into();
        if !self.is_steppable() {
            return Err(EngineError::not_allowed(
                "StageEngine.goto_step",
                "game is not steppable",
                self.state_level,
            ));
        }

        if target == StepTarget::EndSeq {
            info!("StageEngine: end of sequence reached at {}", self.stage);
            return Ok(TransitionOutcome::NotFound);
        }

        self.transitions += 1;
        let transition = self.transitions;
        info!("StageEngine: goto_step {} (from {})", target, self.stage);

        // a.
        self.timers.remove(STEP_TIMER);
        self.timers.remove(PUSH_TIMER);

        // b.
        let cur = self.stage;
        let cur_step_exit = self.plot.get_step(&cur).and_then(|s| s.exit.clone());
        let cur_stage_exit = self.plot.get_stage(&cur).and_then(|s| s.exit.clone());

        // c.
        self.plot.clear_tmp_cache();

        let next = match &target {
            StepTarget::At(r) => self.plot.normalize_game_stage(r),
            _ => None,
        };

        // d.
        if self.should_sync_remotes(next) {
            self.sync_remotes(&target, next)?;
        }

        // e.
        if let Some(exit) = cur_step_exit {
            self.set_state_level(StateLevel::StepExit);
            self.set_stage_level(StageLevel::Exiting);
            exit(self)?;
            if self.superseded(transition) {
                return Ok(TransitionOutcome::Advanced);
            }
        }
        self.events.clear_scope(ScopeKind::Step);
        self.size_gate.clear();
        if let Some(mut widget) = self.widget.take() {
            widget.destroy();
        }
        self.pending_frame = None;

        // f.
        self.flush_if_unblocked()?;

        // g.
        self.timers.destroy_scope(TimerScope::Step);

        // h.
        if target == StepTarget::GameOver {
            if cur.is_started() {
                if let Some(exit) = cur_stage_exit {
                    self.set_state_level(StateLevel::StageExit);
                    exit(self)?;
                }
            }
            self.events.clear_scope(ScopeKind::Stage);
            self.timers.destroy_scope(TimerScope::Stage);
            self.gameover()?;
            return Ok(TransitionOutcome::GameOver);
        }

        // i. / j.
        let Some(next) = next else {
            warn!("StageEngine.goto_step: target not found in the plot. Found: {}", target);
            return Ok(TransitionOutcome::NotFound);
        };

        // k.
        let new_stage = !cur.is_started() || cur.stage != next.stage;
        if new_stage {
            if cur.is_started() {
                if let Some(exit) = cur_stage_exit {
                    self.set_state_level(StateLevel::StageExit);
                    self.set_stage_level(StageLevel::Exiting);
                    exit(self)?;
                    if self.superseded(transition) {
                        return Ok(TransitionOutcome::Advanced);
                    }
                }
            }
            self.timers.destroy_scope(TimerScope::Stage);
        }

        // l.
        self.stage_level = StageLevel::Uninitialized;
        self.will_be_done = false;
        self.set_current_stage(next);
        self.plot.pin_tmp_cache(next);

        // m.
        let role_override = opts.role.take();
        let partner_override = opts.partner.take();
        let be_done = opts.be_done;
        self.apply_options(opts)?;

        // n.
        let role = match role_override {
            Some(role) => Some(role),
            None => self.resolve_role(next)?,
        };
        self.set_role(role)?;

        // o.
        let partner = match partner_override {
            Some(partner) => Some(partner),
            None => self.resolve_partner(next)?,
        };
        self.set_partner(partner);

        // p.
        if new_stage {
            self.stage_started_at = Some(chrono::Utc::now());
            self.events.clear_scope(ScopeKind::Stage);
            if let Some(init) = self.plot.get_stage(&next).and_then(|s| s.init.clone()) {
                self.set_state_level(StateLevel::StageInit);
                self.set_stage_level(StageLevel::Initializing);
                init(self)?;
                if self.superseded(transition) {
                    return Ok(TransitionOutcome::Advanced);
                }
            }
        }

        // q.
        if let Some(init) = self.plot.step_init(&next) {
            self.set_state_level(StateLevel::StepInit);
            self.set_stage_level(StageLevel::Initializing);
            init(self)?;
            if self.superseded(transition) {
                return Ok(TransitionOutcome::Advanced);
            }
        }

        // r.
        self.set_state_level(StateLevel::PlayingStep);
        self.set_stage_level(StageLevel::Initialized);

        // s.
        self.globals = self.plot.get_globals(&next);

        // t.
        self.init_size_gate(next)?;

        // u.
        self.flush_if_unblocked()?;
        if self.superseded(transition) {
            return Ok(TransitionOutcome::Advanced);
        }

        // v.
        self.stepped.push(next);

        // w.
        if be_done {
            self.will_be_done = true;
            self.became_ready()?;
            if self.superseded(transition) {
                return Ok(TransitionOutcome::Advanced);
            }
            self.mark_loaded()?;
        } else {
            self.exec_step(next, transition)?;
        }

        // x.
        Ok(TransitionOutcome::Advanced)
    }

    fn superseded(&self, transition: u64) -> bool {
        if self.transitions != transition {
            debug!("StageEngine: transition {} superseded by {}", transition, self.transitions);
            return true;
        }
        false
    }

    //--- Options ----------------------------------------------------------

    fn apply_options(&mut self, opts: StepOptions) -> Result<(), EngineError> {
        for (name, value) in &opts.plot {
            self.plot.tmp_cache(name, value.clone());
        }
        if opts.will_be_done {
            self.will_be_done = true;
        }
        for msg in opts.msgs.iter().cloned() {
            self.receive(msg)?;
        }
        if let Some(cb) = opts.cb.clone() {
            cb(self, &opts)?;
        }
        Ok(())
    }

    //--- Roles and Partners -----------------------------------------------

    fn resolve_role(&self, pos: GameStage) -> Result<Option<String>, EngineError> {
        let Some(step) = self.plot.get_step(&pos) else {
            return Ok(None);
        };
        let role = match &step.role {
            RoleSpec::Unset => None,
            RoleSpec::Keep => match &self.role {
                Some(role) => Some(role.clone()),
                None => {
                    return Err(EngineError::assignment(
                        "StageEngine.goto_step",
                        "step keeps the previous role, but there is none",
                        pos,
                    ))
                }
            },
            RoleSpec::Named(name) => Some(name.clone()),
            RoleSpec::Dynamic(assign) => assign(self),
        };
        if role.is_none() && !step.roles.is_empty() {
            return Err(EngineError::assignment(
                "StageEngine.goto_step",
                "step defines roles, but no role was assigned",
                pos,
            ));
        }
        Ok(role)
    }

    fn resolve_partner(&self, pos: GameStage) -> Result<Option<String>, EngineError> {
        let Some(step) = self.plot.get_step(&pos) else {
            return Ok(None);
        };
        Ok(match &step.partner {
            RoleSpec::Unset => None,
            RoleSpec::Keep => match &self.partner {
                Some(partner) => Some(partner.clone()),
                None => {
                    return Err(EngineError::assignment(
                        "StageEngine.goto_step",
                        "step keeps the previous partner, but there is none",
                        pos,
                    ))
                }
            },
            RoleSpec::Named(name) => Some(name.clone()),
            RoleSpec::Dynamic(assign) => assign(self),
        })
    }

    //--- Synchronized Stepping --------------------------------------------

    fn should_sync_remotes(&self, next: Option<GameStage>) -> bool {
        if !self.settings.admin {
            return false;
        }
        next.and_then(|pos| self.plot.get_property_as::<bool>(&pos, "sync_stepping"))
            .unwrap_or(self.settings.sync_stepping)
    }

    /// Sends `goto_step` to the other participants, one command each when
    /// the target step has a `matcher` property, a broadcast otherwise.
    fn sync_remotes(&mut self, target: &StepTarget, next: Option<GameStage>) -> Result<(), EngineError> {
        let target_str = match next {
            Some(pos) => pos.to_string(),
            None => target.to_string(),
        };

        let ids: Vec<String> = self
            .roster
            .iter()
            .filter(|p| !p.admin && !p.disconnected)
            .map(|p| p.id.clone())
            .collect();

        let settings = next.and_then(|pos| self.plot.get_property_as::<MatcherSettings>(&pos, "matcher"));
        let tmp_plot = next
            .and_then(|pos| self.plot.get_property(&pos, "remote_plot").cloned())
            .unwrap_or_else(|| json!({}));

        match (settings, next) {
            (Some(settings), Some(pos)) if !ids.is_empty() => {
                let assignments = self.matcher.match_step(&settings, pos.round, &ids)?;
                info!("StageEngine: sending {} matched goto_step command(s) for {}", assignments.len(), pos);
                let mut sorted: Vec<_> = assignments.into_iter().collect();
                sorted.sort_by(|a, b| a.0.cmp(&b.0));
                for (id, assignment) in sorted {
                    let mut options = Map::new();
                    options.insert("target".into(), Value::String(target_str.clone()));
                    if let Some(role) = assignment.role {
                        options.insert("role".into(), json!(role));
                    }
                    if let Some(partner) = assignment.partner {
                        options.insert("partner".into(), json!(partner));
                    }
                    options.insert("plot".into(), tmp_plot.clone());
                    self.send_command(RemoteCommand::GotoStep, Value::Object(options), id);
                }
            }
            _ => {
                debug!("StageEngine: broadcasting goto_step {}", target_str);
                self.send_command(
                    RemoteCommand::GotoStep,
                    json!({ "target": target_str, "plot": tmp_plot }),
                    ROOM.to_string(),
                );
            }
        }
        Ok(())
    }

    pub(crate) fn send_command(&mut self, command: RemoteCommand, options: Value, to: String) {
        let msg = CommandPayload::new(command, options)
            .into_message(to)
            .from_sender(self.settings.player_id.clone())
            .at(self.stage);
        self.transport.send(msg);
    }

    //--- Step Body --------------------------------------------------------

    fn exec_step(&mut self, pos: GameStage, transition: u64) -> Result<(), EngineError> {
        let (widget, frame) = match self.plot.get_step(&pos) {
            Some(step) => (step.widget.clone(), step.frame.clone()),
            None => (None, None),
        };

        if let Some(spec) = widget {
            match self.widgets.create(&spec) {
                Some(Ok(widget)) => self.widget = Some(widget),
                Some(Err(e)) => return Err(e.into()),
                None => return Err(EngineError::UnknownWidget(spec.name)),
            }
        }

        if let Some(frame) = &frame {
            self.pending_frame = Some(frame.clone());
            self.emit(LOADING_FRAME, &[json!(frame)])?;
        }

        self.set_stage_level(StageLevel::ExecutingCallback);
        if let Some(cb) = self.plot.step_cb(&pos) {
            if !cb(self)? {
                warn!("StageEngine.exec_step: step callback reported failure. Found: {}", pos);
            }
        }
        if self.superseded(transition) {
            return Ok(());
        }

        self.set_stage_level(StageLevel::CallbackExecuted);
        self.emit(STEP_CALLBACK_EXECUTED, &[])?;
        if self.superseded(transition) {
            return Ok(());
        }

        self.became_ready()?;
        if self.superseded(transition) {
            return Ok(());
        }

        if self.pending_frame.is_none() {
            self.mark_loaded()?;
        }
        Ok(())
    }

    /// Reports that the step's frame finished loading.
    pub fn frame_loaded(&mut self) -> Result<(), EngineError> {
        if self.pending_frame.take().is_none() {
            warn!("StageEngine.frame_loaded: no frame is loading. Found: {}", self.stage);
            return Ok(());
        }
        if self.stage_level == StageLevel::CallbackExecuted {
            self.mark_loaded()?;
        }
        Ok(())
    }

    fn mark_loaded(&mut self) -> Result<(), EngineError> {
        let stage = self.stage;
        self.set_stage_level(StageLevel::Loaded);
        self.emit(LOADED, &[])?;
        if self.stage == stage && self.should_emit_playing(true) {
            self.emit_playing()?;
        }
        Ok(())
    }

    /// Flushes the inbound buffer and emits READY.
    pub(crate) fn became_ready(&mut self) -> Result<(), EngineError> {
        if !self.is_ready() {
            return Ok(());
        }
        self.flush_if_unblocked()?;
        self.emit(READY, &[])?;
        Ok(())
    }

    pub(crate) fn flush_if_unblocked(&mut self) -> Result<(), EngineError> {
        if !self.is_ready() || self.transport.buffered() == 0 {
            return Ok(());
        }
        let msgs = self.transport.take_buffer();
        debug!("StageEngine: flushing {} buffered message(s)", msgs.len());
        for msg in msgs {
            self.receive(msg)?;
        }
        Ok(())
    }

    //--- PLAYING ----------------------------------------------------------

    /// Whether PLAYING may be emitted now.
    ///
    /// `strict` also requires the stage level to be LOADED. A step with
    /// the `sync_on_loaded` property waits for the roster to load it.
    pub fn should_emit_playing(&self, strict: bool) -> bool {
        if strict && self.stage_level != StageLevel::Loaded {
            return false;
        }
        if !self.is_ready() {
            return false;
        }
        let sync_on_loaded = self
            .plot
            .get_property_as::<bool>(&self.stage, "sync_on_loaded")
            .unwrap_or(false);
        !sync_on_loaded || self.roster.is_step_loaded(self.stage)
    }

    pub(crate) fn emit_playing(&mut self) -> Result<(), EngineError> {
        let stage = self.stage;
        self.set_stage_level(StageLevel::Playing);

        if let Some(ms) = self.plot.get_property_as::<u64>(&stage, "timer") {
            self.timers
                .add(STEP_TIMER, TimerScope::Step, TimerKind::StepTimeup, Duration::from_millis(ms));
        }
        if self.settings.admin {
            if let Some(ms) = self.plot.get_property_as::<u64>(&stage, "push_clients") {
                self.timers
                    .add(PUSH_TIMER, TimerScope::Step, TimerKind::PushClients, Duration::from_millis(ms));
            }
        }

        self.emit(PLAYING, &[])?;

        if self.will_be_done && self.stage == stage && self.stage_level == StageLevel::Playing {
            self.will_be_done = false;
            self.done(Map::new())?;
        }
        Ok(())
    }

    //--- Done -------------------------------------------------------------

    /// Marks the current step as done and steps if the step rule allows it.
    ///
    /// Returns `Ok(false)` when the call is refused (engine not ready,
    /// already done, invalid widget input or a done hook said no).
    pub fn done(&mut self, mut data: Map<String, Value>) -> Result<bool, EngineError> {
        if !self.is_ready() || self.stage_level >= StageLevel::DoneCalled {
            warn!(
                "StageEngine.done: engine not ready or step already done. Found: {} / {}",
                self.state_level, self.stage_level
            );
            return Ok(false);
        }
        if self.widget.as_ref().is_some_and(|w| !w.is_valid()) {
            warn!("StageEngine.done: widget input is not valid. Found: {}", self.stage);
            return Ok(false);
        }

        let stage = self.stage;
        let previous = self.stage_level;
        self.set_stage_level(StageLevel::DoneCalled);

        if let Some(hook) = self.plot.step_done(&stage) {
            if !hook(self, &mut data)? {
                debug!("StageEngine: done hook cancelled done() at {}", stage);
                if self.stage == stage {
                    self.stage_level = previous;
                }
                return Ok(false);
            }
        }

        if let Some(widget) = self.widget.as_mut() {
            for (k, v) in widget.get_values() {
                data.entry(k).or_insert(v);
            }
        }

        self.set_stage_level(StageLevel::GettingDone);
        data.insert("done".into(), json!(true));

        let msg = GameMessage::set(targets::DATA, SERVER, Value::Object(data.clone()))
            .from_sender(self.settings.player_id.clone())
            .at(stage);
        self.transport.send(msg);

        if let Some(db) = self.db.as_mut() {
            let mut record = DbRecord::new(self.settings.player_id.clone(), stage, data.clone());
            record.session = self.settings.session.clone();
            record.treatment = self.settings.treatment.clone();
            db.add(record);
        }

        self.set_stage_level(StageLevel::Done);
        info!("StageEngine: done at {}", stage);
        self.emit(DONE, &[Value::Object(data)])?;

        if self.stage == stage && self.stage_level == StageLevel::Done && self.should_step() {
            self.step(StepOptions::default())?;
        }
        Ok(true)
    }

    /// Whether the current step rule and size gate allow stepping now.
    pub fn should_step(&self) -> bool {
        if self.paused || !self.is_steppable() {
            return false;
        }
        let rule = self.plot.get_step_rule(&self.stage);
        let ctx = StepContext {
            stage: self.stage,
            stage_level: self.stage_level,
            roster: &self.roster,
            plot: &self.plot,
        };
        rule.should_step(&ctx) && self.check_size()
    }

    //--- Size Gate --------------------------------------------------------

    pub fn check_size(&self) -> bool {
        self.size_gate
            .check_size(SizeGate::count(&self.roster, self.settings.admin))
    }

    fn init_size_gate(&mut self, pos: GameStage) -> Result<(), EngineError> {
        let config = SizeConfig {
            min_players: self.plot.get_property_as(&pos, "min_players"),
            max_players: self.plot.get_property_as(&pos, "max_players"),
            exact_players: self.plot.get_property_as(&pos, "exact_players"),
        };
        if config.is_empty() {
            self.size_gate.clear();
            return Ok(());
        }

        let count = SizeGate::count(&self.roster, self.settings.admin);
        let events = self.size_gate.init(&config, count)?;

        for (target, label) in [(targets::PCONNECT, "size_gate.connect"), (targets::PDISCONNECT, "size_gate.disconnect")] {
            let event = format!("in.{}.{}", MsgAction::Say, target);
            let tx = self.signal_tx.clone();
            self.events.step.on(
                &event,
                move |_| {
                    let _ = tx.send(EngineSignal::RosterChanged);
                    None
                },
                Some(label),
            )?;
        }

        self.handle_size_events(events)
    }

    pub(crate) fn update_size_gate(&mut self) -> Result<(), EngineError> {
        if !self.size_gate.is_active() {
            return Ok(());
        }
        let count = SizeGate::count(&self.roster, self.settings.admin);
        let events = self.size_gate.update(count);
        self.handle_size_events(events)?;

        if self.stage_level == StageLevel::Done && self.should_step() {
            self.step(StepOptions::default())?;
        }
        Ok(())
    }

    fn handle_size_events(&mut self, events: Vec<SizeEvent>) -> Result<(), EngineError> {
        for event in events {
            let step = self.plot.get_step(&self.stage);
            let (hook, name, bound) = match event {
                SizeEvent::Violated(bound) => (step.and_then(|s| s.on_size_violation.clone()), SIZE_VIOLATION, bound),
                SizeEvent::Recovered(bound) => (step.and_then(|s| s.on_size_recovery.clone()), SIZE_RECOVERY, bound),
            };
            if let Some(hook) = hook {
                hook(self, bound)?;
            }
            self.emit(name, &[json!(bound.to_string())])?;
        }
        Ok(())
    }

    //--- Timers -----------------------------------------------------------

    /// Adds a timer that emits `event` when it expires.
    pub fn add_timer(&mut self, name: &str, scope: TimerScope, duration: Duration, event: &str) {
        self.timers.add(name, scope, TimerKind::Event(event.to_string()), duration);
    }

    /// Advances time: runs deferred emissions, handles listener signals and
    /// fires expired timers.
    pub fn tick(&mut self, elapsed: Duration) -> Result<(), EngineError> {
        let ran = self.events.run_deferred(self.settings.max_deferred_per_tick);
        if ran > 0 {
            debug!("StageEngine: ran {} deferred emission(s)", ran);
        }
        self.drain_signals()?;

        for fired in self.timers.tick(elapsed) {
            self.on_timer(fired)?;
        }
        Ok(())
    }

    fn on_timer(&mut self, fired: TimerFired) -> Result<(), EngineError> {
        debug!("StageEngine: timer '{}' ({}) expired", fired.name, fired.scope);
        match fired.kind {
            TimerKind::StepTimeup => {
                self.emit(TIMEUP, &[])?;
                let timeup = self.plot.get_property(&self.stage, "timeup").and_then(Value::as_str);
                if timeup == Some("done") {
                    self.done(Map::new())?;
                }
            }
            TimerKind::PushClients => self.push_clients(),
            TimerKind::Event(event) => {
                self.emit(&event, &[])?;
            }
        }
        Ok(())
    }

    /// Sends `push_step` to participants still working on the current step.
    fn push_clients(&mut self) {
        let stage = self.stage;
        let late: Vec<String> = self
            .roster
            .iter()
            .filter(|p| !p.admin && !p.disconnected && p.stage == stage && p.stage_level < StageLevel::Done)
            .map(|p| p.id.clone())
            .collect();
        info!("StageEngine: pushing {} participant(s) at {}", late.len(), stage);
        for id in late {
            self.send_command(RemoteCommand::PushStep, json!({}), id);
        }
    }
}
