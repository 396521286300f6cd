//=========================================================================
// Plot
//=========================================================================
//
// The game sequence: stages made of steps, each stage repeated a number
// of rounds.
//
// Architecture:
//   Plot
//     ├─ stages: Vec<StageDef>          (1-based in GameStage)
//     │    └─ steps: Vec<StepDef>
//     ├─ defaults: property bag         (last lookup fallback)
//     └─ overlay: StepOverlay           (per-step temporary overrides)
//
// Navigation:
//   0.0.0 ──next──> 1.1.1 ──next──> ... ──next──> GameOver | EndSeq
//
// Property lookup: overlay → step → stage → defaults.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::{debug, warn};
use serde_json::{Map, Value};

//=== Internal Dependencies ===============================================

use super::error::{HookError, StageError};
use super::game_stage::{GameStage, GameStageRef, StageKey};
use super::size_gate::SizeBound;
use super::step_rule::StepRule;
use crate::core::bridge::WidgetSpec;
use crate::engine::StageEngine;

//=== Hook Types ==========================================================

/// Stage or step init/exit hook.
pub type Hook = Rc<dyn Fn(&mut StageEngine) -> Result<(), HookError>>;

/// Step body. `Ok(false)` is reported as a non-fatal error.
pub type StepCallback = Rc<dyn Fn(&mut StageEngine) -> Result<bool, HookError>>;

/// Runs when the participant calls `done`; may edit the outgoing data.
/// `Ok(false)` cancels the done call.
pub type DoneHook = Rc<dyn Fn(&mut StageEngine, &mut Map<String, Value>) -> Result<bool, HookError>>;

/// Computes a role or partner when entering a step.
pub type AssignFn = Rc<dyn Fn(&StageEngine) -> Option<String>>;

/// Runs when a player-count threshold is violated or recovers.
pub type SizeHook = Rc<dyn Fn(&mut StageEngine, SizeBound) -> Result<(), HookError>>;

//=== RoleSpec ============================================================

/// How a role (or partner) is chosen when entering a step.
#[derive(Clone, Default)]
pub enum RoleSpec {
    /// No role for this step.
    #[default]
    Unset,
    /// Keep the one from the previous step; an error if there is none.
    Keep,
    Named(String),
    Dynamic(AssignFn),
}

/// Partners are chosen the same way roles are.
pub type PartnerSpec = RoleSpec;

impl RoleSpec {
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&StageEngine) -> Option<String> + 'static,
    {
        RoleSpec::Dynamic(Rc::new(f))
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, RoleSpec::Unset)
    }
}

impl From<&str> for RoleSpec {
    fn from(value: &str) -> Self {
        RoleSpec::Named(value.to_string())
    }
}

impl From<String> for RoleSpec {
    fn from(value: String) -> Self {
        RoleSpec::Named(value)
    }
}

impl fmt::Debug for RoleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleSpec::Unset => f.write_str("Unset"),
            RoleSpec::Keep => f.write_str("Keep"),
            RoleSpec::Named(name) => write!(f, "Named({})", name),
            RoleSpec::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

//=== RoleDef =============================================================

/// Overrides applied to a step when the participant holds a role.
#[derive(Clone, Default)]
pub struct RoleDef {
    pub cb: Option<StepCallback>,
    pub init: Option<Hook>,
    pub done: Option<DoneHook>,
    pub properties: Map<String, Value>,
}

impl RoleDef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cb<F>(mut self, cb: F) -> Self
    where
        F: Fn(&mut StageEngine) -> Result<bool, HookError> + 'static,
    {
        self.cb = Some(Rc::new(cb));
        self
    }

    pub fn with_init<F>(mut self, init: F) -> Self
    where
        F: Fn(&mut StageEngine) -> Result<(), HookError> + 'static,
    {
        self.init = Some(Rc::new(init));
        self
    }

    pub fn with_done<F>(mut self, done: F) -> Self
    where
        F: Fn(&mut StageEngine, &mut Map<String, Value>) -> Result<bool, HookError> + 'static,
    {
        self.done = Some(Rc::new(done));
        self
    }

    pub fn with_property(mut self, name: &str, value: Value) -> Self {
        self.properties.insert(name.to_string(), value);
        self
    }
}

//=== StepDef =============================================================

#[derive(Clone, Default)]
pub struct StepDef {
    pub id: String,
    pub cb: Option<StepCallback>,
    pub init: Option<Hook>,
    pub exit: Option<Hook>,
    pub done: Option<DoneHook>,
    pub role: RoleSpec,
    pub partner: PartnerSpec,
    pub roles: HashMap<String, RoleDef>,
    pub step_rule: Option<StepRule>,
    pub widget: Option<WidgetSpec>,
    pub frame: Option<String>,
    pub on_size_violation: Option<SizeHook>,
    pub on_size_recovery: Option<SizeHook>,
    pub properties: Map<String, Value>,
}

impl StepDef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_cb<F>(mut self, cb: F) -> Self
    where
        F: Fn(&mut StageEngine) -> Result<bool, HookError> + 'static,
    {
        self.cb = Some(Rc::new(cb));
        self
    }

    pub fn with_init<F>(mut self, init: F) -> Self
    where
        F: Fn(&mut StageEngine) -> Result<(), HookError> + 'static,
    {
        self.init = Some(Rc::new(init));
        self
    }

    pub fn with_exit<F>(mut self, exit: F) -> Self
    where
        F: Fn(&mut StageEngine) -> Result<(), HookError> + 'static,
    {
        self.exit = Some(Rc::new(exit));
        self
    }

    pub fn with_done<F>(mut self, done: F) -> Self
    where
        F: Fn(&mut StageEngine, &mut Map<String, Value>) -> Result<bool, HookError> + 'static,
    {
        self.done = Some(Rc::new(done));
        self
    }

    pub fn with_role(mut self, role: RoleSpec) -> Self {
        self.role = role;
        self
    }

    pub fn with_partner(mut self, partner: PartnerSpec) -> Self {
        self.partner = partner;
        self
    }

    pub fn with_role_def(mut self, name: &str, def: RoleDef) -> Self {
        self.roles.insert(name.to_string(), def);
        self
    }

    pub fn with_step_rule(mut self, rule: StepRule) -> Self {
        self.step_rule = Some(rule);
        self
    }

    pub fn with_widget(mut self, widget: WidgetSpec) -> Self {
        self.widget = Some(widget);
        self
    }

    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.frame = Some(frame.into());
        self
    }

    pub fn on_size_violation<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut StageEngine, SizeBound) -> Result<(), HookError> + 'static,
    {
        self.on_size_violation = Some(Rc::new(hook));
        self
    }

    pub fn on_size_recovery<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut StageEngine, SizeBound) -> Result<(), HookError> + 'static,
    {
        self.on_size_recovery = Some(Rc::new(hook));
        self
    }

    pub fn with_property(mut self, name: &str, value: Value) -> Self {
        self.properties.insert(name.to_string(), value);
        self
    }
}

impl fmt::Debug for StepDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDef")
            .field("id", &self.id)
            .field("cb", &self.cb.is_some())
            .field("init", &self.init.is_some())
            .field("exit", &self.exit.is_some())
            .field("role", &self.role)
            .field("roles", &self.roles.keys().collect::<Vec<_>>())
            .field("step_rule", &self.step_rule)
            .field("properties", &self.properties)
            .finish()
    }
}

//=== StageDef ============================================================

#[derive(Clone)]
pub struct StageDef {
    pub id: String,
    pub steps: Vec<StepDef>,
    pub repeat: u32,
    pub init: Option<Hook>,
    pub exit: Option<Hook>,
    pub properties: Map<String, Value>,
}

impl StageDef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            steps: Vec::new(),
            repeat: 1,
            init: None,
            exit: None,
            properties: Map::new(),
        }
    }

    pub fn with_step(mut self, step: StepDef) -> Self {
        self.steps.push(step);
        self
    }

    /// Number of rounds the stage is played.
    pub fn with_repeat(mut self, repeat: u32) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn with_init<F>(mut self, init: F) -> Self
    where
        F: Fn(&mut StageEngine) -> Result<(), HookError> + 'static,
    {
        self.init = Some(Rc::new(init));
        self
    }

    pub fn with_exit<F>(mut self, exit: F) -> Self
    where
        F: Fn(&mut StageEngine) -> Result<(), HookError> + 'static,
    {
        self.exit = Some(Rc::new(exit));
        self
    }

    pub fn with_property(mut self, name: &str, value: Value) -> Self {
        self.properties.insert(name.to_string(), value);
        self
    }
}

impl fmt::Debug for StageDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageDef")
            .field("id", &self.id)
            .field("steps", &self.steps)
            .field("repeat", &self.repeat)
            .field("properties", &self.properties)
            .finish()
    }
}

//=== NextStep ============================================================

/// Result of navigating the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    At(GameStage),
    /// The sequence is over and the game ends.
    GameOver,
    /// The sequence is over but the game stays open.
    EndSeq,
}

//=== RoundMode ===========================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundMode {
    Current,
    Remaining,
    Total,
}

//=== StepOverlay =========================================================

/// Temporary overrides for the current step (role overrides, `plot`
/// transition options). Cleared at every transition.
#[derive(Clone, Default)]
pub struct StepOverlay {
    at: Option<GameStage>,
    properties: Map<String, Value>,
    cb: Option<StepCallback>,
    init: Option<Hook>,
    done: Option<DoneHook>,
}

impl StepOverlay {
    fn applies_to(&self, pos: &GameStage) -> bool {
        self.at.map_or(true, |at| at == *pos)
    }

    fn is_empty(&self) -> bool {
        self.properties.is_empty() && self.cb.is_none() && self.init.is_none() && self.done.is_none()
    }
}

//=== Plot ================================================================

#[derive(Clone)]
pub struct Plot {
    stages: Vec<StageDef>,
    defaults: Map<String, Value>,
    default_step_rule: StepRule,
    end_with_game_over: bool,
    overlay: StepOverlay,
}

impl Plot {
    //--- Construction -----------------------------------------------------

    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            defaults: Map::new(),
            default_step_rule: StepRule::Solo,
            end_with_game_over: true,
            overlay: StepOverlay::default(),
        }
    }

    pub fn from_stages(stages: Vec<StageDef>) -> Result<Self, StageError> {
        let mut plot = Self::new();
        for stage in stages {
            plot.add_stage(stage)?;
        }
        Ok(plot)
    }

    /// Appends a stage after validating ids, steps and repeat count.
    pub fn add_stage(&mut self, stage: StageDef) -> Result<(), StageError> {
        let invalid = |reason, found: &str| StageError::InvalidPlot {
            method: "Plot.add_stage",
            reason,
            found: found.to_string(),
        };

        if stage.id.trim().is_empty() {
            return Err(invalid("stage id must be a non-empty string", &stage.id));
        }
        if self.stages.iter().any(|s| s.id == stage.id) {
            return Err(invalid("duplicate stage id", &stage.id));
        }
        if stage.steps.is_empty() {
            return Err(invalid("stage has no steps", &stage.id));
        }
        if stage.repeat == 0 {
            return Err(invalid("repeat must be at least 1", &stage.id));
        }
        for (i, step) in stage.steps.iter().enumerate() {
            if step.id.trim().is_empty() {
                return Err(invalid("step id must be a non-empty string", &stage.id));
            }
            if stage.steps[..i].iter().any(|s| s.id == step.id) {
                return Err(invalid("duplicate step id", &step.id));
            }
        }

        debug!("Plot: added stage '{}' ({} steps, {} rounds)", stage.id, stage.steps.len(), stage.repeat);
        self.stages.push(stage);
        Ok(())
    }

    pub fn with_default(mut self, name: &str, value: Value) -> Self {
        self.defaults.insert(name.to_string(), value);
        self
    }

    pub fn with_default_step_rule(mut self, rule: StepRule) -> Self {
        self.default_step_rule = rule;
        self
    }

    /// Ends the sequence with `EndSeq` instead of game over.
    pub fn ending_without_game_over(mut self) -> Self {
        self.end_with_game_over = false;
        self
    }

    //--- Lookup -----------------------------------------------------------

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn stages(&self) -> &[StageDef] {
        &self.stages
    }

    pub fn get_stage(&self, pos: &GameStage) -> Option<&StageDef> {
        let idx = (pos.stage as usize).checked_sub(1)?;
        self.stages.get(idx)
    }

    pub fn get_step(&self, pos: &GameStage) -> Option<&StepDef> {
        let idx = (pos.step as usize).checked_sub(1)?;
        self.get_stage(pos)?.steps.get(idx)
    }

    /// Resolves ids and indices into a position inside the sequence.
    ///
    /// Round `0` is read as round `1`. Returns `None` if the stage, the
    /// step or the round does not exist.
    pub fn normalize_game_stage(&self, target: &GameStageRef) -> Option<GameStage> {
        let stage_idx = match &target.stage {
            StageKey::Index(n) => (*n as usize).checked_sub(1).filter(|i| *i < self.stages.len())?,
            StageKey::Id(id) => self.stages.iter().position(|s| &s.id == id)?,
        };
        let stage = &self.stages[stage_idx];

        let step_idx = match &target.step {
            StageKey::Index(n) => (*n as usize).checked_sub(1).filter(|i| *i < stage.steps.len())?,
            StageKey::Id(id) => stage.steps.iter().position(|s| &s.id == id)?,
        };

        let round = target.round.max(1);
        if round > stage.repeat {
            return None;
        }

        Some(GameStage::new(stage_idx as u32 + 1, step_idx as u32 + 1, round))
    }

    //--- Navigation -------------------------------------------------------

    fn end(&self) -> NextStep {
        if self.end_with_game_over {
            NextStep::GameOver
        } else {
            NextStep::EndSeq
        }
    }

    pub fn next(&self, pos: &GameStage) -> NextStep {
        if !pos.is_started() {
            return if self.stages.is_empty() {
                self.end()
            } else {
                NextStep::At(GameStage::new(1, 1, 1))
            };
        }

        let Some(stage) = self.get_stage(pos) else {
            warn!("Plot.next: position outside the sequence. Found: {}", pos);
            return self.end();
        };

        if (pos.step as usize) < stage.steps.len() {
            NextStep::At(GameStage::new(pos.stage, pos.step + 1, pos.round))
        } else if pos.round < stage.repeat {
            NextStep::At(GameStage::new(pos.stage, 1, pos.round + 1))
        } else {
            self.next_stage(pos)
        }
    }

    /// First step of the following stage, skipping remaining rounds.
    pub fn next_stage(&self, pos: &GameStage) -> NextStep {
        if (pos.stage as usize) < self.stages.len() {
            NextStep::At(GameStage::new(pos.stage + 1, 1, 1))
        } else {
            self.end()
        }
    }

    pub fn previous(&self, pos: &GameStage) -> Option<GameStage> {
        if !pos.is_started() {
            return None;
        }
        if pos.step > 1 {
            return Some(GameStage::new(pos.stage, pos.step - 1, pos.round));
        }
        let stage = self.get_stage(pos)?;
        if pos.round > 1 {
            return Some(GameStage::new(pos.stage, stage.steps.len() as u32, pos.round - 1));
        }
        if pos.stage > 1 {
            let prev = &self.stages[pos.stage as usize - 2];
            return Some(GameStage::new(pos.stage - 1, prev.steps.len() as u32, prev.repeat));
        }
        None
    }

    /// Moves `delta` steps forward (positive) or backward (negative).
    ///
    /// Returns `None` when walking back past the first step.
    pub fn jump(&self, pos: &GameStage, delta: i32) -> Option<NextStep> {
        let mut cur = *pos;
        if delta >= 0 {
            for _ in 0..delta {
                match self.next(&cur) {
                    NextStep::At(gs) => cur = gs,
                    end => return Some(end),
                }
            }
        } else {
            for _ in 0..delta.unsigned_abs() {
                cur = self.previous(&cur)?;
            }
        }
        Some(NextStep::At(cur))
    }

    /// Steps left before the next stage starts, the current one included.
    ///
    /// With `count_repeat` the steps of the remaining rounds are added.
    pub fn steps_to_next_stage(&self, pos: &GameStage, count_repeat: bool) -> Option<u32> {
        let stage = self.get_stage(pos)?;
        let len = stage.steps.len() as u32;
        if pos.step == 0 || pos.step > len {
            return None;
        }
        let mut left = len - pos.step + 1;
        if count_repeat && pos.round < stage.repeat {
            left += (stage.repeat - pos.round) * len;
        }
        Some(left)
    }

    pub fn is_last_step(&self, pos: &GameStage) -> bool {
        self.steps_to_next_stage(pos, false) == Some(1)
    }

    pub fn get_round(&self, pos: &GameStage, mode: RoundMode) -> Option<u32> {
        let stage = self.get_stage(pos)?;
        Some(match mode {
            RoundMode::Current => pos.round,
            RoundMode::Total => stage.repeat,
            RoundMode::Remaining => stage.repeat.saturating_sub(pos.round),
        })
    }

    //--- Properties -------------------------------------------------------

    /// Looks a property up: overlay, step, stage, then plot defaults.
    pub fn get_property(&self, pos: &GameStage, name: &str) -> Option<&Value> {
        if self.overlay.applies_to(pos) {
            if let Some(v) = self.overlay.properties.get(name) {
                return Some(v);
            }
        }
        if let Some(v) = self.get_step(pos).and_then(|s| s.properties.get(name)) {
            return Some(v);
        }
        if let Some(v) = self.get_stage(pos).and_then(|s| s.properties.get(name)) {
            return Some(v);
        }
        self.defaults.get(name)
    }

    /// Like [`Plot::get_property`], deserialized into `T`.
    ///
    /// A property that does not fit `T` is logged and treated as missing.
    pub fn get_property_as<T: serde::de::DeserializeOwned>(&self, pos: &GameStage, name: &str) -> Option<T> {
        let value = self.get_property(pos, name)?;
        match serde_json::from_value(value.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Plot.get_property: property '{}' has an unexpected shape. Found: {}", name, e);
                None
            }
        }
    }

    /// Merged `globals` objects: defaults, stage, step, overlay.
    pub fn get_globals(&self, pos: &GameStage) -> Map<String, Value> {
        let mut out = Map::new();
        let layers = [
            self.defaults.get("globals"),
            self.get_stage(pos).and_then(|s| s.properties.get("globals")),
            self.get_step(pos).and_then(|s| s.properties.get("globals")),
            if self.overlay.applies_to(pos) { self.overlay.properties.get("globals") } else { None },
        ];
        for layer in layers.into_iter().flatten() {
            if let Value::Object(map) = layer {
                out.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        out
    }

    pub fn get_step_rule(&self, pos: &GameStage) -> StepRule {
        if let Some(rule) = self.get_step(pos).and_then(|s| s.step_rule.clone()) {
            return rule;
        }
        if let Some(name) = self.get_property(pos, "step_rule").and_then(Value::as_str) {
            match name.parse() {
                Ok(rule) => return rule,
                Err(e) => warn!("{}", e),
            }
        }
        self.default_step_rule.clone()
    }

    //--- Effective Hooks --------------------------------------------------

    pub fn step_cb(&self, pos: &GameStage) -> Option<StepCallback> {
        self.overlay_hook(pos, |o| o.cb.clone())
            .or_else(|| self.get_step(pos).and_then(|s| s.cb.clone()))
    }

    pub fn step_init(&self, pos: &GameStage) -> Option<Hook> {
        self.overlay_hook(pos, |o| o.init.clone())
            .or_else(|| self.get_step(pos).and_then(|s| s.init.clone()))
    }

    pub fn step_done(&self, pos: &GameStage) -> Option<DoneHook> {
        self.overlay_hook(pos, |o| o.done.clone())
            .or_else(|| self.get_step(pos).and_then(|s| s.done.clone()))
    }

    fn overlay_hook<T>(&self, pos: &GameStage, pick: impl Fn(&StepOverlay) -> Option<T>) -> Option<T> {
        if self.overlay.applies_to(pos) {
            pick(&self.overlay)
        } else {
            None
        }
    }

    //--- Temporary Cache --------------------------------------------------

    /// Pins the overlay to `pos`; later lookups elsewhere ignore it.
    pub fn pin_tmp_cache(&mut self, pos: GameStage) {
        self.overlay.at = Some(pos);
    }

    pub fn tmp_cache(&mut self, name: &str, value: Value) {
        self.overlay.properties.insert(name.to_string(), value);
    }

    pub fn tmp_cache_get(&self, name: &str) -> Option<&Value> {
        self.overlay.properties.get(name)
    }

    /// Applies a role's overrides to the current step.
    pub fn apply_role(&mut self, role: &RoleDef) {
        if role.cb.is_some() {
            self.overlay.cb = role.cb.clone();
        }
        if role.init.is_some() {
            self.overlay.init = role.init.clone();
        }
        if role.done.is_some() {
            self.overlay.done = role.done.clone();
        }
        for (k, v) in &role.properties {
            self.overlay.properties.insert(k.clone(), v.clone());
        }
    }

    pub fn clear_tmp_cache(&mut self) {
        if !self.overlay.is_empty() {
            debug!("Plot: clearing temporary step overrides");
        }
        self.overlay = StepOverlay::default();
    }
}

impl Default for Plot {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Plot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plot")
            .field("stages", &self.stages)
            .field("default_step_rule", &self.default_step_rule)
            .field("end_with_game_over", &self.end_with_game_over)
            .finish()
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plot() -> Plot {
        Plot::from_stages(vec![
            StageDef::new("intro")
                .with_step(StepDef::new("welcome").with_property("timer", json!(3000)))
                .with_step(StepDef::new("rules"))
                .with_property("timer", json!(1000))
                .with_property("color", json!("red")),
            StageDef::new("game")
                .with_repeat(2)
                .with_step(StepDef::new("bid"))
                .with_step(StepDef::new("respond")),
            StageDef::new("outro").with_step(StepDef::new("bye")),
        ])
        .unwrap()
        .with_default("color", json!("grey"))
        .with_default("language", json!("en"))
    }

    fn at(s: u32, st: u32, r: u32) -> NextStep {
        NextStep::At(GameStage::new(s, st, r))
    }

    //--- Validation -------------------------------------------------------

    #[test]
    fn add_stage_validates() {
        let mut p = Plot::new();
        assert!(p.add_stage(StageDef::new("empty")).is_err());
        assert!(p.add_stage(StageDef::new("").with_step(StepDef::new("a"))).is_err());
        assert!(p
            .add_stage(StageDef::new("dup").with_step(StepDef::new("a")).with_step(StepDef::new("a")))
            .is_err());
        assert!(p.add_stage(StageDef::new("zero").with_repeat(0).with_step(StepDef::new("a"))).is_err());

        p.add_stage(StageDef::new("ok").with_step(StepDef::new("a"))).unwrap();
        let err = p.add_stage(StageDef::new("ok").with_step(StepDef::new("a"))).unwrap_err();
        assert_eq!(err.to_string(), "Plot.add_stage: duplicate stage id. Found: ok");
    }

    //--- Navigation -------------------------------------------------------

    #[test]
    fn next_walks_steps_rounds_and_stages() {
        let p = plot();
        assert_eq!(p.next(&GameStage::NOT_STARTED), at(1, 1, 1));
        assert_eq!(p.next(&GameStage::new(1, 1, 1)), at(1, 2, 1));
        assert_eq!(p.next(&GameStage::new(1, 2, 1)), at(2, 1, 1));
        assert_eq!(p.next(&GameStage::new(2, 2, 1)), at(2, 1, 2));
        assert_eq!(p.next(&GameStage::new(2, 2, 2)), at(3, 1, 1));
        assert_eq!(p.next(&GameStage::new(3, 1, 1)), NextStep::GameOver);
    }

    #[test]
    fn end_seq_when_configured() {
        let p = plot().ending_without_game_over();
        assert_eq!(p.next(&GameStage::new(3, 1, 1)), NextStep::EndSeq);
    }

    #[test]
    fn next_stage_skips_rounds() {
        let p = plot();
        assert_eq!(p.next_stage(&GameStage::new(2, 1, 1)), at(3, 1, 1));
        assert_eq!(p.next_stage(&GameStage::new(3, 1, 1)), NextStep::GameOver);
    }

    #[test]
    fn previous_is_inverse_of_next() {
        let p = plot();
        let mut pos = GameStage::new(1, 1, 1);
        while let NextStep::At(next) = p.next(&pos) {
            assert_eq!(p.previous(&next), Some(pos));
            pos = next;
        }
        assert_eq!(p.previous(&GameStage::new(1, 1, 1)), None);
    }

    #[test]
    fn jump_both_ways() {
        let p = plot();
        assert_eq!(p.jump(&GameStage::new(1, 1, 1), 3), Some(at(2, 2, 1)));
        assert_eq!(p.jump(&GameStage::new(2, 2, 1), -3), Some(at(1, 1, 1)));
        assert_eq!(p.jump(&GameStage::new(3, 1, 1), 2), Some(NextStep::GameOver));
        assert_eq!(p.jump(&GameStage::new(1, 1, 1), -1), None);
    }

    #[test]
    fn steps_to_next_stage_and_rounds() {
        let p = plot();
        assert_eq!(p.steps_to_next_stage(&GameStage::new(1, 1, 1), false), Some(2));
        assert_eq!(p.steps_to_next_stage(&GameStage::new(2, 2, 1), false), Some(1));
        assert_eq!(p.steps_to_next_stage(&GameStage::new(2, 2, 1), true), Some(3));
        assert!(p.is_last_step(&GameStage::new(1, 2, 1)));

        assert_eq!(p.get_round(&GameStage::new(2, 1, 1), RoundMode::Total), Some(2));
        assert_eq!(p.get_round(&GameStage::new(2, 1, 1), RoundMode::Remaining), Some(1));
        assert_eq!(p.get_round(&GameStage::new(9, 1, 1), RoundMode::Current), None);
    }

    #[test]
    fn normalize_accepts_ids_and_indices() {
        let p = plot();
        assert_eq!(
            p.normalize_game_stage(&GameStageRef::new("game", "respond", 2)),
            Some(GameStage::new(2, 2, 2))
        );
        assert_eq!(p.normalize_game_stage(&GameStageRef::new(3, 1, 0)), Some(GameStage::new(3, 1, 1)));
        assert_eq!(p.normalize_game_stage(&"intro.rules".parse().unwrap()), Some(GameStage::new(1, 2, 1)));
        assert_eq!(p.normalize_game_stage(&GameStageRef::new(4, 1, 1)), None);
        assert_eq!(p.normalize_game_stage(&GameStageRef::new("game", "nope", 1)), None);
        assert_eq!(p.normalize_game_stage(&GameStageRef::new("intro", 1, 2)), None);
    }

    //--- Properties -------------------------------------------------------

    #[test]
    fn property_lookup_order() {
        let mut p = plot();
        let welcome = GameStage::new(1, 1, 1);
        let rules = GameStage::new(1, 2, 1);

        assert_eq!(p.get_property(&welcome, "timer"), Some(&json!(3000)));
        assert_eq!(p.get_property(&rules, "timer"), Some(&json!(1000)));
        assert_eq!(p.get_property(&rules, "color"), Some(&json!("red")));
        assert_eq!(p.get_property(&GameStage::new(2, 1, 1), "color"), Some(&json!("grey")));
        assert_eq!(p.get_property(&rules, "missing"), None);

        p.pin_tmp_cache(rules);
        p.tmp_cache("timer", json!(5));
        assert_eq!(p.get_property(&rules, "timer"), Some(&json!(5)));
        assert_eq!(p.get_property(&welcome, "timer"), Some(&json!(3000)));

        p.clear_tmp_cache();
        assert_eq!(p.get_property(&rules, "timer"), Some(&json!(1000)));
    }

    #[test]
    fn typed_property() {
        let p = plot();
        let t: Option<u64> = p.get_property_as(&GameStage::new(1, 1, 1), "timer");
        assert_eq!(t, Some(3000));
        let bad: Option<u64> = p.get_property_as(&GameStage::new(1, 1, 1), "language");
        assert_eq!(bad, None);
    }

    #[test]
    fn globals_merge_layers() {
        let p = Plot::from_stages(vec![StageDef::new("s")
            .with_property("globals", json!({"a": 1, "b": 1}))
            .with_step(StepDef::new("x").with_property("globals", json!({"b": 2})))])
        .unwrap()
        .with_default("globals", json!({"z": 0}));

        let g = p.get_globals(&GameStage::new(1, 1, 1));
        assert_eq!(Value::Object(g), json!({"a": 1, "b": 2, "z": 0}));
    }

    #[test]
    fn step_rule_from_property_or_default() {
        let p = Plot::from_stages(vec![StageDef::new("s")
            .with_property("step_rule", json!("WAIT"))
            .with_step(StepDef::new("x"))
            .with_step(StepDef::new("y").with_step_rule(StepRule::SyncStep))])
        .unwrap();

        assert_eq!(p.get_step_rule(&GameStage::new(1, 1, 1)).name(), "WAIT");
        assert_eq!(p.get_step_rule(&GameStage::new(1, 2, 1)).name(), "SYNC_STEP");
        assert_eq!(Plot::new().get_step_rule(&GameStage::new(1, 1, 1)).name(), "SOLO");
    }

    #[test]
    fn role_overrides_shadow_step_hooks() {
        let mut p = Plot::from_stages(vec![StageDef::new("s").with_step(
            StepDef::new("x").with_init(|_| Ok(())).with_property("color", json!("blue")),
        )])
        .unwrap();
        let pos = GameStage::new(1, 1, 1);

        let role = RoleDef::new().with_cb(|_| Ok(true)).with_property("color", json!("green"));
        p.pin_tmp_cache(pos);
        p.apply_role(&role);

        assert!(p.step_cb(&pos).is_some());
        assert!(p.step_init(&pos).is_some());
        assert_eq!(p.get_property(&pos, "color"), Some(&json!("green")));

        p.clear_tmp_cache();
        assert!(p.step_cb(&pos).is_none());
    }
}
