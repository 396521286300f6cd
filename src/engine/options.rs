//=========================================================================
// Transition Options
//=========================================================================
//
// Value objects passed into and returned from transitions.
//
//   StepTarget         where goto_step goes (position, GAMEOVER, END_SEQ)
//   StepOptions        per-transition requests (be_done, plot, msgs, ...)
//   TransitionOutcome  Advanced | NotFound | GameOver
//   StageBreak         persistent "leave the stage at next step()" flag
//   StartOptions       how start() enters the sequence
//
//=========================================================================

//=== External Dependencies ===============================================

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

//=== Internal Dependencies ===============================================

use super::StageEngine;
use crate::core::bridge::GameMessage;
use crate::core::stage::{GameStage, GameStageRef, HookError, NextStep, StageError};

//=== StepTarget ==========================================================

/// Marker string for the game-over target.
pub const GAMEOVER: &str = "GAMEOVER";

/// Marker string for the end-of-sequence target.
pub const END_SEQ: &str = "END_SEQ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepTarget {
    At(GameStageRef),
    GameOver,
    EndSeq,
}

impl From<GameStage> for StepTarget {
    fn from(value: GameStage) -> Self {
        StepTarget::At(value.into())
    }
}

impl From<GameStageRef> for StepTarget {
    fn from(value: GameStageRef) -> Self {
        StepTarget::At(value)
    }
}

impl From<NextStep> for StepTarget {
    fn from(value: NextStep) -> Self {
        match value {
            NextStep::At(gs) => gs.into(),
            NextStep::GameOver => StepTarget::GameOver,
            NextStep::EndSeq => StepTarget::EndSeq,
        }
    }
}

impl FromStr for StepTarget {
    type Err = StageError;

    /// Accepts `GAMEOVER`, `END_SEQ` or a `"stage.step.round"` position.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            GAMEOVER => Ok(StepTarget::GameOver),
            END_SEQ => Ok(StepTarget::EndSeq),
            other => other.parse().map(StepTarget::At),
        }
    }
}

impl fmt::Display for StepTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepTarget::At(r) => write!(f, "{}", r),
            StepTarget::GameOver => f.write_str(GAMEOVER),
            StepTarget::EndSeq => f.write_str(END_SEQ),
        }
    }
}

//=== StepOptions =========================================================

/// Extension callback run while the transition applies its options.
pub type OptionsCallback = Rc<dyn Fn(&mut StageEngine, &StepOptions) -> Result<(), HookError>>;

/// Requests attached to one transition. Consumed by that transition.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct StepOptions {
    /// Skip the step body and be done right away.
    #[serde(default)]
    pub be_done: bool,
    /// Run the step body, then call `done()` as soon as PLAYING fires.
    #[serde(default)]
    pub will_be_done: bool,
    /// Temporary property overrides for the target step.
    #[serde(default)]
    pub plot: Map<String, Value>,
    /// Inbound messages to replay through `receive`.
    #[serde(default)]
    pub msgs: Vec<GameMessage>,
    /// Role assigned by the coordinator; wins over the step's own role.
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub partner: Option<String>,
    #[serde(skip)]
    pub cb: Option<OptionsCallback>,
}

impl StepOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn be_done() -> Self {
        Self {
            be_done: true,
            ..Self::default()
        }
    }

    pub fn will_be_done() -> Self {
        Self {
            will_be_done: true,
            ..Self::default()
        }
    }

    pub fn with_plot(mut self, name: &str, value: Value) -> Self {
        self.plot.insert(name.to_string(), value);
        self
    }

    pub fn with_msg(mut self, msg: GameMessage) -> Self {
        self.msgs.push(msg);
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_partner(mut self, partner: impl Into<String>) -> Self {
        self.partner = Some(partner.into());
        self
    }

    pub fn with_cb<F>(mut self, cb: F) -> Self
    where
        F: Fn(&mut StageEngine, &StepOptions) -> Result<(), HookError> + 'static,
    {
        self.cb = Some(Rc::new(cb));
        self
    }
}

impl fmt::Debug for StepOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepOptions")
            .field("be_done", &self.be_done)
            .field("will_be_done", &self.will_be_done)
            .field("plot", &self.plot)
            .field("msgs", &self.msgs.len())
            .field("role", &self.role)
            .field("partner", &self.partner)
            .field("cb", &self.cb.is_some())
            .finish()
    }
}

//=== TransitionOutcome ===================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The engine entered the target step.
    Advanced,
    /// The target does not exist in the plot (or the sequence ended
    /// without game over). Nothing was entered.
    NotFound,
    /// The game-over protocol ran.
    GameOver,
}

impl TransitionOutcome {
    pub fn is_advanced(self) -> bool {
        self == TransitionOutcome::Advanced
    }
}

//=== StageBreak ==========================================================

/// How the next `step()` picks its target. Reset by that call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StageBreak {
    #[default]
    None,
    /// Skip the remaining steps and rounds of the current stage.
    NextStage,
}

//=== StartOptions ========================================================

#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Enter the sequence right after initialization.
    pub step: bool,
    /// Enter this position instead of the first step.
    pub start_at: Option<StepTarget>,
    pub step_options: StepOptions,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            step: true,
            start_at: None,
            step_options: StepOptions::default(),
        }
    }
}

impl StartOptions {
    /// Initializes the game but stays at `0.0.0`.
    pub fn no_step() -> Self {
        Self {
            step: false,
            ..Self::default()
        }
    }

    pub fn at(target: impl Into<StepTarget>) -> Self {
        Self {
            start_at: Some(target.into()),
            ..Self::default()
        }
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stage::StageKey;
    use serde_json::json;

    #[test]
    fn targets_parse_markers_and_positions() {
        assert_eq!("GAMEOVER".parse::<StepTarget>().unwrap(), StepTarget::GameOver);
        assert_eq!("END_SEQ".parse::<StepTarget>().unwrap(), StepTarget::EndSeq);

        let StepTarget::At(r) = "2.1.1".parse::<StepTarget>().unwrap() else {
            panic!("expected a position");
        };
        assert_eq!(r.stage, StageKey::Index(2));
        assert_eq!(r.round, 1);
    }

    #[test]
    fn next_step_converts() {
        assert_eq!(StepTarget::from(NextStep::GameOver), StepTarget::GameOver);
        assert!(matches!(StepTarget::from(NextStep::At(GameStage::new(1, 1, 1))), StepTarget::At(_)));
    }

    #[test]
    fn options_deserialize_from_remote_payload() {
        let opts: StepOptions = serde_json::from_value(json!({
            "role": "BIDDER",
            "partner": "p2",
            "plot": {"timer": 1000}
        }))
        .unwrap();
        assert_eq!(opts.role.as_deref(), Some("BIDDER"));
        assert_eq!(opts.plot.get("timer"), Some(&json!(1000)));
        assert!(!opts.be_done);
        assert!(opts.cb.is_none());
    }
}
