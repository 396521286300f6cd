//=========================================================================
// Step Rules
//=========================================================================
//
// Pluggable predicates deciding whether the engine advances on its own.
//
//   StepContext { stage, stage_level, roster, plot } ──StepRule──> bool
//
// Rules are pure: they read the context and never mutate anything.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

//=== Internal Dependencies ===============================================

use super::error::StageError;
use super::game_stage::GameStage;
use super::levels::StageLevel;
use super::plot::Plot;
use crate::core::roster::{MatchType, Roster};

//=== StepContext =========================================================

/// Everything a rule may look at.
pub struct StepContext<'a> {
    pub stage: GameStage,
    pub stage_level: StageLevel,
    pub roster: &'a dyn Roster,
    pub plot: &'a Plot,
}

impl StepContext<'_> {
    fn is_done(&self) -> bool {
        self.stage_level == StageLevel::Done
    }

    fn is_last_step(&self) -> bool {
        self.plot.is_last_step(&self.stage)
    }
}

//=== StepRule ============================================================

pub type CustomRule = Rc<dyn Fn(&StepContext<'_>) -> bool>;

#[derive(Clone, Default)]
pub enum StepRule {
    /// Advance as soon as the local participant is done.
    #[default]
    Solo,
    /// Like `Solo`, but never out of the last step of a stage.
    SoloStep,
    /// Never advance automatically.
    Wait,
    /// Local participant and every roster member at this exact step done.
    SyncStep,
    /// `Solo` inside the stage, `SyncStep` up to the stage's last step.
    SyncStage,
    /// Roster members at this exact step done; own level ignored.
    OthersSyncStep,
    /// Roster members done up to the stage's last step; own level ignored.
    OthersSyncStage,
    Custom(CustomRule),
}

impl StepRule {
    pub fn custom<F>(rule: F) -> Self
    where
        F: Fn(&StepContext<'_>) -> bool + 'static,
    {
        StepRule::Custom(Rc::new(rule))
    }

    pub fn should_step(&self, ctx: &StepContext<'_>) -> bool {
        match self {
            StepRule::Solo => ctx.is_done(),
            StepRule::SoloStep => ctx.is_done() && !ctx.is_last_step(),
            StepRule::Wait => false,
            StepRule::SyncStep => {
                ctx.is_done() && ctx.roster.is_step_done(ctx.stage, MatchType::Exact, false)
            }
            StepRule::SyncStage => {
                if !ctx.is_done() {
                    false
                } else if ctx.is_last_step() {
                    ctx.roster.is_step_done(ctx.stage, MatchType::StageUpTo, false)
                } else {
                    true
                }
            }
            StepRule::OthersSyncStep => {
                ctx.roster.size() > 0 && ctx.roster.is_step_done(ctx.stage, MatchType::Exact, false)
            }
            StepRule::OthersSyncStage => {
                if ctx.roster.size() == 0 {
                    return false;
                }
                let match_type = if ctx.is_last_step() {
                    MatchType::StageUpTo
                } else {
                    MatchType::Exact
                };
                ctx.roster.is_step_done(ctx.stage, match_type, false)
            }
            StepRule::Custom(rule) => rule(ctx),
        }
    }

    /// Rules under which the group advances together.
    pub fn is_sync(&self) -> bool {
        matches!(
            self,
            StepRule::SyncStep | StepRule::SyncStage | StepRule::OthersSyncStep | StepRule::OthersSyncStage
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            StepRule::Solo => "SOLO",
            StepRule::SoloStep => "SOLO_STEP",
            StepRule::Wait => "WAIT",
            StepRule::SyncStep => "SYNC_STEP",
            StepRule::SyncStage => "SYNC_STAGE",
            StepRule::OthersSyncStep => "OTHERS_SYNC_STEP",
            StepRule::OthersSyncStage => "OTHERS_SYNC_STAGE",
            StepRule::Custom(_) => "CUSTOM",
        }
    }
}

impl fmt::Debug for StepRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StepRule {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SOLO" => Ok(StepRule::Solo),
            "SOLO_STEP" => Ok(StepRule::SoloStep),
            "WAIT" => Ok(StepRule::Wait),
            "SYNC_STEP" => Ok(StepRule::SyncStep),
            "SYNC_STAGE" => Ok(StepRule::SyncStage),
            "OTHERS_SYNC_STEP" => Ok(StepRule::OthersSyncStep),
            "OTHERS_SYNC_STAGE" => Ok(StepRule::OthersSyncStage),
            _ => Err(StageError::InvalidPlot {
                method: "StepRule.from_str",
                reason: "unknown step rule",
                found: s.to_string(),
            }),
        }
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::roster::{Player, PlayerList};
    use crate::core::stage::{StageDef, StepDef};

    fn plot() -> Plot {
        Plot::from_stages(vec![
            StageDef::new("one").with_step(StepDef::new("a")).with_step(StepDef::new("b")),
            StageDef::new("two").with_step(StepDef::new("c")),
        ])
        .unwrap()
    }

    fn ctx<'a>(stage: GameStage, level: StageLevel, roster: &'a PlayerList, plot: &'a Plot) -> StepContext<'a> {
        StepContext { stage, stage_level: level, roster, plot }
    }

    #[test]
    fn solo_and_wait() {
        let (pl, p) = (PlayerList::new(), plot());
        let first = GameStage::new(1, 1, 1);
        assert!(StepRule::Solo.should_step(&ctx(first, StageLevel::Done, &pl, &p)));
        assert!(!StepRule::Solo.should_step(&ctx(first, StageLevel::Playing, &pl, &p)));
        assert!(!StepRule::Wait.should_step(&ctx(first, StageLevel::Done, &pl, &p)));
    }

    #[test]
    fn solo_step_holds_on_last_step() {
        let (pl, p) = (PlayerList::new(), plot());
        assert!(StepRule::SoloStep.should_step(&ctx(GameStage::new(1, 1, 1), StageLevel::Done, &pl, &p)));
        assert!(!StepRule::SoloStep.should_step(&ctx(GameStage::new(1, 2, 1), StageLevel::Done, &pl, &p)));
    }

    #[test]
    fn sync_step_needs_everyone() {
        let p = plot();
        let here = GameStage::new(1, 1, 1);
        let mut pl = PlayerList::new();
        pl.add(Player::new("x").at(here, StageLevel::Playing)).unwrap();

        assert!(!StepRule::SyncStep.should_step(&ctx(here, StageLevel::Done, &pl, &p)));

        pl.get_mut("x").unwrap().stage_level = StageLevel::Done;
        assert!(StepRule::SyncStep.should_step(&ctx(here, StageLevel::Done, &pl, &p)));
        assert!(!StepRule::SyncStep.should_step(&ctx(here, StageLevel::Playing, &pl, &p)));
    }

    #[test]
    fn sync_rules_wait_for_players_on_an_earlier_step() {
        let p = plot();
        let here = GameStage::new(1, 2, 1);
        let mut pl = PlayerList::new();
        pl.add(Player::new("x").at(GameStage::new(1, 1, 1), StageLevel::Done)).unwrap();

        assert!(!StepRule::SyncStep.should_step(&ctx(here, StageLevel::Done, &pl, &p)));
        assert!(!StepRule::SyncStage.should_step(&ctx(here, StageLevel::Done, &pl, &p)));
        assert!(!StepRule::OthersSyncStep.should_step(&ctx(here, StageLevel::Done, &pl, &p)));
        assert!(!StepRule::OthersSyncStage.should_step(&ctx(here, StageLevel::Done, &pl, &p)));

        pl.get_mut("x").unwrap().stage = here;
        assert!(StepRule::SyncStep.should_step(&ctx(here, StageLevel::Done, &pl, &p)));
        assert!(StepRule::OthersSyncStep.should_step(&ctx(here, StageLevel::Playing, &pl, &p)));
    }

    #[test]
    fn sync_stage_is_solo_before_last_step() {
        let p = plot();
        let mut pl = PlayerList::new();
        pl.add(Player::new("x").at(GameStage::new(1, 1, 1), StageLevel::Playing)).unwrap();

        assert!(StepRule::SyncStage.should_step(&ctx(GameStage::new(1, 1, 1), StageLevel::Done, &pl, &p)));
        assert!(!StepRule::SyncStage.should_step(&ctx(GameStage::new(1, 2, 1), StageLevel::Done, &pl, &p)));
    }

    #[test]
    fn others_rules_wait_on_empty_roster() {
        let (pl, p) = (PlayerList::new(), plot());
        let here = GameStage::new(1, 1, 1);
        assert!(!StepRule::OthersSyncStep.should_step(&ctx(here, StageLevel::Done, &pl, &p)));
        assert!(!StepRule::OthersSyncStage.should_step(&ctx(here, StageLevel::Done, &pl, &p)));
    }

    #[test]
    fn others_sync_step_ignores_own_level() {
        let p = plot();
        let here = GameStage::new(2, 1, 1);
        let mut pl = PlayerList::new();
        pl.add(Player::new("x").at(here, StageLevel::Done)).unwrap();
        assert!(StepRule::OthersSyncStep.should_step(&ctx(here, StageLevel::Playing, &pl, &p)));
    }

    #[test]
    fn custom_and_parse() {
        let (pl, p) = (PlayerList::new(), plot());
        let rule = StepRule::custom(|c| c.stage.step == 2);
        assert!(rule.should_step(&ctx(GameStage::new(1, 2, 1), StageLevel::Playing, &pl, &p)));

        assert!(matches!("sync_step".parse::<StepRule>().unwrap(), StepRule::SyncStep));
        assert!("sometimes".parse::<StepRule>().is_err());
        assert!(StepRule::SyncStage.is_sync());
        assert!(!StepRule::Solo.is_sync());
    }
}
