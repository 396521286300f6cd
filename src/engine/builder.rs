//=========================================================================
// Stage Engine Builder
//=========================================================================
//
//   StageEngineBuilder::new(plot)
//       .with_settings(..) / .with_player_id(..) / .with_admin(..)
//       .with_transport(..) / .with_db(..) / .with_widget(..)
//       .with_init(..) / .with_gameover(..)
//       .build()  ──>  StageEngine at 0.0.0, UNINITIALIZED
//
//=========================================================================

//=== External Dependencies ===============================================

use std::rc::Rc;

use log::info;

//=== Internal Dependencies ===============================================

use super::{MsgHandler, ResumeHandler, StageEngine};
use crate::core::bridge::{GameDb, GameMessage, MemoryTransport, Transport, Widget, WidgetRegistry, WidgetSpec};
use crate::core::stage::{HookError, Hook, Plot, PublishLevel};

use super::settings::EngineSettings;

//=== StageEngineBuilder ==================================================

/// Builder for configuring and constructing a [`StageEngine`].
///
/// Without a transport the engine gets a [`MemoryTransport`] whose outbox
/// nobody reads.
///
/// # Examples
///
/// ```
/// use aetheric_stager::prelude::*;
///
/// let plot = Plot::from_stages(vec![
///     StageDef::new("intro").with_step(StepDef::new("welcome")),
/// ])
/// .unwrap();
///
/// let mut engine = StageEngineBuilder::new(plot).with_player_id("p1").build();
/// engine.start(StartOptions::default()).unwrap();
/// assert_eq!(engine.current_stage(), GameStage::new(1, 1, 1));
/// ```
pub struct StageEngineBuilder {
    plot: Plot,
    settings: EngineSettings,
    transport: Option<Box<dyn Transport>>,
    db: Option<Box<dyn GameDb>>,
    widgets: WidgetRegistry,
    init: Option<Hook>,
    gameover: Option<Hook>,
    pause_handler: Option<MsgHandler>,
    resume_handler: Option<ResumeHandler>,
}

impl StageEngineBuilder {
    pub fn new(plot: Plot) -> Self {
        Self {
            plot,
            settings: EngineSettings::default(),
            transport: None,
            db: None,
            widgets: WidgetRegistry::new(),
            init: None,
            gameover: None,
            pause_handler: None,
            resume_handler: None,
        }
    }

    /// Replaces every setting at once.
    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_player_id(mut self, id: impl Into<String>) -> Self {
        self.settings.player_id = id.into();
        self
    }

    pub fn with_admin(mut self, admin: bool) -> Self {
        self.settings.admin = admin;
        self
    }

    /// Default: `REGULAR`. A step property `publish_level` overrides it.
    pub fn with_publish_level(mut self, level: PublishLevel) -> Self {
        self.settings.publish_level = level;
        self
    }

    pub fn with_record_history(mut self, record: bool) -> Self {
        self.settings.record_history = record;
        self
    }

    pub fn with_sync_stepping(mut self, sync: bool) -> Self {
        self.settings.sync_stepping = sync;
        self
    }

    /// Default: 100.
    ///
    /// # Panics
    ///
    /// Panics if `max == 0`.
    pub fn with_max_deferred_per_tick(mut self, max: usize) -> Self {
        assert!(max > 0, "Deferred drain limit must be positive");
        self.settings.max_deferred_per_tick = max;
        self
    }

    /// Default: `"bot"`. A step's `matcher.missing_id` overrides it.
    pub fn with_missing_id(mut self, id: impl Into<String>) -> Self {
        self.settings.missing_id = id.into();
        self
    }

    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    pub fn with_db(mut self, db: impl GameDb + 'static) -> Self {
        self.db = Some(Box::new(db));
        self
    }

    pub fn with_widget<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn(&WidgetSpec) -> Result<Box<dyn Widget>, HookError> + 'static,
    {
        self.widgets.register(name, factory);
        self
    }

    /// Game init hook, run by `start()` under state INITIALIZING.
    pub fn with_init<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut StageEngine) -> Result<(), HookError> + 'static,
    {
        self.init = Some(Rc::new(hook));
        self
    }

    /// Runs between GAME_ALMOST_OVER and GAME_OVER.
    pub fn with_gameover<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut StageEngine) -> Result<(), HookError> + 'static,
    {
        self.gameover = Some(Rc::new(hook));
        self
    }

    /// Handles inbound messages while paused instead of buffering them.
    pub fn with_pause_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut StageEngine, GameMessage) -> Result<(), HookError> + 'static,
    {
        self.pause_handler = Some(Rc::new(handler));
        self
    }

    /// Receives the messages buffered during a pause on resume.
    pub fn with_resume_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut StageEngine, Vec<GameMessage>) -> Result<(), HookError> + 'static,
    {
        self.resume_handler = Some(Rc::new(handler));
        self
    }

    /// # Panics
    ///
    /// Panics if the settings carry a zero deferred drain limit.
    pub fn build(self) -> StageEngine {
        assert!(
            self.settings.max_deferred_per_tick > 0,
            "Deferred drain limit must be positive"
        );
        info!(
            "Building stage engine (player: {}, stages: {}, admin: {})",
            self.settings.player_id,
            self.plot.stage_count(),
            self.settings.admin
        );

        let transport = self
            .transport
            .unwrap_or_else(|| Box::new(MemoryTransport::new().0));

        StageEngine::assemble(super::Parts {
            plot: self.plot,
            settings: self.settings,
            transport,
            db: self.db,
            widgets: self.widgets,
            init: self.init,
            gameover: self.gameover,
            pause_handler: self.pause_handler,
            resume_handler: self.resume_handler,
        })
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stage::{GameStage, StageDef, StateLevel, StepDef};

    fn plot() -> Plot {
        Plot::from_stages(vec![StageDef::new("s").with_step(StepDef::new("a"))]).unwrap()
    }

    #[test]
    fn builder_defaults() {
        let builder = StageEngineBuilder::new(plot());
        assert_eq!(builder.settings, EngineSettings::default());
        assert!(builder.transport.is_none());
    }

    #[test]
    fn build_creates_fresh_engine() {
        let engine = StageEngineBuilder::new(plot())
            .with_player_id("p1")
            .with_admin(true)
            .with_record_history(true)
            .build();

        assert_eq!(engine.player_id(), "p1");
        assert!(engine.settings().admin);
        assert_eq!(engine.current_stage(), GameStage::NOT_STARTED);
        assert_eq!(engine.state_level(), StateLevel::Uninitialized);
        assert!(engine.events().is_recording_history());
    }

    #[test]
    #[should_panic(expected = "Deferred drain limit must be positive")]
    fn zero_drain_limit_panics() {
        StageEngineBuilder::new(plot()).with_max_deferred_per_tick(0);
    }

    #[test]
    #[should_panic(expected = "Deferred drain limit must be positive")]
    fn zero_drain_limit_in_settings_panics_on_build() {
        let settings = EngineSettings {
            max_deferred_per_tick: 0,
            ..EngineSettings::default()
        };
        StageEngineBuilder::new(plot()).with_settings(settings).build();
    }

    #[test]
    fn missing_id_reaches_the_matcher() {
        let engine = StageEngineBuilder::new(plot()).with_missing_id("ghost").build();
        assert_eq!(engine.matcher().default_missing_id(), "ghost");
    }
}
