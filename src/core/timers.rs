//=========================================================================
// Timers
//=========================================================================
//
// Countdown timers scoped to the step, the stage or the whole game.
//
// Architecture:
//   StageEngine::tick(elapsed)
//        ↓
//   TimerRegistry::tick(elapsed) → Vec<TimerFired>
//        ↓
//   engine reacts (TIMEUP, done(), push_step commands)
//
// Step timers are destroyed on every step transition, stage timers on
// every stage transition, everything on stop().
//
//=========================================================================

//=== External Dependencies ===============================================

use std::time::Duration;

use log::{debug, trace};
use strum::{AsRefStr, Display};

//=== TimerScope / TimerKind ==============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum TimerScope {
    Step,
    Stage,
    Game,
}

/// What the engine does when a timer expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerKind {
    /// Emits `TIMEUP`; calls `done()` if the step asks for it.
    StepTimeup,
    /// Sends `push_step` to participants that are not done yet.
    PushClients,
    /// Emits the named event.
    Event(String),
}

//=== Timer ===============================================================

#[derive(Debug, Clone)]
struct Timer {
    name: String,
    scope: TimerScope,
    kind: TimerKind,
    duration: Duration,
    remaining: Duration,
    running: bool,
}

/// An expired timer, returned by [`TimerRegistry::tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFired {
    pub name: String,
    pub scope: TimerScope,
    pub kind: TimerKind,
}

//=== TimerRegistry =======================================================

#[derive(Debug, Clone, Default)]
pub struct TimerRegistry {
    timers: Vec<Timer>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or replaces) a running timer.
    pub fn add(&mut self, name: &str, scope: TimerScope, kind: TimerKind, duration: Duration) {
        self.timers.retain(|t| t.name != name);
        debug!("TimerRegistry: '{}' ({}) set to {:?}", name, scope, duration);
        self.timers.push(Timer {
            name: name.to_string(),
            scope,
            kind,
            duration,
            remaining: duration,
            running: true,
        });
    }

    /// Advances every running timer and removes the expired ones.
    pub fn tick(&mut self, elapsed: Duration) -> Vec<TimerFired> {
        let mut fired = Vec::new();
        for t in self.timers.iter_mut().filter(|t| t.running) {
            t.remaining = t.remaining.saturating_sub(elapsed);
            if t.remaining.is_zero() {
                trace!("TimerRegistry: '{}' expired", t.name);
                fired.push(TimerFired {
                    name: t.name.clone(),
                    scope: t.scope,
                    kind: t.kind.clone(),
                });
            }
        }
        self.timers.retain(|t| !(t.running && t.remaining.is_zero()));
        fired
    }

    pub fn pause_all(&mut self) {
        for t in &mut self.timers {
            t.running = false;
        }
    }

    pub fn resume_all(&mut self) {
        for t in &mut self.timers {
            t.running = true;
        }
    }

    /// Puts a timer back to its full duration.
    pub fn reset(&mut self, name: &str) -> bool {
        match self.timers.iter_mut().find(|t| t.name == name) {
            Some(t) => {
                t.remaining = t.duration;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.name != name);
        before != self.timers.len()
    }

    pub fn destroy_scope(&mut self, scope: TimerScope) {
        let before = self.timers.len();
        self.timers.retain(|t| t.scope != scope);
        let removed = before - self.timers.len();
        if removed > 0 {
            debug!("TimerRegistry: destroyed {} {} timer(s)", removed, scope);
        }
    }

    pub fn remaining(&self, name: &str) -> Option<Duration> {
        self.timers.iter().find(|t| t.name == name).map(|t| t.remaining)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.timers.iter().any(|t| t.name == name)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn fires_once_when_expired() {
        let mut reg = TimerRegistry::new();
        reg.add("timer", TimerScope::Step, TimerKind::StepTimeup, ms(100));

        assert!(reg.tick(ms(60)).is_empty());
        assert_eq!(reg.remaining("timer"), Some(ms(40)));

        let fired = reg.tick(ms(60));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].kind, TimerKind::StepTimeup);
        assert!(reg.tick(ms(60)).is_empty());
        assert!(reg.is_empty());
    }

    #[test]
    fn paused_timers_do_not_advance() {
        let mut reg = TimerRegistry::new();
        reg.add("t", TimerScope::Game, TimerKind::Event("E".into()), ms(10));
        reg.pause_all();
        assert!(reg.tick(ms(50)).is_empty());
        reg.resume_all();
        assert_eq!(reg.tick(ms(50)).len(), 1);
    }

    #[test]
    fn scopes_are_destroyed_independently() {
        let mut reg = TimerRegistry::new();
        reg.add("a", TimerScope::Step, TimerKind::StepTimeup, ms(10));
        reg.add("b", TimerScope::Stage, TimerKind::PushClients, ms(10));
        reg.add("c", TimerScope::Game, TimerKind::Event("X".into()), ms(10));

        reg.destroy_scope(TimerScope::Step);
        assert!(!reg.contains("a"));
        assert_eq!(reg.len(), 2);

        reg.destroy_scope(TimerScope::Stage);
        assert!(reg.contains("c"));
    }

    #[test]
    fn add_replaces_same_name() {
        let mut reg = TimerRegistry::new();
        reg.add("t", TimerScope::Step, TimerKind::StepTimeup, ms(10));
        reg.add("t", TimerScope::Step, TimerKind::StepTimeup, ms(30));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.remaining("t"), Some(ms(30)));

        reg.tick(ms(20));
        assert!(reg.reset("t"));
        assert_eq!(reg.remaining("t"), Some(ms(30)));
        assert!(reg.remove("t"));
    }
}
