//=========================================================================
// Size Gate
//=========================================================================
//
// Player-count thresholds for the current step.
//
// Architecture:
//   step properties ──SizeConfig──> init(config, count) ──> [SizeEvent]
//   roster change   ──count──────> update(count)        ──> [SizeEvent]
//   transition      ──count──────> check_size(count)    ──> bool
//
// Each bound remembers whether its violation already fired. A violation
// fires once while it persists; the first count that clears it fires the
// recovery and re-arms the bound.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::fmt;

use log::{debug, info};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

//=== Internal Dependencies ===============================================

use super::error::SizeError;
use crate::core::roster::Roster;

//=== Threshold ===========================================================

/// A configured player count.
///
/// Deserializes from a positive number, `"*"` (the count when the step
/// starts) or `"@"` (any count above zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Threshold {
    Fixed(usize),
    Snapshot,
    AnyNonZero,
}

impl Threshold {
    fn resolve(self, snapshot: usize) -> usize {
        match self {
            Threshold::Fixed(n) => n,
            Threshold::Snapshot => snapshot,
            Threshold::AnyNonZero => 1,
        }
    }
}

impl<'de> Deserialize<'de> for Threshold {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ThresholdVisitor;

        impl Visitor<'_> for ThresholdVisitor {
            type Value = Threshold;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a positive integer, \"*\" or \"@\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Threshold, E> {
                Ok(Threshold::Fixed(v as usize))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Threshold, E> {
                if v < 0 {
                    return Err(E::invalid_value(de::Unexpected::Signed(v), &self));
                }
                Ok(Threshold::Fixed(v as usize))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Threshold, E> {
                match v {
                    "*" => Ok(Threshold::Snapshot),
                    "@" => Ok(Threshold::AnyNonZero),
                    other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
                }
            }
        }

        deserializer.deserialize_any(ThresholdVisitor)
    }
}

//=== SizeConfig ==========================================================

/// Thresholds read from the step properties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeConfig {
    #[serde(default)]
    pub min_players: Option<Threshold>,
    #[serde(default)]
    pub max_players: Option<Threshold>,
    #[serde(default)]
    pub exact_players: Option<Threshold>,
}

impl SizeConfig {
    pub fn is_empty(&self) -> bool {
        self.min_players.is_none() && self.max_players.is_none() && self.exact_players.is_none()
    }
}

//=== SizeBound / SizeEvent ===============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SizeBound {
    MinPlayers,
    MaxPlayers,
    ExactPlayers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeEvent {
    Violated(SizeBound),
    Recovered(SizeBound),
}

//=== Bound ===============================================================

#[derive(Debug, Clone, Copy)]
struct Bound {
    kind: SizeBound,
    value: usize,
    fired: bool,
}

impl Bound {
    fn is_satisfied(&self, count: usize) -> bool {
        match self.kind {
            SizeBound::MinPlayers => count >= self.value,
            SizeBound::MaxPlayers => count <= self.value,
            SizeBound::ExactPlayers => count == self.value,
        }
    }

    fn observe(&mut self, count: usize) -> Option<SizeEvent> {
        let ok = self.is_satisfied(count);
        match (ok, self.fired) {
            (false, false) => {
                self.fired = true;
                Some(SizeEvent::Violated(self.kind))
            }
            (true, true) => {
                self.fired = false;
                Some(SizeEvent::Recovered(self.kind))
            }
            _ => None,
        }
    }
}

//=== SizeGate ============================================================

#[derive(Debug, Clone, Default)]
pub struct SizeGate {
    bounds: Vec<Bound>,
}

impl SizeGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Participant count as seen from the local participant.
    ///
    /// The roster excludes the local participant, who is counted unless
    /// they are an admin.
    pub fn count(roster: &dyn Roster, is_admin: bool) -> usize {
        roster.size() + usize::from(!is_admin)
    }

    /// Installs thresholds for a new step.
    ///
    /// Returns the violations already present at `count`.
    pub fn init(&mut self, config: &SizeConfig, count: usize) -> Result<Vec<SizeEvent>, SizeError> {
        self.bounds.clear();

        if let Some(exact) = config.exact_players {
            let exact = Self::resolve("init", exact, count)?;
            if config.min_players.is_some() || config.max_players.is_some() {
                return Err(SizeError::ExactWithBounds { exact });
            }
            self.bounds.push(Bound { kind: SizeBound::ExactPlayers, value: exact, fired: false });
        }

        let min = config.min_players.map(|t| Self::resolve("init", t, count)).transpose()?;
        let max = config.max_players.map(|t| Self::resolve("init", t, count)).transpose()?;

        if let (Some(min), Some(max)) = (min, max) {
            if max <= min {
                return Err(SizeError::MaxNotAboveMin { min, max });
            }
        }
        if let Some(min) = min {
            self.bounds.push(Bound { kind: SizeBound::MinPlayers, value: min, fired: false });
        }
        if let Some(max) = max {
            self.bounds.push(Bound { kind: SizeBound::MaxPlayers, value: max, fired: false });
        }

        if !self.bounds.is_empty() {
            debug!("SizeGate: installed {:?} at count {}", self.bounds, count);
        }

        Ok(self
            .bounds
            .iter_mut()
            .filter(|b| !b.is_satisfied(count))
            .map(|b| {
                b.fired = true;
                SizeEvent::Violated(b.kind)
            })
            .collect())
    }

    fn resolve(method: &'static str, threshold: Threshold, snapshot: usize) -> Result<usize, SizeError> {
        let value = threshold.resolve(snapshot);
        if value == 0 {
            return Err(SizeError::InvalidThreshold {
                method,
                reason: "threshold must be a positive number",
                found: format!("{:?} (resolved to 0)", threshold),
            });
        }
        Ok(value)
    }

    /// Re-evaluates every bound after the roster changed.
    pub fn update(&mut self, count: usize) -> Vec<SizeEvent> {
        let events: Vec<SizeEvent> = self.bounds.iter_mut().filter_map(|b| b.observe(count)).collect();
        for e in &events {
            info!("SizeGate: {:?} at count {}", e, count);
        }
        events
    }

    /// True when every bound holds at `count`.
    pub fn check_size(&self, count: usize) -> bool {
        self.bounds.iter().all(|b| b.is_satisfied(count))
    }

    pub fn is_active(&self) -> bool {
        !self.bounds.is_empty()
    }

    pub fn threshold(&self, kind: SizeBound) -> Option<usize> {
        self.bounds.iter().find(|b| b.kind == kind).map(|b| b.value)
    }

    pub fn clear(&mut self) {
        self.bounds.clear();
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::roster::{Player, PlayerList};
    use serde_json::json;

    fn min(n: usize) -> SizeConfig {
        SizeConfig { min_players: Some(Threshold::Fixed(n)), ..Default::default() }
    }

    #[test]
    fn thresholds_deserialize() {
        let cfg: SizeConfig =
            serde_json::from_value(json!({"min_players": 2, "max_players": "*", "exact_players": "@"})).unwrap();
        assert_eq!(cfg.min_players, Some(Threshold::Fixed(2)));
        assert_eq!(cfg.max_players, Some(Threshold::Snapshot));
        assert_eq!(cfg.exact_players, Some(Threshold::AnyNonZero));
        assert!(serde_json::from_value::<SizeConfig>(json!({"min_players": "x"})).is_err());
        assert!(serde_json::from_value::<SizeConfig>(json!({"min_players": -1})).is_err());
    }

    #[test]
    fn min_violation_then_single_recovery() {
        let mut pl = PlayerList::new();
        let mut gate = SizeGate::new();

        let count = SizeGate::count(&pl, false);
        assert_eq!(count, 1);
        assert_eq!(gate.init(&min(2), count).unwrap(), vec![SizeEvent::Violated(SizeBound::MinPlayers)]);
        assert!(!gate.check_size(count));

        // Still violated: nothing fires again.
        assert!(gate.update(count).is_empty());

        pl.add(Player::new("p2")).unwrap();
        let count = SizeGate::count(&pl, false);
        assert!(gate.check_size(count));
        assert_eq!(gate.update(count), vec![SizeEvent::Recovered(SizeBound::MinPlayers)]);
        assert!(gate.update(count).is_empty());
    }

    #[test]
    fn violation_rearms_after_recovery() {
        let mut gate = SizeGate::new();
        let cfg = SizeConfig { max_players: Some(Threshold::Fixed(3)), ..Default::default() };
        assert!(gate.init(&cfg, 2).unwrap().is_empty());

        assert_eq!(gate.update(4), vec![SizeEvent::Violated(SizeBound::MaxPlayers)]);
        assert_eq!(gate.update(3), vec![SizeEvent::Recovered(SizeBound::MaxPlayers)]);
        assert_eq!(gate.update(5), vec![SizeEvent::Violated(SizeBound::MaxPlayers)]);
    }

    #[test]
    fn max_must_exceed_min() {
        let mut gate = SizeGate::new();
        let cfg = SizeConfig {
            min_players: Some(Threshold::Fixed(2)),
            max_players: Some(Threshold::Fixed(2)),
            ..Default::default()
        };
        assert_eq!(gate.init(&cfg, 2), Err(SizeError::MaxNotAboveMin { min: 2, max: 2 }));
    }

    #[test]
    fn exact_excludes_bounds() {
        let mut gate = SizeGate::new();
        let cfg = SizeConfig {
            exact_players: Some(Threshold::Fixed(3)),
            min_players: Some(Threshold::Fixed(2)),
            ..Default::default()
        };
        assert_eq!(gate.init(&cfg, 3), Err(SizeError::ExactWithBounds { exact: 3 }));

        let cfg = SizeConfig { exact_players: Some(Threshold::Fixed(3)), ..Default::default() };
        assert!(gate.init(&cfg, 3).unwrap().is_empty());
        assert!(!gate.check_size(2));
        assert!(gate.check_size(3));
    }

    #[test]
    fn snapshot_and_any_non_zero() {
        let mut gate = SizeGate::new();
        let cfg = SizeConfig { exact_players: Some(Threshold::Snapshot), ..Default::default() };
        gate.init(&cfg, 4).unwrap();
        assert_eq!(gate.threshold(SizeBound::ExactPlayers), Some(4));

        let cfg = SizeConfig { min_players: Some(Threshold::AnyNonZero), ..Default::default() };
        gate.init(&cfg, 0).unwrap();
        assert_eq!(gate.threshold(SizeBound::MinPlayers), Some(1));
        assert!(gate.init(&min(0), 1).is_err());
    }

    #[test]
    fn admins_do_not_count_themselves() {
        let pl = PlayerList::new();
        assert_eq!(SizeGate::count(&pl, true), 0);
    }
}
