//=========================================================================
// Matcher Manager
//=========================================================================
//
// Turns a step's `matcher` settings into per-participant assignments.
//
// Architecture:
//   MatcherSettings (serde, from step property "matcher")
//        ↓ match_step(settings, round, ids)
//   [rebuild if settings / ids changed or re_init]
//        Matcher::generate_matches → set_ids → do_match
//        RoleMapper::set_roles → rolify_all
//        ↓
//   HashMap<id, Assignment { role, partner }>
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::HashMap;

use log::{debug, info};
use serde::{Deserialize, Serialize};

//=== Internal Dependencies ===============================================

use super::error::MatchError;
use super::matcher::{Algorithm, CyclePolicy, MatchOptions, Matcher, Position, DEFAULT_BYE, DEFAULT_MISSING_ID};
use super::roles::{RoleMapper, RoleOptions};

//=== MatcherSettings =====================================================

fn default_bye() -> Position {
    DEFAULT_BYE
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatcherSettings {
    #[serde(rename = "match", default)]
    pub algorithm: Algorithm,
    #[serde(default)]
    pub roles: Option<Vec<String>>,
    #[serde(default)]
    pub cycle: Option<CyclePolicy>,
    #[serde(default)]
    pub skip_bye: bool,
    #[serde(default = "default_bye")]
    pub bye: Position,
    #[serde(default)]
    pub rounds: Option<i64>,
    #[serde(default)]
    pub fixed_roles: bool,
    #[serde(default)]
    pub can_match_same_role: bool,
    /// Falls back to the manager's default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_id: Option<String>,
    #[serde(default)]
    pub re_init: bool,
}

impl Default for MatcherSettings {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::RoundRobin,
            roles: None,
            cycle: None,
            skip_bye: false,
            bye: DEFAULT_BYE,
            rounds: None,
            fixed_roles: false,
            can_match_same_role: false,
            missing_id: None,
            re_init: false,
        }
    }
}

impl MatcherSettings {
    fn match_options(&self) -> MatchOptions {
        MatchOptions {
            rounds: self.rounds,
            cycle: self.cycle,
            skip_bye: self.skip_bye,
            bye: self.bye,
        }
    }

    fn role_options(&self) -> RoleOptions {
        RoleOptions {
            fixed_roles: self.fixed_roles,
            can_match_same_role: self.can_match_same_role,
        }
    }

    /// Settings that require rebuilding the schedule when they change.
    fn same_schedule(&self, other: &MatcherSettings) -> bool {
        let mut a = self.clone();
        let mut b = other.clone();
        a.re_init = false;
        b.re_init = false;
        a == b
    }
}

//=== Assignment ==========================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner: Option<String>,
}

//=== MatcherManager ======================================================

#[derive(Debug)]
pub struct MatcherManager {
    matcher: Matcher,
    roler: RoleMapper,
    default_missing_id: String,
    last_settings: Option<MatcherSettings>,
    last_ids: Vec<String>,
    last_match_type: Option<Algorithm>,
}

impl Default for MatcherManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MatcherManager {
    pub fn new() -> Self {
        Self::with_missing_id(DEFAULT_MISSING_ID)
    }

    /// `missing_id` stands in for the bye when a step's settings name none.
    pub fn with_missing_id(missing_id: impl Into<String>) -> Self {
        Self {
            matcher: Matcher::new(),
            roler: RoleMapper::default(),
            default_missing_id: missing_id.into(),
            last_settings: None,
            last_ids: Vec::new(),
            last_match_type: None,
        }
    }

    pub fn default_missing_id(&self) -> &str {
        &self.default_missing_id
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn matcher_mut(&mut self) -> &mut Matcher {
        &mut self.matcher
    }

    pub fn roler(&self) -> &RoleMapper {
        &self.roler
    }

    pub fn last_match_type(&self) -> Option<Algorithm> {
        self.last_match_type
    }

    /// Assignments of every participant in `ids` for the 1-based `round`.
    pub fn match_step(
        &mut self,
        settings: &MatcherSettings,
        round: u32,
        ids: &[String],
    ) -> Result<HashMap<String, Assignment>, MatchError> {
        let stale = settings.re_init
            || self.last_ids != ids
            || !self
                .last_settings
                .as_ref()
                .is_some_and(|last| last.same_schedule(settings));

        if stale {
            self.rebuild(settings, ids)?;
        }

        let idx = self
            .matcher
            .normalize_round(round)
            .ok_or(MatchError::NoSchedule { method: "MatcherManager.match_step" })?;

        let mut out: HashMap<String, Assignment> = HashMap::new();
        let missing = self.matcher.missing_id();

        if let Some(pairs) = self.matcher.get_round(idx) {
            for pair in pairs {
                for (slot, id) in pair.iter().enumerate() {
                    if id == missing {
                        continue;
                    }
                    let other = &pair[1 - slot];
                    let partner = (other != missing).then(|| other.clone());
                    let role = self.roler.get_role_for(id, idx).map(str::to_string);
                    out.insert(id.clone(), Assignment { role, partner });
                }
            }
        }

        // Participants sitting out a round (skipped byes) still get an entry.
        for id in ids {
            out.entry(id.clone()).or_default();
        }

        debug!("MatcherManager: round {} (index {}) → {} assignment(s)", round, idx, out.len());
        Ok(out)
    }

    fn rebuild(&mut self, settings: &MatcherSettings, ids: &[String]) -> Result<(), MatchError> {
        info!(
            "MatcherManager: building {} schedule for {} participant(s)",
            settings.algorithm,
            ids.len()
        );

        let missing_id = settings
            .missing_id
            .clone()
            .unwrap_or_else(|| self.default_missing_id.clone());

        self.matcher.clear();
        self.matcher.set_missing_id(missing_id.clone());
        self.matcher
            .generate_matches(settings.algorithm, ids.len(), settings.match_options())?;
        self.matcher.set_ids(ids.to_vec())?;
        self.matcher.do_match(true)?;

        self.roler.clear();
        if let Some(roles) = &settings.roles {
            self.roler.set_roles(roles.clone(), None, None)?;
            self.roler
                .rolify_all(self.matcher.resolved(), &missing_id, settings.role_options())?;
        }

        self.last_settings = Some(settings.clone());
        self.last_ids = ids.to_vec();
        self.last_match_type = Some(settings.algorithm);
        Ok(())
    }

    /// Propagates a reconnection under a new id.
    pub fn replace_id(&mut self, old_id: &str, new_id: &str) -> bool {
        let replaced = self.matcher.replace_id(old_id, new_id);
        if replaced {
            self.roler.replace_id(old_id, new_id);
            for id in self.last_ids.iter_mut().filter(|i| i.as_str() == old_id) {
                *id = new_id.to_string();
            }
        }
        replaced
    }

    pub fn clear(&mut self) {
        self.matcher.clear();
        self.roler.clear();
        self.last_settings = None;
        self.last_ids.clear();
        self.last_match_type = None;
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("p{}", i)).collect()
    }

    #[test]
    fn settings_from_json() {
        let s: MatcherSettings = serde_json::from_value(json!({
            "match": "roundrobin",
            "roles": ["A", "B"],
            "cycle": "mirror_invert",
            "skip_bye": true
        }))
        .unwrap();
        assert_eq!(s.algorithm, Algorithm::RoundRobin);
        assert_eq!(s.cycle, Some(CyclePolicy::MirrorInvert));
        assert_eq!(s.missing_id, None);
        assert_eq!(s.bye, -1);
    }

    #[test]
    fn assignments_for_round() {
        let mut m = MatcherManager::new();
        let settings = MatcherSettings { roles: Some(vec!["A".into(), "B".into()]), ..Default::default() };

        let out = m.match_step(&settings, 1, &ids(4)).unwrap();
        assert_eq!(out["p0"], Assignment { role: Some("A".into()), partner: Some("p3".into()) });
        assert_eq!(out["p3"], Assignment { role: Some("B".into()), partner: Some("p0".into()) });
        assert_eq!(m.last_match_type(), Some(Algorithm::RoundRobin));

        let out = m.match_step(&settings, 2, &ids(4)).unwrap();
        assert_eq!(out["p0"].partner.as_deref(), Some("p2"));
    }

    #[test]
    fn bye_has_no_partner() {
        let mut m = MatcherManager::new();
        let out = m.match_step(&MatcherSettings::default(), 1, &ids(3)).unwrap();
        assert_eq!(out["p0"].partner, None);
        assert_eq!(out["p1"].partner.as_deref(), Some("p2"));
        assert!(!out.contains_key("bot"));

        let skip = MatcherSettings { skip_bye: true, ..Default::default() };
        let out = m.match_step(&skip, 1, &ids(3)).unwrap();
        assert_eq!(out["p0"], Assignment::default());
    }

    #[test]
    fn missing_id_defaults_to_the_manager_setting() {
        let mut m = MatcherManager::with_missing_id("ghost");
        let out = m.match_step(&MatcherSettings::default(), 1, &ids(3)).unwrap();
        assert_eq!(m.matcher().missing_id(), "ghost");
        assert!(!out.contains_key("ghost"));
        assert_eq!(out["p0"].partner, None);

        let own = MatcherSettings { missing_id: Some("robot".into()), ..Default::default() };
        m.match_step(&own, 1, &ids(3)).unwrap();
        assert_eq!(m.matcher().missing_id(), "robot");
    }

    #[test]
    fn rounds_wrap_past_schedule() {
        let mut m = MatcherManager::new();
        let s = MatcherSettings::default();
        let first = m.match_step(&s, 1, &ids(4)).unwrap();
        let fourth = m.match_step(&s, 4, &ids(4)).unwrap();
        assert_eq!(first, fourth);
    }

    #[test]
    fn replace_id_survives_next_round() {
        let mut m = MatcherManager::new();
        let s = MatcherSettings::default();
        let before = m.match_step(&s, 1, &ids(4)).unwrap();

        assert!(m.replace_id("p0", "n0"));
        let mut current = ids(4);
        current[0] = "n0".into();

        let after = m.match_step(&s, 1, &current).unwrap();
        assert_eq!(after["n0"].partner, before["p0"].partner);
        assert_eq!(after["p3"].partner.as_deref(), Some("n0"));
    }
}
