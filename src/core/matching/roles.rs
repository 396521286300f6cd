//=========================================================================
// Role Mapper
//=========================================================================
//
// Assigns role labels onto a resolved match schedule.
//
// Architecture:
//   resolved: rounds × [id, id]
//        ↓ rolify_all
//   rolified: rounds × [role?, role?]      (same shape, None for the bye)
//   id2role:  rounds × { id → role }
//   role2id:  rounds × { role → [id] }
//
// Positional rule: first id of a pair takes roles[0], second roles[1].
// A participant facing the bye takes roles[2] when three roles exist.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::{HashMap, HashSet};

use log::{debug, warn};

//=== Internal Dependencies ===============================================

use super::error::RoleError;
use super::matcher::IdPair;

//=== RoleOptions =========================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleOptions {
    /// Every participant keeps the role drawn in the first round.
    pub fixed_roles: bool,
    /// With fixed roles, allow two holders of the same role to meet.
    pub can_match_same_role: bool,
}

//=== RoleMapper ==========================================================

#[derive(Debug, Clone, Default)]
pub struct RoleMapper {
    roles: Vec<String>,
    rolified: Vec<Vec<[Option<String>; 2]>>,
    id2role: Vec<HashMap<String, String>>,
    role2id: Vec<HashMap<String, Vec<String>>>,
}

impl RoleMapper {
    pub fn new() -> Self {
        Self::default()
    }

    //--- Configuration ----------------------------------------------------

    /// Sets the role labels. `min` defaults to 2 when `None`.
    pub fn set_roles(&mut self, roles: Vec<String>, min: Option<usize>, max: Option<usize>) -> Result<(), RoleError> {
        let min = min.unwrap_or(2);
        let invalid = |reason| RoleError::InvalidRoles {
            method: "RoleMapper.set_roles",
            reason,
            found: format!("{:?}", roles),
        };

        if roles.len() < min {
            return Err(invalid("not enough roles"));
        }
        if max.is_some_and(|m| roles.len() > m) {
            return Err(invalid("too many roles"));
        }
        if roles.iter().any(|r| r.trim().is_empty()) {
            return Err(invalid("roles must be non-empty strings"));
        }
        let unique: HashSet<&String> = roles.iter().collect();
        if unique.len() != roles.len() {
            return Err(invalid("roles must be unique"));
        }

        self.roles = roles;
        self.clear_maps();
        Ok(())
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    //--- Assignment -------------------------------------------------------

    /// Rebuilds every role structure from a resolved schedule.
    pub fn rolify_all(&mut self, resolved: &[Vec<IdPair>], missing_id: &str, options: RoleOptions) -> Result<(), RoleError> {
        if self.roles.len() < 2 {
            return Err(RoleError::InvalidRoles {
                method: "RoleMapper.rolify_all",
                reason: "roles not set",
                found: format!("{:?}", self.roles),
            });
        }
        self.clear_maps();

        let solo_role = self.roles.get(2);
        let mut fixed: HashMap<String, String> = HashMap::new();

        for (round_idx, round) in resolved.iter().enumerate() {
            let mut rolified = Vec::with_capacity(round.len());
            let mut id2role = HashMap::new();
            let mut role2id: HashMap<String, Vec<String>> = HashMap::new();

            for pair in round {
                let singleton = pair.iter().any(|id| id == missing_id);
                let mut out: [Option<String>; 2] = [None, None];

                for (slot, id) in pair.iter().enumerate() {
                    if id == missing_id {
                        continue;
                    }
                    let positional = match (singleton, solo_role) {
                        (true, Some(solo)) => solo,
                        _ => &self.roles[slot],
                    };
                    let role = if options.fixed_roles {
                        fixed.entry(id.clone()).or_insert_with(|| positional.clone()).clone()
                    } else {
                        positional.clone()
                    };

                    id2role.insert(id.clone(), role.clone());
                    role2id.entry(role.clone()).or_default().push(id.clone());
                    out[slot] = Some(role);
                }

                if let [Some(a), Some(b)] = &out {
                    if a == b && !options.can_match_same_role && !singleton {
                        return Err(RoleError::SameRoleMatch {
                            round: round_idx,
                            role: a.clone(),
                            a: pair[0].clone(),
                            b: pair[1].clone(),
                        });
                    }
                }
                rolified.push(out);
            }

            self.rolified.push(rolified);
            self.id2role.push(id2role);
            self.role2id.push(role2id);
        }

        debug!("RoleMapper: rolified {} round(s) with roles {:?}", self.rolified.len(), self.roles);
        Ok(())
    }

    pub fn rolified(&self) -> &[Vec<[Option<String>; 2]>] {
        &self.rolified
    }

    //--- Lookup -----------------------------------------------------------

    pub fn get_role_for(&self, id: &str, round: usize) -> Option<&str> {
        self.id2role.get(round)?.get(id).map(String::as_str)
    }

    /// First participant holding `role` at `round`.
    pub fn get_id_for_role(&self, role: &str, round: usize) -> Option<&str> {
        self.get_ids_for_role(role, round).first().map(String::as_str)
    }

    pub fn get_ids_for_role(&self, role: &str, round: usize) -> &[String] {
        self.role2id
            .get(round)
            .and_then(|m| m.get(role))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_role(&self, id: &str, role: &str, round: usize) -> bool {
        self.get_role_for(id, round) == Some(role)
    }

    //--- Reconnection -----------------------------------------------------

    pub fn replace_id(&mut self, old_id: &str, new_id: &str) -> bool {
        let mut found = false;
        for map in &mut self.id2role {
            if let Some(role) = map.remove(old_id) {
                map.insert(new_id.to_string(), role);
                found = true;
            }
        }
        for map in &mut self.role2id {
            for id in map.values_mut().flatten().filter(|i| i.as_str() == old_id) {
                *id = new_id.to_string();
            }
        }
        if !found {
            warn!("RoleMapper.replace_id: id not found. Found: {}", old_id);
        }
        found
    }

    fn clear_maps(&mut self) {
        self.rolified.clear();
        self.id2role.clear();
        self.role2id.clear();
    }

    pub fn clear(&mut self) {
        self.roles.clear();
        self.clear_maps();
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::matching::{Algorithm, MatchOptions, Matcher};

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn resolved(n: usize) -> Vec<Vec<IdPair>> {
        let mut m = Matcher::new();
        m.generate_matches(Algorithm::RoundRobin, n, MatchOptions::default()).unwrap();
        let ids: Vec<String> = (0..n).map(|i| format!("p{}", i)).collect();
        m.set_ids(ids).unwrap();
        m.do_match(false).unwrap();
        m.resolved().to_vec()
    }

    #[test]
    fn set_roles_validates() {
        let mut r = RoleMapper::new();
        assert!(r.set_roles(strings(&["A"]), None, None).is_err());
        assert!(r.set_roles(strings(&["A", "A"]), None, None).is_err());
        assert!(r.set_roles(strings(&["A", ""]), None, None).is_err());
        assert!(r.set_roles(strings(&["A", "B", "C"]), None, Some(2)).is_err());
        r.set_roles(strings(&["A", "B"]), None, None).unwrap();
        assert_eq!(r.roles(), &strings(&["A", "B"])[..]);
    }

    #[test]
    fn positional_roles() {
        let mut r = RoleMapper::new();
        r.set_roles(strings(&["BIDDER", "RESPONDER"]), None, None).unwrap();
        r.rolify_all(&resolved(4), "bot", RoleOptions::default()).unwrap();

        // Round 0 of four: [p0, p3], [p1, p2].
        assert_eq!(r.get_role_for("p0", 0), Some("BIDDER"));
        assert_eq!(r.get_role_for("p3", 0), Some("RESPONDER"));
        assert!(r.has_role("p2", "RESPONDER", 0));
        assert_eq!(r.get_ids_for_role("BIDDER", 0), &strings(&["p0", "p1"])[..]);
        assert_eq!(r.get_id_for_role("RESPONDER", 0), Some("p3"));
        assert_eq!(r.rolified()[0][0], [Some("BIDDER".to_string()), Some("RESPONDER".to_string())]);
    }

    #[test]
    fn singleton_takes_third_role() {
        let mut r = RoleMapper::new();
        r.set_roles(strings(&["A", "B", "SOLO"]), None, None).unwrap();
        r.rolify_all(&resolved(3), "bot", RoleOptions::default()).unwrap();

        // Round 0 of three: [p0, bot], [p1, p2].
        assert_eq!(r.get_role_for("p0", 0), Some("SOLO"));
        assert_eq!(r.get_role_for("bot", 0), None);
        assert_eq!(r.rolified()[0][0], [Some("SOLO".to_string()), None]);
        assert_eq!(r.get_role_for("p1", 0), Some("A"));
    }

    #[test]
    fn fixed_roles_detect_same_role_meeting() {
        let mut r = RoleMapper::new();
        r.set_roles(strings(&["A", "B"]), None, None).unwrap();

        let fixed = RoleOptions { fixed_roles: true, can_match_same_role: false };
        let err = r.rolify_all(&resolved(4), "bot", fixed).unwrap_err();
        assert!(matches!(err, RoleError::SameRoleMatch { .. }));

        let relaxed = RoleOptions { fixed_roles: true, can_match_same_role: true };
        r.rolify_all(&resolved(4), "bot", relaxed).unwrap();
        assert_eq!(r.get_role_for("p3", 0), r.get_role_for("p3", 2));
    }

    #[test]
    fn replace_id_keeps_maps_consistent() {
        let mut r = RoleMapper::new();
        r.set_roles(strings(&["A", "B"]), None, None).unwrap();
        r.rolify_all(&resolved(4), "bot", RoleOptions::default()).unwrap();

        let before: Vec<Option<String>> = (0..3).map(|i| r.get_role_for("p1", i).map(str::to_string)).collect();
        assert!(r.replace_id("p1", "q1"));
        for (i, role) in before.iter().enumerate() {
            assert_eq!(r.get_role_for("p1", i), None);
            assert_eq!(r.get_role_for("q1", i).map(str::to_string), *role);
        }
        assert!(r.get_ids_for_role("A", 0).contains(&"q1".to_string()));
        assert!(!r.replace_id("nobody", "x"));
    }
}
