//=========================================================================
// Matcher
//=========================================================================
//
// Pairing schedules over abstract positions, resolved to participant ids.
//
// Architecture:
//   generate_matches(alg, n, opts) → schedule: rounds × [pos, pos]
//   set_ids(ids) + assigner         → position → id
//   do_match(reassign)              → resolved pairs + id → partner maps
//   get_match*/get_match_for        → lookups (cursor or indexed)
//
// Round robin uses the circle method: position 0 stays fixed and the
// others rotate one place per round. Odd counts get a bye position.
//
// With a cycle policy the schedule is doubled: rounds L..2L-1 are the
// repeated or mirrored base rounds, pairs swapped for the invert variants.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::{debug, warn};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

//=== Internal Dependencies ===============================================

use super::error::MatchError;

//=== Types ===============================================================

/// Schedule position. Real positions are `0..n`, the bye is negative by
/// default.
pub type Position = i64;

pub type Pair = [Position; 2];

pub type IdPair = [String; 2];

/// Default bye position.
pub const DEFAULT_BYE: Position = -1;

/// Default id standing in for the bye once resolved.
pub const DEFAULT_MISSING_ID: &str = "bot";

/// Permutes the id list before positions are resolved.
pub type AssignerFn = Rc<dyn Fn(&[String]) -> Vec<String>>;

//=== Algorithm / CyclePolicy =============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Algorithm {
    #[default]
    RoundRobin,
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CyclePolicy {
    Repeat,
    RepeatInvert,
    Mirror,
    MirrorInvert,
}

impl CyclePolicy {
    fn is_mirror(self) -> bool {
        matches!(self, CyclePolicy::Mirror | CyclePolicy::MirrorInvert)
    }

    fn is_invert(self) -> bool {
        matches!(self, CyclePolicy::RepeatInvert | CyclePolicy::MirrorInvert)
    }
}

//=== MatchOptions ========================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOptions {
    /// Base rounds to generate. Defaults to the natural cycle length for
    /// round robin and to 1 for random. With a `cycle`, round robin also
    /// accepts up to twice the natural length: the cycled schedule is then
    /// cut to exactly that many rounds.
    pub rounds: Option<i64>,
    pub cycle: Option<CyclePolicy>,
    pub skip_bye: bool,
    pub bye: Position,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            rounds: None,
            cycle: None,
            skip_bye: false,
            bye: DEFAULT_BYE,
        }
    }
}

//=== Assigners ===========================================================

pub fn pass_through_assigner() -> AssignerFn {
    Rc::new(|ids: &[String]| ids.to_vec())
}

pub fn random_assigner() -> AssignerFn {
    Rc::new(|ids: &[String]| {
        let mut out = ids.to_vec();
        out.shuffle(&mut rand::thread_rng());
        out
    })
}

//=== Matcher =============================================================

pub struct Matcher {
    schedule: Option<Vec<Vec<Pair>>>,
    participants: usize,
    options: MatchOptions,
    ids: Vec<String>,
    assigned: Option<Vec<String>>,
    assigner: AssignerFn,
    missing_id: String,
    resolved: Vec<Vec<IdPair>>,
    resolved_obj: Vec<HashMap<String, String>>,
    cursor: (usize, usize),
}

impl Matcher {
    pub fn new() -> Self {
        Self {
            schedule: None,
            participants: 0,
            options: MatchOptions::default(),
            ids: Vec::new(),
            assigned: None,
            assigner: pass_through_assigner(),
            missing_id: DEFAULT_MISSING_ID.to_string(),
            resolved: Vec::new(),
            resolved_obj: Vec::new(),
            cursor: (0, 0),
        }
    }

    //--- Generation -------------------------------------------------------

    /// Builds the schedule for `n` participants. Drops any resolution.
    pub fn generate_matches(&mut self, algorithm: Algorithm, n: usize, options: MatchOptions) -> Result<(), MatchError> {
        if n == 0 {
            return Err(MatchError::InvalidArgument {
                method: "Matcher.generate_matches",
                reason: "number of participants must be positive",
                found: n.to_string(),
            });
        }
        if (0..n as Position).contains(&options.bye) {
            return Err(MatchError::InvalidArgument {
                method: "Matcher.generate_matches",
                reason: "bye must not collide with a participant position",
                found: options.bye.to_string(),
            });
        }

        let (base, cut) = match algorithm {
            Algorithm::RoundRobin => Self::round_robin(n, &options)?,
            Algorithm::Random => (Self::random(n, &options)?, None),
        };

        let mut schedule = match options.cycle {
            Some(cycle) => Self::apply_cycle(base, cycle),
            None => base,
        };
        if let Some(len) = cut {
            schedule.truncate(len);
        }

        debug!(
            "Matcher: generated {} round(s) for {} participant(s) ({}, cycle {:?})",
            schedule.len(),
            n,
            algorithm,
            options.cycle
        );

        self.schedule = Some(schedule);
        self.participants = n;
        self.options = options;
        self.assigned = None;
        self.resolved.clear();
        self.resolved_obj.clear();
        self.cursor = (0, 0);
        Ok(())
    }

    fn positions(n: usize, bye: Position) -> Vec<Position> {
        let mut ps: Vec<Position> = (0..n as Position).collect();
        if n % 2 == 1 {
            ps.push(bye);
        }
        ps
    }

    fn checked_rounds(requested: Option<i64>, default: usize, limit: Option<usize>) -> Result<usize, MatchError> {
        let Some(r) = requested else {
            return Ok(default);
        };
        let over = limit.is_some_and(|l| r as usize > l);
        if r <= 0 || over {
            return Err(MatchError::InvalidArgument {
                method: "Matcher.generate_matches",
                reason: "rounds must be positive and within the schedule length",
                found: r.to_string(),
            });
        }
        Ok(r as usize)
    }

    fn pairs_of(ps: &[Position], options: &MatchOptions) -> Vec<Pair> {
        let len = ps.len();
        (0..len / 2)
            .map(|j| [ps[j], ps[len - 1 - j]])
            .filter(|p| !(options.skip_bye && (p[0] == options.bye || p[1] == options.bye)))
            .collect()
    }

    /// Returns the base rounds and, when the request runs past the natural
    /// length, the total length to cut the cycled schedule to.
    fn round_robin(n: usize, options: &MatchOptions) -> Result<(Vec<Vec<Pair>>, Option<usize>), MatchError> {
        let mut ps = Self::positions(n, options.bye);
        let natural = ps.len() - 1;
        let limit = if options.cycle.is_some() { 2 * natural } else { natural };
        let rounds = Self::checked_rounds(options.rounds, natural, Some(limit))?;
        let base_rounds = rounds.min(natural);

        let mut out = Vec::with_capacity(base_rounds);
        for _ in 0..base_rounds {
            out.push(Self::pairs_of(&ps, options));
            if let Some(last) = ps.pop() {
                ps.insert(1, last);
            }
        }
        Ok((out, (rounds > natural).then_some(rounds)))
    }

    fn random(n: usize, options: &MatchOptions) -> Result<Vec<Vec<Pair>>, MatchError> {
        let mut ps = Self::positions(n, options.bye);
        let rounds = Self::checked_rounds(options.rounds, 1, None)?;
        let mut rng = rand::thread_rng();

        Ok((0..rounds)
            .map(|_| {
                ps.shuffle(&mut rng);
                Self::pairs_of(&ps, options)
            })
            .collect())
    }

    fn apply_cycle(base: Vec<Vec<Pair>>, cycle: CyclePolicy) -> Vec<Vec<Pair>> {
        let len = base.len();
        let mut out = base.clone();
        for i in len..2 * len {
            let src = if cycle.is_mirror() { 2 * len - i - 1 } else { i - len };
            let round = base[src]
                .iter()
                .map(|p| if cycle.is_invert() { [p[1], p[0]] } else { *p })
                .collect();
            out.push(round);
        }
        out
    }

    pub fn schedule(&self) -> Option<&[Vec<Pair>]> {
        self.schedule.as_deref()
    }

    //--- Ids --------------------------------------------------------------

    pub fn set_ids(&mut self, ids: Vec<String>) -> Result<(), MatchError> {
        if self.schedule.is_some() && ids.len() != self.participants {
            return Err(MatchError::IdCountMismatch {
                method: "Matcher.set_ids",
                expected: self.participants,
                found: ids.len(),
            });
        }
        self.ids = ids;
        self.assigned = None;
        Ok(())
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn set_assigner(&mut self, assigner: AssignerFn) {
        self.assigner = assigner;
    }

    pub fn set_missing_id(&mut self, missing_id: impl Into<String>) {
        self.missing_id = missing_id.into();
    }

    pub fn missing_id(&self) -> &str {
        &self.missing_id
    }

    //--- Resolution -------------------------------------------------------

    /// Resolves the schedule into ids. The assigner runs again only when
    /// `reassign` is set or no assignment exists yet.
    pub fn do_match(&mut self, reassign: bool) -> Result<(), MatchError> {
        let Some(schedule) = self.schedule.as_ref() else {
            return Err(MatchError::NoSchedule { method: "Matcher.match" });
        };
        if self.ids.len() != self.participants {
            return Err(MatchError::IdCountMismatch {
                method: "Matcher.match",
                expected: self.participants,
                found: self.ids.len(),
            });
        }

        if reassign || self.assigned.is_none() {
            let assigned = (self.assigner)(&self.ids);
            if assigned.len() != self.ids.len() {
                return Err(MatchError::IdCountMismatch {
                    method: "Matcher.match",
                    expected: self.ids.len(),
                    found: assigned.len(),
                });
            }
            self.assigned = Some(assigned);
        }
        let Some(assigned) = self.assigned.as_ref() else {
            return Err(MatchError::NoSchedule { method: "Matcher.match" });
        };

        let resolve = |pos: Position| -> String {
            if pos == self.options.bye {
                self.missing_id.clone()
            } else {
                assigned[pos as usize].clone()
            }
        };

        let mut resolved = Vec::with_capacity(schedule.len());
        let mut resolved_obj = Vec::with_capacity(schedule.len());
        for round in schedule {
            let pairs: Vec<IdPair> = round.iter().map(|p| [resolve(p[0]), resolve(p[1])]).collect();
            let mut obj = HashMap::new();
            for [a, b] in &pairs {
                if *a != self.missing_id {
                    obj.insert(a.clone(), b.clone());
                }
                if *b != self.missing_id {
                    obj.insert(b.clone(), a.clone());
                }
            }
            resolved.push(pairs);
            resolved_obj.push(obj);
        }

        self.resolved = resolved;
        self.resolved_obj = resolved_obj;
        self.cursor = (0, 0);
        Ok(())
    }

    pub fn resolved(&self) -> &[Vec<IdPair>] {
        &self.resolved
    }

    pub fn has_matches(&self) -> bool {
        !self.resolved.is_empty()
    }

    //--- Lookup -----------------------------------------------------------

    fn round_index(&self, x: usize) -> Option<usize> {
        let len = self.resolved.len();
        if len == 0 {
            None
        } else if x < len {
            Some(x)
        } else if self.options.cycle.is_some() {
            Some(x % len)
        } else {
            None
        }
    }

    /// Next pair in schedule order; `None` once every pair was returned.
    pub fn next_match(&mut self) -> Option<IdPair> {
        loop {
            let (x, y) = self.cursor;
            let round = self.resolved.get(x)?;
            if let Some(pair) = round.get(y) {
                self.cursor = (x, y + 1);
                return Some(pair.clone());
            }
            self.cursor = (x + 1, 0);
        }
    }

    pub fn get_round(&self, x: usize) -> Option<&[IdPair]> {
        self.round_index(x).map(|i| self.resolved[i].as_slice())
    }

    pub fn get_match(&self, x: usize, y: usize) -> Option<&IdPair> {
        self.get_round(x)?.get(y)
    }

    pub fn get_match_object(&self, x: usize) -> Option<&HashMap<String, String>> {
        self.round_index(x).map(|i| &self.resolved_obj[i])
    }

    /// Partner of `id` at `round`, or at the cursor's round.
    pub fn get_match_for(&self, id: &str, round: Option<usize>) -> Option<&str> {
        let x = round.unwrap_or(self.cursor.0);
        self.get_match_object(x)?.get(id).map(String::as_str)
    }

    /// Maps a 1-based round counter onto a schedule index.
    pub fn normalize_round(&self, round: u32) -> Option<usize> {
        let len = self.resolved.len();
        if len == 0 {
            return None;
        }
        Some((round.max(1) as usize - 1) % len)
    }

    //--- Reconnection -----------------------------------------------------

    /// Substitutes `new_id` for `old_id` everywhere. Returns false if
    /// `old_id` is unknown.
    pub fn replace_id(&mut self, old_id: &str, new_id: &str) -> bool {
        let Some(pos) = self.ids.iter().position(|i| i == old_id) else {
            warn!("Matcher.replace_id: id not found. Found: {}", old_id);
            return false;
        };
        self.ids[pos] = new_id.to_string();

        if let Some(assigned) = self.assigned.as_mut() {
            for id in assigned.iter_mut().filter(|i| i.as_str() == old_id) {
                *id = new_id.to_string();
            }
        }

        for round in &mut self.resolved {
            for pair in round.iter_mut() {
                for id in pair.iter_mut().filter(|i| i.as_str() == old_id) {
                    *id = new_id.to_string();
                }
            }
        }

        for obj in &mut self.resolved_obj {
            if let Some(partner) = obj.remove(old_id) {
                obj.insert(new_id.to_string(), partner);
            }
            for partner in obj.values_mut().filter(|p| p.as_str() == old_id) {
                *partner = new_id.to_string();
            }
        }
        true
    }

    /// Forgets the schedule and its resolution.
    pub fn clear(&mut self) {
        self.schedule = None;
        self.participants = 0;
        self.assigned = None;
        self.resolved.clear();
        self.resolved_obj.clear();
        self.cursor = (0, 0);
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matcher")
            .field("participants", &self.participants)
            .field("options", &self.options)
            .field("ids", &self.ids)
            .field("rounds", &self.resolved.len())
            .finish()
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn round(pairs: &[Pair]) -> Vec<Pair> {
        pairs.to_vec()
    }

    fn rr(n: usize, options: MatchOptions) -> Matcher {
        let mut m = Matcher::new();
        m.generate_matches(Algorithm::RoundRobin, n, options).unwrap();
        m
    }

    //--- Round Robin ------------------------------------------------------

    #[test]
    fn round_robin_four() {
        let m = rr(4, MatchOptions::default());
        let expected = vec![
            round(&[[0, 3], [1, 2]]),
            round(&[[0, 2], [3, 1]]),
            round(&[[0, 1], [2, 3]]),
        ];
        assert_eq!(m.schedule().unwrap(), expected.as_slice());
    }

    #[test]
    fn round_robin_three_has_byes() {
        let m = rr(3, MatchOptions::default());
        let expected = vec![
            round(&[[0, -1], [1, 2]]),
            round(&[[0, 2], [-1, 1]]),
            round(&[[0, 1], [2, -1]]),
        ];
        assert_eq!(m.schedule().unwrap(), expected.as_slice());
    }

    #[test]
    fn custom_bye_and_skip_bye() {
        let m = rr(3, MatchOptions { bye: -9, skip_bye: true, ..Default::default() });
        let s = m.schedule().unwrap();
        assert_eq!(s[0], round(&[[1, 2]]));
        assert!(s.iter().flatten().all(|p| !p.contains(&-9)));
    }

    #[test]
    fn rounds_are_validated() {
        let mut m = Matcher::new();
        let too_many = MatchOptions { rounds: Some(4), ..Default::default() };
        let err = m.generate_matches(Algorithm::RoundRobin, 4, too_many).unwrap_err();
        assert!(err.to_string().starts_with("Matcher.generate_matches:"));

        let zero = MatchOptions { rounds: Some(0), ..Default::default() };
        assert!(m.generate_matches(Algorithm::RoundRobin, 4, zero).is_err());

        let two = MatchOptions { rounds: Some(2), ..Default::default() };
        m.generate_matches(Algorithm::RoundRobin, 4, two).unwrap();
        assert_eq!(m.schedule().unwrap().len(), 2);

        assert!(m.generate_matches(Algorithm::RoundRobin, 0, MatchOptions::default()).is_err());
        let colliding = MatchOptions { bye: 2, ..Default::default() };
        assert!(m.generate_matches(Algorithm::RoundRobin, 4, colliding).is_err());
    }

    //--- Cycles -----------------------------------------------------------

    #[test]
    fn mirror_last_round_reproduces_first() {
        let m = rr(4, MatchOptions { cycle: Some(CyclePolicy::Mirror), ..Default::default() });
        let s = m.schedule().unwrap();
        assert_eq!(s.len(), 6);
        assert_eq!(s[5], s[0]);
        assert_eq!(s[3], s[2]);
    }

    #[test]
    fn cyclic_requests_may_exceed_the_natural_length() {
        let base = rr(4, MatchOptions::default());
        let base = base.schedule().unwrap();

        let m = rr(4, MatchOptions { rounds: Some(6), cycle: Some(CyclePolicy::Mirror), ..Default::default() });
        let s = m.schedule().unwrap();
        assert_eq!(s.len(), 6);
        assert_eq!(s[3], base[2]);
        assert_eq!(s[5], base[0]);

        let m = rr(4, MatchOptions { rounds: Some(4), cycle: Some(CyclePolicy::Repeat), ..Default::default() });
        let s = m.schedule().unwrap();
        assert_eq!(s.len(), 4);
        assert_eq!(s[3], base[0]);

        let mut m = Matcher::new();
        let too_many = MatchOptions { rounds: Some(7), cycle: Some(CyclePolicy::Mirror), ..Default::default() };
        assert!(m.generate_matches(Algorithm::RoundRobin, 4, too_many).is_err());
    }

    #[test]
    fn cycle_variants() {
        let base = rr(4, MatchOptions::default());
        let base = base.schedule().unwrap();

        let m = rr(4, MatchOptions { cycle: Some(CyclePolicy::Repeat), ..Default::default() });
        assert_eq!(m.schedule().unwrap()[4], base[1]);

        let m = rr(4, MatchOptions { cycle: Some(CyclePolicy::RepeatInvert), ..Default::default() });
        assert_eq!(m.schedule().unwrap()[3], round(&[[3, 0], [2, 1]]));

        let m = rr(4, MatchOptions { cycle: Some(CyclePolicy::MirrorInvert), ..Default::default() });
        assert_eq!(m.schedule().unwrap()[5], round(&[[3, 0], [2, 1]]));
    }

    //--- Resolution -------------------------------------------------------

    #[test]
    fn custom_assigner_on_three() {
        let mut m = rr(3, MatchOptions { skip_bye: true, ..Default::default() });
        m.set_ids(ids(&["a", "b", "c"])).unwrap();
        m.set_assigner(Rc::new(|_: &[String]| vec!["c".to_string(), "a".to_string(), "b".to_string()]));
        m.do_match(false).unwrap();

        assert_eq!(m.get_match(0, 0), Some(&["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn bye_resolves_to_missing_id() {
        let mut m = rr(3, MatchOptions::default());
        m.set_ids(ids(&["a", "b", "c"])).unwrap();
        m.do_match(false).unwrap();

        assert_eq!(m.get_match(0, 0), Some(&["a".to_string(), "bot".to_string()]));
        assert_eq!(m.get_match_for("a", Some(0)), Some("bot"));
        assert!(!m.get_match_object(0).unwrap().contains_key("bot"));
    }

    #[test]
    fn resolved_matches_schedule_positions() {
        let mut m = rr(4, MatchOptions::default());
        let list = ids(&["w", "x", "y", "z"]);
        m.set_ids(list.clone()).unwrap();
        m.do_match(false).unwrap();

        let schedule = m.schedule().unwrap().to_vec();
        for (x, round) in schedule.iter().enumerate() {
            for (y, p) in round.iter().enumerate() {
                let expected = [list[p[0] as usize].clone(), list[p[1] as usize].clone()];
                assert_eq!(m.get_match(x, y), Some(&expected));
            }
        }
    }

    #[test]
    fn match_requires_schedule_and_ids() {
        let mut m = Matcher::new();
        assert_eq!(m.do_match(false), Err(MatchError::NoSchedule { method: "Matcher.match" }));

        m.generate_matches(Algorithm::RoundRobin, 4, MatchOptions::default()).unwrap();
        assert!(m.set_ids(ids(&["a"])).is_err());
        assert!(matches!(m.do_match(false), Err(MatchError::IdCountMismatch { .. })));
    }

    //--- Lookup -----------------------------------------------------------

    #[test]
    fn cursor_walks_every_pair_then_stops() {
        let mut m = rr(4, MatchOptions::default());
        m.set_ids(ids(&["a", "b", "c", "d"])).unwrap();
        m.do_match(false).unwrap();

        let mut n = 0;
        while m.next_match().is_some() {
            n += 1;
        }
        assert_eq!(n, 6);
        assert!(m.next_match().is_none());
    }

    #[test]
    fn out_of_range_only_wraps_with_cycle() {
        let mut m = rr(4, MatchOptions::default());
        m.set_ids(ids(&["a", "b", "c", "d"])).unwrap();
        m.do_match(false).unwrap();
        assert!(m.get_round(3).is_none());
        assert_eq!(m.normalize_round(4), Some(0));

        let mut m = rr(4, MatchOptions { cycle: Some(CyclePolicy::Repeat), ..Default::default() });
        m.set_ids(ids(&["a", "b", "c", "d"])).unwrap();
        m.do_match(false).unwrap();
        assert_eq!(m.get_round(7), m.get_round(1));
    }

    //--- Reconnection -----------------------------------------------------

    #[test]
    fn replace_id_everywhere() {
        let mut m = rr(4, MatchOptions::default());
        m.set_ids(ids(&["a", "b", "c", "d"])).unwrap();
        m.do_match(false).unwrap();

        let before = m.get_match_for("a", Some(1)).map(str::to_string);
        let partner = before.clone().unwrap();
        assert!(m.replace_id("a", "a2"));

        assert_eq!(m.get_match_for("a", Some(1)), None);
        assert_eq!(m.get_match_for("a2", Some(1)).map(str::to_string), before);
        assert_eq!(m.get_match_for(&partner, Some(1)), Some("a2"));
        assert!(m.ids().contains(&"a2".to_string()));
        assert!(!m.replace_id("zzz", "y"));
    }

    //--- Properties -------------------------------------------------------

    proptest! {
        #[test]
        fn round_robin_each_position_once_per_round(n in 1usize..24) {
            let m = rr(n, MatchOptions::default());
            for round in m.schedule().unwrap() {
                let mut seen = HashSet::new();
                for p in round {
                    prop_assert_ne!(p[0], p[1]);
                    prop_assert!(seen.insert(p[0]));
                    prop_assert!(seen.insert(p[1]));
                }
                for pos in 0..n as Position {
                    prop_assert!(seen.contains(&pos));
                }
                let byes = round.iter().filter(|p| p.contains(&DEFAULT_BYE)).count();
                prop_assert_eq!(byes, n % 2);
            }
        }

        #[test]
        fn random_never_pairs_self(n in 1usize..24, rounds in 1i64..5) {
            let mut m = Matcher::new();
            m.generate_matches(Algorithm::Random, n, MatchOptions { rounds: Some(rounds), ..Default::default() }).unwrap();
            for round in m.schedule().unwrap() {
                let mut seen = HashSet::new();
                for p in round {
                    prop_assert_ne!(p[0], p[1]);
                    prop_assert!(seen.insert(p[0]) && seen.insert(p[1]));
                }
                prop_assert_eq!(seen.len(), n + n % 2);
            }
        }

        #[test]
        fn replace_id_preserves_lookups(n in 2usize..12, victim in 0usize..12) {
            let victim = victim % n;
            let list: Vec<String> = (0..n).map(|i| format!("p{}", i)).collect();
            let mut m = rr(n, MatchOptions::default());
            m.set_ids(list.clone()).unwrap();
            m.do_match(false).unwrap();

            let old = list[victim].clone();
            let rounds = m.resolved().len();
            let before: Vec<Option<String>> =
                (0..rounds).map(|r| m.get_match_for(&old, Some(r)).map(str::to_string)).collect();

            prop_assert!(m.replace_id(&old, "fresh"));
            for (r, partner) in before.iter().enumerate() {
                prop_assert_eq!(m.get_match_for(&old, Some(r)), None);
                prop_assert_eq!(m.get_match_for("fresh", Some(r)).map(str::to_string), partner.clone());
            }
        }
    }
}
