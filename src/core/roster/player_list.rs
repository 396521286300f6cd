//=========================================================================
// Player List
//=========================================================================
//
// In-memory roster: insertion-ordered players with an id index.
//
//   players: Vec<Player>            (connection order)
//   index:   HashMap<id, position>  (rebuilt on removal)
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::HashMap;

use log::debug;

//=== Internal Dependencies ===============================================

use super::{MatchType, Player, PlayerUpdate, Roster, RosterError};
use crate::core::stage::{GameStage, StageLevel};

//=== PlayerList ==========================================================

#[derive(Debug, Clone, Default)]
pub struct PlayerList {
    players: Vec<Player>,
    index: HashMap<String, usize>,
    own_id: Option<String>,
}

impl PlayerList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Roster that refuses the local participant's own id.
    pub fn with_own_id(own_id: impl Into<String>) -> Self {
        Self {
            own_id: Some(own_id.into()),
            ..Self::default()
        }
    }

    pub fn set_own_id(&mut self, own_id: impl Into<String>) {
        self.own_id = Some(own_id.into());
    }

    //--- Mutation ---------------------------------------------------------

    pub fn add(&mut self, player: Player) -> Result<(), RosterError> {
        if self.own_id.as_deref() == Some(player.id.as_str()) {
            return Err(RosterError::OwnId { method: "add", id: player.id });
        }
        if self.index.contains_key(&player.id) {
            return Err(RosterError::DuplicateId { method: "add", id: player.id });
        }

        debug!("PlayerList: adding player {}", player.id);
        self.index.insert(player.id.clone(), self.players.len());
        self.players.push(player);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<Player> {
        let pos = self.index.remove(id)?;
        let player = self.players.remove(pos);
        self.reindex();
        debug!("PlayerList: removed player {}", id);
        Some(player)
    }

    pub fn get(&self, id: &str) -> Option<&Player> {
        self.index.get(id).map(|&i| &self.players[i])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Player> {
        match self.index.get(id) {
            Some(&i) => self.players.get_mut(i),
            None => None,
        }
    }

    pub fn update(&mut self, id: &str, update: &PlayerUpdate) -> Result<(), RosterError> {
        let player = self.get_mut(id).ok_or_else(|| RosterError::UnknownId {
            method: "update",
            id: id.to_string(),
        })?;
        update.apply(player);
        Ok(())
    }

    /// Renames a player (reconnection under a new id).
    pub fn replace_id(&mut self, old_id: &str, new_id: &str) -> Result<(), RosterError> {
        if self.index.contains_key(new_id) {
            return Err(RosterError::DuplicateId {
                method: "replace_id",
                id: new_id.to_string(),
            });
        }
        let pos = self.index.remove(old_id).ok_or_else(|| RosterError::UnknownId {
            method: "replace_id",
            id: old_id.to_string(),
        })?;

        self.players[pos].id = new_id.to_string();
        for p in &mut self.players {
            if p.partner.as_deref() == Some(old_id) {
                p.partner = Some(new_id.to_string());
            }
        }
        self.index.insert(new_id.to_string(), pos);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn clear(&mut self) {
        self.players.clear();
        self.index.clear();
    }

    fn reindex(&mut self) {
        self.index = self
            .players
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.clone(), i))
            .collect();
    }
}

//=== Roster Implementation ===============================================

impl Roster for PlayerList {
    fn size(&self) -> usize {
        self.players.len()
    }

    fn exist(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    fn first(&self) -> Option<&Player> {
        self.players.first()
    }

    fn ids(&self) -> Vec<String> {
        self.players.iter().map(|p| p.id.clone()).collect()
    }

    fn are_players_sync(
        &self,
        stage: GameStage,
        level: StageLevel,
        match_type: MatchType,
        check_outliers: bool,
    ) -> bool {
        for p in self.players.iter().filter(|p| !p.disconnected) {
            // Players behind the compared position always break synchrony.
            let behind = match match_type {
                MatchType::Stage => p.stage.stage < stage.stage,
                MatchType::Exact | MatchType::StageUpTo => p.stage < stage,
            };
            if behind {
                return false;
            }

            let in_position = match match_type {
                MatchType::Exact => p.stage == stage,
                MatchType::Stage => p.stage.stage == stage.stage,
                MatchType::StageUpTo => {
                    if p.stage.stage != stage.stage {
                        false
                    } else if p.stage > stage {
                        continue;
                    } else {
                        true
                    }
                }
            };

            if !in_position {
                if check_outliers {
                    return false;
                }
                continue;
            }

            if p.stage_level < level {
                return false;
            }
        }
        true
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn gs(s: u32, st: u32) -> GameStage {
        GameStage::new(s, st, 1)
    }

    //--- Membership -------------------------------------------------------

    #[test]
    fn add_rejects_duplicates_and_own_id() {
        let mut pl = PlayerList::with_own_id("me");
        pl.add(Player::new("a")).unwrap();

        assert_eq!(
            pl.add(Player::new("a")),
            Err(RosterError::DuplicateId { method: "add", id: "a".into() })
        );
        assert!(matches!(pl.add(Player::new("me")), Err(RosterError::OwnId { .. })));
        assert_eq!(pl.size(), 1);
    }

    #[test]
    fn remove_keeps_index_consistent() {
        let mut pl = PlayerList::new();
        for id in ["a", "b", "c"] {
            pl.add(Player::new(id)).unwrap();
        }
        assert_eq!(pl.remove("a").unwrap().id, "a");
        assert_eq!(pl.get("c").unwrap().id, "c");
        assert_eq!(pl.first().unwrap().id, "b");
        assert!(pl.remove("a").is_none());
    }

    #[test]
    fn replace_id_updates_partners() {
        let mut pl = PlayerList::new();
        pl.add(Player::new("a")).unwrap();
        let mut b = Player::new("b");
        b.partner = Some("a".into());
        pl.add(b).unwrap();

        pl.replace_id("a", "z").unwrap();
        assert!(!pl.exist("a"));
        assert!(pl.exist("z"));
        assert_eq!(pl.get("b").unwrap().partner.as_deref(), Some("z"));
        assert!(pl.replace_id("nope", "y").is_err());
        assert!(pl.replace_id("z", "b").is_err());
    }

    //--- Synchrony --------------------------------------------------------

    #[test]
    fn exact_sync_requires_level_at_position() {
        let mut pl = PlayerList::new();
        pl.add(Player::new("a").at(gs(1, 1), StageLevel::Done)).unwrap();
        pl.add(Player::new("b").at(gs(1, 1), StageLevel::Playing)).unwrap();

        assert!(!pl.is_step_done(gs(1, 1), MatchType::Exact, true));
        assert!(pl.is_step_loaded(gs(1, 1)));

        pl.update("b", &PlayerUpdate { stage_level: Some(StageLevel::Done), ..Default::default() })
            .unwrap();
        assert!(pl.is_step_done(gs(1, 1), MatchType::Exact, true));
    }

    #[test]
    fn outliers_follow_flag() {
        let mut pl = PlayerList::new();
        pl.add(Player::new("a").at(gs(1, 1), StageLevel::Done)).unwrap();
        pl.add(Player::new("b").at(gs(2, 1), StageLevel::Playing)).unwrap();

        assert!(!pl.is_step_done(gs(1, 1), MatchType::Exact, true));
        assert!(pl.is_step_done(gs(1, 1), MatchType::Exact, false));
    }

    #[test]
    fn players_behind_block_regardless_of_outlier_flag() {
        let mut pl = PlayerList::new();
        pl.add(Player::new("a").at(gs(1, 2), StageLevel::Done)).unwrap();
        pl.add(Player::new("b").at(gs(1, 1), StageLevel::Done)).unwrap();

        assert!(!pl.is_step_done(gs(1, 2), MatchType::Exact, false));
        assert!(!pl.is_step_done(gs(1, 2), MatchType::Exact, true));

        // Not started yet.
        pl.update("b", &PlayerUpdate { stage: Some(GameStage::NOT_STARTED), ..Default::default() })
            .unwrap();
        assert!(!pl.is_step_done(gs(1, 2), MatchType::Exact, false));

        pl.update("b", &PlayerUpdate { stage: Some(gs(1, 2)), ..Default::default() }).unwrap();
        assert!(pl.is_step_done(gs(1, 2), MatchType::Exact, false));
    }

    #[test]
    fn stage_up_to_waits_for_players_behind() {
        let mut pl = PlayerList::new();
        pl.add(Player::new("a").at(gs(1, 3), StageLevel::Done)).unwrap();
        pl.add(Player::new("b").at(gs(1, 2), StageLevel::Done)).unwrap();

        assert!(!pl.is_step_done(gs(1, 3), MatchType::StageUpTo, true));

        pl.update("b", &PlayerUpdate { stage: Some(gs(1, 3)), ..Default::default() }).unwrap();
        assert!(pl.is_step_done(gs(1, 3), MatchType::StageUpTo, true));
    }

    #[test]
    fn disconnected_players_are_ignored() {
        let mut pl = PlayerList::new();
        let mut p = Player::new("a").at(gs(1, 1), StageLevel::Playing);
        p.disconnected = true;
        pl.add(p).unwrap();
        assert!(pl.is_step_done(gs(1, 1), MatchType::Exact, true));
    }
}
