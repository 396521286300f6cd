//=========================================================================
// Game Database
//=========================================================================
//
// Receives participant records (done() data, set.DATA messages).
//
//=========================================================================

//=== External Dependencies ===============================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

//=== Internal Dependencies ===============================================

use crate::core::stage::GameStage;

//=== DbRecord ============================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbRecord {
    pub player: String,
    pub stage: GameStage,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treatment: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl DbRecord {
    pub fn new(player: impl Into<String>, stage: GameStage, data: Map<String, Value>) -> Self {
        Self {
            player: player.into(),
            stage,
            timestamp: Utc::now(),
            session: None,
            treatment: None,
            data,
        }
    }
}

//=== GameDb ==============================================================

pub trait GameDb {
    fn add(&mut self, record: DbRecord);

    fn records(&self) -> &[DbRecord];

    fn clear(&mut self);

    fn len(&self) -> usize {
        self.records().len()
    }

    fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}

//=== MemoryDb ============================================================

#[derive(Debug, Clone, Default)]
pub struct MemoryDb {
    records: Vec<DbRecord>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_player<'a>(&'a self, player: &'a str) -> impl Iterator<Item = &'a DbRecord> + 'a {
        self.records.iter().filter(move |r| r.player == player)
    }

    pub fn at_stage(&self, stage: GameStage) -> impl Iterator<Item = &DbRecord> + '_ {
        self.records.iter().filter(move |r| r.stage == stage)
    }
}

impl GameDb for MemoryDb {
    fn add(&mut self, record: DbRecord) {
        self.records.push(record);
    }

    fn records(&self) -> &[DbRecord] {
        &self.records
    }

    fn clear(&mut self) {
        self.records.clear();
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
