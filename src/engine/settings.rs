//=========================================================================
// Engine Settings
//=========================================================================
//
// Serializable engine configuration, loadable from JSON.
//
//=========================================================================

//=== External Dependencies ===============================================

use serde::{Deserialize, Deserializer, Serialize};

//=== Internal Dependencies ===============================================

use crate::core::matching::DEFAULT_MISSING_ID;
use crate::core::stage::PublishLevel;

//=== Defaults ============================================================

fn default_player_id() -> String {
    "me".to_string()
}

fn default_max_deferred() -> usize {
    100
}

fn default_missing_id() -> String {
    DEFAULT_MISSING_ID.to_string()
}

fn positive_limit<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let limit = usize::deserialize(deserializer)?;
    if limit == 0 {
        return Err(serde::de::Error::custom("max_deferred_per_tick must be positive"));
    }
    Ok(limit)
}

//=== EngineSettings ======================================================

/// # Default Values
///
/// - **player_id**: `"me"`
/// - **publish_level**: `REGULAR`
/// - **record_history**: false
/// - **max_deferred_per_tick**: 100
/// - **missing_id**: `"bot"`
/// - **admin**, **sync_stepping**: false
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_player_id")]
    pub player_id: String,
    #[serde(default)]
    pub publish_level: PublishLevel,
    #[serde(default)]
    pub record_history: bool,
    /// Never zero.
    #[serde(default = "default_max_deferred", deserialize_with = "positive_limit")]
    pub max_deferred_per_tick: usize,
    /// Id standing in for the bye when a step's matcher does not set one.
    #[serde(default = "default_missing_id")]
    pub missing_id: String,
    /// The local participant coordinates the others.
    #[serde(default)]
    pub admin: bool,
    /// An admin sends `goto_step` commands to every participant.
    #[serde(default)]
    pub sync_stepping: bool,
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub treatment: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            player_id: default_player_id(),
            publish_level: PublishLevel::default(),
            record_history: false,
            max_deferred_per_tick: default_max_deferred(),
            missing_id: default_missing_id(),
            admin: false,
            sync_stepping: false,
            session: None,
            treatment: None,
        }
    }
}

impl EngineSettings {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let s = EngineSettings::from_json(r#"{ "player_id": "p7", "publish_level": "ALL" }"#).unwrap();
        assert_eq!(s.player_id, "p7");
        assert_eq!(s.publish_level, PublishLevel::All);
        assert_eq!(s.max_deferred_per_tick, 100);
        assert_eq!(s.missing_id, "bot");
        assert!(!s.admin);
    }

    #[test]
    fn rejects_zero_drain_limit() {
        let err = EngineSettings::from_json(r#"{ "max_deferred_per_tick": 0 }"#).unwrap_err();
        assert!(err.to_string().contains("max_deferred_per_tick must be positive"));
        assert_eq!(EngineSettings::from_json(r#"{ "max_deferred_per_tick": 5 }"#).unwrap().max_deferred_per_tick, 5);
    }

    #[test]
    fn rejects_unknown_publish_level() {
        assert!(EngineSettings::from_json(r#"{ "publish_level": "SOME" }"#).is_err());
    }
}
