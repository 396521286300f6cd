//=========================================================================
// Stage Errors
//=========================================================================
//
// Errors raised while parsing positions, building plots and configuring
// player-count thresholds.
//
//=========================================================================

//=== External Dependencies ===============================================

use thiserror::Error;

//=== StageError ==========================================================

/// Errors related to game positions and sequence definitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    /// A position string could not be parsed.
    #[error("{method}: {reason}. Found: {found}")]
    InvalidPosition {
        method: &'static str,
        reason: &'static str,
        found: String,
    },

    /// The sequence definition is malformed.
    #[error("{method}: {reason}. Found: {found}")]
    InvalidPlot {
        method: &'static str,
        reason: &'static str,
        found: String,
    },
}

//=== SizeError ===========================================================

/// Errors raised by [`super::SizeGate`] configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SizeError {
    /// A threshold value is not usable.
    #[error("SizeGate.{method}: {reason}. Found: {found}")]
    InvalidThreshold {
        method: &'static str,
        reason: &'static str,
        found: String,
    },

    /// `max_players` does not exceed `min_players`.
    #[error("SizeGate.init: max_players must be greater than min_players. Found: min {min}, max {max}")]
    MaxNotAboveMin { min: usize, max: usize },

    /// `exact_players` combined with `min_players` or `max_players`.
    #[error("SizeGate.init: exact_players cannot be combined with min_players or max_players. Found: exact {exact}")]
    ExactWithBounds { exact: usize },
}

//=== HookError ===========================================================

/// Failure raised by a user hook (init, exit, step callback, done).
///
/// The engine never catches it: it propagates out of the transition that
/// ran the hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HookError(pub String);

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
