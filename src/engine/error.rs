//=========================================================================
// Engine Errors
//=========================================================================
//
// Fatal errors of the stage engine. Structural outcomes (target not
// found, game over) are not errors: see `TransitionOutcome`.
//
//=========================================================================

//=== External Dependencies ===============================================

use thiserror::Error;

//=== Internal Dependencies ===============================================

use crate::core::events::EventError;
use crate::core::matching::MatchError;
use crate::core::roster::RosterError;
use crate::core::stage::{HookError, SizeError, StageError};

//=== EngineError =========================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The engine is not in a state permitting the call.
    #[error("{method}: {reason}. Found: {found}")]
    NotAllowed {
        method: &'static str,
        reason: &'static str,
        found: String,
    },

    /// A role or partner could not be resolved.
    #[error("{method}: {reason}. Found: {found}")]
    Assignment {
        method: &'static str,
        reason: &'static str,
        found: String,
    },

    /// The step names a widget no factory was registered for.
    #[error("StageEngine.exec_step: unknown widget. Found: {0}")]
    UnknownWidget(String),

    /// An inbound message carried data of the wrong shape.
    #[error("StageEngine.receive: malformed {target} data. Found: {found}")]
    InvalidMessage { target: String, found: String },

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    Size(#[from] SizeError),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    Roster(#[from] RosterError),
}

impl EngineError {
    pub(crate) fn not_allowed(method: &'static str, reason: &'static str, found: impl ToString) -> Self {
        EngineError::NotAllowed {
            method,
            reason,
            found: found.to_string(),
        }
    }

    pub(crate) fn assignment(method: &'static str, reason: &'static str, found: impl ToString) -> Self {
        EngineError::Assignment {
            method,
            reason,
            found: found.to_string(),
        }
    }
}
