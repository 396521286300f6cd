//=========================================================================
// Event Errors
//=========================================================================

//=== External Dependencies ===============================================

use thiserror::Error;

//=== EventError ==========================================================

/// Fatal errors raised by event scopes and the dispatcher.
///
/// A removal that matches nothing is not an error: it is reported through
/// an empty result and a warning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// An argument has the wrong shape (empty event name, empty label).
    #[error("{method}: {reason}. Found: {found:?}")]
    InvalidArgument {
        method: &'static str,
        reason: &'static str,
        found: String,
    },

    /// The label is already registered in this scope.
    #[error("{method}: label is already in use. Found: {label}")]
    DuplicateLabel { method: &'static str, label: String },
}
