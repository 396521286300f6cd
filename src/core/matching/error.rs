//=========================================================================
// Matching Errors
//=========================================================================

//=== External Dependencies ===============================================

use thiserror::Error;

//=== MatchError ==========================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    /// Malformed configuration (participant count, rounds, ids).
    #[error("{method}: {reason}. Found: {found}")]
    InvalidArgument {
        method: &'static str,
        reason: &'static str,
        found: String,
    },

    /// An operation needs a schedule and none was generated.
    #[error("{method}: no matches generated. Found: none")]
    NoSchedule { method: &'static str },

    /// `set_ids` received a list not matching the schedule size.
    #[error("{method}: ids do not match the number of participants. Found: {found} (expected {expected})")]
    IdCountMismatch {
        method: &'static str,
        expected: usize,
        found: usize,
    },

    #[error(transparent)]
    Role(#[from] RoleError),
}

//=== RoleError ===========================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoleError {
    #[error("{method}: {reason}. Found: {found}")]
    InvalidRoles {
        method: &'static str,
        reason: &'static str,
        found: String,
    },

    /// With fixed roles, two players holding the same role met.
    #[error("RoleMapper.rolify_all: players with the same role cannot be matched. Found: {a} and {b} as {role} in round {round}")]
    SameRoleMatch {
        round: usize,
        role: String,
        a: String,
        b: String,
    },
}
