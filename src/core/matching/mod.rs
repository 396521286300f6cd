//=========================================================================
// Matching
//=========================================================================
//
// Pairing schedules and role assignment.
//
// Architecture:
//   Matcher         positions → rounds of pairs → resolved ids
//   RoleMapper      resolved pairs → roles per round
//   MatcherManager  step settings → per-participant { role, partner }
//
//=========================================================================

//=== Module Declarations =================================================

mod error;
mod manager;
mod matcher;
mod roles;

//=== Public API ==========================================================

pub use error::{MatchError, RoleError};
pub use manager::{Assignment, MatcherManager, MatcherSettings};
pub use matcher::{
    pass_through_assigner, random_assigner, Algorithm, AssignerFn, CyclePolicy, IdPair, MatchOptions, Matcher,
    Pair, Position, DEFAULT_BYE, DEFAULT_MISSING_ID,
};
pub use roles::{RoleMapper, RoleOptions};
