//! Error types for the reconciliation engines.
//!
//! Every error leaves the input document untouched: engines either return a
//! complete next document or one of these.

use thiserror::Error;

/// Reasons an engine refuses an action.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("Invalid target: option {0} is not part of this poll")]
    InvalidTarget(String),

    #[error("Missing identity context: {0}")]
    MissingIdentityContext(&'static str),

    #[error("Mode mismatch: {operation} is not available on a {mode} poll")]
    ModeMismatch {
        operation: &'static str,
        mode: &'static str,
    },

    #[error("Options are locked on poll {0}")]
    OptionsLocked(String),

    #[error("Option {0} already exists")]
    DuplicateOption(String),

    #[error("Option text must not be empty")]
    EmptyOptionText,
}

/// A broken document invariant, reported by `check_invariants`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("Identity {0} appears in more than one response set")]
    OverlappingSets(String),

    #[error("Identity {0} has no display name")]
    MissingName(String),

    #[error("Display name entry for {0} has no membership")]
    OrphanName(String),

    #[error("Display name {0} is held by more than one identity")]
    DuplicateName(String),

    #[error("Total votes {total} disagree with option counts {counted} or selections {selected}")]
    TallyMismatch {
        total: u32,
        counted: u32,
        selected: u32,
    },

    #[error("Option {option} count {stored} disagrees with selections {derived}")]
    OptionCountMismatch {
        option: String,
        stored: u32,
        derived: u32,
    },

    #[error("Voter set disagrees with non-empty selections")]
    VoterSetMismatch,

    #[error("Identity {0} holds several options on a single-choice poll")]
    MultipleSelections(String),

    #[error("Selection references unknown option {0}")]
    UnknownOption(String),
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
