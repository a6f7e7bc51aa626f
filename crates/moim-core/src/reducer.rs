//! Reducer trait - the shape every shared document follows.
//!
//! A document is a value. An action never mutates it in place; it produces
//! the next value or is refused:
//!  - Determinism: the same (state, action) always yields the same result
//!  - Atomicity:   a refused action leaves the input untouched
//!  - Validity:    every produced state satisfies `check_invariants`
//!
//!  The surrounding system owns the read-modify-write cycle around these.

use crate::error::{InvariantViolation, Result};

/// Pure `(State, Action) -> State` transition for a shared document.
pub trait Reducer: Clone + PartialEq {
    /// The intended change a user asks for.
    type Action;

    /// Compute the next document, or refuse the action.
    fn reduce(&self, action: &Self::Action) -> Result<Self>;

    /// Verify the document invariants.
    fn check_invariants(&self) -> std::result::Result<(), InvariantViolation>;

    /// Check if every invariant holds
    fn is_consistent(&self) -> bool {
        self.check_invariants().is_ok()
    }

    /// Apply actions in order, stopping at the first refusal.
    fn replay<'a, I>(&self, actions: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Self::Action>,
        Self::Action: 'a,
    {
        let mut state = self.clone();
        for action in actions {
            state = state.reduce(action)?;
        }
        Ok(state)
    }

    /// Apply an action, keeping the current state when it is refused.
    fn reduce_or_keep(&self, action: &Self::Action) -> Self {
        self.reduce(action).unwrap_or_else(|_| self.clone())
    }
}
