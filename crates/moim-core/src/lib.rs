// File: `crates/moim-core/src/lib.rs`
//! # moim-core
//!
//! Reconciliation engines for shared RSVP and poll documents.
//!
//! Every operation takes the current document by reference and returns the
//! next one; nothing is mutated in place. The store around these functions
//! replaces whole fields with last-write-wins semantics and no
//! compare-and-swap, so two clients writing from the same snapshot can lose
//! one update. The engines cannot prevent that; they keep every aggregate
//! derivable from per-voter state so a lost update only drops one click and
//! never breaks an invariant.
//!
//! ```rust
//! use chrono::NaiveDate;
//! use moim_core::{ConnectionId, DisplayName, Event, Response};
//!
//! let event = Event::new("e1", "Dinner", NaiveDate::from_ymd_opt(2026, 11, 7).unwrap());
//! let phone = ConnectionId::new("phone");
//! let pc = ConnectionId::new("pc");
//! let kim = DisplayName::new("Kim");
//!
//! let event = event.cast_response(&phone, &kim, Response::Attend).unwrap();
//! let event = event.cast_response(&pc, &kim, Response::NotAttend).unwrap();
//!
//! assert_eq!(event.roster().total(), 1);
//! assert_eq!(event.response_of(&kim), Some(Response::NotAttend));
//! ```

pub mod error;
pub mod event;
pub mod identity;
pub mod poll;
pub mod reducer;

pub use error::{InvariantViolation, ReconcileError, Result};
pub use event::{Event, Roster, RsvpAction, Response};
pub use identity::{ConnectionId, DisplayName, IdentityContainer, NameIndex};
pub use poll::{OptionId, OptionResult, Poll, PollAction, PollOption, PollResults, VoterState};
pub use reducer::Reducer;
