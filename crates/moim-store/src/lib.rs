//! # moim-store
//!
//! In-memory document store with the semantics of the hosted real-time store
//! Moim clients share: snapshot reads, whole-document and named-field writes,
//! last writer wins, no compare-and-swap.
//!
//! ## Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use moim_core::{ConnectionId, DisplayName, Response};
//! use moim_store::{Document, DocumentStore};
//!
//! let mut store = DocumentStore::new();
//! let id = store.create_event("Dinner", NaiveDate::from_ymd_opt(2026, 11, 7).unwrap());
//!
//! let snapshot = store.document(&id).unwrap().clone();
//! let next = store
//!     .event(&id)
//!     .unwrap()
//!     .cast_response(&ConnectionId::new("phone"), &DisplayName::new("Kim"), Response::Attend)
//!     .unwrap();
//! let patch = snapshot.changed_fields(&Document::Event(next)).unwrap();
//! store.write_fields(&id, &patch).unwrap();
//!
//! assert_eq!(store.event(&id).unwrap().headcount(), 1);
//! ```

pub mod document;
pub mod error;

pub use document::{Document, DocumentId, DocumentKind, DocumentStore, StoreChange, StoredDocument};
pub use error::{Result, StoreError};
