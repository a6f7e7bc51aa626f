//! Moim SDK - client layer over the shared event and poll store
//!
//! A [`Client`] is one device. It carries the connection identity and the
//! display name the engines key on, applies the poll expiry policy, and runs
//! each mutation as a read-modify-write cycle against a [`SharedStore`].
//!
//! # Quick Start
//!
//! ```rust
//! use moim_core::OptionId;
//! use moim_sdk::{Client, ClientConfigBuilder};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> moim_sdk::Result<()> {
//! let client = Client::new_with_memory_store(
//!     ClientConfigBuilder::new().display_name("Kim").build(),
//! );
//!
//! let poll_id = client.create_poll("Lunch?", ["Noodles", "Rice"]).await?;
//! let poll = client.poll(&poll_id).await?;
//! let noodles = poll.options[0].id.clone();
//!
//! let poll = client.vote(&poll_id, &noodles).await?;
//! assert_eq!(poll.total_votes, 1);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`client`] - configuration and the read-modify-write client
//! - [`store`] - the shared store trait and its in-memory implementation
//! - [`error`] - error types

pub mod client;
pub mod error;
pub mod store;

// Re-exports for convenience
pub use client::{Client, ClientConfig, ClientConfigBuilder};
pub use error::{Result, SdkError};
pub use store::{MemoryStore, SharedStore, StoreEvent};
