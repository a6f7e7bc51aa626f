//! High-level client for shared events and polls.

use crate::error::{Result, SdkError};
use crate::store::{MemoryStore, SharedStore, StoreEvent};
use chrono::{Local, NaiveDate};
use moim_core::identity::ensure_context;
use moim_core::{ConnectionId, DisplayName, Event, OptionId, Poll, Response};
use moim_store::{Document, DocumentId, DocumentKind, StoreError};
use std::sync::Arc;
use tokio::sync::broadcast;
use ulid::Ulid;

/// Configuration for the Moim client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Name shown to other participants; also the key that merges devices.
    pub display_name: String,
    /// Identity of this device's connection.
    pub connection_id: ConnectionId,
    /// Date the expiry policy compares against. Defaults to the local date.
    pub today: Option<NaiveDate>,
    /// Capacity of the in-memory store's event channel.
    pub notify_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            display_name: String::new(),
            connection_id: ConnectionId::new(format!("conn-{}", Ulid::new())),
            today: None,
            notify_capacity: 100,
        }
    }
}

/// Builder for client configuration.
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.config.display_name = name.into();
        self
    }

    pub fn connection_id(mut self, id: impl Into<String>) -> Self {
        self.config.connection_id = ConnectionId::new(id);
        self
    }

    pub fn today(mut self, today: NaiveDate) -> Self {
        self.config.today = Some(today);
        self
    }

    pub fn notify_capacity(mut self, capacity: usize) -> Self {
        self.config.notify_capacity = capacity;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A device-side client.
///
/// Every mutation is one read-modify-write cycle: read the current snapshot,
/// run the engine, then write back only the fields that changed. Nothing
/// guards the gap between read and write, so two clients racing on the same
/// document can lose one update; the store's repair keeps the result
/// consistent.
///
/// # Example
///
/// ```rust
/// use chrono::NaiveDate;
/// use moim_core::Response;
/// use moim_sdk::{Client, ClientConfigBuilder, MemoryStore};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> moim_sdk::Result<()> {
/// let store = Arc::new(MemoryStore::default());
/// let phone = Client::new(store.clone(), ClientConfigBuilder::new().display_name("Kim").build());
/// let laptop = Client::new(store, ClientConfigBuilder::new().display_name("Kim").build());
///
/// let id = phone
///     .create_event("Dinner", NaiveDate::from_ymd_opt(2026, 11, 7).unwrap())
///     .await?;
/// phone.rsvp(&id, Response::Attend).await?;
/// let event = laptop.rsvp(&id, Response::NotAttend).await?;
///
/// assert_eq!(event.roster().total(), 1);
/// # Ok(())
/// # }
/// ```
pub struct Client<S: SharedStore> {
    config: ClientConfig,
    store: Arc<S>,
}

impl Client<MemoryStore> {
    /// Create a client on a fresh in-memory store (for testing).
    pub fn new_with_memory_store(config: ClientConfig) -> Self {
        let store = Arc::new(MemoryStore::new(config.notify_capacity));
        Self { config, store }
    }
}

impl<S: SharedStore> Client<S> {
    /// Create a new client on a shared store.
    pub fn new(store: Arc<S>, config: ClientConfig) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.config.connection_id
    }

    pub fn display_name(&self) -> DisplayName {
        DisplayName::new(self.config.display_name.as_str())
    }

    /// Change the name used for subsequent actions.
    ///
    /// Existing records under the old name stay until this device acts again.
    pub fn set_display_name(&mut self, name: impl Into<String>) {
        self.config.display_name = name.into();
    }

    /// The date the expiry policy uses.
    pub fn today(&self) -> NaiveDate {
        self.config.today.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Subscribe to store events.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.store.subscribe()
    }

    fn context(&self) -> Result<(ConnectionId, DisplayName)> {
        let identity = self.config.connection_id.clone();
        let name = self.display_name();
        ensure_context(&identity, &name).map_err(|e| {
            tracing::warn!(connection = %identity, "{}", e);
            SdkError::from(e)
        })?;
        Ok((identity, name))
    }

    fn ensure_open(&self, poll: &Poll) -> Result<()> {
        let today = self.today();
        match poll.end_date {
            Some(end_date) if poll.is_closed_on(today) => {
                tracing::warn!(poll = %poll.id, %end_date, %today, "poll has expired");
                Err(SdkError::ExpiredPoll {
                    poll: poll.id.clone(),
                    end_date,
                })
            }
            _ => Ok(()),
        }
    }

    fn rejected(&self, document: &str, err: moim_core::ReconcileError) -> SdkError {
        tracing::warn!(document, connection = %self.config.connection_id, "{}", err);
        SdkError::from(err)
    }

    // === Pure steps ===

    /// Compute the event after this client casts `response`.
    pub fn compute_rsvp(&self, event: &Event, response: Response) -> Result<Event> {
        let (identity, name) = self.context()?;
        let next = event
            .cast_response(&identity, &name, response)
            .map_err(|e| self.rejected(&event.id, e))?;
        tracing::debug!(
            event = %event.id,
            name = %name,
            response = response.label(),
            now = ?next.response_of(&name).map(|r| r.label()),
            "computed rsvp"
        );
        Ok(next)
    }

    /// Compute the poll after this client votes for `option` in the poll's mode.
    pub fn compute_vote(&self, poll: &Poll, option: &OptionId) -> Result<Poll> {
        let (identity, name) = self.context()?;
        self.ensure_open(poll)?;
        let next = poll
            .vote(&identity, &name, option)
            .map_err(|e| self.rejected(&poll.id, e))?;
        tracing::debug!(poll = %poll.id, name = %name, %option, total = next.total_votes, "computed vote");
        Ok(next)
    }

    /// Compute the poll after toggling `option` on a multi-choice poll.
    pub fn compute_toggle(&self, poll: &Poll, option: &OptionId) -> Result<Poll> {
        let (identity, name) = self.context()?;
        self.ensure_open(poll)?;
        let next = poll
            .toggle_option(&identity, &name, option)
            .map_err(|e| self.rejected(&poll.id, e))?;
        tracing::debug!(poll = %poll.id, name = %name, %option, total = next.total_votes, "computed toggle");
        Ok(next)
    }

    /// Compute the poll after selecting `option` on a single-choice poll.
    pub fn compute_select(&self, poll: &Poll, option: &OptionId) -> Result<Poll> {
        let (identity, name) = self.context()?;
        self.ensure_open(poll)?;
        let next = poll
            .select_option(&identity, &name, option)
            .map_err(|e| self.rejected(&poll.id, e))?;
        tracing::debug!(poll = %poll.id, name = %name, %option, total = next.total_votes, "computed select");
        Ok(next)
    }

    /// Compute the poll after appending an option.
    pub fn compute_add_option(&self, poll: &Poll, text: &str) -> Result<Poll> {
        self.context()?;
        self.ensure_open(poll)?;
        let next = poll
            .add_option(text)
            .map_err(|e| self.rejected(&poll.id, e))?;
        tracing::debug!(poll = %poll.id, text, options = next.options.len(), "computed new option");
        Ok(next)
    }

    // === Reads ===

    /// Read an event snapshot.
    pub async fn event(&self, id: &DocumentId) -> Result<Event> {
        match self.store.read(id).await? {
            Document::Event(event) => Ok(event),
            other => Err(mismatch(DocumentKind::Event, &other)),
        }
    }

    /// Read a poll snapshot.
    pub async fn poll(&self, id: &DocumentId) -> Result<Poll> {
        match self.store.read(id).await? {
            Document::Poll(poll) => Ok(poll),
            other => Err(mismatch(DocumentKind::Poll, &other)),
        }
    }

    // === Read-modify-write ===

    /// Write the fields of `next` that differ from `before`.
    ///
    /// Returns the revision after the write, or `None` when nothing changed.
    pub async fn commit(&self, id: &DocumentId, before: &Document, next: Document) -> Result<Option<u64>> {
        let patch = before.changed_fields(&next)?;
        if patch.is_empty() {
            tracing::debug!(document = %id, "nothing to write");
            return Ok(None);
        }
        let revision = self.store.write(id, patch).await?;
        Ok(Some(revision))
    }

    /// Cast, switch or withdraw this client's RSVP.
    pub async fn rsvp(&self, id: &DocumentId, response: Response) -> Result<Event> {
        self.context()?;
        let before = self.event(id).await?;
        let next = self.compute_rsvp(&before, response)?;
        self.commit(id, &Document::Event(before), Document::Event(next.clone()))
            .await?;
        Ok(next)
    }

    /// Vote in whichever mode the poll uses.
    pub async fn vote(&self, id: &DocumentId, option: &OptionId) -> Result<Poll> {
        self.context()?;
        let before = self.poll(id).await?;
        let next = self.compute_vote(&before, option)?;
        self.commit(id, &Document::Poll(before), Document::Poll(next.clone()))
            .await?;
        Ok(next)
    }

    /// Toggle one option on a multi-choice poll.
    pub async fn toggle_option(&self, id: &DocumentId, option: &OptionId) -> Result<Poll> {
        self.context()?;
        let before = self.poll(id).await?;
        let next = self.compute_toggle(&before, option)?;
        self.commit(id, &Document::Poll(before), Document::Poll(next.clone()))
            .await?;
        Ok(next)
    }

    /// Select, switch or withdraw on a single-choice poll.
    pub async fn select_option(&self, id: &DocumentId, option: &OptionId) -> Result<Poll> {
        self.context()?;
        let before = self.poll(id).await?;
        let next = self.compute_select(&before, option)?;
        self.commit(id, &Document::Poll(before), Document::Poll(next.clone()))
            .await?;
        Ok(next)
    }

    /// Append an option to a poll that allows it.
    pub async fn add_option(&self, id: &DocumentId, text: &str) -> Result<Poll> {
        self.context()?;
        let before = self.poll(id).await?;
        let next = self.compute_add_option(&before, text)?;
        self.commit(id, &Document::Poll(before), Document::Poll(next.clone()))
            .await?;
        Ok(next)
    }

    // === Documents ===

    /// Store a document built by the caller.
    pub async fn create(&self, document: impl Into<Document>) -> Result<DocumentId> {
        Ok(self.store.create(document.into()).await?)
    }

    /// Create an event with a generated ID.
    pub async fn create_event(&self, title: impl Into<String>, date: NaiveDate) -> Result<DocumentId> {
        let id = DocumentId::new();
        self.create(Event::new(id.as_str(), title, date)).await
    }

    /// Create a single-choice poll with a generated ID.
    pub async fn create_poll<I, T>(&self, question: impl Into<String>, options: I) -> Result<DocumentId>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let id = DocumentId::new();
        self.create(Poll::from_texts(id.as_str(), question, options))
            .await
    }

    /// Delete a document.
    pub async fn delete(&self, id: &DocumentId) -> Result<()> {
        Ok(self.store.delete(id).await?)
    }
}

fn mismatch(expected: DocumentKind, found: &Document) -> SdkError {
    SdkError::Store(StoreError::TypeMismatch {
        expected: expected.to_string(),
        found: found.kind().to_string(),
    })
}
