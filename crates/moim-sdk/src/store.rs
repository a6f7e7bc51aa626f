//! Shared store abstraction the client reads from and writes to.

use async_trait::async_trait;
use moim_store::{Document, DocumentId, DocumentStore, StoreError};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Events emitted by a shared store after each accepted write.
#[derive(Clone, Debug)]
pub enum StoreEvent {
    /// A document was created.
    Created { id: DocumentId, document: Document },
    /// A document changed; carries the stored snapshot after the write.
    Updated {
        id: DocumentId,
        document: Document,
        revision: u64,
    },
    /// A document was deleted.
    Deleted { id: DocumentId },
}

impl StoreEvent {
    pub fn document_id(&self) -> &DocumentId {
        match self {
            StoreEvent::Created { id, .. }
            | StoreEvent::Updated { id, .. }
            | StoreEvent::Deleted { id } => id,
        }
    }
}

/// A real-time store shared by every device.
///
/// Reads return whole snapshots; writes overwrite the named top-level fields
/// with no precondition on what the writer last read.
#[async_trait]
pub trait SharedStore: Send + Sync + 'static {
    /// Read a document snapshot.
    async fn read(&self, id: &DocumentId) -> Result<Document, StoreError>;

    /// Overwrite the given top-level fields. Returns the new revision.
    async fn write(&self, id: &DocumentId, fields: Map<String, Value>) -> Result<u64, StoreError>;

    /// Store a new document under its own ID.
    async fn create(&self, document: Document) -> Result<DocumentId, StoreError>;

    /// Delete a document.
    async fn delete(&self, id: &DocumentId) -> Result<(), StoreError>;

    /// Subscribe to store events.
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}

/// In-memory shared store for tests, demos and simulation.
///
/// Cloning yields another handle onto the same documents.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<DocumentStore>>,
    event_tx: broadcast::Sender<StoreEvent>,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        Self::with_store(DocumentStore::new(), capacity)
    }

    /// Wrap an existing document store.
    pub fn with_store(store: DocumentStore, capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(RwLock::new(store)),
            event_tx,
        }
    }

    /// Run `f` against the underlying store without going through a client.
    pub fn inspect<R>(&self, f: impl FnOnce(&DocumentStore) -> R) -> R {
        f(&self.inner.read())
    }

    /// Run a mutation under the write lock, then drain the store's change
    /// log. Subscribers get `StoreEvent`s instead, so the log stays empty.
    fn mutate<R>(
        &self,
        f: impl FnOnce(&mut DocumentStore) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut store = self.inner.write();
        let result = f(&mut store);
        for change in store.take_changes() {
            tracing::debug!(document = %change.document_id(), ?change, "applied change");
        }
        result
    }

    /// Overwrite a whole document, bypassing field-level writes.
    pub fn replace(&self, id: &DocumentId, document: Document) -> Result<u64, StoreError> {
        let revision = self.mutate(|store| store.replace(id, document.clone()))?;
        tracing::info!(document = %id, revision, "replaced document");
        let _ = self.event_tx.send(StoreEvent::Updated {
            id: id.clone(),
            document,
            revision,
        });
        Ok(revision)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(100)
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn read(&self, id: &DocumentId) -> Result<Document, StoreError> {
        self.inner.read().document(id).cloned()
    }

    async fn write(&self, id: &DocumentId, fields: Map<String, Value>) -> Result<u64, StoreError> {
        let (revision, document) = self.mutate(|store| {
            let revision = store.write_fields(id, &fields)?;
            Ok((revision, store.document(id)?.clone()))
        })?;

        tracing::info!(
            document = %id,
            revision,
            fields = ?fields.keys().collect::<Vec<_>>(),
            "wrote fields"
        );
        let _ = self.event_tx.send(StoreEvent::Updated {
            id: id.clone(),
            document,
            revision,
        });
        Ok(revision)
    }

    async fn create(&self, document: Document) -> Result<DocumentId, StoreError> {
        let id = self.mutate(|store| store.insert(document.clone()))?;
        tracing::info!(document = %id, kind = %document.kind(), "created document");
        let _ = self.event_tx.send(StoreEvent::Created {
            id: id.clone(),
            document,
        });
        Ok(id)
    }

    async fn delete(&self, id: &DocumentId) -> Result<(), StoreError> {
        self.mutate(|store| {
            store
                .delete(id)
                .ok_or_else(|| StoreError::DocumentNotFound(id.to_string()))
        })?;
        tracing::info!(document = %id, "deleted document");
        let _ = self.event_tx.send(StoreEvent::Deleted { id: id.clone() });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.event_tx.subscribe()
    }
}
