//! Document Store - in-memory stand-in for the shared real-time store.
//!
//! Mirrors what the hosted store offers and nothing more:
//! - whole-document snapshot reads
//! - whole-document writes and named-field writes, last writer wins
//! - no transactions, no compare-and-swap
//!
//! Revisions are bumped on every write for observers; they are never checked.
//!
//! One difference from the hosted store: `write_fields` repairs the merged
//! document (`Document::repair`) before storing it, so drifted aggregates such
//! as a stale `totalVotes` are re-derived on every field write. The hosted
//! store stores whatever fields it is sent. Code tested only against this store
//! can look more correct than it is in production; `replace` stores documents
//! unrepaired and is the way to reproduce hosted behaviour in tests.

use crate::error::{Result, StoreError};
use chrono::NaiveDate;
use moim_core::{Event, InvariantViolation, Poll, Reducer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use ulid::Ulid;

/// Unique identifier for a document.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of a document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DocumentKind {
    Event,
    Poll,
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentKind::Event => write!(f, "event"),
            DocumentKind::Poll => write!(f, "poll"),
        }
    }
}

/// A shared document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "camelCase")]
pub enum Document {
    Event(Event),
    Poll(Poll),
}

impl Document {
    pub fn kind(&self) -> DocumentKind {
        match self {
            Document::Event(_) => DocumentKind::Event,
            Document::Poll(_) => DocumentKind::Poll,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Document::Event(e) => &e.id,
            Document::Poll(p) => &p.id,
        }
    }

    pub fn as_event(&self) -> Option<&Event> {
        match self {
            Document::Event(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_poll(&self) -> Option<&Poll> {
        match self {
            Document::Poll(p) => Some(p),
            _ => None,
        }
    }

    pub fn check_invariants(&self) -> std::result::Result<(), InvariantViolation> {
        match self {
            Document::Event(e) => e.check_invariants(),
            Document::Poll(p) => p.check_invariants(),
        }
    }

    /// Re-derive aggregates after fields from different writers were combined.
    pub fn repair(&mut self) {
        match self {
            Document::Event(e) => e.collect_garbage(),
            Document::Poll(p) => p.recount(),
        }
    }

    /// The document body as a JSON object keyed by field name.
    pub fn to_fields(&self) -> Result<Map<String, Value>> {
        let value = match self {
            Document::Event(e) => serde_json::to_value(e)?,
            Document::Poll(p) => serde_json::to_value(p)?,
        };
        match value {
            Value::Object(map) => Ok(map),
            other => Err(StoreError::SerializationError(format!(
                "expected an object, found {}",
                other
            ))),
        }
    }

    /// Rebuild a document of `kind` from its fields.
    pub fn from_fields(kind: DocumentKind, fields: Map<String, Value>) -> Result<Self> {
        let value = Value::Object(fields);
        Ok(match kind {
            DocumentKind::Event => Document::Event(serde_json::from_value(value)?),
            DocumentKind::Poll => Document::Poll(serde_json::from_value(value)?),
        })
    }

    /// The top-level fields whose value differs in `next`, as a patch.
    pub fn changed_fields(&self, next: &Document) -> Result<Map<String, Value>> {
        if self.kind() != next.kind() {
            return Err(StoreError::TypeMismatch {
                expected: self.kind().to_string(),
                found: next.kind().to_string(),
            });
        }
        let before = self.to_fields()?;
        Ok(next
            .to_fields()?
            .into_iter()
            .filter(|(key, value)| before.get(key) != Some(value))
            .collect())
    }
}

impl From<Event> for Document {
    fn from(event: Event) -> Self {
        Document::Event(event)
    }
}

impl From<Poll> for Document {
    fn from(poll: Poll) -> Self {
        Document::Poll(poll)
    }
}

/// A document with store metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    pub id: DocumentId,
    pub document: Document,
    /// Bumped on every write; informational only.
    pub revision: u64,
    /// Last modified timestamp (milliseconds since epoch).
    pub modified_at: u64,
}

/// A change to the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreChange {
    /// A new document was created.
    Create { id: DocumentId, kind: DocumentKind },
    /// A whole document was overwritten.
    Replace { id: DocumentId, revision: u64 },
    /// Named fields were overwritten.
    Patch {
        id: DocumentId,
        fields: Vec<String>,
        revision: u64,
    },
    /// A document was deleted.
    Delete { id: DocumentId },
}

impl StoreChange {
    pub fn document_id(&self) -> &DocumentId {
        match self {
            StoreChange::Create { id, .. }
            | StoreChange::Replace { id, .. }
            | StoreChange::Patch { id, .. }
            | StoreChange::Delete { id } => id,
        }
    }
}

/// A store of shared event and poll documents.
#[derive(Clone, Debug, Default)]
pub struct DocumentStore {
    /// All documents indexed by ID.
    documents: BTreeMap<DocumentId, StoredDocument>,
    /// Pending changes for subscribers.
    pending_changes: Vec<StoreChange>,
}

impl DocumentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // === Document CRUD ===

    /// Create an event with a generated ID.
    pub fn create_event(&mut self, title: impl Into<String>, date: NaiveDate) -> DocumentId {
        let id = DocumentId::new();
        let event = Event::new(id.0.clone(), title, date);
        self.put_new(id.clone(), Document::Event(event));
        id
    }

    /// Create a single-choice poll with a generated ID.
    pub fn create_poll<I, S>(&mut self, question: impl Into<String>, options: I) -> DocumentId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = DocumentId::new();
        let poll = Poll::from_texts(id.0.clone(), question, options);
        self.put_new(id.clone(), Document::Poll(poll));
        id
    }

    /// Insert a document built by the caller, keyed by its own ID.
    pub fn insert(&mut self, document: Document) -> Result<DocumentId> {
        if document.id().trim().is_empty() {
            return Err(StoreError::InvalidPatch("document id is empty".to_string()));
        }
        let id = DocumentId::from_string(document.id());
        if self.documents.contains_key(&id) {
            return Err(StoreError::DocumentExists(id.to_string()));
        }
        self.put_new(id.clone(), document);
        Ok(id)
    }

    fn put_new(&mut self, id: DocumentId, document: Document) {
        let kind = document.kind();
        self.documents.insert(
            id.clone(),
            StoredDocument {
                id: id.clone(),
                document,
                revision: 1,
                modified_at: now_millis(),
            },
        );
        self.pending_changes.push(StoreChange::Create { id, kind });
    }

    /// Get a stored document by ID.
    pub fn get(&self, id: &DocumentId) -> Option<&StoredDocument> {
        self.documents.get(id)
    }

    /// Get a document by ID.
    pub fn document(&self, id: &DocumentId) -> Result<&Document> {
        self.documents
            .get(id)
            .map(|stored| &stored.document)
            .ok_or_else(|| StoreError::DocumentNotFound(id.to_string()))
    }

    /// Get an event by ID.
    pub fn event(&self, id: &DocumentId) -> Result<&Event> {
        let document = self.document(id)?;
        document.as_event().ok_or_else(|| StoreError::TypeMismatch {
            expected: DocumentKind::Event.to_string(),
            found: document.kind().to_string(),
        })
    }

    /// Get a poll by ID.
    pub fn poll(&self, id: &DocumentId) -> Result<&Poll> {
        let document = self.document(id)?;
        document.as_poll().ok_or_else(|| StoreError::TypeMismatch {
            expected: DocumentKind::Poll.to_string(),
            found: document.kind().to_string(),
        })
    }

    /// Overwrite a whole document. Last writer wins.
    pub fn replace(&mut self, id: &DocumentId, document: Document) -> Result<u64> {
        let stored = self
            .documents
            .get_mut(id)
            .ok_or_else(|| StoreError::DocumentNotFound(id.to_string()))?;

        if stored.document.kind() != document.kind() {
            return Err(StoreError::TypeMismatch {
                expected: stored.document.kind().to_string(),
                found: document.kind().to_string(),
            });
        }
        if document.id() != id.as_str() {
            return Err(StoreError::InvalidPatch(format!(
                "document id {} does not match {}",
                document.id(),
                id
            )));
        }

        stored.document = document;
        stored.revision += 1;
        stored.modified_at = now_millis();
        let revision = stored.revision;

        self.pending_changes.push(StoreChange::Replace {
            id: id.clone(),
            revision,
        });
        Ok(revision)
    }

    /// Overwrite the named top-level fields of a document. Last writer wins
    /// per field; fields absent from the patch keep their stored value.
    ///
    /// Combining fields from different writers can leave aggregates stale,
    /// so the merged document is repaired before it is stored.
    pub fn write_fields(&mut self, id: &DocumentId, patch: &Map<String, Value>) -> Result<u64> {
        let stored = self
            .documents
            .get_mut(id)
            .ok_or_else(|| StoreError::DocumentNotFound(id.to_string()))?;

        if patch.is_empty() {
            return Ok(stored.revision);
        }

        let kind = stored.document.kind();
        let mut fields = stored.document.to_fields()?;
        for (key, value) in patch {
            match fields.get(key) {
                None => return Err(StoreError::InvalidPatch(format!("unknown field {}", key))),
                Some(current) if key == "id" && current != value => {
                    return Err(StoreError::InvalidPatch("the id field is immutable".to_string()))
                }
                Some(_) => {
                    fields.insert(key.clone(), value.clone());
                }
            }
        }

        let mut merged = Document::from_fields(kind, fields)?;
        merged.repair();

        stored.document = merged;
        stored.revision += 1;
        stored.modified_at = now_millis();
        let revision = stored.revision;

        self.pending_changes.push(StoreChange::Patch {
            id: id.clone(),
            fields: patch.keys().cloned().collect(),
            revision,
        });
        Ok(revision)
    }

    /// Delete a document.
    pub fn delete(&mut self, id: &DocumentId) -> Option<StoredDocument> {
        let removed = self.documents.remove(id)?;
        self.pending_changes
            .push(StoreChange::Delete { id: id.clone() });
        Some(removed)
    }

    /// Check if a document exists.
    pub fn contains(&self, id: &DocumentId) -> bool {
        self.documents.contains_key(id)
    }

    /// Get the number of documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// List documents, optionally of one kind, in ID order.
    pub fn list(&self, kind: Option<DocumentKind>) -> Vec<&StoredDocument> {
        self.documents
            .values()
            .filter(|stored| kind.map_or(true, |k| stored.document.kind() == k))
            .collect()
    }

    // === Sync Operations ===

    /// Take the pending change log.
    pub fn take_changes(&mut self) -> Vec<StoreChange> {
        std::mem::take(&mut self.pending_changes)
    }

    /// Serialize every document to JSON.
    pub fn snapshot(&self) -> Result<String> {
        let documents: Vec<&StoredDocument> = self.documents.values().collect();
        Ok(serde_json::to_string_pretty(&documents)?)
    }

    /// Rebuild a store from a snapshot.
    pub fn restore(json: &str) -> Result<Self> {
        let documents: Vec<StoredDocument> = serde_json::from_str(json)?;
        Ok(Self {
            documents: documents
                .into_iter()
                .map(|stored| (stored.id.clone(), stored))
                .collect(),
            pending_changes: Vec::new(),
        })
    }
}

/// Get current time in milliseconds.
fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
