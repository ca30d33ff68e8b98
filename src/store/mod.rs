// ==================== DOCUMENT STORE ====================
// Abstração mínima de um document store hierárquico:
// documentos endereçados por path, merge-upsert, batch atômico e server timestamp.

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use async_trait::async_trait;
use mongodb::bson::{Bson, DateTime as BsonDateTime, Document};
use std::fmt;

use crate::utils::error::StoreError;

/// Path of a single document: alternating collection / document id segments,
/// e.g. `user/u1` or `user/u1/list/favorites`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath {
    segments: Vec<String>,
}

impl DocumentPath {
    pub fn parse(path: &str) -> Result<Self, StoreError> {
        let segments: Vec<String> = path.split('/').map(str::to_string).collect();

        if segments.len() % 2 != 0 {
            return Err(StoreError::InvalidPath {
                path: path.to_string(),
                reason: "a document path needs an even number of segments".to_string(),
            });
        }

        for segment in &segments {
            validate_segment(path, segment)?;
        }

        Ok(Self { segments })
    }

    /// Top-level document `collection/id`.
    pub fn doc(collection: &str, id: &str) -> Result<Self, StoreError> {
        let path = format!("{}/{}", collection, id);
        validate_segment(&path, collection)?;
        validate_segment(&path, id)?;

        Ok(Self {
            segments: vec![collection.to_string(), id.to_string()],
        })
    }

    /// Document `id` inside the sub-collection `collection` of this document.
    pub fn child(&self, collection: &str, id: &str) -> Result<Self, StoreError> {
        let path = format!("{}/{}/{}", self, collection, id);
        validate_segment(&path, collection)?;
        validate_segment(&path, id)?;

        let mut segments = self.segments.clone();
        segments.push(collection.to_string());
        segments.push(id.to_string());
        Ok(Self { segments })
    }

    /// Owning document, `None` for top-level documents.
    pub fn parent(&self) -> Option<DocumentPath> {
        if self.segments.len() <= 2 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 2].to_vec(),
        })
    }

    pub fn id(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    /// Name of the collection that directly contains this document.
    pub fn collection_id(&self) -> &str {
        &self.segments[self.segments.len() - 2]
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

fn validate_segment(path: &str, segment: &str) -> Result<(), StoreError> {
    let reason = if segment.is_empty() {
        "empty segment"
    } else if segment.contains('/') {
        "segment contains '/'"
    } else if segment == "." || segment == ".." {
        "segment cannot be '.' or '..'"
    } else {
        return Ok(());
    };

    Err(StoreError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    })
}

/// Value of a field in a write: a literal, or a timestamp the store assigns at commit.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Value(Bson),
    ServerTimestamp,
}

/// Ordered partial field map of a write. Setting a key twice keeps the last value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields {
    entries: Vec<(String, FieldValue)>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(self, key: &str, value: impl Into<Bson>) -> Self {
        self.with(key, FieldValue::Value(value.into()))
    }

    pub fn server_timestamp(self, key: &str) -> Self {
        self.with(key, FieldValue::ServerTimestamp)
    }

    fn with(mut self, key: &str, value: FieldValue) -> Self {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Materializes the fields, replacing every server timestamp with `now`.
    pub fn resolve(&self, now: BsonDateTime) -> Document {
        let mut resolved = Document::new();
        for (key, value) in &self.entries {
            let value = match value {
                FieldValue::Value(v) => v.clone(),
                FieldValue::ServerTimestamp => Bson::DateTime(now),
            };
            resolved.insert(key.clone(), value);
        }
        resolved
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Keep fields of an existing document that the write does not mention.
    pub merge: bool,
}

impl SetOptions {
    pub fn merge() -> Self {
        Self { merge: true }
    }

    pub fn replace() -> Self {
        Self { merge: false }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteOp {
    pub path: DocumentPath,
    pub fields: Fields,
    pub options: SetOptions,
}

/// Writes committed together: either all of them apply or none does.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: DocumentPath, fields: Fields, options: SetOptions) -> &mut Self {
        self.ops.push(WriteOp {
            path,
            fields,
            options,
        });
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Current content of the document, `None` if it does not exist.
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, StoreError>;

    /// Applies every write of the batch atomically. An empty batch is a no-op.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;
}
