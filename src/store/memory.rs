use async_trait::async_trait;
use mongodb::bson::{DateTime as BsonDateTime, Document};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{DocumentPath, DocumentStore, WriteBatch};
use crate::utils::error::StoreError;

pub type Clock = Arc<dyn Fn() -> BsonDateTime + Send + Sync>;

/// In-process document store. A batch is applied under a single lock with a
/// single commit timestamp, so no reader ever sees half of it.
pub struct MemoryStore {
    documents: Mutex<BTreeMap<DocumentPath, Document>>,
    clock: Clock,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(BsonDateTime::now))
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            documents: Mutex::new(BTreeMap::new()),
            clock,
        }
    }

    /// Writes a document as-is, the way an external client would create it.
    pub async fn insert(&self, path: DocumentPath, document: Document) {
        self.documents.lock().await.insert(path, document);
    }

    /// Documents of the sub-collection `collection` under `parent`, ordered by id.
    pub async fn list_children(&self, parent: &DocumentPath, collection: &str) -> Vec<(String, Document)> {
        self.documents
            .lock()
            .await
            .iter()
            .filter(|(path, _)| {
                path.collection_id() == collection && path.parent().as_ref() == Some(parent)
            })
            .map(|(path, doc)| (path.id().to_string(), doc.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.documents.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.lock().await.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, StoreError> {
        Ok(self.documents.lock().await.get(path).cloned())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut documents = self.documents.lock().await;
        let now = (self.clock)();

        for op in batch.ops() {
            let resolved = op.fields.resolve(now);

            if op.options.merge {
                let target = documents.entry(op.path.clone()).or_default();
                for (key, value) in resolved {
                    target.insert(key, value);
                }
            } else {
                documents.insert(op.path.clone(), resolved);
            }
        }

        log::debug!("💾 Memory store committed {} writes", batch.len());
        Ok(())
    }
}
