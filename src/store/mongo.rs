// MongoDB backend do DocumentStore.
// Path `a/x/b/y` vira collection `a.b` com `_id = "x/y"`; batch roda numa transação.
//
// O primeiro write com server timestamp lê `$$NOW` no servidor; o valor
// retornado é fixado como literal em todos os writes seguintes do batch.

use async_trait::async_trait;
use mongodb::bson::{doc, Bson, DateTime as BsonDateTime, Document};
use mongodb::options::ReturnDocument;
use mongodb::ClientSession;

use super::{DocumentPath, DocumentStore, FieldValue, Fields, WriteBatch};
use crate::database::MongoDB;
use crate::utils::error::StoreError;

#[derive(Clone)]
pub struct MongoStore {
    db: MongoDB,
}

impl MongoStore {
    pub fn new(db: MongoDB) -> Self {
        Self { db }
    }

    async fn apply(&self, session: &mut ClientSession, batch: &WriteBatch) -> Result<(), StoreError> {
        let mut commit_time: Option<BsonDateTime> = None;

        for op in batch.ops() {
            let (collection_name, id) = locate(&op.path);
            let collection = self.db.collection::<Document>(&collection_name);
            let pipeline = update_pipeline(&op.fields, op.options.merge, commit_time);

            match (commit_time, first_server_timestamp(&op.fields)) {
                (None, Some(field)) => {
                    let written = collection
                        .find_one_and_update(doc! { "_id": &id }, pipeline)
                        .upsert(true)
                        .return_document(ReturnDocument::After)
                        .session(&mut *session)
                        .await?;

                    let now = written
                        .as_ref()
                        .and_then(|document| document.get_datetime(field).ok())
                        .copied()
                        .ok_or_else(|| StoreError::MissingCommitTime(op.path.to_string()))?;
                    commit_time = Some(now);
                }
                _ => {
                    collection
                        .update_one(doc! { "_id": &id }, pipeline)
                        .upsert(true)
                        .session(&mut *session)
                        .await?;
                }
            }
        }
        Ok(())
    }
}

fn first_server_timestamp(fields: &Fields) -> Option<&str> {
    fields
        .iter()
        .find(|(_, value)| matches!(value, FieldValue::ServerTimestamp))
        .map(|(key, _)| key)
}

/// Collection name and `_id` that hold the document at `path`.
pub fn locate(path: &DocumentPath) -> (String, String) {
    let segments = path.segments();
    let collections: Vec<&str> = segments.iter().step_by(2).map(String::as_str).collect();
    let ids: Vec<&str> = segments.iter().skip(1).step_by(2).map(String::as_str).collect();
    (collections.join("."), ids.join("/"))
}

/// Update pipeline for one write. Literals go through `$literal` so strings
/// starting with `$` are never read as expressions. Server timestamps become
/// `commit_time` once it is known, `$$NOW` before that.
fn update_pipeline(fields: &Fields, merge: bool, commit_time: Option<BsonDateTime>) -> Vec<Document> {
    let mut set = Document::new();
    for (key, value) in fields.iter() {
        let expr = match (value, commit_time) {
            (FieldValue::Value(v), _) => Bson::Document(doc! { "$literal": v.clone() }),
            (FieldValue::ServerTimestamp, Some(now)) => Bson::Document(doc! { "$literal": now }),
            (FieldValue::ServerTimestamp, None) => Bson::String("$$NOW".to_string()),
        };
        set.insert(key, expr);
    }

    let mut pipeline = Vec::new();
    if !merge {
        pipeline.push(doc! { "$replaceWith": { "_id": "$_id" } });
    }
    if !set.is_empty() {
        pipeline.push(doc! { "$set": set });
    }
    if pipeline.is_empty() {
        // merge sem campos: só garante que o documento existe
        pipeline.push(doc! { "$replaceWith": "$$ROOT" });
    }
    pipeline
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, StoreError> {
        let (collection_name, id) = locate(path);

        let found = self
            .db
            .collection::<Document>(&collection_name)
            .find_one(doc! { "_id": &id })
            .await?;

        Ok(found.map(|mut document| {
            document.remove("_id");
            document
        }))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut session = self.db.client().start_session().await?;
        session.start_transaction().await?;

        if let Err(e) = self.apply(&mut session, &batch).await {
            if let Err(abort_err) = session.abort_transaction().await {
                log::warn!("⚠️  Failed to abort transaction: {}", abort_err);
            }
            return Err(e);
        }

        session.commit_transaction().await?;
        log::debug!("💾 MongoDB committed {} writes", batch.len());
        Ok(())
    }
}
