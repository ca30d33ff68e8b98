// ==================== USER CREATED LISTENER ====================
// Escuta inserts na collection `user` (change stream) e dispara o bootstrap.
//
// Entrega at-least-once: o resume token só avança depois que o evento foi
// tratado. Se o commit falhar, o stream é reaberto a partir do último token
// confirmado e o mesmo evento é entregue de novo. Antes do primeiro ack, o
// ponto de retomada é o token do próprio stream no momento em que foi aberto.
//
// O resume token fica só em memória: inserts feitos enquanto o processo está
// parado não são vistos depois do restart.

use futures::stream::StreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::change_stream::event::{OperationType, ResumeToken};
use mongodb::options::ChangeStreamOptions;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::{
    database::MongoDB,
    models::USER_COLLECTION,
    services::bootstrap_service::{self, BootstrapOutcome},
    store::{DocumentStore, MongoStore},
    utils::error::BootstrapError,
};

/// Creation of a `user/{uid}` document as seen by the handler.
#[derive(Debug, Clone, PartialEq)]
pub struct UserCreatedEvent {
    pub uid: String,
    pub snapshot: Option<Document>,
}

#[derive(Debug)]
pub enum Delivery {
    /// Event handled (or permanently failed); move past it.
    Ack,
    /// Event must be delivered again.
    Redeliver(BootstrapError),
}

/// Starts the listener in background. It runs until the process exits.
pub fn start_user_created_listener(db: MongoDB, retry_delay: Duration) -> JoinHandle<()> {
    log::info!("👂 Starting user created listener (retry delay: {}s)", retry_delay.as_secs());

    let store = MongoStore::new(db.clone());

    tokio::spawn(async move {
        let mut resume_token: Option<ResumeToken> = None;

        loop {
            match watch_users(&db, &store, &mut resume_token).await {
                Ok(()) => log::warn!("⚠️  User change stream closed — reopening"),
                Err(e) => log::error!("❌ User change stream failed: {}", e),
            }

            tokio::time::sleep(retry_delay).await;
        }
    })
}

async fn watch_users(
    db: &MongoDB,
    store: &MongoStore,
    resume_token: &mut Option<ResumeToken>,
) -> anyhow::Result<()> {
    let mut options = ChangeStreamOptions::default();
    options.resume_after = resume_token.clone();

    let mut stream = db
        .collection::<Document>(USER_COLLECTION)
        .watch()
        .pipeline(vec![doc! { "$match": { "operationType": "insert" } }])
        .with_options(options)
        .await?;

    *resume_token = resume_point(resume_token.take(), stream.resume_token());

    log::info!("✅ Watching '{}' for new users", USER_COLLECTION);

    while let Some(change) = stream.next().await {
        let change = change?;
        let token = change.id.clone();

        if !matches!(change.operation_type, OperationType::Insert) {
            *resume_token = Some(token);
            continue;
        }

        let Some(uid) = extract_uid(change.document_key.as_ref()) else {
            log::warn!("⚠️  Skipping user insert without a string _id: {:?}", change.document_key);
            *resume_token = Some(token);
            continue;
        };

        let event = UserCreatedEvent {
            uid,
            snapshot: change.full_document,
        };

        match handle_event(store, &event).await {
            Delivery::Ack => *resume_token = Some(token),
            Delivery::Redeliver(e) => return Err(e.into()),
        }
    }

    Ok(())
}

/// Where a reopened stream continues: after the last acknowledged event, or
/// else from where the stream was first opened so an unacknowledged event is
/// seen again.
fn resume_point<T>(acknowledged: Option<T>, opened_at: Option<T>) -> Option<T> {
    acknowledged.or(opened_at)
}

/// Runs the bootstrap for one event and decides whether the event is done.
pub async fn handle_event<S>(store: &S, event: &UserCreatedEvent) -> Delivery
where
    S: DocumentStore + ?Sized,
{
    match bootstrap_service::bootstrap_user(store, &event.uid, event.snapshot.as_ref()).await {
        Ok(BootstrapOutcome::Committed { .. }) | Ok(BootstrapOutcome::NoSnapshot) => Delivery::Ack,
        Err(e) if e.is_retryable() => Delivery::Redeliver(e),
        Err(e) => {
            log::error!("❌ Dropping user created event for {}: {}", event.uid, e);
            Delivery::Ack
        }
    }
}

/// The uid is the document key; only string keys address a `user/{uid}` path.
fn extract_uid(document_key: Option<&Document>) -> Option<String> {
    match document_key?.get("_id")? {
        Bson::String(uid) => Some(uid.clone()),
        _ => None,
    }
}
