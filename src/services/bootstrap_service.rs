// ==================== USER BOOTSTRAP ====================
// Completa um `user/{uid}` recém-criado: username = email, timestamps e as
// listas de sistema (favorites, watched, watchlist), tudo num único batch.
//
// Todas as escritas são merge-upsert com valores determinísticos, então
// reentregas do mesmo evento convergem para o mesmo estado.

use mongodb::bson::{Bson, Document};

use crate::{
    models::{SystemList, LIST_COLLECTION, SYSTEM_LIST_TYPE, USER_COLLECTION},
    store::{DocumentPath, DocumentStore, Fields, SetOptions, WriteBatch},
    utils::error::{BootstrapError, StoreError},
};

const EMAIL_FIELD: &str = "email";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// Batch committed with this many writes.
    Committed { writes: usize },
    /// The event carried no document; nothing was written.
    NoSnapshot,
}

/// Bootstraps the user `uid` from the document content observed at creation.
///
/// `snapshot` is `None` when the event reports a creation without a payload;
/// that is a successful no-op. A snapshot without a truthy `email` fails with
/// [`BootstrapError::MissingRequiredField`] before anything is written.
///
/// `createdAt` is re-stamped with the commit time on every run, so a
/// redelivered event moves it forward.
pub async fn bootstrap_user<S>(
    store: &S,
    uid: &str,
    snapshot: Option<&Document>,
) -> Result<BootstrapOutcome, BootstrapError>
where
    S: DocumentStore + ?Sized,
{
    let Some(data) = snapshot else {
        log::warn!("⚠️  User {} created without snapshot — skipping bootstrap", uid);
        return Ok(BootstrapOutcome::NoSnapshot);
    };

    let email = match data.get(EMAIL_FIELD) {
        Some(value) if is_truthy(value) => value.clone(),
        _ => {
            log::error!("❌ User {} created without email", uid);
            return Err(BootstrapError::MissingRequiredField {
                uid: uid.to_string(),
                field: EMAIL_FIELD,
            });
        }
    };

    let batch = build_bootstrap_batch(uid, email).map_err(|source| BootstrapError::InvalidUid {
        uid: uid.to_string(),
        source,
    })?;
    let writes = batch.len();

    store.commit(batch).await.map_err(|e| {
        log::error!("❌ Bootstrap commit failed for user {}: {}", uid, e);
        BootstrapError::StoreCommit(e)
    })?;

    log::info!("✅ User {} bootstrapped ({} writes)", uid, writes);
    Ok(BootstrapOutcome::Committed { writes })
}

/// One merge on the user document plus one merge per system list.
fn build_bootstrap_batch(uid: &str, email: Bson) -> Result<WriteBatch, StoreError> {
    let user_path = DocumentPath::doc(USER_COLLECTION, uid)?;
    let mut batch = WriteBatch::new();

    batch.set(
        user_path.clone(),
        Fields::new()
            .set(EMAIL_FIELD, email.clone())
            .set("username", email)
            .server_timestamp("updatedAt")
            .server_timestamp("createdAt"),
        SetOptions::merge(),
    );

    for list in SystemList::ALL {
        batch.set(
            user_path.child(LIST_COLLECTION, list.id())?,
            Fields::new()
                .set("name", list.name())
                .set("type", SYSTEM_LIST_TYPE)
                .server_timestamp("createdAt")
                .server_timestamp("updatedAt"),
            SetOptions::merge(),
        );
    }

    Ok(batch)
}

/// Falsy: null, undefined, false, "", 0 and NaN.
fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Null | Bson::Undefined => false,
        Bson::Boolean(b) => *b,
        Bson::String(s) => !s.is_empty(),
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(f) => *f != 0.0 && !f.is_nan(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::Clock;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use mongodb::bson::{doc, from_document, DateTime as BsonDateTime};
    use serde::Deserialize;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    const T: i64 = 1_700_000_000_000;

    /// `user/{uid}` as written by the bootstrap.
    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct UserRecord {
        email: String,
        username: Option<String>,
        created_at: Option<BsonDateTime>,
        updated_at: Option<BsonDateTime>,
    }

    /// `user/{uid}/list/{id}` as written by the bootstrap.
    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct ListRecord {
        name: String,
        #[serde(rename = "type")]
        list_type: String,
        created_at: Option<BsonDateTime>,
        updated_at: Option<BsonDateTime>,
    }

    fn ticking_clock() -> Clock {
        let next = Arc::new(AtomicI64::new(T));
        Arc::new(move || BsonDateTime::from_millis(next.fetch_add(1_000, Ordering::SeqCst)))
    }

    fn user_path(uid: &str) -> DocumentPath {
        DocumentPath::doc(USER_COLLECTION, uid).unwrap()
    }

    struct FailingStore;

    #[async_trait]
    impl DocumentStore for FailingStore {
        async fn get(&self, _path: &DocumentPath) -> Result<Option<Document>, StoreError> {
            Ok(None)
        }

        async fn commit(&self, _batch: WriteBatch) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection reset".to_string()))
        }
    }

    #[tokio::test]
    async fn test_bootstrap_new_user() {
        let store = MemoryStore::with_clock(ticking_clock());
        let snapshot = doc! { "email": "a@b.com" };

        let outcome = bootstrap_user(&store, "u1", Some(&snapshot)).await.unwrap();
        assert_eq!(outcome, BootstrapOutcome::Committed { writes: 4 });

        let t = BsonDateTime::from_millis(T);
        let user = store.get(&user_path("u1")).await.unwrap().unwrap();
        assert_eq!(
            user,
            doc! { "email": "a@b.com", "username": "a@b.com", "updatedAt": t, "createdAt": t }
        );

        let lists = store.list_children(&user_path("u1"), LIST_COLLECTION).await;
        assert_eq!(lists.len(), 3);
        for (id, document) in lists {
            let list = SystemList::ALL.into_iter().find(|l| l.id() == id).unwrap();
            let record: ListRecord = from_document(document).unwrap();
            assert_eq!(
                record,
                ListRecord {
                    name: list.name().to_string(),
                    list_type: "system".to_string(),
                    created_at: Some(t),
                    updated_at: Some(t),
                }
            );
        }
    }

    #[tokio::test]
    async fn test_bootstrap_twice_is_idempotent_except_created_at() {
        let store = MemoryStore::with_clock(ticking_clock());
        let snapshot = doc! { "email": "a@b.com" };

        bootstrap_user(&store, "u1", Some(&snapshot)).await.unwrap();
        bootstrap_user(&store, "u1", Some(&snapshot)).await.unwrap();

        let user: UserRecord = from_document(store.get(&user_path("u1")).await.unwrap().unwrap()).unwrap();
        assert_eq!(user.email, "a@b.com");
        assert_eq!(user.username.as_deref(), Some("a@b.com"));
        // createdAt acompanha o segundo commit
        assert_eq!(user.created_at, Some(BsonDateTime::from_millis(T + 1_000)));
        assert_eq!(user.updated_at, user.created_at);

        let lists = store.list_children(&user_path("u1"), LIST_COLLECTION).await;
        assert_eq!(lists.len(), 3);
        for (_, document) in lists {
            let record: ListRecord = from_document(document).unwrap();
            assert_eq!(record.list_type, SYSTEM_LIST_TYPE);
        }
        // user + 3 listas, sem duplicatas
        assert_eq!(store.len().await, 4);
    }

    #[tokio::test]
    async fn test_bootstrap_preserves_unowned_fields() {
        let store = MemoryStore::with_clock(ticking_clock());
        let favorites = user_path("u1").child(LIST_COLLECTION, "favorites").unwrap();
        store.insert(user_path("u1"), doc! { "email": "a@b.com", "displayName": "Ana" }).await;
        store
            .insert(favorites.clone(), doc! { "name": "Faves", "type": "custom", "items": ["tt0111161"] })
            .await;

        let snapshot = doc! { "email": "a@b.com", "displayName": "Ana" };
        bootstrap_user(&store, "u1", Some(&snapshot)).await.unwrap();

        let user = store.get(&user_path("u1")).await.unwrap().unwrap();
        assert_eq!(user.get_str("displayName").unwrap(), "Ana");
        assert_eq!(user.get_str("username").unwrap(), "a@b.com");

        let list = store.get(&favorites).await.unwrap().unwrap();
        assert_eq!(list.get_str("name").unwrap(), "Favorites");
        assert_eq!(list.get_str("type").unwrap(), "system");
        assert_eq!(list.get_array("items").unwrap(), &vec![Bson::from("tt0111161")]);
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_noop() {
        let store = MemoryStore::new();

        let outcome = bootstrap_user(&store, "u1", None).await.unwrap();

        assert_eq!(outcome, BootstrapOutcome::NoSnapshot);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_missing_or_falsy_email_fails_without_writes() {
        let store = MemoryStore::new();
        let snapshots = [
            doc! {},
            doc! { "email": "" },
            doc! { "email": Bson::Null },
            doc! { "email": false },
            doc! { "email": 0 },
            doc! { "name": "no email" },
        ];

        for snapshot in snapshots {
            let err = bootstrap_user(&store, "u1", Some(&snapshot)).await.unwrap_err();
            assert!(
                matches!(err, BootstrapError::MissingRequiredField { ref uid, field: "email" } if uid == "u1"),
                "unexpected error for {:?}: {}",
                snapshot,
                err
            );
            assert!(!err.is_retryable());
        }

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_non_string_email_is_reasserted_as_is() {
        let store = MemoryStore::new();
        let snapshot = doc! { "email": 42 };

        bootstrap_user(&store, "u1", Some(&snapshot)).await.unwrap();

        let user = store.get(&user_path("u1")).await.unwrap().unwrap();
        assert_eq!(user.get_i32("email").unwrap(), 42);
        assert_eq!(user.get_i32("username").unwrap(), 42);
    }

    #[tokio::test]
    async fn test_commit_failure_is_retryable() {
        let snapshot = doc! { "email": "a@b.com" };

        let err = bootstrap_user(&FailingStore, "u1", Some(&snapshot)).await.unwrap_err();

        assert!(matches!(err, BootstrapError::StoreCommit(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_invalid_uid_is_rejected() {
        let store = MemoryStore::new();
        let snapshot = doc! { "email": "a@b.com" };

        let err = bootstrap_user(&store, "a/b", Some(&snapshot)).await.unwrap_err();

        assert!(matches!(err, BootstrapError::InvalidUid { .. }));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_invocations_converge() {
        let store = Arc::new(MemoryStore::with_clock(ticking_clock()));
        let snapshot = doc! { "email": "a@b.com" };

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let snapshot = snapshot.clone();
                tokio::spawn(async move { bootstrap_user(store.as_ref(), "u1", Some(&snapshot)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.len().await, 4);
        let user = store.get(&user_path("u1")).await.unwrap().unwrap();
        assert_eq!(user.get_str("username").unwrap(), "a@b.com");
    }

    #[test]
    fn test_truthiness() {
        assert!(is_truthy(&Bson::from("x")));
        assert!(is_truthy(&Bson::Int64(-1)));
        assert!(!is_truthy(&Bson::Double(f64::NAN)));
        assert!(!is_truthy(&Bson::Undefined));
    }
}
