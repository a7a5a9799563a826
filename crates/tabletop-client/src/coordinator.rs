//! Optimistic mutations with exact rollback.
//!
//! A mutation edits the cache before the server answers. The edit is a
//! pure function of the entry it replaces, and the entry is captured
//! first, so a failed mutation can put back exactly what was there.
//!
//! ```text
//! begin ──► remote call ──► confirm  (ok, creates only)
//!                      └──► on_error (restore snapshot, Notice)
//!                                  └──► on_settled (invalidate)
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::cache::{remove_by_id, upsert_by_id};
use crate::{CacheEntry, ClientError, QueryCache, QueryKey};

/// A user-visible message about a failed mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub key: QueryKey,
    pub message: String,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// The entry a mutation replaced, exactly as it was.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    key: QueryKey,
    entry: Option<CacheEntry>,
}

impl Snapshot {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// `None` if the key was not cached when the mutation began.
    pub fn entry(&self) -> Option<&CacheEntry> {
        self.entry.as_ref()
    }
}

/// A remote mutation's local side: which key it edits and how.
pub struct Mutation<E> {
    key: QueryKey,
    edit: E,
    placeholder: Option<String>,
    also_invalidate: Vec<QueryKey>,
}

impl<E> Mutation<E>
where
    E: FnOnce(&Value) -> Value,
{
    /// `edit` computes the optimistic data from the current data.
    pub fn new(key: QueryKey, edit: E) -> Self {
        Self {
            key,
            edit,
            placeholder: None,
            also_invalidate: Vec::new(),
        }
    }

    /// Marks this as a create whose optimistic item carries the temporary
    /// id `placeholder`. On success the placeholder is swapped for the
    /// entity the server returned.
    pub fn creating(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    /// Another key to invalidate once the mutation settles.
    pub fn also_invalidate(mut self, key: QueryKey) -> Self {
        self.also_invalidate.push(key);
        self
    }
}

impl Mutation<Box<dyn FnOnce(&Value) -> Value + Send>> {
    /// An optimistic insert of `item` into the list at `key`, where `item`
    /// carries a temporary id.
    pub fn insert(key: QueryKey, item: Value) -> Self {
        let placeholder = item
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let edit: Box<dyn FnOnce(&Value) -> Value + Send> = Box::new(move |list: &Value| {
            let mut list = list.clone();
            upsert_by_id(&mut list, &item);
            list
        });
        Self::new(key, edit).creating(placeholder)
    }
}

/// Runs optimistic mutations against a shared [`QueryCache`].
///
/// The cache lock is taken inside each hook and never held across the
/// remote call, so inbound events keep reconciling while a mutation is in
/// flight.
#[derive(Debug, Clone)]
pub struct MutationCoordinator {
    cache: Arc<Mutex<QueryCache>>,
}

impl MutationCoordinator {
    pub fn new(cache: Arc<Mutex<QueryCache>>) -> Self {
        Self { cache }
    }

    /// Captures the entry at `key`, then replaces its data with
    /// `edit(data)`. An uncached key is captured as absent and not edited.
    pub async fn begin<E>(&self, key: &QueryKey, edit: E) -> Snapshot
    where
        E: FnOnce(&Value) -> Value,
    {
        let mut cache = self.cache.lock().await;
        let entry = cache.get(key).cloned();
        if entry.is_some() {
            cache.update(key, |data| *data = edit(data));
        }
        Snapshot {
            key: key.clone(),
            entry,
        }
    }

    /// Puts the snapshot back and describes the failure.
    pub async fn on_error(&self, snapshot: Snapshot, error: &ClientError) -> Notice {
        let key = snapshot.key;
        tracing::warn!(%key, error = %error, "mutation failed, rolling back");
        self.cache.lock().await.restore(&key, snapshot.entry);
        Notice {
            message: format!("could not save changes to {key}: {error}"),
            key,
        }
    }

    /// Marks `key` and `extra` stale whatever the outcome was. Returns the
    /// keys that were cached and are now stale.
    pub async fn on_settled(&self, key: &QueryKey, extra: &[QueryKey]) -> Vec<QueryKey> {
        let mut cache = self.cache.lock().await;
        std::iter::once(key)
            .chain(extra)
            .filter(|k| cache.invalidate(k))
            .cloned()
            .collect()
    }

    /// Replaces the optimistic item `placeholder` with the server's
    /// `entity`. If a broadcast already inserted the entity it is replaced,
    /// not duplicated.
    pub async fn confirm(&self, key: &QueryKey, placeholder: &str, entity: &Value) -> bool {
        self.cache.lock().await.update(key, |list| {
            remove_by_id(list, placeholder);
            upsert_by_id(list, entity);
        })
    }

    /// Drives one mutation: optimistic edit, `remote`, then confirm or
    /// roll back, then invalidate.
    ///
    /// `remote` resolves to the entity the server stored.
    pub async fn run<E, F>(&self, mutation: Mutation<E>, remote: F) -> Result<Value, ClientError>
    where
        E: FnOnce(&Value) -> Value,
        F: Future<Output = Result<Value, ClientError>>,
    {
        let Mutation {
            key,
            edit,
            placeholder,
            also_invalidate,
        } = mutation;

        let snapshot = self.begin(&key, edit).await;

        let outcome = match remote.await {
            Ok(entity) => {
                if let Some(placeholder) = &placeholder {
                    self.confirm(&key, placeholder, &entity).await;
                }
                Ok(entity)
            }
            Err(e) => Err(ClientError::MutationFailed(self.on_error(snapshot, &e).await)),
        };

        self.on_settled(&key, &also_invalidate).await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tabletop_protocol::MapId;

    fn key() -> QueryKey {
        QueryKey::Tokens(MapId::new("7"))
    }

    fn coordinator_with(data: Value) -> (MutationCoordinator, Arc<Mutex<QueryCache>>) {
        let mut cache = QueryCache::new();
        cache.store(key(), data);
        let cache = Arc::new(Mutex::new(cache));
        (MutationCoordinator::new(Arc::clone(&cache)), cache)
    }

    #[tokio::test]
    async fn test_begin_applies_edit_and_captures_previous_entry() {
        let (coordinator, cache) = coordinator_with(json!([{ "id": "t1", "x": 0 }]));
        let before = cache.lock().await.get(&key()).cloned();

        let snapshot = coordinator
            .begin(&key(), |_| json!([{ "id": "t1", "x": 9 }]))
            .await;

        assert_eq!(snapshot.entry(), before.as_ref());
        let cache = cache.lock().await;
        assert_eq!(cache.data(&key()).unwrap()[0]["x"], 9);
        assert_eq!(cache.get(&key()).unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_on_error_restores_exact_snapshot() {
        let (coordinator, cache) = coordinator_with(json!([{ "id": "t1", "x": 0.5, "hp": null }]));
        let before = cache.lock().await.get(&key()).cloned();

        let snapshot = coordinator.begin(&key(), |_| json!([])).await;
        let notice = coordinator.on_error(snapshot, &ClientError::Disconnected).await;

        let after = cache.lock().await.get(&key()).cloned();
        assert_eq!(after, before);
        assert_eq!(
            serde_json::to_vec(&after.unwrap().data).unwrap(),
            serde_json::to_vec(&before.unwrap().data).unwrap()
        );
        assert_eq!(notice.key, key());
    }

    #[tokio::test]
    async fn test_begin_on_uncached_key_rolls_back_to_absent() {
        let cache = Arc::new(Mutex::new(QueryCache::new()));
        let coordinator = MutationCoordinator::new(Arc::clone(&cache));

        let snapshot = coordinator.begin(&key(), |_| json!([1])).await;
        assert!(snapshot.entry().is_none());
        coordinator.on_error(snapshot, &ClientError::Disconnected).await;

        assert!(!cache.lock().await.contains(&key()));
    }

    #[tokio::test]
    async fn test_on_settled_invalidates_only_cached_keys() {
        let (coordinator, cache) = coordinator_with(json!([]));
        let extra = QueryKey::Map(MapId::new("7"));

        let stale = coordinator.on_settled(&key(), &[extra]).await;

        assert_eq!(stale, vec![key()]);
        assert!(cache.lock().await.is_stale(&key()));
    }

    #[tokio::test]
    async fn test_run_success_swaps_placeholder_for_real_id() {
        let (coordinator, cache) = coordinator_with(json!([]));

        let result = coordinator
            .run(
                Mutation::insert(key(), json!({ "id": "tmp-1", "mapId": "7" })),
                async { Ok(json!({ "id": "tok-9", "mapId": "7" })) },
            )
            .await;

        assert_eq!(result.unwrap()["id"], "tok-9");
        let cache = cache.lock().await;
        assert_eq!(cache.data(&key()).unwrap(), &json!([{ "id": "tok-9", "mapId": "7" }]));
        assert!(cache.is_stale(&key()));
    }

    #[tokio::test]
    async fn test_run_failure_rolls_back_and_reports_notice() {
        let (coordinator, cache) = coordinator_with(json!([{ "id": "t1" }]));
        let before = cache.lock().await.get(&key()).cloned().unwrap();

        let result = coordinator
            .run(
                Mutation::new(key(), |_| json!([])),
                async { Err(ClientError::Disconnected) },
            )
            .await;

        assert!(matches!(result, Err(ClientError::MutationFailed(_))));
        let cache = cache.lock().await;
        let after = cache.get(&key()).unwrap();
        assert_eq!(after.data, before.data);
        assert_eq!(after.version, before.version);
    }
}
