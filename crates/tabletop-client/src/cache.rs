//! The client-side query cache.
//!
//! Every server collection or entity the application reads is cached under
//! a [`QueryKey`]. Only the reconciler, the mutation coordinator and the
//! fetch path write entries; everyone else goes through the read API.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use tabletop_protocol::{CampaignId, MapId};

/// Identifies one cached API response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryKey {
    /// The current user's campaigns, in display order.
    CampaignList,
    Campaign(CampaignId),
    Memberships(CampaignId),
    Invites(CampaignId),
    /// A campaign's maps, in display order.
    Maps(CampaignId),
    Map(MapId),
    Tokens(MapId),
    Plugins(CampaignId),
    Notifications,
}

impl QueryKey {
    /// The campaign this key is scoped to, when the key itself names one.
    pub fn campaign(&self) -> Option<&CampaignId> {
        match self {
            QueryKey::Campaign(id)
            | QueryKey::Memberships(id)
            | QueryKey::Invites(id)
            | QueryKey::Maps(id)
            | QueryKey::Plugins(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKey::CampaignList => f.write_str("campaigns"),
            QueryKey::Campaign(id) => write!(f, "campaigns/{id}"),
            QueryKey::Memberships(id) => write!(f, "campaigns/{id}/memberships"),
            QueryKey::Invites(id) => write!(f, "campaigns/{id}/invites"),
            QueryKey::Maps(id) => write!(f, "campaigns/{id}/maps"),
            QueryKey::Map(id) => write!(f, "maps/{id}"),
            QueryKey::Tokens(id) => write!(f, "maps/{id}/tokens"),
            QueryKey::Plugins(id) => write!(f, "campaigns/{id}/plugins"),
            QueryKey::Notifications => f.write_str("notifications"),
        }
    }
}

/// One cached response.
///
/// `version` increases on every write to the key, so two entries with the
/// same key and version hold the same data.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: QueryKey,
    pub data: Value,
    pub version: u64,
    /// Set when the entry is known to be out of date and should be refetched.
    pub stale: bool,
}

/// Cached API responses keyed by [`QueryKey`].
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: BTreeMap<QueryKey, CacheEntry>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    // =====================================================================
    // Read API
    // =====================================================================

    pub fn get(&self, key: &QueryKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn data(&self, key: &QueryKey) -> Option<&Value> {
        self.entries.get(key).map(|e| &e.data)
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.entries.get(key).is_some_and(|e| e.stale)
    }

    pub fn keys(&self) -> impl Iterator<Item = &QueryKey> {
        self.entries.keys()
    }

    /// Keys currently marked stale.
    pub fn stale_keys(&self) -> Vec<QueryKey> {
        self.entries
            .values()
            .filter(|e| e.stale)
            .map(|e| e.key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // =====================================================================
    // Write API
    // =====================================================================

    /// Records a fresh server response for `key`.
    pub fn store(&mut self, key: QueryKey, data: Value) {
        self.write(key, data);
    }

    /// Replaces the data of `key` and bumps its version. Clears `stale`.
    pub(crate) fn write(&mut self, key: QueryKey, data: Value) {
        let version = self.entries.get(&key).map_or(1, |e| e.version + 1);
        self.entries.insert(
            key.clone(),
            CacheEntry {
                key,
                data,
                version,
                stale: false,
            },
        );
    }

    /// Rewrites the data of an existing entry in place. Returns `false`
    /// when the key is not cached or `edit` left the data unchanged.
    pub(crate) fn update(&mut self, key: &QueryKey, edit: impl FnOnce(&mut Value)) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        let before = entry.data.clone();
        edit(&mut entry.data);
        if entry.data == before {
            return false;
        }
        entry.version += 1;
        true
    }

    /// Puts a captured entry back exactly as it was, or removes the key if
    /// it was absent when captured.
    pub(crate) fn restore(&mut self, key: &QueryKey, entry: Option<CacheEntry>) {
        match entry {
            Some(entry) => {
                self.entries.insert(key.clone(), entry);
            }
            None => {
                self.entries.remove(key);
            }
        }
    }

    /// Marks `key` stale. Returns `false` if it is not cached.
    pub(crate) fn invalidate(&mut self, key: &QueryKey) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.stale = true;
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove(&mut self, key: &QueryKey) -> Option<CacheEntry> {
        self.entries.remove(key)
    }
}

// =========================================================================
// Collection helpers
// =========================================================================

/// The `id` field of a cached entity.
pub(crate) fn entity_id(value: &Value) -> Option<&str> {
    value.get("id").and_then(Value::as_str)
}

/// Replaces the item with the same id, or appends it.
pub(crate) fn upsert_by_id(list: &mut Value, item: &Value) {
    let (Some(items), Some(id)) = (list.as_array_mut(), entity_id(item)) else {
        return;
    };
    match items.iter_mut().find(|i| entity_id(i) == Some(id)) {
        Some(existing) => *existing = item.clone(),
        None => items.push(item.clone()),
    }
}

/// Removes every item with `id`. Returns whether anything was removed.
pub(crate) fn remove_by_id(list: &mut Value, id: &str) -> bool {
    let Some(items) = list.as_array_mut() else {
        return false;
    };
    let before = items.len();
    items.retain(|i| entity_id(i) != Some(id));
    items.len() != before
}

/// Shallow-merges `patch` into the item with the same id. Returns `false`
/// when no such item exists.
pub(crate) fn merge_by_id(list: &mut Value, patch: &Value) -> bool {
    let (Some(items), Some(id)) = (list.as_array_mut(), entity_id(patch)) else {
        return false;
    };
    match items.iter_mut().find(|i| entity_id(i) == Some(id)) {
        Some(existing) => {
            merge(existing, patch);
            true
        }
        None => false,
    }
}

/// Shallow-merges the fields of `patch` into `target`.
pub(crate) fn merge(target: &mut Value, patch: &Value) {
    match (target.as_object_mut(), patch.as_object()) {
        (Some(target), Some(patch)) => {
            for (k, v) in patch {
                target.insert(k.clone(), v.clone());
            }
        }
        _ => *target = patch.clone(),
    }
}

/// Permutes a list into the order of `ids`.
///
/// Returns `false`, leaving the list untouched, when `ids` is not exactly
/// the set of ids in the list.
pub(crate) fn reorder_by_ids(list: &mut Value, ids: &[&str]) -> bool {
    let Some(items) = list.as_array_mut() else {
        return false;
    };
    if items.len() != ids.len() {
        return false;
    }
    let mut reordered = Vec::with_capacity(items.len());
    for id in ids {
        match items.iter().find(|i| entity_id(i) == Some(id)) {
            Some(item) => reordered.push(item.clone()),
            None => return false,
        }
    }
    let mut seen: Vec<&str> = ids.to_vec();
    seen.sort_unstable();
    seen.dedup();
    if seen.len() != ids.len() {
        return false;
    }
    *items = reordered;
    true
}
