//! Applies inbound domain events to the query cache.

use std::collections::BTreeSet;

use serde_json::Value;
use tabletop_protocol::{CampaignId, DomainEvent, EventType, MapId, RoomKey, UserId};

use crate::cache::{
    entity_id, merge, merge_by_id, remove_by_id, reorder_by_ids, upsert_by_id,
};
use crate::{DispatchTable, ListOp, QueryCache, QueryKey, Strategy};

/// What applying one event did to the cache, and what the caller should
/// do next.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Keys whose data changed in place.
    pub updated: Vec<QueryKey>,
    /// Keys marked stale. The caller refetches them.
    pub invalidated: Vec<QueryKey>,
    /// Keys removed from the cache outright.
    pub cleared: Vec<QueryKey>,
    /// Rooms the user can no longer be in.
    pub leave_rooms: Vec<RoomKey>,
    /// A transient event, passed through untouched.
    pub transient: Option<DomainEvent>,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty()
            && self.invalidated.is_empty()
            && self.cleared.is_empty()
            && self.leave_rooms.is_empty()
            && self.transient.is_none()
    }
}

/// Reconciles domain events into a [`QueryCache`] for one user.
#[derive(Debug, Clone)]
pub struct CacheReconciler {
    me: UserId,
    table: DispatchTable,
}

impl CacheReconciler {
    pub fn new(me: UserId) -> Self {
        Self::with_table(me, DispatchTable::standard())
    }

    pub fn with_table(me: UserId, table: DispatchTable) -> Self {
        Self { me, table }
    }

    /// The user whose cache this is.
    pub fn me(&self) -> &UserId {
        &self.me
    }

    /// Applies `event` to `cache`.
    ///
    /// Keys that are not cached are skipped: there is nothing to reconcile
    /// and the next read fetches them fresh.
    pub fn apply(&self, cache: &mut QueryCache, event: &DomainEvent) -> Reconciliation {
        let mut out = Reconciliation::default();

        if let Some(campaign) = self.lost_campaign(event) {
            tracing::info!(%campaign, event_type = %event.event_type, "campaign access lost");
            clear_campaign(cache, &campaign, &mut out);
            return out;
        }

        let Some(rule) = self.table.rule(event.event_type) else {
            tracing::debug!(event_type = %event.event_type, "no dispatch rule");
            return out;
        };

        let targets = rule.targets(event);
        if targets.is_empty() && rule.strategy != Strategy::Transient {
            tracing::debug!(event_type = %event.event_type, "event payload names no cached key");
        }

        match rule.strategy {
            Strategy::Transient => out.transient = Some(event.clone()),
            Strategy::Invalidate => {
                for key in targets {
                    if cache.invalidate(&key) {
                        out.invalidated.push(key);
                    }
                }
            }
            Strategy::Patch => {
                for key in targets {
                    patch(cache, key, &event.payload, &mut out);
                }
            }
            Strategy::List(op) => {
                for key in targets {
                    list_op(cache, key, op, &event.payload, &mut out);
                }
            }
        }

        if self.gained_or_changed_access(event) && cache.invalidate(&QueryKey::CampaignList) {
            out.invalidated.push(QueryKey::CampaignList);
        }
        if event.event_type == EventType::MapDeleted {
            if let Some(map) = event.field("id").map(MapId::new) {
                clear_map(cache, &map, &mut out);
            }
        }

        out
    }

    /// True when `event` adds or changes this user's own membership. The
    /// campaign list is shaped by the user's memberships and the payload
    /// can't rebuild it.
    fn gained_or_changed_access(&self, event: &DomainEvent) -> bool {
        matches!(
            event.event_type,
            EventType::MembershipCreated | EventType::MembershipUpdated
        ) && event.field("userId") == Some(self.me.as_str())
    }

    /// The campaign `event` revokes this user's access to, if any.
    fn lost_campaign(&self, event: &DomainEvent) -> Option<CampaignId> {
        match event.event_type {
            EventType::MembershipDeleted if event.field("userId") == Some(self.me.as_str()) => {
                event.field("campaignId").map(CampaignId::new)
            }
            EventType::CampaignDeleted => event.field("id").map(CampaignId::new),
            _ => None,
        }
    }
}

fn patch(cache: &mut QueryCache, key: QueryKey, payload: &Value, out: &mut Reconciliation) {
    let Some(data) = cache.data(&key) else {
        return;
    };

    if data.is_array() {
        let mut found = false;
        let changed = cache.update(&key, |list| found = merge_by_id(list, payload));
        if !found {
            // Not in the list: we can't tell where it belongs.
            if cache.invalidate(&key) {
                out.invalidated.push(key);
            }
        } else if changed {
            out.updated.push(key);
        }
    } else if entity_id(data).is_some() && entity_id(data) == entity_id(payload) {
        if cache.update(&key, |entity| merge(entity, payload)) {
            out.updated.push(key);
        }
    }
}

fn list_op(
    cache: &mut QueryCache,
    key: QueryKey,
    op: ListOp,
    payload: &Value,
    out: &mut Reconciliation,
) {
    let Some(data) = cache.data(&key) else {
        return;
    };

    // Entity keys (a single campaign or map) only react to removal.
    if !data.is_array() {
        if op == ListOp::Remove && entity_id(data).is_some() && entity_id(data) == entity_id(payload)
        {
            cache.remove(&key);
            out.cleared.push(key);
        }
        return;
    }

    match op {
        ListOp::Upsert => {
            if cache.update(&key, |list| upsert_by_id(list, payload)) {
                out.updated.push(key);
            }
        }
        ListOp::Remove => {
            let Some(id) = entity_id(payload).map(str::to_owned) else {
                return;
            };
            if cache.update(&key, |list| {
                remove_by_id(list, &id);
            }) {
                out.updated.push(key);
            }
        }
        ListOp::Reorder => {
            let ids: Option<Vec<&str>> = payload
                .get("ids")
                .and_then(Value::as_array)
                .map(|ids| ids.iter().filter_map(Value::as_str).collect());

            let mut applied = false;
            let changed = cache.update(&key, |list| {
                if let Some(ids) = &ids {
                    applied = reorder_by_ids(list, ids);
                }
            });

            if !applied {
                tracing::debug!(%key, "reorder does not match cached list");
                if cache.invalidate(&key) {
                    out.invalidated.push(key);
                }
            } else if changed {
                out.updated.push(key);
            }
        }
    }
}

/// Drops a deleted map's tokens and reports its room. The map's own entry
/// and its place in the campaign's map list go through the normal rule.
fn clear_map(cache: &mut QueryCache, map: &MapId, out: &mut Reconciliation) {
    let tokens = QueryKey::Tokens(map.clone());
    if cache.remove(&tokens).is_some() {
        out.cleared.push(tokens);
    }
    out.leave_rooms.push(RoomKey::map(map));
}

/// Removes everything cached about `campaign` and reports the rooms the
/// user should leave.
fn clear_campaign(cache: &mut QueryCache, campaign: &CampaignId, out: &mut Reconciliation) {
    if cache.update(&QueryKey::CampaignList, |list| {
        remove_by_id(list, campaign.as_str());
    }) {
        out.updated.push(QueryKey::CampaignList);
    }

    let mut map_ids: BTreeSet<MapId> = cache
        .data(&QueryKey::Maps(campaign.clone()))
        .and_then(Value::as_array)
        .map(|maps| maps.iter().filter_map(entity_id).map(MapId::new).collect())
        .unwrap_or_default();
    map_ids.extend(cache.keys().filter_map(|key| match key {
        QueryKey::Map(id)
            if cache
                .data(key)
                .and_then(|m| m.get("campaignId"))
                .and_then(Value::as_str)
                == Some(campaign.as_str()) =>
        {
            Some(id.clone())
        }
        _ => None,
    }));

    let mut keys = vec![
        QueryKey::Campaign(campaign.clone()),
        QueryKey::Memberships(campaign.clone()),
        QueryKey::Invites(campaign.clone()),
        QueryKey::Maps(campaign.clone()),
        QueryKey::Plugins(campaign.clone()),
    ];
    for map in &map_ids {
        keys.push(QueryKey::Map(map.clone()));
        keys.push(QueryKey::Tokens(map.clone()));
    }

    for key in keys {
        if cache.remove(&key).is_some() {
            out.cleared.push(key);
        }
    }

    out.leave_rooms.push(RoomKey::campaign(campaign));
    out.leave_rooms.extend(map_ids.iter().map(RoomKey::map));
}
