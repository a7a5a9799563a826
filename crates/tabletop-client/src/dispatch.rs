//! The event dispatch table.
//!
//! One entry per [`EventType`] says how the event changes the cache
//! ([`Strategy`]) and which cached keys it touches. Adding an event type
//! means adding one entry here; the reconciler has no per-type branches
//! beyond the ones the strategies need.

use std::collections::HashMap;

use tabletop_protocol::{CampaignId, DomainEvent, EventType, MapId};

use crate::QueryKey;

/// A change to a cached collection, by entity id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOp {
    /// Insert the payload entity, or replace the item with its id.
    Upsert,
    /// Remove the item with the payload's id.
    Remove,
    /// Permute the collection into the order of the payload's `ids`.
    Reorder,
}

/// How an event is reconciled into the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// The payload carries the changed fields; merge them by id.
    Patch,
    List(ListOp),
    /// The payload can't rebuild the cached shape; mark stale and refetch.
    Invalidate,
    /// Never touches the cache. Handed back to the caller as is.
    Transient,
}

type Targets = fn(&DomainEvent) -> Vec<QueryKey>;

/// One dispatch table entry.
#[derive(Clone, Copy)]
pub struct Rule {
    pub strategy: Strategy,
    targets: Targets,
}

impl Rule {
    pub fn new(strategy: Strategy, targets: Targets) -> Self {
        Self { strategy, targets }
    }

    /// The cached keys `event` touches. Empty when the payload lacks the
    /// ids the keys are built from.
    pub fn targets(&self, event: &DomainEvent) -> Vec<QueryKey> {
        (self.targets)(event)
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

/// Maps every event type to its [`Rule`].
#[derive(Debug, Clone)]
pub struct DispatchTable {
    rules: HashMap<EventType, Rule>,
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl DispatchTable {
    /// The rules for the full event vocabulary.
    pub fn standard() -> Self {
        use EventType::*;
        use ListOp::*;
        use Strategy::*;

        let entries: [(EventType, Strategy, Targets); 24] = [
            (CampaignCreated, List(Upsert), campaign_list),
            (CampaignUpdated, Patch, campaign_and_list),
            (CampaignDeleted, List(Remove), campaign_and_list),
            (CampaignReordered, List(Reorder), campaign_list),
            (MembershipCreated, List(Upsert), memberships),
            (MembershipUpdated, Patch, memberships),
            (MembershipDeleted, List(Remove), memberships),
            (InviteCreated, List(Upsert), invites),
            (InviteUpdated, Patch, invites),
            (InviteDeleted, List(Remove), invites),
            (MapCreated, List(Upsert), maps),
            (MapUpdated, Patch, maps_and_map),
            (MapDeleted, List(Remove), maps_and_map),
            (MapReordered, List(Reorder), maps),
            (TokenCreated, List(Upsert), tokens),
            (TokenUpdated, Patch, tokens),
            (TokenDeleted, List(Remove), tokens),
            // Plugin config is computed server-side, so payloads are partial.
            (PluginCreated, Invalidate, plugins),
            (PluginUpdated, Invalidate, plugins),
            (PluginDeleted, Invalidate, plugins),
            (NotificationCreated, List(Upsert), notifications),
            (NotificationUpdated, Patch, notifications),
            (NotificationDeleted, List(Remove), notifications),
            (MapPing, Transient, nothing),
        ];

        let rules = entries
            .into_iter()
            .map(|(event_type, strategy, targets)| (event_type, Rule::new(strategy, targets)))
            .collect();
        Self { rules }
    }

    /// Replaces the rule for one event type.
    pub fn with_rule(mut self, event_type: EventType, rule: Rule) -> Self {
        self.rules.insert(event_type, rule);
        self
    }

    pub fn rule(&self, event_type: EventType) -> Option<&Rule> {
        self.rules.get(&event_type)
    }

    pub fn strategy(&self, event_type: EventType) -> Option<Strategy> {
        self.rule(event_type).map(|r| r.strategy)
    }
}

// =========================================================================
// Target extractors
// =========================================================================

fn campaign_id(event: &DomainEvent) -> Option<CampaignId> {
    event.field("campaignId").map(CampaignId::new)
}

fn nothing(_: &DomainEvent) -> Vec<QueryKey> {
    Vec::new()
}

fn campaign_list(_: &DomainEvent) -> Vec<QueryKey> {
    vec![QueryKey::CampaignList]
}

fn campaign_and_list(event: &DomainEvent) -> Vec<QueryKey> {
    let mut keys = vec![QueryKey::CampaignList];
    keys.extend(event.field("id").map(|id| QueryKey::Campaign(CampaignId::new(id))));
    keys
}

fn memberships(event: &DomainEvent) -> Vec<QueryKey> {
    campaign_id(event).map(QueryKey::Memberships).into_iter().collect()
}

fn invites(event: &DomainEvent) -> Vec<QueryKey> {
    campaign_id(event).map(QueryKey::Invites).into_iter().collect()
}

fn plugins(event: &DomainEvent) -> Vec<QueryKey> {
    campaign_id(event).map(QueryKey::Plugins).into_iter().collect()
}

fn maps(event: &DomainEvent) -> Vec<QueryKey> {
    campaign_id(event).map(QueryKey::Maps).into_iter().collect()
}

fn maps_and_map(event: &DomainEvent) -> Vec<QueryKey> {
    let mut keys = maps(event);
    keys.extend(event.field("id").map(|id| QueryKey::Map(MapId::new(id))));
    keys
}

fn tokens(event: &DomainEvent) -> Vec<QueryKey> {
    event
        .field("mapId")
        .map(|id| QueryKey::Tokens(MapId::new(id)))
        .into_iter()
        .collect()
}

fn notifications(_: &DomainEvent) -> Vec<QueryKey> {
    vec![QueryKey::Notifications]
}
