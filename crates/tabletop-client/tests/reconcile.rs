//! End-to-end cache reconciliation scenarios, without a server.

use std::sync::Arc;

use serde_json::{Value, json};
use tabletop_client::{
    CacheReconciler, ClientError, Mutation, MutationCoordinator, QueryCache, QueryKey,
};
use tabletop_protocol::{CampaignId, DomainEvent, EventType, MapId, RoomKey, UserId};
use tokio::sync::Mutex;

// =========================================================================
// Helpers
// =========================================================================

fn ids(cache: &QueryCache, key: &QueryKey) -> Vec<String> {
    cache
        .data(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i["id"].as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

fn campaign(id: &str) -> CampaignId {
    CampaignId::new(id)
}

/// Alice's cache with campaign 42 fully loaded: two maps, each with tokens.
fn loaded_cache() -> QueryCache {
    let mut cache = QueryCache::new();
    cache.store(
        QueryKey::CampaignList,
        json!([{ "id": "41", "name": "Other" }, { "id": "42", "name": "Curse of Strahd" }]),
    );
    cache.store(QueryKey::Campaign(campaign("42")), json!({ "id": "42" }));
    cache.store(
        QueryKey::Memberships(campaign("42")),
        json!([{ "id": "m1", "userId": "alice", "campaignId": "42" }]),
    );
    cache.store(QueryKey::Invites(campaign("42")), json!([]));
    cache.store(
        QueryKey::Maps(campaign("42")),
        json!([{ "id": "7", "campaignId": "42" }]),
    );
    // Map 8 is only cached as an entity.
    cache.store(
        QueryKey::Map(MapId::new("8")),
        json!({ "id": "8", "campaignId": "42" }),
    );
    cache.store(QueryKey::Tokens(MapId::new("7")), json!([{ "id": "t1" }]));
    cache.store(QueryKey::Tokens(MapId::new("8")), json!([{ "id": "t2" }]));
    cache.store(QueryKey::Plugins(campaign("42")), json!([]));
    cache.store(QueryKey::Memberships(campaign("41")), json!([]));
    cache
}

// =========================================================================
// Reorder
// =========================================================================

#[test]
fn test_campaign_reorder_permutes_without_changing_content() {
    let mut cache = QueryCache::new();
    let list = json!([
        { "id": "c1", "name": "One" },
        { "id": "c2", "name": "Two" },
        { "id": "c3", "name": "Three" },
    ]);
    cache.store(QueryKey::CampaignList, list.clone());
    let reconciler = CacheReconciler::new(UserId::new("alice"));

    let out = reconciler.apply(
        &mut cache,
        &DomainEvent::new(
            EventType::CampaignReordered,
            RoomKey::user(&UserId::new("alice")),
            json!({ "ids": ["c2", "c1", "c3"] }),
        ),
    );

    assert_eq!(out.updated, vec![QueryKey::CampaignList]);
    assert!(out.invalidated.is_empty());
    assert_eq!(ids(&cache, &QueryKey::CampaignList), vec!["c2", "c1", "c3"]);

    let data = cache.data(&QueryKey::CampaignList).unwrap();
    let items = list.as_array().unwrap();
    assert_eq!(data[0], items[1]);
    assert_eq!(data[1], items[0]);
    assert_eq!(data[2], items[2]);
}

// =========================================================================
// Losing membership
// =========================================================================

#[test]
fn test_own_membership_deleted_clears_campaign_and_reports_rooms() {
    let mut cache = loaded_cache();
    let reconciler = CacheReconciler::new(UserId::new("alice"));

    let out = reconciler.apply(
        &mut cache,
        &DomainEvent::new(
            EventType::MembershipDeleted,
            vec![
                RoomKey::campaign(&campaign("42")),
                RoomKey::user(&UserId::new("alice")),
            ],
            json!({ "id": "m1", "campaignId": "42", "userId": "alice" }),
        ),
    );

    assert_eq!(ids(&cache, &QueryKey::CampaignList), vec!["41"]);
    for key in [
        QueryKey::Campaign(campaign("42")),
        QueryKey::Memberships(campaign("42")),
        QueryKey::Invites(campaign("42")),
        QueryKey::Maps(campaign("42")),
        QueryKey::Plugins(campaign("42")),
        QueryKey::Map(MapId::new("8")),
        QueryKey::Tokens(MapId::new("7")),
        QueryKey::Tokens(MapId::new("8")),
    ] {
        assert!(!cache.contains(&key), "{key} should be cleared");
        assert!(out.cleared.contains(&key), "{key} should be reported");
    }
    // Cleared, not invalidated.
    assert!(out.invalidated.is_empty());
    assert!(cache.contains(&QueryKey::Memberships(campaign("41"))));

    let mut rooms = out.leave_rooms.clone();
    rooms.sort();
    assert_eq!(
        rooms,
        vec![
            RoomKey::campaign(&campaign("42")),
            RoomKey::map(&MapId::new("7")),
            RoomKey::map(&MapId::new("8")),
        ]
    );
}

// =========================================================================
// Optimistic create racing its own broadcast
// =========================================================================

#[tokio::test]
async fn test_broadcast_before_response_leaves_single_token() {
    let key = QueryKey::Tokens(MapId::new("7"));
    let mut cache = QueryCache::new();
    cache.store(key.clone(), json!([]));
    let cache = Arc::new(Mutex::new(cache));
    let coordinator = MutationCoordinator::new(Arc::clone(&cache));
    let reconciler = CacheReconciler::new(UserId::new("alice"));

    let created = json!({ "id": "tok-9", "mapId": "7", "name": "Goblin" });
    let broadcast = DomainEvent::new(
        EventType::TokenCreated,
        RoomKey::map(&MapId::new("7")),
        created.clone(),
    );

    let remote = {
        let cache = Arc::clone(&cache);
        async move {
            // The event lands while the request is in flight.
            assert_eq!(ids(&*cache.lock().await, &key_of_map_7()), vec!["tmp-1"]);
            reconciler.apply(&mut *cache.lock().await, &broadcast);
            Ok::<_, ClientError>(created)
        }
    };

    coordinator
        .run(
            Mutation::insert(key.clone(), json!({ "id": "tmp-1", "mapId": "7", "name": "Goblin" })),
            remote,
        )
        .await
        .unwrap();

    assert_eq!(ids(&*cache.lock().await, &key), vec!["tok-9"]);
}

#[tokio::test]
async fn test_failed_create_restores_exact_snapshot() {
    let key = key_of_map_7();
    let mut cache = QueryCache::new();
    cache.store(key.clone(), json!([{ "id": "t1", "x": 1.25, "tags": ["a", "b"] }]));
    cache.store(key.clone(), json!([{ "id": "t1", "x": 1.5, "tags": ["a", "b"] }]));
    let before = cache.get(&key).cloned().unwrap();
    let cache = Arc::new(Mutex::new(cache));
    let coordinator = MutationCoordinator::new(Arc::clone(&cache));

    let snapshot = coordinator
        .begin(&key, |list| {
            let mut list = list.clone();
            list.as_array_mut().unwrap().push(json!({ "id": "tmp-1" }));
            list
        })
        .await;
    assert_eq!(ids(&*cache.lock().await, &key), vec!["t1", "tmp-1"]);

    coordinator.on_error(snapshot, &ClientError::Disconnected).await;

    let after = cache.lock().await.get(&key).cloned().unwrap();
    assert_eq!(after, before);
    assert_eq!(after.version, 2);
    assert_eq!(
        serde_json::to_string(&after.data).unwrap(),
        serde_json::to_string(&before.data).unwrap()
    );
}

fn key_of_map_7() -> QueryKey {
    QueryKey::Tokens(MapId::new("7"))
}
