use super::*;
use serde_json::json;

#[test]
fn event_room_new_is_empty() {
    let room = EventRoom::new();
    assert!(room.clients.is_empty());
    assert!(room.presence.is_empty());
    assert!(room.roster().is_empty());
}

#[test]
fn roster_is_ordered_by_user_id() {
    let mut room = EventRoom::default();
    room.presence.insert(Uuid::new_v4(), json!({"userId": "u-2", "userName": "Bea"}));
    room.presence.insert(Uuid::new_v4(), json!({"userId": "u-1", "userName": "Al"}));

    let roster = room.roster();
    assert_eq!(roster[0]["userId"], "u-1");
    assert_eq!(roster[1]["userId"], "u-2");
}

#[tokio::test]
async fn app_state_clones_share_rooms() {
    let state = test_helpers::test_app_state();
    let clone = state.clone();
    let (_client, _rx) = test_helpers::seed_client(&clone, "ev-1").await;

    assert_eq!(state.rooms.read().await.get("ev-1").map(|r| r.clients.len()), Some(1));
}
