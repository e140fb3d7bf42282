use super::*;
use crate::state::test_helpers::{assert_no_frame, delta_of, recv_frame, seed_client, test_app_state};
use serde_json::json;

#[tokio::test]
async fn join_creates_room_and_last_part_evicts_it() {
    let state = test_app_state();
    let client = Uuid::new_v4();
    let (tx, _rx) = mpsc::channel(4);

    join_event(&state, "ev-1", client, tx).await;
    assert_eq!(client_count(&state, "ev-1").await, 1);

    assert!(part_event(&state, "ev-1", client).await.is_none());
    assert!(state.rooms.read().await.get("ev-1").is_none());
}

#[tokio::test]
async fn broadcast_skips_excluded_client() {
    let state = test_app_state();
    let (a, mut rx_a) = seed_client(&state, "ev-1").await;
    let (_b, mut rx_b) = seed_client(&state, "ev-1").await;

    let frame = Frame::request("scroll:sync", json!({"scrollPosition": 40.0}));
    broadcast(&state, "ev-1", &frame, Some(a)).await;

    assert_eq!(recv_frame(&mut rx_b).await.syscall, "scroll:sync");
    assert_no_frame(&mut rx_a).await;
}

#[tokio::test]
async fn broadcast_stays_inside_the_event() {
    let state = test_app_state();
    let (_a, mut rx_a) = seed_client(&state, "ev-1").await;
    let (_b, mut rx_b) = seed_client(&state, "ev-2").await;

    broadcast_update(&state, "ev-1", DeltaKind::TimerStopped, json!({"event_id": "ev-1"})).await;

    let (kind, _) = delta_of(&recv_frame(&mut rx_a).await);
    assert_eq!(kind, "timerStopped");
    assert_no_frame(&mut rx_b).await;
}

#[tokio::test]
async fn presence_roster_follows_joins_and_parts() {
    let state = test_app_state();
    let (a, _rx_a) = seed_client(&state, "ev-1").await;
    let (b, _rx_b) = seed_client(&state, "ev-1").await;

    let roster = set_presence(&state, "ev-1", a, json!({"userId": "u-a"})).await.expect("joined");
    assert_eq!(roster.len(), 1);
    let roster = set_presence(&state, "ev-1", b, json!({"userId": "u-b"})).await.expect("joined");
    assert_eq!(roster.len(), 2);

    let roster = part_event(&state, "ev-1", a).await.expect("presence changed");
    assert_eq!(roster, vec![json!({"userId": "u-b"})]);
}

#[tokio::test]
async fn part_without_presence_reports_no_change() {
    let state = test_app_state();
    let (a, _rx_a) = seed_client(&state, "ev-1").await;
    let (_b, _rx_b) = seed_client(&state, "ev-1").await;

    assert!(part_event(&state, "ev-1", a).await.is_none());
}

#[tokio::test]
async fn presence_requires_membership() {
    let state = test_app_state();
    let (_a, _rx) = seed_client(&state, "ev-1").await;
    assert!(set_presence(&state, "ev-1", Uuid::new_v4(), json!({"userId": "x"})).await.is_none());
    assert!(set_presence(&state, "ev-9", Uuid::new_v4(), json!({"userId": "x"})).await.is_none());
}

#[tokio::test]
async fn kick_reaches_every_client_with_reason() {
    let state = test_app_state();
    let (_a, mut rx_a) = seed_client(&state, "ev-1").await;
    let (_b, mut rx_b) = seed_client(&state, "ev-1").await;

    assert_eq!(kick(&state, "ev-1", Some("show over")).await, 2);

    for rx in [&mut rx_a, &mut rx_b] {
        let frame = recv_frame(rx).await;
        assert_eq!(frame.syscall, frames::syscall::SESSION_KICK);
        assert_eq!(frame.data["reason"], "show over");
    }
}
