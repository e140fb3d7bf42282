use super::*;
use crate::state::test_helpers::test_app_state;
use showsync::timer::TimerState;

fn snapshot(value: &Value) -> TimerSnapshot {
    TimerSnapshot::from_value(value).expect("store rows parse as timer snapshots")
}

#[tokio::test]
async fn load_then_start_produces_running_row() {
    let state = test_app_state();

    let loaded = load_cue(&state, "ev-1", 4, 600, "OPENING").await.expect("load");
    assert_eq!(loaded.kind, DeltaKind::TimerUpdated);
    let row = snapshot(&loaded.data);
    assert_eq!(row.timer_state, TimerState::Loaded);
    assert!(!row.is_running);
    assert_eq!(row.duration_seconds, 600);
    assert_eq!(row.cue_label, "OPENING");

    let started = start(&state, "ev-1", 4).await.expect("start");
    let row = snapshot(&started.data);
    assert!(row.is_running);
    assert!(row.started_at.is_some());
    assert_eq!(snapshot(&active_timer(&state, "ev-1").await), row);
}

#[tokio::test]
async fn start_requires_the_loaded_cue() {
    let state = test_app_state();
    let err = start(&state, "ev-1", 4).await.expect_err("nothing loaded");
    assert_eq!(err.error_code(), "E_CUE_NOT_LOADED");

    load_cue(&state, "ev-1", 4, 600, "OPENING").await.expect("load");
    let err = start(&state, "ev-1", 5).await.expect_err("different cue");
    assert!(matches!(err, TimerStoreError::NotLoaded { item_id: 5, .. }));
}

#[tokio::test]
async fn invalid_input_is_rejected() {
    let state = test_app_state();
    let err = load_cue(&state, "ev-1", 1, 0, "X").await.expect_err("zero duration");
    assert_eq!(err.error_code(), "E_INVALID_DURATION");
    let err = load_cue(&state, " ", 1, 10, "X").await.expect_err("blank event");
    assert_eq!(err.error_code(), "E_MISSING_EVENT");
}

#[tokio::test]
async fn stop_clears_main_and_names_the_item() {
    let state = test_app_state();
    let err = stop(&state, "ev-1").await.expect_err("nothing to stop");
    assert_eq!(err.error_code(), "E_NO_ACTIVE_TIMER");

    load_cue(&state, "ev-1", 4, 600, "OPENING").await.expect("load");
    let stopped = stop(&state, "ev-1").await.expect("stop");
    assert_eq!(stopped.kind, DeltaKind::TimerStopped);
    assert_eq!(stopped.data, json!({"event_id": "ev-1", "item_id": 4}));
    assert_eq!(active_timer(&state, "ev-1").await, Value::Null);
}

#[tokio::test]
async fn cue_change_clears_sub_cues() {
    let state = test_app_state();
    load_cue(&state, "ev-1", 4, 600, "OPENING").await.expect("load");
    start_sub_cue(&state, "ev-1", 41, 30, "VT").await.expect("sub-cue");
    assert_eq!(sub_cue_timers(&state, "ev-1").await.as_array().map(Vec::len), Some(1));

    start(&state, "ev-1", 4).await.expect("start");
    assert_eq!(sub_cue_timers(&state, "ev-1").await, json!([]));
}

#[tokio::test]
async fn reloading_the_same_cue_keeps_sub_cues() {
    let state = test_app_state();
    load_cue(&state, "ev-1", 4, 600, "OPENING").await.expect("load");
    start_sub_cue(&state, "ev-1", 41, 30, "VT").await.expect("sub-cue");

    load_cue(&state, "ev-1", 4, 600, "OPENING").await.expect("reload");
    assert_eq!(sub_cue_timers(&state, "ev-1").await.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn sub_cues_start_running_and_stop_individually_or_all() {
    let state = test_app_state();
    let started = start_sub_cue(&state, "ev-1", 41, 30, "VT").await.expect("sub-cue");
    assert_eq!(started.kind, DeltaKind::SubCueTimerStarted);
    assert!(snapshot(&started.data).is_running);
    start_sub_cue(&state, "ev-1", 42, 45, "GFX").await.expect("sub-cue");

    let stopped = stop_sub_cue(&state, "ev-1", Some(41)).await.expect("stop one");
    assert_eq!(stopped.data["item_id"], 41);
    let rows = sub_cue_timers(&state, "ev-1").await;
    assert_eq!(rows.as_array().map(Vec::len), Some(1));
    assert_eq!(rows[0]["item_id"], 42);

    let err = stop_sub_cue(&state, "ev-1", Some(41)).await.expect_err("already stopped");
    assert_eq!(err.error_code(), "E_SUB_CUE_NOT_FOUND");

    let stopped = stop_sub_cue(&state, "ev-1", None).await.expect("stop all");
    assert_eq!(stopped.data["item_id"], Value::Null);
    assert_eq!(sub_cue_timers(&state, "ev-1").await, json!([]));
}

#[tokio::test]
async fn reset_clears_timers_but_keeps_messages() {
    let state = test_app_state();
    load_cue(&state, "ev-1", 4, 600, "OPENING").await.expect("load");
    start_sub_cue(&state, "ev-1", 41, 30, "VT").await.expect("sub-cue");
    set_message(&state, "ev-1", "HOLD", true).await.expect("message");

    let cleared = reset(&state, "ev-1").await.expect("reset");
    assert_eq!(cleared.kind, DeltaKind::TimersStopped);
    assert_eq!(active_timer(&state, "ev-1").await, Value::Null);
    assert_eq!(sub_cue_timers(&state, "ev-1").await, json!([]));
    assert_eq!(timer_messages(&state, "ev-1").await.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn enabling_a_message_disables_the_others() {
    let state = test_app_state();
    set_message(&state, "ev-1", "HOLD", true).await.expect("first");
    let update = set_message(&state, "ev-1", "WRAP UP", true).await.expect("second");

    assert_eq!(update.kind, DeltaKind::TimerMessageUpdated);
    let enabled: Vec<&str> = update
        .data
        .as_array()
        .expect("message list")
        .iter()
        .filter(|m| m["enabled"] == true)
        .filter_map(|m| m["message"].as_str())
        .collect();
    assert_eq!(enabled, vec!["WRAP UP"]);

    let shown = showsync::timer::normalize::timer_message(&update.data).expect("enabled message");
    assert_eq!(shown.message, "WRAP UP");
    assert_eq!(shown.id, Some(2));
}

#[tokio::test]
async fn disabling_with_empty_text_clears_every_message() {
    let state = test_app_state();
    set_message(&state, "ev-1", "HOLD", true).await.expect("enable");
    let update = set_message(&state, "ev-1", "", false).await.expect("disable all");

    assert!(showsync::timer::normalize::timer_message(&update.data).is_none());
    assert_eq!(timer_messages(&state, "ev-1").await.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn active_timers_array_wraps_the_main_timer() {
    let state = test_app_state();
    assert_eq!(active_timers_array(&state, "ev-1").await, json!([]));

    load_cue(&state, "ev-1", 4, 600, "OPENING").await.expect("load");
    let rows = active_timers_array(&state, "ev-1").await;
    assert_eq!(rows.as_array().map(Vec::len), Some(1));
    assert_eq!(rows[0]["item_id"], 4);
}
