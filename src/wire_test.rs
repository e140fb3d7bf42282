use super::*;
use serde_json::json;

#[test]
fn update_envelope_becomes_delta() {
    let frame = Frame::update("ev-1", DeltaKind::TimerUpdated, json!({"item_id": 3}));
    let Some(Inbound::Delta(delta)) = parse_inbound(&frame) else {
        panic!("expected a delta");
    };
    assert_eq!(delta.kind, DeltaKind::TimerUpdated);
    assert_eq!(delta.data["item_id"], 3);
}

#[test]
fn unknown_update_type_is_ignored() {
    let frame = Frame::request(syscall::UPDATE, json!({"type": "overtimeUpdate", "data": {}}));
    assert_eq!(parse_inbound(&frame), None);
    let untyped = Frame::request(syscall::UPDATE, json!({"data": {}}));
    assert_eq!(parse_inbound(&untyped), None);
}

#[test]
fn presence_update_parses_entries_and_skips_bad_rows() {
    let frame = Frame::update(
        "ev-1",
        DeltaKind::PresenceUpdated,
        json!([
            {"userId": "u1", "userName": "Ana", "userEmail": "ana@example.com", "userRole": "OPERATOR"},
            {"userName": "no id"},
            {"userId": "u2"}
        ]),
    );
    let Some(Inbound::Presence(entries)) = parse_inbound(&frame) else {
        panic!("expected presence");
    };
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].user_role, "VIEWER");
}

#[test]
fn scroll_sync_is_typed() {
    let frame = Frame::request(
        syscall::SCROLL_SYNC,
        json!({"scrollPosition": 40.5, "lineNumber": 2, "fontSize": 16, "timestamp": 5}),
    );
    let Some(Inbound::Scroll(msg)) = parse_inbound(&frame) else {
        panic!("expected scroll");
    };
    assert!((msg.scroll_position - 40.5).abs() < f64::EPSILON);
}

#[test]
fn malformed_scroll_is_dropped() {
    let frame = Frame::request(syscall::SCROLL_SYNC, json!({"lineNumber": "x"}));
    assert_eq!(parse_inbound(&frame), None);
}

#[test]
fn comment_sync_is_typed() {
    let frame = Frame::request(syscall::COMMENT_SYNC, json!({"action": "delete", "commentId": "c1"}));
    assert!(matches!(parse_inbound(&frame), Some(Inbound::Comment(_))));
}

#[test]
fn error_frames_surface_code_and_message() {
    let req = Frame::request(syscall::SCROLL_UPDATE, json!({}));
    let err = req.error("E_NOT_JOINED", "join an event first");
    assert_eq!(
        parse_inbound(&err),
        Some(Inbound::ServerError { code: Some("E_NOT_JOINED".into()), message: "join an event first".into() })
    );
    let gateway = Frame::request(syscall::GATEWAY_ERROR, json!({"message": "invalid frame"}));
    assert!(matches!(parse_inbound(&gateway), Some(Inbound::ServerError { code: None, .. })));
}

#[test]
fn done_replies_are_not_inbound_events() {
    let req = Frame::request(syscall::STATE_SYNC, json!({}));
    assert_eq!(parse_inbound(&req.done()), None);
}

#[test]
fn server_time_accepts_millis_and_rfc3339() {
    assert_eq!(server_time_ms(&json!({"server_time": 1_772_359_200_000_i64})), Some(1_772_359_200_000));
    assert_eq!(server_time_ms(&json!({"serverTime": "2026-03-01T10:00:00Z"})), Some(1_772_359_200_000));
    assert_eq!(server_time_ms(&json!({})), None);
}
