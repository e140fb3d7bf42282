use super::*;
use crate::state::test_helpers::{self, assert_no_frame, delta_of, recv_frame};
use serde_json::json;
use tokio::time::{Duration, timeout};

fn request(syscall: &str, data: Value) -> Frame {
    Frame::request(syscall, data)
}

struct Client {
    id: Uuid,
    tx: mpsc::Sender<Frame>,
    rx: mpsc::Receiver<Frame>,
    current: Option<String>,
}

impl Client {
    fn new() -> Self {
        let (tx, rx) = mpsc::channel(64);
        Self { id: Uuid::new_v4(), tx, rx, current: None }
    }

    async fn send(&mut self, state: &AppState, req: Frame) -> Vec<Frame> {
        process_inbound(state, &mut self.current, self.id, &self.tx, req).await
    }

    async fn join(&mut self, state: &AppState, event_id: &str) -> Vec<Frame> {
        self.send(state, request(syscall::EVENT_JOIN, json!({"event_id": event_id}))).await
    }
}

async fn joined(state: &AppState, event_id: &str) -> Client {
    let mut client = Client::new();
    let reply = client.join(state, event_id).await;
    assert_eq!(reply.len(), 1);
    assert_eq!(reply[0].status, Status::Done);
    client
}

fn error_code(frame: &Frame) -> Option<&str> {
    (frame.status == Status::Error)
        .then(|| frame.data.get("code").and_then(Value::as_str))
        .flatten()
}

// =============================================================================
// JOIN / LEAVE
// =============================================================================

#[tokio::test]
async fn join_answers_done_and_registers_the_client() {
    let state = test_helpers::test_app_state();
    let mut client = Client::new();
    let req = request(syscall::EVENT_JOIN, json!({"event_id": "ev-1"}));
    let req_id = req.id.clone();

    let reply = client.send(&state, req).await;

    assert_eq!(reply.len(), 1);
    assert_eq!(reply[0].status, Status::Done);
    assert!(reply[0].answers(&req_id));
    assert_eq!(client.current.as_deref(), Some("ev-1"));
    assert_eq!(room::client_count(&state, "ev-1").await, 1);
}

#[tokio::test]
async fn join_accepts_the_frame_event_id() {
    let state = test_helpers::test_app_state();
    let mut client = Client::new();
    let reply = client
        .send(&state, request(syscall::EVENT_JOIN, json!({})).with_event_id("ev-7"))
        .await;

    assert_eq!(reply[0].status, Status::Done);
    assert_eq!(client.current.as_deref(), Some("ev-7"));
}

#[tokio::test]
async fn join_requires_event_id() {
    let state = test_helpers::test_app_state();
    let mut client = Client::new();
    let reply = client.send(&state, request(syscall::EVENT_JOIN, json!({"event_id": ""}))).await;

    assert_eq!(error_code(&reply[0]), Some("E_MISSING_EVENT"));
    assert!(client.current.is_none());
}

#[tokio::test]
async fn joining_the_same_event_twice_is_idempotent() {
    let state = test_helpers::test_app_state();
    let mut client = joined(&state, "ev-1").await;
    let reply = client.join(&state, "ev-1").await;

    assert_eq!(reply[0].status, Status::Done);
    assert_eq!(room::client_count(&state, "ev-1").await, 1);
}

#[tokio::test]
async fn joining_another_event_leaves_the_first() {
    let state = test_helpers::test_app_state();
    let mut client = joined(&state, "ev-1").await;
    client.join(&state, "ev-2").await;

    assert!(state.rooms.read().await.get("ev-1").is_none());
    assert_eq!(room::client_count(&state, "ev-2").await, 1);
}

#[tokio::test]
async fn leave_parts_and_broadcasts_the_roster() {
    let state = test_helpers::test_app_state();
    let mut a = joined(&state, "ev-1").await;
    let mut b = joined(&state, "ev-1").await;
    a.send(&state, request(syscall::PRESENCE_JOIN, json!({"userId": "u-a"}))).await;
    recv_frame(&mut a.rx).await;
    recv_frame(&mut b.rx).await;

    let reply = a.send(&state, request(syscall::EVENT_LEAVE, json!({}))).await;
    assert_eq!(reply[0].status, Status::Done);
    assert!(a.current.is_none());

    let (kind, roster) = delta_of(&recv_frame(&mut b.rx).await);
    assert_eq!(kind, "presenceUpdated");
    assert_eq!(roster, json!([]));
    assert_no_frame(&mut a.rx).await;
}

// =============================================================================
// ROOM TRAFFIC
// =============================================================================

#[tokio::test]
async fn room_syscalls_require_a_join() {
    let state = test_helpers::test_app_state();
    let mut client = Client::new();

    for syscall in [syscall::SCROLL_UPDATE, syscall::COMMENT_UPDATE, syscall::STATE_SYNC] {
        let reply = client.send(&state, request(syscall, json!({}))).await;
        assert_eq!(error_code(&reply[0]), Some("E_NOT_JOINED"), "{syscall}");
    }
}

#[tokio::test]
async fn scroll_update_reaches_peers_only() {
    let state = test_helpers::test_app_state();
    let mut scroller = joined(&state, "ev-1").await;
    let mut viewer = joined(&state, "ev-1").await;
    let mut elsewhere = joined(&state, "ev-2").await;

    let payload = json!({"scrollPosition": 420.0, "lineNumber": 12, "fontSize": 18.0, "timestamp": 1});
    let reply = scroller.send(&state, request(syscall::SCROLL_UPDATE, payload.clone())).await;
    assert!(reply.is_empty());

    let sync = recv_frame(&mut viewer.rx).await;
    assert_eq!(sync.syscall, syscall::SCROLL_SYNC);
    assert_eq!(sync.data, payload);
    assert_eq!(sync.event_id.as_deref(), Some("ev-1"));
    assert_eq!(sync.from, Some(scroller.id.to_string()));

    assert_no_frame(&mut scroller.rx).await;
    assert_no_frame(&mut elsewhere.rx).await;
}

#[tokio::test]
async fn scroll_update_without_position_is_rejected() {
    let state = test_helpers::test_app_state();
    let mut scroller = joined(&state, "ev-1").await;
    let mut viewer = joined(&state, "ev-1").await;

    let reply = scroller.send(&state, request(syscall::SCROLL_UPDATE, json!({"lineNumber": 3}))).await;
    assert_eq!(error_code(&reply[0]), Some("E_INVALID_PAYLOAD"));
    assert_no_frame(&mut viewer.rx).await;
}

#[tokio::test]
async fn comment_update_reaches_everyone_including_sender() {
    let state = test_helpers::test_app_state();
    let mut author = joined(&state, "ev-1").await;
    let mut peer = joined(&state, "ev-1").await;

    let payload = json!({"action": "add", "comment": {"id": "c-1", "lineNumber": 4, "text": "cue lights"}});
    let reply = author.send(&state, request(syscall::COMMENT_UPDATE, payload.clone())).await;
    assert!(reply.is_empty());

    for rx in [&mut author.rx, &mut peer.rx] {
        let sync = recv_frame(rx).await;
        assert_eq!(sync.syscall, syscall::COMMENT_SYNC);
        assert_eq!(sync.data, payload);
    }
}

#[tokio::test]
async fn presence_join_broadcasts_the_roster() {
    let state = test_helpers::test_app_state();
    let mut a = joined(&state, "ev-1").await;
    let mut b = joined(&state, "ev-1").await;

    let reply = a
        .send(&state, request(syscall::PRESENCE_JOIN, json!({"userId": "u-a", "userName": "Ada"})))
        .await;
    assert_eq!(reply[0].status, Status::Done);

    for rx in [&mut a.rx, &mut b.rx] {
        let (kind, roster) = delta_of(&recv_frame(rx).await);
        assert_eq!(kind, "presenceUpdated");
        assert_eq!(roster, json!([{"userId": "u-a", "userName": "Ada"}]));
    }
}

#[tokio::test]
async fn presence_join_requires_user_id() {
    let state = test_helpers::test_app_state();
    let mut a = joined(&state, "ev-1").await;
    let reply = a.send(&state, request(syscall::PRESENCE_JOIN, json!({"userName": "Ada"}))).await;
    assert_eq!(error_code(&reply[0]), Some("E_INVALID_PAYLOAD"));
}

#[tokio::test]
async fn state_reset_clears_timers_and_broadcasts() {
    let state = test_helpers::test_app_state();
    timers::load_cue(&state, "ev-1", 4, 600, "OPENING").await.expect("load");
    let mut a = joined(&state, "ev-1").await;
    let mut b = joined(&state, "ev-1").await;

    let reply = a.send(&state, request(syscall::STATE_RESET, json!({}))).await;
    assert_eq!(reply[0].status, Status::Done);
    assert_eq!(timers::active_timer(&state, "ev-1").await, Value::Null);

    for rx in [&mut a.rx, &mut b.rx] {
        let (kind, data) = delta_of(&recv_frame(rx).await);
        assert_eq!(kind, "resetAllStates");
        assert_eq!(data["event_id"], "ev-1");
    }
}

#[tokio::test]
async fn state_sync_broadcasts_active_timers_as_array() {
    let state = test_helpers::test_app_state();
    timers::load_cue(&state, "ev-1", 4, 600, "OPENING").await.expect("load");
    let mut a = joined(&state, "ev-1").await;

    a.send(&state, request(syscall::STATE_SYNC, json!({}))).await;

    let (kind, data) = delta_of(&recv_frame(&mut a.rx).await);
    assert_eq!(kind, "activeTimersUpdated");
    let rows = data.as_array().expect("array payload");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["item_id"], 4);
}

// =============================================================================
// MALFORMED INPUT
// =============================================================================

#[tokio::test]
async fn unknown_syscall_returns_error() {
    let state = test_helpers::test_app_state();
    let mut client = joined(&state, "ev-1").await;

    let reply = client.send(&state, request("board:join", json!({}))).await;
    assert_eq!(error_code(&reply[0]), Some("E_UNKNOWN_SYSCALL"));
    let reply = client.send(&state, request("scroll:jump", json!({}))).await;
    assert_eq!(error_code(&reply[0]), Some("E_UNKNOWN_SYSCALL"));
}

#[tokio::test]
async fn undecodable_bytes_return_gateway_error() {
    let state = test_helpers::test_app_state();
    let mut client = Client::new();

    let reply = process_inbound_bytes(&state, &mut client.current, client.id, &client.tx, &[0xff, 0xff, 0xff]).await;
    assert_eq!(reply.len(), 1);
    assert_eq!(reply[0].syscall, syscall::GATEWAY_ERROR);
    assert_eq!(error_code(&reply[0]), Some("E_DECODE"));
}

#[tokio::test]
async fn encoded_join_is_decoded_and_dispatched() {
    let state = test_helpers::test_app_state();
    let mut client = Client::new();
    let bytes = frames::encode_frame(&request(syscall::EVENT_JOIN, json!({"event_id": "ev-1"})));

    let reply = process_inbound_bytes(&state, &mut client.current, client.id, &client.tx, &bytes).await;
    assert_eq!(reply[0].status, Status::Done);
    assert_eq!(client.current.as_deref(), Some("ev-1"));
}

#[tokio::test]
async fn non_request_frames_are_ignored() {
    let state = test_helpers::test_app_state();
    let mut client = Client::new();
    let stray = request(syscall::EVENT_JOIN, json!({"event_id": "ev-1"})).done();

    assert!(client.send(&state, stray).await.is_empty());
    assert!(client.current.is_none());
}

// =============================================================================
// SOCKET
// =============================================================================

mod socket {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    type Ws = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

    async fn serve(state: AppState) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, crate::routes::app(state)).await;
        });
        format!("ws://{addr}/api/ws")
    }

    async fn next_frame(ws: &mut Ws) -> Option<Frame> {
        loop {
            let msg = timeout(Duration::from_secs(2), ws.next()).await.expect("socket read timed out")?;
            match msg.ok()? {
                WsMessage::Binary(bytes) => return frames::decode_frame(&bytes).ok(),
                WsMessage::Close(_) => return None,
                _ => {}
            }
        }
    }

    async fn send(ws: &mut Ws, frame: &Frame) {
        ws.send(WsMessage::Binary(frames::encode_frame(frame).into())).await.expect("socket send");
    }

    async fn connect_and_join(url: &str, event_id: &str) -> Ws {
        let (mut ws, _) = tokio_tungstenite::connect_async(url).await.expect("connect");
        let welcome = next_frame(&mut ws).await.expect("welcome");
        assert_eq!(welcome.syscall, syscall::SESSION_CONNECTED);
        assert!(welcome.data["server_time"].as_i64().is_some_and(|t| t > 0));

        let join = request(syscall::EVENT_JOIN, json!({"event_id": event_id}));
        send(&mut ws, &join).await;
        let ack = next_frame(&mut ws).await.expect("join ack");
        assert!(ack.answers(&join.id));
        assert_eq!(ack.status, Status::Done);
        ws
    }

    #[tokio::test]
    async fn scroll_travels_between_sockets_and_kick_closes_them() {
        let state = test_helpers::test_app_state();
        let url = serve(state.clone()).await;

        let mut scroller = connect_and_join(&url, "ev-1").await;
        let mut viewer = connect_and_join(&url, "ev-1").await;

        send(&mut scroller, &request(syscall::SCROLL_UPDATE, json!({"scrollPosition": 96.0, "lineNumber": 3}))).await;
        let sync = next_frame(&mut viewer).await.expect("scroll sync");
        assert_eq!(sync.syscall, syscall::SCROLL_SYNC);
        assert_eq!(sync.data["lineNumber"], 3);

        assert_eq!(room::kick(&state, "ev-1", Some("wrap")).await, 2);
        for ws in [&mut scroller, &mut viewer] {
            let kick = next_frame(ws).await.expect("kick frame");
            assert_eq!(kick.syscall, syscall::SESSION_KICK);
            assert!(next_frame(ws).await.is_none());
        }
    }

    #[tokio::test]
    async fn script_documents_round_trip_over_http() {
        use showsync::comments::{Comment, CommentType};
        use showsync::{HttpPersistence, Persistence, ScriptDocument};

        let url = serve(test_helpers::test_app_state()).await;
        let base = url.replace("ws://", "http://").replace("/api/ws", "");
        let client = HttpPersistence::new(&base, Duration::from_secs(2)).expect("client");

        assert_eq!(client.load_script("ev-1").await.expect("load"), None);

        let document = ScriptDocument {
            event_id: "ev-1".into(),
            script_text: "INTRO\nWELCOME".into(),
            comments: vec![Comment::new(1, "mic check", "SM", CommentType::Audio).with_id("c-1")],
        };
        client.save_script(&document).await.expect("save");

        let loaded = client.load_script("ev-1").await.expect("load").expect("saved document");
        assert_eq!(loaded.script_text, "INTRO\nWELCOME");
        assert_eq!(loaded.comments.len(), 1);
        assert_eq!(loaded.comments[0].line_number, 1);
    }
}
