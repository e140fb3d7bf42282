use super::*;
use showsync::timer::TimerMessage;

fn countdown(item_id: Option<i64>, label: &str, remaining: i64, running: bool) -> Countdown {
    Countdown {
        item_id,
        cue_label: label.into(),
        duration_seconds: 600,
        elapsed_seconds: 600 - remaining,
        remaining_seconds: remaining,
        running,
    }
}

#[test]
fn url_flags_are_optional() {
    let cli = Cli::try_parse_from(["showsync", "ping"]).expect("parse");
    assert!(matches!(cli.command, Command::Ping));

    let cli = Cli::try_parse_from(["showsync", "--ws-url", "ws://relay:9/api/ws", "watch", "ev-1", "--name", "Sam"])
        .expect("parse");
    assert_eq!(cli.ws_url.as_deref(), Some("ws://relay:9/api/ws"));
    let Command::Watch(args) = cli.command else { panic!("expected watch") };
    assert_eq!(args.event_id, "ev-1");
    assert_eq!(args.name.as_deref(), Some("Sam"));
    assert_eq!(args.role, "VIEWER");
}

#[test]
fn timer_subcommands_build_commands() {
    let cli = Cli::try_parse_from([
        "showsync", "timer", "load", "ev-1", "4", "--duration", "600", "--label", "OPENING",
    ])
    .expect("parse");
    let Command::Timer(args) = cli.command else { panic!("expected timer") };
    assert_eq!(
        args.command.into_command(),
        TimerCommand::LoadCue {
            event_id: "ev-1".into(),
            item_id: 4,
            duration_seconds: 600,
            cue_label: "OPENING".into(),
        }
    );

    let cli = Cli::try_parse_from(["showsync", "timer", "message", "ev-1", "HOLD", "--disable"]).expect("parse");
    let Command::Timer(args) = cli.command else { panic!("expected timer") };
    assert_eq!(
        args.command.into_command(),
        TimerCommand::SetMessage { event_id: "ev-1".into(), message: "HOLD".into(), enabled: false }
    );

    let cli = Cli::try_parse_from(["showsync", "timer", "sub-stop", "ev-1"]).expect("parse");
    let Command::Timer(args) = cli.command else { panic!("expected timer") };
    assert_eq!(args.command.into_command(), TimerCommand::StopSubCue { event_id: "ev-1".into(), item_id: None });
}

#[test]
fn load_requires_a_duration() {
    assert!(Cli::try_parse_from(["showsync", "timer", "load", "ev-1", "4"]).is_err());
}

#[test]
fn remap_lines_split_on_commas() {
    let cli = Cli::try_parse_from(["showsync", "remap", "a.txt", "b.txt", "--lines", "2,5,9"]).expect("parse");
    let Command::Remap(args) = cli.command else { panic!("expected remap") };
    assert_eq!(args.lines, vec![2, 5, 9]);
    assert!(Cli::try_parse_from(["showsync", "remap", "a.txt", "b.txt"]).is_err());
}

#[test]
fn view_line_summarizes_the_session() {
    let mut view = SessionView::default();
    assert_eq!(render_view(&view), "[offline] | no cue");

    view.connection = ConnectionStatus::Connected { event_id: "ev-1".into(), generation: 1 };
    view.main = countdown(Some(4), "OPENING", 595, true);
    view.sub_cues = vec![countdown(Some(41), "VT", 20, true)];
    view.message = Some(TimerMessage { id: Some(1), event_id: "ev-1".into(), message: "HOLD".into(), enabled: true });
    assert_eq!(render_view(&view), "[ev-1] | OPENING 09:55 running | sub: VT 00:20 running | msg: HOLD");

    view.resyncing = true;
    view.message.as_mut().expect("message").enabled = false;
    view.sub_cues.clear();
    assert_eq!(render_view(&view), "[ev-1 resyncing] | OPENING 09:55 running");
}

#[test]
fn scroll_events_only_print_when_following() {
    let event = SessionEvent::Scroll(ScrollOutput::Position(420.0));
    assert_eq!(render_event(&event, Mode::Follow).as_deref(), Some("scroll 420.0"));
    assert_eq!(render_event(&event, Mode::Watch), None);

    let event = SessionEvent::ServerError { code: Some("E_NOT_JOINED".into()), message: "join first".into() };
    assert_eq!(render_event(&event, Mode::Watch).as_deref(), Some("server error E_NOT_JOINED: join first"));
}

#[test]
fn presence_role_is_uppercased() {
    let entry = presence_entry("Sam", "operator");
    assert_eq!(entry.user_name, "Sam");
    assert_eq!(entry.user_role, "OPERATOR");
    assert!(entry.user_id.starts_with("cli-"));
}
