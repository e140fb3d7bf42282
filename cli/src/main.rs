use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use showsync::scroll::{ScrollOutput, ScrollRole};
use showsync::timer::Countdown;
use showsync::wire::PresenceEntry;
use showsync::{
    ConfigError, ConnectionStatus, HttpPersistence, PersistenceError, SessionEvent, SessionHandle, SessionView,
    SyncConfig, TimerCommand, TransportAdapter, WsConnector,
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("persistence: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("health check failed: HTTP {0}")]
    Unhealthy(u16),
    #[error("cannot read {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("gave up reconnecting after {0} attempts")]
    GaveUp(u32),
}

#[derive(Parser, Debug)]
#[command(name = "showsync", about = "Live event sync console client")]
struct Cli {
    #[arg(long, env = "SHOWSYNC_WS_URL")]
    ws_url: Option<String>,

    #[arg(long, env = "SHOWSYNC_API_URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the relay is up.
    Ping,
    /// Join an event and print timers, message and presence as they change.
    Watch(WatchArgs),
    /// Join an event as a viewer and print the smoothed scroll positions.
    Follow(WatchArgs),
    /// Issue a timer command against the persistence API.
    Timer(TimerArgs),
    /// Show where comment lines land after a script edit.
    Remap(RemapArgs),
}

#[derive(Args, Debug)]
struct WatchArgs {
    event_id: String,

    /// Announce presence under this name.
    #[arg(long)]
    name: Option<String>,

    #[arg(long, default_value = "VIEWER")]
    role: String,
}

#[derive(Args, Debug)]
struct TimerArgs {
    #[command(subcommand)]
    command: TimerSubcommand,
}

#[derive(Subcommand, Debug)]
enum TimerSubcommand {
    Load {
        event_id: String,
        item_id: i64,
        #[arg(long)]
        duration: i64,
        #[arg(long, default_value = "")]
        label: String,
    },
    Start {
        event_id: String,
        item_id: i64,
    },
    Stop {
        event_id: String,
    },
    Reset {
        event_id: String,
    },
    SubStart {
        event_id: String,
        item_id: i64,
        #[arg(long)]
        duration: i64,
        #[arg(long, default_value = "")]
        label: String,
    },
    SubStop {
        event_id: String,
        item_id: Option<i64>,
    },
    Message {
        event_id: String,
        message: String,
        #[arg(long, default_value_t = false)]
        disable: bool,
    },
    Kick {
        event_id: String,
        #[arg(long)]
        reason: Option<String>,
    },
}

impl TimerSubcommand {
    fn into_command(self) -> TimerCommand {
        match self {
            Self::Load { event_id, item_id, duration, label } => {
                TimerCommand::LoadCue { event_id, item_id, duration_seconds: duration, cue_label: label }
            }
            Self::Start { event_id, item_id } => TimerCommand::Start { event_id, item_id },
            Self::Stop { event_id } => TimerCommand::Stop { event_id },
            Self::Reset { event_id } => TimerCommand::Reset { event_id },
            Self::SubStart { event_id, item_id, duration, label } => {
                TimerCommand::StartSubCue { event_id, item_id, duration_seconds: duration, cue_label: label }
            }
            Self::SubStop { event_id, item_id } => TimerCommand::StopSubCue { event_id, item_id },
            Self::Message { event_id, message, disable } => {
                TimerCommand::SetMessage { event_id, message, enabled: !disable }
            }
            Self::Kick { event_id, reason } => TimerCommand::Kick { event_id, reason },
        }
    }
}

#[derive(Args, Debug)]
struct RemapArgs {
    old: PathBuf,
    new: PathBuf,

    /// Zero-based line numbers to carry across, comma separated.
    #[arg(long, value_delimiter = ',', required = true)]
    lines: Vec<usize>,
}

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Watch,
    Follow,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = SyncConfig::from_env()?;
    if let Some(url) = cli.ws_url {
        config = config.with_ws_url(url);
    }
    if let Some(url) = cli.api_url {
        config = config.with_api_url(url);
    }

    match cli.command {
        Command::Ping => run_ping(&config).await,
        Command::Watch(args) => run_session(&config, args, Mode::Watch).await,
        Command::Follow(args) => run_session(&config, args, Mode::Follow).await,
        Command::Timer(args) => run_timer(&config, args).await,
        Command::Remap(args) => run_remap(&args),
    }
}

async fn run_ping(config: &SyncConfig) -> Result<(), CliError> {
    let url = format!("{}/healthz", config.api_url.trim_end_matches('/'));
    let response = reqwest::Client::new().get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(CliError::Unhealthy(status.as_u16()));
    }
    println!("ok");
    Ok(())
}

async fn run_timer(config: &SyncConfig, args: TimerArgs) -> Result<(), CliError> {
    let persistence = HttpPersistence::new(&config.api_url, config.http_timeout)?;
    let command = args.command.into_command();
    let response = showsync::Persistence::send(&persistence, &command).await?;
    print_json(&response)
}

fn run_remap(args: &RemapArgs) -> Result<(), CliError> {
    let old_text = read_text(&args.old)?;
    let new_text = read_text(&args.new)?;
    let moved = showsync::remap::remap_lines(&old_text, &new_text, &args.lines);
    for (from, to) in args.lines.iter().zip(moved) {
        println!("{from} -> {to}");
    }
    Ok(())
}

fn read_text(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Read { path: path.display().to_string(), source })
}

// =============================================================================
// LIVE SESSION
// =============================================================================

async fn run_session(config: &SyncConfig, args: WatchArgs, mode: Mode) -> Result<(), CliError> {
    let persistence = Arc::new(HttpPersistence::new(&config.api_url, config.http_timeout)?);
    let transport = TransportAdapter::spawn(Arc::new(WsConnector), config);
    let (session, events) = SessionHandle::spawn(transport, persistence, config);

    session.set_role(ScrollRole::Viewer);
    if let Some(name) = args.name {
        session.set_presence(Some(presence_entry(&name, &args.role)));
    }
    session.connect(&args.event_id);

    let result = print_session(&session, events, mode).await;
    session.shutdown();
    if tokio::time::timeout(SHUTDOWN_GRACE, session.closed()).await.is_err() {
        tracing::warn!("session did not stop in time; leaving without event:leave");
    }
    result
}

async fn print_session(
    session: &SessionHandle,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    mode: Mode,
) -> Result<(), CliError> {
    let mut view = session.view();
    let mut last_line = String::new();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = view.changed(), if mode == Mode::Watch => {
                if changed.is_err() {
                    return Ok(());
                }
                let line = render_view(&view.borrow_and_update());
                if line != last_line {
                    println!("{line}");
                    last_line = line;
                }
            }
            event = events.recv() => {
                let Some(event) = event else { return Ok(()) };
                match event {
                    SessionEvent::Kicked { reason } => {
                        println!("kicked: {}", reason.as_deref().unwrap_or("no reason given"));
                        return Ok(());
                    }
                    SessionEvent::GaveUp { attempts } => return Err(CliError::GaveUp(attempts)),
                    other => {
                        if let Some(line) = render_event(&other, mode) {
                            println!("{line}");
                        }
                    }
                }
            }
            _ = &mut ctrl_c => return Ok(()),
        }
    }
}

fn presence_entry(name: &str, role: &str) -> PresenceEntry {
    PresenceEntry {
        user_id: format!("cli-{}", std::process::id()),
        user_name: name.to_owned(),
        user_email: String::new(),
        user_role: role.to_ascii_uppercase(),
    }
}

// =============================================================================
// RENDERING
// =============================================================================

/// One status line for the watch output.
fn render_view(view: &SessionView) -> String {
    let connection = match &view.connection {
        ConnectionStatus::Disconnected => "offline".to_owned(),
        ConnectionStatus::Connecting { event_id, attempt } => format!("connecting {event_id} #{attempt}"),
        ConnectionStatus::Connected { event_id, .. } if view.resyncing => format!("{event_id} resyncing"),
        ConnectionStatus::Connected { event_id, .. } => event_id.clone(),
    };

    let mut parts = vec![format!("[{connection}]"), render_countdown(&view.main)];
    if !view.sub_cues.is_empty() {
        let subs: Vec<String> = view.sub_cues.iter().map(render_countdown).collect();
        parts.push(format!("sub: {}", subs.join(", ")));
    }
    if let Some(message) = view.message.as_ref().filter(|m| m.enabled) {
        parts.push(format!("msg: {}", message.message));
    }
    if !view.presence.is_empty() {
        parts.push(format!("viewers: {}", view.presence.len()));
    }
    parts.join(" | ")
}

fn render_countdown(countdown: &Countdown) -> String {
    if countdown.item_id.is_none() {
        return "no cue".to_owned();
    }
    let state = if countdown.running { "running" } else { "stopped" };
    format!("{} {} {state}", countdown.cue_label, countdown.display())
}

fn render_event(event: &SessionEvent, mode: Mode) -> Option<String> {
    match (event, mode) {
        (SessionEvent::Scroll(ScrollOutput::FontSize(size)), Mode::Follow) => Some(format!("font {size}")),
        (SessionEvent::Scroll(ScrollOutput::Position(position)), Mode::Follow) => {
            Some(format!("scroll {position:.1}"))
        }
        (SessionEvent::Scroll(_), Mode::Watch) => None,
        (SessionEvent::ScheduleChanged, _) => Some("run of show changed".to_owned()),
        (SessionEvent::ServerError { code, message }, _) => {
            Some(format!("server error {}: {message}", code.as_deref().unwrap_or("-")))
        }
        (SessionEvent::AutoDisconnected, _) => Some("auto-disconnected".to_owned()),
        (SessionEvent::Kicked { .. } | SessionEvent::GaveUp { .. }, _) => None,
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
