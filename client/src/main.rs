mod constants;
mod drift;
mod error;
mod guard;
mod playback;
mod player;
mod protocol;
mod session;
mod sync;
mod throttle;
mod video;

use anyhow::Result;
use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::sleep;

use constants::{DEFAULT_WS_URL, SERVER_URL_ENV, VERSION};
use error::SyncError;
use playback::{Phase, PlaybackSession};
use player::SimulatedPlayer;
use protocol::{Intent, Message};
use session::SessionBinder;
use sync::SyncClient;
use video::parse_video_ref;

/// Interval of the progress poll that keeps the local position fresh
const PROGRESS_TICK: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lockstep_client=debug,info".into()),
        )
        .init();

    let server_url = env::var(SERVER_URL_ENV).unwrap_or_else(|_| DEFAULT_WS_URL.to_string());

    let sync = Arc::new(SyncClient::new());
    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel::<Message>();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    tokio::spawn(run_connection_loop(
        Arc::clone(&sync),
        server_url.clone(),
        inbound_tx,
    ));

    let mut binder = SessionBinder::new(PlaybackSession::new(SimulatedPlayer::new()), outbound_tx);

    println!("Lockstep client v{VERSION}, syncing against {server_url}");
    println!("Type 'help' for commands.");

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut progress = tokio::time::interval(PROGRESS_TICK);

    loop {
        tokio::select! {
            Some(msg) = inbound_rx.recv() => {
                let now = Instant::now();
                report(binder.handle_server_message(msg, now));
                report(binder.pump_surface(now));
            }
            Some(msg) = outbound_rx.recv() => {
                if let Err(e) = sync.send_message(&msg) {
                    tracing::warn!("{}", e);
                }
            }
            _ = progress.tick() => {
                binder.poll_progress();
                report(binder.pump_surface(Instant::now()));
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(input)) => {
                        if !dispatch_command(&mut binder, &sync, &input) {
                            break;
                        }
                        report(binder.pump_surface(Instant::now()));
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!("Failed to read input: {}", e);
                        break;
                    }
                }
            }
        }
    }

    binder.leave();
    Ok(())
}

/// Connect to the sync server, handing inbound messages to the session loop;
/// retry with a capped linear backoff whenever the socket drops.
async fn run_connection_loop(
    sync: Arc<SyncClient>,
    server_url: String,
    inbound_tx: mpsc::UnboundedSender<Message>,
) {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let tx = inbound_tx.clone();
        match sync
            .connect(&server_url, move |msg| {
                let _ = tx.send(msg);
            })
            .await
        {
            Ok(disconnect_rx) => {
                tracing::info!("Connected to sync server at {}", server_url);
                sync.mark_connected(&server_url);
                attempt = 0;

                let _ = disconnect_rx.await;
                sync.mark_disconnected();
                tracing::warn!("Disconnected from sync server");
            }
            Err(e) => {
                tracing::warn!("Failed to connect to {}: {}", server_url, e);
            }
        }

        let capped_attempt = attempt.clamp(1, 6);
        sleep(Duration::from_secs(5 * capped_attempt as u64)).await;
    }
}

/// Run one REPL command. Returns false when the user asked to quit.
fn dispatch_command(
    binder: &mut SessionBinder<SimulatedPlayer>,
    sync: &SyncClient,
    input: &str,
) -> bool {
    let mut parts = input.trim().splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or("");
    let arg = parts.next().map(str::trim).unwrap_or("");
    let now = Instant::now();

    match command {
        "" => {}
        "create" => binder.create_room(),
        "join" => {
            if arg.is_empty() {
                println!("Usage: join <room-code>");
            } else {
                binder.join_room(arg.to_string());
            }
        }
        "leave" => binder.leave(),
        "select" => match parse_video_ref(arg) {
            Some(video) => report(binder.select_video(video, now)),
            None => println!("Usage: select <video-id | watch-url>"),
        },
        "play" => report(binder.request_intent(Intent::Play)),
        "pause" => report(binder.request_intent(Intent::Pause)),
        "seek" => match arg.parse::<f64>() {
            Ok(secs) if secs.is_finite() && secs >= 0.0 => report(binder.seek(secs, now)),
            _ => println!("Usage: seek <seconds>"),
        },
        "status" => print_status(binder, sync),
        "help" => print_help(),
        "quit" | "exit" => return false,
        other => println!("Unknown command '{other}'. Type 'help' for commands."),
    }
    true
}

fn report(result: Result<(), SyncError>) {
    match result {
        Ok(()) => {}
        Err(SyncError::Room(message)) => println!("Room error: {message}"),
        Err(SyncError::PlaybackSurface(reason)) => println!("Playback error: {reason}"),
        Err(e @ SyncError::StaleMessage(_)) => tracing::debug!("{}", e),
        Err(e) => tracing::warn!("{}", e),
    }
}

fn print_status(binder: &SessionBinder<SimulatedPlayer>, sync: &SyncClient) {
    match (binder.room(), binder.client_id()) {
        (Some(room), Some(id)) => println!("Room: {room} (client {id})"),
        _ => println!("Room: (none)"),
    }
    let state = binder.state();
    match (&state.video, binder.phase()) {
        (Some(video), Phase::Ready) => {
            let duration = binder
                .duration_secs()
                .map(|d| format!("{d:.0}s"))
                .unwrap_or_else(|| "?".to_string());
            println!(
                "Video: {} at {:.1}s / {} [{}]",
                video,
                state.position_secs,
                duration,
                if state.playing { "playing" } else { "paused" }
            );
        }
        (Some(video), _) => println!("Video: {video} (waiting for player)"),
        (None, _) => println!("Video: (none)"),
    }

    let stats = sync.stats_snapshot();
    if sync.is_connected() {
        println!(
            "Transport: connected {:.0}s to {} (rtt {})",
            stats.connected_duration.unwrap_or(0.0),
            stats.endpoint_label.as_deref().unwrap_or("?"),
            stats
                .last_rtt_ms
                .map(|ms| format!("{ms:.0}ms"))
                .unwrap_or_else(|| "?".to_string()),
        );
        println!(
            "  {} msgs / {} B out, {} msgs / {} B in, {}",
            stats.messages_out,
            stats.bytes_out,
            stats.messages_in,
            stats.bytes_in,
            stats
                .last_message_age
                .map(|secs| format!("last message {secs:.0}s ago"))
                .unwrap_or_else(|| "no messages yet".to_string()),
        );
    } else {
        println!(
            "Transport: disconnected ({} reconnect attempts)",
            stats.reconnect_attempts
        );
    }
}

fn print_help() {
    println!("Commands:");
    println!("  create            create a new room");
    println!("  join <code>       join an existing room (codes look like 123-456)");
    println!("  leave             leave the current room");
    println!("  select <video>    pick a video for the room (id or watch URL)");
    println!("  play / pause      control playback");
    println!("  seek <seconds>    jump to a position");
    println!("  status            show room, playback, and transport state");
    println!("  quit              exit");
}
