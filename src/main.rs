use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::EnvFilter;

use remo_client::backend::Backend;
use remo_client::chat::Sender;
use remo_client::voice::{CaptureSource, MicrophoneSource, rms};
use remo_client::{
    ChatController, Config, ConfigOverrides, Engine, EngineCommand, EngineEvent, EventBus,
    HttpBackend, NoticeLevel, NotificationId,
};

/// Remo - Voice and chat client for the Remo assistant
#[derive(Parser)]
#[command(name = "remo", version, about)]
struct Cli {
    /// Backend base URL
    #[arg(long, env = "REMO_BACKEND_URL")]
    backend: Option<String>,

    /// Listening window length in milliseconds
    #[arg(long)]
    window_ms: Option<u64>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive chat session (default)
    Chat,
    /// Send a single message and print the reply
    Send {
        /// Message text
        message: String,
    },
    /// Show backend health and configuration
    Status,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,remo_client=info",
        1 => "info,remo_client=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let overrides = ConfigOverrides {
        backend_url: cli.backend,
        window_ms: cli.window_ms,
    };

    if let Some(Command::TestMic { duration }) = cli.command {
        return test_mic(duration).await;
    }

    let config = Config::load(&overrides)?;
    tracing::debug!(?config, "loaded configuration");

    let backend: Arc<dyn Backend> = Arc::new(
        HttpBackend::new(&config.backend_url, config.timeout)
            .context("failed to create backend client")?,
    );

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => chat_session(config, backend).await,
        Command::Send { message } => send_once(&config, backend, &message).await,
        Command::Status => status(&config, backend.as_ref()).await,
        Command::TestMic { .. } => Ok(()),
    }
}

/// Interactive session: stdin lines in, engine events out
#[allow(clippy::future_not_send)]
async fn chat_session(config: Config, backend: Arc<dyn Backend>) -> anyhow::Result<()> {
    let events = EventBus::new();
    let voice_recording = Arc::new(AtomicBool::new(false));
    let printer = tokio::spawn(print_events(events.subscribe(), Arc::clone(&voice_recording)));

    let mut engine = Engine::new(config, backend, Arc::new(MicrophoneSource::new()), events);
    if let Err(e) = engine.refresh_tts().await {
        tracing::debug!(error = %e, "tts status unavailable");
    }

    let (tx, rx) = mpsc::channel(32);
    let reader = tokio::spawn(read_commands(tx, voice_recording));

    println!("Remo ready. Type a message, or /help for commands.");
    engine.run(rx).await;

    reader.abort();
    printer.abort();
    Ok(())
}

const HELP: &str = "\
/listen            start listening mode
/unlisten          stop listening mode
/voice             start or finish voice input
/notifications     list notifications
/open <id>         open a notification
/clear             clear chat history
/tts               toggle voice responses
/tts-stop          stop speaking
/quit              exit";

/// Turn stdin lines into engine commands
///
/// `voice_recording` mirrors the engine's voice-input state as reported by
/// [`EngineEvent::VoiceInputChanged`].
async fn read_commands(tx: mpsc::Sender<EngineCommand>, voice_recording: Arc<AtomicBool>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "failed to read input");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let command = match parse_line(line, voice_recording.load(Ordering::Acquire)) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                eprintln!("{message}");
                continue;
            }
        };

        let quit = command == EngineCommand::Shutdown;
        if tx.send(command).await.is_err() || quit {
            break;
        }
    }

    let _ = tx.send(EngineCommand::Shutdown).await;
}

fn parse_line(line: &str, voice_recording: bool) -> Result<Option<EngineCommand>, String> {
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(EngineCommand::SendMessage(line.to_string())));
    };

    let (name, arg) = rest
        .split_once(char::is_whitespace)
        .map_or((rest, ""), |(name, arg)| (name, arg.trim()));

    let command = match name {
        "listen" => EngineCommand::StartListening,
        "unlisten" => EngineCommand::StopListening,
        "voice" if voice_recording => EngineCommand::FinishVoiceInput,
        "voice" => EngineCommand::StartVoiceInput,
        "notifications" => EngineCommand::ShowNotifications,
        "open" => {
            let id: u64 = arg
                .parse()
                .map_err(|_| format!("usage: /open <id> (got {arg:?})"))?;
            EngineCommand::ExpandNotification(NotificationId::from(id))
        }
        "clear" => EngineCommand::ClearHistory,
        "tts" => EngineCommand::ToggleTts,
        "tts-stop" => EngineCommand::StopTts,
        "quit" | "exit" => EngineCommand::Shutdown,
        "help" => {
            println!("{HELP}");
            return Ok(None);
        }
        other => return Err(format!("unknown command /{other}; try /help")),
    };

    Ok(Some(command))
}

/// Render engine events on stdout
async fn print_events(mut rx: broadcast::Receiver<EngineEvent>, voice_recording: Arc<AtomicBool>) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event printer lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match event {
            EngineEvent::Notice { level, message } => {
                let tag = match level {
                    NoticeLevel::Info => "info",
                    NoticeLevel::Success => "ok",
                    NoticeLevel::Error => "error",
                };
                println!("[{tag}] {message}");
            }
            EngineEvent::ChatUpdated(message) => {
                if message.sender == Sender::Assistant {
                    if let Some(at) = message.finalized_at {
                        println!("remo ({}): {}", at.format("%H:%M"), message.content);
                    } else {
                        println!("remo is thinking...");
                    }
                }
            }
            EngineEvent::NotificationAdded(n) => {
                println!("[notification #{}] {}: {}", n.id, n.title, n.preview);
            }
            EngineEvent::NotificationOpened {
                notification,
                unread_count,
            } => {
                println!("== {} ==", notification.title);
                println!("{}", notification.full_content);
                if let Some(action) = &notification.suggested_action {
                    println!("Suggested action: {action}");
                }
                println!("({unread_count} unread)");
            }
            EngineEvent::ShowNotifications {
                notifications,
                unread_count,
            } => {
                if notifications.is_empty() {
                    println!("No notifications yet.");
                    continue;
                }
                println!("Notifications ({unread_count} unread):");
                for n in notifications {
                    let marker = if n.unread { "*" } else { " " };
                    println!(
                        "{marker} #{} [{}] {}: {}",
                        n.id,
                        n.created_at.format("%H:%M"),
                        n.title,
                        n.preview
                    );
                }
            }
            EngineEvent::VoiceInputChanged(recording) => {
                voice_recording.store(recording, Ordering::Release);
                if recording {
                    println!("Recording... type /voice again to finish.");
                }
            }
            EngineEvent::ExchangeState(_)
            | EngineEvent::HistoryCleared
            | EngineEvent::ListeningChanged(_)
            | EngineEvent::TtsChanged(_) => {}
        }
    }
}

/// Send one message and print the reply
async fn send_once(
    config: &Config,
    backend: Arc<dyn Backend>,
    message: &str,
) -> anyhow::Result<()> {
    let chat = ChatController::new(backend, EventBus::new(), config.stream);
    let outcome = chat.send(message)?.wait().await?;

    println!("{}", outcome.message().content);
    if !outcome.is_delivered() {
        anyhow::bail!("chat exchange failed");
    }
    Ok(())
}

/// Print backend health, configuration and speech state
async fn status(config: &Config, backend: &dyn Backend) -> anyhow::Result<()> {
    println!("Backend: {}", config.backend_url);

    let health = backend.health().await.context("health check failed")?;
    println!("Status:  {}", health.status);
    println!(
        "Services: chat={} whisper={} tts={}",
        health.services.chat, health.services.whisper, health.services.tts
    );

    match backend.config().await {
        Ok(remote) => println!("Config:  {remote:?}"),
        Err(e) => println!("Config:  unavailable ({e})"),
    }

    match backend.tts_status().await {
        Ok(tts) => println!("TTS:     {}", if tts.enabled { "on" } else { "off" }),
        Err(e) => println!("TTS:     unavailable ({e})"),
    }

    println!(
        "Notification key: {}",
        if config.notification_key.is_some() {
            "configured"
        } else {
            "from backend"
        }
    );

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut stream = MicrophoneSource::new().open()?;
    println!("Sample rate: {} Hz", stream.sample_rate());
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = stream.rotate();
        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    drop(stream);

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check your input device and its levels.");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_line_is_chat() {
        assert_eq!(
            parse_line("hello there", false),
            Ok(Some(EngineCommand::SendMessage("hello there".to_string())))
        );
    }

    #[test]
    fn test_voice_follows_engine_state() {
        assert_eq!(
            parse_line("/voice", false),
            Ok(Some(EngineCommand::StartVoiceInput))
        );
        assert_eq!(
            parse_line("/voice", true),
            Ok(Some(EngineCommand::FinishVoiceInput))
        );
        // A start the engine refused leaves the state unchanged, so retrying starts again
        assert_eq!(
            parse_line("/voice", false),
            Ok(Some(EngineCommand::StartVoiceInput))
        );
    }

    #[test]
    fn test_parse_open() {
        assert_eq!(
            parse_line("/open 3", false),
            Ok(Some(EngineCommand::ExpandNotification(NotificationId::from(3))))
        );
        assert!(parse_line("/open x", false).is_err());
        assert!(parse_line("/bogus", false).is_err());
    }
}
