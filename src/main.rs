//! Realtime client - console front end
//!
//! Connects to a media server over one WebSocket. Chat typed on stdin goes
//! out as control messages, incoming chat is printed, received video frames
//! and audio are written to disk, and `/tone` streams a test tone.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use realtime_client::cli::{Cli, Commands, ConfigSubcommand, ConsoleCommand, CONSOLE_HELP};
use realtime_client::config::{self, ClientConfig};
use realtime_client::error::{Error, Result};
use realtime_client::logging::{self, LogGuards};
use realtime_client::media::{self, AudioCapture, FrameSink};
use realtime_client::protocol::ChatMessage;
use realtime_client::version;
use realtime_client::ConnectionManager;

/// How long shutdown waits for the connection to close
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

/// Connection traffic forwarded from subscriber callbacks to the console loop
#[derive(Debug)]
enum ClientEvent {
    Connected,
    Disconnected,
    Message(Value),
    VideoFrame(Vec<u8>),
    Audio(Vec<u8>),
}

fn main() -> Result<()> {
    // Parse CLI arguments first (before logging, so we know verbosity)
    let cli = Cli::parse();

    let (config_path, url, frame_dir) = match cli.command {
        Commands::Version { json } => {
            version::print_version(json);
            return Ok(());
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            return handle_config_command(subcommand);
        }
        Commands::Run { config, url, frame_dir } => (config, url, frame_dir),
    };

    let config = match load_run_config(config_path.as_deref(), url, frame_dir) {
        Ok(cfg) => cfg,
        Err(e) => exit_with(e),
    };

    // The guards must be kept alive for the lifetime of the program
    let _log_guards: LogGuards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

    let build = version::build_info();
    info!(
        version = %build.full_version(),
        target = %build.target,
        profile = %build.profile,
        "Starting realtime client"
    );

    if let Err(e) = run_client(config) {
        tracing::error!(error = %e.format_for_log(), "Client stopped");
        exit_with(e);
    }

    Ok(())
}

fn exit_with(error: Error) -> ! {
    eprint!("{}", error.format_for_terminal());
    std::process::exit(error.exit_code());
}

/// Configuration for `run`, with CLI flags taking precedence
fn load_run_config(
    config_path: Option<&str>,
    url: Option<String>,
    frame_dir: Option<String>,
) -> Result<ClientConfig> {
    let mut config = ClientConfig::load(config_path)?;

    if let Some(url) = url {
        config.connection.url = url;
    }
    if let Some(dir) = frame_dir {
        config.media.frame_dir = Some(config::expand_path(&dir));
    }

    config.validate()?;
    Ok(config)
}

fn run_client(config: ClientConfig) -> Result<()> {
    info!(
        url = %config.connection.url,
        max_reconnect_attempts = config.connection.max_reconnect_attempts,
        frame_dir = ?config.media.frame_dir,
        audio_capture_file = ?config.media.audio_capture_file,
        "Configuration loaded"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("realtime-client")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;

    runtime.block_on(async_client_main(config))
}

/// Forward every subscriber channel into one event stream
fn subscribe_all(manager: &ConnectionManager, event_tx: mpsc::UnboundedSender<ClientEvent>) {
    let tx = event_tx.clone();
    manager.on_connect(move || {
        let _ = tx.send(ClientEvent::Connected);
    });

    let tx = event_tx.clone();
    manager.on_disconnect(move || {
        let _ = tx.send(ClientEvent::Disconnected);
    });

    let tx = event_tx.clone();
    manager.on_message(move |message| {
        let _ = tx.send(ClientEvent::Message(message.clone()));
    });

    let tx = event_tx.clone();
    manager.on_video_frame(move |frame| {
        let _ = tx.send(ClientEvent::VideoFrame(frame.to_vec()));
    });

    manager.on_audio(move |pcm| {
        let _ = event_tx.send(ClientEvent::Audio(pcm.to_vec()));
    });
}

async fn async_client_main(config: ClientConfig) -> Result<()> {
    let mut frame_sink = config.frame_dir().map(FrameSink::new).transpose()?;
    let mut audio_capture = config.audio_capture_file().map(AudioCapture::open).transpose()?;

    let manager = Arc::new(ConnectionManager::new(
        config.connection.to_connection_config(),
    )?);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    subscribe_all(&manager, event_tx);

    println!("Connecting to {} (type /help for commands)", manager.endpoint());

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut tone_task: Option<JoinHandle<()>> = None;

    let shutdown_signal = tokio::signal::ctrl_c();
    tokio::pin!(shutdown_signal);

    // Completes only if the manager gives up reconnecting
    let stopped_manager = manager.clone();
    let stopped = async move { stopped_manager.wait_stopped().await };
    tokio::pin!(stopped);

    let mut driver_stopped = false;
    let mut outcome = Ok(());

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Shutdown signal received");
                break;
            }

            _ = &mut stopped => {
                driver_stopped = true;
                let status = manager.reconnect_status();
                outcome = Err(Error::reconnect_exhausted(
                    manager.endpoint().as_str(),
                    status.attempts,
                ));
                break;
            }

            event = event_rx.recv() => {
                let Some(event) = event else { break };
                handle_event(event, frame_sink.as_mut(), audio_capture.as_mut());
            }

            line = stdin.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        debug!("Console input closed");
                        break;
                    }
                    Err(e) => {
                        outcome = Err(Error::Io(e));
                        break;
                    }
                };

                match ConsoleCommand::parse(&line) {
                    ConsoleCommand::Empty => {}
                    ConsoleCommand::Chat(text) => {
                        if !manager.send_message(&ChatMessage::text(text))? {
                            println!("(not connected, message not sent)");
                        }
                    }
                    ConsoleCommand::Tone(duration) => {
                        if let Some(task) = tone_task.take() {
                            task.abort();
                        }
                        tone_task = Some(spawn_tone(manager.clone(), &config, duration));
                    }
                    ConsoleCommand::Status => print_status(&manager),
                    ConsoleCommand::Help => println!("{}", CONSOLE_HELP),
                    ConsoleCommand::Quit => break,
                    ConsoleCommand::Invalid(reason) => println!("{}", reason),
                }
            }
        }
    }

    if let Some(task) = tone_task.take() {
        task.abort();
    }

    manager.disconnect();
    if !driver_stopped && tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut stopped).await.is_err() {
        warn!("Connection did not close in time");
    }

    let stats = manager.stats();
    info!(
        connections = stats.connections,
        messages_received = stats.messages_received,
        video_frames = stats.video_frames_received,
        audio_frames = stats.audio_frames_received,
        "Client shut down"
    );

    outcome
}

fn handle_event(
    event: ClientEvent,
    frame_sink: Option<&mut FrameSink>,
    audio_capture: Option<&mut AudioCapture>,
) {
    match event {
        ClientEvent::Connected => println!("* connected"),
        ClientEvent::Disconnected => println!("* disconnected"),
        ClientEvent::Message(value) => match ChatMessage::from_value(&value) {
            Some(chat) if chat.is_user() => println!("you: {}", chat.content),
            Some(chat) => println!("{}: {}", chat.kind, chat.content),
            None => println!("{}", value),
        },
        ClientEvent::VideoFrame(frame) => {
            if let Some(sink) = frame_sink {
                match sink.save(&frame) {
                    Ok(path) => debug!(path = %path.display(), bytes = frame.len(), "Saved video frame"),
                    Err(e) => warn!(error = %e, "Failed to save video frame"),
                }
            }
        }
        ClientEvent::Audio(pcm) => {
            if let Some(capture) = audio_capture {
                if let Err(e) = capture.append(&pcm) {
                    warn!(error = %e, "Failed to write received audio");
                }
            }
        }
    }
}

/// Stream a test tone in real time, one chunk per frame
fn spawn_tone(manager: Arc<ConnectionManager>, config: &ClientConfig, duration: Duration) -> JoinHandle<()> {
    let sample_rate = config.media.sample_rate;
    let chunk_size = config.media.chunk_size;
    let samples = media::sine_tone(media::TONE_FREQUENCY_HZ, sample_rate, duration, media::TONE_AMPLITUDE);
    let chunk_duration = Duration::from_secs_f64(chunk_size as f64 / f64::from(sample_rate));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(chunk_duration);
        let mut sent = 0usize;
        for chunk in samples.chunks(chunk_size) {
            ticker.tick().await;
            if !manager.send_audio(chunk) {
                println!("(not connected, tone stopped)");
                break;
            }
            sent += 1;
        }
        debug!(frames = sent, "Tone finished");
    })
}

fn print_status(manager: &ConnectionManager) {
    let stats = manager.stats();
    let reconnect = manager.reconnect_status();

    println!("state:      {}", manager.state());
    println!("endpoint:   {}", manager.endpoint());
    if let Some(since) = stats.connected_since {
        println!("since:      {}", since.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!(
        "reconnect:  {} attempts, next delay {}ms{}",
        reconnect.attempts,
        reconnect.next_delay.as_millis(),
        if reconnect.exhausted { " (gave up)" } else { "" }
    );
    println!(
        "received:   {} messages, {} video frames, {} audio frames, {} dropped",
        stats.messages_received,
        stats.video_frames_received,
        stats.audio_frames_received,
        stats.frames_dropped
    );
    println!(
        "sent:       {} messages, {} audio frames",
        stats.messages_sent, stats.audio_frames_sent
    );
}

/// Handle configuration subcommands
fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = ClientConfig::load(config.as_deref())?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let written = config::init_config(path.as_deref(), force)?;
            println!("Configuration file created: {}", written.display());
        }
        ConfigSubcommand::Validate { config } => match ClientConfig::load(config.as_deref()) {
            Ok(_) => println!("Configuration is valid."),
            Err(e) => exit_with(e),
        },
    }

    Ok(())
}
