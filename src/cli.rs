//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface and the commands accepted on stdin
//! while the console client is running.

use std::time::Duration;

use clap::{Parser, Subcommand};

/// Realtime client - chat, audio and video over one WebSocket
///
/// Connects to a media server, prints incoming chat, sends each line typed
/// on stdin as a chat message, and stores received video frames and audio.
#[derive(Parser, Debug)]
#[command(name = "realtime-client")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to the media server and start the interactive console
    Run {
        /// Path to configuration file
        #[arg(short, long, env = "RTC_CLIENT_CONFIG")]
        config: Option<String>,

        /// Server WebSocket URL (overrides configuration)
        #[arg(short, long)]
        url: Option<String>,

        /// Directory to save the latest received video frame in
        #[arg(long)]
        frame_dir: Option<String>,
    },

    /// Display version and build information
    Version {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the effective configuration
    Show {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}

/// One line of console input
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    /// Plain text to send as a chat message
    Chat(String),
    /// Stream a test tone for the given duration
    Tone(Duration),
    /// Print connection state and counters
    Status,
    /// Leave the console
    Quit,
    /// Print the command list
    Help,
    /// Blank line
    Empty,
    /// Slash command that could not be parsed
    Invalid(String),
}

/// Default duration of `/tone` without an argument
const DEFAULT_TONE_SECS: f32 = 1.0;

/// Longest tone accepted from the console
const MAX_TONE_SECS: f32 = 60.0;

pub const CONSOLE_HELP: &str = "\
Commands:
  <text>          send a chat message
  /tone [secs]    stream a 440 Hz test tone (default 1s)
  /status         show connection state and counters
  /quit           disconnect and exit";

impl ConsoleCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return ConsoleCommand::Empty;
        }

        let Some(command) = line.strip_prefix('/') else {
            return ConsoleCommand::Chat(line.to_string());
        };

        let mut parts = command.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("tone"), None) => ConsoleCommand::Tone(Duration::from_secs_f32(DEFAULT_TONE_SECS)),
            (Some("tone"), Some(secs)) => match secs.parse::<f32>() {
                Ok(secs) if secs > 0.0 && secs <= MAX_TONE_SECS => {
                    ConsoleCommand::Tone(Duration::from_secs_f32(secs))
                }
                _ => ConsoleCommand::Invalid(format!(
                    "tone duration must be between 0 and {} seconds",
                    MAX_TONE_SECS
                )),
            },
            (Some("status"), None) => ConsoleCommand::Status,
            (Some("quit") | Some("exit"), None) => ConsoleCommand::Quit,
            (Some("help"), None) => ConsoleCommand::Help,
            _ => ConsoleCommand::Invalid(format!("unknown command '{}'", line)),
        }
    }
}
