//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::api::{GenerationInput, ResumeAction};
use crate::sse::ApprovalRequest;

/// genstream - campaign packet generator client
#[derive(Parser, Debug)]
#[command(name = "gs", author, version, about = "Stream and steer campaign packet generations", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Server base URL, overrides config
    #[arg(short = 's', long, global = true)]
    pub server: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a new generation and follow it to completion
    Generate {
        /// Campaign premise
        #[arg(required = true)]
        prompt: String,

        /// Encounter difficulty
        #[arg(short, long, default_value = "Medium")]
        difficulty: String,

        /// Dominant terrain
        #[arg(short, long, default_value = "Forest")]
        terrain: String,

        /// Extra requirements for the planner
        #[arg(short, long, default_value = "")]
        requirements: String,

        /// Name of the adventuring party
        #[arg(long)]
        party_name: Option<String>,

        /// Number of player characters
        #[arg(long)]
        party_size: Option<u32>,

        /// Approve every plan without prompting
        #[arg(short = 'y', long)]
        auto_approve: bool,
    },

    /// Continue a paused or interrupted thread
    Resume {
        /// "approve", or a description of the changes to make
        #[arg(default_value = "approve")]
        action: String,

        /// Thread to resume (default: last active thread)
        #[arg(short = 'T', long)]
        thread: Option<String>,

        /// Approve every later plan without prompting
        #[arg(short = 'y', long)]
        auto_approve: bool,
    },

    /// Show the stored artifacts of a thread
    Load {
        /// Thread id (default: last active thread)
        thread: Option<String>,
    },

    /// List threads on the server
    Threads {
        /// Include archived threads
        #[arg(short, long)]
        all: bool,
    },

    /// Toggle the archived flag of a thread
    Archive {
        #[arg(required = true)]
        thread: String,
    },

    /// Ask the dungeon master about a thread's campaign
    Chat {
        #[arg(required = true)]
        message: String,

        /// Thread id (default: last active thread)
        #[arg(short = 'T', long)]
        thread: Option<String>,
    },

    /// Show or forget the last active thread
    Last {
        /// Forget the stored thread id
        #[arg(long)]
        clear: bool,
    },

    /// Check that the server is reachable
    Health,
}

impl Command {
    /// Generation input for `generate`, None for other commands
    pub fn generation_input(&self) -> Option<GenerationInput> {
        match self {
            Command::Generate {
                prompt,
                difficulty,
                terrain,
                requirements,
                party_name,
                party_size,
                ..
            } => Some(GenerationInput {
                prompt: prompt.clone(),
                difficulty: difficulty.clone(),
                terrain: terrain.clone(),
                requirements: requirements.clone(),
                party_name: party_name.clone(),
                party_size: *party_size,
            }),
            _ => None,
        }
    }
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("genstream")
        .join("logs")
        .join("genstream.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// Interpret a line typed at an approval prompt
///
/// Empty input approves, an option number picks that option's payload, `q`
/// leaves the thread paused (None), anything else is a revision request.
pub fn parse_approval_reply(line: &str, request: &ApprovalRequest) -> Option<ResumeAction> {
    let reply = line.trim();
    debug!(%reply, options = request.options.len(), "parse_approval_reply: called");
    if reply.is_empty() {
        return Some(ResumeAction::Approve);
    }
    if reply.eq_ignore_ascii_case("q") || reply.eq_ignore_ascii_case("quit") {
        return None;
    }
    if let Ok(index) = reply.parse::<usize>()
        && let Some(option) = index.checked_sub(1).and_then(|i| request.options.get(i))
    {
        return Some(ResumeAction::from(option.payload.as_str()));
    }
    Some(ResumeAction::from(reply))
}
