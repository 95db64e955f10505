//! gs - campaign packet generator client
//!
//! CLI entry point: streams generations, prompts at approval pauses, and
//! exposes the thread operations of the generation server.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, FromArgMatches};
use colored::*;
use eyre::{Context, Result, eyre};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use genstream::api::{HttpThreadApi, ResumeAction, ThreadApi};
use genstream::cli::{Cli, Command, get_log_path, parse_approval_reply};
use genstream::config::Config;
use genstream::render::Renderer;
use genstream::session::{FileSessionStore, GenerationSessionController, Phase, SessionState, SessionStore};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    let log_dir = log_path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cli::command().after_help(format!("Logs are written to: {}", get_log_path().display()));
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(server) = &cli.server {
        config.server.base_url = server.clone();
    }
    info!(base_url = %config.server.base_url, "gs loaded config");

    let api: Arc<dyn ThreadApi> =
        Arc::new(HttpThreadApi::from_config(&config.server).context("Failed to build HTTP client")?);
    let store: Arc<dyn SessionStore> = Arc::new(FileSessionStore::new(&config.session.store_path));

    debug!(command = ?cli.command, "main: dispatching command");
    let input = cli.command.generation_input();
    match cli.command {
        Command::Generate { auto_approve, .. } => {
            let input = input.ok_or_else(|| eyre!("generate without input"))?;
            let mut controller = GenerationSessionController::new(api, store, &config.session);
            let mut rx = controller.subscribe();
            controller.start_generation(input)?;
            drive(&mut controller, &mut rx, auto_approve).await
        }
        Command::Resume {
            action,
            thread,
            auto_approve,
        } => {
            let thread_id = resolve_thread(thread, store.as_ref())?;
            let mut controller = GenerationSessionController::hydrate(api, store, &config.session, &thread_id)
                .await
                .context(format!("Failed to load thread {}", thread_id))?;
            let mut rx = controller.subscribe();
            controller.resume(ResumeAction::from(action.as_str()))?;
            drive(&mut controller, &mut rx, auto_approve).await
        }
        Command::Load { thread } => {
            let thread_id = resolve_thread(thread, store.as_ref())?;
            let snapshot = api
                .load_thread(&thread_id)
                .await
                .context(format!("Failed to load thread {}", thread_id))?;
            let chat = snapshot.chat_messages.clone();
            store.save(&thread_id).context("Failed to remember thread")?;
            let state = SessionState::from_snapshot(&thread_id, snapshot);
            print_lines(Renderer::new().render(&state));
            for message in chat {
                println!("{} {}", format!("{}:", message.role).bold(), message.content);
            }
            Ok(())
        }
        Command::Threads { all } => {
            let threads = api.list_threads().await.context("Failed to list threads")?;
            let shown: Vec<_> = threads.into_iter().filter(|t| all || !t.is_archived).collect();
            if shown.is_empty() {
                println!("No threads found");
            }
            for thread in shown {
                let marker = if thread.is_archived { " [archived]".dimmed().to_string() } else { String::new() };
                println!(
                    "{} {} {}{}",
                    thread.id.cyan(),
                    thread.name,
                    thread.created_at.dimmed(),
                    marker
                );
            }
            Ok(())
        }
        Command::Archive { thread } => {
            let archived = api.toggle_archive(&thread).await.context("Failed to toggle archive")?;
            let verb = if archived { "Archived" } else { "Unarchived" };
            println!("{} {} thread: {}", "✓".green(), verb, thread.cyan());
            Ok(())
        }
        Command::Chat { message, thread } => {
            let thread_id = resolve_thread(thread, store.as_ref())?;
            let reply = api.chat(&thread_id, &message).await.context("Chat request failed")?;
            println!("{}", reply.response);
            Ok(())
        }
        Command::Last { clear } => {
            if clear {
                store.clear().context("Failed to clear last thread")?;
                println!("{} Forgot last thread", "✓".green());
            } else {
                match store.load().context("Failed to read last thread")? {
                    Some(id) => println!("{}", id),
                    None => println!("No active thread"),
                }
            }
            Ok(())
        }
        Command::Health => {
            api.health().await.context("Server is not reachable")?;
            println!("{} Server ok at {}", "✓".green(), config.server.base_url);
            Ok(())
        }
    }
}

/// Explicit thread id, else the persisted last thread
fn resolve_thread(thread: Option<String>, store: &dyn SessionStore) -> Result<String> {
    if let Some(id) = thread {
        return Ok(id);
    }
    store
        .load()
        .context("Failed to read last thread")?
        .ok_or_else(|| eyre!("No active thread; pass --thread or run `gs generate` first"))
}

enum Step {
    Advanced,
    Stopped,
    Interrupted,
}

/// Follow the session until it completes, fails, or the user stops it
async fn drive(
    controller: &mut GenerationSessionController,
    rx: &mut broadcast::Receiver<SessionState>,
    auto_approve: bool,
) -> Result<()> {
    debug!(auto_approve, "drive: called");
    let mut renderer = Renderer::new();
    loop {
        render_published(rx, &mut renderer);

        let step = tokio::select! {
            next = controller.next_state() => if next.is_some() { Step::Advanced } else { Step::Stopped },
            _ = tokio::signal::ctrl_c() => Step::Interrupted,
        };

        match step {
            Step::Advanced => continue,
            Step::Interrupted => {
                controller.dispose();
                println!("\n{} Interrupted; continue later with `gs resume`", "!".yellow());
                return Ok(());
            }
            Step::Stopped => {}
        }

        render_published(rx, &mut renderer);
        match controller.phase() {
            Phase::AwaitingApproval => {
                let Some(request) = controller.state().pending_approval.clone() else {
                    return Err(eyre!("Paused without an approval request"));
                };
                let action = if auto_approve {
                    println!("{} Auto-approving", "✓".green());
                    Some(ResumeAction::Approve)
                } else {
                    let line = tokio::select! {
                        line = read_line() => line?,
                        _ = tokio::signal::ctrl_c() => {
                            // The blocking stdin read can't be cancelled, so leave directly
                            println!("\nPlan left pending; continue later with `gs resume`");
                            std::process::exit(130);
                        }
                    };
                    parse_approval_reply(&line, &request)
                };
                match action {
                    Some(action) => controller.resume(action)?,
                    None => {
                        println!("Plan left pending; continue later with `gs resume`");
                        return Ok(());
                    }
                }
            }
            Phase::Failed => {
                let message = controller.state().error_message.clone().unwrap_or_default();
                return Err(eyre!("Generation failed: {}", message));
            }
            phase => {
                debug!(%phase, "drive: stream finished");
                return Ok(());
            }
        }
    }
}

/// Print every snapshot published since the last call
fn render_published(rx: &mut broadcast::Receiver<SessionState>, renderer: &mut Renderer) {
    loop {
        match rx.try_recv() {
            Ok(state) => print_lines(renderer.render(&state)),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "render_published: renderer fell behind");
            }
            Err(_) => return,
        }
    }
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

async fn read_line() -> Result<String> {
    let line = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| line)
    })
    .await
    .context("Prompt task failed")?
    .context("Failed to read from stdin")?;
    Ok(line)
}
