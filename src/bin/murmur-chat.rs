//! Interactive chat against a session-bound generation backend.
//!
//! # Usage
//!
//! ```bash
//! # Talk to a backend on localhost:5000
//! murmur-chat
//!
//! # Pick the backend and the model up front
//! murmur-chat --base-url http://gpu-box:5000 --model deepseek-llm-7b-chat
//!
//! # Disable colors (useful for piping output)
//! murmur-chat --no-color
//!
//! # Trace the wire protocol on stderr
//! MURMUR_LOG=murmur=debug murmur-chat
//! ```
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/models` - List the backend's models
//! - `/model <name>` - Select the model for this session
//! - `/stats` - Show session statistics
//! - `/quit` - Exit the application

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use murmur::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, PlainTextRenderer, Renderer, help_text,
    parse_command,
};
use murmur::{BindOutcome, Result as MurmurResult};

/// Main entry point for the murmur-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_env("MURMUR_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let (args, _) = ChatArgs::from_command_line_relaxed("murmur-chat [OPTIONS]");
    let config = ChatConfig::try_from(args)?;

    let mut session = ChatSession::from_config(&config)?;

    // Flag for interrupt handling during streaming
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::Relaxed);
    })?;

    let mut renderer = PlainTextRenderer::with_color(config.use_color).with_interrupt(interrupted.clone());
    let mut rl = DefaultEditor::new()?;

    println!("Murmur Chat (session: {})", session.session_token());
    match session.refresh_models().await {
        Ok(models) => print_models(&models),
        Err(err) => renderer.print_error(&format!("Could not list models: {err}")),
    }
    if let Some(model) = config.model.as_deref() {
        report_bind(&mut renderer, model, session.bind(model).await);
    }
    println!("Type /help for commands, /quit to exit\n");

    loop {
        interrupted.store(false, Ordering::Relaxed);

        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {}", line);
                            }
                        }
                        ChatCommand::Models => match session.refresh_models().await {
                            Ok(models) => print_models(&models),
                            Err(err) => renderer.print_error(&err.to_string()),
                        },
                        ChatCommand::Model(model) => {
                            let result = session.bind(&model).await;
                            report_bind(&mut renderer, &model, result);
                        }
                        ChatCommand::MaxTokens(value) => {
                            report_setting(
                                &mut renderer,
                                session.set_max_tokens(value),
                                format!("max_tokens set to {value}"),
                            );
                        }
                        ChatCommand::Temperature(value) => {
                            report_setting(
                                &mut renderer,
                                session.set_temperature(value),
                                format!("temperature set to {value:.2}"),
                            );
                        }
                        ChatCommand::TopP(value) => {
                            report_setting(
                                &mut renderer,
                                session.set_top_p(value),
                                format!("top_p set to {value:.2}"),
                            );
                        }
                        ChatCommand::Session => {
                            let binding = session.binding();
                            println!("    Session: {}", session.session_token());
                            println!("    Model: {}", binding.model().unwrap_or("(none)"));
                        }
                        ChatCommand::Stats => print_stats(&session),
                        ChatCommand::ShowConfig => print_config(&session, &config),
                        ChatCommand::Invalid(message) => renderer.print_error(&message),
                    }
                    continue;
                }

                // Notices for rejected and failed turns are printed by the session.
                let _ = session.submit(line, &mut renderer).await;
            }
            Err(ReadlineError::Interrupted) => {
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    Ok(())
}

fn report_bind(renderer: &mut dyn Renderer, model: &str, result: MurmurResult<BindOutcome>) {
    match result {
        Ok(BindOutcome::Bound(message)) => renderer.print_info(&message),
        Ok(BindOutcome::AlreadyBound) => {
            renderer.print_info(&format!("Already using {model}"));
        }
        Err(err) => renderer.print_error(&err.to_string()),
    }
}

fn report_setting(renderer: &mut dyn Renderer, result: MurmurResult<()>, message: String) {
    match result {
        Ok(()) => renderer.print_info(&message),
        Err(err) => renderer.print_error(&err.to_string()),
    }
}

fn print_models(models: &[String]) {
    if models.is_empty() {
        println!("    No models available.");
        return;
    }
    println!("    Available models:");
    for model in models {
        println!("      - {}", model);
    }
}

fn print_stats(session: &ChatSession) {
    let stats = session.stats();
    println!("    Session Statistics:");
    println!("      Session: {}", stats.session);
    println!("      Model: {}", stats.model.as_deref().unwrap_or("(none)"));
    println!(
        "      Turns: {} completed / {} failed",
        stats.turns_completed, stats.turns_failed
    );
    println!(
        "      Frames: {} ({} malformed)",
        stats.frames, stats.malformed_frames
    );
    println!("      Characters received: {}", stats.chars_received);
    println!("      Model selections: {}", stats.binds);
}

fn print_config(session: &ChatSession, config: &ChatConfig) {
    let params = session.params();
    println!("    Current Configuration:");
    println!("      Backend: {}", session.backend().base_url());
    println!(
        "      Model: {}",
        session.binding().model().unwrap_or("(none)")
    );
    println!("      Max tokens: {}", params.max_tokens);
    println!("      Temperature: {:.2}", params.temperature);
    println!("      Top-p: {:.2}", params.top_p);
    println!(
        "      Color: {}",
        if config.use_color { "on" } else { "off" }
    );
}
