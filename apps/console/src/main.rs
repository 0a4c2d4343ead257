mod config;
mod theme;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use client_core::{gateway::ApiGateway, logger::EventLogger, transport::preferred_end_transport};
use flow::{ControllerConfig, FlowEvent, LaunchParams, PhaseController};
use shared::domain::{Phase, Sender};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error};

#[derive(Parser, Debug)]
struct Args {
    /// Overrides the configured backend base URL.
    #[arg(long)]
    backend_url: Option<String>,
    #[arg(long)]
    participant_id: Option<String>,
    #[arg(long)]
    avatar: Option<String>,
    #[arg(long)]
    style: Option<String>,
    #[arg(long)]
    response_token: Option<String>,
    /// Runs without launch parameters against a fixed demo condition.
    #[arg(long)]
    demo: bool,
    /// Flips the persisted light/dark preference before starting.
    #[arg(long)]
    toggle_theme: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let mut settings = config::load_settings();
    if let Some(backend_url) = args.backend_url {
        settings.backend_url = backend_url;
    }

    let mut preference = theme::load();
    if args.toggle_theme {
        preference = preference.toggled();
        theme::save(preference)?;
    }
    println!("Theme: {}", preference.label());

    let gateway = Arc::new(ApiGateway::new(settings.backend_url.clone()));
    let logger = EventLogger::new(Arc::clone(&gateway));
    let end_transport = preferred_end_transport(Arc::clone(&gateway));
    let controller = PhaseController::new_with_dependencies(
        gateway,
        logger,
        end_transport,
        ControllerConfig {
            chat_duration_seconds: settings.chat_duration_seconds,
            loading_min_display: flow::controller::LOADING_MIN_DISPLAY,
            survey_base_url: settings.survey_base_url.clone(),
        },
    );
    let mut events = controller.subscribe_events();

    let launch = if args.demo {
        LaunchParams::Demo
    } else {
        LaunchParams::Experiment {
            participant_id: args.participant_id,
            avatar: args.avatar,
            style: args.style,
            response_token: args.response_token,
        }
    };

    println!("Connecting you with your conversation partner...");
    if let Err(err) = controller.bootstrap(launch).await {
        // Raw detail goes to tracing only; the participant sees the
        // error screen text.
        error!(error = ?err, "bootstrap failed");
        announce_phase(&controller, Phase::Error).await;
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(FlowEvent::PhaseChanged { to, .. }) => {
                    if announce_phase(&controller, to).await {
                        break;
                    }
                }
                Ok(FlowEvent::TranscriptUpdated) => print_latest(&controller).await,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "event receiver lagged");
                }
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                handle_line(&controller, line.trim()).await;
            }
        }
    }

    controller.shutdown();
    Ok(())
}

/// Prints the entry banner for a phase. Returns true on a terminal phase.
async fn announce_phase(controller: &Arc<PhaseController>, phase: Phase) -> bool {
    match phase {
        Phase::Intro => {
            println!();
            println!("Welcome! You will have a short conversation with a partner.");
            println!("Press Enter when you are ready to begin.");
            false
        }
        Phase::Avatar => {
            println!();
            println!("Choose an avatar for your partner:");
            println!("  - type 1-6 to pick a ready-made avatar");
            println!("  - type /generate <description> to create one");
            false
        }
        Phase::Chat => {
            println!();
            println!(
                "You are connected. The conversation ends in {} seconds.",
                controller.remaining_seconds()
            );
            false
        }
        Phase::Survey => {
            if let Some(url) = controller.survey_return_url().await {
                println!();
                println!("Time is up. Please continue to the survey:");
                println!("  {url}");
            }
            true
        }
        Phase::DemoEnd => {
            println!();
            println!("Time is up. Thanks for trying the demo!");
            true
        }
        Phase::Error => {
            println!();
            println!("Something went wrong and the session cannot continue.");
            true
        }
        Phase::Loading => false,
    }
}

async fn print_latest(controller: &Arc<PhaseController>) {
    let transcript = controller.transcript().await;
    match transcript.last() {
        Some(message) if message.sender == Sender::BotThinking => {
            println!("(partner is typing...)");
        }
        Some(message) if message.sender == Sender::Bot => {
            println!("partner: {}", message.text);
        }
        _ => {}
    }
}

async fn handle_line(controller: &Arc<PhaseController>, line: &str) {
    match controller.phase().await {
        Phase::Intro => controller.complete_intro().await,
        Phase::Avatar => handle_avatar_line(controller, line).await,
        Phase::Chat => controller.send_chat_message(line).await,
        _ => {}
    }
}

async fn handle_avatar_line(controller: &Arc<PhaseController>, line: &str) {
    if let Some(prompt) = line.strip_prefix("/generate ") {
        match controller.generate_avatar(prompt).await {
            Ok(generated) => {
                println!("Generated {}", generated.url);
                controller
                    .confirm_generated_avatar(&generated.url, &generated.prompt)
                    .await;
            }
            Err(err) => println!("{err}"),
        }
        return;
    }
    match line.parse::<u8>() {
        Ok(choice @ 1..=6) => {
            controller
                .confirm_premade_avatar(&format!("/static/avatars/avatar{choice}.png"))
                .await;
        }
        _ => println!("Pick 1-6 or use /generate <description>."),
    }
}
