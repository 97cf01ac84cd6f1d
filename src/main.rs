use anyhow::{anyhow, Context, Result};
use clap::Parser;
use liveasr_client::audio::{CaptureMode, DefaultSourceFactory};
use liveasr_client::cli::{CliArgs, Command};
use liveasr_client::correlator::ResultCorrelator;
use liveasr_client::render::TerminalSink;
use liveasr_client::session::{SessionController, SessionEvent, StopReason};
use liveasr_client::settings::{SettingsSync, MAX_LANES};
use liveasr_client::transport::{Role, TransportChannel, TransportConfig, TransportEvent};
use log::{debug, error, info, warn};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();

    match args.command {
        Command::Control {
            session_id,
            mic,
            tab_audio,
            file,
            languages,
            silence_threshold,
            engine,
            tuning,
        } => {
            run_control(ControlOptions {
                server: args.server,
                session_id,
                mic,
                tab_audio,
                file,
                languages,
                silence_threshold,
                engine,
                tuning,
            })
            .await
        }
        Command::Watch { session_id } => run_watch(args.server, session_id).await,
    }
}

struct ControlOptions {
    server: String,
    session_id: String,
    mic: Option<Option<String>>,
    tab_audio: bool,
    file: Option<std::path::PathBuf>,
    languages: Vec<String>,
    silence_threshold: f64,
    engine: String,
    tuning: Option<String>,
}

async fn run_control(opts: ControlOptions) -> Result<()> {
    if opts.languages.len() > MAX_LANES {
        return Err(anyhow!("at most {} --lang selections", MAX_LANES));
    }

    let mode = if opts.file.is_some() {
        CaptureMode::File
    } else if opts.tab_audio {
        CaptureMode::TabAudio
    } else {
        CaptureMode::Microphone
    };

    let mut channel = TransportChannel::spawn(TransportConfig::new(
        opts.server,
        opts.session_id,
        Role::Control,
    ));

    let mut settings = SettingsSync::new(channel.handle.clone());
    let engine = opts
        .engine
        .parse()
        .map_err(|e: String| anyhow!(e))
        .context("invalid --engine")?;
    settings.select_engine(engine);
    settings.commit_silence_threshold(opts.silence_threshold)?;
    for (slot, code) in opts.languages.iter().enumerate() {
        settings
            .select_language(slot, Some(code.as_str()))
            .with_context(|| format!("invalid --lang {}", code))?;
    }

    let factory = Arc::new(DefaultSourceFactory {
        microphone: opts.mic.clone().flatten(),
        file: opts.file.clone(),
    });
    let (mut controller, mut session_events) =
        SessionController::new(channel.handle.clone(), factory);

    let mut correlator = ResultCorrelator::controller(TerminalSink::new(MAX_LANES), MAX_LANES);
    for (slot, selection) in settings.settings().lane_selection.iter().enumerate() {
        correlator.set_lane_language(slot, selection.as_deref());
    }

    info!("controlling as {} capture", mode);

    loop {
        tokio::select! {
            event = channel.events.recv() => {
                let Some(event) = event else { break };
                match event {
                    TransportEvent::Opened => {
                        settings.push_current();
                        if let Some(tuning) = &opts.tuning {
                            settings.submit_tuning(tuning)?;
                        }
                        // Capture restarts on every (re)connect; the
                        // previous session died with the channel.
                        if let Err(e) = controller.start(mode).await {
                            error!("{:#}", e);
                            return Err(e);
                        }
                    }
                    TransportEvent::Message(msg) => {
                        if let Some(init) = correlator.handle(&msg) {
                            settings.apply_session_init(&init);
                        }
                    }
                    TransportEvent::ClosedClean => {
                        controller.stop(StopReason::Disconnected);
                    }
                    TransportEvent::Rejected => {
                        controller.handle_rejected();
                        return Err(anyhow!(
                            "stream is already controlled elsewhere (or the server refused the connection)"
                        ));
                    }
                }
            }
            event = session_events.recv() => {
                let Some(event) = event else { break };
                match event {
                    SessionEvent::Started { mode } => {
                        correlator.reset_interim();
                        info!("capture started ({})", mode);
                    }
                    SessionEvent::Stopped { mode, reason } => {
                        debug!("capture stopped ({}, {:?})", mode, reason);
                    }
                    SessionEvent::SourceEnded => {
                        warn!("audio source ended");
                        controller.stop(StopReason::SourceEnded);
                    }
                    SessionEvent::Level(_) => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted; stopping");
                controller.stop(StopReason::UserStop);
                break;
            }
        }
    }

    Ok(())
}

async fn run_watch(server: String, session_id: String) -> Result<()> {
    let mut channel =
        TransportChannel::spawn(TransportConfig::new(server, session_id, Role::Watch));

    let mut correlator = ResultCorrelator::watch(TerminalSink::new(MAX_LANES), MAX_LANES);

    loop {
        tokio::select! {
            event = channel.events.recv() => {
                let Some(event) = event else { break };
                match event {
                    TransportEvent::Opened => info!("watching"),
                    TransportEvent::Message(msg) => {
                        correlator.handle(&msg);
                    }
                    TransportEvent::ClosedClean => {
                        info!("disconnected; waiting to reconnect");
                    }
                    TransportEvent::Rejected => {
                        return Err(anyhow!("server refused the connection"));
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    Ok(())
}
