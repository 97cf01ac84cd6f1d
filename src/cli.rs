//! Command-line interface definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "liveasr-client")]
#[command(about = "Real-time transcription/translation streaming client")]
#[command(version)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Server base URL
    #[arg(long, global = true, default_value = "ws://127.0.0.1:8000")]
    pub server: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Control a broadcast: capture audio and stream it for recognition
    Control {
        /// Broadcast session identifier
        session_id: String,

        /// Capture from this input device (default device if no name given)
        #[arg(long, conflicts_with_all = ["tab_audio", "file"])]
        mic: Option<Option<String>>,

        /// Capture system/tab audio instead of a microphone
        #[arg(long, conflicts_with = "file")]
        tab_audio: bool,

        /// Stream a decoded media file instead of live capture
        #[arg(long)]
        file: Option<PathBuf>,

        /// Translation language per lane, up to three (repeatable)
        #[arg(long = "lang", value_name = "CODE")]
        languages: Vec<String>,

        /// Seconds of silence that finalize a segment
        #[arg(long, default_value_t = 0.8)]
        silence_threshold: f64,

        /// Translation engine: deepl, google, papago
        #[arg(long, default_value = "deepl")]
        engine: String,

        /// Recognition tuning parameters as a JSON object
        #[arg(long)]
        tuning: Option<String>,
    },

    /// Watch a broadcast: render transcript and translations read-only
    Watch {
        /// Broadcast session identifier
        session_id: String,
    },
}
