//! Session settings and the sync layer that mirrors them to the server.

use crate::languages::{is_known_language, TranslationEngine};
use crate::protocol::{ClientMessage, InitialSettings};
use crate::transport::TransportHandle;
use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use serde_json::Value;

pub const MAX_LANES: usize = 3;
pub const DEFAULT_SILENCE_THRESHOLD: f64 = 0.8;

/// Controller-side settings snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// One selection per lane slot; `None` means the slot is unset.
    pub lane_selection: [Option<String>; MAX_LANES],
    /// Seconds of silence that finalize a segment.
    pub silence_threshold: f64,
    pub engine: TranslationEngine,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            lane_selection: Default::default(),
            silence_threshold: DEFAULT_SILENCE_THRESHOLD,
            engine: TranslationEngine::default(),
        }
    }
}

impl SessionSettings {
    /// Selected languages in slot order, duplicates collapsed to their
    /// first occurrence, unset slots skipped.
    pub fn active_languages(&self) -> Vec<String> {
        let mut langs: Vec<String> = Vec::with_capacity(MAX_LANES);
        for slot in self.lane_selection.iter().flatten() {
            if !langs.iter().any(|l| l == slot) {
                langs.push(slot.clone());
            }
        }
        langs
    }

    /// The consolidated config snapshot the server expects.
    pub fn config_message(&self) -> ClientMessage {
        ClientMessage::Config {
            languages: self.active_languages(),
            silence_threshold: self.silence_threshold,
            translation_engine: self.engine.as_str().to_string(),
        }
    }
}

/// Keeps local settings and the server in agreement. Every mutation
/// pushes a fresh consolidated snapshot; pushes while disconnected are
/// dropped and the next `Opened` push covers them.
pub struct SettingsSync {
    settings: SessionSettings,
    transport: TransportHandle,
}

impl SettingsSync {
    pub fn new(transport: TransportHandle) -> Self {
        Self {
            settings: SessionSettings::default(),
            transport,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Set or clear a lane's language. Unknown codes and codes the
    /// current engine cannot serve are refused.
    pub fn select_language(&mut self, slot: usize, code: Option<&str>) -> Result<()> {
        if slot >= MAX_LANES {
            return Err(anyhow!("lane slot {} out of range", slot));
        }
        if let Some(code) = code {
            if !is_known_language(code) {
                return Err(anyhow!("unknown language code: {}", code));
            }
            if !self.settings.engine.supports(code) {
                return Err(anyhow!(
                    "{} does not support language: {}",
                    self.settings.engine,
                    code
                ));
            }
        }
        self.settings.lane_selection[slot] = code.map(String::from);
        self.push_config();
        Ok(())
    }

    /// Commit a new silence threshold (seconds).
    pub fn commit_silence_threshold(&mut self, seconds: f64) -> Result<()> {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(anyhow!("silence threshold must be positive: {}", seconds));
        }
        self.settings.silence_threshold = seconds;
        self.push_config();
        Ok(())
    }

    /// Switch translation engine. Lane selections the new engine cannot
    /// serve reset to unset; the returned slots tell the UI which ones.
    pub fn select_engine(&mut self, engine: TranslationEngine) -> Vec<usize> {
        self.settings.engine = engine;
        let mut reset = Vec::new();
        for (slot, selection) in self.settings.lane_selection.iter_mut().enumerate() {
            if let Some(code) = selection {
                if !engine.supports(code) {
                    info!("engine {} dropped lane {} ({})", engine, slot, code);
                    *selection = None;
                    reset.push(slot);
                }
            }
        }
        self.push_config();
        reset
    }

    /// Forward raw tuning text. Must parse as a JSON object; anything
    /// else fails locally and nothing reaches the server.
    pub fn submit_tuning(&self, raw: &str) -> Result<()> {
        let params: Value = serde_json::from_str(raw)
            .map_err(|e| anyhow!("tuning parameters are not valid JSON: {}", e))?;
        if !params.is_object() {
            return Err(anyhow!("tuning parameters must be a JSON object"));
        }
        if !self.transport.send_control(&ClientMessage::Tuning { params }) {
            warn!("tuning push dropped: channel not open");
        }
        Ok(())
    }

    /// Apply the server's initial snapshot from `session_init`.
    pub fn apply_session_init(&mut self, init: &InitialSettings) {
        self.settings.silence_threshold = init.silence_threshold;
        match init.translation_engine.parse() {
            Ok(engine) => self.settings.engine = engine,
            Err(e) => warn!("session_init: {}", e),
        }
        debug!(
            "session_init applied: threshold={}s engine={}",
            self.settings.silence_threshold, self.settings.engine
        );
    }

    /// Push the full current snapshot. Called on every `Opened` event so
    /// a reconnected server sees the latest state.
    pub fn push_current(&self) {
        self.push_config();
    }

    fn push_config(&self) {
        if !self.transport.send_control(&self.settings.config_message()) {
            debug!("config push dropped: channel not open");
        }
    }
}
