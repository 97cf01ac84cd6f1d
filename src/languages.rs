//! Language codes and translation-engine capability sets.
//!
//! The server enforces these per engine; the client mirrors them so a
//! selection that the active engine cannot serve is never offered or sent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every language code the UI can offer, across all engines.
pub const LANGUAGE_CODES: &[&str] = &[
    "en", "ja", "zh", "vi", "id", "tr", "de", "it", "pt", "fr", "th",
];

const DEEPL_LANGUAGES: &[&str] = &[
    "en", "ja", "zh", "vi", "id", "tr", "de", "it", "pt", "fr",
];

const GOOGLE_LANGUAGES: &[&str] = &[
    "en", "ja", "zh", "vi", "id", "tr", "de", "it", "pt", "fr", "th",
];

const PAPAGO_LANGUAGES: &[&str] = &["en", "ja", "zh", "vi", "id", "th", "fr", "de"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationEngine {
    Deepl,
    Google,
    Papago,
}

impl Default for TranslationEngine {
    fn default() -> Self {
        TranslationEngine::Deepl
    }
}

impl TranslationEngine {
    /// Language codes this engine can translate into.
    pub fn supported_languages(&self) -> &'static [&'static str] {
        match self {
            TranslationEngine::Deepl => DEEPL_LANGUAGES,
            TranslationEngine::Google => GOOGLE_LANGUAGES,
            TranslationEngine::Papago => PAPAGO_LANGUAGES,
        }
    }

    pub fn supports(&self, code: &str) -> bool {
        self.supported_languages().contains(&code)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TranslationEngine::Deepl => "deepl",
            TranslationEngine::Google => "google",
            TranslationEngine::Papago => "papago",
        }
    }
}

impl fmt::Display for TranslationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TranslationEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deepl" => Ok(TranslationEngine::Deepl),
            "google" => Ok(TranslationEngine::Google),
            "papago" => Ok(TranslationEngine::Papago),
            other => Err(format!("unknown translation engine: {}", other)),
        }
    }
}

/// Whether `code` is a known language code for any engine.
pub fn is_known_language(code: &str) -> bool {
    LANGUAGE_CODES.contains(&code)
}
