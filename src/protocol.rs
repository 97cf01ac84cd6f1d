//! Control-plane message types.
//!
//! JSON messages exchanged with the recognition server over the same
//! channel that carries binary audio chunks. Every message is an object
//! with a `type` discriminator.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages sent from the client to the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Marks the boundary of a new capture session so the server can
    /// reset its decoding pipeline.
    #[serde(rename = "stream_start")]
    StreamStart,

    /// Consolidated configuration snapshot. Pushed whenever any field
    /// changes and once on every (re)connect.
    #[serde(rename = "config")]
    Config {
        languages: Vec<String>,
        silence_threshold: f64,
        translation_engine: String,
    },

    /// Opaque recognition tuning parameters, passed through verbatim.
    #[serde(rename = "tuning")]
    Tuning { params: Value },
}

impl ClientMessage {
    pub fn to_json(&self) -> String {
        // Serialization of these variants cannot fail: no non-string
        // keys, no custom serializers.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Server-declared initial settings delivered in `session_init`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InitialSettings {
    pub silence_threshold: f64,
    pub translation_engine: String,
    #[serde(default)]
    pub whisper_params: Value,
}

/// Messages received from the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Provisional transcript fragment, overwritten in place.
    #[serde(rename = "interim_result")]
    InterimResult { text: String },

    /// Finalized transcript segment with its correlation id.
    #[serde(rename = "final_result")]
    FinalResult { id: String, original: String },

    /// Translation of a previously finalized segment.
    #[serde(rename = "translation_result")]
    TranslationResult {
        original_id: String,
        lang: String,
        text: String,
    },

    /// Watch-side lane assignment: which language each panel shows.
    #[serde(rename = "config")]
    Config { languages: Vec<String> },

    /// Controller-side initial settings snapshot.
    #[serde(rename = "session_init")]
    SessionInit { settings: InitialSettings },

    /// Acknowledgement of a `tuning` push.
    #[serde(rename = "tuning_ack")]
    TuningAck {
        #[serde(default)]
        status: Option<String>,
    },

    /// Unrecognized `type` value. Logged and ignored.
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stream_start_serializes_with_type_tag() {
        let json = ClientMessage::StreamStart.to_json();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "stream_start");
    }

    #[test]
    fn test_config_message_round_trip_fields() {
        let msg = ClientMessage::Config {
            languages: vec!["en".into(), "ja".into()],
            silence_threshold: 0.8,
            translation_engine: "deepl".into(),
        };
        let value: Value = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(value["type"], "config");
        assert_eq!(value["languages"], json!(["en", "ja"]));
        assert_eq!(value["silence_threshold"], json!(0.8));
        assert_eq!(value["translation_engine"], "deepl");
    }

    #[test]
    fn test_parse_final_result() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"final_result","id":"17.2","original":"hello"}"#)
                .unwrap();
        assert_eq!(
            msg,
            ServerMessage::FinalResult {
                id: "17.2".into(),
                original: "hello".into()
            }
        );
    }

    #[test]
    fn test_parse_translation_result() {
        let msg: ServerMessage = serde_json::from_str(
            r#"{"type":"translation_result","original_id":"17.2","lang":"en","text":"hi"}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ServerMessage::TranslationResult {
                original_id: "17.2".into(),
                lang: "en".into(),
                text: "hi".into()
            }
        );
    }

    #[test]
    fn test_unknown_type_falls_through() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"heartbeat","seq":3}"#).unwrap();
        assert_eq!(msg, ServerMessage::Unknown);
    }

    #[test]
    fn test_session_init_defaults_whisper_params() {
        let msg: ServerMessage = serde_json::from_str(
            r#"{"type":"session_init","settings":{"silence_threshold":1.2,"translation_engine":"google"}}"#,
        )
        .unwrap();
        match msg {
            ServerMessage::SessionInit { settings } => {
                assert_eq!(settings.silence_threshold, 1.2);
                assert_eq!(settings.translation_engine, "google");
                assert!(settings.whisper_params.is_null());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(serde_json::from_str::<ServerMessage>("{not json").is_err());
    }
}
