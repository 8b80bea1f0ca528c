//! Live protocol message shapes.
//!
//! Each direction is a closed tagged union carried as a JSON object with
//! exactly one variant-specific field populated; decoding inspects which
//! field is present. Outbound realtime input additionally validates the
//! exactly-one rule client-side before anything is sent.

use crate::codec::duration_str;
use crate::error::{ApiError, Error, ErrorContext};
use crate::Result;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// A single piece of turn content.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: Some(text.into()),
                ..Part::default()
            }],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<Value>,
}

/// Raw media bytes, base64 on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

impl Blob {
    pub fn new(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }
}

/// Speech synthesis configuration negotiated at setup.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_config: Option<Value>,
    /// Only valid on the project-addressed backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_speaker_voice_config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
}

/// Session-resumption request parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionResumption {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    /// Only valid on the project-addressed backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transparent: Option<bool>,
}

/// Connection-time parameters supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct LiveConnectConfig {
    pub generation_config: Option<Value>,
    pub speech_config: Option<SpeechConfig>,
    pub system_instruction: Option<Content>,
    pub tools: Option<Vec<Value>>,
    pub session_resumption: Option<SessionResumption>,
    pub input_audio_transcription: bool,
    pub output_audio_transcription: bool,
}

impl LiveConnectConfig {
    /// Fail fast on option combinations the key-addressed backend rejects,
    /// before anything goes over the wire.
    pub(crate) fn validate_for(&self, key_addressed: bool) -> Result<()> {
        if !key_addressed {
            return Ok(());
        }
        if self
            .speech_config
            .as_ref()
            .is_some_and(|s| s.multi_speaker_voice_config.is_some())
        {
            return Err(Error::build_with_context(
                "multi-speaker voice configuration is not supported on the key-addressed backend",
                ErrorContext::new()
                    .with_field_path("speech_config.multi_speaker_voice_config")
                    .with_source("live_session"),
            ));
        }
        if self
            .session_resumption
            .as_ref()
            .is_some_and(|r| r.transparent == Some(true))
        {
            return Err(Error::build_with_context(
                "transparent session resumption is not supported on the key-addressed backend",
                ErrorContext::new()
                    .with_field_path("session_resumption.transparent")
                    .with_source("live_session"),
            ));
        }
        Ok(())
    }
}

/// The `setup` message negotiated at connect time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LiveClientSetup {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_resumption: Option<SessionResumption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<Value>,
}

/// Turn-structured content from the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LiveClientContent {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub turns: Vec<Content>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub turn_complete: bool,
}

/// Incremental realtime input. Exactly one field may be populated per call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LiveRealtimeInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<Blob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<Blob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<Blob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_start: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_end: Option<Value>,
}

impl LiveRealtimeInput {
    pub fn media(blob: Blob) -> Self {
        Self {
            media: Some(blob),
            ..Self::default()
        }
    }

    pub fn audio(blob: Blob) -> Self {
        Self {
            audio: Some(blob),
            ..Self::default()
        }
    }

    pub fn video(blob: Blob) -> Self {
        Self {
            video: Some(blob),
            ..Self::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let populated = [
            self.media.is_some(),
            self.audio.is_some(),
            self.video.is_some(),
            self.text.is_some(),
            self.activity_start.is_some(),
            self.activity_end.is_some(),
        ]
        .iter()
        .filter(|p| **p)
        .count();
        if populated != 1 {
            return Err(Error::build_with_context(
                format!("realtime input must populate exactly one field, got {}", populated),
                ErrorContext::new()
                    .with_field_path("realtime_input")
                    .with_source("live_session"),
            ));
        }
        Ok(())
    }
}

/// Function-call results sent back to the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LiveToolResponse {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub function_responses: Vec<Value>,
}

/// Client-to-server union: exactly one field per message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LiveClientMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup: Option<LiveClientSetup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_content: Option<LiveClientContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realtime_input: Option<LiveRealtimeInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_response: Option<LiveToolResponse>,
}

/// Incremental model output for one logical turn; a turn may span several
/// receives.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LiveServerContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_turn: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_complete: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_complete: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_transcription: Option<Transcription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_transcription: Option<Transcription>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transcription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionResumptionUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumable: Option<bool>,
}

/// Advance notice that the server will drop the connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(
        default,
        with = "duration_str",
        skip_serializing_if = "Option::is_none"
    )]
    pub time_left: Option<Duration>,
}

/// Server-to-client union, decoded by field presence.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LiveServerMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_complete: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_content: Option<LiveServerContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_cancellation: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_resumption_update: Option<SessionResumptionUpdate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub go_away: Option<GoAway>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn realtime_input_exactly_one_rule() {
        assert!(LiveRealtimeInput::text("hi").validate().is_ok());
        assert!(LiveRealtimeInput::default().validate().is_err());

        let mut two = LiveRealtimeInput::text("hi");
        two.audio = Some(Blob::new("audio/pcm", b"\x00\x01"));
        assert!(two.validate().is_err());
    }

    #[test]
    fn client_content_wire_shape() {
        let msg = LiveClientMessage {
            client_content: Some(LiveClientContent {
                turns: vec![Content::user_text("hello")],
                turn_complete: true,
            }),
            ..LiveClientMessage::default()
        };
        let wire = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            wire,
            json!({
                "clientContent": {
                    "turns": [{"role": "user", "parts": [{"text": "hello"}]}],
                    "turnComplete": true
                }
            })
        );
    }

    #[test]
    fn server_union_decodes_by_field_presence() {
        let msg: LiveServerMessage = serde_json::from_str(
            r#"{"serverContent":{"modelTurn":{"parts":[{"text":"hi"}]},"turnComplete":true}}"#,
        )
        .unwrap();
        let content = msg.server_content.unwrap();
        assert_eq!(content.turn_complete, Some(true));
        assert_eq!(
            content.model_turn.unwrap().parts[0].text.as_deref(),
            Some("hi")
        );

        let update: LiveServerMessage = serde_json::from_str(
            r#"{"sessionResumptionUpdate":{"newHandle":"h2","resumable":true}}"#,
        )
        .unwrap();
        assert_eq!(
            update
                .session_resumption_update
                .unwrap()
                .new_handle
                .as_deref(),
            Some("h2")
        );
    }

    #[test]
    fn multi_speaker_rejected_on_key_addressed_backend() {
        let config = LiveConnectConfig {
            speech_config: Some(SpeechConfig {
                multi_speaker_voice_config: Some(json!({"speakers": []})),
                ..SpeechConfig::default()
            }),
            ..LiveConnectConfig::default()
        };
        assert!(config.validate_for(true).is_err());
        assert!(config.validate_for(false).is_ok());
    }

    #[test]
    fn transparent_resumption_rejected_on_key_addressed_backend() {
        let config = LiveConnectConfig {
            session_resumption: Some(SessionResumption {
                handle: None,
                transparent: Some(true),
            }),
            ..LiveConnectConfig::default()
        };
        assert!(config.validate_for(true).is_err());
        assert!(config.validate_for(false).is_ok());
    }

    #[test]
    fn server_messages_compare_by_value() {
        let wire = r#"{"error":{"code":401,"message":"bad key","status":"UNAUTHENTICATED"}}"#;
        let a: LiveServerMessage = serde_json::from_str(wire).unwrap();
        let b: LiveServerMessage = serde_json::from_str(wire).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, LiveServerMessage::default());
    }

    #[test]
    fn blob_encodes_base64() {
        let blob = Blob::new("image/png", b"\x89PNG");
        assert_eq!(blob.data, "iVBORw==");
    }
}
