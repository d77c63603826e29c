//! Model realtime websocket message types.
//!
//! Client events are sent to the model; server events arrive from it. Both
//! are JSON with a `type` tag. Server events are parsed defensively: fields
//! the protocol marks required are still optional here, and any event type
//! the bridge does not act on lands in the catch-all variant so a protocol
//! addition never tears down a call.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

// =============================================================================
// Session configuration
// =============================================================================

/// Session configuration sent on socket open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,

    /// Rendered system prompt with the call brief interpolated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_format: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<InputAudioTranscription>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputAudioTranscription {
    pub model: String,
}

/// Turn detection configuration. The bridge always runs server VAD with
/// interrupt-response enabled so barge-in fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TurnDetection {
    #[serde(rename = "server_vad")]
    ServerVad {
        #[serde(skip_serializing_if = "Option::is_none")]
        threshold: Option<f32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        prefix_padding_ms: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        silence_duration_ms: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        create_response: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        interrupt_response: Option<bool>,
    },
}

// =============================================================================
// Client events (sent to the model)
// =============================================================================

/// Client events sent over the model websocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Base64 µ-law payload, forwarded verbatim from the carrier.
        audio: String,
    },

    /// Cancel the in-flight response. Tagged with an event id so a race
    /// with natural turn end can be recognized in the error reply.
    #[serde(rename = "response.cancel")]
    ResponseCancel {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
    },

    /// Truncate an assistant item to what the listener actually heard.
    #[serde(rename = "conversation.item.truncate")]
    ConversationItemTruncate {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        item_id: String,
        content_index: u32,
        audio_end_ms: u64,
    },
}

impl ClientEvent {
    /// Append a raw base64 payload without re-encoding.
    pub fn audio_append_b64(payload: &str) -> Self {
        ClientEvent::InputAudioBufferAppend {
            audio: payload.to_string(),
        }
    }

    /// Append raw audio bytes.
    pub fn audio_append(data: &[u8]) -> Self {
        ClientEvent::InputAudioBufferAppend {
            audio: BASE64_STANDARD.encode(data),
        }
    }
}

// =============================================================================
// Server events (received from the model)
// =============================================================================

/// Server events the bridge acts on. Unrecognized types collapse into
/// `Unrecognized` and are logged at debug by the bridge.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "error")]
    Error { error: ModelApiError },

    #[serde(rename = "session.created")]
    SessionCreated {},

    #[serde(rename = "session.updated")]
    SessionUpdated {},

    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {
        #[serde(default)]
        audio_start_ms: Option<u64>,
        #[serde(default)]
        item_id: Option<String>,
    },

    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {
        #[serde(default)]
        audio_end_ms: Option<u64>,
        #[serde(default)]
        item_id: Option<String>,
    },

    /// The committed recipient turn, carrying its ordering anchor.
    #[serde(rename = "input_audio_buffer.committed")]
    InputAudioBufferCommitted {
        #[serde(default)]
        previous_item_id: Option<String>,
        item_id: String,
    },

    /// Recipient transcription delta.
    #[serde(rename = "conversation.item.input_audio_transcription.delta")]
    InputTranscriptionDelta {
        item_id: String,
        #[serde(default)]
        delta: Option<String>,
    },

    /// Recipient transcription final.
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscriptionCompleted {
        item_id: String,
        #[serde(default)]
        transcript: Option<String>,
    },

    /// Assistant transcript delta.
    #[serde(
        rename = "response.output_audio_transcript.delta",
        alias = "response.audio_transcript.delta"
    )]
    OutputTranscriptDelta {
        item_id: String,
        #[serde(default)]
        delta: Option<String>,
    },

    /// Assistant transcript final.
    #[serde(
        rename = "response.output_audio_transcript.done",
        alias = "response.audio_transcript.done"
    )]
    OutputTranscriptDone {
        item_id: String,
        #[serde(default)]
        transcript: Option<String>,
    },

    /// Assistant audio chunk, forwarded to the carrier.
    #[serde(
        rename = "response.output_audio.delta",
        alias = "response.audio.delta"
    )]
    OutputAudioDelta {
        #[serde(default)]
        response_id: Option<String>,
        item_id: String,
        #[serde(default)]
        content_index: u32,
        /// Base64 µ-law payload.
        delta: String,
    },

    #[serde(rename = "response.created")]
    ResponseCreated {
        #[serde(default)]
        response: Option<ResponseInfo>,
    },

    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: Option<ResponseInfo>,
    },

    /// Anything else. Recorded, never acted on.
    #[serde(other)]
    Unrecognized,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Error payload from the model. Every field optional; real traffic has
/// omitted each of them at some point.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelApiError {
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    /// Client event id this error replies to, when the model knows it.
    #[serde(default)]
    pub event_id: Option<String>,
}

impl ModelApiError {
    pub fn message_or_default(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| "model error".to_string())
    }
}
