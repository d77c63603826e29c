//! Carrier media-stream websocket frames.
//!
//! The carrier speaks JSON frames tagged by `event`. Incoming frames are
//! parsed defensively: unknown events land in the catch-all variant, and
//! nested payloads tolerate missing fields. Outgoing frames carry the
//! stream sid the carrier assigned in `start`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Frames received from the carrier.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum CarrierFrame {
    /// First frame after the socket opens; carries protocol info only.
    Connected {},

    /// Stream metadata: call sid, stream sid, custom parameters.
    Start {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        #[serde(default)]
        start: Option<StartPayload>,
    },

    /// One 20 ms µ-law frame, base64 encoded.
    Media {
        #[serde(default)]
        media: Option<MediaPayload>,
    },

    /// The carrier tore down the stream.
    Stop {
        #[serde(default)]
        stop: Option<StopPayload>,
    },

    /// Playback marker echo; the bridge does not use marks.
    Mark {},

    /// DTMF digit; observed, not acted on.
    Dtmf {},

    #[serde(other)]
    Unrecognized,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartPayload {
    #[serde(rename = "streamSid", default)]
    pub stream_sid: Option<String>,
    #[serde(rename = "callSid", default)]
    pub call_sid: Option<String>,
    #[serde(rename = "customParameters", default)]
    pub custom_parameters: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaPayload {
    #[serde(default)]
    pub track: Option<String>,
    /// Base64 µ-law audio.
    #[serde(default)]
    pub payload: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StopPayload {
    #[serde(rename = "callSid", default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Frames sent to the carrier.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum CarrierOutFrame {
    /// Outbound audio on the stream.
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutMediaPayload,
    },

    /// Discard queued outbound audio (barge-in).
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct OutMediaPayload {
    /// Base64 µ-law audio.
    pub payload: String,
}

impl CarrierOutFrame {
    pub fn media(stream_sid: &str, payload_b64: &str) -> Self {
        CarrierOutFrame::Media {
            stream_sid: stream_sid.to_string(),
            media: OutMediaPayload {
                payload: payload_b64.to_string(),
            },
        }
    }

    pub fn clear(stream_sid: &str) -> Self {
        CarrierOutFrame::Clear {
            stream_sid: stream_sid.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_frame_with_custom_parameters() {
        let json = r#"{
            "event": "start",
            "sequenceNumber": "1",
            "streamSid": "MZ123",
            "start": {
                "accountSid": "AC1",
                "streamSid": "MZ123",
                "callSid": "CA1",
                "tracks": ["inbound"],
                "customParameters": {"sessionId": "s-1"}
            }
        }"#;
        match serde_json::from_str::<CarrierFrame>(json).unwrap() {
            CarrierFrame::Start { stream_sid, start } => {
                assert_eq!(stream_sid.as_deref(), Some("MZ123"));
                let start = start.unwrap();
                assert_eq!(start.call_sid.as_deref(), Some("CA1"));
                assert_eq!(
                    start.custom_parameters.get("sessionId").map(String::as_str),
                    Some("s-1")
                );
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_media_frame() {
        let json = r#"{"event":"media","media":{"track":"inbound","chunk":"2","timestamp":"40","payload":"//8A"}}"#;
        match serde_json::from_str::<CarrierFrame>(json).unwrap() {
            CarrierFrame::Media { media } => {
                assert_eq!(media.unwrap().payload, "//8A");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_is_unrecognized() {
        let json = r#"{"event":"chatter","x":1}"#;
        assert!(matches!(
            serde_json::from_str::<CarrierFrame>(json).unwrap(),
            CarrierFrame::Unrecognized
        ));
    }

    #[test]
    fn clear_frame_wire_shape() {
        let json = serde_json::to_string(&CarrierOutFrame::clear("MZ9")).unwrap();
        assert_eq!(json, r#"{"event":"clear","streamSid":"MZ9"}"#);
    }

    #[test]
    fn media_out_frame_wire_shape() {
        let value =
            serde_json::to_value(CarrierOutFrame::media("MZ9", "AAAA")).unwrap();
        assert_eq!(value["event"], "media");
        assert_eq!(value["streamSid"], "MZ9");
        assert_eq!(value["media"]["payload"], "AAAA");
    }
}
