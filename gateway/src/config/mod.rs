//! Configuration for the outcall gateway.
//!
//! All settings come from environment variables (a `.env` file is loaded by
//! `main` before this runs). Settings are read once at startup into an
//! immutable [`Settings`] value that the rest of the process shares through
//! [`crate::state::AppState`].
//!
//! # Example
//! ```rust,no_run
//! use outcall_gateway::config::Settings;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::from_env()?;
//! println!("listening on {}", settings.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

/// Last-resort viewer token secret when no secret-shaped variable is set.
/// Only acceptable for local development; reaching it is logged at warn.
const INSECURE_DEV_SECRET: &str = "insecure-dev-viewer-secret";

/// Default listen port when neither `PORT` nor `MCP_PORT` is set.
const DEFAULT_PORT: u16 = 8000;

/// Configuration errors surfaced at startup. Fatal: the process exits
/// nonzero instead of running with a broken configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },

    #[error("PUBLIC_URL must start with http:// or https://, got '{0}'")]
    InvalidPublicUrl(String),
}

/// Telephony carrier (Twilio) credentials and numbers.
///
/// All fields are optional: an unconfigured carrier is not a startup error.
/// `initiate-call` surfaces it as a `failed` session instead, so the widget
/// can render the problem without a second round trip.
#[derive(Debug, Clone, Default)]
pub struct TwilioSettings {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
    /// Fallback callee when the roster has no number for the contact.
    pub default_to_number: Option<String>,
}

impl TwilioSettings {
    /// True when the carrier REST API can actually be called.
    pub fn is_configured(&self) -> bool {
        self.account_sid.is_some() && self.auth_token.is_some() && self.from_number.is_some()
    }
}

/// Realtime/summary model (OpenAI) settings.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub api_key: Option<String>,
    /// Realtime model name, appended to the websocket URL as `?model=`.
    pub realtime_model: String,
    /// Voice for assistant audio output.
    pub voice: String,
    /// Input-audio transcription model.
    pub transcription_model: String,
    /// Model used for post-call summary synthesis.
    pub summary_model: String,
    /// Optional path to a prompt template file with `{{name}}` placeholders.
    pub prompt_template_path: Option<PathBuf>,
    /// Fallback system prompt text when no template file is available.
    pub system_prompt: Option<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            realtime_model: "gpt-4o-realtime-preview".to_string(),
            voice: "alloy".to_string(),
            transcription_model: "whisper-1".to_string(),
            summary_model: "gpt-4o-mini".to_string(),
            prompt_template_path: None,
            system_prompt: None,
        }
    }
}

/// Defaults for the call brief fed into the model's instructions and the
/// call-panel descriptor. Each has a safe built-in so a missing variable
/// never fails a bridge.
#[derive(Debug, Clone)]
pub struct BriefDefaults {
    pub student_name: String,
    pub parent_name: String,
    pub parent_relationship: String,
    pub parent_number_label: String,
    pub school_name: String,
    pub teacher_role: String,
}

impl Default for BriefDefaults {
    fn default() -> Self {
        Self {
            student_name: "the student".to_string(),
            parent_name: "the parent".to_string(),
            parent_relationship: "guardian".to_string(),
            parent_number_label: "primary contact".to_string(),
            school_name: "the school".to_string(),
            teacher_role: "attendance office".to_string(),
        }
    }
}

/// Process-wide settings, read once at init.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,

    /// Externally reachable base URL. Drives the media-stream URL in
    /// call-control documents, status-callback URLs, and logs websocket URLs
    /// handed to widgets.
    pub public_url: String,

    pub twilio: TwilioSettings,
    pub model: ModelSettings,
    pub brief: BriefDefaults,

    /// Secret for HMAC-signed viewer tokens.
    pub viewer_token_secret: String,
    /// Viewer token lifetime in seconds.
    pub viewer_token_ttl_secs: u64,

    /// Per-session event log retention.
    pub event_log_cap: usize,
    /// Compute an audio level every N carrier media frames.
    pub audio_level_stride: u32,
    /// Gain applied to the normalized RMS before clamping.
    pub audio_level_gain: f32,

    pub roster_db_path: PathBuf,
    pub assets_dir: PathBuf,
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match env_opt("PORT").or_else(|| env_opt("MCP_PORT")) {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                name: "PORT".to_string(),
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        let public_url = env_opt("PUBLIC_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("http://localhost:{port}"));
        if !public_url.starts_with("http://") && !public_url.starts_with("https://") {
            return Err(ConfigError::InvalidPublicUrl(public_url));
        }

        let twilio = TwilioSettings {
            account_sid: env_opt("TWILIO_ACCOUNT_SID"),
            auth_token: env_opt("TWILIO_AUTH_TOKEN"),
            from_number: env_opt("TWILIO_FROM_NUMBER"),
            default_to_number: env_opt("TWILIO_TO_NUMBER_DEFAULT"),
        };

        let model_defaults = ModelSettings::default();
        let model = ModelSettings {
            api_key: env_opt("OPENAI_API_KEY"),
            realtime_model: env_or("OPENAI_REALTIME_MODEL", &model_defaults.realtime_model),
            voice: env_or("OPENAI_REALTIME_VOICE", &model_defaults.voice),
            transcription_model: env_or(
                "OPENAI_REALTIME_TRANSCRIPTION_MODEL",
                &model_defaults.transcription_model,
            ),
            summary_model: env_or("OPENAI_SUMMARY_MODEL", &model_defaults.summary_model),
            prompt_template_path: env_opt("OPENAI_REALTIME_PROMPT_TEMPLATE").map(PathBuf::from),
            system_prompt: env_opt("OPENAI_REALTIME_SYSTEM_PROMPT"),
        };

        let brief_defaults = BriefDefaults::default();
        let brief = BriefDefaults {
            student_name: env_or("CALL_STUDENT_NAME", &brief_defaults.student_name),
            parent_name: env_or("CALL_PARENT_NAME", &brief_defaults.parent_name),
            parent_relationship: env_or(
                "CALL_PARENT_RELATIONSHIP",
                &brief_defaults.parent_relationship,
            ),
            parent_number_label: env_or(
                "CALL_PARENT_NUMBER_LABEL",
                &brief_defaults.parent_number_label,
            ),
            school_name: env_or("CALL_SCHOOL_NAME", &brief_defaults.school_name),
            teacher_role: env_or("CALL_TEACHER_ROLE", &brief_defaults.teacher_role),
        };

        let viewer_token_secret = resolve_viewer_secret(
            env_opt("CALL_VIEWER_TOKEN_SECRET"),
            twilio.auth_token.clone(),
            model.api_key.clone(),
        );

        let event_log_cap = parse_env_or("EVENT_LOG_CAP", 5000usize)?;
        let audio_level_stride = parse_env_or("AUDIO_LEVEL_FRAME_STRIDE", 8u32)?;
        let audio_level_gain = parse_env_or("AUDIO_LEVEL_GAIN", 3.4f32)?;

        Ok(Self {
            host: env_or("HOST", "0.0.0.0"),
            port,
            public_url,
            twilio,
            model,
            brief,
            viewer_token_secret,
            viewer_token_ttl_secs: parse_env_or("CALL_VIEWER_TOKEN_TTL_SECS", 600u64)?,
            event_log_cap,
            audio_level_stride,
            audio_level_gain,
            roster_db_path: env_opt("ROSTER_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/roster.db")),
            assets_dir: env_opt("ASSETS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("assets")),
        })
    }

    /// Socket address string for the listener.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Websocket base derived from the public URL (`http` → `ws`,
    /// `https` → `wss`).
    pub fn ws_base(&self) -> String {
        derive_ws_base(&self.public_url)
    }

    /// Absolute URL of the viewer fan-out websocket.
    pub fn logs_ws_url(&self) -> String {
        format!("{}/twilio/logs", self.ws_base())
    }
}

/// Zeroize secrets when the settings value is dropped.
impl Drop for Settings {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut token) = self.twilio.auth_token {
            token.zeroize();
        }
        if let Some(ref mut key) = self.model.api_key {
            key.zeroize();
        }
        self.viewer_token_secret.zeroize();
    }
}

/// Viewer token secret fallback chain: dedicated secret, then other
/// secret-shaped variables, then the insecure dev literal.
fn resolve_viewer_secret(
    dedicated: Option<String>,
    carrier_token: Option<String>,
    model_key: Option<String>,
) -> String {
    if let Some(secret) = dedicated {
        return secret;
    }
    if let Some(secret) = carrier_token {
        warn!("CALL_VIEWER_TOKEN_SECRET not set, falling back to TWILIO_AUTH_TOKEN");
        return secret;
    }
    if let Some(secret) = model_key {
        warn!("CALL_VIEWER_TOKEN_SECRET not set, falling back to OPENAI_API_KEY");
        return secret;
    }
    warn!("no viewer token secret configured, using the insecure development default");
    INSECURE_DEV_SECRET.to_string()
}

fn derive_ws_base(public_url: &str) -> String {
    if let Some(rest) = public_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = public_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        public_url.to_string()
    }
}

/// Read an env var, treating empty strings as unset.
fn env_opt(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

fn env_or(name: &str, default: &str) -> String {
    env_opt(name).unwrap_or_else(|| default.to_string())
}

fn parse_env_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env_opt(name) {
        Some(raw) => raw.parse::<T>().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            value: raw,
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_base_maps_schemes() {
        assert_eq!(derive_ws_base("http://localhost:8000"), "ws://localhost:8000");
        assert_eq!(derive_ws_base("https://calls.example.org"), "wss://calls.example.org");
    }

    #[test]
    fn secret_chain_prefers_dedicated() {
        let secret = resolve_viewer_secret(
            Some("dedicated".into()),
            Some("carrier".into()),
            Some("model".into()),
        );
        assert_eq!(secret, "dedicated");
    }

    #[test]
    fn secret_chain_falls_through() {
        assert_eq!(
            resolve_viewer_secret(None, Some("carrier".into()), None),
            "carrier"
        );
        assert_eq!(
            resolve_viewer_secret(None, None, Some("model".into())),
            "model"
        );
        assert_eq!(resolve_viewer_secret(None, None, None), INSECURE_DEV_SECRET);
    }

    #[test]
    fn carrier_configured_requires_all_three() {
        let mut twilio = TwilioSettings {
            account_sid: Some("AC123".into()),
            auth_token: Some("token".into()),
            from_number: None,
            default_to_number: None,
        };
        assert!(!twilio.is_configured());
        twilio.from_number = Some("+15550100".into());
        assert!(twilio.is_configured());
    }
}
