//! Shared fixtures for integration tests.

use std::path::PathBuf;
use std::sync::Arc;

use outcall_gateway::config::{BriefDefaults, ModelSettings, Settings, TwilioSettings};
use outcall_gateway::AppState;

/// Settings with nothing external configured: no carrier, no model key, an
/// in-memory roster store. `initiate-call` under these settings exercises
/// the failed-session path without any network.
pub fn test_settings() -> Settings {
    Settings {
        host: "127.0.0.1".to_string(),
        port: 0,
        public_url: "http://localhost:8000".to_string(),
        twilio: TwilioSettings::default(),
        model: ModelSettings {
            api_key: None,
            ..ModelSettings::default()
        },
        brief: BriefDefaults::default(),
        viewer_token_secret: "integration-test-secret".to_string(),
        viewer_token_ttl_secs: 600,
        event_log_cap: 5000,
        audio_level_stride: 8,
        audio_level_gain: 3.4,
        roster_db_path: PathBuf::from(":memory:"),
        assets_dir: PathBuf::from("assets"),
    }
}

pub async fn test_state() -> Arc<AppState> {
    AppState::new(test_settings()).await.expect("app state")
}
