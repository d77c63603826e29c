//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::config::Settings;
use crate::mcp::HostHub;
use crate::session::{SessionStore, ViewerTokenService};
use crate::summary::Synthesizer;
use crate::tools::roster::RosterStore;

/// Process-wide state handed to every handler. Built once at startup.
pub struct AppState {
    pub settings: Settings,
    pub sessions: Arc<SessionStore>,
    pub tokens: ViewerTokenService,
    pub summarizer: Synthesizer,
    pub roster: RosterStore,
    /// Live host transport streams.
    pub hosts: HostHub,
    /// Shared HTTP client for the carrier REST API and the summary model.
    pub http: reqwest::Client,
}

impl AppState {
    pub async fn new(settings: Settings) -> anyhow::Result<Arc<Self>> {
        let sessions = Arc::new(SessionStore::new(settings.event_log_cap));
        let tokens = ViewerTokenService::new(
            &settings.viewer_token_secret,
            Duration::from_secs(settings.viewer_token_ttl_secs),
        );
        let roster = RosterStore::open(&settings.roster_db_path)
            .await
            .context("opening roster store")?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("building HTTP client")?;

        Ok(Arc::new(Self {
            settings,
            sessions,
            tokens,
            summarizer: Synthesizer::new(),
            roster,
            hosts: HostHub::new(),
            http,
        }))
    }
}
