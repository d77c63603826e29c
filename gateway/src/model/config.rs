//! Model realtime endpoint constants.

/// Realtime API websocket endpoint; the model name is appended as a query
/// parameter.
pub const MODEL_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Audio format for both directions of the bridge. The carrier leg is
/// 8 kHz µ-law, so the model is configured to speak the same encoding and
/// frames pass through without resampling.
pub const PCMU_FORMAT: &str = "g711_ulaw";

/// Build the websocket URL for a model name.
pub fn realtime_url(model: &str) -> String {
    format!("{MODEL_REALTIME_URL}?model={model}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_carries_model_parameter() {
        let url = realtime_url("gpt-4o-realtime-preview");
        assert!(url.starts_with("wss://api.openai.com/v1/realtime?model="));
        assert!(url.ends_with("gpt-4o-realtime-preview"));
    }
}
