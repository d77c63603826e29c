//! Viewer token service.
//!
//! Stateless HMAC-SHA256 tokens binding a viewer websocket to exactly one
//! session, with an expiry. The token is `base64url(payload).base64url(sig)`
//! where the payload is a small JSON object and the signature covers the
//! encoded payload bytes. Verification is constant time via `Mac::verify`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Default token lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Serialize, Deserialize)]
struct TokenPayload {
    #[serde(rename = "sessionId")]
    session_id: String,
    /// Unix seconds.
    exp: u64,
}

/// Mints and verifies viewer tokens with a process-wide secret.
pub struct ViewerTokenService {
    secret: Vec<u8>,
    ttl: Duration,
}

impl ViewerTokenService {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl,
        }
    }

    /// Mint a token for `session_id`, valid for the configured TTL.
    pub fn mint(&self, session_id: &str) -> String {
        self.mint_with_expiry(session_id, unix_now() + self.ttl.as_secs())
    }

    fn mint_with_expiry(&self, session_id: &str, exp: u64) -> String {
        let payload = TokenPayload {
            session_id: session_id.to_string(),
            exp,
        };
        // Serialization of a two-field struct cannot fail.
        let payload_json = serde_json::to_vec(&payload).unwrap_or_default();
        let payload_b64 = URL_SAFE_NO_PAD.encode(&payload_json);
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(payload_b64.as_bytes());
        let sig_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{payload_b64}.{sig_b64}")
    }

    /// Verify a token against a session id. Any parse failure, signature
    /// mismatch, session mismatch, or expiry yields `false`; callers get no
    /// finer distinction.
    pub fn verify(&self, session_id: &str, token: &str) -> bool {
        let Some((payload_b64, sig_b64)) = token.split_once('.') else {
            return false;
        };
        let Ok(sig) = URL_SAFE_NO_PAD.decode(sig_b64) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.secret) else {
            return false;
        };
        mac.update(payload_b64.as_bytes());
        if mac.verify_slice(&sig).is_err() {
            return false;
        }
        let Ok(payload_json) = URL_SAFE_NO_PAD.decode(payload_b64) else {
            return false;
        };
        let Ok(payload) = serde_json::from_slice::<TokenPayload>(&payload_json) else {
            return false;
        };
        payload.session_id == session_id && payload.exp > unix_now()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
