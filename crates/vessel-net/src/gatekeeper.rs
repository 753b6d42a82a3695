//! Challenge-response authentication over the text-framed stream (§4.5).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use tracing::debug;

use crate::error::AuthError;
use crate::session::Vessel;

const AUTH_TIMEOUT: Duration = Duration::from_secs(30);
const CHALLENGE_NONCE_LEN: usize = 16;

type HmacSha256 = Hmac<Sha256>;

/// Verifies a session's identity against a shared secret known to both
/// sides, gating broadcast eligibility on success.
pub struct GateKeeper {
    shared_secret: Vec<u8>,
}

impl GateKeeper {
    pub fn new(shared_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            shared_secret: shared_secret.into(),
        }
    }

    /// Drives the full challenge/response exchange for `session`. On
    /// success, marks the session authenticated and sends `AUTH_SUCCESS`.
    /// On any failure, sends `AUTH_FAILED` (best-effort) and returns the
    /// error; the caller is responsible for disconnecting the session.
    pub async fn authenticate(&self, session: &Vessel) -> Result<(), AuthError> {
        let challenge = self.generate_challenge();

        {
            let mut writer = session.writer().lock().await;
            writer
                .write_line(&format!("AUTH_CHALLENGE|{challenge}"))
                .await
                .map_err(|_| AuthError::Io(std::io::Error::other("write failed")))?;
        }

        let outcome = tokio::time::timeout(AUTH_TIMEOUT, self.read_response(session))
            .await
            .map_err(|_| AuthError::Timeout)
            .and_then(|inner| inner)
            .and_then(|response| self.verify(&challenge, &response));

        match outcome {
            Ok(()) => {
                session.mark_authenticated();
                self.send_line(session, "AUTH_SUCCESS").await;
                Ok(())
            }
            Err(err) => {
                debug!(session_id = session.id(), %err, "authentication failed");
                self.send_line(session, "AUTH_FAILED").await;
                Err(err)
            }
        }
    }

    fn generate_challenge(&self) -> String {
        let unix_seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let mut nonce = [0u8; CHALLENGE_NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);
        format!("{unix_seconds}:{}", BASE64.encode(nonce))
    }

    fn expected_response(&self, challenge: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.shared_secret)
            .expect("HMAC accepts a key of any length");
        mac.update(challenge.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }

    async fn read_response(&self, session: &Vessel) -> Result<String, AuthError> {
        let mut reader = session.reader().lock().await;
        let line = reader.read_line().await.map_err(|_| {
            AuthError::Io(std::io::Error::other("stream closed during authentication"))
        })?;
        line.strip_prefix("AUTH_RESPONSE|")
            .map(str::to_string)
            .ok_or(AuthError::BadPrefix)
    }

    /// Recomputes the expected MAC for `challenge` and compares it against
    /// `response` (base64) using `Mac::verify_slice`'s constant-time check.
    fn verify(&self, challenge: &str, response: &str) -> Result<(), AuthError> {
        let response_bytes = BASE64.decode(response)?;
        let mut mac = HmacSha256::new_from_slice(&self.shared_secret)
            .expect("HMAC accepts a key of any length");
        mac.update(challenge.as_bytes());
        mac.verify_slice(&response_bytes).map_err(|_| AuthError::Mismatch)
    }

    async fn send_line(&self, session: &Vessel, line: &str) {
        let mut writer = session.writer().lock().await;
        if let Err(err) = writer.write_line(line).await {
            debug!(session_id = session.id(), %err, "failed to send {line} after auth outcome");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_round_trips_for_any_challenge() {
        let gate = GateKeeper::new(b"shared-secret".to_vec());
        let challenge = "1700000000:AAAAAAAAAAAAAAAAAAAAAA==";
        let response = gate.expected_response(challenge);

        assert!(gate.verify(challenge, &response).is_ok());
    }

    #[test]
    fn rejects_response_with_the_wrong_key() {
        let gate = GateKeeper::new(b"shared-secret".to_vec());
        let challenge = "1700000000:AAAAAAAAAAAAAAAAAAAAAA==";

        let mut mac = HmacSha256::new_from_slice(b"wrong-secret").unwrap();
        mac.update(challenge.as_bytes());
        let response = BASE64.encode(mac.finalize().into_bytes());

        assert!(gate.verify(challenge, &response).is_err());
    }

    #[test]
    fn rejects_non_base64_response() {
        let gate = GateKeeper::new(b"shared-secret".to_vec());
        assert!(gate.verify("challenge", "not base64!!").is_err());
    }

    #[test]
    fn challenge_format_is_seconds_colon_base64() {
        let gate = GateKeeper::new(b"shared-secret".to_vec());
        let challenge = gate.generate_challenge();
        let mut parts = challenge.splitn(2, ':');
        let seconds = parts.next().unwrap();
        let nonce = parts.next().unwrap();
        assert!(seconds.parse::<u64>().is_ok());
        assert!(BASE64.decode(nonce).is_ok());
    }
}
