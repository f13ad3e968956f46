use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Issues the opaque tokens shown as QR codes.
///
/// Attendance codes are `<user_id>.<signature>` so a scanner can resolve the
/// member without a lookup table; the signature binds the code to one event.
#[derive(Clone)]
pub struct CodeSigner {
    mac: HmacSha256,
}

impl CodeSigner {
    pub fn new(secret: &str) -> anyhow::Result<Self> {
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| anyhow::anyhow!("invalid code secret: {}", e))?;
        Ok(Self { mac })
    }

    pub fn attendance_code(&self, event_id: Uuid, user_id: Uuid) -> String {
        let signature = self.sign(&attendance_payload(event_id, user_id));
        format!("{}.{}", user_id, B64.encode(signature))
    }

    /// Returns the member the code was issued to, if it is valid for `event_id`.
    pub fn verify_attendance_code(&self, event_id: Uuid, code: &str) -> Option<Uuid> {
        let (user_part, signature_part) = code.trim().split_once('.')?;
        let user_id: Uuid = user_part.parse().ok()?;
        let signature = B64.decode(signature_part).ok()?;

        let mut mac = self.mac.clone();
        mac.update(attendance_payload(event_id, user_id).as_bytes());
        mac.verify_slice(&signature).ok()?;
        Some(user_id)
    }

    /// Networking code exchanged between members at events.
    pub fn match_code(&self, user_id: Uuid) -> String {
        let signature = self.sign(&format!("match:{}", user_id));
        format!("{}.{}", user_id.simple(), B64.encode(signature))
    }

    fn sign(&self, payload: &str) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

fn attendance_payload(event_id: Uuid, user_id: Uuid) -> String {
    format!("attendance:{}:{}", event_id, user_id)
}
