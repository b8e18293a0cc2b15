use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::constants::INVITATION_TOKEN_BYTES;

/// Opaque join-by-link token. Only its uniqueness matters; it carries no
/// payload and is looked up verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct InvitationToken(String);

impl InvitationToken {
    pub fn generate() -> Self {
        let mut bytes = [0u8; INVITATION_TOKEN_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(base64_url_encode(&bytes))
    }

    /// Wrap a token read back from storage or a request path.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InvitationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn base64_url_encode(data: &[u8]) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD.encode(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_url_safe_and_distinct() {
        let a = InvitationToken::generate();
        let b = InvitationToken::generate();
        assert_ne!(a, b);
        // 18 bytes encode to 24 base64 chars without padding
        assert_eq!(a.as_str().len(), 24);
        assert!(a
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn raw_tokens_are_trimmed() {
        assert_eq!(InvitationToken::from_raw("  abc \n").as_str(), "abc");
    }
}
