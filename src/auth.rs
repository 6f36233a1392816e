use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Issues opaque session tokens.
///
/// A token is the hex HMAC-SHA256 of the user id, a per-minter counter and
/// the issue time, keyed by the SHA-256 of the server secret. The counter
/// keeps tokens unique even when two are minted in the same nanosecond.
pub struct TokenMinter {
    key: Vec<u8>,
    issued: u64,
}

impl TokenMinter {
    pub fn new(secret: &str) -> Self {
        let mut sha256_hasher = Sha256::new();
        sha256_hasher.update(secret.as_bytes());
        Self {
            key: sha256_hasher.finalize().to_vec(),
            issued: 0,
        }
    }

    pub fn mint(&mut self, user_id: &str) -> String {
        self.issued += 1;
        let issued_at = Utc::now().timestamp_nanos_opt().unwrap_or_default();

        let mut hmac_hasher =
            HmacSha256::new_from_slice(&self.key).expect("HMAC accepts keys of any length");
        hmac_hasher.update(user_id.as_bytes());
        hmac_hasher.update(&self.issued.to_be_bytes());
        hmac_hasher.update(&issued_at.to_be_bytes());

        to_hex(&hmac_hasher.finalize().into_bytes())
    }
}

pub(crate) fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn tokens_are_hex_sha256_sized() {
        let token = TokenMinter::new("secret").mint("alice");

        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn repeated_mints_never_collide() {
        let mut minter = TokenMinter::new("secret");
        let tokens: HashSet<_> = (0..500).map(|_| minter.mint("alice")).collect();

        assert_eq!(tokens.len(), 500);
    }
}
