use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// A freshly generated recovery token: the plaintext leaves the server once
/// (by mail), only the hash is ever persisted.
pub struct ResetToken {
    pub plaintext: String,
    pub hash: String,
}

/// 32 random bytes of entropy, base64url encoded. A fast hash at rest is
/// enough here: unlike a password the token is unguessable, so there is
/// nothing for a slow hash to protect against.
pub fn generate() -> ResetToken {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let plaintext = URL_SAFE_NO_PAD.encode(bytes);
    let hash = hash_token(&plaintext);
    ResetToken { plaintext, hash }
}

/// Same digest on both the issue and consume paths, so lookups compare
/// hash-to-hash and the plaintext never needs to be stored.
pub fn hash_token(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plaintext_and_stored_hash_differ() {
        let token = generate();
        assert_ne!(token.plaintext, token.hash);
        assert!(!token.hash.contains(&token.plaintext));
    }

    #[test]
    fn hash_is_deterministic_over_the_plaintext() {
        let token = generate();
        assert_eq!(hash_token(&token.plaintext), token.hash);
    }

    #[test]
    fn tokens_are_unique() {
        let a = generate();
        let b = generate();
        assert_ne!(a.plaintext, b.plaintext);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn token_carries_256_bits_of_entropy() {
        // 32 bytes base64url, no padding: ceil(32 * 4 / 3) = 43 chars.
        let token = generate();
        assert_eq!(token.plaintext.len(), 43);
        // sha256 hex digest
        assert_eq!(token.hash.len(), 64);
    }
}
