//! Password hashing behind a small trait seam.

use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Hashes and checks account passwords.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> String;

    fn verify(&self, password: &str, encoded: &str) -> bool;
}

/// Salted, iterated SHA-256, encoded as
/// `sha256$<rounds>$<salt hex>$<digest hex>`.
///
/// The round count travels with each hash, so raising it only affects
/// passwords hashed afterwards.
#[derive(Debug, Clone, Copy)]
pub struct Sha256PasswordHasher {
    rounds: u32,
}

const SCHEME: &str = "sha256";
const SALT_LEN: usize = 16;

impl Sha256PasswordHasher {
    pub const DEFAULT_ROUNDS: u32 = 100_000;
    pub const MAX_ROUNDS: u32 = 10_000_000;

    /// `rounds` is clamped to `1..=MAX_ROUNDS`.
    pub fn with_rounds(rounds: u32) -> Self {
        Self {
            rounds: rounds.clamp(1, Self::MAX_ROUNDS),
        }
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    fn digest(salt: &[u8], password: &str, rounds: u32) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(password.as_bytes());
        let mut state: [u8; 32] = hasher.finalize().into();
        for _ in 1..rounds {
            let mut hasher = Sha256::new();
            hasher.update(state);
            hasher.update(salt);
            state = hasher.finalize().into();
        }
        state
    }
}

impl Default for Sha256PasswordHasher {
    fn default() -> Self {
        Self::with_rounds(Self::DEFAULT_ROUNDS)
    }
}

impl PasswordHasher for Sha256PasswordHasher {
    fn hash(&self, password: &str) -> String {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let digest = Self::digest(&salt, password, self.rounds);
        format!(
            "{SCHEME}${}${}${}",
            self.rounds,
            hex::encode(salt),
            hex::encode(digest)
        )
    }

    fn verify(&self, password: &str, encoded: &str) -> bool {
        let mut parts = encoded.splitn(4, '$');
        let (Some(SCHEME), Some(rounds), Some(salt), Some(expected)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return false;
        };
        let Ok(rounds) = rounds.parse::<u32>() else {
            return false;
        };
        if rounds == 0 || rounds > Self::MAX_ROUNDS {
            return false;
        }
        let (Ok(salt), Ok(expected)) = (hex::decode(salt), hex::decode(expected)) else {
            return false;
        };

        let actual = Self::digest(&salt, password, rounds);
        bool::from(actual.as_slice().ct_eq(expected.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> Sha256PasswordHasher {
        Sha256PasswordHasher::with_rounds(16)
    }

    #[test]
    fn verify_accepts_original_password_only() {
        let hasher = fast();
        let encoded = hasher.hash("correct horse");
        assert!(encoded.starts_with("sha256$16$"));
        assert!(hasher.verify("correct horse", &encoded));
        assert!(!hasher.verify("battery staple", &encoded));
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let hasher = fast();
        assert_ne!(hasher.hash("pw-123456"), hasher.hash("pw-123456"));
    }

    #[test]
    fn rounds_are_read_from_the_stored_hash() {
        let encoded = Sha256PasswordHasher::with_rounds(3).hash("pw-123456");
        assert!(fast().verify("pw-123456", &encoded));
    }

    #[test]
    fn rounds_change_the_digest() {
        let salt = [7u8; SALT_LEN];
        assert_ne!(
            Sha256PasswordHasher::digest(&salt, "pw", 1),
            Sha256PasswordHasher::digest(&salt, "pw", 2)
        );
    }

    #[test]
    fn round_count_is_clamped() {
        assert_eq!(Sha256PasswordHasher::with_rounds(0).rounds(), 1);
        assert_eq!(
            Sha256PasswordHasher::with_rounds(u32::MAX).rounds(),
            Sha256PasswordHasher::MAX_ROUNDS
        );
        assert_eq!(
            Sha256PasswordHasher::default().rounds(),
            Sha256PasswordHasher::DEFAULT_ROUNDS
        );
    }

    #[test]
    fn garbage_encoding_never_verifies() {
        let hasher = fast();
        assert!(!hasher.verify("x", ""));
        assert!(!hasher.verify("x", "md5$1$00$00"));
        assert!(!hasher.verify("x", "sha256$zz$00$00"));
        assert!(!hasher.verify("x", "sha256$0$00$00"));
        assert!(!hasher.verify("x", "sha256$1$zz$zz"));
        assert!(!hasher.verify("x", "sha256$1$00$00"));
    }
}
