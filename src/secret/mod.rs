//! Rotating client secret and its honeypot twin.
//!
//! Browsers rendering the web UI receive the current secret inside a
//! randomized script and echo it back; scripted callers replaying an old
//! value fail once it has rotated out. A separate bogus secret is handed to
//! clients that never rendered the page, and presenting it marks the
//! caller as a scraper.

mod honeypot;
mod obfuscate;

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::Rng;
use tracing::{debug, info};

use crate::storage::{SharedStore, StoreResult};

pub use honeypot::{detect_placeholder, emoji, translate_placeholder};
pub use obfuscate::obfuscate;

const PREVIOUS_KEY: &str = "secret_0";
const CURRENT_KEY: &str = "secret_1";
const BOGUS_KEY: &str = "secret_bogus";

const SECRET_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SECRET_LEN: usize = 7;

/// Seven random characters from `A-Z0-9`.
pub fn generate_secret() -> String {
    let mut rng = rand::rng();
    (0..SECRET_LEN)
        .map(|_| SECRET_CHARS[rng.random_range(0..SECRET_CHARS.len())] as char)
        .collect()
}

#[derive(Clone)]
pub struct SecretChallenge {
    store: Arc<dyn SharedStore>,
    bogus_probability: f64,
}

impl SecretChallenge {
    pub fn new(store: Arc<dyn SharedStore>, bogus_probability: f64) -> Self {
        Self {
            store,
            bogus_probability: bogus_probability.clamp(0.0, 1.0),
        }
    }

    /// Create any missing secret material. Safe to call repeatedly.
    pub async fn ensure_seeded(&self) -> StoreResult<()> {
        if !self.store.exists(CURRENT_KEY).await? {
            let current = self.fresh_secret().await?;
            self.store.set_str(CURRENT_KEY, &current).await?;
        }
        if !self.store.exists(PREVIOUS_KEY).await? {
            let previous = self.fresh_secret().await?;
            self.store.set_str(PREVIOUS_KEY, &previous).await?;
        }
        if !self.store.exists(BOGUS_KEY).await? {
            let bogus = self.fresh_secret().await?;
            self.store.set_str(BOGUS_KEY, &bogus).await?;
            info!("Seeded honeypot secret");
        }
        Ok(())
    }

    /// previous <- current, current <- fresh. The bogus secret is untouched.
    pub async fn rotate(&self) -> StoreResult<()> {
        let current = self.store.get_str(CURRENT_KEY).await?;
        if let Some(current) = current {
            self.store.set_str(PREVIOUS_KEY, &current).await?;
        }

        let fresh = self.fresh_secret().await?;
        self.store.set_str(CURRENT_KEY, &fresh).await?;
        debug!("Rotated client secret");
        Ok(())
    }

    /// A secret different from every value currently in use.
    async fn fresh_secret(&self) -> StoreResult<String> {
        let in_use = [
            self.store.get_str(PREVIOUS_KEY).await?,
            self.store.get_str(CURRENT_KEY).await?,
            self.store.get_str(BOGUS_KEY).await?,
        ];
        loop {
            let candidate = generate_secret();
            if !in_use.iter().flatten().any(|s| *s == candidate) {
                return Ok(candidate);
            }
        }
    }

    pub async fn current_secret(&self) -> StoreResult<Option<String>> {
        self.store.get_str(CURRENT_KEY).await
    }

    pub async fn bogus_secret(&self) -> StoreResult<Option<String>> {
        self.store.get_str(BOGUS_KEY).await
    }

    /// True for the current or previous secret. Empty input never matches.
    pub async fn secret_match(&self, secret: &str) -> StoreResult<bool> {
        if secret.is_empty() {
            return Ok(false);
        }
        for key in [CURRENT_KEY, PREVIOUS_KEY] {
            if self.store.get_str(key).await?.as_deref() == Some(secret) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// True for the honeypot secret, checked only some of the time.
    pub async fn secret_bogus_match(&self, secret: &str) -> StoreResult<bool> {
        let sampled = rand::rng().random_bool(self.bogus_probability);
        if secret.is_empty() || !sampled {
            return Ok(false);
        }
        Ok(self.store.get_str(BOGUS_KEY).await?.as_deref() == Some(secret))
    }

    /// Script expression yielding the current secret.
    pub async fn current_secret_js(&self) -> StoreResult<String> {
        Ok(obfuscate(&self.current_secret().await?.unwrap_or_default()))
    }

    /// Script expression yielding the honeypot secret.
    pub async fn bogus_secret_js(&self) -> StoreResult<String> {
        Ok(obfuscate(&self.bogus_secret().await?.unwrap_or_default()))
    }

    pub async fn bogus_secret_b64(&self) -> StoreResult<String> {
        Ok(BASE64.encode(self.bogus_secret().await?.unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    async fn seeded(probability: f64) -> SecretChallenge {
        let challenge = SecretChallenge::new(Arc::new(InMemoryStore::new()), probability);
        challenge.ensure_seeded().await.unwrap();
        challenge
    }

    #[test]
    fn test_generated_secret_format() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 7);
        assert!(secret
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_seeding_is_idempotent() {
        let challenge = seeded(1.0).await;
        let current = challenge.current_secret().await.unwrap();
        let bogus = challenge.bogus_secret().await.unwrap();

        challenge.ensure_seeded().await.unwrap();
        assert_eq!(challenge.current_secret().await.unwrap(), current);
        assert_eq!(challenge.bogus_secret().await.unwrap(), bogus);
    }

    #[tokio::test]
    async fn test_previous_stays_valid_for_one_rotation() {
        let challenge = seeded(1.0).await;
        let original = challenge.current_secret().await.unwrap().unwrap();
        assert!(challenge.secret_match(&original).await.unwrap());

        challenge.rotate().await.unwrap();
        let second = challenge.current_secret().await.unwrap().unwrap();
        assert_ne!(original, second);
        assert!(challenge.secret_match(&original).await.unwrap());
        assert!(challenge.secret_match(&second).await.unwrap());

        challenge.rotate().await.unwrap();
        assert!(!challenge.secret_match(&original).await.unwrap());
        assert!(challenge.secret_match(&second).await.unwrap());
    }

    #[tokio::test]
    async fn test_bogus_is_separate_from_real_secrets() {
        let challenge = seeded(1.0).await;
        let bogus = challenge.bogus_secret().await.unwrap().unwrap();

        for _ in 0..5 {
            let current = challenge.current_secret().await.unwrap().unwrap();
            assert!(!challenge.secret_bogus_match(&current).await.unwrap());
            assert!(!challenge.secret_match(&bogus).await.unwrap());
            assert!(challenge.secret_bogus_match(&bogus).await.unwrap());
            challenge.rotate().await.unwrap();
        }
        assert_eq!(challenge.bogus_secret().await.unwrap().unwrap(), bogus);
    }

    #[tokio::test]
    async fn test_bogus_check_can_be_disabled() {
        let challenge = seeded(0.0).await;
        let bogus = challenge.bogus_secret().await.unwrap().unwrap();
        assert!(!challenge.secret_bogus_match(&bogus).await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_secret_never_matches() {
        let challenge = SecretChallenge::new(Arc::new(InMemoryStore::new()), 1.0);
        assert!(!challenge.secret_match("").await.unwrap());
        assert!(!challenge.secret_bogus_match("").await.unwrap());
    }

    #[tokio::test]
    async fn test_delivery_encodings() {
        let challenge = seeded(1.0).await;
        let current = challenge.current_secret().await.unwrap().unwrap();
        let bogus = challenge.bogus_secret().await.unwrap().unwrap();

        let js = challenge.current_secret_js().await.unwrap();
        assert_eq!(obfuscate::tests::decode(&js), current);
        let js = challenge.bogus_secret_js().await.unwrap();
        assert_eq!(obfuscate::tests::decode(&js), bogus);

        let b64 = challenge.bogus_secret_b64().await.unwrap();
        assert_eq!(BASE64.decode(b64).unwrap(), bogus.as_bytes());
    }
}
