//! License key generation.
//!
//! Keys are groups of characters drawn from an alphabet without the easily
//! confused glyphs (0/O, 1/I/L), e.g. `7KQ2M-XH9PC-AWD4R-3NFTB-ZJ6VE`. Uniqueness
//! is settled by reserving the key in the [`KeyRegistry`], never by a separate
//! lookup.

use licensor_core::ports::KeyRegistry;
use licensor_core::{Error, Result};
use rand::Rng;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Characters a generated key group may contain.
pub const KEY_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Longest key accepted anywhere, prefix included.
pub const MAX_KEY_LEN: usize = 64;

/// Longest accepted key prefix.
pub const MAX_PREFIX_LEN: usize = 16;

/// Minimum entropy of the random part of a key.
pub const MIN_ENTROPY_BITS: f64 = 80.0;

/// Shape of generated keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyFormat {
    /// Number of random groups.
    pub groups: usize,
    /// Characters per group.
    pub group_len: usize,
    /// Group delimiter.
    pub separator: char,
    /// Attempts before giving up on finding an unused key.
    pub max_attempts: u32,
}

impl Default for KeyFormat {
    fn default() -> Self {
        Self {
            groups: 5,
            group_len: 5,
            separator: '-',
            max_attempts: 10,
        }
    }
}

impl KeyFormat {
    /// Bits of randomness in a generated key, prefix excluded.
    pub fn entropy_bits(&self) -> f64 {
        (self.groups * self.group_len) as f64 * (KEY_ALPHABET.len() as f64).log2()
    }

    /// Length of a generated key without prefix.
    pub fn key_len(&self) -> usize {
        self.groups * self.group_len + self.groups.saturating_sub(1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.groups == 0 || self.group_len == 0 {
            return Err(Error::Configuration(
                "key format needs at least one non-empty group".into(),
            ));
        }
        if self.separator.is_alphanumeric() || self.separator.is_whitespace() {
            return Err(Error::Configuration(format!(
                "key separator {:?} must be punctuation",
                self.separator
            )));
        }
        if self.entropy_bits() < MIN_ENTROPY_BITS {
            return Err(Error::Configuration(format!(
                "key format carries {:.0} bits of entropy, at least {:.0} required",
                self.entropy_bits(),
                MIN_ENTROPY_BITS
            )));
        }
        if self.key_len() + MAX_PREFIX_LEN + self.separator.len_utf8() > MAX_KEY_LEN {
            return Err(Error::Configuration(format!(
                "prefixed keys would exceed {} characters",
                MAX_KEY_LEN
            )));
        }
        if self.max_attempts == 0 {
            return Err(Error::Configuration("max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    /// Render a fresh random key, with `prefix` as an extra leading group.
    pub fn render(&self, prefix: Option<&str>) -> String {
        let mut rng = OsRng;
        let mut key = String::with_capacity(self.key_len() + MAX_PREFIX_LEN + 1);

        if let Some(prefix) = prefix {
            key.push_str(prefix);
            key.push(self.separator);
        }

        for group in 0..self.groups {
            if group > 0 {
                key.push(self.separator);
            }
            for _ in 0..self.group_len {
                let idx = rng.gen_range(0..KEY_ALPHABET.len());
                key.push(KEY_ALPHABET[idx] as char);
            }
        }

        key
    }

    /// Uppercase alphanumeric groups joined by the separator.
    ///
    /// Applies to custom keys too, so it does not insist on the generated
    /// alphabet or group count.
    pub fn is_well_formed(&self, key: &str) -> bool {
        !key.is_empty()
            && key.len() <= MAX_KEY_LEN
            && key.split(self.separator).all(|group| {
                !group.is_empty()
                    && group
                        .chars()
                        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
            })
    }
}

/// Canonical form of a key typed by a person.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_uppercase()
}

/// Check and normalise a caller-supplied prefix.
pub fn normalize_prefix(prefix: &str) -> Result<String> {
    let prefix = prefix.trim().to_ascii_uppercase();
    if prefix.is_empty() || prefix.len() > MAX_PREFIX_LEN {
        return Err(Error::InvalidInput(format!(
            "prefix must be 1 to {} characters",
            MAX_PREFIX_LEN
        )));
    }
    if !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::InvalidInput(
            "prefix must contain only letters and digits".into(),
        ));
    }
    Ok(prefix)
}

/// Produces keys that are unique for the lifetime of the store.
#[derive(Clone)]
pub struct KeyGenerator {
    format: KeyFormat,
    registry: Arc<dyn KeyRegistry>,
}

impl KeyGenerator {
    pub fn new(format: KeyFormat, registry: Arc<dyn KeyRegistry>) -> Result<Self> {
        format.validate()?;
        Ok(Self { format, registry })
    }

    pub fn format(&self) -> &KeyFormat {
        &self.format
    }

    /// Generate and reserve a new key.
    pub async fn generate(&self, prefix: Option<&str>) -> Result<String> {
        let prefix = prefix.map(normalize_prefix).transpose()?;

        for attempt in 1..=self.format.max_attempts {
            let key = self.format.render(prefix.as_deref());
            if self.registry.reserve(&key).await? {
                debug!(attempt, "Reserved license key");
                return Ok(key);
            }
            warn!(attempt, "Generated license key collided, retrying");
        }

        Err(Error::DuplicateKey)
    }

    /// Reserve a caller-chosen key.
    pub async fn reserve_custom(&self, key: &str) -> Result<String> {
        let key = normalize_key(key);
        if !self.format.is_well_formed(&key) {
            return Err(Error::InvalidInput(
                "custom key must be uppercase letters and digits in groups".into(),
            ));
        }
        if !self.registry.reserve(&key).await? {
            return Err(Error::DuplicateKey);
        }
        Ok(key)
    }
}
