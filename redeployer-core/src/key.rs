//! Encoded scrypt keys
//!
//! A deploy token is never stored in plain text. Instead the service holds an
//! encoded key policy of the form
//!
//! ```text
//! alg=scrypt$N=16384$r=8$p=1$keyLen=32$hash=<hex>
//! ```
//!
//! plus a hex salt supplied separately. The policy string can be shared and
//! logged; the salt is per-deployment secret material and is attached after
//! parsing.

use std::collections::HashMap;
use std::fmt;

use rand::RngCore;
use thiserror::Error;

/// The only supported algorithm tag
pub const ALGORITHM: &str = "scrypt";

const SEGMENTS: usize = 6;

/// Upper bound on the memory one derivation may need, in bytes
///
/// scrypt allocates `128 * r * N` bytes for its scratch vector plus
/// `128 * r * p` for the block buffer. Keys above this are refused instead
/// of letting the allocation abort the process.
pub const MAX_DERIVATION_MEMORY: u64 = 1 << 30;

/// Errors produced while parsing a key or deriving a hash from it
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The encoded key string is malformed. Every structural problem maps to
    /// this one variant.
    #[error("Invalid key")]
    InvalidKey,

    /// The attached salt is not valid hex
    #[error("Invalid salt: {0}")]
    InvalidSalt(String),

    /// The derivation function rejected the parameters
    #[error("Key derivation failed: {0}")]
    Derivation(String),
}

/// Cost parameters for scrypt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyParams {
    /// CPU/memory cost, a power of two
    pub n: u64,
    /// Block size
    pub r: u32,
    /// Parallelism
    pub p: u32,
    /// Derived key length in bytes
    pub key_len: usize,
}

impl Default for KeyParams {
    fn default() -> Self {
        Self {
            n: 16384,
            r: 8,
            p: 1,
            key_len: 32,
        }
    }
}

/// A parsed scrypt key policy with its expected hash
///
/// Immutable once built. The salt is empty straight out of [`ScryptKey::parse`]
/// and must be attached with [`ScryptKey::with_salt`] before deriving.
#[derive(Clone, PartialEq, Eq)]
pub struct ScryptKey {
    params: KeyParams,
    hash: String,
    salt: String,
}

impl ScryptKey {
    /// Parses an encoded key string
    ///
    /// Fails with [`KeyError::InvalidKey`] unless the string has exactly six
    /// `$`-separated `key=value` segments covering `alg`, `N`, `r`, `p`,
    /// `keyLen` and `hash`, the algorithm is `scrypt`, the numeric fields are
    /// nonzero, `N` is a power of two and the hash is hex of length
    /// `2 * keyLen`.
    pub fn parse(encoded: &str) -> Result<Self, KeyError> {
        let segments: Vec<&str> = encoded.split('$').collect();
        if segments.len() != SEGMENTS {
            return Err(KeyError::InvalidKey);
        }

        let mut fields = HashMap::with_capacity(SEGMENTS);
        for segment in segments {
            let mut parts = segment.split('=');
            let (Some(name), Some(value), None) = (parts.next(), parts.next(), parts.next())
            else {
                return Err(KeyError::InvalidKey);
            };

            if fields.insert(name, value).is_some() {
                return Err(KeyError::InvalidKey);
            }
        }

        if fields.get("alg") != Some(&ALGORITHM) {
            return Err(KeyError::InvalidKey);
        }

        let n: u64 = numeric_field(&fields, "N")?;
        // Even is not enough, scrypt itself needs a power of two.
        if n < 2 || !n.is_power_of_two() {
            return Err(KeyError::InvalidKey);
        }

        let r: u32 = numeric_field(&fields, "r")?;
        let p: u32 = numeric_field(&fields, "p")?;
        let key_len: usize = numeric_field(&fields, "keyLen")?;

        let hash = fields.get("hash").copied().unwrap_or_default();
        if hash.is_empty()
            || key_len.checked_mul(2) != Some(hash.len())
            || !hash.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(KeyError::InvalidKey);
        }

        Ok(Self {
            params: KeyParams { n, r, p, key_len },
            hash: hash.to_ascii_lowercase(),
            salt: String::new(),
        })
    }

    /// Builds a complete key from a plaintext secret
    ///
    /// Used to provision new deploy tokens: a random salt is generated and
    /// the expected hash derived from `secret`.
    pub fn generate(secret: &str, params: KeyParams) -> Result<Self, KeyError> {
        let mut key = Self {
            params,
            hash: String::new(),
            salt: generate_salt(16),
        };
        key.hash = key.derive(secret)?;
        Ok(key)
    }

    /// Attaches the out-of-band salt
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = salt.into();
        self
    }

    pub fn params(&self) -> KeyParams {
        self.params
    }

    /// Expected hash, lowercase hex
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn salt(&self) -> &str {
        &self.salt
    }

    /// Derives the hex encoded scrypt hash of `secret` under this key's
    /// parameters and salt
    pub fn derive(&self, secret: &str) -> Result<String, KeyError> {
        let salt = hex::decode(&self.salt).map_err(|e| KeyError::InvalidSalt(e.to_string()))?;
        let params = self.scrypt_params()?;

        let mut output = vec![0u8; self.params.key_len];
        scrypt::scrypt(secret.as_bytes(), &salt, &params, &mut output)
            .map_err(|e| KeyError::Derivation(e.to_string()))?;

        Ok(hex::encode(output))
    }

    /// Checks that the salt decodes, scrypt accepts the parameters and the
    /// derivation fits in [`MAX_DERIVATION_MEMORY`]
    ///
    /// Performs no derivation. Run once at startup so that a bad key fails
    /// the boot instead of every request.
    pub fn validate(&self) -> Result<(), KeyError> {
        hex::decode(&self.salt).map_err(|e| KeyError::InvalidSalt(e.to_string()))?;
        self.scrypt_params()?;
        Ok(())
    }

    fn scrypt_params(&self) -> Result<scrypt::Params, KeyError> {
        let KeyParams { n, r, p, key_len } = self.params;
        if !n.is_power_of_two() {
            return Err(KeyError::Derivation(format!("N={n} is not a power of two")));
        }

        let memory = derivation_memory(n, r, p);
        if memory > u128::from(MAX_DERIVATION_MEMORY) {
            return Err(KeyError::Derivation(format!(
                "N={n}, r={r}, p={p} needs {memory} bytes, limit is {MAX_DERIVATION_MEMORY}"
            )));
        }

        let log_n = u8::try_from(n.trailing_zeros())
            .map_err(|_| KeyError::Derivation(format!("N={n} is out of range")))?;

        scrypt::Params::new(log_n, r, p, key_len).map_err(|e| KeyError::Derivation(e.to_string()))
    }
}

/// Encodes the policy string; the salt is never part of it
impl fmt::Display for ScryptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let KeyParams { n, r, p, key_len } = self.params;
        write!(
            f,
            "alg={ALGORITHM}$N={n}$r={r}$p={p}$keyLen={key_len}$hash={}",
            self.hash
        )
    }
}

impl fmt::Debug for ScryptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScryptKey")
            .field("params", &self.params)
            .field("hash", &self.hash)
            .field("salt", &"<redacted>")
            .finish()
    }
}

/// Bytes allocated by one scrypt derivation
fn derivation_memory(n: u64, r: u32, p: u32) -> u128 {
    let block = 128 * u128::from(r);
    block * u128::from(n) + block * u128::from(p)
}

/// Generates `len` random bytes of salt, hex encoded
pub fn generate_salt(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn numeric_field<T>(fields: &HashMap<&str, &str>, name: &str) -> Result<T, KeyError>
where
    T: std::str::FromStr + Default + PartialEq,
{
    let value = fields
        .get(name)
        .filter(|v| !v.is_empty())
        .ok_or(KeyError::InvalidKey)?;

    match value.parse::<T>() {
        Ok(v) if v != T::default() => Ok(v),
        _ => Err(KeyError::InvalidKey),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "b8059f5d26826ef3af0faa424a8fc0f51f80bd62aa46ada056f7174e08a69739";
    const SALT: &str = "478c1d403dec20707cf487f81c06d646";
    const TOKEN: &str = "625181dbfb5c6100cdacd97f3ba32ab4";

    fn encoded() -> String {
        format!("alg=scrypt$N=16384$r=8$p=1$keyLen=32$hash={HASH}")
    }

    #[test]
    fn test_parse_valid_key() {
        let key = ScryptKey::parse(&encoded()).unwrap();

        assert_eq!(key.params().n, 16384);
        assert_eq!(key.params().r, 8);
        assert_eq!(key.params().p, 1);
        assert_eq!(key.params().key_len, 32);
        assert_eq!(key.hash(), HASH);

        // Salt is never part of the encoded string
        assert_eq!(key.salt(), "");
    }

    #[test]
    fn test_parse_accepts_any_segment_order() {
        let reordered = format!("hash={HASH}$keyLen=32$p=1$r=8$N=16384$alg=scrypt");
        let key = ScryptKey::parse(&reordered).unwrap();
        assert_eq!(key, ScryptKey::parse(&encoded()).unwrap());
    }

    #[test]
    fn test_parse_rejects_malformed_keys() {
        let cases = [
            // missing alg, five segments
            format!("N=16384$r=8$p=1$keyLen=32$hash={HASH}"),
            // missing alg, six segments
            format!("x=1$N=16384$r=8$p=1$keyLen=32$hash={HASH}"),
            // wrong alg
            format!("alg=pbkdf2$N=16384$r=8$p=1$keyLen=32$hash={HASH}"),
            // empty hash
            "alg=scrypt$N=16384$r=8$p=1$keyLen=32$hash=".to_string(),
            // non numeric keyLen
            format!("alg=scrypt$N=16384$r=8$p=1$keyLen=wrong$hash={HASH}"),
            // hash length does not match keyLen
            format!("alg=scrypt$N=16384$r=8$p=1$keyLen=64$hash={HASH}"),
            // odd N
            format!("alg=scrypt$N=3$r=8$p=1$keyLen=32$hash={HASH}"),
            // even but not a power of two
            format!("alg=scrypt$N=12$r=8$p=1$keyLen=32$hash={HASH}"),
            // zero value
            format!("alg=scrypt$N=16384$r=0$p=1$keyLen=32$hash={HASH}"),
            // negative value
            format!("alg=scrypt$N=16384$r=8$p=-1$keyLen=32$hash={HASH}"),
            // extra '='
            format!("alg=scrypt$N=16384=1$r=8$p=1$keyLen=32$hash={HASH}"),
            // missing '='
            format!("alg=scrypt$N16384$r=8$p=1$keyLen=32$hash={HASH}"),
            // duplicated field
            format!("alg=scrypt$alg=scrypt$r=8$p=1$keyLen=32$hash={HASH}"),
            // extra segment
            format!("alg=scrypt$N=16384$r=8$p=1$keyLen=32$hash={HASH}$x=1"),
            // non hex hash of the right length
            format!("alg=scrypt$N=16384$r=8$p=1$keyLen=32$hash={}", "z".repeat(64)),
            String::new(),
        ];

        for case in cases {
            assert_eq!(
                ScryptKey::parse(&case),
                Err(KeyError::InvalidKey),
                "expected rejection of {case:?}"
            );
        }
    }

    #[test]
    fn test_display_round_trips_policy() {
        let key = ScryptKey::parse(&encoded()).unwrap().with_salt(SALT);
        assert_eq!(key.to_string(), encoded());
        assert!(!format!("{key:?}").contains(SALT));
    }

    #[test]
    fn test_derive_matches_known_hash() {
        let key = ScryptKey::parse(&encoded()).unwrap().with_salt(SALT);

        let hash = key.derive(TOKEN).unwrap();
        assert_eq!(hash, HASH);

        let again = key.derive(TOKEN).unwrap();
        assert_eq!(hash, again);

        let wrong = key.derive("41a9f7554a439eb7a652cd23cf4c3f89").unwrap();
        assert_ne!(wrong, HASH);
    }

    #[test]
    fn test_derive_rejects_bad_salt() {
        let key = ScryptKey::parse(&encoded()).unwrap().with_salt("not-hex");
        assert!(matches!(key.derive(TOKEN), Err(KeyError::InvalidSalt(_))));
        assert!(matches!(key.validate(), Err(KeyError::InvalidSalt(_))));
    }

    #[test]
    fn test_validate_accepts_configured_key() {
        let key = ScryptKey::parse(&encoded()).unwrap().with_salt(SALT);
        assert!(key.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_keys_exceeding_memory_limit() {
        let huge = format!("alg=scrypt$N={}$r=8$p=1$keyLen=32$hash={HASH}", 1u64 << 40);
        let key = ScryptKey::parse(&huge).unwrap().with_salt(SALT);

        assert!(matches!(key.validate(), Err(KeyError::Derivation(_))));
        assert!(matches!(key.derive(TOKEN), Err(KeyError::Derivation(_))));
    }

    #[test]
    fn test_derivation_memory_limit_boundary() {
        // 128 * 8 * 2^20 = 1 GiB scratch plus the block buffer
        assert!(derivation_memory(1 << 20, 8, 1) > u128::from(MAX_DERIVATION_MEMORY));
        assert!(derivation_memory(1 << 19, 8, 1) <= u128::from(MAX_DERIVATION_MEMORY));
        assert_eq!(derivation_memory(16384, 8, 1), 128 * 8 * 16384 + 128 * 8);
    }

    #[test]
    fn test_generate_produces_verifiable_key() {
        let params = KeyParams {
            n: 16,
            r: 1,
            p: 1,
            key_len: 16,
        };
        let key = ScryptKey::generate("secret-token", params).unwrap();

        assert_eq!(key.salt().len(), 32);
        assert_eq!(key.derive("secret-token").unwrap(), key.hash());

        let reparsed = ScryptKey::parse(&key.to_string())
            .unwrap()
            .with_salt(key.salt());
        assert_eq!(reparsed, key);
    }
}
