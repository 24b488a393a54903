use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};

use super::secret::SECRET_SIZE;
use super::CryptoError;

/// Argon2id cost parameters
///
/// These must be identical wherever the same password is expected to
/// produce the same identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

fn default_memory_kib() -> u32 {
    131072
}

fn default_iterations() -> u32 {
    1
}

fn default_parallelism() -> u32 {
    1
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
        }
    }
}

impl KdfParams {
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Self {
        Self {
            memory_kib,
            iterations,
            parallelism,
        }
    }
}

/// Derive 32 bytes from a password.
///
/// The Argon2id salt is `salt || 0x00 || domain`, so the same password and
/// salt give unrelated outputs for different domains.
pub fn derive_from_password(
    params: &KdfParams,
    password: &str,
    salt: &str,
    domain: &str,
) -> Result<[u8; SECRET_SIZE], CryptoError> {
    let params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(SECRET_SIZE),
    )
    .map_err(|e| CryptoError::Kdf(e.to_string()))?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut full_salt = Vec::with_capacity(salt.len() + 1 + domain.len());
    full_salt.extend_from_slice(salt.as_bytes());
    full_salt.push(0);
    full_salt.extend_from_slice(domain.as_bytes());

    let mut out = [0u8; SECRET_SIZE];
    argon
        .hash_password_into(password.as_bytes(), &full_salt, &mut out)
        .map_err(|e| CryptoError::Kdf(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    fn params() -> KdfParams {
        KdfParams::new(64, 1, 1)
    }

    #[test]
    fn test_deterministic() {
        let a = derive_from_password(&params(), "pw", "/a", "signKey").unwrap();
        let b = derive_from_password(&params(), "pw", "/a", "signKey").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_domain_and_salt_separate() {
        let base = derive_from_password(&params(), "pw", "/a", "signKey").unwrap();
        assert_ne!(
            base,
            derive_from_password(&params(), "pw", "/a", "secretKey").unwrap()
        );
        assert_ne!(
            base,
            derive_from_password(&params(), "pw", "/b", "signKey").unwrap()
        );
        assert_ne!(
            base,
            derive_from_password(&params(), "pw2", "/a", "signKey").unwrap()
        );
    }

    #[test]
    fn test_bad_params_error() {
        assert!(derive_from_password(&KdfParams::new(0, 0, 0), "pw", "/a", "signKey").is_err());
    }

    #[test]
    fn test_config_defaults() {
        let params: KdfParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params, KdfParams::default());
        assert_eq!(params.memory_kib, 131072);
    }
}
