use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use super::secret::SecretKey;
use super::{b64_decode, b64_encode, random_bytes, CryptoError, KeyRole};

/// Size of private key material (Ed25519 seed or X25519 scalar) in bytes
pub const PRIVATE_KEY_SIZE: usize = 32;
/// Size of public keys in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;
/// Size of an Ed25519 signature in bytes
pub const SIGNATURE_SIZE: usize = 64;

fn fixed<const N: usize>(bytes: &[u8], what: &str) -> Result<[u8; N], CryptoError> {
    if bytes.len() != N {
        return Err(CryptoError::InvalidKey(format!(
            "invalid {} size, expected {}, got {}",
            what,
            N,
            bytes.len()
        )));
    }
    let mut buff = [0u8; N];
    buff.copy_from_slice(bytes);
    Ok(buff)
}

/// Private half of a signing identity
///
/// Only ever leaves memory encrypted under a storage key.
#[derive(Clone)]
pub struct SignKey(SigningKey);

impl std::fmt::Debug for SignKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SignKey").field(&self.verify_key()).finish()
    }
}

impl From<[u8; PRIVATE_KEY_SIZE]> for SignKey {
    fn from(seed: [u8; PRIVATE_KEY_SIZE]) -> Self {
        SignKey(SigningKey::from_bytes(&seed))
    }
}

impl SignKey {
    /// Generate a new random signing key using a cryptographically secure RNG
    pub fn generate() -> Result<Self, CryptoError> {
        Ok(Self::from(random_bytes::<PRIVATE_KEY_SIZE>()?))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        Ok(Self::from(fixed::<PRIVATE_KEY_SIZE>(bytes, "sign key")?))
    }

    pub fn to_bytes(&self) -> [u8; PRIVATE_KEY_SIZE] {
        self.0.to_bytes()
    }

    pub fn verify_key(&self) -> VerifyKey {
        VerifyKey(self.0.verifying_key())
    }

    pub fn sign(&self, msg: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.0.sign(msg).to_bytes()
    }
}

/// Public half of a signing identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyKey(VerifyingKey);

impl VerifyKey {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes = fixed::<PUBLIC_KEY_SIZE>(bytes, "verify key")?;
        VerifyingKey::from_bytes(&bytes)
            .map(VerifyKey)
            .map_err(|_| CryptoError::InvalidKey("verify key is not a valid point".into()))
    }

    pub fn from_base64(s: &str) -> Result<Self, CryptoError> {
        Self::from_slice(&b64_decode(s)?)
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0.to_bytes()
    }

    pub fn to_base64(&self) -> String {
        b64_encode(self.to_bytes())
    }

    /// Verify a raw Ed25519 signature on a message
    pub fn verify(&self, msg: &[u8], signature: &[u8]) -> bool {
        let Ok(bytes) = fixed::<SIGNATURE_SIZE>(signature, "signature") else {
            return false;
        };
        let signature = ed25519_dalek::Signature::from_bytes(&bytes);
        self.0.verify_strict(msg, &signature).is_ok()
    }

    /// Verify a base64 signature on a message
    pub fn verify_b64(&self, msg: &[u8], signature: &str) -> bool {
        match b64_decode(signature) {
            Ok(bytes) => self.verify(msg, &bytes),
            Err(_) => false,
        }
    }
}

/// Private half of an encryption identity
#[derive(Clone)]
pub struct PrivateEncryptionKey(StaticSecret);

impl std::fmt::Debug for PrivateEncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PrivateEncryptionKey")
            .field(&self.public_key())
            .finish()
    }
}

impl From<[u8; PRIVATE_KEY_SIZE]> for PrivateEncryptionKey {
    fn from(bytes: [u8; PRIVATE_KEY_SIZE]) -> Self {
        PrivateEncryptionKey(StaticSecret::from(bytes))
    }
}

impl PrivateEncryptionKey {
    pub fn generate() -> Result<Self, CryptoError> {
        Ok(Self::from(random_bytes::<PRIVATE_KEY_SIZE>()?))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        Ok(Self::from(fixed::<PRIVATE_KEY_SIZE>(
            bytes,
            "private encryption key",
        )?))
    }

    pub fn to_bytes(&self) -> [u8; PRIVATE_KEY_SIZE] {
        self.0.to_bytes()
    }

    pub fn public_key(&self) -> PublicEncryptionKey {
        PublicEncryptionKey(X25519PublicKey::from(&self.0))
    }

    pub(crate) fn diffie_hellman(&self, public: &PublicEncryptionKey) -> [u8; 32] {
        *self.0.diffie_hellman(&public.0).as_bytes()
    }
}

/// Public half of an encryption identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicEncryptionKey(X25519PublicKey);

impl From<[u8; PUBLIC_KEY_SIZE]> for PublicEncryptionKey {
    fn from(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        PublicEncryptionKey(X25519PublicKey::from(bytes))
    }
}

impl PublicEncryptionKey {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        Ok(Self::from(fixed::<PUBLIC_KEY_SIZE>(
            bytes,
            "public encryption key",
        )?))
    }

    pub fn from_base64(s: &str) -> Result<Self, CryptoError> {
        Self::from_slice(&b64_decode(s)?)
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        *self.0.as_bytes()
    }

    pub fn to_base64(&self) -> String {
        b64_encode(self.to_bytes())
    }
}

macro_rules! base64_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&self.to_base64())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                <$ty>::from_base64(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

base64_serde!(VerifyKey);
base64_serde!(PublicEncryptionKey);

/// Key material tagged with its role
#[derive(Debug, Clone)]
pub enum Key {
    Sign(SignKey),
    Verify(VerifyKey),
    Encrypt(PublicEncryptionKey),
    Decrypt(PrivateEncryptionKey),
    Secret(SecretKey),
}

impl Key {
    pub fn role(&self) -> KeyRole {
        match self {
            Key::Sign(_) => KeyRole::Sign,
            Key::Verify(_) => KeyRole::Verify,
            Key::Encrypt(_) => KeyRole::Encrypt,
            Key::Decrypt(_) => KeyRole::Decrypt,
            Key::Secret(_) => KeyRole::Secret,
        }
    }

    /// Raw key bytes, the private half for private roles
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Key::Sign(k) => k.to_bytes().to_vec(),
            Key::Verify(k) => k.to_bytes().to_vec(),
            Key::Encrypt(k) => k.to_bytes().to_vec(),
            Key::Decrypt(k) => k.to_bytes().to_vec(),
            Key::Secret(k) => k.bytes().to_vec(),
        }
    }

    pub fn from_bytes(role: KeyRole, bytes: &[u8]) -> Result<Self, CryptoError> {
        Ok(match role {
            KeyRole::Sign => Key::Sign(SignKey::from_slice(bytes)?),
            KeyRole::Verify => Key::Verify(VerifyKey::from_slice(bytes)?),
            KeyRole::Encrypt => Key::Encrypt(PublicEncryptionKey::from_slice(bytes)?),
            KeyRole::Decrypt => Key::Decrypt(PrivateEncryptionKey::from_slice(bytes)?),
            KeyRole::Secret => Key::Secret(SecretKey::from_slice(bytes)?),
        })
    }

    pub fn as_sign(&self) -> Option<&SignKey> {
        match self {
            Key::Sign(k) => Some(k),
            _ => None,
        }
    }

    pub fn as_decrypt(&self) -> Option<&PrivateEncryptionKey> {
        match self {
            Key::Decrypt(k) => Some(k),
            _ => None,
        }
    }
}

impl From<SignKey> for Key {
    fn from(key: SignKey) -> Self {
        Key::Sign(key)
    }
}

impl From<PrivateEncryptionKey> for Key {
    fn from(key: PrivateEncryptionKey) -> Self {
        Key::Decrypt(key)
    }
}
