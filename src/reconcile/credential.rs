//! Salted password hashing (PBKDF2-HMAC-SHA256).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::record::{FieldValue, Record};

pub const PBKDF2_ITERATIONS: u32 = 120_000;
pub const SALT_LEN: usize = 16;
pub const KEY_LEN: usize = 32;
pub const ALGORITHM: &str = "PBKDF2-SHA256";

/// Stored credential material. Never contains the plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashedCredential {
    /// Base64 derived key.
    pub hash: String,
    /// Base64 salt.
    pub salt: String,
    pub iterations: u32,
    pub algorithm: String,
}

impl HashedCredential {
    /// Check a plaintext against this credential.
    pub fn verify(&self, plaintext: &str) -> bool {
        if self.algorithm != ALGORITHM {
            return false;
        }
        let (Ok(salt), Ok(expected)) = (STANDARD.decode(&self.salt), STANDARD.decode(&self.hash)) else {
            return false;
        };
        if expected.is_empty() || self.iterations == 0 {
            return false;
        }
        let mut derived = vec![0u8; expected.len()];
        pbkdf2::pbkdf2_hmac::<Sha256>(plaintext.as_bytes(), &salt, self.iterations, &mut derived);
        constant_time_eq(&derived, &expected)
    }

    /// Write the credential fields onto a document.
    pub fn apply_to(&self, record: &mut Record) {
        record.insert("password_hash".to_string(), FieldValue::String(self.hash.clone()));
        record.insert("password_salt".to_string(), FieldValue::String(self.salt.clone()));
        record.insert(
            "password_iterations".to_string(),
            FieldValue::Int(i64::from(self.iterations)),
        );
        record.insert("password_algo".to_string(), FieldValue::String(self.algorithm.clone()));
    }

    /// Read credential fields back from a document.
    pub fn from_record(record: &Record) -> Option<Self> {
        Some(Self {
            hash: record.get("password_hash")?.as_str()?.to_string(),
            salt: record.get("password_salt")?.as_str()?.to_string(),
            iterations: u32::try_from(record.get("password_iterations")?.as_i64()?).ok()?,
            algorithm: record.get("password_algo")?.as_str()?.to_string(),
        })
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Derives salted keys from plaintext credentials.
#[derive(Debug, Clone, Copy)]
pub struct CredentialHasher {
    iterations: u32,
}

impl CredentialHasher {
    pub fn new() -> Self {
        Self {
            iterations: PBKDF2_ITERATIONS,
        }
    }

    /// Hasher with a custom iteration count (tests use small counts).
    pub fn with_iterations(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Hash `plaintext` with a fresh random salt.
    pub fn hash(&self, plaintext: &str) -> HashedCredential {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        self.hash_with_salt(plaintext, &salt)
    }

    fn hash_with_salt(&self, plaintext: &str, salt: &[u8]) -> HashedCredential {
        let mut derived = [0u8; KEY_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(plaintext.as_bytes(), salt, self.iterations, &mut derived);
        HashedCredential {
            hash: STANDARD.encode(derived),
            salt: STANDARD.encode(salt),
            iterations: self.iterations,
            algorithm: ALGORITHM.to_string(),
        }
    }
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self::new()
    }
}
