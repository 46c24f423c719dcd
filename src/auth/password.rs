//! Password hashing using PBKDF2-HMAC-SHA-512
//!
//! Every derivation gets a fresh 128-byte salt; the produced material
//! carries the parameters used, so verification and future re-hashing on
//! policy change need no external state.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use pbkdf2::pbkdf2_hmac;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha512};
use zeroize::Zeroizing;

use crate::types::{Error, Result};

/// Salt length in bytes.
pub const SALT_LEN: usize = 128;

/// PBKDF2 iteration count.
pub const ITERATIONS: u32 = 100_000;

/// Derived key length in bits.
pub const KEY_LENGTH_BITS: u32 = 512;

/// Digest algorithm identifier stored alongside the hash.
pub const DIGEST: &str = "sha512";

/// Stored credential material; replaces `password` 1:1 in persisted payloads.
///
/// Wire keys match the stored document layout: `salt` is base64, `hash` is
/// the hex-encoded derived key, `keylen` is in bits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HashMaterial {
    pub salt: String,
    pub iterations: u32,
    pub keylen: u32,
    pub digest: String,
    pub hash: String,
}

/// Hash a password with a fresh random salt.
///
/// Never logs or returns the plaintext; the only failure mode is the OS
/// random source.
pub fn hash_password(password: &str) -> Result<HashMaterial> {
    let mut salt_bytes = [0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt_bytes)
        .map_err(|e| Error::Hashing(format!("random source failed: {e}")))?;
    let salt = BASE64.encode(salt_bytes);

    let mut derived = vec![0u8; (KEY_LENGTH_BITS / 8) as usize];
    pbkdf2_hmac::<Sha512>(password.as_bytes(), salt.as_bytes(), ITERATIONS, &mut derived);

    Ok(HashMaterial {
        salt,
        iterations: ITERATIONS,
        keylen: KEY_LENGTH_BITS,
        digest: DIGEST.to_string(),
        hash: hex::encode(derived),
    })
}

/// Hash a password on the blocking pool.
///
/// Derivation is CPU-bound; offloading it keeps the async workers free for
/// concurrent requests.
pub async fn hash_password_task(password: Zeroizing<String>) -> Result<HashMaterial> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| Error::Hashing(format!("hash task failed: {e}")))?
}

/// Verify a password against stored material using the parameters it carries.
pub fn verify_password(password: &str, material: &HashMaterial) -> Result<bool> {
    let expected = hex::decode(&material.hash)
        .map_err(|e| Error::Hashing(format!("stored hash is not hex: {e}")))?;

    let mut derived = vec![0u8; expected.len()];
    match material.digest.as_str() {
        "sha512" => pbkdf2_hmac::<Sha512>(
            password.as_bytes(),
            material.salt.as_bytes(),
            material.iterations,
            &mut derived,
        ),
        "sha256" => pbkdf2_hmac::<Sha256>(
            password.as_bytes(),
            material.salt.as_bytes(),
            material.iterations,
            &mut derived,
        ),
        other => {
            return Err(Error::Hashing(format!("unsupported digest: {other}")));
        }
    }

    // Constant-time comparison
    let diff = derived
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b));
    Ok(diff == 0)
}
