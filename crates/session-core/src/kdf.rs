//! Key derivation
//!
//! PBKDF2-HMAC-SHA256 over the shared secret and a per-seal 16-byte salt.
//! Output: one 32-byte AES key, zeroized on drop.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::ZeroizeOnDrop;

use crate::error::{Result, SessionError};
use crate::secret::SharedSecret;

pub const MIN_ITERATIONS: u32 = 100_000;
pub const DEFAULT_ITERATIONS: u32 = MIN_ITERATIONS;
pub const SALT_LEN: usize = 16;
pub const KEY_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    iterations: u32,
}

impl KdfParams {
    pub fn new(iterations: u32) -> Result<Self> {
        if iterations < MIN_ITERATIONS {
            return Err(SessionError::config(format!(
                "kdf iterations {iterations} below minimum {MIN_ITERATIONS}"
            )));
        }
        Ok(Self { iterations })
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

/// Per-operation AES key. Never stored.
#[derive(ZeroizeOnDrop)]
pub(crate) struct DerivedKey([u8; KEY_LEN]);

impl DerivedKey {
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

pub(crate) fn derive_key(
    secret: &SharedSecret,
    salt: &[u8; SALT_LEN],
    params: KdfParams,
) -> DerivedKey {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_sha256(secret.expose(), salt, params.iterations, &mut key);
    DerivedKey(key)
}

fn pbkdf2_sha256(secret: &[u8], salt: &[u8], iterations: u32, out: &mut [u8]) {
    pbkdf2_hmac::<Sha256>(secret, salt, iterations, out);
}
