use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{Result, SessionError};
use crate::kdf::SALT_LEN;

/// Secure random bytes for salts and nonces.
///
/// Each execution context plugs in its platform generator; [`OsRandom`] covers
/// native targets.
pub trait RandomSource: Send + Sync {
    fn fill(&self, dest: &mut [u8]) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&self, dest: &mut [u8]) -> Result<()> {
        OsRng.try_fill_bytes(dest).map_err(|_| SessionError::Entropy)
    }
}

pub(crate) fn generate_salt(rng: &dyn RandomSource) -> Result<[u8; SALT_LEN]> {
    let mut salt = [0u8; SALT_LEN];
    rng.fill(&mut salt)?;
    Ok(salt)
}

pub(crate) fn generate_nonce(rng: &dyn RandomSource, len: usize) -> Result<Vec<u8>> {
    let mut nonce = vec![0u8; len];
    rng.fill(&mut nonce)?;
    Ok(nonce)
}
