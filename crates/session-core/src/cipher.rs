//! Symmetric cipher engines
//!
//! - `AesGcmEngine`  — AES-256-GCM, 12-byte nonce, detached 16-byte tag.
//! - `AesCbcEngine`  — AES-256-CBC with PKCS#7, 16-byte IV, no tag.
//!   Confidentiality only; kept so blobs written by older deployments can be
//!   read while they are migrated.
//!
//! Every decrypt failure is the same `CipherError::AuthenticationFailure`.

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce, Tag};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::kdf::DerivedKey;

pub const GCM_NONCE_LEN: usize = 12;
pub const CBC_IV_LEN: usize = 16;
pub const TAG_LEN: usize = 16;
const AES_BLOCK_LEN: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Which scheme produced a sealed blob. The id is the first byte of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CipherSuite {
    #[default]
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    #[serde(rename = "aes-256-cbc-legacy")]
    Aes256CbcLegacy,
}

impl CipherSuite {
    pub const fn id(self) -> u8 {
        match self {
            CipherSuite::Aes256Gcm => 0x01,
            CipherSuite::Aes256CbcLegacy => 0x02,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0x01 => Some(CipherSuite::Aes256Gcm),
            0x02 => Some(CipherSuite::Aes256CbcLegacy),
            _ => None,
        }
    }

    pub const fn nonce_len(self) -> usize {
        match self {
            CipherSuite::Aes256Gcm => GCM_NONCE_LEN,
            CipherSuite::Aes256CbcLegacy => CBC_IV_LEN,
        }
    }

    pub const fn tag_len(self) -> usize {
        match self {
            CipherSuite::Aes256Gcm => TAG_LEN,
            CipherSuite::Aes256CbcLegacy => 0,
        }
    }

    pub const fn is_authenticated(self) -> bool {
        matches!(self, CipherSuite::Aes256Gcm)
    }

    pub(crate) fn engine(self) -> &'static dyn CipherEngine {
        match self {
            CipherSuite::Aes256Gcm => &AesGcmEngine,
            CipherSuite::Aes256CbcLegacy => &AesCbcEngine,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub(crate) enum CipherError {
    #[error("encryption failed")]
    Encrypt,
    #[error("authentication failed")]
    AuthenticationFailure,
}

pub(crate) struct Encrypted {
    pub ciphertext: Vec<u8>,
    pub tag: Option<[u8; TAG_LEN]>,
}

pub(crate) trait CipherEngine: Send + Sync {
    fn suite(&self) -> CipherSuite;

    fn encrypt(
        &self,
        key: &DerivedKey,
        nonce: &[u8],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<Encrypted, CipherError>;

    fn decrypt(
        &self,
        key: &DerivedKey,
        nonce: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
        tag: Option<&[u8]>,
    ) -> Result<Zeroizing<Vec<u8>>, CipherError>;
}

pub(crate) struct AesGcmEngine;

impl CipherEngine for AesGcmEngine {
    fn suite(&self) -> CipherSuite {
        CipherSuite::Aes256Gcm
    }

    fn encrypt(
        &self,
        key: &DerivedKey,
        nonce: &[u8],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<Encrypted, CipherError> {
        if nonce.len() != GCM_NONCE_LEN {
            return Err(CipherError::Encrypt);
        }
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CipherError::Encrypt)?;
        let mut buffer = plaintext.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(Nonce::from_slice(nonce), aad, &mut buffer)
            .map_err(|_| CipherError::Encrypt)?;
        let mut tag_bytes = [0u8; TAG_LEN];
        tag_bytes.copy_from_slice(&tag);
        Ok(Encrypted {
            ciphertext: buffer,
            tag: Some(tag_bytes),
        })
    }

    fn decrypt(
        &self,
        key: &DerivedKey,
        nonce: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
        tag: Option<&[u8]>,
    ) -> Result<Zeroizing<Vec<u8>>, CipherError> {
        let tag = tag
            .filter(|t| t.len() == TAG_LEN)
            .ok_or(CipherError::AuthenticationFailure)?;
        if nonce.len() != GCM_NONCE_LEN {
            return Err(CipherError::AuthenticationFailure);
        }
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|_| CipherError::AuthenticationFailure)?;
        let mut buffer = Zeroizing::new(ciphertext.to_vec());
        // tag comparison is constant time inside aes-gcm
        cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(nonce),
                aad,
                &mut buffer[..],
                Tag::from_slice(tag),
            )
            .map_err(|_| CipherError::AuthenticationFailure)?;
        Ok(buffer)
    }
}

/// Deprecated. Associated data is ignored: nothing is authenticated.
pub(crate) struct AesCbcEngine;

impl CipherEngine for AesCbcEngine {
    fn suite(&self) -> CipherSuite {
        CipherSuite::Aes256CbcLegacy
    }

    fn encrypt(
        &self,
        key: &DerivedKey,
        iv: &[u8],
        _aad: &[u8],
        plaintext: &[u8],
    ) -> Result<Encrypted, CipherError> {
        let encryptor =
            Aes256CbcEnc::new_from_slices(key.as_bytes(), iv).map_err(|_| CipherError::Encrypt)?;
        Ok(Encrypted {
            ciphertext: encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext),
            tag: None,
        })
    }

    fn decrypt(
        &self,
        key: &DerivedKey,
        iv: &[u8],
        _aad: &[u8],
        ciphertext: &[u8],
        tag: Option<&[u8]>,
    ) -> Result<Zeroizing<Vec<u8>>, CipherError> {
        if tag.is_some() || ciphertext.is_empty() || ciphertext.len() % AES_BLOCK_LEN != 0 {
            return Err(CipherError::AuthenticationFailure);
        }
        let decryptor = Aes256CbcDec::new_from_slices(key.as_bytes(), iv)
            .map_err(|_| CipherError::AuthenticationFailure)?;
        let plaintext = decryptor
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CipherError::AuthenticationFailure)?;
        Ok(Zeroizing::new(plaintext))
    }
}
