//! Sealing and unsealing of session records.
//!
//! Frame layout (before base64):
//!
//! ```text
//! AEAD   0x01 | salt (16) | nonce (12) | ciphertext (N) | tag (16)
//! legacy 0x02 | salt (16) | iv (16)    | ciphertext (N, N % 16 == 0)
//! ```
//!
//! For AEAD the header (suite byte, salt, nonce) is authenticated as
//! associated data. The text form is standard base64 with padding.

use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use thiserror::Error;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::cipher::{CipherSuite, TAG_LEN};
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::kdf::{derive_key, KdfParams, SALT_LEN};
use crate::record::SessionRecord;
use crate::rng::{generate_nonce, generate_salt, OsRandom, RandomSource};
use crate::secret::SharedSecret;

const SUITE_LEN: usize = 1;

/// Why a blob was turned away. Only ever logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
enum Rejection {
    #[error("text encoding")]
    Encoding,
    #[error("frame length")]
    Framing,
    #[error("cipher suite not accepted")]
    Suite,
    #[error("cipher verification")]
    Cipher,
    #[error("payload")]
    Payload,
}

struct Frame<'a> {
    suite: CipherSuite,
    header: &'a [u8],
    salt: [u8; SALT_LEN],
    nonce: &'a [u8],
    ciphertext: &'a [u8],
    tag: Option<&'a [u8]>,
}

impl<'a> Frame<'a> {
    fn parse(raw: &'a [u8]) -> std::result::Result<Self, Rejection> {
        let suite = raw
            .first()
            .copied()
            .and_then(CipherSuite::from_id)
            .ok_or(Rejection::Framing)?;
        let header_len = header_len(suite);
        let tag_len = suite.tag_len();
        if raw.len() < header_len + tag_len {
            return Err(Rejection::Framing);
        }
        let (header, body) = raw.split_at(header_len);
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&header[SUITE_LEN..SUITE_LEN + SALT_LEN]);
        let nonce = &header[SUITE_LEN + SALT_LEN..];
        let (ciphertext, tag) = if tag_len > 0 {
            let (ciphertext, tag) = body.split_at(body.len() - tag_len);
            (ciphertext, Some(tag))
        } else {
            if body.is_empty() {
                return Err(Rejection::Framing);
            }
            (body, None)
        };
        Ok(Self {
            suite,
            header,
            salt,
            nonce,
            ciphertext,
            tag,
        })
    }
}

fn header_len(suite: CipherSuite) -> usize {
    SUITE_LEN + SALT_LEN + suite.nonce_len()
}

/// Turns a [`SessionRecord`] into storage-safe text and back.
///
/// Cloning is cheap; clones share the same secret.
#[derive(Clone)]
pub struct SessionCodec {
    secret: Arc<SharedSecret>,
    kdf: KdfParams,
    suite: CipherSuite,
    accept_legacy: bool,
    rng: Arc<dyn RandomSource>,
}

impl fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCodec")
            .field("secret", &self.secret)
            .field("kdf", &self.kdf)
            .field("suite", &self.suite)
            .field("accept_legacy", &self.accept_legacy)
            .finish_non_exhaustive()
    }
}

impl SessionCodec {
    pub fn new(secret: SharedSecret, kdf: KdfParams) -> Self {
        Self {
            secret: Arc::new(secret),
            kdf,
            suite: CipherSuite::Aes256Gcm,
            accept_legacy: false,
            rng: Arc::new(OsRandom),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        let secret = SharedSecret::resolve(config)?;
        Ok(Self::new(secret, config.kdf_params()?)
            .with_suite(config.cipher_suite)
            .accept_legacy(config.accept_legacy))
    }

    pub fn with_suite(mut self, suite: CipherSuite) -> Self {
        self.suite = suite;
        self
    }

    pub fn accept_legacy(mut self, accept: bool) -> Self {
        self.accept_legacy = accept;
        self
    }

    pub fn with_random_source(mut self, rng: Arc<dyn RandomSource>) -> Self {
        self.rng = rng;
        self
    }

    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    pub fn seal(&self, record: &SessionRecord) -> Result<String> {
        let plaintext = Zeroizing::new(
            serde_json::to_vec(record).map_err(|e| SessionError::Serialization(e.to_string()))?,
        );
        let salt = generate_salt(self.rng.as_ref())?;
        let nonce = generate_nonce(self.rng.as_ref(), self.suite.nonce_len())?;
        let key = derive_key(&self.secret, &salt, self.kdf);

        let mut frame =
            Vec::with_capacity(header_len(self.suite) + plaintext.len() + 2 * TAG_LEN);
        frame.push(self.suite.id());
        frame.extend_from_slice(&salt);
        frame.extend_from_slice(&nonce);

        let engine = self.suite.engine();
        let encrypted = engine
            .encrypt(&key, &nonce, &frame, &plaintext)
            .map_err(|e| {
                warn!(suite = ?engine.suite(), "session seal failed: {e}");
                SessionError::Seal
            })?;
        frame.extend_from_slice(&encrypted.ciphertext);
        if let Some(tag) = encrypted.tag {
            frame.extend_from_slice(&tag);
        }
        Ok(general_purpose::STANDARD.encode(frame))
    }

    /// Every failure is [`SessionError::InvalidSession`].
    pub fn unseal(&self, blob: &str) -> Result<SessionRecord> {
        self.open(blob).map_err(|reason| {
            debug!(%reason, "rejecting sealed session");
            SessionError::InvalidSession
        })
    }

    pub async fn seal_async(&self, record: SessionRecord) -> Result<String> {
        let codec = self.clone();
        tokio::task::spawn_blocking(move || codec.seal(&record))
            .await
            .map_err(|e| {
                warn!("seal task failed: {e}");
                SessionError::Seal
            })?
    }

    pub async fn unseal_async(&self, blob: String) -> Result<SessionRecord> {
        let codec = self.clone();
        tokio::task::spawn_blocking(move || codec.unseal(&blob))
            .await
            .map_err(|e| {
                warn!("unseal task failed: {e}");
                SessionError::InvalidSession
            })?
    }

    fn open(&self, blob: &str) -> std::result::Result<SessionRecord, Rejection> {
        let raw = general_purpose::STANDARD
            .decode(blob.trim())
            .map_err(|_| Rejection::Encoding)?;
        let frame = Frame::parse(&raw)?;
        if !self.accepts(frame.suite) {
            return Err(Rejection::Suite);
        }
        let key = derive_key(&self.secret, &frame.salt, self.kdf);
        let plaintext = frame
            .suite
            .engine()
            .decrypt(&key, frame.nonce, frame.header, frame.ciphertext, frame.tag)
            .map_err(|_| Rejection::Cipher)?;
        serde_json::from_slice(&plaintext).map_err(|_| Rejection::Payload)
    }

    fn accepts(&self, suite: CipherSuite) -> bool {
        suite.is_authenticated() || suite == self.suite || self.accept_legacy
    }
}
