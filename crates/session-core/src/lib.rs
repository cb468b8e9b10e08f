//! session-core — sealed session storage
//!
//! Protects a small session record (access token, role, identity fields)
//! while it sits in client-controlled storage, and routes protected pages by
//! the role it carries.
//!
//! # Module layout
//! - `secret`  — shared secret resolution (once, from configuration)
//! - `kdf`     — PBKDF2-HMAC-SHA256, per-seal salt
//! - `rng`     — secure random source abstraction
//! - `cipher`  — AES-256-GCM engine and the deprecated AES-256-CBC engine
//! - `codec`   — framing + base64; the only seal/unseal entry point
//! - `store`   — single-slot session lifecycle, fail-closed load
//! - `gate`    — auth state and role-based redirects
//! - `config`  — file + environment configuration
//! - `paths`   — data directory resolution
//! - `error`   — unified error type
//!
//! Key material, salts and nonces never leave the crate.

mod cipher;
pub mod codec;
pub mod config;
pub mod error;
pub mod gate;
mod kdf;
pub mod paths;
pub mod record;
mod rng;
pub mod secret;
pub mod store;

pub use cipher::CipherSuite;
pub use codec::SessionCodec;
pub use config::{Environment, SessionConfig};
pub use error::SessionError;
pub use gate::{AuthGate, AuthState, Decision, RoutePolicy};
pub use kdf::{KdfParams, DEFAULT_ITERATIONS, MIN_ITERATIONS};
pub use record::{Role, SessionRecord, UnknownRole};
pub use rng::{OsRandom, RandomSource};
pub use secret::{SharedSecret, DEFAULT_SECRET};
pub use store::{FileSlot, MemorySlot, SessionSlot, SessionStore};
