use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cipher::CipherSuite;
use crate::error::{Result, SessionError};
use crate::gate::RoutePolicy;
use crate::kdf::{KdfParams, DEFAULT_ITERATIONS};
use crate::paths::{self, DATA_DIR_ENV};

pub const SECRET_ENV: &str = "SESSION_SECRET";
pub const ENVIRONMENT_ENV: &str = "SESSION_ENV";
pub const KDF_ITERATIONS_ENV: &str = "SESSION_KDF_ITERATIONS";

pub const DEFAULT_STORAGE_KEY: &str = "session";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = SessionError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(SessionError::config(format!("unknown environment {other:?}"))),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub environment: Environment,
    /// Prefer `SESSION_SECRET`; a value in a config file is accepted but never written back.
    #[serde(skip_serializing)]
    pub secret: Option<String>,
    pub kdf_iterations: u32,
    pub cipher_suite: CipherSuite,
    /// Read blobs sealed with the legacy CBC suite.
    pub accept_legacy: bool,
    pub storage_key: String,
    pub data_dir: Option<PathBuf>,
    pub routes: RoutePolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            secret: None,
            kdf_iterations: DEFAULT_ITERATIONS,
            cipher_suite: CipherSuite::Aes256Gcm,
            accept_legacy: false,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            data_dir: None,
            routes: RoutePolicy::default(),
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("environment", &self.environment)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("kdf_iterations", &self.kdf_iterations)
            .field("cipher_suite", &self.cipher_suite)
            .field("accept_legacy", &self.accept_legacy)
            .field("storage_key", &self.storage_key)
            .field("data_dir", &self.data_dir)
            .field("routes", &self.routes)
            .finish()
    }
}

impl SessionConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| {
            SessionError::config(format!("read config {}: {e}", path.display()))
        })?;
        serde_json::from_str(&data)
            .map_err(|e| SessionError::config(format!("parse config {}: {e}", path.display())))
    }

    /// File (if any), then process environment, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup(SECRET_ENV) {
            self.secret = Some(secret);
        }
        if let Some(env) = lookup(ENVIRONMENT_ENV) {
            self.environment = env.parse()?;
        }
        if let Some(iterations) = lookup(KDF_ITERATIONS_ENV) {
            self.kdf_iterations = iterations.trim().parse().map_err(|_| {
                SessionError::config(format!("{KDF_ITERATIONS_ENV} is not a number"))
            })?;
        }
        if let Some(dir) = lookup(DATA_DIR_ENV).filter(|d| !d.trim().is_empty()) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        KdfParams::new(self.kdf_iterations)?;
        if self.storage_key.trim().is_empty() {
            return Err(SessionError::config("storage_key is empty"));
        }
        if self.environment == Environment::Production {
            if !self.cipher_suite.is_authenticated() {
                return Err(SessionError::config(format!(
                    "cipher_suite {:?} writes unauthenticated sessions; not allowed in production",
                    self.cipher_suite
                )));
            }
            if self.accept_legacy {
                warn!("legacy CBC sessions accepted in production");
            }
        }
        self.routes.validate()
    }

    pub fn kdf_params(&self) -> Result<KdfParams> {
        KdfParams::new(self.kdf_iterations)
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => paths::data_dir(),
        }
    }

    pub fn slot_path(&self) -> Result<PathBuf> {
        Ok(paths::slot_path(&self.data_dir()?, &self.storage_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = SessionConfig::default();
        config.validate().unwrap();
        assert_eq!(config.cipher_suite, CipherSuite::Aes256Gcm);
        assert!(!config.accept_legacy);
    }

    #[test]
    fn environment_overrides_apply() {
        let mut config = SessionConfig::default();
        config
            .apply_overrides(lookup(&[
                (SECRET_ENV, "from-env"),
                (ENVIRONMENT_ENV, "prod"),
                (KDF_ITERATIONS_ENV, "250000"),
                (DATA_DIR_ENV, "/var/lib/session"),
            ]))
            .unwrap();
        assert_eq!(config.secret.as_deref(), Some("from-env"));
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.kdf_iterations, 250_000);
        assert_eq!(config.data_dir, Some(PathBuf::from("/var/lib/session")));
    }

    #[test]
    fn bad_overrides_are_configuration_errors() {
        let mut config = SessionConfig::default();
        let err = config
            .apply_overrides(lookup(&[(KDF_ITERATIONS_ENV, "lots")]))
            .unwrap_err();
        assert!(err.is_configuration());
        let err = config
            .apply_overrides(lookup(&[(ENVIRONMENT_ENV, "staging")]))
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn low_iteration_count_fails_validation() {
        let config = SessionConfig {
            kdf_iterations: 1_000,
            ..SessionConfig::default()
        };
        assert!(config.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn legacy_write_suite_refused_in_production() {
        let legacy = SessionConfig {
            cipher_suite: CipherSuite::Aes256CbcLegacy,
            ..SessionConfig::default()
        };
        legacy.validate().unwrap();
        let production = SessionConfig {
            environment: Environment::Production,
            ..legacy
        };
        assert!(production.validate().unwrap_err().is_configuration());
        let reading_only = SessionConfig {
            cipher_suite: CipherSuite::Aes256Gcm,
            accept_legacy: true,
            ..production
        };
        reading_only.validate().unwrap();
    }

    #[test]
    fn file_config_is_parsed_and_secret_not_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(
            &path,
            r#"{
                "environment": "production",
                "secret": "file-secret",
                "cipher_suite": "aes-256-gcm",
                "accept_legacy": true,
                "storage_key": "auth",
                "routes": { "admin_root": "/console" }
            }"#,
        )
        .unwrap();
        let config = SessionConfig::from_file(&path).unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert!(config.accept_legacy);
        assert_eq!(config.storage_key, "auth");
        assert_eq!(config.routes.admin_root, "/console");
        assert_eq!(config.routes.login_path, "/login");

        let written = serde_json::to_string(&config).unwrap();
        assert!(!written.contains("file-secret"));
        assert!(!format!("{config:?}").contains("file-secret"));
    }

    #[test]
    fn missing_file_is_configuration_error() {
        let err = SessionConfig::from_file("/definitely/not/here.json").unwrap_err();
        assert!(err.is_configuration());
    }
}
