use directories::ProjectDirs;
use std::path::PathBuf;

use crate::error::{Result, SessionError};

pub const APP_QUALIFIER: &str = "com";
pub const APP_ORG: &str = "darklock";
pub const APP_NAME: &str = "session";

pub const DATA_DIR_ENV: &str = "SESSION_DATA_DIR";

pub fn data_dir() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var(DATA_DIR_ENV) {
        if !override_path.trim().is_empty() {
            return Ok(PathBuf::from(override_path));
        }
    }
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .ok_or_else(|| SessionError::config("cannot determine data directory"))?;
    Ok(dirs.data_dir().to_path_buf())
}

/// File backing the named session slot inside `dir`.
pub fn slot_path(dir: &std::path::Path, storage_key: &str) -> PathBuf {
    let name: String = storage_key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    dir.join(format!("{name}.slot"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn slot_name_is_sanitized() {
        let path = slot_path(Path::new("/tmp/x"), "../evil key");
        assert_eq!(path, Path::new("/tmp/x/___evil_key.slot"));
    }
}
