use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::codec::SessionCodec;
use crate::config::SessionConfig;
use crate::error::Result;
use crate::record::SessionRecord;

/// One named storage slot holding the current sealed blob, or nothing.
///
/// Implementations must replace and read the whole value atomically.
pub trait SessionSlot: Send + Sync {
    fn read(&self) -> io::Result<Option<String>>;
    fn write(&self, value: &str) -> io::Result<()>;
    /// Removing an empty slot succeeds.
    fn remove(&self) -> io::Result<()>;
}

#[derive(Debug, Default)]
pub struct MemorySlot {
    value: RwLock<Option<String>>,
}

impl MemorySlot {
    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            value: RwLock::new(Some(value.into())),
        }
    }

    pub fn peek(&self) -> Option<String> {
        self.value.read().clone()
    }
}

impl SessionSlot for MemorySlot {
    fn read(&self) -> io::Result<Option<String>> {
        Ok(self.value.read().clone())
    }

    fn write(&self, value: &str) -> io::Result<()> {
        *self.value.write() = Some(value.to_string());
        Ok(())
    }

    fn remove(&self) -> io::Result<()> {
        self.value.write().take();
        Ok(())
    }
}

/// Slot backed by a single file. Writes land in a temp file beside it and are
/// renamed into place.
#[derive(Debug, Clone)]
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn restrict_dir_permissions(path: &Path) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o700)) {
                warn!("cannot restrict permissions on {}: {}", path.display(), e);
            }
        }
        #[cfg(not(unix))]
        let _ = path;
    }
}

impl SessionSlot for FileSlot {
    /// Bytes that are not UTF-8 come back lossily decoded so they fail to
    /// unseal and get cleared like any other corrupt value.
    fn read(&self) -> io::Result<Option<String>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, value: &str) -> io::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
            Self::restrict_dir_permissions(&dir);
        }
        // NamedTempFile is created 0600 on unix
        let mut staging = NamedTempFile::new_in(&dir)?;
        staging.write_all(value.as_bytes())?;
        staging.as_file().sync_all()?;
        staging.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    fn remove(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Session lifecycle over one slot: save on login, load on every protected
/// navigation, clear on logout or on any unseal failure.
#[derive(Clone)]
pub struct SessionStore {
    codec: SessionCodec,
    slot: Arc<dyn SessionSlot>,
}

impl SessionStore {
    pub fn new(codec: SessionCodec, slot: Arc<dyn SessionSlot>) -> Self {
        Self { codec, slot }
    }

    /// Codec and file slot as described by `config`.
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        let codec = SessionCodec::from_config(config)?;
        let slot = FileSlot::new(config.slot_path()?);
        Ok(Self::new(codec, Arc::new(slot)))
    }

    pub fn codec(&self) -> &SessionCodec {
        &self.codec
    }

    /// Seal `record` and replace whatever the slot held.
    pub fn save(&self, record: &SessionRecord) -> Result<()> {
        let blob = self.codec.seal(record)?;
        self.slot.write(&blob)?;
        info!(role = %record.role, "session saved");
        Ok(())
    }

    /// The current session, if one is stored and unseals.
    ///
    /// An undecryptable value is removed before returning `None`.
    pub fn load(&self) -> Option<SessionRecord> {
        let blob = match self.slot.read() {
            Ok(Some(blob)) => blob,
            Ok(None) => return None,
            Err(e) => {
                warn!("session slot unreadable, treating as signed out: {e}");
                return None;
            }
        };
        match self.codec.unseal(&blob) {
            Ok(record) => Some(record),
            Err(_) => {
                warn!("stored session failed to unseal; clearing it");
                if let Err(e) = self.slot.remove() {
                    warn!("failed to clear rejected session: {e}");
                }
                None
            }
        }
    }

    pub fn clear(&self) -> Result<()> {
        self.slot.remove()?;
        info!("session cleared");
        Ok(())
    }
}
