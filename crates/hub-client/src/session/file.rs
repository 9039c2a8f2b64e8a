use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::{absent_unless_authenticated, Session, SessionError, SessionStore};

/// Session persisted as a YAML document on disk.
///
/// Each write goes to a uniquely named sibling temp file (mode 0600 on unix)
/// that is renamed over the target. Readers in any process see either the
/// old or the new document, and concurrent writers never share a temp file.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `~/.company-hub/session.yaml`.
    pub fn in_home_dir() -> Result<Self, SessionError> {
        Ok(Self::new(Self::default_path()?))
    }

    pub fn default_path() -> Result<PathBuf, SessionError> {
        let home = dirs::home_dir().ok_or(SessionError::NoHomeDir)?;
        Ok(home.join(".company-hub").join("session.yaml"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self) -> Result<Session, SessionError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Session::default()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Session::default());
        }
        let session: Session = serde_yaml::from_str(&content)?;
        Ok(absent_unless_authenticated(session))
    }

    fn set(&self, session: &Session) -> Result<(), SessionError> {
        let dir = self.dir();
        fs::create_dir_all(dir)?;
        let content = serde_yaml::to_string(session)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        tracing::debug!(
            path = %self.path.display(),
            token = session.token_preview(),
            "Session stored"
        );
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Session cleared");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
