use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

/// Persisted authentication state, one file per `--session` name, so repeat
/// runs skip the interactive code handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    pub phone: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// Store under the user config directory, falling back to the working
    /// directory when the platform exposes none.
    pub fn open_default() -> Self {
        let dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mediasync");
        Self { dir }
    }

    pub fn at(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Returns the saved session, or `None` when there is none yet. A file
    /// that no longer deserializes is treated as absent so the user can
    /// simply re-authenticate.
    pub fn load(&self, name: &str) -> Result<Option<Session>> {
        let path = self.path(name);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read session file {}", path.display()))
            }
        };
        match serde_json::from_str(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "session file is corrupt, re-authentication required"
                );
                Ok(None)
            }
        }
    }

    pub fn save(&self, name: &str, session: &Session) -> Result<()> {
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("failed to create session directory {}", self.dir.display())
        })?;
        let path = self.path(name);
        let raw = serde_json::to_string_pretty(session).context("failed to encode session")?;
        fs::write(&path, raw)
            .with_context(|| format!("failed to write session file {}", path.display()))
    }

    pub fn clear(&self, name: &str) -> Result<()> {
        let path = self.path(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err)
                .with_context(|| format!("failed to remove session file {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Session {
        Session {
            token: "tok".into(),
            user_id: 99,
            phone: "+1555".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn round_trips_a_session() {
        let temp = tempdir().expect("tempdir");
        let store = SessionStore::at(temp.path().join("sessions"));
        assert!(store.load("media_sync").expect("load").is_none());

        store.save("media_sync", &sample()).expect("save");
        let loaded = store.load("media_sync").expect("load").expect("present");
        assert_eq!(loaded.token, "tok");
        assert_eq!(loaded.user_id, 99);

        store.clear("media_sync").expect("clear");
        assert!(store.load("media_sync").expect("load").is_none());
    }

    #[test]
    fn corrupt_session_reads_as_absent() {
        let temp = tempdir().expect("tempdir");
        let store = SessionStore::at(temp.path().to_path_buf());
        std::fs::write(temp.path().join("media_sync.json"), "{not json").expect("seed");
        assert!(store.load("media_sync").expect("load").is_none());
    }
}
