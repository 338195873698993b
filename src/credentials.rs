use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const STORE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to access credential store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("credential store {path} is not valid JSON: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("credential store {path} has unsupported version {version}")]
    UnsupportedVersion { path: PathBuf, version: u32 },
}

/// Source of the bearer credential for authenticated requests.
pub trait CredentialStore: Send + Sync {
    fn get(&self) -> Result<Option<Session>, CredentialError>;
    fn set(&self, session: Session) -> Result<(), CredentialError>;
    fn clear(&self) -> Result<(), CredentialError>;
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    session: Mutex<Option<Session>>,
}

#[cfg(test)]
impl MemoryCredentialStore {
    pub fn with_session(session: Session) -> Self {
        Self {
            session: Mutex::new(Some(session)),
        }
    }
}

#[cfg(test)]
impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Result<Option<Session>, CredentialError> {
        Ok(self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn set(&self, session: Session) -> Result<(), CredentialError> {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session);
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialError> {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    #[serde(default)]
    session: Option<Session>,
}

/// Versioned JSON document holding a single `session` entry.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> CredentialError {
        CredentialError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn read_document(&self) -> Result<Option<StoreDocument>, CredentialError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.io_error(err)),
        };
        let document: StoreDocument =
            serde_json::from_str(&raw).map_err(|source| CredentialError::Malformed {
                path: self.path.clone(),
                source,
            })?;
        if document.version != STORE_VERSION {
            return Err(CredentialError::UnsupportedVersion {
                path: self.path.clone(),
                version: document.version,
            });
        }
        Ok(Some(document))
    }

    fn write_document(&self, document: &StoreDocument) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
        }
        let body = serde_json::to_string_pretty(document).map_err(|source| {
            CredentialError::Malformed {
                path: self.path.clone(),
                source,
            }
        })?;
        write_private(&self.path, body.as_bytes()).map_err(|err| self.io_error(err))
    }
}

/// The session file holds a bearer token, so it is readable by the owner only.
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(0o600);
        let mut file = options.open(path)?;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        file.write_all(contents)
    }
    #[cfg(not(unix))]
    {
        options.open(path)?.write_all(contents)
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> Result<Option<Session>, CredentialError> {
        Ok(self.read_document()?.and_then(|doc| doc.session))
    }

    fn set(&self, session: Session) -> Result<(), CredentialError> {
        self.write_document(&StoreDocument {
            version: STORE_VERSION,
            session: Some(session),
        })
    }

    fn clear(&self) -> Result<(), CredentialError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.io_error(err)),
        }
    }
}

/// Flat key/value dump of the pre-versioned storage keys.
#[derive(Debug, Default, Deserialize)]
pub struct LegacyCredentials {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub spa_token: Option<String>,
    #[serde(default)]
    pub spa_role: Option<String>,
    #[serde(default)]
    pub spa_username: Option<String>,
}

impl LegacyCredentials {
    pub fn from_path(path: &Path) -> Result<Self, CredentialError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CredentialError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| CredentialError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `access_token` takes precedence over the older `spa_token`.
    pub fn into_session(self) -> Option<Session> {
        let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());
        let access_token = non_empty(self.access_token).or_else(|| non_empty(self.spa_token))?;
        Some(Session {
            access_token,
            role: non_empty(self.spa_role),
            username: non_empty(self.spa_username),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    Imported,
    AlreadyPresent,
    NothingToImport,
}

/// One-time import of legacy keys. An existing session is never overwritten.
pub fn import_legacy(
    store: &dyn CredentialStore,
    legacy: LegacyCredentials,
) -> Result<MigrationOutcome, CredentialError> {
    if store.get()?.is_some() {
        return Ok(MigrationOutcome::AlreadyPresent);
    }
    match legacy.into_session() {
        Some(session) => {
            store.set(session)?;
            Ok(MigrationOutcome::Imported)
        }
        None => Ok(MigrationOutcome::NothingToImport),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(token: &str) -> Session {
        Session {
            access_token: token.to_string(),
            role: Some("advisor".to_string()),
            username: Some("jdoe".to_string()),
        }
    }

    #[test]
    fn memory_store_round_trips_and_clears() {
        let store = MemoryCredentialStore::default();
        assert_eq!(store.get().unwrap(), None);
        store.set(session("abc")).unwrap();
        assert_eq!(store.get().unwrap(), Some(session("abc")));
        store.clear().unwrap();
        assert_eq!(store.get().unwrap(), None);
    }

    #[test]
    fn file_store_persists_versioned_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let store = FileCredentialStore::new(&path);

        assert_eq!(store.get().unwrap(), None);
        store.set(session("abc")).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert_eq!(raw["session"]["access_token"], "abc");

        let reopened = FileCredentialStore::new(&path);
        assert_eq!(reopened.get().unwrap(), Some(session("abc")));

        reopened.clear().unwrap();
        reopened.clear().unwrap();
        assert_eq!(store.get().unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn file_store_is_private_to_owner() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        FileCredentialStore::new(&path).set(session("abc")).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn file_store_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{"version": 7, "session": null}"#).unwrap();

        let err = FileCredentialStore::new(&path).get().unwrap_err();
        assert!(matches!(err, CredentialError::UnsupportedVersion { version: 7, .. }));
    }

    #[test]
    fn legacy_import_prefers_current_token_key() {
        let store = MemoryCredentialStore::default();
        let legacy = LegacyCredentials {
            access_token: Some("new".to_string()),
            spa_token: Some("old".to_string()),
            spa_role: Some("admin".to_string()),
            spa_username: Some("root".to_string()),
        };

        assert_eq!(import_legacy(&store, legacy).unwrap(), MigrationOutcome::Imported);
        let imported = store.get().unwrap().unwrap();
        assert_eq!(imported.access_token, "new");
        assert_eq!(imported.role.as_deref(), Some("admin"));
    }

    #[test]
    fn legacy_import_falls_back_to_spa_token() {
        let session = LegacyCredentials {
            access_token: Some(String::new()),
            spa_token: Some("old".to_string()),
            ..Default::default()
        }
        .into_session()
        .unwrap();
        assert_eq!(session.access_token, "old");
        assert_eq!(session.role, None);
    }

    #[test]
    fn legacy_import_keeps_existing_session() {
        let store = MemoryCredentialStore::with_session(session("current"));
        let legacy = LegacyCredentials {
            spa_token: Some("old".to_string()),
            ..Default::default()
        };
        assert_eq!(
            import_legacy(&store, legacy).unwrap(),
            MigrationOutcome::AlreadyPresent
        );
        assert_eq!(store.get().unwrap().unwrap().access_token, "current");
    }

    #[test]
    fn legacy_import_without_token_is_a_no_op() {
        let store = MemoryCredentialStore::default();
        assert_eq!(
            import_legacy(&store, LegacyCredentials::default()).unwrap(),
            MigrationOutcome::NothingToImport
        );
        assert_eq!(store.get().unwrap(), None);
    }
}
