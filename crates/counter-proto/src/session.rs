use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Read access to the operator's bearer token.
///
/// Callers must ask again on every poll cycle: a token cleared by logout (or
/// by another process) has to be noticed on the next read.
pub trait AuthTokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PersistedSession {
    #[serde(default)]
    access_token: Option<String>,
}

/// Token persisted as JSON on disk, re-read on every `token()` call.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store(&self, token: &str) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let session = PersistedSession {
            access_token: Some(token.to_string()),
        };
        let json = serde_json::to_string_pretty(&session)?;
        write_private(&self.path, json.as_bytes())?;
        Ok(())
    }

    /// Forget the token.  Missing file is not an error.
    pub fn clear(&self) -> anyhow::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn load(&self) -> Option<PersistedSession> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<PersistedSession>(&content) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("[session] ignoring unreadable {}: {}", self.path.display(), e);
                None
            }
        }
    }
}

impl AuthTokenProvider for FileTokenStore {
    fn token(&self) -> Option<String> {
        self.load()?
            .access_token
            .filter(|t| !t.trim().is_empty())
    }
}

/// Write `data` readable by the owner only.
#[cfg(unix)]
fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // `mode` only applies on create.
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(data)
}

#[cfg(not(unix))]
fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, data)
}

/// Fixed token, e.g. passed on the command line.
#[derive(Debug, Clone)]
pub struct StaticToken(pub Option<String>);

impl AuthTokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        self.0.clone().filter(|t| !t.trim().is_empty())
    }
}
