//! This module stores the bearer token that authenticated requests carry.
//!
//! A [`Session`] is handed to the [`ApiClient`](crate::http::ApiClient)
//! explicitly. The executor only ever reads from it; login and logout are the
//! only writers.
use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use thiserror::Error;
use tracing::{debug, error, instrument};

/// An error type for failures while reading or writing the token.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("failed to access token file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("token store lock was poisoned")]
    Poisoned,
}

/// Storage for at most one opaque bearer token.
///
/// Setting a token replaces whatever was held before. Clearing is idempotent.
/// No validation of the token's shape is performed.
pub trait TokenStore: Send + Sync + fmt::Debug {
    /// Returns the held token, if any.
    fn get(&self) -> Result<Option<String>, SessionError>;

    /// Stores `token`, replacing any previous value.
    fn set(&self, token: &str) -> Result<(), SessionError>;

    /// Removes the held token. Succeeds when nothing was held.
    fn clear(&self) -> Result<(), SessionError>;
}

/// A token store persisted as a single file, surviving restarts.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Creates a store backed by the file at `path`. Nothing is touched on
    /// disk until the first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The location of the token file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> SessionError {
        SessionError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl TokenStore for FileTokenStore {
    #[instrument(skip(self), fields(path = ?self.path))]
    fn get(&self) -> Result<Option<String>, SessionError> {
        match fs::read_to_string(&self.path) {
            Ok(token) => {
                debug!("restored token from disk");
                Ok(Some(token))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("no token file present");
                Ok(None)
            }
            Err(err) => {
                error!("failed to read token file: {:?}", err);
                Err(self.io_error(err))
            }
        }
    }

    #[instrument(skip(self, token), fields(path = ?self.path))]
    fn set(&self, token: &str) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
        }

        fs::write(&self.path, token).map_err(|err| {
            error!("failed to write token file: {:?}", err);
            self.io_error(err)
        })?;

        // Owner read/write only.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))
                .map_err(|err| self.io_error(err))?;
        }

        debug!("stored token on disk");

        Ok(())
    }

    #[instrument(skip(self), fields(path = ?self.path))]
    fn clear(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("removed token file");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.io_error(err)),
        }
    }
}

/// An in-process token store.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    /// Creates an empty [`MemoryTokenStore`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding `token`.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Result<Option<String>, SessionError> {
        let token = self.token.read().map_err(|_| SessionError::Poisoned)?;

        Ok(token.clone())
    }

    fn set(&self, token: &str) -> Result<(), SessionError> {
        let mut held = self.token.write().map_err(|_| SessionError::Poisoned)?;

        *held = Some(token.to_owned());

        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        let mut held = self.token.write().map_err(|_| SessionError::Poisoned)?;

        *held = None;

        Ok(())
    }
}

/// A shared handle to the token store.
#[derive(Debug, Clone)]
pub struct Session {
    store: Arc<dyn TokenStore>,
}

impl Session {
    /// Creates a [`Session`] over the given store.
    pub fn new(store: impl TokenStore + 'static) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// Creates a session that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::new(MemoryTokenStore::new())
    }

    pub fn token(&self) -> Result<Option<String>, SessionError> {
        self.store.get()
    }

    pub fn set_token(&self, token: &str) -> Result<(), SessionError> {
        self.store.set(token)
    }

    pub fn clear_token(&self) -> Result<(), SessionError> {
        self.store.clear()
    }

    /// Whether a non-empty token is currently held.
    pub fn is_authenticated(&self) -> Result<bool, SessionError> {
        Ok(self.token()?.is_some_and(|token| !token.is_empty()))
    }
}
