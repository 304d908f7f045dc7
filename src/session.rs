//! Session ownership and change notification.
//!
//! The current session is held by a `SessionManager` and handed to
//! handlers explicitly. Interested parties subscribe for changes and
//! unsubscribe (or drop the subscription) when they are torn down.

use crate::backend::IdentityProvider;
use crate::error::BackendError;
use crate::models::Session;
use anyhow::{Context, Result};
use chrono::Utc;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// File-backed persistence for the signed-in session.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored session.
    ///
    /// Missing or unreadable sessions load as `None`, as do expired ones
    /// without a refresh token.
    pub fn load(&self) -> Option<Session> {
        if !self.path.exists() {
            debug!("No session file at {}", self.path.display());
            return None;
        }

        let session = std::fs::read_to_string(&self.path)
            .map_err(|e| warn!("Failed to read session file: {}", e))
            .ok()
            .and_then(|content| {
                serde_json::from_str::<Session>(&content)
                    .map_err(|e| warn!("Ignoring malformed session file: {}", e))
                    .ok()
            })?;

        if session.is_expired(Utc::now()) && session.refresh_token.is_none() {
            info!("Stored session has expired");
            return None;
        }

        Some(session)
    }

    /// Write the session through a temp file renamed into place.
    pub fn save(&self, session: &Session) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let content = serde_json::to_string_pretty(session).context("Failed to encode session")?;
        let mut file = NamedTempFile::new_in(&dir).context("Failed to create temp session file")?;
        file.write_all(content.as_bytes())
            .context("Failed to write session")?;
        file.persist(&self.path)
            .with_context(|| format!("Failed to save session to {}", self.path.display()))?;

        debug!("Saved session to {}", self.path.display());
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove {}", self.path.display()))?;
        }
        Ok(())
    }
}

/// Owner of the current session.
pub struct SessionManager {
    store: SessionStore,
    sender: watch::Sender<Option<Session>>,
}

impl SessionManager {
    /// Start with whatever the store holds.
    pub fn load(store: SessionStore) -> Self {
        let initial = store.load();
        let (sender, _) = watch::channel(initial);
        Self { store, sender }
    }

    /// Snapshot of the current session.
    pub fn current(&self) -> Option<Session> {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> SessionSubscription {
        SessionSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    #[allow(dead_code)] // Used to check subscriptions are released
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Persist and publish a new session.
    pub fn sign_in(&self, session: Session) -> Result<()> {
        self.store.save(&session)?;
        self.sender.send_replace(Some(session));
        Ok(())
    }

    /// Swap an expired session for a fresh one from the provider.
    ///
    /// A provider that refuses the refresh token signs the user out locally.
    pub async fn refresh_if_expired(
        &self,
        provider: &dyn IdentityProvider,
    ) -> Result<Option<Session>> {
        let Some(session) = self.current() else {
            return Ok(None);
        };
        if !session.is_expired(Utc::now()) {
            return Ok(Some(session));
        }

        match provider.refresh_session(&session).await {
            Ok(fresh) => {
                info!("Refreshed expired session for {}", fresh.identity.id);
                self.sign_in(fresh.clone())?;
                Ok(Some(fresh))
            }
            Err(BackendError::Unauthorized) => {
                info!("Stored session can no longer be refreshed");
                self.sign_out()?;
                Ok(None)
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to refresh session")),
        }
    }

    /// Forget the session locally and notify subscribers.
    pub fn sign_out(&self) -> Result<()> {
        self.store.clear()?;
        self.sender.send_replace(None);
        Ok(())
    }
}

/// A live view of session changes.
pub struct SessionSubscription {
    receiver: watch::Receiver<Option<Session>>,
}

impl SessionSubscription {
    #[allow(dead_code)] // Snapshot accessor; the CLI only reacts to changes
    pub fn current(&self) -> Option<Session> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change. Returns `None` once the manager is gone.
    pub async fn changed(&mut self) -> Option<Option<Session>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}
