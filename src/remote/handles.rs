//! Credential sessions and the per-scope service handle cache.
//!
//! Credential acquisition is external to this crate: a [`CredentialProvider`]
//! supplies opaque sessions, and [`HandleCache`] hands out [`ServiceHandle`]s
//! built from the current session generation. Refresh is copy-on-refresh: a
//! whole new generation is built and swapped atomically, so a reader sees a
//! fully-old or fully-new handle, never a mix.

use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};

use crate::domain::ScopeId;
use crate::error::{ApiResult, RemoteError};

/// An authenticated session with the remote service.
///
/// The token is opaque to this crate; nothing above the transport ever
/// inspects it.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialSession {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl CredentialSession {
    /// Wraps a token issued by an external credential source.
    pub fn new(token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub(crate) fn token(&self) -> &str {
        &self.token
    }

    /// Stated expiry, if the credential source reported one.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}

impl fmt::Debug for CredentialSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSession")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Source of credential sessions.
///
/// Both methods block (they typically perform their own network round trip)
/// and are only ever invoked from bridge worker threads.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialProvider: Send + Sync {
    /// Produces a usable session, minting one if necessary.
    fn session(&self) -> Result<CredentialSession, RemoteError>;

    /// Forces a new session, invalidating `current`.
    fn refresh(&self, current: &CredentialSession) -> Result<CredentialSession, RemoteError>;
}

/// Everything a single remote call needs: the target scope and the session
/// to authenticate with, pinned to the generation it was built from.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    scope: ScopeId,
    session: CredentialSession,
    generation: u64,
}

impl ServiceHandle {
    /// The scope (calendar id / mailbox) this handle addresses.
    pub fn scope(&self) -> &ScopeId {
        &self.scope
    }

    /// Bearer token for the transport to authenticate with.
    pub fn token(&self) -> &str {
        self.session.token()
    }

    /// The session generation this handle was built from.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

struct Generation {
    number: u64,
    session: CredentialSession,
}

/// Once-initialized cache of the current credential generation.
///
/// Readers take a snapshot and build handles from it without blocking each
/// other; [`refresh`](Self::refresh) is single-writer and coalesces: a writer
/// that finds the generation already advanced past the one it observed
/// returns without touching the provider, so a burst of concurrent
/// auth-expiry failures triggers exactly one refresh.
pub struct HandleCache {
    provider: Arc<dyn CredentialProvider>,
    current: RwLock<Option<Arc<Generation>>>,
    refresh_lock: Mutex<()>,
}

impl HandleCache {
    /// Creates an empty cache; the first session is minted lazily on the
    /// first [`handle`](Self::handle) call.
    pub fn new(provider: Arc<dyn CredentialProvider>) -> Self {
        Self {
            provider,
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Builds a handle for `scope` from the current generation.
    ///
    /// Blocks on the provider only when no generation exists yet.
    pub fn handle(&self, scope: &ScopeId) -> ApiResult<ServiceHandle> {
        let generation = match self.snapshot() {
            Some(generation) => generation,
            None => self.initialize()?,
        };
        Ok(ServiceHandle {
            scope: scope.clone(),
            session: generation.session.clone(),
            generation: generation.number,
        })
    }

    /// Replaces the current generation with a freshly refreshed one, unless
    /// another writer already advanced past `observed_generation`.
    pub fn refresh(&self, observed_generation: u64) -> ApiResult<()> {
        let _writer = self
            .refresh_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let current = self.snapshot();
        if let Some(generation) = &current {
            if generation.number > observed_generation {
                tracing::debug!(
                    observed = observed_generation,
                    current = generation.number,
                    "credential refresh coalesced"
                );
                return Ok(());
            }
        }

        let session = match &current {
            Some(generation) => self.provider.refresh(&generation.session)?,
            None => self.provider.session()?,
        };
        let number = current.map(|g| g.number).unwrap_or(0) + 1;
        self.swap(Generation { number, session });
        tracing::info!(generation = number, "credential session refreshed");
        Ok(())
    }

    fn initialize(&self) -> ApiResult<Arc<Generation>> {
        let _writer = self
            .refresh_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Another caller may have initialized while we waited on the lock.
        if let Some(generation) = self.snapshot() {
            return Ok(generation);
        }
        let session = self.provider.session()?;
        let generation = Arc::new(Generation { number: 1, session });
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::clone(&generation));
        tracing::debug!("credential session initialized");
        Ok(generation)
    }

    fn snapshot(&self) -> Option<Arc<Generation>> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn swap(&self, generation: Generation) {
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::new(generation));
    }
}
