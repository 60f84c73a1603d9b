//! In-memory session store with idle expiry and per-session run leases

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};
use std::time::Duration;

use mini_moka::sync::{Cache, ConcurrentCacheExt};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::ConsultError;
use crate::session::{Intake, Session};

struct SessionHandle {
    session: RwLock<Session>,
    lease: Arc<Mutex<()>>,
}

impl SessionHandle {
    fn is_leased(&self) -> bool {
        self.lease.try_lock().is_err()
    }
}

/// Sessions currently held by a run, kept out of reach of idle expiry
type Pinned = Arc<StdMutex<HashMap<String, Arc<SessionHandle>>>>;

/// Exclusive right to run the pipeline for one session
///
/// Released on drop.
pub struct SessionLease {
    session_id: String,
    handle: Arc<SessionHandle>,
    pinned: Pinned,
    _guard: OwnedMutexGuard<()>,
}

impl SessionLease {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLease")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        let mut pinned = self.pinned.lock().unwrap_or_else(PoisonError::into_inner);
        if pinned
            .get(&self.session_id)
            .is_some_and(|handle| Arc::ptr_eq(handle, &self.handle))
        {
            pinned.remove(&self.session_id);
        }
    }
}

/// Keyed store of consultation sessions
///
/// Sessions are evicted after sitting idle for the configured TTL; reads
/// and writes both count as activity. A session under a run lease is never
/// evicted. Once `max_sessions` are live, new ids are refused rather than
/// displacing existing sessions.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Cache<String, Arc<SessionHandle>>,
    pinned: Pinned,
    max_sessions: u64,
}

impl SessionStore {
    pub fn new(idle_ttl: Duration, max_sessions: u64) -> Self {
        Self {
            sessions: Cache::builder().time_to_idle(idle_ttl).build(),
            pinned: Arc::default(),
            max_sessions,
        }
    }

    /// Create a session, generating a UUID v4 id when none is given
    ///
    /// An existing idle session with the same id is replaced.
    ///
    /// # Errors
    ///
    /// Returns `ConsultError::SessionBusy` if a run currently holds the id and
    /// `ConsultError::StoreFull` when no room is left for a new id
    pub fn create(&self, id: Option<String>, intake: Intake) -> Result<Session, ConsultError> {
        let id = id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let pinned = self.pinned.lock().unwrap_or_else(PoisonError::into_inner);
        let existing = self.lookup(&pinned, &id);

        if existing.as_ref().is_some_and(|handle| handle.is_leased()) {
            return Err(ConsultError::SessionBusy(id));
        }
        if existing.is_none() {
            self.sessions.sync();
            if self.sessions.entry_count() >= self.max_sessions {
                tracing::warn!(max_sessions = self.max_sessions, "session store is full");
                return Err(ConsultError::StoreFull);
            }
        }

        let session = Session::new(id.clone(), intake);
        let handle = SessionHandle {
            session: RwLock::new(session.clone()),
            lease: Arc::new(Mutex::new(())),
        };
        self.sessions.insert(id, Arc::new(handle));
        drop(pinned);

        tracing::debug!(session_id = %session.id, "session created");
        Ok(session)
    }

    /// Snapshot of a session
    ///
    /// # Errors
    ///
    /// Returns `ConsultError::SessionNotFound` for unknown or expired ids
    pub fn get(&self, id: &str) -> Result<Session, ConsultError> {
        let handle = self.require(id)?;
        let session = handle.session.read().unwrap_or_else(PoisonError::into_inner);
        Ok(session.clone())
    }

    /// Remove a session, returning whether it existed
    ///
    /// A running session is removed too; its run fails at the next write.
    pub fn delete(&self, id: &str) -> bool {
        let key = id.to_owned();
        let mut pinned = self.pinned.lock().unwrap_or_else(PoisonError::into_inner);
        let was_pinned = pinned.remove(&key).is_some();
        let existed = self.sessions.get(&key).is_some() || was_pinned;
        self.sessions.invalidate(&key);
        drop(pinned);

        if existed {
            tracing::debug!(session_id = id, "session deleted");
        }
        existed
    }

    /// Apply a change to a session in place
    ///
    /// # Errors
    ///
    /// Returns `ConsultError::SessionNotFound` for unknown or expired ids
    pub fn mutate<R>(&self, id: &str, change: impl FnOnce(&mut Session) -> R) -> Result<R, ConsultError> {
        let handle = self.require(id)?;
        let mut session = handle.session.write().unwrap_or_else(PoisonError::into_inner);
        Ok(change(&mut session))
    }

    /// Take the run lease for a session without waiting
    ///
    /// # Errors
    ///
    /// Returns `ConsultError::SessionNotFound` for unknown ids and
    /// `ConsultError::SessionBusy` when another run holds the lease
    pub fn acquire(&self, id: &str) -> Result<SessionLease, ConsultError> {
        let mut pinned = self.pinned.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = self
            .lookup(&pinned, id)
            .ok_or_else(|| ConsultError::SessionNotFound(id.to_owned()))?;
        let guard = Arc::clone(&handle.lease)
            .try_lock_owned()
            .map_err(|_| ConsultError::SessionBusy(id.to_owned()))?;
        pinned.insert(id.to_owned(), Arc::clone(&handle));
        drop(pinned);

        Ok(SessionLease {
            session_id: id.to_owned(),
            handle,
            pinned: Arc::clone(&self.pinned),
            _guard: guard,
        })
    }

    /// Cached handle, falling back to a pinned one that idle expiry dropped
    fn lookup(&self, pinned: &HashMap<String, Arc<SessionHandle>>, id: &str) -> Option<Arc<SessionHandle>> {
        let key = id.to_owned();
        if let Some(handle) = self.sessions.get(&key) {
            return Some(handle);
        }

        let handle = pinned.get(id).cloned()?;
        self.sessions.insert(key, Arc::clone(&handle));
        Some(handle)
    }

    fn require(&self, id: &str) -> Result<Arc<SessionHandle>, ConsultError> {
        let pinned = self.pinned.lock().unwrap_or_else(PoisonError::into_inner);
        self.lookup(&pinned, id)
            .ok_or_else(|| ConsultError::SessionNotFound(id.to_owned()))
    }
}
