use crate::config::DEFAULT_HANDLE_DOMAIN;
use crate::error::{QueryError, Result};
use crate::models::{Credentials, Session};
use crate::transport::Transport;
use std::sync::{Arc, PoisonError, RwLock};

/// Owns the single authenticated session of one client.
///
/// Replacement and invalidation happen under the write lock, so `current()`
/// either returns a fully valid session or fails with `NotAuthenticated`.
pub struct SessionManager<T> {
    transport: Arc<T>,
    current: RwLock<Option<Session>>,
    handle_domain: Option<String>,
}

impl<T: Transport> SessionManager<T> {
    pub fn new(transport: T) -> Self {
        Self::with_shared(Arc::new(transport))
    }

    pub fn with_shared(transport: Arc<T>) -> Self {
        Self {
            transport,
            current: RwLock::new(None),
            handle_domain: Some(DEFAULT_HANDLE_DOMAIN.to_string()),
        }
    }

    /// Domain appended to bare usernames at login.
    #[must_use]
    pub fn with_handle_domain(mut self, domain: Option<String>) -> Self {
        self.handle_domain = domain.filter(|d| !d.is_empty());
        self
    }

    pub const fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Exchanges `credentials` for a new session. The previous session is
    /// invalidated only once the exchange has succeeded.
    pub async fn open(&self, credentials: &Credentials) -> Result<Session> {
        credentials.validate()?;
        let identifier = credentials.login_identifier(self.handle_domain.as_deref());

        let grant = self
            .transport
            .create_session(&identifier, credentials.secret())
            .await?;
        let session = Session::from_grant(grant);

        {
            let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(previous) = slot.take() {
                previous.invalidate();
            }
            *slot = Some(session.clone());
        }

        tracing::info!(
            did = session.did(),
            handle = session.handle(),
            "Logged in as {}",
            session.handle()
        );
        Ok(session)
    }

    pub fn current(&self) -> Result<Session> {
        let slot = self.current.read().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(session) if session.is_valid() => Ok(session.clone()),
            _ => Err(QueryError::NotAuthenticated),
        }
    }

    pub fn is_open(&self) -> bool {
        self.current().is_ok()
    }

    /// Invalidates the current session. Calling it again is a no-op.
    pub fn close(&self) {
        let previous = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(session) = previous {
            session.invalidate();
            tracing::info!(handle = session.handle(), "Session closed");
        }
    }

    /// Drops `session` after the service reported it stale. A newer session
    /// opened in the meantime is left in place.
    pub fn invalidate(&self, session: &Session) {
        session.invalidate();
        let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|s| s.id() == session.id()) {
            *slot = None;
            tracing::warn!(handle = session.handle(), "Session invalidated by the service");
        }
    }
}
