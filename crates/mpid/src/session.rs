//! Client sessions minted by `MpiOpen`.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Opaque session handle returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    fn mint() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Identifier text as sent on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// State tracked for one open session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    client_name: String,
    max_payload_size_bytes: usize,
}

impl Session {
    /// Session identifier.
    #[must_use]
    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    /// Client name supplied at open.
    #[must_use]
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// Largest reported payload the client accepts; zero is unlimited.
    #[must_use]
    pub const fn max_payload_size_bytes(&self) -> usize {
        self.max_payload_size_bytes
    }
}

/// Failures raised by [`SessionRegistry`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The open request carried unusable arguments.
    #[error("invalid session argument: {0}")]
    InvalidArgument(&'static str),
    /// The session was never opened or has been closed.
    #[error("unknown session '{0}'")]
    UnknownSession(String),
}

/// Open sessions keyed by identifier.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a session for `client_name`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidArgument`] when the client name is empty.
    pub fn open(
        &mut self,
        client_name: &str,
        max_payload_size_bytes: usize,
    ) -> Result<SessionId, SessionError> {
        if client_name.is_empty() {
            return Err(SessionError::InvalidArgument("client name must not be empty"));
        }
        let mut id = SessionId::mint();
        while self.sessions.contains_key(id.as_str()) {
            id = SessionId::mint();
        }
        self.sessions.insert(
            id.0.clone(),
            Session {
                id: id.clone(),
                client_name: client_name.to_owned(),
                max_payload_size_bytes,
            },
        );
        Ok(id)
    }

    /// Closes the session and returns its final state.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownSession`] for ids that are not open.
    pub fn close(&mut self, session_id: &str) -> Result<Session, SessionError> {
        self.sessions
            .remove(session_id)
            .ok_or_else(|| SessionError::UnknownSession(session_id.to_owned()))
    }

    /// Looks up an open session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownSession`] for ids that are not open.
    pub fn get(&self, session_id: &str) -> Result<&Session, SessionError> {
        self.sessions
            .get(session_id)
            .ok_or_else(|| SessionError::UnknownSession(session_id.to_owned()))
    }

    /// Number of open sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
