use std::sync::RwLock;

use super::{absent_unless_authenticated, Session, SessionError, SessionStore};

/// In-process session store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: RwLock<Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            session: RwLock::new(session),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self) -> Result<Session, SessionError> {
        let guard = self.session.read().map_err(|_| SessionError::Poisoned)?;
        Ok(absent_unless_authenticated(guard.clone()))
    }

    fn set(&self, session: &Session) -> Result<(), SessionError> {
        let mut guard = self.session.write().map_err(|_| SessionError::Poisoned)?;
        *guard = session.clone();
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        let mut guard = self.session.write().map_err(|_| SessionError::Poisoned)?;
        *guard = Session::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;

    #[test]
    fn test_set_get_round_trip() {
        let store = MemorySessionStore::new();
        let session = Session {
            token: Some("abc".to_string()),
            role: Some(Role::Employee),
            employee_id: Some("e-42".to_string()),
            display_name: Some("Ada".to_string()),
            designation: Some("Engineer".to_string()),
            ..Default::default()
        };
        store.set(&session).unwrap();
        assert_eq!(store.get().unwrap(), session);
    }

    #[test]
    fn test_clear_empties_session() {
        let store = MemorySessionStore::with_session(Session::with_token("abc"));
        store.clear().unwrap();
        assert_eq!(store.get().unwrap(), Session::default());
    }

    #[test]
    fn test_tokenless_session_reads_as_absent() {
        let store = MemorySessionStore::new();
        store
            .set(&Session {
                role: Some(Role::Manager),
                manager_id: Some("5".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(store.get().unwrap(), Session::default());
    }
}
