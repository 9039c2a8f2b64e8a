//! Session store: who is logged in.
//!
//! The store is a dumb persistent bag of fields. Role invariants are checked
//! by the route guard, not here.

mod file;
mod memory;

pub use file::FileSessionStore;
pub use memory::MemorySessionStore;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity role of an authenticated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Company,
    Manager,
    Employee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Company => "company",
            Role::Manager => "manager",
            Role::Employee => "employee",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "company" => Ok(Role::Company),
            "manager" => Ok(Role::Manager),
            "employee" => Ok(Role::Employee),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Attributes of the current identity.
///
/// `display_name` and the informational extras are never used for
/// authorization decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub designation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

impl Session {
    /// A session holding only a bearer token.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Default::default()
        }
    }

    pub fn is_authenticated(&self) -> bool {
        present(&self.token)
    }

    /// Whether the identifiers required for `role` are present.
    ///
    /// Company-level access needs only the token. Managers need both
    /// `manager_id` and `company_id`; employees need `employee_id`.
    pub fn satisfies(&self, role: Role) -> bool {
        if !self.is_authenticated() {
            return false;
        }
        match role {
            Role::Company => true,
            Role::Manager => present(&self.manager_id) && present(&self.company_id),
            Role::Employee => present(&self.employee_id),
        }
    }

    /// Short token prefix safe to log.
    pub fn token_preview(&self) -> &str {
        match self.token.as_deref() {
            Some(t) => &t[..t.char_indices().nth(8).map(|(i, _)| i).unwrap_or(t.len())],
            None => "",
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),

    #[error("Could not find home directory")]
    NoHomeDir,

    #[error("Session store lock poisoned")]
    Poisoned,
}

/// Persistent key-value storage for the current session.
///
/// Implementations must make `set` appear atomic to readers: `get` returns
/// either the previous or the new session, never a mix.
pub trait SessionStore: Send + Sync {
    /// Current session, or `Session::default()` when no token is stored.
    fn get(&self) -> Result<Session, SessionError>;

    /// Overwrite every session field.
    fn set(&self, session: &Session) -> Result<(), SessionError>;

    /// Remove every session field.
    fn clear(&self) -> Result<(), SessionError>;
}

/// Stored sessions without a token read back as absent.
pub(crate) fn absent_unless_authenticated(session: Session) -> Session {
    if session.is_authenticated() {
        session
    } else {
        Session::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> Session {
        Session {
            token: Some("abc".to_string()),
            role: Some(Role::Manager),
            manager_id: Some("5".to_string()),
            company_id: Some("9".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_manager_invariant() {
        assert!(manager().satisfies(Role::Manager));

        let mut s = manager();
        s.company_id = None;
        assert!(!s.satisfies(Role::Manager));

        let mut s = manager();
        s.manager_id = Some(String::new());
        assert!(!s.satisfies(Role::Manager));
    }

    #[test]
    fn test_employee_invariant() {
        let mut s = Session::with_token("tok");
        s.role = Some(Role::Employee);
        assert!(!s.satisfies(Role::Employee));
        s.employee_id = Some("e-1".to_string());
        assert!(s.satisfies(Role::Employee));
    }

    #[test]
    fn test_empty_token_is_unauthenticated() {
        assert!(!Session::with_token("").is_authenticated());
        assert!(!Session::default().satisfies(Role::Company));
        assert!(Session::with_token("t").satisfies(Role::Company));
    }

    #[test]
    fn test_role_parse_and_serde() {
        assert_eq!("Manager".parse::<Role>().unwrap(), Role::Manager);
        assert!("admin".parse::<Role>().is_err());
        let yaml = serde_yaml::to_string(&manager()).unwrap();
        assert!(yaml.contains("role: manager"));
    }

    #[test]
    fn test_token_preview() {
        assert_eq!(Session::with_token("company_1_acme@example.com").token_preview(), "company_");
        assert_eq!(Session::with_token("abc").token_preview(), "abc");
        assert_eq!(Session::default().token_preview(), "");
    }
}
