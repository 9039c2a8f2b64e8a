//! Company Hub client core
//!
//! Session handling and backend access for the Company Hub portal.
//!
//! This crate provides:
//! - Session store with file-backed and in-memory implementations
//! - Route guard deciding view access from the current session
//! - HTTP client that attaches the bearer token and normalizes failures
//! - Retry, deadline and double-submit helpers
//! - Client-side form validation

pub mod api;
pub mod config;
pub mod error;
pub mod guard;
pub mod session;
pub mod validation;

pub use api::ApiClient;
pub use config::ClientConfig;
pub use error::{normalize, ErrorKind, HttpFailure, NormalizedError, RecoveryAction};
pub use guard::{can_enter, Decision, LoginView, RouteGuard, RouteRequirement};
pub use session::{FileSessionStore, MemorySessionStore, Role, Session, SessionStore};
