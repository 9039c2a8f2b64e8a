use std::time::Duration;

use crate::error::NormalizedError;
use crate::guard::{login_view_for, LoginView, RouteRequirement};
use crate::session::SessionStore;

/// Carry out the recovery an error asks for.
///
/// For `redirect_to_login` this waits `delay` so the message stays visible,
/// clears the session, and returns the login view for `requirement`. Other
/// errors need no recovery and return `None`.
pub async fn recover_from<S: SessionStore + ?Sized>(
    err: &NormalizedError,
    store: &S,
    requirement: RouteRequirement,
    delay: Duration,
) -> Option<LoginView> {
    if !err.requires_login() {
        return None;
    }

    tokio::time::sleep(delay).await;

    if let Err(e) = store.clear() {
        tracing::warn!(error = %e, "Failed to clear expired session");
    }
    let view = login_view_for(requirement);
    tracing::info!(redirect = view.path(), "Session expired, redirecting to login");
    Some(view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{normalize, ErrorKind, HttpFailure};
    use crate::session::{MemorySessionStore, Role, Session};

    #[tokio::test(start_paused = true)]
    async fn test_unauthenticated_clears_session() {
        let store = MemorySessionStore::with_session(Session::with_token("abc"));
        let err = normalize(&HttpFailure::Status {
            status: 401,
            body: None,
        });

        let view = recover_from(
            &err,
            &store,
            RouteRequirement::Requires(Role::Employee),
            Duration::from_millis(1500),
        )
        .await;

        assert_eq!(view, Some(LoginView::Employee));
        assert_eq!(store.get().unwrap(), Session::default());
    }

    #[tokio::test]
    async fn test_other_errors_leave_session_alone() {
        let store = MemorySessionStore::with_session(Session::with_token("abc"));
        let err = NormalizedError::new(ErrorKind::Forbidden, "no");

        let view = recover_from(
            &err,
            &store,
            RouteRequirement::Requires(Role::Manager),
            Duration::from_secs(60),
        )
        .await;

        assert_eq!(view, None);
        assert!(store.get().unwrap().is_authenticated());
    }
}
