//! Route guard: decides whether a view may be entered with the current session.

use std::sync::Arc;

use serde::Serialize;

use crate::session::{Role, Session, SessionStore};

/// Access requirement attached to a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteRequirement {
    Public,
    Requires(Role),
}

/// Public login views a denied navigation is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginView {
    General,
    Employee,
}

impl LoginView {
    pub fn path(&self) -> &'static str {
        match self {
            LoginView::General => "/login",
            LoginView::Employee => "/employee/login",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Redirect(LoginView),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn redirect_to(&self) -> Option<LoginView> {
        match self {
            Decision::Allow => None,
            Decision::Redirect(view) => Some(*view),
        }
    }
}

/// Login view for a requirement when no token is present.
pub fn login_view_for(requirement: RouteRequirement) -> LoginView {
    match requirement {
        RouteRequirement::Requires(Role::Employee) => LoginView::Employee,
        _ => LoginView::General,
    }
}

/// Pure access decision for `requirement` given `session`.
///
/// A manager whose identifiers are incomplete is sent to the general login
/// view, not a manager-specific one.
pub fn can_enter(requirement: RouteRequirement, session: &Session) -> Decision {
    let role = match requirement {
        RouteRequirement::Public => return Decision::Allow,
        RouteRequirement::Requires(role) => role,
    };

    if !session.is_authenticated() {
        return Decision::Redirect(login_view_for(requirement));
    }

    if session.satisfies(role) {
        return Decision::Allow;
    }

    match role {
        Role::Employee => Decision::Redirect(LoginView::Employee),
        Role::Manager | Role::Company => Decision::Redirect(LoginView::General),
    }
}

const PUBLIC_ROUTES: &[&str] = &[
    "/register",
    "/login",
    "/choose-role",
    "/manager/login",
    "/manager/register",
    "/employee/login",
    "/employee/register",
    "/share-invite",
    "/employee/onboard",
    "/onboarding-success",
];

/// Routes with a trailing invite-token segment.
const PUBLIC_TOKEN_PREFIXES: &[&str] = &["/employee/onboard/", "/onboard/"];

const MANAGER_ROUTES: &[&str] = &[
    "/dashboard",
    "/employees",
    "/projects",
    "/tasks",
    "/reports",
    "/settings",
];

const EMPLOYEE_ROUTES: &[&str] = &["/employee/dashboard"];

/// Requirement for a known route, `None` for unknown paths.
pub fn route_requirement(path: &str) -> Option<RouteRequirement> {
    let path = normalize_path(path);

    if PUBLIC_ROUTES.contains(&path) {
        return Some(RouteRequirement::Public);
    }
    if PUBLIC_TOKEN_PREFIXES.iter().any(|prefix| {
        path.strip_prefix(prefix)
            .is_some_and(|token| !token.is_empty() && !token.contains('/'))
    }) {
        return Some(RouteRequirement::Public);
    }
    if MANAGER_ROUTES.contains(&path) {
        return Some(RouteRequirement::Requires(Role::Manager));
    }
    if EMPLOYEE_ROUTES.contains(&path) {
        return Some(RouteRequirement::Requires(Role::Employee));
    }
    None
}

/// Drop query, fragment and a trailing slash.
fn normalize_path(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

/// Guard bound to a session store.
pub struct RouteGuard<S: SessionStore> {
    store: Arc<S>,
}

impl<S: SessionStore> Clone for RouteGuard<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: SessionStore> RouteGuard<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Read the store once and decide. A failed read counts as no session.
    pub fn check(&self, requirement: RouteRequirement) -> Decision {
        let session = match self.store.get() {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "Session read failed, treating as logged out");
                Session::default()
            }
        };
        let decision = can_enter(requirement, &session);
        tracing::debug!(?requirement, ?decision, "Route guard evaluated");
        decision
    }

    /// Decision for a navigation to `path`. `/` and unknown paths go to the
    /// general login view.
    pub fn navigate(&self, path: &str) -> Decision {
        match route_requirement(path) {
            Some(requirement) => self.check(requirement),
            None => {
                tracing::debug!(path, "Unknown route, redirecting to login");
                Decision::Redirect(LoginView::General)
            }
        }
    }
}
