//! Role-gated routing over the stored session.

use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SessionError};
use crate::record::{Role, SessionRecord};
use crate::store::SessionStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutePolicy {
    pub login_path: String,
    /// Query parameter carrying the page to return to after login.
    pub return_param: String,
    pub admin_root: String,
    pub member_root: String,
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self {
            login_path: "/login".into(),
            return_param: "redirect".into(),
            admin_root: "/admin".into(),
            member_root: "/dashboard".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Area {
    Admin,
    Member,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    RedirectTo(String),
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated { role: Role, record: SessionRecord },
}

impl AuthState {
    /// Expired records and unrecognized roles count as no session.
    pub fn from_record(record: Option<SessionRecord>, now: DateTime<Utc>) -> Self {
        let Some(record) = record else {
            return AuthState::Unauthenticated;
        };
        if record.is_expired_at(now) {
            info!("stored session expired");
            return AuthState::Unauthenticated;
        }
        match record.role() {
            Some(role) => AuthState::Authenticated { role, record },
            None => {
                debug!(role = %record.role, "stored session has unrecognized role");
                AuthState::Unauthenticated
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated { .. })
    }

    pub fn role(&self) -> Option<Role> {
        match self {
            AuthState::Authenticated { role, .. } => Some(*role),
            AuthState::Unauthenticated => None,
        }
    }
}

impl RoutePolicy {
    pub fn validate(&self) -> Result<()> {
        for (name, path) in [
            ("login_path", &self.login_path),
            ("admin_root", &self.admin_root),
            ("member_root", &self.member_root),
        ] {
            if !is_local_path(path) || normalize_path(path).as_deref() != Some(path.as_str()) {
                return Err(SessionError::config(format!(
                    "routes.{name} must be a normalized local absolute path, got {path:?}"
                )));
            }
        }
        if self.return_param.trim().is_empty() {
            return Err(SessionError::config("routes.return_param is empty"));
        }
        if self.login_path == "/" {
            return Err(SessionError::config("routes.login_path cannot be the site root"));
        }
        if is_under(&self.login_path, &self.admin_root)
            || is_under(&self.admin_root, &self.login_path)
        {
            return Err(SessionError::config(
                "routes.login_path and routes.admin_root overlap",
            ));
        }
        if is_under(&self.member_root, &self.login_path) {
            return Err(SessionError::config(
                "routes.member_root must lie outside routes.login_path",
            ));
        }
        if self.area_of(&self.member_root) == Area::Admin {
            return Err(SessionError::config(
                "routes.member_root must lie outside routes.admin_root",
            ));
        }
        Ok(())
    }

    pub fn landing(&self, role: Role) -> &str {
        match area_for(role) {
            Area::Admin => &self.admin_root,
            Area::Member => &self.member_root,
        }
    }

    /// Login URL, carrying `return_to` when it is a safe local path.
    pub fn login_redirect(&self, return_to: &str) -> String {
        let returnable = is_local_path(return_to)
            && normalize_path(return_to).is_some_and(|path| !is_under(&path, &self.login_path));
        if !returnable {
            return self.login_path.clone();
        }
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair(&self.return_param, return_to)
            .finish();
        format!("{}?{}", self.login_path, query)
    }

    /// Return path from a login page query string, if present and safe.
    pub fn return_target(&self, query: &str) -> Option<String> {
        form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
            .find(|(key, _)| key == self.return_param.as_str())
            .map(|(_, value)| value.into_owned())
            .filter(|value| is_local_path(value))
    }

    /// Where to send `role` right after login.
    pub fn post_login_destination(&self, role: Role, requested: Option<&str>) -> String {
        let allowed = requested.filter(|path| {
            is_local_path(path)
                && normalize_path(path).is_some_and(|normal| {
                    !is_under(&normal, &self.login_path) && self.area_of(&normal) == area_for(role)
                })
        });
        match allowed {
            Some(path) => path.to_string(),
            None => self.landing(role).to_string(),
        }
    }

    /// Area checks run on the normalized path. A path that cannot be
    /// normalized is never allowed.
    pub fn decide(&self, state: &AuthState, current_path: &str) -> Decision {
        let Some(path) = normalize_path(current_path) else {
            debug!("request path cannot be normalized");
            return match state.role() {
                Some(role) => Decision::RedirectTo(self.landing(role).to_string()),
                None => Decision::RedirectTo(self.login_path.clone()),
            };
        };
        let on_login = is_under(&path, &self.login_path);
        match state {
            AuthState::Unauthenticated if on_login => Decision::Allow,
            AuthState::Unauthenticated => {
                Decision::RedirectTo(self.login_redirect(current_path))
            }
            AuthState::Authenticated { role, .. } => {
                if on_login || self.area_of(&path) != area_for(*role) {
                    Decision::RedirectTo(self.landing(*role).to_string())
                } else {
                    Decision::Allow
                }
            }
        }
    }

    /// `path` must already be normalized.
    fn area_of(&self, path: &str) -> Area {
        if is_under(path, &self.admin_root) {
            Area::Admin
        } else {
            Area::Member
        }
    }
}

/// Decides, per protected page, whether to render or where to redirect.
#[derive(Clone)]
pub struct AuthGate {
    store: SessionStore,
    policy: RoutePolicy,
}

impl AuthGate {
    pub fn new(store: SessionStore, policy: RoutePolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn policy(&self) -> &RoutePolicy {
        &self.policy
    }

    pub fn state(&self) -> AuthState {
        self.state_at(Utc::now())
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> AuthState {
        AuthState::from_record(self.store.load(), now)
    }

    pub fn evaluate(&self, current_path: &str) -> Decision {
        self.evaluate_at(current_path, Utc::now())
    }

    pub fn evaluate_at(&self, current_path: &str, now: DateTime<Utc>) -> Decision {
        self.policy.decide(&self.state_at(now), current_path)
    }

    pub fn post_login_destination(&self, role: Role, requested: Option<&str>) -> String {
        self.policy.post_login_destination(role, requested)
    }
}

fn area_for(role: Role) -> Area {
    if role.is_admin() {
        Area::Admin
    } else {
        Area::Member
    }
}

fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}

/// Segment-aware prefix test: `/admin/users` is under `/admin`, `/admins` is not.
fn is_under(path: &str, root: &str) -> bool {
    let root = root.trim_end_matches('/');
    if root.is_empty() {
        return true;
    }
    match path.strip_prefix(root) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

const MAX_DECODE_PASSES: usize = 3;

/// Query dropped, percent-decoded until stable, empty and `.` segments
/// removed, `..` resolved against the root.
fn normalize_path(path: &str) -> Option<String> {
    let mut decoded = strip_query(path).to_string();
    let mut passes = 0;
    loop {
        let next = percent_decode_str(&decoded).decode_utf8().ok()?.into_owned();
        if next == decoded {
            break;
        }
        passes += 1;
        if passes > MAX_DECODE_PASSES {
            return None;
        }
        decoded = next;
    }
    if !decoded.starts_with('/')
        || decoded.contains('\\')
        || decoded.chars().any(char::is_control)
    {
        return None;
    }
    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    Some(format!("/{}", segments.join("/")))
}

fn is_local_path(path: &str) -> bool {
    path.starts_with('/')
        && !path.starts_with("//")
        && !path.contains('\\')
        && !path.chars().any(char::is_control)
}
