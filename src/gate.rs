use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use crate::{
    auth::{Identity, Session},
    error::AppError,
    roles::{Role, RoleResolution, RoleResolverState},
};

/// DenyReason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// No authenticated session.
    Unauthenticated,
    /// A session whose role is missing, unreadable, or anything but "admin".
    InsufficientRole,
}

/// AdminContext
///
/// Attached to request extensions by the route guard on ADMIT, and returned by
/// `require_admin`. `is_admin` is only ever set by the gate.
#[derive(Debug, Clone)]
pub struct AdminContext {
    pub identity: Identity,
    pub role: Role,
    pub is_admin: bool,
}

/// AdminDecision
///
/// Per-request verdict. Never stored.
#[derive(Debug, Clone)]
pub enum AdminDecision {
    Admit(AdminContext),
    Deny(DenyReason),
}

impl AdminDecision {
    pub fn is_admit(&self) -> bool {
        matches!(self, AdminDecision::Admit(_))
    }
}

/// check_admin
///
/// Decides ADMIT / DENY for an admin-scoped operation. Never fails: backend
/// trouble during role resolution is a DENY.
pub async fn check_admin(roles: &RoleResolverState, identity: Option<Identity>) -> AdminDecision {
    let Some(identity) = identity else {
        return AdminDecision::Deny(DenyReason::Unauthenticated);
    };

    match roles.resolve(Some(&identity)).await {
        RoleResolution::Resolved(role) if role.is_admin() => {
            tracing::debug!(subject = %identity.subject_id, "admin access granted");
            AdminDecision::Admit(AdminContext {
                identity,
                role,
                is_admin: true,
            })
        }
        RoleResolution::Resolved(role) => {
            tracing::info!(subject = %identity.subject_id, role = %role, "admin access denied");
            AdminDecision::Deny(DenyReason::InsufficientRole)
        }
        RoleResolution::Missing => {
            tracing::info!(subject = %identity.subject_id, "admin access denied: no role");
            AdminDecision::Deny(DenyReason::InsufficientRole)
        }
        RoleResolution::Failed => {
            tracing::info!(
                subject = %identity.subject_id,
                "admin access denied: role unresolved"
            );
            AdminDecision::Deny(DenyReason::InsufficientRole)
        }
    }
}

/// require_admin
///
/// Strict form of `check_admin` for the top of privileged handlers. DENY becomes
/// `AppError::Unauthorized` (401) or `AppError::Forbidden` (403).
pub async fn require_admin(
    roles: &RoleResolverState,
    identity: Option<Identity>,
) -> Result<AdminContext, AppError> {
    match check_admin(roles, identity).await {
        AdminDecision::Admit(ctx) => Ok(ctx),
        AdminDecision::Deny(DenyReason::Unauthenticated) => Err(AppError::Unauthorized),
        AdminDecision::Deny(DenyReason::InsufficientRole) => Err(AppError::Forbidden),
    }
}

/// AdminUser
///
/// Extractor running `require_admin` before a handler body. Placed first in a
/// handler's arguments so a rejected caller never reaches body parsing.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AdminContext);

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    RoleResolverState: FromRef<S>,
    crate::config::AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Ok(Session(identity)) = Session::from_request_parts(parts, state).await;
        let roles = RoleResolverState::from_ref(state);
        require_admin(&roles, identity).await.map(AdminUser)
    }
}
