use async_trait::async_trait;
use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use crate::{auth::Identity, config::AppConfig, repository::RepositoryState};

/// The only role value that grants admin access. Compared exactly, case-sensitively.
pub const ADMIN_ROLE: &str = "admin";

/// Role
///
/// A resolved role name. The set of values is open ("admin", "user", and whatever
/// else an operator assigns); only `ADMIN_ROLE` carries privilege here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role(String);

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Role(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_admin(&self) -> bool {
        self.0 == ADMIN_ROLE
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// RoleSourceKind
///
/// Which relation backs role resolution. Exactly one is active per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleSourceKind {
    /// The dedicated `user_roles` table (default).
    UserRoles,
    /// The `app_metadata.role` claim embedded in the access token.
    AppMetadata,
}

impl FromStr for RoleSourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user_roles" => Ok(RoleSourceKind::UserRoles),
            "app_metadata" => Ok(RoleSourceKind::AppMetadata),
            other => Err(format!(
                "ROLE_SOURCE must be 'user_roles' or 'app_metadata', got '{}'",
                other
            )),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RoleLookupError {
    #[error("role backend read failed: {0}")]
    Backend(String),
}

/// RoleSource
///
/// A single backing store for role assignments. Implementations perform at most one
/// read and never retry.
#[async_trait]
pub trait RoleSource: Send + Sync {
    async fn lookup(&self, identity: &Identity) -> Result<Option<String>, RoleLookupError>;
}

/// UserRolesTable
///
/// Reads `user_roles.role` by exact match on `user_id`.
pub struct UserRolesTable {
    repo: RepositoryState,
}

impl UserRolesTable {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl RoleSource for UserRolesTable {
    async fn lookup(&self, identity: &Identity) -> Result<Option<String>, RoleLookupError> {
        self.repo
            .get_user_role(identity.subject_id)
            .await
            .map_err(|e| RoleLookupError::Backend(e.to_string()))
    }
}

/// AppMetadataRole
///
/// Trusts the role embedded in the verified token. No I/O.
pub struct AppMetadataRole;

#[async_trait]
impl RoleSource for AppMetadataRole {
    async fn lookup(&self, identity: &Identity) -> Result<Option<String>, RoleLookupError> {
        Ok(identity.embedded_role.clone())
    }
}

/// RoleResolution
///
/// Outcome of one resolution. `Failed` is kept apart from `Missing` only so the two
/// can be logged differently; callers treat both as "no role".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleResolution {
    Resolved(Role),
    Missing,
    Failed,
}

/// RoleResolver
///
/// Built once at startup around the configured `RoleSource`. Holds no cache: every
/// call reaches the source, so a revoked role takes effect on the next request.
pub struct RoleResolver {
    source: Arc<dyn RoleSource>,
    timeout: Duration,
}

impl RoleResolver {
    pub fn new(source: Arc<dyn RoleSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    /// Builds the resolver selected by `config.role_source`.
    pub fn from_config(config: &AppConfig, repo: RepositoryState) -> Self {
        let source: Arc<dyn RoleSource> = match config.role_source {
            RoleSourceKind::UserRoles => Arc::new(UserRolesTable::new(repo)),
            RoleSourceKind::AppMetadata => Arc::new(AppMetadataRole),
        };
        Self::new(source, config.role_lookup_timeout)
    }

    /// resolve
    ///
    /// Anonymous callers short-circuit to `Missing` without touching the source.
    /// Backend errors and timeouts become `Failed`; an empty role string counts as
    /// `Missing`.
    pub async fn resolve(&self, identity: Option<&Identity>) -> RoleResolution {
        let Some(identity) = identity else {
            return RoleResolution::Missing;
        };

        match tokio::time::timeout(self.timeout, self.source.lookup(identity)).await {
            Ok(Ok(Some(role))) if !role.is_empty() => RoleResolution::Resolved(Role::new(role)),
            Ok(Ok(_)) => RoleResolution::Missing,
            Ok(Err(e)) => {
                tracing::warn!(subject = %identity.subject_id, error = %e, "role lookup failed");
                RoleResolution::Failed
            }
            Err(_) => {
                tracing::warn!(
                    subject = %identity.subject_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "role lookup timed out"
                );
                RoleResolution::Failed
            }
        }
    }

    /// resolve_role
    ///
    /// The role of `identity`, or `None` when it has none or it could not be read.
    pub async fn resolve_role(&self, identity: Option<&Identity>) -> Option<Role> {
        match self.resolve(identity).await {
            RoleResolution::Resolved(role) => Some(role),
            RoleResolution::Missing | RoleResolution::Failed => None,
        }
    }
}

/// RoleResolverState
///
/// Shared handle placed in `AppState`.
pub type RoleResolverState = Arc<RoleResolver>;
