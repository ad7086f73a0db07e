use crate::errors::ServiceError;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

/// Header carrying the authenticated user id, set by the platform gateway.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying a comma-separated role list, set by the platform gateway.
pub const USER_ROLES_HEADER: &str = "x-user-roles";

const ADMIN_ROLE: &str = "admin";

/// Identity of the authenticated caller.
///
/// Authentication itself happens upstream (the gateway validates the session
/// and injects these headers); this service only consumes the result.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: Uuid,
    pub roles: Vec<String>,
}

impl Caller {
    pub fn new(user_id: Uuid, roles: Vec<String>) -> Self {
        Self { user_id, roles }
    }

    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(ADMIN_ROLE))
    }

    /// Fails unless the caller owns the resource or holds the admin role.
    pub fn require_owner_or_admin(&self, owner_id: Uuid) -> Result<(), ServiceError> {
        if self.user_id == owner_id || self.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "caller does not own this resource".to_string(),
            ))
        }
    }

    /// Fails unless the caller holds the admin role.
    pub fn require_admin(&self) -> Result<(), ServiceError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "administrator role required".to_string(),
            ))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::Unauthorized("missing user identity".to_string()))?;

        let user_id = Uuid::parse_str(user_id.trim())
            .map_err(|_| ServiceError::Unauthorized("malformed user identity".to_string()))?;

        let roles = parts
            .headers
            .get(USER_ROLES_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|raw| {
                raw.split(',')
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Caller { user_id, roles })
    }
}
