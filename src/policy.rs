use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Access level carried in the bearer token and checked per route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    User,
}

impl std::str::FromStr for Role {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Role::Admin),
            "USER" => Ok(Role::User),
            other => Err(ApiError::bad_request(format!("Invalid role: {other}"))),
        }
    }
}

// Role sets per route are fixed configuration, not runtime data.
pub const BLOG_READ: &[Role] = &[Role::Admin, Role::User];
pub const BLOG_CREATE: &[Role] = &[Role::Admin];
pub const BLOG_MUTATE: &[Role] = &[Role::Admin];
pub const TAG_MANAGE: &[Role] = &[Role::Admin];
// Any authenticated user may act on their own profile.
pub const PROFILE: &[Role] = &[Role::Admin, Role::User];

pub fn authorize(required: &[Role], caller: Role) -> Result<(), ApiError> {
    if required.contains(&caller) {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Access Denied".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn admin_and_user_may_read_blogs() {
        assert!(authorize(BLOG_READ, Role::Admin).is_ok());
        assert!(authorize(BLOG_READ, Role::User).is_ok());
    }

    #[test]
    fn only_admin_may_write_blogs_and_tags() {
        assert!(authorize(BLOG_CREATE, Role::Admin).is_ok());
        assert!(authorize(BLOG_CREATE, Role::User).is_err());
        assert!(authorize(TAG_MANAGE, Role::User).is_err());
    }

    #[test]
    fn denied_caller_gets_403() {
        let err = authorize(BLOG_MUTATE, Role::User).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);
        assert_eq!(err.to_string(), "Access Denied");
    }

    #[test]
    fn role_parses_strictly() {
        assert_eq!(Role::from_str("ADMIN").unwrap(), Role::Admin);
        assert_eq!(Role::from_str("USER").unwrap(), Role::User);
        assert!(Role::from_str("admin").is_err());
        assert!(Role::from_str("ROOT").is_err());
    }

    #[test]
    fn role_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"ADMIN\"");
        let role: Role = serde_json::from_str("\"USER\"").unwrap();
        assert_eq!(role, Role::User);
        assert!(serde_json::from_str::<Role>("\"guest\"").is_err());
    }
}
