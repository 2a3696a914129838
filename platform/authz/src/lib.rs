//! Authorization primitives for the suite modules.

use platform_authn::{Role, Session};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthzError {
    #[error("{access:?} on {resource} requires {required}")]
    Denied {
        access: Access,
        resource: String,
        required: Role,
    },
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Access {
    Read,
    Write,
    Delete,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyContext<'a> {
    pub session: &'a Session,
    pub access: Access,
    pub resource: &'a str,
}

#[derive(Default, Debug)]
pub struct PolicyEngine;

impl PolicyEngine {
    pub fn required_role(access: Access) -> Role {
        match access {
            Access::Read => Role::Viewer,
            Access::Write => Role::Member,
            Access::Delete => Role::Admin,
        }
    }

    pub fn check(&self, ctx: &PolicyContext<'_>) -> Result<(), AuthzError> {
        let required = Self::required_role(ctx.access);
        if ctx.session.has_role(required) {
            Ok(())
        } else {
            Err(AuthzError::Denied {
                access: ctx.access,
                resource: ctx.resource.to_string(),
                required,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn session(roles: Vec<Role>) -> Session {
        Session {
            user_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            roles,
        }
    }

    fn check(roles: Vec<Role>, access: Access) -> Result<(), AuthzError> {
        let session = session(roles);
        PolicyEngine.check(&PolicyContext {
            session: &session,
            access,
            resource: "hr",
        })
    }

    #[test]
    fn viewers_only_read() {
        assert!(check(vec![Role::Viewer], Access::Read).is_ok());
        assert!(check(vec![Role::Viewer], Access::Write).is_err());
    }

    #[test]
    fn members_write_but_do_not_delete() {
        assert!(check(vec![Role::Member], Access::Write).is_ok());
        assert_eq!(
            check(vec![Role::Member], Access::Delete),
            Err(AuthzError::Denied {
                access: Access::Delete,
                resource: "hr".into(),
                required: Role::Admin,
            })
        );
    }

    #[test]
    fn sessions_without_roles_are_denied() {
        assert!(check(vec![], Access::Read).is_err());
        assert!(check(vec![Role::Owner], Access::Delete).is_ok());
    }
}
