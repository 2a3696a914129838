//! Platform authentication helpers.
//!
//! Sessions are HS256 tokens presented either as a bearer token or through the
//! [`SESSION_COOKIE`] cookie. A session names the user, the company (tenant)
//! whose records the request may touch, and the roles granted there.

use std::{fmt, str::FromStr};

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "erp_session";

#[derive(Debug, Error)]
pub enum AuthnError {
    #[error("invalid session: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("unknown role {0}")]
    UnknownRole(String),
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub session_ttl_minutes: i64,
}

impl AuthConfig {
    pub fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_secret(self.jwt_secret.as_bytes())
    }

    pub fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_secret(self.jwt_secret.as_bytes())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    pub sub: Uuid,
    pub company_id: Uuid,
    pub roles: Vec<String>,
    pub exp: usize,
    pub iat: usize,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Role {
    Owner,
    Admin,
    Member,
    Viewer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Owner => "OWNER",
            Role::Admin => "ADMIN",
            Role::Member => "MEMBER",
            Role::Viewer => "VIEWER",
        }
    }

    pub fn level(self) -> u8 {
        match self {
            Role::Owner => 4,
            Role::Admin => 3,
            Role::Member => 2,
            Role::Viewer => 1,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthnError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "OWNER" => Ok(Role::Owner),
            "ADMIN" => Ok(Role::Admin),
            "MEMBER" => Ok(Role::Member),
            "VIEWER" => Ok(Role::Viewer),
            _ => Err(AuthnError::UnknownRole(value.to_string())),
        }
    }
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: Uuid,
    pub company_id: Uuid,
    pub roles: Vec<Role>,
}

impl Session {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.iter().any(|r| r.level() >= role.level())
    }
}

impl From<SessionClaims> for Session {
    fn from(claims: SessionClaims) -> Self {
        Self {
            user_id: claims.sub,
            company_id: claims.company_id,
            // Roles this build does not know are dropped rather than rejected.
            roles: claims
                .roles
                .iter()
                .filter_map(|raw| raw.parse().ok())
                .collect(),
        }
    }
}

pub fn issue_token(session: &Session, config: &AuthConfig) -> Result<String, AuthnError> {
    let now = Utc::now();
    let exp = now
        .checked_add_signed(Duration::minutes(config.session_ttl_minutes))
        .unwrap_or(now)
        .timestamp() as usize;
    let claims = SessionClaims {
        sub: session.user_id,
        company_id: session.company_id,
        roles: session.roles.iter().map(|r| r.as_str().to_string()).collect(),
        exp,
        iat: now.timestamp() as usize,
    };
    Ok(jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &config.encoding_key(),
    )?)
}

pub fn decode_token(token: &str, config: &AuthConfig) -> Result<Session, AuthnError> {
    let data = jsonwebtoken::decode::<SessionClaims>(
        token,
        &config.decoding_key(),
        &Validation::default(),
    )?;
    Ok(data.claims.into())
}

/// Pull the raw token out of an `Authorization` or `Cookie` header value.
pub fn extract_token(authorization: Option<&str>, cookie: Option<&str>) -> Option<String> {
    if let Some(rest) = authorization.and_then(|text| text.strip_prefix("Bearer ")) {
        let token = rest.trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }
    cookie?.split(';').find_map(|part| {
        part.trim()
            .strip_prefix(SESSION_COOKIE)
            .and_then(|rest| rest.strip_prefix('='))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(secret: &str) -> AuthConfig {
        AuthConfig {
            jwt_secret: secret.into(),
            session_ttl_minutes: 30,
        }
    }

    fn session() -> Session {
        Session {
            user_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            roles: vec![Role::Member],
        }
    }

    #[test]
    fn tokens_round_trip_claims() {
        let cfg = config("unit-secret");
        let original = session();
        let token = issue_token(&original, &cfg).unwrap();
        let decoded = decode_token(&token, &cfg).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn foreign_signatures_are_rejected() {
        let token = issue_token(&session(), &config("one")).unwrap();
        assert!(matches!(
            decode_token(&token, &config("two")),
            Err(AuthnError::InvalidToken(_))
        ));
    }

    #[test]
    fn role_hierarchy_is_respected() {
        let admin = Session {
            roles: vec![Role::Admin],
            ..session()
        };
        assert!(admin.has_role(Role::Member));
        assert!(admin.has_role(Role::Admin));
        assert!(!admin.has_role(Role::Owner));
        assert_eq!("viewer".parse::<Role>().unwrap(), Role::Viewer);
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn token_extraction_prefers_bearer_then_cookie() {
        assert_eq!(
            extract_token(Some("Bearer abc"), Some("erp_session=def")),
            Some("abc".to_string())
        );
        assert_eq!(
            extract_token(None, Some("theme=dark; erp_session=def")),
            Some("def".to_string())
        );
        assert_eq!(extract_token(Some("Basic xyz"), None), None);
        assert_eq!(extract_token(None, Some("erp_session=")), None);
    }
}
