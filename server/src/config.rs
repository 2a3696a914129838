use anyhow::{Context, Result};
use platform_authn::AuthConfig;
use tracing::warn;
use uuid::Uuid;

const DEV_SECRET: &str = "dev-secret";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub auth: AuthConfig,
    pub cors_allowed_origins: Vec<String>,
    pub seed_demo_data: bool,
    pub demo_company_id: Uuid,
}

impl AppConfig {
    /// Read settings from the environment. Call `dotenvy::dotenv()` first to
    /// pick up a local `.env`.
    pub fn load() -> Result<Self> {
        let jwt_secret = std::env::var("AUTH_SECRET").unwrap_or_else(|_| DEV_SECRET.into());
        if jwt_secret == DEV_SECRET {
            warn!("AUTH_SECRET not set; using the development secret");
        }

        let session_ttl_minutes = match std::env::var("SESSION_TTL_MINUTES") {
            Ok(raw) => raw
                .trim()
                .parse::<i64>()
                .with_context(|| format!("invalid SESSION_TTL_MINUTES {raw:?}"))?,
            Err(_) => 480,
        };

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".into())
            .split(',')
            .filter_map(|s| {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
            .collect::<Vec<_>>();

        let seed_demo_data = std::env::var("SEED_DEMO_DATA")
            .ok()
            .map(|val| matches!(val.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let demo_company_id = match std::env::var("DEMO_COMPANY_ID") {
            Ok(raw) => Uuid::parse_str(raw.trim())
                .with_context(|| format!("invalid DEMO_COMPANY_ID {raw:?}"))?,
            Err(_) => default_demo_company(),
        };

        Ok(Self {
            auth: AuthConfig {
                jwt_secret,
                session_ttl_minutes,
            },
            cors_allowed_origins,
            seed_demo_data,
            demo_company_id,
        })
    }
}

pub fn default_demo_company() -> Uuid {
    Uuid::from_u128(1)
}
