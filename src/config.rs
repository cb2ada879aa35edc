use crate::errors::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    pub invite_expiry_days: i64,
    pub share_link_expiry_days: i64,
    /// Empty means any origin.
    pub cors_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            invite_expiry_days: 7,
            share_link_expiry_days: 7,
            cors_origins: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = Self::default();

        let port = parse_or(&lookup, "APP_PORT", defaults.port)?;
        let invite_expiry_days = parse_or(&lookup, "INVITE_EXPIRY_DAYS", defaults.invite_expiry_days)?;
        let share_link_expiry_days = parse_or(&lookup, "SHARE_LINK_EXPIRY_DAYS", defaults.share_link_expiry_days)?;

        let cors_origins = lookup("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty() && *origin != "*")
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            port,
            invite_expiry_days,
            share_link_expiry_days,
            cors_origins,
        })
    }
}

fn parse_or<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, AppError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::configuration(format!("{key} must be a valid number"))),
        None => Ok(default),
    }
}
