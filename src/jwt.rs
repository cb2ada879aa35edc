use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: Arc<Vec<u8>>,
    pub exp_hours: i64,
    pub refresh_exp_days: i64,
}

impl JwtConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let secret = std::env::var("JWT_SECRET").map_err(|_| AppError::configuration("JWT_SECRET not set"))?;
        let exp_hours = std::env::var("JWT_EXP_HOURS")
            .map(|val| val.parse::<i64>())
            .unwrap_or(Ok(24))
            .map_err(|_| AppError::configuration("JWT_EXP_HOURS must be a valid integer"))?;
        let refresh_exp_days = std::env::var("JWT_REFRESH_EXP_DAYS")
            .map(|val| val.parse::<i64>())
            .unwrap_or(Ok(30))
            .map_err(|_| AppError::configuration("JWT_REFRESH_EXP_DAYS must be a valid integer"))?;

        Ok(Self::new(secret, exp_hours).with_refresh_days(refresh_exp_days))
    }

    pub fn new(secret: impl Into<String>, exp_hours: i64) -> Self {
        Self {
            secret: Arc::new(secret.into().into_bytes()),
            exp_hours,
            refresh_exp_days: 30,
        }
    }

    pub fn with_refresh_days(mut self, days: i64) -> Self {
        self.refresh_exp_days = days;
        self
    }

    /// Only the subject is carried; role and active state are reloaded from
    /// the store on every request.
    pub fn encode(&self, user_id: Uuid) -> Result<String, AppError> {
        self.issue(user_id, TokenKind::Access, chrono::Duration::hours(self.exp_hours))
    }

    /// Long-lived token accepted only by the refresh endpoint.
    pub fn encode_refresh(&self, user_id: Uuid) -> Result<String, AppError> {
        self.issue(user_id, TokenKind::Refresh, chrono::Duration::days(self.refresh_exp_days))
    }

    fn issue(&self, user_id: Uuid, kind: TokenKind, lifetime: chrono::Duration) -> Result<String, AppError> {
        let now = chrono::Utc::now();
        let exp = now + lifetime;

        let claims = Claims {
            sub: user_id,
            jti: Uuid::new_v4().to_string(),
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
            kind,
        };

        jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|err| AppError::token(err.to_string()))
    }

    pub fn decode(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map(|data| data.claims)
            .map_err(|err| AppError::token(err.to_string()))
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub jti: String,
    pub exp: usize,
    pub iat: usize,
    #[serde(default)]
    pub kind: TokenKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    #[default]
    Access,
    Refresh,
}

impl Claims {
    /// Time left before the token expires on its own.
    pub fn remaining(&self) -> Duration {
        let now = chrono::Utc::now().timestamp().max(0) as usize;
        Duration::from_secs(self.exp.saturating_sub(now) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_carries_subject_and_unique_jti() {
        let config = JwtConfig::new("secret", 1);
        let user = Uuid::new_v4();

        let first = config.decode(&config.encode(user).unwrap()).unwrap();
        let second = config.decode(&config.encode(user).unwrap()).unwrap();

        assert_eq!(first.sub, user);
        assert_ne!(first.jti, second.jti);
        assert!(first.remaining() > Duration::from_secs(3000));
    }

    #[test]
    fn refresh_tokens_are_marked_and_outlive_access_tokens() {
        let config = JwtConfig::new("secret", 1).with_refresh_days(7);
        let user = Uuid::new_v4();

        let access = config.decode(&config.encode(user).unwrap()).unwrap();
        let refresh = config.decode(&config.encode_refresh(user).unwrap()).unwrap();

        assert_eq!(access.kind, TokenKind::Access);
        assert_eq!(refresh.kind, TokenKind::Refresh);
        assert!(refresh.exp > access.exp);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = JwtConfig::new("one", 1).encode(Uuid::new_v4()).unwrap();
        let err = JwtConfig::new("two", 1).decode(&token).unwrap_err();
        assert!(matches!(err, AppError::Token(_)));
    }
}
