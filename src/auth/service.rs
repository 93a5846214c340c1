use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::db::UserId;
use crate::error::AuthError;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Chat-platform user id
    pub exp: i64,    // Expiration time
    pub iat: i64,    // Issued at
}

/// Signs and checks the bearer tokens the chat front end presents.
pub struct TokenService {
    jwt_secret: String,
    token_expiry_hours: i64,
}

impl TokenService {
    pub fn new(jwt_secret: String, token_expiry_hours: i64) -> Self {
        Self {
            jwt_secret,
            token_expiry_hours,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.jwt_secret.clone(), config.token_expiry_hours)
    }

    pub fn issue_token(&self, user_id: UserId) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (now + Duration::hours(self.token_expiry_hours)).timestamp(),
            iat: now.timestamp(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;

        Ok(token)
    }

    /// Returns the user id carried in `token`.
    pub fn validate(&self, token: &str) -> Result<UserId, AuthError> {
        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )?
        .claims;

        claims.sub.parse::<UserId>().map_err(|_| AuthError::InvalidToken)
    }
}
