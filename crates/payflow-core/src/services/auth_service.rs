//! Inter-service authentication
//!
//! The subscription service's payment-initiation worker calls the payment
//! service's internal endpoint with a short-lived HS256 bearer token.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceClaims {
    /// Calling service name
    pub sub: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct AuthService {
    secret: String,
    expire_minutes: i64,
}

impl AuthService {
    pub fn new(secret: impl Into<String>, expire_minutes: i64) -> Self {
        Self {
            secret: secret.into(),
            expire_minutes,
        }
    }

    pub fn create_service_token(&self, service_name: &str) -> crate::Result<String> {
        let now = Utc::now();
        let claims = ServiceClaims {
            sub: service_name.to_string(),
            iss: "payflow".to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(self.expire_minutes)).timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| crate::Error::Unauthorized(format!("token creation failed: {}", e)))
    }

    pub fn verify_service_token(&self, token: &str) -> crate::Result<ServiceClaims> {
        let mut validation = Validation::default();
        validation.leeway = 0;

        decode::<ServiceClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|_| crate::Error::Unauthorized("invalid service token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_roundtrip() {
        let auth = AuthService::new("test-secret", 30);
        let token = auth.create_service_token("subscription-service").unwrap();

        let claims = auth.verify_service_token(&token).unwrap();
        assert_eq!(claims.sub, "subscription-service");
        assert_eq!(claims.iss, "payflow");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let auth = AuthService::new("test-secret", 30);
        let token = auth.create_service_token("subscription-service").unwrap();

        let other = AuthService::new("other-secret", 30);
        let err = other.verify_service_token(&token).unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        let auth = AuthService::new("test-secret", 30);
        assert!(auth.verify_service_token("not-a-token").is_err());
    }
}
