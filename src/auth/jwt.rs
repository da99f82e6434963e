//! JWT token generation and verification.

use jwt_simple::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Who a token was issued to. Teachers and admins live in separate tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "teacher" => Some(Role::Teacher),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Email for teachers, username for admins.
    pub identifier: String,
    pub role: Role,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshCustomClaims {
    pub token_id: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct Claims {
    pub sub: String,
    pub identifier: String,
    pub role: Role,
    pub unit: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Clone)]
pub struct RefreshClaims {
    pub sub: String,
    pub token_id: String,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Clone)]
pub struct JwtConfig {
    key_pair: Arc<Ed25519KeyPair>,
    public_key: Arc<Ed25519PublicKey>,
    pub access_token_expiry: i64,
    pub refresh_token_expiry: i64,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

impl JwtConfig {
    /// Expects JWT_PRIVATE_KEY env var (base64-encoded Ed25519 key).
    pub fn from_env() -> Self {
        Self::from_env_with_expiry(3600, 604800, None, None)
    }

    pub fn from_env_with_expiry(
        access_token_expiry: i64,
        refresh_token_expiry: i64,
        issuer: Option<String>,
        audience: Option<String>,
    ) -> Self {
        use base64::Engine;

        let private_key_b64 =
            std::env::var("JWT_PRIVATE_KEY").expect("JWT_PRIVATE_KEY must be set");

        let key_bytes = base64::engine::general_purpose::STANDARD
            .decode(&private_key_b64)
            .expect("JWT_PRIVATE_KEY must be valid base64");

        let key_pair = Ed25519KeyPair::from_bytes(&key_bytes)
            .expect("JWT_PRIVATE_KEY must be a valid Ed25519 key");

        Self {
            access_token_expiry,
            refresh_token_expiry,
            issuer,
            audience,
            ..Self::from_key_pair(key_pair)
        }
    }

    pub fn from_key_pair(key_pair: Ed25519KeyPair) -> Self {
        let public_key = key_pair.public_key();
        Self {
            key_pair: Arc::new(key_pair),
            public_key: Arc::new(public_key),
            access_token_expiry: 3600,
            refresh_token_expiry: 604800,
            issuer: None,
            audience: None,
        }
    }

    /// Returns `(private, public)` base64 strings for provisioning.
    pub fn generate_key_pair() -> (String, String) {
        use base64::Engine;

        let key_pair = Ed25519KeyPair::generate();
        let engine = base64::engine::general_purpose::STANDARD;
        (
            engine.encode(key_pair.to_bytes()),
            engine.encode(key_pair.public_key().to_bytes()),
        )
    }

    fn scoped<T>(&self, claims: JWTClaims<T>) -> JWTClaims<T> {
        let mut claims = claims;
        if let Some(issuer) = &self.issuer {
            claims = claims.with_issuer(issuer);
        }
        if let Some(audience) = &self.audience {
            claims = claims.with_audience(audience);
        }
        claims
    }

    fn verification_options(&self) -> VerificationOptions {
        let mut options = VerificationOptions::default();
        if let Some(issuer) = &self.issuer {
            options.allowed_issuers = Some(std::collections::HashSet::from([issuer.clone()]));
        }
        if let Some(audience) = &self.audience {
            options.allowed_audiences = Some(std::collections::HashSet::from([audience.clone()]));
        }
        options
    }

    pub fn generate_access_token(
        &self,
        principal_id: Uuid,
        identifier: &str,
        role: Role,
        unit: Option<String>,
    ) -> Result<String, jwt_simple::Error> {
        let custom_claims = AccessClaims {
            identifier: identifier.to_string(),
            role,
            unit,
        };

        let claims = jwt_simple::claims::Claims::with_custom_claims(
            custom_claims,
            Duration::from_secs(self.access_token_expiry as u64),
        )
        .with_subject(principal_id.to_string());

        self.key_pair.sign(self.scoped(claims))
    }

    pub fn generate_refresh_token(
        &self,
        principal_id: Uuid,
        role: Role,
    ) -> Result<String, jwt_simple::Error> {
        let custom_claims = RefreshCustomClaims {
            token_id: Uuid::new_v4().to_string(),
            role,
        };

        let claims = jwt_simple::claims::Claims::with_custom_claims(
            custom_claims,
            Duration::from_secs(self.refresh_token_expiry as u64),
        )
        .with_subject(principal_id.to_string());

        self.key_pair.sign(self.scoped(claims))
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Claims, jwt_simple::Error> {
        let token_data = self
            .public_key
            .verify_token::<AccessClaims>(token, Some(self.verification_options()))?;

        Ok(Claims {
            sub: token_data.subject.unwrap_or_default(),
            identifier: token_data.custom.identifier,
            role: token_data.custom.role,
            unit: token_data.custom.unit,
            exp: token_data
                .expires_at
                .map(|t| t.as_secs() as i64)
                .unwrap_or(0),
            iat: token_data
                .issued_at
                .map(|t| t.as_secs() as i64)
                .unwrap_or(0),
        })
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, jwt_simple::Error> {
        let token_data = self
            .public_key
            .verify_token::<RefreshCustomClaims>(token, Some(self.verification_options()))?;

        Ok(RefreshClaims {
            sub: token_data.subject.unwrap_or_default(),
            token_id: token_data.custom.token_id,
            role: token_data.custom.role,
            exp: token_data
                .expires_at
                .map(|t| t.as_secs() as i64)
                .unwrap_or(0),
            iat: token_data
                .issued_at
                .map(|t| t.as_secs() as i64)
                .unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> JwtConfig {
        JwtConfig::from_key_pair(Ed25519KeyPair::generate())
    }

    #[test]
    fn test_teacher_access_token_round_trip() {
        let config = test_config();
        let user_id = Uuid::new_v4();

        let token = config
            .generate_access_token(user_id, "prof@objetivoportal.com.br", Role::Teacher, None)
            .expect("Token generation should succeed");

        let claims = config
            .verify_access_token(&token)
            .expect("Token verification should succeed");

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.identifier, "prof@objetivoportal.com.br");
        assert_eq!(claims.role, Role::Teacher);
        assert!(claims.unit.is_none());
    }

    #[test]
    fn test_admin_token_carries_unit() {
        let config = test_config();

        let token = config
            .generate_access_token(
                Uuid::new_v4(),
                "admin.embare",
                Role::Admin,
                Some("Objetivo Embaré".to_string()),
            )
            .expect("Token generation should succeed");

        let claims = config.verify_access_token(&token).unwrap();
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.unit.as_deref(), Some("Objetivo Embaré"));
    }

    #[test]
    fn test_refresh_token_keeps_role() {
        let config = test_config();
        let admin_id = Uuid::new_v4();

        let token = config.generate_refresh_token(admin_id, Role::Admin).unwrap();
        let claims = config.verify_refresh_token(&token).unwrap();

        assert_eq!(claims.sub, admin_id.to_string());
        assert_eq!(claims.role, Role::Admin);
    }

    #[test]
    fn test_refresh_token_is_not_an_access_token() {
        let config = test_config();
        let token = config
            .generate_refresh_token(Uuid::new_v4(), Role::Teacher)
            .unwrap();
        assert!(config.verify_access_token(&token).is_err());
    }

    #[test]
    fn test_wrong_key_fails_verification() {
        let config1 = test_config();
        let config2 = test_config();

        let token = config1
            .generate_access_token(Uuid::new_v4(), "x@objetivoportal.com.br", Role::Teacher, None)
            .unwrap();

        assert!(config2.verify_access_token(&token).is_err());
        assert!(config2.verify_access_token("invalid.token.here").is_err());
    }

    #[test]
    fn test_issuer_mismatch_rejected() {
        let mut issuing = test_config();
        issuing.issuer = Some("agendamento".to_string());
        let mut verifying = issuing.clone();
        verifying.issuer = Some("someone-else".to_string());

        let token = issuing
            .generate_access_token(Uuid::new_v4(), "admin", Role::Admin, None)
            .unwrap();

        assert!(issuing.verify_access_token(&token).is_ok());
        assert!(verifying.verify_access_token(&token).is_err());
    }

    #[test]
    fn test_generated_key_pair_is_usable() {
        use base64::Engine;

        let (private_b64, public_b64) = JwtConfig::generate_key_pair();
        assert!(!public_b64.is_empty());

        let key_bytes = base64::engine::general_purpose::STANDARD
            .decode(&private_b64)
            .unwrap();
        let config = JwtConfig::from_key_pair(Ed25519KeyPair::from_bytes(&key_bytes).unwrap());

        let token = config
            .generate_access_token(Uuid::new_v4(), "admin", Role::Admin, None)
            .unwrap();
        assert!(config.verify_access_token(&token).is_ok());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("teacher"), Some(Role::Teacher));
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse("root"), None);
        assert_eq!(Role::Admin.as_str(), "admin");
    }
}
