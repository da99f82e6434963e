//! Shared helper functions for handlers.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::auth::jwt::Claims;
use crate::error::{ApiError, ApiResult};

pub fn principal_id(claims: &Claims) -> ApiResult<Uuid> {
    Uuid::parse_str(&claims.sub)
        .map_err(|_| ApiError::unauthorized("Invalid token subject", "INVALID_TOKEN"))
}

/// Lowercase hex SHA-256, used for stored refresh/reset tokens and the
/// revocation list.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitFilter {
    Any,
    Only(String),
    /// The caller must get an empty result.
    Deny,
}

/// Which units an admin may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminScope {
    /// Head office: every unit, optionally narrowed by a filter.
    All,
    Unit(String),
    /// Admin without a unit; sees nothing unit-bound.
    Nothing,
}

impl AdminScope {
    pub fn from_claims(claims: &Claims, super_admin_unit: &str) -> Self {
        match claims.unit.as_deref() {
            Some(u) if u == super_admin_unit => AdminScope::All,
            Some(u) if !u.trim().is_empty() => AdminScope::Unit(u.to_string()),
            _ => AdminScope::Nothing,
        }
    }

    pub fn is_super_admin(&self) -> bool {
        matches!(self, AdminScope::All)
    }

    /// The unit filter to apply to a list query.
    pub fn unit_filter(&self, requested: Option<&str>) -> UnitFilter {
        match self {
            AdminScope::All => match requested.filter(|u| !u.trim().is_empty()) {
                Some(u) => UnitFilter::Only(u.to_string()),
                None => UnitFilter::Any,
            },
            AdminScope::Unit(u) => UnitFilter::Only(u.clone()),
            AdminScope::Nothing => UnitFilter::Deny,
        }
    }

    /// The single unit an admin is writing to. Head office must name one.
    pub fn target_unit(&self, requested: Option<&str>) -> ApiResult<String> {
        match self {
            AdminScope::Unit(u) => {
                if requested.is_some_and(|r| r != u) {
                    return Err(ApiError::forbidden(
                        "Você só pode gerenciar a sua própria unidade.",
                        "UNIT_FORBIDDEN",
                    ));
                }
                Ok(u.clone())
            }
            AdminScope::All => requested
                .filter(|u| !u.trim().is_empty())
                .map(str::to_string)
                .ok_or_else(|| ApiError::validation("Selecione a unidade.")),
            AdminScope::Nothing => Err(ApiError::forbidden(
                "Seu usuário não está vinculado a nenhuma unidade.",
                "NO_UNIT",
            )),
        }
    }

    /// Whether a record belonging to `unit` is visible to this admin.
    pub fn allows(&self, unit: &str) -> bool {
        match self {
            AdminScope::All => true,
            AdminScope::Unit(u) => u == unit,
            AdminScope::Nothing => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::Role;

    fn admin(unit: Option<&str>) -> Claims {
        Claims {
            sub: Uuid::new_v4().to_string(),
            identifier: "admin".to_string(),
            role: Role::Admin,
            unit: unit.map(str::to_string),
            exp: 0,
            iat: 0,
        }
    }

    #[test]
    fn test_scope_from_claims() {
        assert_eq!(
            AdminScope::from_claims(&admin(Some("Matriz")), "Matriz"),
            AdminScope::All
        );
        assert_eq!(
            AdminScope::from_claims(&admin(Some("Objetivo Guarujá")), "Matriz"),
            AdminScope::Unit("Objetivo Guarujá".to_string())
        );
        assert_eq!(
            AdminScope::from_claims(&admin(None), "Matriz"),
            AdminScope::Nothing
        );
        assert_eq!(
            AdminScope::from_claims(&admin(Some("  ")), "Matriz"),
            AdminScope::Nothing
        );
    }

    #[test]
    fn test_unit_admin_is_locked_to_own_unit() {
        let scope = AdminScope::Unit("Objetivo Embaré".to_string());
        assert_eq!(
            scope.unit_filter(Some("Objetivo Guarujá")),
            UnitFilter::Only("Objetivo Embaré".to_string())
        );
        assert!(scope.target_unit(Some("Objetivo Guarujá")).is_err());
        assert_eq!(scope.target_unit(None).unwrap(), "Objetivo Embaré");
        assert!(scope.allows("Objetivo Embaré"));
        assert!(!scope.allows("Objetivo Guarujá"));
    }

    #[test]
    fn test_head_office_may_pick_any_unit() {
        let scope = AdminScope::All;
        assert_eq!(scope.unit_filter(None), UnitFilter::Any);
        assert_eq!(scope.unit_filter(Some("")), UnitFilter::Any);
        assert_eq!(
            scope.unit_filter(Some("Objetivo Guarujá")),
            UnitFilter::Only("Objetivo Guarujá".to_string())
        );
        assert!(scope.target_unit(None).is_err());
        assert!(scope.allows("anything"));
    }

    #[test]
    fn test_admin_without_unit_sees_nothing() {
        let scope = AdminScope::Nothing;
        assert_eq!(scope.unit_filter(Some("Objetivo Embaré")), UnitFilter::Deny);
        assert!(scope.target_unit(Some("Objetivo Embaré")).is_err());
        assert!(!scope.allows("Objetivo Embaré"));
    }

    #[test]
    fn test_hash_token_is_hex_sha256() {
        let hash = hash_token("abc");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
