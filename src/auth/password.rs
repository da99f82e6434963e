//! Password hashing with Argon2id and the sign-up password policy.

use argon2::{
    password_hash::{
        PasswordHash, PasswordHasher as Argon2PasswordHasher, PasswordVerifier, SaltString,
    },
    Argon2, Params,
};
use rand::rngs::OsRng;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_letter_and_digit: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_letter_and_digit: false,
        }
    }
}

impl PasswordPolicy {
    pub fn strict(min_length: usize) -> Self {
        Self {
            min_length,
            require_letter_and_digit: true,
        }
    }

    pub fn validate(&self, password: &str) -> Result<(), PasswordPolicyError> {
        if password.chars().count() < self.min_length {
            return Err(PasswordPolicyError::TooShort {
                min_length: self.min_length,
            });
        }

        if self.require_letter_and_digit
            && !(password.chars().any(|c| c.is_alphabetic())
                && password.chars().any(|c| c.is_ascii_digit()))
        {
            return Err(PasswordPolicyError::MissingLetterOrDigit);
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PasswordPolicyError {
    #[error("A senha deve ter no mínimo {min_length} caracteres.")]
    TooShort { min_length: usize },
    #[error("A senha deve conter letras e números.")]
    MissingLetterOrDigit,
}

pub struct PasswordService;

impl PasswordService {
    pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
        Self::hash_password_with_cost(password, 12)
    }

    /// Memory cost is `2^memory_cost_log2` KiB, capped at 2^22.
    pub fn hash_password_with_cost(
        password: &str,
        memory_cost_log2: u32,
    ) -> Result<String, argon2::password_hash::Error> {
        let salt = SaltString::generate(&mut OsRng);
        let m_cost = 1u32 << memory_cost_log2.min(22);

        let params =
            Params::new(m_cost, 3, 1, None).map_err(|_| argon2::password_hash::Error::Algorithm)?;

        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);
        Ok(argon2.hash_password(password.as_bytes(), &salt)?.to_string())
    }

    pub fn verify_password(
        password: &str,
        password_hash: &str,
    ) -> Result<bool, argon2::password_hash::Error> {
        let parsed_hash = PasswordHash::new(password_hash)?;
        match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
            Ok(_) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
