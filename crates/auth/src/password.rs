//! Credentials
//!
//! Argon2id hashing, the account password policy, and temporary passwords
//! for operator-created accounts.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use std::sync::LazyLock;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::{AuthError, Result};

/// Minimum password length
pub const MIN_PASSWORD_LEN: usize = 8;

const TEMP_PASSWORD_LEN: usize = 12;
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!@#$%^&*";

/// Hash a password using Argon2id
///
/// Returns the hash in PHC format.
///
/// ```
/// use follix_auth::password::{hash_password, verify_password};
///
/// let hash = hash_password("Sup3rSecret").unwrap();
/// assert!(hash.starts_with("$argon2id$"));
/// assert!(verify_password("Sup3rSecret", &hash).unwrap());
/// ```
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::password(format!("hash failed: {}", e)))
}

/// Verify a password against a stored hash
///
/// A wrong password is `Ok(false)`; a corrupt hash is an error.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AuthError::password(format!("invalid stored hash: {}", e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::password(format!("verification failed: {}", e))),
    }
}

/// Hash checked when the account does not exist
static DECOY_HASH: LazyLock<Option<String>> = LazyLock::new(|| hash_password("follix-decoy-password").ok());

/// Spend the same verification work as [`verify_password`] without an account
///
/// Login calls this for unknown emails so both failures cost one Argon2
/// verification. Always false.
pub fn verify_decoy(password: &str) -> bool {
    if let Some(hash) = DECOY_HASH.as_deref() {
        let _ = verify_password(password, hash);
    }
    false
}

/// Check a password against the account policy
///
/// At least eight characters with an uppercase letter, a lowercase letter
/// and a digit. Returns every violated rule.
pub fn check_policy(password: &str) -> std::result::Result<(), Vec<String>> {
    let mut problems = Vec::new();

    if password.chars().count() < MIN_PASSWORD_LEN {
        problems.push(format!(
            "Password must be at least {} characters long.",
            MIN_PASSWORD_LEN
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        problems.push("Password must contain at least one digit.".to_string());
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        problems.push("Password must contain at least one lowercase letter.".to_string());
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        problems.push("Password must contain at least one uppercase letter.".to_string());
    }

    if problems.is_empty() { Ok(()) } else { Err(problems) }
}

/// Generate a random temporary password that satisfies [`check_policy`]
pub fn generate_temporary_password() -> String {
    let mut rng = rand::rng();
    let all: Vec<u8> = [UPPER, LOWER, DIGITS, SYMBOLS].concat();

    let mut chars: Vec<u8> = vec![
        UPPER[rng.random_range(0..UPPER.len())],
        LOWER[rng.random_range(0..LOWER.len())],
        DIGITS[rng.random_range(0..DIGITS.len())],
    ];
    while chars.len() < TEMP_PASSWORD_LEN {
        chars.push(all[rng.random_range(0..all.len())]);
    }
    chars.shuffle(&mut rng);

    chars.into_iter().map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoy_never_matches() {
        assert!(DECOY_HASH.as_deref().is_some_and(|h| h.starts_with("$argon2id$")));
        assert!(!verify_decoy("follix-decoy-password"));
        assert!(!verify_decoy("Sup3rSecret"));
    }

    #[test]
    fn test_hash_is_salted() {
        let a = hash_password("Passw0rdX").unwrap();
        let b = hash_password("Passw0rdX").unwrap();
        assert!(a.starts_with("$argon2id$"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify() {
        let hash = hash_password("Correct1horse").unwrap();
        assert!(verify_password("Correct1horse", &hash).unwrap());
        assert!(!verify_password("correct1horse", &hash).unwrap());
    }

    #[test]
    fn test_verify_corrupt_hash() {
        assert!(verify_password("whatever", "plaintext").is_err());
    }

    #[test]
    fn test_policy() {
        assert!(check_policy("Abcdefg1").is_ok());

        let problems = check_policy("abc").unwrap_err();
        assert_eq!(problems.len(), 3); // length, digit, uppercase

        let problems = check_policy("ABCDEFGH1").unwrap_err();
        assert_eq!(problems, vec!["Password must contain at least one lowercase letter.".to_string()]);
    }

    #[test]
    fn test_temporary_password_meets_policy() {
        for _ in 0..50 {
            let pw = generate_temporary_password();
            assert_eq!(pw.len(), TEMP_PASSWORD_LEN);
            assert!(check_policy(&pw).is_ok(), "{}", pw);
        }
    }
}
