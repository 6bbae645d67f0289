//! Password hashing.
//!
//! Passwords are stored as the lowercase hex SHA-256 digest of the
//! plain-text password, without salt.

use sha2::{Digest as _, Sha256};

/// Hashes `password` for storage.
#[must_use]
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Whether `password` matches the stored `password_hash`.
#[must_use]
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    hash_password(password).eq_ignore_ascii_case(password_hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_to_hex_sha256() {
        assert_eq!(
            hash_password("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn verifies_matching_password() {
        let stored = hash_password("hunter2");
        assert!(verify_password("hunter2", &stored));
        assert!(verify_password("hunter2", &stored.to_uppercase()));
        assert!(!verify_password("hunter3", &stored));
    }
}
