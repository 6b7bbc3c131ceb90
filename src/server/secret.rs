//! URL path secret
//!
//! The secret is the only access control: a request must use it as its exact
//! path. It is restricted to `[A-Za-z0-9,._-]` so it never needs escaping.

use ring::rand::{SecureRandom, SystemRandom};

use crate::error::ConfigError;

/// Length of generated secrets
pub const SECRET_LEN: usize = 12;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Remove every character outside `[A-Za-z0-9,._-]`
pub fn sanitize(secret: &str) -> String {
    secret.chars().filter(|c| is_allowed(*c)).collect()
}

/// Whether `c` may appear in a secret
pub fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, ',' | '.' | '_' | '-')
}

/// Generate a random alphanumeric secret of `len` characters
pub fn generate(len: usize) -> Result<String, ConfigError> {
    let rng = SystemRandom::new();
    // Largest multiple of the alphabet size that fits in a byte, to avoid bias
    let limit = (256 / ALPHABET.len() * ALPHABET.len()) as u8;

    let mut out = String::with_capacity(len);
    let mut buf = [0u8; 32];
    while out.len() < len {
        rng.fill(&mut buf).map_err(|_| ConfigError::SecretGeneration)?;
        for b in buf.iter().filter(|b| **b < limit) {
            if out.len() == len {
                break;
            }
            out.push(ALPHABET[*b as usize % ALPHABET.len()] as char);
        }
    }
    Ok(out)
}

/// Sanitize a supplied secret or generate a new one
pub fn resolve(secret: Option<&str>) -> Result<String, ConfigError> {
    match secret {
        Some(secret) => {
            let clean = sanitize(secret);
            if clean.is_empty() {
                return Err(ConfigError::EmptySecret);
            }
            if clean.len() != secret.len() {
                tracing::warn!(secret = %clean, "Removed disallowed characters from secret");
            }
            Ok(clean)
        }
        None => generate(SECRET_LEN),
    }
}
