//! Agent identifiers and name/label validation

use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

use crate::error::{Result, SwarmError};

/// Label keys starting with this prefix are reserved for internal use.
pub const RESERVED_LABEL_PREFIX: &str = "swarm.";

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,62}$").expect("valid name regex"));

static LABEL_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]([a-z0-9._/-]{0,61}[a-z0-9])?$").expect("valid key regex"));

static LABEL_VALUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._ /=-]{0,255}$").expect("valid value regex"));

/// Generate a short opaque agent id: 8 lowercase hex characters.
pub fn generate_id() -> String {
    let mut rng = rand::rng();
    let n: u32 = rng.random();
    format!("{:08x}", n)
}

/// Validate a user-supplied agent name.
///
/// Names are optional; an empty string always passes.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(SwarmError::InvalidName(format!(
            "'{}' (must start alphanumeric, then [A-Za-z0-9._-], max 63 chars)",
            name
        )))
    }
}

/// Validate a single label pair against the key/value whitelist.
pub fn validate_label(key: &str, value: &str) -> Result<()> {
    if key.starts_with(RESERVED_LABEL_PREFIX) {
        return Err(SwarmError::InvalidLabel(format!(
            "key '{}' uses the reserved prefix '{}'",
            key, RESERVED_LABEL_PREFIX
        )));
    }
    if !LABEL_KEY_RE.is_match(key) {
        return Err(SwarmError::InvalidLabel(format!("invalid key '{}'", key)));
    }
    if !LABEL_VALUE_RE.is_match(value) {
        return Err(SwarmError::InvalidLabel(format!(
            "invalid value '{}' for key '{}'",
            value, key
        )));
    }
    Ok(())
}

/// Parse a `KEY=VALUE` label argument, validating both halves.
pub fn parse_label(arg: &str) -> Result<(String, String)> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| SwarmError::InvalidLabel(format!("'{}' is not KEY=VALUE", arg)))?;
    validate_label(key, value)?;
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_short_hex() {
        let id = generate_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn names_validate() {
        assert!(validate_name("").is_ok());
        assert!(validate_name("worker-1").is_ok());
        assert!(validate_name("Fix.bug_2").is_ok());
        assert!(validate_name("-leading-dash").is_err());
        assert!(validate_name("has space").is_err());
        assert!(validate_name(&"x".repeat(64)).is_err());
    }

    #[test]
    fn reserved_prefix_rejected() {
        assert!(validate_label("swarm.internal", "x").is_err());
        assert!(validate_label("swarmy", "x").is_ok());
    }

    #[test]
    fn label_charset_enforced() {
        assert!(validate_label("team", "backend").is_ok());
        assert!(validate_label("team/sub", "a b").is_ok());
        assert!(validate_label("UPPER", "x").is_err());
        assert!(validate_label("key", "semi;colon").is_err());
    }

    #[test]
    fn parse_label_splits_on_first_equals() {
        let (k, v) = parse_label("env=a=b").unwrap();
        assert_eq!(k, "env");
        assert_eq!(v, "a=b");
        assert!(parse_label("noequals").is_err());
    }
}
