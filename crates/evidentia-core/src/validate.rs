//! Validation primitives shared by every record.

use crate::{CoreError, CoreResult};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

static SHA256_RE: OnceLock<Regex> = OnceLock::new();

/// The 64-lowercase-hex pattern every content hash must match.
pub fn sha256_pattern() -> &'static Regex {
    SHA256_RE.get_or_init(|| Regex::new("^[0-9a-f]{64}$").expect("static pattern"))
}

/// Rounds a score to four decimal places, the precision every persisted
/// float carries.
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Lowercase hex SHA256 of a byte slice. The canonical content identity
/// for every ingested file and prompt.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Checks that a value is a well-formed SHA256 hex digest.
pub fn check_sha256(path: &str, value: &str) -> CoreResult<()> {
    if sha256_pattern().is_match(value) {
        Ok(())
    } else {
        Err(CoreError::validation(
            path,
            format!("`{value}` is not a 64-character lowercase hex SHA256"),
        ))
    }
}

/// Checks that a confidence or score lies in `[0, 1]`.
pub fn check_unit_interval(path: &str, value: f64) -> CoreResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(CoreError::validation(
            path,
            format!("{value} is outside the [0, 1] interval"),
        ))
    }
}

/// Checks that a string field is non-empty.
pub fn check_non_empty(path: &str, value: &str) -> CoreResult<()> {
    if value.is_empty() {
        Err(CoreError::validation(path, "must not be empty"))
    } else {
        Ok(())
    }
}

/// Construction-time validation implemented by every record.
///
/// Validation failure is a hard error at the module boundary; the store
/// refuses to persist or return a record that does not validate.
pub trait Validate {
    fn validate(&self) -> CoreResult<()>;
}

/// Serde serializers that apply the fixed four-decimal precision.
pub mod ser {
    use super::round4;
    use serde::Serializer;
    use serde::ser::SerializeSeq;

    pub fn f64_4dp<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(round4(*value))
    }

    pub fn opt_f64_4dp<S: Serializer>(
        value: &Option<f64>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&round4(*v)),
            None => serializer.serialize_none(),
        }
    }

    pub fn vec_f64_4dp<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for v in values {
            seq.serialize_element(&round4(*v))?;
        }
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_round4() {
        assert_eq!(round4(0.123456), 0.1235);
        assert_eq!(round4(0.9), 0.9);
        assert_eq!(round4(1.0), 1.0);
        assert_eq!(round4(0.00004), 0.0);
    }

    #[test]
    fn test_sha256_check() {
        let good = "a".repeat(64);
        assert!(check_sha256("sha256", &good).is_ok());
        assert!(check_sha256("sha256", "ABC").is_err());
        assert!(check_sha256("sha256", &"A".repeat(64)).is_err());
    }

    #[test]
    fn test_unit_interval() {
        assert!(check_unit_interval("confidence", 0.0).is_ok());
        assert!(check_unit_interval("confidence", 1.0).is_ok());
        assert!(check_unit_interval("confidence", 1.0001).is_err());
        assert!(check_unit_interval("confidence", -0.1).is_err());
    }

    proptest! {
        #[test]
        fn prop_round4_is_idempotent(v in 0.0f64..=1.0) {
            let once = round4(v);
            prop_assert_eq!(once, round4(once));
        }

        #[test]
        fn prop_round4_stays_in_unit_interval(v in 0.0f64..=1.0) {
            let r = round4(v);
            prop_assert!((0.0..=1.0).contains(&r));
        }
    }
}
