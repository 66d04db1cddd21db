//! Stream initiation session ids.

use crate::connection::{RandomSource, RandomnessFailure};
use std::fmt;

const SID_PREFIX: &str = "sid";
const SID_RANDOM_BYTES: usize = 8;

/// Session id shared by both ends of one transfer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Draw a fresh id from `rand`.
    ///
    /// Eight bytes are read and rendered as `sid` followed by their
    /// little-endian `u64` value in decimal. A failing source never yields an
    /// id.
    pub fn generate(rand: &dyn RandomSource) -> Result<Self, RandomnessFailure> {
        let mut buf = [0u8; SID_RANDOM_BYTES];
        rand.fill(&mut buf)?;
        Ok(Self(format!("{}{}", SID_PREFIX, u64::from_le_bytes(buf))))
    }

    /// Whether `s` has the shape produced by [`SessionId::generate`]
    pub fn is_well_formed(s: &str) -> bool {
        match s.strip_prefix(SID_PREFIX) {
            Some(digits) => {
                !digits.is_empty()
                    && digits.bytes().all(|b| b.is_ascii_digit())
                    && (digits == "0" || !digits.starts_with('0'))
                    && digits.parse::<u64>().is_ok()
            }
            None => false,
        }
    }

    /// The id as sent on the wire
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::OsRandom;
    use crate::loopback::{FailingRandom, FixedRandom};
    use std::collections::HashSet;

    #[test]
    fn test_encoding_is_little_endian_decimal() {
        let rand = FixedRandom::new(vec![1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(SessionId::generate(&rand).unwrap().as_str(), "sid1");

        let rand = FixedRandom::new(vec![0xff; 8]);
        assert_eq!(
            SessionId::generate(&rand).unwrap().as_str(),
            "sid18446744073709551615"
        );
    }

    #[test]
    fn test_ids_are_unique_and_well_formed() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let sid = SessionId::generate(&OsRandom).unwrap();
            assert!(SessionId::is_well_formed(sid.as_str()), "bad sid {}", sid);
            assert!(seen.insert(sid), "duplicate sid");
        }
    }

    #[test]
    fn test_failing_source_yields_no_id() {
        let err = SessionId::generate(&FailingRandom).unwrap_err();
        assert!(err.to_string().contains("random"));
    }

    #[test]
    fn test_well_formed_check() {
        assert!(SessionId::is_well_formed("sid0"));
        assert!(SessionId::is_well_formed("sid123"));
        assert!(!SessionId::is_well_formed("sid"));
        assert!(!SessionId::is_well_formed("sid012"));
        assert!(!SessionId::is_well_formed("sidx1"));
        assert!(!SessionId::is_well_formed("id123"));
        assert!(!SessionId::is_well_formed("sid18446744073709551616"));
    }
}
