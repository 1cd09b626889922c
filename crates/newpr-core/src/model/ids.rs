//! Validated identifier newtypes shared across the pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// GroupId
// ---------------------------------------------------------------------------

/// A validated group identifier.
///
/// Group IDs are declared by the classifier or the caller and stay stable
/// across the whole pipeline — they appear unchanged in [`Ownership`],
/// [`ConstraintEdge`](crate::model::ConstraintEdge), and the final
/// [`StackGroup`](crate::model::StackGroup). Case is preserved (`"Auth"`,
/// `"API"` are both valid) since these strings are surfaced directly to
/// reviewers; only whitespace, empty strings and path separators are
/// rejected.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupId(String);

impl GroupId {
    /// Maximum length of a group id.
    pub const MAX_LEN: usize = 128;

    /// Create a new `GroupId`, validating format.
    ///
    /// # Errors
    /// Returns an error if the id is empty, too long, contains a path
    /// separator, or contains leading/trailing whitespace.
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        Self::validate(&s)?;
        Ok(Self(s))
    }

    /// Return the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), ValidationError> {
        if s.is_empty() {
            return Err(ValidationError {
                kind: ErrorKind::GroupId,
                value: s.to_owned(),
                reason: "group id must not be empty".to_owned(),
            });
        }
        if s.len() > Self::MAX_LEN {
            return Err(ValidationError {
                kind: ErrorKind::GroupId,
                value: s.to_owned(),
                reason: format!(
                    "group id must be at most {} characters, got {}",
                    Self::MAX_LEN,
                    s.len()
                ),
            });
        }
        if s.trim() != s {
            return Err(ValidationError {
                kind: ErrorKind::GroupId,
                value: s.to_owned(),
                reason: "group id must not have leading or trailing whitespace".to_owned(),
            });
        }
        if s.contains(['/', '\n', '\r', '\t']) {
            return Err(ValidationError {
                kind: ErrorKind::GroupId,
                value: s.to_owned(),
                reason: "group id must not contain path separators or control characters"
                    .to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for GroupId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for GroupId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<GroupId> for String {
    fn from(id: GroupId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A run identifier: a random 6-character lowercase-alphanumeric suffix,
/// used to namespace scratch index directories and persisted session
/// snapshots.
///
/// Uses the same alphabet as the branch-name random suffix in
/// [`execute`](crate::execute) so a run ID reads like any other stack
/// identifier a reviewer might see.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunId(String);

/// Alphabet for random suffixes: lowercase letters and digits, no `0/1/l/o`
/// to avoid visual ambiguity in rendered branch names.
pub(crate) const SUFFIX_ALPHABET: &[u8] = b"23456789abcdefghijkmnpqrstuvwxyz";

impl RunId {
    /// Length in characters of a generated run id.
    pub const LEN: usize = 6;

    /// Generate a new random `RunId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(crate::execute::random_suffix(Self::LEN))
    }

    /// Construct a `RunId` from an existing string (e.g. read back from a
    /// persisted session), validating format.
    ///
    /// # Errors
    /// Returns an error if the string is empty or contains characters
    /// outside the run-id alphabet.
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        Self::validate(&s)?;
        Ok(Self(s))
    }

    /// Return the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), ValidationError> {
        if s.is_empty() {
            return Err(ValidationError {
                kind: ErrorKind::RunId,
                value: s.to_owned(),
                reason: "run id must not be empty".to_owned(),
            });
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        {
            return Err(ValidationError {
                kind: ErrorKind::RunId,
                value: s.to_owned(),
                reason: "run id must contain only lowercase letters and digits".to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RunId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RunId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<RunId> for String {
    fn from(id: RunId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// Which identifier kind failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A [`GroupId`].
    GroupId,
    /// A [`RunId`].
    RunId,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GroupId => write!(f, "GroupId"),
            Self::RunId => write!(f, "RunId"),
        }
    }
}

/// Error from validating one of the identifier newtypes in this module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// Which kind of identifier failed.
    pub kind: ErrorKind,
    /// The raw value that failed.
    pub value: String,
    /// Why it was rejected.
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} {:?}: {}", self.kind, self.value, self.reason)
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_id_accepts_mixed_case() {
        assert!(GroupId::new("Auth").is_ok());
        assert!(GroupId::new("API").is_ok());
    }

    #[test]
    fn group_id_rejects_empty() {
        assert!(GroupId::new("").is_err());
    }

    #[test]
    fn group_id_rejects_slash() {
        assert!(GroupId::new("auth/core").is_err());
    }

    #[test]
    fn group_id_rejects_surrounding_whitespace() {
        assert!(GroupId::new(" auth").is_err());
        assert!(GroupId::new("auth ").is_err());
    }

    #[test]
    fn run_id_generate_has_expected_length() {
        let id = RunId::generate();
        assert_eq!(id.as_str().len(), RunId::LEN);
    }

    #[test]
    fn run_id_rejects_uppercase() {
        assert!(RunId::new("ABC123").is_err());
    }

    #[test]
    fn run_id_roundtrip_json() {
        let id = RunId::new("abc123").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc123\"");
        let back: RunId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
