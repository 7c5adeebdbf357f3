//! Version constraint grammar used by [`crate::metadata::Requirement`] and
//! the [`crate::resolver`].
//!
//! Grammar: a comma-separated list of predicates, each an operator
//! (`>=`, `<=`, `>`, `<`, `=`, `~>`) followed by a version. A bare version
//! with no operator is treated as `=`. Versions may omit trailing
//! components (`"2"`, `"2.1"`); missing components are padded with zero.

use std::fmt;

use semver::Version;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("empty version constraint")]
    Empty,
    #[error("malformed version constraint predicate: {0:?}")]
    MalformedPredicate(String),
    #[error("malformed version {0:?}: {1}")]
    MalformedVersion(String, semver::Error),
}

/// Parses a (possibly truncated) dotted version string into a full
/// [`semver::Version`], padding missing minor/patch components with zero.
pub fn parse_version_lenient(raw: &str) -> Result<Version, VersionError> {
    let raw = raw.trim();
    let segments: Vec<&str> = raw.splitn(3, '.').collect();
    let padded = match segments.len() {
        1 => format!("{}.0.0", segments[0]),
        2 => format!("{}.{}.0", segments[0], segments[1]),
        _ => raw.to_string(),
    };
    Version::parse(&padded).map_err(|e| VersionError::MalformedVersion(raw.to_string(), e))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Ge,
    Le,
    Gt,
    Lt,
    Eq,
    Pessimistic,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Predicate {
    pub op: Op,
    pub version: Version,
    /// Number of dotted segments the author wrote explicitly; only
    /// meaningful for [`Op::Pessimistic`].
    pub explicit_segments: usize,
}

impl Predicate {
    fn satisfied_by(&self, v: &Version) -> bool {
        match self.op {
            Op::Ge => v >= &self.version,
            Op::Le => v <= &self.version,
            Op::Gt => v > &self.version,
            Op::Lt => v < &self.version,
            Op::Eq => v == &self.version,
            Op::Pessimistic => {
                if self.explicit_segments <= 1 {
                    return v >= &self.version;
                }
                let upper = pessimistic_upper_bound(&self.version, self.explicit_segments);
                v >= &self.version && v < &upper
            }
        }
    }
}

/// `~> 2.2.3` locks the major.minor and allows patch increases: upper bound
/// is `2.3.0`. `~> 2.2` locks only the major: upper bound is `3.0.0`.
fn pessimistic_upper_bound(base: &Version, explicit_segments: usize) -> Version {
    if explicit_segments >= 3 {
        Version::new(base.major, base.minor + 1, 0)
    } else {
        Version::new(base.major + 1, 0, 0)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            Op::Ge => ">=",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Lt => "<",
            Op::Eq => "=",
            Op::Pessimistic => "~>",
        };
        write!(f, "{op} {}", self.version)
    }
}

/// A parsed, immutable version constraint: the conjunction of its predicates.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Constraint {
    predicates: Vec<Predicate>,
}

impl Constraint {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::any());
        }
        let mut predicates = Vec::new();
        for part in raw.split(',') {
            predicates.push(parse_predicate(part.trim())?);
        }
        Ok(Self { predicates })
    }

    pub fn satisfied_by(&self, v: &Version) -> bool {
        self.predicates.iter().all(|p| p.satisfied_by(v))
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.predicates.is_empty() {
            return write!(f, "*");
        }
        let parts: Vec<String> = self.predicates.iter().map(|p| p.to_string()).collect();
        write!(f, "{}", parts.join(", "))
    }
}

fn parse_predicate(part: &str) -> Result<Predicate, VersionError> {
    if part.is_empty() {
        return Err(VersionError::MalformedPredicate(part.to_string()));
    }
    let (op, rest) = if let Some(r) = part.strip_prefix(">=") {
        (Op::Ge, r)
    } else if let Some(r) = part.strip_prefix("<=") {
        (Op::Le, r)
    } else if let Some(r) = part.strip_prefix("~>") {
        (Op::Pessimistic, r)
    } else if let Some(r) = part.strip_prefix('>') {
        (Op::Gt, r)
    } else if let Some(r) = part.strip_prefix('<') {
        (Op::Lt, r)
    } else if let Some(r) = part.strip_prefix('=') {
        (Op::Eq, r)
    } else {
        (Op::Eq, part)
    };
    let rest = rest.trim();
    if rest.is_empty() {
        return Err(VersionError::MalformedPredicate(part.to_string()));
    }
    let explicit_segments = rest.split('.').count();
    let version = parse_version_lenient(rest)?;
    Ok(Predicate {
        op,
        version,
        explicit_segments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_version_is_exact() {
        let c = Constraint::parse("1.2.3").unwrap();
        assert!(c.satisfied_by(&Version::new(1, 2, 3)));
        assert!(!c.satisfied_by(&Version::new(1, 2, 4)));
    }

    #[test]
    fn range_predicates_combine() {
        let c = Constraint::parse(">= 1.0.0, < 2.0.0").unwrap();
        assert!(c.satisfied_by(&Version::new(1, 5, 0)));
        assert!(!c.satisfied_by(&Version::new(2, 0, 0)));
    }

    #[test]
    fn pessimistic_locks_minor() {
        let c = Constraint::parse("~> 2.2.3").unwrap();
        assert!(c.satisfied_by(&Version::new(2, 2, 9)));
        assert!(!c.satisfied_by(&Version::new(2, 3, 0)));
        assert!(!c.satisfied_by(&Version::new(2, 2, 2)));
    }

    #[test]
    fn pessimistic_locks_major_when_minor_omitted() {
        let c = Constraint::parse("~> 2.2").unwrap();
        assert!(c.satisfied_by(&Version::new(2, 9, 0)));
        assert!(!c.satisfied_by(&Version::new(3, 0, 0)));
    }

    #[test]
    fn truncated_versions_are_padded() {
        assert_eq!(parse_version_lenient("2").unwrap(), Version::new(2, 0, 0));
        assert_eq!(parse_version_lenient("2.1").unwrap(), Version::new(2, 1, 0));
    }

    #[test]
    fn empty_constraint_matches_anything() {
        let c = Constraint::any();
        assert!(c.satisfied_by(&Version::new(0, 0, 1)));
    }
}
