//! Semantic versions and the closed-open windows built from them.

use super::MoldError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A semantic version, ordered lexicographically by (major, minor, patch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    /// The version every mold and config starts at.
    pub const INITIAL: Version = Version::new(1, 0, 0);

    /// The lowest representable version.
    pub const ZERO: Version = Version::new(0, 0, 0);

    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Raise this version to `candidate` if `candidate` is strictly greater.
    ///
    /// Returns `true` when the version changed. Never decreases.
    pub fn raise_to(&mut self, candidate: Version) -> bool {
        if candidate > *self {
            *self = candidate;
            true
        } else {
            false
        }
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = MoldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MoldError::InvalidArgument(format!("malformed version '{}'", s));

        let mut parts = s.trim().split('.');
        let mut next = || -> Result<u32, MoldError> {
            parts
                .next()
                .filter(|p| !p.is_empty())
                .and_then(|p| p.parse::<u32>().ok())
                .ok_or_else(invalid)
        };
        let version = Version::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(version)
    }
}

/// A closed-open validity window `[introduced, deprecated)`.
///
/// A window without a deprecation version is open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionWindow {
    pub introduced: Version,
    pub deprecated: Option<Version>,
}

impl VersionWindow {
    /// The window covering every version.
    pub const ALWAYS: VersionWindow = VersionWindow {
        introduced: Version::ZERO,
        deprecated: None,
    };

    #[must_use]
    pub const fn new(introduced: Version, deprecated: Option<Version>) -> Self {
        Self {
            introduced,
            deprecated,
        }
    }

    /// Open-ended window starting at `introduced`.
    #[must_use]
    pub const fn since(introduced: Version) -> Self {
        Self::new(introduced, None)
    }

    #[must_use]
    pub fn contains(&self, version: Version) -> bool {
        self.introduced <= version && self.deprecated.is_none_or(|d| version < d)
    }

    /// Whether some version lies in both windows.
    #[must_use]
    pub fn overlaps(&self, other: &VersionWindow) -> bool {
        let starts_before_other_ends = other.deprecated.is_none_or(|d| self.introduced < d);
        let other_starts_before_end = self.deprecated.is_none_or(|d| other.introduced < d);
        starts_before_other_ends && other_starts_before_end
    }

    /// A window is well formed when it is non-empty.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.deprecated.is_none_or(|d| d > self.introduced)
    }

    /// Whether `version` is one of the window's boundaries.
    #[must_use]
    pub fn has_boundary_at(&self, version: Version) -> bool {
        self.introduced == version || self.deprecated == Some(version)
    }
}

impl Default for VersionWindow {
    fn default() -> Self {
        Self::since(Version::INITIAL)
    }
}

impl std::fmt::Display for VersionWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.deprecated {
            Some(d) => write!(f, "[{}, {})", self.introduced, d),
            None => write!(f, "[{}, )", self.introduced),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_lexicographic() {
        assert!(Version::new(1, 9, 9) < Version::new(2, 0, 0));
        assert!(Version::new(2, 0, 1) > Version::new(2, 0, 0));
        assert!(Version::new(1, 10, 0) > Version::new(1, 9, 12));
    }

    #[test]
    fn raise_to_is_monotone() {
        let mut v = Version::new(1, 2, 0);
        assert!(v.raise_to(Version::new(1, 3, 0)));
        assert!(!v.raise_to(Version::new(1, 2, 9)));
        // Lower major with higher minor must not win.
        assert!(!v.raise_to(Version::new(0, 9, 0)));
        assert_eq!(v, Version::new(1, 3, 0));
    }

    #[test]
    fn parse_and_display() {
        let v: Version = "2.10.3".parse().expect("parse");
        assert_eq!(v, Version::new(2, 10, 3));
        assert_eq!(v.to_string(), "2.10.3");
    }

    #[test]
    fn parse_rejects_malformed() {
        for text in ["", "1", "1.2", "1.2.3.4", "a.b.c", "1..2", "-1.0.0"] {
            assert!(text.parse::<Version>().is_err(), "accepted '{}'", text);
        }
    }

    #[test]
    fn window_is_closed_open() {
        let window = VersionWindow::new(Version::new(1, 0, 0), Some(Version::new(2, 0, 0)));
        assert!(window.contains(Version::new(1, 0, 0)));
        assert!(window.contains(Version::new(1, 99, 0)));
        assert!(!window.contains(Version::new(2, 0, 0)));
        assert!(!window.contains(Version::new(0, 9, 0)));
    }

    #[test]
    fn window_overlap() {
        let a = VersionWindow::new(Version::new(1, 0, 0), Some(Version::new(2, 0, 0)));
        let b = VersionWindow::since(Version::new(2, 0, 0));
        let c = VersionWindow::since(Version::new(1, 5, 0));
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(b.overlaps(&c));
    }

    #[test]
    fn malformed_window() {
        let empty = VersionWindow::new(Version::new(2, 0, 0), Some(Version::new(2, 0, 0)));
        assert!(!empty.is_well_formed());
        assert!(VersionWindow::ALWAYS.is_well_formed());
    }
}
