//! # Restriction Engine
//!
//! Resolves the version-scoped restrictions of a keyval into the set that is
//! active at one version, and evaluates values against it.
//!
//! Two rule kinds exist:
//! - VALUE: one allowed constant. All active VALUE rules form an allow-set.
//! - RANGE: an inclusive `[min, max]` interval. Numbers are measured as
//!   themselves, strings and enums by their length. Active ranges intersect.
//!
//! Ambiguity is an error, never a guess: the same constant allowed twice at
//! one version, or active ranges with an empty intersection, fail with
//! `ConflictingSemver`.

use crate::types::{MoldError, Value, Version, VersionWindow};
use serde::{Deserialize, Serialize};

// =============================================================================
// RULES
// =============================================================================

/// A single restriction rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestrictionRule {
    Value(Value),
    Range { min: f64, max: f64 },
}

impl RestrictionRule {
    /// A RANGE rule is well formed when its bounds are ordered and finite.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        match self {
            RestrictionRule::Value(_) => true,
            RestrictionRule::Range { min, max } => min.is_finite() && max.is_finite() && min <= max,
        }
    }
}

impl std::fmt::Display for RestrictionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestrictionRule::Value(v) => write!(f, "VALUE {}", v),
            RestrictionRule::Range { min, max } => write!(f, "RANGE [{}, {}]", min, max),
        }
    }
}

/// A rule together with the window it is active in.
#[derive(Debug, Clone, PartialEq)]
pub struct RestrictionEntry {
    pub window: VersionWindow,
    pub rule: RestrictionRule,
}

// =============================================================================
// RESOLUTION
// =============================================================================

/// The restrictions active at one version.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActiveRestrictions {
    /// Allowed constants. Empty means any value is allowed.
    pub allowed: Vec<Value>,
    /// Intersection of all active ranges.
    pub range: Option<(f64, f64)>,
}

impl ActiveRestrictions {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty() && self.range.is_none()
    }
}

/// Outcome of evaluating a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Satisfied,
    /// An allow-set is active and the value is not in it.
    NotAllowed,
    /// A range is active and the value's magnitude lies outside it.
    OutOfRange,
}

impl Verdict {
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Verdict::Satisfied)
    }
}

/// Stateless resolver for restriction sets.
pub struct RestrictionEngine;

impl RestrictionEngine {
    /// Resolve the restrictions of `entries` active at `version`.
    pub fn resolve(
        entries: &[RestrictionEntry],
        version: Version,
    ) -> Result<ActiveRestrictions, MoldError> {
        let mut active = ActiveRestrictions::default();

        for entry in entries.iter().filter(|e| e.window.contains(version)) {
            match &entry.rule {
                RestrictionRule::Value(value) => {
                    if active.allowed.contains(value) {
                        return Err(MoldError::ConflictingSemver(format!(
                            "value '{}' is allowed more than once at {}",
                            value, version
                        )));
                    }
                    active
                        .allowed
                        .try_reserve(1)
                        .map_err(|e| MoldError::NoMemory(e.to_string()))?;
                    active.allowed.push(value.clone());
                }
                RestrictionRule::Range { min, max } => {
                    let (lo, hi) = match active.range {
                        Some((lo, hi)) => (lo.max(*min), hi.min(*max)),
                        None => (*min, *max),
                    };
                    if lo > hi {
                        return Err(MoldError::ConflictingSemver(format!(
                            "active ranges at {} have no common value",
                            version
                        )));
                    }
                    active.range = Some((lo, hi));
                }
            }
        }

        Ok(active)
    }

    /// Evaluate `value` against the restrictions active at `version`.
    pub fn evaluate(
        entries: &[RestrictionEntry],
        value: &Value,
        version: Version,
    ) -> Result<Verdict, MoldError> {
        let active = Self::resolve(entries, version)?;

        if !active.allowed.is_empty() && !active.allowed.contains(value) {
            return Ok(Verdict::NotAllowed);
        }
        if let (Some((lo, hi)), Some(magnitude)) = (active.range, value.magnitude())
            && (magnitude < lo || magnitude > hi)
        {
            return Ok(Verdict::OutOfRange);
        }
        Ok(Verdict::Satisfied)
    }
}
