//! # Mold Verification
//!
//! Structural checks on a mold in canonical form. A mold is valid when
//! every keyval has a type and a default at its introduction, every default
//! has the declared type and satisfies the restrictions active while it is
//! in effect, every window is non-empty, enum keyvals enumerate their values
//! through VALUE restrictions, and every declared rename points at a keyval
//! retired no later than the renaming keyval is introduced.

use crate::canonical::{CanonicalKeyval, CanonicalMold, MoldElement};
use crate::config::{VerifyReport, join};
use crate::primitives::MAX_NESTING_DEPTH;
use crate::restriction::{RestrictionEngine, RestrictionRule, Verdict};
use crate::types::{ValueType, Version};
use std::collections::BTreeSet;

/// Verify the structure of `mold`.
#[must_use]
pub fn verify_mold(mold: &CanonicalMold) -> VerifyReport {
    let mut report = VerifyReport::default();
    verify_elements(&mold.elements, mold.version, "", 0, &mut report);
    report
}

fn verify_elements(
    elements: &[MoldElement],
    mold_version: Version,
    path: &str,
    depth: usize,
    report: &mut VerifyReport,
) {
    if depth > MAX_NESTING_DEPTH {
        report.push(path, "sections nest too deep");
        return;
    }
    for element in elements {
        let here = join(path, element.name());
        let window = element.window();
        if !window.is_well_formed() {
            report.push(&here, format!("window {} is empty", window));
        }
        if window.introduced > mold_version {
            report.push(
                &here,
                format!(
                    "introduced at {} after the mold version {}",
                    window.introduced, mold_version
                ),
            );
        }
        match element {
            MoldElement::Section(section) => {
                verify_elements(&section.elements, mold_version, &here, depth + 1, report);
            }
            MoldElement::Keyval(keyval) => verify_keyval(keyval, elements, &here, report),
        }
    }
}

fn verify_keyval(
    keyval: &CanonicalKeyval,
    siblings: &[MoldElement],
    path: &str,
    report: &mut VerifyReport,
) {
    let Some(value_type) = keyval.value_type else {
        report.push(path, "has no value type");
        return;
    };

    if keyval.default_at(keyval.window.introduced).is_none() {
        report.push(
            path,
            format!("has no default at its introduction {}", keyval.window.introduced),
        );
    }

    for restriction in &keyval.restrictions {
        if !restriction.window.is_well_formed() {
            report.push(
                path,
                format!("restriction window {} is empty", restriction.window),
            );
        }
        match &restriction.rule {
            RestrictionRule::Value(value) if value.value_type() != value_type => report.push(
                path,
                format!(
                    "VALUE restriction '{}' is a {}, expected {}",
                    value,
                    value.value_type(),
                    value_type
                ),
            ),
            RestrictionRule::Range { .. } if value_type == ValueType::Boolean => {
                report.push(path, "RANGE restriction on a boolean keyval");
            }
            rule if !rule.is_well_formed() => {
                report.push(path, format!("{} is malformed", rule));
            }
            _ => {}
        }
    }

    if value_type == ValueType::Enum
        && !keyval
            .restrictions
            .iter()
            .any(|r| matches!(r.rule, RestrictionRule::Value(_)))
    {
        report.push(path, "enum keyval has no VALUE restrictions");
    }

    let mut typed_defaults = true;
    for default in &keyval.defaults {
        if default.value.value_type() != value_type {
            typed_defaults = false;
            report.push(
                path,
                format!(
                    "default introduced at {} is a {}, expected {}",
                    default.introduced,
                    default.value.value_type(),
                    value_type
                ),
            );
        }
    }
    if typed_defaults {
        verify_defaults_satisfy_restrictions(keyval, path, report);
    }

    if let Some(from) = &keyval.renamed_from {
        let retired_in_time = siblings.iter().any(|e| match e {
            MoldElement::Keyval(old) => {
                old.name == *from
                    && old
                        .window
                        .deprecated
                        .is_some_and(|d| d <= keyval.window.introduced)
            }
            MoldElement::Section(_) => false,
        });
        if *from == keyval.name || !retired_in_time {
            report.push(
                path,
                format!(
                    "renamed_from '{}' does not name a keyval retired by {}",
                    from, keyval.window.introduced
                ),
            );
        }
    }
}

/// Check the default in effect at every boundary inside the keyval's window.
fn verify_defaults_satisfy_restrictions(
    keyval: &CanonicalKeyval,
    path: &str,
    report: &mut VerifyReport,
) {
    let mut boundaries = BTreeSet::new();
    boundaries.insert(keyval.window.introduced);
    boundaries.extend(keyval.defaults.iter().map(|d| d.introduced));
    for r in &keyval.restrictions {
        boundaries.insert(r.window.introduced);
        boundaries.extend(r.window.deprecated);
    }

    let entries = keyval.restriction_entries();
    for version in boundaries
        .into_iter()
        .filter(|v| keyval.window.contains(*v))
    {
        let Some(default) = keyval.default_at(version) else {
            continue;
        };
        match RestrictionEngine::evaluate(&entries, default, version) {
            Ok(Verdict::Satisfied) => {}
            Ok(_) => report.push(
                path,
                format!(
                    "default '{}' violates the restrictions active at {}",
                    default, version
                ),
            ),
            Err(e) => report.push(path, e.to_string()),
        }
    }
}
