//! # Config Verification and Generation
//!
//! Verification is a pure predicate plus a diagnostic list: it never
//! touches the graph. A config is valid at its version when
//! - every keyval and section it holds is declared and active in the mold,
//! - every keyval active in the mold is present, and every active section
//!   has at least one instance,
//! - every value has the declared type and satisfies the active restrictions,
//! - its version does not exceed the mold's.

use crate::canonical::{self, CanonicalConfig, CanonicalKeyval, CanonicalMold, ConfigElement, MoldElement};
use crate::primitives::MAX_NESTING_DEPTH;
use crate::restriction::{RestrictionEngine, Verdict};
use crate::types::{MoldError, MoldResult, Value, Version};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// REPORTS
// =============================================================================

/// One finding of a verification pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Dotted path of the offending element. Empty for the root.
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Result of verifying a mold or config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub diagnostics: Vec<Diagnostic>,
}

impl VerifyReport {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub(crate) fn push(&mut self, path: &str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            path: path.to_string(),
            message: message.into(),
        });
    }
}

/// Join a dotted path.
pub(crate) fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

// =============================================================================
// VERIFY
// =============================================================================

/// Verify `config` against `mold` at the config's version.
#[must_use]
pub fn verify_config(mold: &CanonicalMold, config: &CanonicalConfig) -> VerifyReport {
    let mut report = VerifyReport::default();
    if config.version > mold.version {
        report.push(
            "",
            format!(
                "config version {} exceeds mold version {}",
                config.version, mold.version
            ),
        );
    }
    verify_container(&mold.elements, &config.elements, config.version, "", 0, &mut report);
    report
}

fn verify_container(
    declared: &[MoldElement],
    present: &[ConfigElement],
    version: Version,
    path: &str,
    depth: usize,
    report: &mut VerifyReport,
) {
    if depth > MAX_NESTING_DEPTH {
        report.push(path, "sections nest too deep");
        return;
    }
    let index = canonical::index(declared);
    let mut keyvals_seen = BTreeSet::new();

    for element in present {
        let name = element.name();
        let here = join(path, name);
        let Some(&mold_element) = index.find_at(name, version) else {
            if index.find_all(name).next().is_some() {
                report.push(&here, format!("is not part of the mold at version {}", version));
            } else {
                report.push(&here, "is not declared in the mold");
            }
            continue;
        };

        match (element, mold_element) {
            (ConfigElement::Keyval { value, .. }, MoldElement::Keyval(keyval)) => {
                if !keyvals_seen.insert(name) {
                    report.push(&here, "appears more than once");
                }
                verify_value(keyval, value.as_ref(), version, &here, report);
            }
            (ConfigElement::Section { elements, .. }, MoldElement::Section(section)) => {
                verify_container(&section.elements, elements, version, &here, depth + 1, report);
            }
            (_, mold_element) => {
                report.push(&here, format!("must be a {}", mold_element.kind()));
            }
        }
    }

    for name in index.names() {
        let Some(&mold_element) = index.find_at(name, version) else {
            continue;
        };
        let found = present.iter().any(|e| {
            e.name() == name
                && matches!(
                    (e, mold_element),
                    (ConfigElement::Keyval { .. }, MoldElement::Keyval(_))
                        | (ConfigElement::Section { .. }, MoldElement::Section(_))
                )
        });
        if !found {
            let message = match mold_element {
                MoldElement::Keyval(_) => "required keyval is missing",
                MoldElement::Section(_) => "required section is missing",
            };
            report.push(&join(path, name), message);
        }
    }
}

fn verify_value(
    keyval: &CanonicalKeyval,
    value: Option<&Value>,
    version: Version,
    path: &str,
    report: &mut VerifyReport,
) {
    let Some(value) = value else {
        report.push(path, "has no value");
        return;
    };
    if let Some(expected) = keyval.value_type
        && value.value_type() != expected
    {
        report.push(
            path,
            format!("expected a {} value, found {}", expected, value.value_type()),
        );
        return;
    }
    match RestrictionEngine::evaluate(&keyval.restriction_entries(), value, version) {
        Ok(Verdict::Satisfied) => {}
        Ok(Verdict::NotAllowed) => {
            report.push(path, format!("value '{}' is not allowed at {}", value, version));
        }
        Ok(Verdict::OutOfRange) => {
            report.push(path, format!("value '{}' is out of range at {}", value, version));
        }
        Err(e) => report.push(path, e.to_string()),
    }
}

// =============================================================================
// GENERATE
// =============================================================================

/// Build a config holding the mold's defaults at `version` (the mold's own version when `None`).
pub fn generate_config(mold: &CanonicalMold, version: Option<Version>) -> MoldResult<CanonicalConfig> {
    let version = version.unwrap_or(mold.version);
    if version > mold.version {
        return Err(MoldError::ConflictingSemver(format!(
            "cannot generate {} from a mold at {}",
            version, mold.version
        )));
    }
    Ok(CanonicalConfig {
        version,
        elements: generate_elements(&mold.elements, version)?,
    })
}

/// Default-filled config elements for the mold elements active at `version`.
pub(crate) fn generate_elements(
    elements: &[MoldElement],
    version: Version,
) -> MoldResult<Vec<ConfigElement>> {
    elements
        .iter()
        .filter(|e| e.window().contains(version))
        .map(|e| -> MoldResult<ConfigElement> {
            match e {
                MoldElement::Keyval(k) => {
                    let value = k.default_at(version).cloned().ok_or_else(|| {
                        MoldError::InvalidContext(format!(
                            "keyval '{}' has no default at {}",
                            k.name, version
                        ))
                    })?;
                    Ok(ConfigElement::Keyval {
                        name: k.name.clone(),
                        value: Some(value),
                    })
                }
                MoldElement::Section(s) => Ok(ConfigElement::Section {
                    name: s.name.clone(),
                    elements: generate_elements(&s.elements, version)?,
                }),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::{CanonicalDefault, CanonicalRestriction, CanonicalSection};
    use crate::restriction::RestrictionRule;
    use crate::types::{ValueType, VersionWindow};

    fn keyval(name: &str, default: Value, window: VersionWindow) -> MoldElement {
        MoldElement::Keyval(CanonicalKeyval {
            name: name.to_string(),
            window,
            value_type: Some(default.value_type()),
            defaults: vec![CanonicalDefault {
                introduced: window.introduced,
                value: default,
            }],
            restrictions: Vec::new(),
            documentation: Vec::new(),
            renamed_from: None,
        })
    }

    fn mold() -> CanonicalMold {
        let mut port = match keyval("port", Value::Integer(8080), VersionWindow::default()) {
            MoldElement::Keyval(k) => k,
            MoldElement::Section(_) => unreachable!(),
        };
        port.restrictions.push(CanonicalRestriction {
            window: VersionWindow::default(),
            rule: RestrictionRule::Range {
                min: 1.0,
                max: 65535.0,
            },
            documentation: Vec::new(),
        });
        CanonicalMold {
            version: Version::new(2, 0, 0),
            documentation: Vec::new(),
            elements: vec![
                keyval("name", Value::String("srv".to_string()), VersionWindow::default()),
                keyval(
                    "tls",
                    Value::Boolean(false),
                    VersionWindow::since(Version::new(2, 0, 0)),
                ),
                MoldElement::Section(CanonicalSection {
                    name: "server".to_string(),
                    window: VersionWindow::default(),
                    documentation: Vec::new(),
                    elements: vec![MoldElement::Keyval(port)],
                }),
            ],
        }
    }

    #[test]
    fn generated_config_verifies_clean() {
        let mold = mold();
        for version in [Version::INITIAL, Version::new(2, 0, 0)] {
            let config = generate_config(&mold, Some(version)).expect("generate");
            let report = verify_config(&mold, &config);
            assert!(report.is_valid(), "{:?}", report);
        }
    }

    #[test]
    fn generation_respects_version() {
        let mold = mold();
        let config = generate_config(&mold, Some(Version::INITIAL)).expect("generate");
        assert!(config.value("tls").is_none());
        let config = generate_config(&mold, None).expect("generate");
        assert_eq!(config.version, Version::new(2, 0, 0));
        assert_eq!(config.value("tls"), Some(&Value::Boolean(false)));

        let err = generate_config(&mold, Some(Version::new(3, 0, 0))).expect_err("too new");
        assert!(matches!(err, MoldError::ConflictingSemver(_)));
    }

    #[test]
    fn element_from_the_future_is_reported() {
        let mold = mold();
        let mut config = generate_config(&mold, Some(Version::INITIAL)).expect("generate");
        config.elements.push(ConfigElement::Keyval {
            name: "tls".to_string(),
            value: Some(Value::Boolean(true)),
        });
        let report = verify_config(&mold, &config);
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].path, "tls");
    }

    #[test]
    fn missing_and_mistyped_values_are_reported() {
        let mold = mold();
        let config = CanonicalConfig {
            version: Version::INITIAL,
            elements: vec![
                ConfigElement::Keyval {
                    name: "name".to_string(),
                    value: Some(Value::Integer(7)),
                },
                ConfigElement::Keyval {
                    name: "ghost".to_string(),
                    value: None,
                },
            ],
        };
        let report = verify_config(&mold, &config);
        let paths: Vec<&str> = report.diagnostics.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["name", "ghost", "server"]);
    }

    #[test]
    fn restriction_violation_is_reported() {
        let mold = mold();
        let mut config = generate_config(&mold, Some(Version::INITIAL)).expect("generate");
        if let Some(ConfigElement::Section { elements, .. }) = config.elements.last_mut() {
            elements[0] = ConfigElement::Keyval {
                name: "port".to_string(),
                value: Some(Value::Integer(70000)),
            };
        }
        let report = verify_config(&mold, &config);
        assert!(!report.is_valid());
        assert_eq!(report.diagnostics[0].path, "server.port");
        assert!(report.diagnostics[0].message.contains("out of range"));
    }

    #[test]
    fn config_newer_than_mold_is_reported() {
        let mold = mold();
        let mut config = generate_config(&mold, None).expect("generate");
        config.version = Version::new(2, 1, 0);
        let report = verify_config(&mold, &config);
        assert_eq!(report.diagnostics[0].path, "");
        assert!(report.diagnostics[0].to_string().contains("exceeds"));
    }

    #[test]
    fn missing_default_fails_generation() {
        let mut mold = mold();
        if let MoldElement::Keyval(k) = &mut mold.elements[0] {
            k.defaults.clear();
            k.value_type = Some(ValueType::String);
        }
        let err = generate_config(&mold, None).expect_err("no default");
        assert!(matches!(err, MoldError::InvalidContext(_)));
    }
}
