//! Static capability table.
//!
//! Every operation on a context is checked against the table before any
//! mutation happens: first whether the kind supports the capability at all,
//! then whether the context lives under the root kind the capability needs.

use crate::types::{ContextKind, MoldError};

/// Operations a context may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    AddSection,
    AddKeyval,
    AddDocumentation,
    AddRestriction,
    SetName,
    SetValueType,
    SetValue,
    SetRange,
    AddDefault,
    SetIntroduced,
    SetDeprecated,
    SetText,
    SetRenamedFrom,
    SetVersion,
}

impl Capability {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Capability::AddSection => "add_section",
            Capability::AddKeyval => "add_keyval",
            Capability::AddDocumentation => "add_documentation",
            Capability::AddRestriction => "add_restriction",
            Capability::SetName => "set_name",
            Capability::SetValueType => "set_value_type",
            Capability::SetValue => "set_value",
            Capability::SetRange => "set_range",
            Capability::AddDefault => "add_default",
            Capability::SetIntroduced => "set_introduced",
            Capability::SetDeprecated => "set_deprecated",
            Capability::SetText => "set_text",
            Capability::SetRenamedFrom => "set_renamed_from",
            Capability::SetVersion => "set_version",
        }
    }

    /// The capability a parent needs to accept a child of `kind`.
    #[must_use]
    pub fn for_child(kind: ContextKind) -> Option<Capability> {
        match kind {
            ContextKind::Section => Some(Capability::AddSection),
            ContextKind::Keyval => Some(Capability::AddKeyval),
            ContextKind::Documentation => Some(Capability::AddDocumentation),
            ContextKind::Restriction => Some(Capability::AddRestriction),
            ContextKind::Mold | ContextKind::Config | ContextKind::FreeText => None,
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// KIND -> CAPABILITY TABLE
// =============================================================================

const MOLD: &[Capability] = &[
    Capability::AddSection,
    Capability::AddKeyval,
    Capability::AddDocumentation,
    Capability::SetVersion,
];

const CONFIG: &[Capability] = &[
    Capability::AddSection,
    Capability::AddKeyval,
    Capability::SetVersion,
];

const SECTION: &[Capability] = &[
    Capability::AddSection,
    Capability::AddKeyval,
    Capability::AddDocumentation,
    Capability::SetName,
    Capability::SetIntroduced,
    Capability::SetDeprecated,
];

const KEYVAL: &[Capability] = &[
    Capability::SetName,
    Capability::SetValueType,
    Capability::SetValue,
    Capability::AddDefault,
    Capability::AddRestriction,
    Capability::AddDocumentation,
    Capability::SetIntroduced,
    Capability::SetDeprecated,
    Capability::SetRenamedFrom,
];

const DOCUMENTATION: &[Capability] = &[Capability::SetText, Capability::SetIntroduced];

const RESTRICTION: &[Capability] = &[
    Capability::SetValue,
    Capability::SetRange,
    Capability::SetIntroduced,
    Capability::SetDeprecated,
    Capability::AddDocumentation,
];

const FREE_TEXT: &[Capability] = &[Capability::SetText];

/// Capabilities supported by contexts of `kind`.
#[must_use]
pub fn capabilities(kind: ContextKind) -> &'static [Capability] {
    match kind {
        ContextKind::Mold => MOLD,
        ContextKind::Config => CONFIG,
        ContextKind::Section => SECTION,
        ContextKind::Keyval => KEYVAL,
        ContextKind::Documentation => DOCUMENTATION,
        ContextKind::Restriction => RESTRICTION,
        ContextKind::FreeText => FREE_TEXT,
    }
}

/// The root kind a capability requires on a context of `kind`, if any.
///
/// Values on keyvals belong to configs; everything describing a keyval's
/// schema (type, defaults, restrictions, windows, renames) belongs to molds.
#[must_use]
pub fn required_root(kind: ContextKind, capability: Capability) -> Option<ContextKind> {
    match (kind, capability) {
        (ContextKind::Keyval, Capability::SetValue) => Some(ContextKind::Config),
        (
            ContextKind::Keyval,
            Capability::SetValueType
            | Capability::AddDefault
            | Capability::AddRestriction
            | Capability::AddDocumentation
            | Capability::SetIntroduced
            | Capability::SetDeprecated
            | Capability::SetRenamedFrom,
        ) => Some(ContextKind::Mold),
        (
            ContextKind::Section,
            Capability::AddDocumentation | Capability::SetIntroduced | Capability::SetDeprecated,
        ) => Some(ContextKind::Mold),
        _ => None,
    }
}

/// Check that a context of `kind` under a root of `root_kind` supports `capability`.
pub fn check(
    kind: ContextKind,
    root_kind: ContextKind,
    capability: Capability,
) -> Result<(), MoldError> {
    if !capabilities(kind).contains(&capability) {
        return Err(MoldError::NoCanDo(format!(
            "{} does not support {}",
            kind, capability
        )));
    }
    match required_root(kind, capability) {
        Some(required) if required != root_kind => Err(MoldError::WrongContext(format!(
            "{} on {} requires a {} root, found {}",
            capability, kind, required, root_kind
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_capability_is_no_can_do() {
        let err = check(ContextKind::Documentation, ContextKind::Mold, Capability::AddDefault)
            .expect_err("documentation has no defaults");
        assert!(matches!(err, MoldError::NoCanDo(_)));
    }

    #[test]
    fn defaults_are_mold_only() {
        check(ContextKind::Keyval, ContextKind::Mold, Capability::AddDefault).expect("mold");
        let err = check(ContextKind::Keyval, ContextKind::Config, Capability::AddDefault)
            .expect_err("config keyval");
        assert!(matches!(err, MoldError::WrongContext(_)));
    }

    #[test]
    fn keyval_values_are_config_only() {
        check(ContextKind::Keyval, ContextKind::Config, Capability::SetValue).expect("config");
        let err = check(ContextKind::Keyval, ContextKind::Mold, Capability::SetValue)
            .expect_err("mold keyval");
        assert!(matches!(err, MoldError::WrongContext(_)));
        // Restrictions carry values in molds.
        check(ContextKind::Restriction, ContextKind::Mold, Capability::SetValue)
            .expect("restriction value");
    }

    #[test]
    fn child_capabilities() {
        assert_eq!(
            Capability::for_child(ContextKind::Keyval),
            Some(Capability::AddKeyval)
        );
        assert_eq!(Capability::for_child(ContextKind::Mold), None);
        assert!(!capabilities(ContextKind::Config).contains(&Capability::AddDocumentation));
    }
}
