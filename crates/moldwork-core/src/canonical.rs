//! # Canonical Form
//!
//! Owned, serde-serializable trees mirroring mold and config graphs.
//!
//! The canonical form is the exchange format every I/O plugin speaks and
//! the private working copy of the update engine. Element order is storage
//! insertion order, so converting a graph to canonical form and back yields
//! the same traversal order.

use crate::context::{Config, ContextGraph, Mold, Payload};
use crate::restriction::{RestrictionEntry, RestrictionRule};
use crate::storage::ElementStorage;
use crate::types::{ContextId, ContextKind, MoldError, MoldResult, Value, ValueType, Version, VersionWindow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// MOLD TREE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalDocumentation {
    pub introduced: Version,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalDefault {
    pub introduced: Version,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRestriction {
    #[serde(default)]
    pub window: VersionWindow,
    pub rule: RestrictionRule,
    #[serde(default)]
    pub documentation: Vec<CanonicalDocumentation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalKeyval {
    pub name: String,
    #[serde(default)]
    pub window: VersionWindow,
    pub value_type: Option<ValueType>,
    #[serde(default)]
    pub defaults: Vec<CanonicalDefault>,
    #[serde(default)]
    pub restrictions: Vec<CanonicalRestriction>,
    #[serde(default)]
    pub documentation: Vec<CanonicalDocumentation>,
    #[serde(default)]
    pub renamed_from: Option<String>,
}

impl CanonicalKeyval {
    /// The default in effect at `version`: the one introduced last, not after `version`.
    #[must_use]
    pub fn default_at(&self, version: Version) -> Option<&Value> {
        self.defaults
            .iter()
            .filter(|d| d.introduced <= version)
            .max_by_key(|d| d.introduced)
            .map(|d| &d.value)
    }

    /// Restrictions in the form the restriction engine resolves.
    #[must_use]
    pub fn restriction_entries(&self) -> Vec<RestrictionEntry> {
        self.restrictions
            .iter()
            .map(|r| RestrictionEntry {
                window: r.window,
                rule: r.rule.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalSection {
    pub name: String,
    #[serde(default)]
    pub window: VersionWindow,
    #[serde(default)]
    pub documentation: Vec<CanonicalDocumentation>,
    #[serde(default)]
    pub elements: Vec<MoldElement>,
}

/// A child of a mold or mold section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoldElement {
    Section(CanonicalSection),
    Keyval(CanonicalKeyval),
}

impl MoldElement {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            MoldElement::Section(s) => &s.name,
            MoldElement::Keyval(k) => &k.name,
        }
    }

    #[must_use]
    pub fn window(&self) -> VersionWindow {
        match self {
            MoldElement::Section(s) => s.window,
            MoldElement::Keyval(k) => k.window,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ContextKind {
        match self {
            MoldElement::Section(_) => ContextKind::Section,
            MoldElement::Keyval(_) => ContextKind::Keyval,
        }
    }
}

/// Name-keyed view over a container of mold elements.
pub(crate) fn index(elements: &[MoldElement]) -> ElementStorage<&MoldElement> {
    elements
        .iter()
        .map(|e| (e.name().to_string(), e.window(), e))
        .collect()
}

/// A mold in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMold {
    pub version: Version,
    #[serde(default)]
    pub documentation: Vec<CanonicalDocumentation>,
    #[serde(default)]
    pub elements: Vec<MoldElement>,
}

impl CanonicalMold {
    /// Capture a finalized mold.
    pub fn from_graph(graph: &ContextGraph, mold: &Mold) -> MoldResult<Self> {
        Self::from_context(graph, mold.context())
    }

    pub(crate) fn from_context(graph: &ContextGraph, id: ContextId) -> MoldResult<Self> {
        match graph.get(id)?.payload() {
            Payload::Mold(m) => Ok(Self {
                version: m.version(),
                documentation: read_documentation(graph, m.documentation())?,
                elements: read_mold_elements(graph, m.elements())?,
            }),
            _ => Err(MoldError::WrongContext(format!(
                "context {} is not a MOLD",
                id.0
            ))),
        }
    }

    /// Build this mold into `graph`. Nothing is left behind on failure.
    pub fn into_graph(&self, graph: &mut ContextGraph) -> MoldResult<Mold> {
        let mold = graph.begin_mold()?;
        let built = self.build(graph, mold);
        match built {
            Ok(()) => graph.finalize_mold(mold),
            Err(e) => {
                let _ = graph.destroy(mold);
                Err(e)
            }
        }
    }

    fn build(&self, graph: &mut ContextGraph, mold: ContextId) -> MoldResult<()> {
        build_documentation(graph, mold, &self.documentation)?;
        build_mold_elements(graph, mold, &self.elements)?;
        graph.mold_update_version(mold, self.version)?;
        Ok(())
    }

    /// Every version at which something in the mold starts or stops applying.
    #[must_use]
    pub fn version_stamps(&self) -> BTreeSet<Version> {
        let mut stamps = BTreeSet::new();
        collect_stamps(&self.elements, &mut stamps);
        stamps
    }
}

fn collect_stamps(elements: &[MoldElement], stamps: &mut BTreeSet<Version>) {
    let window = |w: VersionWindow, stamps: &mut BTreeSet<Version>| {
        stamps.insert(w.introduced);
        if let Some(d) = w.deprecated {
            stamps.insert(d);
        }
    };
    for element in elements {
        window(element.window(), stamps);
        match element {
            MoldElement::Section(s) => collect_stamps(&s.elements, stamps),
            MoldElement::Keyval(k) => {
                stamps.extend(k.defaults.iter().map(|d| d.introduced));
                for r in &k.restrictions {
                    window(r.window, stamps);
                }
            }
        }
    }
}

// =============================================================================
// CONFIG TREE
// =============================================================================

/// A child of a config or config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigElement {
    Section {
        name: String,
        #[serde(default)]
        elements: Vec<ConfigElement>,
    },
    Keyval {
        name: String,
        value: Option<Value>,
    },
}

impl ConfigElement {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            ConfigElement::Section { name, .. } | ConfigElement::Keyval { name, .. } => name,
        }
    }
}

/// A config in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalConfig {
    pub version: Version,
    #[serde(default)]
    pub elements: Vec<ConfigElement>,
}

impl CanonicalConfig {
    /// Capture a finalized config.
    pub fn from_graph(graph: &ContextGraph, config: &Config) -> MoldResult<Self> {
        Self::from_context(graph, config.context())
    }

    pub(crate) fn from_context(graph: &ContextGraph, id: ContextId) -> MoldResult<Self> {
        match graph.get(id)?.payload() {
            Payload::Config(c) => Ok(Self {
                version: c.version(),
                elements: read_config_elements(graph, c.elements())?,
            }),
            _ => Err(MoldError::WrongContext(format!(
                "context {} is not a CONFIG",
                id.0
            ))),
        }
    }

    /// Build this config into `graph`, bound to `mold`. Nothing is left behind on failure.
    pub fn into_graph(&self, graph: &mut ContextGraph, mold: &Mold) -> MoldResult<Config> {
        let config = graph.begin_config(mold)?;
        let built = graph
            .set_config_version(config, self.version)
            .and_then(|()| build_config_elements(graph, config, &self.elements));
        match built {
            Ok(()) => graph.finalize_config(config),
            Err(e) => {
                let _ = graph.destroy(config);
                Err(e)
            }
        }
    }

    /// The keyval value stored under `path`, dot separated.
    #[must_use]
    pub fn value(&self, path: &str) -> Option<&Value> {
        let mut elements = &self.elements;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                return elements.iter().find_map(|e| match e {
                    ConfigElement::Keyval { name, value } if name == segment => value.as_ref(),
                    _ => None,
                });
            }
            elements = elements.iter().find_map(|e| match e {
                ConfigElement::Section { name, elements } if name == segment => Some(elements),
                _ => None,
            })?;
        }
        None
    }
}

// =============================================================================
// GRAPH -> CANONICAL
// =============================================================================

fn read_documentation(
    graph: &ContextGraph,
    ids: &[ContextId],
) -> MoldResult<Vec<CanonicalDocumentation>> {
    ids.iter()
        .map(|id| -> MoldResult<CanonicalDocumentation> {
            match graph.get(*id)?.payload() {
                Payload::Documentation(d) => Ok(CanonicalDocumentation {
                    introduced: d.introduced(),
                    text: d.text().unwrap_or_default().to_string(),
                }),
                _ => Err(bad_child(*id, ContextKind::Documentation)),
            }
        })
        .collect()
}

fn read_mold_elements(
    graph: &ContextGraph,
    storage: &ElementStorage<ContextId>,
) -> MoldResult<Vec<MoldElement>> {
    storage
        .iter()
        .map(|element| -> MoldResult<MoldElement> {
            let id = *element.item();
            let name = element.name().to_string();
            match graph.get(id)?.payload() {
                Payload::Section(s) => Ok(MoldElement::Section(CanonicalSection {
                    name,
                    window: s.window(),
                    documentation: read_documentation(graph, s.documentation())?,
                    elements: read_mold_elements(graph, s.elements())?,
                })),
                Payload::Keyval(k) => Ok(MoldElement::Keyval(CanonicalKeyval {
                    name,
                    window: k.window(),
                    value_type: k.value_type(),
                    defaults: k
                        .defaults()
                        .iter()
                        .map(|(introduced, value)| CanonicalDefault {
                            introduced: *introduced,
                            value: value.clone(),
                        })
                        .collect(),
                    restrictions: read_restrictions(graph, k.restrictions())?,
                    documentation: read_documentation(graph, k.documentation())?,
                    renamed_from: k.renamed_from().map(str::to_string),
                })),
                _ => Err(bad_child(id, ContextKind::Keyval)),
            }
        })
        .collect()
}

fn read_restrictions(
    graph: &ContextGraph,
    ids: &[ContextId],
) -> MoldResult<Vec<CanonicalRestriction>> {
    ids.iter()
        .map(|id| -> MoldResult<CanonicalRestriction> {
            match graph.get(*id)?.payload() {
                Payload::Restriction(r) => Ok(CanonicalRestriction {
                    window: r.window(),
                    rule: r.rule().cloned().ok_or_else(|| {
                        MoldError::BadContextObject(format!("restriction {} has no rule", id.0))
                    })?,
                    documentation: read_documentation(graph, r.documentation())?,
                }),
                _ => Err(bad_child(*id, ContextKind::Restriction)),
            }
        })
        .collect()
}

fn read_config_elements(
    graph: &ContextGraph,
    storage: &ElementStorage<ContextId>,
) -> MoldResult<Vec<ConfigElement>> {
    storage
        .iter()
        .map(|element| -> MoldResult<ConfigElement> {
            let id = *element.item();
            let name = element.name().to_string();
            match graph.get(id)?.payload() {
                Payload::Section(s) => Ok(ConfigElement::Section {
                    name,
                    elements: read_config_elements(graph, s.elements())?,
                }),
                Payload::Keyval(k) => Ok(ConfigElement::Keyval {
                    name,
                    value: k.value().cloned(),
                }),
                _ => Err(bad_child(id, ContextKind::Keyval)),
            }
        })
        .collect()
}

fn bad_child(id: ContextId, expected: ContextKind) -> MoldError {
    MoldError::BadContextObject(format!(
        "context {} is stored where a {} belongs",
        id.0, expected
    ))
}

// =============================================================================
// CANONICAL -> GRAPH
// =============================================================================

fn build_documentation(
    graph: &mut ContextGraph,
    parent: ContextId,
    documentation: &[CanonicalDocumentation],
) -> MoldResult<()> {
    for doc in documentation {
        graph.add_documentation(parent, doc.introduced, &doc.text)?;
    }
    Ok(())
}

fn set_window(graph: &mut ContextGraph, id: ContextId, window: VersionWindow) -> MoldResult<()> {
    graph.set_introduced(id, window.introduced)?;
    match window.deprecated {
        Some(deprecated) => graph.set_deprecated(id, deprecated),
        None => Ok(()),
    }
}

fn build_mold_elements(
    graph: &mut ContextGraph,
    parent: ContextId,
    elements: &[MoldElement],
) -> MoldResult<()> {
    for element in elements {
        let id = graph.begin(parent, element.kind())?;
        let built = match element {
            MoldElement::Section(s) => build_section(graph, id, s),
            MoldElement::Keyval(k) => build_keyval(graph, id, k),
        }
        .and_then(|()| graph.finalize(id));
        graph.settle(id, built)?;
    }
    Ok(())
}

fn build_section(graph: &mut ContextGraph, id: ContextId, section: &CanonicalSection) -> MoldResult<()> {
    graph.set_name(id, &section.name)?;
    set_window(graph, id, section.window)?;
    build_documentation(graph, id, &section.documentation)?;
    build_mold_elements(graph, id, &section.elements)
}

fn build_keyval(graph: &mut ContextGraph, id: ContextId, keyval: &CanonicalKeyval) -> MoldResult<()> {
    graph.set_name(id, &keyval.name)?;
    set_window(graph, id, keyval.window)?;
    if let Some(value_type) = keyval.value_type {
        graph.set_value_type(id, value_type)?;
    }
    for default in &keyval.defaults {
        graph.add_default(id, default.introduced, default.value.clone())?;
    }
    if let Some(from) = &keyval.renamed_from {
        graph.set_renamed_from(id, from)?;
    }
    for restriction in &keyval.restrictions {
        let rid = graph.begin(id, ContextKind::Restriction)?;
        let built = build_restriction(graph, rid, restriction).and_then(|()| graph.finalize(rid));
        graph.settle(rid, built)?;
    }
    build_documentation(graph, id, &keyval.documentation)
}

fn build_restriction(
    graph: &mut ContextGraph,
    id: ContextId,
    restriction: &CanonicalRestriction,
) -> MoldResult<()> {
    match &restriction.rule {
        RestrictionRule::Value(value) => graph.set_value(id, value.clone())?,
        RestrictionRule::Range { min, max } => graph.set_range(id, *min, *max)?,
    }
    set_window(graph, id, restriction.window)?;
    build_documentation(graph, id, &restriction.documentation)
}

/// Build config elements under `parent`, a config or config section.
pub(crate) fn build_config_elements(
    graph: &mut ContextGraph,
    parent: ContextId,
    elements: &[ConfigElement],
) -> MoldResult<()> {
    for element in elements {
        let (id, built) = match element {
            ConfigElement::Section { name, elements } => {
                let id = graph.begin(parent, ContextKind::Section)?;
                let built = graph
                    .set_name(id, name)
                    .and_then(|()| build_config_elements(graph, id, elements));
                (id, built)
            }
            ConfigElement::Keyval { name, value } => {
                let id = graph.begin(parent, ContextKind::Keyval)?;
                let built = graph.set_name(id, name).and_then(|()| match value {
                    Some(value) => graph.set_value(id, value.clone()),
                    None => Ok(()),
                });
                (id, built)
            }
        };
        let built = built.and_then(|()| graph.finalize(id));
        graph.settle(id, built)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_mold() -> CanonicalMold {
        CanonicalMold {
            version: Version::new(2, 0, 0),
            documentation: vec![CanonicalDocumentation {
                introduced: Version::INITIAL,
                text: "server settings".to_string(),
            }],
            elements: vec![
                MoldElement::Keyval(CanonicalKeyval {
                    name: "mode".to_string(),
                    window: VersionWindow::default(),
                    value_type: Some(ValueType::Enum),
                    defaults: vec![CanonicalDefault {
                        introduced: Version::INITIAL,
                        value: Value::Enum("A".to_string()),
                    }],
                    restrictions: vec![CanonicalRestriction {
                        window: VersionWindow::new(Version::INITIAL, Some(Version::new(2, 0, 0))),
                        rule: RestrictionRule::Value(Value::Enum("A".to_string())),
                        documentation: Vec::new(),
                    }],
                    documentation: Vec::new(),
                    renamed_from: None,
                }),
                MoldElement::Section(CanonicalSection {
                    name: "server".to_string(),
                    window: VersionWindow::default(),
                    documentation: Vec::new(),
                    elements: vec![MoldElement::Keyval(CanonicalKeyval {
                        name: "port".to_string(),
                        window: VersionWindow::default(),
                        value_type: Some(ValueType::Integer),
                        defaults: vec![CanonicalDefault {
                            introduced: Version::INITIAL,
                            value: Value::Integer(8080),
                        }],
                        restrictions: Vec::new(),
                        documentation: Vec::new(),
                        renamed_from: None,
                    })],
                }),
            ],
        }
    }

    #[test]
    fn mold_survives_the_graph() {
        let canonical = sample_mold();
        let mut graph = ContextGraph::new();
        let mold = canonical.into_graph(&mut graph).expect("build");
        let back = CanonicalMold::from_graph(&graph, &mold).expect("read");
        assert_eq!(back, canonical);
    }

    #[test]
    fn failed_build_leaves_nothing_behind() {
        let mut canonical = sample_mold();
        // Same name twice with overlapping windows.
        let duplicate = canonical.elements[0].clone();
        canonical.elements.push(duplicate);

        let mut graph = ContextGraph::new();
        let err = canonical.into_graph(&mut graph).expect_err("duplicate");
        assert!(matches!(err, MoldError::Exists(_)));
        assert!(graph.is_empty());
    }

    #[test]
    fn config_above_mold_is_rejected() {
        let mut graph = ContextGraph::new();
        let mold = sample_mold().into_graph(&mut graph).expect("mold");
        let contexts = graph.len();
        let config = CanonicalConfig {
            version: Version::new(3, 0, 0),
            elements: Vec::new(),
        };
        let err = config.into_graph(&mut graph, &mold).expect_err("too new");
        assert!(matches!(err, MoldError::ConflictingSemver(_)));
        assert_eq!(graph.len(), contexts);
    }

    #[test]
    fn default_at_picks_latest_introduced() {
        let keyval = CanonicalKeyval {
            name: "retries".to_string(),
            window: VersionWindow::default(),
            value_type: Some(ValueType::Integer),
            defaults: vec![
                CanonicalDefault {
                    introduced: Version::new(2, 0, 0),
                    value: Value::Integer(5),
                },
                CanonicalDefault {
                    introduced: Version::INITIAL,
                    value: Value::Integer(3),
                },
            ],
            restrictions: Vec::new(),
            documentation: Vec::new(),
            renamed_from: None,
        };
        assert_eq!(keyval.default_at(Version::new(1, 9, 0)), Some(&Value::Integer(3)));
        assert_eq!(keyval.default_at(Version::new(2, 0, 0)), Some(&Value::Integer(5)));
        assert_eq!(keyval.default_at(Version::ZERO), None);
    }

    #[test]
    fn stamps_cover_windows_defaults_and_restrictions() {
        let stamps: Vec<Version> = sample_mold().version_stamps().into_iter().collect();
        assert_eq!(stamps, vec![Version::INITIAL, Version::new(2, 0, 0)]);
    }

    #[test]
    fn config_value_lookup_by_path() {
        let config = CanonicalConfig {
            version: Version::INITIAL,
            elements: vec![ConfigElement::Section {
                name: "server".to_string(),
                elements: vec![ConfigElement::Keyval {
                    name: "port".to_string(),
                    value: Some(Value::Integer(80)),
                }],
            }],
        };
        assert_eq!(config.value("server.port"), Some(&Value::Integer(80)));
        assert_eq!(config.value("server.host"), None);
        assert_eq!(config.value("port"), None);
    }
}
