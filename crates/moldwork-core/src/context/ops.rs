//! Attribute operations on contexts.
//!
//! Every setter runs the capability check and the lifecycle check before
//! touching the payload, so a failed call leaves the context unchanged.

use super::capability::{self, Capability};
use super::graph::{ContextGraph, Payload};
use super::{Config, Mold};
use crate::primitives::MAX_NAME_LENGTH;
use crate::restriction::RestrictionRule;
use crate::types::{
    ContextId, ContextKind, ContextState, MoldError, MoldResult, Value, ValueType, Version,
    VersionWindow,
};

impl ContextGraph {
    /// Capability, root and lifecycle checks shared by all setters.
    fn prepare(&mut self, id: ContextId, capability: Capability) -> MoldResult<&mut Payload> {
        let root_kind = self.root_kind(id)?;
        let ctx = self.get_mut(id)?;
        capability::check(ctx.kind, root_kind, capability)?;
        if ctx.state != ContextState::Constructing {
            return Err(MoldError::InvalidContext(format!(
                "{} {} is finalized; {} is no longer possible",
                ctx.kind, id.0, capability
            )));
        }
        Ok(&mut ctx.payload)
    }

    fn window_mut(payload: &mut Payload) -> MoldResult<&mut VersionWindow> {
        match payload {
            Payload::Section(s) => Ok(&mut s.window),
            Payload::Keyval(k) => Ok(&mut k.window),
            Payload::Restriction(r) => Ok(&mut r.window),
            _ => Err(MoldError::BadContextObject(
                "payload carries no window".to_string(),
            )),
        }
    }

    pub fn set_name(&mut self, id: ContextId, name: &str) -> MoldResult<()> {
        if name.is_empty() || name.len() > MAX_NAME_LENGTH {
            return Err(MoldError::InvalidArgument(format!(
                "name must be 1..={} bytes",
                MAX_NAME_LENGTH
            )));
        }
        match self.prepare(id, Capability::SetName)? {
            Payload::Section(s) => s.name = Some(name.to_string()),
            Payload::Keyval(k) => k.name = Some(name.to_string()),
            _ => return Err(MoldError::BadContextObject("payload has no name".to_string())),
        }
        Ok(())
    }

    pub fn set_value_type(&mut self, id: ContextId, value_type: ValueType) -> MoldResult<()> {
        match self.prepare(id, Capability::SetValueType)? {
            Payload::Keyval(k) => {
                k.value_type = Some(value_type);
                Ok(())
            }
            _ => Err(MoldError::BadContextObject("payload has no type".to_string())),
        }
    }

    /// Set the value of a config keyval, or make a restriction a VALUE rule.
    pub fn set_value(&mut self, id: ContextId, value: Value) -> MoldResult<()> {
        match self.prepare(id, Capability::SetValue)? {
            Payload::Keyval(k) => k.value = Some(value),
            Payload::Restriction(r) => r.rule = Some(RestrictionRule::Value(value)),
            _ => return Err(MoldError::BadContextObject("payload has no value".to_string())),
        }
        Ok(())
    }

    /// Make a restriction an inclusive RANGE rule.
    pub fn set_range(&mut self, id: ContextId, min: f64, max: f64) -> MoldResult<()> {
        let rule = RestrictionRule::Range { min, max };
        if !rule.is_well_formed() {
            return Err(MoldError::InvalidArgument(format!(
                "range [{}, {}] is empty or not finite",
                min, max
            )));
        }
        match self.prepare(id, Capability::SetRange)? {
            Payload::Restriction(r) => {
                r.rule = Some(rule);
                Ok(())
            }
            _ => Err(MoldError::BadContextObject("payload has no range".to_string())),
        }
    }

    /// Add a default introduced at `introduced`.
    pub fn add_default(&mut self, id: ContextId, introduced: Version, value: Value) -> MoldResult<()> {
        match self.prepare(id, Capability::AddDefault)? {
            Payload::Keyval(k) => {
                if k.defaults.iter().any(|(v, _)| *v == introduced) {
                    return Err(MoldError::Exists(format!(
                        "a default introduced at {} already exists",
                        introduced
                    )));
                }
                k.defaults
                    .try_reserve(1)
                    .map_err(|e| MoldError::NoMemory(e.to_string()))?;
                k.defaults.push((introduced, value));
                Ok(())
            }
            _ => Err(MoldError::BadContextObject("payload has no defaults".to_string())),
        }
    }

    pub fn set_introduced(&mut self, id: ContextId, version: Version) -> MoldResult<()> {
        match self.prepare(id, Capability::SetIntroduced)? {
            Payload::Documentation(d) => d.introduced = version,
            payload => Self::window_mut(payload)?.introduced = version,
        }
        Ok(())
    }

    pub fn set_deprecated(&mut self, id: ContextId, version: Version) -> MoldResult<()> {
        let payload = self.prepare(id, Capability::SetDeprecated)?;
        Self::window_mut(payload)?.deprecated = Some(version);
        Ok(())
    }

    pub fn set_text(&mut self, id: ContextId, text: &str) -> MoldResult<()> {
        match self.prepare(id, Capability::SetText)? {
            Payload::Documentation(d) => d.text = Some(text.to_string()),
            Payload::FreeText(t) => *t = Some(text.to_string()),
            _ => return Err(MoldError::BadContextObject("payload has no text".to_string())),
        }
        Ok(())
    }

    /// Declare that a mold keyval replaces the keyval `from`.
    pub fn set_renamed_from(&mut self, id: ContextId, from: &str) -> MoldResult<()> {
        if from.is_empty() || from.len() > MAX_NAME_LENGTH {
            return Err(MoldError::InvalidArgument(
                "renamed_from must be a valid name".to_string(),
            ));
        }
        match self.prepare(id, Capability::SetRenamedFrom)? {
            Payload::Keyval(k) => {
                k.renamed_from = Some(from.to_string());
                Ok(())
            }
            _ => Err(MoldError::BadContextObject("payload has no rename".to_string())),
        }
    }

    // =========================================================================
    // VERSIONS
    // =========================================================================

    /// Raise the mold version to `candidate` if it is greater. Never decreases.
    ///
    /// Allowed on finalized molds.
    pub fn mold_update_version(&mut self, mold: ContextId, candidate: Version) -> MoldResult<bool> {
        let root_kind = self.root_kind(mold)?;
        let ctx = self.get_mut(mold)?;
        capability::check(ctx.kind, root_kind, Capability::SetVersion)?;
        match &mut ctx.payload {
            Payload::Mold(m) => Ok(m.version.raise_to(candidate)),
            _ => Err(MoldError::WrongContext(format!(
                "expected a MOLD, found {}",
                ctx.kind
            ))),
        }
    }

    /// Set the version of a config under construction.
    ///
    /// The version may not exceed the version of the bound mold.
    pub fn set_config_version(&mut self, config: ContextId, version: Version) -> MoldResult<()> {
        let mold = match self.get(config)?.payload() {
            Payload::Config(c) => c.mold,
            _ => None,
        };
        let mold_version = match mold {
            Some(mold) => match self.get(mold)?.payload() {
                Payload::Mold(m) => Some(m.version),
                _ => None,
            },
            None => None,
        };

        match self.prepare(config, Capability::SetVersion)? {
            Payload::Config(c) => {
                let mold_version = mold_version.ok_or_else(|| {
                    MoldError::InvalidArgument("config is not bound to a mold".to_string())
                })?;
                if version > mold_version {
                    return Err(MoldError::ConflictingSemver(format!(
                        "config version {} exceeds mold version {}",
                        version, mold_version
                    )));
                }
                c.version = version;
                Ok(())
            }
            _ => Err(MoldError::WrongContext(
                "version can only be set on a CONFIG here".to_string(),
            )),
        }
    }

    /// Force the version of a finalized config. Used by update commits.
    pub(crate) fn commit_config_version(&mut self, config: ContextId, version: Version) -> MoldResult<()> {
        match &mut self.get_mut(config)?.payload {
            Payload::Config(c) => {
                c.version = version;
                Ok(())
            }
            _ => Err(MoldError::WrongContext(format!(
                "context {} is not a CONFIG",
                config.0
            ))),
        }
    }

    pub fn mold_version(&self, mold: &Mold) -> MoldResult<Version> {
        match self.get(mold.context())?.payload() {
            Payload::Mold(m) => Ok(m.version),
            _ => Err(MoldError::BadContextObject("mold handle without mold".to_string())),
        }
    }

    pub fn config_version(&self, config: &Config) -> MoldResult<Version> {
        match self.get(config.context())?.payload() {
            Payload::Config(c) => Ok(c.version),
            _ => Err(MoldError::BadContextObject(
                "config handle without config".to_string(),
            )),
        }
    }

    /// The mold a config is bound to, if it is still reachable.
    pub fn config_mold(&self, config: &Config) -> MoldResult<ContextId> {
        let mold = match self.get(config.context())?.payload() {
            Payload::Config(c) => c.mold,
            _ => None,
        };
        let mold = mold.ok_or_else(|| {
            MoldError::InvalidArgument("config is not bound to a mold".to_string())
        })?;
        self.get(mold)?;
        Ok(mold)
    }

    /// Text of a documentation or free-text context.
    pub fn text(&self, id: ContextId) -> MoldResult<Option<&str>> {
        match self.get(id)?.payload() {
            Payload::Documentation(d) => Ok(d.text()),
            Payload::FreeText(t) => Ok(t.as_deref()),
            _ => Err(MoldError::NoCanDo(format!("context {} carries no text", id.0))),
        }
    }

    // =========================================================================
    // CONVENIENCE BUILDERS
    // =========================================================================

    /// Begin, fill and finalize a documentation entry under `parent`.
    pub fn add_documentation(
        &mut self,
        parent: ContextId,
        introduced: Version,
        text: &str,
    ) -> MoldResult<ContextId> {
        let doc = self.begin(parent, ContextKind::Documentation)?;
        let built = self
            .set_text(doc, text)
            .and_then(|()| self.set_introduced(doc, introduced))
            .and_then(|()| self.finalize(doc));
        self.settle(doc, built)
    }

    /// Begin, fill and finalize a restriction under a mold keyval.
    pub fn add_restriction(
        &mut self,
        keyval: ContextId,
        window: VersionWindow,
        rule: RestrictionRule,
    ) -> MoldResult<ContextId> {
        let restriction = self.begin(keyval, ContextKind::Restriction)?;
        let built = match rule {
            RestrictionRule::Value(value) => self.set_value(restriction, value),
            RestrictionRule::Range { min, max } => self.set_range(restriction, min, max),
        }
        .and_then(|()| self.set_introduced(restriction, window.introduced))
        .and_then(|()| match window.deprecated {
            Some(deprecated) => self.set_deprecated(restriction, deprecated),
            None => Ok(()),
        })
        .and_then(|()| self.finalize(restriction));
        self.settle(restriction, built)
    }

    /// Destroy a partially built child when its construction failed.
    pub(crate) fn settle(&mut self, id: ContextId, built: MoldResult<()>) -> MoldResult<ContextId> {
        match built {
            Ok(()) => Ok(id),
            Err(e) => {
                let _ = self.destroy(id);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mold_with_keyval(graph: &mut ContextGraph) -> (ContextId, ContextId) {
        let mold = graph.begin_mold().expect("mold");
        let kv = graph.begin(mold, ContextKind::Keyval).expect("keyval");
        (mold, kv)
    }

    #[test]
    fn setters_after_finalize_are_invalid_context() {
        let mut graph = ContextGraph::new();
        let (_, kv) = mold_with_keyval(&mut graph);
        graph.set_name(kv, "port").expect("name");
        graph.finalize(kv).expect("finalize");

        let err = graph.set_name(kv, "other").expect_err("finalized");
        assert!(matches!(err, MoldError::InvalidContext(_)));
    }

    #[test]
    fn checks_happen_before_mutation() {
        let mut graph = ContextGraph::new();
        let (_, kv) = mold_with_keyval(&mut graph);
        let err = graph.set_value(kv, Value::Integer(1)).expect_err("mold keyval");
        assert!(matches!(err, MoldError::WrongContext(_)));

        match graph.get(kv).expect("kv").payload() {
            Payload::Keyval(k) => assert!(k.value().is_none()),
            _ => unreachable!(),
        }
    }

    #[test]
    fn duplicate_default_version_exists() {
        let mut graph = ContextGraph::new();
        let (_, kv) = mold_with_keyval(&mut graph);
        graph
            .add_default(kv, Version::INITIAL, Value::Integer(1))
            .expect("first");
        let err = graph
            .add_default(kv, Version::INITIAL, Value::Integer(2))
            .expect_err("second");
        assert!(matches!(err, MoldError::Exists(_)));
    }

    #[test]
    fn config_version_bounded_by_mold() {
        let mut graph = ContextGraph::new();
        let mold = graph.begin_mold().expect("mold");
        graph
            .mold_update_version(mold, Version::new(2, 0, 0))
            .expect("raise");
        let mold = graph.finalize_mold(mold).expect("finalize");

        let config = graph.begin_config(&mold).expect("config");
        graph
            .set_config_version(config, Version::new(2, 0, 0))
            .expect("equal is fine");
        let err = graph
            .set_config_version(config, Version::new(2, 0, 1))
            .expect_err("above mold");
        assert!(matches!(err, MoldError::ConflictingSemver(_)));
    }

    #[test]
    fn mold_version_never_decreases() {
        let mut graph = ContextGraph::new();
        let mold = graph.begin_mold().expect("mold");
        assert!(graph.mold_update_version(mold, Version::new(1, 2, 0)).expect("raise"));
        assert!(!graph.mold_update_version(mold, Version::new(1, 1, 9)).expect("noop"));
        let mold = graph.finalize_mold(mold).expect("finalize");
        assert_eq!(graph.mold_version(&mold).expect("version"), Version::new(1, 2, 0));
    }

    #[test]
    fn convenience_restriction_cleans_up_on_failure() {
        let mut graph = ContextGraph::new();
        let (_, kv) = mold_with_keyval(&mut graph);
        let before = graph.len();
        let err = graph
            .add_restriction(
                kv,
                VersionWindow::default(),
                RestrictionRule::Range { min: 3.0, max: 1.0 },
            )
            .expect_err("empty range");
        assert!(matches!(err, MoldError::InvalidArgument(_)));
        assert_eq!(graph.len(), before);
    }

    #[test]
    fn documentation_attaches_to_queue() {
        let mut graph = ContextGraph::new();
        let mold = graph.begin_mold().expect("mold");
        let doc = graph
            .add_documentation(mold, Version::new(1, 1, 0), "top level")
            .expect("doc");
        assert_eq!(graph.text(doc).expect("text"), Some("top level"));
        match graph.get(mold).expect("mold").payload() {
            Payload::Mold(m) => {
                assert_eq!(m.documentation(), &[doc]);
                assert_eq!(m.version(), Version::new(1, 1, 0));
            }
            _ => unreachable!(),
        }
    }
}
