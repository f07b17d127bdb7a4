//! # Context Graph
//!
//! The arena holding every context. Owning edges are ids stored in the
//! parent's element storage or queues; non-owning edges (config -> mold,
//! child -> root) are ids resolved by lookup and never followed by teardown.
//!
//! Uses `BTreeMap` for deterministic ordering. Ids are never reused.

use super::capability::{self, Capability};
use super::{Config, Mold};
use crate::primitives::{MAX_NAME_LENGTH, MAX_NESTING_DEPTH};
use crate::restriction::RestrictionRule;
use crate::storage::ElementStorage;
use crate::types::{
    ContextId, ContextKind, ContextState, MoldError, MoldResult, Value, ValueType, Version,
    VersionWindow,
};
use std::collections::BTreeMap;
use tracing::debug;

// =============================================================================
// PAYLOADS
// =============================================================================

/// Payload of a mold root.
#[derive(Debug, Clone, Default)]
pub struct MoldData {
    pub(crate) version: Version,
    pub(crate) elements: ElementStorage<ContextId>,
    pub(crate) documentation: Vec<ContextId>,
}

impl MoldData {
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    #[must_use]
    pub fn elements(&self) -> &ElementStorage<ContextId> {
        &self.elements
    }

    #[must_use]
    pub fn documentation(&self) -> &[ContextId] {
        &self.documentation
    }
}

/// Payload of a config root.
#[derive(Debug, Clone, Default)]
pub struct ConfigData {
    pub(crate) version: Version,
    pub(crate) mold: Option<ContextId>,
    pub(crate) elements: ElementStorage<ContextId>,
}

impl ConfigData {
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// The bound mold. Non-owning; may no longer resolve.
    #[must_use]
    pub fn mold(&self) -> Option<ContextId> {
        self.mold
    }

    #[must_use]
    pub fn elements(&self) -> &ElementStorage<ContextId> {
        &self.elements
    }
}

#[derive(Debug, Clone, Default)]
pub struct SectionData {
    pub(crate) name: Option<String>,
    pub(crate) window: VersionWindow,
    pub(crate) elements: ElementStorage<ContextId>,
    pub(crate) documentation: Vec<ContextId>,
}

impl SectionData {
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn window(&self) -> VersionWindow {
        self.window
    }

    #[must_use]
    pub fn elements(&self) -> &ElementStorage<ContextId> {
        &self.elements
    }

    #[must_use]
    pub fn documentation(&self) -> &[ContextId] {
        &self.documentation
    }
}

/// Payload of a keyval.
///
/// Under a mold the schema fields are used; under a config only the name
/// and the value are.
#[derive(Debug, Clone, Default)]
pub struct KeyvalData {
    pub(crate) name: Option<String>,
    pub(crate) window: VersionWindow,
    pub(crate) value_type: Option<ValueType>,
    pub(crate) value: Option<Value>,
    pub(crate) defaults: Vec<(Version, Value)>,
    pub(crate) restrictions: Vec<ContextId>,
    pub(crate) documentation: Vec<ContextId>,
    pub(crate) renamed_from: Option<String>,
}

impl KeyvalData {
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn window(&self) -> VersionWindow {
        self.window
    }

    #[must_use]
    pub fn value_type(&self) -> Option<ValueType> {
        self.value_type
    }

    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Versioned defaults in insertion order.
    #[must_use]
    pub fn defaults(&self) -> &[(Version, Value)] {
        &self.defaults
    }

    #[must_use]
    pub fn restrictions(&self) -> &[ContextId] {
        &self.restrictions
    }

    #[must_use]
    pub fn documentation(&self) -> &[ContextId] {
        &self.documentation
    }

    #[must_use]
    pub fn renamed_from(&self) -> Option<&str> {
        self.renamed_from.as_deref()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DocumentationData {
    pub(crate) text: Option<String>,
    pub(crate) introduced: Version,
}

impl DocumentationData {
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    #[must_use]
    pub fn introduced(&self) -> Version {
        self.introduced
    }
}

#[derive(Debug, Clone, Default)]
pub struct RestrictionData {
    pub(crate) rule: Option<RestrictionRule>,
    pub(crate) window: VersionWindow,
    pub(crate) documentation: Vec<ContextId>,
}

impl RestrictionData {
    #[must_use]
    pub fn rule(&self) -> Option<&RestrictionRule> {
        self.rule.as_ref()
    }

    #[must_use]
    pub fn window(&self) -> VersionWindow {
        self.window
    }

    #[must_use]
    pub fn documentation(&self) -> &[ContextId] {
        &self.documentation
    }
}

/// Kind-specific payload of a context.
#[derive(Debug, Clone)]
pub enum Payload {
    Mold(MoldData),
    Config(ConfigData),
    Section(SectionData),
    Keyval(KeyvalData),
    Documentation(DocumentationData),
    Restriction(RestrictionData),
    FreeText(Option<String>),
}

impl Payload {
    fn empty(kind: ContextKind) -> Self {
        match kind {
            ContextKind::Mold => Payload::Mold(MoldData::default()),
            ContextKind::Config => Payload::Config(ConfigData::default()),
            ContextKind::Section => Payload::Section(SectionData::default()),
            ContextKind::Keyval => Payload::Keyval(KeyvalData::default()),
            ContextKind::Documentation => Payload::Documentation(DocumentationData::default()),
            ContextKind::Restriction => Payload::Restriction(RestrictionData::default()),
            ContextKind::FreeText => Payload::FreeText(None),
        }
    }

    pub(crate) fn elements_mut(&mut self) -> Option<&mut ElementStorage<ContextId>> {
        match self {
            Payload::Mold(m) => Some(&mut m.elements),
            Payload::Config(c) => Some(&mut c.elements),
            Payload::Section(s) => Some(&mut s.elements),
            _ => None,
        }
    }

    fn documentation_mut(&mut self) -> Option<&mut Vec<ContextId>> {
        match self {
            Payload::Mold(m) => Some(&mut m.documentation),
            Payload::Section(s) => Some(&mut s.documentation),
            Payload::Keyval(k) => Some(&mut k.documentation),
            Payload::Restriction(r) => Some(&mut r.documentation),
            _ => None,
        }
    }

    /// Remove every owned child id, in storage order.
    fn take_children(&mut self) -> Vec<ContextId> {
        let mut children = Vec::new();
        if let Some(elements) = self.elements_mut() {
            children.extend(elements.drain());
        }
        if let Payload::Keyval(k) = self {
            children.append(&mut k.restrictions);
        }
        if let Some(documentation) = self.documentation_mut() {
            children.append(documentation);
        }
        children
    }

    /// Remove `child` from whichever owned collection holds it.
    fn detach(&mut self, child: ContextId) {
        if let Some(elements) = self.elements_mut() {
            elements.remove(&child);
        }
        if let Payload::Keyval(k) = self {
            k.restrictions.retain(|id| *id != child);
        }
        if let Some(documentation) = self.documentation_mut() {
            documentation.retain(|id| *id != child);
        }
    }
}

// =============================================================================
// CONTEXT NODE
// =============================================================================

/// A node of the entity graph.
#[derive(Debug, Clone)]
pub struct Context {
    pub(crate) id: ContextId,
    pub(crate) kind: ContextKind,
    pub(crate) state: ContextState,
    pub(crate) refcount: u32,
    pub(crate) root: ContextId,
    pub(crate) parent: Option<ContextId>,
    pub(crate) payload: Payload,
}

impl Context {
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    #[must_use]
    pub fn state(&self) -> ContextState {
        self.state
    }

    #[must_use]
    pub fn refcount(&self) -> u32 {
        self.refcount
    }

    /// The owning mold or config. Roots point at themselves.
    #[must_use]
    pub fn root(&self) -> ContextId {
        self.root
    }

    #[must_use]
    pub fn parent(&self) -> Option<ContextId> {
        self.parent
    }

    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }
}

// =============================================================================
// GRAPH
// =============================================================================

/// Arena of contexts.
#[derive(Debug, Clone, Default)]
pub struct ContextGraph {
    /// Live contexts: ContextId -> Context
    pub(crate) contexts: BTreeMap<ContextId, Context>,

    /// Next available ContextId
    next_context_id: u64,
}

impl ContextGraph {
    /// Create a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Look up a live context.
    pub fn get(&self, id: ContextId) -> MoldResult<&Context> {
        self.contexts.get(&id).ok_or_else(|| self.missing(id))
    }

    pub(crate) fn get_mut(&mut self, id: ContextId) -> MoldResult<&mut Context> {
        let missing = self.missing(id);
        self.contexts.get_mut(&id).ok_or(missing)
    }

    fn missing(&self, id: ContextId) -> MoldError {
        if id.0 < self.next_context_id {
            MoldError::DestroyedContext(format!("context {} has been destroyed", id.0))
        } else {
            MoldError::InvalidArgument(format!("context {} does not exist", id.0))
        }
    }

    /// Kind of the root owning `id`.
    pub(crate) fn root_kind(&self, id: ContextId) -> MoldResult<ContextKind> {
        let ctx = self.get(id)?;
        if ctx.root == ctx.id {
            return Ok(ctx.kind);
        }
        Ok(self.get(ctx.root)?.kind)
    }

    #[must_use]
    pub fn refcount(&self, id: ContextId) -> Option<u32> {
        self.contexts.get(&id).map(|c| c.refcount)
    }

    pub fn state(&self, id: ContextId) -> MoldResult<ContextState> {
        Ok(self.get(id)?.state)
    }

    pub fn kind(&self, id: ContextId) -> MoldResult<ContextKind> {
        Ok(self.get(id)?.kind)
    }

    fn allocate(
        &mut self,
        kind: ContextKind,
        root: Option<ContextId>,
        parent: Option<ContextId>,
        payload: Payload,
    ) -> MoldResult<ContextId> {
        let id = ContextId(self.next_context_id);
        self.next_context_id = self
            .next_context_id
            .checked_add(1)
            .ok_or_else(|| MoldError::Exhausted("context ids exhausted".to_string()))?;

        self.contexts.insert(
            id,
            Context {
                id,
                kind,
                state: ContextState::Constructing,
                refcount: 1,
                root: root.unwrap_or(id),
                parent,
                payload,
            },
        );
        debug!(context = id.0, kind = kind.name(), "context begun");
        Ok(id)
    }

    // =========================================================================
    // BEGIN
    // =========================================================================

    /// Begin constructing a new mold.
    pub fn begin_mold(&mut self) -> MoldResult<ContextId> {
        self.allocate(ContextKind::Mold, None, None, Payload::empty(ContextKind::Mold))
    }

    /// Begin constructing a new config bound to `mold`.
    ///
    /// The config starts at version 1.0.0.
    pub fn begin_config(&mut self, mold: &Mold) -> MoldResult<ContextId> {
        let kind = self.get(mold.context())?.kind;
        if kind != ContextKind::Mold {
            return Err(MoldError::WrongContext(format!(
                "config must be bound to a MOLD, found {}",
                kind
            )));
        }
        self.begin_detached_config(Some(mold.context()))
    }

    pub(crate) fn begin_detached_config(
        &mut self,
        mold: Option<ContextId>,
    ) -> MoldResult<ContextId> {
        let payload = Payload::Config(ConfigData {
            mold,
            ..ConfigData::default()
        });
        self.allocate(ContextKind::Config, None, None, payload)
    }

    /// Begin constructing a child of `kind` under `parent`.
    pub fn begin(&mut self, parent: ContextId, kind: ContextKind) -> MoldResult<ContextId> {
        let capability = Capability::for_child(kind).ok_or_else(|| {
            MoldError::WrongContext(format!("{} contexts cannot have a parent", kind))
        })?;

        let parent_ctx = self.get(parent)?;
        let (parent_kind, parent_state, root) = (parent_ctx.kind, parent_ctx.state, parent_ctx.root);
        capability::check(parent_kind, self.root_kind(parent)?, capability)?;

        if parent_state != ContextState::Constructing {
            return Err(MoldError::InvalidContext(format!(
                "{} {} is finalized and accepts no children",
                parent_kind, parent.0
            )));
        }
        if self.depth(parent) >= MAX_NESTING_DEPTH {
            return Err(MoldError::InsufficientResources(format!(
                "nesting deeper than {} levels",
                MAX_NESTING_DEPTH
            )));
        }

        self.allocate(kind, Some(root), Some(parent), Payload::empty(kind))
    }

    /// Create a standalone, already finalized free-text context.
    pub fn free_text(&mut self, text: impl Into<String>) -> MoldResult<ContextId> {
        let id = self.allocate(
            ContextKind::FreeText,
            None,
            None,
            Payload::FreeText(Some(text.into())),
        )?;
        self.get_mut(id)?.state = ContextState::Active;
        Ok(id)
    }

    fn depth(&self, id: ContextId) -> usize {
        let mut depth = 0;
        let mut cursor = self.contexts.get(&id).and_then(|c| c.parent);
        while let Some(parent) = cursor {
            depth += 1;
            cursor = self.contexts.get(&parent).and_then(|c| c.parent);
        }
        depth
    }

    // =========================================================================
    // FINALIZE
    // =========================================================================

    /// Finalize a child context and attach it to its parent.
    pub fn finalize(&mut self, child: ContextId) -> MoldResult<()> {
        let ctx = self.get(child)?;
        let kind = ctx.kind;
        if kind.is_root() || kind == ContextKind::FreeText {
            return Err(MoldError::WrongContext(format!(
                "{} contexts are not finalized into a parent",
                kind
            )));
        }
        if ctx.state != ContextState::Constructing {
            return Err(MoldError::InvalidContext(format!(
                "{} {} is already finalized",
                kind, child.0
            )));
        }
        let parent = ctx.parent.ok_or_else(|| {
            MoldError::InvalidContext(format!("{} {} has lost its parent", kind, child.0))
        })?;
        let root = ctx.root;
        let root_kind = self.root_kind(child)?;
        let attachment = Self::validate(ctx, root_kind)?;

        let parent_ctx = self.get_mut(parent)?;
        let parent_kind = parent_ctx.kind;
        if parent_ctx.state != ContextState::Constructing {
            return Err(MoldError::InvalidContext(format!(
                "{} {} is finalized and accepts no children",
                parent_kind, parent.0
            )));
        }

        match attachment {
            Attachment::Element { name, window } => {
                let elements = parent_ctx.payload.elements_mut().ok_or_else(|| {
                    MoldError::BadContextObject(format!("{} has no element storage", parent_kind))
                })?;
                match (root_kind, kind) {
                    (ContextKind::Mold, _) => elements.insert_unique(name, window, child)?,
                    (_, ContextKind::Keyval) => {
                        elements.insert_unique(name, VersionWindow::ALWAYS, child)?
                    }
                    _ => elements.insert(name, VersionWindow::ALWAYS, child)?,
                }
            }
            Attachment::Restriction => match &mut parent_ctx.payload {
                Payload::Keyval(k) => {
                    k.restrictions
                        .try_reserve(1)
                        .map_err(|e| MoldError::NoMemory(e.to_string()))?;
                    k.restrictions.push(child);
                }
                _ => {
                    return Err(MoldError::BadContextObject(format!(
                        "restriction parent is a {}",
                        parent_kind
                    )));
                }
            },
            Attachment::Documentation => {
                let queue = parent_ctx.payload.documentation_mut().ok_or_else(|| {
                    MoldError::BadContextObject(format!(
                        "{} has no documentation queue",
                        parent_kind
                    ))
                })?;
                queue
                    .try_reserve(1)
                    .map_err(|e| MoldError::NoMemory(e.to_string()))?;
                queue.push(child);
            }
        }

        let stamp = self.latest_stamp(child)?;
        self.get_mut(child)?.state = ContextState::Active;
        if root_kind == ContextKind::Mold
            && let Payload::Mold(m) = &mut self.get_mut(root)?.payload
            && m.version.raise_to(stamp)
        {
            debug!(mold = root.0, version = %m.version, "mold version raised");
        }
        debug!(context = child.0, kind = kind.name(), "context finalized");
        Ok(())
    }

    /// Check a constructing child is complete and work out where it attaches.
    fn validate(ctx: &Context, root_kind: ContextKind) -> MoldResult<Attachment> {
        let incomplete = |what: &str| {
            MoldError::InvalidContext(format!("{} {} is missing {}", ctx.kind, ctx.id.0, what))
        };
        let named = |name: &Option<String>| -> MoldResult<String> {
            let name = name.clone().ok_or_else(|| incomplete("a name"))?;
            if name.is_empty() || name.len() > MAX_NAME_LENGTH {
                return Err(MoldError::InvalidContext(format!(
                    "{} {} has an invalid name",
                    ctx.kind, ctx.id.0
                )));
            }
            Ok(name)
        };
        let element_window = |window: VersionWindow| -> MoldResult<VersionWindow> {
            if root_kind == ContextKind::Mold && !window.is_well_formed() {
                return Err(MoldError::InvalidContext(format!(
                    "{} {} has an empty window {}",
                    ctx.kind, ctx.id.0, window
                )));
            }
            Ok(window)
        };

        match &ctx.payload {
            Payload::Section(s) => Ok(Attachment::Element {
                name: named(&s.name)?,
                window: element_window(s.window)?,
            }),
            Payload::Keyval(k) => Ok(Attachment::Element {
                name: named(&k.name)?,
                window: element_window(k.window)?,
            }),
            Payload::Documentation(d) => {
                d.text.as_ref().ok_or_else(|| incomplete("its text"))?;
                Ok(Attachment::Documentation)
            }
            Payload::Restriction(r) => {
                r.rule.as_ref().ok_or_else(|| incomplete("a rule"))?;
                Ok(Attachment::Restriction)
            }
            Payload::Mold(_) | Payload::Config(_) | Payload::FreeText(_) => {
                Err(MoldError::WrongContext(format!(
                    "{} contexts are not finalized into a parent",
                    ctx.kind
                )))
            }
        }
    }

    /// The latest version stamp carried by a context.
    fn latest_stamp(&self, id: ContextId) -> MoldResult<Version> {
        let ctx = self.get(id)?;
        let window_max = |w: VersionWindow| w.deprecated.unwrap_or(w.introduced).max(w.introduced);
        Ok(match &ctx.payload {
            Payload::Section(s) => window_max(s.window),
            Payload::Keyval(k) => k
                .defaults
                .iter()
                .map(|(v, _)| *v)
                .fold(window_max(k.window), Version::max),
            Payload::Restriction(r) => window_max(r.window),
            Payload::Documentation(d) => d.introduced,
            Payload::Mold(m) => m.version,
            Payload::Config(c) => c.version,
            Payload::FreeText(_) => Version::ZERO,
        })
    }

    /// Finalize a mold under construction and hand out its payload handle.
    pub fn finalize_mold(&mut self, id: ContextId) -> MoldResult<Mold> {
        self.finalize_root(id, ContextKind::Mold)?;
        Ok(Mold::new(id))
    }

    /// Finalize a config under construction and hand out its payload handle.
    pub fn finalize_config(&mut self, id: ContextId) -> MoldResult<Config> {
        self.finalize_root(id, ContextKind::Config)?;
        Ok(Config::new(id))
    }

    fn finalize_root(&mut self, id: ContextId, expected: ContextKind) -> MoldResult<()> {
        let ctx = self.get_mut(id)?;
        if ctx.kind != expected {
            return Err(MoldError::WrongContext(format!(
                "expected a {}, found {}",
                expected, ctx.kind
            )));
        }
        if ctx.state != ContextState::Constructing {
            return Err(MoldError::InvalidContext(format!(
                "{} {} is already finalized",
                ctx.kind, id.0
            )));
        }
        ctx.state = ContextState::Active;
        debug!(context = id.0, kind = expected.name(), "root finalized");
        Ok(())
    }

    // =========================================================================
    // REFERENCE COUNTING
    // =========================================================================

    /// Take an additional reference to `id`.
    pub fn acquire(&mut self, id: ContextId) -> MoldResult<ContextId> {
        let ctx = self.get_mut(id)?;
        ctx.refcount = ctx
            .refcount
            .checked_add(1)
            .ok_or_else(|| MoldError::Exhausted(format!("context {} refcount", id.0)))?;
        Ok(id)
    }

    /// Take a reference to the context behind a mold handle.
    pub fn mold_getcontext(&mut self, mold: &Mold) -> MoldResult<ContextId> {
        self.acquire(mold.context())
    }

    /// Take a reference to the context behind a config handle.
    pub fn config_getcontext(&mut self, config: &Config) -> MoldResult<ContextId> {
        self.acquire(config.context())
    }

    /// Release one reference. At zero the context and its owned subtree are torn down.
    pub fn destroy(&mut self, id: ContextId) -> MoldResult<()> {
        let ctx = self.get_mut(id)?;
        ctx.refcount = ctx.refcount.saturating_sub(1);
        if ctx.refcount == 0 {
            self.teardown(id);
        }
        Ok(())
    }

    /// Release the handle of a mold.
    pub fn mold_finished(&mut self, mold: Mold) -> MoldResult<()> {
        self.destroy(mold.context())
    }

    /// Release the handle of a config.
    pub fn config_finished(&mut self, config: Config) -> MoldResult<()> {
        self.destroy(config.context())
    }

    fn teardown(&mut self, id: ContextId) {
        let Some(mut ctx) = self.contexts.remove(&id) else {
            return;
        };
        ctx.state = ContextState::Destroyed;

        // Post-order: owned children go first.
        for child in ctx.payload.take_children() {
            self.release_owned(child);
        }
        if let Some(parent) = ctx.parent
            && let Some(parent_ctx) = self.contexts.get_mut(&parent)
        {
            parent_ctx.payload.detach(id);
        }
        debug!(context = id.0, kind = ctx.kind.name(), state = ?ctx.state, "context destroyed");
    }

    fn release_owned(&mut self, child: ContextId) {
        let Some(ctx) = self.contexts.get_mut(&child) else {
            return;
        };
        ctx.parent = None;
        ctx.refcount = ctx.refcount.saturating_sub(1);
        if ctx.refcount == 0 {
            self.teardown(child);
        }
    }

    /// Exchange the element storages of two configs, rebinding the moved children.
    pub(crate) fn swap_config_elements(&mut self, a: ContextId, b: ContextId) -> MoldResult<()> {
        for id in [a, b] {
            let kind = self.get(id)?.kind;
            if kind != ContextKind::Config {
                return Err(MoldError::WrongContext(format!(
                    "expected a CONFIG, found {}",
                    kind
                )));
            }
        }
        let mut moved = std::mem::take(self.config_elements_mut(a)?);
        std::mem::swap(self.config_elements_mut(b)?, &mut moved);
        *self.config_elements_mut(a)? = moved;

        self.rebind_subtree(a, a)?;
        self.rebind_subtree(b, b)
    }

    fn config_elements_mut(&mut self, id: ContextId) -> MoldResult<&mut ElementStorage<ContextId>> {
        match &mut self.get_mut(id)?.payload {
            Payload::Config(c) => Ok(&mut c.elements),
            _ => Err(MoldError::WrongContext(format!(
                "context {} is not a CONFIG",
                id.0
            ))),
        }
    }

    fn rebind_subtree(&mut self, parent: ContextId, root: ContextId) -> MoldResult<()> {
        let children: Vec<ContextId> = match &self.get(parent)?.payload {
            Payload::Config(c) => c.elements.iter().map(|e| *e.item()).collect(),
            Payload::Section(s) => s.elements.iter().map(|e| *e.item()).collect(),
            _ => Vec::new(),
        };
        for child in children {
            let ctx = self.get_mut(child)?;
            ctx.parent = Some(parent);
            ctx.root = root;
            self.rebind_subtree(child, root)?;
        }
        Ok(())
    }
}

/// Where a validated child goes in its parent.
enum Attachment {
    Element { name: String, window: VersionWindow },
    Restriction,
    Documentation,
}
