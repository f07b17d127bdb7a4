//! # Update Engine
//!
//! Migrates a config from its version to a target mold version.
//!
//! ```text
//! IDLE ──start──► IN_PROGRESS ──► DONE
//!                     │  ▲
//!                     ▼  │ resume
//!                 CONFLICT ──resolve──► RESOLVING
//! ```
//!
//! The walk visits every version stamp of the mold between the config's
//! version (exclusive) and the target (inclusive). At each step the elements
//! are visited in storage insertion order, recursing into every section
//! instance. All changes go to a private working copy; the original config
//! is only touched once, when the walk reaches DONE.

use crate::canonical::{self, CanonicalConfig, CanonicalKeyval, CanonicalMold, ConfigElement, MoldElement};
use crate::config::generate_elements;
use crate::context::{Config, ContextGraph, Payload};
use crate::primitives::MAX_NESTING_DEPTH;
use crate::restriction::{RestrictionEngine, Verdict};
use crate::storage::ElementStorage;
use crate::types::{ContextId, MoldError, MoldResult, Value, ValueType, Version};
use serde::Serialize;
use tracing::info;

// =============================================================================
// PUBLIC TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpdateState {
    Idle,
    InProgress,
    Conflict,
    Resolving,
    Done,
}

/// Why a keyval could not be carried forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConflictReason {
    /// The keyval replaces `from`, whose value is waiting to be placed.
    Renamed { from: String },
    /// The default changed and the value differs from the previous default.
    DefaultChanged,
    /// The value violates the restrictions active at the step.
    RestrictionViolated,
    /// The declared type changed.
    TypeChanged,
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictReason::Renamed { from } => write!(f, "renamed from '{}'", from),
            ConflictReason::DefaultChanged => f.write_str("default changed"),
            ConflictReason::RestrictionViolated => f.write_str("restriction violated"),
            ConflictReason::TypeChanged => f.write_str("type changed"),
        }
    }
}

/// The conflict an update is paused on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conflict {
    /// Dotted path of the keyval.
    pub path: String,
    pub name: String,
    /// The value carried so far.
    pub current: Option<Value>,
    /// What the mold prescribes at this step.
    pub suggestion: Option<Value>,
    /// The type a resolution must have.
    pub value_type: Option<ValueType>,
    /// The step the conflict arose at.
    pub version: Version,
    pub reason: ConflictReason,
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let show = |v: &Option<Value>| v.as_ref().map_or("<none>".to_string(), |v| v.to_string());
        write!(
            f,
            "{} at {} ({}): current {}, suggested {}",
            self.path,
            self.version,
            self.reason,
            show(&self.current),
            show(&self.suggestion)
        )
    }
}

// =============================================================================
// TASKS
// =============================================================================

/// Sections are addressed by (name, instance index) from the root down.
type SectionPath = Vec<(String, usize)>;

#[derive(Debug, Clone)]
enum Task {
    Introduce {
        path: SectionPath,
        element: ConfigElement,
    },
    Retire {
        path: SectionPath,
        name: String,
    },
    Carry {
        path: SectionPath,
        name: String,
        previous_default: Option<Value>,
        keyval: CanonicalKeyval,
    },
    Rename {
        path: SectionPath,
        from: String,
        keyval: CanonicalKeyval,
    },
}

impl Task {
    fn keyval(&self) -> Option<&CanonicalKeyval> {
        match self {
            Task::Carry { keyval, .. } | Task::Rename { keyval, .. } => Some(keyval),
            Task::Introduce { .. } | Task::Retire { .. } => None,
        }
    }
}

fn dotted(path: &[(String, usize)], name: &str) -> String {
    path.iter()
        .map(|(section, _)| section.as_str())
        .chain(std::iter::once(name))
        .collect::<Vec<_>>()
        .join(".")
}

// =============================================================================
// UPDATE
// =============================================================================

/// A resumable migration of one config.
#[derive(Debug)]
pub struct Update {
    config: ContextId,
    mold: CanonicalMold,
    working: CanonicalConfig,
    from: Version,
    target: Version,
    steps: Vec<Version>,
    step: usize,
    tasks: Option<Vec<Task>>,
    task: usize,
    state: UpdateState,
    conflict: Option<Conflict>,
    resolution: Option<Value>,
}

impl Update {
    /// Start migrating `config` to `target` and walk until DONE or the first conflict.
    pub fn start(graph: &mut ContextGraph, config: &Config, target: Version) -> MoldResult<Self> {
        let lost =
            |what: &str, e: MoldError| MoldError::InvalidArgument(format!("{} is unreachable: {}", what, e));
        let working =
            CanonicalConfig::from_graph(graph, config).map_err(|e| lost("config", e))?;
        let mold_id = graph
            .config_mold(config)
            .map_err(|e| lost("mold", e))?;
        let mold = CanonicalMold::from_context(graph, mold_id).map_err(|e| lost("mold", e))?;

        let from = working.version;
        if from > target {
            return Err(MoldError::ConflictingSemver(format!(
                "config at {} cannot move back to {}",
                from, target
            )));
        }
        if from == target {
            return Err(MoldError::NoCanDo(format!("config already at {}", target)));
        }
        if target > mold.version {
            return Err(MoldError::ConflictingSemver(format!(
                "target {} exceeds mold version {}",
                target, mold.version
            )));
        }

        let mut steps: Vec<Version> = mold
            .version_stamps()
            .into_iter()
            .filter(|v| *v > from && *v < target)
            .collect();
        steps.push(target);
        info!(
            config = config.context().0,
            from = %from,
            target = %target,
            steps = steps.len(),
            "update started"
        );

        let mut update = Self {
            config: config.context(),
            mold,
            working,
            from,
            target,
            steps,
            step: 0,
            tasks: None,
            task: 0,
            state: UpdateState::Idle,
            conflict: None,
            resolution: None,
        };
        update.advance(graph)?;
        Ok(update)
    }

    #[must_use]
    pub fn state(&self) -> UpdateState {
        self.state
    }

    #[must_use]
    pub fn target(&self) -> Version {
        self.target
    }

    /// The conflict the update is paused on. Only valid in CONFLICT.
    pub fn conflict(&self) -> MoldResult<&Conflict> {
        match (&self.state, &self.conflict) {
            (UpdateState::Conflict, Some(conflict)) => Ok(conflict),
            _ => Err(MoldError::InvalidArgument(format!(
                "no pending conflict in state {:?}",
                self.state
            ))),
        }
    }

    /// Record the value chosen for the pending conflict.
    pub fn resolve(&mut self, value: Value) -> MoldResult<()> {
        match self.state {
            UpdateState::Conflict => {}
            UpdateState::Resolving => {
                return Err(MoldError::InvalidArgument(
                    "conflict already resolved; continue the update first".to_string(),
                ));
            }
            state => {
                return Err(MoldError::InvalidArgument(format!(
                    "no pending conflict in state {:?}",
                    state
                )));
            }
        }
        let keyval = self
            .tasks
            .as_ref()
            .and_then(|tasks| tasks.get(self.task))
            .and_then(Task::keyval)
            .ok_or_else(|| MoldError::InternalError("conflict without a keyval task".to_string()))?;
        if let Some(expected) = keyval.value_type
            && value.value_type() != expected
        {
            return Err(MoldError::InvalidArgument(format!(
                "resolution must be a {} value, got {}",
                expected,
                value.value_type()
            )));
        }
        // The value must hold at the step the conflict was raised in.
        let version = self.conflict.as_ref().map_or(self.target, |c| c.version);
        match RestrictionEngine::evaluate(&keyval.restriction_entries(), &value, version)? {
            Verdict::Satisfied => {}
            verdict => {
                return Err(MoldError::InvalidArgument(format!(
                    "resolution '{}' violates the restrictions of '{}' at {} ({:?})",
                    value, keyval.name, version, verdict
                )));
            }
        }
        self.resolution = Some(value);
        self.state = UpdateState::Resolving;
        Ok(())
    }

    /// Apply the recorded resolution and walk on.
    pub fn resume(&mut self, graph: &mut ContextGraph) -> MoldResult<UpdateState> {
        if self.state != UpdateState::Resolving {
            return Err(MoldError::InvalidArgument(format!(
                "nothing to continue in state {:?}",
                self.state
            )));
        }
        // Released configs fail here rather than after the walk.
        graph.get(self.config)?;
        self.state = UpdateState::InProgress;
        self.conflict = None;
        let value = self
            .resolution
            .take()
            .ok_or_else(|| MoldError::InternalError("resolution vanished".to_string()))?;
        let tasks = self
            .tasks
            .take()
            .ok_or_else(|| MoldError::InternalError("task list vanished".to_string()))?;
        let task = tasks
            .get(self.task)
            .ok_or_else(|| MoldError::InternalError("task cursor out of range".to_string()))?;
        self.place_resolution(task, value)?;
        self.task += 1;
        self.tasks = Some(tasks);
        self.advance(graph)
    }

    /// Release the update. Anything but DONE is abandoned; the config stays as it was.
    pub fn finish(self) -> UpdateState {
        if self.state != UpdateState::Done {
            info!(
                config = self.config.0,
                from = %self.from,
                state = ?self.state,
                "update abandoned"
            );
        }
        self.state
    }

    // =========================================================================
    // WALK
    // =========================================================================

    fn advance(&mut self, graph: &mut ContextGraph) -> MoldResult<UpdateState> {
        self.state = UpdateState::InProgress;
        if self.walk()? {
            self.commit(graph)?;
            self.state = UpdateState::Done;
            info!(config = self.config.0, version = %self.target, "update done");
        } else {
            self.state = UpdateState::Conflict;
            if let Some(conflict) = &self.conflict {
                info!(config = self.config.0, conflict = %conflict, "update paused");
            }
        }
        Ok(self.state)
    }

    /// Run tasks until a conflict (`false`) or the last step completes (`true`).
    fn walk(&mut self) -> MoldResult<bool> {
        while let Some(&version) = self.steps.get(self.step) {
            let previous = match self.step.checked_sub(1) {
                Some(i) => self.steps.get(i).copied().unwrap_or(self.from),
                None => self.from,
            };
            let tasks = match self.tasks.take() {
                Some(tasks) => tasks,
                None => self.plan(previous, version)?,
            };
            while let Some(task) = tasks.get(self.task) {
                if let Some(conflict) = self.apply(task, version)? {
                    self.conflict = Some(conflict);
                    self.tasks = Some(tasks);
                    return Ok(false);
                }
                self.task += 1;
            }
            self.working.version = version;
            self.step += 1;
            self.task = 0;
        }
        Ok(true)
    }

    fn plan(&self, previous: Version, version: Version) -> MoldResult<Vec<Task>> {
        let mut tasks = Vec::new();
        plan_container(
            &self.mold.elements,
            &self.mold.elements,
            &self.working.elements,
            Step { previous, version },
            &Vec::new(),
            &mut tasks,
        )?;
        Ok(tasks)
    }

    fn apply(&mut self, task: &Task, version: Version) -> MoldResult<Option<Conflict>> {
        match task {
            Task::Introduce { path, element } => {
                container_mut(&mut self.working.elements, path)?.push(element.clone());
                Ok(None)
            }
            Task::Retire { path, name } => {
                container_mut(&mut self.working.elements, path)?.retain(|e| e.name() != name);
                Ok(None)
            }
            Task::Carry {
                path,
                name,
                previous_default,
                keyval,
            } => {
                let container = container_mut(&mut self.working.elements, path)?;
                let Some(slot) = keyval_slot(container, name) else {
                    return Ok(None);
                };
                let suggestion = keyval.default_at(version).cloned();
                let reason = carry(slot, previous_default.as_ref(), suggestion.as_ref(), keyval, version)?;
                Ok(reason.map(|reason| Conflict {
                    path: dotted(path, name),
                    name: name.clone(),
                    current: slot.clone(),
                    suggestion,
                    value_type: keyval.value_type,
                    version,
                    reason,
                }))
            }
            Task::Rename { path, from, keyval } => {
                let container = container_mut(&mut self.working.elements, path)?;
                let current = keyval_slot(container, from).and_then(|slot| slot.clone());
                Ok(Some(Conflict {
                    path: dotted(path, &keyval.name),
                    name: keyval.name.clone(),
                    current,
                    suggestion: keyval.default_at(version).cloned(),
                    value_type: keyval.value_type,
                    version,
                    reason: ConflictReason::Renamed { from: from.clone() },
                }))
            }
        }
    }

    fn place_resolution(&mut self, task: &Task, value: Value) -> MoldResult<()> {
        let vanished =
            |name: &str| MoldError::InternalError(format!("keyval '{}' vanished from the working copy", name));
        match task {
            Task::Carry { path, name, .. } => {
                let container = container_mut(&mut self.working.elements, path)?;
                let slot = keyval_slot(container, name).ok_or_else(|| vanished(name))?;
                *slot = Some(value);
            }
            Task::Rename { path, from, keyval } => {
                let container = container_mut(&mut self.working.elements, path)?;
                let position = container
                    .iter()
                    .position(|e| matches!(e, ConfigElement::Keyval { name, .. } if name == from))
                    .ok_or_else(|| vanished(from))?;
                container[position] = ConfigElement::Keyval {
                    name: keyval.name.clone(),
                    value: Some(value),
                };
            }
            Task::Introduce { .. } | Task::Retire { .. } => {
                return Err(MoldError::InternalError(
                    "resolution recorded for a task without conflicts".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Swap the working copy into the original config.
    ///
    /// The new children are built under a staging config first; only when
    /// that succeeded are the storages exchanged.
    fn commit(&mut self, graph: &mut ContextGraph) -> MoldResult<()> {
        let mold = match graph.get(self.config)?.payload() {
            Payload::Config(c) => c.mold(),
            _ => None,
        };
        let staging = graph.begin_detached_config(mold)?;
        let staged = canonical::build_config_elements(graph, staging, &self.working.elements)
            .and_then(|()| graph.swap_config_elements(self.config, staging));
        if let Err(e) = staged {
            let _ = graph.destroy(staging);
            return Err(e);
        }
        graph.commit_config_version(self.config, self.target)?;
        // The staging config now owns the old children.
        graph.destroy(staging)
    }
}

// =============================================================================
// PLANNING
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Step {
    previous: Version,
    version: Version,
}

fn plan_container(
    before: &[MoldElement],
    after: &[MoldElement],
    present: &[ConfigElement],
    step: Step,
    path: &SectionPath,
    tasks: &mut Vec<Task>,
) -> MoldResult<()> {
    if path.len() > MAX_NESTING_DEPTH {
        return Err(MoldError::InsufficientResources(
            "sections nest too deep to migrate".to_string(),
        ));
    }
    let old_index = canonical::index(before);
    let new_index = canonical::index(after);
    let mut names = new_index.names();
    for name in old_index.names() {
        if !names.contains(&name) {
            names.push(name);
        }
    }

    for name in names {
        let old = old_index.find_at(name, step.previous).copied();
        let new = new_index.find_at(name, step.version).copied();
        match new {
            None => {
                if old.is_some()
                    && present.iter().any(|e| e.name() == name)
                    && !is_rename_source(&new_index, name, step.version)
                {
                    tasks.push(Task::Retire {
                        path: path.clone(),
                        name: name.to_string(),
                    });
                }
            }
            Some(MoldElement::Keyval(keyval)) => {
                if keyval_value(present, name).is_some() {
                    let previous_default = match old {
                        Some(MoldElement::Keyval(old)) => old.default_at(step.previous).cloned(),
                        _ => None,
                    };
                    tasks.push(Task::Carry {
                        path: path.clone(),
                        name: name.to_string(),
                        previous_default,
                        keyval: keyval.clone(),
                    });
                } else if let Some(from) = keyval
                    .renamed_from
                    .as_deref()
                    .filter(|from| keyval_value(present, from).is_some())
                {
                    tasks.push(Task::Rename {
                        path: path.clone(),
                        from: from.to_string(),
                        keyval: keyval.clone(),
                    });
                } else {
                    let value = keyval.default_at(step.version).cloned().ok_or_else(|| {
                        MoldError::InvalidContext(format!(
                            "keyval '{}' has no default at {}",
                            name, step.version
                        ))
                    })?;
                    tasks.push(Task::Introduce {
                        path: path.clone(),
                        element: ConfigElement::Keyval {
                            name: name.to_string(),
                            value: Some(value),
                        },
                    });
                }
            }
            Some(MoldElement::Section(section)) => {
                let before_children: &[MoldElement] = match old {
                    Some(MoldElement::Section(old)) => &old.elements,
                    _ => &[],
                };
                let mut instances = section_instances(present, name).peekable();
                if instances.peek().is_none() {
                    tasks.push(Task::Introduce {
                        path: path.clone(),
                        element: ConfigElement::Section {
                            name: name.to_string(),
                            elements: generate_elements(&section.elements, step.version)?,
                        },
                    });
                }
                for (index, children) in instances.enumerate() {
                    let mut child_path = path.clone();
                    child_path.push((name.to_string(), index));
                    plan_container(
                        before_children,
                        &section.elements,
                        children,
                        step,
                        &child_path,
                        tasks,
                    )?;
                }
            }
        }
    }
    Ok(())
}

fn is_rename_source(index: &ElementStorage<&MoldElement>, name: &str, version: Version) -> bool {
    index.iter().any(|e| match e.item() {
        MoldElement::Keyval(k) => {
            k.window.contains(version) && k.renamed_from.as_deref() == Some(name)
        }
        MoldElement::Section(_) => false,
    })
}

/// `Some(value slot)` when `present` holds a keyval named `name`.
fn keyval_value<'a>(present: &'a [ConfigElement], name: &str) -> Option<&'a Option<Value>> {
    present.iter().find_map(|e| match e {
        ConfigElement::Keyval { name: n, value } if n == name => Some(value),
        _ => None,
    })
}

fn section_instances<'a>(
    present: &'a [ConfigElement],
    name: &'a str,
) -> impl Iterator<Item = &'a [ConfigElement]> + 'a {
    present.iter().filter_map(move |e| match e {
        ConfigElement::Section { name: n, elements } if n == name => Some(elements.as_slice()),
        _ => None,
    })
}

// =============================================================================
// WORKING COPY ACCESS
// =============================================================================

fn container_mut<'a>(
    elements: &'a mut Vec<ConfigElement>,
    path: &[(String, usize)],
) -> MoldResult<&'a mut Vec<ConfigElement>> {
    let mut container = elements;
    for (name, index) in path {
        let current = container;
        container = current
            .iter_mut()
            .filter_map(|e| match e {
                ConfigElement::Section { name: n, elements } if n.as_str() == name.as_str() => {
                    Some(elements)
                }
                _ => None,
            })
            .nth(*index)
            .ok_or_else(|| {
                MoldError::InternalError(format!("section '{}' #{} vanished", name, index))
            })?;
    }
    Ok(container)
}

fn keyval_slot<'a>(container: &'a mut [ConfigElement], name: &str) -> Option<&'a mut Option<Value>> {
    container.iter_mut().find_map(|e| match e {
        ConfigElement::Keyval { name: n, value } if n.as_str() == name => Some(value),
        _ => None,
    })
}

/// Carry one value across a step. Returns the reason when it cannot be carried.
fn carry(
    slot: &mut Option<Value>,
    previous_default: Option<&Value>,
    default: Option<&Value>,
    keyval: &CanonicalKeyval,
    version: Version,
) -> MoldResult<Option<ConflictReason>> {
    let Some(current) = slot.as_ref() else {
        // A keyval without a value takes the default.
        *slot = default.cloned();
        return Ok(None);
    };
    if let Some(expected) = keyval.value_type
        && current.value_type() != expected
    {
        return Ok(Some(ConflictReason::TypeChanged));
    }
    if let (Some(old), Some(new)) = (previous_default, default)
        && old != new
    {
        if current == old {
            *slot = Some(new.clone());
        } else {
            return Ok(Some(ConflictReason::DefaultChanged));
        }
    }
    let Some(current) = slot.as_ref() else {
        return Ok(None);
    };
    match RestrictionEngine::evaluate(&keyval.restriction_entries(), current, version)? {
        Verdict::Satisfied => Ok(None),
        Verdict::NotAllowed | Verdict::OutOfRange => Ok(Some(ConflictReason::RestrictionViolated)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::CanonicalDefault;
    use crate::restriction::RestrictionRule;
    use crate::types::VersionWindow;

    const V1: Version = Version::new(1, 0, 0);
    const V2: Version = Version::new(2, 0, 0);

    fn keyval(name: &str, window: VersionWindow, defaults: &[(Version, i64)]) -> CanonicalKeyval {
        CanonicalKeyval {
            name: name.to_string(),
            window,
            value_type: Some(ValueType::Integer),
            defaults: defaults
                .iter()
                .map(|(introduced, value)| CanonicalDefault {
                    introduced: *introduced,
                    value: Value::Integer(*value),
                })
                .collect(),
            restrictions: Vec::new(),
            documentation: Vec::new(),
            renamed_from: None,
        }
    }

    fn build(
        graph: &mut ContextGraph,
        elements: Vec<MoldElement>,
        config: Vec<ConfigElement>,
    ) -> Config {
        let mold = CanonicalMold {
            version: V2,
            documentation: Vec::new(),
            elements,
        }
        .into_graph(graph)
        .expect("mold");
        CanonicalConfig {
            version: V1,
            elements: config,
        }
        .into_graph(graph, &mold)
        .expect("config")
    }

    fn int(name: &str, value: i64) -> ConfigElement {
        ConfigElement::Keyval {
            name: name.to_string(),
            value: Some(Value::Integer(value)),
        }
    }

    #[test]
    fn untouched_default_follows_silently() {
        let mut graph = ContextGraph::new();
        let config = build(
            &mut graph,
            vec![MoldElement::Keyval(keyval(
                "retries",
                VersionWindow::since(V1),
                &[(V1, 3), (V2, 5)],
            ))],
            vec![int("retries", 3)],
        );
        let update = Update::start(&mut graph, &config, V2).expect("start");
        assert_eq!(update.state(), UpdateState::Done);
        assert_eq!(update.finish(), UpdateState::Done);

        let after = CanonicalConfig::from_graph(&graph, &config).expect("read");
        assert_eq!(after.version, V2);
        assert_eq!(after.value("retries"), Some(&Value::Integer(5)));
    }

    #[test]
    fn customized_value_conflicts_on_default_change() {
        let mut graph = ContextGraph::new();
        let config = build(
            &mut graph,
            vec![MoldElement::Keyval(keyval(
                "retries",
                VersionWindow::since(V1),
                &[(V1, 3), (V2, 5)],
            ))],
            vec![int("retries", 7)],
        );
        let mut update = Update::start(&mut graph, &config, V2).expect("start");
        let conflict = update.conflict().expect("conflict").clone();
        assert_eq!(conflict.reason, ConflictReason::DefaultChanged);
        assert_eq!(conflict.current, Some(Value::Integer(7)));
        assert_eq!(conflict.suggestion, Some(Value::Integer(5)));

        update.resolve(Value::Integer(7)).expect("keep");
        assert_eq!(update.resume(&mut graph).expect("resume"), UpdateState::Done);
        let after = CanonicalConfig::from_graph(&graph, &config).expect("read");
        assert_eq!(after.value("retries"), Some(&Value::Integer(7)));
    }

    #[test]
    fn introduced_and_retired_elements() {
        let mut graph = ContextGraph::new();
        let config = build(
            &mut graph,
            vec![
                MoldElement::Keyval(keyval("legacy", VersionWindow::new(V1, Some(V2)), &[(V1, 1)])),
                MoldElement::Keyval(keyval("fresh", VersionWindow::since(V2), &[(V2, 9)])),
            ],
            vec![int("legacy", 1)],
        );
        Update::start(&mut graph, &config, V2).expect("start").finish();

        let after = CanonicalConfig::from_graph(&graph, &config).expect("read");
        assert_eq!(after.value("legacy"), None);
        assert_eq!(after.value("fresh"), Some(&Value::Integer(9)));
    }

    #[test]
    fn new_restriction_conflicts() {
        let mut graph = ContextGraph::new();
        let mut limit = keyval("limit", VersionWindow::since(V1), &[(V1, 10)]);
        limit.restrictions.push(crate::canonical::CanonicalRestriction {
            window: VersionWindow::since(V2),
            rule: RestrictionRule::Range { min: 0.0, max: 50.0 },
            documentation: Vec::new(),
        });
        let config = build(
            &mut graph,
            vec![MoldElement::Keyval(limit)],
            vec![int("limit", 80)],
        );
        let mut update = Update::start(&mut graph, &config, V2).expect("start");
        assert_eq!(
            update.conflict().expect("conflict").reason,
            ConflictReason::RestrictionViolated
        );

        let err = update
            .resolve(Value::String("lots".to_string()))
            .expect_err("wrong type");
        assert!(matches!(err, MoldError::InvalidArgument(_)));
        update.resolve(Value::Integer(50)).expect("resolve");
        let err = update.resolve(Value::Integer(40)).expect_err("twice");
        assert!(matches!(err, MoldError::InvalidArgument(_)));
        assert!(update.conflict().is_err());
        update.resume(&mut graph).expect("resume");
        assert_eq!(update.state(), UpdateState::Done);
    }

    fn limited(graph: &mut ContextGraph, current: i64) -> Config {
        let mut limit = keyval("limit", VersionWindow::since(V1), &[(V1, 10)]);
        limit.restrictions.push(crate::canonical::CanonicalRestriction {
            window: VersionWindow::since(V2),
            rule: RestrictionRule::Range { min: 0.0, max: 50.0 },
            documentation: Vec::new(),
        });
        build(graph, vec![MoldElement::Keyval(limit)], vec![int("limit", current)])
    }

    #[test]
    fn resolution_outside_restrictions_is_refused() {
        let mut graph = ContextGraph::new();
        let config = limited(&mut graph, 80);
        let before = CanonicalConfig::from_graph(&graph, &config).expect("read");
        let mut update = Update::start(&mut graph, &config, V2).expect("start");

        let err = update.resolve(Value::Integer(999)).expect_err("out of range");
        assert!(matches!(err, MoldError::InvalidArgument(_)));
        assert_eq!(update.state(), UpdateState::Conflict);
        assert_eq!(
            update.conflict().expect("still pending").reason,
            ConflictReason::RestrictionViolated
        );
        assert!(matches!(
            update.resume(&mut graph),
            Err(MoldError::InvalidArgument(_))
        ));
        assert_eq!(update.finish(), UpdateState::Conflict);
        assert_eq!(
            CanonicalConfig::from_graph(&graph, &config).expect("read"),
            before
        );
    }

    #[test]
    fn released_config_fails_before_walking() {
        let mut graph = ContextGraph::new();
        let config = limited(&mut graph, 80);
        let id = config.context();
        let mut update = Update::start(&mut graph, &config, V2).expect("start");
        update.resolve(Value::Integer(20)).expect("resolve");

        graph.config_finished(config).expect("release");
        assert!(matches!(
            update.resume(&mut graph),
            Err(MoldError::DestroyedContext(_))
        ));
        assert_eq!(update.state(), UpdateState::Resolving);
        assert!(matches!(graph.state(id), Err(MoldError::DestroyedContext(_))));
    }

    #[test]
    fn sections_are_walked_per_instance() {
        let mut graph = ContextGraph::new();
        let listener = MoldElement::Section(crate::canonical::CanonicalSection {
            name: "listener".to_string(),
            window: VersionWindow::since(V1),
            documentation: Vec::new(),
            elements: vec![
                MoldElement::Keyval(keyval("port", VersionWindow::since(V1), &[(V1, 80)])),
                MoldElement::Keyval(keyval("backlog", VersionWindow::since(V2), &[(V2, 128)])),
            ],
        });
        let instance = |port| ConfigElement::Section {
            name: "listener".to_string(),
            elements: vec![int("port", port)],
        };
        let config = build(&mut graph, vec![listener], vec![instance(80), instance(443)]);
        Update::start(&mut graph, &config, V2).expect("start").finish();

        let after = CanonicalConfig::from_graph(&graph, &config).expect("read");
        for element in &after.elements {
            match element {
                ConfigElement::Section { elements, .. } => {
                    assert_eq!(elements.len(), 2);
                    assert_eq!(elements[1], int("backlog", 128));
                }
                ConfigElement::Keyval { .. } => unreachable!(),
            }
        }
    }

    #[test]
    fn steps_include_intermediate_stamps() {
        let mut graph = ContextGraph::new();
        let mid = Version::new(1, 5, 0);
        let config = build(
            &mut graph,
            vec![MoldElement::Keyval(keyval(
                "retries",
                VersionWindow::since(V1),
                &[(V1, 3), (mid, 4), (V2, 5)],
            ))],
            vec![int("retries", 3)],
        );
        let update = Update::start(&mut graph, &config, V2).expect("start");
        assert_eq!(update.steps, vec![mid, V2]);
        assert_eq!(update.state(), UpdateState::Done);
        let after = CanonicalConfig::from_graph(&graph, &config).expect("read");
        assert_eq!(after.value("retries"), Some(&Value::Integer(5)));
    }
}
