//! # Context Object Model
//!
//! Every domain object (mold, config, section, keyval, documentation,
//! restriction, free text) is one tagged [`Context`] node in a
//! [`ContextGraph`] arena, sharing a single lifecycle:
//!
//! ```text
//! begin ──► CONSTRUCTING ──finalize──► ACTIVE ──destroy (refcount 0)──► DESTROYED
//! ```
//!
//! Operations are dispatched through a static kind -> capability table
//! (see [`capabilities`]) before any payload is touched.

mod capability;
mod graph;
mod ops;

pub use capability::{Capability, capabilities, required_root};
pub use graph::{
    ConfigData, Context, ContextGraph, DocumentationData, KeyvalData, MoldData, Payload,
    RestrictionData, SectionData,
};

use crate::types::ContextId;

/// Handle owning one reference to a finalized mold.
///
/// Released with [`ContextGraph::mold_finished`].
#[derive(Debug, PartialEq, Eq)]
pub struct Mold {
    context: ContextId,
}

impl Mold {
    pub(crate) fn new(context: ContextId) -> Self {
        Self { context }
    }

    #[must_use]
    pub fn context(&self) -> ContextId {
        self.context
    }
}

/// Handle owning one reference to a finalized config.
///
/// Released with [`ContextGraph::config_finished`].
#[derive(Debug, PartialEq, Eq)]
pub struct Config {
    context: ContextId,
}

impl Config {
    pub(crate) fn new(context: ContextId) -> Self {
        Self { context }
    }

    #[must_use]
    pub fn context(&self) -> ContextId {
        self.context
    }
}
