//! # moldwork-core
//!
//! Versioned configuration schemas ("molds") and the configs written
//! against them.
//!
//! A mold declares sections and keyvals, each with the version window in
//! which it applies, typed defaults that may change from one version to the
//! next, and restrictions (allowed values, numeric ranges) scoped to their
//! own windows. A config is an instance of a mold at one version. The core
//! verifies configs, generates them from defaults, and migrates them to a
//! newer mold version, pausing on every value it cannot carry forward
//! unambiguously.
//!
//! ## Architectural Constraints
//!
//! - Every domain object is a reference-counted node of one [`ContextGraph`]
//! - No async, no network, no internal locking
//! - The core performs no I/O of its own; stores plug in through [`IoPlugin`]
//! - Plugin registries belong to an [`Instance`], never to the process

// =============================================================================
// MODULES
// =============================================================================

pub mod canonical;
pub mod config;
pub mod context;
pub mod formats;
pub mod instance;
pub mod mold;
pub mod plugin;
pub mod primitives;
pub mod restriction;
pub mod storage;
pub mod types;
pub mod update;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    ContextId, ContextKind, ContextState, MoldError, MoldResult, Status, Value, ValueType,
    Version, VersionWindow,
};

// =============================================================================
// RE-EXPORTS: Object Model
// =============================================================================

pub use context::{Capability, Config, Context, ContextGraph, Mold, Payload};
pub use storage::{Element, ElementStorage};

// =============================================================================
// RE-EXPORTS: Validation & Migration
// =============================================================================

pub use canonical::{
    CanonicalConfig, CanonicalDefault, CanonicalDocumentation, CanonicalKeyval, CanonicalMold,
    CanonicalRestriction, CanonicalSection, ConfigElement, MoldElement,
};
pub use config::{Diagnostic, VerifyReport, generate_config, verify_config};
pub use mold::verify_mold;
pub use restriction::{
    ActiveRestrictions, RestrictionEngine, RestrictionEntry, RestrictionRule, Verdict,
};
pub use update::{Conflict, ConflictReason, Update, UpdateState};

// =============================================================================
// RE-EXPORTS: I/O
// =============================================================================

pub use formats::{
    PayloadKind, PersistenceHeader, config_from_bytes, config_to_bytes, mold_from_bytes,
    mold_to_bytes,
};
pub use instance::Instance;
pub use plugin::{EntryRecord, IoPlugin, JsonDirectoryPlugin, PluginDescriptor, RedbStorePlugin};
