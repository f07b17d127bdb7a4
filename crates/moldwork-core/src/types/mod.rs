//! # Core Type Definitions
//!
//! This module contains the core types shared by every Moldwork component:
//! - Context identifiers, kinds and lifecycle states (`ContextId`, `ContextKind`, `ContextState`)
//! - Semantic versions and validity windows (`Version`, `VersionWindow`)
//! - Scalar values (`Value`, `ValueType`)
//! - The status vocabulary and error type (`Status`, `MoldError`)
//!
//! ## Determinism Guarantees
//!
//! Identifiers and versions implement `Ord` so that every map in the crate
//! can be a `BTreeMap` and every traversal has a reproducible order.

mod value;
mod version;

pub use value::{Value, ValueType};
pub use version::{Version, VersionWindow};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// CONTEXT IDENTIFIERS
// =============================================================================

/// Identifier of a context inside a [`ContextGraph`](crate::ContextGraph).
///
/// Ids are never reused: an id below the graph's allocation counter that no
/// longer resolves belongs to a destroyed context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContextId(pub u64);

/// The kind tag carried by every context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ContextKind {
    Config,
    Mold,
    Section,
    Keyval,
    Documentation,
    Restriction,
    FreeText,
}

impl ContextKind {
    /// Human readable kind name, used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ContextKind::Config => "CONFIG",
            ContextKind::Mold => "MOLD",
            ContextKind::Section => "SECTION",
            ContextKind::Keyval => "KEYVAL",
            ContextKind::Documentation => "DOCUMENTATION",
            ContextKind::Restriction => "RESTRICTION",
            ContextKind::FreeText => "FREE_TEXT",
        }
    }

    /// Whether contexts of this kind are roots of an entity graph.
    #[must_use]
    pub fn is_root(&self) -> bool {
        matches!(self, ContextKind::Config | ContextKind::Mold)
    }
}

impl std::fmt::Display for ContextKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle state of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ContextState {
    /// Created by a `begin` operation; attributes may still change.
    Constructing,
    /// Finalized and owned by its parent (or by a payload handle for roots).
    Active,
    /// Torn down. Only observable while teardown is running.
    Destroyed,
}

// =============================================================================
// STATUS VOCABULARY
// =============================================================================

/// Status codes shared by the core and by I/O plugins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Status {
    Ok,
    InvalidArgument,
    NoCanDo,
    WrongContext,
    InvalidContext,
    DestroyedContext,
    BadContextObject,
    NoMemory,
    InternalError,
    InsufficientResources,
    Exists,
    ConflictingSemver,
    Conflict,
    Exhausted,
    /// Sentinel. Never returned by any operation.
    Unknown,
}

impl Status {
    /// Stable string form of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::InvalidArgument => "INVALID_ARGUMENT",
            Status::NoCanDo => "NO_CAN_DO",
            Status::WrongContext => "WRONG_CONTEXT",
            Status::InvalidContext => "INVALID_CONTEXT",
            Status::DestroyedContext => "DESTROYED_CONTEXT",
            Status::BadContextObject => "BAD_CONTEXT_OBJECT",
            Status::NoMemory => "NO_MEMORY",
            Status::InternalError => "INTERNAL_ERROR",
            Status::InsufficientResources => "INSUFFICIENT_RESOURCES",
            Status::Exists => "EXISTS",
            Status::ConflictingSemver => "CONFLICTING_SEMVER",
            Status::Conflict => "CONFLICT",
            Status::Exhausted => "EXHAUSTED",
            Status::Unknown => "UNKNOWN",
        }
    }

    /// Caller errors are deterministic misuse and are never retried.
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Status::InvalidArgument | Status::WrongContext | Status::NoCanDo
        )
    }

    /// Data errors are recoverable by caller action.
    #[must_use]
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Status::ConflictingSemver | Status::Conflict | Status::Exists | Status::Exhausted
        )
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors returned by every fallible Moldwork operation.
///
/// - One variant per non-OK [`Status`], each carrying a diagnostic message
/// - Use `Result<T, MoldError>` for fallible operations
/// - The core never panics; failures are reported, never swallowed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoldError {
    /// The operation was invoked with invalid arguments.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The context lacks the capability for the requested operation.
    #[error("no can do: {0}")]
    NoCanDo(String),

    /// The operation does not support a context of this kind.
    #[error("wrong context: {0}")]
    WrongContext(String),

    /// The context is in a state that does not allow the operation.
    #[error("invalid context: {0}")]
    InvalidContext(String),

    /// The context has been destroyed.
    #[error("destroyed context: {0}")]
    DestroyedContext(String),

    /// The context object is internally inconsistent.
    #[error("bad context object: {0}")]
    BadContextObject(String),

    /// An allocation failed.
    #[error("no memory: {0}")]
    NoMemory(String),

    /// An internal invariant was broken.
    #[error("internal error: {0}")]
    InternalError(String),

    /// Resources for the operation could not be acquired.
    #[error("insufficient resources: {0}")]
    InsufficientResources(String),

    /// The resource already exists.
    #[error("exists: {0}")]
    Exists(String),

    /// The operation results in conflicting semantic versions.
    #[error("conflicting semver: {0}")]
    ConflictingSemver(String),

    /// A conflict requires caller resolution.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The requested resource is exhausted.
    #[error("exhausted: {0}")]
    Exhausted(String),
}

impl MoldError {
    /// The status code corresponding to this error.
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            MoldError::InvalidArgument(_) => Status::InvalidArgument,
            MoldError::NoCanDo(_) => Status::NoCanDo,
            MoldError::WrongContext(_) => Status::WrongContext,
            MoldError::InvalidContext(_) => Status::InvalidContext,
            MoldError::DestroyedContext(_) => Status::DestroyedContext,
            MoldError::BadContextObject(_) => Status::BadContextObject,
            MoldError::NoMemory(_) => Status::NoMemory,
            MoldError::InternalError(_) => Status::InternalError,
            MoldError::InsufficientResources(_) => Status::InsufficientResources,
            MoldError::Exists(_) => Status::Exists,
            MoldError::ConflictingSemver(_) => Status::ConflictingSemver,
            MoldError::Conflict(_) => Status::Conflict,
            MoldError::Exhausted(_) => Status::Exhausted,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type MoldResult<T> = Result<T, MoldError>;

// =============================================================================
// TESTS
// =============================================================================
