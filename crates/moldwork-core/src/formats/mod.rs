//! # Formats
//!
//! Serialized representations of molds and configs.

mod persistence;

pub use persistence::{
    PayloadKind, PersistenceHeader, config_from_bytes, config_to_bytes, mold_from_bytes,
    mold_to_bytes,
};
