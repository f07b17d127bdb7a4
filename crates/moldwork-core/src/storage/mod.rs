//! # Storage Module
//!
//! Containers used by the entity graph to hold children.

mod element;

pub use element::{Element, ElementStorage};
