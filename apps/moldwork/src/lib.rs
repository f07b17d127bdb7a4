//! # Moldwork
//!
//! Command-line front end for `moldwork-core`: a settings file naming plugin
//! groups, and the `list`, `verify`, `generate` and `update` commands.

pub mod cli;
pub mod settings;
