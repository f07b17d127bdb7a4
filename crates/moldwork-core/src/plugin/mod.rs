//! # I/O Plugins
//!
//! The boundary through which molds and configs enter and leave the core.
//!
//! A plugin moves canonical trees between some external store and the
//! caller; building them into a [`ContextGraph`](crate::context::ContextGraph)
//! is the [`Instance`](crate::instance::Instance)'s job. Plugins are
//! registered under a type tag through a [`PluginDescriptor`] whose `size`
//! must match the descriptor layout this crate was built with.

mod json;
mod redb_store;

pub use json::JsonDirectoryPlugin;
pub use redb_store::RedbStorePlugin;

use crate::canonical::{CanonicalConfig, CanonicalMold};
use crate::primitives::{MAX_DESCRIPTION_LENGTH, MAX_TYPE_TAG_LENGTH};
use crate::types::{MoldError, MoldResult};
use serde::{Deserialize, Serialize};

/// Reader and writer for one external store.
///
/// A missing entry is reported as `InvalidArgument`, which lets the
/// instance fall through to the next plugin of the group.
pub trait IoPlugin: Send + Sync {
    fn mold_read(&self, entry: &str) -> MoldResult<CanonicalMold>;

    fn mold_write(&self, entry: &str, mold: &CanonicalMold) -> MoldResult<()>;

    fn config_read(&self, entry: &str) -> MoldResult<CanonicalConfig>;

    fn config_write(&self, entry: &str, config: &CanonicalConfig) -> MoldResult<()>;

    /// Names of the molds this plugin can read.
    fn mold_entries(&self) -> MoldResult<Vec<String>> {
        Ok(Vec::new())
    }

    /// Names of the configs this plugin can read.
    fn config_entries(&self) -> MoldResult<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Registration record for one plugin.
pub struct PluginDescriptor {
    /// Must equal `size_of::<PluginDescriptor>()`.
    pub size: usize,
    pub type_tag: String,
    /// Group the plugin serves (see [`Instance::mold_read`](crate::instance::Instance::mold_read)).
    pub group: String,
    pub description: String,
    pub plugin: Box<dyn IoPlugin>,
}

impl PluginDescriptor {
    #[must_use]
    pub fn new(
        type_tag: impl Into<String>,
        group: impl Into<String>,
        description: impl Into<String>,
        plugin: Box<dyn IoPlugin>,
    ) -> Self {
        Self {
            size: std::mem::size_of::<PluginDescriptor>(),
            type_tag: type_tag.into(),
            group: group.into(),
            description: description.into(),
            plugin,
        }
    }

    /// Check the descriptor layout and its string fields.
    pub fn validate(&self) -> MoldResult<()> {
        let expected = std::mem::size_of::<PluginDescriptor>();
        if self.size != expected {
            return Err(MoldError::InvalidArgument(format!(
                "descriptor size {} does not match {}",
                self.size, expected
            )));
        }
        bounded("type tag", &self.type_tag, MAX_TYPE_TAG_LENGTH)?;
        bounded("group", &self.group, MAX_TYPE_TAG_LENGTH)?;
        bounded("description", &self.description, MAX_DESCRIPTION_LENGTH)
    }
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("type_tag", &self.type_tag)
            .field("group", &self.group)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

fn bounded(what: &str, text: &str, max: usize) -> MoldResult<()> {
    if text.is_empty() {
        return Err(MoldError::InvalidArgument(format!("{} is empty", what)));
    }
    if text.len() > max {
        return Err(MoldError::InvalidArgument(format!(
            "{} exceeds {} bytes",
            what, max
        )));
    }
    Ok(())
}

/// One enumerated entry and the plugin that holds it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryRecord {
    pub name: String,
    pub type_tag: String,
}

/// Reject entry names that would escape a plugin's storage root.
pub(crate) fn check_entry(entry: &str) -> MoldResult<()> {
    if entry.is_empty()
        || entry == "."
        || entry == ".."
        || entry.contains(['/', '\\', '\0'])
    {
        return Err(MoldError::InvalidArgument(format!(
            "invalid entry name '{}'",
            entry
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nothing;

    impl IoPlugin for Nothing {
        fn mold_read(&self, entry: &str) -> MoldResult<CanonicalMold> {
            Err(MoldError::InvalidArgument(entry.to_string()))
        }
        fn mold_write(&self, _: &str, _: &CanonicalMold) -> MoldResult<()> {
            Ok(())
        }
        fn config_read(&self, entry: &str) -> MoldResult<CanonicalConfig> {
            Err(MoldError::InvalidArgument(entry.to_string()))
        }
        fn config_write(&self, _: &str, _: &CanonicalConfig) -> MoldResult<()> {
            Ok(())
        }
    }

    #[test]
    fn descriptor_validation() {
        let ok = PluginDescriptor::new("null", "default", "discards everything", Box::new(Nothing));
        assert!(ok.validate().is_ok());
        assert!(ok.plugin.mold_entries().expect("entries").is_empty());

        let mut skewed = PluginDescriptor::new("null", "default", "x", Box::new(Nothing));
        skewed.size += 8;
        assert!(matches!(skewed.validate(), Err(MoldError::InvalidArgument(_))));

        let long = PluginDescriptor::new("t".repeat(MAX_TYPE_TAG_LENGTH + 1), "default", "x", Box::new(Nothing));
        assert!(long.validate().is_err());

        let empty = PluginDescriptor::new("null", "default", "", Box::new(Nothing));
        assert!(empty.validate().is_err());
    }

    #[test]
    fn entry_names() {
        assert!(check_entry("server").is_ok());
        assert!(check_entry("server.v2").is_ok());
        for bad in ["", ".", "..", "a/b", "a\\b"] {
            assert!(check_entry(bad).is_err(), "{bad}");
        }
    }
}
