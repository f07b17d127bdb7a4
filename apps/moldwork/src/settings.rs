//! # Settings
//!
//! The TOML file that tells the CLI where molds and configs live.
//!
//! ```toml
//! [[group]]
//! name = "default"
//!
//! [[group.plugin]]
//! type = "json"
//! molds = "molds"
//! configs = "configs"
//!
//! [[group.plugin]]
//! type = "redb"
//! path = "store.redb"
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use moldwork_core::{Instance, JsonDirectoryPlugin, MoldError, PluginDescriptor, RedbStorePlugin};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    #[serde(default, rename = "group")]
    pub groups: Vec<GroupSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GroupSettings {
    pub name: String,
    #[serde(default, rename = "plugin")]
    pub plugins: Vec<PluginSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PluginSettings {
    Json { molds: PathBuf, configs: PathBuf },
    Redb { path: PathBuf },
}

impl PluginSettings {
    fn kind(&self) -> &'static str {
        match self {
            PluginSettings::Json { .. } => "json",
            PluginSettings::Redb { .. } => "redb",
        }
    }

    fn rebase(&mut self, base: &Path) {
        let anchor = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        match self {
            PluginSettings::Json { molds, configs } => {
                anchor(molds);
                anchor(configs);
            }
            PluginSettings::Redb { path } => anchor(path),
        }
    }
}

impl Settings {
    /// Read settings from `path`.
    pub fn load(path: &Path) -> Result<Self, MoldError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            MoldError::InvalidArgument(format!("cannot read settings '{}': {}", path.display(), e))
        })?;
        let base = path.parent().unwrap_or(Path::new("."));
        Self::parse(&text, base)
    }

    /// Parse settings text, anchoring relative paths at `base`.
    pub fn parse(text: &str, base: &Path) -> Result<Self, MoldError> {
        let mut settings: Settings = toml::from_str(text)
            .map_err(|e| MoldError::InvalidArgument(format!("invalid settings: {}", e)))?;
        for plugin in settings.groups.iter_mut().flat_map(|g| g.plugins.iter_mut()) {
            plugin.rebase(base);
        }
        Ok(settings)
    }

    /// Build an instance with every configured plugin registered.
    ///
    /// Plugins are tagged `<group>.<type><n>` in file order.
    pub fn instance(&self) -> Result<Instance, MoldError> {
        let mut instance = Instance::new();
        for group in &self.groups {
            for (index, plugin) in group.plugins.iter().enumerate() {
                let tag = format!("{}.{}{}", group.name, plugin.kind(), index);
                let descriptor = match plugin {
                    PluginSettings::Json { molds, configs } => PluginDescriptor::new(
                        tag,
                        &group.name,
                        format!("json files in {}", molds.display()),
                        Box::new(JsonDirectoryPlugin::new(molds, configs)),
                    ),
                    PluginSettings::Redb { path } => PluginDescriptor::new(
                        tag,
                        &group.name,
                        format!("redb store {}", path.display()),
                        Box::new(RedbStorePlugin::open(path)?),
                    ),
                };
                instance.register_plugin(descriptor)?;
            }
        }
        Ok(instance)
    }
}
