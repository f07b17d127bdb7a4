//! JSON files in two directories, one `<entry>.json` per mold or config.

use super::{IoPlugin, check_entry};
use crate::canonical::{CanonicalConfig, CanonicalMold};
use crate::types::{MoldError, MoldResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct JsonDirectoryPlugin {
    molds_dir: PathBuf,
    configs_dir: PathBuf,
}

impl JsonDirectoryPlugin {
    #[must_use]
    pub fn new(molds_dir: impl Into<PathBuf>, configs_dir: impl Into<PathBuf>) -> Self {
        Self {
            molds_dir: molds_dir.into(),
            configs_dir: configs_dir.into(),
        }
    }

    fn path(dir: &Path, entry: &str) -> MoldResult<PathBuf> {
        check_entry(entry)?;
        Ok(dir.join(format!("{}.json", entry)))
    }
}

fn read<T: DeserializeOwned>(path: &Path) -> MoldResult<T> {
    let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => {
            MoldError::InvalidArgument(format!("no entry at {}", path.display()))
        }
        _ => MoldError::InternalError(format!("{}: {}", path.display(), e)),
    })?;
    serde_json::from_str(&text)
        .map_err(|e| MoldError::InvalidContext(format!("{}: {}", path.display(), e)))
}

fn write<T: Serialize>(path: &Path, value: &T) -> MoldResult<()> {
    let mut text =
        serde_json::to_string_pretty(value).map_err(|e| MoldError::InternalError(e.to_string()))?;
    text.push('\n');
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .map_err(|e| MoldError::InternalError(format!("{}: {}", dir.display(), e)))?;
    }
    std::fs::write(path, text)
        .map_err(|e| MoldError::InternalError(format!("{}: {}", path.display(), e)))
}

fn entries(dir: &Path) -> MoldResult<Vec<String>> {
    let listing = match std::fs::read_dir(dir) {
        Ok(listing) => listing,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(MoldError::InternalError(format!("{}: {}", dir.display(), e))),
    };
    let mut names = Vec::new();
    for item in listing {
        let path = item
            .map_err(|e| MoldError::InternalError(e.to_string()))?
            .path();
        if path.extension().is_some_and(|ext| ext == "json")
            && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
        {
            names.push(stem.to_string());
        }
    }
    names.sort();
    Ok(names)
}

impl IoPlugin for JsonDirectoryPlugin {
    fn mold_read(&self, entry: &str) -> MoldResult<CanonicalMold> {
        read(&Self::path(&self.molds_dir, entry)?)
    }

    fn mold_write(&self, entry: &str, mold: &CanonicalMold) -> MoldResult<()> {
        write(&Self::path(&self.molds_dir, entry)?, mold)
    }

    fn config_read(&self, entry: &str) -> MoldResult<CanonicalConfig> {
        read(&Self::path(&self.configs_dir, entry)?)
    }

    fn config_write(&self, entry: &str, config: &CanonicalConfig) -> MoldResult<()> {
        write(&Self::path(&self.configs_dir, entry)?, config)
    }

    fn mold_entries(&self) -> MoldResult<Vec<String>> {
        entries(&self.molds_dir)
    }

    fn config_entries(&self) -> MoldResult<Vec<String>> {
        entries(&self.configs_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::{CanonicalDefault, CanonicalKeyval, ConfigElement, MoldElement};
    use crate::types::{Value, ValueType, Version, VersionWindow};

    fn plugin(dir: &tempfile::TempDir) -> JsonDirectoryPlugin {
        JsonDirectoryPlugin::new(dir.path().join("molds"), dir.path().join("configs"))
    }

    #[test]
    fn mold_and_config_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let plugin = plugin(&dir);
        let mold = CanonicalMold {
            version: Version::new(1, 1, 0),
            documentation: Vec::new(),
            elements: vec![MoldElement::Keyval(CanonicalKeyval {
                name: "level".to_string(),
                window: VersionWindow::since(Version::new(1, 1, 0)),
                value_type: Some(ValueType::Enum),
                defaults: vec![CanonicalDefault {
                    introduced: Version::new(1, 1, 0),
                    value: Value::Enum("info".to_string()),
                }],
                restrictions: Vec::new(),
                documentation: Vec::new(),
                renamed_from: None,
            })],
        };
        let config = CanonicalConfig {
            version: Version::new(1, 1, 0),
            elements: vec![ConfigElement::Keyval {
                name: "level".to_string(),
                value: Some(Value::Enum("debug".to_string())),
            }],
        };

        plugin.mold_write("logging", &mold).expect("write mold");
        plugin.config_write("logging", &config).expect("write config");
        assert_eq!(plugin.mold_read("logging").expect("read mold"), mold);
        assert_eq!(plugin.config_read("logging").expect("read config"), config);
        assert_eq!(plugin.mold_entries().expect("entries"), vec!["logging"]);
    }

    #[test]
    fn missing_and_broken_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let plugin = plugin(&dir);
        assert!(plugin.config_entries().expect("entries").is_empty());
        assert!(matches!(
            plugin.mold_read("absent"),
            Err(MoldError::InvalidArgument(_))
        ));

        std::fs::create_dir_all(dir.path().join("molds")).expect("mkdir");
        std::fs::write(dir.path().join("molds/broken.json"), "{ not json").expect("write");
        assert!(matches!(
            plugin.mold_read("broken"),
            Err(MoldError::InvalidContext(_))
        ));
        assert!(plugin.mold_read("../broken").is_err());
    }
}
