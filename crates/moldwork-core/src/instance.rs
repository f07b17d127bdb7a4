//! # Instance
//!
//! The object a caller works through: one context graph, the plugins
//! registered against it, and the message of the last failed call.
//!
//! Instances are independent of each other. Nothing here is global, so two
//! instances with different plugin sets can live side by side.

use crate::canonical::{CanonicalConfig, CanonicalMold};
use crate::config::{self, VerifyReport};
use crate::context::{Config, ContextGraph, Mold};
use crate::mold::verify_mold;
use crate::plugin::{EntryRecord, IoPlugin, PluginDescriptor};
use crate::types::{MoldError, MoldResult, Value, Version};
use crate::update::{Update, UpdateState};
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct Instance {
    graph: ContextGraph,
    plugins: Vec<PluginDescriptor>,
    last_error: Option<String>,
}

impl Instance {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn graph(&self) -> &ContextGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut ContextGraph {
        &mut self.graph
    }

    /// Display string of the last failed call, cleared by the next success.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn record<T>(&mut self, result: MoldResult<T>) -> MoldResult<T> {
        match &result {
            Ok(_) => self.last_error = None,
            Err(e) => self.last_error = Some(e.to_string()),
        }
        result
    }

    // =========================================================================
    // PLUGINS
    // =========================================================================

    /// Register a plugin. Type tags are unique per instance.
    pub fn register_plugin(&mut self, descriptor: PluginDescriptor) -> MoldResult<()> {
        let checked = descriptor.validate().and_then(|()| {
            if self.plugins.iter().any(|p| p.type_tag == descriptor.type_tag) {
                Err(MoldError::Exists(format!(
                    "plugin '{}' is already registered",
                    descriptor.type_tag
                )))
            } else {
                Ok(())
            }
        });
        if checked.is_ok() {
            debug!(
                type_tag = %descriptor.type_tag,
                group = %descriptor.group,
                "plugin registered"
            );
            self.plugins.push(descriptor);
        }
        self.record(checked)
    }

    fn group<'a, 'g>(
        &'a self,
        group: &'g str,
    ) -> impl Iterator<Item = &'a PluginDescriptor> + use<'a, 'g> {
        self.plugins.iter().filter(move |p| p.group == group)
    }

    /// Ask each plugin of `group` in registration order; a miss falls through.
    fn read_from<T>(
        &self,
        group: &str,
        entry: &str,
        read: impl Fn(&dyn IoPlugin, &str) -> MoldResult<T>,
    ) -> MoldResult<T> {
        for descriptor in self.group(group) {
            match read(descriptor.plugin.as_ref(), entry) {
                Err(MoldError::InvalidArgument(reason)) => {
                    warn!(type_tag = %descriptor.type_tag, entry, %reason, "plugin miss");
                }
                other => return other,
            }
        }
        Err(MoldError::InvalidArgument(format!(
            "no plugin in group '{}' holds '{}'",
            group, entry
        )))
    }

    fn writer(&self, group: &str) -> MoldResult<&dyn IoPlugin> {
        self.group(group)
            .next()
            .map(|d| d.plugin.as_ref())
            .ok_or_else(|| {
                MoldError::InvalidArgument(format!("no plugin registered for group '{}'", group))
            })
    }

    fn entries(
        &self,
        group: &str,
        list: impl Fn(&dyn IoPlugin) -> MoldResult<Vec<String>>,
    ) -> MoldResult<Vec<EntryRecord>> {
        let mut records = Vec::new();
        for descriptor in self.group(group) {
            for name in list(descriptor.plugin.as_ref())? {
                records.push(EntryRecord {
                    name,
                    type_tag: descriptor.type_tag.clone(),
                });
            }
        }
        records.sort();
        Ok(records)
    }

    // =========================================================================
    // READ / WRITE
    // =========================================================================

    pub fn mold_read(&mut self, group: &str, entry: &str) -> MoldResult<Mold> {
        let result = self
            .read_from(group, entry, |p, e| p.mold_read(e))
            .and_then(|canonical| canonical.into_graph(&mut self.graph));
        self.record(result)
    }

    /// Read a config and bind it to `mold`.
    pub fn config_read(&mut self, group: &str, entry: &str, mold: &Mold) -> MoldResult<Config> {
        let result = self
            .read_from(group, entry, |p, e| p.config_read(e))
            .and_then(|canonical| canonical.into_graph(&mut self.graph, mold));
        self.record(result)
    }

    /// Write to the first plugin of `group`.
    pub fn mold_write(&mut self, group: &str, entry: &str, mold: &Mold) -> MoldResult<()> {
        let result = CanonicalMold::from_graph(&self.graph, mold)
            .and_then(|canonical| self.writer(group)?.mold_write(entry, &canonical));
        self.record(result)
    }

    /// Write to the first plugin of `group`.
    pub fn config_write(&mut self, group: &str, entry: &str, config: &Config) -> MoldResult<()> {
        let result = CanonicalConfig::from_graph(&self.graph, config)
            .and_then(|canonical| self.writer(group)?.config_write(entry, &canonical));
        self.record(result)
    }

    pub fn mold_entries(&mut self, group: &str) -> MoldResult<Vec<EntryRecord>> {
        let result = self.entries(group, |p| p.mold_entries());
        self.record(result)
    }

    pub fn config_entries(&mut self, group: &str) -> MoldResult<Vec<EntryRecord>> {
        let result = self.entries(group, |p| p.config_entries());
        self.record(result)
    }

    // =========================================================================
    // MOLD / CONFIG OPERATIONS
    // =========================================================================

    /// Generate a config holding the mold's defaults at `version`.
    pub fn generate_config(&mut self, mold: &Mold, version: Option<Version>) -> MoldResult<Config> {
        let result = CanonicalMold::from_graph(&self.graph, mold)
            .and_then(|canonical| config::generate_config(&canonical, version))
            .and_then(|generated| generated.into_graph(&mut self.graph, mold));
        self.record(result)
    }

    pub fn verify_mold(&mut self, mold: &Mold) -> MoldResult<VerifyReport> {
        let result = CanonicalMold::from_graph(&self.graph, mold).map(|m| verify_mold(&m));
        self.record(result)
    }

    /// Verify a config against the mold it is bound to.
    pub fn verify_config(&mut self, config: &Config) -> MoldResult<VerifyReport> {
        let result = self.graph.config_mold(config).and_then(|mold| {
            let mold = CanonicalMold::from_context(&self.graph, mold)?;
            let config = CanonicalConfig::from_graph(&self.graph, config)?;
            Ok(config::verify_config(&mold, &config))
        });
        self.record(result)
    }

    pub fn mold_finished(&mut self, mold: Mold) -> MoldResult<()> {
        let result = self.graph.mold_finished(mold);
        self.record(result)
    }

    pub fn config_finished(&mut self, config: Config) -> MoldResult<()> {
        let result = self.graph.config_finished(config);
        self.record(result)
    }

    // =========================================================================
    // UPDATE
    // =========================================================================

    pub fn update_config(&mut self, config: &Config, target: Version) -> MoldResult<Update> {
        let result = Update::start(&mut self.graph, config, target);
        self.record(result)
    }

    pub fn update_resolve(&mut self, update: &mut Update, value: Value) -> MoldResult<()> {
        let result = update.resolve(value);
        self.record(result)
    }

    pub fn update_continue(&mut self, update: &mut Update) -> MoldResult<UpdateState> {
        let result = update.resume(&mut self.graph);
        self.record(result)
    }
}
