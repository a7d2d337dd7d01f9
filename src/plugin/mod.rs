//! Metric plugins merged into the built-in metric space.
//!
//! A plugin is any type implementing [`MetricPlugin`]. Plugins are compiled
//! in and chosen by name (see [`PluginRegistry::from_names`]); nothing is
//! loaded at runtime. Plugin output is prefixed with the plugin name, so a
//! `fertility` plugin returning `tokens_per_word` contributes
//! `fertility_tokens_per_word`.
//!
//! Plugin failures are logged and counted under
//! [`PLUGIN_ERRORS_TOTAL`](crate::telemetry::PLUGIN_ERRORS_TOTAL). They never
//! fail the analysis they were applied to.

mod builtin;

pub use builtin::{CharsetPlugin, FertilityPlugin};

use std::sync::Arc;

use tracing::warn;

use crate::error::{Result, TokscopeError};
use crate::telemetry;
use crate::types::{AnalysisResult, MetricResult};

/// Read-only view handed to a plugin.
#[derive(Debug, Clone, Copy)]
pub struct PluginContext<'a> {
    pub analysis: &'a AnalysisResult,
}

impl<'a> PluginContext<'a> {
    pub fn new(analysis: &'a AnalysisResult) -> Self {
        Self { analysis }
    }

    pub fn document(&self) -> &'a str {
        &self.analysis.document
    }

    pub fn tokenizer(&self) -> &'a str {
        &self.analysis.tokenizer_name
    }

    /// Token texts in document order.
    pub fn texts(&self) -> Vec<&'a str> {
        self.analysis.tokenization.texts()
    }
}

/// An additional metric calculator.
///
/// Implementations receive the finished [`AnalysisResult`] and return new
/// metrics; they cannot change the result itself.
pub trait MetricPlugin: Send + Sync {
    /// Name used for selection and as the metric prefix.
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn calculate_metrics(&self, context: &PluginContext<'_>) -> Result<Vec<MetricResult>>;
}

/// Ordered set of plugins applied after the built-in calculators.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn MetricPlugin>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the compiled-in plugins.
    pub const BUILTIN: [&'static str; 2] = ["fertility", "charset"];

    /// Construct a compiled-in plugin by name.
    pub fn builtin(name: &str) -> Option<Arc<dyn MetricPlugin>> {
        match name {
            "fertility" => Some(Arc::new(FertilityPlugin)),
            "charset" => Some(Arc::new(CharsetPlugin)),
            _ => None,
        }
    }

    /// Registry of compiled-in plugins selected by name, in the given order.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let mut registry = Self::new();
        for name in names {
            let name = name.as_ref();
            let plugin = Self::builtin(name).ok_or_else(|| {
                TokscopeError::Configuration(format!(
                    "unknown plugin '{name}' (available: {})",
                    Self::BUILTIN.join(", ")
                ))
            })?;
            registry.register(plugin);
        }
        Ok(registry)
    }

    /// Add a plugin, replacing any registered under the same name.
    pub fn register(&mut self, plugin: Arc<dyn MetricPlugin>) {
        self.plugins.retain(|p| p.name() != plugin.name());
        self.plugins.push(plugin);
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Run every plugin over `analysis` and collect prefixed metrics.
    ///
    /// Failed plugins contribute nothing.
    pub fn collect(&self, analysis: &AnalysisResult) -> Vec<MetricResult> {
        let context = PluginContext::new(analysis);
        let mut out = Vec::new();
        for plugin in &self.plugins {
            match plugin.calculate_metrics(&context) {
                Ok(metrics) => out.extend(metrics.into_iter().map(|mut m| {
                    m.name = format!("{}_{}", plugin.name(), m.name);
                    m
                })),
                Err(e) => {
                    metrics::counter!(telemetry::PLUGIN_ERRORS_TOTAL,
                        "plugin" => plugin.name().to_owned(),
                    )
                    .increment(1);
                    warn!(plugin = plugin.name(), error = %e, "plugin failed, metrics skipped");
                }
            }
        }
        out
    }

    /// Return `analysis` with plugin metrics merged in.
    ///
    /// Built-in metrics win name clashes.
    pub fn apply(&self, analysis: AnalysisResult) -> AnalysisResult {
        if self.plugins.is_empty() {
            return analysis;
        }
        let extra = self.collect(&analysis);
        let (merged, clashes) = analysis.merged_with(extra);
        for name in clashes {
            warn!(metric = %name, "plugin metric clashes with an existing metric, dropped");
        }
        merged
    }
}
