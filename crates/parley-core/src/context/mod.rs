//! Context window assembly.
//!
//! [`EngineContext`] carries the process-wide settings every assembly and
//! background task needs; it is built once from `GlobalConfig` and passed
//! explicitly.

pub mod assembler;
pub mod template;

use std::collections::BTreeMap;

use parley_types::config::GlobalConfig;

pub use assembler::{AssembledContext, AssemblyOptions, AssemblyStats, assemble};
pub use template::{TemplateVars, fill_template};

/// Process-wide settings shared by the engine components.
#[derive(Debug, Clone)]
pub struct EngineContext {
    /// Locale substituted for `{{lang}}`.
    pub locale: String,
    /// Label substituted for `{{ServiceProvider}}`.
    pub provider_label: String,
    pub enable_auto_title: bool,
    /// Tool-capability preamble; tool augmentation is active when set.
    pub tool_preamble: Option<String>,
    pub system_template: String,
    /// Model name -> knowledge cutoff, with a `default` entry.
    pub knowledge_cutoff: BTreeMap<String, String>,
}

impl EngineContext {
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            locale: config.locale.clone(),
            provider_label: config.provider.name.clone(),
            enable_auto_title: config.enable_auto_title,
            tool_preamble: config
                .tool_preamble
                .clone()
                .filter(|p| !p.trim().is_empty()),
            system_template: config.system_template.clone(),
            knowledge_cutoff: config.knowledge_cutoff.clone(),
        }
    }

    pub fn tools_enabled(&self) -> bool {
        self.tool_preamble.is_some()
    }
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::from_config(&GlobalConfig::default())
    }
}
