//! Configuration for the runtime.

use serde::{Deserialize, Serialize};

use aux_common::{BotSpace, DEFAULT_TAG_MASK_SPACE};

use crate::types::{Result, RuntimeError};

/// Default energy budget for a context.
pub const DEFAULT_ENERGY: u64 = 100_000;

/// Configuration shared by the global context and the bots it creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Space that unqualified tag mask writes go to
    pub default_mask_space: BotSpace,
    /// Use UUIDs for every task, not only for tasks created by factories
    pub force_unguessable_task_ids: bool,
    /// Energy budget scripts start with
    pub energy: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_mask_space: DEFAULT_TAG_MASK_SPACE,
            force_unguessable_task_ids: false,
            energy: DEFAULT_ENERGY,
        }
    }
}

impl RuntimeConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| RuntimeError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the default mask space can hold tag masks.
    pub fn validate(&self) -> Result<()> {
        if !self.default_mask_space.holds_tag_masks() {
            return Err(RuntimeError::ConfigError(format!(
                "{} cannot hold tag masks",
                self.default_mask_space
            )));
        }
        Ok(())
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| RuntimeError::ConfigError(e.to_string()))
    }

    /// Set the default mask space.
    pub fn with_default_mask_space(mut self, space: BotSpace) -> Self {
        self.default_mask_space = space;
        self
    }

    /// Force every task ID to be unguessable.
    pub fn with_unguessable_task_ids(mut self, force: bool) -> Self {
        self.force_unguessable_task_ids = force;
        self
    }
}
