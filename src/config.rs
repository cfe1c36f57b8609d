//! Engine configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What happens when an effect's guard evaluates false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardPolicy {
    /// Skip the effect silently.
    #[default]
    Skip,
    /// Skip the body, then run the effect fallback with `FailureCause::GuardDeclined`.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub guard_policy: GuardPolicy,
    /// Reject at link time any state whose initial value fails its own validator.
    pub validate_initial_values: bool,
    /// Report effect loops implied by declared writes when linking.
    pub analyze_cycles: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            guard_policy: GuardPolicy::Skip,
            validate_initial_values: true,
            analyze_cycles: true,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid engine config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl EngineConfig {
    /// Parses a JSON object. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }
}
