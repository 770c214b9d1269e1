use serde::{Deserialize, Serialize};

/// Configuration from config.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub list: ListConfig,
    #[serde(default)]
    pub drag: DragConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListConfig {
    /// Keep checked items in a contiguous block at the end of each group
    #[serde(default = "default_true")]
    pub auto_sort: bool,
    /// Deepest allowed tier (0 = top level only)
    #[serde(default = "default_max_tier")]
    pub max_tier: usize,
}

impl Default for ListConfig {
    fn default() -> Self {
        ListConfig {
            auto_sort: true,
            max_tier: default_max_tier(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DragConfig {
    /// Accumulated displacement before a drag commits to a mode
    #[serde(default = "default_mode_sensitivity")]
    pub mode_sensitivity_px: f32,
    /// Horizontal travel per tier step
    #[serde(default = "default_tier_step")]
    pub tier_step_px: f32,
}

impl Default for DragConfig {
    fn default() -> Self {
        DragConfig {
            mode_sensitivity_px: default_mode_sensitivity(),
            tier_step_px: default_tier_step(),
        }
    }
}

/// Default: see src/templates/config.toml
fn default_true() -> bool {
    true
}

/// Default: see src/templates/config.toml
fn default_max_tier() -> usize {
    2
}

/// Default: see src/templates/config.toml
fn default_mode_sensitivity() -> f32 {
    24.0
}

/// Default: see src/templates/config.toml
fn default_tier_step() -> f32 {
    48.0
}
