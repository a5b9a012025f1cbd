//! Application configuration, loaded from YAML.
//!
//! Every section is optional; missing fields take their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use splitcube_physics::SimulationConfig;
use splitcube_render::PipelineConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Outstanding `updateState` requests tolerated before an overload is reported.
    pub max_physics_in_flight: usize,
    /// Frames forwarded but not yet acknowledged by the pipeline.
    pub max_render_in_flight: usize,
    /// Upper bound on the elapsed time measured for one tick, in seconds.
    pub max_frame_delta: f64,
    /// Headless tick rate.
    pub tick_rate_hz: f64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_physics_in_flight: 4,
            max_render_in_flight: 1,
            max_frame_delta: 1.0,
            tick_rate_hz: 60.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "splitcube".into(),
            width: 800,
            height: 600,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub simulation: SimulationConfig,
    pub pipeline: PipelineConfig,
    pub coordinator: CoordinatorConfig,
    pub window: WindowConfig,
}

impl AppConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = Self::from_yaml_str(&std::fs::read_to_string(path)?)?;
        tracing::info!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Load `path` if given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.coordinator;
        if c.max_render_in_flight == 0 {
            return Err(ConfigError::Invalid(
                "max_render_in_flight must be at least 1".into(),
            ));
        }
        if !(c.tick_rate_hz.is_finite() && c.tick_rate_hz > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "tick_rate_hz {} is not positive",
                c.tick_rate_hz
            )));
        }
        if !(c.max_frame_delta.is_finite() && c.max_frame_delta > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "max_frame_delta {} is not positive",
                c.max_frame_delta
            )));
        }
        if self.pipeline.near == self.pipeline.far {
            return Err(ConfigError::Invalid("near and far planes coincide".into()));
        }
        Ok(())
    }
}
