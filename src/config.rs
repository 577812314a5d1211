//! Configuration management module
//!
//! Settings come from built-in defaults, an optional TOML file and
//! `SHELVER__SECTION__KEY` environment variables, in increasing priority.

use action_flow::SequencerConfig;
use action_locator::NodeQuery;
use anyhow::{bail, Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use shelver_core_types::Selector;
use std::path::Path;
use std::time::Duration;

/// Root configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShelverConfig {
    pub sequencer: SequencerSection,
    pub selectors: SelectorSection,
    pub sweep: SweepSection,
    pub logging: LoggingConfig,
}

/// Timing of the save run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerSection {
    pub overlay_timeout_ms: u64,
    pub settle_delay_ms: u64,
    pub guard_stale_overlay: bool,
}

impl Default for SequencerSection {
    fn default() -> Self {
        let defaults = SequencerConfig::default();
        Self {
            overlay_timeout_ms: defaults.overlay_timeout_ms,
            settle_delay_ms: defaults.settle_delay_ms,
            guard_stale_overlay: defaults.guard_stale_overlay,
        }
    }
}

/// Where the save run finds its nodes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorSection {
    /// Save buttons, snapshotted once per run
    pub trigger: Selector,
    pub container: NodeQuery,
    pub option: Selector,
    pub confirm: NodeQuery,
}

impl Default for SelectorSection {
    fn default() -> Self {
        let defaults = SequencerConfig::default();
        Self {
            trigger: Selector::universal()
                .with_attribute("role", Some("button"))
                .with_class("gs_or_sav"),
            container: defaults.container,
            option: defaults.options,
            confirm: defaults.confirm,
        }
    }
}

/// Delete sweep
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSection {
    pub trigger: Selector,
    pub delay_ms: u64,
}

impl Default for SweepSection {
    fn default() -> Self {
        Self {
            trigger: Selector::tag("a").with_class("gs_or_del").with_class("gs_or_btn"),
            delay_ms: 500,
        }
    }
}

impl SweepSection {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Log output
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl ShelverConfig {
    /// Load configuration, layering environment overrides over `path`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix("SHELVER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        let config: ShelverConfig = settings
            .try_deserialize()
            .context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sequencer.overlay_timeout_ms == 0 {
            bail!("sequencer.overlay_timeout_ms must be greater than zero");
        }
        if self.logging.level.trim().is_empty() {
            bail!("logging.level must not be empty");
        }
        Ok(())
    }

    /// Settings handed to the sequencer
    pub fn sequencer_config(&self) -> SequencerConfig {
        SequencerConfig {
            container: self.selectors.container.clone(),
            options: self.selectors.option.clone(),
            confirm: self.selectors.confirm.clone(),
            overlay_timeout_ms: self.sequencer.overlay_timeout_ms,
            settle_delay_ms: self.sequencer.settle_delay_ms,
            guard_stale_overlay: self.sequencer.guard_stale_overlay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_describe_the_library_dialog() {
        let config = ShelverConfig::default();
        assert_eq!(
            config.selectors.trigger.to_string(),
            ".gs_or_sav[role=\"button\"]"
        );
        assert_eq!(config.sweep.trigger.to_string(), "a.gs_or_del.gs_or_btn");
        assert_eq!(config.sequencer_config(), SequencerConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_overlay_timeout_rejected() {
        let mut config = ShelverConfig::default();
        config.sequencer.overlay_timeout_ms = 0;
        assert!(config.validate().is_err());
    }
}
