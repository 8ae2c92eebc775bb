//! Harness configuration and layered loading.
//!
//! This module provides:
//! - Typed configuration for frame geometry and run parameters
//! - Defaults matching the reference hardware build
//! - Validation for guardrail invariants
//! - Layered loading (file + env + overrides)
//!
//! Configuration files are YAML:
//!
//! ```yaml
//! packet:
//!   element_count: 256
//!   max_level: 3
//!   collective_id: 0xABCD
//! run:
//!   test_sets: 8
//!   seed: 42
//!   receive_timeout_ms: 2000
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::StimulusPattern;
use crate::packet::{PacketLayout, PacketMeta, REFERENCE_ELEMENT_COUNT};
use crate::transport::udp::MAX_DATAGRAM_LEN;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "RDHARNESS_";

/// Frame geometry and the constant metadata of every stimulus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PacketConfig {
    /// Payload elements per frame.
    pub element_count: usize,
    /// Highest recursion level; the run uses levels `0..=max_level`.
    pub max_level: u8,
    /// Collective identifier written to every frame.
    pub collective_id: u16,
    /// Collective type written to every frame.
    pub collective_type: u8,
    /// Operation code written to every frame.
    pub op_code: u8,
}

impl Default for PacketConfig {
    fn default() -> Self {
        Self {
            element_count: REFERENCE_ELEMENT_COUNT,
            max_level: 3,
            collective_id: 0xABCD,
            collective_type: 0x01,
            op_code: 0x05,
        }
    }
}

impl PacketConfig {
    /// Frame layout for this configuration.
    #[must_use]
    pub const fn layout(&self) -> PacketLayout {
        PacketLayout::new(self.element_count)
    }

    /// Number of levels per test set.
    #[must_use]
    pub fn level_count(&self) -> usize {
        usize::from(self.max_level) + 1
    }

    /// Metadata template for a stimulus at `level`.
    #[must_use]
    pub const fn meta(&self, level: u8) -> PacketMeta {
        PacketMeta {
            collective_id: self.collective_id,
            collective_type: self.collective_type,
            op_code: self.op_code,
            max_level: self.max_level,
            level,
        }
    }
}

/// Run-wide parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Number of independent test sets.
    pub test_sets: u32,
    /// Scheduling seed. `None` derives one from the clock.
    pub seed: Option<u64>,
    /// Offset between a stimulus level and the level its response reports.
    ///
    /// `0` expects responses to echo the stimulus level; `1` matches engines
    /// that report `stimulus_level + 1`.
    pub response_level_offset: u8,
    /// Per-receive timeout in milliseconds. `None` blocks indefinitely.
    pub receive_timeout_ms: Option<u64>,
    /// Emit hex dumps of every frame at trace level.
    pub dump_packets: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            test_sets: 1,
            seed: None,
            response_level_offset: 0,
            receive_timeout_ms: None,
            dump_packets: false,
        }
    }
}

impl RunConfig {
    /// Receive timeout as a duration.
    #[must_use]
    pub fn receive_timeout(&self) -> Option<Duration> {
        self.receive_timeout_ms.map(Duration::from_millis)
    }
}

/// Top-level harness configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Frame geometry.
    pub packet: PacketConfig,
    /// Run parameters.
    pub run: RunConfig,
}

impl HarnessConfig {
    /// Validates the configuration for basic sanity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.packet.element_count == 0 {
            return Err(ConfigError::InvalidElementCount);
        }

        let frame_len = self.packet.layout().frame_len();
        if frame_len > MAX_DATAGRAM_LEN {
            return Err(ConfigError::FrameTooLarge {
                len: frame_len,
                max: MAX_DATAGRAM_LEN,
            });
        }

        if self.run.test_sets == 0 {
            return Err(ConfigError::InvalidTestSets);
        }

        let distinct_sets =
            StimulusPattern::new(self.packet.level_count(), self.packet.element_count)
                .distinct_sets();
        if u64::from(self.run.test_sets) > distinct_sets {
            return Err(ConfigError::StimulusRange {
                test_sets: self.run.test_sets,
                max: distinct_sets,
            });
        }

        if self
            .packet
            .max_level
            .checked_add(self.run.response_level_offset)
            .is_none()
        {
            return Err(ConfigError::LevelRange {
                max_level: self.packet.max_level,
                offset: self.run.response_level_offset,
            });
        }

        Ok(())
    }

    /// Builder-style test-set count.
    #[must_use]
    pub const fn with_test_sets(mut self, test_sets: u32) -> Self {
        self.run.test_sets = test_sets;
        self
    }

    /// Builder-style seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.run.seed = Some(seed);
        self
    }

    /// Builder-style element count.
    #[must_use]
    pub const fn with_element_count(mut self, element_count: usize) -> Self {
        self.packet.element_count = element_count;
        self
    }

    /// Builder-style maximum level.
    #[must_use]
    pub const fn with_max_level(mut self, max_level: u8) -> Self {
        self.packet.max_level = max_level;
        self
    }

    /// Builder-style response level offset.
    #[must_use]
    pub const fn with_response_level_offset(mut self, offset: u8) -> Self {
        self.run.response_level_offset = offset;
        self
    }

    /// Builder-style receive timeout.
    #[must_use]
    pub fn with_receive_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run.receive_timeout_ms =
            timeout.map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX));
        self
    }
}

/// Configuration loader with layered sources.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    file_path: Option<PathBuf>,
    overrides: BTreeMap<String, String>,
}

impl ConfigLoader {
    /// Creates a loader starting from the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a YAML file to load.
    #[must_use]
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Adds a programmatic override (highest precedence).
    ///
    /// Keys use the environment spelling, e.g. `RDHARNESS_RUN_TEST_SETS`.
    #[must_use]
    pub fn override_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    /// Loads configuration with precedence:
    /// 1. Defaults or file config (lowest)
    /// 2. Environment variables
    /// 3. Programmatic overrides (highest)
    pub fn load(&self) -> Result<HarnessConfig, ConfigError> {
        self.load_with_env(std::env::vars())
    }

    /// Like [`load`](Self::load) but reads overrides from `env` instead of
    /// the process environment.
    pub fn load_with_env<I>(&self, env: I) -> Result<HarnessConfig, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config = match &self.file_path {
            Some(path) => load_from_file(path)?,
            None => HarnessConfig::default(),
        };

        let env_overrides: BTreeMap<String, String> = env
            .into_iter()
            .filter(|(key, _)| key.starts_with(ENV_PREFIX))
            .collect();
        apply_overrides(&mut config, &env_overrides)?;
        apply_overrides(&mut config, &self.overrides)?;
        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error while reading configuration.
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Parse error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Element count is zero.
    #[error("element_count must be > 0")]
    InvalidElementCount,
    /// Test-set count is zero.
    #[error("test_sets must be > 0")]
    InvalidTestSets,
    /// Frame does not fit a datagram.
    #[error("frame of {len} bytes exceeds the {max}-byte datagram limit")]
    FrameTooLarge {
        /// Frame length.
        len: usize,
        /// Limit.
        max: usize,
    },
    /// Later test sets would repeat stimulus values of earlier ones.
    #[error("test_sets {test_sets} exceeds {max}, the most sets with distinct stimuli for this geometry")]
    StimulusRange {
        /// Configured test-set count.
        test_sets: u32,
        /// Largest count with distinct stimuli.
        max: u64,
    },
    /// Response levels would overflow the 8-bit level field.
    #[error("max_level {max_level} + response_level_offset {offset} exceeds 255")]
    LevelRange {
        /// Configured maximum level.
        max_level: u8,
        /// Configured offset.
        offset: u8,
    },
    /// Unknown override key.
    #[error("invalid override: {0}")]
    InvalidOverride(String),
    /// Override value could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Override key.
        key: String,
        /// Rejected value.
        value: String,
    },
}

fn load_from_file(path: &Path) -> Result<HarnessConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(HarnessConfig::default());
    }
    serde_yaml::from_str(&contents)
        .map_err(|err| ConfigError::Parse(format!("{}: {err}", path.display())))
}

fn apply_overrides(
    config: &mut HarnessConfig,
    overrides: &BTreeMap<String, String>,
) -> Result<(), ConfigError> {
    for (key, value) in overrides {
        apply_override(config, key, value)?;
    }
    Ok(())
}

fn apply_override(config: &mut HarnessConfig, key: &str, value: &str) -> Result<(), ConfigError> {
    match key {
        "RDHARNESS_PACKET_ELEMENT_COUNT" => {
            config.packet.element_count = narrow(parse_u64(value, key)?, key, value)?;
        }
        "RDHARNESS_PACKET_MAX_LEVEL" => {
            config.packet.max_level = narrow(parse_u64(value, key)?, key, value)?;
        }
        "RDHARNESS_PACKET_COLLECTIVE_ID" => {
            config.packet.collective_id = narrow(parse_u64(value, key)?, key, value)?;
        }
        "RDHARNESS_PACKET_COLLECTIVE_TYPE" => {
            config.packet.collective_type = narrow(parse_u64(value, key)?, key, value)?;
        }
        "RDHARNESS_PACKET_OP_CODE" => {
            config.packet.op_code = narrow(parse_u64(value, key)?, key, value)?;
        }
        "RDHARNESS_RUN_TEST_SETS" => {
            config.run.test_sets = narrow(parse_u64(value, key)?, key, value)?;
        }
        "RDHARNESS_RUN_SEED" => {
            config.run.seed = parse_optional(value, key)?;
        }
        "RDHARNESS_RUN_RESPONSE_LEVEL_OFFSET" => {
            config.run.response_level_offset = narrow(parse_u64(value, key)?, key, value)?;
        }
        "RDHARNESS_RUN_RECEIVE_TIMEOUT_MS" => {
            config.run.receive_timeout_ms = parse_optional(value, key)?;
        }
        "RDHARNESS_RUN_DUMP_PACKETS" => {
            config.run.dump_packets = parse_bool(value, key)?;
        }
        // Read by the binary, not part of the harness configuration.
        "RDHARNESS_LOG" => {}
        _ => return Err(ConfigError::InvalidOverride(key.to_string())),
    }
    Ok(())
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Parses decimal or `0x`-prefixed hexadecimal.
fn parse_u64(value: &str, key: &str) -> Result<u64, ConfigError> {
    let trimmed = value.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse(),
    };
    parsed.map_err(|_| invalid(key, value))
}

fn narrow<T: TryFrom<u64>>(raw: u64, key: &str, value: &str) -> Result<T, ConfigError> {
    T::try_from(raw).map_err(|_| invalid(key, value))
}

fn parse_optional(value: &str, key: &str) -> Result<Option<u64>, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "none" | "off" => Ok(None),
        _ => parse_u64(value, key).map(Some),
    }
}

fn parse_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}
