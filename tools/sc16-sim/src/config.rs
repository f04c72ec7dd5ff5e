//! Configuration file loading.
//!
//! The file has two optional tables: `[chip]` deserializes straight into
//! [`ChipConfig`] and `[line]` describes the line settings applied to both
//! channels. Input flags are listed by name, e.g. `input = ["INPCK"]`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use sc16_driver_api::{CharSize, ChipConfig, FlowControl, InputFlags, LineConfig, Parity, StopBits};
use serde::Deserialize;

/// Parsed configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    /// Chip-level settings.
    pub chip: ChipConfig,
    /// Line settings for both channels.
    pub line: LineSection,
}

/// The `[line]` table.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LineSection {
    /// Requested baud rate.
    pub baud: u32,
    /// Data bits.
    pub char_size: CharSize,
    /// Stop bits.
    pub stop_bits: StopBits,
    /// Parity mode.
    pub parity: Parity,
    /// Hardware flow control.
    pub flow: FlowControl,
    /// Input flag names.
    pub input: Vec<String>,
    /// Receiver enabled.
    pub receiver_enabled: bool,
    /// Ignore modem status lines.
    pub local: bool,
}

impl Default for LineSection {
    fn default() -> Self {
        let line = LineConfig::default();
        Self {
            baud: line.baud,
            char_size: line.char_size,
            stop_bits: line.stop_bits,
            parity: line.parity,
            flow: line.flow,
            input: Vec::new(),
            receiver_enabled: line.receiver_enabled,
            local: line.local,
        }
    }
}

impl LineSection {
    /// Builds the driver-facing line configuration.
    pub fn to_line_config(&self) -> Result<LineConfig> {
        let mut input = InputFlags::empty();
        for name in &self.input {
            match InputFlags::from_name(&name.to_ascii_uppercase()) {
                Some(flag) => input |= flag,
                None => bail!("unknown input flag `{name}`"),
            }
        }
        Ok(LineConfig {
            baud: self.baud,
            char_size: self.char_size,
            stop_bits: self.stop_bits,
            parity: self.parity,
            flow: self.flow,
            input,
            receiver_enabled: self.receiver_enabled,
            local: self.local,
        })
    }
}

impl SimConfig {
    /// Reads and validates `path`, or returns the defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                Self::parse(&text).with_context(|| format!("parsing {}", path.display()))?
            }
            None => Self::default(),
        };
        Ok(config)
    }

    /// Parses and validates configuration text.
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config
            .chip
            .validate()
            .map_err(|err| anyhow::anyhow!("invalid [chip] table: {err}"))?;
        config.line.to_line_config()?;
        Ok(config)
    }
}
