use std::io::BufRead;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use elantp_core::smbus::I2C_SMBUS_BLOCK_MAX;

/// A host signal as recorded in a capture
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Signal {
    /// Host-notify with the block the device answered the report query with
    HostNotify {
        #[serde(with = "hex::serde")]
        report: Vec<u8>,
    },
    Keyboard,
    Enable {
        enabled: bool,
    },
    Power {
        awake: bool,
    },
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CaptureLine {
    /// Milliseconds after the device came up
    pub at_ms: u64,
    #[serde(flatten)]
    pub signal: Signal,
}

/// Parses a capture, one JSON object per line.
///
/// Blank lines and lines starting with `#` are skipped.
pub fn parse_capture(reader: impl BufRead) -> Result<Vec<CaptureLine>> {
    let mut result = vec![];

    for (i, line) in reader.lines().enumerate() {
        let line = line.context("Cannot read capture")?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let entry: CaptureLine = serde_json::from_str(trimmed)
            .with_context(|| format!("Invalid capture line {}", i + 1))?;
        if let Signal::HostNotify { report } = &entry.signal {
            if report.len() > I2C_SMBUS_BLOCK_MAX {
                bail!(
                    "Capture line {}: report of {} bytes exceeds SMBus block size",
                    i + 1,
                    report.len()
                );
            }
        }
        result.push(entry);
    }
    Ok(result)
}
