use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::clock::NS_PER_MS;
use crate::elan::{ETP_RETRY_COUNT, RetryPolicy, SuppressionConfig};

/// Driver tunables, read once at startup.
///
/// Missing keys take their defaults.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct DriverConfig {
    /// Drop touchpad input shortly after a keystroke
    pub disable_while_typing: bool,
    /// Drop finger input shortly after trackpoint motion
    pub disable_while_trackpoint: bool,
    /// Keep reporting when the keyboard disables the touchpad
    pub ignore_set_touchpad_status: bool,
    pub dwt_timeout_ms: u64,
    pub dwtp_timeout_ms: u64,

    /// Delay before the first bring-up attempt
    pub settle_delay_ms: u64,
    pub retry_interval_ms: u64,
    pub retry_count: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            disable_while_typing: true,
            disable_while_trackpoint: true,
            ignore_set_touchpad_status: false,
            dwt_timeout_ms: 500,
            dwtp_timeout_ms: 500,
            settle_delay_ms: 3000,
            retry_interval_ms: 100,
            retry_count: ETP_RETRY_COUNT,
        }
    }
}

impl DriverConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Cannot open configuration '{}'", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Cannot parse configuration '{}'", path.display()))
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).context("Cannot parse configuration")
    }

    pub fn suppression(&self) -> SuppressionConfig {
        SuppressionConfig {
            disable_while_typing: self.disable_while_typing,
            disable_while_trackpoint: self.disable_while_trackpoint,
            ignore_set_touchpad_status: self.ignore_set_touchpad_status,
            dwt_timeout_ns: self.dwt_timeout_ms.saturating_mul(NS_PER_MS),
            dwtp_timeout_ns: self.dwtp_timeout_ms.saturating_mul(NS_PER_MS),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            settle: Duration::from_millis(self.settle_delay_ms),
            interval: Duration::from_millis(self.retry_interval_ms),
            attempts: self.retry_count,
        }
    }
}
