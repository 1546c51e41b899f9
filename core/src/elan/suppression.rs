use log::*;

use crate::clock::{NS_PER_MS, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuppressionConfig {
    pub disable_while_typing: bool,
    pub disable_while_trackpoint: bool,
    /// Keep reporting even when the keyboard driver disabled the touchpad
    pub ignore_set_touchpad_status: bool,
    pub dwt_timeout_ns: u64,
    pub dwtp_timeout_ns: u64,
}

impl Default for SuppressionConfig {
    fn default() -> Self {
        Self {
            disable_while_typing: true,
            disable_while_trackpoint: true,
            ignore_set_touchpad_status: false,
            dwt_timeout_ns: 500 * NS_PER_MS,
            dwtp_timeout_ns: 500 * NS_PER_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
pub enum DropReason {
    /// Touchpad switched off through the keyboard
    Disabled,
    /// Recent keystroke
    Typing,
    /// Recent trackpoint motion
    Trackpoint,
}

/// Whether `now` lies less than `timeout` after `last`.
///
/// Unsigned wrap-around makes a timestamp from the future count as long
/// ago.
fn within(last: Option<Timestamp>, now: Timestamp, timeout: u64) -> bool {
    last.is_some_and(|t| now.wrapping_sub(t) < timeout)
}

/// Drops reports while the touchpad is switched off or another input
/// device was used recently
pub struct SuppressionPolicy {
    config: SuppressionConfig,
    ignore_all: bool,
    last_keyboard: Option<Timestamp>,
    last_trackpoint: Option<Timestamp>,
}

impl SuppressionPolicy {
    pub fn new(config: SuppressionConfig) -> Self {
        Self {
            config,
            ignore_all: false,
            last_keyboard: None,
            last_trackpoint: None,
        }
    }

    pub fn config(&self) -> &SuppressionConfig {
        &self.config
    }

    /// Gate applied to every report before dispatch
    pub fn check_report(&self, now: Timestamp) -> Option<DropReason> {
        if self.ignore_all && !self.config.ignore_set_touchpad_status {
            return Some(DropReason::Disabled);
        }
        if self.config.disable_while_typing
            && within(self.last_keyboard, now, self.config.dwt_timeout_ns)
        {
            return Some(DropReason::Typing);
        }
        None
    }

    /// Additional gate for absolute (finger) reports
    pub fn check_absolute(&self, now: Timestamp) -> Option<DropReason> {
        if self.config.disable_while_trackpoint
            && within(self.last_trackpoint, now, self.config.dwtp_timeout_ns)
        {
            return Some(DropReason::Trackpoint);
        }
        None
    }

    pub fn note_keyboard(&mut self, timestamp: Timestamp) {
        self.last_keyboard = Some(timestamp);
    }

    pub fn note_trackpoint(&mut self, timestamp: Timestamp) {
        self.last_trackpoint = Some(timestamp);
    }

    pub fn last_keyboard(&self) -> Option<Timestamp> {
        self.last_keyboard
    }

    pub fn last_trackpoint(&self) -> Option<Timestamp> {
        self.last_trackpoint
    }

    /// Applies the keyboard's touchpad toggle. Returns whether the state
    /// changed; redundant toggles are ignored.
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        if enabled != self.ignore_all {
            return false;
        }
        self.ignore_all = !enabled;
        info!(
            "touchpad {}",
            if enabled { "enabled" } else { "disabled" }
        );
        true
    }

    pub fn enabled(&self) -> bool {
        !self.ignore_all
    }
}
