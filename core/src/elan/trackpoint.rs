//! Embedded pointing stick
//!
//! Holding the middle button while moving the stick on both axes latches
//! scroll mode: motion pans content instead of moving the cursor until the
//! middle button is released.

use log::*;
use proc_bitfield::bitfield;
use serde::{Deserialize, Serialize};

use super::ETP_TP_PACKET_LEN;
use crate::clock::Timestamp;

/// Low nibble of packet byte 3 when the packet carries motion
pub const ETP_TP_MOTION_VALID: u8 = 0x06;

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct TrackpointButtons(pub u8): Debug, FromStorage, IntoStorage {
        pub left: bool @ 0,
        pub right: bool @ 1,
        pub middle: bool @ 2,
    }
}

impl TrackpointButtons {
    /// Button state as reported to the pointer client
    pub fn mask(&self) -> u8 {
        self.0 & 0x07
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackpointSample {
    pub buttons: TrackpointButtons,
    pub x: i32,
    pub y: i32,
}

impl TrackpointSample {
    pub fn moved(&self) -> bool {
        self.x != 0 || self.y != 0
    }
}

/// Decodes the 6-byte trackpoint packet.
///
/// Deltas are 9-bit values: bytes 1/2 hold the sign-centered upper part
/// (XOR 0x80), bytes 4/5 the low part. Y grows upwards on the wire.
pub fn decode_trackpoint(packet: &[u8; ETP_TP_PACKET_LEN]) -> TrackpointSample {
    let buttons = TrackpointButtons(packet[0]);
    let (x, y) = if packet[3] & 0x0F == ETP_TP_MOTION_VALID {
        (
            i32::from(packet[4]) - (i32::from(packet[1] ^ 0x80) << 1),
            (i32::from(packet[2] ^ 0x80) << 1) - i32::from(packet[5]),
        )
    } else {
        (0, 0)
    };

    TrackpointSample { buttons, x, y }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelativePointerEvent {
    pub dx: i32,
    pub dy: i32,
    pub buttons: u8,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollWheelEvent {
    pub delta_axis1: i32,
    pub delta_axis2: i32,
    pub delta_axis3: i32,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackpointOutput {
    Pointer(RelativePointerEvent),
    Scroll(ScrollWheelEvent),
}

/// Trackpoint motion decoding and the scroll-mode latch
#[derive(Default)]
pub struct TrackpointEngine {
    scrolling: bool,
    last_motion: Option<Timestamp>,
}

impl TrackpointEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scrolling(&self) -> bool {
        self.scrolling
    }

    /// Time of the last packet with non-zero motion
    pub fn last_motion(&self) -> Option<Timestamp> {
        self.last_motion
    }

    pub fn process(
        &mut self,
        packet: &[u8; ETP_TP_PACKET_LEN],
        timestamp: Timestamp,
    ) -> TrackpointOutput {
        let sample = decode_trackpoint(packet);
        if sample.moved() {
            self.last_motion = Some(timestamp);
        }

        // Both axes have to move, a middle click with a slight wobble on
        // one axis stays a click.
        if sample.buttons.middle() && sample.x != 0 && sample.y != 0 && !self.scrolling {
            debug!("trackpoint scroll mode on");
            self.scrolling = true;
        }
        if !sample.buttons.middle() && self.scrolling {
            debug!("trackpoint scroll mode off");
            self.scrolling = false;
        }

        if self.scrolling {
            TrackpointOutput::Scroll(ScrollWheelEvent {
                delta_axis1: -sample.y,
                delta_axis2: -sample.x,
                delta_axis3: 0,
                timestamp,
            })
        } else {
            TrackpointOutput::Pointer(RelativePointerEvent {
                dx: sample.x,
                dy: sample.y,
                buttons: sample.buttons.mask(),
                timestamp,
            })
        }
    }
}
