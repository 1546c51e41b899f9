//! ELAN touchpad SMBus protocol
//!
//! ## Bring-up
//!
//! ```mermaid
//! stateDiagram-v2
//!     direction LR
//!     [*] --> Uninitialized
//!     Uninitialized --> HandshakeSent: hello packet read (0xA7)
//!     HandshakeSent --> Enabled: hello matches, enable sent (0x20)
//!     Enabled --> AbsoluteModeSet: mode block written (0x00)
//!     Uninitialized --> Failed
//!     HandshakeSent --> Failed
//!     Enabled --> Failed
//!     AbsoluteModeSet --> [*]
//! ```
//!
//! ## Report layout
//!
//! Reports are polled with a block read of `0xB5` after the device signals
//! host-notify. The block is placed at offset 2 of a report buffer so the
//! offsets below match the I2C variant of the protocol.
//!
//! | Offset | Contents                                         |
//! |--------|--------------------------------------------------|
//! | 2      | Report id (0x5D absolute, 0x5E trackpoint)       |
//! | 3      | Touch info: bit 0 click, bits 3..8 finger valid  |
//! | 4..    | 5 bytes per *valid* finger                       |
//! | 30     | Hover info                                       |
//! | 3..9   | Trackpoint packet (trackpoint reports)           |

pub mod bringup;
pub mod contact;
pub mod power;
pub mod report;
pub mod suppression;
pub mod trackpoint;

pub use bringup::{BringUp, BringUpState, RetryPolicy};
pub use contact::{ContactArena, ContactSlot, Coordinates, DeviceGeometry, TouchFrame};
pub use power::{PowerController, PowerHooks, PowerState};
pub use report::{RawReport, ReportKind};
pub use suppression::{DropReason, SuppressionConfig, SuppressionPolicy};
pub use trackpoint::{RelativePointerEvent, ScrollWheelEvent, TrackpointEngine, TrackpointOutput};

use thiserror::Error;

use crate::smbus::TransportError;

// SMBus commands
pub const ETP_SMBUS_IAP_CMD: u8 = 0x00;
pub const ETP_SMBUS_ENABLE_TP: u8 = 0x20;
pub const ETP_SMBUS_SLEEP_CMD: u8 = 0x21;
pub const ETP_SMBUS_HELLOPACKET_CMD: u8 = 0xA7;
pub const ETP_SMBUS_PACKET_QUERY: u8 = 0xB5;

pub const ETP_SMBUS_HELLOPACKET_LEN: usize = 5;
/// Every byte of the hello packet carries this value
pub const ETP_SMBUS_HELLOPACKET_BYTE: u8 = 0x55;
pub const ETP_SMBUS_REPORT_LEN: usize = 32;
pub const ETP_SMBUS_REPORT_OFFSET: usize = 2;

/// Absolute reporting mode, written through the IAP command
pub const ETP_ENABLE_ABS: u8 = 0x01;

pub const ETP_MAX_REPORT_LEN: usize = 39;
pub const ETP_REPORT_ID: u8 = 0x5D;
pub const ETP_TP_REPORT_ID: u8 = 0x5E;
pub const ETP_REPORT_ID_OFFSET: usize = 2;
pub const ETP_TOUCH_INFO_OFFSET: usize = 3;
pub const ETP_FINGER_DATA_OFFSET: usize = 4;
pub const ETP_HOVER_INFO_OFFSET: usize = 30;
pub const ETP_TP_PACKET_LEN: usize = 6;

pub const ETP_MAX_FINGERS: usize = 5;
pub const ETP_FINGER_DATA_LEN: usize = 5;
pub const ETP_MAX_PRESSURE: u32 = 255;
/// Subtracted from the per-trace width before computing contact area
pub const ETP_FWIDTH_REDUCE: u32 = 90;

pub const ETP_RETRY_COUNT: u32 = 5;

/// Errors raised while talking to the touchpad or decoding its reports
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ElanError {
    /// Underlying bus transfer failed
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Hello packet had the wrong length
    #[error("hello packet length {len}, expected {expected}", expected = ETP_SMBUS_HELLOPACKET_LEN)]
    ProtocolMismatch { len: usize },

    /// Hello packet content did not match
    #[error("hello packet mismatch: {hello:02X?}")]
    HandshakeFailed { hello: [u8; ETP_SMBUS_HELLOPACKET_LEN] },

    /// Switching to absolute mode failed
    #[error("failed to switch to absolute mode: {0}")]
    ModeSetFailed(TransportError),

    /// Report block had the wrong length
    #[error("wrong report length ({len} vs {expected} expected)")]
    LengthMismatch { len: usize, expected: usize },

    /// Report id is neither absolute nor trackpoint
    #[error("invalid report id {0:02X}")]
    UnknownReportId(u8),

    /// Transport is held by a wake-up still in progress
    #[error("touchpad is waking up")]
    WakeInProgress,

    /// Decoded contact lies outside of the device's logical area
    #[error("[{finger}] x={x} y={y} over max ({max_x}, {max_y})")]
    OutOfBounds {
        finger: usize,
        x: u32,
        y: u32,
        max_x: u32,
        max_y: u32,
    },
}

impl ElanError {
    /// Whether the error concerns a single report rather than the device.
    ///
    /// The dispatch loop logs bad frames quietly, everything else is a
    /// device or bus problem.
    pub fn is_bad_frame(&self) -> bool {
        matches!(
            self,
            Self::LengthMismatch { .. } | Self::UnknownReportId(_) | Self::OutOfBounds { .. }
        )
    }
}

pub type ElanResult<T> = Result<T, ElanError>;
