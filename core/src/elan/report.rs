use log::*;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use proc_bitfield::bitfield;

use super::{
    ETP_FINGER_DATA_OFFSET, ETP_HOVER_INFO_OFFSET, ETP_MAX_REPORT_LEN,
    ETP_REPORT_ID_OFFSET, ETP_SMBUS_PACKET_QUERY, ETP_SMBUS_REPORT_LEN, ETP_SMBUS_REPORT_OFFSET,
    ETP_TOUCH_INFO_OFFSET, ETP_TP_PACKET_LEN, ElanError, ElanResult,
};
use crate::smbus::SmbusTransport;

/// Kind of report, by report id
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, strum::IntoStaticStr)]
pub enum ReportKind {
    /// Multi-touch frame
    Absolute = 0x5D,
    /// Pointing stick motion
    Trackpoint = 0x5E,
}

bitfield! {
    /// Touch info byte of an absolute report
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct TouchInfo(pub u8): Debug, FromStorage, IntoStorage {
        /// Physical button pressed
        pub button_down: bool @ 0,
        /// One bit per finger slot
        pub contacts: u8 @ 3..8,
    }
}

impl TouchInfo {
    pub fn contact_valid(&self, finger: usize) -> bool {
        self.contacts() & (1 << finger) != 0
    }
}

bitfield! {
    /// Hover info byte of an absolute report
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct HoverInfo(pub u8): Debug, FromStorage, IntoStorage {
        pub hovering: bool @ 6,
    }
}

/// One report as read from the device.
///
/// The SMBus block lives at `ETP_SMBUS_REPORT_OFFSET` within the buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct RawReport {
    buf: [u8; ETP_MAX_REPORT_LEN],
}

impl RawReport {
    /// Wraps a received SMBus block, which must be exactly one report long.
    pub fn from_block(block: &[u8]) -> ElanResult<Self> {
        if block.len() != ETP_SMBUS_REPORT_LEN {
            return Err(ElanError::LengthMismatch {
                len: block.len(),
                expected: ETP_SMBUS_REPORT_LEN,
            });
        }

        let mut buf = [0; ETP_MAX_REPORT_LEN];
        buf[ETP_SMBUS_REPORT_OFFSET..ETP_SMBUS_REPORT_OFFSET + ETP_SMBUS_REPORT_LEN]
            .copy_from_slice(block);
        Ok(Self { buf })
    }

    pub fn report_id(&self) -> u8 {
        self.buf[ETP_REPORT_ID_OFFSET]
    }

    pub fn kind(&self) -> ElanResult<ReportKind> {
        let id = self.report_id();
        ReportKind::from_u8(id).ok_or_else(|| ElanError::UnknownReportId(id))
    }

    pub fn touch_info(&self) -> TouchInfo {
        TouchInfo(self.buf[ETP_TOUCH_INFO_OFFSET])
    }

    pub fn hover_info(&self) -> HoverInfo {
        HoverInfo(self.buf[ETP_HOVER_INFO_OFFSET])
    }

    /// Packed finger records, valid fingers only, in slot order
    pub fn finger_data(&self) -> &[u8] {
        &self.buf[ETP_FINGER_DATA_OFFSET..ETP_HOVER_INFO_OFFSET]
    }

    pub fn trackpoint_packet(&self) -> [u8; ETP_TP_PACKET_LEN] {
        let start = ETP_REPORT_ID_OFFSET + 1;
        let mut packet = [0; ETP_TP_PACKET_LEN];
        packet.copy_from_slice(&self.buf[start..start + ETP_TP_PACKET_LEN]);
        packet
    }
}

impl std::fmt::Debug for RawReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RawReport({:02X?})",
            &self.buf[ETP_SMBUS_REPORT_OFFSET..ETP_SMBUS_REPORT_OFFSET + ETP_SMBUS_REPORT_LEN]
        )
    }
}

/// Polls one report from the device
pub fn get_report(bus: &mut impl SmbusTransport) -> ElanResult<RawReport> {
    let block = bus.read_block(ETP_SMBUS_PACKET_QUERY).inspect_err(|e| {
        error!("failed to read report data: {}", e);
    })?;

    RawReport::from_block(&block).inspect_err(|e| {
        error!("{}", e);
    })
}
