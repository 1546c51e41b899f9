//! Multi-touch contact extraction from absolute reports

use log::*;
use proc_bitfield::bitfield;
use serde::{Deserialize, Serialize};

use super::report::RawReport;
use super::{
    ETP_FINGER_DATA_LEN, ETP_FWIDTH_REDUCE, ETP_MAX_FINGERS, ETP_MAX_PRESSURE, ElanError,
    ElanResult,
};
use crate::clock::Timestamp;

/// Logical and physical dimensions of the touch surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceGeometry {
    pub max_x: u32,
    pub max_y: u32,
    /// Width of one sensor trace
    pub width_x: u32,
    pub width_y: u32,
    /// Resolution in dots per mm
    pub x_res: u32,
    pub y_res: u32,
    /// Added to raw pressure before clamping
    pub pressure_adjustment: u32,
}

/// Converts the firmware resolution value to dots per mm.
///
/// The firmware value is a signed offset: `value * 10 + 790` is the dpi.
pub fn convert_resolution(val: u8) -> u32 {
    (((val as i8 as i32) * 10 + 790) * 10 / 254) as u32
}

impl DeviceGeometry {
    pub fn from_traces(
        max_x: u32,
        max_y: u32,
        x_traces: u32,
        y_traces: u32,
        hw_x_res: u8,
        hw_y_res: u8,
        pressure_adjustment: u32,
    ) -> Self {
        Self {
            max_x,
            max_y,
            width_x: max_x / x_traces.max(1),
            width_y: max_y / y_traces.max(1),
            x_res: convert_resolution(hw_x_res),
            y_res: convert_resolution(hw_y_res),
            pressure_adjustment,
        }
    }

    /// Parameters of the SMBus ELAN pads, which cannot be queried over
    /// this transport
    pub fn elan_smbus() -> Self {
        Self::from_traces(3052, 1888, 1, 1, 1, 1, 25)
    }

    /// Physical width in units of 0.1 mm
    pub fn physical_max_x(&self) -> u32 {
        self.max_x * 10 / self.x_res.max(1)
    }

    /// Physical height in units of 0.1 mm
    pub fn physical_max_y(&self) -> u32 {
        self.max_y * 10 / self.y_res.max(1)
    }
}

impl Default for DeviceGeometry {
    fn default() -> Self {
        Self::elan_smbus()
    }
}

bitfield! {
    /// Trace counts byte of a finger record
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct FingerTraces(pub u8): Debug, FromStorage, IntoStorage {
        pub mk_x: u8 @ 0..4,
        pub mk_y: u8 @ 4..8,
    }
}

/// Finger record as packed by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawContact {
    pub x: u32,
    pub y: u32,
    /// Number of traces covered
    pub mk_x: u32,
    pub mk_y: u32,
    pub pressure: u32,
}

/// Unpacks one 5-byte finger record.
///
/// Byte 0 carries the high nibbles of both coordinates (x in the upper
/// half), bytes 1 and 2 the low bytes.
pub fn unpack_finger(record: &[u8]) -> RawContact {
    let traces = FingerTraces(record[3]);
    RawContact {
        x: ((u32::from(record[0]) & 0xF0) << 4) | u32::from(record[1]),
        y: ((u32::from(record[0]) & 0x0F) << 8) | u32::from(record[2]),
        mk_x: traces.mk_x().into(),
        mk_y: traces.mk_y().into(),
        pressure: record[4].into(),
    }
}

impl RawContact {
    /// Contact ellipse axes as (major, minor).
    ///
    /// The trace width is reduced first so a large finger is not taken for
    /// a palm.
    pub fn area(&self, geometry: &DeviceGeometry) -> (u32, u32) {
        let area_x = self.mk_x * geometry.width_x.saturating_sub(ETP_FWIDTH_REDUCE);
        let area_y = self.mk_y * geometry.width_y.saturating_sub(ETP_FWIDTH_REDUCE);
        (area_x.max(area_y), area_x.min(area_y))
    }
}

/// Adjusts raw pressure, clamping at `ETP_MAX_PRESSURE`
pub fn scale_pressure(pressure: u32, adjustment: u32) -> u32 {
    pressure.saturating_add(adjustment).min(ETP_MAX_PRESSURE)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: u32,
    pub y: u32,
}

/// State of one finger slot
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSlot {
    pub finger_id: u8,
    pub valid: bool,
    pub current: Coordinates,
    pub previous: Coordinates,
    pub major: u32,
    pub minor: u32,
    pub pressure: u32,
    pub timestamp: Timestamp,
}

impl ContactSlot {
    fn update(&mut self, record: &[u8], geometry: &DeviceGeometry) -> ElanResult<()> {
        let raw = unpack_finger(record);
        if raw.x > geometry.max_x || raw.y > geometry.max_y {
            return Err(ElanError::OutOfBounds {
                finger: self.finger_id.into(),
                x: raw.x,
                y: raw.y,
                max_x: geometry.max_x,
                max_y: geometry.max_y,
            });
        }

        (self.major, self.minor) = raw.area(geometry);
        self.pressure = scale_pressure(raw.pressure, geometry.pressure_adjustment);
        self.previous = self.current;
        self.current = Coordinates { x: raw.x, y: raw.y };
        Ok(())
    }

    /// Finger lifted: hold the last position
    fn release(&mut self) {
        self.valid = false;
        self.previous = self.current;
    }
}

/// One decoded absolute report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TouchFrame {
    pub contacts: [ContactSlot; ETP_MAX_FINGERS],
    pub contact_count: u8,
    pub timestamp: Timestamp,
    /// Physical click
    pub button_down: bool,
    pub hovering: bool,
}

impl TouchFrame {
    pub fn valid_contacts(&self) -> impl Iterator<Item = &ContactSlot> {
        self.contacts.iter().filter(|c| c.valid)
    }
}

/// Fixed set of finger slots, updated in place for every absolute report
pub struct ContactArena {
    slots: [ContactSlot; ETP_MAX_FINGERS],
}

impl ContactArena {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|i| ContactSlot {
                finger_id: i as u8,
                ..Default::default()
            }),
        }
    }

    pub fn slot(&self, finger: usize) -> &ContactSlot {
        &self.slots[finger]
    }

    pub fn slots(&self) -> &[ContactSlot] {
        &self.slots
    }

    /// Updates all slots from an absolute report and builds the frame.
    ///
    /// Only valid fingers have a record in the report, so the record cursor
    /// advances for valid fingers only. A record that fails the bounds check
    /// leaves its slot's geometry untouched; the rest of the frame is still
    /// processed.
    pub fn process_report(
        &mut self,
        report: &RawReport,
        geometry: &DeviceGeometry,
        timestamp: Timestamp,
    ) -> TouchFrame {
        let info = report.touch_info();
        let mut records = report.finger_data().chunks_exact(ETP_FINGER_DATA_LEN);
        let mut contact_count = 0;

        for (finger, slot) in self.slots.iter_mut().enumerate() {
            slot.timestamp = timestamp;

            if !info.contact_valid(finger) {
                slot.release();
                continue;
            }

            slot.valid = true;
            contact_count += 1;
            if let Some(record) = records.next() {
                if let Err(e) = slot.update(record, geometry) {
                    debug!("{}", e);
                }
            }
        }

        trace!("touch frame: {} contacts", contact_count);
        TouchFrame {
            contacts: self.slots,
            contact_count,
            timestamp,
            button_down: info.button_down(),
            hovering: report.hover_info().hovering(),
        }
    }
}

impl Default for ContactArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elan::{ETP_REPORT_ID, ETP_SMBUS_REPORT_LEN};

    /// Packs a finger record the way the device does
    fn record(x: u32, y: u32, traces: u8, pressure: u8) -> [u8; 5] {
        [
            (((x >> 4) & 0xF0) | ((y >> 8) & 0x0F)) as u8,
            x as u8,
            y as u8,
            traces,
            pressure,
        ]
    }

    /// Absolute report with the given touch info and records, back to back
    fn report(touch_info: u8, records: &[[u8; 5]]) -> RawReport {
        let mut block = [0; ETP_SMBUS_REPORT_LEN];
        block[0] = ETP_REPORT_ID;
        block[1] = touch_info;
        for (i, r) in records.iter().enumerate() {
            block[2 + i * 5..2 + i * 5 + 5].copy_from_slice(r);
        }
        RawReport::from_block(&block).unwrap()
    }

    #[test]
    fn unpack_literal() {
        let c = unpack_finger(&[0x53, 0x12, 0x34, 0x73, 0x80]);
        assert_eq!(
            c,
            RawContact {
                x: 0x512,
                y: 0x334,
                mk_x: 3,
                mk_y: 7,
                pressure: 0x80,
            }
        );
    }

    #[test]
    fn default_geometry() {
        let g = DeviceGeometry::elan_smbus();
        assert_eq!(g.width_x, 3052);
        assert_eq!(g.width_y, 1888);
        assert_eq!(g.x_res, 31);
        assert_eq!(g.y_res, 31);
        assert_eq!(g.physical_max_x(), 984);
        assert_eq!(g.physical_max_y(), 609);
    }

    #[test]
    fn resolution_signed() {
        assert_eq!(convert_resolution(0), 31);
        // -1: 780 dpi
        assert_eq!(convert_resolution(0xFF), 30);
        assert_eq!(convert_resolution(10), 35);
    }

    #[test]
    fn area_reduced_width() {
        let g = DeviceGeometry::elan_smbus();
        let c = unpack_finger(&[0x53, 0x12, 0x34, 0x73, 0x80]);
        assert_eq!(c.area(&g), (7 * 1798, 3 * 2962));
    }

    #[test]
    fn pressure_clamp() {
        assert_eq!(scale_pressure(229, 25), 254);
        assert_eq!(scale_pressure(230, 25), ETP_MAX_PRESSURE);
        assert_eq!(scale_pressure(231, 25), ETP_MAX_PRESSURE);
        assert_eq!(scale_pressure(255, 255), ETP_MAX_PRESSURE);
        assert_eq!(scale_pressure(0, 25), 25);
    }

    #[test]
    fn fingers_zero_and_two() {
        let g = DeviceGeometry::elan_smbus();
        let mut arena = ContactArena::new();
        let first = record(100, 200, 0x11, 50);
        let second = record(1500, 900, 0x22, 60);

        let frame = arena.process_report(&report(0b0010_1000, &[first, second]), &g, 1234);

        assert_eq!(frame.contact_count, 2);
        assert_eq!(frame.timestamp, 1234);
        assert!(!frame.button_down);

        let c = &frame.contacts;
        assert!(c[0].valid);
        assert_eq!(c[0].current, Coordinates { x: 100, y: 200 });
        assert_eq!(c[0].pressure, 75);

        // Second record went to finger 2, not finger 1
        assert!(!c[1].valid);
        assert_eq!(c[1].current, Coordinates::default());
        assert_eq!(c[1].current, c[1].previous);

        assert!(c[2].valid);
        assert_eq!(c[2].current, Coordinates { x: 1500, y: 900 });
        assert_eq!(c[2].pressure, 85);
        assert_eq!((c[2].major, c[2].minor), (2 * 2962, 2 * 1798));

        assert!(!c[3].valid);
        assert!(!c[4].valid);
        assert!(c.iter().all(|s| s.timestamp == 1234));
        assert_eq!(frame.valid_contacts().count(), 2);
    }

    #[test]
    fn released_slot_holds_position() {
        let g = DeviceGeometry::elan_smbus();
        let mut arena = ContactArena::new();

        arena.process_report(&report(0b1000, &[record(100, 200, 0x11, 10)]), &g, 1);
        arena.process_report(&report(0b1000, &[record(110, 210, 0x11, 10)]), &g, 2);
        assert_eq!(arena.slot(0).previous, Coordinates { x: 100, y: 200 });

        for t in 3..6 {
            let frame = arena.process_report(&report(0, &[]), &g, t);
            assert_eq!(frame.contact_count, 0);
            assert!(!arena.slot(0).valid);
            assert_eq!(arena.slot(0).current, Coordinates { x: 110, y: 210 });
            assert_eq!(arena.slot(0).previous, Coordinates { x: 110, y: 210 });
        }

        arena.process_report(&report(0b1000, &[record(120, 220, 0x11, 10)]), &g, 6);
        assert_eq!(arena.slot(0).current, Coordinates { x: 120, y: 220 });
        assert_eq!(arena.slot(0).previous, Coordinates { x: 110, y: 210 });
    }

    #[test]
    fn out_of_bounds_finger_only() {
        let g = DeviceGeometry::elan_smbus();
        let mut arena = ContactArena::new();
        arena.process_report(&report(0b1000, &[record(10, 20, 0x11, 10)]), &g, 1);

        let frame = arena.process_report(
            &report(
                0b1_1000,
                &[record(3053, 20, 0x11, 10), record(30, 40, 0x11, 10)],
            ),
            &g,
            2,
        );

        // Rejected update keeps the old position
        assert_eq!(frame.contacts[0].current, Coordinates { x: 10, y: 20 });
        assert_eq!(frame.contacts[1].current, Coordinates { x: 30, y: 40 });
        assert_eq!(frame.contact_count, 2);

        let frame = arena.process_report(&report(0b1000, &[record(3052, 1889, 0, 0)]), &g, 3);
        assert_eq!(frame.contacts[0].current, Coordinates { x: 10, y: 20 });

        let frame = arena.process_report(&report(0b1000, &[record(3052, 1888, 0, 0)]), &g, 4);
        assert_eq!(frame.contacts[0].current, Coordinates { x: 3052, y: 1888 });
    }

    #[test]
    fn five_fingers() {
        let g = DeviceGeometry::elan_smbus();
        let mut arena = ContactArena::new();
        let records: Vec<[u8; 5]> = (0..5).map(|i| record(i * 100, i * 50, 0x11, 0)).collect();

        let frame = arena.process_report(&report(0b1111_1001, &records), &g, 1);

        assert_eq!(frame.contact_count, 5);
        assert!(frame.button_down);
        for (i, c) in frame.contacts.iter().enumerate() {
            let i = i as u32;
            assert_eq!(c.current, Coordinates { x: i * 100, y: i * 50 });
        }
    }
}
