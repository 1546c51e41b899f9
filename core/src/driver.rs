//! The touchpad driver: single owner of all device and policy state

use std::sync::Arc;

use log::*;

use crate::clock::{Clock, Timestamp};
use crate::config::DriverConfig;
use crate::debuggable::{Debuggable, DebuggableProperties};
use crate::elan::report::get_report;
use crate::elan::{
    BringUp, BringUpState, ContactArena, DeviceGeometry, DropReason, ETP_SMBUS_SLEEP_CMD,
    ElanError, ElanResult, PowerController, PowerHooks, PowerState, ReportKind, SuppressionPolicy,
    TrackpointEngine, TrackpointOutput,
};
use crate::input::{ClientRegistry, ClientRole, InputSink};
use crate::smbus::SmbusTransport;

/// Bus side of the driver: transport and bring-up progress
struct Device<T: SmbusTransport> {
    transport: T,
    bringup: BringUp,
}

impl<T: SmbusTransport> Device<T> {
    fn send_sleep(&mut self) -> ElanResult<()> {
        Ok(self.transport.write_byte(ETP_SMBUS_SLEEP_CMD)?)
    }
}

/// Power hooks running bring-up inline on the driver's clock
struct DeviceHooks<'a, T: SmbusTransport, C: Clock> {
    device: &'a mut Device<T>,
    clock: &'a C,
}

impl<T: SmbusTransport, C: Clock> PowerHooks for DeviceHooks<'_, T, C> {
    fn wake(&mut self) -> ElanResult<()> {
        let dev = &mut *self.device;
        dev.bringup.try_initialize(&mut dev.transport, self.clock)
    }

    fn sleep(&mut self) -> ElanResult<()> {
        self.device.send_sleep()
    }
}

/// A wake-up whose bring-up runs away from the dispatch thread.
///
/// Holds the device until handed back through [`ElanTouchpad::finish_wake`].
pub struct WakeJob<T: SmbusTransport> {
    device: Device<T>,
}

impl<T: SmbusTransport> WakeJob<T> {
    /// Brings the device up, settle delay and retries included
    pub fn run(&mut self, clock: &impl Clock) -> ElanResult<()> {
        let dev = &mut self.device;
        dev.bringup.try_initialize(&mut dev.transport, clock)
    }
}

/// What became of a single host-notify
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    Touch,
    Pointer,
    Scroll,
    Suppressed(DropReason),
}

pub struct ElanTouchpad<T: SmbusTransport, C: Clock> {
    /// `None` while a [`WakeJob`] holds the device
    device: Option<Device<T>>,
    clock: C,
    geometry: DeviceGeometry,
    contacts: ContactArena,
    trackpoint: TrackpointEngine,
    suppression: SuppressionPolicy,
    power: PowerController,
    clients: ClientRegistry,
    reports: u64,
    dropped: u64,
}

impl<T: SmbusTransport, C: Clock> ElanTouchpad<T, C> {
    pub fn new(transport: T, clock: C, config: &DriverConfig) -> Self {
        Self {
            device: Some(Device {
                transport,
                bringup: BringUp::new(config.retry_policy()),
            }),
            clock,
            geometry: DeviceGeometry::elan_smbus(),
            contacts: ContactArena::new(),
            trackpoint: TrackpointEngine::new(),
            suppression: SuppressionPolicy::new(config.suppression()),
            power: PowerController::new(),
            clients: ClientRegistry::new(),
            reports: 0,
            dropped: 0,
        }
    }

    /// Brings the device up, retrying as configured
    pub fn start(&mut self) -> ElanResult<()> {
        let dev = self.device.as_mut().ok_or(ElanError::WakeInProgress)?;
        dev.bringup.try_initialize(&mut dev.transport, &self.clock)?;

        info!(
            "ELAN touchpad ready: {}x{}, {}x{} dots/mm",
            self.geometry.max_x, self.geometry.max_y, self.geometry.x_res, self.geometry.y_res
        );
        Ok(())
    }

    /// Releases the device. Sleep failures are logged only.
    pub fn stop(&mut self) {
        match self.device.as_mut() {
            Some(dev) => {
                if let Err(e) = dev.send_sleep() {
                    error!("failed to put touchpad to sleep: {}", e);
                }
            }
            None => warn!("touchpad stopped while waking up"),
        }
        info!("ELAN touchpad stopped");
    }

    pub fn is_ready(&self) -> bool {
        self.device.as_ref().is_some_and(|d| d.bringup.is_ready())
    }

    /// Whether a [`WakeJob`] currently holds the device
    pub fn is_waking(&self) -> bool {
        self.device.is_none()
    }

    pub fn bringup_state(&self) -> Option<&BringUpState> {
        self.device.as_ref().map(|d| d.bringup.state())
    }

    pub fn geometry(&self) -> &DeviceGeometry {
        &self.geometry
    }

    /// Reads and dispatches one report after the device signalled
    /// host-notify.
    ///
    /// Errors concern this report only and have already been logged.
    pub fn handle_host_notify(&mut self) -> ElanResult<ReportOutcome> {
        let dev = self.device.as_mut().ok_or(ElanError::WakeInProgress)?;
        let report = get_report(&mut dev.transport)?;
        let now = self.clock.now_ns();
        self.reports += 1;

        if let Some(reason) = self.suppression.check_report(now) {
            return Ok(self.drop_report(reason));
        }

        let kind = report.kind().inspect_err(|e| {
            error!("{}", e);
        })?;
        trace!("report {:?}: {:?}", kind, report);

        match kind {
            ReportKind::Absolute => {
                if let Some(reason) = self.suppression.check_absolute(now) {
                    return Ok(self.drop_report(reason));
                }
                let frame = self.contacts.process_report(&report, &self.geometry, now);
                self.clients.emit_touch_frame(&frame);
                Ok(ReportOutcome::Touch)
            }
            ReportKind::Trackpoint => {
                let output = self.trackpoint.process(&report.trackpoint_packet(), now);
                if let Some(t) = self.trackpoint.last_motion() {
                    self.suppression.note_trackpoint(t);
                }
                match output {
                    TrackpointOutput::Pointer(ev) => {
                        self.clients.emit_relative_pointer(&ev);
                        Ok(ReportOutcome::Pointer)
                    }
                    TrackpointOutput::Scroll(ev) => {
                        self.clients.emit_scroll(&ev);
                        Ok(ReportOutcome::Scroll)
                    }
                }
            }
        }
    }

    fn drop_report(&mut self, reason: DropReason) -> ReportOutcome {
        trace!("report suppressed: {}", reason);
        self.dropped += 1;
        ReportOutcome::Suppressed(reason)
    }

    /// Keystroke notification, `timestamp` from the driver's clock
    pub fn on_keyboard_activity(&mut self, timestamp: Timestamp) {
        self.suppression.note_keyboard(timestamp);
    }

    /// Keyboard driver's touchpad toggle. Returns whether the state changed.
    pub fn set_touchpad_enabled(&mut self, enabled: bool) -> bool {
        self.suppression.set_enabled(enabled)
    }

    pub fn touchpad_enabled(&self) -> bool {
        self.suppression.enabled()
    }

    /// Follows the host's power state, bringing the device up inline on
    /// wake. Returns whether the state changed.
    ///
    /// While a [`WakeJob`] is out only the state is recorded, the device
    /// catches up in [`Self::finish_wake`].
    pub fn set_power_state(&mut self, state: PowerState) -> bool {
        match self.device.as_mut() {
            Some(device) => self.power.set_state(
                state,
                &mut DeviceHooks {
                    device,
                    clock: &self.clock,
                },
            ),
            None => self.power.transition(state),
        }
    }

    /// Moves to `Awake` and lends the device out, so bring-up can run on
    /// another thread.
    ///
    /// Returns `None` when already awake or when an earlier wake-up still
    /// holds the device.
    pub fn begin_wake(&mut self) -> Option<WakeJob<T>> {
        if !self.power.transition(PowerState::Awake) {
            return None;
        }
        let device = self.device.take()?;
        debug!("wake-up bring-up handed off");
        Some(WakeJob { device })
    }

    /// Takes the device back from a finished [`WakeJob`]. Puts it back to
    /// sleep if the host did so in the meantime.
    pub fn finish_wake(&mut self, job: WakeJob<T>) {
        let mut device = job.device;
        if self.power.state() == PowerState::Asleep {
            if let Err(e) = device.send_sleep() {
                error!("failed to put touchpad to sleep: {}", e);
            }
        }
        debug!("wake-up finished: {:?}", device.bringup.state());
        self.device = Some(device);
    }

    pub fn power_state(&self) -> PowerState {
        self.power.state()
    }

    pub fn register_client(&mut self, role: ClientRole, sink: Arc<dyn InputSink>) {
        self.clients.register_client(role, sink);
    }

    pub fn unregister_client(&mut self, role: ClientRole) -> bool {
        self.clients.unregister_client(role)
    }

    pub fn is_open(&self, role: ClientRole) -> bool {
        self.clients.is_open(role)
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn transport(&self) -> Option<&T> {
        self.device.as_ref().map(|d| &d.transport)
    }

    pub fn transport_mut(&mut self) -> Option<&mut T> {
        self.device.as_mut().map(|d| &mut d.transport)
    }
}

fn format_ts(ts: Option<Timestamp>) -> String {
    ts.map_or_else(|| "never".to_string(), |t| format!("{} ns", t))
}

impl<T: SmbusTransport, C: Clock> Debuggable for ElanTouchpad<T, C> {
    fn get_debug_properties(&self) -> DebuggableProperties {
        use crate::debuggable::*;

        let slots = self
            .contacts
            .slots()
            .iter()
            .map(|s| {
                dbgprop_group!(
                    format!("Finger {}", s.finger_id),
                    vec![
                        dbgprop_bool!("Valid", s.valid),
                        dbgprop_udec!("X", s.current.x),
                        dbgprop_udec!("Y", s.current.y),
                        dbgprop_udec!("Previous X", s.previous.x),
                        dbgprop_udec!("Previous Y", s.previous.y),
                        dbgprop_udec!("Major", s.major),
                        dbgprop_udec!("Minor", s.minor),
                        dbgprop_udec!("Pressure", s.pressure),
                    ]
                )
            })
            .collect();

        vec![
            dbgprop_header!("Device"),
            dbgprop_enum!(
                "Bring-up",
                self.bringup_state().map_or("WakeInProgress", |s| s.into())
            ),
            dbgprop_enum!("Power", self.power.state()),
            dbgprop_udec!("Max X", self.geometry.max_x),
            dbgprop_udec!("Max Y", self.geometry.max_y),
            dbgprop_udec!("Resolution X", self.geometry.x_res),
            dbgprop_udec!("Resolution Y", self.geometry.y_res),
            dbgprop_udec!("Physical X (0.1 mm)", self.geometry.physical_max_x()),
            dbgprop_udec!("Physical Y (0.1 mm)", self.geometry.physical_max_y()),
            dbgprop_header!("Policy"),
            dbgprop_bool!("Touchpad enabled", self.suppression.enabled()),
            dbgprop_string!("Last keystroke", format_ts(self.suppression.last_keyboard())),
            dbgprop_string!(
                "Last trackpoint motion",
                format_ts(self.suppression.last_trackpoint())
            ),
            dbgprop_bool!("Trackpoint scrolling", self.trackpoint.scrolling()),
            dbgprop_header!("Statistics"),
            dbgprop_udec!("Reports", self.reports),
            dbgprop_udec!("Suppressed", self.dropped),
            dbgprop_group!("Contacts", slots),
        ]
    }
}
