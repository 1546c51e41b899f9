//! Normalized input events and the clients consuming them

use std::sync::Arc;

use log::*;
use serde::Serialize;

use crate::elan::{RelativePointerEvent, ScrollWheelEvent, TouchFrame};

/// A normalized event as delivered to a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InputEvent {
    Touch(Box<TouchFrame>),
    Pointer(RelativePointerEvent),
    Scroll(ScrollWheelEvent),
}

pub type InputEventSender = crossbeam_channel::Sender<InputEvent>;
pub type InputEventReceiver = crossbeam_channel::Receiver<InputEvent>;

/// Consumer of normalized input events
pub trait InputSink: Send + Sync {
    fn touch_frame(&self, _frame: &TouchFrame) {}
    fn relative_pointer(&self, _event: &RelativePointerEvent) {}
    fn scroll(&self, _event: &ScrollWheelEvent) {}
}

/// Forwards every event into a channel
pub struct ChannelSink {
    sender: InputEventSender,
}

impl ChannelSink {
    pub fn new(sender: InputEventSender) -> Self {
        Self { sender }
    }

    /// Creates a sink along with the receiving end of its channel
    pub fn unbounded() -> (Arc<Self>, InputEventReceiver) {
        let (s, r) = crossbeam_channel::unbounded();
        (Arc::new(Self::new(s)), r)
    }

    fn forward(&self, event: InputEvent) {
        if self.sender.send(event).is_err() {
            trace!("input event receiver disconnected");
        }
    }
}

impl InputSink for ChannelSink {
    fn touch_frame(&self, frame: &TouchFrame) {
        self.forward(InputEvent::Touch(Box::new(frame.clone())));
    }

    fn relative_pointer(&self, event: &RelativePointerEvent) {
        self.forward(InputEvent::Pointer(*event));
    }

    fn scroll(&self, event: &ScrollWheelEvent) {
        self.forward(InputEvent::Scroll(*event));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr, strum::EnumIter)]
pub enum ClientRole {
    /// Multi-touch frames
    Touch,
    /// Trackpoint pointer motion and buttons
    Pointer,
    /// Trackpoint scrolling
    Scroll,
}

/// Clients attached to the driver, at most one per role
#[derive(Default)]
pub struct ClientRegistry {
    touch: Option<Arc<dyn InputSink>>,
    pointer: Option<Arc<dyn InputSink>>,
    scroll: Option<Arc<dyn InputSink>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, role: ClientRole) -> &mut Option<Arc<dyn InputSink>> {
        match role {
            ClientRole::Touch => &mut self.touch,
            ClientRole::Pointer => &mut self.pointer,
            ClientRole::Scroll => &mut self.scroll,
        }
    }

    /// Attaches a client, replacing any previous one in that role
    pub fn register_client(&mut self, role: ClientRole, sink: Arc<dyn InputSink>) {
        if self.slot(role).replace(sink).is_some() {
            warn!("replacing {:?} client", role);
        } else {
            debug!("{:?} client registered", role);
        }
    }

    /// Detaches the client of a role. Returns whether one was attached.
    pub fn unregister_client(&mut self, role: ClientRole) -> bool {
        let removed = self.slot(role).take().is_some();
        if removed {
            debug!("{:?} client unregistered", role);
        }
        removed
    }

    pub fn is_open(&self, role: ClientRole) -> bool {
        match role {
            ClientRole::Touch => self.touch.is_some(),
            ClientRole::Pointer => self.pointer.is_some(),
            ClientRole::Scroll => self.scroll.is_some(),
        }
    }

    pub fn emit_touch_frame(&self, frame: &TouchFrame) {
        match &self.touch {
            Some(c) => c.touch_frame(frame),
            None => trace!("no touch client, frame dropped"),
        }
    }

    pub fn emit_relative_pointer(&self, event: &RelativePointerEvent) {
        match &self.pointer {
            Some(c) => c.relative_pointer(event),
            None => trace!("no pointer client, event dropped"),
        }
    }

    pub fn emit_scroll(&self, event: &ScrollWheelEvent) {
        match &self.scroll {
            Some(c) => c.scroll(event),
            None => trace!("no scroll client, event dropped"),
        }
    }
}
