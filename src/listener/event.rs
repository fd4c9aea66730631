//! Event vocabulary for the listener pipeline.
//!
//! Raw events come out of the event source as small, device-local deltas;
//! the normalizer reduces them to the committed [`ClassifiedEvent`] stream
//! that the mapping consumer sees. Every variant carries only the fields
//! relevant to its kind.
//!
//! ## Value conventions
//! - **Axes:** normalized to `[-1.0, 1.0]`. Stick axes occupy indices 0..=3,
//!   analog triggers sit above 3.
//! - **Buttons:** press/release edges with a device-local button index.
//! - **Hats (POV/D-pad):** `(x, y)` with each component in `{-1, 0, 1}`.

use crate::listener::registry::DeviceMap;

/// Stable per-session identifier of a controller instance.
pub type DeviceId = u32;

/// Type code attached to a committed button assignment.
pub const TYPE_BUTTON: i32 = 0;
/// Type code attached to a committed axis assignment.
pub const TYPE_AXIS: i32 = 1;
/// Type code attached to a committed hat assignment.
pub const TYPE_HAT: i32 = 2;
/// Type code of a hot-plug device arrival.
pub const TYPE_DEVICE_ADDED: i32 = 3;
/// Type code of a hot-plug device removal.
pub const TYPE_DEVICE_REMOVED: i32 = 4;
/// Sentinel type code of the synthetic timeout event.
pub const TYPE_TIMEOUT: i32 = -1;

/// Raw input change reported by an [`EventSource`](crate::listener::EventSource).
///
/// Produced once per polling tick and consumed immediately by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawEvent {
    ButtonDown { device: DeviceId, button: u8 },
    ButtonUp { device: DeviceId, button: u8 },
    AxisMotion { device: DeviceId, axis: u8, value: f32 },
    HatMotion { device: DeviceId, hat: u8, value: (i8, i8) },
    DeviceAdded { device: DeviceId },
    DeviceRemoved { device: DeviceId },
}

impl RawEvent {
    /// True for the hot-plug variants that drive registry re-enumeration.
    pub fn is_hotplug(&self) -> bool {
        matches!(
            self,
            RawEvent::DeviceAdded { .. } | RawEvent::DeviceRemoved { .. }
        )
    }

    /// Numeric type code of this event kind.
    pub fn type_code(&self) -> i32 {
        match self {
            RawEvent::ButtonDown { .. } | RawEvent::ButtonUp { .. } => TYPE_BUTTON,
            RawEvent::AxisMotion { .. } => TYPE_AXIS,
            RawEvent::HatMotion { .. } => TYPE_HAT,
            RawEvent::DeviceAdded { .. } => TYPE_DEVICE_ADDED,
            RawEvent::DeviceRemoved { .. } => TYPE_DEVICE_REMOVED,
        }
    }
}

/// A committed, semantically meaningful action.
///
/// Emitted at most once per logical action. `Timeout` is synthesized by the
/// debounce machine when an armed press is held past the skip window and
/// carries no payload; `Inspect` wraps a raw event verbatim and only appears
/// in free mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClassifiedEvent {
    ButtonUp { device: DeviceId, button: u8 },
    AxisMotion { device: DeviceId, axis: u8, value: f32 },
    HatMotion { device: DeviceId, hat: u8, value: (i8, i8) },
    Timeout,
    Inspect(RawEvent),
}

impl ClassifiedEvent {
    /// Numeric type code of this event (`-1` for the timeout sentinel).
    pub fn type_code(&self) -> i32 {
        match self {
            ClassifiedEvent::ButtonUp { .. } => TYPE_BUTTON,
            ClassifiedEvent::AxisMotion { .. } => TYPE_AXIS,
            ClassifiedEvent::HatMotion { .. } => TYPE_HAT,
            ClassifiedEvent::Timeout => TYPE_TIMEOUT,
            ClassifiedEvent::Inspect(raw) => raw.type_code(),
        }
    }
}

/// Envelope dispatched from the listener worker to its single consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum ListenerEvent {
    /// The attached device set changed; carries the full new snapshot.
    DevicesChanged(DeviceMap),
    /// A committed action (or free-mode passthrough).
    Classified(ClassifiedEvent),
}
