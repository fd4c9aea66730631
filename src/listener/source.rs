//! Raw event sources.
//!
//! The listener loop never talks to the input library directly; it drives an
//! [`EventSource`], which keeps the registry, normalizer and loop logic
//! identical between the gilrs-backed production source and the scripted
//! source the tests use.

use std::collections::HashMap;

use gilrs::{Axis, Button, Event, EventType, Gilrs};
use tracing::{debug, info, warn};

use crate::listener::event::{DeviceId, RawEvent};
use crate::listener::listener::ListenerError;
use crate::listener::registry::Device;

/// Boundary between the listener loop and the underlying input subsystem.
///
/// All I/O through this trait is best-effort: a failing device must never
/// take the loop down, so `enumerate`, `drain` and `shutdown` are infallible
/// and swallow hardware errors internally.
pub trait EventSource {
    /// Brings the input subsystem up, unless a host already did.
    ///
    /// Idempotent. Implementations record whether they performed the
    /// initialization themselves so that [`shutdown`](Self::shutdown) can
    /// honor the cooperative-ownership rule.
    fn initialize(&mut self) -> Result<(), ListenerError>;

    /// Enumerates currently attached devices, in a stable order.
    ///
    /// Opens handles for newly seen devices as a side effect (best-effort).
    fn enumerate(&mut self) -> Vec<Device>;

    /// Drains all raw events that accumulated since the last tick.
    fn drain(&mut self) -> Vec<RawEvent>;

    /// Tears down whatever this source itself initialized, and nothing else.
    fn shutdown(&mut self);
}

/// Production source backed by gilrs.
///
/// Two deployment variants:
/// - [`GilrsSource::new`] (standalone): the context is created during
///   [`EventSource::initialize`] and dropped on shutdown.
/// - [`GilrsSource::with_context`] (embedded): a host hands over an
///   already-initialized context; initialize is a no-op and shutdown leaves
///   the context alive for the host to dispose of.
///
/// The context is created on the listener worker thread (it is not `Send` on
/// every platform), so constructing the standalone variant is cheap and the
/// actual subsystem init happens inside `initialize`.
pub struct GilrsSource {
    context: Option<Gilrs>,
    pre_initialized: bool,
    /// Last seen hat state per device. gilrs reports D-pads as buttons or as
    /// the DPadX/DPadY axes depending on platform; both fold into this state
    /// so the rest of the pipeline only ever sees hat motion.
    hats: HashMap<DeviceId, (i8, i8)>,
}

impl GilrsSource {
    /// Standalone variant: owns the full lifecycle of the input subsystem.
    pub fn new() -> Self {
        Self {
            context: None,
            pre_initialized: false,
            hats: HashMap::new(),
        }
    }

    /// Embedded variant: wraps a context the host already initialized.
    pub fn with_context(context: Gilrs) -> Self {
        Self {
            context: Some(context),
            pre_initialized: true,
            hats: HashMap::new(),
        }
    }

    fn convert(&mut self, id: DeviceId, event: EventType) -> Option<RawEvent> {
        match event {
            EventType::ButtonPressed(button, _) => match button {
                Button::DPadUp | Button::DPadDown | Button::DPadLeft | Button::DPadRight => {
                    Some(self.dpad_button(id, button, true))
                }
                _ => button_index(button).map(|button| RawEvent::ButtonDown { device: id, button }),
            },
            EventType::ButtonReleased(button, _) => match button {
                Button::DPadUp | Button::DPadDown | Button::DPadLeft | Button::DPadRight => {
                    Some(self.dpad_button(id, button, false))
                }
                _ => button_index(button).map(|button| RawEvent::ButtonUp { device: id, button }),
            },
            EventType::ButtonRepeated(button, _) => {
                // Auto-repeat is noise for mapping purposes.
                debug!("Button repeat ignored: {:?}", button);
                None
            }
            EventType::AxisChanged(Axis::DPadX, value, _) => {
                Some(self.dpad_axis(id, value, false))
            }
            EventType::AxisChanged(Axis::DPadY, value, _) => Some(self.dpad_axis(id, value, true)),
            EventType::AxisChanged(axis, value, _) => {
                axis_index(axis).map(|axis| RawEvent::AxisMotion {
                    device: id,
                    axis,
                    value,
                })
            }
            EventType::Connected => Some(RawEvent::DeviceAdded { device: id }),
            EventType::Disconnected => {
                self.hats.remove(&id);
                Some(RawEvent::DeviceRemoved { device: id })
            }
            _ => {
                debug!("Unhandled gilrs event type: {:?}", event);
                None
            }
        }
    }

    fn dpad_button(&mut self, id: DeviceId, button: Button, pressed: bool) -> RawEvent {
        let state = self.hats.entry(id).or_insert((0, 0));
        let (dx, dy) = match button {
            Button::DPadUp => (0, 1),
            Button::DPadDown => (0, -1),
            Button::DPadLeft => (-1, 0),
            Button::DPadRight => (1, 0),
            _ => (0, 0),
        };
        if pressed {
            if dx != 0 {
                state.0 = dx;
            }
            if dy != 0 {
                state.1 = dy;
            }
        } else {
            if dx != 0 && state.0 == dx {
                state.0 = 0;
            }
            if dy != 0 && state.1 == dy {
                state.1 = 0;
            }
        }
        RawEvent::HatMotion {
            device: id,
            hat: 0,
            value: *state,
        }
    }

    fn dpad_axis(&mut self, id: DeviceId, value: f32, vertical: bool) -> RawEvent {
        let state = self.hats.entry(id).or_insert((0, 0));
        let step = if value >= 0.5 {
            1
        } else if value <= -0.5 {
            -1
        } else {
            0
        };
        if vertical {
            state.1 = step;
        } else {
            state.0 = step;
        }
        RawEvent::HatMotion {
            device: id,
            hat: 0,
            value: *state,
        }
    }
}

impl Default for GilrsSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for GilrsSource {
    fn initialize(&mut self) -> Result<(), ListenerError> {
        if self.context.is_some() {
            if self.pre_initialized {
                debug!("Input context pre-initialized by host, skipping init");
            }
            return Ok(());
        }

        info!("Initializing gilrs input context");
        match Gilrs::new() {
            Ok(context) => {
                self.context = Some(context);
                Ok(())
            }
            Err(e) => Err(ListenerError::Initialization(e.to_string())),
        }
    }

    fn enumerate(&mut self) -> Vec<Device> {
        let Some(context) = self.context.as_ref() else {
            return Vec::new();
        };

        context
            .gamepads()
            .filter(|(_, gamepad)| gamepad.is_connected())
            .map(|(id, gamepad)| Device {
                instance_id: usize::from(id) as DeviceId,
                name: gamepad.name().to_string(),
                guid: hex_guid(gamepad.uuid()),
            })
            .collect()
    }

    fn drain(&mut self) -> Vec<RawEvent> {
        let mut raw = Vec::new();
        loop {
            let next = match self.context.as_mut() {
                Some(context) => context.next_event(),
                None => None,
            };
            let Some(Event { id, event, .. }) = next else {
                break;
            };
            if let Some(converted) = self.convert(usize::from(id) as DeviceId, event) {
                raw.push(converted);
            }
        }
        raw
    }

    fn shutdown(&mut self) {
        self.hats.clear();
        if self.pre_initialized {
            debug!("Leaving host-initialized input context untouched");
            return;
        }
        if self.context.take().is_some() {
            info!("Input context shut down");
        }
    }
}

/// SDL-style button index for a gilrs button.
///
/// D-pad buttons are deliberately absent: they fold into hat state.
fn button_index(button: Button) -> Option<u8> {
    match button {
        Button::South => Some(0),
        Button::East => Some(1),
        Button::West => Some(2),
        Button::North => Some(3),
        Button::Select => Some(4),
        Button::Mode => Some(5),
        Button::Start => Some(6),
        Button::LeftThumb => Some(7),
        Button::RightThumb => Some(8),
        Button::LeftTrigger => Some(9),
        Button::RightTrigger => Some(10),
        Button::LeftTrigger2 => Some(11),
        Button::RightTrigger2 => Some(12),
        _ => {
            warn!("Unmapped gilrs button: {:?}", button);
            None
        }
    }
}

/// Axis index: sticks occupy 0..=3, analog triggers sit above 3.
fn axis_index(axis: Axis) -> Option<u8> {
    match axis {
        Axis::LeftStickX => Some(0),
        Axis::LeftStickY => Some(1),
        Axis::RightStickX => Some(2),
        Axis::RightStickY => Some(3),
        Axis::LeftZ => Some(4),
        Axis::RightZ => Some(5),
        _ => None,
    }
}

fn hex_guid(uuid: [u8; 16]) -> String {
    let mut guid = String::with_capacity(32);
    for byte in uuid {
        guid.push_str(&format!("{byte:02x}"));
    }
    guid
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted source driving the pipeline deterministically in tests.

    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug, Default)]
    pub struct ScriptState {
        pub devices: Vec<Device>,
        pub ticks: VecDeque<Vec<RawEvent>>,
        pub pre_initialized: bool,
        pub initialized: bool,
        pub shut_down: bool,
    }

    pub struct ScriptedSource {
        state: Arc<Mutex<ScriptState>>,
    }

    impl ScriptedSource {
        pub fn new() -> (Self, Arc<Mutex<ScriptState>>) {
            let state = Arc::new(Mutex::new(ScriptState::default()));
            (
                Self {
                    state: state.clone(),
                },
                state,
            )
        }

        pub fn with_devices(devices: Vec<Device>) -> Self {
            let (source, state) = Self::new();
            state.lock().unwrap().devices = devices;
            source
        }

        pub fn set_devices(&mut self, devices: Vec<Device>) {
            self.state.lock().unwrap().devices = devices;
        }
    }

    impl EventSource for ScriptedSource {
        fn initialize(&mut self) -> Result<(), ListenerError> {
            let mut state = self.state.lock().unwrap();
            if !state.pre_initialized {
                state.initialized = true;
            }
            Ok(())
        }

        fn enumerate(&mut self) -> Vec<Device> {
            self.state.lock().unwrap().devices.clone()
        }

        fn drain(&mut self) -> Vec<RawEvent> {
            self.state
                .lock()
                .unwrap()
                .ticks
                .pop_front()
                .unwrap_or_default()
        }

        fn shutdown(&mut self) {
            let mut state = self.state.lock().unwrap();
            if !state.pre_initialized {
                state.shut_down = true;
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_standalone_source_owns_teardown() {
            let (mut source, state) = ScriptedSource::new();
            source.initialize().unwrap();
            source.shutdown();
            assert!(state.lock().unwrap().initialized);
            assert!(state.lock().unwrap().shut_down);
        }

        #[test]
        fn test_embedded_source_never_tears_down_host_state() {
            let (mut source, state) = ScriptedSource::new();
            state.lock().unwrap().pre_initialized = true;
            source.initialize().unwrap();
            source.shutdown();
            assert!(!state.lock().unwrap().initialized);
            assert!(!state.lock().unwrap().shut_down);
        }
    }
}
