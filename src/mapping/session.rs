//! Guided mapping session.
//!
//! Walks the selected layout one button at a time, consuming the committed
//! event stream from the listener. The first committed event binds the
//! session to its joystick; events from other devices are ignored. A timeout
//! omits the current button, a duplicate assignment is rejected, and
//! advancing past the last button completes the session.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::listener::event::ClassifiedEvent;
use crate::listener::registry::DeviceMap;
use crate::mapping::error::MappingError;
use crate::mapping::layout::{button_key, Layout};
use crate::mapping::layout_file::{AssignmentMap, ButtonAssignment, LayoutFile};

/// Outcome of feeding one classified event into the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionProgress {
    /// The event carried no action for this session.
    Pending,
    /// The current button was assigned; the session advanced.
    Assigned { button: String, description: String },
    /// The current button was skipped via the hold-to-omit gesture.
    Omitted { button: String },
    /// The value is already held by another button; the session stays put.
    AlreadyAssigned { button: String, description: String },
}

/// State of one guided mapping run.
pub struct MappingSession {
    layout: Layout,
    joystick: Option<String>,
    devices: DeviceMap,
    assignments: AssignmentMap,
    current: usize,
    force_complete: bool,
    complete: bool,
}

impl MappingSession {
    /// `joystick` pre-selects a device by instance id; when `None`, the first
    /// committed event selects one.
    pub fn new(layout: Layout, joystick: Option<u32>, force_complete: bool) -> Self {
        info!(
            "Starting mapping session for layout '{}' ({} buttons)",
            layout.name(),
            layout.len()
        );
        Self {
            layout,
            joystick: joystick.map(|id| id.to_string()),
            devices: DeviceMap::new(),
            assignments: AssignmentMap::new(),
            current: 0,
            force_complete,
            complete: false,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn joystick(&self) -> Option<&str> {
        self.joystick.as_deref()
    }

    /// Display label of the button currently being mapped.
    pub fn current_label(&self) -> Option<&str> {
        self.layout.label(self.current)
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn assigned_count(&self) -> usize {
        self.assignments.len()
    }

    /// Refreshes the device snapshot embedded in the saved artifact.
    pub fn update_devices(&mut self, devices: DeviceMap) {
        self.devices = devices;
    }

    /// Feeds one classified event into the walk.
    pub fn apply(&mut self, event: ClassifiedEvent) -> SessionProgress {
        if self.complete {
            return SessionProgress::Pending;
        }
        let Some(label) = self.layout.label(self.current) else {
            return SessionProgress::Pending;
        };
        let key = button_key(label);

        let assignment = match event {
            ClassifiedEvent::Timeout => {
                // Holding past the window skips the button; any value it held
                // from an earlier pass is discarded with it.
                self.assignments.remove(&key);
                info!("Button '{}' omitted", key);
                self.advance();
                return SessionProgress::Omitted { button: key };
            }
            ClassifiedEvent::ButtonUp { device, button } => {
                if !self.accept_device(device) {
                    return SessionProgress::Pending;
                }
                ButtonAssignment::button(button)
            }
            ClassifiedEvent::HatMotion { device, hat, value } => {
                if !self.accept_device(device) {
                    return SessionProgress::Pending;
                }
                ButtonAssignment::hat(hat, value)
            }
            ClassifiedEvent::AxisMotion {
                device,
                axis,
                value,
            } => {
                if !self.accept_device(device) {
                    return SessionProgress::Pending;
                }
                ButtonAssignment::axis(axis, value)
            }
            ClassifiedEvent::Inspect(_) => return SessionProgress::Pending,
        };

        let description = assignment.describe();
        let duplicate = self
            .assignments
            .iter()
            .any(|(held, value)| *value == assignment && *held != key);
        if duplicate {
            debug!("Rejecting duplicate assignment {} for '{}'", description, key);
            return SessionProgress::AlreadyAssigned {
                button: key,
                description,
            };
        }

        info!("Button '{}' assigned to {}", key, description);
        self.assignments.insert(key.clone(), assignment);
        self.advance();
        SessionProgress::Assigned {
            button: key,
            description,
        }
    }

    /// Binds the session to the first pressed joystick; afterwards only that
    /// device's events count.
    fn accept_device(&mut self, device: u32) -> bool {
        let device = device.to_string();
        match &self.joystick {
            None => {
                info!("Session bound to joystick {}", device);
                self.joystick = Some(device);
                true
            }
            Some(selected) => *selected == device,
        }
    }

    fn advance(&mut self) {
        self.current += 1;
        if self.current >= self.layout.len() {
            info!(
                "Mapping session complete: {} of {} buttons assigned",
                self.assignments.len(),
                self.layout.len()
            );
            self.complete = true;
        }
    }

    /// Builds the persistable artifact from the session state.
    ///
    /// Fails when no joystick was ever selected, or when a complete layout
    /// was required but buttons were omitted.
    pub fn to_layout_file(&self) -> Result<LayoutFile, MappingError> {
        let joystick = self
            .joystick
            .clone()
            .ok_or(MappingError::NoJoystickSelected)?;

        if self.force_complete && self.assignments.len() != self.layout.len() {
            return Err(MappingError::IncompleteLayout {
                assigned: self.assignments.len(),
                expected: self.layout.len(),
            });
        }

        Ok(LayoutFile {
            joysticks_info: self.devices.clone(),
            layout: self.layout.name().to_string(),
            joystick_configured: joystick.clone(),
            assignments: BTreeMap::from([(joystick, self.assignments.clone())]),
        })
    }
}
