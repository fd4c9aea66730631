//! Event classification and debounce.
//!
//! Sits between the raw event source and the dispatch channel. In free mode
//! it is a transparent passthrough for diagnostics; in guided mode it reduces
//! the raw stream to committed actions: releases commit presses, hats commit
//! when deflected, axes commit only at full deflection, and a press held past
//! the skip window commits an omission instead.
//!
//! All state here is owned by the listener worker thread and mutated nowhere
//! else.

use tracing::{debug, info};

use crate::listener::event::{ClassifiedEvent, RawEvent};

/// Highest axis index treated as a stick.
///
/// Axes above this are typically analog triggers: they report sustained full
/// deflection while held and must not re-trigger on every tick.
pub const STICK_AXIS_MAX: u8 = 3;

/// Listening mode, flipped by the consumer and read once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenMode {
    /// Diagnostic passthrough: every raw event is forwarded unchanged.
    Free,
    /// Normal mapping flow with debounce and threshold filtering.
    Guided,
}

/// Mutable debounce state, per listener instance (not per device).
///
/// `armed_ticks` is `Some` only between a ButtonDown and its resolution
/// (ButtonUp or timeout).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DebounceState {
    armed_ticks: Option<u32>,
    ignore_next_button_up: bool,
    ignore_next_axis: Option<u8>,
}

/// Classifies raw events and runs the debounce/timeout machine.
#[derive(Debug)]
pub struct EventNormalizer {
    state: DebounceState,
    skip_ticks: u32,
}

impl EventNormalizer {
    /// `skip_ticks` is the armed-press budget in ticks (tick rate × skip
    /// window); the omission fires on the first tick beyond it.
    pub fn new(skip_ticks: u32) -> Self {
        Self {
            state: DebounceState::default(),
            skip_ticks,
        }
    }

    /// Drops all in-flight state back to neutral.
    ///
    /// Called when the mode toggles so classification stays deterministic
    /// across the switch.
    pub fn reset(&mut self) {
        self.state = DebounceState::default();
    }

    /// Advances the timeout machine by one tick.
    ///
    /// Returns the synthetic omission event when an armed press outlives the
    /// skip window. The eventual physical release is then swallowed by
    /// [`classify`](Self::classify).
    pub fn advance_tick(&mut self) -> Option<ClassifiedEvent> {
        let ticks = self.state.armed_ticks.as_mut()?;
        *ticks += 1;
        if *ticks <= self.skip_ticks {
            return None;
        }

        self.state.armed_ticks = None;
        self.state.ignore_next_button_up = true;
        info!("Press held past the skip window, committing omission");
        Some(ClassifiedEvent::Timeout)
    }

    /// Classifies one raw event under the given mode.
    pub fn classify(&mut self, raw: RawEvent, mode: ListenMode) -> Option<ClassifiedEvent> {
        if mode == ListenMode::Free {
            return Some(ClassifiedEvent::Inspect(raw));
        }

        match raw {
            RawEvent::ButtonDown { .. } => {
                self.state.armed_ticks = Some(0);
                None
            }
            RawEvent::ButtonUp { device, button } => {
                self.state.armed_ticks = None;
                let swallow = self.state.ignore_next_button_up;
                self.state.ignore_next_button_up = false;
                self.state.ignore_next_axis = None;
                if swallow {
                    debug!("Swallowing release paired with an omission");
                    None
                } else {
                    Some(ClassifiedEvent::ButtonUp { device, button })
                }
            }
            RawEvent::HatMotion { device, hat, value } if value != (0, 0) => {
                self.state.ignore_next_axis = None;
                Some(ClassifiedEvent::HatMotion { device, hat, value })
            }
            RawEvent::AxisMotion {
                device,
                axis,
                value,
            } if value.abs() >= 1.0 => {
                let emit = match self.state.ignore_next_axis {
                    None => true,
                    // Sticks re-trigger freely; a held trigger must not.
                    Some(ignored) => ignored != axis || ignored <= STICK_AXIS_MAX,
                };
                if !emit {
                    debug!("Suppressing repeated full deflection on axis {}", axis);
                    return None;
                }
                self.state.ignore_next_axis = Some(axis);
                Some(ClassifiedEvent::AxisMotion {
                    device,
                    axis,
                    value,
                })
            }
            // Partial deflections, neutral hats and hot-plug events carry no
            // committed action in guided mode.
            _ => None,
        }
    }
}
