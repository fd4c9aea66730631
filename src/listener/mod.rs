//! Joystick input listener subsystem.
//!
//! Implements the background polling pipeline:
//!
//! 1. [`source`] - Raw event acquisition (gilrs-backed or scripted)
//! 2. [`registry`] - Device enumeration and hot-plug tracking
//! 3. [`normalizer`] - Classification, debounce and the skip-window machine
//! 4. [`listener`] - Fixed-rate loop, lifecycle and the consumer handle
//!
//! # Architecture
//!
//! ```text
//! Controller ──► EventSource ──► Normalizer ──► ListenerHandle consumer
//!                     │          (Debounce)         (channel)
//!                     └──► DeviceRegistry ──► devices-changed snapshots
//! ```
//!
//! The loop runs on its own worker thread at a fixed tick rate (60 Hz by
//! default); the consumer drains a channel on its own schedule and only
//! reaches back through the mode and stop flags.

pub mod event;
pub mod listener;
pub mod normalizer;
pub mod registry;
pub mod source;

pub use event::{ClassifiedEvent, DeviceId, ListenerEvent, RawEvent};
pub use listener::{ListenerError, ListenerHandle, ListenerSettings};
pub use normalizer::{EventNormalizer, ListenMode};
pub use registry::{Device, DeviceInfo, DeviceMap, DeviceRegistry};
pub use source::{EventSource, GilrsSource};
