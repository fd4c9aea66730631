//! Mapping of committed controller events onto named button layouts.
//!
//! Consumes the classified event stream produced by the listener: a
//! [`session::MappingSession`] walks a [`layout::Layout`] button by button
//! and records [`layout_file::ButtonAssignment`]s, which end up in the
//! persisted [`layout_file::LayoutFile`] artifact.

pub mod error;
pub mod layout;
pub mod layout_file;
pub mod session;

pub use error::MappingError;
pub use layout::{Layout, LayoutCatalog, CUSTOM_LAYOUTS_FILE, FULL_LAYOUT, HOME_BUTTON};
pub use layout_file::{AssignmentMap, ButtonAssignment, LayoutFile};
pub use session::{MappingSession, SessionProgress};
