//! The persisted layout artifact.
//!
//! A layout file is a single JSON object: the device snapshot taken during
//! the session, the layout name, the configured joystick id, and one entry
//! per joystick id mapping logical button names to their recorded
//! assignments. Everything persisted goes through typed serde models.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::listener::event::{TYPE_AXIS, TYPE_BUTTON, TYPE_HAT};
use crate::listener::registry::DeviceMap;
use crate::mapping::error::MappingError;
use crate::mapping::layout::LayoutCatalog;

pub const BUTTON_DESCRIPTION: &str = "BUTTON";
pub const HAT_DESCRIPTION: &str = "D-PAD";
pub const AXIS_DESCRIPTION: &str = "ANALOG JOYSTICK / TRIGGER";

/// One recorded physical input, keyed by a logical button name.
///
/// Serialized field layouts differ per kind (a hat carries its hat index and
/// an `(x, y)` pair, an axis its index and deflection sign, a plain button
/// just the button index), so the variants are distinguished untagged by the
/// fields they carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ButtonAssignment {
    Hat {
        #[serde(rename = "type")]
        kind: i32,
        description: String,
        hat: u8,
        value: (i8, i8),
    },
    Axis {
        #[serde(rename = "type")]
        kind: i32,
        description: String,
        axis: u8,
        value: i8,
    },
    Button {
        #[serde(rename = "type")]
        kind: i32,
        description: String,
        value: u8,
    },
}

impl ButtonAssignment {
    pub fn button(button: u8) -> Self {
        Self::Button {
            kind: TYPE_BUTTON,
            description: BUTTON_DESCRIPTION.to_string(),
            value: button,
        }
    }

    pub fn axis(axis: u8, value: f32) -> Self {
        Self::Axis {
            kind: TYPE_AXIS,
            description: AXIS_DESCRIPTION.to_string(),
            axis,
            // Only the deflection direction is meaningful at commit time.
            value: if value < 0.0 { -1 } else { 1 },
        }
    }

    pub fn hat(hat: u8, value: (i8, i8)) -> Self {
        Self::Hat {
            kind: TYPE_HAT,
            description: HAT_DESCRIPTION.to_string(),
            hat,
            value,
        }
    }

    /// Short human-readable form, e.g. `5`, `HAT 0, 1`, `AXIS 4, -1`.
    pub fn describe(&self) -> String {
        match self {
            Self::Button { value, .. } => value.to_string(),
            Self::Hat { value, .. } => format!("HAT {}, {}", value.0, value.1),
            Self::Axis { axis, value, .. } => format!("AXIS {}, {}", axis, value),
        }
    }
}

/// Assignments of one joystick, keyed by logical button name.
pub type AssignmentMap = BTreeMap<String, ButtonAssignment>;

/// The complete persisted artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutFile {
    pub joysticks_info: DeviceMap,
    pub layout: String,
    pub joystick_configured: String,
    /// One entry per joystick id; in practice only the configured one.
    #[serde(flatten)]
    pub assignments: BTreeMap<String, AssignmentMap>,
}

impl LayoutFile {
    /// Assignments recorded for the configured joystick.
    pub fn configured_assignments(&self) -> Option<&AssignmentMap> {
        self.assignments.get(&self.joystick_configured)
    }

    /// Writes the artifact as pretty-printed JSON.
    pub fn save_to(&self, path: &Path) -> Result<(), MappingError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!("Layout saved to {:?}", path);
        Ok(())
    }

    /// Saves to `explicit` when given, otherwise to a generated
    /// `<LAYOUT>_<device name>.json` under `output_dir` (collision-suffixed).
    /// Returns the path written.
    pub fn save(
        &self,
        explicit: Option<&Path>,
        output_dir: &Path,
    ) -> Result<PathBuf, MappingError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let device_name = self
                    .joysticks_info
                    .get(&self.joystick_configured)
                    .map(|info| info.name.as_str())
                    .unwrap_or("joystick");
                Self::generate_path(output_dir, &self.layout, device_name)
            }
        };
        self.save_to(&path)?;
        Ok(path)
    }

    /// Loads and validates an artifact: the layout name must be known to the
    /// catalog and the configured joystick must have an assignment entry.
    pub fn load(path: &Path, catalog: &LayoutCatalog) -> Result<Self, MappingError> {
        let raw = std::fs::read_to_string(path)?;
        let file: LayoutFile = serde_json::from_str(&raw)?;

        if !catalog.contains(&file.layout) {
            return Err(MappingError::UnknownLayout(file.layout));
        }
        if file.configured_assignments().is_none() {
            return Err(MappingError::MalformedLayoutFile(format!(
                "no assignments for configured joystick {}",
                file.joystick_configured
            )));
        }

        Ok(file)
    }

    fn generate_path(output_dir: &Path, layout: &str, device_name: &str) -> PathBuf {
        let stem = sanitized_stem(&format!("{}_{}", layout.to_uppercase(), device_name));
        let stem = if stem.is_empty() {
            "layout".to_string()
        } else {
            stem.chars().take(64).collect()
        };

        let mut path = output_dir.join(format!("{stem}.json"));
        let mut counter = 0;
        while path.exists() {
            counter += 1;
            path = output_dir.join(format!("{stem}_{counter}.json"));
        }
        path
    }
}

/// Reduces a name to a safe file stem: spaces become underscores, anything
/// outside `[A-Za-z0-9_.-]` is dropped, and degenerate results are rejected.
pub fn sanitized_stem(name: &str) -> String {
    let collapsed = name.trim().replace(' ', "_");
    let stem: String = collapsed
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .collect();
    if matches!(stem.as_str(), "" | "." | "..") {
        String::new()
    } else {
        stem
    }
}
