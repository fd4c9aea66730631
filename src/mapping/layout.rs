//! Named button layouts.
//!
//! A layout is an ordered list of logical button labels. A label may carry a
//! display-only hint in parentheses ("A (SOUTH)"); the persisted key strips
//! it ("A"). Custom layouts merge over the built-ins from a
//! `custom_layouts.json` in the working directory; a file that cannot be
//! parsed is logged and ignored.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, warn};

use crate::mapping::error::MappingError;

/// Label of the guide/home button, present in the richer layouts.
pub const HOME_BUTTON: &str = "HOME";

/// Name of the most complete built-in layout.
pub const FULL_LAYOUT: &str = "Full";

/// Default file name for user-provided layouts.
pub const CUSTOM_LAYOUTS_FILE: &str = "custom_layouts.json";

/// Strips the display-only parenthetical hint from a button label.
pub fn button_key(label: &str) -> String {
    match label.split_once('(') {
        Some((head, _)) => head.trim().to_string(),
        None => label.trim().to_string(),
    }
}

/// One named, ordered button layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    name: String,
    buttons: Vec<String>,
}

impl Layout {
    pub fn new(name: impl Into<String>, buttons: Vec<String>) -> Self {
        Self {
            name: name.into(),
            buttons,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.buttons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buttons.is_empty()
    }

    /// Display label at `index`.
    pub fn label(&self, index: usize) -> Option<&str> {
        self.buttons.get(index).map(String::as_str)
    }

    /// Persisted key at `index` (label minus the parenthetical hint).
    pub fn key(&self, index: usize) -> Option<String> {
        self.label(index).map(button_key)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.buttons.iter().map(String::as_str)
    }
}

/// The set of known layouts: built-ins plus merged custom ones.
#[derive(Debug, Clone)]
pub struct LayoutCatalog {
    entries: Vec<Layout>,
}

impl LayoutCatalog {
    /// The eight built-in layouts.
    pub fn builtin() -> Self {
        let owned = |labels: &[&str]| labels.iter().map(|s| s.to_string()).collect();

        let entries = vec![
            Layout::new(
                "Menu",
                owned(&[
                    "UP", "DOWN", "LEFT", "RIGHT", "A (SOUTH)", "B (EAST)", "X (WEST)",
                    "Y (NORTH)", "L1", "R1", "SELECT", "START",
                ]),
            ),
            Layout::new(
                "Retro",
                owned(&[
                    "UP", "DOWN", "LEFT", "RIGHT", "A (SOUTH)", "B (EAST)", "SELECT", "START",
                ]),
            ),
            Layout::new(
                "Retro Plus",
                owned(&[
                    "UP", "DOWN", "LEFT", "RIGHT", "A (SOUTH)", "B (EAST)", "X (WEST)",
                    "Y (NORTH)", "L1", "R1", "SELECT", "START",
                ]),
            ),
            Layout::new(
                "Arcade",
                owned(&[
                    "ANALOG UP", "ANALOG DOWN", "ANALOG LEFT", "ANALOG RIGHT", "A (SOUTH)",
                    "B (EAST)", "X (WEST)", "Y (NORTH)", "L1", "R1", "SELECT", "START",
                ]),
            ),
            Layout::new(
                "Arcade Plus",
                owned(&[
                    "ANALOG UP", "ANALOG DOWN", "ANALOG LEFT", "ANALOG RIGHT", "A (SOUTH)",
                    "B (EAST)", "X (WEST)", "Y (NORTH)", "L1", "L2", "R1", "R2", "SELECT",
                    "START", HOME_BUTTON,
                ]),
            ),
            Layout::new(
                "Gamepad",
                owned(&[
                    "D-UP", "D-DOWN", "D-LEFT", "D-RIGHT", "ANALOG UP", "ANALOG DOWN",
                    "ANALOG LEFT", "ANALOG RIGHT", "A (SOUTH)", "B (EAST)", "X (WEST)",
                    "Y (NORTH)", "L1", "R1", "SELECT", "START",
                ]),
            ),
            Layout::new(
                "Gamepad Plus",
                owned(&[
                    "D-UP", "D-DOWN", "D-LEFT", "D-RIGHT", "ANALOG UP", "ANALOG DOWN",
                    "ANALOG LEFT", "ANALOG RIGHT", "A (SOUTH)", "B (EAST)", "X (WEST)",
                    "Y (NORTH)", "L1", "L2", "R1", "R2", "SELECT", "START", HOME_BUTTON,
                ]),
            ),
            Layout::new(
                FULL_LAYOUT,
                owned(&[
                    "D-UP", "D-DOWN", "D-LEFT", "D-RIGHT", "LEFT ANALOG UP", "LEFT ANALOG DOWN",
                    "LEFT ANALOG LEFT", "LEFT ANALOG RIGHT", "RIGHT ANALOG UP",
                    "RIGHT ANALOG DOWN", "RIGHT ANALOG LEFT", "RIGHT ANALOG RIGHT", "A (SOUTH)",
                    "B (EAST)", "X (WEST)", "Y (NORTH)", "L1", "L2", "L3", "R1", "R2", "R3",
                    "SELECT", "START", HOME_BUTTON,
                ]),
            ),
        ];

        Self { entries }
    }

    /// Built-ins plus custom layouts merged from `path`, if present.
    pub fn load(path: &Path) -> Self {
        let mut catalog = Self::builtin();

        if !path.exists() {
            return catalog;
        }

        match Self::read_custom(path) {
            Ok(custom) => {
                for (name, buttons) in custom {
                    debug!("Merging custom layout '{}' ({} buttons)", name, buttons.len());
                    catalog.merge(Layout::new(name, buttons));
                }
            }
            Err(e) => {
                warn!("Ignoring unreadable custom layouts at {:?}: {}", path, e);
            }
        }

        catalog
    }

    fn read_custom(path: &Path) -> Result<BTreeMap<String, Vec<String>>, MappingError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Custom layouts replace built-ins of the same name.
    fn merge(&mut self, layout: Layout) {
        match self.entries.iter_mut().find(|l| l.name() == layout.name()) {
            Some(existing) => *existing = layout,
            None => self.entries.push(layout),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Layout> {
        self.entries.iter().find(|l| l.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(Layout::name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_button_key_strips_parenthetical_hint() {
        assert_eq!(button_key("A (SOUTH)"), "A");
        assert_eq!(button_key("D-UP"), "D-UP");
        assert_eq!(button_key("  START  "), "START");
    }

    #[test]
    fn test_builtin_catalog_has_the_eight_layouts() {
        let catalog = LayoutCatalog::builtin();
        let names: Vec<_> = catalog.names().collect();
        assert_eq!(
            names,
            vec![
                "Menu",
                "Retro",
                "Retro Plus",
                "Arcade",
                "Arcade Plus",
                "Gamepad",
                "Gamepad Plus",
                "Full",
            ]
        );
        assert_eq!(catalog.get("Full").unwrap().len(), 25);
        assert!(catalog.get("Retro").unwrap().labels().all(|l| !l.is_empty()));
    }

    #[test]
    fn test_custom_layouts_merge_and_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom_layouts.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"Retro": ["A", "B"], "Flight": ["TRIGGER", "THUMB (SIDE)"]}}"#
        )
        .unwrap();

        let catalog = LayoutCatalog::load(&path);
        assert_eq!(catalog.get("Retro").unwrap().len(), 2);
        let flight = catalog.get("Flight").unwrap();
        assert_eq!(flight.key(1).unwrap(), "THUMB");
        // Built-ins not named in the file are untouched.
        assert_eq!(catalog.get("Full").unwrap().len(), 25);
    }

    #[test]
    fn test_unparseable_custom_layouts_fall_back_to_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom_layouts.json");
        std::fs::write(&path, "not json at all").unwrap();

        let catalog = LayoutCatalog::load(&path);
        assert_eq!(catalog.names().count(), 8);
    }
}
