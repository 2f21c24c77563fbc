//! Known equipment profiles.

use std::collections::BTreeMap;

use crate::entry::field;
use crate::types::{FieldValue, Fields};

/// Profile document of one device (bike, shoe, trainer, ...).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceProfile {
    pub fields: Fields,
}

impl DeviceProfile {
    pub const fn new(fields: Fields) -> Self {
        Self { fields }
    }

    /// Sport label associated with the device, if the profile names one.
    pub fn sport(&self) -> Option<&str> {
        self.fields.get(field::SPORT).and_then(FieldValue::as_str)
    }
}

/// Lookup of device profiles keyed by identifier (the device's directory name).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<String, DeviceProfile>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, profile: DeviceProfile) {
        self.devices.insert(id.into(), profile);
    }

    pub fn get(&self, id: &str) -> Option<&DeviceProfile> {
        self.devices.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.devices.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    /// Sport label of a device; empty for an empty id or a profile without one.
    pub fn sport_of(&self, id: &str) -> String {
        if id.is_empty() {
            return String::new();
        }
        self.get(id)
            .and_then(DeviceProfile::sport)
            .unwrap_or_default()
            .to_string()
    }
}

impl FromIterator<(String, DeviceProfile)> for DeviceRegistry {
    fn from_iter<I: IntoIterator<Item = (String, DeviceProfile)>>(iter: I) -> Self {
        Self {
            devices: iter.into_iter().collect(),
        }
    }
}

/// Normalizes a comma-separated equipment list into device identifiers.
///
/// `"Focus MTB, Garmin Edge"` becomes `["focus-mtb", "garmin-edge"]`.
pub fn parse_equipment(text: &str) -> Vec<String> {
    text.split(',')
        .map(|item| item.trim().replace(' ', "-").to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}
