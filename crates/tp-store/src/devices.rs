//! Device registry loading.
//!
//! Each known device is a directory under the devices root holding an
//! `_index.md` front-matter profile. The directory name is the identifier
//! ledger equipment names are normalized to.

use std::fs;
use std::path::Path;

use tp_core::{DeviceProfile, DeviceRegistry};

use crate::{StoreError, read_document};

/// File name of a device profile inside its directory.
pub const DEVICE_FILE_NAME: &str = "_index.md";

/// A device directory whose profile could not be read.
#[derive(Debug)]
pub struct DeviceFailure {
    pub id: String,
    pub error: StoreError,
}

/// Result of scanning the devices root.
#[derive(Debug, Default)]
pub struct DeviceLoad {
    pub registry: DeviceRegistry,
    /// Devices left out of the registry.
    pub failures: Vec<DeviceFailure>,
}

/// Reads every device profile under `root`.
///
/// A broken profile only excludes that device; an unreadable root fails.
pub fn load_devices(root: &Path) -> Result<DeviceLoad, StoreError> {
    let entries = fs::read_dir(root).map_err(StoreError::io("failed to read", root))?;

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(StoreError::io("failed to read", root))?;
        if entry.path().is_dir() {
            dirs.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    dirs.sort();

    let mut load = DeviceLoad::default();
    for id in dirs {
        match read_document(&root.join(&id).join(DEVICE_FILE_NAME)) {
            Ok(document) => load.registry.insert(id, DeviceProfile::new(document.fields)),
            Err(error) => load.failures.push(DeviceFailure { id, error }),
        }
    }

    tracing::debug!(
        devices = load.registry.len(),
        failures = load.failures.len(),
        root = %root.display(),
        "loaded device registry"
    );
    Ok(load)
}
