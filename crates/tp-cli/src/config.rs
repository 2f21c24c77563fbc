//! Configuration loading and management.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use tp_core::{EquipmentPolicy, LedgerColumns};

/// Application configuration.
///
/// Relative paths are resolved against the working directory, which is
/// usually a tools directory next to the Hugo site's `content/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root of the post entries (`{posts_dir}/{YYYY}/{key}/index.md`).
    pub posts_dir: PathBuf,
    /// Root of the device profiles (`{devices_dir}/{id}/_index.md`).
    pub devices_dir: PathBuf,
    /// Blank post copied into every new entry.
    pub template_path: PathBuf,
    /// Transcript of everything printed to the console.
    pub log_file: Option<PathBuf>,
    /// Transcript of warnings only.
    pub warn_file: Option<PathBuf>,
    /// What to do when a ledger row names an unknown device.
    pub equipment_policy: EquipmentPolicy,
    /// Look up the timezone of the first track position. When off, entry
    /// keys use UTC.
    pub timezone_lookup: bool,
    /// Column names of the ledger export.
    pub ledger: LedgerColumns,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            posts_dir: PathBuf::from("../content/post"),
            devices_dir: PathBuf::from("../content/devices"),
            template_path: PathBuf::from("../archetypes/post.md"),
            log_file: Some(PathBuf::from("out.txt")),
            warn_file: Some(PathBuf::from("warnings.txt")),
            equipment_policy: EquipmentPolicy::default(),
            timezone_lookup: true,
            ledger: LedgerColumns::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (TP_*, nested keys with `__`)
        figment = figment.merge(Env::prefixed("TP_").split("__"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for tp.
///
/// On Linux: `~/.config/tp`
pub fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tp"))
}
