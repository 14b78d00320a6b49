//! Persisted camera settings.
//!
//! Upload routing, compression flags and header configuration survive
//! restarts as a JSON file per device. Loading is forgiving: a missing or
//! unreadable file yields defaults so a fresh install just works.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::context::TelescopeSelection;
use crate::delivery::UploadSettings;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CameraSettings {
    pub upload: UploadSettings,
    pub compress_primary: bool,
    pub compress_guide: bool,
    pub telescope: TelescopeSelection,
    pub wcs_enabled: bool,
}

impl CameraSettings {
    /// Default settings file location for a device,
    /// `~/.ccd_pipeline/<device>.json`.
    pub fn default_path(device_name: &str) -> PathBuf {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        home.join(".ccd_pipeline")
            .join(format!("{device_name}.json"))
    }

    /// Loads settings, falling back to defaults when the file is missing or
    /// unparseable.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!(path = %path.display(), "settings file is unreadable, using defaults: {e}");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::UploadMode;
    use tempfile::TempDir;

    #[test]
    fn round_trip_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("camera.json");

        let mut settings = CameraSettings::default();
        settings.upload.mode = UploadMode::Both;
        settings.upload.prefix = "flat_XXX".to_string();
        settings.compress_primary = true;
        settings.wcs_enabled = true;
        settings.save(&path).unwrap();

        let loaded = CameraSettings::load(&path);
        assert_eq!(loaded.upload.mode, UploadMode::Both);
        assert_eq!(loaded.upload.prefix, "flat_XXX");
        assert!(loaded.compress_primary);
        assert!(!loaded.compress_guide);
        assert!(loaded.wcs_enabled);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let loaded = CameraSettings::load(&dir.path().join("absent.json"));
        assert_eq!(loaded.upload.mode, UploadMode::Client);
        assert!(!loaded.compress_primary);
    }

    #[test]
    fn garbage_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("camera.json");
        std::fs::write(&path, "{not json").unwrap();
        let loaded = CameraSettings::load(&path);
        assert_eq!(loaded.telescope, TelescopeSelection::Primary);
    }
}
