//! Detect how PostGIS is installed on this machine

use crate::config::{Config, SetupMode};
use crate::tools::ClientTools;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const FALLBACK_SHARE_DIR: &str = "/usr/share";
const CONTROL_FILE: &str = "extension/postgis.control";
const LEGACY_SCRIPT_DIR: &str = "contrib/postgis-1.5";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Installation {
    /// `postgis.control` present, install with CREATE EXTENSION
    Extension,
    /// Pre-2.0 layout, install by running the scripts in this directory
    Scripts(PathBuf),
}

/// Look for a PostGIS control file, then for the legacy script directory
pub fn detect_installation(share_dir: &Path) -> Option<Installation> {
    let control_file = share_dir.join(CONTROL_FILE);
    if File::open(&control_file).is_ok() {
        return Some(Installation::Extension);
    }

    let script_dir = share_dir.join(LEGACY_SCRIPT_DIR);
    if script_dir.is_dir() {
        return Some(Installation::Scripts(script_dir));
    }

    None
}

pub fn apply_installation(config: &mut Config, installation: Installation) {
    match installation {
        Installation::Extension => {
            config.setup = SetupMode::Extension;
            config.postgis_extension = Some(vec!["postgis".to_string()]);
        }
        Installation::Scripts(dir) => {
            config.setup = SetupMode::Script;
            config.script_dir = Some(dir);
        }
    }
}

/// Fill in the install mode when the config leaves it to auto-detection.
/// An explicit script directory always wins over what is installed.
pub async fn ensure_installation_configs(config: &mut Config, tools: &ClientTools) {
    if config.setup != SetupMode::Default
        || config.postgis_extension.is_some()
        || config.script_dir.is_some()
    {
        return;
    }

    let share_dir = match tools.share_dir().await {
        Ok(dir) => dir,
        Err(e) => {
            debug!("pg_config unavailable ({}), using {}", e, FALLBACK_SHARE_DIR);
            PathBuf::from(FALLBACK_SHARE_DIR)
        }
    };

    match detect_installation(&share_dir) {
        Some(installation) => {
            info!("Detected PostGIS installation under {:?}: {:?}", share_dir, installation);
            apply_installation(config, installation);
        }
        None => debug!("No PostGIS installation found under {:?}", share_dir),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::mock::test_config;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_detect_control_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("extension")).unwrap();
        fs::write(temp_dir.path().join(CONTROL_FILE), "default_version = '3.4.2'\n").unwrap();
        // Control file wins over the legacy layout
        fs::create_dir_all(temp_dir.path().join(LEGACY_SCRIPT_DIR)).unwrap();

        assert_eq!(detect_installation(temp_dir.path()), Some(Installation::Extension));
    }

    #[test]
    fn test_detect_legacy_scripts() {
        let temp_dir = TempDir::new().unwrap();
        let script_dir = temp_dir.path().join(LEGACY_SCRIPT_DIR);
        fs::create_dir_all(&script_dir).unwrap();

        assert_eq!(
            detect_installation(temp_dir.path()),
            Some(Installation::Scripts(script_dir))
        );
    }

    #[test]
    fn test_detect_nothing() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(detect_installation(temp_dir.path()), None);
    }

    #[test]
    fn test_apply_installation() {
        let mut config = test_config(&[]);
        apply_installation(&mut config, Installation::Scripts(PathBuf::from("/opt/postgis")));
        assert_eq!(config.setup, SetupMode::Script);
        assert_eq!(config.script_dir, Some(PathBuf::from("/opt/postgis")));

        let mut config = test_config(&[]);
        apply_installation(&mut config, Installation::Extension);
        assert_eq!(config.setup, SetupMode::Extension);
        assert_eq!(config.extension_names(), vec!["postgis".to_string()]);
    }

    #[tokio::test]
    async fn test_explicit_mode_is_left_alone() {
        let mut config = test_config(&[("POSTGIS_SETUP", "script"), ("POSTGIS_SCRIPT_DIR", "/srv/gis")]);
        let tools = ClientTools::new(Some(Path::new("/nonexistent")));
        ensure_installation_configs(&mut config, &tools).await;
        assert_eq!(config.setup, SetupMode::Script);
        assert_eq!(config.script_dir, Some(PathBuf::from("/srv/gis")));
        assert!(config.postgis_extension.is_none());
    }
}
