//! `scenic.toml`.
//!
//! ```toml
//! search_paths = ["assets", "/usr/share/scenes"]
//! log_filter = "info,scenic_classic=debug"
//!
//! [classic]
//! priority = 10
//! extensions = { wrl = "VRML 2.0", x3dv = "X3D classic encoding" }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{LoadError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "scenic.toml";

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ManagerConfig {
    /// Tried in order after the current directory when a relative file name
    /// does not resolve.
    pub search_paths: Vec<PathBuf>,
    /// Default `env_logger` filter. `RUST_LOG` wins.
    pub log_filter: String,
    pub classic: ClassicConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            log_filter: "warn".to_string(),
            classic: ClassicConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ClassicConfig {
    pub priority: i32,
    /// Extension (without the dot) to description.
    pub extensions: BTreeMap<String, String>,
}

impl Default for ClassicConfig {
    fn default() -> Self {
        let extensions = [
            ("wrl", "VRML 2.0"),
            ("x3dv", "X3D classic encoding"),
            ("owrl", "Extended VRML 2.0"),
            ("ox3dv", "Extended X3D classic encoding"),
        ];
        Self {
            priority: 0,
            extensions: extensions
                .into_iter()
                .map(|(ext, description)| (ext.to_string(), description.to_string()))
                .collect(),
        }
    }
}

impl ManagerConfig {
    /// Reads `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(LoadError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::parse(&text, path)
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|source| LoadError::Config {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn missing_file_means_defaults() {
        let dir = testing::temp_dir();
        let config = ManagerConfig::load(&dir.join(DEFAULT_CONFIG_FILE)).unwrap();
        assert_eq!(config, ManagerConfig::default());
        assert!(config.classic.extensions.contains_key("x3dv"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = testing::temp_dir();
        let path = dir.join(DEFAULT_CONFIG_FILE);
        fs::write(
            &path,
            "search_paths = [\"assets\"]\n[classic]\npriority = 5\n",
        )
        .unwrap();

        let config = ManagerConfig::load(&path).unwrap();
        assert_eq!(config.search_paths, [PathBuf::from("assets")]);
        assert_eq!(config.log_filter, "warn");
        assert_eq!(config.classic.priority, 5);
        assert_eq!(config.classic.extensions.len(), 4);
    }

    #[test]
    fn invalid_toml_is_reported() {
        let path = Path::new("bad.toml");
        assert!(matches!(
            ManagerConfig::parse("search_paths = 3", path),
            Err(LoadError::Config { .. })
        ));
        assert!(matches!(
            ManagerConfig::parse("unknown = true", path),
            Err(LoadError::Config { .. })
        ));
    }
}
