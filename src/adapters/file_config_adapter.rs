//! INI file configuration adapter.

use crate::domain::error::DepotError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::{Path, PathBuf};

pub struct FileConfigAdapter {
    config: Ini,
    /// Directory of the loaded file; relative paths resolve against it
    /// unless `[paths] base` is set.
    config_dir: PathBuf,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DepotError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| DepotError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        let config_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self { config, config_dir })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self {
            config,
            config_dir: PathBuf::from("."),
        })
    }

    /// Resolves a configured path. Absolute paths are kept; relative ones
    /// are joined to `[paths] base`, or to the config file's directory.
    pub fn resolve_path(&self, value: &str) -> PathBuf {
        let path = Path::new(value.trim());
        if path.is_absolute() {
            return path.to_path_buf();
        }
        let base = self
            .get_string("paths", "base")
            .filter(|b| !b.trim().is_empty())
            .map(|b| {
                let b = PathBuf::from(b.trim());
                if b.is_absolute() {
                    b
                } else {
                    self.config_dir.join(b)
                }
            })
            .unwrap_or_else(|| self.config_dir.clone());
        base.join(path)
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Some(true),
            "false" | "no" | "0" | "off" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }
}
