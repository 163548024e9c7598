//! Filesystem containers.
//!
//! A directory is a container of profiles; a profile is a JSON object stored
//! either as `<name>` or `<name>.json` inside it. A directory opened as a
//! profile reads its `profile.json`.

use super::{Container, ContainerFactory, LoadError, Profile};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Opens directories and JSON files on disk.
#[derive(Debug, Clone)]
pub struct FsContainerFactory {
    default_root: PathBuf,
}

impl FsContainerFactory {
    /// `default_root` is opened when no location is given.
    pub fn new(default_root: impl Into<PathBuf>) -> Self {
        Self {
            default_root: default_root.into(),
        }
    }

    /// Default root `~/.local/share/memshell/profiles`, or
    /// `$MSH_DATA_DIR/profiles` when set. Falls back to `./profiles` when no
    /// data directory is known.
    pub fn with_data_dir() -> Self {
        if let Ok(dir) = std::env::var("MSH_DATA_DIR") {
            return Self::new(PathBuf::from(dir).join("profiles"));
        }
        let root = dirs::data_dir()
            .map(|d| d.join("memshell").join("profiles"))
            .unwrap_or_else(|| PathBuf::from("profiles"));
        Self::new(root)
    }
}

impl ContainerFactory for FsContainerFactory {
    fn open(&self, location: Option<&str>) -> Result<Box<dyn Container>, LoadError> {
        let path = match location {
            Some(location) => PathBuf::from(location),
            None => self.default_root.clone(),
        };
        FsContainer::open(path).map(|c| Box::new(c) as Box<dyn Container>)
    }
}

/// A file or directory on disk.
#[derive(Debug, Clone)]
pub struct FsContainer {
    path: PathBuf,
}

impl FsContainer {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LoadError> {
        let path = path.into();
        if !path.exists() {
            return Err(LoadError::NotFound(path.display().to_string()));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Container for FsContainer {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn open_sub_container(&self, name: &str) -> Result<Box<dyn Container>, LoadError> {
        if !self.path.is_dir() {
            return Err(LoadError::Key(name.to_string()));
        }
        let exact = self.path.join(name);
        if exact.exists() {
            return Ok(Box::new(FsContainer { path: exact }));
        }
        let with_ext = self.path.join(format!("{}.json", name));
        if with_ext.exists() {
            return Ok(Box::new(FsContainer { path: with_ext }));
        }
        Err(LoadError::NotFound(exact.display().to_string()))
    }

    fn load_profile(&self, canonical_name: &str) -> Result<Profile, LoadError> {
        let file = if self.path.is_dir() {
            self.path.join("profile.json")
        } else {
            self.path.clone()
        };
        let content = std::fs::read_to_string(&file).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => LoadError::NotFound(file.display().to_string()),
            _ => LoadError::Invalid {
                location: file.display().to_string(),
                reason: e.to_string(),
            },
        })?;

        let invalid = |reason: String| LoadError::Invalid {
            location: file.display().to_string(),
            reason,
        };
        match serde_json::from_str::<Value>(&content).map_err(|e| invalid(e.to_string()))? {
            Value::Object(metadata) => Ok(Profile::new(
                canonical_name,
                file.display().to_string(),
                metadata,
            )),
            _ => Err(invalid("expected a JSON object".to_string())),
        }
    }
}
