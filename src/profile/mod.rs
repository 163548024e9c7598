//! Profile resolution.
//!
//! A profile reference is either a path (it contains a `/` once backslashes
//! are normalized), loaded directly from the container at that path, or a
//! bare name, searched for in the `profile_path` roots. The search visits the
//! roots from the last entry to the first, so entries added later override
//! the defaults listed before them, and stops at the first success.
//!
//! The containers themselves are external collaborators reached through
//! [`ContainerFactory`] and [`Container`]. [`fs::FsContainerFactory`] is the
//! on-disk implementation.

pub mod fs;

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// A loaded profile.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    name: String,
    location: String,
    metadata: Map<String, Value>,
}

impl Profile {
    pub fn new(
        name: impl Into<String>,
        location: impl Into<String>,
        metadata: Map<String, Value>,
    ) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            metadata,
        }
    }

    /// Canonical short name (basename without extension).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Where the profile was loaded from.
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Operating system family the profile describes, if recorded.
    pub fn os(&self) -> Option<&str> {
        self.get("os").and_then(Value::as_str)
    }
}

/// The profile held by a session: loaded, or unset with the reason why.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileSlot {
    Unset { reason: String },
    Loaded(Arc<Profile>),
}

impl Default for ProfileSlot {
    fn default() -> Self {
        ProfileSlot::Unset {
            reason: "Set this to a valid profile (e.g. `set profile Win7SP1x64`).".to_string(),
        }
    }
}

impl ProfileSlot {
    pub fn profile(&self) -> Option<&Profile> {
        match self {
            ProfileSlot::Loaded(profile) => Some(profile),
            ProfileSlot::Unset { .. } => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, ProfileSlot::Loaded(_))
    }
}

/// Failure of a single container operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("no entry named {0}")]
    Key(String),

    #[error("{location} is not a valid profile: {reason}")]
    Invalid { location: String, reason: String },
}

impl LoadError {
    /// Misses are recorded and the search moves on; anything else stops it.
    fn is_miss(&self) -> bool {
        matches!(self, LoadError::NotFound(_) | LoadError::Key(_))
    }
}

/// Failure to resolve a profile reference.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    #[error("Profile {reference} not found ({})", .attempts.join("; "))]
    NotFound {
        reference: String,
        attempts: Vec<String>,
    },

    #[error("Profile {reference} could not be loaded: {reason}")]
    Invalid { reference: String, reason: String },
}

/// A source of profiles: a directory, an archive, a remote store.
pub trait Container {
    /// Human-readable location, used in logs and error messages.
    fn location(&self) -> String;

    /// Open a nested container by name.
    fn open_sub_container(&self, name: &str) -> Result<Box<dyn Container>, LoadError>;

    /// Load the profile this container holds, naming it `canonical_name`.
    fn load_profile(&self, canonical_name: &str) -> Result<Profile, LoadError>;
}

/// Opens containers by location. `None` is the default container.
pub trait ContainerFactory {
    fn open(&self, location: Option<&str>) -> Result<Box<dyn Container>, LoadError>;
}

/// Normalize a reference to forward slashes and derive its canonical name.
///
/// ```
/// use memshell::profile::normalize_reference;
/// let (path, name) = normalize_reference(r"C:\profiles\Win7SP1x64.json");
/// assert_eq!(path, "C:/profiles/Win7SP1x64.json");
/// assert_eq!(name, "Win7SP1x64");
/// ```
pub fn normalize_reference(reference: &str) -> (String, String) {
    let normalized = reference.replace('\\', "/");
    let base = crate::config::base_name(&normalized);
    let canonical = match base.rfind('.') {
        Some(dot) if dot > 0 => &base[..dot],
        _ => base,
    };
    let canonical = canonical.to_string();
    (normalized, canonical)
}

/// Resolve `reference` to a profile.
///
/// `profile_path` is the configured list of search roots; an empty list
/// searches the default container once.
pub fn resolve_profile(
    factory: &dyn ContainerFactory,
    reference: &str,
    profile_path: &[String],
) -> Result<Profile, ProfileError> {
    let (normalized, canonical) = normalize_reference(reference);

    if normalized.contains('/') {
        return factory
            .open(Some(&normalized))
            .and_then(|container| container.load_profile(&canonical))
            .map(|profile| {
                info!("Loaded profile {} from {}", canonical, profile.location());
                profile
            })
            .map_err(|e| match e {
                LoadError::Invalid { reason, .. } => ProfileError::Invalid {
                    reference: reference.to_string(),
                    reason,
                },
                miss => ProfileError::NotFound {
                    reference: reference.to_string(),
                    attempts: vec![miss.to_string()],
                },
            });
    }

    let roots: Vec<Option<&str>> = if profile_path.is_empty() {
        vec![None]
    } else {
        profile_path.iter().rev().map(|p| Some(p.as_str())).collect()
    };

    let mut attempts = Vec::with_capacity(roots.len());
    for root in roots {
        let attempt = factory
            .open(root)
            .and_then(|container| container.open_sub_container(&normalized))
            .and_then(|container| container.load_profile(&canonical));

        match attempt {
            Ok(profile) => {
                info!("Loaded profile {} from {}", normalized, profile.location());
                return Ok(profile);
            }
            Err(e) if e.is_miss() => {
                debug!(
                    "Could not find profile {} in {}: {}",
                    normalized,
                    root.unwrap_or("<default>"),
                    e
                );
                attempts.push(format!("{}: {}", root.unwrap_or("<default>"), e));
            }
            Err(e) => {
                return Err(ProfileError::Invalid {
                    reference: reference.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    Err(ProfileError::NotFound {
        reference: reference.to_string(),
        attempts,
    })
}
