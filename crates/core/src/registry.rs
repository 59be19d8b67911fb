//! External registry: resolution of opaque reference ids
//!
//! The engine never owns the objects behind an `ExternalRef`; it only asks a
//! registry what an id currently refers to. Codecs take `&dyn
//! ExternalRegistry` and treat it as read-only.
//!
//! [`StaticRegistry`] is a map-backed implementation that can be loaded from
//! a TOML manifest:
//!
//! ```toml
//! [[resource]]
//! name = "race"
//! id = 17
//!
//! [[element]]
//! id = 42
//!
//! [[object]]
//! id = 99
//! ```

use crate::config::ConfigError;
use crate::value::RefId;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// What a live reference id currently denotes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveObject {
    /// A named resource; persisted by name
    Resource { name: String },
    /// A world element; persisted by id
    Element,
    /// Anything else (timers, handles); resolvable but not persistable
    Object,
}

/// Resolves reference ids for the codecs
pub trait ExternalRegistry {
    /// What `id` refers to right now, if anything
    fn resolve(&self, id: RefId) -> Option<LiveObject>;

    /// Id of the resource called `name`
    fn resolve_name(&self, name: &str) -> Option<RefId>;
}

/// Registry with no entries; every lookup fails
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyRegistry;

impl ExternalRegistry for EmptyRegistry {
    fn resolve(&self, _id: RefId) -> Option<LiveObject> {
        None
    }

    fn resolve_name(&self, _name: &str) -> Option<RefId> {
        None
    }
}

/// Map-backed registry
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    objects: HashMap<RefId, LiveObject>,
    names: HashMap<String, RefId>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ResourceEntry {
    name: String,
    id: RefId,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct IdEntry {
    id: RefId,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RegistryManifest {
    #[serde(rename = "resource")]
    resources: Vec<ResourceEntry>,
    #[serde(rename = "element")]
    elements: Vec<IdEntry>,
    #[serde(rename = "object")]
    objects: Vec<IdEntry>,
}

impl RegistryManifest {
    fn validate(&self) -> Result<(), ConfigError> {
        let mut ids = HashSet::new();
        let mut names = HashSet::new();

        for resource in &self.resources {
            if resource.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "resource {} has empty name",
                    resource.id
                )));
            }
            if !names.insert(resource.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "resource name '{}' declared twice",
                    resource.name
                )));
            }
        }

        let all_ids = self
            .resources
            .iter()
            .map(|r| r.id)
            .chain(self.elements.iter().map(|e| e.id))
            .chain(self.objects.iter().map(|o| o.id));
        for id in all_ids {
            if !ids.insert(id) {
                return Err(ConfigError::Invalid(format!("id {} declared twice", id)));
            }
        }
        Ok(())
    }
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named resource, replacing whatever `id` denoted before
    pub fn insert_resource(&mut self, id: RefId, name: impl Into<String>) {
        let name = name.into();
        self.remove(id);
        if let Some(previous) = self.names.get(&name).copied() {
            self.remove(previous);
        }
        self.names.insert(name.clone(), id);
        self.objects.insert(id, LiveObject::Resource { name });
    }

    pub fn insert_element(&mut self, id: RefId) {
        self.remove(id);
        self.objects.insert(id, LiveObject::Element);
    }

    pub fn insert_object(&mut self, id: RefId) {
        self.remove(id);
        self.objects.insert(id, LiveObject::Object);
    }

    /// Forget `id`; later lookups treat it as vanished
    pub fn remove(&mut self, id: RefId) -> Option<LiveObject> {
        let removed = self.objects.remove(&id);
        if let Some(LiveObject::Resource { name }) = &removed {
            self.names.remove(name);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Parse and validate a TOML manifest
    pub fn from_manifest(content: &str) -> Result<Self, ConfigError> {
        let manifest: RegistryManifest = toml::from_str(content)?;
        manifest.validate()?;

        let mut registry = StaticRegistry::new();
        for resource in manifest.resources {
            registry.insert_resource(resource.id, resource.name);
        }
        for element in manifest.elements {
            registry.insert_element(element.id);
        }
        for object in manifest.objects {
            registry.insert_object(object.id);
        }
        Ok(registry)
    }

    /// Read, parse and validate a TOML manifest file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let registry = Self::from_manifest(&content)?;
        tracing::debug!(
            "Loaded {} registry entries from {}",
            registry.len(),
            path.display()
        );
        Ok(registry)
    }
}

impl ExternalRegistry for StaticRegistry {
    fn resolve(&self, id: RefId) -> Option<LiveObject> {
        self.objects.get(&id).cloned()
    }

    fn resolve_name(&self, name: &str) -> Option<RefId> {
        self.names.get(name).copied()
    }
}
