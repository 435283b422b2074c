//! Persisted configuration: one section per context, written back to disk a
//! quiet period after the last change.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use medialib_types::{ParameterInfo, ParameterKind, ParameterValue};
use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, Error, Result};

/// Context of the core's own settings.
pub const GENERAL_CONTEXT: &str = "general";

pub const SAVE_DEBOUNCE: Duration = Duration::from_secs(3);

/// Context name to parameter name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigRegistry {
    sections: BTreeMap<String, BTreeMap<String, ParameterValue>>,
}

impl ConfigRegistry {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        toml::from_str(&contents).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|e| Error::io(path, e))
    }

    pub fn get(&self, context: &str, name: &str) -> Option<&ParameterValue> {
        self.sections.get(context)?.get(name)
    }

    pub fn set(&mut self, context: &str, name: &str, value: ParameterValue) {
        self.sections
            .entry(context.to_string())
            .or_default()
            .insert(name.to_string(), value);
    }

    pub fn section(&self, context: &str) -> Option<&BTreeMap<String, ParameterValue>> {
        self.sections.get(context)
    }
}

/// Owns the registry file and delays writes until changes settle.
///
/// Only the dispatcher thread touches it.
pub struct ConfigPersister {
    path: PathBuf,
    registry: ConfigRegistry,
    schemas: BTreeMap<String, Vec<ParameterInfo>>,
    debounce: Duration,
    deadline: Option<Instant>,
}

impl ConfigPersister {
    /// Load `path`. A missing or unreadable file is replaced by an empty
    /// registry, written out right away.
    pub fn open(path: impl Into<PathBuf>, debounce: Duration) -> Result<Self> {
        let path = path.into();
        let registry = match ConfigRegistry::load(&path) {
            Ok(registry) => registry,
            Err(e) => {
                if path.exists() {
                    log::warn!(target: "config", "discarding {}: {}", path.display(), e);
                } else {
                    log::info!(target: "config", "creating {}", path.display());
                }
                let registry = ConfigRegistry::default();
                registry.save(&path)?;
                registry
            }
        };
        Ok(Self {
            path,
            registry,
            schemas: BTreeMap::new(),
            debounce,
            deadline: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn registry(&self) -> &ConfigRegistry {
        &self.registry
    }

    pub fn register_context(&mut self, context: &str, parameters: Vec<ParameterInfo>) {
        self.schemas.insert(context.to_string(), parameters);
    }

    pub fn has_context(&self, context: &str) -> bool {
        self.schemas.contains_key(context)
    }

    pub fn schema(&self, context: &str) -> Option<&[ParameterInfo]> {
        self.schemas.get(context).map(Vec::as_slice)
    }

    pub fn get(&self, context: &str, name: &str) -> Option<&ParameterValue> {
        self.registry.get(context, name)
    }

    /// Values to apply at startup: stored value, else the schema default.
    /// Buttons are actions and are never replayed.
    pub fn startup_values(&self, context: &str) -> Vec<(String, ParameterValue)> {
        let Some(schema) = self.schemas.get(context) else {
            return Vec::new();
        };
        schema
            .iter()
            .filter(|p| p.kind != ParameterKind::Button)
            .filter_map(|p| {
                let value = self
                    .registry
                    .get(context, &p.name)
                    .cloned()
                    .or_else(|| p.default.clone())?;
                Some((p.name.clone(), value))
            })
            .collect()
    }

    /// Store a value and (re)arm the write deadline.
    pub fn set(
        &mut self,
        context: &str,
        name: &str,
        value: ParameterValue,
        now: Instant,
    ) -> std::result::Result<(), DispatchError> {
        let known = self
            .schemas
            .get(context)
            .is_some_and(|schema| schema.iter().any(|p| p.name == name));
        if !known {
            return Err(DispatchError::UnknownParameter {
                context: context.to_string(),
                name: name.to_string(),
            });
        }
        self.registry.set(context, name, value);
        self.deadline = Some(now + self.debounce);
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Write if the quiet period has passed. Returns whether it wrote.
    pub fn poll(&mut self, now: Instant) -> Result<bool> {
        match self.deadline {
            Some(deadline) if now >= deadline => self.flush(),
            _ => Ok(false),
        }
    }

    /// Write pending changes regardless of the deadline.
    pub fn flush(&mut self) -> Result<bool> {
        if self.deadline.is_none() {
            return Ok(false);
        }
        self.registry.save(&self.path)?;
        self.deadline = None;
        log::debug!(target: "config", "saved {}", self.path.display());
        Ok(true)
    }
}
