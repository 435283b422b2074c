use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::MediaClass;

/// Which kind of reference a [`Source`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UriRole {
    Src,
    Cover,
    Poster,
    Wallpaper,
    Icon,
}

impl UriRole {
    pub const ALL: [UriRole; 5] = [
        UriRole::Src,
        UriRole::Cover,
        UriRole::Poster,
        UriRole::Wallpaper,
        UriRole::Icon,
    ];
}

/// One location an object (or its artwork) can be fetched from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Source {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    /// Modification time of a local file, seconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<i64>,
}

impl Source {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            mimetype: None,
            mtime: None,
        }
    }

    pub fn with_mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.mimetype = Some(mimetype.into());
        self
    }

    /// Absolute filesystem path rather than a URL.
    pub fn is_local(&self) -> bool {
        self.uri.starts_with('/')
    }
}

/// A node in the media namespace. Used for containers and items alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub label: String,
    pub class: MediaClass,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Container>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    /// Name of the backend that owns everything at and below this node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(default)]
    pub editable: bool,
    /// Glob patterns naming the child classes this container accepts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_classes: Option<Vec<String>>,
    #[serde(default)]
    pub num_children: usize,
    #[serde(default)]
    pub num_container_children: usize,
    #[serde(default)]
    pub num_item_children: usize,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sources: BTreeMap<UriRole, Vec<Source>>,
    /// Raw stream layout as reported by the backend. Never leaves the core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streams: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<Container>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idx: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_class: Option<MediaClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
}

impl Container {
    pub fn new(id: impl Into<String>, label: impl Into<String>, class: MediaClass) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            class,
            children: Vec::new(),
            metadata: Map::new(),
            backend: None,
            editable: false,
            child_classes: None,
            num_children: 0,
            num_container_children: 0,
            num_item_children: 0,
            sources: BTreeMap::new(),
            streams: None,
            parts: Vec::new(),
            idx: None,
            total: None,
            child_class: None,
            tooltip: None,
        }
    }

    /// The namespace root.
    pub fn root() -> Self {
        Self::new("/", "Root", MediaClass::Root)
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn child(&self, id: &str) -> Option<&Container> {
        self.children.iter().find(|c| c.id == id)
    }

    pub fn child_mut(&mut self, id: &str) -> Option<&mut Container> {
        self.children.iter_mut().find(|c| c.id == id)
    }

    pub fn child_index(&self, id: &str) -> Option<usize> {
        self.children.iter().position(|c| c.id == id)
    }

    /// Recompute the child-count caches from `children`.
    pub fn update_child_counts(&mut self) {
        let containers = self.children.iter().filter(|c| c.class.is_container()).count();
        self.num_children = self.children.len();
        self.num_container_children = containers;
        self.num_item_children = self.children.len() - containers;
    }

    pub fn sources(&self, role: UriRole) -> &[Source] {
        self.sources.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn add_source(&mut self, role: UriRole, source: Source) {
        self.sources.entry(role).or_default().push(source);
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}
