//! Object cache shared by the backends, and the derived caches the
//! dispatcher purges on rescan.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use medialib_types::Container;

/// Cache of browsed objects, keyed by id.
pub trait ObjectCache: Send + Sync {
    /// The cached object, unless it is older than `max_age`.
    fn get(&self, id: &str, max_age: Option<Duration>) -> Option<Container>;
    fn put(&self, id: &str, obj: Container);
    fn invalidate(&self, id: &str);
    fn clear(&self);
}

/// A cache holding data derived from the library (thumbnails, previews),
/// cleared whenever a rescan starts.
pub trait DerivedCache: Send {
    fn name(&self) -> &str;
    fn purge(&mut self);
}

struct Entry {
    obj: Container,
    stored: Instant,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    order: VecDeque<String>,
}

/// Bounded in-memory [`ObjectCache`]. Evicts the oldest insertion first.
pub struct MemoryObjectCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl MemoryObjectCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectCache for MemoryObjectCache {
    fn get(&self, id: &str, max_age: Option<Duration>) -> Option<Container> {
        let inner = self.lock();
        let entry = inner.entries.get(id)?;
        match max_age {
            Some(age) if entry.stored.elapsed() > age => None,
            _ => Some(entry.obj.clone()),
        }
    }

    fn put(&self, id: &str, obj: Container) {
        let mut inner = self.lock();
        let fresh = Entry {
            obj,
            stored: Instant::now(),
        };
        if inner.entries.insert(id.to_string(), fresh).is_some() {
            inner.order.retain(|k| k != id);
        }
        inner.order.push_back(id.to_string());
        while inner.entries.len() > self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
        }
    }

    fn invalidate(&self, id: &str) {
        let mut inner = self.lock();
        if inner.entries.remove(id).is_some() {
            inner.order.retain(|k| k != id);
        }
    }

    fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }
}

/// Files generated on demand below one directory, e.g. thumbnails.
/// Purging deletes the directory's contents but keeps the directory.
pub struct DirectoryCache {
    name: String,
    dir: PathBuf,
}

impl DirectoryCache {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DerivedCache for DirectoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn purge(&mut self) {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!(target: "mdb", "cannot purge {}: {}", self.dir.display(), e);
                return;
            }
        };
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) => log::warn!(target: "mdb", "cannot remove {}: {}", path.display(), e),
            }
        }
        log::info!(target: "mdb", "purged {} ({} entries)", self.name, removed);
    }
}
