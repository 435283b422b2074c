//! Root catalog and id router.
//!
//! The core keeps a small tree: the root and its well-known top-level
//! containers. A node carrying a backend tag hands everything at and below it
//! to that backend. [`RootCatalog::resolve`] finds out who is responsible for
//! an id.

use std::cmp::Ordering;

use medialib_types::{Container, MediaClass};
use serde_json::{Map, Value};

use crate::object::{adjust_count, finalize_page};

/// One row of the root folder table.
pub struct RootFolder {
    pub class: MediaClass,
    pub label: &'static str,
    /// Canonical id. Removable media and servers are added with ids of
    /// their own.
    pub id: Option<&'static str>,
    pub rank: u32,
}

const fn folder(class: MediaClass, label: &'static str, id: Option<&'static str>, rank: u32) -> RootFolder {
    RootFolder {
        class,
        label,
        id,
        rank,
    }
}

pub static ROOT_FOLDERS: [RootFolder; 23] = [
    folder(MediaClass::RootFavorites, "Favorites", Some("/favorites"), 1),
    folder(MediaClass::RootLibrary, "Library", Some("/library"), 2),
    folder(MediaClass::RootMusicAlbums, "Music albums", Some("/albums"), 3),
    folder(MediaClass::RootSongs, "Songs", Some("/songs"), 4),
    folder(MediaClass::RootStreams, "Streams", Some("/streams"), 6),
    folder(MediaClass::RootPodcasts, "Podcasts", Some("/podcasts"), 7),
    folder(MediaClass::RootMovies, "Movies", Some("/movies"), 8),
    folder(MediaClass::RootTvShows, "TV Shows", Some("/series"), 9),
    folder(MediaClass::RootPhotos, "Photos", Some("/photos"), 10),
    folder(MediaClass::RootDirectories, "Directories", Some("/dirs"), 11),
    folder(MediaClass::RootRemovable, "Removable", None, 20),
    folder(MediaClass::RootRemovableAudioCd, "Audio CD", None, 21),
    folder(MediaClass::RootRemovableVcd, "VCD", None, 22),
    folder(MediaClass::RootRemovableSvcd, "SVCD", None, 23),
    folder(MediaClass::RootRemovableVideoDvd, "DVD", None, 24),
    folder(MediaClass::RootRemovableFilesystem, "Filesystem", None, 25),
    folder(MediaClass::RootRemovableHdd, "Filesystem", None, 26),
    folder(MediaClass::RootRemovablePendrive, "Filesystem", None, 27),
    folder(MediaClass::RootRemovableMemoryCard, "Filesystem", None, 28),
    folder(MediaClass::RootRemovableMobile, "Filesystem", None, 29),
    folder(MediaClass::RootRemovableCd, "Filesystem", None, 30),
    folder(MediaClass::RootRemovableDvd, "Filesystem", None, 31),
    folder(MediaClass::RootServer, "Network", None, 100),
];

pub fn root_folder(class: &MediaClass) -> Option<&'static RootFolder> {
    ROOT_FOLDERS.iter().find(|f| &f.class == class)
}

pub fn root_rank(class: &MediaClass) -> Option<u32> {
    root_folder(class).map(|f| f.rank)
}

/// Root class whose canonical id is `id`.
pub fn class_from_id(id: &str) -> Option<&'static MediaClass> {
    ROOT_FOLDERS
        .iter()
        .find(|f| f.id == Some(id))
        .map(|f| &f.class)
}

/// Order of two root children: rank first (unranked last), then label,
/// case-sensitive.
fn root_order(a: &Container, b: &Container) -> Ordering {
    let rank = |c: &Container| root_rank(&c.class).unwrap_or(u32::MAX);
    rank(a)
        .cmp(&rank(b))
        .then_with(|| a.label.as_str().cmp(b.label.as_str()))
}

/// Who answers for an id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution<'a> {
    /// A node the core owns and serves itself.
    Local(&'a Container),
    /// Everything at and below `node` belongs to `backend`. `exact` is set
    /// when `node` is the requested id itself.
    Delegated {
        backend: &'a str,
        node: &'a Container,
        exact: bool,
    },
    NotFound,
}

impl<'a> Resolution<'a> {
    pub fn backend(&self) -> Option<&'a str> {
        match *self {
            Resolution::Delegated { backend, .. } => Some(backend),
            _ => None,
        }
    }
}

/// Outcome of [`RootCatalog::merge_object`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// No core-owned node with that id.
    Missing,
    InPlace,
    /// A top-level container moved from one position to another.
    Moved { from: usize, to: usize },
}

pub struct RootCatalog {
    root: Container,
}

impl RootCatalog {
    pub fn new() -> Self {
        Self {
            root: Container::root(),
        }
    }

    pub fn root(&self) -> &Container {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.root.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    /// Walk `id` one path component at a time, stopping at the first node
    /// that delegates to a backend.
    pub fn resolve(&self, id: &str) -> Resolution<'_> {
        let id = normalize(id);
        if !id.starts_with('/') {
            return Resolution::NotFound;
        }

        let mut node = &self.root;
        let mut matched = 1;
        loop {
            if let Some(backend) = node.backend.as_deref() {
                return Resolution::Delegated {
                    backend,
                    node,
                    exact: node.id == id,
                };
            }
            if node.id == id {
                return Resolution::Local(node);
            }

            let next_end = match id[matched..].find('/') {
                Some(pos) => matched + pos,
                None => id.len(),
            };
            let prefix = &id[..next_end];
            match node.child(prefix) {
                Some(child) => node = child,
                None => return Resolution::NotFound,
            }
            matched = next_end + 1;
            if matched > id.len() && node.id != id {
                return Resolution::NotFound;
            }
        }
    }

    /// Core-owned node with exactly this id.
    pub fn get(&self, id: &str) -> Option<&Container> {
        match self.resolve(id) {
            Resolution::Local(node) => Some(node),
            Resolution::Delegated {
                node, exact: true, ..
            } => Some(node),
            _ => None,
        }
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Container> {
        let id = normalize(id);
        if id == "/" {
            return Some(&mut self.root);
        }
        let mut node = &mut self.root;
        let mut matched = 1;
        loop {
            let next_end = match id[matched..].find('/') {
                Some(pos) => matched + pos,
                None => id.len(),
            };
            node = node.child_mut(&id[..next_end])?;
            if next_end == id.len() {
                return Some(node);
            }
            matched = next_end + 1;
        }
    }

    /// The top-level container of `class`, created at its ranked position
    /// when missing.
    pub fn get_or_create_root_container(&mut self, class: MediaClass) -> &mut Container {
        let index = match self.root.children.iter().position(|c| c.class == class) {
            Some(i) => i,
            None => {
                let container = init_root_container(class);
                let index = self.insert_index(&container);
                self.root.children.insert(index, container);
                self.root.update_child_counts();
                index
            }
        };
        &mut self.root.children[index]
    }

    /// Insert a complete top-level container, replacing one with the same
    /// id. Returns its position.
    pub fn add_root_container(&mut self, container: Container) -> usize {
        if let Some(old) = self.root.child_index(&container.id) {
            log::debug!(target: "mdb", "replacing root container {}", container.id);
            self.root.children.remove(old);
        }
        let index = self.insert_index(&container);
        self.root.children.insert(index, container);
        self.root.update_child_counts();
        index
    }

    /// Remove a top-level container. Returns its former position.
    pub fn delete_root_container(&mut self, id: &str) -> Option<(usize, Container)> {
        let index = self.root.child_index(id)?;
        let removed = self.root.children.remove(index);
        self.root.update_child_counts();
        Some((index, removed))
    }

    fn insert_index(&self, container: &Container) -> usize {
        self.root
            .children
            .iter()
            .position(|c| root_order(container, c) == Ordering::Less)
            .unwrap_or(self.root.children.len())
    }

    /// One page of the children of a core-owned node, finalized. Also returns
    /// the total number of children.
    pub fn browse_children(
        &self,
        id: &str,
        start: usize,
        count: Option<usize>,
    ) -> Option<(Vec<Container>, usize)> {
        let node = match self.resolve(id) {
            Resolution::Local(node) => node,
            _ => return None,
        };
        let total = node.children.len();
        let n = adjust_count(start, count, total);
        let mut page: Vec<Container> = node.children[start.min(total)..start.min(total) + n].to_vec();
        finalize_page(&mut page, start, total);
        Some((page, total))
    }

    /// Merge changed fields into a core-owned node. `label` and `class` are
    /// applied to the node itself, everything else to the metadata. A
    /// top-level container whose sort key changed is moved to its new place.
    pub fn merge_object(&mut self, id: &str, fields: &Map<String, Value>) -> Merge {
        let Some(node) = self.get_mut(id) else {
            return Merge::Missing;
        };
        let mut resort = false;
        for (key, value) in fields {
            match (key.as_str(), value) {
                ("label", Value::String(label)) => {
                    resort |= node.label != *label;
                    node.label = label.clone();
                }
                ("class", Value::String(class)) => {
                    let class = MediaClass::parse(class);
                    resort |= node.class != class;
                    node.class = class;
                }
                _ => {
                    node.metadata.insert(key.clone(), value.clone());
                }
            }
        }
        if !resort {
            return Merge::InPlace;
        }
        let Some(from) = self.root.child_index(normalize(id)) else {
            return Merge::InPlace;
        };
        let node = self.root.children.remove(from);
        let to = self.insert_index(&node);
        self.root.children.insert(to, node);
        self.root.update_child_counts();
        if from == to {
            Merge::InPlace
        } else {
            Merge::Moved { from, to }
        }
    }
}

impl Default for RootCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(id: &str) -> &str {
    let trimmed = id.trim_end_matches('/');
    if trimmed.is_empty() && id.starts_with('/') {
        "/"
    } else {
        trimmed
    }
}

fn init_root_container(class: MediaClass) -> Container {
    match root_folder(&class) {
        Some(f) => {
            let id = match f.id {
                Some(id) => id.to_string(),
                None => format!("/{}", class.as_str().trim_start_matches("root-")),
            };
            Container::new(id, f.label, class)
        }
        None => {
            let id = format!("/{}", class.as_str());
            let label = class.as_str().to_string();
            Container::new(id, label, class)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(cat: &RootCatalog) -> Vec<&str> {
        cat.root().children.iter().map(|c| c.label.as_str()).collect()
    }

    #[test]
    fn scenario_a_ranked_insertion() {
        let mut cat = RootCatalog::new();
        cat.get_or_create_root_container(MediaClass::RootStreams);
        cat.get_or_create_root_container(MediaClass::RootLibrary);
        cat.get_or_create_root_container(MediaClass::RootFavorites);
        assert_eq!(labels(&cat), vec!["Favorites", "Library", "Streams"]);
        assert_eq!(cat.root().num_children, 3);
        assert_eq!(cat.root().num_container_children, 3);
    }

    #[test]
    fn get_or_create_returns_existing() {
        let mut cat = RootCatalog::new();
        cat.get_or_create_root_container(MediaClass::RootSongs).editable = true;
        let again = cat.get_or_create_root_container(MediaClass::RootSongs);
        assert!(again.editable);
        assert_eq!(again.id, "/songs");
        assert_eq!(cat.len(), 1);
    }

    #[test]
    fn equal_rank_orders_by_label_case_sensitive() {
        let mut cat = RootCatalog::new();
        for label in ["beta", "Alpha", "alpha"] {
            let id = format!("/server-{}", label);
            cat.add_root_container(Container::new(id, label, MediaClass::RootServer));
        }
        assert_eq!(labels(&cat), vec!["Alpha", "alpha", "beta"]);
    }

    #[test]
    fn unranked_classes_sort_last() {
        let mut cat = RootCatalog::new();
        cat.add_root_container(Container::new("/x", "A custom", MediaClass::Container));
        cat.get_or_create_root_container(MediaClass::RootServer);
        cat.get_or_create_root_container(MediaClass::RootFavorites);
        assert_eq!(labels(&cat), vec!["Favorites", "Network", "A custom"]);
    }

    #[test]
    fn ordering_holds_for_any_insertion_order() {
        let classes = [
            MediaClass::RootDirectories,
            MediaClass::RootRemovableAudioCd,
            MediaClass::RootSongs,
            MediaClass::RootServer,
            MediaClass::RootFavorites,
            MediaClass::RootTvShows,
        ];
        let mut cat = RootCatalog::new();
        for class in classes.iter().rev() {
            cat.get_or_create_root_container(class.clone());
        }
        let ranks: Vec<u32> = cat
            .root()
            .children
            .iter()
            .map(|c| root_rank(&c.class).unwrap())
            .collect();
        let mut sorted = ranks.clone();
        sorted.sort();
        assert_eq!(ranks, sorted);
    }

    #[test]
    fn scenario_c_delegation_below_tagged_node() {
        let mut cat = RootCatalog::new();
        cat.add_root_container(Container::new("/a", "A", MediaClass::Container).with_backend("sql"));
        for id in ["/a/b/c", "/a/b", "/a"] {
            assert_eq!(cat.resolve(id).backend(), Some("sql"), "{}", id);
        }
        assert!(matches!(cat.resolve("/a"), Resolution::Delegated { exact: true, .. }));
        assert!(matches!(cat.resolve("/a/b/c"), Resolution::Delegated { exact: false, .. }));
    }

    #[test]
    fn resolve_local_and_not_found() {
        let mut cat = RootCatalog::new();
        cat.get_or_create_root_container(MediaClass::RootFavorites);
        assert!(matches!(cat.resolve("/"), Resolution::Local(n) if n.id == "/"));
        assert!(matches!(cat.resolve("/favorites"), Resolution::Local(n) if n.id == "/favorites"));
        assert!(matches!(cat.resolve("/favorites/"), Resolution::Local(_)));
        assert_eq!(cat.resolve("/favorites/x"), Resolution::NotFound);
        assert_eq!(cat.resolve("/nothing"), Resolution::NotFound);
        assert_eq!(cat.resolve("favorites"), Resolution::NotFound);
        assert_eq!(cat.resolve(""), Resolution::NotFound);
    }

    #[test]
    fn resolve_never_both_local_and_delegated() {
        let mut cat = RootCatalog::new();
        cat.get_or_create_root_container(MediaClass::RootFavorites);
        cat.get_or_create_root_container(MediaClass::RootSongs).backend = Some("sql".into());
        for id in ["/", "/favorites", "/songs", "/songs/1", "/favorites/1", "/x"] {
            match cat.resolve(id) {
                Resolution::Local(n) => assert!(n.backend.is_none()),
                Resolution::Delegated { backend, .. } => assert_eq!(backend, "sql"),
                Resolution::NotFound => {}
            }
        }
    }

    #[test]
    fn delete_root_container_reports_position() {
        let mut cat = RootCatalog::new();
        cat.get_or_create_root_container(MediaClass::RootFavorites);
        cat.get_or_create_root_container(MediaClass::RootSongs);
        let (idx, removed) = cat.delete_root_container("/songs").unwrap();
        assert_eq!(idx, 1);
        assert_eq!(removed.class, MediaClass::RootSongs);
        assert_eq!(cat.root().num_children, 1);
        assert!(cat.delete_root_container("/songs").is_none());
    }

    #[test]
    fn browse_children_pagination() {
        let mut cat = RootCatalog::new();
        for class in [
            MediaClass::RootFavorites,
            MediaClass::RootLibrary,
            MediaClass::RootSongs,
        ] {
            cat.get_or_create_root_container(class);
        }

        let (page, total) = cat.browse_children("/", 1, Some(1)).unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "/library");
        assert_eq!(page[0].idx, Some(1));

        let (page, _) = cat.browse_children("/", 1, None).unwrap();
        assert_eq!(page.len(), 2);

        let (page, _) = cat.browse_children("/", 5, Some(2)).unwrap();
        assert!(page.is_empty());

        assert!(cat.browse_children("/missing", 0, None).is_none());
    }

    #[test]
    fn merge_object_updates_exact_node() {
        let mut cat = RootCatalog::new();
        cat.get_or_create_root_container(MediaClass::RootFavorites);
        let mut fields = Map::new();
        fields.insert("label".into(), Value::String("Starred".into()));
        fields.insert("num_plays".into(), Value::from(3));
        assert_eq!(cat.merge_object("/favorites", &fields), Merge::InPlace);
        let fav = cat.get("/favorites").unwrap();
        assert_eq!(fav.label, "Starred");
        assert_eq!(fav.metadata["num_plays"], 3);
        assert_eq!(cat.merge_object("/favorites/x", &fields), Merge::Missing);
    }

    #[test]
    fn relabel_keeps_label_order() {
        let mut cat = RootCatalog::new();
        cat.add_root_container(Container::new("/s1", "Alpha", MediaClass::RootServer));
        cat.add_root_container(Container::new("/s2", "beta", MediaClass::RootServer));
        let mut fields = Map::new();
        fields.insert("label".into(), Value::String("zeta".into()));
        assert_eq!(cat.merge_object("/s1", &fields), Merge::Moved { from: 0, to: 1 });
        assert_eq!(labels(&cat), vec!["beta", "zeta"]);

        // Same label again: nothing to move.
        assert_eq!(cat.merge_object("/s1", &fields), Merge::InPlace);
    }

    #[test]
    fn class_change_moves_by_rank() {
        let mut cat = RootCatalog::new();
        cat.get_or_create_root_container(MediaClass::RootFavorites);
        cat.add_root_container(Container::new("/x", "Extra", MediaClass::RootServer));
        let mut fields = Map::new();
        fields.insert("class".into(), Value::String("root-library".into()));
        cat.get_or_create_root_container(MediaClass::RootSongs);
        assert_eq!(cat.merge_object("/x", &fields), Merge::Moved { from: 2, to: 1 });
        assert_eq!(labels(&cat), vec!["Favorites", "Extra", "Songs"]);
    }

    #[test]
    fn adding_same_root_id_twice_replaces() {
        let mut cat = RootCatalog::new();
        cat.get_or_create_root_container(MediaClass::RootFavorites);
        cat.add_root_container(Container::new("/cd", "Audio CD", MediaClass::RootRemovableAudioCd));
        let index = cat.add_root_container(Container::new("/cd", "Jazz CD", MediaClass::RootRemovableAudioCd));
        assert_eq!(index, 1);
        assert_eq!(labels(&cat), vec!["Favorites", "Jazz CD"]);
        assert_eq!(cat.root().num_children, 2);

        assert!(cat.delete_root_container("/cd").is_some());
        assert!(matches!(cat.resolve("/cd"), Resolution::NotFound));
    }

    #[test]
    fn unranked_class_gets_its_name_as_label() {
        let mut cat = RootCatalog::new();
        let other = cat.get_or_create_root_container(MediaClass::Other("jukebox".into()));
        assert_eq!(other.id, "/jukebox");
        assert_eq!(other.label, "jukebox");
    }

    #[test]
    fn root_ids_without_canonical_id() {
        let mut cat = RootCatalog::new();
        let server = cat.get_or_create_root_container(MediaClass::RootServer);
        assert_eq!(server.id, "/server");
        assert_eq!(class_from_id("/series"), Some(&MediaClass::RootTvShows));
        assert_eq!(class_from_id("/server"), None);
    }
}
