//! Rewriting object references into externally reachable URIs.
//!
//! Local files are only reachable through a directory export table: a local
//! directory `/music/` is published as `<root_uri>/media/<hash>/`. Catalog
//! URIs such as `radiobrowser:///<uuid>` are resolved into a playlist URL.

use std::path::Path;

use medialib_types::{Container, ParameterInfo, ParameterKind, ParameterValue, Source, UriRole};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use sha2::{Digest, Sha256};

/// Prefix of exported media paths below the server root.
pub const MEDIA_PATH_PREFIX: &str = "/media/";

pub const PLAYLIST_MIMETYPE: &str = "application/mpegurl";

// Keep `/` so exported paths stay hierarchical.
const PATH_ENCODE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b']')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Local path to external URI mapping.
pub trait DirectoryExports: Send {
    /// External URI for a local file, or `None` if it is not exported.
    fn local_to_external(&self, path: &str) -> Option<String>;
}

/// Resolves one catalog URI scheme into a fetchable URL.
pub trait CatalogResolver: Send {
    fn handles(&self, uri: &str) -> bool;
    fn resolve(&self, uri: &str) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq)]
struct ExportedDir {
    /// Always ends with `/`.
    local: String,
    /// `/media/<hash>/`
    external: String,
}

/// The directory export table.
#[derive(Debug, Default)]
pub struct MediaDirs {
    root_uri: Option<String>,
    do_export: bool,
    export_dirs: Vec<String>,
    restricted_dirs: Vec<String>,
    dirs: Vec<ExportedDir>,
}

impl MediaDirs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schema of the settings the table reads through [`MediaDirs::set_parameter`].
    pub fn parameters() -> Vec<ParameterInfo> {
        vec![
            ParameterInfo::new("export_media_dirs", "Export media files", ParameterKind::Checkbox)
                .with_default(ParameterValue::Bool(false))
                .with_help("Make media files available in the LAN. You can in- and exclude specific directories below."),
            ParameterInfo::new("export_dirs", "Directories to export", ParameterKind::DirList)
                .with_help("Files under these directories are exported in the LAN."),
            ParameterInfo::new("restrict_dirs", "Restricted directories", ParameterKind::DirList)
                .with_help("Files under these directories are *not* exported in the LAN."),
        ]
    }

    pub fn set_root_uri(&mut self, uri: impl Into<String>) {
        let uri = uri.into();
        self.root_uri = Some(uri.trim_end_matches('/').to_string());
    }

    pub fn root_uri(&self) -> Option<&str> {
        self.root_uri.as_deref()
    }

    /// Returns false for names the table does not know.
    pub fn set_parameter(&mut self, name: &str, value: &ParameterValue) -> bool {
        match name {
            "export_media_dirs" => self.do_export = value.as_bool().unwrap_or(false),
            "export_dirs" => self.export_dirs = value.as_list().map(<[String]>::to_vec).unwrap_or_default(),
            "restrict_dirs" => {
                self.restricted_dirs = value.as_list().map(<[String]>::to_vec).unwrap_or_default()
            }
            _ => return false,
        }
        true
    }

    pub fn add_path(&mut self, path: &str) {
        let local = if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{}/", path)
        };
        if self.dirs.iter().any(|d| d.local == local) {
            return;
        }
        log::info!(target: "mdb", "exporting media dir {}", path);
        let external = format!("{}{}/", MEDIA_PATH_PREFIX, path_hash(&local));
        self.dirs.push(ExportedDir { local, external });
    }

    pub fn del_path(&mut self, path: &str) {
        log::info!(target: "mdb", "unexporting media dir {}", path);
        if let Some(idx) = self.find_by_local_path(path) {
            self.dirs.remove(idx);
        }
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    fn find_by_local_path(&self, path: &str) -> Option<usize> {
        self.dirs.iter().position(|d| path.starts_with(&d.local) || d.local == format!("{}/", path))
    }

    fn find_by_external_path(&self, path: &str) -> Option<usize> {
        self.dirs.iter().position(|d| path.starts_with(&d.external))
    }

    /// Access check: exported media dirs and the export list allow, the
    /// restricted list denies.
    fn is_exported(&self, path: &str) -> bool {
        if !self.do_export {
            return false;
        }
        let canonical = std::fs::canonicalize(Path::new(path))
            .ok()
            .and_then(|p| p.to_str().map(str::to_string));
        let candidates: Vec<&str> = std::iter::once(path).chain(canonical.as_deref()).collect();

        let allowed = candidates
            .iter()
            .any(|p| self.find_by_local_path(p).is_some() || dir_list_contains(&self.export_dirs, p));
        let restricted = candidates
            .iter()
            .any(|p| dir_list_contains(&self.restricted_dirs, p));

        if !allowed || restricted {
            log::info!(target: "mdb", "not exporting {}", path);
            return false;
        }
        true
    }

    /// Map an external media path (`/media/<hash>/...`) back to the local
    /// file, if it is still exported.
    pub fn external_to_local(&self, path: &str) -> Option<String> {
        let dir = &self.dirs[self.find_by_external_path(path)?];
        let local = format!("{}{}", dir.local, &path[dir.external.len()..]);
        self.is_exported(&local).then_some(local)
    }
}

impl DirectoryExports for MediaDirs {
    fn local_to_external(&self, path: &str) -> Option<String> {
        // Multi-track files and edit lists are addressed with url variables
        // and are not served as plain files.
        if path.contains("?track=") || path.contains("&track=") || path.contains("edl=") {
            return None;
        }
        let root = self.root_uri.as_deref()?;
        if !self.is_exported(path) {
            return None;
        }
        let dir = &self.dirs[self.find_by_local_path(path)?];
        let rest = path.get(dir.local.len()..).unwrap_or("");
        let encoded = utf8_percent_encode(rest, PATH_ENCODE);
        Some(format!("{}{}{}", root, dir.external, encoded))
    }
}

fn dir_list_contains(dirs: &[String], path: &str) -> bool {
    dirs.iter().any(|dir| {
        let dir = dir.trim_end_matches('/');
        path == dir || path.strip_prefix(dir).is_some_and(|rest| rest.starts_with('/'))
    })
}

/// Stable hash of a directory path used in exported URIs.
pub fn path_hash(path: &str) -> String {
    let digest = Sha256::digest(path.as_bytes());
    hex::encode(&digest[..16])
}

/// Resolves `radiobrowser:///<uuid>` via a radio-browser.info server.
pub struct RadioBrowserResolver {
    server: String,
}

impl RadioBrowserResolver {
    pub const SCHEME: &'static str = "radiobrowser://";

    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
        }
    }
}

impl CatalogResolver for RadioBrowserResolver {
    fn handles(&self, uri: &str) -> bool {
        uri.starts_with(Self::SCHEME)
    }

    fn resolve(&self, uri: &str) -> Option<String> {
        let station = uri.strip_prefix(Self::SCHEME)?.trim_start_matches('/');
        if station.is_empty() {
            return None;
        }
        Some(format!("https://{}/m3u/url/{}", self.server, station))
    }
}

/// Append external forms of every local or catalog reference in `obj` and
/// its parts. Already present URIs are not added twice.
pub fn add_external_uris(
    obj: &mut Container,
    exports: &dyn DirectoryExports,
    resolver: Option<&dyn CatalogResolver>,
) {
    if let Some(resolver) = resolver {
        let first = obj.sources(UriRole::Src).first().map(|s| s.uri.clone());
        if let Some(uri) = first.filter(|u| resolver.handles(u)) {
            if let Some(url) = resolver.resolve(&uri) {
                push_unique(obj, UriRole::Src, Source::new(url).with_mimetype(PLAYLIST_MIMETYPE));
            }
        }
    }

    for role in UriRole::ALL {
        let local: Vec<Source> = obj
            .sources(role)
            .iter()
            .filter(|s| s.is_local())
            .cloned()
            .collect();
        for src in local {
            if let Some(uri) = exports.local_to_external(&src.uri) {
                push_unique(
                    obj,
                    role,
                    Source {
                        uri,
                        mimetype: src.mimetype,
                        mtime: None,
                    },
                );
            }
        }
    }

    for part in &mut obj.parts {
        add_external_uris(part, exports, resolver);
    }
}

fn push_unique(obj: &mut Container, role: UriRole, src: Source) {
    if !obj.sources(role).iter().any(|s| s.uri == src.uri) {
        obj.add_source(role, src);
    }
}

/// Undo [`add_external_uris`]: keep only the first source when it is a local
/// file or a catalog URI.
pub fn delete_external_uris(obj: &mut Container, resolver: Option<&dyn CatalogResolver>) {
    for role in UriRole::ALL {
        let Some(list) = obj.sources.get_mut(&role) else {
            continue;
        };
        let keep_first = list
            .first()
            .is_some_and(|s| s.is_local() || resolver.is_some_and(|r| r.handles(&s.uri)));
        if keep_first {
            list.truncate(1);
        }
    }
    for part in &mut obj.parts {
        delete_external_uris(part, resolver);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medialib_types::MediaClass;

    fn dirs() -> MediaDirs {
        let mut d = MediaDirs::new();
        d.set_root_uri("http://10.0.0.2:8888/");
        d.set_parameter("export_media_dirs", &ParameterValue::Bool(true));
        d.add_path("/nonexistent-media/music");
        d
    }

    fn song(uri: &str) -> Container {
        let mut c = Container::new("/songs/1", "One", MediaClass::Song);
        let mut src = Source::new(uri).with_mimetype("audio/flac");
        src.mtime = Some(1_700_000_000);
        c.add_source(UriRole::Src, src);
        c
    }

    #[test]
    fn exported_file_gets_external_uri() {
        let d = dirs();
        let hash = path_hash("/nonexistent-media/music/");
        let uri = d.local_to_external("/nonexistent-media/music/a b.flac").unwrap();
        assert_eq!(uri, format!("http://10.0.0.2:8888/media/{}/a%20b.flac", hash));
    }

    #[test]
    fn unexported_and_restricted_paths() {
        let mut d = dirs();
        assert!(d.local_to_external("/elsewhere/a.flac").is_none());
        d.set_parameter(
            "restrict_dirs",
            &ParameterValue::StringList(vec!["/nonexistent-media/music/private".into()]),
        );
        assert!(d.local_to_external("/nonexistent-media/music/private/a.flac").is_none());
        assert!(d.local_to_external("/nonexistent-media/music/public/a.flac").is_some());
        d.set_parameter("export_media_dirs", &ParameterValue::Bool(false));
        assert!(d.local_to_external("/nonexistent-media/music/public/a.flac").is_none());
    }

    #[test]
    fn external_path_maps_back() {
        let d = dirs();
        let hash = path_hash("/nonexistent-media/music/");
        let local = d.external_to_local(&format!("/media/{}/x/y.ogg", hash));
        assert_eq!(local.as_deref(), Some("/nonexistent-media/music/x/y.ogg"));
        assert!(d.external_to_local("/media/deadbeef/y.ogg").is_none());
    }

    #[test]
    fn del_path_stops_export() {
        let mut d = dirs();
        d.del_path("/nonexistent-media/music");
        assert!(d.is_empty());
        assert!(d.local_to_external("/nonexistent-media/music/a.flac").is_none());
    }

    #[test]
    fn add_external_uris_is_idempotent() {
        let d = dirs();
        let mut c = song("/nonexistent-media/music/a.flac");
        add_external_uris(&mut c, &d, None);
        let once = c.clone();
        add_external_uris(&mut c, &d, None);
        assert_eq!(c, once);

        let srcs = c.sources(UriRole::Src);
        assert_eq!(srcs.len(), 2);
        assert_eq!(srcs[1].mimetype.as_deref(), Some("audio/flac"));
        assert_eq!(srcs[1].mtime, None);
    }

    #[test]
    fn parts_are_rewritten_too() {
        let d = dirs();
        let mut c = Container::new("/movies/1", "Movie", MediaClass::Movie);
        c.parts.push(song("/nonexistent-media/music/p1.flac"));
        c.parts.push(song("/nonexistent-media/music/p2.flac"));
        add_external_uris(&mut c, &d, None);
        assert!(c.parts.iter().all(|p| p.sources(UriRole::Src).len() == 2));
    }

    #[test]
    fn radiobrowser_uri_resolves_to_playlist() {
        let d = dirs();
        let rb = RadioBrowserResolver::new("de1.api.radio-browser.info");
        let mut c = song("radiobrowser:///9617a958-0601-11e8-ae97-52543be04c81");
        add_external_uris(&mut c, &d, Some(&rb));
        add_external_uris(&mut c, &d, Some(&rb));
        let srcs = c.sources(UriRole::Src);
        assert_eq!(srcs.len(), 2);
        assert_eq!(
            srcs[1].uri,
            "https://de1.api.radio-browser.info/m3u/url/9617a958-0601-11e8-ae97-52543be04c81"
        );
        assert_eq!(srcs[1].mimetype.as_deref(), Some(PLAYLIST_MIMETYPE));
    }

    #[test]
    fn delete_external_uris_keeps_local_source() {
        let d = dirs();
        let rb = RadioBrowserResolver::new("de1.api.radio-browser.info");
        let mut local = song("/nonexistent-media/music/a.flac");
        let pristine = local.clone();
        add_external_uris(&mut local, &d, Some(&rb));
        delete_external_uris(&mut local, Some(&rb));
        assert_eq!(local, pristine);

        let mut remote = song("http://example.com/a.mp3");
        remote.add_source(UriRole::Src, Source::new("http://mirror.example.com/a.mp3"));
        delete_external_uris(&mut remote, Some(&rb));
        assert_eq!(remote.sources(UriRole::Src).len(), 2);
    }

    #[test]
    fn media_dirs_parameters() {
        let mut d = MediaDirs::new();
        assert!(!d.set_parameter("bogus", &ParameterValue::Bool(true)));
        assert_eq!(MediaDirs::parameters().len(), 3);
        d.set_parameter("export_dirs", &ParameterValue::StringList(vec!["/srv/media".into()]));
        d.set_parameter("export_media_dirs", &ParameterValue::Bool(true));
        d.set_root_uri("http://host:1");
        // Allowed by the export list but there is no media dir to map it to.
        assert!(d.local_to_external("/srv/media/a.mp3").is_none());
        d.add_path("/srv/media/");
        assert!(d.local_to_external("/srv/media/a.mp3").is_some());
    }
}
