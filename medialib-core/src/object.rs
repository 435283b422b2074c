//! Preparing objects for the outside world.
//!
//! Everything published to subscribers goes through [`finalize`] first.

use medialib_types::{Container, MediaClass};

struct ClassHint {
    class: MediaClass,
    child_class: Option<MediaClass>,
    tooltip: Option<&'static str>,
}

const fn hint(
    class: MediaClass,
    child_class: Option<MediaClass>,
    tooltip: Option<&'static str>,
) -> ClassHint {
    ClassHint {
        class,
        child_class,
        tooltip,
    }
}

const STREAMS_TOOLTIP: &str = "Add http(s) urls for Radio- or TV channels in m3u format.\n\
Use radiobrowser:// to import the database from radio-browser.info.\n\
Use iptv-org:// to import the database from https://iptv-org.github.io/";

static CLASS_HINTS: [ClassHint; 14] = [
    hint(MediaClass::MusicAlbum, Some(MediaClass::Song), None),
    hint(MediaClass::TvSeason, Some(MediaClass::TvEpisode), None),
    hint(MediaClass::TvShow, Some(MediaClass::TvSeason), None),
    hint(MediaClass::Root, None, None),
    hint(MediaClass::RootMusicAlbums, Some(MediaClass::Container), None),
    hint(MediaClass::RootSongs, Some(MediaClass::Container), None),
    hint(MediaClass::RootMovies, Some(MediaClass::Container), None),
    hint(MediaClass::RootTvShows, Some(MediaClass::Container), None),
    hint(MediaClass::RootStreams, Some(MediaClass::Container), Some(STREAMS_TOOLTIP)),
    hint(
        MediaClass::RootDirectories,
        Some(MediaClass::Directory),
        Some("Add directories, which will be scanned recursively for media files"),
    ),
    hint(
        MediaClass::RootPodcasts,
        Some(MediaClass::Podcast),
        Some("Add urls for podcast feeds (in RSS xml format)"),
    ),
    hint(
        MediaClass::RootPhotos,
        None,
        Some("Add directories, which will be scanned recursively for photo albums"),
    ),
    hint(
        MediaClass::RootLibrary,
        None,
        Some("Add generic containers, playlists or TV- or Radio channel lists"),
    ),
    hint(MediaClass::RootRemovableAudioCd, Some(MediaClass::Song), None),
];

fn class_hint(class: &MediaClass) -> Option<&'static ClassHint> {
    CLASS_HINTS.iter().find(|h| &h.class == class)
}

/// Expected class of the children of `obj`.
///
/// An explicit `child_class` on the object wins over the class table.
pub fn child_class_of(obj: &Container) -> Option<MediaClass> {
    if let Some(explicit) = &obj.child_class {
        return Some(explicit.clone());
    }
    class_hint(&obj.class).and_then(|h| h.child_class.clone())
}

/// Strip internal fields and fill the pagination and class hints.
///
/// `idx` is set when given, `total` only when non-zero. Idempotent.
pub fn finalize(obj: &mut Container, idx: Option<usize>, total: usize) {
    obj.children.clear();
    obj.streams = None;
    obj.backend = None;

    if let Some(h) = class_hint(&obj.class) {
        obj.child_class = h.child_class.clone();
        obj.tooltip = h.tooltip.map(str::to_string);
    }

    if let Some(idx) = idx {
        obj.idx = Some(idx);
    }
    if total > 0 {
        obj.total = Some(total);
    }
}

/// Finalize one page of children starting at `start` of `total`.
pub fn finalize_page(items: &mut [Container], start: usize, total: usize) {
    for (i, item) in items.iter_mut().enumerate() {
        finalize(item, Some(start + i), total);
    }
}

/// Clamp a browse window to `total` children.
///
/// Returns how many children to send: zero when `start` is past the end,
/// everything remaining when `count` is `None`, zero, or reaches past the end.
pub fn adjust_count(start: usize, count: Option<usize>, total: usize) -> usize {
    if start >= total {
        return 0;
    }
    let remaining = total - start;
    match count {
        Some(n) if n >= 1 && n <= remaining => n,
        _ => remaining,
    }
}

/// Parent of a hierarchical id. `None` for the root.
pub fn parent_id(id: &str) -> Option<&str> {
    if id == "/" {
        return None;
    }
    match id.rfind('/')? {
        0 => Some("/"),
        end => Some(&id[..end]),
    }
}

/// Whether `descendant` is `ancestor` itself or lies below it.
pub fn is_ancestor(ancestor: &str, descendant: &str) -> bool {
    if ancestor == "/" {
        return true;
    }
    match descendant.strip_prefix(ancestor) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
