use std::fmt;

use serde::{Deserialize, Serialize};

/// Media class tag carried by every container and item.
///
/// The string form is stable and is what ends up in persisted caches and on
/// the wire. Unknown strings round-trip through [`MediaClass::Other`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MediaClass {
    Root,
    RootFavorites,
    RootLibrary,
    RootMusicAlbums,
    RootSongs,
    RootStreams,
    RootPodcasts,
    RootMovies,
    RootTvShows,
    RootPhotos,
    RootDirectories,
    RootRemovable,
    RootRemovableAudioCd,
    RootRemovableVcd,
    RootRemovableSvcd,
    RootRemovableVideoDvd,
    RootRemovableFilesystem,
    RootRemovableHdd,
    RootRemovablePendrive,
    RootRemovableMemoryCard,
    RootRemovableMobile,
    RootRemovableCd,
    RootRemovableDvd,
    RootServer,
    Container,
    Playlist,
    Directory,
    MusicAlbum,
    TvShow,
    TvSeason,
    Podcast,
    Song,
    PodcastEpisode,
    Movie,
    TvEpisode,
    Video,
    Image,
    AudioBroadcast,
    VideoBroadcast,
    Location,
    Other(String),
}

impl MediaClass {
    pub fn as_str(&self) -> &str {
        match self {
            MediaClass::Root => "root",
            MediaClass::RootFavorites => "root-favorites",
            MediaClass::RootLibrary => "root-library",
            MediaClass::RootMusicAlbums => "root-music-albums",
            MediaClass::RootSongs => "root-songs",
            MediaClass::RootStreams => "root-streams",
            MediaClass::RootPodcasts => "root-podcasts",
            MediaClass::RootMovies => "root-movies",
            MediaClass::RootTvShows => "root-tv-shows",
            MediaClass::RootPhotos => "root-photos",
            MediaClass::RootDirectories => "root-directories",
            MediaClass::RootRemovable => "root-removable",
            MediaClass::RootRemovableAudioCd => "root-removable-audiocd",
            MediaClass::RootRemovableVcd => "root-removable-vcd",
            MediaClass::RootRemovableSvcd => "root-removable-svcd",
            MediaClass::RootRemovableVideoDvd => "root-removable-videodvd",
            MediaClass::RootRemovableFilesystem => "root-removable-filesystem",
            MediaClass::RootRemovableHdd => "root-removable-filesystem-hdd",
            MediaClass::RootRemovablePendrive => "root-removable-filesystem-pendrive",
            MediaClass::RootRemovableMemoryCard => "root-removable-filesystem-memorycard",
            MediaClass::RootRemovableMobile => "root-removable-filesystem-mobile",
            MediaClass::RootRemovableCd => "root-removable-filesystem-cd",
            MediaClass::RootRemovableDvd => "root-removable-filesystem-dvd",
            MediaClass::RootServer => "root-server",
            MediaClass::Container => "container",
            MediaClass::Playlist => "playlist",
            MediaClass::Directory => "directory",
            MediaClass::MusicAlbum => "music-album",
            MediaClass::TvShow => "tv-show",
            MediaClass::TvSeason => "tv-season",
            MediaClass::Podcast => "podcast",
            MediaClass::Song => "song",
            MediaClass::PodcastEpisode => "podcast-episode",
            MediaClass::Movie => "movie",
            MediaClass::TvEpisode => "tv-episode",
            MediaClass::Video => "video",
            MediaClass::Image => "image",
            MediaClass::AudioBroadcast => "audio-broadcast",
            MediaClass::VideoBroadcast => "video-broadcast",
            MediaClass::Location => "location",
            MediaClass::Other(s) => s,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "root" => MediaClass::Root,
            "root-favorites" => MediaClass::RootFavorites,
            "root-library" => MediaClass::RootLibrary,
            "root-music-albums" => MediaClass::RootMusicAlbums,
            "root-songs" => MediaClass::RootSongs,
            "root-streams" => MediaClass::RootStreams,
            "root-podcasts" => MediaClass::RootPodcasts,
            "root-movies" => MediaClass::RootMovies,
            "root-tv-shows" => MediaClass::RootTvShows,
            "root-photos" => MediaClass::RootPhotos,
            "root-directories" => MediaClass::RootDirectories,
            "root-removable" => MediaClass::RootRemovable,
            "root-removable-audiocd" => MediaClass::RootRemovableAudioCd,
            "root-removable-vcd" => MediaClass::RootRemovableVcd,
            "root-removable-svcd" => MediaClass::RootRemovableSvcd,
            "root-removable-videodvd" => MediaClass::RootRemovableVideoDvd,
            "root-removable-filesystem" => MediaClass::RootRemovableFilesystem,
            "root-removable-filesystem-hdd" => MediaClass::RootRemovableHdd,
            "root-removable-filesystem-pendrive" => MediaClass::RootRemovablePendrive,
            "root-removable-filesystem-memorycard" => MediaClass::RootRemovableMemoryCard,
            "root-removable-filesystem-mobile" => MediaClass::RootRemovableMobile,
            "root-removable-filesystem-cd" => MediaClass::RootRemovableCd,
            "root-removable-filesystem-dvd" => MediaClass::RootRemovableDvd,
            "root-server" => MediaClass::RootServer,
            "container" => MediaClass::Container,
            "playlist" => MediaClass::Playlist,
            "directory" => MediaClass::Directory,
            "music-album" => MediaClass::MusicAlbum,
            "tv-show" => MediaClass::TvShow,
            "tv-season" => MediaClass::TvSeason,
            "podcast" => MediaClass::Podcast,
            "song" => MediaClass::Song,
            "podcast-episode" => MediaClass::PodcastEpisode,
            "movie" => MediaClass::Movie,
            "tv-episode" => MediaClass::TvEpisode,
            "video" => MediaClass::Video,
            "image" => MediaClass::Image,
            "audio-broadcast" => MediaClass::AudioBroadcast,
            "video-broadcast" => MediaClass::VideoBroadcast,
            "location" => MediaClass::Location,
            other => MediaClass::Other(other.to_string()),
        }
    }

    /// Top-level classes managed by the root catalog.
    pub fn is_root(&self) -> bool {
        matches!(
            self,
            MediaClass::Root
                | MediaClass::RootFavorites
                | MediaClass::RootLibrary
                | MediaClass::RootMusicAlbums
                | MediaClass::RootSongs
                | MediaClass::RootStreams
                | MediaClass::RootPodcasts
                | MediaClass::RootMovies
                | MediaClass::RootTvShows
                | MediaClass::RootPhotos
                | MediaClass::RootDirectories
                | MediaClass::RootRemovable
                | MediaClass::RootRemovableAudioCd
                | MediaClass::RootRemovableVcd
                | MediaClass::RootRemovableSvcd
                | MediaClass::RootRemovableVideoDvd
                | MediaClass::RootRemovableFilesystem
                | MediaClass::RootRemovableHdd
                | MediaClass::RootRemovablePendrive
                | MediaClass::RootRemovableMemoryCard
                | MediaClass::RootRemovableMobile
                | MediaClass::RootRemovableCd
                | MediaClass::RootRemovableDvd
                | MediaClass::RootServer
        )
    }

    pub fn is_container(&self) -> bool {
        match self {
            MediaClass::Container
            | MediaClass::Playlist
            | MediaClass::Directory
            | MediaClass::MusicAlbum
            | MediaClass::TvShow
            | MediaClass::TvSeason
            | MediaClass::Podcast => true,
            MediaClass::Other(s) => s.starts_with("container"),
            other => other.is_root(),
        }
    }
}

impl fmt::Display for MediaClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for MediaClass {
    fn from(s: String) -> Self {
        match MediaClass::parse(&s) {
            MediaClass::Other(_) => MediaClass::Other(s),
            known => known,
        }
    }
}

impl From<&str> for MediaClass {
    fn from(s: &str) -> Self {
        MediaClass::parse(s)
    }
}

impl From<MediaClass> for String {
    fn from(class: MediaClass) -> Self {
        match class {
            MediaClass::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names_parse_back() {
        for class in [
            MediaClass::RootTvShows,
            MediaClass::RootRemovableMemoryCard,
            MediaClass::MusicAlbum,
            MediaClass::Directory,
        ] {
            assert_eq!(MediaClass::parse(class.as_str()), class);
        }
    }

    #[test]
    fn unknown_name_is_preserved() {
        let class = MediaClass::from("container-radio".to_string());
        assert_eq!(class, MediaClass::Other("container-radio".into()));
        assert!(class.is_container());
        assert_eq!(String::from(class), "container-radio");
    }

    #[test]
    fn root_classes_are_containers() {
        assert!(MediaClass::RootServer.is_root());
        assert!(MediaClass::RootServer.is_container());
        assert!(!MediaClass::Song.is_container());
        assert!(!MediaClass::Playlist.is_root());
    }

    #[test]
    fn unknown_root_like_name_is_not_root() {
        let class = MediaClass::parse("root-jukebox");
        assert_eq!(class, MediaClass::Other("root-jukebox".into()));
        assert!(!class.is_root());
        assert!(!class.is_container());
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&MediaClass::RootMusicAlbums).unwrap();
        assert_eq!(json, "\"root-music-albums\"");
        let back: MediaClass = serde_json::from_str("\"song\"").unwrap();
        assert_eq!(back, MediaClass::Song);
    }
}
