//! User playlists and their JSON store.
//!
//! Playlists are saved as one JSON array in `playlists.json`. On load, entries
//! are relinked against the scanned catalog by id first and file path second;
//! entries without a catalog match survive only while their file exists.

use crate::config;
use crate::model::{Song, duration_secs};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub description: String,
    pub cover_image: Option<Vec<u8>>,
    pub created_date: OffsetDateTime,
    pub songs: Vec<Song>,
}

impl Playlist {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            cover_image: None,
            created_date: OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc()),
            songs: Vec::new(),
        }
    }

    pub fn total_duration(&self) -> Duration {
        self.songs.iter().map(|song| song.duration).sum()
    }

    pub fn contains(&self, song: &Song) -> bool {
        self.songs.iter().any(|entry| entry == song)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PlaylistRecord {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default, with = "base64_bytes")]
    cover_image: Option<Vec<u8>>,
    #[serde(with = "time::serde::rfc3339")]
    created_date: OffsetDateTime,
    #[serde(default)]
    songs: Vec<SongRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SongRecord {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    artist: String,
    #[serde(default)]
    album: String,
    #[serde(default)]
    genre: String,
    #[serde(default)]
    year: u32,
    file_path: PathBuf,
    #[serde(default, with = "duration_secs")]
    duration: Duration,
    #[serde(default, with = "base64_bytes")]
    album_art: Option<Vec<u8>>,
}

impl From<&Song> for SongRecord {
    fn from(song: &Song) -> Self {
        Self {
            id: song.id.clone(),
            title: song.title.clone(),
            artist: song.artist.clone(),
            album: song.album.clone(),
            genre: song.genre.clone(),
            year: song.year,
            file_path: song.file_path.clone(),
            duration: song.duration,
            album_art: song.album_art.clone(),
        }
    }
}

impl From<SongRecord> for Song {
    fn from(record: SongRecord) -> Self {
        let mut song = Song::new(record.file_path).with_id(record.id);
        if !record.title.is_empty() {
            song.title = record.title;
        }
        if !record.artist.is_empty() {
            song.artist = record.artist;
        }
        if !record.album.is_empty() {
            song.album = record.album;
        }
        if !record.genre.is_empty() {
            song.genre = record.genre;
        }
        song.year = record.year;
        song.duration = record.duration;
        song.album_art = record.album_art;
        song
    }
}

impl From<&Playlist> for PlaylistRecord {
    fn from(playlist: &Playlist) -> Self {
        Self {
            id: playlist.id.clone(),
            name: playlist.name.clone(),
            description: playlist.description.clone(),
            cover_image: playlist.cover_image.clone(),
            created_date: playlist.created_date,
            songs: playlist.songs.iter().map(SongRecord::from).collect(),
        }
    }
}

/// Optional bytes as a base64 string or `null`.
mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) if !encoded.is_empty() => STANDARD
                .decode(encoded.as_bytes())
                .map(Some)
                .map_err(D::Error::custom),
            _ => Ok(None),
        }
    }
}

fn find_in_catalog<'a>(catalog: &'a [Song], id: &str, file_path: &Path) -> Option<&'a Song> {
    catalog
        .iter()
        .find(|song| song.id == id)
        .or_else(|| {
            catalog
                .iter()
                .find(|song| !file_path.as_os_str().is_empty() && song.file_path == file_path)
        })
}

fn relink_record(record: SongRecord, catalog: &[Song], playlist: &str) -> Option<Song> {
    if let Some(song) = find_in_catalog(catalog, &record.id, &record.file_path) {
        return Some(song.clone());
    }
    if record.file_path.is_file() {
        return Some(Song::from(record));
    }
    tracing::debug!(playlist, path = %record.file_path.display(), "dropping playlist entry with missing file");
    None
}

/// Reads playlists from `path`, relinking entries against `catalog`.
/// A missing or blank file holds no playlists.
pub fn load_playlists_from_path(path: &Path, catalog: &[Song]) -> Result<Vec<Playlist>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read playlists file {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let records: Vec<PlaylistRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse playlists file {}", path.display()))?;

    Ok(records
        .into_iter()
        .map(|record| {
            let songs = record
                .songs
                .into_iter()
                .filter_map(|song| relink_record(song, catalog, &record.name))
                .collect();
            Playlist {
                id: record.id,
                name: record.name,
                description: record.description,
                cover_image: record.cover_image,
                created_date: record.created_date,
                songs,
            }
        })
        .collect())
}

pub fn save_playlists_to_path(path: &Path, playlists: &[Playlist]) -> Result<()> {
    let records: Vec<PlaylistRecord> = playlists.iter().map(PlaylistRecord::from).collect();
    let json = serde_json::to_string_pretty(&records)?;
    config::write_with_backup(path, &json)
}

/// Playlist collection that writes itself back after every change.
#[derive(Debug)]
pub struct PlaylistStore {
    path: Option<PathBuf>,
    playlists: Vec<Playlist>,
}

impl PlaylistStore {
    /// Opens the store at `path`. Unreadable content is logged and the store
    /// starts empty.
    pub fn open(path: PathBuf, catalog: &[Song]) -> Self {
        let playlists = match load_playlists_from_path(&path, catalog) {
            Ok(playlists) => playlists,
            Err(err) => {
                tracing::warn!("playlists unavailable, starting empty: {err:#}");
                Vec::new()
            }
        };
        Self {
            path: Some(path),
            playlists,
        }
    }

    pub fn open_default(catalog: &[Song]) -> Result<Self> {
        Ok(Self::open(config::playlists_path()?, catalog))
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            playlists: Vec::new(),
        }
    }

    pub fn playlists(&self) -> &[Playlist] {
        &self.playlists
    }

    pub fn get(&self, id: &str) -> Option<&Playlist> {
        self.playlists.iter().find(|playlist| playlist.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Playlist> {
        self.playlists
            .iter()
            .find(|playlist| playlist.name.eq_ignore_ascii_case(name))
    }

    /// Creates a playlist and returns its id.
    pub fn create(&mut self, name: &str, description: &str, cover_image: Option<Vec<u8>>) -> String {
        let mut playlist = Playlist::new(name, description);
        playlist.cover_image = cover_image;
        let id = playlist.id.clone();
        tracing::info!(name, "created playlist");
        self.playlists.push(playlist);
        self.persist();
        id
    }

    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.playlists.len();
        self.playlists.retain(|playlist| playlist.id != id);
        let removed = self.playlists.len() != before;
        if removed {
            self.persist();
        }
        removed
    }

    pub fn update(&mut self, id: &str, name: &str, description: &str) -> bool {
        let Some(playlist) = self.get_mut(id) else {
            return false;
        };
        playlist.name = name.to_string();
        playlist.description = description.to_string();
        self.persist();
        true
    }

    pub fn set_cover_image(&mut self, id: &str, cover_image: Option<Vec<u8>>) -> bool {
        let Some(playlist) = self.get_mut(id) else {
            return false;
        };
        playlist.cover_image = cover_image;
        self.persist();
        true
    }

    /// Adds `song`, preferring the catalog's instance of it. Songs already in
    /// the playlist are not added twice.
    pub fn add_song(&mut self, id: &str, song: &Song, catalog: &[Song]) -> bool {
        let song = find_in_catalog(catalog, &song.id, &song.file_path)
            .unwrap_or(song)
            .clone();
        let Some(playlist) = self.get_mut(id) else {
            return false;
        };
        if playlist.contains(&song) {
            return false;
        }
        playlist.songs.push(song);
        self.persist();
        true
    }

    pub fn remove_song(&mut self, id: &str, song: &Song) -> bool {
        let Some(playlist) = self.get_mut(id) else {
            return false;
        };
        let before = playlist.songs.len();
        playlist.songs.retain(|entry| entry != song);
        let removed = playlist.songs.len() != before;
        if removed {
            self.persist();
        }
        removed
    }

    /// Points every entry at its catalog instance after a rescan.
    pub fn relink(&mut self, catalog: &[Song]) {
        let mut dropped = 0usize;
        for playlist in &mut self.playlists {
            let songs = std::mem::take(&mut playlist.songs);
            playlist.songs = songs
                .into_iter()
                .filter_map(|song| {
                    match find_in_catalog(catalog, &song.id, &song.file_path) {
                        Some(linked) => Some(linked.clone()),
                        None if song.file_path.is_file() => Some(song),
                        None => {
                            dropped += 1;
                            None
                        }
                    }
                })
                .collect();
        }
        if dropped > 0 {
            tracing::warn!(dropped, "removed playlist entries whose files are gone");
        }
        self.persist();
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Playlist> {
        self.playlists.iter_mut().find(|playlist| playlist.id == id)
    }

    fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(err) = save_playlists_to_path(path, &self.playlists) {
            tracing::warn!("failed to save playlists: {err:#}");
        }
    }
}
