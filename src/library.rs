use crate::model::Song;
use anyhow::{Context, Result};
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::picture::PictureType;
use lofty::prelude::{Accessor, ItemKey};
use lofty::probe::Probe;
use lofty::tag::Tag;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "aac", "ogg", "m4a", "wma"];

/// Reported once per audio file during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanProgress {
    pub scanned: usize,
    pub total: usize,
    pub current: PathBuf,
}

/// Songs found under the configured music folders.
#[derive(Debug, Default)]
pub struct Library {
    folders: Vec<PathBuf>,
    songs: Vec<Song>,
}

impl Library {
    pub fn from_folders(folders: &[PathBuf]) -> Self {
        let folders: Vec<PathBuf> = folders.iter().map(|folder| normalize_path(folder)).collect();
        let songs = scan_many(&folders);
        Self { folders, songs }
    }

    pub fn folders(&self) -> &[PathBuf] {
        &self.folders
    }

    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    /// Scans `folder` and merges its songs. Returns how many new songs were
    /// found, or `None` when the folder was already part of the library.
    pub fn add_folder(
        &mut self,
        folder: &Path,
        on_progress: impl FnMut(&ScanProgress),
    ) -> Option<usize> {
        let normalized = normalize_path(folder);
        if self.folders.iter().any(|known| known == &normalized) {
            return None;
        }

        let before = self.songs.len();
        let found = scan_folder_with_progress(&normalized, on_progress);
        self.folders.push(normalized);
        self.songs.extend(found);
        sort_and_dedup(&mut self.songs);
        Some(self.songs.len() - before)
    }

    pub fn remove_folder(&mut self, folder: &Path) -> bool {
        let normalized = normalize_path(folder);
        let before = self.folders.len();
        self.folders.retain(|known| known != &normalized);
        if self.folders.len() == before {
            return false;
        }
        self.songs.retain(|song| !song.file_path.starts_with(&normalized));
        true
    }

    pub fn rescan(&mut self) {
        self.songs = scan_many(&self.folders);
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Song> {
        self.songs.iter().find(|song| song.id == id)
    }

    pub fn find_by_path(&self, path: &Path) -> Option<&Song> {
        self.songs.iter().find(|song| song.file_path == path)
    }

    pub fn search(&self, query: &str) -> Vec<&Song> {
        search(&self.songs, query)
    }
}

pub fn scan_folder(root: &Path) -> Vec<Song> {
    scan_folder_with_progress(root, |_| {})
}

/// Scans `root` recursively. Files whose tags cannot be read are logged and
/// skipped; the rest of the folder is still scanned.
pub fn scan_folder_with_progress(root: &Path, mut on_progress: impl FnMut(&ScanProgress)) -> Vec<Song> {
    let paths: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!("skipping unreadable entry: {err}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_audio(entry.path()))
        .map(|entry| entry.into_path())
        .collect();

    let total = paths.len();
    let mut songs = Vec::with_capacity(total);
    for (scanned, path) in paths.into_iter().enumerate() {
        match read_song(&path) {
            Ok(song) => songs.push(song),
            Err(err) => tracing::warn!("skipping {}: {err:#}", path.display()),
        }
        on_progress(&ScanProgress {
            scanned: scanned + 1,
            total,
            current: path,
        });
    }

    sort_and_dedup(&mut songs);
    tracing::info!(root = %root.display(), songs = songs.len(), "scan completed");
    songs
}

pub fn scan_many(roots: &[PathBuf]) -> Vec<Song> {
    let mut all = Vec::new();
    for root in roots {
        all.extend(scan_folder(root));
    }
    sort_and_dedup(&mut all);
    all
}

fn sort_and_dedup(songs: &mut Vec<Song>) {
    songs.sort_by(|a, b| a.file_path.cmp(&b.file_path));
    songs.dedup_by(|a, b| a.file_path == b.file_path);
}

/// Reads one file's tags and properties into a [`Song`].
///
/// Missing tags fall back to the file stem for the title and to the
/// "Unknown" defaults for the rest.
pub fn read_song(path: &Path) -> Result<Song> {
    let tagged_file = Probe::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .read()
        .with_context(|| format!("failed to read tags for {}", path.display()))?;

    let mut song = Song::new(path).with_id(stable_song_id(path));
    song.duration = tagged_file.properties().duration();

    if let Some(tag) = tagged_file.primary_tag().or(tagged_file.first_tag()) {
        if let Some(title) = tag.title().as_deref().and_then(clean_tag_value) {
            song.title = title;
        }
        if let Some(artist) = tag.artist().as_deref().and_then(clean_tag_value) {
            song.artist = artist;
        }
        if let Some(album) = tag.album().as_deref().and_then(clean_tag_value) {
            song.album = album;
        }
        if let Some(genre) = tag.genre().as_deref().and_then(clean_tag_value) {
            song.genre = genre;
        }
        song.year = tag_year(tag).unwrap_or(0);
        song.album_art = cover_art(tag);
    }
    Ok(song)
}

/// Id derived from the file path, so rescans keep statistics and playlist
/// entries attached to the same song.
pub fn stable_song_id(path: &Path) -> String {
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, path.to_string_lossy().as_bytes()).to_string()
}

fn tag_year(tag: &Tag) -> Option<u32> {
    let date = tag.get_string(ItemKey::RecordingDate)?;
    let digits: String = date.trim().chars().take_while(char::is_ascii_digit).collect();
    (digits.len() == 4).then(|| digits.parse().ok()).flatten()
}

fn cover_art(tag: &Tag) -> Option<Vec<u8>> {
    let pictures = tag.pictures();
    pictures
        .iter()
        .find(|picture| picture.pic_type() == PictureType::CoverFront)
        .or_else(|| pictures.first())
        .map(|picture| picture.data().to_vec())
}

fn clean_tag_value(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Case-insensitive match on title, artist, album or genre. A blank query
/// matches everything.
pub fn search<'a>(songs: &'a [Song], query: &str) -> Vec<&'a Song> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return songs.iter().collect();
    }
    songs
        .iter()
        .filter(|song| {
            [&song.title, &song.artist, &song.album, &song.genre]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
        })
        .collect()
}

pub fn is_audio(path: &Path) -> bool {
    let ext = path.extension().and_then(OsStr::to_str).unwrap_or_default();
    AUDIO_EXTENSIONS
        .iter()
        .any(|supported| ext.eq_ignore_ascii_case(supported))
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
