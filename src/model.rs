use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";
pub const UNKNOWN_GENRE: &str = "Unknown";

/// A playable song.
///
/// Identity is the `id` alone: two values with the same id are the same song
/// for queue and collection purposes, whatever their paths. Matching by file
/// path is a separate reconciliation step (see [`Song::same_file`]) used only
/// when relinking persisted playlists against a fresh scan.
#[derive(Debug, Clone)]
pub struct Song {
    pub id: String,
    pub file_path: PathBuf,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub year: u32,
    pub duration: Duration,
    pub album_art: Option<Vec<u8>>,
}

impl Song {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        let file_path = file_path.into();
        let title = file_stem_title(&file_path);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_path,
            title,
            artist: UNKNOWN_ARTIST.to_string(),
            album: UNKNOWN_ALBUM.to_string(),
            genre: UNKNOWN_GENRE.to_string(),
            year: 0,
            duration: Duration::ZERO,
            album_art: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn same_file(&self, other: &Song) -> bool {
        !self.file_path.as_os_str().is_empty() && self.file_path == other.file_path
    }

    pub fn display_text(&self) -> String {
        format!("{} - {}", self.artist, self.title)
    }
}

impl PartialEq for Song {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Song {}

impl Hash for Song {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

pub(crate) fn file_stem_title(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .filter(|stem| !stem.trim().is_empty())
        .unwrap_or_else(|| String::from("unknown"))
}

/// Serializes a [`Duration`] as fractional seconds.
pub(crate) mod duration_secs {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|err| D::Error::custom(format!("invalid duration in seconds {secs}: {err}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RepeatMode {
    #[default]
    Off,
    RepeatAll,
    RepeatOne,
}

impl RepeatMode {
    pub fn next(self) -> Self {
        match self {
            Self::Off => Self::RepeatAll,
            Self::RepeatAll => Self::RepeatOne,
            Self::RepeatOne => Self::Off,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::RepeatAll => "all",
            Self::RepeatOne => "one",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Single-value view over the shuffle and repeat toggles.
///
/// Derived on demand and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayMode {
    Normal,
    RepeatOne,
    RepeatAll,
    Shuffle,
}

impl PlayMode {
    pub fn from_toggles(shuffle: bool, repeat: RepeatMode) -> Self {
        match (shuffle, repeat) {
            (_, RepeatMode::RepeatOne) => Self::RepeatOne,
            (true, _) => Self::Shuffle,
            (false, RepeatMode::RepeatAll) => Self::RepeatAll,
            (false, RepeatMode::Off) => Self::Normal,
        }
    }

    pub fn toggles(self) -> (bool, RepeatMode) {
        match self {
            Self::Normal => (false, RepeatMode::Off),
            Self::RepeatOne => (false, RepeatMode::RepeatOne),
            Self::RepeatAll => (false, RepeatMode::RepeatAll),
            Self::Shuffle => (true, RepeatMode::Off),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub folders: Vec<PathBuf>,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default)]
    pub repeat: RepeatMode,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default = "default_karaoke_cooldown_seconds")]
    pub karaoke_cooldown_seconds: u16,
    #[serde(default = "default_separator_program")]
    pub separator_program: String,
    #[serde(default)]
    pub separator_script: Option<PathBuf>,
    #[serde(default = "default_separation_timeout_minutes")]
    pub separation_timeout_minutes: u16,
}

fn default_volume() -> f32 {
    1.0
}

fn default_karaoke_cooldown_seconds() -> u16 {
    5
}

fn default_separator_program() -> String {
    String::from("python")
}

fn default_separation_timeout_minutes() -> u16 {
    30
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            folders: Vec::new(),
            shuffle: false,
            repeat: RepeatMode::Off,
            volume: default_volume(),
            karaoke_cooldown_seconds: default_karaoke_cooldown_seconds(),
            separator_program: default_separator_program(),
            separator_script: None,
            separation_timeout_minutes: default_separation_timeout_minutes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn songs_with_same_id_are_equal_even_when_paths_differ() {
        let a = Song::new("a.mp3").with_id("1");
        let b = Song::new("moved/a.mp3").with_id("1");
        assert_eq!(a, b);
    }

    #[test]
    fn same_path_different_id_is_not_equal_but_same_file() {
        let a = Song::new("a.mp3").with_id("1");
        let b = Song::new("a.mp3").with_id("2");
        assert_ne!(a, b);
        assert!(a.same_file(&b));
    }

    #[test]
    fn new_song_takes_title_from_file_stem() {
        let song = Song::new("/music/Night Drive.flac");
        assert_eq!(song.title, "Night Drive");
        assert_eq!(song.artist, UNKNOWN_ARTIST);
    }

    #[test]
    fn play_mode_view_round_trips_through_toggles() {
        for mode in [
            PlayMode::Normal,
            PlayMode::RepeatOne,
            PlayMode::RepeatAll,
            PlayMode::Shuffle,
        ] {
            let (shuffle, repeat) = mode.toggles();
            assert_eq!(PlayMode::from_toggles(shuffle, repeat), mode);
        }
        assert_eq!(
            PlayMode::from_toggles(true, RepeatMode::RepeatAll),
            PlayMode::Shuffle
        );
    }

    #[test]
    fn persisted_state_tolerates_missing_fields() {
        let state: PersistedState = serde_json::from_str("{\"shuffle\": true}").expect("parse");
        assert!(state.shuffle);
        assert_eq!(state.repeat, RepeatMode::Off);
        assert_eq!(state.karaoke_cooldown_seconds, 5);
        assert_eq!(state.separation_timeout_minutes, 30);
    }

    #[derive(Debug, Deserialize)]
    struct Timed {
        #[serde(with = "duration_secs")]
        length: Duration,
    }

    #[test]
    fn duration_seconds_reject_values_out_of_range() {
        let parse = |raw: &str| serde_json::from_str::<Timed>(raw).map(|timed| timed.length);
        assert_eq!(parse(r#"{"length": 1.5}"#).expect("parse"), Duration::from_millis(1500));
        assert!(parse(r#"{"length": -1}"#).is_err());
        assert!(parse(r#"{"length": 1e300}"#).is_err());
    }
}
