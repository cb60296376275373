use crate::model::PersistedState;
use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "cadenza";
const STATE_FILE: &str = "state.json";
const STATS_FILE: &str = "listening_stats.json";
const PLAYLISTS_FILE: &str = "playlists.json";
const STEMS_DIR: &str = "SeparatedStems";

pub fn config_root() -> Result<PathBuf> {
    if let Ok(override_dir) = env::var("CADENZA_CONFIG_DIR") {
        return Ok(PathBuf::from(override_dir));
    }

    let home = env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .context("neither HOME nor USERPROFILE is set")?;
    Ok(PathBuf::from(home).join(".config").join(APP_DIR))
}

pub fn state_path() -> Result<PathBuf> {
    Ok(config_root()?.join(STATE_FILE))
}

pub fn stats_path() -> Result<PathBuf> {
    Ok(config_root()?.join(STATS_FILE))
}

pub fn playlists_path() -> Result<PathBuf> {
    Ok(config_root()?.join(PLAYLISTS_FILE))
}

pub fn stems_dir() -> Result<PathBuf> {
    Ok(config_root()?.join(STEMS_DIR))
}

pub fn ensure_config_dir() -> Result<PathBuf> {
    let root = config_root()?;
    fs::create_dir_all(&root).with_context(|| format!("failed to create {}", root.display()))?;
    Ok(root)
}

pub fn load_state() -> Result<PersistedState> {
    let path = state_path()?;
    load_state_from_path(&path)
}

pub fn save_state(state: &PersistedState) -> Result<()> {
    ensure_config_dir()?;
    let path = state_path()?;
    save_state_to_path(&path, state)
}

fn load_state_from_path(path: &Path) -> Result<PersistedState> {
    if !path.exists() {
        return Ok(PersistedState::default());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read state file {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(PersistedState::default());
    }
    let mut state: PersistedState = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse state file {}", path.display()))?;
    state.volume = state.volume.clamp(0.0, 1.0);
    Ok(state)
}

fn save_state_to_path(path: &Path, state: &PersistedState) -> Result<()> {
    let json = serde_json::to_string_pretty(state)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Writes `json` to `path`, keeping the previous contents as `<name>.bak`.
pub(crate) fn write_with_backup(path: &Path, json: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    if path.exists() {
        let backup = path.with_extension("json.bak");
        let _ = fs::copy(path, &backup);
    }
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RepeatMode;
    use tempfile::tempdir;

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(STATE_FILE);

        let state = PersistedState {
            shuffle: true,
            repeat: RepeatMode::RepeatOne,
            volume: 0.4,
            ..PersistedState::default()
        };
        save_state_to_path(&path, &state).expect("save");
        let loaded = load_state_from_path(&path).expect("load");
        assert!(loaded.shuffle);
        assert_eq!(loaded.repeat, RepeatMode::RepeatOne);
        assert!((loaded.volume - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn missing_or_empty_state_file_yields_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(STATE_FILE);
        assert!(!load_state_from_path(&path).expect("missing").shuffle);

        fs::write(&path, "  ").expect("write");
        assert_eq!(
            load_state_from_path(&path).expect("empty").repeat,
            RepeatMode::Off
        );
    }

    #[test]
    fn loaded_volume_is_clamped() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(STATE_FILE);
        fs::write(&path, "{\"volume\": 3.5}").expect("write");
        let loaded = load_state_from_path(&path).expect("load");
        assert!((loaded.volume - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn backup_is_written_before_overwrite() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join(STATS_FILE);
        write_with_backup(&path, "[1]").expect("first");
        write_with_backup(&path, "[2]").expect("second");

        let backup = path.with_extension("json.bak");
        assert_eq!(fs::read_to_string(backup).expect("backup"), "[1]");
        assert_eq!(fs::read_to_string(path).expect("current"), "[2]");
    }
}
