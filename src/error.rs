//! Error types surfaced to callers of the playback engine and the stem separator.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures of explicit playback requests.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The audio file could not be opened or decoded.
    #[error("could not load {}: {reason:#}", .path.display())]
    Load { path: PathBuf, reason: anyhow::Error },

    #[error("queue is empty")]
    EmptyQueue,

    #[error("no song is selected")]
    NoCurrentSong,

    #[error("seek failed: {0:#}")]
    Seek(anyhow::Error),
}

/// Failures of the out-of-process stem separation.
#[derive(Debug, Error)]
pub enum SeparationError {
    #[error("input file not found: {}", .0.display())]
    InputMissing(PathBuf),

    #[error("failed to start separator {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("separation timed out after {} seconds", .timeout.as_secs())]
    TimedOut { timeout: Duration },

    #[error("separator exited with code {code:?}: {stderr}")]
    ProcessFailed { code: Option<i32>, stderr: String },

    #[error("separation finished but expected outputs are missing: {}", format_paths(.expected))]
    OutputsMissing { expected: Vec<PathBuf> },

    #[error("separation produced an empty file {} ({size} bytes)", .path.display())]
    EmptyOutput { path: PathBuf, size: u64 },

    #[error("separator I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejections of a karaoke toggle request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KaraokeError {
    #[error("a separation is already in progress")]
    AlreadyInProgress,

    #[error("please wait {remaining_secs} seconds before toggling karaoke again")]
    CoolingDown { remaining_secs: u64 },

    #[error("no song is playing")]
    NoCurrentSong,

    #[error("audio separator is not available")]
    Unavailable,

    #[error("could not switch audio source: {0}")]
    SwitchFailed(String),
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
