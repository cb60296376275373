//! Background stem jobs behind the karaoke toggle.
//!
//! At most one separation job runs at a time. Jobs run on their own thread and
//! report through two channels: fine-grained [`SeparationProgress`] and one
//! terminal [`KaraokeEvent`] per job.

use crate::error::{KaraokeError, SeparationError};
use crate::model::{PersistedState, Song};
use crate::stems::{ProcessStemSeparator, SeparationProgress, StemPaths, StemSeparator};
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StemKind {
    Vocals,
    Instrumental,
}

impl StemKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Vocals => "vocals",
            Self::Instrumental => "instrumental",
        }
    }

    fn pick(self, stems: &StemPaths) -> &Path {
        match self {
            Self::Vocals => &stems.vocals,
            Self::Instrumental => &stems.accompaniment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KaraokeEvent {
    StemsReady {
        song_id: String,
        stems: StemPaths,
    },
    SeparationFailed {
        song_id: String,
        message: String,
    },
    Exported {
        song_id: String,
        kind: StemKind,
        target: PathBuf,
    },
    ExportFailed {
        song_id: String,
        kind: StemKind,
        message: String,
    },
    PreprocessFinished {
        separated: usize,
        skipped: usize,
        failed: usize,
    },
}

/// Outcome of asking for the stems of a song.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StemRequest {
    /// Stems were already cached.
    Ready(StemPaths),
    /// A background separation was started; a [`KaraokeEvent`] follows.
    Started,
}

struct BusyFlag(Arc<AtomicBool>);

impl Drop for BusyFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct KaraokeController {
    separator: Arc<dyn StemSeparator>,
    stems_dir: PathBuf,
    cooldown: Duration,
    last_toggle: Option<Instant>,
    busy: Arc<AtomicBool>,
    progress_tx: Sender<SeparationProgress>,
    progress_rx: Receiver<SeparationProgress>,
    event_tx: Sender<KaraokeEvent>,
    event_rx: Receiver<KaraokeEvent>,
}

impl KaraokeController {
    pub fn new(separator: Arc<dyn StemSeparator>, stems_dir: PathBuf, cooldown: Duration) -> Self {
        let (progress_tx, progress_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        Self {
            separator,
            stems_dir,
            cooldown,
            last_toggle: None,
            busy: Arc::new(AtomicBool::new(false)),
            progress_tx,
            progress_rx,
            event_tx,
            event_rx,
        }
    }

    pub fn from_state(state: &PersistedState, stems_dir: PathBuf) -> Result<Self> {
        let separator = ProcessStemSeparator::from_state(state)?;
        Ok(Self::new(
            Arc::new(separator),
            stems_dir,
            Duration::from_secs(u64::from(state.karaoke_cooldown_seconds)),
        ))
    }

    pub fn stems_dir(&self) -> &Path {
        &self.stems_dir
    }

    pub fn is_available(&self) -> bool {
        self.separator.is_available()
    }

    pub fn setup_info(&self) -> String {
        self.separator.setup_info()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn stem_paths(&self, song: &Song) -> StemPaths {
        StemPaths::for_input(&song.file_path, &self.stems_dir)
    }

    pub fn stems_exist(&self, song: &Song) -> bool {
        self.stem_paths(song).exist()
    }

    /// Admits a karaoke toggle or explains why it has to wait.
    ///
    /// Enabling is refused while a job runs; any toggle is refused inside the
    /// cooldown window after the previous one.
    pub fn begin_toggle(&mut self, enabling: bool) -> Result<(), KaraokeError> {
        if enabling && self.is_busy() {
            return Err(KaraokeError::AlreadyInProgress);
        }
        if let Some(last) = self.last_toggle {
            let elapsed = last.elapsed();
            if elapsed < self.cooldown {
                let remaining = (self.cooldown - elapsed).as_secs_f64().ceil() as u64;
                return Err(KaraokeError::CoolingDown {
                    remaining_secs: remaining.max(1),
                });
            }
        }
        self.last_toggle = Some(Instant::now());
        Ok(())
    }

    pub fn request_stems(&self, song: &Song) -> Result<StemRequest, KaraokeError> {
        let stems = self.stem_paths(song);
        if stems.exist() {
            return Ok(StemRequest::Ready(stems));
        }

        let song = song.clone();
        let stems_dir = self.stems_dir.clone();
        self.spawn_job(move |separator, progress| {
            match ensure_stems(separator, &song, &stems_dir, progress) {
                Ok(stems) => KaraokeEvent::StemsReady {
                    song_id: song.id,
                    stems,
                },
                Err(err) => KaraokeEvent::SeparationFailed {
                    song_id: song.id,
                    message: err.to_string(),
                },
            }
        })?;
        Ok(StemRequest::Started)
    }

    /// Copies one stem of `song` to `target`, separating first when needed.
    pub fn export(&self, song: &Song, kind: StemKind, target: PathBuf) -> Result<(), KaraokeError> {
        let song = song.clone();
        let stems_dir = self.stems_dir.clone();
        self.spawn_job(move |separator, progress| {
            let copied = ensure_stems(separator, &song, &stems_dir, progress)
                .map_err(|err| err.to_string())
                .and_then(|stems| {
                    fs::copy(kind.pick(&stems), &target)
                        .map_err(|err| format!("failed to copy to {}: {err}", target.display()))
                });
            match copied {
                Ok(_) => {
                    tracing::info!(song = %song.title, kind = kind.label(), target = %target.display(), "exported stem");
                    KaraokeEvent::Exported {
                        song_id: song.id,
                        kind,
                        target,
                    }
                }
                Err(message) => {
                    tracing::error!(song = %song.title, kind = kind.label(), "stem export failed: {message}");
                    KaraokeEvent::ExportFailed {
                        song_id: song.id,
                        kind,
                        message,
                    }
                }
            }
        })
    }

    /// Separates every song without cached stems, one after another.
    pub fn preprocess(&self, songs: Vec<Song>) -> Result<(), KaraokeError> {
        let stems_dir = self.stems_dir.clone();
        self.spawn_job(move |separator, progress| {
            let (mut separated, mut skipped, mut failed) = (0, 0, 0);
            for song in &songs {
                if StemPaths::for_input(&song.file_path, &stems_dir).exist() {
                    skipped += 1;
                    continue;
                }
                match ensure_stems(separator, song, &stems_dir, progress) {
                    Ok(_) => separated += 1,
                    Err(_) => failed += 1,
                }
            }
            tracing::info!(separated, skipped, failed, "karaoke preprocessing finished");
            KaraokeEvent::PreprocessFinished {
                separated,
                skipped,
                failed,
            }
        })
    }

    pub fn try_recv_progress(&self) -> Option<SeparationProgress> {
        self.progress_rx.try_recv().ok()
    }

    pub fn try_recv_event(&self) -> Option<KaraokeEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<KaraokeEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    fn spawn_job<F>(&self, job: F) -> Result<(), KaraokeError>
    where
        F: FnOnce(&dyn StemSeparator, &Sender<SeparationProgress>) -> KaraokeEvent
            + Send
            + 'static,
    {
        if self.busy.swap(true, Ordering::AcqRel) {
            return Err(KaraokeError::AlreadyInProgress);
        }

        let separator = Arc::clone(&self.separator);
        let progress = self.progress_tx.clone();
        let events = self.event_tx.clone();
        let busy = BusyFlag(Arc::clone(&self.busy));
        thread::spawn(move || {
            let event = job(separator.as_ref(), &progress);
            drop(busy);
            let _ = events.send(event);
        });
        Ok(())
    }
}

fn ensure_stems(
    separator: &dyn StemSeparator,
    song: &Song,
    stems_dir: &Path,
    progress: &Sender<SeparationProgress>,
) -> Result<StemPaths, SeparationError> {
    let stems = StemPaths::for_input(&song.file_path, stems_dir);
    if stems.exist() {
        return Ok(stems);
    }
    separator
        .separate(&song.file_path, stems_dir, progress)
        .inspect_err(|err| {
            tracing::error!(song = %song.title, "stem separation failed: {err}");
            let _ = progress.send(SeparationProgress::failed(err.to_string()));
        })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tempfile::tempdir;

    /// Separator that writes tiny stem files instead of running a process.
    pub(crate) struct FakeSeparator {
        pub fail: bool,
        pub delay: Duration,
        pub calls: AtomicUsize,
    }

    impl FakeSeparator {
        pub(crate) fn new() -> Self {
            Self {
                fail: false,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl StemSeparator for FakeSeparator {
        fn separate(
            &self,
            input: &Path,
            output_dir: &Path,
            progress: &Sender<SeparationProgress>,
        ) -> Result<StemPaths, SeparationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            let _ = progress.send(SeparationProgress::step("Separating audio tracks...", Some(50)));
            if self.fail {
                return Err(SeparationError::ProcessFailed {
                    code: Some(1),
                    stderr: String::from("model missing"),
                });
            }
            let stems = StemPaths::for_input(input, output_dir);
            if let Some(dir) = stems.vocals.parent() {
                fs::create_dir_all(dir)?;
            }
            fs::write(&stems.vocals, b"vocals")?;
            fs::write(&stems.accompaniment, b"accompaniment")?;
            Ok(stems)
        }

        fn is_available(&self) -> bool {
            true
        }

        fn setup_info(&self) -> String {
            String::from("fake separator")
        }
    }

    fn controller(separator: FakeSeparator, dir: &Path, cooldown: Duration) -> KaraokeController {
        KaraokeController::new(Arc::new(separator), dir.join("stems"), cooldown)
    }

    fn song(dir: &Path, name: &str) -> Song {
        let path = dir.join(format!("{name}.mp3"));
        fs::write(&path, b"audio").expect("song file");
        Song::new(path).with_id(name)
    }

    #[test]
    fn missing_stems_are_separated_in_background() {
        let dir = tempdir().expect("tempdir");
        let karaoke = controller(FakeSeparator::new(), dir.path(), Duration::ZERO);
        let track = song(dir.path(), "track");

        assert_eq!(karaoke.request_stems(&track), Ok(StemRequest::Started));
        let event = karaoke
            .recv_event_timeout(Duration::from_secs(5))
            .expect("job event");
        assert_eq!(
            event,
            KaraokeEvent::StemsReady {
                song_id: String::from("track"),
                stems: karaoke.stem_paths(&track),
            }
        );
        assert!(!karaoke.is_busy());
        assert!(karaoke.try_recv_progress().is_some());
        assert_eq!(
            karaoke.request_stems(&track),
            Ok(StemRequest::Ready(karaoke.stem_paths(&track)))
        );
    }

    #[test]
    fn second_job_is_rejected_while_one_runs() {
        let dir = tempdir().expect("tempdir");
        let separator = FakeSeparator {
            delay: Duration::from_millis(300),
            ..FakeSeparator::new()
        };
        let mut karaoke = controller(separator, dir.path(), Duration::ZERO);

        assert_eq!(
            karaoke.request_stems(&song(dir.path(), "a")),
            Ok(StemRequest::Started)
        );
        assert_eq!(
            karaoke.request_stems(&song(dir.path(), "b")),
            Err(KaraokeError::AlreadyInProgress)
        );
        assert_eq!(
            karaoke.begin_toggle(true),
            Err(KaraokeError::AlreadyInProgress)
        );
        assert_eq!(karaoke.begin_toggle(false), Ok(()));
        assert!(karaoke.recv_event_timeout(Duration::from_secs(5)).is_some());
    }

    #[test]
    fn toggles_inside_cooldown_report_remaining_seconds() {
        let dir = tempdir().expect("tempdir");
        let mut karaoke = controller(FakeSeparator::new(), dir.path(), Duration::from_secs(60));

        assert_eq!(karaoke.begin_toggle(true), Ok(()));
        match karaoke.begin_toggle(false) {
            Err(KaraokeError::CoolingDown { remaining_secs }) => {
                assert!((59..=60).contains(&remaining_secs));
            }
            other => panic!("expected cooldown, got {other:?}"),
        }
    }

    #[test]
    fn failed_separation_reports_error_progress() {
        let dir = tempdir().expect("tempdir");
        let separator = FakeSeparator {
            fail: true,
            ..FakeSeparator::new()
        };
        let karaoke = controller(separator, dir.path(), Duration::ZERO);

        karaoke
            .request_stems(&song(dir.path(), "bad"))
            .expect("started");
        let event = karaoke
            .recv_event_timeout(Duration::from_secs(5))
            .expect("job event");
        assert!(matches!(event, KaraokeEvent::SeparationFailed { ref song_id, .. } if song_id == "bad"));

        let progress: Vec<SeparationProgress> =
            std::iter::from_fn(|| karaoke.try_recv_progress()).collect();
        assert!(progress.iter().any(|update| update.is_error && update.is_completed));
    }

    #[test]
    fn export_copies_requested_stem() {
        let dir = tempdir().expect("tempdir");
        let karaoke = controller(FakeSeparator::new(), dir.path(), Duration::ZERO);
        let track = song(dir.path(), "track");
        let target = dir.path().join("instrumental.wav");

        karaoke
            .export(&track, StemKind::Instrumental, target.clone())
            .expect("export started");
        let event = karaoke
            .recv_event_timeout(Duration::from_secs(5))
            .expect("export event");
        assert!(matches!(event, KaraokeEvent::Exported { kind: StemKind::Instrumental, .. }));
        assert_eq!(fs::read(&target).expect("exported"), b"accompaniment");
    }

    #[test]
    fn preprocess_skips_cached_songs() {
        let dir = tempdir().expect("tempdir");
        let karaoke = controller(FakeSeparator::new(), dir.path(), Duration::ZERO);
        let cached = song(dir.path(), "cached");
        let fresh = song(dir.path(), "fresh");

        karaoke.request_stems(&cached).expect("started");
        karaoke
            .recv_event_timeout(Duration::from_secs(5))
            .expect("cached ready");

        karaoke
            .preprocess(vec![cached, fresh.clone()])
            .expect("preprocess started");
        let event = karaoke
            .recv_event_timeout(Duration::from_secs(5))
            .expect("preprocess event");
        assert_eq!(
            event,
            KaraokeEvent::PreprocessFinished {
                separated: 1,
                skipped: 1,
                failed: 0,
            }
        );
        assert!(karaoke.stems_exist(&fresh));
    }
}
