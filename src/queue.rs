//! The playback engine.
//!
//! [`PlaybackQueue`] owns the queue, the current song, the shuffle and repeat
//! toggles and the single live audio output. Every transition goes through it,
//! and it keeps the listening statistics in step with the current song.
//! Observers receive [`PlayerEvent`]s over channels.

use crate::audio::{AudioOutput, OutputEvent, OutputId};
use crate::error::{KaraokeError, PlaybackError};
use crate::karaoke::{KaraokeController, KaraokeEvent, StemKind, StemRequest};
use crate::model::{PersistedState, PlayMode, PlaybackState, RepeatMode, Song};
use crate::shuffle::ShuffleOrder;
use crate::stats::{ListeningStatsTracker, PeriodStatistics};
use crate::stems::SeparationProgress;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::iter;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    QueueChanged,
    CurrentSongChanged { song_id: Option<String> },
    PlaybackStateChanged(PlaybackState),
    PositionChanged { position: Duration, duration: Duration },
    ModeChanged { shuffle: bool, repeat: RepeatMode },
    /// Background playback or a background karaoke switch failed. Explicit
    /// requests report through their return value instead.
    PlaybackFailed { song_id: Option<String>, message: String },
    KaraokeModeChanged(bool),
    SeparationProgress(SeparationProgress),
    Karaoke(KaraokeEvent),
}

enum Advance {
    Play { index: usize, from_shuffle: bool },
    Stop,
    Stay,
}

pub struct PlaybackQueue {
    output: Box<dyn AudioOutput>,
    stats: ListeningStatsTracker,
    karaoke: Option<KaraokeController>,
    rng: SmallRng,
    queue: Vec<Song>,
    current_index: Option<usize>,
    current_song: Option<Song>,
    shuffle_on: bool,
    repeat: RepeatMode,
    shuffle: ShuffleOrder,
    state: PlaybackState,
    /// Output whose stop event still counts. Events from any other id are stale.
    live_output: Option<OutputId>,
    /// Set while a track switch is in flight.
    switching: bool,
    karaoke_mode: bool,
    karaoke_source: Option<PathBuf>,
    pending_stems: Option<String>,
    subscribers: Vec<Sender<PlayerEvent>>,
}

impl PlaybackQueue {
    pub fn new(output: Box<dyn AudioOutput>, stats: ListeningStatsTracker) -> Self {
        Self::with_rng(output, stats, SmallRng::from_os_rng())
    }

    /// Engine with a reproducible shuffle sequence.
    pub fn with_rng_seed(output: Box<dyn AudioOutput>, stats: ListeningStatsTracker, seed: u64) -> Self {
        Self::with_rng(output, stats, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(output: Box<dyn AudioOutput>, stats: ListeningStatsTracker, rng: SmallRng) -> Self {
        Self {
            output,
            stats,
            karaoke: None,
            rng,
            queue: Vec::new(),
            current_index: None,
            current_song: None,
            shuffle_on: false,
            repeat: RepeatMode::Off,
            shuffle: ShuffleOrder::default(),
            state: PlaybackState::Stopped,
            live_output: None,
            switching: false,
            karaoke_mode: false,
            karaoke_source: None,
            pending_stems: None,
            subscribers: Vec::new(),
        }
    }

    pub fn with_karaoke(mut self, karaoke: KaraokeController) -> Self {
        self.karaoke = Some(karaoke);
        self
    }

    pub fn apply_settings(&mut self, settings: &PersistedState) {
        self.repeat = settings.repeat;
        self.set_shuffle(settings.shuffle);
        self.output.set_volume(settings.volume);
    }

    pub fn store_settings(&self, settings: &mut PersistedState) {
        settings.shuffle = self.shuffle_on;
        settings.repeat = self.repeat;
        settings.volume = self.output.volume();
    }

    pub fn subscribe(&mut self) -> Receiver<PlayerEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    fn emit(&mut self, event: PlayerEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn queue(&self) -> &[Song] {
        &self.queue
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn current_song(&self) -> Option<&Song> {
        self.current_song.as_ref()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn shuffle_order(&self) -> &ShuffleOrder {
        &self.shuffle
    }

    pub fn is_shuffle_on(&self) -> bool {
        self.shuffle_on
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat
    }

    pub fn karaoke_mode(&self) -> bool {
        self.karaoke_mode
    }

    pub fn stats(&self) -> &ListeningStatsTracker {
        &self.stats
    }

    pub fn output_name(&self) -> String {
        self.output.output_name()
    }

    /// Replaces the queue without starting playback.
    pub fn set_queue(&mut self, songs: Vec<Song>, start_index: usize) {
        self.queue = songs;
        self.current_index = self
            .queue
            .len()
            .checked_sub(1)
            .map(|last| start_index.min(last));
        if self.shuffle_on {
            self.shuffle
                .generate(self.queue.len(), self.current_index, &mut self.rng);
        } else {
            self.shuffle.clear();
        }
        tracing::debug!(len = self.queue.len(), start = ?self.current_index, "queue replaced");
        self.emit(PlayerEvent::QueueChanged);
    }

    /// Plays `song` where it sits in the queue, appending it first if needed.
    pub fn play_song(&mut self, song: Song) -> Result<(), PlaybackError> {
        if let Some(index) = self.position_of(&song) {
            return self.play_index(index, false);
        }

        self.queue.push(song);
        let index = self.queue.len() - 1;
        if self.shuffle_on {
            self.shuffle.insert_next(index);
        }
        self.emit(PlayerEvent::QueueChanged);
        self.play_index(index, false)
    }

    /// Makes `collection` the queue and plays `song` from it. Does nothing
    /// when the song is not part of the collection.
    pub fn play_song_from_collection(
        &mut self,
        song: &Song,
        collection: Vec<Song>,
    ) -> Result<(), PlaybackError> {
        let Some(index) = collection.iter().position(|candidate| candidate == song) else {
            return Ok(());
        };
        self.set_queue(collection, index);
        self.play_index(index, false)
    }

    /// Out-of-range indices are ignored.
    pub fn play_song_at_index(&mut self, index: usize) -> Result<(), PlaybackError> {
        self.play_index(index, false)
    }

    fn play_index(&mut self, index: usize, from_shuffle: bool) -> Result<(), PlaybackError> {
        if index >= self.queue.len() {
            tracing::debug!(index, len = self.queue.len(), "ignoring out-of-range track switch");
            return Ok(());
        }
        // Only reachable from code running inside a switch; `&mut self`
        // already serializes callers.
        if self.switching {
            tracing::debug!(index, "track switch already in progress, dropping request");
            return Ok(());
        }

        self.switching = true;
        let result = self.switch_to(index, from_shuffle);
        self.switching = false;
        result
    }

    fn switch_to(&mut self, index: usize, from_shuffle: bool) -> Result<(), PlaybackError> {
        let song = self.queue[index].clone();
        self.current_index = Some(index);
        self.set_current_song(Some(song.clone()));

        if self.shuffle_on && !from_shuffle {
            self.shuffle.align(index, self.queue.len(), &mut self.rng);
        }
        self.karaoke_source = None;
        if self.karaoke_mode {
            self.revert_karaoke();
        }

        tracing::debug!(index, song = %song.title, "switching track");
        match self.load_source(&song.file_path, Duration::ZERO, true) {
            Ok(()) => Ok(()),
            Err(reason) => {
                tracing::error!(path = %song.file_path.display(), "failed to load song: {reason:#}");
                self.stop();
                Err(PlaybackError::Load {
                    path: song.file_path,
                    reason,
                })
            }
        }
    }

    /// Stats are flushed for the outgoing song before the assignment and a new
    /// session starts after it.
    fn set_current_song(&mut self, song: Option<Song>) {
        if self.current_song.is_some() {
            self.stats.on_song_stopped();
        }
        let song_id = song.as_ref().map(|song| song.id.clone());
        self.current_song = song;
        if let Some(song) = &self.current_song {
            self.stats.on_song_started(song);
        }
        self.emit(PlayerEvent::CurrentSongChanged { song_id });
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.state != state {
            self.state = state;
            self.emit(PlayerEvent::PlaybackStateChanged(state));
        }
    }

    fn load_source(&mut self, path: &Path, position: Duration, resume: bool) -> anyhow::Result<()> {
        self.live_output = None;
        let id = self.output.load(path)?;
        self.live_output = Some(id);
        if !position.is_zero()
            && let Err(err) = self.output.seek(position)
        {
            tracing::warn!(path = %path.display(), "could not restore position: {err:#}");
        }
        if resume {
            self.output.play();
            self.set_state(PlaybackState::Playing);
        } else {
            self.set_state(PlaybackState::Paused);
        }
        self.emit(PlayerEvent::PositionChanged {
            position: self.position(),
            duration: self.duration(),
        });
        Ok(())
    }

    /// Resumes the loaded song, or starts the selected one (the first when
    /// nothing was selected yet).
    pub fn play(&mut self) -> Result<(), PlaybackError> {
        if self.live_output.is_some() {
            if self.state != PlaybackState::Playing {
                self.output.play();
                self.set_state(PlaybackState::Playing);
            }
            return Ok(());
        }
        if self.queue.is_empty() {
            return Err(PlaybackError::EmptyQueue);
        }
        self.play_index(self.current_index.unwrap_or(0), false)
    }

    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.output.pause();
            self.set_state(PlaybackState::Paused);
        }
    }

    pub fn toggle_pause(&mut self) -> Result<(), PlaybackError> {
        match self.state {
            PlaybackState::Playing => {
                self.pause();
                Ok(())
            }
            PlaybackState::Paused | PlaybackState::Stopped => self.play(),
        }
    }

    /// Releases the output and closes the listening session. The selection
    /// is kept, so a later [`play`](Self::play) restarts the same song.
    pub fn stop(&mut self) {
        if self.live_output.take().is_some() {
            self.output.stop();
        }
        self.stats.on_song_stopped();
        self.karaoke_source = None;
        self.set_state(PlaybackState::Stopped);
    }

    pub fn play_next(&mut self) -> Result<(), PlaybackError> {
        let advance = self.advance(true);
        self.apply_advance(advance)
    }

    pub fn play_previous(&mut self) -> Result<(), PlaybackError> {
        let advance = self.advance(false);
        self.apply_advance(advance)
    }

    fn apply_advance(&mut self, advance: Advance) -> Result<(), PlaybackError> {
        match advance {
            Advance::Play {
                index,
                from_shuffle,
            } => self.play_index(index, from_shuffle),
            Advance::Stop => {
                tracing::debug!("reached the end of the queue");
                self.stop();
                Ok(())
            }
            Advance::Stay => Ok(()),
        }
    }

    fn advance(&mut self, forward: bool) -> Advance {
        let len = self.queue.len();
        if len == 0 {
            return Advance::Stay;
        }

        if self.shuffle_on {
            if self.shuffle.len() != len {
                self.shuffle.generate(len, self.current_index, &mut self.rng);
            }
            if self.repeat == RepeatMode::RepeatOne {
                return match self.shuffle.current().or(self.current_index) {
                    Some(index) => Advance::Play {
                        index,
                        from_shuffle: true,
                    },
                    None => Advance::Stay,
                };
            }

            let wrap = self.repeat == RepeatMode::RepeatAll;
            let step = if forward {
                self.shuffle.step_forward(wrap, len, &mut self.rng)
            } else {
                self.shuffle.step_back(wrap, len, &mut self.rng)
            };
            return match step {
                Some(index) => Advance::Play {
                    index,
                    from_shuffle: true,
                },
                None => Advance::Stop,
            };
        }

        if self.repeat == RepeatMode::RepeatOne {
            return match self.current_index {
                Some(index) => Advance::Play {
                    index,
                    from_shuffle: false,
                },
                None => Advance::Stay,
            };
        }

        let target = match (self.current_index, forward) {
            (None, true) => Some(0),
            (None, false) => None,
            (Some(index), true) => Some(index + 1).filter(|next| *next < len),
            (Some(index), false) => index.checked_sub(1),
        };
        match target {
            Some(index) => Advance::Play {
                index,
                from_shuffle: false,
            },
            None if self.repeat == RepeatMode::RepeatAll => Advance::Play {
                index: if forward { 0 } else { len - 1 },
                from_shuffle: false,
            },
            None => Advance::Stop,
        }
    }

    pub fn add_to_queue(&mut self, song: Song) {
        self.queue.push(song);
        if self.shuffle_on {
            let index = self.queue.len() - 1;
            if self.shuffle.len() == index {
                self.shuffle.insert_new(index, &mut self.rng);
            } else {
                self.shuffle
                    .generate(self.queue.len(), self.current_index, &mut self.rng);
            }
        }
        self.emit(PlayerEvent::QueueChanged);
    }

    /// Removes `song` from the queue.
    ///
    /// Removing the current song moves playback to the song that took its
    /// place, or stops and clears the selection when the queue runs empty.
    pub fn remove_from_queue(&mut self, song: &Song) -> Result<(), PlaybackError> {
        let Some(removed) = self.position_of(song) else {
            return Ok(());
        };
        self.queue.remove(removed);
        if self.shuffle_on {
            self.shuffle.remove(removed);
        }

        let mut result = Ok(());
        match self.current_index {
            Some(current) if removed < current => self.current_index = Some(current - 1),
            Some(current) if removed == current => {
                if self.queue.is_empty() {
                    self.stop();
                    self.current_index = None;
                    self.set_current_song(None);
                } else {
                    let next = current.min(self.queue.len() - 1);
                    self.current_index = Some(next);
                    result = self.play_index(next, false);
                }
            }
            _ => {}
        }
        self.emit(PlayerEvent::QueueChanged);
        result
    }

    pub fn clear_queue(&mut self) {
        self.stop();
        self.queue.clear();
        self.shuffle.clear();
        self.current_index = None;
        self.set_current_song(None);
        self.emit(PlayerEvent::QueueChanged);
    }

    fn position_of(&self, song: &Song) -> Option<usize> {
        self.queue.iter().position(|candidate| candidate == song)
    }

    /// Turning shuffle on starts a fresh pass at the current song. The repeat
    /// mode is left alone.
    pub fn set_shuffle(&mut self, enabled: bool) {
        if self.shuffle_on == enabled {
            return;
        }
        self.shuffle_on = enabled;
        if enabled {
            self.shuffle
                .generate(self.queue.len(), self.current_index, &mut self.rng);
        } else {
            self.shuffle.clear();
        }
        self.emit_mode();
    }

    pub fn toggle_shuffle(&mut self) {
        self.set_shuffle(!self.shuffle_on);
    }

    pub fn set_repeat(&mut self, repeat: RepeatMode) {
        if self.repeat != repeat {
            self.repeat = repeat;
            self.emit_mode();
        }
    }

    pub fn cycle_repeat(&mut self) {
        self.set_repeat(self.repeat.next());
    }

    pub fn play_mode(&self) -> PlayMode {
        PlayMode::from_toggles(self.shuffle_on, self.repeat)
    }

    pub fn set_play_mode(&mut self, mode: PlayMode) {
        let (shuffle, repeat) = mode.toggles();
        self.set_repeat(repeat);
        self.set_shuffle(shuffle);
    }

    fn emit_mode(&mut self) {
        self.emit(PlayerEvent::ModeChanged {
            shuffle: self.shuffle_on,
            repeat: self.repeat,
        });
    }

    pub fn seek(&mut self, position: Duration) -> Result<(), PlaybackError> {
        if self.live_output.is_none() {
            return Err(PlaybackError::NoCurrentSong);
        }
        self.output.seek(position).map_err(PlaybackError::Seek)?;
        self.emit(PlayerEvent::PositionChanged {
            position: self.position(),
            duration: self.duration(),
        });
        Ok(())
    }

    pub fn position(&self) -> Duration {
        if self.live_output.is_some() {
            self.output.position()
        } else {
            Duration::ZERO
        }
    }

    /// Length of the loaded source, falling back to the tagged duration.
    pub fn duration(&self) -> Duration {
        let decoded = if self.live_output.is_some() {
            self.output.duration()
        } else {
            Duration::ZERO
        };
        match &self.current_song {
            Some(song) if decoded.is_zero() => song.duration,
            _ => decoded,
        }
    }

    pub fn volume(&self) -> f32 {
        self.output.volume()
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.output.set_volume(volume);
    }

    /// Periodic driver: feeds the listening statistics, reacts to finished
    /// outputs and applies background karaoke results. Call it every
    /// [`TICK_INTERVAL`](crate::stats::TICK_INTERVAL).
    pub fn tick(&mut self) {
        if self.state == PlaybackState::Playing && self.live_output.is_some() {
            let position = self.output.position();
            let duration = self.duration();
            if let Some(song) = &self.current_song {
                self.stats.on_position_update(song, position, duration);
            }
            self.emit(PlayerEvent::PositionChanged { position, duration });
        }

        while let Some(event) = self.output.poll_event() {
            self.handle_output_event(event);
        }
        self.drain_karaoke();
    }

    fn handle_output_event(&mut self, event: OutputEvent) {
        if self.live_output != Some(event.output) {
            tracing::debug!(output = event.output.raw(), "ignoring stop event from a replaced output");
            return;
        }
        self.live_output = None;
        let song_id = self.current_song.as_ref().map(|song| song.id.clone());

        match event.error {
            None => {
                if let Err(err) = self.play_next() {
                    tracing::warn!("auto-advance stopped: {err}");
                    self.emit(PlayerEvent::PlaybackFailed {
                        song_id: self.current_song.as_ref().map(|song| song.id.clone()),
                        message: err.to_string(),
                    });
                }
                if self.live_output.is_none() {
                    self.stop();
                }
            }
            Some(message) => {
                tracing::error!(song = ?song_id, "playback failed: {message}");
                self.stop();
                self.emit(PlayerEvent::PlaybackFailed { song_id, message });
            }
        }
    }

    pub fn set_karaoke_mode(&mut self, enabled: bool) -> Result<(), KaraokeError> {
        if self.karaoke_mode == enabled {
            return Ok(());
        }
        let Some(karaoke) = self.karaoke.as_mut() else {
            return Err(KaraokeError::Unavailable);
        };
        if enabled && (self.current_song.is_none() || self.live_output.is_none()) {
            return Err(KaraokeError::NoCurrentSong);
        }
        karaoke.begin_toggle(enabled)?;

        self.karaoke_mode = enabled;
        self.emit(PlayerEvent::KaraokeModeChanged(enabled));
        if enabled {
            self.enable_karaoke()
        } else {
            self.disable_karaoke();
            Ok(())
        }
    }

    pub fn toggle_karaoke(&mut self) -> Result<(), KaraokeError> {
        self.set_karaoke_mode(!self.karaoke_mode)
    }

    fn enable_karaoke(&mut self) -> Result<(), KaraokeError> {
        let Some(song) = self.current_song.clone() else {
            self.revert_karaoke();
            return Err(KaraokeError::NoCurrentSong);
        };
        let request = match &self.karaoke {
            Some(karaoke) => karaoke.request_stems(&song),
            None => Err(KaraokeError::Unavailable),
        };

        match request {
            Ok(StemRequest::Ready(stems)) => self.load_karaoke_source(stems.accompaniment),
            Ok(StemRequest::Started) => {
                tracing::info!(song = %song.title, "separating stems for karaoke");
                self.pending_stems = Some(song.id);
                Ok(())
            }
            Err(err) => {
                self.revert_karaoke();
                Err(err)
            }
        }
    }

    fn disable_karaoke(&mut self) {
        self.pending_stems = None;
        if self.karaoke_source.take().is_some() && self.live_output.is_some() {
            let position = self.output.position();
            let resume = self.state == PlaybackState::Playing;
            self.restore_original(position, resume);
        }
    }

    fn load_karaoke_source(&mut self, accompaniment: PathBuf) -> Result<(), KaraokeError> {
        let position = self.output.position();
        let resume = self.state == PlaybackState::Playing;
        match self.load_source(&accompaniment, position, resume) {
            Ok(()) => {
                tracing::info!(path = %accompaniment.display(), "switched to instrumental");
                self.karaoke_source = Some(accompaniment);
                Ok(())
            }
            Err(err) => {
                tracing::error!(path = %accompaniment.display(), "could not load instrumental: {err:#}");
                self.revert_karaoke();
                self.restore_original(position, resume);
                Err(KaraokeError::SwitchFailed(format!("{err:#}")))
            }
        }
    }

    fn restore_original(&mut self, position: Duration, resume: bool) {
        let Some(path) = self.current_song.as_ref().map(|song| song.file_path.clone()) else {
            return;
        };
        if let Err(err) = self.load_source(&path, position, resume) {
            tracing::error!(path = %path.display(), "could not reload original audio: {err:#}");
            self.stop();
        }
    }

    fn revert_karaoke(&mut self) {
        self.pending_stems = None;
        if self.karaoke_mode {
            self.karaoke_mode = false;
            self.emit(PlayerEvent::KaraokeModeChanged(false));
        }
    }

    fn drain_karaoke(&mut self) {
        let Some(karaoke) = self.karaoke.as_ref() else {
            return;
        };
        let progress: Vec<_> = iter::from_fn(|| karaoke.try_recv_progress()).collect();
        let events: Vec<_> = iter::from_fn(|| karaoke.try_recv_event()).collect();

        for update in progress {
            self.emit(PlayerEvent::SeparationProgress(update));
        }
        for event in events {
            self.handle_karaoke_event(&event);
            self.emit(PlayerEvent::Karaoke(event));
        }
    }

    fn handle_karaoke_event(&mut self, event: &KaraokeEvent) {
        match event {
            KaraokeEvent::StemsReady { song_id, stems }
                if self.pending_stems.as_deref() == Some(song_id.as_str()) =>
            {
                self.pending_stems = None;
                let still_current = self
                    .current_song
                    .as_ref()
                    .is_some_and(|song| &song.id == song_id);
                if self.karaoke_mode && still_current && self.live_output.is_some() {
                    if let Err(err) = self.load_karaoke_source(stems.accompaniment.clone()) {
                        self.emit(PlayerEvent::PlaybackFailed {
                            song_id: Some(song_id.clone()),
                            message: err.to_string(),
                        });
                    }
                } else {
                    self.revert_karaoke();
                }
            }
            KaraokeEvent::SeparationFailed { song_id, message }
                if self.pending_stems.as_deref() == Some(song_id.as_str()) =>
            {
                tracing::warn!("karaoke disabled: {message}");
                self.revert_karaoke();
            }
            _ => {}
        }
    }

    pub fn export_stem(&self, song: &Song, kind: StemKind, target: PathBuf) -> Result<(), KaraokeError> {
        self.karaoke
            .as_ref()
            .ok_or(KaraokeError::Unavailable)?
            .export(song, kind, target)
    }

    pub fn preprocess_for_karaoke(&self, songs: Vec<Song>) -> Result<(), KaraokeError> {
        self.karaoke
            .as_ref()
            .ok_or(KaraokeError::Unavailable)?
            .preprocess(songs)
    }

    pub fn separator_available(&self) -> bool {
        self.karaoke
            .as_ref()
            .is_some_and(KaraokeController::is_available)
    }

    pub fn separator_setup_info(&self) -> Option<String> {
        self.karaoke.as_ref().map(KaraokeController::setup_info)
    }

    pub fn weekend_stats<'a>(&self, catalog: impl IntoIterator<Item = &'a Song>) -> PeriodStatistics {
        let mut stats = self.stats.weekend_stats();
        stats.attach_song_metadata(catalog);
        stats
    }

    pub fn monthly_stats<'a>(&self, catalog: impl IntoIterator<Item = &'a Song>) -> PeriodStatistics {
        let mut stats = self.stats.monthly_stats();
        stats.attach_song_metadata(catalog);
        stats
    }

    pub fn all_time_stats<'a>(&self, catalog: impl IntoIterator<Item = &'a Song>) -> PeriodStatistics {
        let mut stats = self.stats.all_time_stats();
        stats.attach_song_metadata(catalog);
        stats
    }

    /// Closes the listening session and releases the output.
    pub fn shutdown(&mut self) {
        if self.live_output.take().is_some() {
            self.output.stop();
        }
        self.stats.on_song_stopped();
        self.state = PlaybackState::Stopped;
    }
}

impl Drop for PlaybackQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}
