use anyhow::{Context, Result};
use rodio::Source;
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
use std::collections::VecDeque;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Identity of one loaded track on an [`AudioOutput`].
///
/// Every successful `load` hands out a fresh id, so a stop notification can be
/// matched against the output that is live right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputId(u64);

impl OutputId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Playback of a loaded track ended.
///
/// Fired once per load, either on natural end of stream, on an explicit stop
/// or when a new load replaces the track. `error` is set when decoding or the
/// device failed mid-playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEvent {
    pub output: OutputId,
    pub error: Option<String>,
}

pub trait AudioOutput {
    /// Tears down the current track and opens `path` paused at the start.
    fn load(&mut self, path: &Path) -> Result<OutputId>;
    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn position(&self) -> Duration;
    fn seek(&mut self, position: Duration) -> Result<()>;
    fn duration(&self) -> Duration;
    fn volume(&self) -> f32;
    /// Clamped to `[0, 1]`.
    fn set_volume(&mut self, volume: f32);
    fn poll_event(&mut self) -> Option<OutputEvent>;
    fn output_name(&self) -> String;
}

struct LoadedSource {
    id: OutputId,
    path: PathBuf,
    duration: Duration,
    end_reported: bool,
}

pub struct RodioAudioOutput {
    stream: OutputStream,
    sink: Sink,
    loaded: Option<LoadedSource>,
    next_id: u64,
    volume: f32,
    pending: VecDeque<OutputEvent>,
}

impl RodioAudioOutput {
    pub fn new() -> Result<Self> {
        let mut stream = OutputStreamBuilder::from_default_device()
            .context("failed to open default system output stream")?
            .with_error_callback(|err| tracing::warn!("audio stream error: {err}"))
            .open_stream_or_fallback()
            .context("failed to start default output stream")?;
        stream.log_on_drop(false);
        let sink = Sink::connect_new(stream.mixer());

        Ok(Self {
            stream,
            sink,
            loaded: None,
            next_id: 1,
            volume: 1.0,
            pending: VecDeque::new(),
        })
    }

    fn release_current(&mut self) {
        self.sink.stop();
        if let Some(track) = self.loaded.take()
            && !track.end_reported
        {
            self.pending.push_back(OutputEvent {
                output: track.id,
                error: None,
            });
        }
    }
}

impl AudioOutput for RodioAudioOutput {
    fn load(&mut self, path: &Path) -> Result<OutputId> {
        self.release_current();
        self.sink = Sink::connect_new(self.stream.mixer());
        self.sink.pause();

        let file =
            File::open(path).with_context(|| format!("failed to open track {}", path.display()))?;
        let source = Decoder::try_from(file)
            .with_context(|| format!("failed to decode {}", path.display()))?;
        let duration = source.total_duration().unwrap_or_default();
        self.sink.append(source);
        self.sink.set_volume(self.volume);

        let id = OutputId(self.next_id);
        self.next_id += 1;
        self.loaded = Some(LoadedSource {
            id,
            path: path.to_path_buf(),
            duration,
            end_reported: false,
        });
        tracing::debug!(output = id.raw(), path = %path.display(), "loaded track");
        Ok(id)
    }

    fn play(&mut self) {
        if self.loaded.is_some() {
            self.sink.play();
        }
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn stop(&mut self) {
        self.release_current();
    }

    fn position(&self) -> Duration {
        if self.loaded.is_none() {
            return Duration::ZERO;
        }
        self.sink.get_pos()
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        let Some(track) = &self.loaded else {
            anyhow::bail!("no active track");
        };
        self.sink.try_seek(position).map_err(|err| {
            anyhow::anyhow!("failed to seek {}: {err:?}", track.path.display())
        })
    }

    fn duration(&self) -> Duration {
        self.loaded
            .as_ref()
            .map_or(Duration::ZERO, |track| track.duration)
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        self.sink.set_volume(self.volume);
    }

    fn poll_event(&mut self) -> Option<OutputEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }

        let track = self.loaded.as_mut()?;
        if track.end_reported || self.sink.is_paused() || !self.sink.empty() {
            return None;
        }
        track.end_reported = true;
        Some(OutputEvent {
            output: track.id,
            error: None,
        })
    }

    fn output_name(&self) -> String {
        String::from("System default output")
    }
}

/// Output that keeps a logical clock instead of driving a device.
///
/// Used when no audio device can be opened.
pub struct NullAudioOutput {
    loaded: Option<LoadedSource>,
    next_id: u64,
    paused: bool,
    started_at: Option<Instant>,
    position_offset: Duration,
    volume: f32,
    pending: VecDeque<OutputEvent>,
}

impl NullAudioOutput {
    pub fn new() -> Self {
        Self {
            loaded: None,
            next_id: 1,
            paused: true,
            started_at: None,
            position_offset: Duration::ZERO,
            volume: 1.0,
            pending: VecDeque::new(),
        }
    }

    fn estimate_duration(path: &Path) -> Option<Duration> {
        let file = File::open(path).ok()?;
        let source = Decoder::try_from(file).ok()?;
        source
            .total_duration()
            .filter(|duration| !duration.is_zero())
    }

    fn current_position(&self) -> Duration {
        let mut position = self.position_offset;
        if !self.paused
            && self.loaded.is_some()
            && let Some(started_at) = self.started_at
        {
            position = position.saturating_add(started_at.elapsed());
        }
        match self.loaded.as_ref().map(|track| track.duration) {
            Some(duration) if !duration.is_zero() => position.min(duration),
            _ => position,
        }
    }

    fn release_current(&mut self) {
        if let Some(track) = self.loaded.take()
            && !track.end_reported
        {
            self.pending.push_back(OutputEvent {
                output: track.id,
                error: None,
            });
        }
        self.paused = true;
        self.started_at = None;
        self.position_offset = Duration::ZERO;
    }
}

impl Default for NullAudioOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for NullAudioOutput {
    fn load(&mut self, path: &Path) -> Result<OutputId> {
        self.release_current();
        if !path.is_file() {
            anyhow::bail!("track file not found: {}", path.display());
        }

        let id = OutputId(self.next_id);
        self.next_id += 1;
        self.loaded = Some(LoadedSource {
            id,
            path: path.to_path_buf(),
            duration: Self::estimate_duration(path).unwrap_or_default(),
            end_reported: false,
        });
        Ok(id)
    }

    fn play(&mut self) {
        if self.loaded.is_some() && self.paused {
            self.started_at = Some(Instant::now());
            self.paused = false;
        }
    }

    fn pause(&mut self) {
        self.position_offset = self.current_position();
        self.started_at = None;
        self.paused = true;
    }

    fn stop(&mut self) {
        self.release_current();
    }

    fn position(&self) -> Duration {
        if self.loaded.is_none() {
            return Duration::ZERO;
        }
        self.current_position()
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        let Some(track) = &self.loaded else {
            anyhow::bail!("no active track");
        };

        self.position_offset = if track.duration.is_zero() {
            position
        } else {
            position.min(track.duration)
        };
        self.started_at = if self.paused {
            None
        } else {
            Some(Instant::now())
        };
        Ok(())
    }

    fn duration(&self) -> Duration {
        self.loaded
            .as_ref()
            .map_or(Duration::ZERO, |track| track.duration)
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    fn poll_event(&mut self) -> Option<OutputEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }

        let position = self.current_position();
        let paused = self.paused;
        let track = self.loaded.as_mut()?;
        if track.end_reported || paused || track.duration.is_zero() || position < track.duration
        {
            return None;
        }
        track.end_reported = true;
        Some(OutputEvent {
            output: track.id,
            error: None,
        })
    }

    fn output_name(&self) -> String {
        String::from("Null audio output")
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    next_id: u64,
    live: Option<OutputId>,
    loads: Vec<PathBuf>,
    failing: Vec<PathBuf>,
    playing: bool,
    position: Duration,
    duration: Duration,
    volume: f32,
    pending: VecDeque<OutputEvent>,
}

/// Output driven entirely by its caller.
///
/// Nothing is decoded: loads are recorded, position and duration are set by
/// hand and stop events are queued explicitly. Clones share state, so one copy
/// can be handed to the engine while another scripts it.
#[derive(Debug, Clone)]
pub struct ScriptedOutput {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedOutput {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState {
                next_id: 1,
                volume: 1.0,
                duration: Duration::from_secs(180),
                ..ScriptState::default()
            })),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ScriptState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut state)
    }

    /// Makes every later load of `path` fail.
    pub fn fail_path(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.with_state(|state| state.failing.push(path));
    }

    pub fn loads(&self) -> Vec<PathBuf> {
        self.with_state(|state| state.loads.clone())
    }

    pub fn live_output(&self) -> Option<OutputId> {
        self.with_state(|state| state.live)
    }

    pub fn is_playing(&self) -> bool {
        self.with_state(|state| state.playing)
    }

    pub fn set_position(&self, position: Duration) {
        self.with_state(|state| state.position = position);
    }

    /// Duration reported for the current and later loads.
    pub fn set_duration(&self, duration: Duration) {
        self.with_state(|state| state.duration = duration);
    }

    /// Queues a natural end of stream for the live output.
    pub fn finish_current(&self) {
        self.with_state(|state| {
            if let Some(output) = state.live.take() {
                state.playing = false;
                state.pending.push_back(OutputEvent {
                    output,
                    error: None,
                });
            }
        });
    }

    /// Queues a mid-playback failure for the live output.
    pub fn fail_current(&self, message: &str) {
        self.with_state(|state| {
            if let Some(output) = state.live.take() {
                state.playing = false;
                state.pending.push_back(OutputEvent {
                    output,
                    error: Some(message.to_string()),
                });
            }
        });
    }

    pub fn push_event(&self, event: OutputEvent) {
        self.with_state(|state| state.pending.push_back(event));
    }

    fn release(state: &mut ScriptState) {
        if let Some(output) = state.live.take() {
            state.pending.push_back(OutputEvent {
                output,
                error: None,
            });
        }
        state.playing = false;
        state.position = Duration::ZERO;
    }
}

impl Default for ScriptedOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for ScriptedOutput {
    fn load(&mut self, path: &Path) -> Result<OutputId> {
        self.with_state(|state| {
            Self::release(state);
            state.loads.push(path.to_path_buf());
            if state.failing.iter().any(|failing| failing == path) {
                anyhow::bail!("unsupported audio file: {}", path.display());
            }
            let id = OutputId(state.next_id);
            state.next_id += 1;
            state.live = Some(id);
            Ok(id)
        })
    }

    fn play(&mut self) {
        self.with_state(|state| state.playing = state.live.is_some());
    }

    fn pause(&mut self) {
        self.with_state(|state| state.playing = false);
    }

    fn stop(&mut self) {
        self.with_state(Self::release);
    }

    fn position(&self) -> Duration {
        self.with_state(|state| state.position)
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        self.with_state(|state| {
            if state.live.is_none() {
                anyhow::bail!("no active track");
            }
            state.position = position;
            Ok(())
        })
    }

    fn duration(&self) -> Duration {
        self.with_state(|state| {
            if state.live.is_some() {
                state.duration
            } else {
                Duration::ZERO
            }
        })
    }

    fn volume(&self) -> f32 {
        self.with_state(|state| state.volume)
    }

    fn set_volume(&mut self, volume: f32) {
        self.with_state(|state| state.volume = volume.clamp(0.0, 1.0));
    }

    fn poll_event(&mut self) -> Option<OutputEvent> {
        self.with_state(|state| state.pending.pop_front())
    }

    fn output_name(&self) -> String {
        String::from("Scripted output")
    }
}
