use crate::audio::AudioOutput;
use crate::config;
use crate::karaoke::{KaraokeController, KaraokeEvent, StemKind};
use crate::library::Library;
use crate::model::{PersistedState, PlayMode, PlaybackState, RepeatMode, Song};
use crate::playlist::PlaylistStore;
use crate::queue::{PlaybackQueue, PlayerEvent};
use crate::stats::{ListeningStatsTracker, PeriodStatistics, SystemClock, TICK_INTERVAL};
use anyhow::Result;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

const HELP: &str = "Commands: add <folder> | rescan | library | search <text> | enqueue <text> | queue | remove <n> \
| play [n] | pause | stop | next | prev | seek <secs> | volume <0-100> | shuffle [on|off] | repeat <off|all|one> \
| mode <normal|shuffle|loop|single> | playlist <new|add|remove|play|delete> <name> | playlists \
| karaoke [on|off] | export <vocals|instrumental> <path> | preprocess | separator | stats <weekend|month|all> | save | quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Continue,
    Quit,
}

/// Line-oriented front end: reads commands from stdin and ticks the engine
/// between them.
pub struct App {
    settings: PersistedState,
    library: Library,
    playlists: PlaylistStore,
    engine: PlaybackQueue,
    events: Receiver<PlayerEvent>,
    pub status: String,
}

impl App {
    pub fn new(
        settings: PersistedState,
        library: Library,
        playlists: PlaylistStore,
        mut engine: PlaybackQueue,
    ) -> Self {
        engine.apply_settings(&settings);
        let events = engine.subscribe();
        Self {
            settings,
            library,
            playlists,
            engine,
            events,
            status: String::from("Ready. Type help for commands."),
        }
    }

    /// Builds the app from the files under the config directory.
    pub fn from_config(output: Box<dyn AudioOutput>) -> Result<Self> {
        config::ensure_config_dir()?;
        let settings = config::load_state().unwrap_or_else(|err| {
            tracing::warn!("settings unavailable, using defaults: {err:#}");
            PersistedState::default()
        });
        let library = Library::from_folders(&settings.folders);
        let playlists = PlaylistStore::open_default(library.songs())?;
        let stats = ListeningStatsTracker::open(config::stats_path()?, Box::new(SystemClock));

        let mut engine = PlaybackQueue::new(output, stats);
        match KaraokeController::from_state(&settings, config::stems_dir()?) {
            Ok(karaoke) => engine = engine.with_karaoke(karaoke),
            Err(err) => tracing::warn!("karaoke disabled: {err:#}"),
        }
        Ok(Self::new(settings, library, playlists, engine))
    }

    pub fn engine(&self) -> &PlaybackQueue {
        &self.engine
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    pub fn playlists(&self) -> &PlaylistStore {
        &self.playlists
    }

    pub fn run(&mut self) -> Result<()> {
        let input = spawn_stdin_reader();
        println!("{}", self.status);
        println!("Audio output: {}", self.engine.output_name());

        let mut last_tick = Instant::now();
        loop {
            let wait = TICK_INTERVAL.saturating_sub(last_tick.elapsed());
            match input.recv_timeout(wait) {
                Ok(line) => {
                    let outcome = self.run_command(&line);
                    println!("{}", self.status);
                    if outcome == CommandOutcome::Quit {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if last_tick.elapsed() >= TICK_INTERVAL {
                self.tick();
                last_tick = Instant::now();
            }
            for line in self.drain_events() {
                println!("{line}");
            }
        }

        self.engine.shutdown();
        self.save()
    }

    pub fn tick(&mut self) {
        self.engine.tick();
    }

    pub fn save(&mut self) -> Result<()> {
        self.settings.folders = self.library.folders().to_vec();
        self.engine.store_settings(&mut self.settings);
        config::save_state(&self.settings)
    }

    /// Turns pending engine events into lines for the terminal.
    pub fn drain_events(&mut self) -> Vec<String> {
        let events: Vec<PlayerEvent> = self.events.try_iter().collect();
        events
            .into_iter()
            .filter_map(|event| self.describe_event(event))
            .collect()
    }

    fn describe_event(&self, event: PlayerEvent) -> Option<String> {
        match event {
            PlayerEvent::CurrentSongChanged { song_id: Some(_) } => self
                .engine
                .current_song()
                .map(|song| format!("Now playing: {}", song.display_text())),
            PlayerEvent::PlaybackFailed { message, .. } => Some(format!("Playback stopped: {message}")),
            PlayerEvent::KaraokeModeChanged(enabled) => {
                Some(format!("Karaoke {}", if enabled { "on" } else { "off" }))
            }
            PlayerEvent::SeparationProgress(progress) => Some(match progress.percentage {
                Some(percent) => format!("[{percent:>3}%] {}", progress.message),
                None => progress.message,
            }),
            PlayerEvent::Karaoke(event) => Some(describe_karaoke_event(&event)),
            _ => None,
        }
    }

    pub fn run_command(&mut self, raw: &str) -> CommandOutcome {
        let input = raw.trim();
        if input.is_empty() {
            self.status = String::from("No command");
            return CommandOutcome::Continue;
        }

        let mut command_split = input.splitn(2, char::is_whitespace);
        let command = command_split.next().unwrap_or_default();
        let rest = command_split.next().unwrap_or("").trim();

        match command {
            "help" => self.status = String::from(HELP),
            "quit" | "exit" => {
                self.status = String::from("Bye");
                return CommandOutcome::Quit;
            }
            "add" => self.add_folder(rest),
            "rescan" => {
                self.library.rescan();
                self.playlists.relink(self.library.songs());
                self.status = format!("Library rescanned: {} songs", self.library.songs().len());
            }
            "library" => {
                let songs = self.library.songs().to_vec();
                let count = songs.len();
                self.engine.set_queue(songs, 0);
                self.status = format!("Queued {count} songs from the library");
            }
            "search" => {
                let hits = self.library.search(rest);
                self.status = if hits.is_empty() {
                    String::from("No matches")
                } else {
                    hits.iter()
                        .take(20)
                        .map(|song| song.display_text())
                        .collect::<Vec<_>>()
                        .join("\n")
                };
            }
            "enqueue" => {
                let hits: Vec<Song> = self.library.search(rest).into_iter().cloned().collect();
                let count = hits.len();
                for song in hits {
                    self.engine.add_to_queue(song);
                }
                self.status = format!("Added {count} songs to the queue");
            }
            "queue" => self.status = self.describe_queue(),
            "remove" => self.remove_from_queue(rest),
            "play" => self.play(rest),
            "pause" => {
                let result = self.engine.toggle_pause();
                self.report(result, self.state_label());
            }
            "stop" => {
                self.engine.stop();
                self.status = String::from("Stopped");
            }
            "next" => {
                let result = self.engine.play_next();
                self.report(result, self.now_playing());
            }
            "prev" | "previous" => {
                let result = self.engine.play_previous();
                self.report(result, self.now_playing());
            }
            "seek" => match rest.parse::<f64>().ok().and_then(|secs| Duration::try_from_secs_f64(secs).ok()) {
                Some(position) => {
                    let result = self.engine.seek(position);
                    self.report(result, format!("Seeked to {}", format_clock(position)));
                }
                None => self.status = String::from("Usage: seek <seconds>"),
            },
            "volume" => match rest.parse::<u8>() {
                Ok(percent) if percent <= 100 => {
                    self.engine.set_volume(f32::from(percent) / 100.0);
                    self.status = format!("Volume: {percent}%");
                }
                _ => self.status = String::from("Usage: volume <0-100>"),
            },
            "shuffle" => {
                match rest {
                    "" => self.engine.toggle_shuffle(),
                    "on" => self.engine.set_shuffle(true),
                    "off" => self.engine.set_shuffle(false),
                    _ => {
                        self.status = String::from("Usage: shuffle [on|off]");
                        return CommandOutcome::Continue;
                    }
                }
                self.status = self.describe_mode();
            }
            "repeat" => {
                let repeat = match rest {
                    "" => self.engine.repeat_mode().next(),
                    "off" => RepeatMode::Off,
                    "all" => RepeatMode::RepeatAll,
                    "one" => RepeatMode::RepeatOne,
                    _ => {
                        self.status = String::from("Usage: repeat <off|all|one>");
                        return CommandOutcome::Continue;
                    }
                };
                self.engine.set_repeat(repeat);
                self.status = self.describe_mode();
            }
            "mode" => {
                let mode = match rest {
                    "normal" => PlayMode::Normal,
                    "shuffle" => PlayMode::Shuffle,
                    "loop" => PlayMode::RepeatAll,
                    "single" => PlayMode::RepeatOne,
                    _ => {
                        self.status = String::from("Usage: mode <normal|shuffle|loop|single>");
                        return CommandOutcome::Continue;
                    }
                };
                self.engine.set_play_mode(mode);
                self.status = self.describe_mode();
            }
            "playlist" => self.playlist_command(rest),
            "playlists" => {
                self.status = if self.playlists.playlists().is_empty() {
                    String::from("No playlists")
                } else {
                    self.playlists
                        .playlists()
                        .iter()
                        .map(|playlist| {
                            format!(
                                "{} ({} songs, {})",
                                playlist.name,
                                playlist.songs.len(),
                                format_clock(playlist.total_duration())
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("\n")
                };
            }
            "karaoke" => {
                let result = match rest {
                    "" => self.engine.toggle_karaoke(),
                    "on" => self.engine.set_karaoke_mode(true),
                    "off" => self.engine.set_karaoke_mode(false),
                    _ => {
                        self.status = String::from("Usage: karaoke [on|off]");
                        return CommandOutcome::Continue;
                    }
                };
                self.status = match result {
                    Ok(()) if self.engine.karaoke_mode() => String::from("Karaoke on"),
                    Ok(()) => String::from("Karaoke off"),
                    Err(err) => format!("Karaoke: {err}"),
                };
            }
            "export" => self.export_stem(rest),
            "preprocess" => {
                let songs = self.engine.queue().to_vec();
                let count = songs.len();
                self.status = match self.engine.preprocess_for_karaoke(songs) {
                    Ok(()) => format!("Preparing karaoke stems for {count} songs"),
                    Err(err) => format!("Karaoke: {err}"),
                };
            }
            "separator" => {
                self.status = self
                    .engine
                    .separator_setup_info()
                    .unwrap_or_else(|| String::from("Separator not configured"));
            }
            "stats" => {
                let songs = self.library.songs();
                let period = match rest {
                    "" | "all" => self.engine.all_time_stats(songs),
                    "weekend" => self.engine.weekend_stats(songs),
                    "month" => self.engine.monthly_stats(songs),
                    _ => {
                        self.status = String::from("Usage: stats <weekend|month|all>");
                        return CommandOutcome::Continue;
                    }
                };
                self.status = describe_period(&period);
            }
            "save" => {
                self.status = match self.save() {
                    Ok(()) => String::from("State saved"),
                    Err(err) => format!("save error: {err:#}"),
                };
            }
            _ => self.status = String::from("Unknown command. Type help"),
        }
        CommandOutcome::Continue
    }

    fn add_folder(&mut self, rest: &str) {
        if rest.is_empty() {
            self.status = String::from("Usage: add <folder>");
            return;
        }
        let folder = PathBuf::from(rest);
        self.status = match self.library.add_folder(&folder, |_| {}) {
            Some(count) => {
                self.playlists.relink(self.library.songs());
                format!("Added folder with {count} songs")
            }
            None => String::from("Folder already added"),
        };
    }

    fn remove_from_queue(&mut self, rest: &str) {
        let Some(song) = parse_position(rest).and_then(|index| self.engine.queue().get(index).cloned())
        else {
            self.status = String::from("Usage: remove <queue position>");
            return;
        };
        let result = self.engine.remove_from_queue(&song);
        self.report(result, format!("Removed {}", song.display_text()));
    }

    fn play(&mut self, rest: &str) {
        let result = if rest.is_empty() {
            self.engine.play()
        } else {
            match parse_position(rest) {
                Some(index) if index < self.engine.queue().len() => self.engine.play_song_at_index(index),
                _ => {
                    self.status = String::from("No such queue position");
                    return;
                }
            }
        };
        self.report(result, self.now_playing());
    }

    fn playlist_command(&mut self, rest: &str) {
        let mut playlist_split = rest.splitn(2, char::is_whitespace);
        let action = playlist_split.next().unwrap_or_default();
        let name = playlist_split.next().unwrap_or("").trim();
        if action.is_empty() || name.is_empty() {
            self.status = String::from("Usage: playlist <new|add|remove|play|delete> <name>");
            return;
        }

        if action == "new" {
            self.status = if self.playlists.find_by_name(name).is_some() {
                String::from("Playlist already exists")
            } else {
                self.playlists.create(name, "", None);
                String::from("Playlist created")
            };
            return;
        }

        let Some(playlist) = self.playlists.find_by_name(name) else {
            self.status = String::from("Playlist not found");
            return;
        };
        let id = playlist.id.clone();
        let songs = playlist.songs.clone();

        match action {
            "add" | "remove" => {
                let Some(song) = self.engine.current_song().cloned() else {
                    self.status = String::from("No song is playing");
                    return;
                };
                let changed = if action == "add" {
                    self.playlists.add_song(&id, &song, self.library.songs())
                } else {
                    self.playlists.remove_song(&id, &song)
                };
                self.status = match (action, changed) {
                    ("add", true) => format!("Added {} to {name}", song.title),
                    ("add", false) => String::from("Song is already in the playlist"),
                    (_, true) => format!("Removed {} from {name}", song.title),
                    (_, false) => String::from("Song is not in the playlist"),
                };
            }
            "play" => {
                let Some(first) = songs.first().cloned() else {
                    self.status = String::from("Playlist is empty");
                    return;
                };
                let result = self.engine.play_song_from_collection(&first, songs);
                self.report(result, self.now_playing());
            }
            "delete" => {
                self.playlists.delete(&id);
                self.status = String::from("Playlist deleted");
            }
            _ => self.status = String::from("Usage: playlist <new|add|remove|play|delete> <name>"),
        }
    }

    fn export_stem(&mut self, rest: &str) {
        let mut split = rest.splitn(2, char::is_whitespace);
        let kind = match split.next().unwrap_or_default() {
            "vocals" => StemKind::Vocals,
            "instrumental" => StemKind::Instrumental,
            _ => {
                self.status = String::from("Usage: export <vocals|instrumental> <path>");
                return;
            }
        };
        let target = split.next().unwrap_or("").trim();
        if target.is_empty() {
            self.status = String::from("Usage: export <vocals|instrumental> <path>");
            return;
        }
        let Some(song) = self.engine.current_song().cloned() else {
            self.status = String::from("No song is playing");
            return;
        };
        self.status = match self.engine.export_stem(&song, kind, PathBuf::from(target)) {
            Ok(()) => format!("Exporting {} of {}", kind.label(), song.title),
            Err(err) => format!("Karaoke: {err}"),
        };
    }

    fn report<E: std::fmt::Display>(&mut self, result: Result<(), E>, success: String) {
        self.status = match result {
            Ok(()) => success,
            Err(err) => format!("playback error: {err}"),
        };
    }

    fn now_playing(&self) -> String {
        match (self.engine.state(), self.engine.current_song()) {
            (PlaybackState::Stopped, _) | (_, None) => String::from("Stopped"),
            (_, Some(song)) => format!("Playing {}", song.display_text()),
        }
    }

    fn state_label(&self) -> String {
        match self.engine.state() {
            PlaybackState::Playing => String::from("Resumed"),
            PlaybackState::Paused => String::from("Paused"),
            PlaybackState::Stopped => String::from("Stopped"),
        }
    }

    fn describe_mode(&self) -> String {
        format!(
            "Shuffle {} | repeat {}",
            if self.engine.is_shuffle_on() { "on" } else { "off" },
            self.engine.repeat_mode().label()
        )
    }

    fn describe_queue(&self) -> String {
        if self.engine.queue().is_empty() {
            return String::from("Queue is empty");
        }
        self.engine
            .queue()
            .iter()
            .enumerate()
            .map(|(index, song)| {
                let marker = if self.engine.current_index() == Some(index) { '>' } else { ' ' };
                format!("{marker}{:>3}. {}", index + 1, song.display_text())
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// One-based queue position as typed by the user.
fn parse_position(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok()?.checked_sub(1)
}

fn describe_karaoke_event(event: &KaraokeEvent) -> String {
    match event {
        KaraokeEvent::StemsReady { .. } => String::from("Stems ready"),
        KaraokeEvent::SeparationFailed { message, .. } => format!("Separation failed: {message}"),
        KaraokeEvent::Exported { kind, target, .. } => {
            format!("Exported {} to {}", kind.label(), target.display())
        }
        KaraokeEvent::ExportFailed { kind, message, .. } => {
            format!("Export of {} failed: {message}", kind.label())
        }
        KaraokeEvent::PreprocessFinished {
            separated,
            skipped,
            failed,
        } => format!("Preprocessing done: {separated} separated, {skipped} already done, {failed} failed"),
    }
}

fn describe_period(period: &PeriodStatistics) -> String {
    let mut lines = vec![format!(
        "{}: {} plays, {} listened",
        period.period_name,
        period.total_plays,
        format_clock(period.total_listening_time)
    )];
    lines.extend(period.top_songs.iter().take(10).enumerate().map(|(rank, row)| {
        let title = if row.song_title.is_empty() {
            row.song_id.as_str()
        } else {
            row.song_title.as_str()
        };
        format!(
            "{:>2}. {title} - {} plays, {}",
            rank + 1,
            row.total_plays,
            format_clock(row.total_listening_time)
        )
    }));
    lines.join("\n")
}

fn format_clock(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total / 60) % 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioOutput as _, ScriptedOutput};
    use crate::audio::tests::write_test_wav;
    use crate::stats::ManualClock;
    use std::fs;
    use tempfile::tempdir;
    use time::macros::datetime;

    fn app() -> (App, ScriptedOutput) {
        let output = ScriptedOutput::new();
        let clock = ManualClock::new(datetime!(2026-10-14 12:00 UTC));
        let stats = ListeningStatsTracker::in_memory(Box::new(clock));
        let engine = PlaybackQueue::with_rng_seed(Box::new(output.clone()), stats, 9);
        let app = App::new(
            PersistedState::default(),
            Library::default(),
            PlaylistStore::in_memory(),
            engine,
        );
        (app, output)
    }

    fn app_with_songs(names: &[&str]) -> (App, ScriptedOutput, tempfile::TempDir) {
        let dir = tempdir().expect("tempdir");
        let folder = dir.path().join("Music Folder");
        fs::create_dir(&folder).expect("folder");
        for name in names {
            write_test_wav(&folder.join(format!("{name}.wav")), 100);
        }
        let (mut app, output) = app();
        app.run_command(&format!("add {}", folder.display()));
        (app, output, dir)
    }

    #[test]
    fn unknown_command_is_reported() {
        let (mut app, _) = app();
        assert_eq!(app.run_command("wat"), CommandOutcome::Continue);
        assert!(app.status.contains("Unknown command"));
        assert_eq!(app.run_command("quit"), CommandOutcome::Quit);
    }

    #[test]
    fn add_command_accepts_paths_with_spaces() {
        let (app, _, _dir) = app_with_songs(&["a", "b"]);
        assert_eq!(app.status, "Added folder with 2 songs");
        assert!(
            app.library()
                .folders()
                .iter()
                .any(|path| path.to_string_lossy().contains("Music Folder"))
        );
    }

    #[test]
    fn library_then_play_position_starts_that_song() {
        let (mut app, output, _dir) = app_with_songs(&["a", "b", "c"]);
        app.run_command("library");
        app.run_command("play 2");

        assert_eq!(app.engine().current_index(), Some(1));
        assert!(output.loads()[0].ends_with("b.wav"));
        assert!(app.status.starts_with("Playing"));

        app.run_command("play 9");
        assert_eq!(app.status, "No such queue position");
    }

    #[test]
    fn natural_end_is_announced_after_a_tick() {
        let (mut app, output, _dir) = app_with_songs(&["a", "b"]);
        app.run_command("library");
        app.run_command("play");
        app.drain_events();

        output.finish_current();
        app.tick();
        let lines = app.drain_events();
        assert!(lines.iter().any(|line| line.starts_with("Now playing:") && line.ends_with("b")));
    }

    #[test]
    fn shuffle_and_repeat_commands_are_independent() {
        let (mut app, _) = app();
        app.run_command("repeat all");
        app.run_command("shuffle on");
        assert_eq!(app.status, "Shuffle on | repeat all");
        app.run_command("shuffle off");
        assert_eq!(app.engine().repeat_mode(), RepeatMode::RepeatAll);

        app.run_command("mode single");
        assert_eq!(app.engine().play_mode(), PlayMode::RepeatOne);
        app.run_command("repeat sometimes");
        assert_eq!(app.status, "Usage: repeat <off|all|one>");
    }

    #[test]
    fn playlist_commands_collect_and_play_songs() {
        let (mut app, output, _dir) = app_with_songs(&["a", "b"]);
        app.run_command("playlist new Road Trip");
        app.run_command("playlist add road trip");
        assert_eq!(app.status, "No song is playing");

        app.run_command("library");
        app.run_command("play 2");
        app.run_command("playlist add Road Trip");
        assert_eq!(app.status, "Added b to Road Trip");
        app.run_command("playlist add Road Trip");
        assert_eq!(app.status, "Song is already in the playlist");

        app.run_command("stop");
        app.run_command("playlist play Road Trip");
        assert_eq!(app.engine().queue().len(), 1);
        assert!(output.loads().last().expect("load").ends_with("b.wav"));
    }

    #[test]
    fn remove_uses_one_based_positions() {
        let (mut app, _, _dir) = app_with_songs(&["a", "b", "c"]);
        app.run_command("library");
        app.run_command("remove 1");
        assert_eq!(app.engine().queue().len(), 2);
        app.run_command("remove 0");
        assert_eq!(app.status, "Usage: remove <queue position>");
    }

    #[test]
    fn karaoke_without_separator_is_refused() {
        let (mut app, _) = app();
        app.run_command("karaoke on");
        assert_eq!(app.status, "Karaoke: audio separator is not available");
    }

    #[test]
    fn seek_rejects_positions_outside_duration_range() {
        let (mut app, output, _dir) = app_with_songs(&["a"]);
        app.run_command("library");
        app.run_command("play");

        for raw in ["seek 1e300", "seek -5", "seek NaN", "seek soon"] {
            app.run_command(raw);
            assert_eq!(app.status, "Usage: seek <seconds>");
        }

        app.run_command("seek 75");
        assert_eq!(app.status, "Seeked to 1:15");
        assert_eq!(output.position(), Duration::from_secs(75));
    }

    #[test]
    fn clock_format_switches_to_hours() {
        assert_eq!(format_clock(Duration::from_secs(65)), "1:05");
        assert_eq!(format_clock(Duration::from_secs(3_725)), "1:02:05");
    }
}
