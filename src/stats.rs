use crate::config;
use crate::model::{Song, duration_secs};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::{OffsetDateTime, Time};

/// Listening time credited per position tick.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);
const MAX_TICK_GAP: time::Duration = time::Duration::minutes(1);
const COMPLETION_THRESHOLD: f64 = 0.75;

pub trait Clock {
    fn now(&self) -> OffsetDateTime;
}

/// Local wall clock, falling back to UTC when the local offset is unknown.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<OffsetDateTime>>,
}

impl ManualClock {
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }

    pub fn set(&self, at: OffsetDateTime) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SongListeningRecord {
    pub song_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub listen_date: OffsetDateTime,
    #[serde(with = "duration_secs")]
    pub listen_duration: Duration,
    #[serde(rename = "CompletedAt75Percent")]
    pub completed_at_75_percent: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SongStatistics {
    pub song_id: String,
    pub song_title: String,
    pub artist: String,
    pub file_path: Option<PathBuf>,
    pub total_plays: u32,
    pub total_listening_time: Duration,
    pub first_played: OffsetDateTime,
    pub last_played: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeriodStatistics {
    pub period_name: String,
    pub period_start: OffsetDateTime,
    pub period_end: OffsetDateTime,
    pub top_songs: Vec<SongStatistics>,
    pub total_listening_time: Duration,
    pub total_plays: u32,
}

impl PeriodStatistics {
    /// Fills title, artist and path of each row from the matching catalog song.
    pub fn attach_song_metadata<'a>(&mut self, songs: impl IntoIterator<Item = &'a Song>) {
        let by_id: HashMap<&str, &Song> = songs
            .into_iter()
            .map(|song| (song.id.as_str(), song))
            .collect();
        for row in &mut self.top_songs {
            if let Some(song) = by_id.get(row.song_id.as_str()) {
                row.song_title = song.title.clone();
                row.artist = song.artist.clone();
                row.file_path = Some(song.file_path.clone());
            }
        }
    }
}

#[derive(Debug)]
struct ListeningSession {
    song_id: String,
    last_tick: OffsetDateTime,
    listened: Duration,
    reached_threshold: bool,
}

/// Turns per-song listening sessions into persisted records and aggregates
/// them per period.
pub struct ListeningStatsTracker {
    path: Option<PathBuf>,
    records: Vec<SongListeningRecord>,
    session: Option<ListeningSession>,
    clock: Box<dyn Clock>,
}

impl ListeningStatsTracker {
    /// Opens the record file at `path`. A missing, empty or unreadable file
    /// starts with no records.
    pub fn open(path: PathBuf, clock: Box<dyn Clock>) -> Self {
        let records = match load_records_from_path(&path) {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!("listening stats unavailable, starting empty: {err:#}");
                Vec::new()
            }
        };
        Self {
            path: Some(path),
            records,
            session: None,
            clock,
        }
    }

    /// Tracker that never touches the filesystem.
    pub fn in_memory(clock: Box<dyn Clock>) -> Self {
        Self {
            path: None,
            records: Vec::new(),
            session: None,
            clock,
        }
    }

    pub fn records(&self) -> &[SongListeningRecord] {
        &self.records
    }

    pub fn active_song_id(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.song_id.as_str())
    }

    pub fn on_song_started(&mut self, song: &Song) {
        self.flush_session();
        self.session = Some(ListeningSession {
            song_id: song.id.clone(),
            last_tick: self.clock.now(),
            listened: Duration::ZERO,
            reached_threshold: false,
        });
    }

    pub fn on_position_update(&mut self, song: &Song, position: Duration, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        let now = self.clock.now();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.song_id != song.id {
            return;
        }

        if now - session.last_tick <= MAX_TICK_GAP {
            session.listened += TICK_INTERVAL;
        }
        if position.as_secs_f64() / duration.as_secs_f64() >= COMPLETION_THRESHOLD {
            session.reached_threshold = true;
        }
        session.last_tick = now;
    }

    pub fn on_song_stopped(&mut self) {
        self.flush_session();
    }

    /// Most recent Saturday and Sunday, including the current pair on a weekend.
    pub fn weekend_stats(&self) -> PeriodStatistics {
        let (start, end) = weekend_window(self.clock.now());
        self.stats_for_period(start, end, "This Weekend")
    }

    /// Calendar month containing now.
    pub fn monthly_stats(&self) -> PeriodStatistics {
        let now = self.clock.now();
        let (start, end) = month_window(now).unwrap_or((now, now));
        self.stats_for_period(start, end, &format!("{} {}", now.month(), now.year()))
    }

    pub fn all_time_stats(&self) -> PeriodStatistics {
        let first = self.records.iter().map(|record| record.listen_date).min();
        let last = self.records.iter().map(|record| record.listen_date).max();
        match (first, last) {
            (Some(first), Some(last)) => self.stats_for_period(first, last, "All Time"),
            _ => {
                let now = self.clock.now();
                self.stats_for_period(now, now, "All Time")
            }
        }
    }

    fn flush_session(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        if session.listened.is_zero() {
            return;
        }

        self.records.push(SongListeningRecord {
            song_id: session.song_id,
            listen_date: self.clock.now(),
            listen_duration: session.listened,
            completed_at_75_percent: session.reached_threshold,
        });

        if let Some(path) = &self.path
            && let Err(err) = save_records_to_path(path, &self.records)
        {
            tracing::warn!("listening stats kept in memory only: {err:#}");
        }
    }

    fn stats_for_period(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
        name: &str,
    ) -> PeriodStatistics {
        let mut rows: Vec<SongStatistics> = Vec::new();
        let mut row_by_song: HashMap<&str, usize> = HashMap::new();
        let mut total_listening_time = Duration::ZERO;
        let mut total_plays = 0_u32;

        for record in self
            .records
            .iter()
            .filter(|record| record.listen_date >= start && record.listen_date <= end)
        {
            total_listening_time += record.listen_duration;
            if record.completed_at_75_percent {
                total_plays = total_plays.saturating_add(1);
            }

            let slot = *row_by_song
                .entry(record.song_id.as_str())
                .or_insert_with(|| {
                    rows.push(SongStatistics {
                        song_id: record.song_id.clone(),
                        song_title: String::new(),
                        artist: String::new(),
                        file_path: None,
                        total_plays: 0,
                        total_listening_time: Duration::ZERO,
                        first_played: record.listen_date,
                        last_played: record.listen_date,
                    });
                    rows.len() - 1
                });
            let row = &mut rows[slot];
            row.total_listening_time += record.listen_duration;
            if record.completed_at_75_percent {
                row.total_plays = row.total_plays.saturating_add(1);
            }
            row.first_played = row.first_played.min(record.listen_date);
            row.last_played = row.last_played.max(record.listen_date);
        }

        rows.sort_by(|a, b| {
            b.total_plays
                .cmp(&a.total_plays)
                .then_with(|| b.total_listening_time.cmp(&a.total_listening_time))
        });

        PeriodStatistics {
            period_name: name.to_string(),
            period_start: start,
            period_end: end,
            top_songs: rows,
            total_listening_time,
            total_plays,
        }
    }
}

pub fn load_records() -> Result<Vec<SongListeningRecord>> {
    let path = config::stats_path()?;
    load_records_from_path(&path)
}

fn load_records_from_path(path: &Path) -> Result<Vec<SongListeningRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn save_records_to_path(path: &Path, records: &[SongListeningRecord]) -> Result<()> {
    let json = serde_json::to_string_pretty(records)?;
    config::write_with_backup(path, &json)
}

fn weekend_window(now: OffsetDateTime) -> (OffsetDateTime, OffsetDateTime) {
    let midnight = now.replace_time(Time::MIDNIGHT);
    let days_since_saturday = (i64::from(now.weekday().number_days_from_sunday()) + 1) % 7;
    let saturday = midnight - time::Duration::days(days_since_saturday);
    let end = saturday + time::Duration::days(2) - time::Duration::nanoseconds(1);
    (saturday, end)
}

fn month_window(
    now: OffsetDateTime,
) -> Result<(OffsetDateTime, OffsetDateTime), time::error::ComponentRange> {
    let start = now.replace_time(Time::MIDNIGHT).replace_day(1)?;
    let next_month = (start + time::Duration::days(32)).replace_day(1)?;
    Ok((start, next_month - time::Duration::nanoseconds(1)))
}
