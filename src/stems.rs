//! Vocal/instrumental separation through an external separator program.
//!
//! The separator is invoked as `<program> <script> <input> <work dir>` and is
//! expected to write `<work dir>/<sanitized stem>/*.wav`. The stems are then
//! moved to `<output dir>/<file stem>/vocals.wav` and `accompaniment.wav`,
//! which is where [`StemPaths::for_input`] looks for them.

use crate::config;
use crate::error::SeparationError;
use crate::model::PersistedState;
use anyhow::Result;
use regex::Regex;
use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::Sender;
use std::sync::{LazyLock, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use time::macros::format_description;

pub const VOCALS_FILE: &str = "vocals.wav";
pub const ACCOMPANIMENT_FILE: &str = "accompaniment.wav";
pub const DEFAULT_SCRIPT_NAME: &str = "audio_separator_wrapper.py";

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const MAX_SANITIZED_LEN: usize = 30;
const MAX_WORK_DIR_LEN: usize = 50;
const SHELL_SPECIAL_CHARS: &[char] = &['(', ')', '[', ']', '{', '}', '&', '%', '$', '#', '@', '!'];
const PATH_INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

static PERCENT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)%").expect("static percent pattern"));
static FRACTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[?(\d+)/(\d+)\]?").expect("static fraction pattern"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StemPaths {
    pub vocals: PathBuf,
    pub accompaniment: PathBuf,
}

impl StemPaths {
    pub fn for_input(input: &Path, output_dir: &Path) -> Self {
        let stem_dir = output_dir.join(input.file_stem().unwrap_or(input.as_os_str()));
        Self {
            vocals: stem_dir.join(VOCALS_FILE),
            accompaniment: stem_dir.join(ACCOMPANIMENT_FILE),
        }
    }

    pub fn exist(&self) -> bool {
        self.vocals.is_file() && self.accompaniment.is_file()
    }

    fn dir(&self) -> Option<&Path> {
        self.vocals.parent()
    }
}

/// Both stems for `input` are already present under `output_dir`.
pub fn stems_exist(input: &Path, output_dir: &Path) -> bool {
    StemPaths::for_input(input, output_dir).exist()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeparationProgress {
    pub message: String,
    pub percentage: Option<u8>,
    pub is_completed: bool,
    pub is_error: bool,
}

impl SeparationProgress {
    pub fn step(message: impl Into<String>, percentage: Option<u8>) -> Self {
        Self {
            message: message.into(),
            percentage,
            is_completed: false,
            is_error: false,
        }
    }

    pub fn completed(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            percentage: Some(100),
            is_completed: true,
            is_error: false,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            percentage: Some(0),
            is_completed: true,
            is_error: true,
        }
    }
}

pub trait StemSeparator: Send + Sync {
    /// Splits `input` into vocals and accompaniment under `output_dir`,
    /// reporting intermediate progress on `progress`.
    fn separate(
        &self,
        input: &Path,
        output_dir: &Path,
        progress: &Sender<SeparationProgress>,
    ) -> Result<StemPaths, SeparationError>;

    fn is_available(&self) -> bool;

    fn setup_info(&self) -> String;
}

#[derive(Debug)]
pub struct ProcessStemSeparator {
    program: String,
    script: PathBuf,
    timeout: Duration,
    available: OnceLock<bool>,
}

#[derive(Debug)]
struct ProbeReport {
    exit_code: Option<i32>,
    mentions_separate_audio: bool,
    mentions_vocals: bool,
    stderr: String,
}

impl ProbeReport {
    fn recognized(&self) -> bool {
        self.exit_code == Some(1) && (self.mentions_separate_audio || self.mentions_vocals)
    }
}

struct CapturedRun {
    status: Option<ExitStatus>,
    stderr: Vec<String>,
    stdout: Vec<String>,
}

impl ProcessStemSeparator {
    pub fn new(program: impl Into<String>, script: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            script: script.into(),
            timeout,
            available: OnceLock::new(),
        }
    }

    /// Separator configured from settings; without an explicit script the
    /// wrapper is looked up in the app-data directory.
    pub fn from_state(state: &PersistedState) -> Result<Self> {
        let script = match &state.separator_script {
            Some(script) => script.clone(),
            None => config::config_root()?.join(DEFAULT_SCRIPT_NAME),
        };
        let timeout = Duration::from_secs(u64::from(state.separation_timeout_minutes) * 60);
        Ok(Self::new(state.separator_program.clone(), script, timeout))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.arg(&self.script);
        if let Some(dir) = self
            .script
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
        {
            command.current_dir(dir);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }

    fn probe(&self) -> io::Result<ProbeReport> {
        let mut command = self.command();
        command.arg("--help");
        let child = command.spawn()?;
        let run = wait_captured(child, PROBE_TIMEOUT, None)?;
        let stdout = run.stdout.join("\n");
        Ok(ProbeReport {
            exit_code: run.status.and_then(|status| status.code()),
            mentions_separate_audio: stdout.contains("Separate audio"),
            mentions_vocals: stdout.contains("vocals and accompaniment"),
            stderr: run.stderr.join("\n"),
        })
    }
}

impl StemSeparator for ProcessStemSeparator {
    fn separate(
        &self,
        input: &Path,
        output_dir: &Path,
        progress: &Sender<SeparationProgress>,
    ) -> Result<StemPaths, SeparationError> {
        if !input.is_file() {
            return Err(SeparationError::InputMissing(input.to_path_buf()));
        }
        fs::create_dir_all(output_dir)?;

        let sanitized = sanitize_file_name(input.file_stem().and_then(|stem| stem.to_str()));
        let work_dir = output_dir.join(work_dir_name(&sanitized));

        let _ = progress.send(SeparationProgress::step(
            "Starting audio separation...",
            Some(5),
        ));
        tracing::info!(input = %input.display(), work_dir = %work_dir.display(), "starting stem separation");

        let mut command = self.command();
        command
            .arg(input)
            .arg(&work_dir)
            .env("PYTHONUNBUFFERED", "1")
            .env("PYTHONWARNINGS", "ignore");
        let child = command.spawn().map_err(|source| SeparationError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let run = wait_captured(child, self.timeout, Some(progress))?;
        let Some(status) = run.status else {
            tracing::warn!(timeout_secs = self.timeout.as_secs(), "separator killed after timeout");
            return Err(SeparationError::TimedOut {
                timeout: self.timeout,
            });
        };
        if !status.success() {
            return Err(SeparationError::ProcessFailed {
                code: status.code(),
                stderr: filter_warnings(&run.stderr.join("\n")),
            });
        }

        let _ = progress.send(SeparationProgress::step(
            "Audio separation completed successfully",
            Some(90),
        ));

        let paths = StemPaths::for_input(input, output_dir);
        let produced = work_dir.join(&sanitized);
        if produced.is_dir()
            && let Some(target) = paths.dir()
        {
            let _ = progress.send(SeparationProgress::step(
                "Moving separated files to final location...",
                Some(95),
            ));
            move_wav_files(&produced, target)?;
        }
        let _ = fs::remove_dir_all(&work_dir);

        verify_outputs(&paths)?;
        let _ = progress.send(SeparationProgress::completed(
            "Audio separation completed successfully!",
        ));
        tracing::info!(input = %input.display(), "stem separation finished");
        Ok(paths)
    }

    fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            if !self.script.is_file() {
                return false;
            }
            match self.probe() {
                Ok(report) => report.recognized(),
                Err(err) => {
                    tracing::debug!("separator probe failed: {err}");
                    false
                }
            }
        })
    }

    fn setup_info(&self) -> String {
        let mut info = vec![
            format!("Program: {}", self.program),
            format!("Script: {}", self.script.display()),
            format!("Available: {}", self.is_available()),
            format!("Script Exists: {}", self.script.is_file()),
        ];

        match self.probe() {
            Ok(report) => {
                match report.exit_code {
                    Some(code) => info.push(format!("Test Exit Code: {code}")),
                    None => info.push(String::from("Test Exit Code: none")),
                }
                info.push(format!(
                    "Test Output Contains 'Separate audio': {}",
                    report.mentions_separate_audio
                ));
                info.push(format!(
                    "Test Output Contains 'vocals and accompaniment': {}",
                    report.mentions_vocals
                ));
                if !report.stderr.trim().is_empty() {
                    info.push(format!("Test Error: {}", report.stderr));
                }
            }
            Err(err) => info.push(format!("Test Exception: {err}")),
        }

        info.join("\n")
    }
}

/// Makes a file stem safe to use as a directory name.
pub fn sanitize_file_name(name: Option<&str>) -> String {
    let Some(name) = name.filter(|name| !name.is_empty()) else {
        return String::from("unknown");
    };

    let replaced: String = name
        .chars()
        .map(|ch| {
            if ch.is_control() || PATH_INVALID_CHARS.contains(&ch) || SHELL_SPECIAL_CHARS.contains(&ch)
            {
                '_'
            } else {
                ch
            }
        })
        .collect();

    let mut collapsed = String::with_capacity(replaced.len());
    for ch in replaced.chars() {
        if ch == '_' && collapsed.ends_with('_') {
            continue;
        }
        collapsed.push(ch);
    }

    let trimmed = collapsed.trim_matches('_');
    if trimmed.is_empty() {
        return String::from("audio_file");
    }
    if trimmed.chars().count() > MAX_SANITIZED_LEN {
        let capped: String = trimmed.chars().take(MAX_SANITIZED_LEN).collect();
        return capped.trim_end_matches('_').to_string();
    }
    trimmed.to_string()
}

/// Interprets one line of separator output as a progress update.
pub fn parse_progress_line(line: &str) -> Option<SeparationProgress> {
    if line.is_empty() {
        return None;
    }

    if let Some(captures) = PERCENT_PATTERN.captures(line)
        && let Ok(percent) = captures[1].parse::<u32>()
    {
        let percent = clamp_percent(percent);
        return Some(SeparationProgress::step(
            format!("Processing... {percent}%"),
            Some(percent),
        ));
    }

    if let Some(captures) = FRACTION_PATTERN.captures(line)
        && let (Ok(current), Ok(total)) = (captures[1].parse::<u64>(), captures[2].parse::<u64>())
        && total > 0
    {
        let percent = clamp_percent(u32::try_from(current.saturating_mul(100) / total).unwrap_or(u32::MAX));
        return Some(SeparationProgress::step(
            format!("Processing... {current}/{total} ({percent}%)"),
            Some(percent),
        ));
    }

    let (message, percentage) = if line.contains("Loading model") {
        ("Loading AI model...", Some(10))
    } else if line.contains("Starting separation") {
        ("Starting separation process...", Some(20))
    } else if line.contains("Separating") {
        ("Separating audio tracks...", None)
    } else if line.contains("Saving") {
        ("Saving separated tracks...", Some(80))
    } else if line.contains("completed") {
        ("Separation completed!", Some(90))
    } else {
        return None;
    };
    Some(SeparationProgress::step(message, percentage))
}

/// Drops warning chatter and blank lines from separator stderr.
pub fn filter_warnings(stderr: &str) -> String {
    stderr
        .lines()
        .filter(|line| {
            !(line.trim().is_empty()
                || line.contains("WARNING")
                || line.contains("UserWarning")
                || line.contains("FutureWarning")
                || line.contains("DeprecationWarning")
                || line.contains("deprecated")
                || line.contains("ignore"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn clamp_percent(percent: u32) -> u8 {
    u8::try_from(percent.min(100)).unwrap_or(100)
}

fn work_dir_name(sanitized: &str) -> String {
    let timestamp = OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .format(format_description!("[year][month][day]_[hour][minute][second]"))
        .unwrap_or_default();
    let name = format!("temp_{sanitized}_{timestamp}");
    if name.len() <= MAX_WORK_DIR_LEN {
        return name;
    }
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("temp_{timestamp}_{}", &suffix[..8])
}

fn wait_captured(
    mut child: Child,
    timeout: Duration,
    progress: Option<&Sender<SeparationProgress>>,
) -> io::Result<CapturedRun> {
    let stdout = child
        .stdout
        .take()
        .map(|stream| spawn_line_reader(stream, progress.cloned()));
    let stderr = child
        .stderr
        .take()
        .map(|stream| spawn_line_reader(stream, progress.cloned()));

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break Some(status);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            break None;
        }
        thread::sleep(POLL_INTERVAL);
    };

    if status.is_none() {
        return Ok(CapturedRun {
            status,
            stderr: Vec::new(),
            stdout: Vec::new(),
        });
    }

    let collect = |handle: Option<JoinHandle<Vec<String>>>| {
        handle
            .map(|handle| handle.join().unwrap_or_default())
            .unwrap_or_default()
    };
    Ok(CapturedRun {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

fn spawn_line_reader<R: Read + Send + 'static>(
    stream: R,
    progress: Option<Sender<SeparationProgress>>,
) -> JoinHandle<Vec<String>> {
    thread::spawn(move || {
        let mut lines = Vec::new();
        for line in BufReader::new(stream).lines().map_while(|line| line.ok()) {
            if let Some(progress) = &progress
                && let Some(update) = parse_progress_line(&line)
            {
                let _ = progress.send(update);
            }
            lines.push(line);
        }
        lines
    })
}

fn move_wav_files(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let source = entry?.path();
        let is_wav = source
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));
        if !is_wav {
            continue;
        }
        let Some(name) = source.file_name() else {
            continue;
        };
        let target = to.join(name);
        if target.exists() {
            fs::remove_file(&target)?;
        }
        if fs::rename(&source, &target).is_err() {
            fs::copy(&source, &target)?;
            fs::remove_file(&source)?;
        }
    }
    Ok(())
}

fn verify_outputs(paths: &StemPaths) -> Result<(), SeparationError> {
    if !paths.exist() {
        return Err(SeparationError::OutputsMissing {
            expected: vec![paths.vocals.clone(), paths.accompaniment.clone()],
        });
    }
    for path in [&paths.vocals, &paths.accompaniment] {
        let size = fs::metadata(path)?.len();
        if size == 0 {
            return Err(SeparationError::EmptyOutput {
                path: path.clone(),
                size,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use tempfile::tempdir;

    #[test]
    fn sanitize_replaces_special_characters_and_collapses_underscores() {
        assert_eq!(
            sanitize_file_name(Some("Song(Live)[2020]&Friends!")),
            "Song_Live_2020_Friends"
        );
        assert_eq!(sanitize_file_name(Some("a<b>c:d")), "a_b_c_d");
        assert_eq!(sanitize_file_name(Some("__x__")), "x");
    }

    #[test]
    fn sanitize_handles_empty_and_missing_names() {
        assert_eq!(sanitize_file_name(None), "unknown");
        assert_eq!(sanitize_file_name(Some("")), "unknown");
        assert_eq!(sanitize_file_name(Some("()[]")), "audio_file");
    }

    #[test]
    fn sanitize_caps_length_and_trims_trailing_underscore() {
        let name = "abcdefghijklmnopqrstuvwxyz012(remix)";
        let sanitized = sanitize_file_name(Some(name));
        assert_eq!(sanitized, "abcdefghijklmnopqrstuvwxyz012");
        assert!(sanitized.chars().count() <= 30);
    }

    #[test]
    fn progress_lines_are_parsed() {
        let percent = parse_progress_line("Progress: 34%").expect("percent");
        assert_eq!(percent.percentage, Some(34));

        let fraction = parse_progress_line("chunk [3/4]").expect("fraction");
        assert_eq!(fraction.percentage, Some(75));
        assert_eq!(fraction.message, "Processing... 3/4 (75%)");

        assert_eq!(
            parse_progress_line("Loading model weights")
                .expect("model")
                .percentage,
            Some(10)
        );
        assert_eq!(
            parse_progress_line("Separating stems")
                .expect("separating")
                .percentage,
            None
        );
        assert_eq!(
            parse_progress_line("Saving output").expect("saving").percentage,
            Some(80)
        );
        assert_eq!(
            parse_progress_line("Separation processing completed!")
                .expect("done")
                .percentage,
            Some(90)
        );
        assert_eq!(parse_progress_line("hello"), None);
        assert_eq!(parse_progress_line(""), None);
        assert_eq!(parse_progress_line("[1/0]"), None);
    }

    #[test]
    fn percentages_are_capped() {
        assert_eq!(
            parse_progress_line("1000%").expect("percent").percentage,
            Some(100)
        );
    }

    #[test]
    fn warnings_are_filtered_from_diagnostics() {
        let stderr = "UserWarning: old api\nreal failure\n\nWARNING something\nthis is deprecated\nmodel missing";
        assert_eq!(filter_warnings(stderr), "real failure\nmodel missing");
    }

    #[test]
    fn stem_paths_use_unsanitized_file_stem() {
        let paths = StemPaths::for_input(Path::new("/music/My Song (Live).mp3"), Path::new("/stems"));
        assert_eq!(
            paths.vocals,
            Path::new("/stems/My Song (Live)").join(VOCALS_FILE)
        );
        assert_eq!(
            paths.accompaniment,
            Path::new("/stems/My Song (Live)").join(ACCOMPANIMENT_FILE)
        );
    }

    #[test]
    fn stems_exist_requires_both_files() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("track.mp3");
        let paths = StemPaths::for_input(&input, dir.path());
        fs::create_dir_all(paths.dir().expect("dir")).expect("mkdir");
        fs::write(&paths.vocals, b"v").expect("vocals");
        assert!(!stems_exist(&input, dir.path()));
        fs::write(&paths.accompaniment, b"a").expect("accompaniment");
        assert!(stems_exist(&input, dir.path()));
    }

    #[test]
    fn missing_input_is_reported_before_spawning() {
        let dir = tempdir().expect("tempdir");
        let separator = ProcessStemSeparator::new("definitely-not-a-program", "x.py", Duration::from_secs(1));
        let (tx, _rx) = mpsc::channel();
        let err = separator
            .separate(&dir.path().join("absent.mp3"), dir.path(), &tx)
            .expect_err("missing input");
        assert!(matches!(err, SeparationError::InputMissing(_)));
    }

    #[test]
    fn missing_script_is_not_available() {
        let separator =
            ProcessStemSeparator::new("sh", "/nonexistent/wrapper.py", Duration::from_secs(1));
        assert!(!separator.is_available());
        assert!(separator.setup_info().contains("Script Exists: false"));
    }

    #[cfg(unix)]
    mod process {
        use super::*;

        fn script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("separator.sh");
            fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("script");
            path
        }

        fn input(dir: &Path) -> PathBuf {
            let path = dir.join("song.mp3");
            fs::write(&path, b"not really audio").expect("input");
            path
        }

        #[test]
        fn successful_run_moves_stems_into_place() {
            let dir = tempdir().expect("tempdir");
            let script = script(
                dir.path(),
                r#"mkdir -p "$2/song"
echo "Progress: 40%"
printf 'v' > "$2/song/vocals.wav"
printf 'a' > "$2/song/accompaniment.wav""#,
            );
            let out = dir.path().join("stems");
            let separator = ProcessStemSeparator::new("sh", script, Duration::from_secs(20));
            let (tx, rx) = mpsc::channel();

            let paths = separator
                .separate(&input(dir.path()), &out, &tx)
                .expect("separation");

            assert_eq!(paths, StemPaths::for_input(&dir.path().join("song.mp3"), &out));
            assert!(paths.exist());
            let updates: Vec<SeparationProgress> = rx.try_iter().collect();
            assert!(updates.iter().any(|update| update.percentage == Some(40)));
            let last = updates.last().expect("final update");
            assert!(last.is_completed && !last.is_error);
            let leftovers = fs::read_dir(&out)
                .expect("read out")
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_name().to_string_lossy().starts_with("temp_"))
                .count();
            assert_eq!(leftovers, 0);
        }

        #[test]
        fn non_zero_exit_reports_filtered_stderr() {
            let dir = tempdir().expect("tempdir");
            let script = script(
                dir.path(),
                "echo 'UserWarning: noisy' >&2\necho 'model download failed' >&2\nexit 3",
            );
            let separator = ProcessStemSeparator::new("sh", script, Duration::from_secs(20));
            let (tx, _rx) = mpsc::channel();

            let err = separator
                .separate(&input(dir.path()), dir.path(), &tx)
                .expect_err("failure");
            match err {
                SeparationError::ProcessFailed { code, stderr } => {
                    assert_eq!(code, Some(3));
                    assert_eq!(stderr, "model download failed");
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        #[test]
        fn clean_exit_without_outputs_is_an_error() {
            let dir = tempdir().expect("tempdir");
            let script = script(dir.path(), "exit 0");
            let separator = ProcessStemSeparator::new("sh", script, Duration::from_secs(20));
            let (tx, _rx) = mpsc::channel();

            let err = separator
                .separate(&input(dir.path()), dir.path(), &tx)
                .expect_err("missing outputs");
            assert!(matches!(
                err,
                SeparationError::OutputsMissing { ref expected } if expected.len() == 2
            ));
        }

        #[test]
        fn empty_stem_file_is_an_error() {
            let dir = tempdir().expect("tempdir");
            let script = script(
                dir.path(),
                r#"mkdir -p "$2/song"
: > "$2/song/vocals.wav"
printf 'a' > "$2/song/accompaniment.wav""#,
            );
            let separator = ProcessStemSeparator::new("sh", script, Duration::from_secs(20));
            let (tx, _rx) = mpsc::channel();

            let err = separator
                .separate(&input(dir.path()), dir.path(), &tx)
                .expect_err("empty output");
            assert!(matches!(err, SeparationError::EmptyOutput { size: 0, .. }));
        }

        #[test]
        fn slow_separator_is_killed_after_timeout() {
            let dir = tempdir().expect("tempdir");
            let script = script(dir.path(), "exec sleep 5");
            let separator = ProcessStemSeparator::new("sh", script, Duration::from_millis(300));
            let (tx, _rx) = mpsc::channel();

            let started = Instant::now();
            let err = separator
                .separate(&input(dir.path()), dir.path(), &tx)
                .expect_err("timeout");
            assert!(matches!(err, SeparationError::TimedOut { .. }));
            assert!(started.elapsed() < Duration::from_secs(4));
        }

        #[test]
        fn help_probe_recognizes_separator() {
            let dir = tempdir().expect("tempdir");
            let script = script(
                dir.path(),
                r#"echo "usage: Separate audio into vocals and accompaniment"
exit 1"#,
            );
            let separator = ProcessStemSeparator::new("sh", script, Duration::from_secs(20));
            assert!(separator.is_available());
            assert!(separator.setup_info().contains("Test Exit Code: 1"));
        }

        #[test]
        fn help_probe_rejects_unrelated_program() {
            let dir = tempdir().expect("tempdir");
            let script = script(dir.path(), "echo hello\nexit 0");
            let separator = ProcessStemSeparator::new("sh", script, Duration::from_secs(20));
            assert!(!separator.is_available());
        }
    }
}
