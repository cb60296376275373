#![no_main]

use cadenza::audio::ScriptedOutput;
use cadenza::model::{PlayMode, Song};
use cadenza::queue::PlaybackQueue;
use cadenza::stats::{ListeningStatsTracker, ManualClock, TICK_INTERVAL};
use libfuzzer_sys::fuzz_target;
use time::OffsetDateTime;

fuzz_target!(|data: &[u8]| {
    let clock = ManualClock::new(OffsetDateTime::UNIX_EPOCH);
    let output = ScriptedOutput::new();
    let stats = ListeningStatsTracker::in_memory(Box::new(clock.clone()));
    let mut engine = PlaybackQueue::with_rng_seed(Box::new(output.clone()), stats, 0);

    let len = (data.len() % 16).max(1);
    let songs: Vec<Song> = (0..len)
        .map(|idx| Song::new(format!("track_{idx}.mp3")).with_id(format!("{idx}")))
        .collect();
    engine.set_queue(songs, 0);
    let mut added = len;

    for pair in data.chunks(2) {
        let arg = usize::from(pair.get(1).copied().unwrap_or(0));
        match pair[0] % 12 {
            0 => {
                let _ = engine.play_next();
            }
            1 => {
                let _ = engine.play_previous();
            }
            2 => engine.toggle_shuffle(),
            3 => engine.cycle_repeat(),
            4 => engine.set_play_mode(match arg % 4 {
                0 => PlayMode::Normal,
                1 => PlayMode::Shuffle,
                2 => PlayMode::RepeatAll,
                _ => PlayMode::RepeatOne,
            }),
            5 => {
                let _ = engine.play_song_at_index(arg);
            }
            6 => {
                if let Some(song) = engine.queue().get(arg % engine.queue().len().max(1)).cloned() {
                    let _ = engine.remove_from_queue(&song);
                }
            }
            7 => {
                engine.add_to_queue(Song::new(format!("extra_{added}.mp3")).with_id(format!("{added}")));
                added += 1;
            }
            8 => output.finish_current(),
            9 => engine.stop(),
            10 => {
                let _ = engine.toggle_pause();
            }
            _ => {
                clock.advance(TICK_INTERVAL);
                engine.tick();
            }
        }

        let queue_len = engine.queue().len();
        if let Some(index) = engine.current_index() {
            assert!(index < queue_len);
        }
        if engine.is_shuffle_on() && queue_len > 0 && engine.shuffle_order().len() == queue_len {
            let mut order = engine.shuffle_order().as_slice().to_vec();
            order.sort_unstable();
            assert!(order.iter().copied().eq(0..queue_len));
        }
    }
});
