//! The sample-accurate synthesis engine: a frame queue feeding a Klatt-style
//! DSP graph.
//!
//! The queue is the only structure shared between threads. The planner
//! enqueues frames with durations (milliseconds, converted to samples here);
//! the synthesis side pops one entry at a time and owns it privately until
//! its samples are consumed, so the per-sample loop never takes a lock. A
//! purge drops everything queued so far and raises a flag the sample loop
//! checks (one atomic load, still no lock) so the in-flight entry's
//! remainder is dropped too.
//!
//! Consecutive frames cross-fade linearly over the incoming entry's fade
//! window; within an entry the voice pitch additionally ramps from the
//! frame's `voicePitch` to its `endVoicePitch`.
use crate::frame::{Frame, FrameParam as P};
use anyhow::ensure;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub mod filters;
pub mod source;

use filters::{CascadeFilter, DcBlocker, HighShelf, ParallelFilter};
use source::{NoiseGenerator, VoiceGenerator};

/// The only output rate the engine is tuned for.
pub const SAMPLE_RATE: u32 = 16_000;

/// Output scaling to signed 16-bit, as calibrated for the filter graph.
const INT16_SCALE: f64 = 5000.0;

/// Frication noise pre-scale.
const FRICATION_SCALE: f64 = 0.175;

/// `preFormantGain` smoothing time constants.
const PRE_GAIN_ATTACK_MS: f64 = 1.0;
const PRE_GAIN_RELEASE_MS: f64 = 0.5;

#[derive(Debug, Clone)]
struct QueueEntry {
    /// `None` is a silence entry.
    frame: Option<Frame>,
    min_samples: usize,
    fade_samples: usize,
    user_index: Option<i32>,
}

/// Thread-safe FIFO of pending frames. Cheap to share across threads via
/// `Arc`; the DSP side holds the same queue inside its `SpeechPlayer`.
#[derive(Debug)]
pub struct FrameQueue {
    entries: Mutex<VecDeque<QueueEntry>>,
    purge_pending: AtomicBool,
    sample_rate: u32,
}

impl FrameQueue {
    fn new(sample_rate: u32) -> Self {
        FrameQueue {
            entries: Mutex::new(VecDeque::new()),
            purge_pending: AtomicBool::new(false),
            sample_rate,
        }
    }

    fn ms_to_samples(&self, ms: f64) -> usize {
        ((ms.max(0.0) * self.sample_rate as f64) / 1000.0).round() as usize
    }

    /// Enqueues one frame. Durations are in milliseconds. `purge` drops all
    /// previously queued entries (and the synthesizer's in-flight entry)
    /// before inserting this one.
    pub fn queue_frame(
        &self,
        frame: Option<Frame>,
        min_ms: f64,
        fade_ms: f64,
        user_index: Option<i32>,
        purge: bool,
    ) {
        let entry = QueueEntry {
            frame,
            min_samples: self.ms_to_samples(min_ms),
            fade_samples: self.ms_to_samples(fade_ms),
            user_index,
        };
        let mut entries = self.entries.lock().expect("frame queue poisoned");
        if purge {
            entries.clear();
            self.purge_pending.store(true, Ordering::Release);
        }
        entries.push_back(entry);
    }

    fn pop(&self) -> Option<QueueEntry> {
        self.entries.lock().expect("frame queue poisoned").pop_front()
    }

    /// Number of queued (not yet started) entries.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("frame queue poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take_purge(&self) -> bool {
        self.purge_pending.swap(false, Ordering::AcqRel)
    }
}

struct ActiveEntry {
    /// Cross-fade / pitch-ramp target. Silence entries get the previous
    /// frame with all source amplitudes zeroed so the fade stays click-free.
    target: Frame,
    min_samples: usize,
    fade_samples: usize,
    user_index: Option<i32>,
    pos: usize,
}

/// The synthesis engine. Owns the whole DSP graph plus one end of the frame
/// queue; `queue()` hands out the other end for the producing thread.
pub struct SpeechPlayer {
    sample_rate: u32,
    queue: Arc<FrameQueue>,
    voice: VoiceGenerator,
    frication: NoiseGenerator,
    cascade: CascadeFilter,
    parallel: ParallelFilter,
    high_shelf: HighShelf,
    dc_blocker: DcBlocker,
    attack_alpha: f64,
    release_alpha: f64,
    smoothed_pre_gain: f64,
    prev_frame: Frame,
    current: Option<ActiveEntry>,
    last_index: i32,
}

impl SpeechPlayer {
    /// Creates an engine for the given sample rate (16 kHz supported).
    pub fn new(sample_rate: u32) -> anyhow::Result<Self> {
        ensure!(sample_rate > 0, "sample rate must be positive");
        let sr = sample_rate as f64;
        let alpha = |ms: f64| 1.0 - (-1.0 / (sr * (ms * 0.001))).exp();
        Ok(SpeechPlayer {
            sample_rate,
            queue: Arc::new(FrameQueue::new(sample_rate)),
            voice: VoiceGenerator::new(sr),
            frication: NoiseGenerator::new(0xf71c),
            cascade: CascadeFilter::new(sr),
            parallel: ParallelFilter::new(sr),
            high_shelf: HighShelf::new(sr),
            dc_blocker: DcBlocker::default(),
            attack_alpha: alpha(PRE_GAIN_ATTACK_MS),
            release_alpha: alpha(PRE_GAIN_RELEASE_MS),
            smoothed_pre_gain: 0.0,
            prev_frame: Frame::default(),
            current: None,
            last_index: -1,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The producer's handle onto the frame queue.
    pub fn queue(&self) -> Arc<FrameQueue> {
        Arc::clone(&self.queue)
    }

    /// The last user index whose entry completed since the previous call;
    /// −1 if none. Querying resets it.
    pub fn take_last_index(&mut self) -> i32 {
        std::mem::replace(&mut self.last_index, -1)
    }

    /// Fills `out` with up to `out.len()` samples, returning how many were
    /// produced. Returns 0 once the queue is drained and no entry is in
    /// flight.
    pub fn synthesize(&mut self, out: &mut [i16]) -> usize {
        let mut produced = 0;
        while produced < out.len() {
            if self.queue.take_purge() {
                // Drop the in-flight remainder and snap all state so
                // cancelled speech doesn't bleed into what follows, not even
                // as filter ring-out.
                self.current = None;
                self.prev_frame = Frame::default();
                self.voice.reset();
                self.cascade.reset();
                self.parallel.reset();
                self.high_shelf.reset();
                self.dc_blocker.reset();
                self.smoothed_pre_gain = 0.0;
            }
            if self.current.is_none() {
                let Some(entry) = self.queue.pop() else {
                    break;
                };
                let target = match entry.frame {
                    Some(frame) => frame,
                    None => self.prev_frame.silenced(),
                };
                self.current = Some(ActiveEntry {
                    target,
                    min_samples: entry.min_samples,
                    fade_samples: entry.fade_samples,
                    user_index: entry.user_index,
                    pos: 0,
                });
            }

            let entry = self.current.as_mut().expect("entry was just installed");
            if entry.min_samples == 0 {
                // Zero-length entry: nothing to render, but its index and
                // its parameters still take effect.
                let finished = self.current.take().expect("entry in flight");
                self.finish_entry(finished);
                continue;
            }

            let mut frame = if entry.pos < entry.fade_samples {
                let ratio = entry.pos as f64 / entry.fade_samples as f64;
                Frame::lerp(&self.prev_frame, &entry.target, ratio)
            } else {
                entry.target
            };
            // Intra-entry pitch ramp.
            let progress = entry.pos as f64 / entry.min_samples as f64;
            frame[P::VoicePitch] = filters::lerp(
                frame[P::VoicePitch],
                frame[P::EndVoicePitch],
                progress,
            );

            // Smooth preFormantGain: fast attack, faster release.
            let target_gain = frame[P::PreFormantGain];
            let alpha = if target_gain > self.smoothed_pre_gain {
                self.attack_alpha
            } else {
                self.release_alpha
            };
            self.smoothed_pre_gain += (target_gain - self.smoothed_pre_gain) * alpha;

            let voice = self.voice.next(&frame);
            let cascade_out = self
                .cascade
                .process(&frame, voice * self.smoothed_pre_gain);

            let frication =
                self.frication.next() * FRICATION_SCALE * frame[P::FricationAmplitude];
            let parallel_out = self
                .parallel
                .process(&frame, frication * self.smoothed_pre_gain);

            let mixed = (cascade_out + parallel_out) * frame[P::OutputGain];
            let blocked = self.dc_blocker.process(mixed);
            let sample = self.high_shelf.process(blocked);

            out[produced] = (sample * INT16_SCALE).clamp(-32_767.0, 32_767.0) as i16;
            produced += 1;

            entry.pos += 1;
            if entry.pos >= entry.min_samples {
                let finished = self.current.take().expect("entry in flight");
                self.finish_entry(finished);
            }
        }
        produced
    }

    fn finish_entry(&mut self, entry: ActiveEntry) {
        self.prev_frame = entry.target;
        if let Some(index) = entry.user_index {
            self.last_index = index;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vowel_frame() -> Frame {
        let mut f = Frame::default();
        for (p, v) in [
            (P::VoicePitch, 100.0),
            (P::EndVoicePitch, 100.0),
            (P::VoiceAmplitude, 1.0),
            (P::PreFormantGain, 1.0),
            (P::OutputGain, 2.0),
            (P::Cf1, 660.0),
            (P::Cf2, 1700.0),
            (P::Cf3, 2400.0),
            (P::Cf4, 3300.0),
            (P::Cf5, 3750.0),
            (P::Cf6, 4900.0),
            (P::Cb1, 70.0),
            (P::Cb2, 150.0),
            (P::Cb3, 200.0),
            (P::Cb4, 200.0),
            (P::Cb5, 200.0),
            (P::Cb6, 1000.0),
            (P::CfN0, 250.0),
            (P::CbN0, 100.0),
            (P::CfNP, 250.0),
            (P::CbNP, 100.0),
        ] {
            f[p] = v;
        }
        f
    }

    #[test]
    fn ms_to_samples_rounds() {
        let q = FrameQueue::new(16_000);
        assert_eq!(q.ms_to_samples(10.0), 160);
        assert_eq!(q.ms_to_samples(0.001), 0);
        assert_eq!(q.ms_to_samples(-5.0), 0);
        // 10.03 ms at 16 kHz is 160.48 samples -> 160.
        assert_eq!(q.ms_to_samples(10.03), 160);
        assert_eq!(q.ms_to_samples(10.04), 161);
    }

    #[test]
    fn empty_queue_produces_nothing() {
        let mut player = SpeechPlayer::new(SAMPLE_RATE).unwrap();
        let mut block = [0i16; 64];
        assert_eq!(player.synthesize(&mut block), 0);
    }

    #[test]
    fn silence_frames_render_as_zeros() {
        let mut player = SpeechPlayer::new(SAMPLE_RATE).unwrap();
        player.queue().queue_frame(None, 10.0, 5.0, None, false);
        let mut block = [0i16; 512];
        let n = player.synthesize(&mut block);
        assert_eq!(n, 160);
        assert!(block[..n].iter().all(|&s| s == 0));
    }

    #[test]
    fn voiced_frame_produces_audio() {
        let mut player = SpeechPlayer::new(SAMPLE_RATE).unwrap();
        player
            .queue()
            .queue_frame(Some(vowel_frame()), 100.0, 5.0, None, false);
        let mut block = vec![0i16; 16_000];
        let n = player.synthesize(&mut block);
        assert_eq!(n, 1600);
        let energy: i64 = block[..n].iter().map(|&s| (s as i64).pow(2)).sum();
        assert!(energy > 0);
        assert!(block[..n].iter().all(|&s| s > i16::MIN));
    }

    #[test]
    fn indices_report_in_fifo_order() {
        let mut player = SpeechPlayer::new(SAMPLE_RATE).unwrap();
        let queue = player.queue();
        queue.queue_frame(None, 10.0, 0.0, Some(1), false);
        queue.queue_frame(None, 10.0, 0.0, Some(2), false);
        queue.queue_frame(None, 10.0, 0.0, Some(3), false);

        let mut block = [0i16; 160];
        assert_eq!(player.synthesize(&mut block), 160);
        assert_eq!(player.take_last_index(), 1);
        // Querying resets to -1.
        assert_eq!(player.take_last_index(), -1);

        // Consuming two entries in one block reports the later index.
        let mut block = [0i16; 320];
        assert_eq!(player.synthesize(&mut block), 320);
        assert_eq!(player.take_last_index(), 3);
    }

    #[test]
    fn purge_drops_earlier_entries_and_their_indices() {
        let mut player = SpeechPlayer::new(SAMPLE_RATE).unwrap();
        let queue = player.queue();
        queue.queue_frame(Some(vowel_frame()), 50.0, 0.0, Some(1), false);
        queue.queue_frame(Some(vowel_frame()), 50.0, 0.0, Some(2), false);

        // Start entry 1 but leave it in flight.
        let mut block = [0i16; 100];
        assert_eq!(player.synthesize(&mut block), 100);

        queue.queue_frame(None, 10.0, 0.0, Some(9), true);

        // Only the purge entry remains: 160 samples, index 9.
        let mut block = [0i16; 4096];
        let n = player.synthesize(&mut block);
        assert_eq!(n, 160);
        assert_eq!(player.take_last_index(), 9);
    }

    #[test]
    fn purge_snaps_instead_of_fading() {
        let mut player = SpeechPlayer::new(SAMPLE_RATE).unwrap();
        let queue = player.queue();
        queue.queue_frame(Some(vowel_frame()), 50.0, 0.0, None, false);
        let mut block = [0i16; 400];
        player.synthesize(&mut block);

        // Purge and play silence with a long fade window: since the state
        // snapped, no vowel parameters leak through the fade.
        queue.queue_frame(None, 20.0, 15.0, None, true);
        let n = player.synthesize(&mut block);
        assert_eq!(n, 320);
        assert!(block[..n].iter().all(|&s| s == 0));
    }

    #[test]
    fn cross_fade_blends_adjacent_frames() {
        let mut player = SpeechPlayer::new(SAMPLE_RATE).unwrap();
        let queue = player.queue();
        let loud = vowel_frame();
        let mut quiet = vowel_frame();
        quiet[P::VoiceAmplitude] = 0.0;
        quiet[P::AspirationAmplitude] = 0.0;

        queue.queue_frame(Some(loud), 50.0, 0.0, None, false);
        // Long fade into the quiet frame: energy decays over the window
        // rather than cutting at the boundary.
        queue.queue_frame(Some(quiet), 50.0, 40.0, None, false);

        let mut block = vec![0i16; 1600];
        let n = player.synthesize(&mut block);
        assert_eq!(n, 1600);
        let early: i64 = block[800..1000].iter().map(|&s| (s as i64).pow(2)).sum();
        let late: i64 = block[1400..1600].iter().map(|&s| (s as i64).pow(2)).sum();
        assert!(early > late, "fade did not decay: {} vs {}", early, late);
    }

    #[test]
    fn zero_duration_entry_still_reports_its_index() {
        let mut player = SpeechPlayer::new(SAMPLE_RATE).unwrap();
        let queue = player.queue();
        queue.queue_frame(None, 0.0, 0.0, Some(7), false);
        queue.queue_frame(None, 10.0, 0.0, None, false);
        let mut block = [0i16; 256];
        assert_eq!(player.synthesize(&mut block), 160);
        assert_eq!(player.take_last_index(), 7);
    }

    #[test]
    fn rejects_zero_sample_rate() {
        assert!(SpeechPlayer::new(0).is_err());
    }
}
