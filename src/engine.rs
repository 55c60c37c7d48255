//! The threaded speech engine: caller, planner and synthesizer roles.
//!
//! The caller thread owns settings and hands utterances to a background
//! planner thread over a channel, so `speak` never blocks on DSP. The
//! planner runs the linguistic pipeline and enqueues frames; a separate
//! synthesizer thread drains the frame queue in blocks, feeds the host's
//! audio sink and reports user-index and done events. The frame queue is
//! the only mutable structure the two background threads share.
//!
//! Text-to-IPA conversion is an external collaborator behind the
//! [`Phonemizer`] trait; this crate only ships a passthrough for input that
//! is already IPA.
use crate::frame::FrameParam;
use crate::intonation::ClauseType;
use crate::phonemes::PhonemeTable;
use crate::planner::{self, ClauseOptions};
use crate::synth::{FrameQueue, SpeechPlayer, SAMPLE_RATE};
use crate::voice::{self, ExtraParams};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use tracing::{debug, error, info};

/// Samples per synthesis block handed to the sink.
pub const BLOCK_SAMPLES: usize = 8192;

/// One element of a speak request.
#[derive(Clone, Debug)]
pub enum SpeechCommand {
    /// Text (or IPA, with the passthrough phonemizer) to speak.
    Text(String),
    /// An opaque marker reported back when the speech before it has been
    /// rendered to audio.
    Index(i32),
    /// Shifts the base pitch for the following text.
    PitchOffset(f64),
}

/// Events reported to the host, in audio order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpeechEvent {
    IndexReached(i32),
    Done,
}

/// The host's audio output. `feed` may block to pace the synthesizer.
pub trait AudioSink: Send {
    fn feed(&mut self, pcm: &[i16]) -> anyhow::Result<()>;
    /// Called when an utterance finishes draining.
    fn idle(&mut self) {}
    /// Immediately discard device buffers (cancel path).
    fn stop(&mut self) {}
    fn pause(&mut self, _paused: bool) {}
}

/// A sink that collects samples in memory. Useful for tests and for hosts
/// that do their own device handling.
#[derive(Default)]
pub struct BufferSink {
    samples: Arc<Mutex<Vec<i16>>>,
}

impl BufferSink {
    /// The sink and a shared handle onto everything it receives.
    pub fn new() -> (BufferSink, Arc<Mutex<Vec<i16>>>) {
        let sink = BufferSink::default();
        let samples = Arc::clone(&sink.samples);
        (sink, samples)
    }
}

impl AudioSink for BufferSink {
    fn feed(&mut self, pcm: &[i16]) -> anyhow::Result<()> {
        self.samples.lock().expect("buffer sink poisoned").extend_from_slice(pcm);
        Ok(())
    }
}

/// External grapheme-to-phoneme front-end.
pub trait Phonemizer: Send + Sync {
    fn to_ipa(&self, text: &str, language: Option<&str>) -> anyhow::Result<String>;
}

/// For hosts that already feed IPA: the identity phonemizer.
#[derive(Debug, Default, Clone, Copy)]
pub struct IpaPassthrough;

impl Phonemizer for IpaPassthrough {
    fn to_ipa(&self, text: &str, _language: Option<&str>) -> anyhow::Result<String> {
        Ok(text.to_string())
    }
}

/// Host-facing control values, all on 0..100 scales, plus the selected
/// voice and language. The internal multipliers are derived on demand.
#[derive(Clone, Debug)]
pub struct SpeechSettings {
    pub language: Option<String>,
    pub rate: u8,
    pub pitch: u8,
    pub volume: u8,
    pub inflection: u8,
    pub voice: String,
    pub extra_params: ExtraParams,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        SpeechSettings {
            language: Some("en-us".into()),
            rate: 50,
            pitch: 50,
            volume: 90,
            inflection: 60,
            voice: "Adam".into(),
            extra_params: ExtraParams::default(),
        }
    }
}

impl SpeechSettings {
    /// Rate 0..100 to the planner's speed multiplier; 50 is 1.0.
    pub fn speed(&self) -> f64 {
        0.25 * 2f64.powf(self.rate as f64 / 25.0)
    }

    /// Pitch 0..100 (plus a per-utterance offset) to base pitch in Hz.
    pub fn base_pitch(&self, offset: f64) -> f64 {
        25.0 + 21.25 * ((self.pitch as f64 + offset) / 12.5)
    }

    /// Volume 0..100 to the preFormantGain multiplier.
    pub fn volume_scale(&self) -> f64 {
        self.volume as f64 / 75.0
    }

    /// Inflection 0..100 to the intonation scalar.
    pub fn inflection_scale(&self) -> f64 {
        self.inflection as f64 * 0.01
    }
}

/// Splits text into clauses after `.?!,:;` followed by whitespace; the
/// splitting whitespace character is dropped.
fn split_clauses(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut prev: Option<char> = None;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() && matches!(prev, Some('.' | '?' | '!' | ',' | ':' | ';')) {
            out.push(&text[start..i]);
            start = i + c.len_utf8();
        }
        prev = Some(c);
    }
    out.push(&text[start..]);
    out
}

/// Plans one speak request and enqueues all of its frames. This is the body
/// of the planner thread, also usable synchronously (see [`render`]).
fn speak_background(
    commands: &[SpeechCommand],
    settings: &SpeechSettings,
    queue: &FrameQueue,
    table: &PhonemeTable,
    phonemizer: &dyn Phonemizer,
) {
    // Adjacent text items merge into one utterance.
    let mut merged: Vec<SpeechCommand> = Vec::new();
    for cmd in commands {
        match (merged.last_mut(), cmd) {
            (Some(SpeechCommand::Text(prev)), SpeechCommand::Text(t)) => {
                prev.push(' ');
                prev.push_str(t);
            }
            _ => merged.push(cmd.clone()),
        }
    }

    let speed = settings.speed();
    let mut user_index: Option<i32> = None;
    let mut pitch_offset = 0.0;

    // A clause that produces no frames still honours its pending index with
    // a brief silent frame.
    let index_fallback = |index: Option<i32>| {
        if let Some(index) = index {
            queue.queue_frame(None, 10.0, 5.0, Some(index), false);
        }
    };

    for cmd in &merged {
        match cmd {
            SpeechCommand::PitchOffset(offset) => pitch_offset = *offset,
            SpeechCommand::Index(index) => user_index = Some(*index),
            SpeechCommand::Text(text) => {
                for chunk in split_clauses(text) {
                    let chunk = chunk.trim();
                    if chunk.is_empty() {
                        continue;
                    }
                    let last = chunk.chars().next_back();
                    let clause_type = last.and_then(ClauseType::from_char);
                    let end_pause_ms = match last {
                        Some('.' | '!' | '?') => 150.0,
                        Some(',') => 120.0,
                        _ => 100.0,
                    } / speed;

                    let ipa = match phonemizer.to_ipa(chunk, settings.language.as_deref()) {
                        Ok(ipa) => ipa,
                        Err(e) => {
                            error!("phonemizer failed on '{}': {:#}", chunk, e);
                            String::new()
                        }
                    };
                    if ipa.trim().is_empty() {
                        index_fallback(user_index.take());
                        continue;
                    }

                    let opts = ClauseOptions {
                        speed,
                        base_pitch: settings.base_pitch(pitch_offset),
                        inflection: settings.inflection_scale(),
                        clause_type: clause_type.unwrap_or_default(),
                        language: settings.language.clone(),
                    };
                    let requests = planner::generate_frames(&ipa, &opts, table);
                    if requests.is_empty() {
                        index_fallback(user_index.take());
                        continue;
                    }
                    debug!("clause '{}': {} frames", chunk, requests.len());

                    let preset = voice::preset(&settings.voice);
                    for (i, req) in requests.iter().enumerate() {
                        let frame = req.frame.map(|mut f| {
                            preset.apply(&mut f);
                            settings.extra_params.apply(&mut f);
                            f[FrameParam::PreFormantGain] *= settings.volume_scale();
                            f
                        });
                        let index = if i == 0 { user_index.take() } else { None };
                        queue.queue_frame(frame, req.duration_ms, req.fade_ms, index, false);
                    }
                    // Breathing room at the end of the clause.
                    queue.queue_frame(None, end_pause_ms, 10.0 / speed, None, false);
                }
            }
        }
    }

    // Terminal pause; carries an index that never found text.
    queue.queue_frame(None, 20.0, (10.0f64).max(10.0 / speed), user_index, false);
}

/// Renders a speak request synchronously into PCM samples. This runs the
/// same pipeline as the threaded engine on the caller's thread; it is what
/// the CLI uses to write WAV files.
pub fn render(
    commands: &[SpeechCommand],
    settings: &SpeechSettings,
    table: &PhonemeTable,
    phonemizer: &dyn Phonemizer,
) -> anyhow::Result<Vec<i16>> {
    let mut player = SpeechPlayer::new(SAMPLE_RATE)?;
    let queue = player.queue();
    speak_background(commands, settings, &queue, table, phonemizer);

    let mut out = Vec::new();
    let mut block = vec![0i16; BLOCK_SAMPLES];
    loop {
        let n = player.synthesize(&mut block);
        if n == 0 {
            break;
        }
        out.extend_from_slice(&block[..n]);
    }
    Ok(out)
}

struct AudioState {
    speaking: bool,
    /// Bumped on every `start_speaking`. The synthesizer thread only clears
    /// `speaking` if no new utterance arrived while it was draining, so a
    /// wakeup can't be lost to that race.
    generation: u64,
    shutdown: bool,
}

struct AudioShared {
    state: Mutex<AudioState>,
    wake: Condvar,
}

impl AudioShared {
    fn new() -> Self {
        AudioShared {
            state: Mutex::new(AudioState {
                speaking: false,
                generation: 0,
                shutdown: false,
            }),
            wake: Condvar::new(),
        }
    }

    fn start_speaking(&self) {
        let mut state = self.state.lock().expect("audio state poisoned");
        state.speaking = true;
        state.generation += 1;
        self.wake.notify_one();
    }

    fn stop_speaking(&self) {
        self.state.lock().expect("audio state poisoned").speaking = false;
        self.wake.notify_one();
    }

    fn shutdown(&self) {
        self.state.lock().expect("audio state poisoned").shutdown = true;
        self.wake.notify_all();
    }
}

/// The full three-role engine. Dropping it shuts both background threads
/// down cleanly.
pub struct Speech {
    /// Owned by the caller; the planner snapshots it per utterance.
    settings: Arc<Mutex<SpeechSettings>>,
    planner_tx: Option<mpsc::Sender<Vec<SpeechCommand>>>,
    planner_handle: Option<thread::JoinHandle<()>>,
    audio_handle: Option<thread::JoinHandle<()>>,
    shared: Arc<AudioShared>,
    queue: Arc<FrameQueue>,
    sink: Arc<Mutex<Box<dyn AudioSink>>>,
    planner_busy: Arc<AtomicBool>,
}

impl Speech {
    /// Builds an engine over the embedded phoneme table with IPA input.
    pub fn new(
        sink: Box<dyn AudioSink>,
        events: impl FnMut(SpeechEvent) + Send + 'static,
    ) -> anyhow::Result<Speech> {
        Speech::with_parts(
            Arc::new(PhonemeTable::builtin().clone()),
            Arc::new(IpaPassthrough),
            sink,
            events,
        )
    }

    /// Builds an engine with a custom table and phonemizer.
    pub fn with_parts(
        table: Arc<PhonemeTable>,
        phonemizer: Arc<dyn Phonemizer>,
        sink: Box<dyn AudioSink>,
        mut events: impl FnMut(SpeechEvent) + Send + 'static,
    ) -> anyhow::Result<Speech> {
        let mut player = SpeechPlayer::new(SAMPLE_RATE)?;
        let queue = player.queue();
        let shared = Arc::new(AudioShared::new());
        let sink: Arc<Mutex<Box<dyn AudioSink>>> = Arc::new(Mutex::new(sink));
        let settings = Arc::new(Mutex::new(SpeechSettings::default()));
        let planner_busy = Arc::new(AtomicBool::new(false));

        let (planner_tx, planner_rx) = mpsc::channel::<Vec<SpeechCommand>>();

        let planner_handle = {
            let queue = Arc::clone(&queue);
            let shared = Arc::clone(&shared);
            let busy = Arc::clone(&planner_busy);
            let settings = Arc::clone(&settings);
            thread::Builder::new()
                .name("formant-tts-planner".into())
                .spawn(move || {
                    while let Ok(commands) = planner_rx.recv() {
                        busy.store(true, Ordering::Release);
                        let snapshot = settings.lock().expect("settings poisoned").clone();
                        speak_background(
                            &commands,
                            &snapshot,
                            &queue,
                            table.as_ref(),
                            phonemizer.as_ref(),
                        );
                        busy.store(false, Ordering::Release);
                        shared.start_speaking();
                    }
                    info!("planner thread exiting");
                })?
        };

        let audio_handle = {
            let shared = Arc::clone(&shared);
            let sink = Arc::clone(&sink);
            thread::Builder::new()
                .name("formant-tts-audio".into())
                .spawn(move || {
                    let mut block = vec![0i16; BLOCK_SAMPLES];
                    loop {
                        let run_generation;
                        {
                            let mut state = shared.state.lock().expect("audio state poisoned");
                            while !state.speaking && !state.shutdown {
                                state = shared.wake.wait(state).expect("audio state poisoned");
                            }
                            if state.shutdown {
                                return;
                            }
                            run_generation = state.generation;
                        }

                        loop {
                            {
                                let state = shared.state.lock().expect("audio state poisoned");
                                if !state.speaking || state.shutdown {
                                    break;
                                }
                            }
                            let n = player.synthesize(&mut block);
                            if n == 0 {
                                break;
                            }
                            let feed = sink
                                .lock()
                                .expect("sink poisoned")
                                .feed(&block[..n]);
                            if let Err(e) = feed {
                                error!("audio sink rejected block: {:#}", e);
                                break;
                            }
                            let index = player.take_last_index();
                            if index >= 0 {
                                events(SpeechEvent::IndexReached(index));
                            }
                        }

                        let index = player.take_last_index();
                        if index >= 0 {
                            events(SpeechEvent::IndexReached(index));
                        }
                        sink.lock().expect("sink poisoned").idle();
                        events(SpeechEvent::Done);
                        let mut state = shared.state.lock().expect("audio state poisoned");
                        if state.generation == run_generation {
                            state.speaking = false;
                        }
                    }
                })?
        };

        Ok(Speech {
            settings,
            planner_tx: Some(planner_tx),
            planner_handle: Some(planner_handle),
            audio_handle: Some(audio_handle),
            shared,
            queue,
            sink,
            planner_busy,
        })
    }

    /// Queues an utterance. Never blocks on synthesis.
    pub fn speak(&self, commands: Vec<SpeechCommand>) {
        if let Some(tx) = &self.planner_tx {
            if tx.send(commands).is_err() {
                error!("planner thread is gone; dropping utterance");
            }
        }
    }

    /// Cancels everything queued and playing. The synthesizer emits `Done`
    /// for the interrupted utterance.
    pub fn cancel(&self) {
        self.queue.queue_frame(None, 20.0, 5.0, None, true);
        self.shared.stop_speaking();
        self.sink.lock().expect("sink poisoned").stop();
    }

    /// Forwarded to the sink; synthesis itself is not suspended.
    pub fn pause(&self, paused: bool) {
        self.sink.lock().expect("sink poisoned").pause(paused);
    }

    /// Whether the planner is currently working on an utterance.
    pub fn planner_busy(&self) -> bool {
        self.planner_busy.load(Ordering::Acquire)
    }

    pub fn settings(&self) -> SpeechSettings {
        self.settings.lock().expect("settings poisoned").clone()
    }

    /// Updates settings; takes effect from the next `speak`.
    pub fn update_settings(&self, update: impl FnOnce(&mut SpeechSettings)) {
        let mut settings = self.settings.lock().expect("settings poisoned");
        let old_voice = settings.voice.clone();
        update(&mut settings);
        if settings.voice != old_voice {
            // Voice change resets the per-parameter sliders.
            settings.extra_params.reset();
        }
    }
}

impl Drop for Speech {
    fn drop(&mut self) {
        self.planner_tx.take();
        self.shared.shutdown();
        if let Some(handle) = self.planner_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.audio_handle.take() {
            let _ = handle.join();
        }
    }
}
