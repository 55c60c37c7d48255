#![doc = include_str!("../README.md")]
use hound::{SampleFormat, WavSpec};
use std::env;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::{Layer, Registry};

pub mod engine;
pub mod frame;
pub mod intonation;
pub mod ipa_normaliser;
pub mod phonemes;
pub mod planner;
pub mod synth;
pub mod timing;
pub mod tokeniser;
pub mod voice;

pub use engine::{
    render, AudioSink, BufferSink, IpaPassthrough, Phonemizer, Speech, SpeechCommand, SpeechEvent,
    SpeechSettings,
};
pub use frame::{Frame, FrameParam};
pub use ipa_normaliser::LanguageTag;
pub use phonemes::PhonemeTable;
pub use synth::{SpeechPlayer, SAMPLE_RATE};

/// WAV format for everything this crate emits.
pub const WAV_SPEC: WavSpec = WavSpec {
    channels: 1,
    sample_rate: SAMPLE_RATE,
    bits_per_sample: 16,
    sample_format: SampleFormat::Int,
};

/// Convenience function to setup logging for any binaries we create.
/// Defaults the binary and the library crate to `info` logging.
pub fn setup_logging() {
    let filter = match env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_env("RUST_LOG"),
        _ => EnvFilter::new("formant_tts=info,app=info"),
    };

    let fmt = tracing_subscriber::fmt::Layer::default();

    let subscriber = filter.and_then(fmt).with_subscriber(Registry::default());

    tracing::subscriber::set_global_default(subscriber).unwrap();
}
