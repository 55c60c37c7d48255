use clap::Parser;
use formant_tts::phonemes::PhonemeTable;
use formant_tts::{render, IpaPassthrough, SpeechCommand, SpeechSettings, WAV_SPEC};
use hound::WavWriter;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use unicode_segmentation::UnicodeSegmentation;

#[derive(Parser, Debug)]
pub struct Args {
    /// IPA to synthesise speech for. Stress (ˈ ˌ), length (ː) and tie (͡)
    /// marks are honoured; ASCII phoneme mnemonics are accepted too.
    #[clap(long, short)]
    input: String,
    /// Language tag guiding normalisation (e.g. en-us, en, es, pl)
    #[clap(long, default_value = "en-us")]
    language: String,
    /// Location to save the output audio file
    #[clap(short, long, default_value = "output.wav")]
    output: PathBuf,
    /// Voice preset name
    #[clap(long, default_value = "Adam")]
    voice: String,
    /// Speaking rate, 0-100 (50 is the reference rate)
    #[clap(long, default_value_t = 50)]
    rate: u8,
    /// Base pitch, 0-100
    #[clap(long, default_value_t = 50)]
    pitch: u8,
    /// Volume, 0-100
    #[clap(long, default_value_t = 90)]
    volume: u8,
    /// Intonation range, 0-100 (0 is monotone)
    #[clap(long, default_value_t = 60)]
    inflection: u8,
    /// Load a phoneme table from JSON instead of the embedded one
    #[clap(long)]
    phoneme_table: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    formant_tts::setup_logging();
    let args = Args::parse();

    let loaded;
    let table = match &args.phoneme_table {
        Some(path) => {
            loaded = PhonemeTable::open(path)?;
            &loaded
        }
        None => PhonemeTable::builtin(),
    };

    let settings = SpeechSettings {
        language: Some(args.language),
        rate: args.rate,
        pitch: args.pitch,
        volume: args.volume,
        inflection: args.inflection,
        voice: args.voice,
        ..Default::default()
    };

    info!(
        "Synthesising {} graphemes of IPA",
        args.input.graphemes(true).count()
    );
    let start = Instant::now();
    let samples = render(
        &[SpeechCommand::Text(args.input)],
        &settings,
        table,
        &IpaPassthrough,
    )?;
    let audio_length = samples.len() as f32 / WAV_SPEC.sample_rate as f32;
    info!(
        "Generated {:.2}s of audio in {:?}",
        audio_length,
        start.elapsed()
    );

    let mut wav_writer = WavWriter::create(&args.output, WAV_SPEC)?;
    let mut i16_writer = wav_writer.get_i16_writer(samples.len() as u32);
    for sample in &samples {
        i16_writer.write_sample(*sample);
    }
    i16_writer.flush()?;
    wav_writer.finalize()?;
    info!("Wrote {}", args.output.display());
    Ok(())
}
