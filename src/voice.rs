//! Voice presets and per-parameter user scaling.
//!
//! A preset is a small map of frame-parameter overrides: a bare parameter
//! name sets an absolute value, a `<name>_mul` key multiplies whatever the
//! planner produced. Absolute values apply before multipliers. Presets are
//! snapshot onto each frame on the producing thread, before enqueue, so the
//! DSP side never sees voice state change mid-frame.
//!
//! Separately, every frame parameter can be exposed to the host as a 0..100
//! slider with 50 meaning "no change"; the frame value is scaled by
//! `slider / 50` after the preset.
use crate::frame::{Frame, FrameParam, FRAME_PARAM_COUNT};
use anyhow::Context;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;

/// A named set of frame overrides.
#[derive(Clone, Debug, Default)]
pub struct VoicePreset {
    absolute: Vec<(FrameParam, f64)>,
    multipliers: Vec<(FrameParam, f64)>,
}

impl VoicePreset {
    /// Builds a preset from `(key, value)` pairs, where a key is either a
    /// frame parameter name or `<name>_mul`.
    pub fn from_pairs<'a>(
        pairs: impl IntoIterator<Item = (&'a str, f64)>,
    ) -> anyhow::Result<VoicePreset> {
        let mut preset = VoicePreset::default();
        for (key, value) in pairs {
            if let Some(name) = key.strip_suffix("_mul") {
                let param = FrameParam::from_name(name)
                    .with_context(|| format!("unknown preset multiplier '{}'", key))?;
                preset.multipliers.push((param, value));
            } else {
                let param = FrameParam::from_name(key)
                    .with_context(|| format!("unknown preset parameter '{}'", key))?;
                preset.absolute.push((param, value));
            }
        }
        Ok(preset)
    }

    /// Applies the preset: absolute overrides first, then multipliers.
    pub fn apply(&self, frame: &mut Frame) {
        for &(param, value) in &self.absolute {
            frame[param] = value;
        }
        for &(param, value) in &self.multipliers {
            frame[param] *= value;
        }
    }
}

static VOICES: Lazy<BTreeMap<&'static str, VoicePreset>> = Lazy::new(|| {
    let mut voices = BTreeMap::new();
    voices.insert(
        "Adam",
        VoicePreset::from_pairs([
            ("cb1_mul", 1.3),
            ("pa6_mul", 1.3),
            ("fricationAmplitude_mul", 0.85),
        ])
        .expect("builtin preset"),
    );
    voices.insert(
        "Benjamin",
        VoicePreset::from_pairs([
            ("cf1_mul", 1.01),
            ("cf2_mul", 1.02),
            ("cf4", 3770.0),
            ("cf5", 4100.0),
            ("cf6", 5000.0),
            ("cfNP_mul", 0.9),
            ("cb1_mul", 1.3),
            ("fricationAmplitude_mul", 0.7),
            ("pa6_mul", 1.3),
        ])
        .expect("builtin preset"),
    );
    voices.insert(
        "Caleb",
        VoicePreset::from_pairs([("aspirationAmplitude", 1.0), ("voiceAmplitude", 0.0)])
            .expect("builtin preset"),
    );
    voices.insert(
        "David",
        VoicePreset::from_pairs([
            ("voicePitch_mul", 0.75),
            ("endVoicePitch_mul", 0.75),
            ("cf1_mul", 0.75),
            ("cf2_mul", 0.85),
            ("cf3_mul", 0.85),
        ])
        .expect("builtin preset"),
    );
    voices
});

/// Names of the built-in presets, sorted.
pub fn voice_names() -> impl Iterator<Item = &'static str> {
    VOICES.keys().copied()
}

/// Looks a preset up by name; unknown names fall back to Adam.
pub fn preset(name: &str) -> &'static VoicePreset {
    VOICES
        .get(name)
        .or_else(|| VOICES.get("Adam"))
        .expect("Adam preset always exists")
}

/// One 0..100 slider per frame parameter; 50 is neutral.
#[derive(Clone, Debug)]
pub struct ExtraParams {
    values: [u8; FRAME_PARAM_COUNT],
}

impl Default for ExtraParams {
    fn default() -> Self {
        ExtraParams {
            values: [50; FRAME_PARAM_COUNT],
        }
    }
}

impl ExtraParams {
    pub fn get(&self, param: FrameParam) -> u8 {
        self.values[param as usize]
    }

    pub fn set(&mut self, param: FrameParam, value: u8) {
        self.values[param as usize] = value.min(100);
    }

    /// Back to neutral, as happens on a voice change.
    pub fn reset(&mut self) {
        self.values = [50; FRAME_PARAM_COUNT];
    }

    pub fn is_neutral(&self) -> bool {
        self.values.iter().all(|&v| v == 50)
    }

    /// Scales every frame parameter by `slider / 50`.
    pub fn apply(&self, frame: &mut Frame) {
        for &param in FrameParam::ALL {
            let slider = self.values[param as usize];
            if slider != 50 {
                frame[param] *= slider as f64 / 50.0;
            }
        }
    }
}
