//! The frame is the unit of exchange between the linguistic front-end and the
//! DSP engine: one ordered record of every numeric synthesis parameter. The
//! planner produces frames, the queue cross-fades between consecutive ones and
//! the wave generator reads them once per sample.
//!
//! Parameters are stored as a fixed array indexed by [`FrameParam`] rather
//! than as named struct fields. Everything that touches frames generically -
//! cross-fading, voice presets, the per-parameter user sliders - wants to
//! iterate over "all parameters", and a parameter enum gives us that without
//! reflection or a forest of field accessors.

use std::fmt;
use std::ops::{Index, IndexMut};

macro_rules! frame_params {
    ($($variant:ident => $name:literal,)*) => {
        /// Identifies one numeric synthesis parameter of a [`Frame`].
        ///
        /// The declaration order is the wire order of the frame record and
        /// must not be rearranged casually: the DSP engine, the phoneme data
        /// file and the voice presets all address parameters by these names.
        #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
        #[repr(usize)]
        pub enum FrameParam {
            $($variant,)*
        }

        impl FrameParam {
            /// Every parameter, in declaration order.
            pub const ALL: &'static [FrameParam] = &[$(FrameParam::$variant,)*];

            /// The external name of the parameter as used by the phoneme
            /// data file and voice preset tables.
            pub fn name(self) -> &'static str {
                match self {
                    $(FrameParam::$variant => $name,)*
                }
            }

            /// Looks a parameter up by its external name.
            pub fn from_name(name: &str) -> Option<FrameParam> {
                match name {
                    $($name => Some(FrameParam::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

frame_params! {
    VoicePitch => "voicePitch",
    VibratoPitchOffset => "vibratoPitchOffset",
    VibratoSpeed => "vibratoSpeed",
    VoiceTurbulenceAmplitude => "voiceTurbulenceAmplitude",
    GlottalOpenQuotient => "glottalOpenQuotient",
    VoiceAmplitude => "voiceAmplitude",
    AspirationAmplitude => "aspirationAmplitude",
    Cf1 => "cf1",
    Cf2 => "cf2",
    Cf3 => "cf3",
    Cf4 => "cf4",
    Cf5 => "cf5",
    Cf6 => "cf6",
    CfN0 => "cfN0",
    CfNP => "cfNP",
    Cb1 => "cb1",
    Cb2 => "cb2",
    Cb3 => "cb3",
    Cb4 => "cb4",
    Cb5 => "cb5",
    Cb6 => "cb6",
    CbN0 => "cbN0",
    CbNP => "cbNP",
    CaNP => "caNP",
    FricationAmplitude => "fricationAmplitude",
    Pf1 => "pf1",
    Pf2 => "pf2",
    Pf3 => "pf3",
    Pf4 => "pf4",
    Pf5 => "pf5",
    Pf6 => "pf6",
    Pb1 => "pb1",
    Pb2 => "pb2",
    Pb3 => "pb3",
    Pb4 => "pb4",
    Pb5 => "pb5",
    Pb6 => "pb6",
    Pa1 => "pa1",
    Pa2 => "pa2",
    Pa3 => "pa3",
    Pa4 => "pa4",
    Pa5 => "pa5",
    Pa6 => "pa6",
    ParallelBypass => "parallelBypass",
    PreFormantGain => "preFormantGain",
    OutputGain => "outputGain",
    EndVoicePitch => "endVoicePitch",
}

/// Number of numeric parameters in a frame.
pub const FRAME_PARAM_COUNT: usize = FrameParam::ALL.len();

/// One complete set of synthesis parameters.
///
/// A frame is consumed by the synthesizer for exactly its declared duration;
/// consecutive frames cross-fade linearly over the fade window (see
/// `synth::SpeechPlayer`). A default frame is all zeros, which renders as
/// silence.
#[derive(Clone, Copy, PartialEq)]
pub struct Frame {
    params: [f64; FRAME_PARAM_COUNT],
}

impl Default for Frame {
    fn default() -> Self {
        Frame {
            params: [0.0; FRAME_PARAM_COUNT],
        }
    }
}

impl Index<FrameParam> for Frame {
    type Output = f64;

    fn index(&self, p: FrameParam) -> &f64 {
        &self.params[p as usize]
    }
}

impl IndexMut<FrameParam> for Frame {
    fn index_mut(&mut self, p: FrameParam) -> &mut f64 {
        &mut self.params[p as usize]
    }
}

impl Frame {
    /// Linear interpolation of every parameter between two frames.
    /// `ratio` 0.0 yields `from`, 1.0 yields `to`.
    pub fn lerp(from: &Frame, to: &Frame, ratio: f64) -> Frame {
        let mut out = *from;
        for (o, t) in out.params.iter_mut().zip(to.params.iter()) {
            *o += (t - *o) * ratio;
        }
        out
    }

    /// A copy of this frame with all three source amplitudes zeroed. Used
    /// for silence entries so the spectral shape survives the cross-fade
    /// while the steady-state output is zero.
    pub fn silenced(&self) -> Frame {
        let mut out = *self;
        out[FrameParam::VoiceAmplitude] = 0.0;
        out[FrameParam::AspirationAmplitude] = 0.0;
        out[FrameParam::FricationAmplitude] = 0.0;
        out
    }

    /// True if every parameter is finite. Frames fed to the filter bank must
    /// uphold this; the planner guarantees it for frames built from table
    /// data.
    pub fn is_finite(&self) -> bool {
        self.params.iter().all(|x| x.is_finite())
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut map = f.debug_struct("Frame");
        for &p in FrameParam::ALL {
            // Keep the output readable: zeros dominate most frames.
            if self[p] != 0.0 {
                map.field(p.name(), &self[p]);
            }
        }
        map.finish()
    }
}
