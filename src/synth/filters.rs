//! Resonators and fixed filters for the formant synthesis graph.
//!
//! The workhorse is a two-pole resonator whose coefficients come from a
//! centre frequency and bandwidth. The cascade bank chains six of them (plus
//! a nasal pole/zero pair) to model the vocal tract for voiced sound; the
//! parallel bank sums six independently tuned ones for frication and bursts.
//! A fixed +6 dB high shelf brightens the top end and a DC blocker keeps the
//! radiated waveform centred.
use crate::frame::{Frame, FrameParam as P};
use std::f64::consts::{PI, TAU};

pub(crate) fn lerp(old: f64, new: f64, ratio: f64) -> f64 {
    old + ((new - old) * ratio)
}

/// Two-pole resonator, optionally inverted into an anti-resonator (used for
/// the nasal zero). Coefficients are recomputed only when the requested
/// frequency or bandwidth actually changes.
#[derive(Debug, Clone)]
pub struct Resonator {
    sample_rate: f64,
    anti: bool,
    configured: bool,
    frequency: f64,
    bandwidth: f64,
    a: f64,
    b: f64,
    c: f64,
    p1: f64,
    p2: f64,
}

impl Resonator {
    pub fn new(sample_rate: f64) -> Self {
        Self::build(sample_rate, false)
    }

    /// Anti-resonator: the transfer function is inverted and the feedback
    /// taps run off the input line instead of the output line.
    pub fn new_anti(sample_rate: f64) -> Self {
        Self::build(sample_rate, true)
    }

    fn build(sample_rate: f64, anti: bool) -> Self {
        Resonator {
            sample_rate,
            anti,
            configured: false,
            frequency: 0.0,
            bandwidth: 0.0,
            a: 0.0,
            b: 0.0,
            c: 0.0,
            p1: 0.0,
            p2: 0.0,
        }
    }

    pub fn set_params(&mut self, frequency: f64, bandwidth: f64) {
        if self.configured && frequency == self.frequency && bandwidth == self.bandwidth {
            return;
        }
        self.frequency = frequency;
        self.bandwidth = bandwidth;

        let r = (-PI / self.sample_rate * bandwidth).exp();
        self.c = -(r * r);
        self.b = r * ((TAU / self.sample_rate) * frequency).cos() * 2.0;
        self.a = 1.0 - self.b - self.c;
        if self.anti && frequency != 0.0 {
            self.a = 1.0 / self.a;
            self.c *= -self.a;
            self.b *= -self.a;
        }
        self.configured = true;
    }

    pub fn resonate(&mut self, input: f64, frequency: f64, bandwidth: f64) -> f64 {
        self.set_params(frequency, bandwidth);
        let out = (self.a * input) + (self.b * self.p1) + (self.c * self.p2);
        self.p2 = self.p1;
        self.p1 = if self.anti { input } else { out };
        out
    }

    pub fn reset(&mut self) {
        self.p1 = 0.0;
        self.p2 = 0.0;
        self.configured = false;
    }
}

/// The cascade vocal-tract model: nasal zero, nasal pole mix, then the six
/// oral formants from the top down.
#[derive(Debug, Clone)]
pub struct CascadeFilter {
    r1: Resonator,
    r2: Resonator,
    r3: Resonator,
    r4: Resonator,
    r5: Resonator,
    r6: Resonator,
    rn0: Resonator,
    rnp: Resonator,
}

impl CascadeFilter {
    pub fn new(sample_rate: f64) -> Self {
        CascadeFilter {
            r1: Resonator::new(sample_rate),
            r2: Resonator::new(sample_rate),
            r3: Resonator::new(sample_rate),
            r4: Resonator::new(sample_rate),
            r5: Resonator::new(sample_rate),
            r6: Resonator::new(sample_rate),
            rn0: Resonator::new_anti(sample_rate),
            rnp: Resonator::new(sample_rate),
        }
    }

    pub fn process(&mut self, f: &Frame, input: f64) -> f64 {
        let input = input / 2.0;
        let n0 = self.rn0.resonate(input, f[P::CfN0], f[P::CbN0]);
        let mut out = lerp(input, self.rnp.resonate(n0, f[P::CfNP], f[P::CbNP]), f[P::CaNP]);
        out = self.r6.resonate(out, f[P::Cf6], f[P::Cb6]);
        out = self.r5.resonate(out, f[P::Cf5], f[P::Cb5]);
        out = self.r4.resonate(out, f[P::Cf4], f[P::Cb4]);
        out = self.r3.resonate(out, f[P::Cf3], f[P::Cb3]);
        out = self.r2.resonate(out, f[P::Cf2], f[P::Cb2]);
        out = self.r1.resonate(out, f[P::Cf1], f[P::Cb1]);
        out
    }

    pub fn reset(&mut self) {
        for r in [
            &mut self.r1,
            &mut self.r2,
            &mut self.r3,
            &mut self.r4,
            &mut self.r5,
            &mut self.r6,
            &mut self.rn0,
            &mut self.rnp,
        ] {
            r.reset();
        }
    }
}

/// The parallel bank: each resonator contributes its bandpass component
/// scaled by the frame's per-formant amplitude, with a bypass mix for flat
/// spectra.
#[derive(Debug, Clone)]
pub struct ParallelFilter {
    r1: Resonator,
    r2: Resonator,
    r3: Resonator,
    r4: Resonator,
    r5: Resonator,
    r6: Resonator,
}

impl ParallelFilter {
    pub fn new(sample_rate: f64) -> Self {
        ParallelFilter {
            r1: Resonator::new(sample_rate),
            r2: Resonator::new(sample_rate),
            r3: Resonator::new(sample_rate),
            r4: Resonator::new(sample_rate),
            r5: Resonator::new(sample_rate),
            r6: Resonator::new(sample_rate),
        }
    }

    pub fn process(&mut self, f: &Frame, input: f64) -> f64 {
        let input = input / 2.0;
        let mut out = 0.0;
        out += (self.r1.resonate(input, f[P::Pf1], f[P::Pb1]) - input) * f[P::Pa1];
        out += (self.r2.resonate(input, f[P::Pf2], f[P::Pb2]) - input) * f[P::Pa2];
        out += (self.r3.resonate(input, f[P::Pf3], f[P::Pb3]) - input) * f[P::Pa3];
        out += (self.r4.resonate(input, f[P::Pf4], f[P::Pb4]) - input) * f[P::Pa4];
        out += (self.r5.resonate(input, f[P::Pf5], f[P::Pb5]) - input) * f[P::Pa5];
        out += (self.r6.resonate(input, f[P::Pf6], f[P::Pb6]) - input) * f[P::Pa6];
        lerp(out, input, f[P::ParallelBypass])
    }

    pub fn reset(&mut self) {
        for r in [
            &mut self.r1,
            &mut self.r2,
            &mut self.r3,
            &mut self.r4,
            &mut self.r5,
            &mut self.r6,
        ] {
            r.reset();
        }
    }
}

/// Fixed high-shelf biquad (Audio EQ Cookbook): +6 dB above 2 kHz, Q 0.7.
#[derive(Debug, Clone)]
pub struct HighShelf {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    in1: f64,
    in2: f64,
    out1: f64,
    out2: f64,
}

impl HighShelf {
    pub fn new(sample_rate: f64) -> Self {
        Self::with_params(sample_rate, 2000.0, 6.0, 0.7)
    }

    fn with_params(sample_rate: f64, frequency: f64, gain_db: f64, q: f64) -> Self {
        let a = 10f64.powf(gain_db / 40.0);
        let w0 = TAU * frequency / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let a0 = (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha;
        HighShelf {
            b0: (a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha)) / a0,
            b1: (-2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0)) / a0,
            b2: (a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha)) / a0,
            a1: (2.0 * ((a - 1.0) - (a + 1.0) * cos_w0)) / a0,
            a2: ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha) / a0,
            in1: 0.0,
            in2: 0.0,
            out1: 0.0,
            out2: 0.0,
        }
    }

    pub fn process(&mut self, input: f64) -> f64 {
        let out = (self.b0 * input) + (self.b1 * self.in1) + (self.b2 * self.in2)
            - (self.a1 * self.out1)
            - (self.a2 * self.out2);
        self.in2 = self.in1;
        self.in1 = input;
        self.out2 = self.out1;
        self.out1 = out;
        out
    }

    pub fn reset(&mut self) {
        self.in1 = 0.0;
        self.in2 = 0.0;
        self.out1 = 0.0;
        self.out2 = 0.0;
    }
}

/// One-pole DC blocker, pole at 0.9995.
#[derive(Debug, Clone, Default)]
pub struct DcBlocker {
    last_in: f64,
    last_out: f64,
}

impl DcBlocker {
    const POLE: f64 = 0.9995;

    pub fn process(&mut self, input: f64) -> f64 {
        let out = input - self.last_in + (Self::POLE * self.last_out);
        self.last_in = input;
        self.last_out = out;
        out
    }

    pub fn reset(&mut self) {
        self.last_in = 0.0;
        self.last_out = 0.0;
    }
}
