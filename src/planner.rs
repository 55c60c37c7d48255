//! The planner walks the token stream and produces the utterance's phoneme
//! list with all linguistic annotations resolved: word and syllable
//! boundaries, stress placement, inserted aspiration after unvoiced stops,
//! silence gaps before unstressed stops, and the /h/ formant-copy rule.
//!
//! The output list then flows through the duration engine and the intonation
//! engine before being rendered to frames.
use crate::frame::{Frame, FrameParam};
use crate::intonation::{self, ClauseType};
use crate::ipa_normaliser;
use crate::phonemes::{ParamSet, PhonemeFlags, PhonemeTable};
use crate::timing;
use crate::tokeniser::{self, Token};
use tracing::warn;

/// One planned phoneme: a copy of the descriptor's synthesis parameters plus
/// the planning attributes accumulated on the way to a frame.
#[derive(Clone, Debug, Default)]
pub struct PlannedPhoneme {
    pub params: ParamSet,
    pub flags: PhonemeFlags,
    /// Source character, for diagnostics. Inserted units have none.
    pub ch: Option<char>,

    pub word_start: bool,
    pub syllable_start: bool,
    /// Stress of the syllable this phoneme starts: 0, 1 or 2.
    pub stress: u8,
    pub tied_to: bool,
    pub tied_from: bool,
    pub lengthened: bool,
    pub post_stop_aspiration: bool,
    pub pre_stop_gap: bool,
    pub silence: bool,

    // Populated by the duration engine.
    pub duration_ms: f64,
    pub fade_ms: f64,
    // Populated by the intonation engine.
    pub voice_pitch: f64,
    pub end_voice_pitch: f64,
}

impl PlannedPhoneme {
    fn from_token(ch: char, ann: &tokeniser::Annotated) -> Self {
        PlannedPhoneme {
            params: ann.def.params,
            flags: ann.def.flags,
            ch: Some(ch),
            tied_to: ann.tied_to,
            tied_from: ann.tied_from,
            lengthened: ann.lengthened,
            ..Default::default()
        }
    }

    /// Renders this phoneme to a synthesis frame; silence units render to
    /// `None`. Table values may override the baseline gains; the intonation
    /// result always wins for the pitch pair.
    pub fn build_frame(&self) -> Option<Frame> {
        if self.silence {
            return None;
        }
        let mut frame = Frame::default();
        frame[FrameParam::PreFormantGain] = 1.0;
        frame[FrameParam::OutputGain] = 2.0;
        self.params.apply_to(&mut frame);
        frame[FrameParam::VoicePitch] = self.voice_pitch;
        frame[FrameParam::EndVoicePitch] = self.end_voice_pitch;
        Some(frame)
    }
}

/// Tracks which phoneme owns the current syllable's stress mark. The mark
/// can land on a phoneme that is already in the list (a consonant promoted
/// to syllable start by a following vowel) or on the one being built.
enum SyllableStart {
    None,
    Planned(usize),
    Current,
}

/// Plans the token stream into the annotated phoneme list.
pub fn plan<'a>(
    tokens: impl Iterator<Item = Token<'a>>,
    table: &PhonemeTable,
) -> Vec<PlannedPhoneme> {
    let mut planned: Vec<PlannedPhoneme> = Vec::new();
    let mut new_word = true;
    let mut last: Option<usize> = None;
    let mut syllable = SyllableStart::None;

    for token in tokens {
        if token.ch == ' ' {
            new_word = true;
            continue;
        }
        let Some(ann) = token.phoneme else {
            // Unknown symbol: skipped, but it doesn't clear word state.
            continue;
        };
        let stress = ann.stress;
        let mut cur = PlannedPhoneme::from_token(token.ch, &ann);

        let last_flags = last.map(|i| planned[i].flags);

        // Syllable marking: a consonant before a vowel starts the vowel's
        // syllable; a primary-stressed phoneme after a vowel starts its own.
        if let (Some(li), Some(lf)) = (last, last_flags) {
            if !lf.is_vowel && cur.flags.is_vowel {
                planned[li].syllable_start = true;
                syllable = SyllableStart::Planned(li);
            } else if stress == 1 && lf.is_vowel {
                cur.syllable_start = true;
                syllable = SyllableStart::Current;
            }
        }

        // Unvoiced stop releasing into a voiced continuant: insert an
        // aspiration burst modelled on /h/. It has no formants of its own;
        // the h-copy pass below borrows them from a neighbour.
        if let Some(lf) = last_flags {
            if lf.is_stop
                && !lf.is_voiced
                && cur.flags.is_voiced
                && !cur.flags.is_stop
                && !cur.flags.is_africate
            {
                if let Some(h) = table.get("h") {
                    planned.push(PlannedPhoneme {
                        params: h.params,
                        flags: h.flags,
                        post_stop_aspiration: true,
                        ..Default::default()
                    });
                } else {
                    warn!("phoneme table has no 'h'; skipping post-stop aspiration");
                }
            }
        }

        if new_word {
            new_word = false;
            cur.word_start = true;
            cur.syllable_start = true;
            syllable = SyllableStart::Current;
        }

        if stress != 0 {
            // The stress belongs to the syllable start, which may be a
            // phoneme planned earlier in this syllable.
            match syllable {
                SyllableStart::Planned(i) => planned[i].stress = stress,
                SyllableStart::Current => cur.stress = stress,
                SyllableStart::None => {}
            }
        } else if cur.flags.is_stop || cur.flags.is_africate {
            // Closure silence before an unstressed stop.
            planned.push(PlannedPhoneme {
                silence: true,
                pre_stop_gap: true,
                ..Default::default()
            });
        }

        planned.push(cur);
        let idx = planned.len() - 1;
        if matches!(syllable, SyllableStart::Current) {
            syllable = SyllableStart::Planned(idx);
        }
        last = Some(idx);
    }
    planned
}

/// The /h/ formant-copy pass: any unit flagged `copy_adjacent` (plain /h/
/// and inserted aspiration) takes its missing parameters from the next
/// non-silence unit, or from the previous unit when there is no next. A
/// unit with no neighbour at all has nothing to shape its noise with and
/// becomes silence, keeping its timing.
pub fn correct_h_phonemes(planned: &mut [PlannedPhoneme]) {
    for index in 0..planned.len() {
        if !planned[index].flags.copy_adjacent {
            continue;
        }
        let next_ok = planned
            .get(index + 1)
            .map(|p| !p.silence)
            .unwrap_or(false);
        let adjacent = if next_ok {
            Some(index + 1)
        } else if index > 0 {
            Some(index - 1)
        } else {
            None
        };
        match adjacent {
            Some(adj) => {
                let donor = planned[adj].params;
                planned[index].params.fill_missing_from(&donor);
            }
            None => planned[index].silence = true,
        }
    }
}

/// Options for one clause of speech.
#[derive(Clone, Debug)]
pub struct ClauseOptions {
    /// Speed multiplier: 1.0 is the reference rate.
    pub speed: f64,
    /// Base pitch in Hz before the intonation contour scales it.
    pub base_pitch: f64,
    /// Pitch-range scalar for the intonation contour.
    pub inflection: f64,
    pub clause_type: ClauseType,
    pub language: Option<String>,
}

impl Default for ClauseOptions {
    fn default() -> Self {
        ClauseOptions {
            speed: 1.0,
            base_pitch: 100.0,
            inflection: 0.5,
            clause_type: ClauseType::Statement,
            language: None,
        }
    }
}

/// A frame request: what the planner hands the DSP queue for one phoneme.
#[derive(Clone, Debug)]
pub struct FrameRequest {
    /// `None` renders as silence.
    pub frame: Option<Frame>,
    pub duration_ms: f64,
    pub fade_ms: f64,
}

/// Runs the whole linguistic pipeline for one clause of IPA text:
/// normalise, tokenise, plan, assign durations and pitches, render frames.
/// Returns an empty list when no phoneme survives.
pub fn generate_frames(ipa: &str, opts: &ClauseOptions, table: &PhonemeTable) -> Vec<FrameRequest> {
    let ipa = ipa_normaliser::normalise(ipa, opts.language.as_deref(), table);
    let mut planned = plan(tokeniser::tokenise(&ipa, table), table);
    if planned.is_empty() {
        return Vec::new();
    }
    correct_h_phonemes(&mut planned);
    timing::assign_times(&mut planned, opts.speed);
    intonation::assign_pitches(
        &mut planned,
        opts.base_pitch,
        opts.inflection,
        opts.clause_type,
    );
    planned
        .iter()
        .map(|p| FrameRequest {
            frame: p.build_frame(),
            duration_ms: p.duration_ms,
            fade_ms: p.fade_ms,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phonemes::PhonemeTable;
    use crate::tokeniser::tokenise;

    fn plan_str(ipa: &str) -> Vec<PlannedPhoneme> {
        let table = PhonemeTable::builtin();
        plan(tokenise(ipa, table), table)
    }

    fn chars(planned: &[PlannedPhoneme]) -> String {
        planned
            .iter()
            .map(|p| match (p.ch, p.pre_stop_gap, p.post_stop_aspiration) {
                (Some(c), _, _) => c,
                (None, true, _) => '_',
                (None, _, true) => 'ʰ',
                _ => '?',
            })
            .collect()
    }

    #[test]
    fn hello_plan() {
        // ˈhɛlo͡ʊ: no inserted units, h leads the stressed syllable, the
        // diphthong halves carry the tie annotations.
        let planned = plan_str("ˈhɛlo͡ʊ");
        assert_eq!(chars(&planned), "hɛloʊ");

        let h = &planned[0];
        assert!(h.word_start && h.syllable_start);
        assert_eq!(h.stress, 1);
        assert!(h.flags.copy_adjacent);

        assert!(planned[3].tied_to);
        assert!(planned[4].tied_from);
        assert!(!planned.iter().any(|p| p.pre_stop_gap));
    }

    #[test]
    fn h_copies_formants_from_following_vowel() {
        let table = PhonemeTable::builtin();
        let mut planned = plan_str("ˈhɛlo͡ʊ");
        correct_h_phonemes(&mut planned);

        let eps = table.get("ɛ").unwrap();
        let h = &planned[0];
        for p in [FrameParam::Cf1, FrameParam::Cf2, FrameParam::Cf3] {
            assert_eq!(h.params.get(p), eps.params.get(p));
        }
        // h's own parameters are not overwritten.
        assert_eq!(h.params.get(FrameParam::AspirationAmplitude), Some(1.0));
        assert_eq!(h.params.get(FrameParam::VoiceAmplitude), Some(0.0));
    }

    #[test]
    fn h_falls_back_to_previous_neighbour() {
        let mut planned = plan_str("æh");
        correct_h_phonemes(&mut planned);
        let ae = PhonemeTable::builtin().get("æ").unwrap();
        let h = planned.last().unwrap();
        assert_eq!(h.params.get(FrameParam::Cf1), ae.params.get(FrameParam::Cf1));
    }

    #[test]
    fn lone_h_becomes_silence() {
        let mut planned = plan_str("h");
        correct_h_phonemes(&mut planned);
        assert_eq!(planned.len(), 1);
        assert!(planned[0].silence);
    }

    #[test]
    fn cat_plan() {
        // ˈkæt: stressed k takes the word/syllable marks and gets no
        // pre-stop gap; the release into æ inserts aspiration; the final t
        // is unstressed and gets its closure gap.
        let planned = plan_str("ˈkæt");
        assert_eq!(chars(&planned), "kʰæ_t");

        let k = &planned[0];
        assert!(k.word_start && k.syllable_start);
        assert_eq!(k.stress, 1);

        let asp = &planned[1];
        assert!(asp.post_stop_aspiration && asp.flags.copy_adjacent);
        assert!(asp.ch.is_none());

        let gap = &planned[3];
        assert!(gap.silence && gap.pre_stop_gap);
    }

    #[test]
    fn aspiration_only_after_unvoiced_stops() {
        // Voiced stop: no aspiration inserted.
        let planned = plan_str("bæ");
        assert!(!planned.iter().any(|p| p.post_stop_aspiration));
        // Unvoiced stop into unvoiced fricative: no aspiration either.
        let planned = plan_str("ks");
        assert!(!planned.iter().any(|p| p.post_stop_aspiration));
        // Unvoiced stop into a vowel: aspiration.
        let planned = plan_str("kæ");
        assert!(planned.iter().any(|p| p.post_stop_aspiration));
    }

    #[test]
    fn two_stressed_words() {
        let planned = plan_str("ˈæ ˈæ");
        assert_eq!(planned.len(), 2);
        for p in &planned {
            assert!(p.word_start && p.syllable_start);
            assert_eq!(p.stress, 1);
        }
    }

    #[test]
    fn word_start_count_matches_word_count() {
        for ipa in ["ˈhɛlo͡ʊ wɝld", "æ b k", "ˈæ ˈæ ˈæ"] {
            let planned = plan_str(ipa);
            let words = ipa.split_whitespace().count();
            let starts = planned.iter().filter(|p| p.word_start).count();
            assert_eq!(starts, words, "ipa={:?}", ipa);
        }
    }

    #[test]
    fn stress_lands_on_earlier_syllable_start() {
        let planned = plan_str("səˈlun");
        let l = planned.iter().find(|p| p.ch == Some('l')).unwrap();
        assert!(l.syllable_start);
        assert_eq!(l.stress, 1);
        let u = planned.iter().find(|p| p.ch == Some('u')).unwrap();
        assert_eq!(u.stress, 0);

        // When the stress arrives on a vowel whose syllable start is the
        // preceding consonant, the mark must move back onto that consonant
        // even though it was appended earlier.
        let planned = plan_str("æsˈæ");
        let s = planned.iter().find(|p| p.ch == Some('s')).unwrap();
        assert!(s.syllable_start);
        assert_eq!(s.stress, 1);
        assert_eq!(planned.last().unwrap().stress, 0);
    }

    #[test]
    fn unknown_symbols_are_skipped() {
        let planned = plan_str("æ¤æ");
        assert_eq!(planned.len(), 2);
        assert!(planned.iter().all(|p| p.ch == Some('æ')));
    }

    #[test]
    fn empty_generates_nothing() {
        let frames = generate_frames("", &ClauseOptions::default(), PhonemeTable::builtin());
        assert!(frames.is_empty());
    }

    #[test]
    fn generate_frames_end_to_end() {
        let opts = ClauseOptions {
            language: Some("en-us".into()),
            ..Default::default()
        };
        let frames = generate_frames("ˈhɛloʊ", &opts, PhonemeTable::builtin());
        assert!(!frames.is_empty());
        for req in &frames {
            assert!(req.duration_ms >= 0.0);
            assert!(req.fade_ms >= 0.0);
            if let Some(frame) = &req.frame {
                assert!(frame.is_finite());
            }
        }
        // Voiced frames must carry a pitch.
        let voiced: Vec<_> = frames
            .iter()
            .filter_map(|r| r.frame.as_ref())
            .filter(|f| f[FrameParam::VoiceAmplitude] > 0.0)
            .collect();
        assert!(!voiced.is_empty());
        for f in voiced {
            assert!(f[FrameParam::VoicePitch] > 0.0);
            assert!(f[FrameParam::EndVoicePitch] > 0.0);
        }
    }
}
