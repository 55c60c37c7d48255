//! Computes per-phoneme pitch targets from a clause-type template.
//!
//! The utterance is partitioned into four spans by its primary-stressed
//! syllables: pre-head (everything before the first), head (up to the last,
//! the nucleus), nucleus and tail. Each span gets a pitch path; within the
//! head, stressed syllables step down a fixed sequence of heights and the
//! unstressed runs between them drift relative to the last stress.
//!
//! Pitch percentages map to Hz as `base · 2^(((pct − 50) / 50) · inflection)`,
//! so 50 is the base pitch and the inflection scalar widens or flattens the
//! whole contour. Paths interpolate over *voiced* time only: unvoiced
//! phonemes hold the current pitch without consuming any of the path.
use crate::planner::PlannedPhoneme;

/// Clause punctuation classes with distinct intonation templates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClauseType {
    #[default]
    Statement,
    Comma,
    Question,
    Exclamation,
}

impl ClauseType {
    /// Maps trailing clause punctuation to a template.
    pub fn from_char(c: char) -> Option<ClauseType> {
        match c {
            '.' => Some(ClauseType::Statement),
            ',' => Some(ClauseType::Comma),
            '?' => Some(ClauseType::Question),
            '!' => Some(ClauseType::Exclamation),
            _ => None,
        }
    }

    fn params(self) -> &'static IntonationParams {
        match self {
            ClauseType::Statement => &STATEMENT,
            ClauseType::Comma => &COMMA,
            ClauseType::Question => &QUESTION,
            ClauseType::Exclamation => &EXCLAMATION,
        }
    }
}

/// One clause template. All pitch values are percentages (50 = base pitch).
struct IntonationParams {
    pre_head_start: f64,
    pre_head_end: f64,
    head_extend_from: usize,
    head_start: f64,
    head_end: f64,
    head_steps: &'static [f64],
    head_stress_end_delta: f64,
    head_unstressed_run_start_delta: f64,
    head_unstressed_run_end_delta: f64,
    nucleus0_start: f64,
    nucleus0_end: f64,
    nucleus_start: f64,
    nucleus_end: f64,
    tail_start: f64,
    tail_end: f64,
}

static STATEMENT: IntonationParams = IntonationParams {
    pre_head_start: 46.0,
    pre_head_end: 57.0,
    head_extend_from: 4,
    head_start: 80.0,
    head_end: 50.0,
    head_steps: &[100.0, 75.0, 50.0, 25.0, 0.0, 63.0, 38.0, 13.0, 0.0],
    head_stress_end_delta: -16.0,
    head_unstressed_run_start_delta: -8.0,
    head_unstressed_run_end_delta: -5.0,
    nucleus0_start: 64.0,
    nucleus0_end: 8.0,
    nucleus_start: 70.0,
    nucleus_end: 18.0,
    tail_start: 24.0,
    tail_end: 8.0,
};

static COMMA: IntonationParams = IntonationParams {
    pre_head_start: 46.0,
    pre_head_end: 57.0,
    head_extend_from: 4,
    head_start: 80.0,
    head_end: 60.0,
    head_steps: &[100.0, 75.0, 50.0, 25.0, 0.0, 63.0, 38.0, 13.0, 0.0],
    head_stress_end_delta: -16.0,
    head_unstressed_run_start_delta: -8.0,
    head_unstressed_run_end_delta: -5.0,
    nucleus0_start: 34.0,
    nucleus0_end: 52.0,
    nucleus_start: 78.0,
    nucleus_end: 34.0,
    tail_start: 34.0,
    tail_end: 52.0,
};

static QUESTION: IntonationParams = IntonationParams {
    pre_head_start: 45.0,
    pre_head_end: 56.0,
    head_extend_from: 3,
    head_start: 75.0,
    head_end: 43.0,
    head_steps: &[100.0, 75.0, 50.0, 20.0, 60.0, 35.0, 11.0, 0.0],
    head_stress_end_delta: -16.0,
    head_unstressed_run_start_delta: -7.0,
    head_unstressed_run_end_delta: 0.0,
    nucleus0_start: 34.0,
    nucleus0_end: 68.0,
    nucleus_start: 86.0,
    nucleus_end: 21.0,
    tail_start: 34.0,
    tail_end: 68.0,
};

static EXCLAMATION: IntonationParams = IntonationParams {
    pre_head_start: 46.0,
    pre_head_end: 57.0,
    head_extend_from: 3,
    head_start: 90.0,
    head_end: 50.0,
    head_steps: &[100.0, 75.0, 50.0, 16.0, 82.0, 50.0, 32.0, 16.0],
    head_stress_end_delta: -16.0,
    head_unstressed_run_start_delta: -9.0,
    head_unstressed_run_end_delta: 0.0,
    nucleus0_start: 92.0,
    nucleus0_end: 4.0,
    nucleus_start: 92.0,
    nucleus_end: 80.0,
    tail_start: 76.0,
    tail_end: 4.0,
};

fn percent_to_hz(base_pitch: f64, inflection: f64, percent: f64) -> f64 {
    base_pitch * 2f64.powf(((percent - 50.0) / 50.0) * inflection)
}

/// Lays a pitch path over `planned[start..end]`, interpolating from
/// `start_percent` to `end_percent` over the span's voiced duration.
fn apply_pitch_path(
    planned: &mut [PlannedPhoneme],
    start: usize,
    end: usize,
    base_pitch: f64,
    inflection: f64,
    start_percent: f64,
    end_percent: f64,
) {
    let start_pitch = percent_to_hz(base_pitch, inflection, start_percent);
    let end_pitch = percent_to_hz(base_pitch, inflection, end_percent);

    let voiced_duration: f64 = planned[start..end]
        .iter()
        .filter(|p| p.flags.is_voiced)
        .map(|p| p.duration_ms)
        .sum();

    let pitch_delta = end_pitch - start_pitch;
    let mut cur_duration = 0.0;
    let mut cur_pitch = start_pitch;
    for p in &mut planned[start..end] {
        p.voice_pitch = cur_pitch;
        if p.flags.is_voiced && voiced_duration > 0.0 {
            cur_duration += p.duration_ms;
            cur_pitch = start_pitch + pitch_delta * (cur_duration / voiced_duration);
        }
        p.end_voice_pitch = cur_pitch;
    }
}

/// Assigns `voice_pitch` / `end_voice_pitch` across the whole utterance.
pub fn assign_pitches(
    planned: &mut [PlannedPhoneme],
    base_pitch: f64,
    inflection: f64,
    clause_type: ClauseType,
) {
    let params = clause_type.params();
    let len = planned.len();

    // Pre-head: up to the first primary-stressed syllable start.
    let mut pre_head_end = len;
    for (index, p) in planned.iter().enumerate() {
        if p.syllable_start && p.stress == 1 {
            pre_head_end = index;
            break;
        }
    }
    if pre_head_end > 0 {
        apply_pitch_path(
            planned,
            0,
            pre_head_end,
            base_pitch,
            inflection,
            params.pre_head_start,
            params.pre_head_end,
        );
    }

    // Scan backwards for the nucleus: the last primary-stressed syllable
    // start. Any later syllable start becomes the tail boundary.
    let mut nucleus_start = len;
    let mut nucleus_end = len;
    let mut tail_start = len;
    let tail_end = len;
    for index in (pre_head_end..len).rev() {
        let p = &planned[index];
        if p.syllable_start {
            if p.stress == 1 {
                nucleus_start = index;
                break;
            } else {
                nucleus_end = index;
                tail_start = index;
            }
        }
    }

    let has_tail = tail_end > tail_start;
    if has_tail {
        apply_pitch_path(
            planned,
            tail_start,
            tail_end,
            base_pitch,
            inflection,
            params.tail_start,
            params.tail_end,
        );
    }
    if nucleus_end > nucleus_start {
        let (start_pct, end_pct) = if has_tail {
            (params.nucleus_start, params.nucleus_end)
        } else {
            (params.nucleus0_start, params.nucleus0_end)
        };
        apply_pitch_path(
            planned,
            nucleus_start,
            nucleus_end,
            base_pitch,
            inflection,
            start_pct,
            end_pct,
        );
    }

    // Head: between the first and last primary stress, stressed syllables
    // consume successive heights from the step table (cycling from
    // `head_extend_from` once exhausted).
    if pre_head_end < nucleus_start {
        let steps = params.head_steps;
        let mut step_gen = steps
            .iter()
            .chain(steps[params.head_extend_from..].iter().cycle());

        let mut last_stress_start: Option<usize> = None;
        let mut last_unstressed_run: Option<usize> = None;
        let mut stress_end_percent: Option<f64> = None;
        for index in pre_head_end..=nucleus_start {
            let p = &planned[index];
            let stressed = p.stress == 1;
            if !p.syllable_start {
                continue;
            }
            if let Some(start) = last_stress_start.take() {
                let step = step_gen.next().copied().unwrap_or(0.0);
                let stress_start = params.head_end + ((params.head_start - params.head_end) / 100.0) * step;
                let stress_end = stress_start + params.head_stress_end_delta;
                apply_pitch_path(
                    planned,
                    start,
                    index,
                    base_pitch,
                    inflection,
                    stress_start,
                    stress_end,
                );
                stress_end_percent = Some(stress_end);
            }
            if stressed {
                if let (Some(run), Some(stress_end)) =
                    (last_unstressed_run.take(), stress_end_percent)
                {
                    apply_pitch_path(
                        planned,
                        run,
                        index,
                        base_pitch,
                        inflection,
                        stress_end + params.head_unstressed_run_start_delta,
                        stress_end + params.head_unstressed_run_end_delta,
                    );
                }
                last_stress_start = Some(index);
            } else if last_unstressed_run.is_none() {
                last_unstressed_run = Some(index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phonemes::PhonemeTable;
    use crate::planner::plan;
    use crate::timing::assign_times;
    use crate::tokeniser::tokenise;

    fn pitched(ipa: &str, clause: ClauseType) -> Vec<PlannedPhoneme> {
        let table = PhonemeTable::builtin();
        let mut planned = plan(tokenise(ipa, table), table);
        assign_times(&mut planned, 1.0);
        assign_pitches(&mut planned, 100.0, 0.5, clause);
        planned
    }

    #[test]
    fn percent_mapping_is_exponential_around_base() {
        assert!((percent_to_hz(100.0, 0.5, 50.0) - 100.0).abs() < 1e-9);
        // 100% with inflection 0.5 is half an octave up.
        assert!((percent_to_hz(100.0, 0.5, 100.0) - 100.0 * 2f64.powf(0.5)).abs() < 1e-9);
        // Zero inflection flattens everything to the base pitch.
        assert!((percent_to_hz(100.0, 0.0, 100.0) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn question_without_tail_rises() {
        // Single stressed syllable, no tail: the nucleus0 path of `?` rises.
        let planned = pitched("ˈɡoʊ", ClauseType::Question);
        let first = planned.first().unwrap();
        let last = planned.last().unwrap();
        assert!(last.end_voice_pitch > first.voice_pitch);
    }

    #[test]
    fn statement_without_tail_falls() {
        let planned = pitched("ˈɡoʊ", ClauseType::Statement);
        let first = planned.first().unwrap();
        let last = planned.last().unwrap();
        assert!(last.end_voice_pitch < first.voice_pitch);
    }

    #[test]
    fn nucleus_with_tail_uses_tail_template() {
        // ˈæsæ: the s starts an unstressed syllable, so the final vowels
        // form a tail span below the nucleus.
        let planned = pitched("ˈæsæ", ClauseType::Statement);
        let nucleus = &planned[0];
        let tail_end = planned.last().unwrap();
        // Statement nucleus starts at 70%, tail ends at 8%: a steady fall.
        assert!(nucleus.voice_pitch > tail_end.end_voice_pitch);
        assert!(nucleus.voice_pitch > 100.0); // 70% > base with 0.5 inflection
        assert!(tail_end.end_voice_pitch < 100.0);
    }

    #[test]
    fn unvoiced_phonemes_hold_pitch() {
        let planned = pitched("ˈæsæ", ClauseType::Statement);
        let s = planned.iter().find(|p| p.ch == Some('s')).unwrap();
        // Unvoiced: the path does not advance through it.
        assert_eq!(s.voice_pitch, s.end_voice_pitch);
    }

    #[test]
    fn every_phoneme_gets_a_pitch() {
        for clause in [
            ClauseType::Statement,
            ClauseType::Comma,
            ClauseType::Question,
            ClauseType::Exclamation,
        ] {
            let planned = pitched("ˈhɛlo͡ʊ wɝld", clause);
            for p in &planned {
                assert!(p.voice_pitch > 0.0, "clause {:?}", clause);
                assert!(p.end_voice_pitch > 0.0);
            }
        }
    }

    #[test]
    fn head_steps_descend_in_order() {
        // Three primary stresses: the first two are head stresses taking
        // steps 100 and 75, the last is the nucleus.
        let planned = pitched("ˈæ ˈæ ˈæ", ClauseType::Statement);
        assert_eq!(planned.len(), 3);
        // Step 100 -> 80%, step 75 -> 72.5%; both above base pitch.
        assert!(planned[0].voice_pitch > planned[1].voice_pitch);
        assert!(planned[1].voice_pitch > 100.0);
    }

    #[test]
    fn unstressed_run_sits_below_last_stress() {
        // ˈæt ˈæ: the t is promoted to an unstressed syllable start between
        // the two stresses, and its run is pinned a fixed delta below the
        // first stress's end pitch.
        let planned = pitched("ˈæt ˈæ", ClauseType::Statement);
        let stress = &planned[0];
        let t = planned.iter().find(|p| p.ch == Some('t')).unwrap();
        assert!(t.syllable_start);
        assert!(t.voice_pitch < stress.end_voice_pitch);
        for p in &planned {
            assert!(p.voice_pitch.is_finite());
        }
    }

    #[test]
    fn clause_type_from_char() {
        assert_eq!(ClauseType::from_char('.'), Some(ClauseType::Statement));
        assert_eq!(ClauseType::from_char(','), Some(ClauseType::Comma));
        assert_eq!(ClauseType::from_char('?'), Some(ClauseType::Question));
        assert_eq!(ClauseType::from_char('!'), Some(ClauseType::Exclamation));
        assert_eq!(ClauseType::from_char('a'), None);
    }
}
