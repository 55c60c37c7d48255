//! Assigns per-phoneme durations and cross-fade windows, in milliseconds.
//!
//! The syllable's stress scales the local speaking rate: primary-stressed
//! syllables run at `speed / 1.25`, secondary at `speed / 1.07`. On top of
//! that, phonetic class and adjacency pick the row of the duration table.
//! Stops and taps have absolute caps so they stay crisp at slow rates, and
//! vowels are clamped to a floor so reduced vowels don't vanish entirely at
//! high rates.
use crate::planner::PlannedPhoneme;

/// Floor for vowel durations at any speed.
const MIN_VOWEL_DURATION_MS: f64 = 18.0;

/// Assigns `duration_ms` and `fade_ms` for every planned phoneme.
pub fn assign_times(planned: &mut [PlannedPhoneme], base_speed: f64) {
    let mut syllable_stress = 0u8;
    let mut speed = base_speed;

    for index in 0..planned.len() {
        let last_flags = index.checked_sub(1).map(|i| planned[i].flags);
        let next = planned
            .get(index + 1)
            .map(|p| (p.word_start, p.flags));

        let p = &planned[index];
        if p.syllable_start {
            syllable_stress = p.stress;
            speed = match syllable_stress {
                1 => base_speed / 1.25,
                2 => base_speed / 1.07,
                _ => base_speed,
            };
        }

        let mut duration = 60.0 / speed;
        let mut fade = 10.0 / speed;

        if p.pre_stop_gap {
            duration = 41.0 / speed;
        } else if p.post_stop_aspiration {
            duration = 20.0 / speed;
        } else if p.flags.is_tap || p.flags.is_trill {
            // Short, but no closure gap like a full stop.
            duration = if p.flags.is_trill {
                22.0 / speed
            } else {
                (14.0 / speed).min(14.0)
            };
            fade = 0.001;
        } else if p.flags.is_stop {
            duration = (6.0 / speed).min(6.0);
            fade = 0.001;
        } else if p.flags.is_africate {
            duration = 24.0 / speed;
            fade = 0.001;
        } else if !p.flags.is_voiced {
            duration = 45.0 / speed;
        } else if p.flags.is_vowel {
            if last_flags.map_or(false, |f| f.is_liquid || f.is_semivowel) {
                // Glide slowly out of liquids and semivowels.
                fade = 25.0 / speed;
            }
            if p.tied_to {
                duration = 50.0 / speed;
            } else if p.tied_from {
                duration = 26.0 / speed;
                fade = 10.0 / speed;
            } else if syllable_stress == 0 && !p.syllable_start {
                if let Some((next_word_start, next_flags)) = next {
                    if !next_word_start && (next_flags.is_liquid || next_flags.is_nasal) {
                        duration = if next_flags.is_liquid {
                            45.0 / speed
                        } else {
                            50.0 / speed
                        };
                    }
                }
            }
        } else {
            // Voiced consonants.
            duration = 30.0 / speed;
            if p.flags.is_liquid || p.flags.is_semivowel {
                fade = 12.0 / speed;
            }
        }

        if p.lengthened {
            duration *= 1.05;
        }
        if p.flags.is_vowel && duration < MIN_VOWEL_DURATION_MS {
            duration = MIN_VOWEL_DURATION_MS;
        }

        let p = &mut planned[index];
        p.duration_ms = duration;
        p.fade_ms = fade;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phonemes::PhonemeTable;
    use crate::planner::plan;
    use crate::tokeniser::tokenise;

    fn timed(ipa: &str, speed: f64) -> Vec<PlannedPhoneme> {
        let table = PhonemeTable::builtin();
        let mut planned = plan(tokenise(ipa, table), table);
        assign_times(&mut planned, speed);
        planned
    }

    fn approx(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
    }

    #[test]
    fn unstressed_vowel_default() {
        let planned = timed("sæs", 1.0);
        let v = planned.iter().find(|p| p.ch == Some('æ')).unwrap();
        approx(v.duration_ms, 60.0);
        approx(v.fade_ms, 10.0);
    }

    #[test]
    fn primary_stress_slows_the_syllable() {
        let planned = timed("ˈæ", 1.0);
        approx(planned[0].duration_ms, 60.0 * 1.25);
        approx(planned[0].fade_ms, 10.0 * 1.25);
    }

    #[test]
    fn secondary_stress_slows_slightly() {
        let planned = timed("ˌæ", 1.0);
        approx(planned[0].duration_ms, 60.0 * 1.07);
    }

    #[test]
    fn stop_duration_is_capped() {
        // At half speed 6/speed would be 12ms; the cap keeps stops at 6ms.
        let planned = timed("æk", 0.5);
        let k = planned.iter().find(|p| p.ch == Some('k')).unwrap();
        approx(k.duration_ms, 6.0);
        approx(k.fade_ms, 0.001);

        // At double speed the rate factor wins.
        let planned = timed("æk", 2.0);
        let k = planned.iter().find(|p| p.ch == Some('k')).unwrap();
        approx(k.duration_ms, 3.0);
    }

    #[test]
    fn gap_and_aspiration_rows() {
        let planned = timed("æˈkæ", 1.0);
        // æ ˈkæ: stress keeps the gap away, so force one with an unstressed stop.
        assert!(planned.iter().any(|p| p.post_stop_aspiration));

        let planned = timed("ækæ", 1.0);
        let gap = planned.iter().find(|p| p.pre_stop_gap).unwrap();
        approx(gap.duration_ms, 41.0);
        let asp = planned.iter().find(|p| p.post_stop_aspiration).unwrap();
        approx(asp.duration_ms, 20.0);
    }

    #[test]
    fn trill_and_tap_rows() {
        let planned = timed("ara", 1.0);
        let r = planned.iter().find(|p| p.flags.is_trill).unwrap();
        approx(r.duration_ms, 22.0);
        approx(r.fade_ms, 0.001);

        let planned = timed("aɾa", 0.5);
        let tap = planned.iter().find(|p| p.flags.is_tap).unwrap();
        // min(14/0.5, 14) caps at the absolute value.
        approx(tap.duration_ms, 14.0);
    }

    #[test]
    fn affricate_row() {
        let planned = timed("æˈt͡ʃæ", 1.0);
        let ch = planned.iter().find(|p| p.flags.is_africate).unwrap();
        // Affricate carries the primary stress here: speed / 1.25.
        approx(ch.duration_ms, 24.0 * 1.25);
        approx(ch.fade_ms, 0.001);
    }

    #[test]
    fn unvoiced_row() {
        let planned = timed("æsæ", 1.0);
        let s = planned.iter().find(|p| p.ch == Some('s')).unwrap();
        approx(s.duration_ms, 45.0);
    }

    #[test]
    fn tied_vowel_rows() {
        let planned = timed("o͡ʊ", 1.0);
        let o = planned.iter().find(|p| p.tied_to).unwrap();
        let u = planned.iter().find(|p| p.tied_from).unwrap();
        approx(o.duration_ms, 50.0);
        approx(u.duration_ms, 26.0);
        approx(u.fade_ms, 10.0);
    }

    #[test]
    fn vowel_before_liquid_and_nasal() {
        // Unstressed, non-syllable-start vowel followed by a liquid.
        let planned = timed("sæl", 1.0);
        let v = planned.iter().find(|p| p.ch == Some('æ')).unwrap();
        approx(v.duration_ms, 45.0);

        // Same but followed by a nasal.
        let planned = timed("sæn", 1.0);
        let v = planned.iter().find(|p| p.ch == Some('æ')).unwrap();
        approx(v.duration_ms, 50.0);
    }

    #[test]
    fn vowel_after_liquid_fades_slowly() {
        let planned = timed("slæ", 1.0);
        let v = planned.iter().find(|p| p.ch == Some('æ')).unwrap();
        approx(v.fade_ms, 25.0);
    }

    #[test]
    fn voiced_consonant_rows() {
        let planned = timed("æmæ", 1.0);
        let m = planned.iter().find(|p| p.ch == Some('m')).unwrap();
        approx(m.duration_ms, 30.0);
        approx(m.fade_ms, 10.0);

        let planned = timed("æjæ", 1.0);
        let j = planned.iter().find(|p| p.ch == Some('j')).unwrap();
        approx(j.fade_ms, 12.0);
    }

    #[test]
    fn lengthening_multiplies() {
        let planned = timed("sæːs", 1.0);
        let v = planned.iter().find(|p| p.lengthened).unwrap();
        approx(v.duration_ms, 60.0 * 1.05);
    }

    #[test]
    fn vowel_floor_at_high_speed() {
        let planned = timed("sæs", 4.0);
        let v = planned.iter().find(|p| p.ch == Some('æ')).unwrap();
        approx(v.duration_ms, MIN_VOWEL_DURATION_MS);
        // Consonants are allowed to get shorter.
        let s = planned.iter().find(|p| p.ch == Some('s')).unwrap();
        assert!(s.duration_ms < MIN_VOWEL_DURATION_MS);
    }
}
