//! The phoneme descriptor table maps an IPA symbol to everything the rest of
//! the pipeline needs to know about it: a sparse set of synthesis parameters
//! (formants, bandwidths, source amplitudes) and a handful of phonetic class
//! flags the planner and duration engine branch on.
//!
//! The table is plain data. A JSON copy ships embedded in the binary and a
//! different one can be loaded from disk, e.g. to experiment with re-tuned
//! formant values without rebuilding. Once loaded the table never changes -
//! it is shared freely between threads.
use crate::frame::{Frame, FrameParam, FRAME_PARAM_COUNT};
use anyhow::Context;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// The embedded default table.
static BUILTIN_JSON: &str = include_str!("../data/phonemes.json");

static BUILTIN: Lazy<PhonemeTable> = Lazy::new(|| {
    PhonemeTable::from_json(BUILTIN_JSON).expect("embedded phoneme table must parse")
});

/// Phonetic class flags. These drive planning decisions (syllable marking,
/// aspiration and gap insertion) and the duration table; they never reach the
/// DSP engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PhonemeFlags {
    #[serde(rename = "isVowel")]
    pub is_vowel: bool,
    #[serde(rename = "isVoiced")]
    pub is_voiced: bool,
    #[serde(rename = "isStop")]
    pub is_stop: bool,
    #[serde(rename = "isAfricate")]
    pub is_africate: bool,
    #[serde(rename = "isLiquid")]
    pub is_liquid: bool,
    #[serde(rename = "isSemivowel")]
    pub is_semivowel: bool,
    #[serde(rename = "isNasal")]
    pub is_nasal: bool,
    #[serde(rename = "isTap")]
    pub is_tap: bool,
    #[serde(rename = "isTrill")]
    pub is_trill: bool,
    /// The /h/ rule: this phoneme has no formant targets of its own and
    /// takes them from an adjacent phoneme during planning.
    #[serde(rename = "copyAdjacent")]
    pub copy_adjacent: bool,
}

/// A sparse set of frame parameters: only values the data file explicitly
/// lists are present. Presence matters - the h-copy pass fills in exactly
/// the parameters a descriptor does *not* define.
#[derive(Clone, Copy, PartialEq)]
pub struct ParamSet {
    values: [Option<f64>; FRAME_PARAM_COUNT],
}

impl Default for ParamSet {
    fn default() -> Self {
        ParamSet {
            values: [None; FRAME_PARAM_COUNT],
        }
    }
}

impl ParamSet {
    pub fn get(&self, p: FrameParam) -> Option<f64> {
        self.values[p as usize]
    }

    pub fn set(&mut self, p: FrameParam, value: f64) {
        self.values[p as usize] = Some(value);
    }

    pub fn contains(&self, p: FrameParam) -> bool {
        self.values[p as usize].is_some()
    }

    /// Copies every parameter `other` defines that this set doesn't.
    pub fn fill_missing_from(&mut self, other: &ParamSet) {
        for (dst, src) in self.values.iter_mut().zip(other.values.iter()) {
            if dst.is_none() {
                *dst = *src;
            }
        }
    }

    /// Writes the present parameters onto a frame, leaving the rest of the
    /// frame untouched.
    pub fn apply_to(&self, frame: &mut Frame) {
        for &p in FrameParam::ALL {
            if let Some(v) = self.values[p as usize] {
                frame[p] = v;
            }
        }
    }
}

impl std::fmt::Debug for ParamSet {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut map = f.debug_map();
        for &p in FrameParam::ALL {
            if let Some(v) = self.values[p as usize] {
                map.entry(&p.name(), &v);
            }
        }
        map.finish()
    }
}

/// One phoneme's static description, straight from the data file.
#[derive(Clone, Debug, Default)]
pub struct PhonemeDef {
    pub flags: PhonemeFlags,
    pub params: ParamSet,
}

/// The loaded, immutable phoneme table.
#[derive(Clone, Debug, Default)]
pub struct PhonemeTable {
    map: BTreeMap<String, PhonemeDef>,
}

impl PhonemeTable {
    /// The table embedded in the binary.
    pub fn builtin() -> &'static PhonemeTable {
        &BUILTIN
    }

    /// Loads a table from a JSON file on disk.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading phoneme table '{}'", path.display()))?;
        Self::from_json(&text)
            .with_context(|| format!("parsing phoneme table '{}'", path.display()))
    }

    /// Parses a table from JSON text. Every member of a phoneme object must
    /// be either a known class flag (boolean) or a known frame parameter
    /// (number); anything else is rejected so typos in hand-edited tables
    /// surface at load time rather than as silent mispronunciations.
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let raw: BTreeMap<String, BTreeMap<String, serde_json::Value>> =
            serde_json::from_str(text).context("phoneme table is not a JSON object of objects")?;

        let mut map = BTreeMap::new();
        for (symbol, fields) in raw {
            let mut def = PhonemeDef::default();
            let mut flag_fields = serde_json::Map::new();
            for (key, value) in fields {
                match value {
                    serde_json::Value::Bool(_) => {
                        flag_fields.insert(key, value);
                    }
                    serde_json::Value::Number(n) => {
                        let param = FrameParam::from_name(&key).with_context(|| {
                            format!("phoneme '{}': unknown parameter '{}'", symbol, key)
                        })?;
                        let v = n.as_f64().with_context(|| {
                            format!("phoneme '{}': parameter '{}' is not finite", symbol, key)
                        })?;
                        def.params.set(param, v);
                    }
                    other => anyhow::bail!(
                        "phoneme '{}': field '{}' has unsupported type {:?}",
                        symbol,
                        key,
                        other
                    ),
                }
            }
            def.flags = serde_json::from_value(serde_json::Value::Object(flag_fields))
                .with_context(|| format!("phoneme '{}'", symbol))?;
            map.insert(symbol, def);
        }
        Ok(PhonemeTable { map })
    }

    /// Looks a symbol up. Multi-codepoint symbols (tied affricates) are
    /// keyed by their full string.
    pub fn get(&self, symbol: &str) -> Option<&PhonemeDef> {
        self.map.get(symbol)
    }

    /// Whether a symbol exists in the table. The normalizer uses this to
    /// pick fallback substitutions.
    pub fn contains(&self, symbol: &str) -> bool {
        self.map.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterator over `(symbol, descriptor)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PhonemeDef)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }
}
