//! Player settings, difficulty presets and the song descriptor.
//!
//! Everything here is plain data. The engine normalizes bad values instead of
//! failing; `Settings::validate` exists for callers that want to surface the
//! problems at the boundary.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::judgement::JudgementWindows;

pub const LANE_COUNT: usize = 4;
pub const MAX_ROSTER: usize = 5;
pub const DEFAULT_BPM: f64 = 120.0;

const BASE_NOTE_HEIGHT: f64 = 20.0;
const MIN_NOTE_HEIGHT: f64 = 8.0;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("judgement windows must be ascending (perfect {perfect}ms, great {great}ms, good {good}ms, bad {bad}ms)")]
    WindowsNotAscending {
        perfect: f64,
        great: f64,
        good: f64,
        bad: f64,
    },
    #[error("judgement window `{name}` must be a positive number of milliseconds, got {value}")]
    InvalidWindow { name: &'static str, value: f64 },
    #[error("note speed must be positive, got {0}")]
    InvalidNoteSpeed(f64),
    #[error("keymap needs {expected} distinct keys, got {found}")]
    KeymapLength { expected: usize, found: usize },
    #[error("key `{0}` is bound to more than one lane")]
    DuplicateKey(String),
    #[error("unknown difficulty `{0}`")]
    UnknownDifficulty(String),
    #[error("roster slot {0} is out of range (0..5)")]
    SlotOutOfRange(usize),
    #[error("member `{0}` is already in the roster")]
    DuplicateMember(String),
    #[error("unknown member id `{0}`")]
    UnknownMember(String),
    #[error("invalid settings json: {0}")]
    Json(String),
}

// --- Difficulty -------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "String", into = "String"))]
pub enum Difficulty {
    Easy,
    #[default]
    Normal,
    Hard,
}

/// Per-difficulty gameplay parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DifficultyPreset {
    pub speed: f64,
    pub density: f64,
    pub max_hp: u32,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Normal, Difficulty::Hard];

    pub fn preset(self) -> DifficultyPreset {
        match self {
            Difficulty::Easy => DifficultyPreset { speed: 3.0, density: 0.30, max_hp: 220 },
            Difficulty::Normal => DifficultyPreset { speed: 4.0, density: 0.45, max_hp: 160 },
            Difficulty::Hard => DifficultyPreset { speed: 5.0, density: 0.60, max_hp: 120 },
        }
    }

    /// Case-insensitive lookup that falls back to `Normal` for unknown names.
    pub fn from_name_or_default(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            log::warn!("unknown difficulty {name:?}, using Normal");
            Difficulty::Normal
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Normal => "Normal",
            Difficulty::Hard => "Hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "normal" => Ok(Difficulty::Normal),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(ConfigError::UnknownDifficulty(s.to_owned())),
        }
    }
}

impl From<String> for Difficulty {
    fn from(s: String) -> Self {
        Difficulty::from_name_or_default(&s)
    }
}

impl From<Difficulty> for String {
    fn from(d: Difficulty) -> Self {
        d.name().to_owned()
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// --- Settings ---------------------------------------------------------------

/// Fields of the persisted player settings that the engine consumes.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct Settings {
    pub perfect_ms: f64,
    pub great_ms: f64,
    pub good_ms: f64,
    pub bad_ms: f64,
    /// Pixels per frame. Non-positive values fall back to the difficulty preset.
    pub note_speed: f64,
    #[cfg_attr(feature = "serde", serde(alias = "noteSize"))]
    pub note_size_percent: f64,
    pub difficulty: Difficulty,
    pub keymap: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            perfect_ms: 50.0,
            great_ms: 100.0,
            good_ms: 150.0,
            bad_ms: 200.0,
            note_speed: 5.0,
            note_size_percent: 100.0,
            difficulty: Difficulty::Normal,
            keymap: ["d", "f", "j", "k"].iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl Settings {
    #[cfg(feature = "serde_json")]
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Json(e.to_string()))
    }

    pub fn windows(&self) -> JudgementWindows {
        JudgementWindows {
            perfect_ms: self.perfect_ms,
            great_ms: self.great_ms,
            good_ms: self.good_ms,
            bad_ms: self.bad_ms,
        }
    }

    pub fn preset(&self) -> DifficultyPreset {
        self.difficulty.preset()
    }

    /// Explicit note speed wins; otherwise the difficulty preset speed.
    pub fn effective_note_speed(&self) -> f64 {
        if self.note_speed.is_finite() && self.note_speed > 0.0 {
            self.note_speed
        } else {
            self.preset().speed
        }
    }

    /// Visual note height in pixels derived from the size percentage.
    pub fn note_height(&self) -> f64 {
        let pct = if self.note_size_percent.is_finite() && self.note_size_percent > 0.0 {
            self.note_size_percent
        } else {
            100.0
        };
        (BASE_NOTE_HEIGHT * pct / 100.0).round().max(MIN_NOTE_HEIGHT)
    }

    /// Lane bound to `key`, compared case-insensitively.
    pub fn lane_for_key(&self, key: &str) -> Option<usize> {
        let key = key.to_lowercase();
        self.keymap
            .iter()
            .take(LANE_COUNT)
            .position(|k| k.to_lowercase() == key)
    }

    /// Every problem with these settings, in field order.
    pub fn problems(&self) -> Vec<ConfigError> {
        let mut out = Vec::new();
        let named = [
            ("perfect", self.perfect_ms),
            ("great", self.great_ms),
            ("good", self.good_ms),
            ("bad", self.bad_ms),
        ];
        for (name, value) in named {
            if !value.is_finite() || value <= 0.0 {
                out.push(ConfigError::InvalidWindow { name, value });
            }
        }
        if !self.windows().is_ascending() {
            out.push(ConfigError::WindowsNotAscending {
                perfect: self.perfect_ms,
                great: self.great_ms,
                good: self.good_ms,
                bad: self.bad_ms,
            });
        }
        if !(self.note_speed.is_finite() && self.note_speed > 0.0) {
            out.push(ConfigError::InvalidNoteSpeed(self.note_speed));
        }
        if self.keymap.len() != LANE_COUNT {
            out.push(ConfigError::KeymapLength {
                expected: LANE_COUNT,
                found: self.keymap.len(),
            });
        }
        for (i, key) in self.keymap.iter().enumerate() {
            let lower = key.to_lowercase();
            if self.keymap[..i].iter().any(|k| k.to_lowercase() == lower) {
                out.push(ConfigError::DuplicateKey(key.clone()));
            }
        }
        out
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.problems().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

// --- Song -------------------------------------------------------------------

/// Song metadata the engine needs to build a chart.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct SongDescriptor {
    pub id: String,
    /// `None` means the tempo has to be estimated from the audio.
    #[cfg_attr(feature = "serde", serde(default))]
    pub bpm: Option<f64>,
    pub duration_ms: u32,
    /// Overrides the difficulty preset density when present.
    #[cfg_attr(feature = "serde", serde(default))]
    pub density: Option<f64>,
}

impl SongDescriptor {
    pub fn new(id: impl Into<String>, bpm: Option<f64>, duration_ms: u32) -> Self {
        Self { id: id.into(), bpm, duration_ms, density: None }
    }

    /// Declared bpm if usable, else the estimate, else the default tempo.
    pub fn resolve_bpm(&self, estimate: Option<u32>) -> f64 {
        match self.bpm {
            Some(bpm) if bpm.is_finite() && bpm > 0.0 => bpm,
            _ => estimate.map(f64::from).unwrap_or(DEFAULT_BPM),
        }
    }

    pub fn density_for(&self, difficulty: Difficulty) -> f64 {
        match self.density {
            Some(d) if d.is_finite() && d > 0.0 => d,
            _ => difficulty.preset().density,
        }
    }
}
