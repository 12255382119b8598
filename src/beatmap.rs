//! Procedural chart generation synchronized to tempo.
//!
//! The generator walks the track in sixteenth-note steps and rolls a seeded
//! die on each one, weighting downbeats over eighths over sixteenths. The same
//! (bpm, duration, density, difficulty, seed, lane count) always yields the
//! same chart.

use crate::config::{DEFAULT_BPM, Difficulty, LANE_COUNT, SongDescriptor};
use crate::rng::{Seed, SeededRng};

const MIN_STEP_MS: f64 = 4.0;
const PAIRED_NOTE_CHANCE: f64 = 0.04;
const PAIR_LANE_RETRIES: u32 = 6;
const FALLBACK_MAX_NOTES: usize = 8;

/// A scheduled note: milliseconds from track start and lane index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Note {
    pub time_ms: u32,
    pub lane: u8,
}

/// Time-ordered list of notes for one track.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Beatmap {
    notes: Vec<Note>,
}

impl Beatmap {
    /// Build from arbitrary notes; sorted stably by time.
    pub fn from_notes(mut notes: Vec<Note>) -> Self {
        notes.sort_by_key(|n| n.time_ms);
        Self { notes }
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Note> {
        self.notes.get(idx)
    }

    /// Time of the last note, 0 for an empty chart.
    pub fn last_time_ms(&self) -> u32 {
        self.notes.last().map(|n| n.time_ms).unwrap_or(0)
    }
}

/// Placement weights per rhythmic position plus the global scale.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Weights {
    downbeat: f64,
    eighth: f64,
    sixteenth: f64,
    scale: f64,
}

impl Weights {
    fn for_difficulty(d: Difficulty) -> Self {
        match d {
            Difficulty::Easy => Weights { downbeat: 0.9, eighth: 0.6, sixteenth: 0.18, scale: 1.05 },
            Difficulty::Normal => Weights { downbeat: 1.0, eighth: 0.75, sixteenth: 0.35, scale: 1.2 },
            Difficulty::Hard => Weights { downbeat: 1.0, eighth: 0.85, sixteenth: 0.5, scale: 1.35 },
        }
    }
}

/// Where a step falls inside its quarter note.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Downbeat,
    Eighth,
    Sixteenth,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BeatmapParams {
    pub bpm: f64,
    pub duration_ms: u32,
    pub density: f64,
    pub difficulty: Difficulty,
    pub seed: Seed,
    pub lane_count: usize,
}

impl BeatmapParams {
    pub fn new(bpm: f64, duration_ms: u32, density: f64, difficulty: Difficulty, seed: impl Into<Seed>) -> Self {
        Self { bpm, duration_ms, density, difficulty, seed: seed.into(), lane_count: LANE_COUNT }
    }

    /// Chart for `song` at `difficulty`, seeded from the song id.
    pub fn for_song(song: &SongDescriptor, difficulty: Difficulty, bpm_estimate: Option<u32>) -> Self {
        Self::new(
            song.resolve_bpm(bpm_estimate),
            song.duration_ms,
            song.density_for(difficulty),
            difficulty,
            song.id.as_str(),
        )
    }

    fn beat_ms(&self) -> f64 {
        let bpm = if self.bpm.is_finite() && self.bpm > 0.0 { self.bpm } else { DEFAULT_BPM };
        60_000.0 / bpm
    }
}

/// Step length (sixteenth note) and minimum gap between spawns, in ms.
fn step_and_gap(beat_ms: f64, difficulty: Difficulty) -> (f64, f64) {
    let step = (beat_ms / 4.0).round().max(MIN_STEP_MS);
    let default_gap = (step * 0.9).round().max(60.0);
    let gap = match difficulty {
        Difficulty::Easy => default_gap.max((beat_ms * 0.35).round()),
        Difficulty::Normal => default_gap,
        Difficulty::Hard => (step * 0.6).round().max(40.0),
    };
    (step, gap)
}

fn classify_phase(t: f64, beat_ms: f64, step: f64) -> Phase {
    let rem = t % beat_ms;
    let tol = (step * 0.5).round().min(8.0);
    if rem <= tol || (rem - beat_ms).abs() <= tol {
        Phase::Downbeat
    } else if (rem - beat_ms / 2.0).abs() <= tol {
        Phase::Eighth
    } else {
        Phase::Sixteenth
    }
}

fn lane_from(rng: &mut SeededRng, lane_count: usize) -> u8 {
    rng.next_index(lane_count) as u8
}

/// Generate the chart for `params`. Never returns an empty beatmap.
pub fn generate(params: &BeatmapParams) -> Beatmap {
    let beat_ms = params.beat_ms();
    let lane_count = params.lane_count.clamp(1, usize::from(u8::MAX));
    let density = if params.density.is_finite() { params.density.clamp(0.0, 1.0) } else { 0.0 };
    let duration = f64::from(params.duration_ms);
    let weights = Weights::for_difficulty(params.difficulty);
    let (step, min_gap) = step_and_gap(beat_ms, params.difficulty);
    let mut rng = SeededRng::from_seed(&params.seed);

    let mut notes = Vec::new();
    let mut last_spawn = f64::NEG_INFINITY;
    let mut t = step;
    while t < duration {
        let weight = match classify_phase(t, beat_ms, step) {
            Phase::Downbeat => weights.downbeat,
            Phase::Eighth => weights.eighth,
            Phase::Sixteenth => weights.sixteenth,
        };
        let prob = (density * weight * weights.scale).min(1.0);

        if rng.next_f64() <= prob && t - last_spawn >= min_gap {
            let time_ms = t.round() as u32;
            let lane = lane_from(&mut rng, lane_count);
            notes.push(Note { time_ms, lane });
            last_spawn = t;

            if rng.next_f64() < PAIRED_NOTE_CHANCE {
                let mut alt = lane_from(&mut rng, lane_count);
                let mut tries = 0;
                while alt == lane && tries < PAIR_LANE_RETRIES {
                    alt = lane_from(&mut rng, lane_count);
                    tries += 1;
                }
                notes.push(Note { time_ms, lane: alt });
            }
        }
        t += step;
    }

    if notes.is_empty() {
        notes = fallback_notes(duration, beat_ms, lane_count);
        log::debug!(
            "chart generation placed no notes (density {density}, {duration}ms), using {} fallback notes",
            notes.len()
        );
    }
    Beatmap { notes }
}

/// Quarter-note notes cycling through lanes, at least one.
fn fallback_notes(duration: f64, beat_ms: f64, lane_count: usize) -> Vec<Note> {
    let count = ((duration / beat_ms).floor() as usize).clamp(1, FALLBACK_MAX_NOTES);
    (0..count)
        .map(|i| Note {
            time_ms: (i as f64 * beat_ms).round() as u32,
            lane: (i % lane_count) as u8,
        })
        .collect()
}
