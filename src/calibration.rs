//! Judge test: tap along to a metronome and derive suggested windows from the
//! spread of the tap offsets.

const MIN_BPM: f64 = 40.0;
const MAX_BPM: f64 = 240.0;
const DEFAULT_BPM: f64 = 100.0;
const MIN_PERFECT_MS: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct WindowSuggestion {
    pub perfect_ms: u32,
    pub good_ms: u32,
}

#[derive(Clone, Debug)]
pub struct Calibration {
    beat_ms: f64,
    deltas: Vec<i64>,
}

impl Calibration {
    /// Metronome at `bpm`, clamped to 40..=240 (100 when not a number).
    pub fn new(bpm: f64) -> Self {
        let bpm = if bpm.is_finite() && bpm > 0.0 { bpm.clamp(MIN_BPM, MAX_BPM) } else { DEFAULT_BPM };
        Self { beat_ms: 60_000.0 / bpm, deltas: Vec::new() }
    }

    pub fn beat_ms(&self) -> f64 {
        self.beat_ms
    }

    /// Record a tap at `now_ms` against a metronome that started at `base_ms`.
    /// Returns the signed offset to the nearest beat (positive = late).
    pub fn record_press(&mut self, now_ms: f64, base_ms: f64) -> i64 {
        let idx = ((now_ms - base_ms) / self.beat_ms).round();
        let nearest = base_ms + idx * self.beat_ms;
        let delta = (now_ms - nearest).round() as i64;
        self.deltas.push(delta);
        delta
    }

    pub fn deltas(&self) -> &[i64] {
        &self.deltas
    }

    /// Up to `n` most recent offsets, oldest first.
    pub fn last_deltas(&self, n: usize) -> &[i64] {
        &self.deltas[self.deltas.len().saturating_sub(n)..]
    }

    pub fn clear(&mut self) {
        self.deltas.clear();
    }

    /// Perfect from the 25th percentile of |offset|, good from the 75th (at
    /// least 1.6x perfect). `None` until a tap was recorded.
    pub fn suggest(&self) -> Option<WindowSuggestion> {
        if self.deltas.is_empty() {
            return None;
        }
        let mut abs: Vec<u64> = self.deltas.iter().map(|d| d.unsigned_abs()).collect();
        abs.sort_unstable();
        let at = |q: f64| abs[((abs.len() as f64 * q).floor() as usize).min(abs.len() - 1)] as f64;
        let p25 = at(0.25);
        let p75 = at(0.75);
        Some(WindowSuggestion {
            perfect_ms: (p25.round() as u32).max(MIN_PERFECT_MS),
            good_ms: (p75.round() as u32).max((p25 * 1.6).round() as u32),
        })
    }
}
