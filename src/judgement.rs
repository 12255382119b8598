//! Timing judgement: millisecond windows, pixel thresholds and tier scoring.
//!
//! Notes fall a fixed number of pixels per frame, so a millisecond window maps
//! to a pixel distance from the judgement line via
//! `threshold = window_ms * speed * fps / 1000`.

use std::fmt;

use crate::skills::EffectAggregate;

pub const FRAMES_PER_SECOND: f64 = 60.0;

/// Minimum spacing (px) each threshold keeps above the previous one.
const MIN_PERFECT_PX: f64 = 4.0;
const GREAT_MARGIN_PX: f64 = 4.0;
const GOOD_MARGIN_PX: f64 = 6.0;
const BAD_MARGIN_PX: f64 = 8.0;

/// HP lost on a Bad hit or a Miss.
pub const HP_DAMAGE: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Tier {
    Perfect,
    Great,
    Good,
    Bad,
    Miss,
}

impl Tier {
    pub const ALL: [Tier; 5] = [Tier::Perfect, Tier::Great, Tier::Good, Tier::Bad, Tier::Miss];

    pub fn base_score(self) -> u32 {
        match self {
            Tier::Perfect => 100,
            Tier::Great => 80,
            Tier::Good => 50,
            Tier::Bad => 20,
            Tier::Miss => 0,
        }
    }

    /// Perfect, Great and Good keep the combo going.
    pub fn continues_combo(self) -> bool {
        matches!(self, Tier::Perfect | Tier::Great | Tier::Good)
    }

    pub fn hp_damage(self) -> u32 {
        match self {
            Tier::Bad | Tier::Miss => HP_DAMAGE,
            _ => 0,
        }
    }

    /// Tiers a good-to-perfect skill may promote.
    pub fn is_upgradeable(self) -> bool {
        matches!(self, Tier::Great | Tier::Good)
    }

    pub fn label(self) -> &'static str {
        match self {
            Tier::Perfect => "Perfect",
            Tier::Great => "Great",
            Tier::Good => "Good",
            Tier::Bad => "Bad",
            Tier::Miss => "Miss",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Configured judgement windows in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JudgementWindows {
    pub perfect_ms: f64,
    pub great_ms: f64,
    pub good_ms: f64,
    pub bad_ms: f64,
}

impl Default for JudgementWindows {
    fn default() -> Self {
        Self { perfect_ms: 50.0, great_ms: 100.0, good_ms: 150.0, bad_ms: 200.0 }
    }
}

impl JudgementWindows {
    pub fn is_ascending(&self) -> bool {
        self.perfect_ms < self.great_ms && self.great_ms < self.good_ms && self.good_ms < self.bad_ms
    }
}

/// Pixel-distance thresholds derived from the windows, strictly ascending.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Thresholds {
    pub perfect: f64,
    pub great: f64,
    pub good: f64,
    pub bad: f64,
}

impl Thresholds {
    /// Convert windows to distances. Colliding or inverted windows are padded
    /// upward so perfect < great < good < bad always holds.
    pub fn from_windows(windows: &JudgementWindows, note_speed: f64, fps: f64) -> Self {
        let px_per_ms = note_speed * fps / 1000.0;
        let px = |ms: f64| {
            let v = (ms * px_per_ms).round();
            if v.is_finite() { v } else { 0.0 }
        };
        let perfect = px(windows.perfect_ms).max(MIN_PERFECT_PX);
        let great = px(windows.great_ms).max(perfect + GREAT_MARGIN_PX);
        let good = px(windows.good_ms).max(great + GOOD_MARGIN_PX);
        let bad = px(windows.bad_ms).max(good + BAD_MARGIN_PX);
        Self { perfect, great, good, bad }
    }

    /// Tier for a note `distance_px` away from the judgement line, `None` when
    /// the note is out of reach.
    pub fn classify(&self, distance_px: f64) -> Option<Tier> {
        let d = distance_px.abs();
        if d < self.perfect {
            Some(Tier::Perfect)
        } else if d < self.great {
            Some(Tier::Great)
        } else if d < self.good {
            Some(Tier::Good)
        } else if d < self.bad {
            Some(Tier::Bad)
        } else {
            None
        }
    }

    /// Outermost distance that still counts as a hit.
    pub fn reach(&self) -> f64 {
        self.bad
    }
}

/// Promote Great/Good to Perfect while a good-to-perfect skill is active.
pub fn apply_effects(tier: Tier, effects: &EffectAggregate) -> Tier {
    if effects.good_to_perfect && tier.is_upgradeable() {
        Tier::Perfect
    } else {
        tier
    }
}

/// Points awarded for `tier` under the active effects.
pub fn score_for(tier: Tier, effects: &EffectAggregate) -> u32 {
    let bonus = if tier == Tier::Perfect { effects.perfect_bonus } else { 0.0 };
    let raw = (f64::from(tier.base_score()) + bonus) * effects.score_multiplier;
    raw.round().max(0.0) as u32
}

/// A judged hit: final tier after effects plus the points it earned.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HitOutcome {
    pub raw_tier: Tier,
    pub tier: Tier,
    pub score: u32,
}

/// Classify a distance and score it against the live aggregate.
pub fn judge_hit(thresholds: &Thresholds, distance_px: f64, effects: &EffectAggregate) -> Option<HitOutcome> {
    let raw_tier = thresholds.classify(distance_px)?;
    let tier = apply_effects(raw_tier, effects);
    Some(HitOutcome { raw_tier, tier, score: score_for(tier, effects) })
}

/// Discrete judgement for UI feedback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JudgementEvent {
    pub tier: Tier,
    pub lane: usize,
}

/// Per-tier counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tally {
    pub perfect: u32,
    pub great: u32,
    pub good: u32,
    pub bad: u32,
    pub miss: u32,
}

impl Tally {
    pub fn record(&mut self, tier: Tier) {
        *self.slot(tier) += 1;
    }

    pub fn count(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Perfect => self.perfect,
            Tier::Great => self.great,
            Tier::Good => self.good,
            Tier::Bad => self.bad,
            Tier::Miss => self.miss,
        }
    }

    pub fn total(&self) -> u32 {
        Tier::ALL.iter().map(|t| self.count(*t)).sum()
    }

    fn slot(&mut self, tier: Tier) -> &mut u32 {
        match tier {
            Tier::Perfect => &mut self.perfect,
            Tier::Great => &mut self.great,
            Tier::Good => &mut self.good,
            Tier::Bad => &mut self.bad,
            Tier::Miss => &mut self.miss,
        }
    }
}
