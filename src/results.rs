//! Session-end summary: accuracy and letter rank.

use std::fmt;

use crate::judgement::Tally;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Rank {
    SS,
    S,
    A,
    B,
    C,
    D,
    F,
}

// (minimum accuracy, rank), best first
const RANK_TABLE: [(f64, Rank); 6] = [
    (0.985, Rank::SS),
    (0.97, Rank::S),
    (0.93, Rank::A),
    (0.88, Rank::B),
    (0.80, Rank::C),
    (0.70, Rank::D),
];

impl Rank {
    pub fn from_accuracy(accuracy: f64) -> Self {
        RANK_TABLE
            .iter()
            .find(|(min, _)| accuracy >= *min)
            .map(|(_, r)| *r)
            .unwrap_or(Rank::F)
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rank::SS => "SS",
            Rank::S => "S",
            Rank::A => "A",
            Rank::B => "B",
            Rank::C => "C",
            Rank::D => "D",
            Rank::F => "F",
        };
        f.write_str(s)
    }
}

/// Weighted accuracy in [0, 1]: perfect 100, great 90, good 60, bad 20, miss 0.
pub fn accuracy(tally: &Tally) -> f64 {
    let total = tally.total();
    if total == 0 {
        return 0.0;
    }
    let weighted = 100 * u64::from(tally.perfect)
        + 90 * u64::from(tally.great)
        + 60 * u64::from(tally.good)
        + 20 * u64::from(tally.bad);
    weighted as f64 / (f64::from(total) * 100.0)
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct SessionSummary {
    pub score: u64,
    pub max_combo: u32,
    pub tally: Tally,
    pub accuracy: f64,
    pub rank: Rank,
}

impl SessionSummary {
    pub fn new(score: u64, max_combo: u32, tally: Tally) -> Self {
        let accuracy = accuracy(&tally);
        Self { score, max_combo, tally, accuracy, rank: Rank::from_accuracy(accuracy) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_thresholds() {
        assert_eq!(Rank::from_accuracy(1.0), Rank::SS);
        assert_eq!(Rank::from_accuracy(0.985), Rank::SS);
        assert_eq!(Rank::from_accuracy(0.984), Rank::S);
        assert_eq!(Rank::from_accuracy(0.93), Rank::A);
        assert_eq!(Rank::from_accuracy(0.9), Rank::B);
        assert_eq!(Rank::from_accuracy(0.8), Rank::C);
        assert_eq!(Rank::from_accuracy(0.75), Rank::D);
        assert_eq!(Rank::from_accuracy(0.0), Rank::F);
    }

    #[test]
    fn test_accuracy_weights() {
        let tally = Tally { perfect: 1, great: 1, good: 1, bad: 1, miss: 1 };
        // (100 + 90 + 60 + 20 + 0) / 500
        assert!((accuracy(&tally) - 0.54).abs() < 1e-12);
        assert_eq!(accuracy(&Tally::default()), 0.0);
    }

    #[test]
    fn test_summary() {
        let tally = Tally { perfect: 97, great: 3, ..Tally::default() };
        let s = SessionSummary::new(9_940, 100, tally);
        assert!((s.accuracy - 0.997).abs() < 1e-12);
        assert_eq!(s.rank, Rank::SS);
        assert_eq!(s.rank.to_string(), "SS");
    }
}
