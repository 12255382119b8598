//! Member catalog and the five-slot band the player takes into a session.

use crate::config::{ConfigError, MAX_ROSTER};
use crate::skills::{Member, SkillKind};

fn entry(id: &str, name: &str, skill_name: &str, duration_ms: u32, cooldown_ms: u32, skill: SkillKind) -> Member {
    Member {
        id: id.to_owned(),
        name: name.to_owned(),
        skill_name: skill_name.to_owned(),
        duration_ms,
        cooldown_ms,
        level: 1,
        skill,
    }
}

/// Every selectable member.
pub fn catalog() -> Vec<Member> {
    use SkillKind::*;
    vec![
        entry("c1", "Yui", "Double Score", 7000, 12000, ScoreMultiplier { multiplier: 2.0 }),
        entry("c2", "Rimi", "Good to Perfect", 6000, 15000, GoodToPerfect),
        entry("c3", "Arisa", "Perfect Boost", 7000, 14000, PerfectBoost { perfect_bonus: 100.0 }),
        entry("c4", "Kasumi", "Heal Beat", 0, 10000, HealAndSmallScore { heal: 30, small_score: 50 }),
        entry("c5", "Saaya", "Warm Groove", 8000, 12000, ScoreMultiplier { multiplier: 1.5 }),
        entry("c6", "Hina", "Spark Boost", 6000, 13000, PerfectBoost { perfect_bonus: 80.0 }),
        entry("c7", "Tae", "Steady Hands", 5000, 12000, GoodToPerfect),
        entry("c8", "Moca", "Lazy Heal", 0, 11000, HealAndSmallScore { heal: 20, small_score: 40 }),
        entry("c9", "Kokoro", "Smile Double", 5000, 15000, ScoreMultiplier { multiplier: 2.0 }),
        entry("c10", "Aya", "Idol Shine", 9000, 18000, PerfectBoost { perfect_bonus: 150.0 }),
        entry("c11", "Lisa", "Backup Vocals", 7000, 14000, ScoreMultiplier { multiplier: 1.8 }),
        entry("c12", "Eve", "Bushido Focus", 7000, 16000, GoodToPerfect),
        entry("c13", "Mina", "Bright Accent", 6000, 14000, PerfectBoost { perfect_bonus: 90.0 }),
        entry("c14", "Nana", "Encore Heal", 0, 12000, HealAndSmallScore { heal: 25, small_score: 45 }),
        entry("c15", "Rin", "Rhythm Drive", 7000, 15000, ScoreMultiplier { multiplier: 1.6 }),
    ]
}

pub fn find_member(id: &str) -> Option<Member> {
    catalog().into_iter().find(|m| m.id == id)
}

/// Up to five members in fixed slots. Slot order is the order the session
/// sees, so slot 0 is bound to key `1`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Roster {
    slots: [Option<Member>; MAX_ROSTER],
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill the first slots with the catalog members named by `ids`.
    pub fn from_ids<S: AsRef<str>>(ids: &[S]) -> Result<Self, ConfigError> {
        let mut roster = Self::new();
        for (slot, id) in ids.iter().enumerate() {
            let member = find_member(id.as_ref()).ok_or_else(|| ConfigError::UnknownMember(id.as_ref().to_owned()))?;
            roster.assign(slot, member)?;
        }
        Ok(roster)
    }

    /// Put `member` in `slot`, replacing whoever was there. A member can only
    /// occupy one slot.
    pub fn assign(&mut self, slot: usize, member: Member) -> Result<(), ConfigError> {
        if slot >= MAX_ROSTER {
            return Err(ConfigError::SlotOutOfRange(slot));
        }
        let taken_elsewhere = self
            .slots
            .iter()
            .enumerate()
            .any(|(i, m)| i != slot && m.as_ref().is_some_and(|m| m.id == member.id));
        if taken_elsewhere {
            return Err(ConfigError::DuplicateMember(member.id));
        }
        self.slots[slot] = Some(member);
        Ok(())
    }

    pub fn clear(&mut self, slot: usize) -> Result<Option<Member>, ConfigError> {
        self.slots
            .get_mut(slot)
            .map(Option::take)
            .ok_or(ConfigError::SlotOutOfRange(slot))
    }

    pub fn clear_all(&mut self) {
        self.slots = Default::default();
    }

    /// Level up the member in `slot`; `Ok(None)` for an empty slot.
    pub fn level_up(&mut self, slot: usize) -> Result<Option<u32>, ConfigError> {
        self.slots
            .get_mut(slot)
            .map(|m| m.as_mut().map(Member::level_up))
            .ok_or(ConfigError::SlotOutOfRange(slot))
    }

    pub fn get(&self, slot: usize) -> Option<&Member> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Assigned members in slot order, gaps skipped.
    pub fn members(&self) -> Vec<Member> {
        self.slots.iter().flatten().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
