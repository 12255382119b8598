//! Band member skills: per-member READY/ACTIVE/COOLDOWN state machines and the
//! aggregate of effects the judgement step reads.
//!
//! Skill timers are entries in a [`TimerQueue`] on the session clock, tagged
//! with the id of the session that scheduled them. Entries from a discarded
//! session never touch live state.

use std::fmt;

pub const DEFAULT_COOLDOWN_MS: u32 = 10_000;
/// Added to a score multiplier per level above 1.
pub const LEVEL_MULTIPLIER_STEP: f64 = 0.15;
/// Added to a perfect bonus per level above 1.
pub const LEVEL_PERFECT_BONUS_STEP: f64 = 20.0;

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "skillType", rename_all = "camelCase", rename_all_fields = "camelCase")
)]
pub enum SkillKind {
    ScoreMultiplier { multiplier: f64 },
    GoodToPerfect,
    PerfectBoost { perfect_bonus: f64 },
    /// Instantaneous: heals and awards flat score, never enters ACTIVE.
    HealAndSmallScore { heal: u32, small_score: u32 },
}

impl SkillKind {
    pub fn is_instant(&self) -> bool {
        matches!(self, SkillKind::HealAndSmallScore { .. })
    }
}

/// A roster entry. Never mutated by gameplay; only [`Member::level_up`]
/// changes it, between sessions.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Member {
    pub id: String,
    pub name: String,
    pub skill_name: String,
    pub duration_ms: u32,
    pub cooldown_ms: u32,
    #[cfg_attr(feature = "serde", serde(default = "first_level"))]
    pub level: u32,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub skill: SkillKind,
}

#[cfg(feature = "serde")]
fn first_level() -> u32 {
    1
}

impl Member {
    /// Raise the level by one. Score multipliers gain 0.15 and perfect boosts
    /// gain 20 per level; other skills only change their level.
    pub fn level_up(&mut self) -> u32 {
        self.level = self.level.saturating_add(1);
        match &mut self.skill {
            SkillKind::ScoreMultiplier { multiplier } => *multiplier += LEVEL_MULTIPLIER_STEP,
            SkillKind::PerfectBoost { perfect_bonus } => *perfect_bonus += LEVEL_PERFECT_BONUS_STEP,
            SkillKind::GoodToPerfect | SkillKind::HealAndSmallScore { .. } => {}
        }
        self.level
    }

    fn effective_cooldown_ms(&self) -> u32 {
        if self.cooldown_ms == 0 { DEFAULT_COOLDOWN_MS } else { self.cooldown_ms }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct SkillState {
    pub is_active: bool,
    pub can_use: bool,
    pub last_activated_at_ms: Option<f64>,
    pub remaining_ms: f64,
}

impl Default for SkillState {
    fn default() -> Self {
        Self { is_active: false, can_use: true, last_activated_at_ms: None, remaining_ms: 0.0 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SkillPhase {
    Ready,
    Active,
    Cooldown,
}

impl fmt::Display for SkillPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkillPhase::Ready => "READY",
            SkillPhase::Active => "ACTIVE",
            SkillPhase::Cooldown => "COOLDOWN",
        })
    }
}

/// Runtime copy of a roster member owning its skill state.
#[derive(Clone, Debug, PartialEq)]
pub struct ActiveMember {
    pub member: Member,
    pub state: SkillState,
    /// Bumped on every activation so a late expiry from an earlier activation
    /// cannot end a newer one.
    activation: u32,
}

impl ActiveMember {
    pub fn new(member: Member) -> Self {
        Self { member, state: SkillState::default(), activation: 0 }
    }

    pub fn phase(&self) -> SkillPhase {
        if self.state.is_active {
            SkillPhase::Active
        } else if self.state.can_use {
            SkillPhase::Ready
        } else {
            SkillPhase::Cooldown
        }
    }
}

/// Combined effect of every ACTIVE member.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EffectAggregate {
    pub score_multiplier: f64,
    pub good_to_perfect: bool,
    pub perfect_bonus: f64,
}

impl Default for EffectAggregate {
    fn default() -> Self {
        Self { score_multiplier: 1.0, good_to_perfect: false, perfect_bonus: 0.0 }
    }
}

pub fn aggregate_effects(members: &[ActiveMember]) -> EffectAggregate {
    members
        .iter()
        .filter(|m| m.state.is_active)
        .fold(EffectAggregate::default(), |mut acc, m| {
            match m.member.skill {
                SkillKind::ScoreMultiplier { multiplier } => acc.score_multiplier *= multiplier,
                SkillKind::GoodToPerfect => acc.good_to_perfect = true,
                SkillKind::PerfectBoost { perfect_bonus } => acc.perfect_bonus += perfect_bonus,
                SkillKind::HealAndSmallScore { .. } => {}
            }
            acc
        })
}

// --- Timers -----------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerKind {
    /// ACTIVE ends.
    Expire,
    /// COOLDOWN ends, skill usable again.
    Ready,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timer {
    pub session_id: u64,
    pub slot: usize,
    pub activation: u32,
    pub due_ms: f64,
    pub kind: TimerKind,
}

/// Pending skill timers, kept sorted by due time.
#[derive(Clone, Debug, Default)]
pub struct TimerQueue {
    pending: Vec<Timer>,
}

impl TimerQueue {
    pub fn schedule(&mut self, timer: Timer) {
        let at = self.pending.partition_point(|t| t.due_ms <= timer.due_ms);
        self.pending.insert(at, timer);
    }

    /// Remove and return every timer of `session_id` due at or before `now_ms`.
    /// Timers from other sessions are dropped.
    pub fn pop_due(&mut self, session_id: u64, now_ms: f64) -> Vec<Timer> {
        let stale = self.pending.iter().filter(|t| t.session_id != session_id).count();
        if stale > 0 {
            log::debug!("dropping {stale} skill timers from a previous session");
            self.pending.retain(|t| t.session_id == session_id);
        }
        let split = self.pending.partition_point(|t| t.due_ms <= now_ms);
        self.pending.drain(..split).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

// --- Skill system -----------------------------------------------------------

/// What an activation did, for the session to apply.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Activation {
    /// Entered ACTIVE (or straight to COOLDOWN when the duration is zero).
    Timed { slot: usize },
    /// Instantaneous heal: apply `heal` HP and `score` points now.
    Instant { slot: usize, heal: u32, score: u32 },
}

#[derive(Clone, Debug, Default)]
pub struct SkillSystem {
    members: Vec<ActiveMember>,
    timers: TimerQueue,
    session_id: u64,
}

impl SkillSystem {
    /// Fresh runtime copies of `roster`, all READY.
    pub fn new(roster: &[Member], session_id: u64) -> Self {
        Self {
            members: roster.iter().cloned().map(ActiveMember::new).collect(),
            timers: TimerQueue::default(),
            session_id,
        }
    }

    /// Reset every member to READY for a new session. Timers already queued
    /// for the old id are dropped on the next `advance`.
    pub fn reset(&mut self, session_id: u64) {
        self.session_id = session_id;
        for m in &mut self.members {
            m.state = SkillState::default();
        }
    }

    pub fn members(&self) -> &[ActiveMember] {
        &self.members
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn aggregate(&self) -> EffectAggregate {
        aggregate_effects(&self.members)
    }

    pub fn phases(&self) -> Vec<SkillPhase> {
        self.members.iter().map(ActiveMember::phase).collect()
    }

    /// Request activation of `slot` at session time `now_ms`. `None` when the
    /// slot is empty or the skill is not usable.
    pub fn activate(&mut self, slot: usize, now_ms: f64) -> Option<Activation> {
        let session_id = self.session_id;
        let m = self.members.get_mut(slot)?;
        if !m.state.can_use {
            return None;
        }
        m.activation = m.activation.wrapping_add(1);
        m.state.can_use = false;
        m.state.last_activated_at_ms = Some(now_ms);
        let cooldown = f64::from(m.member.effective_cooldown_ms());
        let activation = m.activation;

        let result = match m.member.skill {
            SkillKind::HealAndSmallScore { heal, small_score } => {
                m.state.is_active = false;
                m.state.remaining_ms = 0.0;
                Activation::Instant { slot, heal, score: small_score }
            }
            _ => {
                let duration = f64::from(m.member.duration_ms);
                if duration > 0.0 {
                    m.state.is_active = true;
                    m.state.remaining_ms = duration;
                    self.timers.schedule(Timer {
                        session_id,
                        slot,
                        activation,
                        due_ms: now_ms + duration,
                        kind: TimerKind::Expire,
                    });
                }
                Activation::Timed { slot }
            }
        };
        log::debug!("skill slot {slot} activated at {now_ms:.0}ms: {result:?}");
        self.timers.schedule(Timer {
            session_id,
            slot,
            activation,
            due_ms: now_ms + cooldown,
            kind: TimerKind::Ready,
        });
        Some(result)
    }

    /// Fire due timers and refresh `remaining_ms`.
    pub fn advance(&mut self, now_ms: f64) {
        for timer in self.timers.pop_due(self.session_id, now_ms) {
            let Some(m) = self.members.get_mut(timer.slot) else { continue };
            match timer.kind {
                TimerKind::Expire if timer.activation == m.activation => {
                    m.state.is_active = false;
                    m.state.remaining_ms = 0.0;
                }
                TimerKind::Expire => {}
                TimerKind::Ready => m.state.can_use = true,
            }
        }
        for m in &mut self.members {
            if let (true, Some(at)) = (m.state.is_active, m.state.last_activated_at_ms) {
                m.state.remaining_ms = (at + f64::from(m.member.duration_ms) - now_ms).max(0.0);
            }
        }
    }

    #[cfg(test)]
    fn inject_timer(&mut self, timer: Timer) {
        self.timers.schedule(timer);
    }
}

/// Member a new ability pickup should trigger: a READY member if any, else any
/// member, else none. `pick` chooses among the candidates.
pub fn choose_pickup_target(members: &[ActiveMember], mut pick: impl FnMut(usize) -> usize) -> Option<usize> {
    let ready: Vec<usize> = members
        .iter()
        .enumerate()
        .filter(|(_, m)| m.state.can_use)
        .map(|(i, _)| i)
        .collect();
    let candidates: Vec<usize> = if ready.is_empty() { (0..members.len()).collect() } else { ready };
    if candidates.is_empty() {
        return None;
    }
    candidates.get(pick(candidates.len())).copied()
}
