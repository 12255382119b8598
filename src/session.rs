//! One play-through of a chart: note spawning and movement, lane presses,
//! ability pickups, HP and the Running/Paused/Ended state machine.
//!
//! Notes move a fixed number of pixels per `tick`, so the frame rate sets the
//! scroll speed just like the browser frame loop does. Skill timers run on the
//! session clock (the `elapsed_ms` passed to `tick`), which stands still while
//! the session is paused.

use crate::beatmap::{Beatmap, BeatmapParams, generate};
use crate::config::{LANE_COUNT, MAX_ROSTER, Settings, SongDescriptor};
use crate::judgement::{FRAMES_PER_SECOND, JudgementEvent, Tally, Thresholds, Tier, judge_hit};
use crate::results::SessionSummary;
use crate::rng::SeededRng;
use crate::skills::{Activation, EffectAggregate, Member, SkillPhase, SkillSystem, choose_pickup_target};

pub const FIELD_HEIGHT: f64 = 600.0;
pub const JUDGEMENT_LINE_Y: f64 = 550.0;

const PICKUP_HIT_PX: f64 = 40.0;
const PICKUP_SCORE: u32 = 50;
const PICKUP_START_Y: f64 = -20.0;
const PICKUP_SPEED_FACTOR: f64 = 0.9;
const PICKUP_DESPAWN_MARGIN: f64 = 50.0;
const FIRST_PICKUP_MS: (u32, u32) = (8_000, 15_000);
const PICKUP_INTERVAL_MS: (u32, u32) = (12_000, 22_000);
const PICKUP_SEED_SALT: u32 = 0x9E37_79B9;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EndReason {
    HpDepleted,
    TrackComplete,
    Quit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SessionState {
    Running,
    Paused,
    Ended(EndReason),
}

/// A note on the field. Removed as soon as it is hit or missed.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LiveNote {
    pub lane: usize,
    pub y: f64,
}

/// Falling ability bar; hitting it triggers `member_slot`'s skill.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Pickup {
    pub lane: usize,
    pub y: f64,
    pub member_slot: Option<usize>,
    pub spawned_at_ms: f64,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct MemberStatus {
    pub slot: usize,
    pub id: String,
    pub name: String,
    pub skill_name: String,
    pub phase: SkillPhase,
    pub remaining_ms: f64,
}

/// Everything a renderer needs for one frame.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Snapshot {
    pub state: SessionState,
    pub elapsed_ms: f64,
    pub score: u64,
    pub combo: u32,
    pub max_combo: u32,
    pub hp: u32,
    pub max_hp: u32,
    pub tally: Tally,
    pub note_height: f64,
    pub judgement_line_y: f64,
    pub notes: Vec<LiveNote>,
    pub pickups: Vec<Pickup>,
    pub members: Vec<MemberStatus>,
    pub any_skill_active: bool,
}

#[cfg(feature = "rng")]
fn pickup_seed(song_seed: u32) -> u32 {
    let mut buf = [0u8; 4];
    match getrandom::getrandom(&mut buf) {
        Ok(()) => u32::from_le_bytes(buf),
        Err(e) => {
            log::warn!("no entropy source ({e}), seeding pickups from the song");
            song_seed ^ PICKUP_SEED_SALT
        }
    }
}

#[cfg(not(feature = "rng"))]
fn pickup_seed(song_seed: u32) -> u32 {
    song_seed ^ PICKUP_SEED_SALT
}

#[derive(Clone, Debug)]
pub struct GameSession {
    session_id: u64,
    state: SessionState,
    beatmap: Beatmap,
    duration_ms: u32,
    thresholds: Thresholds,
    note_speed: f64,
    note_height: f64,

    score: u64,
    combo: u32,
    max_combo: u32,
    hp: u32,
    max_hp: u32,
    tally: Tally,
    elapsed_ms: f64,

    next_note_index: usize,
    live_notes: Vec<LiveNote>,
    pickups: Vec<Pickup>,
    next_pickup_ms: f64,
    pickup_seed: u32,
    pickup_rng: SeededRng,

    skills: SkillSystem,
    events: Vec<JudgementEvent>,
}

impl GameSession {
    /// Generate the chart for `song` and start a session on it.
    pub fn new(settings: &Settings, song: &SongDescriptor, roster: &[Member]) -> Self {
        Self::with_bpm_estimate(settings, song, None, roster)
    }

    /// Like [`GameSession::new`], using `bpm_estimate` when the song has no
    /// declared tempo.
    pub fn with_bpm_estimate(
        settings: &Settings,
        song: &SongDescriptor,
        bpm_estimate: Option<u32>,
        roster: &[Member],
    ) -> Self {
        let params = BeatmapParams::for_song(song, settings.difficulty, bpm_estimate);
        let seed = params.seed.to_u32();
        let beatmap = generate(&params);
        log::debug!(
            "chart for {:?}: {} notes at {} bpm ({})",
            song.id,
            beatmap.len(),
            params.bpm,
            settings.difficulty
        );
        Self::with_beatmap(settings, beatmap, song.duration_ms, roster, seed)
    }

    /// Start a session on a prepared chart. `seed` drives ability pickups.
    pub fn with_beatmap(settings: &Settings, beatmap: Beatmap, duration_ms: u32, roster: &[Member], seed: u32) -> Self {
        for problem in settings.problems() {
            log::warn!("{problem}; continuing with normalized values");
        }
        let roster = if roster.len() > MAX_ROSTER {
            log::warn!("roster has {} members, only the first {MAX_ROSTER} play", roster.len());
            &roster[..MAX_ROSTER]
        } else {
            roster
        };
        let note_speed = settings.effective_note_speed();
        let max_hp = settings.preset().max_hp;
        let pickup_seed = pickup_seed(seed);
        let mut pickup_rng = SeededRng::new(pickup_seed);
        let next_pickup_ms = f64::from(pickup_rng.range_inclusive(FIRST_PICKUP_MS.0, FIRST_PICKUP_MS.1));

        Self {
            session_id: 1,
            state: SessionState::Running,
            beatmap,
            duration_ms,
            thresholds: Thresholds::from_windows(&settings.windows(), note_speed, FRAMES_PER_SECOND),
            note_speed,
            note_height: settings.note_height(),
            score: 0,
            combo: 0,
            max_combo: 0,
            hp: max_hp,
            max_hp,
            tally: Tally::default(),
            elapsed_ms: 0.0,
            next_note_index: 0,
            live_notes: Vec::new(),
            pickups: Vec::new(),
            next_pickup_ms,
            pickup_seed,
            pickup_rng,
            skills: SkillSystem::new(roster, 1),
            events: Vec::new(),
        }
    }

    // --- Accessors ----------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    pub fn is_paused(&self) -> bool {
        self.state == SessionState::Paused
    }

    pub fn is_ended(&self) -> bool {
        matches!(self.state, SessionState::Ended(_))
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn beatmap(&self) -> &Beatmap {
        &self.beatmap
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn combo(&self) -> u32 {
        self.combo
    }

    pub fn max_combo(&self) -> u32 {
        self.max_combo
    }

    pub fn hp(&self) -> u32 {
        self.hp
    }

    pub fn max_hp(&self) -> u32 {
        self.max_hp
    }

    pub fn tally(&self) -> &Tally {
        &self.tally
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }

    pub fn live_notes(&self) -> &[LiveNote] {
        &self.live_notes
    }

    pub fn pickups(&self) -> &[Pickup] {
        &self.pickups
    }

    pub fn skills(&self) -> &SkillSystem {
        &self.skills
    }

    pub fn effects(&self) -> EffectAggregate {
        self.skills.aggregate()
    }

    // --- Frame update -------------------------------------------------------

    /// Advance to session time `elapsed_ms`: fire skill timers, spawn and move
    /// notes, count misses, run pickups and check for the end of the track.
    /// Does nothing unless the session is running.
    pub fn tick(&mut self, elapsed_ms: f64) {
        if !self.is_running() {
            return;
        }
        self.elapsed_ms = self.elapsed_ms.max(elapsed_ms);
        let now = self.elapsed_ms;
        self.skills.advance(now);

        while let Some(note) = self.beatmap.get(self.next_note_index) {
            if now < f64::from(note.time_ms) {
                break;
            }
            self.live_notes.push(LiveNote { lane: usize::from(note.lane), y: -self.note_height });
            self.next_note_index += 1;
        }

        self.move_notes();
        if self.is_ended() {
            return;
        }
        self.update_pickups(now);

        let track_done = now >= f64::from(self.duration_ms)
            && self.next_note_index >= self.beatmap.len()
            && self.live_notes.is_empty();
        if track_done {
            self.finish(EndReason::TrackComplete);
        }
    }

    fn move_notes(&mut self) {
        let speed = self.note_speed;
        let mut missed = Vec::new();
        self.live_notes.retain_mut(|n| {
            n.y += speed;
            if n.y > FIELD_HEIGHT {
                missed.push(n.lane);
                false
            } else {
                true
            }
        });
        // every note that left the field is tallied, even past the one that
        // drains the last HP
        for lane in missed {
            self.combo = 0;
            self.tally.record(Tier::Miss);
            if !self.is_ended() {
                self.emit(Tier::Miss, lane);
                self.damage(Tier::Miss.hp_damage());
            }
        }
    }

    fn update_pickups(&mut self, now: f64) {
        if now >= self.next_pickup_ms {
            self.spawn_pickup(now);
            let gap = self.pickup_rng.range_inclusive(PICKUP_INTERVAL_MS.0, PICKUP_INTERVAL_MS.1);
            self.next_pickup_ms = now + f64::from(gap);
        }
        let speed = self.note_speed * PICKUP_SPEED_FACTOR;
        self.pickups.retain_mut(|p| {
            p.y += speed;
            p.y <= FIELD_HEIGHT + PICKUP_DESPAWN_MARGIN
        });
    }

    fn spawn_pickup(&mut self, now: f64) {
        let lane = self.pickup_rng.next_index(LANE_COUNT);
        let rng = &mut self.pickup_rng;
        let member_slot = choose_pickup_target(self.skills.members(), |n| rng.next_index(n));
        log::debug!("ability pickup in lane {lane} for slot {member_slot:?} at {now:.0}ms");
        self.pickups.push(Pickup { lane, y: PICKUP_START_Y, member_slot, spawned_at_ms: now });
    }

    // --- Input --------------------------------------------------------------

    /// Handle a press of `lane` at the current session time.
    pub fn press_lane(&mut self, lane: usize) -> Option<JudgementEvent> {
        self.press_lane_at(lane, self.elapsed_ms)
    }

    /// Handle a press of `lane` at session time `now_ms` (never moves the clock
    /// backwards). A pickup in reach takes priority over notes. With nothing
    /// in reach the press breaks the combo but is not counted as a miss.
    pub fn press_lane_at(&mut self, lane: usize, now_ms: f64) -> Option<JudgementEvent> {
        if !self.is_running() || lane >= LANE_COUNT {
            return None;
        }
        self.sync_clock(now_ms);

        if self.hit_pickup(lane) {
            return Some(self.emit(Tier::Good, lane));
        }

        let effects = self.skills.aggregate();
        let reach = self.thresholds.reach();
        let nearest = self
            .live_notes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.lane == lane)
            .map(|(i, n)| (i, (n.y - JUDGEMENT_LINE_Y).abs()))
            .filter(|(_, d)| *d < reach)
            .min_by(|a, b| a.1.total_cmp(&b.1));
        let judged = nearest.and_then(|(idx, d)| judge_hit(&self.thresholds, d, &effects).map(|o| (idx, o)));

        let Some((idx, outcome)) = judged else {
            self.combo = 0;
            return Some(self.emit(Tier::Miss, lane));
        };

        self.live_notes.remove(idx);
        self.tally.record(outcome.tier);
        self.score += u64::from(outcome.score);
        if outcome.tier.continues_combo() {
            self.bump_combo();
        } else {
            self.combo = 0;
        }
        let event = self.emit(outcome.tier, lane);
        self.damage(outcome.tier.hp_damage());
        Some(event)
    }

    /// The newest pickup in reach wins when two overlap.
    fn hit_pickup(&mut self, lane: usize) -> bool {
        let Some(idx) = self
            .pickups
            .iter()
            .rposition(|p| p.lane == lane && (p.y - JUDGEMENT_LINE_Y).abs() < PICKUP_HIT_PX)
        else {
            return false;
        };
        let pickup = self.pickups.remove(idx);
        let member_count = self.skills.members().len();
        let slot = match pickup.member_slot {
            Some(slot) if slot < member_count => Some(slot),
            _ => (member_count > 0).then_some(0),
        };
        if let Some(slot) = slot {
            self.activate_slot(slot);
        }
        self.score += u64::from(PICKUP_SCORE);
        self.bump_combo();
        true
    }

    /// Activate the skill in roster `slot` (keys 1-5).
    pub fn activate_member(&mut self, slot: usize) -> Option<Activation> {
        if !self.is_running() {
            return None;
        }
        self.skills.advance(self.elapsed_ms);
        self.activate_slot(slot)
    }

    fn activate_slot(&mut self, slot: usize) -> Option<Activation> {
        let activation = self.skills.activate(slot, self.elapsed_ms)?;
        if let Activation::Instant { heal, score, .. } = activation {
            self.hp = self.hp.saturating_add(heal).min(self.max_hp);
            self.score += u64::from(score);
        }
        Some(activation)
    }

    fn sync_clock(&mut self, now_ms: f64) {
        self.elapsed_ms = self.elapsed_ms.max(now_ms);
        self.skills.advance(self.elapsed_ms);
    }

    fn bump_combo(&mut self) {
        self.combo += 1;
        self.max_combo = self.max_combo.max(self.combo);
    }

    fn damage(&mut self, amount: u32) {
        if amount == 0 {
            return;
        }
        self.hp = self.hp.saturating_sub(amount);
        if self.hp == 0 {
            self.finish(EndReason::HpDepleted);
        }
    }

    fn emit(&mut self, tier: Tier, lane: usize) -> JudgementEvent {
        let event = JudgementEvent { tier, lane };
        self.events.push(event);
        event
    }

    /// Judgement events since the previous call, oldest first.
    pub fn drain_events(&mut self) -> Vec<JudgementEvent> {
        std::mem::take(&mut self.events)
    }

    // --- Session control ----------------------------------------------------

    /// Returns whether the session was running.
    pub fn pause(&mut self) -> bool {
        if self.is_running() {
            self.state = SessionState::Paused;
            true
        } else {
            false
        }
    }

    pub fn resume(&mut self) -> bool {
        if self.is_paused() {
            self.state = SessionState::Running;
            true
        } else {
            false
        }
    }

    pub fn toggle_pause(&mut self) {
        if !self.pause() {
            self.resume();
        }
    }

    /// Quit. No-op once the session has ended.
    pub fn end(&mut self) {
        self.finish(EndReason::Quit);
    }

    fn finish(&mut self, reason: EndReason) {
        if self.is_ended() {
            return;
        }
        self.state = SessionState::Ended(reason);
        log::info!(
            "session {} ended ({reason:?}): score {}, max combo {}, {:?}",
            self.session_id,
            self.score,
            self.max_combo,
            self.tally
        );
    }

    /// Replay the same chart from the start under a new session id. Skill
    /// timers left over from the previous run are discarded.
    pub fn restart(&mut self) {
        self.session_id += 1;
        self.skills.reset(self.session_id);
        self.pickup_rng = SeededRng::new(self.pickup_seed);
        self.next_pickup_ms = f64::from(self.pickup_rng.range_inclusive(FIRST_PICKUP_MS.0, FIRST_PICKUP_MS.1));
        self.state = SessionState::Running;
        self.score = 0;
        self.combo = 0;
        self.max_combo = 0;
        self.hp = self.max_hp;
        self.tally = Tally::default();
        self.elapsed_ms = 0.0;
        self.next_note_index = 0;
        self.live_notes.clear();
        self.pickups.clear();
        self.events.clear();
        log::debug!("restarted as session {}", self.session_id);
    }

    // --- Output -------------------------------------------------------------

    pub fn member_status(&self) -> Vec<MemberStatus> {
        self.skills
            .members()
            .iter()
            .enumerate()
            .map(|(slot, m)| MemberStatus {
                slot,
                id: m.member.id.clone(),
                name: m.member.name.clone(),
                skill_name: m.member.skill_name.clone(),
                phase: m.phase(),
                remaining_ms: m.state.remaining_ms,
            })
            .collect()
    }

    pub fn snapshot(&self) -> Snapshot {
        let members = self.member_status();
        let any_skill_active = members.iter().any(|m| m.phase == SkillPhase::Active);
        Snapshot {
            state: self.state,
            elapsed_ms: self.elapsed_ms,
            score: self.score,
            combo: self.combo,
            max_combo: self.max_combo,
            hp: self.hp,
            max_hp: self.max_hp,
            tally: self.tally,
            note_height: self.note_height,
            judgement_line_y: JUDGEMENT_LINE_Y,
            notes: self.live_notes.clone(),
            pickups: self.pickups.clone(),
            members,
            any_skill_active,
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary::new(self.score, self.max_combo, self.tally)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beatmap::Note;
    use crate::config::Difficulty;
    use crate::roster::find_member;

    fn note(time_ms: u32, lane: u8) -> Note {
        Note { time_ms, lane }
    }

    fn session(notes: Vec<Note>, roster: &[Member]) -> GameSession {
        GameSession::with_beatmap(&Settings::default(), Beatmap::from_notes(notes), 10_000, roster, 7)
    }

    /// Tick frames `from..=to`, one every 10ms of session time.
    fn run_frames(s: &mut GameSession, from: u32, to: u32) {
        for k in from..=to {
            s.tick(f64::from(k) * 10.0);
        }
    }

    #[test]
    fn test_notes_spawn_above_field_and_fall() {
        let mut s = session(vec![note(0, 0), note(100, 1)], &[]);
        s.tick(0.0);
        assert_eq!(s.live_notes(), &[LiveNote { lane: 0, y: -15.0 }]);
        s.tick(100.0);
        assert_eq!(s.live_notes().len(), 2);
        assert_eq!(s.live_notes()[1].y, -15.0);
        assert_eq!(s.live_notes()[0].y, -10.0);
    }

    #[test]
    fn test_combo_sequence_and_miss_damage() {
        // lane 0 reaches the line on frame 113, lane 1 is 35px short of it then,
        // lane 2 falls off on frame 124, lane 3 reaches the line on frame 133
        let mut s = session(vec![note(0, 0), note(70, 1), note(0, 2), note(200, 3)], &[]);
        let mut combos = Vec::new();

        run_frames(&mut s, 0, 113);
        assert_eq!(s.press_lane(0).map(|e| e.tier), Some(Tier::Perfect));
        combos.push(s.combo());
        assert_eq!(s.press_lane(1).map(|e| e.tier), Some(Tier::Good));
        combos.push(s.combo());

        run_frames(&mut s, 114, 124);
        assert_eq!(s.tally().miss, 1);
        combos.push(s.combo());

        run_frames(&mut s, 125, 133);
        assert_eq!(s.press_lane(3).map(|e| e.tier), Some(Tier::Perfect));
        combos.push(s.combo());

        assert_eq!(combos, [1, 2, 0, 1]);
        assert_eq!(s.max_combo(), 2);
        assert_eq!(s.hp(), Difficulty::Normal.preset().max_hp - 10);
        assert_eq!(s.score(), 250);
        let tiers: Vec<Tier> = s.drain_events().into_iter().map(|e| e.tier).collect();
        assert_eq!(tiers, [Tier::Perfect, Tier::Good, Tier::Miss, Tier::Perfect]);
        assert!(s.drain_events().is_empty());
    }

    #[test]
    fn test_stacked_multipliers_on_perfect() {
        let roster = [find_member("c1").unwrap(), find_member("c5").unwrap()];
        let mut s = session(vec![note(0, 0)], &roster);
        assert!(s.activate_member(0).is_some());
        assert!(s.activate_member(1).is_some());
        run_frames(&mut s, 0, 113);
        s.press_lane(0);
        assert_eq!(s.score(), 300);
    }

    #[test]
    fn test_levelled_multiplier_on_perfect() {
        let mut yui = find_member("c1").unwrap();
        yui.level_up();
        let mut s = session(vec![note(0, 0)], &[yui]);
        s.activate_member(0);
        run_frames(&mut s, 0, 113);
        assert_eq!(s.press_lane(0).map(|e| e.tier), Some(Tier::Perfect));
        assert_eq!(s.score(), (100.0f64 * 2.15).round() as u64);
    }

    #[test]
    fn test_press_reads_effects_at_press_time() {
        // c1 doubles score for 7000ms from t=0; the note sits on the line
        // from frame 113 (t=1130) on
        let mut s = session(vec![note(0, 0), note(0, 1)], &[find_member("c1").unwrap()]);
        s.activate_member(0);
        run_frames(&mut s, 0, 113);
        assert_eq!(s.press_lane_at(0, 1_135.0).map(|e| e.tier), Some(Tier::Perfect));
        assert_eq!(s.score(), 200);

        // no frame runs between the expiry and this press
        assert_eq!(s.press_lane_at(1, 7_500.0).map(|e| e.tier), Some(Tier::Perfect));
        assert_eq!(s.score(), 300);
        assert_eq!(s.skills().phases(), [SkillPhase::Cooldown]);
        assert_eq!(s.effects().score_multiplier, 1.0);
    }

    #[test]
    fn test_overlapping_pickups_newest_first() {
        let roster = [find_member("c1").unwrap(), find_member("c5").unwrap()];
        let mut s = session(vec![], &roster);
        s.tick(0.0);
        s.pickups = vec![
            Pickup { lane: 2, y: 545.0, member_slot: Some(0), spawned_at_ms: 0.0 },
            Pickup { lane: 2, y: 530.0, member_slot: Some(1), spawned_at_ms: 10.0 },
        ];
        assert_eq!(s.press_lane(2).map(|e| e.tier), Some(Tier::Good));
        assert_eq!(s.skills().phases(), [SkillPhase::Ready, SkillPhase::Active]);
        assert_eq!(s.pickups().len(), 1);
        assert_eq!(s.pickups()[0].member_slot, Some(0));
    }

    #[test]
    fn test_good_to_perfect_in_session() {
        let mut s = session(vec![note(70, 1)], &[find_member("c2").unwrap()]);
        s.activate_member(0);
        run_frames(&mut s, 0, 113);
        let event = s.press_lane(1).unwrap();
        assert_eq!(event.tier, Tier::Perfect);
        assert_eq!(s.tally().perfect, 1);
        assert_eq!(s.score(), 100);
    }

    #[test]
    fn test_bad_hit_breaks_combo_and_costs_hp() {
        // second note is 50px above the line on frame 113: bad (45..60)
        let mut s = session(vec![note(0, 0), note(100, 0)], &[]);
        run_frames(&mut s, 0, 113);
        s.press_lane(0);
        assert_eq!(s.combo(), 1);
        assert_eq!(s.press_lane(0).map(|e| e.tier), Some(Tier::Bad));
        assert_eq!(s.combo(), 0);
        assert_eq!(s.score(), 120);
        assert_eq!(s.hp(), 150);
    }

    #[test]
    fn test_empty_press_resets_combo_only() {
        let mut s = session(vec![note(0, 0), note(0, 1)], &[]);
        run_frames(&mut s, 0, 113);
        s.press_lane(0);
        assert_eq!(s.combo(), 1);
        let event = s.press_lane(2).unwrap();
        assert_eq!(event, JudgementEvent { tier: Tier::Miss, lane: 2 });
        assert_eq!(s.combo(), 0);
        assert_eq!(s.tally().miss, 0);
        assert_eq!(s.hp(), s.max_hp());
        // lanes outside the field are ignored
        assert_eq!(s.press_lane(LANE_COUNT), None);
    }

    #[test]
    fn test_press_picks_note_nearest_the_line() {
        // both in lane 0: the older one sits on the line, the newer 25px above
        let mut s = session(vec![note(0, 0), note(50, 0)], &[]);
        run_frames(&mut s, 0, 113);
        assert_eq!(s.press_lane(0).map(|e| e.tier), Some(Tier::Perfect));
        assert_eq!(s.live_notes().len(), 1);
        assert_eq!(s.live_notes()[0].y, 525.0);
    }

    #[test]
    fn test_hp_depletion_ends_session() {
        let settings = Settings { difficulty: Difficulty::Hard, ..Settings::default() };
        let notes = (0..16).map(|i| note(0, (i % 4) as u8)).collect();
        let mut s = GameSession::with_beatmap(&settings, Beatmap::from_notes(notes), 10_000, &[], 1);
        run_frames(&mut s, 0, 124);
        assert_eq!(s.state(), SessionState::Ended(EndReason::HpDepleted));
        assert_eq!(s.hp(), 0);
        // all 16 left the field in the same frame; 12 misses drain 120 HP
        assert_eq!(s.tally().miss, 16);
        assert!(s.live_notes().is_empty());
        assert_eq!(s.summary().tally.total(), 16);
        assert_eq!(s.drain_events().len(), 12);
        // ended sessions ignore further input
        assert_eq!(s.press_lane(0), None);
    }

    #[test]
    fn test_track_completes_after_last_note_leaves() {
        let mut s = GameSession::with_beatmap(
            &Settings::default(),
            Beatmap::from_notes(vec![note(0, 0)]),
            100,
            &[],
            1,
        );
        run_frames(&mut s, 0, 123);
        assert!(s.is_running());
        s.tick(1240.0);
        assert_eq!(s.state(), SessionState::Ended(EndReason::TrackComplete));
        assert_eq!(s.summary().tally.miss, 1);
    }

    #[test]
    fn test_pause_freezes_everything() {
        let mut s = session(vec![note(0, 0)], &[find_member("c1").unwrap()]);
        s.tick(0.0);
        s.activate_member(0);
        assert!(s.pause());
        s.tick(20_000.0);
        assert_eq!(s.live_notes()[0].y, -15.0);
        assert_eq!(s.elapsed_ms(), 0.0);
        assert_eq!(s.press_lane(0), None);
        assert_eq!(s.activate_member(0), None);
        s.toggle_pause();
        assert!(s.is_running());
        // skill timers follow the session clock, not wall time
        s.tick(10.0);
        assert_eq!(s.member_status()[0].phase, SkillPhase::Active);
    }

    #[test]
    fn test_heal_is_capped() {
        let mut s = session(vec![note(0, 0)], &[find_member("c4").unwrap()]);
        run_frames(&mut s, 0, 124);
        assert_eq!(s.hp(), 150);
        let act = s.activate_member(0);
        assert!(matches!(act, Some(Activation::Instant { heal: 30, score: 50, .. })));
        assert_eq!(s.hp(), 160);
        assert_eq!(s.score(), 50);
        assert_eq!(s.member_status()[0].phase, SkillPhase::Cooldown);
    }

    #[test]
    fn test_pickup_spawns_and_activates_member() {
        let notes = vec![note(59_000, 0)];
        let roster = [find_member("c1").unwrap()];
        let mut s = GameSession::with_beatmap(&Settings::default(), Beatmap::from_notes(notes), 60_000, &roster, 3);

        let mut t = 0.0;
        while s.pickups().is_empty() {
            assert!(t <= 15_000.0, "no pickup by {t}ms");
            s.tick(t);
            t += 100.0;
        }
        let pickup = s.pickups()[0];
        assert!(pickup.spawned_at_ms >= 8_000.0);
        assert_eq!(pickup.member_slot, Some(0));
        assert_eq!(pickup.y, PICKUP_START_Y + 4.5);

        // 120 more frames: 544.5px travelled, inside the 40px window
        for _ in 0..120 {
            s.tick(t);
            t += 10.0;
        }
        let event = s.press_lane(pickup.lane).unwrap();
        assert_eq!(event.tier, Tier::Good);
        assert_eq!(s.score(), 50);
        assert_eq!(s.combo(), 1);
        assert_eq!(s.member_status()[0].phase, SkillPhase::Active);
        assert!(s.pickups().iter().all(|p| p.spawned_at_ms != pickup.spawned_at_ms));
    }

    #[test]
    fn test_restart_discards_old_timers() {
        let mut s = session(vec![note(0, 0)], &[find_member("c1").unwrap()]);
        s.activate_member(0);
        let first_id = s.session_id();
        s.restart();
        assert_eq!(s.session_id(), first_id + 1);
        assert_eq!(s.score(), 0);
        assert_eq!(s.hp(), s.max_hp());

        s.tick(5_000.0);
        s.activate_member(0);
        // the old cooldown would have ended at 12000ms, the new one ends at 17000ms
        s.tick(12_500.0);
        assert_eq!(s.member_status()[0].phase, SkillPhase::Cooldown);
        s.tick(17_000.0);
        assert_eq!(s.member_status()[0].phase, SkillPhase::Ready);
    }

    #[test]
    fn test_restart_replays_same_chart() {
        let song = SongDescriptor::new("replay", Some(120.0), 8_000);
        let mut s = GameSession::new(&Settings::default(), &song, &[]);
        let chart = s.beatmap().clone();
        run_frames(&mut s, 0, 200);
        s.end();
        assert_eq!(s.state(), SessionState::Ended(EndReason::Quit));
        s.restart();
        assert!(s.is_running());
        assert_eq!(s.beatmap(), &chart);
        assert!(s.live_notes().is_empty());
        assert_eq!(s.elapsed_ms(), 0.0);
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let mut s = session(vec![note(0, 2)], &[find_member("c3").unwrap()]);
        s.activate_member(0);
        s.tick(0.0);
        let snap = s.snapshot();
        assert_eq!(snap.notes, vec![LiveNote { lane: 2, y: -15.0 }]);
        assert_eq!(snap.members[0].phase, SkillPhase::Active);
        assert!(snap.any_skill_active);
        assert_eq!(snap.hp, snap.max_hp);
        assert_eq!(snap.judgement_line_y, JUDGEMENT_LINE_Y);
    }
}
