//! Browser driver: owns the live session, runs the `requestAnimationFrame`
//! loop and maps keyboard input to lanes and skill slots. Rendering stays on
//! the JS side, which polls [`snapshot_json`] each frame.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::window;

use crate::calibration::Calibration;
use crate::config::{ConfigError, Difficulty, MAX_ROSTER, Settings, SongDescriptor};
use crate::roster::{Roster, find_member};
use crate::skills::Member;
use crate::session::GameSession;

/// The metronome starts this long after the judge test is opened.
const JUDGE_TEST_LEAD_MS: f64 = 200.0;

// --- Session clock ----------------------------------------------------------

/// Session time built from frame timestamps. Only running frames add to it,
/// so a pause leaves no gap.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct SessionClock {
    last_frame_ms: Option<f64>,
    elapsed_ms: f64,
}

impl SessionClock {
    fn advance(&mut self, frame_ms: f64, running: bool) -> f64 {
        if let (true, Some(last)) = (running, self.last_frame_ms) {
            self.elapsed_ms += (frame_ms - last).max(0.0);
        }
        self.last_frame_ms = Some(frame_ms);
        self.elapsed_ms
    }

    /// Session time of an input event at `now_ms` (same origin as frames).
    fn time_at(&self, now_ms: f64, running: bool) -> f64 {
        match (running, self.last_frame_ms) {
            (true, Some(last)) => self.elapsed_ms + (now_ms - last).max(0.0),
            _ => self.elapsed_ms,
        }
    }
}

// --- Driver -----------------------------------------------------------------

struct Driver {
    session: GameSession,
    settings: Settings,
    clock: SessionClock,
    held: HashSet<String>,
}

impl Driver {
    fn new(session: GameSession, settings: Settings) -> Self {
        Self { session, settings, clock: SessionClock::default(), held: HashSet::new() }
    }

    fn frame(&mut self, frame_ms: f64) {
        let elapsed = self.clock.advance(frame_ms, self.session.is_running());
        self.session.tick(elapsed);
    }

    /// Returns whether the key did anything.
    fn key_down(&mut self, key: &str, now_ms: f64) -> bool {
        let key = key.to_lowercase();
        if let Some(lane) = self.settings.lane_for_key(&key) {
            // held lane keys are ignored until released
            if !self.held.insert(key) {
                return false;
            }
            let at = self.clock.time_at(now_ms, self.session.is_running());
            return self.session.press_lane_at(lane, at).is_some();
        }
        match key.parse::<usize>() {
            Ok(n @ 1..=MAX_ROSTER) => self.session.activate_member(n - 1).is_some(),
            _ => false,
        }
    }

    fn key_up(&mut self, key: &str) {
        self.held.remove(&key.to_lowercase());
    }

    fn restart(&mut self) {
        self.session.restart();
        self.clock = SessionClock::default();
        self.held.clear();
    }
}

struct JudgeTest {
    calibration: Calibration,
    base_ms: f64,
}

thread_local! {
    static DRIVER: RefCell<Option<Driver>> = const { RefCell::new(None) };
    static JUDGE_TEST: RefCell<Option<JudgeTest>> = const { RefCell::new(None) };
    static LOOP_STARTED: Cell<bool> = const { Cell::new(false) };
    static LISTENERS_INSTALLED: Cell<bool> = const { Cell::new(false) };
    /// Member levels above 1, by catalog id. Kept across sessions.
    static MEMBER_LEVELS: RefCell<HashMap<String, u32>> = RefCell::new(HashMap::new());
}

fn performance_now() -> f64 {
    window()
        .and_then(|w| w.performance())
        .map(|p| p.now())
        .unwrap_or(0.0)
}

fn with_driver<R>(f: impl FnOnce(&mut Driver) -> R) -> Option<R> {
    DRIVER.with(|cell| cell.borrow_mut().as_mut().map(f))
}

fn js_err(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

// --- Startup ----------------------------------------------------------------

fn launch(settings: Settings, song: SongDescriptor, bpm_estimate: Option<u32>, roster_ids: &[String]) -> Result<(), JsValue> {
    let roster = Roster::from_ids(roster_ids).map_err(js_err)?;
    let members = levelled(roster.members());
    let session = GameSession::with_bpm_estimate(&settings, &song, bpm_estimate, &members);
    log::info!(
        "starting {:?} on {} with {} members, {} notes",
        song.id,
        settings.difficulty,
        roster.len(),
        session.beatmap().len()
    );
    DRIVER.with(|cell| *cell.borrow_mut() = Some(Driver::new(session, settings)));
    install_key_listeners()?;
    start_frame_loop();
    Ok(())
}

/// Apply the stored levels to fresh catalog members.
fn levelled(mut members: Vec<Member>) -> Vec<Member> {
    MEMBER_LEVELS.with(|levels| {
        let levels = levels.borrow();
        for m in &mut members {
            let target = levels.get(&m.id).copied().unwrap_or(1);
            while m.level < target {
                m.level_up();
            }
        }
    });
    members
}

/// Start a session from JSON settings and song descriptor. `roster_ids` are
/// catalog ids in slot order.
#[cfg(feature = "serde_json")]
#[wasm_bindgen]
pub fn start_game(settings_json: &str, song_json: &str, roster_ids: Vec<String>, bpm_estimate: Option<u32>) -> Result<(), JsValue> {
    let settings = Settings::from_json(settings_json).map_err(js_err)?;
    let song: SongDescriptor = serde_json::from_str(song_json).map_err(js_err)?;
    launch(settings, song, bpm_estimate, &roster_ids)
}

/// Start a session with default settings at `difficulty`.
#[wasm_bindgen]
pub fn start_game_simple(
    song_id: &str,
    bpm: Option<f64>,
    duration_ms: u32,
    difficulty: &str,
    roster_ids: Vec<String>,
) -> Result<(), JsValue> {
    let settings = Settings { difficulty: Difficulty::from_name_or_default(difficulty), ..Settings::default() };
    launch(settings, SongDescriptor::new(song_id, bpm, duration_ms), None, &roster_ids)
}

fn install_key_listeners() -> Result<(), JsValue> {
    if LISTENERS_INSTALLED.with(Cell::get) {
        return Ok(());
    }
    let win = window().ok_or_else(|| JsValue::from_str("no window"))?;
    let doc = win.document().ok_or_else(|| JsValue::from_str("no document"))?;
    {
        let closure = Closure::wrap(Box::new(move |evt: web_sys::KeyboardEvent| {
            let now = performance_now();
            with_driver(|d| d.key_down(&evt.key(), now));
        }) as Box<dyn FnMut(_)>);
        doc.add_event_listener_with_callback("keydown", closure.as_ref().unchecked_ref())?;
        closure.forget();
    }
    {
        let closure = Closure::wrap(Box::new(move |evt: web_sys::KeyboardEvent| {
            with_driver(|d| d.key_up(&evt.key()));
        }) as Box<dyn FnMut(_)>);
        doc.add_event_listener_with_callback("keyup", closure.as_ref().unchecked_ref())?;
        closure.forget();
    }
    LISTENERS_INSTALLED.with(|c| c.set(true));
    Ok(())
}

type FrameCallback = Rc<RefCell<Option<Closure<dyn FnMut(f64)>>>>;

fn request_frame(cb: &FrameCallback) {
    if let (Some(w), Some(closure)) = (window(), cb.borrow().as_ref()) {
        let _ = w.request_animation_frame(closure.as_ref().unchecked_ref());
    }
}

/// One loop for the page's lifetime; it keeps running while paused or ended
/// and simply drives whichever session is current.
fn start_frame_loop() {
    if LOOP_STARTED.with(|c| c.replace(true)) {
        return;
    }
    let f: FrameCallback = Rc::new(RefCell::new(None));
    let g = f.clone();
    *g.borrow_mut() = Some(Closure::wrap(Box::new(move |ts: f64| {
        with_driver(|d| d.frame(ts));
        request_frame(&f);
    }) as Box<dyn FnMut(f64)>));
    request_frame(&g);
}

// --- Session control --------------------------------------------------------

#[wasm_bindgen]
pub fn pause_game() -> bool {
    with_driver(|d| d.session.pause()).unwrap_or(false)
}

#[wasm_bindgen]
pub fn resume_game() -> bool {
    with_driver(|d| d.session.resume()).unwrap_or(false)
}

#[wasm_bindgen]
pub fn toggle_pause() {
    with_driver(|d| d.session.toggle_pause());
}

#[wasm_bindgen]
pub fn restart_game() {
    with_driver(Driver::restart);
}

#[wasm_bindgen]
pub fn end_game() {
    with_driver(|d| d.session.end());
}

/// On-screen lane buttons.
#[wasm_bindgen]
pub fn press_lane(lane: usize) -> bool {
    let now = performance_now();
    with_driver(|d| {
        let at = d.clock.time_at(now, d.session.is_running());
        d.session.press_lane_at(lane, at).is_some()
    })
    .unwrap_or(false)
}

#[wasm_bindgen]
pub fn activate_member(slot: usize) -> bool {
    with_driver(|d| d.session.activate_member(slot).is_some()).unwrap_or(false)
}

/// "running", "paused", "ended" or "idle" when no session exists.
#[wasm_bindgen]
pub fn game_state() -> String {
    use crate::session::SessionState;
    with_driver(|d| match d.session.state() {
        SessionState::Running => "running",
        SessionState::Paused => "paused",
        SessionState::Ended(_) => "ended",
    })
    .unwrap_or("idle")
    .to_owned()
}

#[cfg(feature = "serde_json")]
#[wasm_bindgen]
pub fn snapshot_json() -> Option<String> {
    with_driver(|d| serde_json::to_string(&d.session.snapshot()))?
        .map_err(|e| log::error!("snapshot serialization failed: {e}"))
        .ok()
}

#[cfg(feature = "serde_json")]
#[wasm_bindgen]
pub fn summary_json() -> Option<String> {
    with_driver(|d| serde_json::to_string(&d.session.summary()))?
        .map_err(|e| log::error!("summary serialization failed: {e}"))
        .ok()
}

/// Judgement events since the last call, as a JSON array.
#[cfg(feature = "serde_json")]
#[wasm_bindgen]
pub fn drain_events_json() -> Option<String> {
    with_driver(|d| serde_json::to_string(&d.session.drain_events()))?
        .map_err(|e| log::error!("event serialization failed: {e}"))
        .ok()
}

#[cfg(feature = "serde_json")]
#[wasm_bindgen]
pub fn catalog_json() -> Result<String, JsValue> {
    serde_json::to_string(&crate::roster::catalog()).map_err(js_err)
}

// --- Member levels ----------------------------------------------------------

/// Level up a catalog member; applies from the next started session.
#[wasm_bindgen]
pub fn level_up_member(id: &str) -> Result<u32, JsValue> {
    let mut member = find_member(id).ok_or_else(|| js_err(ConfigError::UnknownMember(id.to_owned())))?;
    let level = MEMBER_LEVELS.with(|levels| {
        let mut levels = levels.borrow_mut();
        let entry = levels.entry(member.id.clone()).or_insert(1);
        while member.level < *entry {
            member.level_up();
        }
        *entry = member.level_up();
        *entry
    });
    log::info!("{id} is now level {level}");
    Ok(level)
}

#[wasm_bindgen]
pub fn member_level(id: &str) -> u32 {
    MEMBER_LEVELS.with(|levels| levels.borrow().get(id).copied().unwrap_or(1))
}

// --- Judge test & tempo -----------------------------------------------------

#[wasm_bindgen]
pub fn start_judge_test(bpm: f64) {
    let test = JudgeTest { calibration: Calibration::new(bpm), base_ms: performance_now() + JUDGE_TEST_LEAD_MS };
    JUDGE_TEST.with(|cell| *cell.borrow_mut() = Some(test));
}

/// Record a tap; returns its offset from the nearest metronome beat in ms.
#[wasm_bindgen]
pub fn judge_test_press() -> Option<f64> {
    let now = performance_now();
    JUDGE_TEST.with(|cell| {
        cell.borrow_mut()
            .as_mut()
            .map(|t| t.calibration.record_press(now, t.base_ms) as f64)
    })
}

/// `[perfect_ms, good_ms]`, empty until a tap was recorded.
#[wasm_bindgen]
pub fn suggest_windows() -> Vec<u32> {
    JUDGE_TEST.with(|cell| {
        cell.borrow()
            .as_ref()
            .and_then(|t| t.calibration.suggest())
            .map(|s| vec![s.perfect_ms, s.good_ms])
            .unwrap_or_default()
    })
}

#[wasm_bindgen]
pub fn stop_judge_test() {
    JUDGE_TEST.with(|cell| *cell.borrow_mut() = None);
}

/// Tempo of decoded mono audio, for songs without a declared bpm.
#[wasm_bindgen]
pub fn estimate_song_bpm(samples: &[f32], sample_rate: u32) -> Option<u32> {
    crate::tempo::estimate_bpm(samples, sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beatmap::{Beatmap, Note};
    use crate::judgement::Tier;
    use crate::roster::find_member;
    use crate::skills::{SkillKind, SkillPhase};

    fn driver(notes: Vec<Note>) -> Driver {
        let settings = Settings::default();
        let roster = [find_member("c1").unwrap()];
        let session = GameSession::with_beatmap(&settings, Beatmap::from_notes(notes), 10_000, &roster, 1);
        Driver::new(session, settings)
    }

    #[test]
    fn test_member_levels_apply_to_new_sessions() {
        assert_eq!(member_level("c1"), 1);
        assert_eq!(level_up_member("c1").unwrap(), 2);
        assert_eq!(level_up_member("c1").unwrap(), 3);
        assert_eq!(member_level("c1"), 3);

        let members = levelled(vec![find_member("c1").unwrap(), find_member("c2").unwrap()]);
        assert_eq!(members[0].level, 3);
        assert_eq!(members[1].level, 1);
        match members[0].skill {
            SkillKind::ScoreMultiplier { multiplier } => assert!((multiplier - 2.3).abs() < 1e-9),
            ref other => panic!("unexpected skill {other:?}"),
        }
    }

    #[test]
    fn test_clock_skips_paused_frames() {
        let mut clock = SessionClock::default();
        assert_eq!(clock.advance(1000.0, true), 0.0);
        assert_eq!(clock.advance(1016.0, true), 16.0);
        assert_eq!(clock.advance(5000.0, false), 16.0);
        assert_eq!(clock.advance(5016.0, true), 32.0);
        assert_eq!(clock.time_at(5020.0, true), 36.0);
        assert_eq!(clock.time_at(5020.0, false), 32.0);
    }

    #[test]
    fn test_lane_key_hits_and_repeat_is_ignored() {
        let mut d = driver(vec![Note { time_ms: 0, lane: 1 }, Note { time_ms: 0, lane: 1 }]);
        for k in 0..114 {
            d.frame(f64::from(k) * 10.0);
        }
        assert!(d.key_down("F", 1130.0));
        assert_eq!(d.session.drain_events()[0].tier, Tier::Perfect);
        // still held: the second note is not judged
        assert!(!d.key_down("f", 1131.0));
        assert_eq!(d.session.live_notes().len(), 1);
        d.key_up("F");
        assert!(d.key_down("f", 1132.0));
        assert_eq!(d.session.combo(), 2);
    }

    #[test]
    fn test_number_keys_activate_slots() {
        let mut d = driver(vec![Note { time_ms: 0, lane: 0 }]);
        d.frame(0.0);
        assert!(d.key_down("1", 0.0));
        assert_eq!(d.session.member_status()[0].phase, SkillPhase::Active);
        assert!(!d.key_down("2", 0.0));
        assert!(!d.key_down("x", 0.0));
    }

    #[test]
    fn test_restart_resets_clock() {
        let mut d = driver(vec![Note { time_ms: 0, lane: 0 }]);
        d.frame(0.0);
        d.frame(500.0);
        d.key_down("d", 500.0);
        d.restart();
        assert_eq!(d.clock, SessionClock::default());
        assert!(d.held.is_empty());
        d.frame(9000.0);
        assert_eq!(d.session.elapsed_ms(), 0.0);
    }
}
