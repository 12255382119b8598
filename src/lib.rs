//! Band Rush core crate.
//!
//! Four-lane rhythm game engine: seeded chart generation, pixel-distance
//! timing judgement, band member skills and the per-frame session update. The
//! engine is plain Rust and runs natively; the `web` module wires it to the
//! browser frame loop and keyboard.

use wasm_bindgen::prelude::*;

pub mod beatmap;
pub mod calibration;
pub mod config;
pub mod judgement;
pub mod logging;
pub mod results;
pub mod rng;
pub mod roster;
pub mod session;
pub mod skills;
pub mod tempo;
pub mod web;

pub use beatmap::{Beatmap, BeatmapParams, Note, generate};
pub use config::{ConfigError, Difficulty, Settings, SongDescriptor};
pub use judgement::{JudgementEvent, JudgementWindows, Tally, Thresholds, Tier};
pub use results::{Rank, SessionSummary};
pub use rng::{Seed, SeededRng};
pub use roster::Roster;
pub use session::{EndReason, GameSession, SessionState, Snapshot};
pub use skills::{Member, SkillKind, SkillPhase};

// Optional small allocator for size (feature gated)
#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn wasm_start() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
    logging::init();
}
