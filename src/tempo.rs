//! Tempo estimation for songs without a declared bpm: an RMS energy envelope
//! autocorrelated over the 50..=200 bpm lag range.

const ENVELOPE_RATE: f64 = 200.0;
const MIN_ENVELOPE_FRAMES: usize = 20;
const MIN_BPM: u32 = 50;
const MAX_BPM: u32 = 200;

/// RMS of consecutive `factor`-sample chunks (the last chunk may be short).
fn envelope(samples: &[f32], factor: usize) -> Vec<f64> {
    samples
        .chunks(factor)
        .map(|chunk| {
            let sum: f64 = chunk.iter().map(|&v| f64::from(v) * f64::from(v)).sum();
            (sum / chunk.len() as f64).sqrt()
        })
        .collect()
}

/// Estimate the tempo of mono `samples` at `sample_rate` Hz. `None` when the
/// clip is too short or the best period falls outside 50..=200 bpm.
pub fn estimate_bpm(samples: &[f32], sample_rate: u32) -> Option<u32> {
    if samples.is_empty() || sample_rate == 0 {
        return None;
    }
    let factor = ((f64::from(sample_rate) / ENVELOPE_RATE).floor() as usize).max(1);
    let env = envelope(samples, factor);
    if env.len() < MIN_ENVELOPE_FRAMES {
        log::debug!("tempo estimate skipped: only {} envelope frames", env.len());
        return None;
    }
    let mean = env.iter().sum::<f64>() / env.len() as f64;

    let min_lag = (60.0 / f64::from(MAX_BPM) * ENVELOPE_RATE).floor() as usize;
    let max_lag = ((60.0 / f64::from(MIN_BPM) * ENVELOPE_RATE).ceil() as usize).min(env.len() - 1);

    let mut best: Option<(usize, f64)> = None;
    for lag in min_lag..=max_lag {
        let v: f64 = env
            .iter()
            .zip(&env[lag..])
            .map(|(a, b)| (a - mean) * (b - mean))
            .sum();
        if best.is_none_or(|(_, bv)| v > bv) {
            best = Some((lag, v));
        }
    }
    let (lag, _) = best?;
    let bpm = (60.0 * ENVELOPE_RATE / lag as f64).round() as u32;
    log::debug!("tempo estimate: lag {lag} -> {bpm} bpm");
    (MIN_BPM..=MAX_BPM).contains(&bpm).then_some(bpm)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Click track: 20ms bursts every beat.
    fn clicks(bpm: f64, seconds: f64, sample_rate: u32) -> Vec<f32> {
        let sr = f64::from(sample_rate);
        let period = (60.0 / bpm * sr) as usize;
        let burst = (0.02 * sr) as usize;
        (0..(seconds * sr) as usize)
            .map(|i| if i % period < burst { 1.0 } else { 0.0 })
            .collect()
    }

    #[test]
    fn test_detects_click_track_tempo() {
        assert_eq!(estimate_bpm(&clicks(120.0, 10.0, 8000), 8000), Some(120));
        assert_eq!(estimate_bpm(&clicks(100.0, 12.0, 8000), 8000), Some(100));
    }

    #[test]
    fn test_short_clip_is_rejected() {
        // 19 envelope frames at 8 kHz
        assert_eq!(estimate_bpm(&vec![0.5; 40 * 19], 8000), None);
        assert_eq!(estimate_bpm(&[], 44_100), None);
        assert_eq!(estimate_bpm(&[0.1; 10], 0), None);
    }

    #[test]
    fn test_envelope_rms() {
        let env = envelope(&[3.0, 4.0, 1.0], 2);
        assert!((env[0] - (12.5f64).sqrt()).abs() < 1e-9);
        assert!((env[1] - 1.0).abs() < 1e-9);
    }
}
